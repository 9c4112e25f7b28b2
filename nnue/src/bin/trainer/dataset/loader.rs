use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use nnue_trainer::samples::{BatchData, Samples};

// Holds x items in the channel per worker
const CHANNEL_BUFFER_MULTIPLIER: usize = 2;

/// Multi-threaded data loader over an in-memory dataset.
///
/// Workers take chunks of record indices, decode and encode them into
/// `BatchData`, and send the batches through a channel. Records that fail to
/// decode are skipped and counted.
pub struct DataLoader {
    receiver: mpsc::Receiver<BatchData>,
    workers: Vec<thread::JoinHandle<()>>,
    num_samples: usize,
    skipped: Arc<AtomicUsize>,
}

impl DataLoader {
    pub fn new(
        samples: &Arc<Samples>,
        indices: &[usize],
        batch_size: usize,
        num_workers: usize,
    ) -> Self {
        let num_workers = num_workers.max(1);
        let batch_size = batch_size.max(1);
        let (sender, receiver) = mpsc::sync_channel(num_workers * CHANNEL_BUFFER_MULTIPLIER);
        let skipped = Arc::new(AtomicUsize::new(0));

        let (work_sender, work_receiver) =
            mpsc::sync_channel::<Vec<usize>>(num_workers * CHANNEL_BUFFER_MULTIPLIER);
        let work_receiver = Arc::new(Mutex::new(work_receiver));

        let workers = Self::spawn_workers(
            num_workers,
            work_receiver,
            sender,
            Arc::clone(samples),
            Arc::clone(&skipped),
        );

        // Distribute batches to workers
        let num_samples = indices.len();
        let indices = indices.to_vec();
        thread::spawn(move || {
            for chunk in indices.chunks(batch_size) {
                if work_sender.send(chunk.to_vec()).is_err() {
                    break;
                }
            }
        });

        Self {
            receiver,
            workers,
            num_samples,
            skipped,
        }
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Records skipped so far because they failed to decode.
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    fn spawn_workers(
        num_workers: usize,
        work_receiver: Arc<Mutex<mpsc::Receiver<Vec<usize>>>>,
        sender: mpsc::SyncSender<BatchData>,
        samples: Arc<Samples>,
        skipped: Arc<AtomicUsize>,
    ) -> Vec<thread::JoinHandle<()>> {
        (0..num_workers)
            .map(|_| {
                let rx = Arc::clone(&work_receiver);
                let tx = sender.clone();
                let samples = Arc::clone(&samples);
                let skipped = Arc::clone(&skipped);

                thread::spawn(move || loop {
                    let chunk = {
                        let Ok(rx) = rx.lock() else { break };
                        match rx.recv() {
                            Ok(chunk) => chunk,
                            Err(_) => break,
                        }
                    };

                    let (batch, bad) = samples.batch(&chunk);
                    skipped.fetch_add(bad, Ordering::Relaxed);

                    if tx.send(batch).is_err() {
                        break;
                    }
                })
            })
            .collect()
    }
}

impl Iterator for DataLoader {
    type Item = BatchData;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}

impl Drop for DataLoader {
    fn drop(&mut self) {
        // Workers blocked on a full channel exit once the receiver is gone
        let (_, receiver) = mpsc::sync_channel(0);
        drop(std::mem::replace(&mut self.receiver, receiver));
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
