mod loader;

pub use loader::DataLoader;

use std::io;
use std::sync::Arc;

use nnue_trainer::samples::Samples;
use rand::seq::SliceRandom;

use crate::args::TrainArgs;

pub struct Dataset {
    samples: Arc<Samples>,
    train_indices: Vec<usize>,
    val_indices: Vec<usize>,
    test_indices: Vec<usize>,
}

impl Dataset {
    pub fn load(args: &TrainArgs) -> io::Result<Self> {
        log::info!(
            "Loading {} (format {})...",
            args.dataset.display(),
            args.format
        );

        let samples = Samples::open(&args.dataset, args.format)?;
        samples.scan().log();

        let (rest, test_indices) = samples.train_test_indices(args.test_ratio, args.seed);
        let (train_indices, val_indices) = split_validation(rest, args.val_ratio);

        log::info!(
            "Split: {} train, {} validation, {} test",
            train_indices.len(),
            val_indices.len(),
            test_indices.len()
        );

        Ok(Self {
            samples: Arc::new(samples),
            train_indices,
            val_indices,
            test_indices,
        })
    }

    pub fn train_loader(&mut self, batch_size: usize, workers: usize) -> DataLoader {
        self.train_indices.shuffle(&mut rand::thread_rng());
        DataLoader::new(&self.samples, &self.train_indices, batch_size, workers)
    }

    pub fn val_loader(&self, batch_size: usize, workers: usize) -> DataLoader {
        DataLoader::new(&self.samples, &self.val_indices, batch_size, workers)
    }

    pub fn test_loader(&self, batch_size: usize, workers: usize) -> DataLoader {
        DataLoader::new(&self.samples, &self.test_indices, batch_size, workers)
    }
}

/// Splits already shuffled indices into train and validation parts.
fn split_validation(mut indices: Vec<usize>, val_ratio: f64) -> (Vec<usize>, Vec<usize>) {
    let val_len = (indices.len() as f64 * val_ratio.clamp(0.0, 1.0)) as usize;
    let train = indices.split_off(val_len);
    (train, indices)
}
