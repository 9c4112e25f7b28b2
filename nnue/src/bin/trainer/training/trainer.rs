use std::error::Error;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use candle_core::{DType, Device};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use nnue_trainer::export::export_to_path;
use nnue_trainer::loss::loss;
use nnue_trainer::network::{Network, QuantizationClamp, Snapshot};
use nnue_trainer::Format;

use crate::args::TrainArgs;
use crate::bench::Benchmark;
use crate::checkpoint::CheckpointDir;
use crate::dataset::Dataset;
use crate::training::evaluation::evaluate;
use crate::training::metrics::MetricsTracker;
use crate::training::progress::TrainingProgressBar;
use crate::training::selection::{select_checkpoint, TopK};
use crate::utils::device::get_device;

pub struct Trainer {
    network: Network,
    optimizer: AdamW,
    varmap: VarMap,
    device: Device,
    format: Format,
    clamp: QuantizationClamp,
    batch_size: usize,
    workers: usize,
    epochs: usize,
    lr_decay: f64,
    patience: u64,
    checkpoints: CheckpointDir,
    model_out: PathBuf,
    bench: Option<Benchmark>,
    selection: TopK,
    stop_flag: Arc<AtomicBool>,
}

impl Trainer {
    pub fn new(args: &TrainArgs, stop_flag: Arc<AtomicBool>) -> Result<Self, Box<dyn Error>> {
        let device = get_device()?;
        log::info!("Using device: {:?}", device);

        let architecture = args.format.architecture();
        log::info!(
            "Network: {} x 768 -> {} -> {} (format {})",
            architecture.perspectives,
            architecture.hidden,
            architecture.buckets,
            args.format
        );

        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let network = Network::new(&vs, architecture)?;
        let optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: args.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        let clamp = QuantizationClamp::for_format(args.format);
        // Initial weights may already sit outside the exportable range
        clamp.apply(&varmap)?;

        let checkpoints = CheckpointDir::create_next(&args.checkpoint_dir)?;
        log::info!("Checkpoints go to {}", checkpoints.path().display());

        let bench = args.bench.as_deref().and_then(|command| {
            Benchmark::from_command_line(command, Duration::from_secs(args.bench_timeout))
        });

        Ok(Self {
            network,
            optimizer,
            varmap,
            device,
            format: args.format,
            clamp,
            batch_size: args.batch_size,
            workers: args.workers,
            epochs: args.epochs,
            lr_decay: args.lr_decay,
            patience: args.patience,
            checkpoints,
            model_out: args.model_out.clone(),
            bench,
            selection: TopK::new(args.save_top_k),
            stop_flag,
        })
    }

    pub fn train(&mut self, dataset: &mut Dataset) -> Result<(), Box<dyn Error>> {
        let mut metrics = MetricsTracker::new(self.patience);

        for epoch in 1..=self.epochs {
            let val_loss = self.train_epoch(epoch, dataset)?;

            if !self.clamp.holds(&self.varmap)? {
                return Err("weights left the quantizable range".into());
            }

            self.checkpoints.save_epoch(&self.varmap, epoch)?;

            if metrics.update(val_loss) {
                self.checkpoints.save_best(&self.varmap)?;
                log::info!("Epoch {}: new best validation loss {:.6}", epoch, val_loss);
            }

            if self.bench.is_some() {
                self.score_epoch(epoch);
            }

            if metrics.should_stop() {
                log::info!("Early stopping after {} epochs", epoch);
                break;
            }

            if self.stop_flag.load(Ordering::Relaxed) {
                log::info!("Stopped after {} epochs", epoch);
                break;
            }

            self.decay_learning_rate();
        }

        log::info!("Best validation loss: {:.6}", metrics.best_val_loss());
        if let Some((epoch, nodes)) = self.selection.best() {
            log::info!("Best benchmark: epoch {} with {} nodes", epoch, nodes);
        }

        self.test_model(dataset)?;
        self.export_model()?;

        Ok(())
    }

    fn train_epoch(&mut self, epoch: usize, dataset: &mut Dataset) -> Result<f32, Box<dyn Error>> {
        let mut loader = dataset.train_loader(self.batch_size, self.workers);
        let num_batches = loader.num_samples().div_ceil(self.batch_size.max(1));

        let progress = TrainingProgressBar::new(epoch, num_batches)?;

        let mut batches_processed = 0;
        let mut total_loss = 0.0;
        let mut train_loss = 0.0;

        for data in &mut loader {
            if data.is_empty() {
                continue;
            }

            let batch = data.to_batch(&self.device)?;
            let preds = self.network.forward_batch(&batch)?;
            let value = loss(self.format, &preds, &batch.targets)?;

            self.optimizer.backward_step(&value)?;
            self.clamp.apply(&self.varmap)?;

            total_loss += value.to_scalar::<f32>()?;
            batches_processed += 1;

            train_loss = total_loss / batches_processed as f32;
            progress.update(train_loss);
        }

        if loader.skipped() > 0 {
            log::warn!("Skipped {} malformed records this epoch", loader.skipped());
        }

        // Evaluate on validation set
        let val_loader = dataset.val_loader(self.batch_size, self.workers);
        let val_loss = evaluate(&self.network, self.format, val_loader, &self.device)?;

        progress.finish(val_loss, train_loss);

        Ok(val_loss)
    }

    /// Exports the current weights, benchmarks them and prunes checkpoints
    /// that fell out of the top k. Failures only skip selection for this epoch.
    fn score_epoch(&mut self, epoch: usize) {
        let Some(bench) = &self.bench else { return };

        if let Err(e) = self.export_model() {
            log::warn!("Epoch {}: export failed, skipping benchmark: {}", epoch, e);
            return;
        }

        select_checkpoint(bench, &mut self.selection, &self.checkpoints, epoch);
    }

    fn decay_learning_rate(&mut self) {
        let current_lr = self.optimizer.learning_rate();
        let new_lr = current_lr * self.lr_decay;
        self.optimizer.set_learning_rate(new_lr);
    }

    fn test_model(&mut self, dataset: &mut Dataset) -> Result<f32, Box<dyn Error>> {
        log::info!("Running final test set evaluation...");
        let best = self.checkpoints.best_path();
        if best.exists() {
            self.varmap.load(&best)?;
        }

        let test_loader = dataset.test_loader(self.batch_size, self.workers);
        let test_loss = evaluate(&self.network, self.format, test_loader, &self.device)?;
        log::info!("Test Loss: {:.6}", test_loss);

        Ok(test_loss)
    }

    fn export_model(&self) -> Result<(), Box<dyn Error>> {
        let snapshot = Snapshot::from_network(&self.network)?;
        export_to_path(&self.model_out, &snapshot, &self.format.quantization())?;
        log::info!("Model written to {}", self.model_out.display());
        Ok(())
    }
}
