use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nnue_trainer::Format;

#[derive(Parser, Debug, Clone)]
#[command(name = "NNUE Trainer")]
#[command(author = "Jørgen Hanssen <jorgen@hanssen.io>")]
#[command(version = "0.1.0")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Train a network on a binary dataset and write checkpoints.
    Train(TrainArgs),
    /// Export a checkpoint as an engine model file.
    Dump(DumpArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct TrainArgs {
    /// Binary dataset file.
    pub dataset: PathBuf,

    /// Record format generation of the dataset.
    #[arg(long, value_enum, default_value_t = Format::A)]
    pub format: Format,

    /// Number of positions per training batch.
    #[arg(long, default_value_t = 4096)]
    pub batch_size: usize,

    /// Initial learning rate for optimizer.
    #[arg(long, default_value_t = 0.001)]
    pub learning_rate: f64,

    /// Maximum number of training epochs.
    #[arg(long, default_value_t = 100)]
    pub epochs: usize,

    /// Number of data loader workers.
    #[arg(long, default_value_t = num_cpus::get())]
    pub workers: usize,

    /// Fraction of data for validation set.
    #[arg(long, default_value_t = 0.1)]
    pub val_ratio: f64,

    /// Fraction of data for test set.
    #[arg(long, default_value_t = 0.01)]
    pub test_ratio: f64,

    /// Learning rate decay factor per epoch.
    #[arg(long, default_value_t = 1.0)]
    pub lr_decay: f64,

    /// Epochs without validation improvement before early stopping.
    #[arg(long, default_value_t = 10)]
    pub patience: u64,

    /// Seed for the train/validation/test split.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory holding one versioned subdirectory per training run.
    #[arg(long, default_value = "nnue/checkpoints")]
    pub checkpoint_dir: PathBuf,

    /// Where the engine model file is written.
    #[arg(long, default_value = "frozenight/model.rs")]
    pub model_out: PathBuf,

    /// Command that benchmarks the exported model and prints the node count first,
    /// e.g. "cargo run --release bench".
    #[arg(long)]
    pub bench: Option<String>,

    /// Seconds before a benchmark run is abandoned.
    #[arg(long, default_value_t = 600)]
    pub bench_timeout: u64,

    /// Checkpoints kept, ranked by benchmark node count. 0 keeps all.
    #[arg(long, default_value_t = 4)]
    pub save_top_k: usize,
}

#[derive(clap::Args, Debug, Clone)]
pub struct DumpArgs {
    /// Checkpoint (.safetensors) written by `train`, or a JSON state dict with `--json`.
    pub checkpoint: PathBuf,

    /// Record format generation the checkpoint was trained on.
    #[arg(long, value_enum, default_value_t = Format::A)]
    pub format: Format,

    /// Where the engine model file is written.
    #[arg(long, default_value = "frozenight/model.rs")]
    pub output: PathBuf,

    /// Read the checkpoint as a JSON state dict (`ft.weight`, `ft.bias`,
    /// `out.weight`, `out.bias`) from an external trainer.
    #[arg(long)]
    pub json: bool,
}
