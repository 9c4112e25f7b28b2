mod evaluation;
mod metrics;
mod progress;
mod selection;
mod trainer;

pub use trainer::Trainer;
