use std::io;

use thiserror::Error;

/// Reasons a single fixed-size record can't be turned into a position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("record {index} needs {needed} bytes, buffer has {available}")]
    Truncated {
        index: usize,
        needed: usize,
        available: usize,
    },

    #[error("feature index {value} in slot {slot} is out of range")]
    IndexOutOfRange { slot: usize, value: u16 },

    #[error("feature index {value} appears twice")]
    DuplicateIndex { value: u16 },

    #[error("slot {slot} holds {value} after the list terminator")]
    TrailingIndex { slot: usize, value: u16 },

    #[error("outcome {0} is not one of 0, 1, 2")]
    InvalidOutcome(u16),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error("invalid state dict: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tensor shape mismatch: {0}")]
    Shape(String),

    #[error("benchmark failed: {0}")]
    Benchmark(String),

    #[error("weight store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, Error>;
