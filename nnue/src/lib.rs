pub mod encoding;
pub mod error;
pub mod export;
pub mod format;
pub mod loss;
pub mod network;
pub mod record;
pub mod samples;
pub mod state_dict;


pub use error::{DecodeError, Error, Result};
pub use format::Format;
