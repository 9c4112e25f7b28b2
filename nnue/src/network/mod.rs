pub mod clamp;
pub mod inference;
pub mod linear;
pub mod model;

pub use clamp::QuantizationClamp;
pub use inference::Snapshot;
pub use linear::LinearLayer;
pub use model::Network;

/// Variable prefix of the input (feature transformer) layer.
pub const FEATURE_LAYER: &str = "feature";

/// Variable prefix of the bucketed output layer.
pub const OUTPUT_LAYER: &str = "output";
