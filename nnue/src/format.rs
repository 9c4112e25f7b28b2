use std::fmt;

use crate::encoding::MAX_ACTIVE_FEATURES;

/// Fixed-point scale of the output layer weights.
pub const WEIGHT_SCALE: f32 = 64.0;

/// Fixed-point scale of the accumulator. A clipped activation of 1.0 becomes 127.
pub const ACTIVATION_RANGE: f32 = 127.0;

/// Smallest weight the engine can represent in an i8 after scaling.
pub const WEIGHT_MIN: f32 = -128.0 / WEIGHT_SCALE;

/// Largest weight the engine can represent in an i8 after scaling.
pub const WEIGHT_MAX: f32 = 127.0 / WEIGHT_SCALE;

/// Dataset generations. Each one fixes the record layout, the network shape,
/// the loss and how the weights are quantized, so a dataset always trains and
/// exports the network it was generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Format {
    /// 132 bytes: both perspectives, i16 score, u16 outcome.
    A,
    /// 132 bytes: both perspectives, i16 score, u8 outcome, u8 material phase.
    B,
    /// 66 bytes: side to move only, u16 outcome.
    C,
    /// 130 bytes: both perspectives, u16 outcome.
    D,
}

/// Field layout of one record, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub perspectives: usize,
    pub has_score: bool,
    pub has_phase: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Architecture {
    pub perspectives: usize,
    pub hidden: usize,
    pub buckets: usize,
}

impl Architecture {
    /// Width of the concatenated accumulator fed to the output layer.
    pub fn accumulator_width(&self) -> usize {
        self.perspectives * self.hidden
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossKind {
    /// Squared error between sigmoid(output) and target.
    Mse,
    /// Binary cross-entropy on the output logit.
    Bce,
}

/// Which tensors must stay inside `[WEIGHT_MIN, WEIGHT_MAX]` during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClampScope {
    None,
    OutputLayer,
    AllLayers,
}

/// Multipliers applied before rounding each tensor to an integer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantization {
    pub input_weight: f32,
    pub input_bias: f32,
    pub output_weight: f32,
    pub output_bias: f32,
}

impl Format {
    pub const ALL: [Format; 4] = [Format::A, Format::B, Format::C, Format::D];

    pub fn layout(self) -> Layout {
        match self {
            Format::A => Layout {
                perspectives: 2,
                has_score: true,
                has_phase: false,
            },
            Format::B => Layout {
                perspectives: 2,
                has_score: true,
                has_phase: true,
            },
            Format::C => Layout {
                perspectives: 1,
                has_score: false,
                has_phase: false,
            },
            Format::D => Layout {
                perspectives: 2,
                has_score: false,
                has_phase: false,
            },
        }
    }

    /// Bytes per record. Outcome and phase share one u16 slot when a phase is present.
    pub fn record_size(self) -> usize {
        let layout = self.layout();
        let indices = layout.perspectives * MAX_ACTIVE_FEATURES * 2;
        let score = if layout.has_score { 2 } else { 0 };
        indices + score + 2
    }

    pub fn architecture(self) -> Architecture {
        match self {
            Format::A | Format::D => Architecture {
                perspectives: 2,
                hidden: 16,
                buckets: 1,
            },
            Format::B => Architecture {
                perspectives: 2,
                hidden: 32,
                buckets: 4,
            },
            Format::C => Architecture {
                perspectives: 1,
                hidden: 16,
                buckets: 1,
            },
        }
    }

    pub fn loss(self) -> LossKind {
        match self {
            Format::B => LossKind::Bce,
            Format::A | Format::C | Format::D => LossKind::Mse,
        }
    }

    pub fn clamp_scope(self) -> ClampScope {
        match self {
            Format::A | Format::D => ClampScope::OutputLayer,
            Format::B => ClampScope::AllLayers,
            Format::C => ClampScope::None,
        }
    }

    pub fn quantization(self) -> Quantization {
        match self {
            Format::A | Format::B => Quantization {
                input_weight: ACTIVATION_RANGE,
                input_bias: ACTIVATION_RANGE,
                output_weight: WEIGHT_SCALE,
                output_bias: ACTIVATION_RANGE * WEIGHT_SCALE,
            },
            Format::C => Quantization {
                input_weight: WEIGHT_SCALE,
                input_bias: WEIGHT_SCALE,
                output_weight: 1.0,
                output_bias: 1.0,
            },
            Format::D => Quantization {
                input_weight: ACTIVATION_RANGE,
                input_bias: ACTIVATION_RANGE,
                output_weight: WEIGHT_SCALE,
                output_bias: ACTIVATION_RANGE,
            },
        }
    }

    /// The network output is divided by this before the loss nonlinearity.
    /// The single-perspective network is trained directly in centipawn units.
    pub fn output_divisor(self) -> f32 {
        match self {
            Format::C => 500.0,
            Format::A | Format::B | Format::D => 1.0,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::A => "a",
            Format::B => "b",
            Format::C => "c",
            Format::D => "d",
        };
        write!(f, "{}", name)
    }
}
