use candle_core::{Result, Tensor};
use candle_nn::{linear, Linear, VarBuilder};

use crate::encoding::NUM_FEATURES;
use crate::format::Architecture;
use crate::samples::Batch;

use super::{FEATURE_LAYER, OUTPUT_LAYER};

// Candle network definition (used for training and checkpoint loading)
pub struct Network {
    pub(crate) feature: Linear,
    pub(crate) output: Linear,
    architecture: Architecture,
}

impl Network {
    pub fn new(vs: &VarBuilder, architecture: Architecture) -> Result<Self> {
        Ok(Self {
            feature: linear(NUM_FEATURES, architecture.hidden, vs.pp(FEATURE_LAYER))?,
            output: linear(
                architecture.accumulator_width(),
                architecture.buckets,
                vs.pp(OUTPUT_LAYER),
            )?,
            architecture,
        })
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Evaluates a batch. Returns one raw output per sample, shape `(n, 1)`.
    ///
    /// The side to move's accumulator always comes first in the concatenation;
    /// the engine relies on that order to pick the halves of the output weights.
    pub fn forward(&self, stm: &Tensor, nstm: &Tensor, buckets: &Tensor) -> Result<Tensor> {
        let side = stm.apply(&self.feature)?;
        let acc = match self.architecture.perspectives {
            1 => side,
            _ => Tensor::cat(&[&side, &nstm.apply(&self.feature)?], 1)?,
        };

        let activated = acc.clamp(0f32, 1f32)?;
        let raw = activated.apply(&self.output)?;

        match self.architecture.buckets {
            1 => Ok(raw),
            _ => raw.gather(buckets, 1),
        }
    }

    pub fn forward_batch(&self, batch: &Batch) -> Result<Tensor> {
        self.forward(&batch.stm, &batch.nstm, &batch.buckets)
    }
}
