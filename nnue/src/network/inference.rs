use candle_core::Result;

use crate::encoding::FeatureVector;
use crate::format::Architecture;

use super::linear::LinearLayer;
use super::model::Network;

/// A settled copy of the network weights.
///
/// Taken between optimizer steps, so the exporter and checks never observe
/// a half-applied update. Evaluation is plain sequential f32 arithmetic and
/// gives bit-identical results for identical inputs.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    architecture: Architecture,
    feature: LinearLayer,
    output: LinearLayer,
}

impl Snapshot {
    pub fn from_network(network: &Network) -> Result<Self> {
        Ok(Self {
            architecture: network.architecture(),
            feature: LinearLayer::from_candle_linear(&network.feature)?,
            output: LinearLayer::from_candle_linear(&network.output)?,
        })
    }

    pub fn from_layers(architecture: Architecture, feature: LinearLayer, output: LinearLayer) -> Self {
        assert_eq!(feature.output_size(), architecture.hidden);
        assert_eq!(output.input_size(), architecture.accumulator_width());
        assert_eq!(output.output_size(), architecture.buckets);

        Self {
            architecture,
            feature,
            output,
        }
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn feature(&self) -> &LinearLayer {
        &self.feature
    }

    pub fn output(&self) -> &LinearLayer {
        &self.output
    }

    /// Output for one position. `nstm` is ignored by single-perspective networks.
    pub fn evaluate(&self, stm: &FeatureVector, nstm: &FeatureVector, bucket: usize) -> f32 {
        let hidden = self.architecture.hidden;
        let mut acc = vec![0f32; self.architecture.accumulator_width()];

        self.feature.forward(stm, &mut acc[..hidden]);
        if self.architecture.perspectives == 2 {
            self.feature.forward(nstm, &mut acc[hidden..]);
        }

        // Clipped ReLU
        for val in acc.iter_mut() {
            *val = val.clamp(0.0, 1.0);
        }

        let mut raw = vec![0f32; self.architecture.buckets];
        self.output.forward(&acc, &mut raw);

        raw[bucket]
    }
}
