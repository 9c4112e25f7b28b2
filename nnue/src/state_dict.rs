use std::io::Read;

use serde::Deserialize;

use crate::encoding::NUM_FEATURES;
use crate::error::{Error, Result};
use crate::format::Format;
use crate::network::{LinearLayer, Snapshot};

/// Weights of an externally trained network, as a JSON object keyed by
/// parameter name. Matrices are `[out][in]`, the usual dense layer layout.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StateDict {
    #[serde(rename = "ft.weight")]
    pub feature_weight: Vec<Vec<f32>>,
    #[serde(rename = "ft.bias")]
    pub feature_bias: Vec<f32>,
    #[serde(rename = "out.weight")]
    pub output_weight: Vec<Vec<f32>>,
    #[serde(rename = "out.bias")]
    pub output_bias: Vec<f32>,
}

impl StateDict {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Checks every tensor against `format`'s architecture and copies the
    /// weights into a snapshot the exporter can write.
    pub fn into_snapshot(self, format: Format) -> Result<Snapshot> {
        let architecture = format.architecture();
        let width = architecture.accumulator_width();

        let hidden = architecture.hidden;
        let buckets = architecture.buckets;

        let feature_weight = flatten("ft.weight", self.feature_weight, hidden, NUM_FEATURES)?;
        check_len("ft.bias", self.feature_bias.len(), hidden)?;
        let output_weight = flatten("out.weight", self.output_weight, buckets, width)?;
        check_len("out.bias", self.output_bias.len(), buckets)?;

        Ok(Snapshot::from_layers(
            architecture,
            LinearLayer::new(feature_weight, self.feature_bias, NUM_FEATURES),
            LinearLayer::new(output_weight, self.output_bias, width),
        ))
    }
}

fn flatten(name: &str, matrix: Vec<Vec<f32>>, rows: usize, cols: usize) -> Result<Vec<f32>> {
    check_len(name, matrix.len(), rows)?;

    let mut flat = Vec::with_capacity(rows * cols);
    for (i, row) in matrix.into_iter().enumerate() {
        check_len(&format!("{}[{}]", name, i), row.len(), cols)?;
        flat.extend(row);
    }
    Ok(flat)
}

fn check_len(name: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(Error::Shape(format!(
            "{} has {} entries, expected {}",
            name, actual, expected
        )));
    }
    Ok(())
}
