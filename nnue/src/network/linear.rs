use candle_core::{Error, Result};
use candle_nn::Linear;

/// Plain copy of a dense layer, detached from the training graph.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearLayer {
    // [out_idx][in_idx]
    weights: Box<[f32]>,
    biases: Box<[f32]>,
    input_size: usize,
    output_size: usize,
}

impl LinearLayer {
    pub fn new(weights: Vec<f32>, biases: Vec<f32>, input_size: usize) -> Self {
        let output_size = biases.len();
        assert_eq!(
            weights.len(),
            input_size * output_size,
            "weight count doesn't match layer shape"
        );

        Self {
            weights: weights.into_boxed_slice(),
            biases: biases.into_boxed_slice(),
            input_size,
            output_size,
        }
    }

    pub fn from_candle_linear(linear: &Linear) -> Result<Self> {
        let bias = linear
            .bias()
            .ok_or_else(|| Error::Msg("linear layer has no bias".to_string()))?;

        Ok(Self {
            weights: linear.weight().flatten_all()?.to_vec1()?.into_boxed_slice(),
            biases: bias.to_vec1()?.into_boxed_slice(),
            input_size: linear.weight().dim(1)?,
            output_size: linear.weight().dim(0)?,
        })
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    /// Weights laid out input-major: `[in_idx][out_idx]`.
    pub fn transposed_weights(&self) -> Vec<f32> {
        let mut transposed = vec![0f32; self.weights.len()];
        for out_idx in 0..self.output_size {
            for in_idx in 0..self.input_size {
                transposed[in_idx * self.output_size + out_idx] =
                    self.weights[out_idx * self.input_size + in_idx];
            }
        }
        transposed
    }

    pub fn forward(&self, input: &[f32], output: &mut [f32]) {
        output.copy_from_slice(&self.biases);

        for (i, val) in output.iter_mut().enumerate().take(self.output_size) {
            let offset = i * self.input_size;
            let weights_row = &self.weights[offset..offset + self.input_size];
            *val += dot_product(input, weights_row);
        }
    }
}

#[inline(always)]
fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
