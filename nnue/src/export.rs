use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::format::Quantization;
use crate::network::Snapshot;

/// Scales a weight and rounds it to the nearest integer, ties to even.
pub fn quantize(value: f32, scale: f32) -> i64 {
    (value * scale).round_ties_even() as i64
}

/// Writes the model as the Rust struct literal the engine includes at build time:
///
/// `Nnue {input_layer:[[..],..],input_layer_bias:[..],hidden_layer:[..],hidden_layer_bias:..,}`
///
/// Every array element is followed by a comma and no whitespace is emitted.
/// The input layer is written feature-major. Single-bucket networks write the
/// hidden layer as a flat array and its bias as a scalar.
pub fn write_model<W: Write>(
    out: &mut W,
    snapshot: &Snapshot,
    quantization: &Quantization,
) -> io::Result<()> {
    let architecture = snapshot.architecture();
    let feature = snapshot.feature();
    let output = snapshot.output();

    write!(out, "Nnue {{")?;

    write!(out, "input_layer:")?;
    write_tensor(
        out,
        &feature.transposed_weights(),
        &[feature.input_size(), feature.output_size()],
        quantization.input_weight,
    )?;

    write!(out, ",input_layer_bias:")?;
    write_tensor(
        out,
        feature.biases(),
        &[feature.output_size()],
        quantization.input_bias,
    )?;

    write!(out, ",hidden_layer:")?;
    match architecture.buckets {
        1 => write_tensor(
            out,
            output.weights(),
            &[output.input_size()],
            quantization.output_weight,
        )?,
        buckets => write_tensor(
            out,
            output.weights(),
            &[buckets, output.input_size()],
            quantization.output_weight,
        )?,
    }

    write!(out, ",hidden_layer_bias:")?;
    match architecture.buckets {
        1 => write!(out, "{}", quantize(output.biases()[0], quantization.output_bias))?,
        buckets => write_tensor(out, output.biases(), &[buckets], quantization.output_bias)?,
    }

    write!(out, ",}}")
}

/// Writes the model file, replacing any existing one.
pub fn export_to_path(
    path: &Path,
    snapshot: &Snapshot,
    quantization: &Quantization,
) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write_model(&mut out, snapshot, quantization)?;
    out.flush()
}

/// Writes a row-major tensor of the given shape as nested array literals.
fn write_tensor<W: Write>(
    out: &mut W,
    values: &[f32],
    shape: &[usize],
    scale: f32,
) -> io::Result<()> {
    write!(out, "[")?;
    match shape {
        [] => {}
        [_] => {
            for &value in values {
                write!(out, "{},", quantize(value, scale))?;
            }
        }
        [_, inner @ ..] => {
            let stride = inner.iter().product::<usize>().max(1);
            for row in values.chunks_exact(stride) {
                write_tensor(out, row, inner, scale)?;
                write!(out, ",")?;
            }
        }
    }
    write!(out, "]")
}
