use std::error::Error;

use candle_core::Device;
use nnue_trainer::loss::loss;
use nnue_trainer::network::Network;
use nnue_trainer::Format;

use crate::dataset::DataLoader;

/// Mean loss over every sample the loader yields, without updating weights.
pub fn evaluate(
    network: &Network,
    format: Format,
    mut loader: DataLoader,
    device: &Device,
) -> Result<f32, Box<dyn Error>> {
    let mut total_loss = 0.0f64;
    let mut samples = 0usize;

    for data in &mut loader {
        if data.is_empty() {
            continue;
        }

        let batch = data.to_batch(device)?;
        let preds = network.forward_batch(&batch)?;
        let value = loss(format, &preds, &batch.targets)?;

        total_loss += value.to_scalar::<f32>()? as f64 * batch.len as f64;
        samples += batch.len;
    }

    if loader.skipped() > 0 {
        log::warn!("Skipped {} malformed records during evaluation", loader.skipped());
    }

    Ok((total_loss / samples.max(1) as f64) as f32)
}
