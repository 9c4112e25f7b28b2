use candle_core::{Result, Tensor};
use candle_nn::loss::mse;
use candle_nn::ops::sigmoid;

use crate::format::{Format, LossKind};

/// Training loss between raw network outputs and blended targets, both `(n, 1)`.
pub fn loss(format: Format, preds: &Tensor, targets: &Tensor) -> Result<Tensor> {
    let logits = (preds / format.output_divisor() as f64)?;

    match format.loss() {
        LossKind::Mse => mse(&sigmoid(&logits)?, targets),
        LossKind::Bce => bce_with_logits(&logits, targets),
    }
}

/// Binary cross-entropy on logits, `max(x, 0) - x * t + ln(1 + e^-|x|)`.
///
/// Never takes the log of a saturated sigmoid, so it and its gradient stay
/// finite for any logit the clamped network can produce.
fn bce_with_logits(logits: &Tensor, targets: &Tensor) -> Result<Tensor> {
    let softplus = logits.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    let per_sample = ((logits.relu()? - (logits * targets)?)? + softplus)?;
    per_sample.mean_all()
}
