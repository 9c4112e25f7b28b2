use candle_nn::VarMap;

use crate::error::{Error, Result};
use crate::format::{ClampScope, Format, WEIGHT_MAX, WEIGHT_MIN};

use super::OUTPUT_LAYER;

/// Keeps quantized weights inside the range the exporter can represent.
///
/// Applied after every optimizer step, so training only ever sees weights
/// the engine will actually use.
#[derive(Debug, Clone, Copy)]
pub struct QuantizationClamp {
    scope: ClampScope,
}

impl QuantizationClamp {
    pub fn new(scope: ClampScope) -> Self {
        Self { scope }
    }

    pub fn for_format(format: Format) -> Self {
        Self::new(format.clamp_scope())
    }

    /// Whether the variable with this name is clamped.
    pub fn covers(&self, name: &str) -> bool {
        match self.scope {
            ClampScope::None => false,
            ClampScope::OutputLayer => name
                .strip_prefix(OUTPUT_LAYER)
                .is_some_and(|rest| rest.starts_with('.')),
            ClampScope::AllLayers => true,
        }
    }

    pub fn apply(&self, varmap: &VarMap) -> Result<()> {
        if self.scope == ClampScope::None {
            return Ok(());
        }

        let vars = varmap.data().lock().map_err(|_| Error::Poisoned)?;
        for (name, var) in vars.iter() {
            if !self.covers(name) {
                continue;
            }
            let clamped = var.as_tensor().detach().clamp(WEIGHT_MIN, WEIGHT_MAX)?;
            var.set(&clamped)?;
        }

        Ok(())
    }

    /// Checks that every covered weight is in range.
    pub fn holds(&self, varmap: &VarMap) -> Result<bool> {
        let vars = varmap.data().lock().map_err(|_| Error::Poisoned)?;
        for (name, var) in vars.iter() {
            if !self.covers(name) {
                continue;
            }
            let values = var.as_tensor().flatten_all()?.to_vec1::<f32>()?;
            if values.iter().any(|&w| !(WEIGHT_MIN..=WEIGHT_MAX).contains(&w)) {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device, Tensor};
    use candle_nn::VarBuilder;
    use proptest::prelude::*;

    use crate::network::Network;

    fn network_with_large_weights(format: Format) -> candle_core::Result<(Network, VarMap)> {
        network_with_scaled_weights(format, 100.0)
    }

    fn network_with_scaled_weights(
        format: Format,
        scale: f64,
    ) -> candle_core::Result<(Network, VarMap)> {
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let network = Network::new(&vs, format.architecture())?;

        for var in varmap.all_vars() {
            let scaled = (var.as_tensor().detach() * scale)?;
            var.set(&scaled)?;
        }
        Ok((network, varmap))
    }

    #[test]
    fn test_covers_output_layer_only() {
        let clamp = QuantizationClamp::new(ClampScope::OutputLayer);
        assert!(clamp.covers("output.weight"));
        assert!(clamp.covers("output.bias"));
        assert!(!clamp.covers("feature.weight"));
        assert!(!clamp.covers("outputs.weight"));
    }

    #[test]
    fn test_apply_restores_invariant() -> Result<()> {
        let (_network, varmap) = network_with_large_weights(Format::A)?;
        let clamp = QuantizationClamp::for_format(Format::A);

        assert!(!clamp.holds(&varmap)?);
        clamp.apply(&varmap)?;
        assert!(clamp.holds(&varmap)?);

        // Input layer is left alone in this format.
        let all = QuantizationClamp::new(ClampScope::AllLayers);
        assert!(!all.holds(&varmap)?);
        Ok(())
    }

    #[test]
    fn test_all_layers_scope() -> Result<()> {
        let (_network, varmap) = network_with_large_weights(Format::B)?;
        let clamp = QuantizationClamp::for_format(Format::B);

        clamp.apply(&varmap)?;
        assert!(clamp.holds(&varmap)?);
        Ok(())
    }

    #[test]
    fn test_values_inside_range_are_untouched() -> Result<()> {
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let _network = Network::new(&vs, Format::A.architecture())?;

        let var = varmap
            .data()
            .lock()
            .map_err(|_| Error::Poisoned)?
            .get("output.weight")
            .cloned()
            .expect("output layer variable");

        // Output layer of format A is (1, 32); fill the first four and zero the rest.
        let weights = Tensor::new(&[[1.2f32, -2.5, 3.0, -1.0]], &Device::Cpu)?;
        let padding = Tensor::zeros((1, 28), DType::F32, &Device::Cpu)?;
        var.set(&Tensor::cat(&[&weights, &padding], 1)?)?;

        QuantizationClamp::for_format(Format::A).apply(&varmap)?;
        let values = var.as_tensor().flatten_all()?.to_vec1::<f32>()?;

        assert_eq!(values[0], 1.2);
        assert_eq!(values[1], WEIGHT_MIN);
        assert_eq!(values[2], WEIGHT_MAX);
        assert_eq!(values[3], -1.0);
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_apply_always_restores_invariant(
            format in prop::sample::select(vec![Format::A, Format::B, Format::D]),
            scale in -1000.0f64..1000.0,
        ) {
            let (_network, varmap) = network_with_scaled_weights(format, scale).unwrap();
            let clamp = QuantizationClamp::for_format(format);

            clamp.apply(&varmap).unwrap();
            prop_assert!(clamp.holds(&varmap).unwrap());
        }
    }
}
