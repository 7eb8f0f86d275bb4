use std::path::Path;

use ndarray::{Array4, ArrayD, IxDyn};
use tract_core::prelude::{Graph, SimplePlan, TypedFact, TypedOp};
use tract_onnx::prelude::*;

use crate::error::{Result, ServiceError};
use crate::models::Device;

pub type TractRunnableModel =
    SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A forward-computable network whose weights are loaded from a file.
pub trait Network: Send + Sync {
    fn load_parameters(&mut self, path: &Path, device: Device, input_shape: &[usize]) -> Result<()>;

    /// Raw, unnormalized outputs for a batch.
    fn forward(&self, input: Array4<f32>) -> Result<ArrayD<f32>>;
}

/// ONNX network executed by tract.
#[derive(Default)]
pub struct OnnxNetwork {
    plan: Option<TractRunnableModel>,
}

impl OnnxNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.plan.is_some()
    }
}

impl Network for OnnxNetwork {
    fn load_parameters(&mut self, path: &Path, device: Device, input_shape: &[usize]) -> Result<()> {
        if let Device::Gpu(id) = device {
            tracing::warn!(gpu_id = id, "tract executes on cpu only, ignoring gpu placement");
        }

        let shape: TVec<usize> = input_shape.iter().copied().collect();
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|m| m.with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape)))
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(ServiceError::Model)?;

        tracing::info!(path = %path.display(), replaced = self.is_loaded(), "loaded onnx parameters");
        self.plan = Some(plan);
        Ok(())
    }

    fn forward(&self, input: Array4<f32>) -> Result<ArrayD<f32>> {
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| ServiceError::NotConfigured("onnx parameters not loaded".into()))?;

        let shape = input.shape().to_vec();
        let data = input.as_standard_layout();
        let tensor = Tensor::from_shape(&shape, data.as_slice().unwrap_or_default()).map_err(ServiceError::Model)?;

        let result = plan.run(tvec!(tensor.into())).map_err(ServiceError::Model)?;
        let output = result[0].to_array_view::<f32>().map_err(ServiceError::Model)?;

        ArrayD::from_shape_vec(IxDyn(output.shape()), output.iter().copied().collect()).map_err(|e| {
            ServiceError::ShapeMismatch {
                shape: output.shape().to_vec(),
                reason: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unloaded_network_refuses_forward() {
        let net = OnnxNetwork::new();
        assert!(!net.is_loaded());
        let err = net.forward(Array4::zeros((1, 3, 2, 2))).unwrap_err();
        assert!(matches!(err, ServiceError::NotConfigured(_)));
    }

    #[test]
    fn missing_onnx_file_is_a_model_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut net = OnnxNetwork::new();
        let err = net
            .load_parameters(&dir.path().join("absent.onnx"), Device::Cpu, &[1, 3, 8, 8])
            .unwrap_err();
        assert!(matches!(err, ServiceError::Model(_)));
        assert!(!net.is_loaded());
    }
}
