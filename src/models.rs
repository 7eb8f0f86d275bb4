use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// One entry of a request: payload key to raw bytes.
pub type PayloadItem = HashMap<String, Vec<u8>>;

/// Ranked classes for every row of a batch.
pub type Prediction = Vec<Vec<Classification>>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SignatureInput {
    pub data_name: String,
    pub data_shape: Vec<usize>,
}

/// Contents of `signature.json`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Signature {
    pub inputs: Vec<SignatureInput>,
    #[serde(default)]
    pub input_type: Option<String>,
    #[serde(default)]
    pub outputs: Vec<serde_json::Value>,
    #[serde(default)]
    pub output_type: Option<String>,
}

impl Signature {
    pub fn primary_input(&self) -> Result<&SignatureInput> {
        self.inputs
            .first()
            .ok_or_else(|| ServiceError::InvalidSignature("no inputs declared".into()))
    }

    /// `(height, width)` of the first input, read from its NCHW shape.
    pub fn input_size(&self) -> Result<(u32, u32)> {
        let shape = &self.primary_input()?.data_shape;
        let invalid = || {
            ServiceError::InvalidSignature(format!(
                "expected a non-empty NCHW input shape, got {:?}",
                shape
            ))
        };
        match shape.as_slice() {
            [_, _, h, w] if *h > 0 && *w > 0 => {
                let h = u32::try_from(*h).map_err(|_| invalid())?;
                let w = u32::try_from(*w).map_err(|_| invalid())?;
                Ok((h, w))
            }
            _ => Err(invalid()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Classification {
    pub class: String,
    pub probability: f32,
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub request_id: String,
    pub model_name: String,
    pub predictions: Prediction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Gpu(u32),
}

impl Device {
    pub fn select(gpu_id: Option<u32>) -> Self {
        gpu_id.map_or(Device::Cpu, Device::Gpu)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu(0)"),
            Device::Gpu(id) => write!(f, "gpu({})", id),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SystemProperties {
    #[serde(default)]
    pub gpu_id: Option<u32>,
    pub model_dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub model_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Manifest {
    pub model: ModelInfo,
}

/// What the host hands to the handler when it initializes the service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HandlerContext {
    pub system_properties: SystemProperties,
    pub manifest: Manifest,
}

impl HandlerContext {
    pub fn new(model_dir: impl Into<PathBuf>, gpu_id: Option<u32>, model_name: impl Into<String>) -> Self {
        HandlerContext {
            system_properties: SystemProperties {
                gpu_id,
                model_dir: model_dir.into(),
            },
            manifest: Manifest {
                model: ModelInfo {
                    model_name: model_name.into(),
                },
            },
        }
    }

    pub fn model_name(&self) -> &str {
        &self.manifest.model.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_signature_with_optional_fields() {
        let raw = r#"{
            "inputs": [{"data_name": "data", "data_shape": [1, 3, 224, 224]}],
            "input_type": "image/jpeg",
            "outputs": [{"data_name": "softmax", "data_shape": [1, 1000]}],
            "output_type": "application/json"
        }"#;
        let sig: Signature = serde_json::from_str(raw).unwrap();
        assert_eq!(sig.primary_input().unwrap().data_name, "data");
        assert_eq!(sig.input_size().unwrap(), (224, 224));

        let minimal: Signature =
            serde_json::from_str(r#"{"inputs": [{"data_name": "x", "data_shape": [1, 3, 32, 48]}]}"#).unwrap();
        assert_eq!(minimal.input_size().unwrap(), (32, 48));
    }

    #[test]
    fn rejects_non_nchw_shapes() {
        let sig: Signature =
            serde_json::from_str(r#"{"inputs": [{"data_name": "x", "data_shape": [3, 224, 224]}]}"#).unwrap();
        assert!(matches!(sig.input_size(), Err(ServiceError::InvalidSignature(_))));

        let empty: Signature = serde_json::from_str(r#"{"inputs": []}"#).unwrap();
        assert!(matches!(empty.input_size(), Err(ServiceError::InvalidSignature(_))));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn rejects_dimensions_beyond_u32() {
        let too_tall = u32::MAX as usize + 1;
        let sig = Signature {
            inputs: vec![SignatureInput {
                data_name: "data".into(),
                data_shape: vec![1, 3, too_tall, 224],
            }],
            input_type: None,
            outputs: Vec::new(),
            output_type: None,
        };
        assert!(matches!(sig.input_size(), Err(ServiceError::InvalidSignature(_))));

        let max = u32::MAX as usize;
        let sig = Signature {
            inputs: vec![SignatureInput {
                data_name: "data".into(),
                data_shape: vec![1, 3, max, 1],
            }],
            ..sig
        };
        assert_eq!(sig.input_size().unwrap(), (u32::MAX, 1));
    }

    #[test]
    fn context_uses_manifest_casing() {
        let raw = r#"{
            "system_properties": {"gpu_id": 1, "model_dir": "/opt/models/resnet"},
            "manifest": {"model": {"modelName": "resnet18_v1"}}
        }"#;
        let ctx: HandlerContext = serde_json::from_str(raw).unwrap();
        assert_eq!(ctx.model_name(), "resnet18_v1");
        assert_eq!(Device::select(ctx.system_properties.gpu_id), Device::Gpu(1));
        assert_eq!(Device::select(None), Device::Cpu);
    }
}
