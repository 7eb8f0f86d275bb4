use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use ndarray::{Array2, Array4, Axis};

use crate::error::{Result, ServiceError};
use crate::models::{Device, HandlerContext, PayloadItem, Prediction, Signature};
use crate::network::{Network, OnnxNetwork};
use crate::postprocess::{self, LabelFormat, Ranking, DEFAULT_TOP_K};
use crate::preprocess;

pub const SIGNATURE_FILE: &str = "signature.json";
pub const SYNSET_FILE: &str = "synset.txt";
pub const RESNET_PARAM_FILE: &str = "resnet18_v1.onnx";

/// The three stages every classification pipeline provides.
pub trait InferencePipeline {
    fn preprocess(&self, data: &[PayloadItem]) -> Result<Array4<f32>>;

    fn inference(&self, input: Array4<f32>) -> Result<Array2<f32>>;

    fn postprocess(&self, probabilities: Array2<f32>) -> Result<Prediction>;

    fn predict(&self, data: &[PayloadItem]) -> Result<Prediction> {
        let input = self.preprocess(data)?;
        let probabilities = self.inference(input)?;
        self.postprocess(probabilities)
    }
}

/// Per model family knobs of a [`ClassificationService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Weights file relative to the model directory, if any.
    pub param_file: Option<String>,
    pub ranking: Ranking,
    pub label_format: LabelFormat,
    pub top_k: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            param_file: None,
            ranking: Ranking::ArgSort,
            label_format: LabelFormat::Verbatim,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl PipelineOptions {
    pub fn pretrained_resnet() -> Self {
        PipelineOptions {
            param_file: Some(RESNET_PARAM_FILE.to_string()),
            ranking: Ranking::TopK,
            label_format: LabelFormat::StripSynsetId,
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Image classification over a network, a signature and a synset.
pub struct ClassificationService {
    options: PipelineOptions,
    net: Option<Box<dyn Network>>,
    device: Device,
    model_name: Option<String>,
    signature: Option<Signature>,
    labels: Option<Vec<String>>,
    initialized: bool,
}

impl ClassificationService {
    /// A service with no network yet; `initialize` fails until one is set.
    pub fn new(options: PipelineOptions) -> Self {
        ClassificationService {
            options,
            net: None,
            device: Device::Cpu,
            model_name: None,
            signature: None,
            labels: None,
            initialized: false,
        }
    }

    pub fn with_network(net: Box<dyn Network>, options: PipelineOptions) -> Self {
        let mut service = Self::new(options);
        service.net = Some(net);
        service
    }

    /// ResNet-18 exported to ONNX, with synset ids stripped from labels.
    pub fn pretrained_resnet() -> Self {
        Self::with_network(Box::new(OnnxNetwork::new()), PipelineOptions::pretrained_resnet())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn labels(&self) -> Option<&[String]> {
        self.labels.as_deref()
    }

    pub fn initialize(&mut self, ctx: &HandlerContext) -> Result<()> {
        let net = self
            .net
            .as_mut()
            .ok_or_else(|| ServiceError::NotConfigured("no network defined for this pipeline".into()))?;

        let model_dir = &ctx.system_properties.model_dir;
        self.device = Device::select(ctx.system_properties.gpu_id);
        self.model_name = Some(ctx.model_name().to_string());

        let param_path = match &self.options.param_file {
            Some(file) => Some(require_file(model_dir.join(file))?),
            None => None,
        };
        let signature_path = require_file(model_dir.join(SIGNATURE_FILE))?;
        let synset_path = require_file(model_dir.join(SYNSET_FILE))?;

        let signature = load_signature(&signature_path)?;
        let labels = load_labels(&synset_path)?;

        if let Some(path) = param_path {
            let input_shape = signature.primary_input()?.data_shape.clone();
            net.load_parameters(&path, self.device, &input_shape)?;
        }

        tracing::info!(
            model = ctx.model_name(),
            device = %self.device,
            labels = labels.len(),
            "classification service initialized"
        );

        self.signature = Some(signature);
        self.labels = Some(labels);
        self.initialized = true;
        Ok(())
    }

    fn loaded_signature(&self) -> Result<&Signature> {
        self.signature
            .as_ref()
            .ok_or_else(|| ServiceError::NotConfigured("signature not loaded, call initialize first".into()))
    }
}

impl InferencePipeline for ClassificationService {
    fn preprocess(&self, data: &[PayloadItem]) -> Result<Array4<f32>> {
        let signature = self.loaded_signature()?;
        let input = signature.primary_input()?;
        let (height, width) = signature.input_size()?;

        let bytes = preprocess::extract_image(data, &input.data_name)?;
        let img = preprocess::decode_image(bytes)?;
        preprocess::image_to_tensor(&img, height, width)
    }

    fn inference(&self, input: Array4<f32>) -> Result<Array2<f32>> {
        let net = self
            .net
            .as_ref()
            .ok_or_else(|| ServiceError::NotConfigured("no network defined for this pipeline".into()))?;

        let started = Instant::now();
        let output = net.forward(input)?;
        tracing::debug!(device = %self.device, elapsed_ms = started.elapsed().as_millis() as u64, "forward pass");

        Ok(postprocess::softmax(postprocess::squeeze_scores(output)?))
    }

    fn postprocess(&self, probabilities: Array2<f32>) -> Result<Prediction> {
        let labels = self.labels.as_deref().ok_or(ServiceError::MissingLabels)?;

        probabilities
            .axis_iter(Axis(0))
            .map(|row| {
                postprocess::top_probability(
                    row,
                    labels,
                    self.options.top_k,
                    self.options.ranking,
                    self.options.label_format,
                )
            })
            .collect()
    }
}

fn require_file(path: PathBuf) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(ServiceError::FileNotFound(path))
    }
}

pub fn load_signature(path: &Path) -> Result<Signature> {
    let raw = fs::read_to_string(path)?;
    let signature: Signature = serde_json::from_str(&raw)?;
    signature.input_size()?;
    Ok(signature)
}

/// One trimmed label per line; position is the output index.
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)?;
    Ok(raw.lines().map(|line| line.trim().to_string()).collect())
}
