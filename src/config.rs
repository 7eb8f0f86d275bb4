use std::path::PathBuf;

use clap::Parser;

use crate::models::HandlerContext;

/// Image classification model server
#[derive(Parser, Debug, Clone)]
#[command(name = "classifier-serving")]
#[command(about = "Serves a pretrained image classification model over HTTP")]
pub struct Cli {
    /// Host to bind to
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Directory holding the parameter file, signature.json and synset.txt
    #[arg(long, env = "MODEL_DIR", default_value = "model")]
    pub model_dir: PathBuf,

    /// GPU to place the model on (cpu when unset)
    #[arg(long, env = "GPU_ID")]
    pub gpu_id: Option<u32>,

    /// Model name reported in the manifest
    #[arg(long, env = "MODEL_NAME", default_value = "resnet18_v1")]
    pub model_name: String,
}

impl Cli {
    pub fn bind_addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    pub fn handler_context(&self) -> HandlerContext {
        HandlerContext::new(&self.model_dir, self.gpu_id, &self.model_name)
    }
}
