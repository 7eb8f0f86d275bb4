//! Fixtures shared by the unit tests.

use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use ndarray::{Array2, Array4, ArrayD};
use tempfile::TempDir;

use crate::error::Result;
use crate::models::{Device, PayloadItem};
use crate::network::Network;
use crate::service::{SIGNATURE_FILE, SYNSET_FILE};

/// Network double that returns the same logits for every batch row.
pub struct FixedLogits {
    logits: Vec<f32>,
    loads: Arc<AtomicUsize>,
    forwards: Arc<AtomicUsize>,
}

impl FixedLogits {
    pub fn new(logits: Vec<f32>) -> Self {
        FixedLogits {
            logits,
            loads: Arc::new(AtomicUsize::new(0)),
            forwards: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn load_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.loads)
    }

    pub fn forward_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.forwards)
    }
}

impl Network for FixedLogits {
    fn load_parameters(&mut self, _path: &Path, _device: Device, _input_shape: &[usize]) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn forward(&self, input: Array4<f32>) -> Result<ArrayD<f32>> {
        self.forwards.fetch_add(1, Ordering::SeqCst);
        let batch = input.shape()[0];
        let n = self.logits.len();
        let out = Array2::from_shape_fn((batch, n), |(_, j)| self.logits[j]);
        Ok(out.into_dyn())
    }
}

/// Model directory holding a 16x16 signature, the given synset and an
/// optional placeholder parameter file.
pub fn model_dir(labels: &[&str], param_file: Option<&str>) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let signature = serde_json::json!({
        "inputs": [{"data_name": "data", "data_shape": [1, 3, 16, 16]}],
        "input_type": "image/png",
        "output_type": "application/json"
    });
    fs::write(dir.path().join(SIGNATURE_FILE), signature.to_string()).unwrap();
    fs::write(dir.path().join(SYNSET_FILE), labels.join("\n")).unwrap();
    if let Some(file) = param_file {
        fs::write(dir.path().join(file), b"weights").unwrap();
    }
    dir
}

pub fn payload(key: &str, bytes: Vec<u8>) -> Vec<PayloadItem> {
    vec![[(key.to_string(), bytes)].into_iter().collect()]
}

fn encode_png(img: RgbImage) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
        .unwrap();
    buf
}

/// Gradient PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_png(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
    }))
}

pub fn solid_png_bytes(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    encode_png(RgbImage::from_pixel(width, height, Rgb(rgb)))
}
