use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::{Array1, Array3, Array4, Axis};

use crate::error::{Result, ServiceError};
use crate::models::PayloadItem;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Where to look for the image bytes inside a payload item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadKey<'a> {
    Declared(&'a str),
    Body,
    Data,
}

impl PayloadKey<'_> {
    fn lookup<'p>(&self, item: &'p PayloadItem) -> Option<&'p [u8]> {
        let key = match self {
            PayloadKey::Declared(name) => *name,
            PayloadKey::Body => "body",
            PayloadKey::Data => "data",
        };
        item.get(key).map(Vec::as_slice)
    }
}

/// Key strategies in lookup order for an input declared as `data_name`.
pub fn payload_keys(data_name: &str) -> [PayloadKey<'_>; 3] {
    [PayloadKey::Declared(data_name), PayloadKey::Body, PayloadKey::Data]
}

/// Pulls the image buffer out of the first payload item. The first key
/// present wins, even when its value is empty.
pub fn extract_image<'p>(data: &'p [PayloadItem], data_name: &str) -> Result<&'p [u8]> {
    let item = data
        .first()
        .ok_or_else(|| ServiceError::InvalidParameter("empty request".into()))?;

    let img = payload_keys(data_name)
        .iter()
        .find_map(|key| key.lookup(item))
        .ok_or_else(|| {
            ServiceError::InvalidParameter(format!("no '{}', 'body' or 'data' entry", data_name))
        })?;

    if img.is_empty() {
        return Err(ServiceError::InvalidParameter("image buffer is empty".into()));
    }
    Ok(img)
}

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    Ok(image::load_from_memory(bytes)?)
}

/// Turns a decoded image into a `(1, 3, height, width)` normalized tensor.
pub fn image_to_tensor(img: &DynamicImage, height: u32, width: u32) -> Result<Array4<f32>> {
    let resized = img.resize_exact(width, height, FilterType::Triangle).to_rgb8();
    let shape = (height as usize, width as usize, 3);

    let hwc = Array3::from_shape_vec(shape, resized.into_raw().into_iter().map(f32::from).collect())
        .map_err(|e| ServiceError::ShapeMismatch {
            shape: vec![shape.0, shape.1, shape.2],
            reason: e.to_string(),
        })?;

    let chw = normalize(hwc / 255.0).permuted_axes([2, 0, 1]);
    Ok(chw.insert_axis(Axis(0)).as_standard_layout().into_owned())
}

/// Channel-wise `(x - mean) / std` over an HWC tensor.
pub fn normalize(hwc: Array3<f32>) -> Array3<f32> {
    let mean = Array1::from(IMAGENET_MEAN.to_vec());
    let std = Array1::from(IMAGENET_STD.to_vec());
    (hwc - &mean) / &std
}
