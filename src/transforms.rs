//! Pixel transforms and host/device image conversion
//!
//! Host images are `(height, width, channels)` f32 arrays with pixel values in
//! `[0, 1]`. The network sees `(channels, height, width)` tensors in whatever
//! convention the caller's preprocess transform produces.

use candle_core::{DType, Device, Tensor};
use image::RgbImage;
use ndarray::Array3;

use crate::error::{DreamError, Result};

/// ImageNet channel means (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Caller-supplied conversion applied to a `(channels, height, width)` tensor.
///
/// Closures of the right shape implement it directly.
pub trait PixelTransform {
    fn apply(&self, image: &Tensor) -> Result<Tensor>;
}

impl<F> PixelTransform for F
where
    F: Fn(&Tensor) -> candle_core::Result<Tensor>,
{
    fn apply(&self, image: &Tensor) -> Result<Tensor> {
        Ok(self(image)?)
    }
}

/// No-op transform
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl PixelTransform for Identity {
    fn apply(&self, image: &Tensor) -> Result<Tensor> {
        Ok(image.clone())
    }
}

/// Per-channel `(x - mean) / std`
#[derive(Debug, Clone, PartialEq)]
pub struct Normalize {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl Normalize {
    pub fn new(mean: &[f32], std: &[f32]) -> Result<Self> {
        if mean.len() != std.len() {
            return Err(DreamError::InvalidArgument(format!(
                "normalization has {} means but {} standard deviations",
                mean.len(),
                std.len()
            )));
        }
        if std.iter().any(|&s| s == 0.0) {
            return Err(DreamError::InvalidArgument(
                "normalization standard deviation must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            mean: mean.to_vec(),
            std: std.to_vec(),
        })
    }

    /// Torchvision ImageNet statistics
    pub fn imagenet() -> Self {
        Self {
            mean: IMAGENET_MEAN.to_vec(),
            std: IMAGENET_STD.to_vec(),
        }
    }

    /// The matching deprocess transform
    pub fn inverse(&self) -> Denormalize {
        Denormalize {
            mean: self.mean.clone(),
            std: self.std.clone(),
        }
    }
}

impl PixelTransform for Normalize {
    fn apply(&self, image: &Tensor) -> Result<Tensor> {
        let (mean, std) = channel_stats(image, &self.mean, &self.std)?;
        Ok(image.broadcast_sub(&mean)?.broadcast_div(&std)?)
    }
}

/// Per-channel `x * std + mean`
#[derive(Debug, Clone, PartialEq)]
pub struct Denormalize {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl PixelTransform for Denormalize {
    fn apply(&self, image: &Tensor) -> Result<Tensor> {
        let (mean, std) = channel_stats(image, &self.mean, &self.std)?;
        Ok(image.broadcast_mul(&std)?.broadcast_add(&mean)?)
    }
}

fn channel_stats(image: &Tensor, mean: &[f32], std: &[f32]) -> Result<(Tensor, Tensor)> {
    let channels = image.dim(0)?;
    if channels != mean.len() {
        return Err(DreamError::InvalidImage(format!(
            "normalization expects {} channels, image has {channels}",
            mean.len()
        )));
    }
    let mean = Tensor::from_slice(mean, (channels, 1, 1), image.device())?.to_dtype(image.dtype())?;
    let std = Tensor::from_slice(std, (channels, 1, 1), image.device())?.to_dtype(image.dtype())?;
    Ok((mean, std))
}

/// Host `(h, w, c)` array to a `(c, h, w)` tensor on `device`
pub fn array_to_tensor(image: &Array3<f32>, device: &Device) -> Result<Tensor> {
    let (h, w, c) = image.dim();
    let data: Vec<f32> = image.iter().copied().collect();
    Ok(Tensor::from_vec(data, (h, w, c), device)?
        .permute((2, 0, 1))?
        .contiguous()?)
}

/// `(c, h, w)` tensor (any device) to a host `(h, w, c)` array
pub fn tensor_to_array(tensor: &Tensor) -> Result<Array3<f32>> {
    let hwc = tensor
        .to_device(&Device::Cpu)?
        .to_dtype(DType::F32)?
        .permute((1, 2, 0))?
        .contiguous()?;
    let (h, w, c) = hwc.dims3()?;
    let data: Vec<f32> = hwc.flatten_all()?.to_vec1()?;
    Array3::from_shape_vec((h, w, c), data).map_err(|e| DreamError::InvalidImage(e.to_string()))
}

/// Bilinear resize to `width` x `height`.
///
/// Values are interpolated, never clamped, so normalized images survive a
/// round trip between octaves.
pub fn resize(image: &Array3<f32>, width: usize, height: usize) -> Result<Array3<f32>> {
    let (src_h, src_w, channels) = image.dim();
    if src_h == 0 || src_w == 0 || width == 0 || height == 0 {
        return Err(DreamError::InvalidImage(format!(
            "cannot resize {src_w}x{src_h} to {width}x{height}"
        )));
    }
    if (src_h, src_w) == (height, width) {
        return Ok(image.to_owned());
    }

    let xs = sample_positions(src_w, width);
    let ys = sample_positions(src_h, height);
    let mut out = Array3::<f32>::zeros((height, width, channels));

    for (y, &(y0, y1, fy)) in ys.iter().enumerate() {
        for (x, &(x0, x1, fx)) in xs.iter().enumerate() {
            for c in 0..channels {
                let top = image[[y0, x0, c]] * (1.0 - fx) + image[[y0, x1, c]] * fx;
                let bottom = image[[y1, x0, c]] * (1.0 - fx) + image[[y1, x1, c]] * fx;
                out[[y, x, c]] = top * (1.0 - fy) + bottom * fy;
            }
        }
    }
    Ok(out)
}

// Half-pixel-centre source coordinates, clamped at the edges.
fn sample_positions(src: usize, dst: usize) -> Vec<(usize, usize, f32)> {
    let scale = src as f64 / dst as f64;
    (0..dst)
        .map(|i| {
            let pos = ((i as f64 + 0.5) * scale - 0.5).max(0.0);
            let i0 = (pos.floor() as usize).min(src - 1);
            let i1 = (i0 + 1).min(src - 1);
            let frac = (pos - i0 as f64).clamp(0.0, 1.0) as f32;
            (i0, i1, frac)
        })
        .collect()
}

/// `saturate(round(|x * alpha|))` into bytes
pub fn convert_scale_abs(image: &Array3<f32>, alpha: f32) -> Array3<u8> {
    // `as u8` saturates and maps NaN to 0.
    image.mapv(|v| (v * alpha).abs().round() as u8)
}

/// 8-bit RGB image to a `[0, 1]` host array
pub fn rgb_to_array(image: &RgbImage) -> Result<Array3<f32>> {
    let (w, h) = image.dimensions();
    let data: Vec<f32> = image.as_raw().iter().map(|&v| f32::from(v) / 255.0).collect();
    Array3::from_shape_vec((h as usize, w as usize, 3), data)
        .map_err(|e| DreamError::InvalidImage(e.to_string()))
}

/// 3-channel byte array to an RGB image
pub fn array_to_rgb(image: &Array3<u8>) -> Result<RgbImage> {
    let (h, w, c) = image.dim();
    if c != 3 {
        return Err(DreamError::InvalidImage(format!(
            "expected 3 channels, got {c}"
        )));
    }
    let data: Vec<u8> = image.iter().copied().collect();
    RgbImage::from_raw(w as u32, h as u32, data)
        .ok_or_else(|| DreamError::InvalidImage(format!("buffer does not fit {w}x{h}")))
}
