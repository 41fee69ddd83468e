//! Multi-frame drivers: per-frame video dreaming and learning-rate sweeps

use std::path::Path;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dreamer::{DreamParams, Dreamer};
use crate::error::{DreamError, Result};
use crate::network::{FeatureNetwork, LayerHandle};
use crate::video::{self, FrameSize};

/// Decode/encode settings for [`Dreamer::deep_dream_on_video`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDreamOptions {
    /// Keep every `skip_value`-th source frame
    pub skip_value: usize,
    /// Resize frames right after decoding
    pub resize: Option<FrameSize>,
    /// Encoded frame size; defaults to the first dreamed frame's size
    pub size: Option<FrameSize>,
    pub framerate: u32,
}

impl Default for VideoDreamOptions {
    fn default() -> Self {
        Self {
            skip_value: 1,
            resize: None,
            size: None,
            framerate: 30,
        }
    }
}

impl VideoDreamOptions {
    /// Reject settings that would only fail once every frame is dreamed
    pub fn validate(&self) -> Result<()> {
        if self.skip_value == 0 {
            return Err(DreamError::InvalidArgument(
                "skip value must be at least 1".to_string(),
            ));
        }
        if let Some(resize) = self.resize.filter(|s| s.width == 0 || s.height == 0) {
            return Err(DreamError::InvalidArgument(format!(
                "cannot resize frames to {resize}"
            )));
        }
        video::check_encoding(self.size, self.framerate)
    }
}

/// Learning-rate sweep settings for [`Dreamer::progressive_deep_dream`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressiveOptions {
    pub lower_lr: f64,
    pub upper_lr: f64,
    /// Number of output frames, one per learning rate
    pub num_steps: usize,
    pub framerate: u32,
    /// Resize the source image before dreaming
    pub size: Option<FrameSize>,
}

impl Default for ProgressiveOptions {
    fn default() -> Self {
        Self {
            lower_lr: 0.01,
            upper_lr: 0.2,
            num_steps: 30,
            framerate: 15,
            size: None,
        }
    }
}

impl ProgressiveOptions {
    pub fn validate(&self) -> Result<()> {
        if self.num_steps == 0 {
            return Err(DreamError::InvalidArgument(
                "number of steps must be at least 1".to_string(),
            ));
        }
        video::check_encoding(self.size, self.framerate)
    }
}

/// What a sequence run wrote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceSummary {
    pub frames: usize,
    pub size: FrameSize,
    pub framerate: u32,
}

/// `n` evenly spaced values from `lower` to `upper`, both inclusive.
///
/// A single step yields `[lower]`.
pub fn linspace(lower: f64, upper: f64, n: usize) -> Result<Vec<f64>> {
    match n {
        0 => Err(DreamError::InvalidArgument(
            "number of steps must be at least 1".to_string(),
        )),
        1 => Ok(vec![lower]),
        _ => {
            let step = (upper - lower) / (n - 1) as f64;
            let mut values: Vec<f64> = (0..n).map(|i| lower + step * i as f64).collect();
            values[n - 1] = upper;
            Ok(values)
        }
    }
}

impl<N: FeatureNetwork> Dreamer<N> {
    /// Dream every kept frame of a video independently and encode the results.
    ///
    /// Nothing is written unless every frame succeeds.
    pub fn deep_dream_on_video(
        &mut self,
        video_path: &Path,
        save_path: &Path,
        layer: &LayerHandle,
        params: &DreamParams,
        options: &VideoDreamOptions,
    ) -> Result<SequenceSummary> {
        params.validate()?;
        options.validate()?;
        let frames = video::read_frames(video_path, options.skip_value, options.resize)?;
        if frames.is_empty() {
            return Err(DreamError::InvalidImage(format!(
                "{} contains no frames",
                video_path.display()
            )));
        }

        let mut dreamed = Vec::with_capacity(frames.len());
        for (i, frame) in frames.iter().enumerate() {
            info!("Dreaming frame {}/{}", i + 1, frames.len());
            dreamed.push(self.deep_dream_rgb(frame, layer, params)?);
        }

        let size = match options.size {
            Some(size) => size,
            None => FrameSize::of(&dreamed[0]),
        };
        video::write_frames(&dreamed, save_path, size, options.framerate)?;

        Ok(SequenceSummary {
            frames: dreamed.len(),
            size,
            framerate: options.framerate,
        })
    }

    /// Dream the same image once per learning rate in
    /// `linspace(lower_lr, upper_lr, num_steps)` and encode the frames in order.
    ///
    /// Every frame starts from the original image; `params.learning_rate` is
    /// replaced by the swept value.
    pub fn progressive_deep_dream(
        &mut self,
        image: &RgbImage,
        save_path: &Path,
        layer: &LayerHandle,
        params: &DreamParams,
        options: &ProgressiveOptions,
    ) -> Result<SequenceSummary> {
        options.validate()?;
        let rates = linspace(options.lower_lr, options.upper_lr, options.num_steps)?;
        for &lr in &rates {
            params.with_learning_rate(lr).validate()?;
        }

        let source = match options.size {
            Some(size) => video::resize_frame(image, size),
            None => image.clone(),
        };
        let size = FrameSize::of(&source);

        let mut frames = Vec::with_capacity(rates.len());
        for (i, &lr) in rates.iter().enumerate() {
            info!("Progressive step {}/{}: learning rate {:.4}", i + 1, rates.len(), lr);
            frames.push(self.deep_dream_rgb(&source, layer, &params.with_learning_rate(lr))?);
        }

        video::write_frames(&frames, save_path, size, options.framerate)?;

        Ok(SequenceSummary {
            frames: frames.len(),
            size,
            framerate: options.framerate,
        })
    }
}
