//! Octave ascent loop and multi-scale pyramid driver
//!
//! ## Algorithm
//!
//! For every octave, smallest first, the image is resized to the octave's size
//! and pushed uphill on the probed layer's energy:
//!
//! ```text
//! for each iteration:
//!     (dy, dx) = random jitter
//!     g        = d energy / d roll(image, dy, dx)
//!     image   += lr * roll(g, -dy, -dx)
//! ```
//!
//! Pixel values are never clipped or renormalized inside the loop; the only
//! range correction is the final byte scaling in [`Dreamer::deep_dream`].

use candle_core::Device;
use image::RgbImage;
use ndarray::Array3;
use tracing::{debug, info, warn};

use crate::context::ComputeContext;
use crate::error::{DreamError, Result};
use crate::gradient::extract_gradients;
use crate::jitter::Jitter;
use crate::network::{FeatureNetwork, LayerHandle};
use crate::probe::ActivationProbe;
use crate::schedule::{self, OctaveSchedule};
use crate::transforms::{self, Normalize, PixelTransform};

/// Parameters of one pyramid run
#[derive(Debug, Clone, PartialEq)]
pub struct DreamParams {
    /// Size ratio between neighbouring octaves
    pub octave_scale: f64,
    /// Octaves below full resolution
    pub num_octaves: usize,
    /// Ascent steps per octave (the same at every resolution)
    pub iterations: usize,
    pub learning_rate: f64,
    /// Restrict the energy to these output channels
    pub channels: Option<Vec<usize>>,
}

impl DreamParams {
    /// Same parameters with a different learning rate
    pub fn with_learning_rate(&self, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        schedule::validate(self.octave_scale)?;
        if !self.learning_rate.is_finite() {
            return Err(DreamError::InvalidArgument(format!(
                "learning rate must be finite, got {}",
                self.learning_rate
            )));
        }
        if matches!(&self.channels, Some(c) if c.is_empty()) {
            return Err(DreamError::InvalidArgument(
                "channel subset must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DreamParams {
    fn default() -> Self {
        Self {
            octave_scale: 1.4,
            num_octaves: 3,
            iterations: 10,
            learning_rate: 0.09,
            channels: None,
        }
    }
}

/// Gradient-ascent engine bound to one network
pub struct Dreamer<N: FeatureNetwork> {
    network: N,
    ctx: ComputeContext,
    preprocess: Box<dyn PixelTransform>,
    deprocess: Option<Box<dyn PixelTransform>>,
    jitter: Jitter,
}

impl<N: FeatureNetwork> Dreamer<N> {
    /// Create a dreamer.
    ///
    /// `preprocess` maps `[0, 1]` RGB tensors into the network's input
    /// convention; `deprocess`, when present, maps results back.
    pub fn new(
        network: N,
        ctx: ComputeContext,
        preprocess: Box<dyn PixelTransform>,
        deprocess: Option<Box<dyn PixelTransform>>,
    ) -> Self {
        if !network.device().same_device(ctx.device()) {
            warn!(
                "Network lives on {:?} but the compute context is {:?}; inputs will follow the context",
                network.device(),
                ctx.device()
            );
        }
        Self {
            network,
            ctx,
            preprocess,
            deprocess,
            jitter: Jitter::default(),
        }
    }

    /// Dreamer with torchvision ImageNet normalization on both ends
    pub fn imagenet(network: N, ctx: ComputeContext) -> Self {
        let normalize = Normalize::imagenet();
        let denormalize = normalize.inverse();
        Self::new(network, ctx, Box::new(normalize), Some(Box::new(denormalize)))
    }

    /// Replace the jitter sampler (e.g. with a seeded one)
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn context(&self) -> &ComputeContext {
        &self.ctx
    }

    /// Locate a layer of the underlying network by name
    pub fn resolve_layer(&self, name: &str) -> Result<LayerHandle> {
        self.network.resolve_layer(name)
    }

    /// Run the ascent loop at the image's current size.
    ///
    /// Returns a host `(h, w, c)` array, deprocessed if a deprocess transform
    /// is configured.
    pub fn dream_on_octave(
        &mut self,
        image: &Array3<f32>,
        layer: &LayerHandle,
        iterations: usize,
        learning_rate: f64,
        channels: Option<&[usize]>,
    ) -> Result<Array3<f32>> {
        let probe = self.network.attach_probe(layer)?;
        let dreamed = self.ascend(image, &probe, iterations, learning_rate, channels);
        probe.detach();
        dreamed
    }

    /// Full pyramid run without the final byte scaling
    pub fn deep_dream_raw(
        &mut self,
        image: &Array3<f32>,
        layer: &LayerHandle,
        params: &DreamParams,
    ) -> Result<Array3<f32>> {
        params.validate()?;
        let (height, width, _) = image.dim();
        let schedule = OctaveSchedule::new((height, width), params.octave_scale, params.num_octaves)?;

        let probe = self.network.attach_probe(layer)?;
        let mut current = image.to_owned();
        for (i, octave) in schedule.iter().enumerate() {
            info!(
                "Octave {}/{} ({}x{}) on {}",
                i + 1,
                schedule.len(),
                octave.width,
                octave.height,
                layer
            );
            current = transforms::resize(&current, octave.width, octave.height)?;
            current = self.ascend(
                &current,
                &probe,
                params.iterations,
                params.learning_rate,
                params.channels.as_deref(),
            )?;
        }
        probe.detach();

        Ok(current)
    }

    /// Full pyramid run, byte-scaled for display (`|x * 255|`, saturated)
    pub fn deep_dream(
        &mut self,
        image: &Array3<f32>,
        layer: &LayerHandle,
        params: &DreamParams,
    ) -> Result<Array3<u8>> {
        let dreamed = self.deep_dream_raw(image, layer, params)?;
        Ok(transforms::convert_scale_abs(&dreamed, 255.0))
    }

    /// [`Self::deep_dream`] on an 8-bit RGB image
    pub fn deep_dream_rgb(
        &mut self,
        image: &RgbImage,
        layer: &LayerHandle,
        params: &DreamParams,
    ) -> Result<RgbImage> {
        let input = transforms::rgb_to_array(image)?;
        let dreamed = self.deep_dream(&input, layer, params)?;
        transforms::array_to_rgb(&dreamed)
    }

    fn ascend(
        &mut self,
        image: &Array3<f32>,
        probe: &ActivationProbe,
        iterations: usize,
        learning_rate: f64,
        channels: Option<&[usize]>,
    ) -> Result<Array3<f32>> {
        let input = transforms::array_to_tensor(image, self.ctx.device())?;
        let mut image = self.preprocess.apply(&input)?;
        let (_, height, width) = image.dims3()?;

        for i in 0..iterations {
            let offsets = self.jitter.sample(height, width);
            let shifted = offsets.apply(&image)?;
            let step = extract_gradients(&self.network, probe, &self.ctx, &shifted, channels)?;
            let gradient = offsets.undo(&step.gradient)?;
            image = (image + gradient.affine(learning_rate, 0.0)?)?;

            debug!(
                "Iteration {}/{}: energy {:.4}, jitter ({}, {})",
                i + 1,
                iterations,
                step.energy,
                offsets.dy,
                offsets.dx
            );
        }

        let mut out = image.to_device(&Device::Cpu)?;
        if let Some(deprocess) = &self.deprocess {
            out = deprocess.apply(&out)?;
        }
        transforms::tensor_to_array(&out)
    }
}
