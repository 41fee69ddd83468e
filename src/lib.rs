// Pedantic clippy configuration for image/tensor code
#![allow(clippy::cast_precision_loss)] // usize→f64/f32 intentional for pixel math
#![allow(clippy::cast_possible_truncation)] // f64→usize octave sizes truncate
#![allow(clippy::cast_possible_wrap)] // usize→i64 jitter offsets
#![allow(clippy::cast_sign_loss)] // f64→usize when value is known positive
#![allow(clippy::many_single_char_names)] // x, y, c standard for pixels
#![allow(clippy::similar_names)] // related variables like `dx`/`dy`
#![allow(clippy::module_name_repetitions)] // ConvNetConfig in convnet.rs is fine
// Documentation pedantic:
#![allow(clippy::doc_markdown)] // backticks for every technical term is excessive
#![allow(clippy::missing_errors_doc)] // # Errors section for every Result fn
#![allow(clippy::missing_panics_doc)] // # Panics section for every panic
// Method style pedantic:
#![allow(clippy::must_use_candidate)] // #[must_use] on every pure fn is excessive
#![allow(clippy::return_self_not_must_use)] // #[must_use] on Self returns
#![allow(clippy::needless_pass_by_value)] // value params for API flexibility

//! deepdream-rs: DeepDream feature visualization
//!
//! Amplifies whatever a chosen layer of a pretrained CNN responds to, by
//! gradient ascent on the input image over a coarse-to-fine octave pyramid.
//!
//! ## Architecture
//!
//! - `network`: FeatureNetwork trait and named LayerHandles
//! - `probe`: Forward hook registry and single-slot ActivationProbe
//! - `convnet`: Sequential CNN (VGG presets) loaded from safetensors / HuggingFace
//! - `context`: ComputeContext (device + dtype) chosen once per run
//! - `gradient`: Activation energy and its gradient with respect to the input
//! - `jitter`: Circular image shifts and the seeded offset sampler
//! - `schedule`: Octave schedule (coarse-to-fine image sizes)
//! - `transforms`: Normalization, resize, and host/tensor image conversion
//! - `dreamer`: Octave ascent loop and pyramid driver
//! - `sequence`: Per-frame video dreaming and learning-rate sweeps
//! - `video`: GIF / frame-directory decode and atomic encode
//! - `config`: JSON-loadable run configuration
//! - `error`: DreamError taxonomy

pub mod config;
pub mod context;
pub mod convnet;
pub mod dreamer;
pub mod error;
pub mod gradient;
pub mod jitter;
pub mod network;
pub mod probe;
pub mod schedule;
pub mod sequence;
pub mod transforms;
pub mod video;

#[cfg(test)]
mod testing;

pub use config::DreamConfig;
pub use context::ComputeContext;
pub use convnet::{ConvNet, ConvNetConfig, LayerConfig, VggVariant};
pub use dreamer::{DreamParams, Dreamer};
pub use error::{DreamError, Result};
pub use gradient::{activation_energy, extract_gradients, GradientStep};
pub use jitter::{roll, Jitter, JitterOffsets, DEFAULT_JITTER_FRACTION};
pub use network::{FeatureNetwork, LayerHandle};
pub use probe::{ActivationProbe, CapturedActivation, ForwardHooks};
pub use schedule::{Octave, OctaveSchedule};
pub use sequence::{linspace, ProgressiveOptions, SequenceSummary, VideoDreamOptions};
pub use transforms::{Denormalize, Identity, Normalize, PixelTransform};
pub use video::{load_image, read_frames, save_image, write_frames, FrameSize};
