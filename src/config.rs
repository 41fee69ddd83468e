//! Run configuration
//!
//! A [`DreamConfig`] can be loaded from a JSON file; missing fields take their
//! defaults, and the CLI overrides individual values on top.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dreamer::DreamParams;
use crate::error::{DreamError, Result};
use crate::jitter::{Jitter, DEFAULT_JITTER_FRACTION};

/// Everything needed to run a dream, short of the model and the media
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DreamConfig {
    /// Layer whose activation norm is maximized
    pub layer: String,
    pub octave_scale: f64,
    pub num_octaves: usize,
    pub iterations: usize,
    pub learning_rate: f64,
    /// Restrict the energy to these output channels (None = all)
    pub channels: Option<Vec<usize>>,
    /// Jitter bound as a fraction of each image dimension
    pub jitter_fraction: f64,
    /// Seed for the jitter sampler; fresh entropy when unset
    pub seed: Option<u64>,
}

impl Default for DreamConfig {
    fn default() -> Self {
        let params = DreamParams::default();
        Self {
            layer: "features.28".to_string(),
            octave_scale: params.octave_scale,
            num_octaves: params.num_octaves,
            iterations: params.iterations,
            learning_rate: params.learning_rate,
            channels: params.channels,
            jitter_fraction: DEFAULT_JITTER_FRACTION,
            seed: None,
        }
    }
}

impl DreamConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DreamError::io(path, e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            DreamError::InvalidArgument(format!("malformed config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Pyramid parameters
    pub fn params(&self) -> DreamParams {
        DreamParams {
            octave_scale: self.octave_scale,
            num_octaves: self.num_octaves,
            iterations: self.iterations,
            learning_rate: self.learning_rate,
            channels: self.channels.clone(),
        }
    }

    /// Jitter sampler described by this config
    pub fn jitter(&self) -> Jitter {
        match self.seed {
            Some(seed) => Jitter::seeded(seed, self.jitter_fraction),
            None => Jitter::from_entropy(self.jitter_fraction),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.layer.is_empty() {
            return Err(DreamError::InvalidArgument("layer name is empty".to_string()));
        }
        if !(0.0..1.0).contains(&self.jitter_fraction) {
            return Err(DreamError::InvalidArgument(format!(
                "jitter fraction must be in [0, 1), got {}",
                self.jitter_fraction
            )));
        }
        self.params().validate()
    }
}
