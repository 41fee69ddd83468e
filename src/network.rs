//! Feature-extraction network interface
//!
//! The dream core treats the network as an opaque differentiable function that
//! exposes named intermediate layers. Implementing [`FeatureNetwork`] is the only
//! requirement for dreaming with a new architecture.

use candle_core::{Device, Tensor};

use crate::error::{DreamError, Result};
use crate::probe::{ActivationProbe, ForwardHooks};

/// Resolved reference to one internal layer.
///
/// Only obtainable through [`FeatureNetwork::resolve_layer`] (or tests), so a
/// handle in hand always names a layer that existed when it was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerHandle {
    name: String,
    index: usize,
}

impl LayerHandle {
    pub(crate) fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }

    /// Layer path, e.g. `features.28`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position in the network's execution order
    pub fn index(&self) -> usize {
        self.index
    }
}

impl std::fmt::Display for LayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Unified interface for dreamable networks.
pub trait FeatureNetwork {
    // --- Metadata ---

    /// Names of all probe-able layers, in execution order
    fn layer_names(&self) -> Vec<String>;

    /// Device holding the network parameters
    fn device(&self) -> &Device;

    // --- Forward pass ---

    /// Run the network on a `(batch, channels, height, width)` input.
    ///
    /// Implementations must call [`ForwardHooks::notify`] on [`Self::hooks`]
    /// after every named layer.
    fn forward(&self, input: &Tensor) -> Result<Tensor>;

    /// Instrumentation registry for this instance
    fn hooks(&self) -> &ForwardHooks;

    /// Reset accumulated parameter gradients.
    ///
    /// candle builds a fresh gradient store on every backward pass, so the
    /// default has nothing to clear.
    fn zero_grad(&self) {}

    // --- Provided ---

    /// Locate a layer by name
    fn resolve_layer(&self, name: &str) -> Result<LayerHandle> {
        let names = self.layer_names();
        match names.iter().position(|n| n == name) {
            Some(index) => Ok(LayerHandle::new(name, index)),
            None => Err(DreamError::InvalidLayerHandle {
                layer: name.to_string(),
                available: names,
            }),
        }
    }

    /// Attach an activation probe to `layer`
    fn attach_probe(&self, layer: &LayerHandle) -> Result<ActivationProbe> {
        let names = self.layer_names();
        if names.get(layer.index()).map(String::as_str) != Some(layer.name()) {
            return Err(DreamError::InvalidLayerHandle {
                layer: layer.name().to_string(),
                available: names,
            });
        }
        Ok(self.hooks().register(layer))
    }
}
