//! Forward hooks for activation capture
//!
//! A network owns one [`ForwardHooks`] registry and calls [`ForwardHooks::notify`]
//! after each named layer runs. Callers attach an [`ActivationProbe`] to a layer;
//! the probe is a single-slot holder overwritten on every forward pass and
//! removed from the registry on `detach()` or drop. There is no process-wide state:
//! each registry belongs to exactly one network instance.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use candle_core::Tensor;

use crate::error::{DreamError, Result};
use crate::network::LayerHandle;

/// Input and output of one layer for the most recent forward pass
#[derive(Debug, Clone)]
pub struct CapturedActivation {
    pub input: Tensor,
    pub output: Tensor,
}

type Slot = Rc<RefCell<Option<CapturedActivation>>>;

#[derive(Debug)]
struct HookEntry {
    id: u64,
    layer: String,
    slot: Slot,
}

type Registry = RefCell<Vec<HookEntry>>;

/// Per-network registry of attached probes
#[derive(Debug, Default)]
pub struct ForwardHooks {
    entries: Rc<Registry>,
    next_id: Cell<u64>,
}

impl ForwardHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer on `layer`.
    ///
    /// The handle is not validated here; networks go through
    /// [`FeatureNetwork::attach_probe`](crate::network::FeatureNetwork::attach_probe),
    /// which resolves it first.
    pub fn register(&self, layer: &LayerHandle) -> ActivationProbe {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let slot: Slot = Rc::new(RefCell::new(None));
        self.entries.borrow_mut().push(HookEntry {
            id,
            layer: layer.name().to_string(),
            slot: Rc::clone(&slot),
        });

        ActivationProbe {
            id,
            layer: layer.clone(),
            slot,
            registry: Rc::downgrade(&self.entries),
        }
    }

    /// Record `input`/`output` for every probe attached to `layer`.
    pub fn notify(&self, layer: &str, input: &Tensor, output: &Tensor) {
        for entry in self.entries.borrow().iter().filter(|e| e.layer == layer) {
            *entry.slot.borrow_mut() = Some(CapturedActivation {
                input: input.clone(),
                output: output.clone(),
            });
        }
    }

    /// Whether any probe is attached to `layer`
    pub fn is_observed(&self, layer: &str) -> bool {
        self.entries.borrow().iter().any(|e| e.layer == layer)
    }

    /// Number of attached probes
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

/// Handle to one attached observer.
///
/// Reads must follow a forward pass that reached the layer; otherwise they
/// return [`DreamError::MissingActivation`].
#[derive(Debug)]
pub struct ActivationProbe {
    id: u64,
    layer: LayerHandle,
    slot: Slot,
    registry: Weak<Registry>,
}

impl ActivationProbe {
    pub fn layer(&self) -> &LayerHandle {
        &self.layer
    }

    /// Forget the last capture, so a pass that skips the layer cannot be
    /// mistaken for one that reached it.
    pub fn clear(&self) {
        self.slot.borrow_mut().take();
    }

    pub fn captured(&self) -> Option<CapturedActivation> {
        self.slot.borrow().clone()
    }

    /// Layer output from the most recent forward pass
    pub fn output(&self) -> Result<Tensor> {
        self.captured()
            .map(|c| c.output)
            .ok_or_else(|| self.missing())
    }

    /// Layer input from the most recent forward pass
    pub fn input(&self) -> Result<Tensor> {
        self.captured()
            .map(|c| c.input)
            .ok_or_else(|| self.missing())
    }

    /// Remove the observer from its network.
    pub fn detach(self) {
        self.unregister();
    }

    fn missing(&self) -> DreamError {
        DreamError::MissingActivation {
            layer: self.layer.name().to_string(),
        }
    }

    fn unregister(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().retain(|e| e.id != self.id);
        }
    }
}

impl Drop for ActivationProbe {
    fn drop(&mut self) {
        self.unregister();
    }
}
