//! Energy scalar and input gradients
//!
//! One forward + backward pass: the energy is the L2 norm of the probed layer's
//! activation (optionally restricted to a channel subset) and the result is its
//! gradient with respect to the input pixels.

use candle_core::{DType, IndexOp, Tensor, Var};
use tracing::trace;

use crate::context::ComputeContext;
use crate::error::{DreamError, Result};
use crate::network::FeatureNetwork;
use crate::probe::ActivationProbe;

/// Output of one gradient pass
#[derive(Debug, Clone)]
pub struct GradientStep {
    /// d(energy)/d(input), same shape as the input, no graph attached
    pub gradient: Tensor,
    /// Energy value the gradient was taken of
    pub energy: f32,
}

/// L2 norm of a single-sample activation `(channels, ...)`.
///
/// With `channels`, only the listed channel slices contribute.
pub fn activation_energy(activation: &Tensor, channels: Option<&[usize]>) -> Result<Tensor> {
    let selected = match channels {
        None => activation.clone(),
        Some([]) => {
            return Err(DreamError::InvalidArgument(
                "channel subset must not be empty".to_string(),
            ))
        }
        Some(channels) => {
            let available = activation.dim(0)?;
            if let Some(&channel) = channels.iter().find(|&&c| c >= available) {
                return Err(DreamError::InvalidChannel { channel, available });
            }
            let ids: Vec<u32> = channels.iter().map(|&c| c as u32).collect();
            let ids = Tensor::new(ids.as_slice(), activation.device())?;
            activation.index_select(&ids, 0)?
        }
    };
    Ok(selected.sqr()?.sum_all()?.sqrt()?)
}

/// Gradient of the probed layer's energy with respect to `input`.
///
/// `input` is a single `(channels, height, width)` image; it is batched
/// internally. Its values are left untouched: differentiation runs on a fresh
/// variable copy placed on the context's device.
pub fn extract_gradients<N: FeatureNetwork + ?Sized>(
    network: &N,
    probe: &ActivationProbe,
    ctx: &ComputeContext,
    input: &Tensor,
    channels: Option<&[usize]>,
) -> Result<GradientStep> {
    network.zero_grad();
    probe.clear();

    let input = input.to_device(ctx.device())?.to_dtype(ctx.dtype())?;
    let var = Var::from_tensor(&input)?;
    network.forward(&var.as_tensor().unsqueeze(0)?)?;

    let activation = probe.output()?;
    let energy = activation_energy(&activation.i(0)?, channels)?;
    let grads = energy.backward()?;

    let gradient = match grads.get(var.as_tensor()) {
        Some(grad) => grad.detach(),
        // The layer does not depend on the input at all.
        None => var.as_tensor().zeros_like()?,
    };
    let energy = energy.to_dtype(DType::F32)?.to_scalar::<f32>()?;
    trace!("Energy at {}: {:.6}", probe.layer(), energy);

    Ok(GradientStep { gradient, energy })
}
