//! Shared fixtures for unit tests

use std::collections::HashMap;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;

use crate::convnet::{ConvNet, ConvNetConfig, LayerConfig};

/// 3->2 channel 3x3 conv + ReLU with fixed weights.
///
/// Biases are positive, so the ReLU output (`features.1`) is non-zero for an
/// all-zero image.
pub(crate) fn tiny_network(device: &Device) -> ConvNet {
    let config = ConvNetConfig {
        prefix: "features".into(),
        layers: vec![
            LayerConfig::Conv2d {
                in_channels: 3,
                out_channels: 2,
                kernel_size: 3,
                stride: 1,
                padding: 1,
            },
            LayerConfig::Relu,
        ],
    };

    let weight: Vec<f32> = (0..54).map(|i| (i as f32 * 0.37).sin() * 0.2).collect();
    let mut tensors = HashMap::new();
    tensors.insert(
        "features.0.weight".to_string(),
        Tensor::from_vec(weight, (2, 3, 3, 3), device).unwrap(),
    );
    tensors.insert(
        "features.0.bias".to_string(),
        Tensor::new(&[0.5f32, 0.25], device).unwrap(),
    );

    let vb = VarBuilder::from_tensors(tensors, DType::F32, device);
    ConvNet::new(&config, vb).unwrap()
}
