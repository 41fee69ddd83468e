//! Sequential convolutional feature extractor with per-layer hooks
//!
//! Runs layer-by-layer so any named layer can be observed. Layer names follow
//! the torchvision `features.N` convention, which is also how VGG checkpoints
//! on the HuggingFace hub name their tensors.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use candle_core::{Device, Module, Tensor};
use candle_nn::{conv2d, Conv2d, Conv2dConfig, VarBuilder};
use hf_hub::{api::sync::Api, Repo, RepoType};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::ComputeContext;
use crate::error::DreamError;
use crate::network::FeatureNetwork;
use crate::probe::ForwardHooks;

/// One layer of the feature stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerConfig {
    Conv2d {
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        #[serde(default = "default_stride")]
        stride: usize,
        #[serde(default)]
        padding: usize,
    },
    Relu,
    MaxPool2d {
        kernel_size: usize,
        stride: usize,
    },
}

fn default_stride() -> usize {
    1
}

fn default_prefix() -> String {
    "features".to_string()
}

/// Network layout (serializable so custom stacks can ship as JSON next to weights)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvNetConfig {
    /// Tensor name prefix, e.g. `features`
    #[serde(default = "default_prefix")]
    pub prefix: String,
    pub layers: Vec<LayerConfig>,
}

/// VGG feature-stack variants (torchvision configurations A, B, D, E)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VggVariant {
    Vgg11,
    Vgg13,
    Vgg16,
    Vgg19,
}

impl VggVariant {
    /// Detect variant from a model ID, defaulting to VGG16
    pub fn from_model_id(model_id: &str) -> Self {
        let lower = model_id.to_lowercase();
        if lower.contains("vgg11") {
            VggVariant::Vgg11
        } else if lower.contains("vgg13") {
            VggVariant::Vgg13
        } else if lower.contains("vgg19") {
            VggVariant::Vgg19
        } else {
            if !lower.contains("vgg16") {
                info!("Unknown VGG variant for '{}', defaulting to VGG16", model_id);
            }
            VggVariant::Vgg16
        }
    }

    // `None` marks a 2x2 max-pool.
    fn plan(self) -> Vec<Option<usize>> {
        const M: Option<usize> = None;
        let c = Some;
        match self {
            VggVariant::Vgg11 => vec![
                c(64), M, c(128), M, c(256), c(256), M, c(512), c(512), M, c(512), c(512), M,
            ],
            VggVariant::Vgg13 => vec![
                c(64), c(64), M, c(128), c(128), M, c(256), c(256), M, c(512), c(512), M,
                c(512), c(512), M,
            ],
            VggVariant::Vgg16 => vec![
                c(64), c(64), M, c(128), c(128), M, c(256), c(256), c(256), M, c(512), c(512),
                c(512), M, c(512), c(512), c(512), M,
            ],
            VggVariant::Vgg19 => vec![
                c(64), c(64), M, c(128), c(128), M, c(256), c(256), c(256), c(256), M, c(512),
                c(512), c(512), c(512), M, c(512), c(512), c(512), c(512), M,
            ],
        }
    }
}

impl FromStr for VggVariant {
    type Err = DreamError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vgg11" => Ok(VggVariant::Vgg11),
            "vgg13" => Ok(VggVariant::Vgg13),
            "vgg16" => Ok(VggVariant::Vgg16),
            "vgg19" => Ok(VggVariant::Vgg19),
            other => Err(DreamError::InvalidArgument(format!(
                "unknown architecture '{other}' (expected vgg11, vgg13, vgg16 or vgg19)"
            ))),
        }
    }
}

impl ConvNetConfig {
    /// VGG feature stack: every conv is 3x3/pad 1 followed by ReLU
    pub fn vgg(variant: VggVariant) -> Self {
        let mut layers = Vec::new();
        let mut in_channels = 3;
        for entry in variant.plan() {
            match entry {
                Some(out_channels) => {
                    layers.push(LayerConfig::Conv2d {
                        in_channels,
                        out_channels,
                        kernel_size: 3,
                        stride: 1,
                        padding: 1,
                    });
                    layers.push(LayerConfig::Relu);
                    in_channels = out_channels;
                }
                None => layers.push(LayerConfig::MaxPool2d {
                    kernel_size: 2,
                    stride: 2,
                }),
            }
        }
        Self {
            prefix: default_prefix(),
            layers,
        }
    }

    /// Load a custom layout from a JSON file
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read network config {}", path.display()))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Layer names in execution order
    pub fn layer_names(&self) -> Vec<String> {
        (0..self.layers.len())
            .map(|i| format!("{}.{i}", self.prefix))
            .collect()
    }
}

enum Layer {
    Conv(Conv2d),
    Relu,
    MaxPool { kernel_size: usize, stride: usize },
}

impl Layer {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Layer::Conv(conv) => conv.forward(x),
            Layer::Relu => x.relu(),
            Layer::MaxPool {
                kernel_size,
                stride,
            } => x.max_pool2d_with_stride(*kernel_size, *stride),
        }
    }
}

/// Feature extractor with per-layer activation hooks
pub struct ConvNet {
    layers: Vec<(String, Layer)>,
    hooks: ForwardHooks,
    device: Device,
    config: ConvNetConfig,
}

impl ConvNet {
    /// Build from a layout and a weight source
    pub fn new(config: &ConvNetConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let device = vb.device().clone();
        let vb = vb.pp(&config.prefix);
        let names = config.layer_names();

        let mut layers = Vec::with_capacity(config.layers.len());
        for (i, (layer_config, name)) in config.layers.iter().zip(names).enumerate() {
            let layer = match layer_config {
                LayerConfig::Conv2d {
                    in_channels,
                    out_channels,
                    kernel_size,
                    stride,
                    padding,
                } => {
                    let cfg = Conv2dConfig {
                        padding: *padding,
                        stride: *stride,
                        ..Default::default()
                    };
                    Layer::Conv(conv2d(
                        *in_channels,
                        *out_channels,
                        *kernel_size,
                        cfg,
                        vb.pp(i.to_string()),
                    )?)
                }
                LayerConfig::Relu => Layer::Relu,
                LayerConfig::MaxPool2d {
                    kernel_size,
                    stride,
                } => Layer::MaxPool {
                    kernel_size: *kernel_size,
                    stride: *stride,
                },
            };
            layers.push((name, layer));
        }

        Ok(Self {
            layers,
            hooks: ForwardHooks::new(),
            device,
            config: config.clone(),
        })
    }

    /// Load weights from local safetensors file(s)
    pub fn from_safetensors(
        paths: &[PathBuf],
        config: &ConvNetConfig,
        ctx: &ComputeContext,
    ) -> Result<Self> {
        info!("Loading weights from {} file(s)...", paths.len());
        // SAFETY: the files are treated as read-only for the lifetime of the mapping.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(paths, ctx.dtype(), ctx.device())? };
        let net = Self::new(config, vb).context("Failed to build network from weights")?;
        info!(
            "Network loaded with {} layers on {:?}",
            net.layers.len(),
            ctx.device()
        );
        Ok(net)
    }

    /// Load from HuggingFace (e.g. `timm/vgg16.tv_in1k`)
    pub fn from_pretrained(
        model_id: &str,
        config: &ConvNetConfig,
        ctx: &ComputeContext,
    ) -> Result<Self> {
        info!("Loading network: {}", model_id);

        let api = Api::new()?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));
        let weights = repo
            .get("model.safetensors")
            .context("Failed to download model.safetensors")?;

        Self::from_safetensors(&[weights], config, ctx)
    }

    pub fn config(&self) -> &ConvNetConfig {
        &self.config
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }
}

impl FeatureNetwork for ConvNet {
    fn layer_names(&self) -> Vec<String> {
        self.layers.iter().map(|(name, _)| name.clone()).collect()
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn forward(&self, input: &Tensor) -> crate::Result<Tensor> {
        let mut hidden = input.clone();
        for (name, layer) in &self.layers {
            let out = layer.forward(&hidden)?;
            self.hooks.notify(name, &hidden, &out);
            hidden = out;
        }
        Ok(hidden)
    }

    fn hooks(&self) -> &ForwardHooks {
        &self.hooks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    #[test]
    fn test_vgg16_layout() {
        let config = ConvNetConfig::vgg(VggVariant::Vgg16);
        // 13 conv + 13 relu + 5 pool
        assert_eq!(config.layers.len(), 31);

        let names = config.layer_names();
        assert_eq!(names[0], "features.0");
        assert_eq!(names[28], "features.28");
        assert!(matches!(
            config.layers[28],
            LayerConfig::Conv2d {
                in_channels: 512,
                out_channels: 512,
                ..
            }
        ));
        assert!(matches!(config.layers[30], LayerConfig::MaxPool2d { .. }));
    }

    #[test]
    fn test_vgg_variant_parsing() {
        assert_eq!(
            VggVariant::from_model_id("timm/vgg19.tv_in1k"),
            VggVariant::Vgg19
        );
        assert_eq!(VggVariant::from_model_id("someone/net"), VggVariant::Vgg16);
        assert_eq!("VGG11".parse::<VggVariant>().unwrap(), VggVariant::Vgg11);
        assert!("resnet50".parse::<VggVariant>().is_err());
    }

    #[test]
    fn test_config_json() {
        let json = r#"{
            "layers": [
                {"type": "conv2d", "in_channels": 3, "out_channels": 4, "kernel_size": 3, "padding": 1},
                {"type": "relu"},
                {"type": "max_pool2d", "kernel_size": 2, "stride": 2}
            ]
        }"#;
        let config: ConvNetConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.prefix, "features");
        assert_eq!(
            config.layers[0],
            LayerConfig::Conv2d {
                in_channels: 3,
                out_channels: 4,
                kernel_size: 3,
                stride: 1,
                padding: 1,
            }
        );
    }

    #[test]
    fn test_forward_notifies_hooks() {
        let device = Device::Cpu;
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
                LayerConfig::MaxPool2d {
                    kernel_size: 2,
                    stride: 2,
                },
            ],
        };
        let vb = VarBuilder::zeros(DType::F32, &device);
        let net = ConvNet::new(&config, vb).unwrap();

        let layer = net.resolve_layer("features.1").unwrap();
        let probe = net.attach_probe(&layer).unwrap();

        let input = Tensor::ones((1, 3, 8, 8), DType::F32, &device).unwrap();
        let out = net.forward(&input).unwrap();
        assert_eq!(out.dims(), &[1, 2, 4, 4]);

        let captured = probe.captured().unwrap();
        assert_eq!(captured.input.dims(), &[1, 2, 8, 8]);
        assert_eq!(captured.output.dims(), &[1, 2, 8, 8]);
    }
}
