//! Integration tests for deepdream-rs
//!
//! Note: Tests marked with #[ignore] require a model download.
//! Run them explicitly with: cargo test --ignored

use std::collections::HashMap;
use std::io::Write;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use deepdream_rs::transforms::{array_to_tensor, tensor_to_array};
use deepdream_rs::{
    extract_gradients, linspace, read_frames, write_frames, ComputeContext, ConvNet,
    ConvNetConfig, DreamConfig, DreamError, DreamParams, Dreamer, FeatureNetwork, FrameSize,
    Identity, Jitter, LayerConfig, ProgressiveOptions, VideoDreamOptions,
};
use image::{Rgb, RgbImage};
use ndarray::Array3;
use tempfile::NamedTempFile;

fn tiny_config() -> ConvNetConfig {
    ConvNetConfig {
        prefix: "features".into(),
        layers: vec![
            LayerConfig::Conv2d {
                in_channels: 3,
                out_channels: 4,
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
    }
}

fn tiny_tensors(device: &Device) -> HashMap<String, Tensor> {
    let weight: Vec<f32> = (0..108).map(|i| (i as f32 * 0.61).cos() * 0.15).collect();
    let mut tensors = HashMap::new();
    tensors.insert(
        "features.0.weight".to_string(),
        Tensor::from_vec(weight, (4, 3, 3, 3), device).unwrap(),
    );
    tensors.insert(
        "features.0.bias".to_string(),
        Tensor::new(&[0.3f32, 0.1, 0.2, 0.4], device).unwrap(),
    );
    tensors
}

fn tiny_network() -> ConvNet {
    let device = Device::Cpu;
    let vb = VarBuilder::from_tensors(tiny_tensors(&device), DType::F32, &device);
    ConvNet::new(&tiny_config(), vb).unwrap()
}

fn plain_dreamer(jitter: Jitter) -> Dreamer<ConvNet> {
    Dreamer::new(tiny_network(), ComputeContext::cpu(), Box::new(Identity), None).with_jitter(jitter)
}

fn single_step(learning_rate: f64) -> DreamParams {
    DreamParams {
        octave_scale: 1.0,
        num_octaves: 0,
        iterations: 1,
        learning_rate,
        channels: None,
    }
}

fn pattern(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 11 % 256) as u8, ((x + y) * 3 % 256) as u8])
    })
}

/// One unjittered step on a zero image moves pixels by exactly lr * gradient
#[test]
fn test_single_step_equals_scaled_gradient() {
    let lr = 0.01;
    let mut dreamer = plain_dreamer(Jitter::seeded(0, 0.0));
    let layer = dreamer.resolve_layer("features.2").unwrap();

    let image = Array3::<f32>::zeros((224, 224, 3));
    let dreamed = dreamer.deep_dream_raw(&image, &layer, &single_step(lr)).unwrap();
    assert_eq!(dreamed.dim(), (224, 224, 3));

    let net = dreamer.network();
    let probe = net.attach_probe(&layer).unwrap();
    let input = array_to_tensor(&image, &Device::Cpu).unwrap();
    let step = extract_gradients(net, &probe, dreamer.context(), &input, None).unwrap();
    let gradient = tensor_to_array(&step.gradient).unwrap();

    let max_diff = dreamed.iter().fold(0f32, |m, v| m.max(v.abs()));
    let max_grad = gradient.iter().fold(0f32, |m, v| m.max(v.abs()));
    assert!(max_diff > 0.0);
    assert!((max_diff - lr as f32 * max_grad).abs() < 1e-6);

    for (d, g) in dreamed.iter().zip(gradient.iter()) {
        assert!((d - lr as f32 * g).abs() < 1e-6);
    }
}

#[test]
fn test_rgb_dream_keeps_size_and_is_seeded() {
    let image = pattern(40, 30);
    let params = DreamParams {
        octave_scale: 1.4,
        num_octaves: 2,
        iterations: 2,
        learning_rate: 0.05,
        channels: Some(vec![0, 3]),
    };

    let run = |seed| {
        let mut dreamer = plain_dreamer(Jitter::seeded(seed, 0.05));
        let layer = dreamer.resolve_layer("features.1").unwrap();
        dreamer.deep_dream_rgb(&image, &layer, &params).unwrap()
    };

    let a = run(9);
    assert_eq!(a.dimensions(), (40, 30));
    assert_eq!(a, run(9));
}

#[test]
fn test_unknown_layer_is_rejected() {
    let dreamer = plain_dreamer(Jitter::seeded(0, 0.05));
    match dreamer.resolve_layer("features.99") {
        Err(DreamError::InvalidLayerHandle { layer, available }) => {
            assert_eq!(layer, "features.99");
            assert_eq!(available.len(), 3);
        }
        other => panic!("expected InvalidLayerHandle, got {other:?}"),
    }
}

#[test]
fn test_weights_from_safetensors_file() {
    let device = Device::Cpu;
    let tmp = tempfile::tempdir().unwrap();
    let weights = tmp.path().join("model.safetensors");
    candle_core::safetensors::save(&tiny_tensors(&device), &weights).unwrap();

    let net = ConvNet::from_safetensors(&[weights], &tiny_config(), &ComputeContext::cpu()).unwrap();
    assert_eq!(net.layer_names(), vec!["features.0", "features.1", "features.2"]);

    let out = net
        .forward(&Tensor::zeros((1, 3, 8, 8), DType::F32, &device).unwrap())
        .unwrap();
    assert_eq!(out.dims(), &[1, 4, 4, 4]);
}

#[test]
fn test_network_config_from_json() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"{{
        "layers": [
            {{"type": "conv2d", "in_channels": 3, "out_channels": 8, "kernel_size": 3, "padding": 1}},
            {{"type": "relu"}},
            {{"type": "max_pool2d", "kernel_size": 2, "stride": 2}}
        ]
    }}"#
    )
    .unwrap();

    let config = ConvNetConfig::load(file.path()).unwrap();
    assert_eq!(config.prefix, "features");
    assert_eq!(config.layer_names().len(), 3);
    assert!(matches!(
        config.layers[0],
        LayerConfig::Conv2d { stride: 1, out_channels: 8, .. }
    ));
}

#[test]
fn test_video_skip_through_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("frames_in");
    std::fs::create_dir(&src).unwrap();
    for i in 0..5 {
        pattern(12, 10).save(src.join(format!("{i:03}.png"))).unwrap();
    }
    let out = tmp.path().join("frames_out");

    let mut dreamer = plain_dreamer(Jitter::seeded(1, 0.05));
    let layer = dreamer.resolve_layer("features.1").unwrap();
    let options = VideoDreamOptions {
        skip_value: 2,
        size: Some(FrameSize::new(6, 5)),
        ..VideoDreamOptions::default()
    };
    let summary = dreamer
        .deep_dream_on_video(&src, &out, &layer, &single_step(0.02), &options)
        .unwrap();
    assert_eq!(summary.frames, 3);

    let written = read_frames(&out, 1, None).unwrap();
    assert_eq!(written.len(), 3);
    assert!(written.iter().all(|f| f.dimensions() == (6, 5)));
}

#[test]
fn test_progressive_single_step_gif() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("sweep.gif");
    let image = pattern(16, 12);

    let mut dreamer = plain_dreamer(Jitter::seeded(2, 0.0));
    let layer = dreamer.resolve_layer("features.1").unwrap();
    let options = ProgressiveOptions {
        lower_lr: 0.03,
        upper_lr: 0.5,
        num_steps: 1,
        framerate: 10,
        size: None,
    };
    let summary = dreamer
        .progressive_deep_dream(&image, &out, &layer, &single_step(0.0), &options)
        .unwrap();
    assert_eq!(summary.frames, 1);
    assert_eq!(linspace(0.03, 0.5, 1).unwrap(), vec![0.03]);

    // The only frame is a plain dream at the lower learning rate, encoded the same way.
    let mut reference = plain_dreamer(Jitter::seeded(2, 0.0));
    let expected = reference
        .deep_dream_rgb(&image, &layer, &single_step(0.03))
        .unwrap();
    let expected_path = tmp.path().join("expected.gif");
    write_frames(&[expected], &expected_path, FrameSize::new(16, 12), 10).unwrap();

    assert_eq!(
        read_frames(&out, 1, None).unwrap(),
        read_frames(&expected_path, 1, None).unwrap()
    );
}

#[test]
fn test_failed_run_leaves_no_output() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("in");
    std::fs::create_dir(&src).unwrap();
    pattern(8, 8).save(src.join("0.png")).unwrap();
    let out = tmp.path().join("out.gif");

    let mut dreamer = plain_dreamer(Jitter::seeded(3, 0.05));
    let layer = dreamer.resolve_layer("features.1").unwrap();
    let params = DreamParams {
        channels: Some(vec![17]),
        ..single_step(0.01)
    };
    let err = dreamer
        .deep_dream_on_video(&src, &out, &layer, &params, &VideoDreamOptions::default())
        .unwrap_err();
    assert!(matches!(err, DreamError::InvalidChannel { channel: 17, available: 4 }));
    assert!(!out.exists());
}

#[test]
fn test_dream_config_round_trip() {
    let mut file = NamedTempFile::new().unwrap();
    let config = DreamConfig {
        layer: "features.1".into(),
        iterations: 3,
        seed: Some(42),
        ..DreamConfig::default()
    };
    write!(file, "{}", serde_json::to_string_pretty(&config).unwrap()).unwrap();

    let loaded = DreamConfig::load(file.path()).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.params().iterations, 3);
}

/// Full VGG16 dream on a small image
#[test]
#[ignore = "requires model download"]
fn test_pretrained_vgg16_dream() {
    let ctx = ComputeContext::cpu();
    let config = ConvNetConfig::vgg(deepdream_rs::VggVariant::Vgg16);
    let net = ConvNet::from_pretrained("timm/vgg16.tv_in1k", &config, &ctx).unwrap();
    assert_eq!(net.n_layers(), 31);

    let mut dreamer = Dreamer::imagenet(net, ctx).with_jitter(Jitter::seeded(0, 0.05));
    let layer = dreamer.resolve_layer("features.28").unwrap();
    let params = DreamParams {
        num_octaves: 1,
        iterations: 2,
        ..DreamParams::default()
    };
    let dreamed = dreamer.deep_dream_rgb(&pattern(64, 64), &layer, &params).unwrap();
    assert_eq!(dreamed.dimensions(), (64, 64));

    let out = tempfile::tempdir().unwrap();
    let path = out.path().join("dream.png");
    deepdream_rs::save_image(&dreamed, &path).unwrap();
    assert!(path.exists());
}
