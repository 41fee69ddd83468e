//! deepdream-rs CLI: DeepDream images, videos, and learning-rate sweeps

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use deepdream_rs::{
    load_image, save_image, ComputeContext, ConvNet, ConvNetConfig, DreamConfig, Dreamer,
    FrameSize, LayerHandle, ProgressiveOptions, SequenceSummary, VggVariant, VideoDreamOptions,
};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "deepdream-rs")]
#[command(about = "DeepDream feature visualization in Rust")]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Force CPU mode (slower but avoids CUDA issues)
    #[arg(long, global = true)]
    cpu: bool,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    dream: DreamArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ModelArgs {
    /// Model ID from `HuggingFace` (e.g., "timm/vgg19.tv_in1k")
    #[arg(short, long, default_value = "timm/vgg16.tv_in1k", global = true)]
    model: String,

    /// Local safetensors weights (skips the download)
    #[arg(short, long, global = true)]
    weights: Vec<PathBuf>,

    /// VGG variant (vgg11, vgg13, vgg16, vgg19); guessed from the model ID if unset
    #[arg(long, global = true)]
    arch: Option<String>,

    /// JSON layer layout for non-VGG stacks (overrides --arch)
    #[arg(long, global = true)]
    net_config: Option<PathBuf>,
}

#[derive(Args)]
struct DreamArgs {
    /// JSON dream configuration; the flags below override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Layer to amplify (e.g., "features.28")
    #[arg(short, long, global = true)]
    layer: Option<String>,

    /// Size ratio between octaves
    #[arg(long, global = true)]
    octave_scale: Option<f64>,

    /// Octaves below full resolution
    #[arg(long, global = true)]
    num_octaves: Option<usize>,

    /// Ascent steps per octave
    #[arg(long, global = true)]
    iterations: Option<usize>,

    /// Learning rate
    #[arg(long, global = true)]
    lr: Option<f64>,

    /// Only amplify these channels (comma separated)
    #[arg(long, value_delimiter = ',', global = true)]
    channels: Option<Vec<usize>>,

    /// Jitter seed for reproducible runs
    #[arg(long, global = true)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// List the layers that can be amplified
    Layers,

    /// Dream on a single image
    Image { input: PathBuf, output: PathBuf },

    /// Dream on every kept frame of a GIF or frame directory
    Video {
        input: PathBuf,
        output: PathBuf,
        /// Keep every N-th frame
        #[arg(long, default_value_t = 1)]
        skip: usize,
        /// Output frame width
        #[arg(long, requires = "height")]
        width: Option<u32>,
        /// Output frame height
        #[arg(long, requires = "width")]
        height: Option<u32>,
        /// Resize frames to WIDTHxHEIGHT before dreaming
        #[arg(long, value_parser = parse_size)]
        decode_size: Option<FrameSize>,
        #[arg(long, default_value_t = 30)]
        fps: u32,
    },

    /// Dream the same image over a range of learning rates
    Progressive {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        lower_lr: f64,
        #[arg(long)]
        upper_lr: f64,
        /// Number of frames
        #[arg(long)]
        steps: usize,
        #[arg(long, default_value_t = 15)]
        fps: u32,
        #[arg(long, requires = "height")]
        width: Option<u32>,
        #[arg(long, requires = "width")]
        height: Option<u32>,
    },
}

fn parse_size(s: &str) -> std::result::Result<FrameSize, String> {
    let (w, h) = s
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let width = w.parse().map_err(|e| format!("bad width '{w}': {e}"))?;
    let height = h.parse().map_err(|e| format!("bad height '{h}': {e}"))?;
    Ok(FrameSize::new(width, height))
}

fn frame_size(width: Option<u32>, height: Option<u32>) -> Option<FrameSize> {
    width.zip(height).map(|(w, h)| FrameSize::new(w, h))
}

fn network_config(args: &ModelArgs) -> Result<ConvNetConfig> {
    if let Some(path) = &args.net_config {
        return ConvNetConfig::load(path);
    }
    Ok(match &args.arch {
        Some(arch) => ConvNetConfig::vgg(arch.parse::<VggVariant>()?),
        None => ConvNetConfig::vgg(VggVariant::from_model_id(&args.model)),
    })
}

fn dream_config(args: &DreamArgs) -> Result<DreamConfig> {
    let mut config = match &args.config {
        Some(path) => DreamConfig::load(path)?,
        None => DreamConfig::default(),
    };
    if let Some(layer) = &args.layer {
        config.layer.clone_from(layer);
    }
    if let Some(scale) = args.octave_scale {
        config.octave_scale = scale;
    }
    if let Some(n) = args.num_octaves {
        config.num_octaves = n;
    }
    if let Some(iterations) = args.iterations {
        config.iterations = iterations;
    }
    if let Some(lr) = args.lr {
        config.learning_rate = lr;
    }
    if let Some(channels) = &args.channels {
        config.channels = Some(channels.clone());
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.validate()?;
    Ok(config)
}

fn load_network(args: &ModelArgs, config: &ConvNetConfig, ctx: &ComputeContext) -> Result<ConvNet> {
    if args.weights.is_empty() {
        ConvNet::from_pretrained(&args.model, config, ctx)
    } else {
        ConvNet::from_safetensors(&args.weights, config, ctx)
    }
}

fn build_dreamer(
    cli: &Cli,
    net_config: &ConvNetConfig,
    config: &DreamConfig,
) -> Result<(Dreamer<ConvNet>, LayerHandle)> {
    let ctx = ComputeContext::with_device(Some(cli.cpu));
    info!("Loading model...");
    let network = load_network(&cli.model, net_config, &ctx)?;
    info!("Network: {} layers", network.n_layers());

    let dreamer = Dreamer::imagenet(network, ctx).with_jitter(config.jitter());
    let layer = dreamer.resolve_layer(&config.layer)?;
    Ok((dreamer, layer))
}

fn print_summary(output: &Path, summary: &SequenceSummary) {
    println!("\n=== Done ===");
    println!(
        "Frames: {} at {}, {} fps",
        summary.frames, summary.size, summary.framerate
    );
    println!("Saved:  {}", output.display());
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let net_config = network_config(&cli.model)?;
    if let Command::Layers = cli.command {
        for (i, (name, layer)) in net_config
            .layer_names()
            .iter()
            .zip(&net_config.layers)
            .enumerate()
        {
            println!("{i:3}  {name:<14} {layer:?}");
        }
        return Ok(());
    }

    let config = dream_config(&cli.dream)?;
    let params = config.params();

    println!("=== deepdream-rs ===");
    println!("Model:  {}", cli.model.model);
    println!("Layer:  {}", config.layer);
    println!(
        "Pyramid: {} octave(s) x {:.2}, {} iteration(s) at lr {}",
        config.num_octaves, config.octave_scale, config.iterations, config.learning_rate
    );
    if cli.cpu {
        println!("Mode:   CPU (forced)");
    }

    let (mut dreamer, layer) = build_dreamer(&cli, &net_config, &config)?;

    match &cli.command {
        Command::Layers => {} // listed above without loading weights
        Command::Image { input, output } => {
            let image = load_image(input)?;
            let dreamed = dreamer.deep_dream_rgb(&image, &layer, &params)?;
            save_image(&dreamed, output)?;
            println!("\n=== Done ===");
            println!("Size:   {}", FrameSize::of(&dreamed));
            println!("Saved:  {}", output.display());
        }
        Command::Video {
            input,
            output,
            skip,
            width,
            height,
            decode_size,
            fps,
        } => {
            let options = VideoDreamOptions {
                skip_value: *skip,
                resize: *decode_size,
                size: frame_size(*width, *height),
                framerate: *fps,
            };
            let summary = dreamer.deep_dream_on_video(input, output, &layer, &params, &options)?;
            print_summary(output, &summary);
        }
        Command::Progressive {
            input,
            output,
            lower_lr,
            upper_lr,
            steps,
            fps,
            width,
            height,
        } => {
            let image = load_image(input)?;
            let options = ProgressiveOptions {
                lower_lr: *lower_lr,
                upper_lr: *upper_lr,
                num_steps: *steps,
                framerate: *fps,
                size: frame_size(*width, *height),
            };
            let summary =
                dreamer.progressive_deep_dream(&image, output, &layer, &params, &options)?;
            print_summary(output, &summary);
        }
    }

    Ok(())
}
