use anyhow::{bail, Context, Result};
use clap::Parser;
use seg_node::capture::{FrameSource, TopicSource};
use seg_node::config::{self, SinkKind, SourceKind};
use seg_node::output::{OutputSink, TopicSink};
use seg_node::ros::{self, RosNode};
use seg_node::segmentation::{self, LabelSource, OnnxOptions, TensorLayout};
use seg_node::{run_node, OverlayOptions, SegmentationNode};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the segmentation model (ONNX file)
    #[arg(long, default_value = "segmentation.onnx")]
    model: PathBuf,

    /// Path to the label color config (JSON with a `labels` list)
    #[arg(long, default_value = "config.json")]
    labels: PathBuf,

    /// Re-read the label config on every frame
    #[arg(long)]
    reload_labels: bool,

    /// Camera image topic to subscribe to
    #[arg(long, default_value = "/pointgrey_cam/image_rect_color")]
    input_topic: String,

    /// Topic for annotated images
    #[arg(long, default_value = "/seg_img")]
    output_topic: String,

    /// ROS 2 node name
    #[arg(long, default_value = "seg_inference_engine")]
    node_name: String,

    /// Append the process id to the node name
    #[arg(long)]
    anonymous: bool,

    /// Frame source
    #[arg(long, value_enum, default_value_t = SourceKind::Ros)]
    source: SourceKind,

    /// Frame sink
    #[arg(long, value_enum, default_value_t = SinkKind::Ros)]
    sink: SinkKind,

    /// Input webcam device index (webcam source)
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output v4l2loopback device path (loopback sink)
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Output resolution width
    #[arg(long, default_value_t = 480)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 320)]
    output_height: u32,

    /// Mask opacity
    #[arg(long, default_value_t = 0.5)]
    alpha: f32,

    /// Model tensor layout
    #[arg(long, value_enum, default_value_t = TensorLayout::Nhwc)]
    layout: TensorLayout,

    /// Multiplier applied to raw 0-255 pixel values before inference
    #[arg(long, default_value_t = 1.0)]
    input_scale: f32,

    /// ONNX Runtime intra-op threads
    #[arg(long, default_value_t = 4)]
    intra_threads: usize,

    /// Skip the CUDA execution provider
    #[arg(long)]
    cpu: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("seg-node starting");
    tracing::info!("Output: {}x{}, alpha {}", args.output_width, args.output_height, args.alpha);

    if !(0.0..=1.0).contains(&args.alpha) {
        bail!("--alpha must be within 0.0..=1.0, got {}", args.alpha);
    }
    if args.output_width == 0 || args.output_height == 0 {
        bail!("Output resolution must be non-zero");
    }

    // Artifacts first: nothing is advertised unless they load
    let install_dir = config::install_dir();
    let labels_path = config::resolve_artifact(&args.labels, install_dir.as_deref());
    let model_path = config::resolve_artifact(&args.model, install_dir.as_deref());

    let labels = LabelSource::open(&labels_path, args.reload_labels)
        .context("Failed to load label config")?;

    let options = OnnxOptions {
        layout: args.layout,
        input_scale: args.input_scale,
        fallback_size: (args.output_width, args.output_height),
        intra_threads: args.intra_threads,
        use_cuda: !args.cpu,
    };
    let model = segmentation::create_default_model(&model_path, &options)
        .context("Failed to load segmentation model")?;
    tracing::info!("Segmentation model loaded successfully");

    let overlay = OverlayOptions {
        output_size: (args.output_width, args.output_height),
        alpha: args.alpha,
    };
    let mut node = SegmentationNode::new(model, labels, overlay)?;

    // Transport
    let mut ros_node = if args.source == SourceKind::Ros || args.sink == SinkKind::Ros {
        let name = ros::node_name(&args.node_name, args.anonymous);
        Some(RosNode::new(&name).context("Failed to initialize ROS 2 node")?)
    } else {
        None
    };

    let mut sink: Box<dyn OutputSink> = match args.sink {
        SinkKind::Ros => {
            let publisher = ros_endpoint(&mut ros_node)?.advertise(&args.output_topic)?;
            Box::new(TopicSink::new(publisher))
        }
        SinkKind::Loopback => open_loopback(&args)?,
    };

    let mut source: Box<dyn FrameSource> = match args.source {
        SourceKind::Ros => {
            let subscription = ros_endpoint(&mut ros_node)?.subscribe(&args.input_topic)?;
            Box::new(TopicSource::new(subscription))
        }
        SourceKind::Webcam => open_webcam(&args)?,
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        handler_shutdown.store(true, Ordering::SeqCst);
    }) {
        tracing::warn!("Failed to install Ctrl+C handler: {err}");
    }

    run_node(&mut *source, &mut *sink, &mut node, &shutdown)?;

    tracing::info!("Shutting down");
    Ok(())
}

fn ros_endpoint(ros_node: &mut Option<RosNode>) -> Result<&mut RosNode> {
    ros_node.as_mut().context("ROS 2 node was not initialized")
}

#[cfg(feature = "webcam")]
fn open_webcam(args: &Args) -> Result<Box<dyn FrameSource>> {
    let capture = seg_node::capture::WebcamCapture::new(args.input_device)
        .context("Failed to initialize webcam capture")?;
    Ok(Box::new(capture))
}

#[cfg(not(feature = "webcam"))]
fn open_webcam(args: &Args) -> Result<Box<dyn FrameSource>> {
    bail!(
        "Webcam {} requested but seg-node was built without the `webcam` feature",
        args.input_device
    )
}

#[cfg(feature = "loopback")]
fn open_loopback(args: &Args) -> Result<Box<dyn OutputSink>> {
    let output = seg_node::output::V4L2Output::new(
        &args.output_device,
        args.output_width,
        args.output_height,
    )
    .context("Failed to initialize v4l2loopback output")?;
    Ok(Box::new(output))
}

#[cfg(not(feature = "loopback"))]
fn open_loopback(args: &Args) -> Result<Box<dyn OutputSink>> {
    bail!(
        "Loopback output {} requested but seg-node was built without the `loopback` feature",
        args.output_device
    )
}
