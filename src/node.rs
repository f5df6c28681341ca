//! The per-frame handler and the loop that feeds it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use thiserror::Error;

use crate::bridge::{self, BridgeError, Image};
use crate::capture::FrameSource;
use crate::output::OutputSink;
use crate::segmentation::{self, LabelError, LabelSource, Preprocessor, SegmentationModel};

/// How long the loop waits for a frame before re-checking for shutdown
pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);

const STATS_INTERVAL: u64 = 30;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("failed to decode image message")]
    Decode(#[source] BridgeError),

    #[error("inference failed")]
    Inference(#[source] anyhow::Error),

    #[error("failed to colorize class map")]
    Colorize(#[source] LabelError),

    #[error("failed to encode annotated image")]
    Encode(#[source] BridgeError),
}

#[derive(Clone, Copy, Debug)]
pub struct OverlayOptions {
    /// Canonical (width, height) of published frames
    pub output_size: (u32, u32),
    /// Mask opacity
    pub alpha: f32,
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            output_size: (480, 320),
            alpha: 0.5,
        }
    }
}

/// Time spent in one stage, over the frames that reached it
#[derive(Clone, Copy, Debug, Default)]
struct Stage {
    total: Duration,
    frames: u64,
}

impl Stage {
    fn record(&mut self, elapsed: Duration) {
        self.total += elapsed;
        self.frames += 1;
    }

    fn average_ms(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.total.as_secs_f64() * 1000.0 / self.frames as f64
    }
}

/// Cumulative per-stage timings
#[derive(Clone, Debug, Default)]
pub struct FrameStats {
    pub received: u64,
    pub published: u64,
    pub dropped: u64,
    decode: Stage,
    inference: Stage,
    postprocess: Stage,
    publish: Stage,
}

impl FrameStats {
    fn log(&self) {
        let (decode, inference, postprocess, publish) = (
            self.decode.average_ms(),
            self.inference.average_ms(),
            self.postprocess.average_ms(),
            self.publish.average_ms(),
        );
        let total_ms = decode + inference + postprocess + publish;
        let fps = if total_ms > 0.0 { 1000.0 / total_ms } else { 0.0 };

        tracing::info!(
            "Frame {}: decode={:.1}ms, inference={:.1}ms, post={:.1}ms, publish={:.1}ms, total={:.1}ms, fps={:.1}, dropped={}",
            self.received,
            decode,
            inference,
            postprocess,
            publish,
            total_ms,
            fps,
            self.dropped
        );
    }
}

/// Segmentation overlay node: owns the model and label table for its lifetime
pub struct SegmentationNode<M> {
    model: M,
    labels: LabelSource,
    overlay: OverlayOptions,
    stats: FrameStats,
}

impl<M: SegmentationModel> SegmentationNode<M> {
    /// Fails if the model declares more classes than the table has colors.
    pub fn new(model: M, mut labels: LabelSource, overlay: OverlayOptions) -> Result<Self> {
        if let Some(classes) = model.num_classes() {
            let colors = labels.current().len();
            if colors < classes {
                bail!(
                    "Label table has {} colors but the model predicts {} classes",
                    colors,
                    classes
                );
            }
        }

        let (width, height) = model.input_size();
        tracing::info!(
            "Segmentation node ready: model input {}x{}, output {}x{}, alpha {}",
            width,
            height,
            overlay.output_size.0,
            overlay.output_size.1,
            overlay.alpha
        );

        Ok(Self {
            model,
            labels,
            overlay,
            stats: FrameStats::default(),
        })
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Turn one inbound image into the annotated outbound image.
    pub fn process(&mut self, msg: &Image) -> Result<Image, FrameError> {
        let start = Instant::now();
        let frame = bridge::imgmsg_to_bgr(msg).map_err(FrameError::Decode)?;
        let (width, height) = self.model.input_size();
        let resized = Preprocessor::fit(frame, width, height);
        self.stats.decode.record(start.elapsed());

        let start = Instant::now();
        tracing::debug!("Inference engine running");
        let classes = self.model.segment(&resized).map_err(FrameError::Inference)?;
        self.stats.inference.record(start.elapsed());

        let start = Instant::now();
        let mut mask = self
            .labels
            .current()
            .colorize(&classes)
            .map_err(FrameError::Colorize)?;
        // table colors are RGB, frames are BGR
        bridge::swap_channels(&mut mask);

        let output = segmentation::composite(
            resized,
            &mask,
            self.overlay.output_size,
            self.overlay.alpha,
        );
        let out_msg =
            bridge::bgr_to_imgmsg(&output, msg.header.clone()).map_err(FrameError::Encode)?;
        self.stats.postprocess.record(start.elapsed());

        Ok(out_msg)
    }

    /// Handle one message end to end. Failures are logged and the frame is dropped.
    ///
    /// Returns whether a frame was published.
    pub fn on_frame<O: OutputSink + ?Sized>(&mut self, msg: &Image, sink: &mut O) -> bool {
        self.stats.received += 1;

        let published = match self.process(msg) {
            Ok(out) => {
                let start = Instant::now();
                let result = sink.write_frame(&out);
                self.stats.publish.record(start.elapsed());
                match result {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::error!("Dropping frame: {:#}", e);
                        false
                    }
                }
            }
            Err(e) => {
                tracing::error!("Dropping frame: {:#}", anyhow::Error::new(e));
                false
            }
        };

        if published {
            self.stats.published += 1;
        } else {
            self.stats.dropped += 1;
        }
        if self.stats.received % STATS_INTERVAL == 0 {
            self.stats.log();
        }

        published
    }
}

/// Pump frames from `source` through `node` into `sink` until `shutdown` is set
pub fn run_node<S, O, M>(
    source: &mut S,
    sink: &mut O,
    node: &mut SegmentationNode<M>,
    shutdown: &AtomicBool,
) -> Result<()>
where
    S: FrameSource + ?Sized,
    O: OutputSink + ?Sized,
    M: SegmentationModel,
{
    tracing::info!("Starting segmentation loop");
    tracing::info!("Press Ctrl+C to stop");

    while !shutdown.load(Ordering::SeqCst) {
        if let Some(msg) = source.next_frame(POLL_TIMEOUT)? {
            node.on_frame(&msg, sink);
        }
    }

    tracing::info!(
        "Processed {} frames ({} published, {} dropped)",
        node.stats.received,
        node.stats.published,
        node.stats.dropped
    );
    Ok(())
}
