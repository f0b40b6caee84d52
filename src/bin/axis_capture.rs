//! axis_capture - Pull JPEG frames from an Axis camera's MJPEG stream.
//!
//! Frames are written to `--out-dir` (one file per frame plus a
//! `format.json` descriptor) or, without it, only counted in the log.
//! `--replay` reads a recorded MJPEG stream from disk instead of the camera.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use axis_mjpeg::{
    CameraConfig, CameraDevice, CameraPipeline, DirectorySink, Frame, FrameFormat, FrameSink,
    LogSink,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Capture JPEG frames from an Axis camera")]
struct Args {
    /// Camera host, e.g. http://192.168.0.90 (overrides the config file).
    #[arg(long, env = "AXIS_CAMERA_HOST")]
    host: Option<String>,

    /// Read a recorded MJPEG stream instead of connecting to the camera.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Directory receiving frame_<seq>.jpg files.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Stop after this many frames were published.
    #[arg(long)]
    max_frames: Option<u64>,
}

/// Wraps a sink and signals `done` once `remaining` frames went through it.
struct Limited<S> {
    inner: S,
    remaining: Option<u64>,
    done: mpsc::Sender<()>,
}

impl<S: FrameSink> FrameSink for Limited<S> {
    fn publish(&mut self, frame: &Frame, format: &FrameFormat) -> Result<()> {
        self.inner.publish(frame, format)?;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                let _ = self.done.send(());
            }
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.max_frames == Some(0) {
        return Err(anyhow!("--max-frames must be greater than zero"));
    }

    let mut config = CameraConfig::load()?;
    if let Some(host) = args.host.as_deref() {
        config.set_host(host)?;
    }

    let device = match args.replay.as_ref() {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("open replay file {}", path.display()))?;
            log::info!("axis_capture replaying {}", path.display());
            CameraDevice::from_reader(file, &config)?
        }
        None => {
            log::info!("axis_capture connecting to {}", config.stream_url()?);
            CameraDevice::connect(&config)?
        }
    };

    let (tx, rx) = mpsc::channel();
    let remaining = args.max_frames;

    let pipeline = match args.out_dir.as_ref() {
        Some(dir) => {
            let sink = DirectorySink::create(dir, &config.format)?;
            log::info!("writing frames to {}", dir.display());
            start(device, sink, remaining, tx.clone(), &config)?
        }
        None => start(device, LogSink::default(), remaining, tx.clone(), &config)?,
    };

    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(());
    })
    .context("set Ctrl-C handler")?;

    log::info!("axis_capture running (Ctrl-C to stop)...");
    // Wake up periodically to notice a stream that ended on its own.
    loop {
        match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(()) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let link = pipeline.device().link_state();
                if link.is_terminal() && pipeline.wait_idle(Duration::from_secs(2)) {
                    log::info!("camera link {}", link);
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    log::info!("stopping capture...");
    let report = pipeline.shutdown()?;
    log::info!(
        "capture finished: link {}, {} frames queued, {} dropped, {} published, {} failed, {} discarded",
        report.link,
        report.producer.frames_queued,
        report.producer.frames_dropped,
        report.consumer.published,
        report.consumer.failed,
        report.discarded
    );
    Ok(())
}

fn start<S>(
    device: CameraDevice,
    sink: S,
    remaining: Option<u64>,
    done: mpsc::Sender<()>,
    config: &CameraConfig,
) -> Result<CameraPipeline>
where
    S: FrameSink + 'static,
{
    CameraPipeline::start(
        device,
        Limited {
            inner: sink,
            remaining,
            done,
        },
        config.format.clone(),
        config.consumer.poll_interval,
    )
}
