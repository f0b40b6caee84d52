use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::frame::FrameFormat;
use crate::ingest::scanner::DEFAULT_MAX_FRAME_BYTES;
use crate::ingest::transport::{HttpStreamConfig, DEFAULT_CHUNK_SIZE};
use crate::ptz::{DEFAULT_PTZ_SPEED, MAX_PTZ_SPEED};
use crate::queue::DEFAULT_QUEUE_CAPACITY;

const DEFAULT_CAMERA_HOST: &str = "http://192.168.0.90";
const DEFAULT_STREAM_PATH: &str = "/axis-cgi/mjpg/video.cgi";
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_FORMAT_WIDTH: u32 = 768;
const DEFAULT_FORMAT_HEIGHT: u32 = 576;
const DEFAULT_BITS_PER_PIXEL: u32 = 24;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_PTZ_PATH: &str = "/axis-cgi/com/ptz.cgi";
const DEFAULT_PTZ_WORKERS: usize = 2;
const DEFAULT_PTZ_QUEUE_CAPACITY: usize = 8;

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    camera: Option<CameraSectionFile>,
    queue: Option<QueueSectionFile>,
    scanner: Option<ScannerSectionFile>,
    format: Option<FormatSectionFile>,
    consumer: Option<ConsumerSectionFile>,
    ptz: Option<PtzSectionFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraSectionFile {
    host: Option<String>,
    stream_path: Option<String>,
    connect_timeout_ms: Option<u64>,
    read_timeout_ms: Option<u64>,
    chunk_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct QueueSectionFile {
    capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ScannerSectionFile {
    max_frame_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct FormatSectionFile {
    width: Option<u32>,
    height: Option<u32>,
    bits_per_pixel: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ConsumerSectionFile {
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct PtzSectionFile {
    command_path: Option<String>,
    default_speed: Option<u32>,
    workers: Option<usize>,
    queue_capacity: Option<usize>,
}

/// Settings for one Axis camera connection.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub camera: CameraSettings,
    pub queue: QueueSettings,
    pub scanner: ScannerSettings,
    pub format: FrameFormat,
    pub consumer: ConsumerSettings,
    pub ptz: PtzSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub host: String,
    pub stream_path: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub chunk_size: usize,
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub capacity: usize,
}

#[derive(Debug, Clone)]
pub struct ScannerSettings {
    pub max_frame_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct PtzSettings {
    pub command_path: String,
    pub default_speed: u32,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl CameraConfig {
    /// Defaults, then the JSON file named by `AXIS_CONFIG`, then `AXIS_*`
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("AXIS_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CameraConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let format = file.format.unwrap_or_default();
        let ptz = file.ptz.unwrap_or_default();
        let mut frame_format = FrameFormat::jpeg(
            format.width.unwrap_or(DEFAULT_FORMAT_WIDTH),
            format.height.unwrap_or(DEFAULT_FORMAT_HEIGHT),
        );
        frame_format.bits_per_pixel = format.bits_per_pixel.unwrap_or(DEFAULT_BITS_PER_PIXEL);

        Self {
            camera: CameraSettings {
                host: camera
                    .host
                    .unwrap_or_else(|| DEFAULT_CAMERA_HOST.to_string()),
                stream_path: camera
                    .stream_path
                    .unwrap_or_else(|| DEFAULT_STREAM_PATH.to_string()),
                connect_timeout: Duration::from_millis(
                    camera
                        .connect_timeout_ms
                        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
                ),
                read_timeout: Duration::from_millis(
                    camera.read_timeout_ms.unwrap_or(DEFAULT_READ_TIMEOUT_MS),
                ),
                chunk_size: camera.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            },
            queue: QueueSettings {
                capacity: file
                    .queue
                    .and_then(|queue| queue.capacity)
                    .unwrap_or(DEFAULT_QUEUE_CAPACITY),
            },
            scanner: ScannerSettings {
                max_frame_bytes: file
                    .scanner
                    .and_then(|scanner| scanner.max_frame_bytes)
                    .unwrap_or(DEFAULT_MAX_FRAME_BYTES),
            },
            format: frame_format,
            consumer: ConsumerSettings {
                poll_interval: Duration::from_millis(
                    file.consumer
                        .and_then(|consumer| consumer.poll_interval_ms)
                        .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
                ),
            },
            ptz: PtzSettings {
                command_path: ptz
                    .command_path
                    .unwrap_or_else(|| DEFAULT_PTZ_PATH.to_string()),
                default_speed: ptz.default_speed.unwrap_or(DEFAULT_PTZ_SPEED),
                workers: ptz.workers.unwrap_or(DEFAULT_PTZ_WORKERS),
                queue_capacity: ptz.queue_capacity.unwrap_or(DEFAULT_PTZ_QUEUE_CAPACITY),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("AXIS_CAMERA_HOST") {
            if !host.trim().is_empty() {
                self.camera.host = host.trim().to_string();
            }
        }
        if let Ok(capacity) = std::env::var("AXIS_QUEUE_CAPACITY") {
            self.queue.capacity = capacity
                .trim()
                .parse()
                .map_err(|_| anyhow!("AXIS_QUEUE_CAPACITY must be a positive integer"))?;
        }
        if let Ok(timeout) = std::env::var("AXIS_READ_TIMEOUT_MS") {
            let millis: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("AXIS_READ_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.camera.read_timeout = Duration::from_millis(millis);
        }
        if let Ok(speed) = std::env::var("AXIS_PTZ_SPEED") {
            self.ptz.default_speed = speed
                .trim()
                .parse()
                .map_err(|_| anyhow!("AXIS_PTZ_SPEED must be an integer between 1 and 100"))?;
        }
        if let Ok(workers) = std::env::var("AXIS_PTZ_WORKERS") {
            self.ptz.workers = workers
                .trim()
                .parse()
                .map_err(|_| anyhow!("AXIS_PTZ_WORKERS must be a positive integer"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let host = parse_host(&self.camera.host)?;
        self.camera.host = host.as_str().trim_end_matches('/').to_string();

        if self.queue.capacity == 0 {
            return Err(anyhow!("queue capacity must be greater than zero"));
        }
        if self.camera.chunk_size == 0 {
            return Err(anyhow!("camera chunk_size must be greater than zero"));
        }
        if self.scanner.max_frame_bytes == 0 {
            return Err(anyhow!("scanner max_frame_bytes must be greater than zero"));
        }
        if self.camera.read_timeout.is_zero() {
            return Err(anyhow!("camera read timeout must be greater than zero"));
        }
        if self.consumer.poll_interval.is_zero() {
            return Err(anyhow!("consumer poll_interval_ms must be greater than zero"));
        }
        if self.ptz.workers == 0 {
            return Err(anyhow!("ptz workers must be greater than zero"));
        }
        if self.ptz.queue_capacity == 0 {
            return Err(anyhow!("ptz queue_capacity must be greater than zero"));
        }
        if !(1..=MAX_PTZ_SPEED).contains(&self.ptz.default_speed) {
            return Err(anyhow!(
                "ptz default_speed must be between 1 and {}, got {}",
                MAX_PTZ_SPEED,
                self.ptz.default_speed
            ));
        }
        Ok(())
    }

    /// Override the camera host after loading, e.g. from a command line flag.
    pub fn set_host(&mut self, host: &str) -> Result<()> {
        let parsed = parse_host(host)?;
        self.camera.host = parsed.as_str().trim_end_matches('/').to_string();
        Ok(())
    }

    /// MJPEG endpoint, host joined with the stream path.
    pub fn stream_url(&self) -> Result<String> {
        join_url(&self.camera.host, &self.camera.stream_path)
    }

    /// PTZ command endpoint, host joined with the command path.
    pub fn ptz_url(&self) -> Result<String> {
        join_url(&self.camera.host, &self.ptz.command_path)
    }

    pub fn http_stream(&self) -> Result<HttpStreamConfig> {
        Ok(HttpStreamConfig {
            url: self.stream_url()?,
            connect_timeout: self.camera.connect_timeout,
            read_timeout: self.camera.read_timeout,
        })
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self::from_file(CameraConfigFile::default())
    }
}

fn read_config_file(path: &Path) -> Result<CameraConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

/// Accepts `http(s)://host[:port]` or a bare `host[:port]`.
fn parse_host(host: &str) -> Result<Url> {
    let host = host.trim();
    let candidate = if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    };
    let url = Url::parse(&candidate).map_err(|e| anyhow!("invalid camera host '{}': {}", host, e))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(anyhow!(
                "unsupported camera scheme '{}'; expected http or https",
                other
            ))
        }
    }
    if url.host_str().is_none() {
        return Err(anyhow!("camera host '{}' has no host name", host));
    }
    Ok(url)
}

fn join_url(host: &str, path: &str) -> Result<String> {
    let base = parse_host(host)?;
    let joined = base
        .join(path)
        .map_err(|e| anyhow!("invalid path '{}' for camera {}: {}", path, host, e))?;
    Ok(joined.to_string())
}
