//! axis_ptz - Send pan/tilt/zoom commands to an Axis camera.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};

use axis_mjpeg::ptz::{ControlMode, PtzController, PtzRequest};
use axis_mjpeg::CameraConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Pan/tilt/zoom control for an Axis camera")]
struct Args {
    /// Camera host, e.g. http://192.168.0.90 (overrides the config file).
    #[arg(long, env = "AXIS_CAMERA_HOST")]
    host: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Move to an absolute pan/tilt position (degrees).
    Move {
        #[arg(long, allow_hyphen_values = true)]
        pan: f64,
        #[arg(long, allow_hyphen_values = true)]
        tilt: f64,
        /// 1-100; the configured default when omitted.
        #[arg(long, default_value_t = 0.0)]
        speed: f64,
        /// Absolute zoom; only sent when it differs from the current zoom.
        #[arg(long)]
        zoom: Option<f64>,
    },
    /// Start a continuous move; all zero stops the camera.
    Continuous {
        #[arg(long, allow_hyphen_values = true)]
        pan: f64,
        #[arg(long, allow_hyphen_values = true)]
        tilt: f64,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        zoom: f64,
    },
    /// Set the absolute zoom.
    Zoom { value: i32 },
    /// Print the current position.
    Query,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = CameraConfig::load()?;
    if let Some(host) = args.host.as_deref() {
        config.set_host(host)?;
    }
    let mut controller = PtzController::connect(&config)?;

    match args.command {
        Command::Query => {
            let state = controller.refresh_state()?;
            println!("pan={:.1} tilt={:.1} zoom={}", state.pan, state.tilt, state.zoom);
        }
        Command::Move {
            pan,
            tilt,
            speed,
            zoom,
        } => {
            let current = controller.refresh_state()?;
            let request = PtzRequest {
                pan,
                tilt,
                zoom: zoom.unwrap_or(current.zoom as f64),
                speed,
            };
            submit(&controller, &request)?;
        }
        Command::Continuous { pan, tilt, zoom } => {
            controller.set_mode(ControlMode::Velocity);
            let request = PtzRequest {
                pan,
                tilt,
                zoom,
                speed: 0.0,
            };
            submit(&controller, &request)?;
        }
        Command::Zoom { value } => {
            let current = controller.refresh_state()?;
            let request = PtzRequest {
                pan: current.pan,
                tilt: current.tilt,
                zoom: value as f64,
                speed: 0.0,
            };
            submit(&controller, &request)?;
        }
    }

    let stats = controller.shutdown()?;
    if stats.failed > 0 {
        return Err(anyhow!("{} ptz command(s) failed", stats.failed));
    }
    Ok(())
}

fn submit(controller: &PtzController, request: &PtzRequest) -> Result<()> {
    let commands = controller.handle(request)?;
    for command in &commands {
        log::info!("ptz: {}", command.query_string());
    }
    Ok(())
}
