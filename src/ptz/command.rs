use anyhow::{anyhow, Result};

/// Speed used when a request leaves it unset (0).
pub const DEFAULT_PTZ_SPEED: u32 = 90;
/// Highest speed the camera accepts.
pub const MAX_PTZ_SPEED: u32 = 100;

/// One request to the camera's `ptz.cgi`.
#[derive(Clone, Debug, PartialEq)]
pub enum PtzCommand {
    /// Absolute pan/tilt in degrees.
    Move { pan: f64, tilt: f64, speed: u32 },
    /// Continuous motion; the values are signed speeds.
    ContinuousMove { pan: i32, tilt: i32, zoom: i32 },
    Zoom { zoom: i32 },
    QueryPosition,
}

impl PtzCommand {
    pub fn query_string(&self) -> String {
        match self {
            PtzCommand::Move { pan, tilt, speed } => format!(
                "pan={:.1}&tilt={:.1}&speed={}&autofocus=on",
                pan, tilt, speed
            ),
            PtzCommand::ContinuousMove { pan, tilt, zoom } => format!(
                "continuouspantiltmove={},{}&continuouszoommove={}",
                pan, tilt, zoom
            ),
            PtzCommand::Zoom { zoom } => format!("zoom={}&autofocus=on", zoom),
            PtzCommand::QueryPosition => "query=position".to_string(),
        }
    }
}

/// Last position reported by the camera.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PtzState {
    pub pan: f64,
    pub tilt: f64,
    pub zoom: i32,
}

/// Parse a `query=position` response body.
///
/// The camera answers with `key=value` lines; only `pan`, `tilt` and `zoom`
/// are used.
pub fn parse_position(body: &str) -> Result<PtzState> {
    if body.contains("Error") {
        return Err(anyhow!("camera rejected position query: {}", body.trim()));
    }
    let mut pan = None;
    let mut tilt = None;
    let mut zoom = None;
    for line in body.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "pan" => pan = Some(parse_field::<f64>("pan", value)?),
            "tilt" => tilt = Some(parse_field::<f64>("tilt", value)?),
            "zoom" => zoom = Some(parse_field::<i32>("zoom", value)?),
            _ => {}
        }
    }
    Ok(PtzState {
        pan: pan.ok_or_else(|| anyhow!("position response missing pan"))?,
        tilt: tilt.ok_or_else(|| anyhow!("position response missing tilt"))?,
        zoom: zoom.ok_or_else(|| anyhow!("position response missing zoom"))?,
    })
}

fn parse_field<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("invalid {} value '{}' in position response", name, value))
}

/// How incoming requests are interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ControlMode {
    /// Pan/tilt/zoom are absolute targets.
    #[default]
    Position,
    /// Pan/tilt/zoom are speeds.
    Velocity,
}

/// Client request, before it is turned into camera commands.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PtzRequest {
    pub pan: f64,
    pub tilt: f64,
    pub zoom: f64,
    /// 0 selects the default speed. Values above `MAX_PTZ_SPEED` are
    /// clamped.
    pub speed: f64,
}

/// Commands for one request, in the order they must reach the camera.
pub fn plan(
    request: &PtzRequest,
    mode: ControlMode,
    current_zoom: i32,
    default_speed: u32,
) -> Vec<PtzCommand> {
    match mode {
        ControlMode::Position => {
            let mut commands = Vec::with_capacity(2);
            let zoom = request.zoom as i32;
            if zoom != current_zoom {
                commands.push(PtzCommand::Zoom { zoom });
            }
            // Negative and NaN speeds cast to 0.
            let speed = match request.speed as u32 {
                0 => default_speed,
                speed => speed.min(MAX_PTZ_SPEED),
            };
            commands.push(PtzCommand::Move {
                pan: request.pan,
                tilt: request.tilt,
                speed,
            });
            commands
        }
        ControlMode::Velocity => vec![PtzCommand::ContinuousMove {
            pan: request.pan as i32,
            tilt: request.tilt as i32,
            zoom: request.zoom as i32,
        }],
    }
}
