//! Pan/tilt/zoom control through the camera's `ptz.cgi`.
//!
//! - `command`: command strings, position parsing and request planning
//! - `transport`: how a command reaches the camera
//! - `dispatch`: bounded worker pool sending commands off the caller's thread
//! - `controller`: control mode and last known position

pub mod command;
pub mod controller;
pub mod dispatch;
pub mod transport;

pub use command::{
    parse_position, plan, ControlMode, PtzCommand, PtzRequest, PtzState, DEFAULT_PTZ_SPEED,
    MAX_PTZ_SPEED,
};
pub use controller::PtzController;
pub use dispatch::{DispatchError, DispatchStats, PtzDispatcher};
pub use transport::{HttpPtzTransport, PtzTransport};
