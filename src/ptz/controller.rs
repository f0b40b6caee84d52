use anyhow::{Context, Result};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::command::{parse_position, plan, ControlMode, PtzCommand, PtzRequest, PtzState};
use super::dispatch::{DispatchError, DispatchStats, PtzDispatcher};
use super::transport::{HttpPtzTransport, PtzTransport};
use crate::config::CameraConfig;

const PTZ_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Turns client requests into camera commands and tracks the camera's
/// reported position.
pub struct PtzController {
    mode: ControlMode,
    default_speed: u32,
    state: Mutex<PtzState>,
    transport: Arc<dyn PtzTransport>,
    dispatcher: PtzDispatcher,
}

impl PtzController {
    pub fn new(
        transport: Arc<dyn PtzTransport>,
        default_speed: u32,
        workers: usize,
        queue_capacity: usize,
    ) -> Result<Self> {
        let dispatcher = PtzDispatcher::new(transport.clone(), workers, queue_capacity)?;
        Ok(Self {
            mode: ControlMode::default(),
            default_speed,
            state: Mutex::new(PtzState::default()),
            transport,
            dispatcher,
        })
    }

    /// Controller talking HTTP to the camera in `config`.
    pub fn connect(config: &CameraConfig) -> Result<Self> {
        let url = config.ptz_url()?;
        log::info!("ptz: controlling {}", url);
        let transport = Arc::new(HttpPtzTransport::new(&url, PTZ_REQUEST_TIMEOUT));
        Self::new(
            transport,
            config.ptz.default_speed,
            config.ptz.workers,
            config.ptz.queue_capacity,
        )
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ControlMode) {
        if self.mode != mode {
            log::info!("ptz: switching to {:?} control", mode);
        }
        self.mode = mode;
    }

    /// Plan `request` against the last known zoom and hand it to the
    /// workers. Returns the planned commands.
    pub fn handle(&self, request: &PtzRequest) -> Result<Vec<PtzCommand>, DispatchError> {
        let current_zoom = self.state().zoom;
        let commands = plan(request, self.mode, current_zoom, self.default_speed);
        self.dispatcher.submit(commands.clone())?;
        Ok(commands)
    }

    /// Query the camera's position synchronously and remember it.
    pub fn refresh_state(&self) -> Result<PtzState> {
        let body = self
            .transport
            .send(&PtzCommand::QueryPosition)
            .context("query ptz position")?;
        let state = parse_position(&body)?;
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        Ok(state)
    }

    /// Last position read by `refresh_state`.
    pub fn state(&self) -> PtzState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Send everything already accepted, then stop the workers.
    pub fn shutdown(mut self) -> Result<DispatchStats> {
        self.dispatcher.shutdown()
    }
}
