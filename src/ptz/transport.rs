use anyhow::{anyhow, Result};
use std::time::Duration;

use super::command::PtzCommand;

/// Delivers PTZ commands to a camera and returns the response body.
pub trait PtzTransport: Send + Sync {
    fn send(&self, command: &PtzCommand) -> Result<String>;
}

/// `ptz.cgi` over HTTP GET.
pub struct HttpPtzTransport {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpPtzTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base_url: base_url.to_string(),
        }
    }

    pub fn command_url(&self, command: &PtzCommand) -> String {
        format!("{}?{}", self.base_url, command.query_string())
    }
}

impl PtzTransport for HttpPtzTransport {
    fn send(&self, command: &PtzCommand) -> Result<String> {
        let url = self.command_url(command);
        log::debug!("ptz command: {}", url);
        let response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| anyhow!("ptz request {} failed: {}", url, e))?;
        response
            .into_string()
            .map_err(|e| anyhow!("read ptz response from {}: {}", url, e))
    }
}
