//! Optional sink for text that resolved to no command: POST it to a local
//! endpoint as JSON. Failures are logged and swallowed; the pipeline never
//! stalls on a dead endpoint.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

pub struct Forwarder {
    url: String,
    agent: ureq::Agent,
}

impl Forwarder {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            agent: ureq::builder().timeout(Duration::from_secs(5)).build(),
        }
    }

    pub fn send(&self, text: &str) {
        let payload = json!({ "message": text });
        match self.agent.post(&self.url).send_json(payload) {
            Ok(response) => {
                debug!(status = response.status(), "forwarded non-command text");
            }
            Err(e) => {
                warn!("forward to {} failed: {e}", self.url);
            }
        }
    }
}
