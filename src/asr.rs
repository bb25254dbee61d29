//! Speech-to-text boundary.
//!
//! The pipeline is engine-agnostic: anything that turns a finalized
//! waveform into text with token timestamps can sit behind [`SpeechEngine`].
//! The bundled implementation talks to a local recognition server over
//! HTTP; tests script their own.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::audio::SAMPLE_RATE;

/// One recognition hypothesis for a finalized segment. `timestamps` is
/// opaque to the pipeline and only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Recognition {
    pub text: String,
    #[serde(default)]
    pub timestamps: Vec<u32>,
}

pub trait SpeechEngine: Send {
    /// Called when a new utterance starts, before any audio of it is
    /// transcribed. Stateless engines can ignore it.
    fn reset(&mut self) {}

    /// Transcribe a waveform. May return several incremental results; the
    /// pipeline keeps the last non-empty one.
    fn transcribe(&mut self, samples: &[f32], is_final: bool) -> Result<Vec<Recognition>>;
}

/// Client for a local recognition sidecar.
///
/// Ships the segment as little-endian f32 PCM and expects a JSON array of
/// `{text, timestamps}` objects back.
pub struct HttpEngine {
    url: String,
    agent: ureq::Agent,
}

impl HttpEngine {
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self {
            url: url.to_string(),
            agent: ureq::builder().timeout(timeout).build(),
        }
    }
}

impl SpeechEngine for HttpEngine {
    fn transcribe(&mut self, samples: &[f32], is_final: bool) -> Result<Vec<Recognition>> {
        let mut body = Vec::with_capacity(samples.len() * 4);
        for sample in samples {
            body.extend_from_slice(&sample.to_le_bytes());
        }

        let response = self
            .agent
            .post(&self.url)
            .query("sample_rate", &SAMPLE_RATE.to_string())
            .query("is_final", if is_final { "true" } else { "false" })
            .set("content-type", "application/octet-stream")
            .send_bytes(&body)
            .with_context(|| format!("recognition request to {} failed", self.url))?;

        let results: Vec<Recognition> = response
            .into_json()
            .context("malformed recognition response")?;
        debug!(count = results.len(), "recognition results");
        Ok(results)
    }
}

/// Engine used when no recognizer is configured; yields nothing so the
/// pipeline idles instead of failing.
pub struct NullEngine;

impl SpeechEngine for NullEngine {
    fn transcribe(&mut self, _samples: &[f32], _is_final: bool) -> Result<Vec<Recognition>> {
        Ok(Vec::new())
    }
}
