use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::executor::ExecutorConfig;
use crate::segmenter::SegmenterConfig;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub vad: VadConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub table: TableConfig,
    #[serde(default)]
    pub asr: AsrConfig,
    #[serde(default)]
    pub dictation: DictationConfig,
    #[serde(default)]
    pub forward: ForwardConfig,
}

#[derive(Debug, Deserialize, Default)]
pub struct AudioConfig {
    /// Input device by enumeration id; None picks the system default.
    #[serde(default)]
    pub device: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct VadConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_speech_pad_ms")]
    pub speech_pad_ms: u32,
    #[serde(default = "default_min_speech_ms")]
    pub min_speech_ms: u32,
    #[serde(default = "default_max_silence_ms")]
    pub max_silence_ms: u32,
    #[serde(default = "default_smooth_window")]
    pub smooth_window: usize,
    #[serde(default = "default_energy_horizon")]
    pub energy_horizon: usize,
    #[serde(default = "default_noise_floor_factor")]
    pub noise_floor_factor: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            speech_pad_ms: default_speech_pad_ms(),
            min_speech_ms: default_min_speech_ms(),
            max_silence_ms: default_max_silence_ms(),
            smooth_window: default_smooth_window(),
            energy_horizon: default_energy_horizon(),
            noise_floor_factor: default_noise_floor_factor(),
        }
    }
}

impl VadConfig {
    pub fn segmenter(&self) -> SegmenterConfig {
        SegmenterConfig {
            base_threshold: self.threshold,
            speech_pad_ms: self.speech_pad_ms,
            min_speech_ms: self.min_speech_ms,
            max_silence_ms: self.max_silence_ms,
            smooth_window: self.smooth_window,
            energy_horizon: self.energy_horizon,
            noise_floor_factor: self.noise_floor_factor,
        }
    }
}

fn default_threshold() -> f32 {
    0.015
}
fn default_speech_pad_ms() -> u32 {
    800
}
fn default_min_speech_ms() -> u32 {
    250
}
fn default_max_silence_ms() -> u32 {
    1500
}
fn default_smooth_window() -> usize {
    5
}
fn default_energy_horizon() -> usize {
    20
}
fn default_noise_floor_factor() -> f32 {
    1.5
}

#[derive(Debug, Deserialize)]
pub struct MatcherConfig {
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: f32,
    #[serde(default = "default_repeat_threshold")]
    pub repeat_threshold: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: default_fuzzy_threshold(),
            cooldown_secs: default_cooldown_secs(),
            repeat_threshold: default_repeat_threshold(),
        }
    }
}

impl MatcherConfig {
    pub fn executor(&self) -> ExecutorConfig {
        ExecutorConfig {
            cooldown: Duration::from_secs_f32(self.cooldown_secs),
            repeat_threshold: self.repeat_threshold,
            fuzzy_threshold: self.fuzzy_threshold,
        }
    }
}

fn default_fuzzy_threshold() -> f32 {
    0.6
}
fn default_cooldown_secs() -> f32 {
    2.0
}
fn default_repeat_threshold() -> f32 {
    0.8
}

#[derive(Debug, Deserialize)]
pub struct TableConfig {
    #[serde(default = "default_table_path")]
    pub path: PathBuf,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            path: default_table_path(),
        }
    }
}

fn default_table_path() -> PathBuf {
    PathBuf::from("commands.toml")
}

#[derive(Debug, Deserialize)]
pub struct AsrConfig {
    /// Recognition sidecar endpoint; None disables recognition.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_asr_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_asr_timeout_secs(),
        }
    }
}

fn default_asr_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize)]
pub struct DictationConfig {
    /// Type non-command text into the focused application.
    #[serde(default)]
    pub enabled: bool,
    /// "direct" or "clipboard".
    #[serde(default = "default_input_method")]
    pub method: String,
    /// Per-character delay for direct typing.
    #[serde(default)]
    pub interval_ms: u64,
}

impl Default for DictationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            method: default_input_method(),
            interval_ms: 0,
        }
    }
}

fn default_input_method() -> String {
    "direct".into()
}

#[derive(Debug, Deserialize, Default)]
pub struct ForwardConfig {
    /// Endpoint for non-command text; None disables forwarding.
    #[serde(default)]
    pub url: Option<String>,
}

impl Config {
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.unwrap_or_else(|| Path::new("config.toml"));
        if !path.exists() {
            return Config::default();
        }
        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    warn!("config {} is malformed ({e}); using defaults", path.display());
                    Config::default()
                }
            },
            Err(e) => {
                warn!("config {} not readable ({e}); using defaults", path.display());
                Config::default()
            }
        }
    }
}
