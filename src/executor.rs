//! Utterance-to-action dispatch with cooldown and repeat suppression.
//!
//! One finalized utterance goes in, exactly one outcome comes out:
//! the text is checked against the previous utterance, resolved to a
//! command, cooldown-gated, then dispatched to the backend. The whole
//! path is synchronous; the worker drives it one utterance at a time.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::backend::KeyBackend;
use crate::matcher::similarity;
use crate::resolver::Resolver;
use crate::table::CommandTable;

/// Commands that steer the pipeline itself instead of sending keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Quit,
    StopListening,
}

/// A dispatchable registry entry. Keeping this a plain value (rather than
/// a closure per command) makes the table inspectable and testable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    Keys(String),
    Control(ControlAction),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Keys were delivered for this command.
    Dispatched(String),
    /// A control command resolved; the caller decides what it means.
    Control(ControlAction),
    /// Same command fired too recently.
    CoolingDown(String),
    /// Near-repeat of the previous utterance text, dropped before
    /// resolution.
    Repeated,
    /// Nothing matched; the text is ordinary content.
    NoCommand,
    /// The backend refused or had no binding for the command.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub cooldown: Duration,
    pub repeat_threshold: f32,
    pub fuzzy_threshold: f32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(2),
            repeat_threshold: 0.8,
            fuzzy_threshold: crate::resolver::DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

pub struct Executor {
    registry: Vec<(String, CommandSpec)>,
    resolver: Resolver,
    backend: Box<dyn KeyBackend>,
    cooldown: Duration,
    repeat_threshold: f32,

    last_command: Option<String>,
    last_command_at: Option<Instant>,
    last_text: String,
}

impl Executor {
    pub fn new(table: &CommandTable, backend: Box<dyn KeyBackend>, config: ExecutorConfig) -> Self {
        let mut registry: Vec<(String, CommandSpec)> = vec![
            ("quit".into(), CommandSpec::Control(ControlAction::Quit)),
            (
                "stop listening".into(),
                CommandSpec::Control(ControlAction::StopListening),
            ),
        ];
        for entry in &table.shortcuts {
            if registry.iter().any(|(name, _)| *name == entry.command) {
                warn!(command = %entry.command, "table entry shadows a builtin, skipped");
                continue;
            }
            registry.push((entry.command.clone(), CommandSpec::Keys(entry.keys.clone())));
        }

        let names = registry.iter().map(|(name, _)| name.clone()).collect();
        let resolver = Resolver::new(names, table.synonym_pairs(), config.fuzzy_threshold);

        if !backend.is_available() {
            warn!(backend = backend.name(), "key backend unavailable, dispatches will fail");
        }

        Self {
            registry,
            resolver,
            backend,
            cooldown: config.cooldown,
            repeat_threshold: config.repeat_threshold,
            last_command: None,
            last_command_at: None,
            last_text: String::new(),
        }
    }

    pub fn process(&mut self, text: &str) -> Outcome {
        self.process_at(text, Instant::now())
    }

    pub fn process_at(&mut self, raw: &str, now: Instant) -> Outcome {
        let text = raw.trim().to_lowercase();
        if text.is_empty() {
            return Outcome::NoCommand;
        }

        // Recognizers at a segment boundary sometimes re-emit the tail of
        // the previous utterance; drop near-repeats before resolving.
        if !self.last_text.is_empty()
            && similarity(&text, &self.last_text) > self.repeat_threshold
        {
            debug!(%text, "near-repeat of previous utterance dropped");
            return Outcome::Repeated;
        }

        let Some(command) = self.resolver.resolve(&text).map(str::to_string) else {
            return Outcome::NoCommand;
        };

        if self.in_cooldown(&command, now) {
            info!(%command, "command is cooling down");
            return Outcome::CoolingDown(command);
        }

        // A synonym can point at a command that was removed from the table;
        // treat that as a failed dispatch, not a panic.
        let Some(spec) = self
            .registry
            .iter()
            .find(|(name, _)| *name == command)
            .map(|(_, spec)| spec.clone())
        else {
            warn!(%command, "resolved command has no registered binding");
            return Outcome::Failed(command);
        };

        let outcome = match spec {
            CommandSpec::Control(action) => {
                info!(%command, ?action, "control command");
                Outcome::Control(action)
            }
            CommandSpec::Keys(keys) => {
                let tokens: Vec<&str> = keys
                    .split('+')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect();
                let delivered = match tokens.as_slice() {
                    [] => {
                        warn!(%command, "empty key binding");
                        false
                    }
                    [key] => self.backend.send_key(key),
                    chord => self.backend.send_hotkey(chord),
                };
                if delivered {
                    info!(%command, %keys, "dispatched");
                    Outcome::Dispatched(command.clone())
                } else {
                    warn!(%command, %keys, "dispatch failed");
                    Outcome::Failed(command.clone())
                }
            }
        };

        if !matches!(outcome, Outcome::Failed(_)) {
            self.last_command = Some(command);
            self.last_command_at = Some(now);
            self.last_text = text;
        }
        outcome
    }

    /// Called when a new utterance starts. Clears the repeat-suppression
    /// text so independent utterances are judged on their own; the cooldown
    /// clock keeps running and expires by time, otherwise it could never
    /// gate the same command spoken twice in a row.
    pub fn reset(&mut self) {
        self.last_text.clear();
    }

    /// Forward plain text to the backend (the dictation sink).
    pub fn type_text(&mut self, text: &str, interval: Duration) -> bool {
        self.backend.type_text(text, interval)
    }

    pub fn registry(&self) -> &[(String, CommandSpec)] {
        &self.registry
    }

    fn in_cooldown(&self, command: &str, now: Instant) -> bool {
        match (&self.last_command, self.last_command_at) {
            (Some(last), Some(at)) if last == command => {
                now.duration_since(at) < self.cooldown
            }
            _ => false,
        }
    }
}
