//! Multi-pass command resolution.
//!
//! Stages run from cheapest and most precise to most permissive, first hit
//! wins, so a literal spoken command can never be shadowed by a fuzzy
//! collision while garbled recognition still has a fallback path:
//!
//! 1. a command name contained in the text
//! 2. a synonym phrase contained in the text
//! 3. the text starting with a command name
//! 4. best fuzzy candidate strictly above the acceptance threshold
//! 5. containment retried with the last char dropped

use tracing::debug;

use crate::matcher::similarity;

pub const DEFAULT_FUZZY_THRESHOLD: f32 = 0.6;

pub struct Resolver {
    commands: Vec<String>,
    synonyms: Vec<(String, String)>,
    fuzzy_threshold: f32,
}

impl Resolver {
    /// `commands` keeps table order; `synonyms` maps phrase to canonical
    /// name and keeps its own order. Both orders break fuzzy-score ties.
    pub fn new(
        commands: Vec<String>,
        synonyms: Vec<(String, String)>,
        fuzzy_threshold: f32,
    ) -> Self {
        Self {
            commands,
            synonyms,
            fuzzy_threshold,
        }
    }

    pub fn resolve(&self, text: &str) -> Option<&str> {
        for cmd in &self.commands {
            if text.contains(cmd.as_str()) {
                return Some(cmd);
            }
        }

        for (phrase, cmd) in &self.synonyms {
            if text.contains(phrase.as_str()) {
                return Some(cmd);
            }
        }

        for cmd in &self.commands {
            if text.starts_with(cmd.as_str()) {
                return Some(cmd);
            }
        }

        if let Some(cmd) = self.best_fuzzy(text) {
            return Some(cmd);
        }

        self.resolve_truncated(text)
    }

    /// Best-scoring candidate across command names and synonym phrases.
    /// Acceptance is strict (`>`), and an equal later score never replaces
    /// an earlier winner.
    fn best_fuzzy(&self, text: &str) -> Option<&str> {
        let mut best: Option<&str> = None;
        let mut best_score = self.fuzzy_threshold;

        for cmd in &self.commands {
            let score = similarity(text, cmd);
            if score > best_score {
                best_score = score;
                best = Some(cmd);
            }
        }
        for (phrase, cmd) in &self.synonyms {
            let score = similarity(text, phrase);
            if score > best_score {
                best_score = score;
                best = Some(cmd);
            }
        }

        if let Some(cmd) = best {
            debug!(score = best_score, command = cmd, "fuzzy match");
        }
        best
    }

    /// Recognizers sometimes append a stray trailing character; retry the
    /// containment pass without it.
    fn resolve_truncated(&self, text: &str) -> Option<&str> {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= 2 {
            return None;
        }
        let truncated: String = chars[..chars.len() - 1].iter().collect();
        for cmd in &self.commands {
            if *cmd == truncated || truncated.contains(cmd.as_str()) {
                return Some(cmd);
            }
        }
        None
    }
}
