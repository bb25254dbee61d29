//! The command table: ordered shortcut records plus synonym phrases,
//! persisted as TOML. Loading fails soft — a missing or malformed file
//! degrades to an empty table so the rest of the system keeps running
//! without voice commands.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEntry {
    pub command: String,
    pub keys: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synonym {
    pub phrase: String,
    pub command: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTable {
    #[serde(default)]
    pub shortcuts: Vec<CommandEntry>,
    #[serde(default)]
    pub synonyms: Vec<Synonym>,
}

impl CommandTable {
    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("command table {} not readable ({e}); starting empty", path.display());
                return Self::default();
            }
        };
        let mut table: Self = match toml::from_str(&raw) {
            Ok(table) => table,
            Err(e) => {
                warn!("command table {} is malformed ({e}); starting empty", path.display());
                return Self::default();
            }
        };
        table.dedup_commands();
        info!(
            shortcuts = table.shortcuts.len(),
            synonyms = table.synonyms.len(),
            "command table loaded"
        );
        table
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = toml::to_string_pretty(self).context("serializing command table")?;
        fs::write(path, raw)
            .with_context(|| format!("writing command table {}", path.display()))?;
        Ok(())
    }

    pub fn keys_for(&self, command: &str) -> Option<&str> {
        self.shortcuts
            .iter()
            .find(|entry| entry.command == command)
            .map(|entry| entry.keys.as_str())
    }

    /// Add or update an entry in place. Returns true when an existing
    /// command was updated, false when a new one was appended.
    pub fn set(&mut self, command: &str, keys: &str, description: &str, category: &str) -> bool {
        if let Some(entry) = self
            .shortcuts
            .iter_mut()
            .find(|entry| entry.command == command)
        {
            entry.keys = keys.to_string();
            if !description.is_empty() {
                entry.description = description.to_string();
            }
            if !category.is_empty() {
                entry.category = category.to_string();
            }
            return true;
        }
        self.shortcuts.push(CommandEntry {
            command: command.to_string(),
            keys: keys.to_string(),
            description: description.to_string(),
            category: category.to_string(),
        });
        false
    }

    /// Returns true when the command existed.
    pub fn remove(&mut self, command: &str) -> bool {
        let before = self.shortcuts.len();
        self.shortcuts.retain(|entry| entry.command != command);
        self.shortcuts.len() != before
    }

    pub fn command_names(&self) -> Vec<String> {
        self.shortcuts
            .iter()
            .map(|entry| entry.command.clone())
            .collect()
    }

    pub fn synonym_pairs(&self) -> Vec<(String, String)> {
        self.synonyms
            .iter()
            .map(|s| (s.phrase.clone(), s.command.clone()))
            .collect()
    }

    /// Command names are unique; later duplicates from a hand-edited file
    /// are dropped with a warning.
    fn dedup_commands(&mut self) {
        let mut seen = Vec::new();
        self.shortcuts.retain(|entry| {
            if seen.contains(&entry.command) {
                warn!(command = %entry.command, "duplicate table entry dropped");
                false
            } else {
                seen.push(entry.command.clone());
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CommandTable {
        let mut table = CommandTable::default();
        table.set("copy", "ctrl+c", "Copy selection", "editing");
        table.set("paste", "ctrl+v", "Paste clipboard", "editing");
        table.set("refresh", "f5", "Reload", "browser");
        table.synonyms.push(Synonym {
            phrase: "copy that".into(),
            command: "copy".into(),
        });
        table
    }

    #[test]
    fn set_appends_and_updates_in_place() {
        let mut table = sample();
        assert!(!table.set("save", "ctrl+s", "", ""));
        assert!(table.set("copy", "ctrl+shift+c", "", ""));

        assert_eq!(table.keys_for("copy"), Some("ctrl+shift+c"));
        // updating keeps the original position and description
        assert_eq!(table.shortcuts[0].command, "copy");
        assert_eq!(table.shortcuts[0].description, "Copy selection");
        assert_eq!(table.shortcuts.last().unwrap().command, "save");
    }

    #[test]
    fn remove_reports_whether_anything_was_removed() {
        let mut table = sample();
        assert!(table.remove("paste"));
        assert!(!table.remove("paste"));
        assert_eq!(table.keys_for("paste"), None);
    }

    #[test]
    fn save_and_load_round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.toml");

        let table = sample();
        table.save(&path).unwrap();
        let reloaded = CommandTable::load(&path);

        assert_eq!(reloaded, table);
        let names: Vec<_> = reloaded.command_names();
        assert_eq!(names, vec!["copy", "paste", "refresh"]);
    }

    #[test]
    fn missing_file_loads_as_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let table = CommandTable::load(&dir.path().join("nope.toml"));
        assert!(table.shortcuts.is_empty());
        assert!(table.synonyms.is_empty());
    }

    #[test]
    fn malformed_file_loads_as_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.toml");
        std::fs::write(&path, "shortcuts = \"not a list\"").unwrap();
        let table = CommandTable::load(&path);
        assert!(table.shortcuts.is_empty());
    }

    #[test]
    fn duplicate_commands_are_dropped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.toml");
        std::fs::write(
            &path,
            r#"
[[shortcuts]]
command = "copy"
keys = "ctrl+c"

[[shortcuts]]
command = "copy"
keys = "ctrl+insert"
"#,
        )
        .unwrap();

        let table = CommandTable::load(&path);
        assert_eq!(table.shortcuts.len(), 1);
        assert_eq!(table.keys_for("copy"), Some("ctrl+c"));
    }
}
