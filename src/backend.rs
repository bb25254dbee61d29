//! Key-injection backends.
//!
//! A backend is a capability: it either delivers the keystrokes or reports
//! failure, and the caller treats a false return as a logged miss, never a
//! crash. [`EnigoBackend`] is the real implementation; [`NullBackend`]
//! stands in when no injection facility is available.

use std::thread;
use std::time::Duration;

use arboard::Clipboard;
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use tracing::{debug, warn};

#[derive(Debug)]
pub enum BackendError {
    Init(String),
    Clipboard(String),
    UnknownKey(String),
    Injection(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Init(msg) => write!(f, "backend init failed: {}", msg),
            BackendError::Clipboard(msg) => write!(f, "clipboard error: {}", msg),
            BackendError::UnknownKey(name) => write!(f, "unknown key name: {}", name),
            BackendError::Injection(msg) => write!(f, "key injection failed: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

pub trait KeyBackend: Send {
    fn send_key(&mut self, name: &str) -> bool;
    fn send_hotkey(&mut self, names: &[&str]) -> bool;
    fn type_text(&mut self, text: &str, interval: Duration) -> bool;
    fn is_available(&self) -> bool;
    fn name(&self) -> &'static str;
}

/// How text reaches the focused application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputMethod {
    /// Native per-character input (default).
    #[default]
    Direct,
    /// Copy to the clipboard and paste, restoring the old contents after.
    Clipboard,
}

impl InputMethod {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "clipboard" => InputMethod::Clipboard,
            _ => InputMethod::Direct,
        }
    }
}

pub struct EnigoBackend {
    enigo: Enigo,
    clipboard: Clipboard,
    method: InputMethod,
}

impl EnigoBackend {
    pub fn new(method: InputMethod) -> Result<Self, BackendError> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| BackendError::Init(e.to_string()))?;
        let clipboard = Clipboard::new().map_err(|e| BackendError::Clipboard(e.to_string()))?;
        Ok(Self {
            enigo,
            clipboard,
            method,
        })
    }

    fn click(&mut self, key: Key) -> Result<(), BackendError> {
        self.enigo
            .key(key, Direction::Click)
            .map_err(|e| BackendError::Injection(e.to_string()))
    }

    /// Hold every key but the last, click the last, release in reverse.
    fn chord(&mut self, keys: &[Key]) -> Result<(), BackendError> {
        let Some((main, modifiers)) = keys.split_last() else {
            return Err(BackendError::Injection("empty chord".into()));
        };

        for modifier in modifiers {
            self.enigo
                .key(*modifier, Direction::Press)
                .map_err(|e| BackendError::Injection(e.to_string()))?;
        }
        thread::sleep(Duration::from_millis(10));

        let clicked = self.click(*main);

        thread::sleep(Duration::from_millis(10));
        for modifier in modifiers.iter().rev() {
            if let Err(e) = self.enigo.key(*modifier, Direction::Release) {
                warn!("failed to release modifier: {e}");
            }
        }
        clicked
    }

    fn type_via_clipboard(&mut self, text: &str) -> Result<(), BackendError> {
        let previous = self.clipboard.get_text().ok();

        self.clipboard
            .set_text(text)
            .map_err(|e| BackendError::Clipboard(e.to_string()))?;
        thread::sleep(Duration::from_millis(50));

        let pasted = self.chord(&[platform_modifier(), Key::Unicode('v')]);
        thread::sleep(Duration::from_millis(100));

        if let Some(previous) = previous {
            let _ = self.clipboard.set_text(previous);
        }
        pasted
    }
}

impl KeyBackend for EnigoBackend {
    fn send_key(&mut self, name: &str) -> bool {
        let outcome = parse_key(name).and_then(|key| self.click(key));
        match outcome {
            Ok(()) => {
                debug!(key = name, "key sent");
                true
            }
            Err(e) => {
                warn!("send_key {name}: {e}");
                false
            }
        }
    }

    fn send_hotkey(&mut self, names: &[&str]) -> bool {
        if names.is_empty() {
            return false;
        }
        let keys: Result<Vec<Key>, _> = names.iter().map(|name| parse_key(name)).collect();
        let outcome = keys.and_then(|keys| self.chord(&keys));
        match outcome {
            Ok(()) => {
                debug!(hotkey = names.join("+"), "hotkey sent");
                true
            }
            Err(e) => {
                warn!("send_hotkey {}: {e}", names.join("+"));
                false
            }
        }
    }

    fn type_text(&mut self, text: &str, interval: Duration) -> bool {
        if text.is_empty() {
            return true;
        }
        let outcome = match self.method {
            InputMethod::Clipboard => self.type_via_clipboard(text),
            InputMethod::Direct => {
                if interval.is_zero() {
                    self.enigo
                        .text(text)
                        .map_err(|e| BackendError::Injection(e.to_string()))
                } else {
                    let mut result = Ok(());
                    for c in text.chars() {
                        result = self.click(Key::Unicode(c));
                        if result.is_err() {
                            break;
                        }
                        thread::sleep(interval);
                    }
                    result
                }
            }
        };
        match outcome {
            Ok(()) => true,
            Err(e) => {
                warn!("type_text: {e}");
                false
            }
        }
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "enigo"
    }
}

/// Fallback when no injection facility could be initialized. Every
/// dispatch fails closed.
pub struct NullBackend;

impl KeyBackend for NullBackend {
    fn send_key(&mut self, _name: &str) -> bool {
        false
    }

    fn send_hotkey(&mut self, _names: &[&str]) -> bool {
        false
    }

    fn type_text(&mut self, _text: &str, _interval: Duration) -> bool {
        false
    }

    fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

fn platform_modifier() -> Key {
    #[cfg(target_os = "macos")]
    {
        Key::Meta
    }
    #[cfg(not(target_os = "macos"))]
    {
        Key::Control
    }
}

/// Map a configured key name to an enigo key. Single unknown characters
/// fall through as literal unicode input; longer unknown names are errors.
fn parse_key(name: &str) -> Result<Key, BackendError> {
    let normalized = name.trim().to_lowercase();
    let key = match normalized.as_str() {
        "ctrl" | "control" => Key::Control,
        "alt" | "option" => Key::Alt,
        "shift" => Key::Shift,
        "cmd" | "meta" | "win" | "super" => Key::Meta,
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "space" => Key::Space,
        "esc" | "escape" => Key::Escape,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "page up" => Key::PageUp,
        "pagedown" | "page down" => Key::PageDown,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "volumeup" | "volume up" => Key::VolumeUp,
        "volumedown" | "volume down" => Key::VolumeDown,
        "volumemute" | "mute" => Key::VolumeMute,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Unicode(c),
                _ => return Err(BackendError::UnknownKey(name.to_string())),
            }
        }
    };
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_method_parse() {
        assert_eq!(InputMethod::parse("direct"), InputMethod::Direct);
        assert_eq!(InputMethod::parse("Clipboard"), InputMethod::Clipboard);
        assert_eq!(InputMethod::parse("whatever"), InputMethod::Direct);
    }

    #[test]
    fn named_keys_parse() {
        assert!(matches!(parse_key("ctrl"), Ok(Key::Control)));
        assert!(matches!(parse_key("F5"), Ok(Key::F5)));
        assert!(matches!(parse_key(" enter "), Ok(Key::Return)));
        assert!(matches!(parse_key("volume up"), Ok(Key::VolumeUp)));
    }

    #[test]
    fn single_chars_become_unicode_keys() {
        assert!(matches!(parse_key("c"), Ok(Key::Unicode('c'))));
        assert!(matches!(parse_key("V"), Ok(Key::Unicode('v'))));
    }

    #[test]
    fn unknown_multi_char_names_are_rejected() {
        assert!(matches!(
            parse_key("hyperdrive"),
            Err(BackendError::UnknownKey(_))
        ));
    }

    #[test]
    fn null_backend_fails_closed() {
        let mut backend = NullBackend;
        assert!(!backend.is_available());
        assert!(!backend.send_key("a"));
        assert!(!backend.send_hotkey(&["ctrl", "c"]));
        assert!(!backend.type_text("hello", Duration::ZERO));
    }
}
