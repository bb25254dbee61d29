//! Duplicate suppression for finalized recognitions.
//!
//! Some recognizers re-emit the last result when flushed at a segment
//! boundary. A result is a duplicate only when both the text and the time
//! span equal the immediately preceding finalized result; partial output
//! never passes through here.

use crate::asr::Recognition;

#[derive(Debug, Default)]
pub struct DedupFilter {
    last: Option<(String, Vec<u32>)>,
}

impl DedupFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true for an exact repeat of the previous finalized result;
    /// otherwise remembers this one and returns false.
    pub fn check(&mut self, rec: &Recognition) -> bool {
        if let Some((text, timestamps)) = &self.last {
            if *text == rec.text && *timestamps == rec.timestamps {
                return true;
            }
        }
        self.last = Some((rec.text.clone(), rec.timestamps.clone()));
        false
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
