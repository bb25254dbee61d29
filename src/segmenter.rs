use std::collections::VecDeque;
use tracing::debug;

use crate::audio::SAMPLE_RATE;
use crate::energy::EnergyEstimator;

const ACTIVITY_HORIZON: usize = 10;
const ACTIVITY_VOTE_SPAN: usize = 3;
const ACTIVITY_VOTE_MIN: usize = 2;

/// Why a segment was closed.
///
/// `Padding` is the normal path: enough trailing silence after real speech.
/// `MaxSilence` is the safety bound against utterances that never settle.
/// Downstream handling is identical; the tag exists for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Padding,
    MaxSilence,
}

#[derive(Debug, Clone)]
pub enum SegmentEvent {
    /// Speech onset confirmed. Carries no audio; buffering starts with the
    /// triggering frame.
    Start,
    /// Utterance finished. `samples` is the full buffered waveform including
    /// trailing silence; `voiced_samples` counts only frames classified as
    /// voiced, for the caller's minimum-speech check.
    End {
        samples: Vec<f32>,
        voiced_samples: usize,
        reason: EndReason,
    },
}

#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    pub base_threshold: f32,
    pub speech_pad_ms: u32,
    pub min_speech_ms: u32,
    pub max_silence_ms: u32,
    pub smooth_window: usize,
    pub energy_horizon: usize,
    pub noise_floor_factor: f32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            base_threshold: 0.015,
            speech_pad_ms: 800,
            min_speech_ms: 250,
            max_silence_ms: 1500,
            smooth_window: 5,
            energy_horizon: 20,
            noise_floor_factor: 1.5,
        }
    }
}

impl SegmenterConfig {
    pub fn min_speech_samples(&self) -> usize {
        ms_to_samples(self.min_speech_ms)
    }
}

fn ms_to_samples(ms: u32) -> usize {
    ms as usize * SAMPLE_RATE / 1000
}

/// Two-state voice activity segmenter over the energy stream.
///
/// Feed it fixed-tick frames; it returns the transition events for each
/// frame. Pure with respect to its input: any finite frame sequence is
/// handled, and an all-silent stream never produces an event.
pub struct Segmenter {
    energy: EnergyEstimator,
    base_threshold: f32,
    noise_floor_factor: f32,
    pad_samples: usize,
    min_speech_samples: usize,
    max_silence_samples: usize,

    in_speech: bool,
    buffer: Vec<f32>,
    silence_samples: usize,
    voiced_samples: usize,
    activity: VecDeque<bool>,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            energy: EnergyEstimator::new(config.smooth_window, config.energy_horizon),
            base_threshold: config.base_threshold,
            noise_floor_factor: config.noise_floor_factor,
            pad_samples: ms_to_samples(config.speech_pad_ms),
            min_speech_samples: ms_to_samples(config.min_speech_ms),
            max_silence_samples: ms_to_samples(config.max_silence_ms),
            in_speech: false,
            buffer: Vec::new(),
            silence_samples: 0,
            voiced_samples: 0,
            activity: VecDeque::with_capacity(ACTIVITY_HORIZON + 1),
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.in_speech
    }

    /// Process one audio frame, returning zero or more transition events.
    pub fn process_frame(&mut self, frame: &[f32]) -> Vec<SegmentEvent> {
        let mut events = Vec::new();

        let (raw, smoothed) = self.energy.push(frame);
        if !self.in_speech {
            self.energy.update_noise_floor();
        }

        let threshold = self
            .base_threshold
            .max(self.energy.noise_floor() * self.noise_floor_factor);
        let voiced = self.vote(smoothed > threshold);

        if voiced {
            if !self.in_speech {
                self.in_speech = true;
                self.buffer.clear();
                self.silence_samples = 0;
                self.voiced_samples = 0;
                debug!(
                    raw,
                    smoothed, threshold, "speech start"
                );
                events.push(SegmentEvent::Start);
            }
            self.buffer.extend_from_slice(frame);
            self.voiced_samples += frame.len();
            self.silence_samples = 0;
        } else if self.in_speech {
            // Trailing silence stays in the buffer so the recognizer sees a
            // natural utterance boundary.
            self.buffer.extend_from_slice(frame);
            self.silence_samples += frame.len();

            if self.buffer.len() >= self.min_speech_samples {
                let reason = if self.silence_samples >= self.pad_samples {
                    Some(EndReason::Padding)
                } else if self.silence_samples >= self.max_silence_samples {
                    Some(EndReason::MaxSilence)
                } else {
                    None
                };

                if let Some(reason) = reason {
                    let samples = std::mem::take(&mut self.buffer);
                    debug!(
                        ?reason,
                        duration_ms = samples.len() * 1000 / SAMPLE_RATE,
                        silence_ms = self.silence_samples * 1000 / SAMPLE_RATE,
                        "speech end"
                    );
                    events.push(SegmentEvent::End {
                        samples,
                        voiced_samples: self.voiced_samples,
                        reason,
                    });
                    self.in_speech = false;
                    self.silence_samples = 0;
                    self.voiced_samples = 0;
                    self.activity.clear();
                }
            }
        }

        events
    }

    /// Hysteresis over the instantaneous voice flag: a frame counts as
    /// voiced when at least 2 of the last 3 flags are set, so single-frame
    /// spikes and dropouts cannot toggle the state.
    fn vote(&mut self, flag: bool) -> bool {
        self.activity.push_back(flag);
        if self.activity.len() > ACTIVITY_HORIZON {
            self.activity.pop_front();
        }
        if self.activity.len() >= ACTIVITY_VOTE_SPAN {
            let recent = self
                .activity
                .iter()
                .rev()
                .take(ACTIVITY_VOTE_SPAN)
                .filter(|&&v| v)
                .count();
            if recent >= ACTIVITY_VOTE_MIN {
                return true;
            }
        }
        flag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FRAME_SAMPLES;

    fn frame(level: f32) -> Vec<f32> {
        vec![level; FRAME_SAMPLES]
    }

    fn feed(seg: &mut Segmenter, level: f32, count: usize) -> Vec<SegmentEvent> {
        let mut events = Vec::new();
        for _ in 0..count {
            events.extend(seg.process_frame(&frame(level)));
        }
        events
    }

    #[test]
    fn silence_never_starts_speech() {
        let mut seg = Segmenter::new(SegmenterConfig::default());
        let events = feed(&mut seg, 0.0, 100);
        assert!(events.is_empty());
        assert!(!seg.is_speaking());
    }

    #[test]
    fn utterance_emits_one_start_and_one_end() {
        let mut seg = Segmenter::new(SegmenterConfig::default());

        let mut events = feed(&mut seg, 0.0, 5);
        // 500ms of speech, then enough silence to cross the 800ms pad. The
        // moving average and the activity vote stretch the voiced span past
        // the last loud frame, so give the tail generous room.
        events.extend(feed(&mut seg, 0.2, 5));
        events.extend(feed(&mut seg, 0.0, 20));

        let starts = events
            .iter()
            .filter(|e| matches!(e, SegmentEvent::Start))
            .count();
        assert_eq!(starts, 1);

        let ends: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                SegmentEvent::End {
                    samples,
                    voiced_samples,
                    reason,
                } => Some((samples.len(), *voiced_samples, *reason)),
                _ => None,
            })
            .collect();
        assert_eq!(ends.len(), 1);

        let (len, voiced, reason) = ends[0];
        assert_eq!(reason, EndReason::Padding);
        // Every frame between the transitions is retained, trailing silence
        // included, and the buffer length is a whole number of frames.
        assert_eq!(len % FRAME_SAMPLES, 0);
        assert!(len >= 5 * FRAME_SAMPLES);
        assert!(voiced >= 5 * FRAME_SAMPLES);
        assert!(voiced <= len);
        assert!(!seg.is_speaking());
    }

    #[test]
    fn emitted_waveform_spans_start_to_end() {
        let mut seg = Segmenter::new(SegmenterConfig::default());

        let mut appended = 0usize;
        let mut emitted = None;

        for i in 0..40 {
            let level = if (5..10).contains(&i) { 0.2 } else { 0.0 };
            let events = seg.process_frame(&frame(level));
            let ended = events
                .iter()
                .any(|e| matches!(e, SegmentEvent::End { .. }));
            // A frame is buffered whenever the machine is (still) in speech
            // after seeing it, or when that frame closed the segment.
            if seg.is_speaking() || ended {
                appended += FRAME_SAMPLES;
            }
            for event in events {
                if let SegmentEvent::End { samples, .. } = event {
                    emitted = Some(samples.len());
                }
            }
        }

        assert_eq!(emitted, Some(appended));
    }

    #[test]
    fn short_burst_fails_the_min_speech_predicate() {
        // A long minimum makes the voiced smear from the moving average
        // irrelevant: one loud frame cannot reach a second of voiced audio.
        let config = SegmenterConfig {
            min_speech_ms: 1000,
            speech_pad_ms: 500,
            ..SegmenterConfig::default()
        };
        let min_samples = config.min_speech_samples();
        let mut seg = Segmenter::new(config);

        let mut events = feed(&mut seg, 0.0, 5);
        events.extend(feed(&mut seg, 0.3, 1));
        events.extend(feed(&mut seg, 0.0, 30));

        for event in events {
            if let SegmentEvent::End { voiced_samples, .. } = event {
                assert!(voiced_samples < min_samples);
            }
        }
    }

    #[test]
    fn noise_floor_raises_the_threshold() {
        // Ambient hum at 0.012 sits under the base threshold but lifts the
        // dynamic one to 0.018, so a level that would clear the base
        // threshold alone must not trigger.
        let mut seg = Segmenter::new(SegmenterConfig::default());
        let mut events = feed(&mut seg, 0.012, 30);
        events.extend(feed(&mut seg, 0.016, 20));
        assert!(events.is_empty());
    }

    #[test]
    fn consecutive_utterances_are_segmented_independently() {
        let mut seg = Segmenter::new(SegmenterConfig::default());

        let mut events = feed(&mut seg, 0.0, 5);
        events.extend(feed(&mut seg, 0.2, 5));
        events.extend(feed(&mut seg, 0.0, 20));
        events.extend(feed(&mut seg, 0.2, 5));
        events.extend(feed(&mut seg, 0.0, 20));

        let starts = events
            .iter()
            .filter(|e| matches!(e, SegmentEvent::Start))
            .count();
        let ends = events
            .iter()
            .filter(|e| matches!(e, SegmentEvent::End { .. }))
            .count();
        assert_eq!(starts, 2);
        assert_eq!(ends, 2);
    }
}
