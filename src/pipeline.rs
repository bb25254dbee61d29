//! Pipeline wiring and lifecycle.
//!
//! Two threads: capture pushes fixed frames into a bounded channel, the
//! worker consumes them through the segmenter and, on each finalized
//! utterance, synchronously runs recognition and dispatch. The shared
//! running flag is the only cross-thread state; stop clears it and joins
//! with a bounded timeout.

use flume::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::asr::SpeechEngine;
use crate::audio;
use crate::config::Config;
use crate::dedup::DedupFilter;
use crate::executor::{ControlAction, Executor, Outcome};
use crate::forward::Forwarder;
use crate::segmenter::{SegmentEvent, Segmenter};
use crate::table::CommandTable;

pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

pub struct WorkerOptions {
    /// Segments with fewer voiced samples than this never reach the
    /// recognizer; clicks and pops are cheaper to drop here.
    pub min_speech_samples: usize,
    /// Some(interval) types non-command text through the backend.
    pub dictation_interval: Option<Duration>,
    /// Fallback sink for non-command text.
    pub forward: Option<Forwarder>,
}

pub fn run_worker(
    rx: Receiver<Vec<f32>>,
    mut segmenter: Segmenter,
    mut engine: Box<dyn SpeechEngine>,
    mut executor: Executor,
    options: WorkerOptions,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let mut dedup = DedupFilter::new();

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => {
                for event in segmenter.process_frame(&frame) {
                    handle_event(
                        event,
                        &mut *engine,
                        &mut executor,
                        &mut dedup,
                        &options,
                        &running,
                    );
                }
            }
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}

fn handle_event(
    event: SegmentEvent,
    engine: &mut dyn SpeechEngine,
    executor: &mut Executor,
    dedup: &mut DedupFilter,
    options: &WorkerOptions,
    running: &Arc<AtomicBool>,
) {
    match event {
        SegmentEvent::Start => {
            engine.reset();
            executor.reset();
            dedup.reset();
        }
        SegmentEvent::End {
            samples,
            voiced_samples,
            reason: _,
        } => {
            if voiced_samples < options.min_speech_samples {
                debug!(voiced_samples, "segment below minimum speech, dropped");
                return;
            }

            let results = match engine.transcribe(&samples, true) {
                Ok(results) => results,
                Err(e) => {
                    warn!("recognition failed: {e}");
                    return;
                }
            };
            let Some(rec) = results
                .into_iter()
                .filter(|r| !r.text.trim().is_empty())
                .last()
            else {
                debug!("segment produced no text");
                return;
            };

            if dedup.check(&rec) {
                debug!("duplicate recognition dropped");
                return;
            }
            info!(text = %rec.text, "recognized");

            let text = rec.text.trim();
            match executor.process(text) {
                Outcome::Control(ControlAction::Quit) => {
                    info!("quit requested by voice");
                    running.store(false, Ordering::SeqCst);
                }
                Outcome::Control(ControlAction::StopListening) => {
                    info!("stop requested by voice");
                    running.store(false, Ordering::SeqCst);
                }
                Outcome::NoCommand => {
                    if let Some(interval) = options.dictation_interval {
                        if !executor.type_text(text, interval) {
                            warn!("dictation sink failed");
                        }
                    } else if let Some(forward) = &options.forward {
                        forward.send(text);
                    } else {
                        debug!("no command matched, text ignored");
                    }
                }
                // Dispatched/CoolingDown/Repeated/Failed are logged by the
                // executor; nothing more to do per utterance.
                _ => {}
            }
        }
    }
}

pub struct Listener {
    running: Arc<AtomicBool>,
    capture: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Listener {
    pub fn start(
        config: &Config,
        table: &CommandTable,
        engine: Box<dyn SpeechEngine>,
        backend: Box<dyn crate::backend::KeyBackend>,
    ) -> anyhow::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = flume::bounded::<Vec<f32>>(100);

        let segmenter = Segmenter::new(config.vad.segmenter());
        let executor = Executor::new(table, backend, config.matcher.executor());
        let options = WorkerOptions {
            min_speech_samples: config.vad.segmenter().min_speech_samples(),
            dictation_interval: config
                .dictation
                .enabled
                .then(|| Duration::from_millis(config.dictation.interval_ms)),
            forward: config.forward.url.as_deref().map(Forwarder::new),
        };

        let device = config.audio.device;
        let running_capture = running.clone();
        let capture = thread::spawn(move || {
            if let Err(e) = audio::run_capture(device, tx, running_capture) {
                warn!("capture error: {e}");
            }
        });

        let running_worker = running.clone();
        let worker = thread::spawn(move || {
            if let Err(e) = run_worker(rx, segmenter, engine, executor, options, running_worker) {
                warn!("worker error: {e}");
            }
        });

        Ok(Self {
            running,
            capture: Some(capture),
            worker: Some(worker),
        })
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request shutdown and wait for both threads, at most [`STOP_TIMEOUT`]
    /// each. A thread stuck in a blocking call is detached, not waited on.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            join_with_timeout(handle, "worker", STOP_TIMEOUT);
        }
        if let Some(handle) = self.capture.take() {
            join_with_timeout(handle, "capture", STOP_TIMEOUT);
        }
    }
}

fn join_with_timeout(handle: JoinHandle<()>, label: &str, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    if handle.is_finished() {
        let _ = handle.join();
    } else {
        warn!("{label} thread did not stop within {timeout:?}, detaching");
    }
}
