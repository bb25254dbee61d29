use cpal::traits::{DeviceTrait, StreamTrait};
use flume::Sender;
use rubato::{FftFixedIn, Resampler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::devices;

pub const SAMPLE_RATE: usize = 16000;
pub const FRAME_MS: usize = 100;
/// Samples per 100ms tick at 16kHz.
pub const FRAME_SAMPLES: usize = SAMPLE_RATE * FRAME_MS / 1000;

const RESAMPLE_CHUNK: usize = 1024;

/// Resamples arbitrary-rate input and re-slices it into fixed frames.
pub struct FrameResampler {
    resampler: Option<FftFixedIn<f32>>,
    in_buf: Vec<f32>,
    pending: Vec<f32>,
    frame_samples: usize,
}

impl FrameResampler {
    pub fn new(in_hz: usize, out_hz: usize, frame_samples: usize) -> Self {
        let resampler = (in_hz != out_hz)
            .then(|| FftFixedIn::<f32>::new(in_hz, out_hz, RESAMPLE_CHUNK, 1, 1).unwrap());
        Self {
            resampler,
            in_buf: Vec::with_capacity(RESAMPLE_CHUNK),
            pending: Vec::with_capacity(frame_samples),
            frame_samples,
        }
    }

    pub fn push(&mut self, src: &[f32], mut emit: impl FnMut(&[f32])) {
        if self.resampler.is_none() {
            self.emit_frames(src, &mut emit);
            return;
        }

        self.in_buf.extend_from_slice(src);

        while self.in_buf.len() >= RESAMPLE_CHUNK {
            let chunk: Vec<f32> = self.in_buf.drain(..RESAMPLE_CHUNK).collect();
            if let Ok(out) = self.resampler.as_mut().unwrap().process(&[&chunk], None) {
                self.emit_frames(&out[0], &mut emit);
            }
        }
    }

    fn emit_frames(&mut self, data: &[f32], emit: &mut impl FnMut(&[f32])) {
        self.pending.extend_from_slice(data);

        while self.pending.len() >= self.frame_samples {
            let frame: Vec<f32> = self.pending.drain(..self.frame_samples).collect();
            emit(&frame);
        }
    }
}

/// Capture from an input device and push 100ms 16kHz mono frames into the
/// channel until the running flag clears.
pub fn run_capture(
    device_id: Option<usize>,
    tx: Sender<Vec<f32>>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let device = devices::open(device_id)?;
    let supported = device.default_input_config()?;
    let input_rate = u32::from(supported.sample_rate()) as usize;
    let channels = supported.channels() as usize;

    let device_name = device.name().unwrap_or_else(|_| "unknown".into());
    info!(
        device = %device_name,
        input_rate,
        channels,
        "capture started ({}Hz mono out)",
        SAMPLE_RATE
    );

    let mut resampler = FrameResampler::new(input_rate, SAMPLE_RATE, FRAME_SAMPLES);

    let stream = device.build_input_stream(
        &supported.config(),
        move |data: &[f32], _| {
            let mono: Vec<f32> = if channels == 1 {
                data.to_vec()
            } else {
                data.chunks(channels)
                    .map(|c| c.iter().sum::<f32>() / channels as f32)
                    .collect()
            };
            resampler.push(&mono, |frame| {
                let _ = tx.send(frame.to_vec());
            });
        },
        |e| warn!("input stream error: {e}"),
        None,
    )?;
    stream.play()?;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_slices_into_fixed_frames() {
        let mut resampler = FrameResampler::new(SAMPLE_RATE, SAMPLE_RATE, FRAME_SAMPLES);
        let mut frames = Vec::new();

        // 2.5 frames worth of input arrives in odd-sized chunks
        resampler.push(&vec![0.1; 1000], |f| frames.push(f.to_vec()));
        resampler.push(&vec![0.1; 3000], |f| frames.push(f.to_vec()));

        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.len() == FRAME_SAMPLES));
    }

    #[test]
    fn resampler_converts_48k_to_16k() {
        let mut resampler = FrameResampler::new(48000, SAMPLE_RATE, FRAME_SAMPLES);
        let mut out_samples = 0usize;

        // ~1 second of 48kHz input in resampler-sized chunks
        for _ in 0..47 {
            resampler.push(&vec![0.0; 1024], |f| out_samples += f.len());
        }
        // ~16k samples out, quantized to whole frames and minus what is
        // still pending in the frame buffer
        assert!(out_samples >= 8 * FRAME_SAMPLES && out_samples <= 11 * FRAME_SAMPLES);
    }
}
