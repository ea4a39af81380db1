//! The production playback engine: decoded PCM through cpal, utterances
//! through a spawned espeak-ng process. Both kinds of source are stopped by
//! setting a shared flag their worker thread watches.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::playback::{ActiveSource, PlaybackEngine, PlaybackResult};
use crate::audio::{PcmAudio, PlayableResource};
use crate::error::{AgentError, Result};

/// Poll interval for completion/stop checks.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Input block size for the resampler.
const RESAMPLE_CHUNK: usize = 1024;

/// A live source stopped by raising a flag; the worker thread notices and
/// winds down on its own. Setting the flag twice, or after the worker has
/// finished, does nothing.
struct FlagSource {
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl ActiveSource for FlagSource {
    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

pub struct CpalEngine;

impl CpalEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CpalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackEngine for CpalEngine {
    fn start(
        &mut self,
        resource: PlayableResource,
        done: Sender<PlaybackResult>,
    ) -> Result<Box<dyn ActiveSource>> {
        let stop = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        match resource {
            PlayableResource::Pcm(pcm) => {
                let flag = Arc::clone(&stop);
                let ended = Arc::clone(&finished);
                thread::spawn(move || {
                    let result = match play_pcm(&pcm, &flag) {
                        Ok(true) => PlaybackResult::Completed,
                        Ok(false) => PlaybackResult::Stopped,
                        Err(e) => PlaybackResult::Failed(e.to_string()),
                    };
                    ended.store(true, Ordering::Release);
                    let _ = done.send(result);
                });
            }
            PlayableResource::Utterance { text, voice } => {
                let child = Command::new("espeak-ng")
                    .arg("-v")
                    .arg(&voice)
                    .arg(&text)
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .map_err(|e| AgentError::Playback(format!("spawn espeak-ng: {}", e)))?;

                let flag = Arc::clone(&stop);
                let ended = Arc::clone(&finished);
                thread::spawn(move || {
                    let result = watch_utterance(child, &flag);
                    ended.store(true, Ordering::Release);
                    let _ = done.send(result);
                });
            }
        }

        Ok(Box::new(FlagSource { stop, finished }))
    }
}

/// Play decoded PCM on the default output device. Returns Ok(true) on
/// natural completion, Ok(false) when stopped.
fn play_pcm(pcm: &PcmAudio, stop: &Arc<AtomicBool>) -> Result<bool> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AgentError::Playback("no output device".to_string()))?;

    let supported = device
        .default_output_config()
        .map_err(|e| AgentError::Playback(format!("output config: {}", e)))?;
    let device_rate = supported.sample_rate().0;
    let config: cpal::StreamConfig = supported.config();
    let channels = config.channels as usize;

    let samples = if pcm.sample_rate == device_rate {
        pcm.samples.clone()
    } else {
        resample(&pcm.samples, pcm.sample_rate, device_rate)?
    };

    if samples.is_empty() {
        return Ok(true);
    }

    let duration_ms = (samples.len() as u64 * 1000) / u64::from(device_rate);

    let samples = Arc::new(samples);
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let cb_samples = Arc::clone(&samples);
    let cb_position = Arc::clone(&position);
    let cb_finished = Arc::clone(&finished);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pos = cb_position.load(Ordering::Acquire);
                for frame in data.chunks_mut(channels) {
                    let sample = if pos < cb_samples.len() {
                        let s = cb_samples[pos];
                        pos += 1;
                        s
                    } else {
                        cb_finished.store(true, Ordering::Release);
                        0.0
                    };
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
                cb_position.store(pos, Ordering::Release);
            },
            |err| {
                log::error!("output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AgentError::Playback(format!("build stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| AgentError::Playback(format!("start stream: {}", e)))?;

    // Wait for the buffer to drain, the stop flag, or a stuck device.
    let deadline = Instant::now() + Duration::from_millis(duration_ms + 500);
    loop {
        if stop.load(Ordering::Acquire) {
            drop(stream);
            return Ok(false);
        }
        if finished.load(Ordering::Acquire) || Instant::now() > deadline {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    // Let the device flush its last buffer.
    thread::sleep(Duration::from_millis(100));
    drop(stream);
    Ok(true)
}

/// Wait for the espeak-ng child, killing it if the stop flag is raised.
fn watch_utterance(mut child: std::process::Child, stop: &Arc<AtomicBool>) -> PlaybackResult {
    loop {
        if stop.load(Ordering::Acquire) {
            let _ = child.kill();
            let _ = child.wait();
            return PlaybackResult::Stopped;
        }
        match child.try_wait() {
            Ok(Some(status)) => {
                if status.success() {
                    return PlaybackResult::Completed;
                }
                return PlaybackResult::Failed(format!("espeak-ng exited with {}", status));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                return PlaybackResult::Failed(format!("wait on espeak-ng: {}", e));
            }
        }
    }
}

/// Resample mono f32 audio to the device rate.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        f64::from(to_rate) / f64::from(from_rate),
        2.0,
        params,
        RESAMPLE_CHUNK,
        1,
    )
    .map_err(|e| AgentError::Playback(format!("resampler: {}", e)))?;

    let mut output = Vec::with_capacity(
        (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)) as usize + RESAMPLE_CHUNK,
    );

    for block in samples.chunks(RESAMPLE_CHUNK) {
        let input: Vec<f32> = if block.len() == RESAMPLE_CHUNK {
            block.to_vec()
        } else {
            // Zero-pad the tail block; the padding becomes trailing silence.
            let mut padded = block.to_vec();
            padded.resize(RESAMPLE_CHUNK, 0.0);
            padded
        };
        let processed = resampler
            .process(&[input], None)
            .map_err(|e| AgentError::Playback(format!("resample: {}", e)))?;
        output.extend_from_slice(&processed[0]);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_changes_length_by_the_rate_ratio() {
        let input = vec![0.0f32; 16_000];
        let output = resample(&input, 16_000, 48_000).unwrap();
        // Within one chunk of the exact 3x ratio (tail padding and filter
        // delay both shift it slightly).
        let expected = 48_000usize;
        assert!(
            output.len() + 3 * RESAMPLE_CHUNK >= expected,
            "output too short: {}",
            output.len()
        );
        assert!(output.len() <= expected + 3 * RESAMPLE_CHUNK);
    }

    #[test]
    fn identity_rate_is_not_resampled_by_caller_contract() {
        // play_pcm skips resample() when rates match; this guards the helper
        // against the degenerate 1.0 ratio anyway.
        let input: Vec<f32> = (0..4096).map(|i| (i as f32 * 0.01).sin()).collect();
        let output = resample(&input, 24_000, 24_000).unwrap();
        assert!(!output.is_empty());
    }
}
