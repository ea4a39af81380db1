//! Microphone capture: 16 kHz mono s16le blocks pushed onto a channel.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::{AgentError, RecognitionErrorKind, Result};

/// Capture sample rate expected by the transcription endpoint.
pub const CAPTURE_RATE: u32 = 16_000;

/// Run the capture loop until `stop` is raised. The cpal stream lives on
/// this thread for its whole life (streams cannot move between threads);
/// the callback converts f32 frames to s16le and ships them out.
///
/// Returns once stopped, or with an error if the device cannot be opened.
pub fn run_capture(stop: Arc<AtomicBool>, out: Sender<Vec<u8>>) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(missing_device_error)?;

    let supported = device
        .supported_input_configs()
        .map_err(|_| AgentError::Recognition(RecognitionErrorKind::PermissionDenied))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(CAPTURE_RATE)
                && c.max_sample_rate() >= SampleRate(CAPTURE_RATE)
        })
        .ok_or_else(|| {
            AgentError::Recognition(RecognitionErrorKind::Other(
                "no 16kHz mono input config".to_string(),
            ))
        })?;

    let config = supported.with_sample_rate(SampleRate(CAPTURE_RATE)).config();

    log::debug!(
        "capture device: {}",
        device.name().unwrap_or_else(|_| "unknown".to_string())
    );

    let callback_stop = Arc::clone(&stop);
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mut bytes = Vec::with_capacity(data.len() * 2);
                for &sample in data {
                    let clamped = sample.clamp(-1.0, 1.0);
                    let sample_i16 = (clamped * 32767.0) as i16;
                    bytes.extend_from_slice(&sample_i16.to_le_bytes());
                }
                match out.try_send(bytes) {
                    Ok(()) => {}
                    Err(crossbeam_channel::TrySendError::Full(_)) => {
                        log::warn!("capture channel full, dropping audio block");
                    }
                    // Consumer is gone; nothing will drain audio again, so
                    // wind down the capture loop.
                    Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
                        callback_stop.store(true, Ordering::Release);
                    }
                }
            },
            |err| {
                log::error!("capture stream error: {}", err);
            },
            None,
        )
        .map_err(|e| {
            AgentError::Recognition(RecognitionErrorKind::Other(format!(
                "input stream: {}",
                e
            )))
        })?;

    stream
        .play()
        .map_err(|e| AgentError::Recognition(RecognitionErrorKind::Other(e.to_string())))?;

    while !stop.load(Ordering::Acquire) {
        thread::sleep(Duration::from_millis(50));
    }

    drop(stream);
    log::debug!("capture stopped");
    Ok(())
}

fn missing_device_error() -> AgentError {
    AgentError::Recognition(RecognitionErrorKind::Other(
        "no input device detected".to_string(),
    ))
}
