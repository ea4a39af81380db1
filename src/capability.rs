use cpal::traits::HostTrait;
use std::process::Command;

use crate::config::ApiConfig;

/// What the runtime environment can actually do, probed once at startup and
/// threaded through the components that need it. Replaces scattered
/// existence checks with a single descriptor value.
#[derive(Debug, Clone)]
pub struct Capabilities {
    /// A microphone exists and a transcription credential is configured.
    pub capture: bool,
    /// A speaker output device exists.
    pub playback: bool,
    /// The local synthesis engine is installed.
    pub synthesis: bool,
    /// Human-readable warnings for whatever is missing.
    pub warnings: Vec<String>,
}

impl Capabilities {
    /// Probe the host for audio devices and the local synthesis binary.
    pub fn probe(config: &ApiConfig) -> Self {
        let host = cpal::default_host();

        let mut warnings = Vec::new();

        let has_input = host.default_input_device().is_some();
        if !has_input {
            warnings.push("no microphone detected, speech capture disabled".to_string());
        }

        let has_stt_key = config.stt_key().is_some();
        if has_input && !has_stt_key {
            warnings.push(
                "FIREWORKS_API_KEY not set, speech capture disabled".to_string(),
            );
        }

        let playback = host.default_output_device().is_some();
        if !playback {
            warnings.push("no output device detected, audio playback disabled".to_string());
        }

        let synthesis = espeak_available();
        if !synthesis {
            warnings.push(
                "espeak-ng not found, local synthesis fallback disabled".to_string(),
            );
        }

        let caps = Self {
            capture: has_input && has_stt_key,
            playback,
            synthesis,
            warnings,
        };

        log::info!(
            "Capabilities: capture={} playback={} synthesis={}",
            caps.capture,
            caps.playback,
            caps.synthesis
        );
        for warning in &caps.warnings {
            log::warn!("{}", warning);
        }

        caps
    }

    /// A descriptor with everything enabled. Used by tests that script the
    /// capture and playback seams instead of probing hardware.
    pub fn all() -> Self {
        Self {
            capture: true,
            playback: true,
            synthesis: true,
            warnings: Vec::new(),
        }
    }
}

/// Check whether espeak-ng can be spawned at all.
fn espeak_available() -> bool {
    Command::new("espeak-ng")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}
