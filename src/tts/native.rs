//! Final fallback: local synthesis through the system speech engine.
//!
//! The local engine speaks as a side effect and signals per-utterance
//! completion back through the playback manager's completion channel, which
//! turns it into the same blocking outcome the remote tiers produce. Long
//! text is split into bounded chunks first; one chunk failing does not doom
//! the rest, and an error is reported only when no chunk was audible.

use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::audio::{PlaybackManager, PlaybackResult, PlayableResource};
use crate::chunker;
use crate::tts::voices;

#[derive(Debug, PartialEq, Eq)]
pub enum NativeOutcome {
    /// At least one chunk was spoken to completion.
    Spoke,
    /// Playback was stopped externally mid-utterance.
    Interrupted,
    /// Every chunk failed to produce audible output.
    Failed,
}

pub struct NativeSynth {
    playback: Arc<Mutex<PlaybackManager>>,
}

impl NativeSynth {
    pub fn new(playback: Arc<Mutex<PlaybackManager>>) -> Self {
        Self { playback }
    }

    /// Speak `text` chunk by chunk through the playback manager.
    pub fn speak(&self, text: &str, voice: &str) -> NativeOutcome {
        let engine_voice = voices::espeak_voice(voice).to_string();
        let mut attempted = 0usize;
        let mut spoke = false;

        for chunk in chunker::chunks(text) {
            attempted += 1;
            debug!("local synthesis chunk {} ({} chars)", attempted, chunk.len());

            let completion = {
                let mut manager = match self.playback.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                match manager.play(PlayableResource::Utterance {
                    text: chunk,
                    voice: engine_voice.clone(),
                }) {
                    Ok(completion) => completion,
                    Err(err) => {
                        warn!("local synthesis chunk {attempted} did not start: {err}");
                        continue;
                    }
                }
            };

            match completion.wait() {
                PlaybackResult::Completed => spoke = true,
                PlaybackResult::Stopped => {
                    debug!("local synthesis interrupted at chunk {attempted}");
                    return NativeOutcome::Interrupted;
                }
                PlaybackResult::Failed(reason) => {
                    warn!("local synthesis chunk {attempted} failed: {reason}");
                }
            }
        }

        // Whitespace-only text chunks to nothing; that is "nothing to
        // speak", not a failure.
        if attempted == 0 || spoke {
            NativeOutcome::Spoke
        } else {
            NativeOutcome::Failed
        }
    }
}
