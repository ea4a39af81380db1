//! Delivery of reply text as audible speech.
//!
//! An ordered chain of provider tiers is tried until one produces audio
//! that actually plays. Remote tiers answer in several shapes (binary
//! audio, JSON with a URL or inline base64, text without audio); all of
//! them are normalized in [`normalize`] before the chain decides what to
//! do. Local synthesis is the permanent last resort and the only tier
//! whose failure is surfaced to the session.

mod backend_voice;
mod elevenlabs;
mod native;
pub mod normalize;
mod playht;
mod proxy;
pub mod voices;

use std::sync::{Arc, Mutex};

use log::{info, warn};

pub use backend_voice::BackendVoiceTier;
pub use elevenlabs::ElevenLabsTier;
pub use native::{NativeOutcome, NativeSynth};
pub use normalize::{RawResponse, TierOutcome, RESPONSE_TEXT_HEADER};
pub use playht::PlayHtTier;
pub use proxy::ProxyTier;

use crate::audio::{PlaybackManager, PlaybackResult, PlayableResource};
use crate::capability::Capabilities;
use crate::config::{ApiConfig, PROVIDER_TIMEOUT};
use crate::types::ProviderAttemptResult;

/// One entry in the delivery chain.
pub trait ProviderTier: Send + Sync {
    fn name(&self) -> &'static str;
    /// Make one time-boxed attempt to turn `text` into audio.
    fn attempt(&self, text: &str, voice: &str) -> TierOutcome;
}

/// Final status of one delivery.
#[derive(Debug, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Audio for the full text reached the speaker.
    Spoken { provider: &'static str },
    /// Playback was stopped externally; not an error.
    Interrupted,
    /// Every tier, local synthesis included, failed.
    Exhausted,
}

/// Result of [`TtsOrchestrator::deliver`].
#[derive(Debug)]
pub struct Delivery {
    /// The text that was (or would have been) spoken. A tier may correct
    /// the text while handling it; the session records this version.
    pub text: String,
    pub status: DeliveryStatus,
}

pub struct TtsOrchestrator {
    tiers: Vec<Box<dyn ProviderTier>>,
    native: Option<NativeSynth>,
    playback: Arc<Mutex<PlaybackManager>>,
}

impl TtsOrchestrator {
    /// Build the chain for this deployment. Tiers whose credentials are
    /// absent are left out; the backend tiers and local synthesis (when the
    /// engine is installed) are always present.
    pub fn from_config(
        config: &ApiConfig,
        caps: &Capabilities,
        playback: Arc<Mutex<PlaybackManager>>,
    ) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(PROVIDER_TIMEOUT).build();

        let mut tiers: Vec<Box<dyn ProviderTier>> = Vec::new();
        tiers.push(Box::new(BackendVoiceTier::new(
            agent.clone(),
            &config.base_url,
        )));
        if let Some(key) = config.elevenlabs_key() {
            tiers.push(Box::new(ElevenLabsTier::new(agent.clone(), key.to_string())));
        }
        if let (Some(key), Some(user)) = (config.playht_key(), config.playht_user()) {
            tiers.push(Box::new(PlayHtTier::new(
                agent.clone(),
                key.to_string(),
                user.to_string(),
            )));
        }
        tiers.push(Box::new(ProxyTier::new(agent, &config.base_url)));

        let native = if caps.synthesis {
            Some(NativeSynth::new(Arc::clone(&playback)))
        } else {
            None
        };

        Self {
            tiers,
            native,
            playback,
        }
    }

    /// Assemble a chain directly. Seam for tests and unusual deployments.
    pub fn with_tiers(
        tiers: Vec<Box<dyn ProviderTier>>,
        native: Option<NativeSynth>,
        playback: Arc<Mutex<PlaybackManager>>,
    ) -> Self {
        Self {
            tiers,
            native,
            playback,
        }
    }

    /// Deliver `text` as speech, trying tiers in order until one both
    /// returns audio and plays it. Individual tier failures are logged and
    /// absorbed; only exhausting the whole chain is reported upward.
    pub fn deliver(&self, text: &str, voice: &str) -> Delivery {
        let mut speak_text = text.to_string();

        for tier in &self.tiers {
            let outcome = tier.attempt(&speak_text, voice);
            match outcome {
                TierOutcome::Audio(resource) => match self.play(resource) {
                    PlaybackResult::Completed => {
                        log_attempt(ProviderAttemptResult::success(tier.name()));
                        return Delivery {
                            text: speak_text,
                            status: DeliveryStatus::Spoken {
                                provider: tier.name(),
                            },
                        };
                    }
                    PlaybackResult::Stopped => {
                        return Delivery {
                            text: speak_text,
                            status: DeliveryStatus::Interrupted,
                        };
                    }
                    PlaybackResult::Failed(reason) => {
                        log_attempt(ProviderAttemptResult::failure(
                            tier.name(),
                            format!("playback: {reason}"),
                        ));
                    }
                },
                TierOutcome::TextOnly(corrected) => {
                    // The provider settled the text but could not voice it.
                    // Skip the remaining remote tiers and speak it locally.
                    log_attempt(ProviderAttemptResult::failure(
                        tier.name(),
                        "text delivered, audio unavailable",
                    ));
                    speak_text = corrected;
                    break;
                }
                TierOutcome::SoftFailure(reason) | TierOutcome::HardFailure(reason) => {
                    log_attempt(ProviderAttemptResult::failure(tier.name(), reason));
                }
            }
        }

        match &self.native {
            Some(native) => match native.speak(&speak_text, voice) {
                NativeOutcome::Spoke => {
                    log_attempt(ProviderAttemptResult::success("local-synth"));
                    Delivery {
                        text: speak_text,
                        status: DeliveryStatus::Spoken {
                            provider: "local-synth",
                        },
                    }
                }
                NativeOutcome::Interrupted => Delivery {
                    text: speak_text,
                    status: DeliveryStatus::Interrupted,
                },
                NativeOutcome::Failed => {
                    log_attempt(ProviderAttemptResult::failure(
                        "local-synth",
                        "no chunk produced audible output",
                    ));
                    Delivery {
                        text: speak_text,
                        status: DeliveryStatus::Exhausted,
                    }
                }
            },
            None => {
                warn!("no local synthesis engine, delivery chain exhausted");
                Delivery {
                    text: speak_text,
                    status: DeliveryStatus::Exhausted,
                }
            }
        }
    }

    fn play(&self, resource: PlayableResource) -> PlaybackResult {
        let completion = {
            let mut manager = match self.playback.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            match manager.play(resource) {
                Ok(completion) => completion,
                Err(err) => return PlaybackResult::Failed(err.to_string()),
            }
        };
        completion.wait()
    }
}

fn log_attempt(attempt: ProviderAttemptResult) {
    match attempt.reason {
        None => info!("tts attempt {}: ok", attempt.provider),
        Some(reason) => info!("tts attempt {}: {}", attempt.provider, reason),
    }
}
