//! Tier 3: PlayHT, called directly over its synchronous conversion endpoint.
//!
//! PlayHT answers with binary audio when the conversion finishes inside the
//! request window, otherwise with a JSON envelope carrying an audio URL.
//! Both shapes go through the shared normalization.

use serde_json::json;

use super::normalize::{send_for_audio, TierOutcome};
use super::{voices, ProviderTier};

const TTS_URL: &str = "https://api.play.ht/api/v2/tts/stream";

pub struct PlayHtTier {
    agent: ureq::Agent,
    api_key: String,
    user_id: String,
}

impl PlayHtTier {
    pub fn new(agent: ureq::Agent, api_key: String, user_id: String) -> Self {
        Self {
            agent,
            api_key,
            user_id,
        }
    }
}

impl ProviderTier for PlayHtTier {
    fn name(&self) -> &'static str {
        "playht-convert"
    }

    fn attempt(&self, text: &str, voice: &str) -> TierOutcome {
        let request = self
            .agent
            .post(TTS_URL)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("X-USER-ID", &self.user_id)
            .set("Accept", "audio/mpeg");
        send_for_audio(
            self.name(),
            &self.agent,
            request,
            json!({
                "text": text,
                "voice": voices::playht_voice(voice),
                "output_format": "mp3",
            }),
        )
    }
}
