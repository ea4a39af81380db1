//! Tier 2: ElevenLabs, called directly over its streaming endpoint.

use serde_json::json;

use super::normalize::{send_for_audio, TierOutcome};
use super::{voices, ProviderTier};

const BASE_URL: &str = "https://api.elevenlabs.io/v1";
const MODEL_ID: &str = "eleven_turbo_v2_5";

pub struct ElevenLabsTier {
    agent: ureq::Agent,
    api_key: String,
}

impl ElevenLabsTier {
    pub fn new(agent: ureq::Agent, api_key: String) -> Self {
        Self { agent, api_key }
    }
}

impl ProviderTier for ElevenLabsTier {
    fn name(&self) -> &'static str {
        "elevenlabs-stream"
    }

    fn attempt(&self, text: &str, voice: &str) -> TierOutcome {
        let voice_id = voices::elevenlabs_voice(voice);
        let url = format!("{BASE_URL}/text-to-speech/{voice_id}/stream");
        let request = self
            .agent
            .post(&url)
            .set("xi-api-key", &self.api_key)
            .set("Accept", "audio/mpeg");
        send_for_audio(
            self.name(),
            &self.agent,
            request,
            json!({
                "text": text,
                "model_id": MODEL_ID,
                "voice_settings": {
                    "stability": 0.5,
                    "similarity_boost": 0.75,
                }
            }),
        )
    }
}
