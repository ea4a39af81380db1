//! Tier 1: the backend's own voice endpoint.
//!
//! `POST /api/voice` synthesizes the reply text server-side. The backend may
//! rewrite the text while synthesizing; when it does, the corrected text
//! comes back in the `x-response-text` header so the transcript stays in
//! sync with what was actually spoken.

use serde_json::json;

use super::normalize::{send_for_audio, TierOutcome};
use super::ProviderTier;

pub struct BackendVoiceTier {
    agent: ureq::Agent,
    url: String,
}

impl BackendVoiceTier {
    pub fn new(agent: ureq::Agent, base_url: &str) -> Self {
        Self {
            agent,
            url: format!("{base_url}/api/voice"),
        }
    }
}

impl ProviderTier for BackendVoiceTier {
    fn name(&self) -> &'static str {
        "backend-voice"
    }

    fn attempt(&self, text: &str, voice: &str) -> TierOutcome {
        let request = self
            .agent
            .post(&self.url)
            .set("Accept", "audio/wav, application/json");
        send_for_audio(
            self.name(),
            &self.agent,
            request,
            json!({ "text": text, "voice": voice }),
        )
    }
}
