//! Tier 4: the backend's server-side proxy to a third-party provider.
//!
//! Used when direct provider calls fail, typically because the client has no
//! provider credentials or sits behind a network that blocks them.

use serde_json::json;

use super::normalize::{send_for_audio, TierOutcome};
use super::ProviderTier;

pub struct ProxyTier {
    agent: ureq::Agent,
    url: String,
}

impl ProxyTier {
    pub fn new(agent: ureq::Agent, base_url: &str) -> Self {
        Self {
            agent,
            url: format!("{base_url}/api/tts"),
        }
    }
}

impl ProviderTier for ProxyTier {
    fn name(&self) -> &'static str {
        "backend-proxy"
    }

    fn attempt(&self, text: &str, voice: &str) -> TierOutcome {
        let request = self
            .agent
            .post(&self.url)
            .set("Accept", "audio/wav, audio/mpeg, application/json");
        send_for_audio(
            self.name(),
            &self.agent,
            request,
            json!({ "text": text, "voice": voice }),
        )
    }
}
