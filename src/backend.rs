//! HTTP client for the interview backend: text answers and diagnostics.

use serde::Deserialize;
use std::time::Duration;

use crate::config::PROVIDER_TIMEOUT;
use crate::error::{AgentError, Result};

/// Produces the text answer for one transcript. Trait seam so the session
/// coordinator can be tested without a backend.
pub trait TextService: Send + Sync {
    fn respond(&self, transcript: &str) -> Result<String>;
}

#[derive(Deserialize)]
struct TextResponse {
    response: Option<String>,
    error: Option<String>,
    // Some backend versions wrap errors as {status, message}.
    message: Option<String>,
}

pub struct BackendClient {
    agent: ureq::Agent,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: String) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(PROVIDER_TIMEOUT)
            .build();
        Self { agent, base_url }
    }

    /// Best-effort diagnostic ping. Failure is logged and never propagated;
    /// this must not block the main flow.
    pub fn debug_ping(&self) {
        let url = format!("{}/api/debug", self.base_url);
        match self
            .agent
            .get(&url)
            .timeout(Duration::from_secs(3))
            .call()
        {
            Ok(response) => match response.into_json::<serde_json::Value>() {
                Ok(body) => log::info!("backend diagnostics: {}", body),
                Err(e) => log::debug!("backend diagnostics unreadable: {}", e),
            },
            Err(e) => log::debug!("backend diagnostics unavailable: {}", e),
        }
    }
}

impl TextService for BackendClient {
    /// POST /api/text with the transcript, returning the generated answer.
    fn respond(&self, transcript: &str) -> Result<String> {
        let url = format!("{}/api/text", self.base_url);
        log::info!("requesting text response for transcript");

        let response = self
            .agent
            .post(&url)
            .send_json(serde_json::json!({ "text": transcript }));

        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                // The body may still carry a diagnostic message.
                let detail = response
                    .into_json::<TextResponse>()
                    .ok()
                    .and_then(|body| body.error.or(body.message))
                    .unwrap_or_else(|| "no detail".to_string());
                return Err(AgentError::Network(format!(
                    "text service returned {}: {}",
                    code, detail
                )));
            }
            Err(e) => {
                return Err(AgentError::Network(format!("text request failed: {}", e)));
            }
        };

        let body: TextResponse = response
            .into_json()
            .map_err(|e| AgentError::Network(format!("text response unreadable: {}", e)))?;

        if let Some(error) = body.error {
            return Err(AgentError::Network(format!("text service error: {}", error)));
        }

        match body.response {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(AgentError::Network(
                "text service returned no response field".to_string(),
            )),
        }
    }
}
