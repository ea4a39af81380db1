use secrecy::{ExposeSecret, SecretBox};
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid API key format for {service}: {reason}")]
    InvalidKeyFormat { service: String, reason: String },
}

/// How long a single provider attempt may take before the orchestrator
/// advances to the next tier.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the backend and the third-party speech providers.
///
/// Provider credentials are optional: a tier whose credential is absent is
/// left out of the delivery chain at startup, it is not a startup error.
#[derive(Debug)]
pub struct ApiConfig {
    /// Base URL of the interview backend (text + voice + proxy endpoints).
    pub base_url: String,
    /// WebSocket endpoint for streaming transcription.
    pub stt_url: String,
    pub stt_key: Option<SecretBox<String>>,
    pub elevenlabs_key: Option<SecretBox<String>>,
    pub playht_key: Option<SecretBox<String>>,
    /// PlayHT requests need a user id alongside the key.
    pub playht_user: Option<String>,
    /// Default voice id from the catalog, overridable on the command line.
    pub default_voice: String,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (for development)
        dotenvy::dotenv().ok();

        let base_url = env::var("INTERVIEW_API_URL")
            .unwrap_or_else(|_| "http://localhost:5000".to_string());
        let base_url = base_url.trim_end_matches('/').to_string();

        let stt_url = env::var("STT_STREAM_URL").unwrap_or_else(|_| {
            "wss://audio-streaming.us-virginia-1.direct.fireworks.ai/v1/audio/transcriptions/streaming"
                .to_string()
        });

        let stt_key = Self::load_optional_key("FIREWORKS_API_KEY", "Fireworks AI")?;
        let elevenlabs_key = Self::load_optional_key("ELEVENLABS_API_KEY", "ElevenLabs")?;
        let playht_key = Self::load_optional_key("PLAYHT_API_KEY", "PlayHT")?;
        let playht_user = env::var("PLAYHT_USER_ID").ok().filter(|v| !v.trim().is_empty());

        let default_voice = env::var("INTERVIEW_VOICE").unwrap_or_else(|_| "rachel".to_string());

        Ok(Self {
            base_url,
            stt_url,
            stt_key,
            elevenlabs_key,
            playht_key,
            playht_user,
            default_voice,
        })
    }

    /// Load an optional API key from environment. A set-but-malformed key is
    /// an error; an absent key simply disables the tier that needs it.
    fn load_optional_key(
        env_var: &str,
        service_name: &str,
    ) -> Result<Option<SecretBox<String>>, ConfigError> {
        let key = match env::var(env_var) {
            Ok(key) => key,
            Err(_) => return Ok(None),
        };

        if key.trim().is_empty() {
            return Err(ConfigError::InvalidKeyFormat {
                service: service_name.to_string(),
                reason: "API key cannot be empty".to_string(),
            });
        }

        Self::validate_key_format(&key, service_name)?;

        Ok(Some(SecretBox::new(Box::new(key))))
    }

    /// Validate API key format for each service
    fn validate_key_format(key: &str, service: &str) -> Result<(), ConfigError> {
        match service {
            "Fireworks AI" => {
                // Fireworks keys typically start with "fw_"
                if !key.starts_with("fw_") {
                    return Err(ConfigError::InvalidKeyFormat {
                        service: service.to_string(),
                        reason: "Fireworks AI keys should start with 'fw_'".to_string(),
                    });
                }
            }
            "ElevenLabs" => {
                if key.len() < 10 {
                    return Err(ConfigError::InvalidKeyFormat {
                        service: service.to_string(),
                        reason: "ElevenLabs keys should be at least 10 characters".to_string(),
                    });
                }
            }
            "PlayHT" => {
                if key.len() < 10 {
                    return Err(ConfigError::InvalidKeyFormat {
                        service: service.to_string(),
                        reason: "PlayHT keys should be at least 10 characters".to_string(),
                    });
                }
            }
            _ => {} // No validation for unknown services
        }
        Ok(())
    }

    pub fn stt_key(&self) -> Option<&str> {
        self.stt_key.as_ref().map(|k| k.expose_secret().as_str())
    }

    pub fn elevenlabs_key(&self) -> Option<&str> {
        self.elevenlabs_key
            .as_ref()
            .map(|k| k.expose_secret().as_str())
    }

    pub fn playht_key(&self) -> Option<&str> {
        self.playht_key.as_ref().map(|k| k.expose_secret().as_str())
    }

    pub fn playht_user(&self) -> Option<&str> {
        self.playht_user.as_deref()
    }
}

/// Load configuration with helpful error messages for development
pub fn load_config() -> Result<ApiConfig, ConfigError> {
    match ApiConfig::load() {
        Ok(config) => {
            log::info!("Loaded configuration, backend at {}", config.base_url);
            if config.elevenlabs_key.is_none() {
                log::info!("ELEVENLABS_API_KEY not set, direct ElevenLabs tier disabled");
            }
            if config.playht_key.is_none() || config.playht_user.is_none() {
                log::info!("PLAYHT_API_KEY/PLAYHT_USER_ID not set, direct PlayHT tier disabled");
            }
            Ok(config)
        }
        Err(ConfigError::MissingEnvVar(var)) => {
            log::error!("Missing required environment variable: {}", var);
            log::error!("Create a .env file in the project root with:");
            log::error!("{}=your_value_here", var);
            Err(ConfigError::MissingEnvVar(var))
        }
        Err(e) => {
            log::error!("Configuration error: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_key_validation() {
        assert!(ApiConfig::validate_key_format("fw_test123", "Fireworks AI").is_ok());
        assert!(ApiConfig::validate_key_format("invalid", "Fireworks AI").is_err());

        assert!(ApiConfig::validate_key_format("1234567890abcdef", "ElevenLabs").is_ok());
        assert!(ApiConfig::validate_key_format("short", "ElevenLabs").is_err());
    }

    #[test]
    #[serial]
    fn test_missing_keys_disable_tiers() {
        std::env::remove_var("FIREWORKS_API_KEY");
        std::env::remove_var("ELEVENLABS_API_KEY");
        std::env::remove_var("PLAYHT_API_KEY");
        let config = ApiConfig::load().unwrap();
        assert!(config.elevenlabs_key.is_none());
        assert!(config.playht_key.is_none());
    }

    #[test]
    #[serial]
    fn test_empty_key_is_rejected() {
        std::env::set_var("ELEVENLABS_API_KEY", "   ");
        let result = ApiConfig::load();
        std::env::remove_var("ELEVENLABS_API_KEY");
        assert!(result.is_err());
    }
}
