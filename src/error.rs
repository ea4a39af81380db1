use thiserror::Error;

/// Why a capture session ended abnormally.
///
/// `Aborted` is produced when the user stops a session on purpose and is
/// never surfaced as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    NoSpeech,
    PermissionDenied,
    Network,
    Aborted,
    Other(String),
}

impl std::fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecognitionErrorKind::NoSpeech => write!(f, "no speech detected"),
            RecognitionErrorKind::PermissionDenied => write!(f, "microphone access denied"),
            RecognitionErrorKind::Network => write!(f, "network failure during recognition"),
            RecognitionErrorKind::Aborted => write!(f, "recognition aborted"),
            RecognitionErrorKind::Other(msg) => write!(f, "recognition failed: {}", msg),
        }
    }
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Recognition error: {0}")]
    Recognition(RecognitionErrorKind),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::Audio(err.to_string())
    }
}

impl From<crate::config::ConfigError> for AgentError {
    fn from(err: crate::config::ConfigError) -> Self {
        AgentError::Config(err.to_string())
    }
}
