pub mod audio;
pub mod backend;
pub mod capability;
pub mod chunker;
pub mod config;
pub mod error;
pub mod recognition;
pub mod session;
pub mod tts;
pub mod types;

pub use error::{AgentError, Result};
