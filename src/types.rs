use chrono::{DateTime, Utc};
use strum::Display;

/// The session-level state machine. Exactly one value at any instant, owned
/// by the [`SessionCoordinator`](crate::session::SessionCoordinator); every
/// other component only requests transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    /// Nothing in flight; capture may start.
    Idle,
    /// A capture session is active.
    Listening,
    /// Transcript handed off, waiting for the text service.
    AwaitingResponse,
    /// A response is being delivered as audio.
    Speaking,
    /// An unrecoverable error; needs user acknowledgment to return to Idle.
    Error,
}

/// Monotonic identity of one turn. Late-arriving results carry the id of the
/// turn that issued them and are discarded when it no longer matches.
pub type TurnId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Role {
    User,
    Assistant,
}

/// One entry in the append-only conversation history.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Outcome of a single provider attempt, used only to drive fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure,
}

/// Ephemeral record of one tier attempt. Logged, never persisted.
#[derive(Debug, Clone)]
pub struct ProviderAttemptResult {
    pub provider: &'static str,
    pub outcome: AttemptOutcome,
    pub reason: Option<String>,
}

impl ProviderAttemptResult {
    pub fn success(provider: &'static str) -> Self {
        Self {
            provider,
            outcome: AttemptOutcome::Success,
            reason: None,
        }
    }

    pub fn failure(provider: &'static str, reason: impl Into<String>) -> Self {
        Self {
            provider,
            outcome: AttemptOutcome::Failure,
            reason: Some(reason.into()),
        }
    }
}
