use augur_harness::ProviderError;

use crate::emitter::EmitterState;

/// Failure reported by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or the command failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A record that must be unique already exists.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The backend returned something we could not interpret.
    #[error("store error: {0}")]
    Internal(String),
}

/// The message-id counter could not be read or advanced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequencerError {
    #[error("failed to read message counter for user {user_id}: {source}")]
    Read { user_id: i64, source: StoreError },
    #[error("failed to advance message counter for user {user_id}: {source}")]
    Write { user_id: i64, source: StoreError },
}

/// Transcript persistence failed. Logged only; never reaches the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to save conversation: {0}")]
    Conversation(StoreError),
    #[error("failed to save {role} message: {source}")]
    Message { role: &'static str, source: StoreError },
}

/// An emitter operation was called out of order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmitterError {
    #[error("cannot {action} while the emitter is {state:?}")]
    InvalidTransition {
        state: EmitterState,
        action: &'static str,
    },
}

/// Failure of a conversation operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversationError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("failed to load conversation history: {0}")]
    History(StoreError),
}
