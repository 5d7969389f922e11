/// Errors surfaced by the broadcast core.
///
/// Encoder and store errors go back to the immediate caller. Channel failures
/// are reported once through the status outbox and the channel drops to `Stopped`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BroadcastError {
    /// The input produced no playable symbols.
    #[error("text produced no playable symbols")]
    EncodingEmpty,

    /// Audio output is missing, denied, or closed underneath us.
    #[error("audio output unavailable: {0}")]
    OutputUnavailable(String),

    /// The broadcast has nothing to play yet. Channels retry instead of failing.
    #[error("broadcast sequence is empty")]
    EmptySequence,

    #[error("translation failed: {0}")]
    TranslationFailed(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    /// A command was sent after the runtime thread exited.
    #[error("broadcast runtime is not running")]
    RuntimeStopped,
}

pub type Result<T> = std::result::Result<T, BroadcastError>;
