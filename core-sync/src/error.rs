use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("No active sync session")]
    NoActiveSession,

    /// A host-only action was attempted by a guest. Nothing was sent.
    #[error("Only the session host can {action}")]
    NotHost { action: &'static str },

    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),

    #[error("Invalid user: {0}")]
    InvalidUser(String),

    /// The realtime channel could not be joined.
    #[error("Channel error: {0}")]
    Channel(#[from] bridge_traits::error::BridgeError),

    #[error("Malformed sync message: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Local playback failed: {0}")]
    Playback(#[from] core_playback::PlaybackError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
