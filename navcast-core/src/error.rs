//! Error types for the datagram channel

use thiserror::Error;

/// Errors reported by a datagram channel.
///
/// None of these stop a session. They show up as channel state transitions
/// and as entries in the session error log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The endpoint can never be opened (bad port, empty host, bind failure)
    #[error("Cannot open connection: {0}")]
    Open(String),

    /// Network is temporarily unusable; the transport may recover
    #[error("Connection waiting: {0}")]
    Waiting(String),

    /// The transport gave up on this connection
    #[error("Connection failed: {0}")]
    Fatal(String),

    /// A single write did not complete
    #[error("Send error: {0}")]
    Send(String),
}

impl ChannelError {
    /// Whether the channel should move to `Waiting` rather than `Failed`.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ChannelError::Waiting(_))
    }

    /// Message without the category prefix
    pub fn detail(&self) -> &str {
        match self {
            ChannelError::Open(s)
            | ChannelError::Waiting(s)
            | ChannelError::Fatal(s)
            | ChannelError::Send(s) => s,
        }
    }
}
