use thiserror::Error;

/// Errors surfaced by the live voice pipeline.
///
/// Teardown never propagates errors: failures while stopping playback sources
/// or releasing devices are logged and swallowed so cleanup always completes.
#[derive(Error, Debug)]
pub enum LiveError {
    /// Microphone access was denied or no capture device is available.
    /// Terminal for the session attempt; never retried automatically.
    #[error("Microphone unavailable: {0}")]
    Permission(String),

    /// The WebSocket connection or setup handshake failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// An inbound audio payload could not be decoded. Non-fatal: the
    /// offending chunk is dropped and the session continues.
    #[error("Malformed audio payload: {0}")]
    Decode(String),

    /// A playback source or output device could not be stopped or closed.
    /// Always caught and suppressed on the teardown path.
    #[error("Failed to stop playback resource: {0}")]
    Stop(String),

    /// Invariant violation inside the pipeline.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<base64::DecodeError> for LiveError {
    fn from(e: base64::DecodeError) -> Self {
        LiveError::Decode(e.to_string())
    }
}
