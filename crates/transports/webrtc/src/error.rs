//! Error types for the LiveAvatar transport and session layer

/// Result type alias using the transport Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating, speaking or tearing down
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No speech key was configured
    #[error("API key is required.")]
    MissingCredential,

    /// Operation not allowed in the current phase
    #[error("Session error: {0}")]
    SessionError(String),

    /// The remote endpoint refused the session; carries the remote detail
    #[error("{0}")]
    SessionRejected(String),

    /// An utterance did not complete; carries the remote detail
    #[error("{0}")]
    SynthesisFailed(String),

    /// The session or socket was closed underneath an in-flight operation
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// Endpoint signaling error (JSON-RPC error object or protocol breach)
    #[error("Signaling error: {0}")]
    SignalingError(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// NAT traversal failed (ICE connection failure)
    #[error("NAT traversal failed: {0}")]
    NatTraversalFailed(String),

    /// Operation timeout
    #[error("Operation timeout: {0}")]
    OperationTimeout(String),

    /// WebRTC peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// Video decoding error
    #[error("Decoding error: {0}")]
    DecodingError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    /// Core library error (configuration, catalog, utterance, frames)
    #[error(transparent)]
    Core(#[from] liveavatar_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::SignalingError(_)
                | Error::NatTraversalFailed(_)
                | Error::OperationTimeout(_)
                | Error::WebSocketError(_)
                | Error::IoError(_)
        )
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        match self {
            Error::InvalidConfig(_) | Error::MissingCredential => true,
            Error::Core(e) => e.is_config_error(),
            _ => false,
        }
    }

    /// Check if this error came from transport negotiation
    pub fn is_negotiation_error(&self) -> bool {
        matches!(
            self,
            Error::SessionRejected(_)
                | Error::NatTraversalFailed(_)
                | Error::PeerConnectionError(_)
                | Error::SdpError(_)
                | Error::WebRtcError(_)
        )
    }
}
