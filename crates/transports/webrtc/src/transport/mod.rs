//! Media transport seam
//!
//! The session layer talks to the peer connection only through
//! [`MediaTransport`], so the state machine can be driven against a
//! scripted transport in tests and against
//! [`TransportNegotiator`](crate::negotiator::TransportNegotiator) in
//! production.

use crate::Result;
use async_trait::async_trait;
use liveavatar_core::VideoStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Transport lifecycle, independent of the session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    /// Offer/answer exchange or ICE still in progress
    Negotiating,
    /// Media is flowing
    Established,
    /// Closed locally or by the remote; terminal
    Closed,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::Negotiating => "negotiating",
            TransportState::Established => "established",
            TransportState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Bidirectional media channel to the remote render service
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Unique id of this transport instance
    fn id(&self) -> Uuid;

    /// Current lifecycle state
    fn state(&self) -> TransportState;

    /// Produce the local offer, already patched to prefer the target
    /// video codec
    async fn create_offer(&self) -> Result<String>;

    /// Apply the remote answer
    async fn apply_answer(&self, sdp: String) -> Result<()>;

    /// Wait until media is flowing. Fails if the transport fails or
    /// closes first.
    async fn wait_established(&self) -> Result<()>;

    /// Resolves with the inbound video stream once the remote track
    /// arrives, or `None` if the transport closes first
    async fn video_stream(&self) -> Option<Arc<VideoStream>>;

    /// Close the transport. Closing twice is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Creates one transport per connect attempt
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Build a new transport in the `Negotiating` state
    async fn open(&self) -> Result<Arc<dyn MediaTransport>>;
}
