//! Configuration types for the WebRTC transport

use crate::sdp::CodecPreference;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default public STUN server
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Configuration for [`TransportNegotiator`](crate::negotiator::TransportNegotiator)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// STUN server URLs; empty means host candidates only
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Video codec moved to the front of the offer: a codec name such as
    /// `VP9`, or a numeric payload type such as `96` (default: VP9)
    pub video_codec: String,

    /// Upper bound on ICE candidate gathering before the offer is sent
    /// anyway, in milliseconds (default: 5000)
    pub ice_gather_timeout_ms: u64,

    /// Time allowed for the transport to become established after the
    /// answer is applied, in milliseconds (default: 30000)
    pub connect_timeout_ms: u64,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnServerConfig {
    /// TURN server URL (turn: or turns:)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![DEFAULT_STUN_SERVER.to_string()],
            turn_servers: Vec::new(),
            video_codec: "VP9".to_string(),
            ice_gather_timeout_ms: 5_000,
            connect_timeout_ms: 30_000,
        }
    }
}

impl TransportConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - a STUN URL does not start with `stun:` or `stuns:`
    /// - a TURN URL does not start with `turn:` or `turns:`
    /// - `video_codec` is empty
    /// - either timeout is zero
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if let Some(url) = self
            .stun_servers
            .iter()
            .find(|url| !url.starts_with("stun:") && !url.starts_with("stuns:"))
        {
            return Err(Error::InvalidConfig(format!(
                "STUN server must start with stun: or stuns:, got {}",
                url
            )));
        }

        if let Some(turn) = self
            .turn_servers
            .iter()
            .find(|t| !t.url.starts_with("turn:") && !t.url.starts_with("turns:"))
        {
            return Err(Error::InvalidConfig(format!(
                "TURN server must start with turn: or turns:, got {}",
                turn.url
            )));
        }

        if self.video_codec.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "video_codec must not be empty".to_string(),
            ));
        }

        if self.ice_gather_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "ice_gather_timeout_ms and connect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Parsed codec preference
    pub fn codec_preference(&self) -> CodecPreference {
        CodecPreference::parse(&self.video_codec)
    }

    /// ICE gathering bound
    pub fn ice_gather_timeout(&self) -> Duration {
        Duration::from_millis(self.ice_gather_timeout_ms)
    }

    /// Establishment bound
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
