//! WebRTC transport and session control for LiveAvatar
//!
//! This crate drives one live talking-avatar session against a remote
//! render and speech service.
//!
//! # Features
//!
//! - **Transport negotiation**: receive-only WebRTC peer connection whose
//!   offer is patched to prefer a target video codec (VP9 by default)
//! - **Inbound video**: RTP depacketizing and pluggable decoding into a
//!   [`VideoStream`](liveavatar_core::VideoStream)
//! - **Synthesis session**: JSON-RPC 2.0 over WebSocket endpoint client
//! - **Session state machine**: phase-gated connect / speak / disconnect
//!   with stale-completion discard
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │  Control surface (avatar-client)                       │
//! │  ↓ connect / speak / disconnect / reset                │
//! │  SessionController (phase, activity log, slot)         │
//! │  ├─ TransportNegotiator (RTCPeerConnection, SDP patch) │
//! │  │   └─ inbound track → FramePump → VideoStream        │
//! │  ├─ SynthesisSession                                   │
//! │  │   └─ WebSocketEndpoint (JSON-RPC 2.0)               │
//! │  └─ Compositor (liveavatar-core) → Surface             │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use liveavatar_webrtc::sdp::{prefer_video_codec, CodecPreference};
//!
//! let offer = "v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96 98\r\n\
//!              a=rtpmap:96 VP8/90000\r\na=rtpmap:98 VP9/90000\r\n";
//! let patched = prefer_video_codec(offer, &CodecPreference::parse("VP9")).unwrap();
//! assert!(patched.contains("m=video 9 UDP/TLS/RTP/SAVPF 98 96\r\n"));
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod media;
pub mod negotiator;
pub mod sdp;
pub mod session;
pub mod synthesis;
pub mod transport;

pub use config::{TransportConfig, TurnServerConfig};
pub use error::{Error, Result};
pub use media::{DecoderFactory, NoDecoder, VideoCodec, VideoDecoder};
pub use negotiator::{TransportNegotiator, WebRtcTransportFactory};
pub use sdp::CodecPreference;
pub use session::{Phase, SessionController, SessionControllerBuilder};
pub use synthesis::{
    EndpointFactory, SynthesisEndpoint, SynthesisSession, WebSocketEndpoint,
    WebSocketEndpointFactory,
};
pub use transport::{MediaTransport, TransportFactory, TransportState};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
