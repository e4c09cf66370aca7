//! Synthesis Session
//!
//! Binds a negotiated [`MediaTransport`](crate::transport::MediaTransport)
//! to the remote render/speech endpoint. The endpoint itself is an opaque
//! capability behind [`SynthesisEndpoint`]; [`WebSocketEndpoint`] speaks
//! JSON-RPC 2.0 to it over a WebSocket.

pub mod endpoint;
pub mod protocol;
pub mod session;
pub mod websocket;

pub use endpoint::{
    EndpointFactory, ResultReason, SessionAck, SpeakOutcome, StartSessionRequest,
    SynthesisEndpoint, GENERIC_CONNECT_FAILURE, GENERIC_SPEAK_FAILURE,
};
pub use session::SynthesisSession;
pub use websocket::{WebSocketEndpoint, WebSocketEndpointFactory};
