//! Core library for LiveAvatar sessions
//!
//! Everything in this crate is transport-agnostic: it knows nothing about
//! WebRTC or the remote synthesis endpoint. The transport crate
//! (`liveavatar-webrtc`) feeds decoded frames into a [`VideoStream`] and
//! drives the [`Compositor`] against a [`Surface`].
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │  liveavatar-webrtc (inbound track → decoder)           │
//! │  ↓ push_frame()                                        │
//! │  VideoStream (latest frame + natural size watch)       │
//! │  ↓ one pass per display refresh                        │
//! │  Compositor ── ChromaKey ──► Surface (displayed canvas)│
//! │                                                        │
//! │  ActivityLog (bounded, append-ordered, user-visible)   │
//! │  AvatarConfig / catalog / utterance markup             │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use liveavatar_core::{ChromaKey, VideoFrame};
//!
//! let mut frame = VideoFrame::filled(2, 1, [0, 255, 0, 255]);
//! let keyed = ChromaKey::default().apply(frame.data_mut());
//! assert_eq!(keyed, 2);
//! assert_eq!(frame.pixel(0, 0), Some([0, 255, 0, 0]));
//! ```

#![warn(clippy::all)]

pub mod activity_log;
pub mod catalog;
pub mod compositor;
pub mod config;
pub mod data;
pub mod error;
pub mod utterance;

pub use activity_log::{ActivityLog, LogEntry, LogKind, LOG_CAPACITY};
pub use catalog::{Character, Voice, CHARACTERS, VOICES};
pub use compositor::{
    ChromaKey, Compositor, CompositorHandle, DisplayRate, DisplayRefresh, ManualRefresh,
    Presentation, RefreshSignal, RefreshSource, Surface,
};
pub use config::{AvatarConfig, Credential};
pub use data::{FrameSize, StreamMetadata, VideoFrame, VideoStream};
pub use error::{Error, Result};
pub use utterance::Utterance;

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
