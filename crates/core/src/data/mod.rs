//! Video data types shared by the transport and the compositor
//!
//! - [`VideoFrame`]: a decoded RGBA8 frame
//! - [`VideoStream`]: the inbound sequence of frames with a mutable natural size

pub mod stream;
pub mod video;

pub use stream::{StreamMetadata, VideoStream};
pub use video::{FrameSize, VideoFrame};
