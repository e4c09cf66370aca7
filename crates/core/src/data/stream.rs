//! Inbound video stream
//!
//! A [`VideoStream`] is written by the transport (one frame at a time, as
//! the decoder produces them) and read by the compositor. It is referenced,
//! never owned, by its consumers.

use super::video::{FrameSize, VideoFrame};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

/// Metadata published whenever the stream's natural size changes or it ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamMetadata {
    /// Natural size of the most recent frame, `None` until the first frame
    pub size: Option<FrameSize>,
    /// Set once the source stops producing frames
    pub ended: bool,
}

/// Inbound sequence of decoded frames with a mutable natural size
pub struct VideoStream {
    id: Uuid,
    label: String,
    latest: Mutex<Option<Arc<VideoFrame>>>,
    frames_received: AtomicU64,
    metadata: watch::Sender<StreamMetadata>,
}

impl VideoStream {
    /// Create an empty stream; size is unknown until the first frame
    pub fn new(label: impl Into<String>) -> Self {
        let (metadata, _) = watch::channel(StreamMetadata::default());
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            latest: Mutex::new(None),
            frames_received: AtomicU64::new(0),
            metadata,
        }
    }

    /// Unique stream identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Human-readable label (remote track id)
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Publish a decoded frame. Frames pushed after [`end`](Self::end) are dropped.
    pub fn push_frame(&self, frame: VideoFrame) {
        if self.is_ended() {
            return;
        }

        let size = frame.size();
        *self.latest.lock() = Some(Arc::new(frame));
        self.frames_received.fetch_add(1, Ordering::Relaxed);

        let changed = self.metadata.send_if_modified(|meta| {
            if meta.size == Some(size) {
                return false;
            }
            meta.size = Some(size);
            true
        });
        if changed {
            debug!("Stream {} natural size is now {}", self.label, size);
        }
    }

    /// Most recent decoded frame, if any
    pub fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        self.latest.lock().clone()
    }

    /// True once at least one frame has been decoded
    pub fn has_frame(&self) -> bool {
        self.latest.lock().is_some()
    }

    /// Current natural size, `None` before the first frame
    pub fn natural_size(&self) -> Option<FrameSize> {
        self.metadata.borrow().size
    }

    /// Total frames pushed so far
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Mark the stream as finished; wakes anyone waiting for metadata
    pub fn end(&self) {
        self.metadata.send_if_modified(|meta| {
            if meta.ended {
                return false;
            }
            meta.ended = true;
            true
        });
    }

    /// True after [`end`](Self::end)
    pub fn is_ended(&self) -> bool {
        self.metadata.borrow().ended
    }

    /// Observe size changes and the end of the stream
    pub fn subscribe(&self) -> watch::Receiver<StreamMetadata> {
        self.metadata.subscribe()
    }

    /// Resolve once the natural size is known.
    ///
    /// Resolves immediately if a frame already arrived, otherwise on the
    /// first frame. Returns `None` if the stream ends without ever
    /// producing one.
    pub async fn wait_for_metadata(&self) -> Option<FrameSize> {
        let mut rx = self.metadata.subscribe();
        let meta = match rx.wait_for(|m| m.size.is_some() || m.ended).await {
            Ok(meta) => *meta,
            Err(_) => return None,
        };
        meta.size
    }
}

impl std::fmt::Debug for VideoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoStream")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("metadata", &*self.metadata.borrow())
            .field("frames_received", &self.frames_received())
            .finish()
    }
}
