//! Real-time chroma-key compositing
//!
//! [`Compositor::start`] spawns a loop that runs one pass per display
//! refresh. Each pass copies the stream's latest frame into a working
//! buffer sized to that frame, keys it with a [`ChromaKey`], and swaps the
//! result into the [`Surface`] canvas.
//!
//! Invariants:
//! - At most one loop writes a given surface; starting a new one retires
//!   the previous writer first.
//! - After [`CompositorHandle::dispose`] returns no further pass writes,
//!   and the surface is back on its direct presentation.

pub mod chroma;
pub mod refresh;
pub mod surface;

pub use chroma::{ChromaKey, DEFAULT_THRESHOLD_FRACTION, KEY_GREEN, MAX_DISTANCE};
pub use refresh::{
    DisplayRate, DisplayRefresh, ManualRefresh, RefreshSignal, RefreshSource, DEFAULT_REFRESH_HZ,
};
pub use surface::{Presentation, Surface};

use crate::data::{FrameSize, VideoFrame, VideoStream};
use std::sync::Arc;
use surface::LoopControl;
use tracing::{debug, info};
use uuid::Uuid;

/// Starts compositor loops
pub struct Compositor;

impl Compositor {
    /// Start keying `stream` onto `surface`, one pass per `refresh` tick.
    ///
    /// Any compositor already writing the surface is disposed before the
    /// new loop is spawned. Must be called inside a tokio runtime.
    pub fn start(
        stream: Arc<VideoStream>,
        surface: Arc<Surface>,
        refresh: Box<dyn RefreshSignal>,
        key: ChromaKey,
    ) -> CompositorHandle {
        if let Some(previous) = surface.take_active() {
            debug!("Replacing active compositor {}", previous.id);
            surface.retire(&previous);
        }

        let control = Arc::new(LoopControl::new());
        surface.claim(&control, &stream);

        let task = tokio::spawn(run_loop(
            Arc::clone(&control),
            Arc::clone(&stream),
            Arc::clone(&surface),
            refresh,
            key,
        ));
        control.set_task(task);

        info!(
            "Compositor {} started on stream {}",
            control.id,
            stream.label()
        );

        CompositorHandle { control, surface }
    }
}

async fn run_loop(
    control: Arc<LoopControl>,
    stream: Arc<VideoStream>,
    surface: Arc<Surface>,
    mut refresh: Box<dyn RefreshSignal>,
    key: ChromaKey,
) {
    let mut working = VideoFrame::blank(FrameSize::new(0, 0));

    loop {
        if !refresh.tick().await {
            debug!("Display gone, compositor {} stopping", control.id);
            break;
        }
        if control.is_cancelled() {
            break;
        }

        let Some(frame) = stream.latest_frame() else {
            continue;
        };

        // Read and write with the same dimensions: the working buffer
        // follows the frame, never the previous pass.
        if working.resize(frame.size()) {
            debug!(
                "Compositor {} buffer resized to {}",
                control.id,
                frame.size()
            );
        }
        working.copy_from(&frame);
        key.apply(working.data_mut());

        if !surface.commit(&control, &mut working) {
            break;
        }
    }
}

/// Handle to a running compositor loop
///
/// Dropping the handle disposes the loop.
pub struct CompositorHandle {
    control: Arc<LoopControl>,
    surface: Arc<Surface>,
}

impl CompositorHandle {
    /// Unique id of this loop
    pub fn id(&self) -> Uuid {
        self.control.id
    }

    /// Passes that wrote a frame to the surface
    pub fn passes(&self) -> u64 {
        self.control.passes()
    }

    /// True once disposed, directly or by a replacing compositor
    pub fn is_disposed(&self) -> bool {
        self.control.is_cancelled()
    }

    /// Stop the loop and restore the direct presentation.
    ///
    /// No pass writes after this returns. Disposing twice is a no-op.
    pub fn dispose(&self) {
        if self.surface.retire(&self.control) {
            info!("Compositor {} disposed", self.control.id);
        }
    }
}

impl Drop for CompositorHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for CompositorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositorHandle")
            .field("id", &self.control.id)
            .field("passes", &self.passes())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
