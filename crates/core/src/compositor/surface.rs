//! Displayed visual surface
//!
//! The surface is the single shared visual resource: the displayed-stream
//! reference plus the canvas the compositor paints. While a compositor is
//! active it is the only writer; only its disposer restores the direct
//! presentation.

use crate::data::{FrameSize, VideoFrame, VideoStream};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// What the surface currently shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// The inbound stream is shown as decoded (opaque background)
    Direct,
    /// The compositor canvas is shown (keyed background is transparent)
    Matted,
}

/// Shared control block for one compositor loop
pub(crate) struct LoopControl {
    pub(crate) id: Uuid,
    cancelled: AtomicBool,
    passes: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LoopControl {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            cancelled: AtomicBool::new(false),
            passes: AtomicU64::new(0),
            task: Mutex::new(None),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    pub(crate) fn set_task(&self, task: JoinHandle<()>) {
        let mut slot = self.task.lock();
        if self.is_cancelled() {
            task.abort();
        } else {
            *slot = Some(task);
        }
    }

    fn abort_task(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

struct SurfaceState {
    source: Option<Arc<VideoStream>>,
    presentation: Presentation,
    canvas: VideoFrame,
    active: Option<Arc<LoopControl>>,
    frames_written: u64,
}

/// Displayed visual: stream reference, presentation mode and canvas
pub struct Surface {
    state: Mutex<SurfaceState>,
}

impl Default for Surface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface {
    /// Empty surface showing nothing
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SurfaceState {
                source: None,
                presentation: Presentation::Direct,
                canvas: VideoFrame::blank(FrameSize::new(0, 0)),
                active: None,
                frames_written: 0,
            }),
        }
    }

    /// Point the surface at a stream, shown directly until a compositor starts
    pub fn set_source(&self, stream: Arc<VideoStream>) {
        let mut state = self.state.lock();
        debug!("Surface now displays stream {}", stream.label());
        state.source = Some(stream);
    }

    /// Drop the displayed-stream reference and blank the canvas
    pub fn clear_source(&self) {
        let mut state = self.state.lock();
        state.source = None;
        if state.active.is_none() {
            state.presentation = Presentation::Direct;
            state.canvas = VideoFrame::blank(FrameSize::new(0, 0));
        }
    }

    /// Stream currently displayed, if any
    pub fn source(&self) -> Option<Arc<VideoStream>> {
        self.state.lock().source.clone()
    }

    /// Current presentation mode
    pub fn presentation(&self) -> Presentation {
        self.state.lock().presentation
    }

    /// Copy of the canvas as last written
    pub fn canvas(&self) -> VideoFrame {
        self.state.lock().canvas.clone()
    }

    /// Total frames written to the canvas across all compositors
    pub fn frames_written(&self) -> u64 {
        self.state.lock().frames_written
    }

    /// Id of the compositor currently allowed to write, if any
    pub fn active_writer(&self) -> Option<Uuid> {
        self.state.lock().active.as_ref().map(|c| c.id)
    }

    /// Remove the active writer. The caller retires it before a new loop runs.
    pub(crate) fn take_active(&self) -> Option<Arc<LoopControl>> {
        self.state.lock().active.take()
    }

    /// Install `control` as the only writer for `stream`
    pub(crate) fn claim(&self, control: &Arc<LoopControl>, stream: &Arc<VideoStream>) {
        let mut state = self.state.lock();
        state.source = Some(Arc::clone(stream));
        state.presentation = Presentation::Matted;
        state.active = Some(Arc::clone(control));
    }

    /// Swap the finished working buffer into the canvas.
    ///
    /// Returns false, leaving the canvas untouched, when `control` is no
    /// longer the active writer.
    pub(crate) fn commit(&self, control: &LoopControl, working: &mut VideoFrame) -> bool {
        let mut state = self.state.lock();
        let is_writer = state.active.as_ref().is_some_and(|c| c.id == control.id);
        if !is_writer || control.is_cancelled() {
            return false;
        }
        std::mem::swap(&mut state.canvas, working);
        state.frames_written += 1;
        control.passes.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Cancel `control` and, if it was the active writer, restore the
    /// direct presentation. Returns false if it was already cancelled.
    pub(crate) fn retire(&self, control: &LoopControl) -> bool {
        {
            let mut state = self.state.lock();
            if control.cancelled.swap(true, Ordering::AcqRel) {
                return false;
            }
            if state.active.as_ref().is_some_and(|c| c.id == control.id) {
                state.active = None;
            }
            if state.active.is_none() {
                state.presentation = Presentation::Direct;
                state.canvas = VideoFrame::blank(FrameSize::new(0, 0));
            }
        }
        control.abort_task();
        true
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Surface")
            .field("source", &state.source.as_ref().map(|s| s.label().to_string()))
            .field("presentation", &state.presentation)
            .field("canvas", &state.canvas.size())
            .field("active", &state.active.as_ref().map(|c| c.id))
            .field("frames_written", &state.frames_written)
            .finish()
    }
}
