//! Scripted media transport

use async_trait::async_trait;
use liveavatar_core::VideoStream;
use liveavatar_webrtc::{Error, MediaTransport, Result, TransportFactory, TransportState};
use super::CloseRecorder;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Offer every scripted transport produces
pub const SCRIPTED_OFFER: &str = "v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 98 96\r\n";

#[derive(Clone)]
enum Video {
    Pending,
    Ready(Arc<VideoStream>),
    Closed,
}

/// In-memory transport; media "flows" as soon as an answer is applied
pub struct ScriptedTransport {
    id: Uuid,
    state: Mutex<TransportState>,
    fail_establish: bool,
    fail_close: bool,
    answer: Mutex<Option<String>>,
    video: watch::Sender<Video>,
    close_calls: AtomicUsize,
    closes: Arc<CloseRecorder>,
}

impl ScriptedTransport {
    fn new(fail_establish: bool, fail_close: bool, closes: Arc<CloseRecorder>) -> Self {
        let (video, _) = watch::channel(Video::Pending);
        Self {
            id: Uuid::new_v4(),
            state: Mutex::new(TransportState::Negotiating),
            fail_establish,
            fail_close,
            answer: Mutex::new(None),
            video,
            close_calls: AtomicUsize::new(0),
            closes,
        }
    }

    /// Simulate the remote video track arriving
    pub fn publish_video(&self, stream: Arc<VideoStream>) {
        self.video.send_replace(Video::Ready(stream));
    }

    /// Answer applied by the endpoint, if any
    pub fn answer(&self) -> Option<String> {
        self.answer.lock().clone()
    }

    /// Times `close` was called
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// True once closed
    pub fn is_closed(&self) -> bool {
        *self.state.lock() == TransportState::Closed
    }
}

#[async_trait]
impl MediaTransport for ScriptedTransport {
    fn id(&self) -> Uuid {
        self.id
    }

    fn state(&self) -> TransportState {
        *self.state.lock()
    }

    async fn create_offer(&self) -> Result<String> {
        if self.is_closed() {
            return Err(Error::SessionClosed("transport closed".to_string()));
        }
        Ok(SCRIPTED_OFFER.to_string())
    }

    async fn apply_answer(&self, sdp: String) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SessionClosed("transport closed".to_string()));
        }
        *self.answer.lock() = Some(sdp);
        Ok(())
    }

    async fn wait_established(&self) -> Result<()> {
        if self.fail_establish {
            return Err(Error::NatTraversalFailed("no candidate pair succeeded".to_string()));
        }
        let mut state = self.state.lock();
        match *state {
            TransportState::Closed => Err(Error::SessionClosed("transport closed".to_string())),
            _ => {
                *state = TransportState::Established;
                Ok(())
            }
        }
    }

    async fn video_stream(&self) -> Option<Arc<VideoStream>> {
        let mut rx = self.video.subscribe();
        let video = rx
            .wait_for(|v| !matches!(v, Video::Pending))
            .await
            .ok()?
            .clone();
        match video {
            Video::Ready(stream) => Some(stream),
            _ => None,
        }
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closes.record("transport");
        *self.state.lock() = TransportState::Closed;
        self.video.send_modify(|v| {
            if let Video::Ready(stream) = v {
                stream.end();
            }
            *v = Video::Closed;
        });
        if self.fail_close {
            return Err(Error::PeerConnectionError("ICE agent already closed".to_string()));
        }
        Ok(())
    }
}

/// Records every transport it opens
#[derive(Default)]
pub struct ScriptedTransportFactory {
    opened: Mutex<Vec<Arc<ScriptedTransport>>>,
    fail_open: AtomicBool,
    fail_establish: AtomicBool,
    fail_close: AtomicBool,
    closes: Arc<CloseRecorder>,
}

impl ScriptedTransportFactory {
    /// Factory whose transports establish immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory reporting closes to a shared recorder
    pub fn with_recorder(closes: Arc<CloseRecorder>) -> Self {
        Self {
            closes,
            ..Self::default()
        }
    }

    /// Make `open` fail
    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make `wait_established` fail on new transports
    pub fn fail_establish(&self, fail: bool) {
        self.fail_establish.store(fail, Ordering::SeqCst);
    }

    /// Make `close` report an error on new transports (they still close)
    pub fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Transports opened so far
    pub fn opened(&self) -> Vec<Arc<ScriptedTransport>> {
        self.opened.lock().clone()
    }

    /// Most recently opened transport
    pub fn last(&self) -> Option<Arc<ScriptedTransport>> {
        self.opened.lock().last().cloned()
    }
}

#[async_trait]
impl TransportFactory for ScriptedTransportFactory {
    async fn open(&self) -> Result<Arc<dyn MediaTransport>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Error::PeerConnectionError(
                "Failed to create peer connection".to_string(),
            ));
        }
        let transport = Arc::new(ScriptedTransport::new(
            self.fail_establish.load(Ordering::SeqCst),
            self.fail_close.load(Ordering::SeqCst),
            Arc::clone(&self.closes),
        ));
        self.opened.lock().push(Arc::clone(&transport));
        Ok(transport)
    }
}
