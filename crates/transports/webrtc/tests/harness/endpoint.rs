//! Scripted synthesis endpoint

use async_trait::async_trait;
use liveavatar_core::{Credential, Utterance};
use liveavatar_webrtc::synthesis::{
    EndpointFactory, SessionAck, SpeakOutcome, StartSessionRequest, SynthesisEndpoint,
};
use liveavatar_webrtc::{Error, MediaTransport, Result};
use super::CloseRecorder;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Answer every scripted endpoint hands back
pub const SCRIPTED_ANSWER: &str = "v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 98\r\n";

/// How `start_session` replies
#[derive(Debug, Clone)]
pub enum StartReply {
    /// Apply the answer, wait for media, acknowledge
    Completed,
    /// Refuse with an optional detail
    Canceled(Option<String>),
    /// Never reply; fails once the endpoint is closed
    Hold,
}

/// Behavior of endpoints created by the factory
#[derive(Debug, Clone)]
pub struct EndpointScript {
    pub start: StartReply,
    /// `None` completes; `Some(detail)` cancels
    pub speak_failure: Option<Option<String>>,
    /// Speak never replies until the endpoint is closed
    pub hold_speak: bool,
    /// `close` reports an error (the endpoint still closes)
    pub fail_close: bool,
}

impl Default for EndpointScript {
    fn default() -> Self {
        Self {
            start: StartReply::Completed,
            speak_failure: None,
            hold_speak: false,
            fail_close: false,
        }
    }
}

/// In-memory endpoint following an [`EndpointScript`]
pub struct ScriptedEndpoint {
    script: EndpointScript,
    authenticated_key: Mutex<Option<String>>,
    start_calls: AtomicUsize,
    speak_calls: AtomicUsize,
    spoken: Mutex<Vec<String>>,
    close_calls: AtomicUsize,
    closed: watch::Sender<bool>,
    closes: Arc<CloseRecorder>,
}

impl ScriptedEndpoint {
    pub fn new(script: EndpointScript) -> Self {
        Self::with_recorder(script, Arc::default())
    }

    pub fn with_recorder(script: EndpointScript, closes: Arc<CloseRecorder>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            script,
            authenticated_key: Mutex::new(None),
            start_calls: AtomicUsize::new(0),
            speak_calls: AtomicUsize::new(0),
            spoken: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
            closed,
            closes,
        }
    }

    /// Key presented to `authenticate`
    pub fn authenticated_key(&self) -> Option<String> {
        self.authenticated_key.lock().clone()
    }

    /// Times `start_session` was entered
    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Times `speak` was entered
    pub fn speak_calls(&self) -> usize {
        self.speak_calls.load(Ordering::SeqCst)
    }

    /// Markup of every utterance received
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }

    /// Times `close` was called
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::SessionClosed("endpoint closed".to_string()))
        } else {
            Ok(())
        }
    }

    async fn hold_until_closed(&self) -> Error {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
        Error::SessionClosed("endpoint connection closed".to_string())
    }
}

#[async_trait]
impl SynthesisEndpoint for ScriptedEndpoint {
    async fn authenticate(&self, credential: &Credential) -> Result<()> {
        self.ensure_open()?;
        *self.authenticated_key.lock() = Some(credential.trimmed_key().to_string());
        Ok(())
    }

    async fn start_session(
        &self,
        transport: Arc<dyn MediaTransport>,
        _request: &StartSessionRequest,
    ) -> Result<SessionAck> {
        self.ensure_open()?;
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        transport.create_offer().await?;

        match &self.script.start {
            StartReply::Completed => {
                transport.apply_answer(SCRIPTED_ANSWER.to_string()).await?;
                transport.wait_established().await?;
                Ok(SessionAck::completed("remote-session"))
            }
            StartReply::Canceled(detail) => Ok(SessionAck::canceled(detail.clone())),
            StartReply::Hold => Err(self.hold_until_closed().await),
        }
    }

    async fn speak(&self, utterance: &Utterance) -> Result<SpeakOutcome> {
        self.ensure_open()?;
        self.speak_calls.fetch_add(1, Ordering::SeqCst);
        if self.script.hold_speak {
            return Err(self.hold_until_closed().await);
        }

        self.spoken.lock().push(utterance.to_markup());
        match &self.script.speak_failure {
            None => Ok(SpeakOutcome::completed()),
            Some(detail) => Ok(SpeakOutcome::canceled(detail.clone())),
        }
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closes.record("synthesis");
        self.closed.send_replace(true);
        if self.script.fail_close {
            return Err(Error::SignalingError("close notification not delivered".to_string()));
        }
        Ok(())
    }
}

/// Creates scripted endpoints and keeps them for inspection
#[derive(Default)]
pub struct ScriptedEndpointFactory {
    script: Mutex<EndpointScript>,
    created: Mutex<Vec<Arc<ScriptedEndpoint>>>,
    closes: Arc<CloseRecorder>,
}

impl ScriptedEndpointFactory {
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

    /// Script used by endpoints created from now on
    pub fn set_script(&self, script: EndpointScript) {
        *self.script.lock() = script;
    }

    /// Endpoints created so far
    pub fn created(&self) -> Vec<Arc<ScriptedEndpoint>> {
        self.created.lock().clone()
    }

    /// Most recently created endpoint
    pub fn last(&self) -> Option<Arc<ScriptedEndpoint>> {
        self.created.lock().last().cloned()
    }
}

impl EndpointFactory for ScriptedEndpointFactory {
    fn endpoint(&self) -> Arc<dyn SynthesisEndpoint> {
        let endpoint = Arc::new(ScriptedEndpoint::with_recorder(
            self.script.lock().clone(),
            Arc::clone(&self.closes),
        ));
        self.created.lock().push(Arc::clone(&endpoint));
        endpoint
    }
}
