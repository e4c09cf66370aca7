//! Session controller
//!
//! All phase changes and every write to the resource slot happen under
//! one lock, and the lock is never held across an await. A connect
//! attempt is identified by a UUID; every resumption of an in-flight
//! `connect` or `speak` re-checks that id, so a completion arriving after
//! `disconnect` is discarded instead of resurrecting the session.

use super::phase::Phase;
use crate::synthesis::{EndpointFactory, StartSessionRequest, SynthesisEndpoint, SynthesisSession};
use crate::transport::{MediaTransport, TransportFactory};
use crate::{Error, Result};
use liveavatar_core::{
    ActivityLog, AvatarConfig, ChromaKey, Compositor, CompositorHandle, Credential, DisplayRate,
    LogKind, RefreshSource, Surface, Utterance, VideoStream,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Resources owned by one connect attempt
#[derive(Default)]
struct Slot {
    attempt: Option<Uuid>,
    endpoint: Option<Arc<dyn SynthesisEndpoint>>,
    transport: Option<Arc<dyn MediaTransport>>,
    synthesis: Option<Arc<SynthesisSession>>,
    compositor: Option<CompositorHandle>,
    watcher: Option<JoinHandle<()>>,
}

impl Slot {
    fn is_current(&self, attempt: Uuid) -> bool {
        self.attempt == Some(attempt)
    }

    /// Detach everything, ending the current attempt
    fn release(&mut self) -> Released {
        self.attempt = None;
        Released {
            endpoint: self.endpoint.take(),
            transport: self.transport.take(),
            synthesis: self.synthesis.take(),
            compositor: self.compositor.take(),
            watcher: self.watcher.take(),
        }
    }
}

/// Resources detached from the slot, awaiting teardown
struct Released {
    endpoint: Option<Arc<dyn SynthesisEndpoint>>,
    transport: Option<Arc<dyn MediaTransport>>,
    synthesis: Option<Arc<SynthesisSession>>,
    compositor: Option<CompositorHandle>,
    watcher: Option<JoinHandle<()>>,
}

struct Inner {
    settings: Mutex<AvatarConfig>,
    slot: Mutex<Slot>,
    phase: watch::Sender<Phase>,
    log: ActivityLog,
    surface: Arc<Surface>,
    refresh: Arc<dyn RefreshSource>,
    transports: Arc<dyn TransportFactory>,
    endpoints: Arc<dyn EndpointFactory>,
}

impl Inner {
    /// Caller must hold the slot lock
    fn set_phase(&self, phase: Phase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            debug!("Session phase: {} -> {}", previous, phase);
        }
    }

    fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Close network resources first, then visual ones. Never fails.
    async fn teardown(&self, released: Released) {
        let Released {
            endpoint,
            transport,
            synthesis,
            compositor,
            watcher,
        } = released;

        let closed = match (synthesis, endpoint) {
            (Some(synthesis), _) => synthesis.close().await,
            (None, Some(endpoint)) => endpoint.close().await,
            (None, None) => Ok(()),
        };
        if let Err(e) = closed {
            self.close_failed("synthesis session", e);
        }

        if let Some(transport) = transport {
            if let Err(e) = transport.close().await {
                self.close_failed("transport", e);
            }
        }

        if let Some(compositor) = compositor {
            compositor.dispose();
        }
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        self.surface.clear_source();
    }

    /// Teardown carries on past a failed close
    fn close_failed(&self, what: &str, error: Error) {
        warn!("Failed to close {}: {}", what, error);
        self.log
            .append(format!("ERROR: closing {}: {}", what, error), LogKind::Err);
    }
}

/// Top-level coordinator of one avatar session
///
/// Cheap to clone; clones drive the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    /// Start building a controller around `settings`
    pub fn builder(settings: AvatarConfig) -> SessionControllerBuilder {
        SessionControllerBuilder::new(settings)
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.inner.phase()
    }

    /// Observe phase changes
    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.inner.phase.subscribe()
    }

    /// The activity log shown to the user
    pub fn log(&self) -> &ActivityLog {
        &self.inner.log
    }

    /// Copy of the current settings
    pub fn settings(&self) -> AvatarConfig {
        self.inner.settings.lock().clone()
    }

    /// The displayed surface
    pub fn surface(&self) -> Arc<Surface> {
        Arc::clone(&self.inner.surface)
    }

    /// Stream currently shown on the surface
    pub fn displayed_stream(&self) -> Option<Arc<VideoStream>> {
        self.inner.surface.source()
    }

    /// Id of the current connect attempt
    pub fn session_id(&self) -> Option<Uuid> {
        self.inner.slot.lock().attempt
    }

    /// True while a transport is held
    pub fn has_transport(&self) -> bool {
        self.inner.slot.lock().transport.is_some()
    }

    /// True while a compositor is held
    pub fn has_compositor(&self) -> bool {
        self.inner.slot.lock().compositor.is_some()
    }

    /// Open a session. Only valid from [`Phase::Idle`]; a no-op otherwise.
    ///
    /// Failures are logged and leave the controller in [`Phase::Error`]
    /// with every partially built resource discarded. Returns the phase
    /// the call settled in.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Phase {
        let inner = &self.inner;

        let (attempt, endpoint, settings, request) = {
            let mut slot = inner.slot.lock();
            let phase = inner.phase();
            if !phase.can_connect() {
                debug!("connect ignored while {}", phase);
                return phase;
            }

            let settings = inner.settings.lock().clone();
            if !settings.credential.is_present() {
                inner.set_phase(Phase::Error);
                inner.log.append(Error::MissingCredential.to_string(), LogKind::Err);
                return Phase::Error;
            }
            let request = match StartSessionRequest::from_config(&settings) {
                Ok(request) => request,
                Err(e) => {
                    inner.set_phase(Phase::Error);
                    inner.log.append(format!("ERROR: {}", e), LogKind::Err);
                    return Phase::Error;
                }
            };

            let attempt = Uuid::new_v4();
            let endpoint = inner.endpoints.endpoint();
            slot.attempt = Some(attempt);
            slot.endpoint = Some(Arc::clone(&endpoint));
            inner.set_phase(Phase::Initializing);
            inner.log.append(
                format!(
                    "Initializing avatar with {} transparency...",
                    settings.video_codec
                ),
                LogKind::Sys,
            );
            (attempt, endpoint, settings, request)
        };

        info!("Connect attempt {}", attempt);

        let transport = match inner.transports.open().await {
            Ok(transport) => transport,
            Err(e) => return self.fail(attempt, e).await,
        };

        let stored = {
            let mut slot = inner.slot.lock();
            if slot.is_current(attempt) {
                slot.transport = Some(Arc::clone(&transport));
                slot.watcher = Some(tokio::spawn(watch_stream(
                    Arc::downgrade(&self.inner),
                    attempt,
                    Arc::clone(&transport),
                    settings.chroma_key(),
                )));
                inner.log.append("Negotiating handshake...", LogKind::Sys);
            }
            slot.is_current(attempt)
        };
        if !stored {
            debug!("Attempt {} superseded before transport was stored", attempt);
            if let Err(e) = transport.close().await {
                inner.close_failed("transport", e);
            }
            return inner.phase();
        }

        let opened = SynthesisSession::open(
            endpoint,
            Arc::clone(&transport),
            &settings.credential,
            &request,
        )
        .await;

        let session = match opened {
            Ok(session) => Arc::new(session),
            Err(e) => return self.fail(attempt, e).await,
        };

        {
            let mut slot = inner.slot.lock();
            if slot.is_current(attempt) {
                slot.synthesis = Some(Arc::clone(&session));
                inner.set_phase(Phase::Live);
                inner.log.append("Avatar connected!", LogKind::Ok);
                return Phase::Live;
            }
        }

        debug!("Attempt {} completed after teardown, discarding", attempt);
        if let Err(e) = session.close().await {
            inner.close_failed("synthesis session", e);
        }
        inner.phase()
    }

    /// Record a setup failure for `attempt` and discard what it built
    async fn fail(&self, attempt: Uuid, error: Error) -> Phase {
        let inner = &self.inner;
        let released = {
            let mut slot = inner.slot.lock();
            if !slot.is_current(attempt) {
                debug!("Attempt {} failed after teardown: {}", attempt, error);
                return inner.phase();
            }
            let released = slot.release();
            warn!(
                retryable = error.is_retryable(),
                negotiation = error.is_negotiation_error(),
                "Connect attempt {} failed: {}",
                attempt,
                error
            );
            inner.set_phase(Phase::Error);
            inner.log.append(format!("ERROR: {}", error), LogKind::Err);
            released
        };

        inner.teardown(released).await;
        Phase::Error
    }

    /// Speak `text` with the selected voice. Only valid from
    /// [`Phase::Live`]; a silent no-op otherwise.
    ///
    /// Failures are logged and the session returns to [`Phase::Live`].
    /// Returns true if the utterance played to completion.
    #[instrument(skip(self, text))]
    pub async fn speak(&self, text: &str) -> bool {
        let inner = &self.inner;

        let (attempt, synthesis, voice) = {
            let slot = inner.slot.lock();
            let phase = inner.phase();
            if !phase.can_speak() {
                debug!("speak ignored while {}", phase);
                return false;
            }
            let (Some(attempt), Some(synthesis)) = (slot.attempt, slot.synthesis.clone()) else {
                return false;
            };
            inner.set_phase(Phase::Speaking);
            (attempt, synthesis, inner.settings.lock().voice.clone())
        };

        let result = match Utterance::new(&voice, text) {
            Ok(utterance) => synthesis.speak(&utterance).await,
            Err(e) => Err(e.into()),
        };

        let slot = inner.slot.lock();
        if !slot.is_current(attempt) {
            debug!("Utterance finished after teardown");
            return false;
        }
        if let Err(e) = &result {
            inner.log.append(format!("Speak error: {}", e), LogKind::Err);
        }
        if inner.phase() == Phase::Speaking {
            inner.set_phase(Phase::Live);
        }
        result.is_ok()
    }

    /// Tear everything down and return to [`Phase::Idle`]. Valid from any
    /// phase, idempotent, never fails.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        self.shut_down().await;
        self.inner.log.append("Disconnected.", LogKind::Info);
    }

    /// Always-safe recovery from [`Phase::Error`]; same teardown as
    /// [`disconnect`](Self::disconnect)
    #[instrument(skip(self))]
    pub async fn reset(&self) {
        self.shut_down().await;
        self.inner.log.append("Session reset.", LogKind::Sys);
    }

    async fn shut_down(&self) {
        let inner = &self.inner;
        let released = inner.slot.lock().release();
        inner.teardown(released).await;

        let slot = inner.slot.lock();
        // A connect started during teardown owns the phase now.
        if slot.attempt.is_none() {
            inner.set_phase(Phase::Idle);
        }
    }

    /// Replace the credential
    pub fn set_credential(&self, credential: Credential) -> Result<()> {
        self.update_settings(|settings| {
            settings.credential = credential;
            Ok(())
        })
    }

    /// Select a character; its default style becomes the style
    pub fn select_character(&self, name: &str) -> Result<()> {
        self.update_settings(|settings| settings.select_character(name))
    }

    /// Select a style of the current character
    pub fn select_style(&self, style: &str) -> Result<()> {
        self.update_settings(|settings| settings.select_style(style))
    }

    /// Select a voice
    pub fn select_voice(&self, voice: &str) -> Result<()> {
        self.update_settings(|settings| settings.select_voice(voice))
    }

    /// Replace the pending utterance text
    pub fn set_utterance(&self, text: &str) -> Result<()> {
        self.update_settings(|settings| {
            settings.utterance = text.to_string();
            Ok(())
        })
    }

    /// Apply `change` to a copy of the settings and keep it only if it
    /// succeeds. Settings are locked while a session is open.
    fn update_settings(
        &self,
        change: impl FnOnce(&mut AvatarConfig) -> liveavatar_core::Result<()>,
    ) -> Result<()> {
        let _slot = self.inner.slot.lock();
        let phase = self.inner.phase();
        if !phase.accepts_settings() {
            return Err(Error::SessionError(format!(
                "Settings cannot change while {}",
                phase
            )));
        }

        let mut settings = self.inner.settings.lock();
        let mut updated = settings.clone();
        change(&mut updated)?;
        *settings = updated;
        Ok(())
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("phase", &self.phase())
            .field("session_id", &self.session_id())
            .finish()
    }
}

/// Waits for the inbound video, shows it, then starts keying it once its
/// size is known
async fn watch_stream(
    inner: Weak<Inner>,
    attempt: Uuid,
    transport: Arc<dyn MediaTransport>,
    key: ChromaKey,
) {
    let Some(stream) = transport.video_stream().await else {
        debug!("Transport {} closed before video arrived", transport.id());
        return;
    };

    {
        let Some(inner) = inner.upgrade() else { return };
        let slot = inner.slot.lock();
        if !slot.is_current(attempt) {
            return;
        }
        inner.surface.set_source(Arc::clone(&stream));
    }
    info!("Inbound video {} attached", stream.label());

    let Some(size) = stream.wait_for_metadata().await else {
        debug!("Stream {} ended before its first frame", stream.label());
        return;
    };

    let Some(inner) = inner.upgrade() else { return };
    let mut slot = inner.slot.lock();
    if !slot.is_current(attempt) {
        return;
    }
    info!("Stream {} is {}, starting compositor", stream.label(), size);
    let handle = Compositor::start(
        stream,
        Arc::clone(&inner.surface),
        inner.refresh.signal(),
        key,
    );
    slot.compositor = Some(handle);
}

/// Builder for [`SessionController`]
pub struct SessionControllerBuilder {
    settings: AvatarConfig,
    transports: Option<Arc<dyn TransportFactory>>,
    endpoints: Option<Arc<dyn EndpointFactory>>,
    refresh: Option<Arc<dyn RefreshSource>>,
    surface: Option<Arc<Surface>>,
}

impl SessionControllerBuilder {
    fn new(settings: AvatarConfig) -> Self {
        Self {
            settings,
            transports: None,
            endpoints: None,
            refresh: None,
            surface: None,
        }
    }

    /// Where transports come from (required)
    pub fn transports(mut self, transports: Arc<dyn TransportFactory>) -> Self {
        self.transports = Some(transports);
        self
    }

    /// Where synthesis endpoints come from (required)
    pub fn endpoints(mut self, endpoints: Arc<dyn EndpointFactory>) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    /// Display refresh driving the compositor; defaults to the configured rate
    pub fn refresh(mut self, refresh: Arc<dyn RefreshSource>) -> Self {
        self.refresh = Some(refresh);
        self
    }

    /// Surface to display on; defaults to a fresh one
    pub fn surface(mut self, surface: Arc<Surface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Validate the settings and build the controller in [`Phase::Idle`]
    pub fn build(self) -> Result<SessionController> {
        self.settings.validate()?;
        let transports = self
            .transports
            .ok_or_else(|| Error::InvalidConfig("transport factory is required".to_string()))?;
        let endpoints = self
            .endpoints
            .ok_or_else(|| Error::InvalidConfig("endpoint factory is required".to_string()))?;
        let refresh = self
            .refresh
            .unwrap_or_else(|| Arc::new(DisplayRate::new(self.settings.refresh_hz)));

        let (phase, _) = watch::channel(Phase::Idle);
        let inner = Inner {
            settings: Mutex::new(self.settings),
            slot: Mutex::new(Slot::default()),
            phase,
            log: ActivityLog::new(),
            surface: self.surface.unwrap_or_else(|| Arc::new(Surface::new())),
            refresh,
            transports,
            endpoints,
        };
        inner.log.append("System Ready.", LogKind::Sys);

        Ok(SessionController {
            inner: Arc::new(inner),
        })
    }
}
