//! Scripted collaborators for session tests
//!
//! Provides in-process doubles for the two network seams so the session
//! state machine can be driven deterministically:
//! - [`ScriptedTransportFactory`] / [`ScriptedTransport`]
//! - [`ScriptedEndpointFactory`] / [`ScriptedEndpoint`]
//!
//! Basic usage pattern:
//!
//! 1. Build a `Harness` (optionally tweaking the scripts)
//! 2. Drive `harness.controller` through connect / speak / disconnect
//! 3. Inspect the recorded transports and endpoints

#![allow(dead_code)]

pub mod endpoint;
pub mod transport;

use liveavatar_core::{AvatarConfig, Credential, LogKind, ManualRefresh, Presentation, Surface};
use liveavatar_webrtc::SessionController;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub use endpoint::{EndpointScript, ScriptedEndpoint, ScriptedEndpointFactory, StartReply};
pub use transport::{ScriptedTransport, ScriptedTransportFactory};

/// Controller wired to scripted collaborators
pub struct Harness {
    pub controller: SessionController,
    pub transports: Arc<ScriptedTransportFactory>,
    pub endpoints: Arc<ScriptedEndpointFactory>,
    pub refresh: Arc<ManualRefresh>,
    pub closes: Arc<CloseRecorder>,
}

impl Harness {
    /// Harness with a valid credential and default scripts
    pub fn new() -> Self {
        Self::with_settings(settings_with_key("test-key"))
    }

    /// Harness around the given settings
    pub fn with_settings(settings: AvatarConfig) -> Self {
        let closes = Arc::new(CloseRecorder::default());
        let transports = Arc::new(ScriptedTransportFactory::with_recorder(closes.clone()));
        let endpoints = Arc::new(ScriptedEndpointFactory::with_recorder(closes.clone()));
        let refresh = Arc::new(ManualRefresh::new());

        let controller = SessionController::builder(settings)
            .transports(transports.clone())
            .endpoints(endpoints.clone())
            .refresh(refresh.clone())
            .build()
            .expect("valid harness settings");
        closes.observe(controller.surface());

        Self {
            controller,
            transports,
            endpoints,
            refresh,
            closes,
        }
    }

    /// Messages currently in the activity log, oldest first
    pub fn messages(&self) -> Vec<String> {
        self.controller
            .log()
            .snapshot()
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    /// Kind of the newest log entry
    pub fn last_kind(&self) -> Option<LogKind> {
        self.controller.log().last().map(|e| e.kind)
    }
}

/// Surface state seen when a scripted double was closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub what: &'static str,
    /// The compositor canvas was still shown
    pub matted: bool,
    /// A stream was still displayed
    pub displaying: bool,
}

/// Shared record of closes across transports and endpoints, in call order
#[derive(Default)]
pub struct CloseRecorder {
    surface: Mutex<Option<Arc<Surface>>>,
    events: Mutex<Vec<CloseEvent>>,
}

impl CloseRecorder {
    /// Snapshot `surface` on every close
    pub fn observe(&self, surface: Arc<Surface>) {
        *self.surface.lock() = Some(surface);
    }

    pub fn record(&self, what: &'static str) {
        let (matted, displaying) = match self.surface.lock().as_ref() {
            Some(surface) => (
                surface.presentation() == Presentation::Matted,
                surface.source().is_some(),
            ),
            None => (false, false),
        };
        self.events.lock().push(CloseEvent {
            what,
            matted,
            displaying,
        });
    }

    pub fn events(&self) -> Vec<CloseEvent> {
        self.events.lock().clone()
    }

    /// Names of the closed doubles, oldest first
    pub fn order(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.what).collect()
    }
}

/// Default settings carrying `key`
pub fn settings_with_key(key: &str) -> AvatarConfig {
    AvatarConfig {
        credential: Credential::new(key, "westus2"),
        ..Default::default()
    }
}

/// Initialize tracing for tests (safe to call more than once)
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug,webrtc=warn")
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds, panicking after two seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
