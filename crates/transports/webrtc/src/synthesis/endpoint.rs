//! Remote endpoint abstraction

use crate::transport::MediaTransport;
use crate::Result;
use async_trait::async_trait;
use liveavatar_core::{catalog, AvatarConfig, Credential, Utterance};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Message used when a session is refused without detail
pub const GENERIC_CONNECT_FAILURE: &str = "Connection failed";

/// Message used when an utterance is canceled without detail
pub const GENERIC_SPEAK_FAILURE: &str = "Speech synthesis canceled";

/// Outcome reason reported by the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultReason {
    /// The request completed and media is flowing / speech was played
    SynthesizingAudioCompleted,
    /// The request was refused or aborted
    Canceled,
}

/// Acknowledgment of `start_session`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAck {
    /// Endpoint-assigned session id
    pub session_id: String,
    /// Success or failure
    pub reason: ResultReason,
    /// Remote failure detail, if any
    pub error_details: Option<String>,
}

impl SessionAck {
    /// Successful acknowledgment
    pub fn completed(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            reason: ResultReason::SynthesizingAudioCompleted,
            error_details: None,
        }
    }

    /// Refusal with optional detail
    pub fn canceled(error_details: Option<String>) -> Self {
        Self {
            session_id: String::new(),
            reason: ResultReason::Canceled,
            error_details,
        }
    }

    /// True if media is flowing
    pub fn is_success(&self) -> bool {
        self.reason == ResultReason::SynthesizingAudioCompleted
    }

    /// Remote detail, or the generic message
    pub fn failure_message(&self) -> String {
        failure_message(&self.error_details, GENERIC_CONNECT_FAILURE)
    }
}

/// Result of one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakOutcome {
    /// Success or failure
    pub reason: ResultReason,
    /// Remote failure detail, if any
    pub error_details: Option<String>,
}

impl SpeakOutcome {
    /// Completed utterance
    pub fn completed() -> Self {
        Self {
            reason: ResultReason::SynthesizingAudioCompleted,
            error_details: None,
        }
    }

    /// Canceled utterance
    pub fn canceled(error_details: Option<String>) -> Self {
        Self {
            reason: ResultReason::Canceled,
            error_details,
        }
    }

    /// True if the utterance played to completion
    pub fn is_success(&self) -> bool {
        self.reason == ResultReason::SynthesizingAudioCompleted
    }

    /// Remote detail, or the generic message
    pub fn failure_message(&self) -> String {
        failure_message(&self.error_details, GENERIC_SPEAK_FAILURE)
    }
}

fn failure_message(details: &Option<String>, generic: &str) -> String {
    details
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(generic)
        .to_string()
}

/// Avatar selection sent with `start_session`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSessionRequest {
    /// Character selector
    pub character: String,
    /// Style selector, valid for `character`
    pub style: String,
    /// Voice selector
    pub voice: String,
    /// Preferred video encoding
    pub video_codec: String,
    /// Background painted behind the avatar
    pub background_color: String,
}

impl StartSessionRequest {
    /// Build from settings, validating the selectors against the catalogs
    pub fn from_config(config: &AvatarConfig) -> Result<Self> {
        catalog::validate_selection(&config.character, &config.style)?;
        catalog::voice(&config.voice)?;
        Ok(Self {
            character: config.character.clone(),
            style: config.style.clone(),
            voice: config.voice.clone(),
            video_codec: config.video_codec.clone(),
            background_color: config.background_color.clone(),
        })
    }
}

/// The remote render and speech service, one instance per session
///
/// Cancellation is cooperative: `close` makes in-flight calls fail.
#[async_trait]
pub trait SynthesisEndpoint: Send + Sync {
    /// Present the credential
    async fn authenticate(&self, credential: &Credential) -> Result<()>;

    /// Start the avatar over `transport`. Resolves once the endpoint has
    /// confirmed the session (media flowing) or refused it.
    async fn start_session(
        &self,
        transport: Arc<dyn MediaTransport>,
        request: &StartSessionRequest,
    ) -> Result<SessionAck>;

    /// Speak one utterance and wait for it to finish
    async fn speak(&self, utterance: &Utterance) -> Result<SpeakOutcome>;

    /// End the session. Closing twice is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Creates one endpoint per connect attempt
pub trait EndpointFactory: Send + Sync {
    /// Fresh, unauthenticated endpoint
    fn endpoint(&self) -> Arc<dyn SynthesisEndpoint>;
}
