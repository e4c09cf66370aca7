//! One live synthesis session

use super::endpoint::{StartSessionRequest, SynthesisEndpoint};
use crate::transport::MediaTransport;
use crate::{Error, Result};
use liveavatar_core::{Credential, Utterance};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// A transport bound to an authenticated, started endpoint session
pub struct SynthesisSession {
    id: Uuid,
    remote_id: String,
    endpoint: Arc<dyn SynthesisEndpoint>,
    transport: Arc<dyn MediaTransport>,
    closed: AtomicBool,
}

impl SynthesisSession {
    /// Authenticate and start the avatar over `transport`
    ///
    /// # Errors
    ///
    /// - [`Error::MissingCredential`] if the key is blank; nothing is sent
    /// - [`Error::SessionRejected`] with the remote detail (or the generic
    ///   "Connection failed") if the endpoint refuses the session
    /// - any transport or endpoint error raised on the way
    #[instrument(skip_all, fields(transport_id = %transport.id(), character = %request.character))]
    pub async fn open(
        endpoint: Arc<dyn SynthesisEndpoint>,
        transport: Arc<dyn MediaTransport>,
        credential: &Credential,
        request: &StartSessionRequest,
    ) -> Result<Self> {
        if !credential.is_present() {
            return Err(Error::MissingCredential);
        }

        endpoint.authenticate(credential).await?;
        let ack = endpoint
            .start_session(Arc::clone(&transport), request)
            .await?;
        if !ack.is_success() {
            return Err(Error::SessionRejected(ack.failure_message()));
        }

        let session = Self {
            id: Uuid::new_v4(),
            remote_id: ack.session_id,
            endpoint,
            transport,
            closed: AtomicBool::new(false),
        };
        info!(
            "Synthesis session {} open (remote {})",
            session.id, session.remote_id
        );
        Ok(session)
    }

    /// Local session id
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Endpoint-assigned session id
    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    /// The transport this session runs over
    pub fn transport(&self) -> &Arc<dyn MediaTransport> {
        &self.transport
    }

    /// Speak one utterance and wait for it to finish
    ///
    /// # Errors
    ///
    /// [`Error::SynthesisFailed`] carrying the remote detail when the
    /// endpoint cancels the utterance; [`Error::SessionClosed`] after
    /// [`close`](Self::close).
    pub async fn speak(&self, utterance: &Utterance) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::SessionClosed("synthesis session closed".to_string()));
        }

        debug!("Session {} speaking with {}", self.id, utterance.voice);
        let outcome = self.endpoint.speak(utterance).await?;
        if outcome.is_success() {
            Ok(())
        } else {
            Err(Error::SynthesisFailed(outcome.failure_message()))
        }
    }

    /// Close the endpoint session. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Closing synthesis session {}", self.id);
        self.endpoint.close().await
    }

    /// True once closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for SynthesisSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisSession")
            .field("id", &self.id)
            .field("remote_id", &self.remote_id)
            .field("transport", &self.transport.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}
