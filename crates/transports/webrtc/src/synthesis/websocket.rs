//! JSON-RPC over WebSocket synthesis endpoint
//!
//! One WebSocket connection per endpoint instance. Requests carry a UUID
//! id and are matched to replies by the receiver task; when the socket
//! closes, every request still waiting fails with
//! [`Error::SessionClosed`].

use super::endpoint::{
    EndpointFactory, ResultReason, SessionAck, SpeakOutcome, StartSessionRequest,
    SynthesisEndpoint,
};
use super::protocol::*;
use crate::transport::MediaTransport;
use crate::{Error, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use liveavatar_core::{Credential, Utterance};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, instrument, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Result<Value>>>>>;

/// Default time to wait for a reply
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

struct Connection {
    tx: mpsc::UnboundedSender<Message>,
    receiver: JoinHandle<()>,
}

/// Synthesis endpoint reached over a WebSocket
pub struct WebSocketEndpoint {
    url: String,
    request_timeout: Duration,
    connection: Mutex<Option<Connection>>,
    pending: PendingMap,
    closed: AtomicBool,
}

impl WebSocketEndpoint {
    /// Endpoint for `url` (ws:// or wss://). Nothing is opened until
    /// [`authenticate`](SynthesisEndpoint::authenticate).
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connection: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            closed: AtomicBool::new(false),
        }
    }

    /// Override the reply timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// True while the socket is open
    pub fn is_connected(&self) -> bool {
        self.connection.lock().is_some()
    }

    async fn connect(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::SessionClosed("endpoint closed".to_string()));
        }
        if self.is_connected() {
            return Ok(());
        }

        info!("Connecting to synthesis endpoint: {}", self.url);

        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::WebSocketError(format!("Failed to connect: {}", e)))?;

        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::SessionClosed("endpoint closed".to_string()));
        }

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::sender_task(write, rx));
        let receiver = tokio::spawn(Self::receiver_task(read, Arc::clone(&self.pending)));

        *self.connection.lock() = Some(Connection { tx, receiver });
        info!("Connected to synthesis endpoint");
        Ok(())
    }

    /// Sender task: sends messages from channel to WebSocket
    async fn sender_task(
        mut write: futures::stream::SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = write.send(msg).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }

        debug!("Sender task terminated");
    }

    /// Receiver task: routes replies to waiting requests
    async fn receiver_task(mut read: futures::stream::SplitStream<WsStream>, pending: PendingMap) {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    if let Err(e) = Self::handle_message(&text, &pending) {
                        warn!("Failed to handle endpoint message: {}", e);
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("Endpoint closed the connection");
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        // Dropping the reply channels fails every waiting request.
        let abandoned = {
            let mut pending = pending.lock();
            let count = pending.len();
            pending.clear();
            count
        };
        if abandoned > 0 {
            debug!("{} endpoint requests abandoned", abandoned);
        }
        debug!("Receiver task terminated");
    }

    fn handle_message(text: &str, pending: &PendingMap) -> Result<()> {
        match IncomingMessage::from_json(text)? {
            IncomingMessage::Response(response) => {
                Self::resolve(pending, &response.id, Ok(response.result));
            }
            IncomingMessage::Error(failure) => {
                let error = match failure.error.code {
                    error_codes::UNAUTHORIZED => Error::SessionRejected(failure.error.message),
                    code => Error::SignalingError(format!(
                        "{} (code {})",
                        failure.error.message, code
                    )),
                };
                Self::resolve(pending, &failure.id, Err(error));
            }
            IncomingMessage::Notification(notification) => {
                debug!("Endpoint notification: {}", notification.method);
            }
        }
        Ok(())
    }

    fn resolve(pending: &PendingMap, id: &Value, result: Result<Value>) {
        let key = request_key(id);
        let waiter = pending.lock().remove(&key);
        match waiter {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => warn!("Reply for unknown request {}", key),
        }
    }

    async fn call<P: Serialize>(&self, method: &str, params: P) -> Result<Value> {
        let tx = self
            .connection
            .lock()
            .as_ref()
            .map(|c| c.tx.clone())
            .ok_or_else(|| Error::SessionClosed("endpoint not connected".to_string()))?;

        let params = serde_json::to_value(params).map_err(|e| {
            Error::SerializationError(format!("Invalid {} params: {}", method, e))
        })?;
        let id = uuid::Uuid::new_v4().to_string();
        let request = JsonRpcRequest::new(method.to_string(), params, Some(Value::from(id.clone())));
        let text = request.to_json()?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), reply_tx);

        debug!("Sending {} ({})", method, id);
        if tx.send(Message::Text(text)).is_err() {
            self.pending.lock().remove(&id);
            return Err(Error::SessionClosed("endpoint connection closed".to_string()));
        }

        match tokio::time::timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::SessionClosed("endpoint connection closed".to_string())),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(Error::OperationTimeout(format!(
                    "{} timed out after {:?}",
                    method, self.request_timeout
                )))
            }
        }
    }
}

fn request_key(id: &Value) -> String {
    id.as_str()
        .map(str::to_string)
        .unwrap_or_else(|| id.to_string())
}

fn decode<T: serde::de::DeserializeOwned>(method: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::SerializationError(format!("Invalid {} result: {}", method, e)))
}

#[async_trait]
impl SynthesisEndpoint for WebSocketEndpoint {
    #[instrument(skip_all, fields(region = %credential.region))]
    async fn authenticate(&self, credential: &Credential) -> Result<()> {
        self.connect().await?;
        self.call(
            METHOD_AUTHENTICATE,
            AuthenticateParams {
                key: credential.trimmed_key().to_string(),
                region: credential.region.clone(),
            },
        )
        .await?;
        debug!("Endpoint accepted credential");
        Ok(())
    }

    async fn start_session(
        &self,
        transport: Arc<dyn MediaTransport>,
        request: &StartSessionRequest,
    ) -> Result<SessionAck> {
        let offer = transport.create_offer().await?;
        let value = self
            .call(
                METHOD_START,
                StartParams {
                    sdp: offer,
                    character: request.character.clone(),
                    style: request.style.clone(),
                    voice: request.voice.clone(),
                    video_codec: request.video_codec.clone(),
                    background_color: request.background_color.clone(),
                },
            )
            .await?;
        let result: StartResult = decode(METHOD_START, value)?;

        if result.reason != ResultReason::SynthesizingAudioCompleted {
            info!("Endpoint refused session");
            return Ok(SessionAck::canceled(result.error_details));
        }

        let answer = result
            .sdp
            .ok_or_else(|| Error::SdpError("start result carries no answer".to_string()))?;
        transport.apply_answer(answer).await?;
        transport.wait_established().await?;

        Ok(SessionAck::completed(result.session_id))
    }

    async fn speak(&self, utterance: &Utterance) -> Result<SpeakOutcome> {
        let value = self
            .call(
                METHOD_SPEAK,
                SpeakParams {
                    ssml: utterance.to_markup(),
                },
            )
            .await?;
        let result: SpeakResult = decode(METHOD_SPEAK, value)?;
        Ok(SpeakOutcome {
            reason: result.reason,
            error_details: result.error_details,
        })
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            let goodbye = JsonRpcRequest::new(METHOD_CLOSE.to_string(), Value::Null, None);
            if let Ok(text) = goodbye.to_json() {
                let _ = connection.tx.send(Message::Text(text));
            }
            let _ = connection.tx.send(Message::Close(None));
            connection.receiver.abort();
            info!("Disconnected from synthesis endpoint");
        }

        self.pending.lock().clear();
        Ok(())
    }
}

impl Drop for WebSocketEndpoint {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.lock().take() {
            connection.receiver.abort();
        }
    }
}

/// Creates a [`WebSocketEndpoint`] per connect attempt
#[derive(Debug, Clone)]
pub struct WebSocketEndpointFactory {
    url: String,
    request_timeout: Duration,
}

impl WebSocketEndpointFactory {
    /// Factory for `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the reply timeout of created endpoints
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl EndpointFactory for WebSocketEndpointFactory {
    fn endpoint(&self) -> Arc<dyn SynthesisEndpoint> {
        Arc::new(WebSocketEndpoint::new(&self.url).with_request_timeout(self.request_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportState;
    use liveavatar_core::VideoStream;
    use serde_json::json;
    use tokio::net::TcpListener;
    use uuid::Uuid;

    /// Reply to one request; `None` hangs up
    type Script = fn(&JsonRpcRequest) -> Option<Value>;

    async fn serve(script: Script) -> (String, JoinHandle<Vec<JsonRpcRequest>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let mut seen = Vec::new();
            while let Some(Ok(msg)) = ws.next().await {
                let Message::Text(text) = msg else {
                    if msg.is_close() {
                        break;
                    }
                    continue;
                };
                let request = JsonRpcRequest::from_json(&text).unwrap();
                seen.push(request.clone());
                if request.id.is_none() {
                    continue;
                }
                match script(&request) {
                    Some(reply) => {
                        ws.send(Message::Text(reply.to_string())).await.unwrap();
                    }
                    None => {
                        let _ = ws.close(None).await;
                        break;
                    }
                }
            }
            seen
        });

        (url, server)
    }

    fn ok(request: &JsonRpcRequest, result: Value) -> Option<Value> {
        Some(json!({"jsonrpc": "2.0", "result": result, "id": request.id}))
    }

    fn credential() -> Credential {
        Credential::new("secret-key", "westus2")
    }

    #[derive(Default)]
    struct RecordingTransport {
        answer: Mutex<Option<String>>,
    }

    #[async_trait]
    impl MediaTransport for RecordingTransport {
        fn id(&self) -> Uuid {
            Uuid::nil()
        }

        fn state(&self) -> TransportState {
            TransportState::Negotiating
        }

        async fn create_offer(&self) -> Result<String> {
            Ok("v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 98 96\r\n".to_string())
        }

        async fn apply_answer(&self, sdp: String) -> Result<()> {
            *self.answer.lock() = Some(sdp);
            Ok(())
        }

        async fn wait_established(&self) -> Result<()> {
            Ok(())
        }

        async fn video_stream(&self) -> Option<Arc<VideoStream>> {
            None
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn request() -> StartSessionRequest {
        StartSessionRequest::from_config(&Default::default()).unwrap()
    }

    #[tokio::test]
    async fn test_authenticate_and_speak() {
        let (url, server) = serve(|req| match req.method.as_str() {
            METHOD_AUTHENTICATE => ok(req, json!({})),
            METHOD_SPEAK => ok(req, json!({"reason": "SynthesizingAudioCompleted"})),
            _ => None,
        })
        .await;

        let endpoint = WebSocketEndpoint::new(&url);
        endpoint.authenticate(&credential()).await.unwrap();
        let utterance = Utterance::new("en-US-JennyNeural", "Hi & bye").unwrap();
        let outcome = endpoint.speak(&utterance).await.unwrap();
        assert!(outcome.is_success());
        endpoint.close().await.unwrap();

        let seen = server.await.unwrap();
        assert_eq!(seen[0].method, METHOD_AUTHENTICATE);
        assert_eq!(seen[0].params["key"], "secret-key");
        assert_eq!(seen[0].params["region"], "westus2");
        assert!(seen[1].params["ssml"].as_str().unwrap().contains("Hi &amp; bye"));
        assert_eq!(seen.last().unwrap().method, METHOD_CLOSE);
    }

    #[tokio::test]
    async fn test_canceled_speak_carries_detail() {
        let (url, _server) = serve(|req| match req.method.as_str() {
            METHOD_AUTHENTICATE => ok(req, json!({})),
            _ => ok(
                req,
                json!({"reason": "Canceled", "error_details": "Voice unavailable"}),
            ),
        })
        .await;

        let endpoint = WebSocketEndpoint::new(&url);
        endpoint.authenticate(&credential()).await.unwrap();
        let utterance = Utterance::new("en-US-JennyNeural", "hello").unwrap();
        let outcome = endpoint.speak(&utterance).await.unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.failure_message(), "Voice unavailable");
    }

    #[tokio::test]
    async fn test_start_applies_answer() {
        let (url, server) = serve(|req| match req.method.as_str() {
            METHOD_AUTHENTICATE => ok(req, json!({})),
            METHOD_START => ok(
                req,
                json!({
                    "session_id": "remote-1",
                    "reason": "SynthesizingAudioCompleted",
                    "sdp": "v=0\r\nanswer\r\n"
                }),
            ),
            _ => None,
        })
        .await;

        let endpoint = WebSocketEndpoint::new(&url);
        let transport = Arc::new(RecordingTransport::default());
        endpoint.authenticate(&credential()).await.unwrap();
        let ack = endpoint
            .start_session(transport.clone(), &request())
            .await
            .unwrap();

        assert!(ack.is_success());
        assert_eq!(ack.session_id, "remote-1");
        assert_eq!(transport.answer.lock().as_deref(), Some("v=0\r\nanswer\r\n"));

        endpoint.close().await.unwrap();
        let seen = server.await.unwrap();
        assert_eq!(seen[1].params["character"], "lisa");
        assert_eq!(seen[1].params["video_codec"], "VP9");
        assert!(seen[1].params["sdp"].as_str().unwrap().starts_with("v=0"));
    }

    #[tokio::test]
    async fn test_start_refused() {
        let (url, _server) = serve(|req| match req.method.as_str() {
            METHOD_AUTHENTICATE => ok(req, json!({})),
            _ => ok(req, json!({"reason": "Canceled"})),
        })
        .await;

        let endpoint = WebSocketEndpoint::new(&url);
        let transport = Arc::new(RecordingTransport::default());
        endpoint.authenticate(&credential()).await.unwrap();
        let ack = endpoint
            .start_session(transport.clone(), &request())
            .await
            .unwrap();

        assert!(!ack.is_success());
        assert_eq!(ack.failure_message(), "Connection failed");
        assert!(transport.answer.lock().is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_rejects() {
        let (url, _server) = serve(|req| {
            Some(json!({
                "jsonrpc": "2.0",
                "error": {"code": error_codes::UNAUTHORIZED, "message": "Invalid subscription key"},
                "id": req.id
            }))
        })
        .await;

        let endpoint = WebSocketEndpoint::new(&url);
        let err = endpoint.authenticate(&credential()).await.unwrap_err();
        assert!(matches!(err, Error::SessionRejected(ref m) if m == "Invalid subscription key"));
    }

    #[tokio::test]
    async fn test_hangup_fails_pending_request() {
        let (url, _server) = serve(|req| match req.method.as_str() {
            METHOD_AUTHENTICATE => ok(req, json!({})),
            _ => None,
        })
        .await;

        let endpoint = WebSocketEndpoint::new(&url);
        endpoint.authenticate(&credential()).await.unwrap();
        let utterance = Utterance::new("en-US-JennyNeural", "hello").unwrap();
        let err = endpoint.speak(&utterance).await.unwrap_err();
        assert!(matches!(err, Error::SessionClosed(_)));
    }

    #[tokio::test]
    async fn test_calls_after_close_fail() {
        let endpoint = WebSocketEndpoint::new("ws://127.0.0.1:9");
        endpoint.close().await.unwrap();
        endpoint.close().await.unwrap();
        assert!(matches!(
            endpoint.authenticate(&credential()).await,
            Err(Error::SessionClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let endpoint = WebSocketEndpoint::new(&url);
        assert!(matches!(
            endpoint.authenticate(&credential()).await,
            Err(Error::WebSocketError(_))
        ));
    }
}
