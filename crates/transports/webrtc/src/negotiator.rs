//! Transport Negotiator
//!
//! Wraps a webrtc-rs peer connection configured to receive one video and
//! one audio track from the render service. The local offer is patched to
//! prefer the configured video codec before it is applied and sent; the
//! inbound video track is published as a [`VideoStream`] as soon as it
//! arrives.

use crate::config::TransportConfig;
use crate::media::{drain_track, read_video_track, DecoderFactory};
use crate::sdp::prefer_video_codec;
use crate::transport::{MediaTransport, TransportFactory, TransportState};
use crate::{Error, Result};
use async_trait::async_trait;
use liveavatar_core::VideoStream;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

/// Peer transport to the render service
pub struct TransportNegotiator {
    id: Uuid,
    config: TransportConfig,
    peer_connection: Arc<RTCPeerConnection>,
    connection: Arc<watch::Sender<RTCPeerConnectionState>>,
    video: Arc<watch::Sender<Option<Arc<VideoStream>>>>,
    readers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    closed: Arc<AtomicBool>,
}

impl TransportNegotiator {
    /// Create the peer connection with receive-only video and audio
    /// transceivers
    ///
    /// # Arguments
    ///
    /// * `config` - STUN/TURN servers, codec preference and timeouts
    /// * `decoders` - Decoder source for the inbound video track
    #[instrument(skip_all)]
    pub async fn new(config: TransportConfig, decoders: Arc<dyn DecoderFactory>) -> Result<Self> {
        config.validate()?;
        let id = Uuid::new_v4();

        info!("Creating transport {}", id);

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::WebRtcError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(config.turn_servers.iter().map(|turn| RTCIceServer {
                urls: vec![turn.url.clone()],
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            }))
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection =
            Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
                Error::PeerConnectionError(format!("Failed to create peer connection: {}", e))
            })?);

        for kind in [RTPCodecType::Video, RTPCodecType::Audio] {
            peer_connection
                .add_transceiver_from_kind(
                    kind,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await
                .map_err(|e| {
                    Error::MediaTrackError(format!("Failed to add {} transceiver: {}", kind, e))
                })?;
        }

        let (connection, _) = watch::channel(RTCPeerConnectionState::New);
        let connection = Arc::new(connection);
        let (video, _) = watch::channel(None);
        let video = Arc::new(video);
        let readers = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let connection_clone = Arc::clone(&connection);
        let closed_clone = Arc::clone(&closed);
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let connection = Arc::clone(&connection_clone);
                let closed = Arc::clone(&closed_clone);
                Box::pin(async move {
                    if closed.load(Ordering::SeqCst) {
                        return;
                    }
                    let previous = connection.send_replace(s);
                    if previous != s {
                        debug!("Transport {} state transition: {} -> {}", id, previous, s);
                    }
                })
            },
        ));

        let video_clone = Arc::clone(&video);
        let readers_clone = Arc::clone(&readers);
        let closed_clone = Arc::clone(&closed);
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let video = Arc::clone(&video_clone);
            let readers = Arc::clone(&readers_clone);
            let closed = Arc::clone(&closed_clone);
            let decoders = Arc::clone(&decoders);

            Box::pin(async move {
                if closed.load(Ordering::SeqCst) {
                    return;
                }

                let kind = track.kind();
                let mime_type = track.codec().capability.mime_type;
                info!(
                    "Transport {}: received track - kind={}, codec={}",
                    id, kind, mime_type
                );

                let handle = match kind {
                    RTPCodecType::Video => {
                        let stream = Arc::new(VideoStream::new(format!("{}/{}", id, mime_type)));
                        video.send_replace(Some(Arc::clone(&stream)));
                        tokio::spawn(async move {
                            read_video_track(track, stream, decoders).await;
                        })
                    }
                    _ => tokio::spawn(async move {
                        drain_track(track).await;
                    }),
                };
                readers.lock().push(handle);
            })
        }));

        Ok(Self {
            id,
            config,
            peer_connection,
            connection,
            video,
            readers,
            closed,
        })
    }

    /// Current transport state
    pub fn state(&self) -> TransportState {
        if self.closed.load(Ordering::SeqCst) {
            return TransportState::Closed;
        }
        match *self.connection.borrow() {
            RTCPeerConnectionState::Connected => TransportState::Established,
            RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed => {
                TransportState::Closed
            }
            _ => TransportState::Negotiating,
        }
    }

    /// Create the local offer, patch it to prefer the configured video
    /// codec, apply it and wait for ICE gathering.
    ///
    /// Gathering is bounded by `ice_gather_timeout`; the offer then carries
    /// the candidates found so far. A codec that is not offered at all is a
    /// silent degradation: the offer keeps its original order.
    #[instrument(skip(self), fields(transport_id = %self.id))]
    pub async fn create_offer(&self) -> Result<String> {
        let preference = self.config.codec_preference();

        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;

        let patched = prefer_video_codec(&offer.sdp, &preference)?;
        if patched == offer.sdp {
            debug!("Offer already prefers {} or does not offer it", preference);
        } else {
            debug!("Moved {} to the front of the video formats", preference);
        }

        let offer = RTCSessionDescription::offer(patched)
            .map_err(|e| Error::SdpError(format!("Failed to parse patched offer: {}", e)))?;

        let mut gathering = self.peer_connection.gathering_complete_promise().await;

        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;

        let timeout = self.config.ice_gather_timeout();
        if tokio::time::timeout(timeout, gathering.recv()).await.is_err() {
            warn!(
                "ICE gathering incomplete after {:?}, sending offer with candidates so far",
                timeout
            );
        }

        let local_desc = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| {
                Error::SdpError("No local description after setting offer".to_string())
            })?;

        // The stack re-serializes the description with its candidates.
        let sdp = prefer_video_codec(&local_desc.sdp, &preference)?;
        let offered = crate::sdp::SessionDescription::parse(&sdp)?
            .video_sections()
            .any(|section| !section.matching_formats(&preference).is_empty());
        if !offered {
            warn!("{} not offered, negotiating with the default order", preference);
        }

        Ok(sdp)
    }

    /// Apply the remote SDP answer
    pub async fn apply_answer(&self, sdp: String) -> Result<()> {
        debug!("Setting remote description for transport {}", self.id);

        let answer = RTCSessionDescription::answer(sdp)
            .map_err(|e| Error::SdpError(format!("Failed to parse answer: {}", e)))?;

        self.peer_connection
            .set_remote_description(answer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))?;

        Ok(())
    }

    /// Wait for the peer connection to connect, bounded by
    /// `connect_timeout`
    pub async fn wait_established(&self) -> Result<()> {
        let mut rx = self.connection.subscribe();
        let timeout = self.config.connect_timeout();

        let state = match tokio::time::timeout(
            timeout,
            rx.wait_for(|s| {
                matches!(
                    s,
                    RTCPeerConnectionState::Connected
                        | RTCPeerConnectionState::Failed
                        | RTCPeerConnectionState::Closed
                )
            }),
        )
        .await
        {
            Ok(Ok(state)) => *state,
            Ok(Err(_)) => RTCPeerConnectionState::Closed,
            Err(_) => {
                return Err(Error::OperationTimeout(format!(
                    "Transport not established after {:?}",
                    timeout
                )))
            }
        };

        match state {
            RTCPeerConnectionState::Connected if !self.closed.load(Ordering::SeqCst) => {
                info!("Transport {} established", self.id);
                Ok(())
            }
            RTCPeerConnectionState::Failed => Err(Error::NatTraversalFailed(
                "ICE connection failed".to_string(),
            )),
            _ => Err(Error::SessionClosed(
                "transport closed before media flowed".to_string(),
            )),
        }
    }

    /// Latest inbound video stream, if a video track has arrived
    pub fn current_video_stream(&self) -> Option<Arc<VideoStream>> {
        self.video.borrow().clone()
    }

    /// Wait for the inbound video stream; `None` if the transport closes
    /// or fails first
    pub async fn next_video_stream(&self) -> Option<Arc<VideoStream>> {
        let mut video = self.video.subscribe();
        let mut connection = self.connection.subscribe();

        tokio::select! {
            stream = video.wait_for(Option::is_some) => {
                stream.ok().and_then(|s| (*s).clone())
            }
            _ = connection.wait_for(|s| {
                matches!(s, RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed)
            }) => None,
        }
    }

    /// Close the peer connection. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Closing transport {}", self.id);

        self.connection.send_replace(RTCPeerConnectionState::Closed);

        let result = self.peer_connection.close().await.map_err(|e| {
            Error::PeerConnectionError(format!("Failed to close connection: {}", e))
        });

        if let Some(stream) = self.current_video_stream() {
            stream.end();
        }
        let readers = std::mem::take(&mut *self.readers.lock());
        debug!("Transport {} closed, stopping {} track readers", self.id, readers.len());
        for reader in readers {
            reader.abort();
        }

        result
    }
}

#[async_trait]
impl MediaTransport for TransportNegotiator {
    fn id(&self) -> Uuid {
        self.id
    }

    fn state(&self) -> TransportState {
        TransportNegotiator::state(self)
    }

    async fn create_offer(&self) -> Result<String> {
        TransportNegotiator::create_offer(self).await
    }

    async fn apply_answer(&self, sdp: String) -> Result<()> {
        TransportNegotiator::apply_answer(self, sdp).await
    }

    async fn wait_established(&self) -> Result<()> {
        TransportNegotiator::wait_established(self).await
    }

    async fn video_stream(&self) -> Option<Arc<VideoStream>> {
        self.next_video_stream().await
    }

    async fn close(&self) -> Result<()> {
        TransportNegotiator::close(self).await
    }
}

/// Builds a [`TransportNegotiator`] per connect attempt
pub struct WebRtcTransportFactory {
    config: TransportConfig,
    decoders: Arc<dyn DecoderFactory>,
}

impl WebRtcTransportFactory {
    /// Factory with the given configuration and decoder source
    pub fn new(config: TransportConfig, decoders: Arc<dyn DecoderFactory>) -> Self {
        Self { config, decoders }
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn open(&self) -> Result<Arc<dyn MediaTransport>> {
        let transport =
            TransportNegotiator::new(self.config.clone(), Arc::clone(&self.decoders)).await?;
        Ok(Arc::new(transport))
    }
}
