//! Remote track reader
//!
//! Video: RTP packets are reassembled into codec samples with webrtc-rs'
//! `SampleBuilder` (VP9 or VP8 depacketizer, chosen from the negotiated
//! MIME type) and passed to a [`VideoDecoder`]. Decoded frames are pushed
//! into the track's [`VideoStream`]. Without a decoder, samples are
//! counted and dropped; the stream still exists so callers can observe
//! the track.
//!
//! Audio is drained and discarded.
//!
//! A read error ends the track and marks the stream ended.

use crate::Result;
use bytes::Bytes;
use liveavatar_core::{VideoFrame, VideoStream};
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::media::io::sample_builder::SampleBuilder;
use webrtc::rtp::codecs::vp8::Vp8Packet;
use webrtc::rtp::codecs::vp9::Vp9Packet;
use webrtc::rtp::packetizer::Depacketizer;
use webrtc::track::track_remote::TrackRemote;

/// RTP clock rate of every video codec
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

/// Packets a sample may wait for before it is given up on
const MAX_LATE_PACKETS: u16 = 128;

/// Video codecs the reader can depacketize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    /// VP8
    Vp8,
    /// VP9
    Vp9,
}

impl VideoCodec {
    /// Codec for a negotiated MIME type such as `video/VP9`
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        if mime_type.eq_ignore_ascii_case("video/vp9") {
            Some(VideoCodec::Vp9)
        } else if mime_type.eq_ignore_ascii_case("video/vp8") {
            Some(VideoCodec::Vp8)
        } else {
            None
        }
    }
}

/// One reassembled codec sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSample {
    /// Encoded frame bytes
    pub data: Bytes,
    /// RTP timestamp (90 kHz)
    pub rtp_timestamp: u32,
    /// Packets lost right before this sample
    pub dropped_before: u16,
}

impl EncodedSample {
    /// RTP timestamp in microseconds
    pub fn timestamp_us(&self) -> u64 {
        self.rtp_timestamp as u64 * 1_000_000 / VIDEO_CLOCK_RATE as u64
    }
}

/// Turns encoded samples into RGBA frames
pub trait VideoDecoder: Send {
    /// Decode one sample. `Ok(None)` means the decoder needs more input.
    fn decode(&mut self, sample: &EncodedSample) -> Result<Option<VideoFrame>>;
}

/// Creates a decoder per inbound track
pub trait DecoderFactory: Send + Sync {
    /// Decoder for `codec`, or `None` if the codec is unsupported
    fn create(&self, codec: VideoCodec) -> Option<Box<dyn VideoDecoder>>;
}

/// Factory that never decodes
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDecoder;

impl DecoderFactory for NoDecoder {
    fn create(&self, _codec: VideoCodec) -> Option<Box<dyn VideoDecoder>> {
        None
    }
}

/// Per-track counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackStats {
    /// RTP packets read
    pub packets: u64,
    /// Samples reassembled
    pub samples: u64,
    /// Frames pushed into the stream
    pub frames: u64,
    /// Samples dropped for lack of a decoder
    pub undecoded: u64,
    /// Samples the decoder rejected
    pub decode_errors: u64,
}

/// Sample-to-frame stage of a video track
pub struct FramePump {
    stream: Arc<VideoStream>,
    decoder: Option<Box<dyn VideoDecoder>>,
    stats: TrackStats,
}

impl FramePump {
    /// Pump into `stream`, decoding with `decoder` if present
    pub fn new(stream: Arc<VideoStream>, decoder: Option<Box<dyn VideoDecoder>>) -> Self {
        Self {
            stream,
            decoder,
            stats: TrackStats::default(),
        }
    }

    /// Decode one sample and push the resulting frame
    pub fn handle_sample(&mut self, sample: &EncodedSample) {
        self.stats.samples += 1;
        if sample.dropped_before > 0 {
            debug!(
                "Stream {}: {} packets lost before sample",
                self.stream.label(),
                sample.dropped_before
            );
        }

        let Some(decoder) = self.decoder.as_mut() else {
            self.stats.undecoded += 1;
            return;
        };

        match decoder.decode(sample) {
            Ok(Some(frame)) => {
                self.stream
                    .push_frame(frame.with_timestamp(sample.timestamp_us()));
                self.stats.frames += 1;
            }
            Ok(None) => {}
            Err(e) => {
                self.stats.decode_errors += 1;
                warn!("Stream {}: failed to decode sample: {}", self.stream.label(), e);
            }
        }
    }

    /// Counters so far
    pub fn stats(&self) -> TrackStats {
        self.stats
    }
}

/// Read a remote video track until it fails or closes, then end `stream`
pub async fn read_video_track(
    track: Arc<TrackRemote>,
    stream: Arc<VideoStream>,
    decoders: Arc<dyn DecoderFactory>,
) -> TrackStats {
    let mime_type = track.codec().capability.mime_type;
    let codec = VideoCodec::from_mime(&mime_type);
    let decoder = codec.and_then(|c| decoders.create(c));

    info!(
        "Reading video track {} ({}, decoder: {})",
        stream.label(),
        mime_type,
        if decoder.is_some() { "yes" } else { "none" }
    );

    let pump = FramePump::new(Arc::clone(&stream), decoder);
    let stats = match codec {
        Some(VideoCodec::Vp9) => {
            let builder = SampleBuilder::new(MAX_LATE_PACKETS, Vp9Packet::default(), VIDEO_CLOCK_RATE);
            pump_track(&track, builder, pump).await
        }
        Some(VideoCodec::Vp8) => {
            let builder = SampleBuilder::new(MAX_LATE_PACKETS, Vp8Packet::default(), VIDEO_CLOCK_RATE);
            pump_track(&track, builder, pump).await
        }
        None => {
            warn!("No depacketizer for {}, discarding track", mime_type);
            TrackStats {
                packets: drain_track(track).await,
                ..Default::default()
            }
        }
    };

    stream.end();
    info!(
        "Video track {} ended: {} packets, {} samples, {} frames",
        stream.label(),
        stats.packets,
        stats.samples,
        stats.frames
    );
    stats
}

async fn pump_track<T: Depacketizer>(
    track: &TrackRemote,
    mut builder: SampleBuilder<T>,
    mut pump: FramePump,
) -> TrackStats {
    let mut packets = 0u64;
    loop {
        match track.read_rtp().await {
            Ok((packet, _attributes)) => {
                packets += 1;
                builder.push(packet);
                while let Some(sample) = builder.pop() {
                    pump.handle_sample(&EncodedSample {
                        data: sample.data,
                        rtp_timestamp: sample.packet_timestamp,
                        dropped_before: sample.prev_dropped_packets,
                    });
                }
            }
            Err(e) => {
                debug!("Video track read ended: {}", e);
                break;
            }
        }
    }

    TrackStats {
        packets,
        ..pump.stats()
    }
}

/// Read and discard a track (audio). Returns the number of packets read.
pub async fn drain_track(track: Arc<TrackRemote>) -> u64 {
    let mut packets = 0u64;
    while track.read_rtp().await.is_ok() {
        packets += 1;
    }
    debug!("Drained {} packets from {} track", packets, track.kind());
    packets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    struct SolidDecoder {
        fail_on_empty: bool,
    }

    impl VideoDecoder for SolidDecoder {
        fn decode(&mut self, sample: &EncodedSample) -> Result<Option<VideoFrame>> {
            if sample.data.is_empty() {
                if self.fail_on_empty {
                    return Err(Error::DecodingError("empty sample".to_string()));
                }
                return Ok(None);
            }
            let side = sample.data.len() as u32;
            Ok(Some(VideoFrame::filled(side, side, [0, 255, 0, 255])))
        }
    }

    fn sample(bytes: &'static [u8], rtp_timestamp: u32) -> EncodedSample {
        EncodedSample {
            data: Bytes::from_static(bytes),
            rtp_timestamp,
            dropped_before: 0,
        }
    }

    #[test]
    fn test_codec_from_mime() {
        assert_eq!(VideoCodec::from_mime("video/VP9"), Some(VideoCodec::Vp9));
        assert_eq!(VideoCodec::from_mime("video/vp8"), Some(VideoCodec::Vp8));
        assert_eq!(VideoCodec::from_mime("video/H264"), None);
    }

    #[test]
    fn test_sample_timestamp() {
        assert_eq!(sample(b"x", 90_000).timestamp_us(), 1_000_000);
        assert_eq!(sample(b"x", 45).timestamp_us(), 500);
    }

    #[test]
    fn test_decoded_frames_reach_stream() {
        let stream = Arc::new(VideoStream::new("video0"));
        let decoder = Box::new(SolidDecoder {
            fail_on_empty: false,
        });
        let mut pump = FramePump::new(Arc::clone(&stream), Some(decoder));

        pump.handle_sample(&sample(b"ab", 9_000));
        pump.handle_sample(&sample(b"", 12_000));
        pump.handle_sample(&sample(b"abcd", 18_000));

        let stats = pump.stats();
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.frames, 2);
        assert_eq!(stream.frames_received(), 2);

        let latest = stream.latest_frame().unwrap();
        assert_eq!(latest.width(), 4);
        assert_eq!(latest.timestamp_us(), 200_000);
    }

    #[test]
    fn test_without_decoder_samples_are_dropped() {
        let stream = Arc::new(VideoStream::new("video0"));
        let mut pump = FramePump::new(Arc::clone(&stream), NoDecoder.create(VideoCodec::Vp9));

        pump.handle_sample(&sample(b"abc", 0));
        assert_eq!(pump.stats().undecoded, 1);
        assert!(!stream.has_frame());
    }

    #[test]
    fn test_decode_errors_do_not_stop_pump() {
        let stream = Arc::new(VideoStream::new("video0"));
        let decoder = Box::new(SolidDecoder {
            fail_on_empty: true,
        });
        let mut pump = FramePump::new(Arc::clone(&stream), Some(decoder));

        pump.handle_sample(&sample(b"", 0));
        pump.handle_sample(&sample(b"a", 0));

        assert_eq!(pump.stats().decode_errors, 1);
        assert_eq!(pump.stats().frames, 1);
        assert!(stream.has_frame());
    }
}
