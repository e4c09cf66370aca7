//! Inbound media handling
//!
//! Reads RTP from remote tracks, reassembles codec samples and hands them
//! to a pluggable decoder that feeds a [`VideoStream`](liveavatar_core::VideoStream).

pub mod inbound;

pub use inbound::{
    drain_track, read_video_track, DecoderFactory, EncodedSample, FramePump, NoDecoder,
    TrackStats, VideoCodec, VideoDecoder,
};
