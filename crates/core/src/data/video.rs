//! Decoded video frame (RGBA8)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl FrameSize {
    /// Create a new size
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of bytes an RGBA8 buffer of this size occupies
    pub fn byte_len(&self) -> usize {
        self.pixel_count() * VideoFrame::BYTES_PER_PIXEL
    }

    /// True if either dimension is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Decoded video frame
///
/// Pixels are tightly packed RGBA8, row-major, no stride padding. Decoders
/// that produce other layouts convert before pushing into a stream.
#[derive(Clone, PartialEq, Eq)]
pub struct VideoFrame {
    size: FrameSize,
    data: Vec<u8>,
    timestamp_us: u64,
}

impl VideoFrame {
    /// Bytes per RGBA8 pixel
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Wrap an RGBA8 buffer, checking it matches the declared dimensions
    pub fn new(width: u32, height: u32, data: Vec<u8>, timestamp_us: u64) -> Result<Self> {
        let size = FrameSize::new(width, height);
        if data.len() != size.byte_len() {
            return Err(Error::InvalidFrame(format!(
                "{} frame needs {} bytes, got {}",
                size,
                size.byte_len(),
                data.len()
            )));
        }

        Ok(Self {
            size,
            data,
            timestamp_us,
        })
    }

    /// Fully transparent black frame
    pub fn blank(size: FrameSize) -> Self {
        Self {
            size,
            data: vec![0; size.byte_len()],
            timestamp_us: 0,
        }
    }

    /// Frame where every pixel has the same color
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let size = FrameSize::new(width, height);
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(size.byte_len())
            .collect();

        Self {
            size,
            data,
            timestamp_us: 0,
        }
    }

    /// Frame dimensions
    pub fn size(&self) -> FrameSize {
        self.size
    }

    /// Frame width in pixels
    pub fn width(&self) -> u32 {
        self.size.width
    }

    /// Frame height in pixels
    pub fn height(&self) -> u32 {
        self.size.height
    }

    /// Presentation timestamp in microseconds
    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    /// Set the presentation timestamp
    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    /// Raw RGBA8 bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw RGBA8 bytes
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Read one pixel, `None` when out of bounds
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let offset = self.offset(x, y)?;
        let px = &self.data[offset..offset + Self::BYTES_PER_PIXEL];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Write one pixel; out-of-bounds writes are ignored
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if let Some(offset) = self.offset(x, y) {
            self.data[offset..offset + Self::BYTES_PER_PIXEL].copy_from_slice(&rgba);
        }
    }

    /// Reallocate to `size` if it differs, returning whether it changed.
    /// Pixel contents are cleared on a change.
    pub fn resize(&mut self, size: FrameSize) -> bool {
        if self.size == size {
            return false;
        }
        self.size = size;
        self.data.clear();
        self.data.resize(size.byte_len(), 0);
        true
    }

    /// Copy `other` into this frame, resizing first when dimensions differ
    pub fn copy_from(&mut self, other: &VideoFrame) {
        self.resize(other.size);
        self.data.copy_from_slice(&other.data);
        self.timestamp_us = other.timestamp_us;
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        Some((y as usize * self.size.width as usize + x as usize) * Self::BYTES_PER_PIXEL)
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("size", &self.size)
            .field("bytes", &self.data.len())
            .field("timestamp_us", &self.timestamp_us)
            .finish()
    }
}
