//! Chroma-key matting
//!
//! A pixel is background when its Euclidean RGB distance to the key color
//! is strictly below the threshold. Background pixels get alpha 0; every
//! other pixel is left exactly as decoded, alpha included.

use serde::{Deserialize, Serialize};

/// Pure green, the color the render service paints behind the avatar
pub const KEY_GREEN: [u8; 3] = [0, 255, 0];

/// Largest possible RGB distance: `255 * sqrt(3)`
pub const MAX_DISTANCE: f32 = 441.672_96;

/// Default threshold as a fraction of [`MAX_DISTANCE`]
pub const DEFAULT_THRESHOLD_FRACTION: f32 = 0.2;

/// Fixed key color and distance threshold for one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChromaKey {
    key: [u8; 3],
    threshold: f32,
}

impl Default for ChromaKey {
    fn default() -> Self {
        Self::new(KEY_GREEN, DEFAULT_THRESHOLD_FRACTION)
    }
}

impl ChromaKey {
    /// Build a key from a color and a threshold fraction in `0.0..=1.0`
    pub fn new(key: [u8; 3], threshold_fraction: f32) -> Self {
        Self {
            key,
            threshold: threshold_fraction.clamp(0.0, 1.0) * MAX_DISTANCE,
        }
    }

    /// Key color
    pub fn key(&self) -> [u8; 3] {
        self.key
    }

    /// Absolute distance threshold
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Euclidean RGB distance to the key color
    pub fn distance(&self, rgb: [u8; 3]) -> f32 {
        (self.distance_squared(rgb) as f32).sqrt()
    }

    /// True when the color counts as background
    #[inline]
    pub fn matches(&self, rgb: [u8; 3]) -> bool {
        (self.distance_squared(rgb) as f32) < self.threshold * self.threshold
    }

    /// Key an RGBA8 buffer in place, returning how many pixels went transparent.
    /// A trailing partial pixel is ignored.
    pub fn apply(&self, rgba: &mut [u8]) -> usize {
        let mut keyed = 0;
        for px in rgba.chunks_exact_mut(4) {
            if self.matches([px[0], px[1], px[2]]) {
                px[3] = 0;
                keyed += 1;
            }
        }
        keyed
    }

    #[inline]
    fn distance_squared(&self, rgb: [u8; 3]) -> u32 {
        rgb.iter()
            .zip(self.key.iter())
            .map(|(&c, &k)| {
                let d = c as i32 - k as i32;
                (d * d) as u32
            })
            .sum()
    }
}
