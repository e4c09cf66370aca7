//! Display refresh signals
//!
//! The compositor runs exactly one pass per displayed frame. A
//! [`RefreshSignal`] is what it waits on between passes; a
//! [`RefreshSource`] hands out a fresh signal for every compositor started.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};

/// Default display refresh rate in Hz
pub const DEFAULT_REFRESH_HZ: u32 = 60;

/// Per-frame wake-up for a compositor loop
#[async_trait]
pub trait RefreshSignal: Send {
    /// Wait for the next display refresh. Returns false once the display
    /// is gone, which ends the loop.
    async fn tick(&mut self) -> bool;
}

/// Factory for refresh signals
pub trait RefreshSource: Send + Sync {
    /// New signal bound to this display
    fn signal(&self) -> Box<dyn RefreshSignal>;
}

/// Refresh cadence of a headless display, paced by the tokio timer.
///
/// Late ticks are skipped rather than replayed, so a slow pass never
/// causes a burst of catch-up passes.
pub struct DisplayRefresh {
    interval: Interval,
}

impl DisplayRefresh {
    /// Signal ticking `hz` times per second. Must be called inside a tokio runtime.
    pub fn new(hz: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / hz.max(1) as f64);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl RefreshSignal for DisplayRefresh {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// [`RefreshSource`] producing [`DisplayRefresh`] signals at a fixed rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayRate {
    hz: u32,
}

impl DisplayRate {
    /// Display refreshing `hz` times per second
    pub fn new(hz: u32) -> Self {
        Self { hz: hz.max(1) }
    }

    /// Refresh rate in Hz
    pub fn hz(&self) -> u32 {
        self.hz
    }
}

impl Default for DisplayRate {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_HZ)
    }
}

impl RefreshSource for DisplayRate {
    fn signal(&self) -> Box<dyn RefreshSignal> {
        Box::new(DisplayRefresh::new(self.hz))
    }
}

/// Externally driven refresh, for embedders that own a real vsync and for tests.
///
/// Each [`tick`](ManualRefresh::tick) wakes every signal once; ticks issued
/// while a pass is still running coalesce into a single wake-up. Dropping
/// the source ends all loops bound to it.
pub struct ManualRefresh {
    tx: watch::Sender<u64>,
}

impl Default for ManualRefresh {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualRefresh {
    /// New source with no pending ticks
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    /// Signal one display refresh
    pub fn tick(&self) {
        self.tx.send_modify(|frame| *frame = frame.wrapping_add(1));
    }

    /// Number of ticks issued so far
    pub fn frame(&self) -> u64 {
        *self.tx.borrow()
    }
}

impl RefreshSource for ManualRefresh {
    fn signal(&self) -> Box<dyn RefreshSignal> {
        // Ticks issued before this call are already marked as seen.
        let rx = self.tx.subscribe();
        Box::new(ManualRefreshSignal { rx })
    }
}

struct ManualRefreshSignal {
    rx: watch::Receiver<u64>,
}

#[async_trait]
impl RefreshSignal for ManualRefreshSignal {
    async fn tick(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
