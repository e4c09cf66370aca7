//! Session phase

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of the avatar session
///
/// `Idle → Initializing → Live ⇄ Speaking`, with `Error` reachable from
/// `Initializing` and left only through an explicit reset or disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No session; ready to connect
    #[default]
    Idle,
    /// Transport and synthesis setup in progress
    Initializing,
    /// Media flowing, ready to speak
    Live,
    /// An utterance is playing
    Speaking,
    /// Setup failed; needs reset
    Error,
}

impl Phase {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Initializing => "initializing",
            Phase::Live => "live",
            Phase::Speaking => "speaking",
            Phase::Error => "error",
        }
    }

    /// `connect` is accepted
    pub fn can_connect(&self) -> bool {
        *self == Phase::Idle
    }

    /// `speak` is accepted
    pub fn can_speak(&self) -> bool {
        *self == Phase::Live
    }

    /// Settings may be edited
    pub fn accepts_settings(&self) -> bool {
        matches!(self, Phase::Idle | Phase::Error)
    }

    /// A transport may be open
    pub fn has_session(&self) -> bool {
        matches!(self, Phase::Initializing | Phase::Live | Phase::Speaking)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
