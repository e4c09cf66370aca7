//! Session configuration
//!
//! The credential is supplied externally (environment, CLI flag or a TOML
//! file) and never written back out: it is skipped on serialization and
//! redacted in `Debug` output.

use crate::catalog;
use crate::compositor::{ChromaKey, DEFAULT_REFRESH_HZ, DEFAULT_THRESHOLD_FRACTION, KEY_GREEN};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Environment variable holding the speech service key
pub const ENV_SPEECH_KEY: &str = "AVATAR_SPEECH_KEY";

/// Environment variable holding the speech service region
pub const ENV_SPEECH_REGION: &str = "AVATAR_SPEECH_REGION";

/// Default service region
pub const DEFAULT_REGION: &str = "eastus2";

/// Default first utterance
pub const DEFAULT_UTTERANCE: &str = "Greetings. I am an Azure AI Avatar. How can I help you?";

/// Secret key plus service region
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Subscription key (never serialized)
    #[serde(default, skip_serializing)]
    pub key: String,
    /// Service region, e.g. `eastus2`
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl Credential {
    /// Build a credential
    pub fn new(key: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            region: region.into(),
        }
    }

    /// True when a non-blank key is present
    pub fn is_present(&self) -> bool {
        !self.key.trim().is_empty()
    }

    /// Key with surrounding whitespace removed
    pub fn trimmed_key(&self) -> &str {
        self.key.trim()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("key", &if self.is_present() { "<redacted>" } else { "<empty>" })
            .field("region", &self.region)
            .finish()
    }
}

/// Chroma-key settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromaConfig {
    /// Key color as RGB
    pub key_color: [u8; 3],
    /// Threshold as a fraction of the maximum RGB distance
    pub threshold_fraction: f32,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            key_color: KEY_GREEN,
            threshold_fraction: DEFAULT_THRESHOLD_FRACTION,
        }
    }
}

/// Everything a session needs besides the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    /// Service credential
    pub credential: Credential,

    /// Avatar character (see [`catalog::CHARACTERS`])
    pub character: String,

    /// Character style; must belong to `character`
    pub style: String,

    /// Voice id (see [`catalog::VOICES`])
    pub voice: String,

    /// Text spoken by the next `speak`
    pub utterance: String,

    /// Background the render service paints behind the avatar, `#RRGGBB[AA]`
    pub background_color: String,

    /// Preferred video codec name for negotiation (default: VP9)
    pub video_codec: String,

    /// Compositor key settings
    pub chroma: ChromaConfig,

    /// Display refresh rate driving the compositor, in Hz
    pub refresh_hz: u32,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            credential: Credential::new("", DEFAULT_REGION),
            character: "lisa".to_string(),
            style: "casual-sitting".to_string(),
            voice: "en-US-JennyNeural".to_string(),
            utterance: DEFAULT_UTTERANCE.to_string(),
            background_color: "#00FF00FF".to_string(),
            video_codec: "VP9".to_string(),
            chroma: ChromaConfig::default(),
            refresh_hz: DEFAULT_REFRESH_HZ,
        }
    }
}

impl AvatarConfig {
    /// Defaults overlaid with the credential from the environment
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay `AVATAR_SPEECH_KEY` / `AVATAR_SPEECH_REGION` when set
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(ENV_SPEECH_KEY) {
            self.credential.key = key;
        }
        if let Ok(region) = std::env::var(ENV_SPEECH_REGION) {
            if !region.trim().is_empty() {
                self.credential.region = region;
            }
        }
    }

    /// Parse a TOML document; missing fields take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Validate selectors and numeric ranges.
    ///
    /// The credential is not checked here; a missing key is a `connect`
    /// failure, not a configuration error.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - character, style or voice is not in the catalog
    /// - the background color is not `#RRGGBB` or `#RRGGBBAA`
    /// - the threshold fraction is outside `0.0..=1.0`
    /// - the refresh rate is zero
    pub fn validate(&self) -> Result<()> {
        catalog::validate_selection(&self.character, &self.style)?;
        catalog::voice(&self.voice)?;

        if !is_hex_color(&self.background_color) {
            return Err(Error::ConfigError(format!(
                "background_color must be #RRGGBB or #RRGGBBAA, got {}",
                self.background_color
            )));
        }

        if self.video_codec.trim().is_empty() {
            return Err(Error::ConfigError("video_codec must not be empty".to_string()));
        }

        if !(0.0..=1.0).contains(&self.chroma.threshold_fraction) {
            return Err(Error::ConfigError(format!(
                "chroma.threshold_fraction must be within 0.0..=1.0, got {}",
                self.chroma.threshold_fraction
            )));
        }

        if self.refresh_hz == 0 {
            return Err(Error::ConfigError("refresh_hz must be greater than 0".to_string()));
        }

        Ok(())
    }

    /// Switch character, resetting the style to the character's default
    pub fn select_character(&mut self, name: &str) -> Result<()> {
        let style = catalog::default_style(name)?;
        self.character = name.to_string();
        self.style = style.to_string();
        Ok(())
    }

    /// Switch style within the current character
    pub fn select_style(&mut self, style: &str) -> Result<()> {
        catalog::validate_selection(&self.character, style)?;
        self.style = style.to_string();
        Ok(())
    }

    /// Switch voice
    pub fn select_voice(&mut self, voice: &str) -> Result<()> {
        catalog::voice(voice)?;
        self.voice = voice.to_string();
        Ok(())
    }

    /// Chroma key for the compositor
    pub fn chroma_key(&self) -> ChromaKey {
        ChromaKey::new(self.chroma.key_color, self.chroma.threshold_fraction)
    }
}

fn is_hex_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(hex) => (hex.len() == 6 || hex.len() == 8) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
