//! Static avatar and voice catalogs
//!
//! Plain lookup tables; selectors coming from configuration or the control
//! surface are validated here before they reach the remote endpoint.

use crate::{Error, Result};

/// An avatar character and the styles it can be rendered in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Character {
    /// Character selector sent to the render service
    pub name: &'static str,
    /// Valid styles; the first one is the default
    pub styles: &'static [&'static str],
}

impl Character {
    /// Style used when none is chosen explicitly
    pub fn default_style(&self) -> &'static str {
        self.styles[0]
    }

    /// True if `style` belongs to this character
    pub fn has_style(&self, style: &str) -> bool {
        self.styles.iter().any(|s| *s == style)
    }
}

/// A synthesis voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voice {
    /// Voice selector used in utterance markup
    pub id: &'static str,
    /// Display label
    pub label: &'static str,
    /// Locale used for the markup `xml:lang`
    pub locale: &'static str,
}

/// Available characters
pub const CHARACTERS: &[Character] = &[
    Character {
        name: "lisa",
        styles: &[
            "casual-sitting",
            "graceful-sitting",
            "graceful-standing",
            "technical-sitting",
            "technical-standing",
        ],
    },
    Character {
        name: "harry",
        styles: &["business", "casual", "youthful"],
    },
    Character {
        name: "jeff",
        styles: &["business"],
    },
    Character {
        name: "lori",
        styles: &["casual"],
    },
];

/// Available voices
pub const VOICES: &[Voice] = &[
    Voice { id: "en-US-JennyNeural", label: "Jenny (EN-US)", locale: "en-US" },
    Voice { id: "en-US-AriaNeural", label: "Aria (EN-US)", locale: "en-US" },
    Voice { id: "en-US-GuyNeural", label: "Guy (EN-US)", locale: "en-US" },
    Voice { id: "en-GB-SoniaNeural", label: "Sonia (EN-GB)", locale: "en-GB" },
    Voice { id: "en-AU-NatashaNeural", label: "Natasha (EN-AU)", locale: "en-AU" },
    Voice { id: "zh-CN-XiaoxiaoNeural", label: "Xiaoxiao (ZH)", locale: "zh-CN" },
    Voice { id: "ja-JP-KeitaNeural", label: "Keita (JA)", locale: "ja-JP" },
    Voice { id: "de-DE-AmalaNeural", label: "Amala (DE)", locale: "de-DE" },
    Voice { id: "fr-FR-DeniseNeural", label: "Denise (FR)", locale: "fr-FR" },
];

/// Look up a character by name
pub fn character(name: &str) -> Result<&'static Character> {
    CHARACTERS
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| Error::UnknownSelection {
            kind: "character",
            value: name.to_string(),
        })
}

/// Default style of a character
pub fn default_style(name: &str) -> Result<&'static str> {
    character(name).map(Character::default_style)
}

/// Check that `style` is valid for `character`
pub fn validate_selection(character_name: &str, style: &str) -> Result<()> {
    let character = character(character_name)?;
    if character.has_style(style) {
        Ok(())
    } else {
        Err(Error::UnknownSelection {
            kind: "style",
            value: format!("{style} (character {character_name})"),
        })
    }
}

/// Look up a voice by id
pub fn voice(id: &str) -> Result<&'static Voice> {
    VOICES
        .iter()
        .find(|v| v.id == id)
        .ok_or_else(|| Error::UnknownSelection {
            kind: "voice",
            value: id.to_string(),
        })
}
