//! Utterance markup
//!
//! Builds the structured speak request sent to the synthesis endpoint:
//!
//! ```text
//! <speak version="1.0" xmlns="http://www.w3.org/2001/10/synthesis" xml:lang="{locale}">
//!   <voice name="{voice}">{text}</voice>
//! </speak>
//! ```
//!
//! User text is escaped, never trusted: the five XML-significant
//! characters become entities and control characters other than tab,
//! newline and carriage return are dropped. Empty text is rejected.

use crate::catalog;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Markup schema version
pub const MARKUP_VERSION: &str = "1.0";

/// Markup namespace
pub const MARKUP_NAMESPACE: &str = "http://www.w3.org/2001/10/synthesis";

/// One request to synthesize and play speech
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    /// Voice selector
    pub voice: String,
    /// Locale written to `xml:lang`
    pub locale: String,
    /// Literal text, unescaped
    pub text: String,
}

impl Utterance {
    /// Build an utterance for a catalog voice
    pub fn new(voice_id: &str, text: &str) -> Result<Self> {
        let voice = catalog::voice(voice_id)?;
        if escape(text).trim().is_empty() {
            return Err(Error::InvalidUtterance("Nothing to speak".to_string()));
        }

        Ok(Self {
            voice: voice.id.to_string(),
            locale: voice.locale.to_string(),
            text: text.to_string(),
        })
    }

    /// Render the markup document
    pub fn to_markup(&self) -> String {
        format!(
            "<speak version=\"{}\" xmlns=\"{}\" xml:lang=\"{}\"><voice name=\"{}\">{}</voice></speak>",
            MARKUP_VERSION,
            MARKUP_NAMESPACE,
            escape(&self.locale),
            escape(&self.voice),
            escape(&self.text)
        )
    }
}

/// Escape text for use in markup content or attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(ch),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}
