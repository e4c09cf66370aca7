//! Offer patching: video codec preference
//!
//! Peers try the formats of a media section in the order they are listed on
//! its `m=` line. [`SessionDescription`] parses an offer into session-level
//! lines and media sections, [`MediaSection::prefer_formats`] moves the
//! target payload types to the front, and serialization writes every other
//! line back byte-for-byte, line endings included.
//!
//! A target that is not offered leaves the description untouched. Patching
//! is a stable partition, so applying it twice is the same as applying it
//! once.

use crate::{Error, Result};
use std::fmt;

/// Which video format to prefer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecPreference {
    /// Every payload type whose `a=rtpmap` encoding name matches
    /// (case-insensitive), e.g. `VP9`
    Name(String),
    /// One explicit payload type, e.g. `96`
    PayloadType(u8),
}

impl CodecPreference {
    /// Numeric values select a payload type, anything else an encoding name
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        match value.parse::<u8>() {
            Ok(pt) => CodecPreference::PayloadType(pt),
            Err(_) => CodecPreference::Name(value.to_string()),
        }
    }

    fn matches(&self, section: &MediaSection, format: &str) -> bool {
        match self {
            CodecPreference::Name(name) => section
                .codec_name(format)
                .is_some_and(|codec| codec.eq_ignore_ascii_case(name)),
            CodecPreference::PayloadType(pt) => format.parse::<u8>().ok() == Some(*pt),
        }
    }
}

impl fmt::Display for CodecPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecPreference::Name(name) => f.write_str(name),
            CodecPreference::PayloadType(pt) => write!(f, "payload type {}", pt),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Line {
    text: String,
    ending: &'static str,
}

impl Line {
    fn split(raw: &str) -> Self {
        let (text, ending) = if let Some(text) = raw.strip_suffix("\r\n") {
            (text, "\r\n")
        } else if let Some(text) = raw.strip_suffix('\n') {
            (text, "\n")
        } else {
            (raw, "")
        };
        Self {
            text: text.to_string(),
            ending,
        }
    }
}

/// One `m=` section and the attribute lines that follow it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSection {
    lines: Vec<Line>,
}

impl MediaSection {
    fn media_line(&self) -> &str {
        self.lines
            .first()
            .and_then(|line| line.text.strip_prefix("m="))
            .unwrap_or_default()
    }

    /// Media kind: `audio`, `video`, `application`
    pub fn kind(&self) -> &str {
        self.media_line()
            .split_ascii_whitespace()
            .next()
            .unwrap_or_default()
    }

    /// Formats (payload types) in offered order
    pub fn formats(&self) -> Vec<&str> {
        self.media_line().split_ascii_whitespace().skip(3).collect()
    }

    /// Encoding name mapped to `format` by `a=rtpmap`
    pub fn codec_name(&self, format: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| {
            let (pt, encoding) = line.text.strip_prefix("a=rtpmap:")?.split_once(' ')?;
            if pt != format {
                return None;
            }
            encoding.split('/').next()
        })
    }

    /// Offered formats selected by `preference`, in offered order
    pub fn matching_formats(&self, preference: &CodecPreference) -> Vec<String> {
        self.formats()
            .into_iter()
            .filter(|format| preference.matches(self, format))
            .map(str::to_string)
            .collect()
    }

    /// Move `preferred` formats to the front of the `m=` line, keeping the
    /// relative order of both groups. Returns true if the line changed.
    pub fn prefer_formats(&mut self, preferred: &[String]) -> bool {
        let media_line = self.media_line();
        let tokens: Vec<&str> = media_line.split_ascii_whitespace().collect();
        if tokens.len() <= 3 {
            return false;
        }

        let (head, formats) = tokens.split_at(3);
        let (mut ordered, rest): (Vec<&str>, Vec<&str>) = formats
            .iter()
            .copied()
            .partition(|format| preferred.iter().any(|p| p.as_str() == *format));
        ordered.extend(rest);

        if ordered.as_slice() == formats {
            return false;
        }

        let rewritten = format!("m={} {}", head.join(" "), ordered.join(" "));
        if let Some(line) = self.lines.first_mut() {
            line.text = rewritten;
        }
        true
    }
}

/// A parsed session description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    session: Vec<Line>,
    media: Vec<MediaSection>,
}

impl SessionDescription {
    /// Parse offer text
    ///
    /// # Errors
    ///
    /// Returns [`Error::SdpError`] if the text is empty or does not start
    /// with a `v=` line.
    pub fn parse(text: &str) -> Result<Self> {
        let first = text.lines().find(|line| !line.trim().is_empty());
        match first {
            Some(line) if line.starts_with("v=") => {}
            Some(_) => {
                return Err(Error::SdpError(
                    "Session description must start with v=".to_string(),
                ))
            }
            None => return Err(Error::SdpError("Empty session description".to_string())),
        }

        let mut session = Vec::new();
        let mut media: Vec<MediaSection> = Vec::new();

        for raw in text.split_inclusive('\n') {
            let line = Line::split(raw);
            if line.text.starts_with("m=") {
                media.push(MediaSection { lines: vec![line] });
            } else if let Some(section) = media.last_mut() {
                section.lines.push(line);
            } else {
                session.push(line);
            }
        }

        Ok(Self { session, media })
    }

    /// Media sections in order
    pub fn media(&self) -> &[MediaSection] {
        &self.media
    }

    /// Video sections in order
    pub fn video_sections(&self) -> impl Iterator<Item = &MediaSection> {
        self.media.iter().filter(|m| m.kind() == "video")
    }

    /// Prefer `preference` in every video section. Returns the number of
    /// sections whose format order changed.
    pub fn prefer_video_codec(&mut self, preference: &CodecPreference) -> usize {
        self.media
            .iter_mut()
            .filter(|m| m.kind() == "video")
            .map(|section| {
                let preferred = section.matching_formats(preference);
                section.prefer_formats(&preferred)
            })
            .filter(|changed| *changed)
            .count()
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines = self
            .session
            .iter()
            .chain(self.media.iter().flat_map(|m| m.lines.iter()));
        for line in lines {
            f.write_str(&line.text)?;
            f.write_str(line.ending)?;
        }
        Ok(())
    }
}

/// Rewrite offer text so `preference` leads every video section
pub fn prefer_video_codec(sdp: &str, preference: &CodecPreference) -> Result<String> {
    let mut description = SessionDescription::parse(sdp)?;
    if description.prefer_video_codec(preference) == 0 {
        return Ok(sdp.to_string());
    }
    Ok(description.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: &str = "v=0\r\n\
o=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 0 1\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111 63\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:0\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=rtpmap:63 red/48000/2\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96 97 98 99 100 45\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:1\r\n\
a=recvonly\r\n\
a=rtpmap:96 VP8/90000\r\n\
a=rtpmap:97 rtx/90000\r\n\
a=fmtp:97 apt=96\r\n\
a=rtpmap:98 VP9/90000\r\n\
a=fmtp:98 profile-id=0\r\n\
a=rtpmap:99 rtx/90000\r\n\
a=rtpmap:100 VP9/90000\r\n\
a=fmtp:100 profile-id=2\r\n\
a=rtpmap:45 AV1/90000\r\n";

    fn video_formats(sdp: &str) -> Vec<String> {
        let description = SessionDescription::parse(sdp).unwrap();
        let video = description.video_sections().next().unwrap();
        video.formats().into_iter().map(str::to_string).collect()
    }

    fn sorted(mut formats: Vec<String>) -> Vec<String> {
        formats.sort();
        formats
    }

    #[test]
    fn test_vp9_moved_to_front() {
        let patched = prefer_video_codec(OFFER, &CodecPreference::parse("VP9")).unwrap();
        let formats = video_formats(&patched);
        assert_eq!(formats, vec!["98", "100", "96", "97", "99", "45"]);
        assert_eq!(sorted(formats), sorted(video_formats(OFFER)));
    }

    #[test]
    fn test_other_lines_untouched() {
        let patched = prefer_video_codec(OFFER, &CodecPreference::parse("VP9")).unwrap();
        let original: Vec<&str> = OFFER.split("\r\n").collect();
        let rewritten: Vec<&str> = patched.split("\r\n").collect();
        assert_eq!(original.len(), rewritten.len());

        let differing: Vec<_> = original
            .iter()
            .zip(rewritten.iter())
            .filter(|(a, b)| a != b)
            .collect();
        assert_eq!(differing.len(), 1);
        assert!(differing[0].0.starts_with("m=video"));
        assert_eq!(
            *differing[0].1,
            "m=video 9 UDP/TLS/RTP/SAVPF 98 100 96 97 99 45"
        );
    }

    #[test]
    fn test_absent_codec_is_identity() {
        let patched = prefer_video_codec(OFFER, &CodecPreference::parse("H264")).unwrap();
        assert_eq!(patched, OFFER);
    }

    #[test]
    fn test_patch_is_idempotent() {
        let preference = CodecPreference::parse("VP9");
        let once = prefer_video_codec(OFFER, &preference).unwrap();
        let twice = prefer_video_codec(&once, &preference).unwrap();
        assert_eq!(once, twice);
        assert_eq!(video_formats(&twice).iter().filter(|f| *f == "98").count(), 1);
    }

    #[test]
    fn test_target_anywhere_ends_up_first() {
        let formats = ["101", "102", "103", "104", "105"];
        for position in 0..formats.len() {
            let mut section = String::from("v=0\nm=video 9 UDP/TLS/RTP/SAVPF");
            for format in &formats {
                section.push(' ');
                section.push_str(format);
            }
            section.push('\n');
            for (i, format) in formats.iter().enumerate() {
                let codec = if i == position { "VP9" } else { "VP8" };
                section.push_str(&format!("a=rtpmap:{} {}/90000\n", format, codec));
            }

            let patched = prefer_video_codec(&section, &CodecPreference::parse("vp9")).unwrap();
            let result = video_formats(&patched);
            assert_eq!(result[0], formats[position]);
            assert_eq!(
                sorted(result.clone()),
                sorted(formats.iter().map(|f| f.to_string()).collect())
            );

            let others: Vec<&str> = formats
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != position)
                .map(|(_, f)| *f)
                .collect();
            assert_eq!(&result[1..], others.as_slice());
        }
    }

    #[test]
    fn test_explicit_payload_type() {
        let patched = prefer_video_codec(OFFER, &CodecPreference::parse("100")).unwrap();
        assert_eq!(video_formats(&patched)[0], "100");
    }

    #[test]
    fn test_audio_section_ignored() {
        let patched = prefer_video_codec(OFFER, &CodecPreference::PayloadType(63)).unwrap();
        assert_eq!(patched, OFFER);
    }

    #[test]
    fn test_every_video_section_patched() {
        let sdp = "v=0\n\
m=video 9 RTP/SAVPF 96 98\n\
a=rtpmap:96 VP8/90000\n\
a=rtpmap:98 VP9/90000\n\
m=video 9 RTP/SAVPF 102 103\n\
a=rtpmap:102 VP8/90000\n\
a=rtpmap:103 VP9/90000\n";
        let mut description = SessionDescription::parse(sdp).unwrap();
        assert_eq!(
            description.prefer_video_codec(&CodecPreference::parse("VP9")),
            2
        );
        let firsts: Vec<&str> = description
            .video_sections()
            .map(|m| m.formats()[0])
            .collect();
        assert_eq!(firsts, vec!["98", "103"]);
        assert!(description.to_string().ends_with("a=rtpmap:103 VP9/90000\n"));
    }

    #[test]
    fn test_rejects_non_sdp() {
        assert!(SessionDescription::parse("").is_err());
        assert!(SessionDescription::parse("hello\r\n").is_err());
    }

    #[test]
    fn test_codec_name_lookup() {
        let description = SessionDescription::parse(OFFER).unwrap();
        let video = description.video_sections().next().unwrap();
        assert_eq!(video.codec_name("45"), Some("AV1"));
        assert_eq!(video.codec_name("12"), None);
        assert_eq!(description.media().len(), 2);
    }
}
