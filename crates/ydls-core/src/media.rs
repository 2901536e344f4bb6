//! Media-domain types: media kinds, codecs and output formats.
//!
//! [`Codec`] and [`Format`] are owned by the [`FormatCatalog`](crate::FormatCatalog)
//! and immutable once the catalog is built.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// MediaKind
// ---------------------------------------------------------------------------

/// The kind of elementary stream a codec encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Both kinds, audio first. Track plans are ordered this way.
    pub const ALL: [MediaKind; 2] = [MediaKind::Audio, MediaKind::Video];

    /// Stream specifier letter understood by ffmpeg (`a` or `v`).
    pub fn specifier(&self) -> &'static str {
        match self {
            Self::Audio => "a",
            Self::Video => "v",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// An output codec a [`Format`] accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Codec {
    /// Canonical codec name, as used in request options (e.g. "aac").
    pub name: String,
    /// Whether this is an audio or a video codec.
    pub kind: MediaKind,
    /// Encoder identifier passed to the transcoding engine (e.g. "libmp3lame").
    pub encoder: String,
    /// Extra encoder arguments (e.g. `["-q:a", "0"]`).
    pub flags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Format
// ---------------------------------------------------------------------------

/// A named output format: a container plus ordered codec preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Format {
    /// Unique name used in request options (e.g. "mp3").
    pub name: String,
    /// Muxer name understood by the transcoding engine (e.g. "mp4").
    pub container: String,
    /// File extension for results in this format.
    pub extension: String,
    /// MIME type of results in this format.
    pub mime_type: String,
    /// Short human-readable description.
    pub description: String,
    /// Extra muxer arguments (e.g. fragmented mp4 flags for pipe output).
    pub ffmpeg_flags: Vec<String>,
    /// Acceptable audio codecs, most preferred first.
    pub audio: Vec<Codec>,
    /// Acceptable video codecs, most preferred first.
    pub video: Vec<Codec>,
}

impl Format {
    /// Ordered codec list for the given kind. Empty when the format drops
    /// that kind entirely.
    pub fn codecs(&self, kind: MediaKind) -> &[Codec] {
        match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Video => &self.video,
        }
    }

    /// The first (most preferred) codec for the given kind.
    pub fn preferred(&self, kind: MediaKind) -> Option<&Codec> {
        self.codecs(kind).first()
    }

    /// Whether the format carries streams of the given kind at all.
    pub fn supports(&self, kind: MediaKind) -> bool {
        !self.codecs(kind).is_empty()
    }

    /// Find a codec by name in either list.
    pub fn find_codec(&self, name: &str) -> Option<&Codec> {
        self.audio
            .iter()
            .chain(self.video.iter())
            .find(|c| c.name == name)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// ---------------------------------------------------------------------------
// Container helpers
// ---------------------------------------------------------------------------

/// Map a source file extension to the muxer name used for the same container.
///
/// Used to decide whether passthrough streams can be exposed as-is or need a
/// stream-copy remux into the target container.
pub fn container_for_extension(ext: &str) -> String {
    match ext.to_ascii_lowercase().as_str() {
        "mp4" | "m4a" | "m4v" | "mov" => "mp4".into(),
        "mkv" | "mka" => "matroska".into(),
        "ogg" | "oga" | "opus" => "ogg".into(),
        "aac" => "adts".into(),
        other => other.into(),
    }
}

/// MIME type for a file extension, used when no format was requested.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => "video/mp4",
        "m4a" => "audio/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mka" => "audio/x-matroska",
        "mp3" => "audio/mpeg",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(name: &str, kind: MediaKind) -> Codec {
        Codec {
            name: name.into(),
            kind,
            encoder: name.into(),
            flags: Vec::new(),
        }
    }

    fn mp4() -> Format {
        Format {
            name: "mp4".into(),
            container: "mp4".into(),
            extension: "mp4".into(),
            mime_type: "video/mp4".into(),
            description: String::new(),
            ffmpeg_flags: Vec::new(),
            audio: vec![codec("aac", MediaKind::Audio), codec("mp3", MediaKind::Audio)],
            video: vec![codec("h264", MediaKind::Video)],
        }
    }

    #[test]
    fn preferred_is_first_codec() {
        let f = mp4();
        assert_eq!(f.preferred(MediaKind::Audio).unwrap().name, "aac");
        assert_eq!(f.preferred(MediaKind::Video).unwrap().name, "h264");
    }

    #[test]
    fn find_codec_searches_both_lists() {
        let f = mp4();
        assert_eq!(f.find_codec("mp3").unwrap().kind, MediaKind::Audio);
        assert_eq!(f.find_codec("h264").unwrap().kind, MediaKind::Video);
        assert!(f.find_codec("vp9").is_none());
    }

    #[test]
    fn audio_only_format_drops_video() {
        let mut f = mp4();
        f.video.clear();
        assert!(f.supports(MediaKind::Audio));
        assert!(!f.supports(MediaKind::Video));
        assert!(f.preferred(MediaKind::Video).is_none());
    }

    #[test]
    fn container_mapping() {
        assert_eq!(container_for_extension("m4a"), "mp4");
        assert_eq!(container_for_extension("MKV"), "matroska");
        assert_eq!(container_for_extension("webm"), "webm");
        assert_eq!(container_for_extension("mp3"), "mp3");
    }

    #[test]
    fn mime_mapping() {
        assert_eq!(mime_for_extension("webm"), "video/webm");
        assert_eq!(mime_for_extension("m4a"), "audio/mp4");
        assert_eq!(mime_for_extension("xyz"), "application/octet-stream");
    }
}
