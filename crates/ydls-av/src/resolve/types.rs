//! Descriptions of source media as reported by the metadata-extraction engine.

use std::time::Duration;

use serde::Serialize;
use ydls_core::MediaKind;

/// Which streams the producing engine should deliver.
///
/// The resolver describes exactly the streams that a producer run with the
/// same selection will emit, so negotiation decisions match the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamSelection {
    /// Best available media with every stream kind.
    #[default]
    Best,
    /// Best audio, falling back to combined media when no audio-only exists.
    AudioOnly,
}

impl StreamSelection {
    /// The yt-dlp format selector for this selection.
    pub fn selector(&self) -> &'static str {
        match self {
            Self::Best => "best/bestvideo+bestaudio",
            Self::AudioOnly => "bestaudio/best",
        }
    }
}

/// One elementary stream of a source item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStreamDescriptor {
    pub kind: MediaKind,
    /// Codec name normalized to catalog naming (e.g. "aac", "h264").
    pub codec: String,
    /// Container (file extension) the stream is delivered in.
    pub container: String,
    /// Approximate bitrate in kbit/s.
    pub bitrate_kbps: Option<f64>,
    pub duration: Option<Duration>,
}

/// A shallow playlist entry. Resolved on demand through the resolver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistEntry {
    pub url: String,
    pub id: Option<String>,
    pub title: Option<String>,
    pub duration: Option<Duration>,
    pub description: Option<String>,
    /// `YYYYMMDD`, when the engine reports it for flat entries.
    pub upload_date: Option<String>,
}

/// Either the streams of a single item or the entries of a playlist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SourceContent {
    Media(Vec<SourceStreamDescriptor>),
    Playlist(Vec<PlaylistEntry>),
}

/// Everything the pipeline knows about a source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceDescriptor {
    pub id: Option<String>,
    pub title: String,
    /// Canonical page URL of the source.
    pub url: String,
    pub duration: Option<Duration>,
    /// Extension of the file the producer emits (single items only).
    pub extension: Option<String>,
    /// Engine format identifier the streams were described for.
    pub format_id: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub uploader: Option<String>,
    pub upload_date: Option<String>,
    pub content: SourceContent,
}

impl SourceDescriptor {
    /// Streams of a single item; empty for playlists.
    pub fn streams(&self) -> &[SourceStreamDescriptor] {
        match &self.content {
            SourceContent::Media(streams) => streams,
            SourceContent::Playlist(_) => &[],
        }
    }

    /// Streams of the given kind, in engine order.
    pub fn streams_of(&self, kind: MediaKind) -> impl Iterator<Item = &SourceStreamDescriptor> {
        self.streams().iter().filter(move |s| s.kind == kind)
    }

    /// Entries of a playlist; empty for single items.
    pub fn entries(&self) -> &[PlaylistEntry] {
        match &self.content {
            SourceContent::Playlist(entries) => entries,
            SourceContent::Media(_) => &[],
        }
    }

    pub fn is_playlist(&self) -> bool {
        matches!(self.content, SourceContent::Playlist(_))
    }
}
