//! Codec negotiation: deciding per track between passthrough and transcode.

use std::fmt;
use std::sync::Arc;

use ydls_av::{SourceDescriptor, StreamSelection};
use ydls_core::{
    container_for_extension, mime_for_extension, Codec, Error, Format, MediaKind, Result,
    TimeRange,
};

use crate::options::RequestOptions;

/// What happens to one output track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackDecision {
    /// Copy the source stream as is.
    Passthrough { codec: String },
    /// Re-encode into `codec`.
    Transcode { codec: Codec },
}

impl TrackDecision {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Passthrough { .. })
    }

    /// Codec name of the resulting track.
    pub fn codec_name(&self) -> &str {
        match self {
            Self::Passthrough { codec } => codec,
            Self::Transcode { codec } => &codec.name,
        }
    }
}

impl fmt::Display for TrackDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passthrough { codec } => write!(f, "copy {codec}"),
            Self::Transcode { codec } => write!(f, "encode {} ({})", codec.name, codec.encoder),
        }
    }
}

/// Decision for one media kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackPlan {
    pub kind: MediaKind,
    pub decision: TrackDecision,
}

/// Everything the orchestrator needs to wire the engines. Derived once per
/// invocation and never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    /// Target format; `None` in best mode.
    pub format: Option<Arc<Format>>,
    /// Muxer name of the output.
    pub container: String,
    pub extension: String,
    pub mime_type: String,
    /// Kept tracks, audio first.
    pub tracks: Vec<TrackPlan>,
    pub time_range: Option<TimeRange>,
    pub retranscode: bool,
    pub selection: StreamSelection,
    /// Engine format id the source streams were described for.
    pub source_format_id: Option<String>,
    /// Every track is copied but the bytes still need a stream-copy pass,
    /// either into another container or to drop unwanted streams.
    pub remux: bool,
}

impl ExecutionPlan {
    /// Whether any track is re-encoded.
    pub fn has_transcode(&self) -> bool {
        self.tracks.iter().any(|t| !t.decision.is_passthrough())
    }

    /// Whether a consuming engine has to run after the producer.
    pub fn needs_consumer(&self) -> bool {
        self.format.is_some() && (self.remux || self.has_transcode())
    }

    /// The decision for `kind`, when that kind is kept.
    pub fn track(&self, kind: MediaKind) -> Option<&TrackDecision> {
        self.tracks
            .iter()
            .find(|t| t.kind == kind)
            .map(|t| &t.decision)
    }
}

/// Negotiate `source` against the requested options.
///
/// Per kind the format accepts, in order:
///
/// 1. a kind the format has no codecs for is dropped, as is a kind the
///    source has no stream of;
/// 2. the target codec is the override for that kind, else the format's first
///    preference;
/// 3. without `retranscode`, a source stream already encoded as the target
///    codec is passed through;
/// 4. otherwise the track is transcoded to the target codec.
///
/// Best mode (no format) passes every source stream through in the source's
/// own container.
///
/// # Errors
///
/// Returns [`Error::InvalidOption`] when the source is a playlist or shares
/// no stream kind with the requested format.
pub fn negotiate(source: &SourceDescriptor, options: &RequestOptions) -> Result<ExecutionPlan> {
    if source.is_playlist() {
        return Err(Error::invalid_option(
            "source is a playlist; request it as a feed with the rss option",
        ));
    }

    let source_ext = source
        .extension
        .clone()
        .or_else(|| source.streams().first().map(|s| s.container.clone()))
        .filter(|e| !e.is_empty());

    let Some(format) = options.format.clone() else {
        return Ok(best_plan(source, options, source_ext));
    };

    let mut tracks = Vec::new();
    for kind in MediaKind::ALL {
        let Some(preferred) = format.preferred(kind) else {
            continue;
        };
        if source.streams_of(kind).next().is_none() {
            continue;
        }

        // `target` comes from the format's own list, so the output container
        // can always carry it; the source container only decides remuxing.
        let target = options.codec(kind).unwrap_or(preferred);
        let already_target = source.streams_of(kind).any(|s| s.codec == target.name);

        let decision = if !options.retranscode && already_target {
            TrackDecision::Passthrough {
                codec: target.name.clone(),
            }
        } else {
            TrackDecision::Transcode {
                codec: target.clone(),
            }
        };
        tracks.push(TrackPlan { kind, decision });
    }

    if tracks.is_empty() {
        return Err(Error::invalid_option(format!(
            "source has no stream format {:?} can carry",
            format.name
        )));
    }

    let drops_streams = source
        .streams()
        .iter()
        .any(|s| !tracks.iter().any(|t| t.kind == s.kind));
    let same_container = source_ext
        .as_deref()
        .is_some_and(|ext| container_for_extension(ext) == format.container);
    let all_passthrough = tracks.iter().all(|t| t.decision.is_passthrough());

    Ok(ExecutionPlan {
        container: format.container.clone(),
        extension: format.extension.clone(),
        mime_type: format.mime_type.clone(),
        remux: all_passthrough && (drops_streams || !same_container),
        tracks,
        time_range: options.time_range,
        retranscode: options.retranscode,
        selection: options.selection(),
        source_format_id: source.format_id.clone(),
        format: Some(format),
    })
}

fn best_plan(
    source: &SourceDescriptor,
    options: &RequestOptions,
    source_ext: Option<String>,
) -> ExecutionPlan {
    let tracks = MediaKind::ALL
        .iter()
        .filter_map(|&kind| {
            source.streams_of(kind).next().map(|s| TrackPlan {
                kind,
                decision: TrackDecision::Passthrough {
                    codec: s.codec.clone(),
                },
            })
        })
        .collect();

    let extension = source_ext.unwrap_or_else(|| "bin".to_string());
    ExecutionPlan {
        format: None,
        container: container_for_extension(&extension),
        mime_type: mime_for_extension(&extension).to_string(),
        extension,
        tracks,
        time_range: options.time_range,
        retranscode: false,
        selection: options.selection(),
        source_format_id: source.format_id.clone(),
        remux: false,
    }
}
