//! yt-dlp backed [`MediaResolver`].
//!
//! Shells out to `yt-dlp -J --flat-playlist` and maps the JSON dump into a
//! [`SourceDescriptor`]. Engine failures are classified from stderr.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use ydls_core::{Error, MediaKind};

use super::types::{
    PlaylistEntry, SourceContent, SourceDescriptor, SourceStreamDescriptor, StreamSelection,
};
use super::MediaResolver;
use crate::command::ToolCommand;
use crate::tools::{ToolRegistry, YTDLP};

/// Default time allowed for a metadata dump.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Engine messages that mean retrying cannot help.
const PERMANENT_MARKERS: &[&str] = &[
    "unsupported url",
    "is not a valid url",
    "http error 404",
    "video unavailable",
    "private video",
    "does not exist",
    "removed",
];

/// A resolver backed by the `yt-dlp` CLI.
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    ytdlp_path: PathBuf,
    timeout: Duration,
}

impl YtDlpResolver {
    /// Create a resolver using the given yt-dlp path.
    pub fn new(ytdlp_path: PathBuf) -> Self {
        Self {
            ytdlp_path,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create a resolver from the discovered tools.
    pub fn from_registry(tools: &ToolRegistry) -> ydls_core::Result<Self> {
        Ok(Self::new(tools.require(YTDLP)?.path.clone()))
    }

    /// Set how long a single metadata dump may take.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    fn name(&self) -> &'static str {
        YTDLP
    }

    async fn resolve(
        &self,
        url: &str,
        selection: StreamSelection,
    ) -> ydls_core::Result<SourceDescriptor> {
        let mut cmd = ToolCommand::new(self.ytdlp_path.clone());
        cmd.args(["-J", "--flat-playlist", "--no-warnings", "-f"])
            .arg(selection.selector())
            .args(["--", url])
            .timeout(self.timeout);

        tracing::debug!(url, selector = selection.selector(), "Resolving source");

        let Some(output) = cmd.try_output().await? else {
            return Err(Error::resolve_transient(format!(
                "yt-dlp timed out after {:?}",
                self.timeout
            )));
        };

        if !output.status.success() {
            return Err(classify_failure(&output.stderr, output.status.code()));
        }

        parse_ytdlp_json(&output.stdout, url)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    #[serde(rename = "_type")]
    kind: Option<String>,
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    ext: Option<String>,
    format_id: Option<String>,
    acodec: Option<String>,
    vcodec: Option<String>,
    abr: Option<f64>,
    vbr: Option<f64>,
    tbr: Option<f64>,
    requested_formats: Option<Vec<YtDlpFormat>>,
    entries: Option<Vec<Option<YtDlpEntry>>>,
    webpage_url: Option<String>,
    thumbnail: Option<String>,
    description: Option<String>,
    uploader: Option<String>,
    upload_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    ext: Option<String>,
    acodec: Option<String>,
    vcodec: Option<String>,
    abr: Option<f64>,
    vbr: Option<f64>,
    tbr: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
    description: Option<String>,
    upload_date: Option<String>,
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Map a yt-dlp JSON dump to a [`SourceDescriptor`].
///
/// `requested_url` fills in the page URL when the dump carries none.
pub fn parse_ytdlp_json(json: &str, requested_url: &str) -> ydls_core::Result<SourceDescriptor> {
    let info: YtDlpInfo = serde_json::from_str(json)
        .map_err(|e| Error::resolve_permanent(format!("yt-dlp JSON parse error: {e}")))?;

    let is_playlist = matches!(info.kind.as_deref(), Some("playlist" | "multi_video"))
        || (info.kind.is_none() && info.entries.is_some());

    let content = if is_playlist {
        SourceContent::Playlist(
            info.entries
                .unwrap_or_default()
                .into_iter()
                .flatten()
                .filter_map(map_entry)
                .collect(),
        )
    } else {
        SourceContent::Media(map_streams(&info))
    };

    let title = info
        .title
        .filter(|t| !t.trim().is_empty())
        .or_else(|| info.id.clone())
        .unwrap_or_else(|| "download".to_string());

    Ok(SourceDescriptor {
        id: info.id,
        title,
        url: info.webpage_url.unwrap_or_else(|| requested_url.to_string()),
        duration: info.duration.and_then(secs),
        extension: if is_playlist { None } else { info.ext },
        format_id: info.format_id,
        description: info.description,
        thumbnail: info.thumbnail,
        uploader: info.uploader,
        upload_date: info.upload_date,
        content,
    })
}

fn map_streams(info: &YtDlpInfo) -> Vec<SourceStreamDescriptor> {
    let duration = info.duration.and_then(secs);
    let mut streams = Vec::new();

    let mut push = |kind: MediaKind, codec: Option<&str>, ext: Option<&str>, bitrate: Option<f64>| {
        if let Some(codec) = codec.and_then(normalize_codec) {
            streams.push(SourceStreamDescriptor {
                kind,
                codec,
                container: ext.unwrap_or_default().to_string(),
                bitrate_kbps: bitrate,
                duration,
            });
        }
    };

    match info.requested_formats.as_deref() {
        Some(formats) if !formats.is_empty() => {
            // Merged downloads list one entry per elementary stream.
            for f in formats {
                let ext = f.ext.as_deref().or(info.ext.as_deref());
                push(MediaKind::Video, f.vcodec.as_deref(), ext, f.vbr.or(f.tbr));
                push(MediaKind::Audio, f.acodec.as_deref(), ext, f.abr.or(f.tbr));
            }
        }
        _ => {
            let ext = info.ext.as_deref();
            push(MediaKind::Video, info.vcodec.as_deref(), ext, info.vbr.or(info.tbr));
            push(MediaKind::Audio, info.acodec.as_deref(), ext, info.abr.or(info.tbr));
        }
    }

    streams
}

fn map_entry(entry: YtDlpEntry) -> Option<PlaylistEntry> {
    let url = entry
        .webpage_url
        .filter(|u| !u.is_empty())
        .or(entry.url.filter(|u| !u.is_empty()))?;
    Some(PlaylistEntry {
        url,
        id: entry.id,
        title: entry.title,
        duration: entry.duration.and_then(secs),
        description: entry.description,
        upload_date: entry.upload_date,
    })
}

fn secs(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}

/// Normalize an engine codec string (`mp4a.40.2`, `avc1.64001F`, ...) to the
/// catalog's codec naming. Returns `None` for absent streams.
pub fn normalize_codec(raw: &str) -> Option<String> {
    let lower = raw.trim().to_ascii_lowercase();
    if lower.is_empty() || lower == "none" {
        return None;
    }

    let family = lower.split('.').next().unwrap_or(&lower);
    let name = match family {
        "mp4a" => "aac",
        "avc1" | "avc3" => "h264",
        "hev1" | "hvc1" => "hevc",
        "vp09" => "vp9",
        "vp08" => "vp8",
        "av01" => "av1",
        "ac-3" => "ac3",
        "ec-3" => "eac3",
        other => other,
    };
    Some(name.to_string())
}

/// Turn a failed yt-dlp run into a classified resolve error.
pub fn classify_failure(stderr: &str, code: Option<i32>) -> Error {
    let message = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| match code {
            Some(code) => format!("yt-dlp exited with status {code}"),
            None => "yt-dlp was terminated by a signal".to_string(),
        });

    let lower = stderr.to_ascii_lowercase();
    if PERMANENT_MARKERS.iter().any(|m| lower.contains(m)) {
        Error::resolve_permanent(message)
    } else {
        Error::resolve_transient(message)
    }
}
