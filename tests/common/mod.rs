//! Shared test harness for integration tests.
//!
//! External engines are replaced by small shell scripts written once into a
//! temporary directory, and the metadata engine by [`StaticResolver`].

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use ydls::AppContext;
use ydls_av::{
    MediaResolver, PlaylistEntry, SourceContent, SourceDescriptor, SourceStreamDescriptor,
    StreamSelection, ToolRegistry, FFMPEG, YTDLP,
};
use ydls_core::config::Config;
use ydls_core::{Error, MediaKind, Result};

/// Producer that emits `audio from <url>`.
pub const EMIT: &str = "emit.sh";
/// Producer that prints each of its arguments on a line.
pub const ARGS: &str = "args.sh";
/// Engine that fails with a yt-dlp style error.
pub const FAIL: &str = "fail.sh";
/// Engine that never finishes on its own.
pub const SLOW: &str = "slow.sh";
/// Consumer that upper-cases its input.
pub const UPPER: &str = "upper.sh";

const SCRIPTS: &[(&str, &str)] = &[
    (EMIT, "for last; do :; done\nprintf 'audio from %s' \"$last\"\n"),
    (ARGS, "printf '%s\\n' \"$@\"\n"),
    (FAIL, "echo 'ERROR: unable to download video data' >&2\nexit 1\n"),
    (SLOW, "exec sleep 30\n"),
    (UPPER, "exec tr a-z A-Z\n"),
];

/// Directory holding the fake engines.
///
/// Written once per test binary: rewriting an executable while another test
/// is spawning it fails with ETXTBSY.
fn script_dir() -> &'static TempDir {
    static DIR: OnceLock<TempDir> = OnceLock::new();
    DIR.get_or_init(|| {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("failed to create script dir");
        for (name, body) in SCRIPTS {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}")).expect("failed to write script");
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .expect("failed to chmod script");
        }
        dir
    })
}

pub fn script(name: &str) -> PathBuf {
    script_dir().path().join(name)
}

/// Registry with `producer` as yt-dlp and, optionally, `consumer` as ffmpeg.
pub fn tools(producer: &str, consumer: Option<&str>) -> ToolRegistry {
    let registry = ToolRegistry::default().with_tool(YTDLP, script(producer));
    match consumer {
        Some(consumer) => registry.with_tool(FFMPEG, script(consumer)),
        None => registry,
    }
}

/// Context with the built-in catalog, `resolver` and the given fake engines.
pub fn context(resolver: StaticResolver, producer: &str, consumer: Option<&str>) -> AppContext {
    AppContext::with_resolver(Config::default(), Arc::new(resolver), tools(producer, consumer))
        .expect("failed to build context")
}

/// Resolver answering every URL with the same descriptor (or failure).
pub struct StaticResolver {
    source: Option<SourceDescriptor>,
    failure: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl StaticResolver {
    pub fn new(source: SourceDescriptor) -> Self {
        Self {
            source: Some(source),
            failure: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fails every call with a permanent resolve error.
    pub fn failing(message: &str) -> Self {
        Self {
            source: None,
            failure: Some(message.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared call counter, readable after the resolver moved into a context.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl MediaResolver for StaticResolver {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn resolve(&self, url: &str, _selection: StreamSelection) -> Result<SourceDescriptor> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match (&self.source, &self.failure) {
            (Some(source), _) => {
                let mut source = source.clone();
                if !source.is_playlist() {
                    source.url = url.to_string();
                }
                Ok(source)
            }
            (None, Some(message)) => Err(Error::resolve_permanent(message.clone())),
            (None, None) => Err(Error::Internal("resolver has no answer".into())),
        }
    }
}

fn descriptor(title: &str, extension: &str, content: SourceContent) -> SourceDescriptor {
    SourceDescriptor {
        id: Some("id".into()),
        title: title.into(),
        url: "https://host/placeholder".into(),
        duration: Some(Duration::from_secs(180)),
        extension: Some(extension.into()),
        format_id: Some("251".into()),
        description: None,
        thumbnail: None,
        uploader: None,
        upload_date: Some("20240102".into()),
        content,
    }
}

fn stream(kind: MediaKind, codec: &str, container: &str) -> SourceStreamDescriptor {
    SourceStreamDescriptor {
        kind,
        codec: codec.into(),
        container: container.into(),
        bitrate_kbps: None,
        duration: Some(Duration::from_secs(180)),
    }
}

/// Single mp3 audio stream in an mp3 file.
pub fn mp3_source(title: &str) -> SourceDescriptor {
    descriptor(
        title,
        "mp3",
        SourceContent::Media(vec![stream(MediaKind::Audio, "mp3", "mp3")]),
    )
}

/// Opus audio in webm.
pub fn opus_source(title: &str) -> SourceDescriptor {
    descriptor(
        title,
        "webm",
        SourceContent::Media(vec![stream(MediaKind::Audio, "opus", "webm")]),
    )
}

/// h264 video plus aac audio in mp4.
pub fn mp4_source(title: &str) -> SourceDescriptor {
    descriptor(
        title,
        "mp4",
        SourceContent::Media(vec![
            stream(MediaKind::Video, "h264", "mp4"),
            stream(MediaKind::Audio, "aac", "mp4"),
        ]),
    )
}

/// Playlist with `n` shallow entries `https://host/watch?v=<i>`.
pub fn playlist_source(n: usize) -> SourceDescriptor {
    let entries = (0..n)
        .map(|i| PlaylistEntry {
            url: format!("https://host/watch?v={i}"),
            id: Some(i.to_string()),
            title: Some(format!("Episode {i}")),
            duration: Some(Duration::from_secs(60)),
            description: None,
            upload_date: Some("20240102".into()),
        })
        .collect();
    let mut source = descriptor("Channel", "", SourceContent::Playlist(entries));
    source.url = "https://host/list".into();
    source.extension = None;
    source.format_id = None;
    source
}
