//! The format catalog: the read-only table of allowed output formats.
//!
//! Built once at startup from [`FormatConfig`] entries. Construction fails on
//! malformed entries so a bad catalog never reaches request handling; after
//! that every lookup is side-effect-free and needs no synchronization.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{CodecConfig, FormatConfig};
use crate::error::Result;
use crate::media::{Codec, Format, MediaKind};
use crate::Error;

/// Option tokens with a fixed meaning that formats and codecs must not shadow.
pub const RESERVED_TOKENS: &[&str] = &["retranscode", "rss", "best"];

/// Immutable collection of [`Format`]s, in declaration order.
#[derive(Debug, Clone)]
pub struct FormatCatalog {
    formats: Vec<Arc<Format>>,
    by_name: HashMap<String, usize>,
}

impl FormatCatalog {
    /// Build a catalog, validating every entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Catalog`] on duplicate format names, formats without
    /// any codec, duplicate codec names within a format, or names that would
    /// be ambiguous inside an option string.
    pub fn new(entries: Vec<FormatConfig>) -> Result<Self> {
        let mut formats = Vec::with_capacity(entries.len());
        let mut by_name = HashMap::with_capacity(entries.len());

        for entry in entries {
            check_token(&entry.name, "format")?;
            if entry.container.is_empty() {
                return Err(Error::Catalog(format!(
                    "format {:?} has no container",
                    entry.name
                )));
            }
            if entry.audio.is_empty() && entry.video.is_empty() {
                return Err(Error::Catalog(format!(
                    "format {:?} has neither audio nor video codecs",
                    entry.name
                )));
            }

            let format = build_format(entry)?;
            if by_name.insert(format.name.clone(), formats.len()).is_some() {
                return Err(Error::Catalog(format!(
                    "duplicate format name {:?}",
                    format.name
                )));
            }
            formats.push(Arc::new(format));
        }

        Ok(Self { formats, by_name })
    }

    /// Look up a format by name.
    pub fn lookup(&self, name: &str) -> Option<&Arc<Format>> {
        self.by_name.get(name).map(|&i| &self.formats[i])
    }

    /// Ordered codec list of `kind` for the named format, or `None` when the
    /// format does not exist.
    pub fn codecs_for(&self, format: &str, kind: MediaKind) -> Option<&[Codec]> {
        self.lookup(format).map(|f| f.codecs(kind))
    }

    /// Iterate over all formats in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Format>> {
        self.formats.iter()
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

fn build_format(entry: FormatConfig) -> Result<Format> {
    let audio = build_codecs(&entry.name, entry.audio, MediaKind::Audio)?;
    let video = build_codecs(&entry.name, entry.video, MediaKind::Video)?;

    let all = audio.iter().chain(video.iter());
    let mut seen = std::collections::HashSet::new();
    for codec in all {
        if !seen.insert(codec.name.as_str()) {
            return Err(Error::Catalog(format!(
                "format {:?} lists codec {:?} twice",
                entry.name, codec.name
            )));
        }
    }

    Ok(Format {
        extension: entry.extension.unwrap_or_else(|| entry.name.clone()),
        name: entry.name,
        container: entry.container,
        mime_type: entry.mime_type,
        description: entry.description,
        ffmpeg_flags: entry.ffmpeg_flags,
        audio,
        video,
    })
}

fn build_codecs(format: &str, entries: Vec<CodecConfig>, kind: MediaKind) -> Result<Vec<Codec>> {
    entries
        .into_iter()
        .map(|c| {
            check_token(&c.name, &format!("{kind} codec of {format:?}"))?;
            Ok(Codec {
                encoder: c.encoder.unwrap_or_else(|| c.name.clone()),
                name: c.name,
                kind,
                flags: c.flags,
            })
        })
        .collect()
}

/// Names travel inside `+`-separated path segments, so they must be plain.
fn check_token(name: &str, what: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Catalog(format!("{what} has an empty name")));
    }
    if name.contains(['+', '/', '?', '&', '=']) || name.chars().any(char::is_whitespace) {
        return Err(Error::Catalog(format!(
            "{what} name {name:?} contains a reserved character"
        )));
    }
    if RESERVED_TOKENS.contains(&name) || name.ends_with("items") {
        return Err(Error::Catalog(format!(
            "{what} name {name:?} collides with an option keyword"
        )));
    }
    Ok(())
}
