//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML and carries the
//! retry policy, server, tool and format catalog sections. Every section
//! defaults sensibly so a completely empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

/// Built-in format catalog used when the config declares no formats.
const DEFAULT_FORMATS: &str = include_str!("formats.toml");

/// Locations searched when no config path is given.
const DEFAULT_PATHS: &[&str] = &["./ydls.toml", "/etc/ydls/ydls.toml"];

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How many times a transient resolve failure is retried.
    pub download_retries: u32,
    /// Base delay between resolve attempts; grows linearly per attempt.
    pub retry_delay_ms: u64,
    /// Maximum time the metadata-extraction engine may run.
    pub resolve_timeout_secs: u64,
    pub server: ServerConfig,
    pub tools: ToolsConfig,
    pub formats: Vec<FormatConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_retries: 3,
            retry_delay_ms: 500,
            resolve_timeout_secs: 60,
            server: ServerConfig::default(),
            tools: ToolsConfig::default(),
            formats: Vec::new(),
        }
    }
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Read and parse the config file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    /// Load the given file, or the first existing default location, or fall
    /// back to defaults when nothing is found.
    ///
    /// An explicitly given path must exist and parse.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        for candidate in DEFAULT_PATHS {
            let candidate = Path::new(candidate);
            if candidate.exists() {
                tracing::info!("Using config file {}", candidate.display());
                return Self::load(candidate);
            }
        }

        tracing::info!("No config file found; using defaults");
        Ok(Self::default())
    }

    /// The format entries to build the catalog from: the configured ones, or
    /// the built-in set when none are configured.
    pub fn format_entries(&self) -> Result<Vec<FormatConfig>> {
        if !self.formats.is_empty() {
            return Ok(self.formats.clone());
        }
        default_formats()
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.download_retries > 10 {
            warnings.push(format!(
                "download_retries is {}; failing sources will hold requests for a long time",
                self.download_retries
            ));
        }

        if self.resolve_timeout_secs == 0 {
            warnings.push("resolve_timeout_secs is 0; every resolve will time out".into());
        }

        for (i, f) in self.formats.iter().enumerate() {
            if f.mime_type.is_empty() {
                warnings.push(format!("formats[{i}] ({}) has no mime_type", f.name));
            }
        }

        warnings
    }
}

/// Parse the built-in format catalog.
pub fn default_formats() -> Result<Vec<FormatConfig>> {
    #[derive(Deserialize)]
    struct FormatsFile {
        formats: Vec<FormatConfig>,
    }

    let file: FormatsFile = toml::from_str(DEFAULT_FORMATS)
        .map_err(|e| Error::Catalog(format!("built-in formats: {e}")))?;
    Ok(file.formats)
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Derive feed link base URLs from `X-Forwarded-*` headers.
    pub trust_forwarded_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            trust_forwarded_headers: true,
        }
    }
}

/// Optional explicit paths to external engines.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ytdlp_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
}

/// One `[[formats]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatConfig {
    pub name: String,
    pub container: String,
    /// Defaults to the format name.
    #[serde(default)]
    pub extension: Option<String>,
    pub mime_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ffmpeg_flags: Vec<String>,
    #[serde(default)]
    pub audio: Vec<CodecConfig>,
    #[serde(default)]
    pub video: Vec<CodecConfig>,
}

/// One `[[formats.audio]]` / `[[formats.video]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    pub name: String,
    /// Defaults to the codec name.
    #[serde(default)]
    pub encoder: Option<String>,
    #[serde(default)]
    pub flags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.download_retries, 3);
        assert_eq!(config.server.port, 8080);
        assert!(config.formats.is_empty());
        assert!(config.tools.ytdlp_path.is_none());
    }

    #[test]
    fn parses_formats() {
        let config = Config::from_toml(
            r#"
            download_retries = 1

            [server]
            port = 9000

            [[formats]]
            name = "mp3"
            container = "mp3"
            mime_type = "audio/mpeg"

            [[formats.audio]]
            name = "mp3"
            encoder = "libmp3lame"
            flags = ["-q:a", "0"]
            "#,
        )
        .unwrap();

        assert_eq!(config.download_retries, 1);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.formats.len(), 1);
        let mp3 = &config.formats[0];
        assert_eq!(mp3.audio[0].encoder.as_deref(), Some("libmp3lame"));
        assert!(mp3.video.is_empty());
        assert_eq!(config.format_entries().unwrap().len(), 1);
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = Config::from_toml("download_retries = \"many\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn built_in_formats_parse() {
        let formats = default_formats().unwrap();
        let names: Vec<&str> = formats.iter().map(|f| f.name.as_str()).collect();
        for expected in ["mp3", "m4a", "ogg", "opus", "flac", "mp4", "mkv", "webm"] {
            assert!(names.contains(&expected), "missing {expected}");
        }
        assert_eq!(Config::default().format_entries().unwrap(), formats);
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ydls.toml");
        std::fs::write(&path, "retry_delay_ms = 10\n").unwrap();
        let config = Config::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.retry_delay_ms, 10);
    }

    #[test]
    fn validate_warns() {
        let mut config = Config::default();
        assert!(config.validate().is_empty());
        config.server.port = 0;
        config.download_retries = 50;
        assert_eq!(config.validate().len(), 2);
    }
}
