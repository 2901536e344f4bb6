//! # ydls-av
//!
//! External engine plumbing for the ydls download pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to yt-dlp
//!   and ffmpeg.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support for short, fully captured invocations.
//! - **Media resolution** ([`MediaResolver`], [`YtDlpResolver`]) -- describe
//!   a source URL's streams or playlist entries before downloading.

pub mod command;
pub mod resolve;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use resolve::{
    MediaResolver, PlaylistEntry, SourceContent, SourceDescriptor, SourceStreamDescriptor,
    StreamSelection, YtDlpResolver,
};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry, FFMPEG, YTDLP};
