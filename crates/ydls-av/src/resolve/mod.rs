//! Media resolution: describing a source URL before anything is downloaded.
//!
//! A [`MediaResolver`] turns a URL into a [`SourceDescriptor`]. The production
//! implementation is [`YtDlpResolver`]; tests plug in in-memory resolvers.

pub mod types;
pub mod ytdlp;

use async_trait::async_trait;

pub use types::{
    PlaylistEntry, SourceContent, SourceDescriptor, SourceStreamDescriptor, StreamSelection,
};
pub use ytdlp::YtDlpResolver;

/// Async trait implemented by every metadata-extraction backend.
///
/// Implementations must classify failures into transient and permanent
/// [`ydls_core::Error::Resolve`] errors; the orchestrator retries only the
/// former.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Short identifier for logs (e.g. `"yt-dlp"`).
    fn name(&self) -> &'static str;

    /// Describe the media behind `url` as a producer run with the same
    /// `selection` would emit it. Playlists come back with shallow entries.
    async fn resolve(
        &self,
        url: &str,
        selection: StreamSelection,
    ) -> ydls_core::Result<SourceDescriptor>;
}
