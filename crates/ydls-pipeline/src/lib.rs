//! # ydls-pipeline
//!
//! The download pipeline: from request options to a streamed, cancellable
//! result.
//!
//! This crate provides:
//!
//! - **[`RequestOptions`]** -- path-form and query-form option parsing,
//!   validated against the [`FormatCatalog`](ydls_core::FormatCatalog).
//! - **[`negotiate`]** -- per-track passthrough or transcode decisions,
//!   producing an [`ExecutionPlan`].
//! - **[`engines`]** -- yt-dlp and ffmpeg argument building.
//! - **[`chain`]** -- spawning and supervising the piped engines, exposing a
//!   [`MediaStream`] and a [`Completion`] handle.
//! - **[`Downloader`]** -- the orchestrator tying resolve, negotiate and
//!   spawn together with retries and cancellation.
//! - **[`feed`]** -- playlist to RSS transformation.

pub mod chain;
pub mod engines;
pub mod feed;
pub mod negotiate;
pub mod options;
pub mod orchestrator;

// Re-export key types at the crate root.
pub use chain::{spawn_chain, Completion, MediaStream};
pub use engines::{build_chain, EngineSpec, Stage};
pub use feed::{build_feed, FeedDocument, FeedItem, LinkBuilder};
pub use negotiate::{negotiate, ExecutionPlan, TrackDecision, TrackPlan};
pub use options::RequestOptions;
pub use orchestrator::{result_filename, DownloadResult, DownloadState, Downloader};
