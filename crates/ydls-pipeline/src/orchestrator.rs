//! The download orchestrator: one flow per invocation, from options to a
//! streaming [`DownloadResult`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use ydls_av::{MediaResolver, SourceDescriptor, StreamSelection, ToolRegistry};
use ydls_core::config::Config;
use ydls_core::{Error, FormatCatalog, Result};

use crate::chain::{spawn_chain, Completion, MediaStream};
use crate::engines::build_chain;
use crate::feed::{build_feed, FeedDocument, LinkBuilder};
use crate::negotiate::{negotiate, ExecutionPlan};
use crate::options::RequestOptions;

/// Lifecycle of one download flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Pending,
    Resolving,
    Negotiated,
    Running,
    Streaming,
    Completed,
    Failed,
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Resolving => "resolving",
            Self::Negotiated => "negotiated",
            Self::Running => "running",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Tracks and logs state transitions of a single flow.
struct Flow<'a> {
    url: &'a str,
    state: DownloadState,
}

impl<'a> Flow<'a> {
    fn new(url: &'a str) -> Self {
        Self {
            url,
            state: DownloadState::Pending,
        }
    }

    fn enter(&mut self, next: DownloadState) {
        tracing::debug!(url = self.url, from = %self.state, to = %next, "Download state");
        self.state = next;
    }

    fn fail(&mut self, err: Error) -> Error {
        if matches!(err, Error::Cancelled) {
            tracing::debug!(url = self.url, state = %self.state, "Download cancelled");
        } else {
            tracing::warn!(url = self.url, state = %self.state, "Download failed: {err}");
        }
        self.enter(DownloadState::Failed);
        err
    }
}

/// A streaming download handed to the caller.
///
/// The caller reads `media` and then awaits `completion`; dropping `media`
/// early cancels the engines.
#[derive(Debug)]
pub struct DownloadResult {
    pub filename: String,
    pub mime_type: String,
    pub plan: ExecutionPlan,
    pub source: SourceDescriptor,
    pub media: MediaStream,
    pub completion: Completion,
}

/// Entry point of the download pipeline.
///
/// Cheap to clone; the catalog and resolver are shared read-only.
#[derive(Clone)]
pub struct Downloader {
    catalog: Arc<FormatCatalog>,
    resolver: Arc<dyn MediaResolver>,
    tools: ToolRegistry,
    retries: u32,
    retry_delay: Duration,
}

impl fmt::Debug for Downloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Downloader")
            .field("formats", &self.catalog.len())
            .field("resolver", &self.resolver.name())
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

impl Downloader {
    pub fn new(
        catalog: Arc<FormatCatalog>,
        resolver: Arc<dyn MediaResolver>,
        tools: ToolRegistry,
    ) -> Self {
        Self {
            catalog,
            resolver,
            tools,
            retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }

    /// Apply the retry settings from `config`.
    pub fn with_config(self, config: &Config) -> Self {
        self.with_retries(
            config.download_retries,
            Duration::from_millis(config.retry_delay_ms),
        )
    }

    /// Retry transient resolve failures `retries` times, waiting
    /// `delay * attempt` between attempts.
    pub fn with_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = delay;
        self
    }

    pub fn catalog(&self) -> &FormatCatalog {
        &self.catalog
    }

    /// Run a download flow and return as soon as bytes can be streamed.
    ///
    /// Option, resolve and spawn errors are returned before any byte is
    /// produced. Engine failures after that surface through
    /// [`DownloadResult::completion`].
    pub async fn download(
        &self,
        options: &RequestOptions,
        cancel: CancellationToken,
    ) -> Result<DownloadResult> {
        let mut flow = Flow::new(&options.url);
        match self.start(&mut flow, options, cancel).await {
            Ok(result) => Ok(result),
            Err(e) => Err(flow.fail(e)),
        }
    }

    async fn start(
        &self,
        flow: &mut Flow<'_>,
        options: &RequestOptions,
        cancel: CancellationToken,
    ) -> Result<DownloadResult> {
        flow.enter(DownloadState::Resolving);
        let source = self
            .resolve(&options.url, options.selection(), &cancel)
            .await?;

        let plan = negotiate(&source, options)?;
        flow.enter(DownloadState::Negotiated);
        tracing::info!(
            url = %options.url,
            format = plan.format.as_ref().map_or("best", |f| f.name.as_str()),
            tracks = %plan
                .tracks
                .iter()
                .map(|t| format!("{}: {}", t.kind, t.decision))
                .collect::<Vec<_>>()
                .join(", "),
            consumer = plan.needs_consumer(),
            "Negotiated download"
        );

        let chain = build_chain(&self.tools, &source.url, &plan)?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        flow.enter(DownloadState::Running);
        let (media, completion) = spawn_chain(chain, cancel.child_token())?;

        flow.enter(DownloadState::Streaming);
        Ok(DownloadResult {
            filename: result_filename(&source.title, &plan.extension),
            mime_type: plan.mime_type.clone(),
            plan,
            source,
            media,
            completion,
        })
    }

    /// Resolve a playlist (or a single item) and render it as a feed whose
    /// item links re-enter the pipeline through `links`.
    pub async fn feed(
        &self,
        options: &RequestOptions,
        links: &LinkBuilder,
        cancel: CancellationToken,
    ) -> Result<FeedDocument> {
        let mut flow = Flow::new(&options.url);
        flow.enter(DownloadState::Resolving);
        match self
            .resolve(&options.url, options.selection(), &cancel)
            .await
        {
            Ok(source) => {
                let feed = build_feed(&source, options, links);
                tracing::info!(url = %options.url, items = feed.items.len(), "Built feed");
                flow.enter(DownloadState::Completed);
                Ok(feed)
            }
            Err(e) => Err(flow.fail(e)),
        }
    }

    /// Resolve with retries for transient failures. Waiting is cancellable.
    async fn resolve(
        &self,
        url: &str,
        selection: StreamSelection,
        cancel: &CancellationToken,
    ) -> Result<SourceDescriptor> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                r = self.resolver.resolve(url, selection) => r,
            };

            match result {
                Err(e) if e.is_retryable() && attempt <= self.retries => {
                    let delay = self.retry_delay * attempt;
                    tracing::warn!(
                        url,
                        attempt,
                        retries = self.retries,
                        "Resolve failed, retrying in {delay:?}: {e}"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                other => return other,
            }
        }
    }
}

/// `<title>.<extension>` with characters that would break a path replaced.
pub fn result_filename(title: &str, extension: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let stem = cleaned.trim_start_matches('.');
    let stem = if stem.is_empty() { "download" } else { stem };
    format!("{stem}.{extension}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use ydls_av::{SourceContent, SourceStreamDescriptor};
    use ydls_core::config::default_formats;
    use ydls_core::MediaKind;

    /// Fails with the queued errors, then returns an mp3 source.
    struct ScriptedResolver {
        failures: Mutex<Vec<Error>>,
        calls: Mutex<u32>,
    }

    impl ScriptedResolver {
        fn new(failures: Vec<Error>) -> Self {
            Self {
                failures: Mutex::new(failures),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl MediaResolver for ScriptedResolver {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn resolve(&self, url: &str, _selection: StreamSelection) -> Result<SourceDescriptor> {
            *self.calls.lock() += 1;
            if let Some(err) = self.failures.lock().pop() {
                return Err(err);
            }
            Ok(SourceDescriptor {
                id: None,
                title: "Song".into(),
                url: url.into(),
                duration: None,
                extension: Some("mp3".into()),
                format_id: None,
                description: None,
                thumbnail: None,
                uploader: None,
                upload_date: None,
                content: SourceContent::Media(vec![SourceStreamDescriptor {
                    kind: MediaKind::Audio,
                    codec: "mp3".into(),
                    container: "mp3".into(),
                    bitrate_kbps: None,
                    duration: None,
                }]),
            })
        }
    }

    fn downloader(resolver: Arc<ScriptedResolver>) -> Downloader {
        let catalog = Arc::new(FormatCatalog::new(default_formats().unwrap()).unwrap());
        Downloader::new(catalog, resolver, ToolRegistry::default())
            .with_retries(2, Duration::from_millis(1))
    }

    fn options(d: &Downloader, tokens: &[&str]) -> RequestOptions {
        RequestOptions::from_tokens("https://host/v", tokens, d.catalog()).unwrap()
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let resolver = Arc::new(ScriptedResolver::new(vec![
            Error::resolve_transient("HTTP Error 503"),
            Error::resolve_transient("timed out"),
        ]));
        let d = downloader(resolver.clone());
        let source = d
            .resolve("https://host/v", StreamSelection::Best, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(source.title, "Song");
        assert_eq!(resolver.calls(), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let resolver = Arc::new(ScriptedResolver::new(vec![
            Error::resolve_transient("1"),
            Error::resolve_transient("2"),
            Error::resolve_transient("3"),
        ]));
        let d = downloader(resolver.clone());
        let err = d
            .resolve("https://host/v", StreamSelection::Best, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(resolver.calls(), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let resolver = Arc::new(ScriptedResolver::new(vec![Error::resolve_permanent(
            "Unsupported URL",
        )]));
        let d = downloader(resolver.clone());
        let opts = options(&d, &["mp3"]);
        let err = d.download(&opts, CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.http_status(), 404);
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_resolve() {
        let resolver = Arc::new(ScriptedResolver::new(Vec::new()));
        let d = downloader(resolver);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let opts = options(&d, &["mp3"]);
        assert_matches!(d.download(&opts, cancel).await, Err(Error::Cancelled));
    }

    #[tokio::test]
    async fn missing_engine_fails_before_streaming() {
        let resolver = Arc::new(ScriptedResolver::new(Vec::new()));
        let d = downloader(resolver);
        let opts = options(&d, &["mp3"]);
        assert_matches!(
            d.download(&opts, CancellationToken::new()).await,
            Err(Error::Tool { .. })
        );
    }

    #[test]
    fn filenames() {
        assert_eq!(result_filename("A/B: C", "mp3"), "A_B: C.mp3");
        assert_eq!(result_filename("  ", "mp4"), "download.mp4");
        assert_eq!(result_filename("..", "mp4"), "download.mp4");
        assert_eq!(result_filename("a\\b\nc", "ogg"), "a_b_c.ogg");
    }

    #[test]
    fn state_names() {
        assert_eq!(DownloadState::Negotiated.to_string(), "negotiated");
        assert_eq!(DownloadState::Failed.to_string(), "failed");
    }
}
