//! Application context shared by the CLI and the HTTP server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ydls_av::{MediaResolver, ToolRegistry, YtDlpResolver, YTDLP};
use ydls_core::config::Config;
use ydls_core::FormatCatalog;
use ydls_pipeline::Downloader;

/// Everything a request needs: the configuration and the downloader built
/// from it. Cheap to clone.
#[derive(Clone, Debug)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub downloader: Downloader,
}

impl AppContext {
    /// Build the catalog, discover the engines and wire the downloader.
    ///
    /// A malformed catalog is fatal. Missing engines are only logged, so the
    /// server still starts and reports them per request.
    pub fn from_config(config: Config) -> Result<Self> {
        let catalog = FormatCatalog::new(config.format_entries()?)
            .context("Invalid format catalog")?;
        tracing::info!("Loaded {} formats", catalog.len());

        let tools = ToolRegistry::discover(&config.tools);
        let resolver = match YtDlpResolver::from_registry(&tools) {
            Ok(resolver) => resolver,
            Err(e) => {
                tracing::warn!("{e}");
                YtDlpResolver::new(PathBuf::from(YTDLP))
            }
        }
        .with_timeout(Duration::from_secs(config.resolve_timeout_secs));

        let downloader = Downloader::new(Arc::new(catalog), Arc::new(resolver), tools)
            .with_config(&config);

        Ok(Self::new(config, downloader))
    }

    /// Assemble a context from parts, e.g. with a custom resolver.
    pub fn new(config: Config, downloader: Downloader) -> Self {
        Self {
            config: Arc::new(config),
            downloader,
        }
    }

    /// Context with the built-in catalog, the given resolver and engines.
    pub fn with_resolver(
        config: Config,
        resolver: Arc<dyn MediaResolver>,
        tools: ToolRegistry,
    ) -> Result<Self> {
        let catalog = FormatCatalog::new(config.format_entries()?)
            .context("Invalid format catalog")?;
        let downloader = Downloader::new(Arc::new(catalog), resolver, tools).with_config(&config);
        Ok(Self::new(config, downloader))
    }
}
