use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ydls")]
#[command(author, version, about = "Download, remux or transcode online media")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Download a URL into the current directory
    Get {
        /// Media or playlist URL
        #[arg(required = true)]
        url: String,

        /// Options such as `mp3`, `mp4 h264 aac`, `30s-1m`, `retranscode`, `rss 10items`
        options: Vec<String>,

        /// Write the result to stdout instead of a file
        #[arg(long)]
        stdout: bool,

        /// Do not print progress on stderr
        #[arg(long)]
        no_progress: bool,

        /// Directory to write the result into
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Root URL that feed item links point at
        #[arg(long)]
        base_url: Option<String>,
    },

    /// List available output formats
    Formats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
