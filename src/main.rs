mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use ydls::output::{copy_with_progress, format_megabytes, path_in_root};
use ydls::{server, AppContext};
use ydls_av::ToolRegistry;
use ydls_core::config::Config;
use ydls_core::{Format, FormatCatalog};
use ydls_pipeline::{DownloadResult, LinkBuilder, RequestOptions};

/// Options for `ydls get`.
struct GetArgs {
    url: String,
    options: Vec<String>,
    stdout: bool,
    progress: bool,
    dir: PathBuf,
    base_url: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "ydls=trace,ydls_core=trace,ydls_av=trace,ydls_pipeline=trace,tower_http=debug"
                .to_string()
        } else {
            "ydls=debug,ydls_core=debug,ydls_av=debug,ydls_pipeline=debug,tower_http=info"
                .to_string()
        }
    });

    // Logs go to stderr so `get --stdout` output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = Config::load_or_default(cli.config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            for warning in config.validate() {
                tracing::warn!("{warning}");
            }

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let ctx = AppContext::from_config(config)?;
                server::start_server(ctx).await
            })
        }
        Commands::Get {
            url,
            options,
            stdout,
            no_progress,
            dir,
            base_url,
        } => {
            let args = GetArgs {
                url,
                options,
                stdout,
                progress: !no_progress,
                dir,
                base_url,
            };
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(get(cli.config.as_deref(), args))
        }
        Commands::Formats { json } => list_formats(cli.config.as_deref(), json),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("ydls {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn get(config_path: Option<&Path>, args: GetArgs) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let ctx = AppContext::from_config(config)?;
    let options = RequestOptions::from_tokens(&args.url, &args.options, ctx.downloader.catalog())?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling download");
            on_interrupt.cancel();
        }
    });

    if options.feed {
        let base = args.base_url.unwrap_or_else(|| {
            format!("http://{}:{}", ctx.config.server.host, ctx.config.server.port)
        });
        let feed = ctx
            .downloader
            .feed(&options, &LinkBuilder::new(base), cancel)
            .await?;
        println!("{}", feed.to_xml());
        return Ok(());
    }

    let result = ctx.downloader.download(&options, cancel).await?;
    if args.stdout {
        write_stdout(result).await
    } else {
        write_file(result, &args.dir, args.progress).await
    }
}

async fn write_stdout(result: DownloadResult) -> Result<()> {
    let DownloadResult {
        mut media,
        completion,
        ..
    } = result;

    let mut out = tokio::io::stdout();
    if let Err(e) = copy_with_progress(&mut media, &mut out, |_| {}).await {
        completion.cancel();
        let _ = completion.wait().await;
        return Err(e).context("Failed to write to stdout");
    }
    drop(media);
    completion.wait().await.context("Download failed")?;
    Ok(())
}

async fn write_file(result: DownloadResult, dir: &Path, progress: bool) -> Result<()> {
    let DownloadResult {
        filename,
        mut media,
        completion,
        ..
    } = result;

    let path = path_in_root(dir, &filename)?;
    let mut file = tokio::fs::File::create(&path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let copied = copy_with_progress(&mut media, &mut file, |n| {
        if progress {
            eprint!("\r{filename} {}", format_megabytes(n));
        }
    })
    .await;
    if progress {
        eprintln!();
    }
    drop(media);

    let outcome = match copied {
        Ok(_) => completion.wait().await.context("Download failed"),
        Err(e) => {
            completion.cancel();
            let _ = completion.wait().await;
            Err(e).with_context(|| format!("Failed to write {}", path.display()))
        }
    };

    if outcome.is_err() {
        let _ = tokio::fs::remove_file(&path).await;
    } else {
        tracing::info!("Wrote {}", path.display());
    }
    outcome
}

fn load_catalog(config_path: Option<&Path>) -> Result<FormatCatalog> {
    let config = Config::load_or_default(config_path)?;
    FormatCatalog::new(config.format_entries()?).context("Invalid format catalog")
}

fn list_formats(config_path: Option<&Path>, json: bool) -> Result<()> {
    let catalog = load_catalog(config_path)?;

    if json {
        let formats: Vec<&Format> = catalog.iter().map(|f| f.as_ref()).collect();
        println!("{}", serde_json::to_string_pretty(&formats)?);
        return Ok(());
    }

    let names = |codecs: &[ydls_core::Codec]| {
        if codecs.is_empty() {
            "-".to_string()
        } else {
            codecs
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(",")
        }
    };

    println!(
        "{:<8} {:<10} {:<22} {:<28} {}",
        "FORMAT", "CONTAINER", "AUDIO", "VIDEO", "DESCRIPTION"
    );
    for format in catalog.iter() {
        println!(
            "{:<8} {:<10} {:<22} {:<28} {}",
            format.name,
            format.container,
            names(&format.audio),
            names(&format.video),
            format.description
        );
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    println!("Checking external tools...\n");

    let rt = tokio::runtime::Runtime::new()?;
    let tools = rt.block_on(ToolRegistry::discover(&config.tools).check_all());
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. yt-dlp is always needed; ffmpeg only for conversions.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            Config::load(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let catalog =
        FormatCatalog::new(config.format_entries()?).context("Invalid format catalog")?;

    println!("✓ Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Download retries: {}", config.download_retries);
    println!("  Resolve timeout: {}s", config.resolve_timeout_secs);
    println!("  Formats: {}", catalog.len());

    let warnings = config.validate();
    for warning in &warnings {
        println!("  ! {warning}");
    }

    Ok(())
}
