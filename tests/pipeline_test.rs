//! End-to-end download flows through the downloader with fake engines.

#![cfg(unix)]

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use assert_matches::assert_matches;
use common::*;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use ydls_core::Error;
use ydls_pipeline::{LinkBuilder, RequestOptions};

fn options(ctx: &ydls::AppContext, url: &str, tokens: &[&str]) -> RequestOptions {
    RequestOptions::from_tokens(url, tokens, ctx.downloader.catalog()).unwrap()
}

#[tokio::test]
async fn matching_container_streams_producer_output_directly() {
    let ctx = context(StaticResolver::new(mp3_source("Song")), EMIT, None);
    let opts = options(&ctx, "https://host/song", &["mp3"]);

    let mut result = ctx
        .downloader
        .download(&opts, CancellationToken::new())
        .await
        .unwrap();
    assert!(!result.plan.needs_consumer());
    assert_eq!(result.filename, "Song.mp3");
    assert_eq!(result.mime_type, "audio/mpeg");

    let mut out = String::new();
    result.media.read_to_string(&mut out).await.unwrap();
    assert_eq!(out, "audio from https://host/song");
    result.completion.wait().await.unwrap();
}

#[tokio::test]
async fn transcode_runs_through_consumer() {
    let ctx = context(StaticResolver::new(opus_source("Talk")), EMIT, Some(UPPER));
    let opts = options(&ctx, "https://host/talk", &["mp3"]);

    let mut result = ctx
        .downloader
        .download(&opts, CancellationToken::new())
        .await
        .unwrap();
    assert!(result.plan.has_transcode());
    assert_eq!(result.filename, "Talk.mp3");

    let mut out = String::new();
    result.media.read_to_string(&mut out).await.unwrap();
    assert_eq!(out, "AUDIO FROM HTTPS://HOST/TALK");
    result.completion.wait().await.unwrap();
}

#[tokio::test]
async fn transcode_without_ffmpeg_fails_before_streaming() {
    let ctx = context(StaticResolver::new(opus_source("Talk")), EMIT, None);
    let opts = options(&ctx, "https://host/talk", &["mp3"]);
    assert_matches!(
        ctx.downloader.download(&opts, CancellationToken::new()).await,
        Err(Error::Tool { .. })
    );
}

#[tokio::test]
async fn best_mode_keeps_source_container() {
    let ctx = context(StaticResolver::new(mp4_source("Clip")), EMIT, None);
    let opts = options(&ctx, "https://host/clip", &[]);

    let mut result = ctx
        .downloader
        .download(&opts, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.filename, "Clip.mp4");
    assert_eq!(result.mime_type, "video/mp4");
    assert!(result.plan.tracks.iter().all(|t| t.decision.is_passthrough()));

    let mut out = Vec::new();
    result.media.read_to_end(&mut out).await.unwrap();
    result.completion.wait().await.unwrap();
}

#[tokio::test]
async fn time_range_is_passed_to_producer() {
    let ctx = context(StaticResolver::new(mp3_source("Song")), ARGS, None);
    let opts = options(&ctx, "https://host/song", &["mp3", "10s-30s"]);

    let mut result = ctx
        .downloader
        .download(&opts, CancellationToken::new())
        .await
        .unwrap();
    let mut out = String::new();
    result.media.read_to_string(&mut out).await.unwrap();
    result.completion.wait().await.unwrap();

    let args: Vec<&str> = out.lines().collect();
    let at = args
        .iter()
        .position(|a| *a == "--download-sections")
        .expect("no --download-sections argument");
    assert_eq!(args[at + 1], "*10-30");
    assert_eq!(args.last().copied(), Some("https://host/song"));
    assert!(args.contains(&"251"));
}

#[tokio::test]
async fn producer_failure_surfaces_through_completion() {
    let ctx = context(StaticResolver::new(opus_source("Talk")), FAIL, Some(UPPER));
    let opts = options(&ctx, "https://host/talk", &["mp3"]);

    let mut result = ctx
        .downloader
        .download(&opts, CancellationToken::new())
        .await
        .unwrap();
    let mut out = Vec::new();
    result.media.read_to_end(&mut out).await.unwrap();
    assert!(out.is_empty());

    let err = result.completion.wait().await.unwrap_err();
    assert_matches!(&err, Error::Pipeline { stage, message }
        if stage == "producer" && message.contains("unable to download"));
    assert_eq!(err.http_status(), 502);
}

#[tokio::test]
async fn cancelling_the_flow_stops_the_engines() {
    let ctx = context(StaticResolver::new(opus_source("Talk")), SLOW, Some(UPPER));
    let opts = options(&ctx, "https://host/talk", &["mp3"]);

    let cancel = CancellationToken::new();
    let result = ctx.downloader.download(&opts, cancel.clone()).await.unwrap();
    cancel.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(5), result.completion.wait())
        .await
        .expect("engines were not stopped");
    assert_matches!(outcome, Err(Error::Cancelled));
}

#[tokio::test]
async fn playlist_download_is_rejected() {
    let ctx = context(StaticResolver::new(playlist_source(3)), EMIT, Some(UPPER));
    let opts = options(&ctx, "https://host/list", &["mp3"]);
    assert_matches!(
        ctx.downloader.download(&opts, CancellationToken::new()).await,
        Err(Error::InvalidOption(_))
    );
}

#[tokio::test]
async fn feed_is_limited_and_links_back() {
    let resolver = StaticResolver::new(playlist_source(5));
    let calls = resolver.calls();
    let ctx = context(resolver, EMIT, None);
    let opts = options(&ctx, "https://host/list", &["mp3", "rss", "2items"]);

    let feed = ctx
        .downloader
        .feed(
            &opts,
            &LinkBuilder::new("https://ydls.example"),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(feed.items.len(), 2);
    assert_eq!(feed.items[0].link, "https://ydls.example/mp3/https://host/watch?v=0");
    assert_eq!(feed.items[1].title, "Episode 1");
    assert_eq!(feed.enclosure_type, "audio/mpeg");
    // Entries are not resolved until a link is followed.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn permanent_resolve_failure_is_not_retried() {
    let resolver = StaticResolver::failing("Unsupported URL: https://host/nope");
    let calls = resolver.calls();
    let ctx = context(resolver, EMIT, None);
    let opts = options(&ctx, "https://host/nope", &["mp3"]);

    let err = ctx
        .downloader
        .download(&opts, CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 404);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
