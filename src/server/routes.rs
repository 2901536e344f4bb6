//! HTTP handlers: index and convert pages plus the download dispatch that
//! every other path falls through to.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Form, Router,
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use ydls_core::{Error, FormatCatalog};
use ydls_pipeline::{DownloadResult, LinkBuilder, RequestOptions};

use super::error::AppError;
use crate::context::AppContext;

const INDEX_CSP: &str = "default-src 'self'; style-src 'unsafe-inline'; form-action 'self'";
const MEDIA_CSP: &str = "default-src 'none'; reflected-xss block";
const FEED_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(index))
        .route("/convert", get(convert_form).post(convert))
        .route("/favicon.ico", get(favicon))
        .fallback(dispatch)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

async fn favicon() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

/// `GET /` renders the index page; with a query it is a query-form request.
async fn index(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, AppError> {
    if uri.query().map_or(true, str::is_empty) {
        return Ok(html_page(index_html(ctx.downloader.catalog())));
    }
    let options = request_options(&uri, ctx.downloader.catalog())?;
    serve_options(&ctx, &headers, options).await
}

async fn convert_form() -> Response {
    html_page(CONVERT_HTML.to_string())
}

#[derive(Debug, Deserialize)]
struct ConvertForm {
    url: String,
}

/// `POST /convert` downloads the submitted URL in best mode.
async fn convert(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Form(form): Form<ConvertForm>,
) -> Result<Response, AppError> {
    let options =
        RequestOptions::from_tokens::<&str>(&form.url, &[], ctx.downloader.catalog())?;
    serve_options(&ctx, &headers, options).await
}

/// Everything else: `/<options>/<url>` or `?url=...`.
async fn dispatch(
    State(ctx): State<AppContext>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, AppError> {
    if method != Method::GET && method != Method::HEAD {
        return Ok((StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response());
    }
    let options = request_options(&uri, ctx.downloader.catalog())?;
    serve_options(&ctx, &headers, options).await
}

/// Query form when a `url` parameter is present, path form otherwise.
fn request_options(uri: &Uri, catalog: &FormatCatalog) -> ydls_core::Result<RequestOptions> {
    if let Ok(Query(pairs)) = Query::<Vec<(String, String)>>::try_from_uri(uri) {
        if pairs.iter().any(|(k, v)| k == "url" && !v.is_empty()) {
            return RequestOptions::from_query(&pairs, catalog);
        }
    }

    let path = urlencoding::decode(uri.path())
        .map_err(|e| Error::invalid_option(format!("request path is not UTF-8: {e}")))?;
    RequestOptions::from_path(&path, uri.query(), catalog)
}

async fn serve_options(
    ctx: &AppContext,
    headers: &HeaderMap,
    options: RequestOptions,
) -> Result<Response, AppError> {
    // Cancels the flow if the client goes away before we have a response.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    if options.feed {
        let links = LinkBuilder::new(base_url(
            headers,
            ctx.config.server.trust_forwarded_headers,
        ));
        let feed = ctx.downloader.feed(&options, &links, cancel).await?;
        guard.disarm();
        return Ok((
            [
                (header::CONTENT_TYPE, FEED_CONTENT_TYPE),
                (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
            ],
            feed.to_xml(),
        )
            .into_response());
    }

    let result = ctx.downloader.download(&options, cancel).await?;
    // From here on the stream owns cancellation: dropping the body kills
    // the engines.
    guard.disarm();

    let DownloadResult {
        filename,
        mime_type,
        media,
        completion,
        ..
    } = result;

    tracing::info!(url = %options.url, filename = %filename, mime = %mime_type, "Streaming download");

    let url = options.url.clone();
    tokio::spawn(async move {
        match completion.wait().await {
            Ok(()) => tracing::info!(url = %url, "Download finished"),
            Err(Error::Cancelled) => tracing::info!(url = %url, "Download aborted"),
            Err(e) => tracing::warn!(url = %url, "Download failed while streaming: {e}"),
        }
    });

    Response::builder()
        .header(header::CONTENT_TYPE, mime_type)
        .header(header::CONTENT_DISPOSITION, content_disposition(&filename))
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .header(header::CONTENT_SECURITY_POLICY, MEDIA_CSP)
        .body(Body::from_stream(ReaderStream::new(media)))
        .map_err(|e| AppError::from(Error::Internal(format!("failed to build response: {e}"))))
}

fn html_page(body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
            (header::CONTENT_SECURITY_POLICY, INDEX_CSP),
        ],
        body,
    )
        .into_response()
}

/// Externally visible root URL of this server, used for feed item links.
pub fn base_url(headers: &HeaderMap, trust_forwarded: bool) -> String {
    let (mut scheme, mut host, mut prefix) = (None, None, None);
    if trust_forwarded {
        scheme = header_str(headers, "x-forwarded-proto");
        host = header_str(headers, "x-forwarded-host");
        prefix = header_str(headers, "x-forwarded-prefix");
    }

    let scheme = scheme.unwrap_or("http");
    let host = host
        .or_else(|| header_str(headers, "host"))
        .unwrap_or("localhost");
    let prefix = prefix.unwrap_or("").trim_matches('/');

    if prefix.is_empty() {
        format!("{scheme}://{host}")
    } else {
        format!("{scheme}://{host}/{prefix}")
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// `attachment` disposition with an RFC 5987 UTF-8 name and an ASCII
/// fallback for old clients.
pub fn content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename*=UTF-8''{}; filename=\"{}\"",
        urlencoding::encode(filename),
        ascii_filename(filename)
    )
}

fn ascii_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '"' | '/' | '\\' => '_',
            c if !(' '..='~').contains(&c) => '_',
            c => c,
        })
        .collect()
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn index_html(catalog: &FormatCatalog) -> String {
    let mut options = String::from(r#"<option value="">best (no conversion)</option>"#);
    let mut rows = String::new();
    let codecs = |list: &[ydls_core::Codec]| {
        list.iter()
            .map(|c| escape_html(&c.name))
            .collect::<Vec<_>>()
            .join(", ")
    };
    for format in catalog.iter() {
        let name = escape_html(&format.name);
        options.push_str(&format!(r#"<option value="{name}">{name}</option>"#));

        rows.push_str(&format!(
            "<tr><td>{name}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&format.description),
            codecs(&format.audio),
            codecs(&format.video),
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>ydls</title>
<style>
body {{ font-family: sans-serif; max-width: 48em; margin: 2em auto; }}
table {{ border-collapse: collapse; }}
td, th {{ padding: 0.2em 0.8em; text-align: left; }}
</style>
</head>
<body>
<h1>ydls</h1>
<form action="/" method="get">
<input type="url" name="url" placeholder="https://..." size="50" required>
<select name="format">{options}</select>
<input type="text" name="time" placeholder="10s-1m" size="8">
<label><input type="checkbox" name="retranscode" value="1"> retranscode</label>
<button type="submit">Download</button>
</form>
<p>Path form: <code>/&lt;format&gt;+&lt;codec&gt;+&lt;start&gt;-&lt;end&gt;+retranscode/&lt;url&gt;</code>,
add <code>rss</code> and <code>&lt;N&gt;items</code> for a playlist feed.</p>
<table>
<tr><th>Format</th><th>Description</th><th>Audio</th><th>Video</th></tr>
{rows}
</table>
</body>
</html>
"#
    )
}

const CONVERT_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>ydls convert</title>
<style>
body { font-family: sans-serif; max-width: 40em; margin: 2em auto; }
</style>
</head>
<body>
<h1>Convert</h1>
<form action="/convert" method="post">
<input type="url" name="url" placeholder="https://..." size="50" required>
<button type="submit">Download</button>
</form>
</body>
</html>
"#;
