//! Request options: what the caller asked for, validated against the catalog.
//!
//! Two encodings produce the same [`RequestOptions`]:
//!
//! - path form: `/<token>[+<token>...]/<url>`, e.g. `/mp3+10s-30s/https://host/v`
//! - query form: `?url=&format=&codec=&codec=&retranscode=&time=&items=&feed=`
//!
//! Tokens are the format name, codec names of that format, `retranscode`,
//! `rss`, `best`, `<N>items` and time ranges. Parsing never touches the
//! network.

use std::sync::Arc;

use ydls_av::StreamSelection;
use ydls_core::{Codec, Error, Format, FormatCatalog, MediaKind, Result, TimeRange};

/// Validated, immutable options for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    /// Source URL, never empty.
    pub url: String,
    /// Requested output format; `None` selects best mode.
    pub format: Option<Arc<Format>>,
    /// Codec overrides, at most one per kind, audio first.
    pub codecs: Vec<Codec>,
    /// Re-encode even when the source already matches.
    pub retranscode: bool,
    pub time_range: Option<TimeRange>,
    /// Playlist item limit (always > 0).
    pub items: Option<usize>,
    /// Render the source as a syndication feed instead of downloading it.
    pub feed: bool,
}

impl RequestOptions {
    /// Parse the path form. `path` is the decoded request path with or
    /// without its leading slash; `raw_query` is appended to the media URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOption`] for unknown formats, foreign codecs,
    /// conflicting or malformed tokens and an empty URL.
    pub fn from_path(path: &str, raw_query: Option<&str>, catalog: &FormatCatalog) -> Result<Self> {
        let path = path.trim_start_matches('/');
        let (segment, rest) = path.split_once('/').unwrap_or((path, ""));

        let (tokens, url) = if is_option_segment(segment) {
            (segment, rest)
        } else {
            ("", path)
        };

        let mut url = normalize_url(url)?;
        if let Some(query) = raw_query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }

        let mut builder = OptionsBuilder::new(catalog);
        for token in tokens.split('+').filter(|t| !t.is_empty()) {
            builder.token(token)?;
        }
        builder.finish(url)
    }

    /// Parse the query form from decoded key/value pairs. `codec` may repeat.
    pub fn from_query(pairs: &[(String, String)], catalog: &FormatCatalog) -> Result<Self> {
        let mut builder = OptionsBuilder::new(catalog);
        let mut url = None;

        // Format first, so codecs can be checked against it in any order.
        if let Some(format) = query_value(pairs, "format").filter(|f| !f.is_empty()) {
            builder.format(format)?;
        }

        for (key, value) in pairs {
            let value = value.trim();
            match key.as_str() {
                "url" => url = Some(value.to_string()),
                "format" => {}
                "codec" if value.is_empty() => {}
                "codec" => builder.codec(value)?,
                "retranscode" => builder.retranscode = flag(value),
                "feed" => builder.feed = flag(value),
                "time" if value.is_empty() => {}
                "time" => builder.time_range(value)?,
                "items" if value.is_empty() => {}
                "items" => builder.items(value.strip_suffix("items").unwrap_or(value))?,
                other => tracing::debug!(key = other, "Ignoring unknown query parameter"),
            }
        }

        let url = url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::invalid_option("missing url parameter"))?;
        builder.finish(normalize_url(&url)?)
    }

    /// Parse an option list such as `["mp3", "10s-30s"]` for `url`. Used by
    /// the CLI, where options arrive as separate arguments.
    pub fn from_tokens<S: AsRef<str>>(
        url: &str,
        tokens: &[S],
        catalog: &FormatCatalog,
    ) -> Result<Self> {
        let mut builder = OptionsBuilder::new(catalog);
        for token in tokens {
            for part in token.as_ref().split('+').filter(|t| !t.is_empty()) {
                builder.token(part)?;
            }
        }
        builder.finish(normalize_url(url)?)
    }

    /// The override for `kind`, if any.
    pub fn codec(&self, kind: MediaKind) -> Option<&Codec> {
        self.codecs.iter().find(|c| c.kind == kind)
    }

    /// Which streams the source engine should deliver for these options.
    pub fn selection(&self) -> StreamSelection {
        match &self.format {
            Some(format) if !format.supports(MediaKind::Video) => StreamSelection::AudioOnly,
            _ => StreamSelection::Best,
        }
    }

    /// Options re-encoded as a path segment for per-item download links.
    ///
    /// `items` and `rss` describe the feed itself and are left out. Empty in
    /// best mode without further options.
    pub fn to_path_options(&self) -> String {
        let mut tokens: Vec<String> = Vec::new();
        if let Some(format) = &self.format {
            tokens.push(format.name.clone());
        }
        tokens.extend(self.codecs.iter().map(|c| c.name.clone()));
        if self.retranscode {
            tokens.push("retranscode".into());
        }
        if let Some(range) = &self.time_range {
            tokens.push(range.to_string());
        }
        tokens.join("+")
    }
}

/// Whether the first path segment carries options rather than the start of
/// the media URL (`https:`, `host.tld`).
fn is_option_segment(segment: &str) -> bool {
    if segment.is_empty() || segment.contains(':') {
        return false;
    }
    // Dots only appear in option tokens as fractional time ranges.
    segment
        .split('+')
        .all(|t| !t.contains('.') || TimeRange::looks_like(t))
}

/// Restore a media URL mangled by path handling.
fn normalize_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::invalid_option("missing media url"));
    }

    for scheme in ["http:", "https:"] {
        if let Some(rest) = raw.strip_prefix(scheme) {
            // Proxies collapse `//` into `/`.
            let rest = rest.trim_start_matches('/');
            if rest.is_empty() {
                return Err(Error::invalid_option(format!("invalid media url {raw:?}")));
            }
            return Ok(format!("{scheme}//{rest}"));
        }
    }

    if raw.contains("://") {
        Ok(raw.to_string())
    } else {
        Ok(format!("http://{raw}"))
    }
}

fn query_value<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.trim())
}

fn flag(value: &str) -> bool {
    !matches!(value.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off")
}

/// Accumulates tokens; rejects conflicts as soon as they appear.
struct OptionsBuilder<'a> {
    catalog: &'a FormatCatalog,
    format: Option<Arc<Format>>,
    best: bool,
    codecs: Vec<Codec>,
    retranscode: bool,
    time_range: Option<TimeRange>,
    items: Option<usize>,
    feed: bool,
}

impl<'a> OptionsBuilder<'a> {
    fn new(catalog: &'a FormatCatalog) -> Self {
        Self {
            catalog,
            format: None,
            best: false,
            codecs: Vec::new(),
            retranscode: false,
            time_range: None,
            items: None,
            feed: false,
        }
    }

    fn token(&mut self, token: &str) -> Result<()> {
        match token {
            "retranscode" => self.retranscode = true,
            "rss" => self.feed = true,
            "best" => {
                if self.format.is_some() {
                    return Err(Error::invalid_option("\"best\" conflicts with a format"));
                }
                self.best = true;
            }
            t if t.ends_with("items") => self.items(&t[..t.len() - "items".len()])?,
            t if TimeRange::looks_like(t) => self.time_range(t)?,
            t if self.format.is_none() && !self.best => self.format(t)?,
            t => self.codec(t)?,
        }
        Ok(())
    }

    fn format(&mut self, name: &str) -> Result<()> {
        if self.best {
            return Err(Error::invalid_option("\"best\" conflicts with a format"));
        }
        let format = self
            .catalog
            .lookup(name)
            .ok_or_else(|| Error::invalid_option(format!("unknown format {name:?}")))?;
        self.format = Some(Arc::clone(format));
        Ok(())
    }

    fn codec(&mut self, name: &str) -> Result<()> {
        let format = self.format.as_ref().ok_or_else(|| {
            Error::invalid_option(format!("codec {name:?} given without a format"))
        })?;
        let codec = format.find_codec(name).ok_or_else(|| {
            Error::invalid_option(format!(
                "codec {name:?} is not supported by format {:?}",
                format.name
            ))
        })?;
        if let Some(existing) = self.codecs.iter().find(|c| c.kind == codec.kind) {
            return Err(Error::invalid_option(format!(
                "{} codec given twice ({:?} and {name:?})",
                codec.kind, existing.name
            )));
        }
        self.codecs.push(codec.clone());
        self.codecs.sort_by_key(|c| c.kind != MediaKind::Audio);
        Ok(())
    }

    fn time_range(&mut self, token: &str) -> Result<()> {
        if self.time_range.is_some() {
            return Err(Error::invalid_option("time range given twice"));
        }
        self.time_range = Some(TimeRange::parse(token)?);
        Ok(())
    }

    fn items(&mut self, count: &str) -> Result<()> {
        if self.items.is_some() {
            return Err(Error::invalid_option("item limit given twice"));
        }
        let n: usize = count
            .parse()
            .map_err(|_| Error::invalid_option(format!("invalid item limit {count:?}")))?;
        if n == 0 {
            return Err(Error::invalid_option("item limit must be positive"));
        }
        self.items = Some(n);
        Ok(())
    }

    fn finish(self, url: String) -> Result<RequestOptions> {
        Ok(RequestOptions {
            url,
            format: self.format,
            codecs: self.codecs,
            retranscode: self.retranscode,
            time_range: self.time_range,
            items: self.items,
            feed: self.feed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;
    use ydls_core::config::default_formats;

    fn catalog() -> FormatCatalog {
        FormatCatalog::new(default_formats().unwrap()).unwrap()
    }

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn path_with_format_and_range() {
        let opts =
            RequestOptions::from_path("/mp3+10s-30s/https://host/watch?x", None, &catalog())
                .unwrap();
        assert_eq!(opts.format.as_ref().unwrap().name, "mp3");
        let range = opts.time_range.unwrap();
        assert_eq!(range.start, Some(Duration::from_secs(10)));
        assert_eq!(range.end, Some(Duration::from_secs(30)));
        assert_eq!(opts.url, "https://host/watch?x");
    }

    #[test]
    fn path_without_options_is_best_mode() {
        let opts = RequestOptions::from_path("/https://host/v", None, &catalog()).unwrap();
        assert!(opts.format.is_none());
        assert!(opts.codecs.is_empty());
        assert_eq!(opts.url, "https://host/v");
        assert_eq!(opts.selection(), StreamSelection::Best);
    }

    #[test]
    fn collapsed_and_schemeless_urls() {
        let c = catalog();
        let opts = RequestOptions::from_path("mp3/https:/host/v", None, &c).unwrap();
        assert_eq!(opts.url, "https://host/v");

        let opts = RequestOptions::from_path("/host.example/v", None, &c).unwrap();
        assert_eq!(opts.url, "http://host.example/v");
        assert!(opts.format.is_none());

        let opts = RequestOptions::from_path("/m4a/host.example/watch", Some("v=1&t=2"), &c)
            .unwrap();
        assert_eq!(opts.url, "http://host.example/watch?v=1&t=2");
    }

    #[test]
    fn empty_url_is_rejected() {
        let err = RequestOptions::from_path("/mp3/", None, &catalog()).unwrap_err();
        assert_matches!(err, Error::InvalidOption(_));
        assert!(RequestOptions::from_path("", None, &catalog()).is_err());
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = RequestOptions::from_path("/wav/https://host/v", None, &catalog()).unwrap_err();
        assert_matches!(err, Error::InvalidOption(msg) if msg.contains("wav"));
    }

    #[test]
    fn every_codec_pair_of_every_format_is_accepted() {
        let c = catalog();
        for format in c.iter() {
            let audio: Vec<Option<&str>> = std::iter::once(None)
                .chain(format.audio.iter().map(|x| Some(x.name.as_str())))
                .collect();
            let video: Vec<Option<&str>> = std::iter::once(None)
                .chain(format.video.iter().map(|x| Some(x.name.as_str())))
                .collect();
            for a in &audio {
                for v in &video {
                    let mut tokens = vec![format.name.as_str()];
                    tokens.extend(a.iter().copied());
                    tokens.extend(v.iter().copied());
                    let path = format!("/{}/https://host/v", tokens.join("+"));
                    let opts = RequestOptions::from_path(&path, None, &c)
                        .unwrap_or_else(|e| panic!("{path}: {e}"));
                    assert_eq!(opts.codec(MediaKind::Audio).map(|x| x.name.as_str()), *a);
                    assert_eq!(opts.codec(MediaKind::Video).map(|x| x.name.as_str()), *v);
                }
            }
        }
    }

    #[test]
    fn foreign_codec_is_rejected() {
        let c = catalog();
        for format in c.iter() {
            let path = format!("/{}+nosuchcodec/https://host/v", format.name);
            assert_matches!(
                RequestOptions::from_path(&path, None, &c),
                Err(Error::InvalidOption(_))
            );
        }
        // A real codec that belongs to a different format.
        assert_matches!(
            RequestOptions::from_path("/mp3+h264/https://host/v", None, &c),
            Err(Error::InvalidOption(_))
        );
    }

    #[test]
    fn second_codec_of_same_kind_is_rejected() {
        let err =
            RequestOptions::from_path("/mp4+aac+mp3/https://host/v", None, &catalog()).unwrap_err();
        assert_matches!(err, Error::InvalidOption(msg) if msg.contains("twice"));
    }

    #[test]
    fn time_ranges_follow_start_before_end() {
        let c = catalog();
        for (n, m) in [(0u64, 1u64), (10, 30), (29, 30), (30, 30), (31, 30), (90, 30)] {
            let path = format!("/mp3+{n}s-{m}s/https://host/v");
            let result = RequestOptions::from_path(&path, None, &c);
            if n < m {
                let range = result.unwrap().time_range.unwrap();
                assert_eq!(range.start, Some(Duration::from_secs(n)));
                assert_eq!(range.end, Some(Duration::from_secs(m)));
            } else {
                assert_matches!(result, Err(Error::InvalidOption(_)), "{path}");
            }
        }
    }

    #[test]
    fn fractional_range_stays_an_option() {
        let opts = RequestOptions::from_path("/1.5s-3s/https://host/v", None, &catalog()).unwrap();
        assert_eq!(opts.time_range.unwrap().start, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn items_tokens() {
        let c = catalog();
        let opts = RequestOptions::from_path("/mp3+rss+5items/https://host/list", None, &c).unwrap();
        assert_eq!(opts.items, Some(5));
        assert!(opts.feed);
        for bad in ["0items", "-1items", "xitems", "items"] {
            let path = format!("/mp3+{bad}/https://host/v");
            assert_matches!(
                RequestOptions::from_path(&path, None, &c),
                Err(Error::InvalidOption(_)),
                "{bad}"
            );
        }
    }

    #[test]
    fn retranscode_flag() {
        let opts =
            RequestOptions::from_path("/mp3+retranscode/https://host/v", None, &catalog()).unwrap();
        assert!(opts.retranscode);
    }

    #[test]
    fn best_conflicts_with_format() {
        let c = catalog();
        assert!(RequestOptions::from_path("/best/https://host/v", None, &c)
            .unwrap()
            .format
            .is_none());
        assert_matches!(
            RequestOptions::from_path("/best+mp3/https://host/v", None, &c),
            Err(Error::InvalidOption(_))
        );
    }

    #[test]
    fn query_form_matches_path_form() {
        let c = catalog();
        let q = RequestOptions::from_query(
            &pairs(&[
                ("url", "https://host/v"),
                ("codec", "h264"),
                ("format", "mp4"),
                ("codec", "aac"),
                ("time", "10s-30s"),
                ("retranscode", "1"),
            ]),
            &c,
        )
        .unwrap();
        let p = RequestOptions::from_path("/mp4+aac+h264+retranscode+10s-30s/https://host/v", None, &c)
            .unwrap();
        assert_eq!(q, p);
    }

    #[test]
    fn query_form_items_and_feed() {
        let c = catalog();
        let q = RequestOptions::from_query(
            &pairs(&[("url", "https://host/list"), ("items", "3"), ("feed", "1")]),
            &c,
        )
        .unwrap();
        assert_eq!(q.items, Some(3));
        assert!(q.feed);

        let q = RequestOptions::from_query(
            &pairs(&[("url", "https://host/list"), ("items", "4items"), ("feed", "0")]),
            &c,
        )
        .unwrap();
        assert_eq!(q.items, Some(4));
        assert!(!q.feed);
    }

    #[test]
    fn query_form_requires_url() {
        let err = RequestOptions::from_query(&pairs(&[("format", "mp3")]), &catalog()).unwrap_err();
        assert_matches!(err, Error::InvalidOption(_));
    }

    #[test]
    fn codec_without_format_is_rejected() {
        let err = RequestOptions::from_query(
            &pairs(&[("url", "https://host/v"), ("codec", "aac")]),
            &catalog(),
        )
        .unwrap_err();
        assert_matches!(err, Error::InvalidOption(_));
    }

    #[test]
    fn tokens_form() {
        let opts =
            RequestOptions::from_tokens("https://host/v", &["ogg", "1m-"], &catalog()).unwrap();
        assert_eq!(opts.format.unwrap().name, "ogg");
        assert_eq!(opts.time_range.unwrap().end, None);
    }

    #[test]
    fn audio_only_formats_select_audio() {
        let c = catalog();
        let mp3 = RequestOptions::from_tokens("https://host/v", &["mp3"], &c).unwrap();
        assert_eq!(mp3.selection(), StreamSelection::AudioOnly);
        let mp4 = RequestOptions::from_tokens("https://host/v", &["mp4"], &c).unwrap();
        assert_eq!(mp4.selection(), StreamSelection::Best);
    }

    #[test]
    fn path_options_roundtrip() {
        let c = catalog();
        let opts = RequestOptions::from_path(
            "/mp4+h264+aac+retranscode+10s-30s+rss+2items/https://host/list",
            None,
            &c,
        )
        .unwrap();
        let encoded = opts.to_path_options();
        assert_eq!(encoded, "mp4+aac+h264+retranscode+10s-30s");

        let again = RequestOptions::from_path(&format!("/{encoded}/https://host/list"), None, &c)
            .unwrap();
        assert_eq!(again.format, opts.format);
        assert_eq!(again.codecs, opts.codecs);
        assert_eq!(again.time_range, opts.time_range);
        assert!(!again.feed);
        assert_eq!(again.items, None);
    }
}
