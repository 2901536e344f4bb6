//! Playlist to RSS feed transformation.
//!
//! Items link back into the path-form request encoding, so dereferencing a
//! link downloads that entry with the feed's format options.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use ydls_av::SourceDescriptor;

use crate::options::RequestOptions;

/// Builds absolute download links below a base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkBuilder {
    base: String,
}

impl LinkBuilder {
    /// `base` is the externally visible root, e.g. `https://host/prefix`.
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Link that downloads `media_url` with `options`.
    pub fn media_link(&self, options: &RequestOptions, media_url: &str) -> String {
        let opts = options.to_path_options();
        if opts.is_empty() {
            format!("{}/{media_url}", self.base)
        } else {
            format!("{}/{opts}/{media_url}", self.base)
        }
    }
}

/// One retained playlist entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    /// Download link into the pipeline.
    pub link: String,
    /// Page URL of the entry, used as a stable id.
    pub guid: String,
    pub description: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
}

/// A syndication feed for a playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    pub image: Option<String>,
    /// MIME type advertised for enclosures.
    pub enclosure_type: String,
    pub items: Vec<FeedItem>,
}

/// Build the feed for `source`, keeping at most `options.items` entries in
/// playlist order. A single item yields a one-entry feed.
pub fn build_feed(
    source: &SourceDescriptor,
    options: &RequestOptions,
    links: &LinkBuilder,
) -> FeedDocument {
    let limit = options.items.unwrap_or(usize::MAX);

    let items: Vec<FeedItem> = if source.is_playlist() {
        source
            .entries()
            .iter()
            .take(limit)
            .map(|entry| FeedItem {
                title: entry
                    .title
                    .clone()
                    .or_else(|| entry.id.clone())
                    .unwrap_or_else(|| entry.url.clone()),
                link: links.media_link(options, &entry.url),
                guid: entry.url.clone(),
                description: entry.description.clone(),
                published: entry.upload_date.as_deref().and_then(parse_upload_date),
                duration: entry.duration,
            })
            .collect()
    } else {
        vec![FeedItem {
            title: source.title.clone(),
            link: links.media_link(options, &source.url),
            guid: source.url.clone(),
            description: source.description.clone(),
            published: source.upload_date.as_deref().and_then(parse_upload_date),
            duration: source.duration,
        }]
    };

    let enclosure_type = options
        .format
        .as_ref()
        .map(|f| f.mime_type.clone())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    FeedDocument {
        title: source.title.clone(),
        link: source.url.clone(),
        description: source
            .description
            .clone()
            .unwrap_or_else(|| source.title.clone()),
        image: source.thumbnail.clone(),
        enclosure_type,
        items,
    }
}

/// `YYYYMMDD` as reported by the engine, at midnight UTC.
fn parse_upload_date(s: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
}

impl FeedDocument {
    /// RSS 2.0 XML.
    pub fn to_xml(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FeedDocument {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
        writeln!(
            out,
            r#"<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">"#
        )?;
        writeln!(out, "<channel>")?;
        writeln!(out, "<title>{}</title>", escape(&self.title))?;
        writeln!(out, "<link>{}</link>", escape(&self.link))?;
        writeln!(out, "<description>{}</description>", escape(&self.description))?;
        if let Some(image) = &self.image {
            writeln!(out, r#"<itunes:image href="{}"/>"#, escape(image))?;
        }

        for item in &self.items {
            writeln!(out, "<item>")?;
            writeln!(out, "<title>{}</title>", escape(&item.title))?;
            writeln!(out, "<link>{}</link>", escape(&item.link))?;
            writeln!(
                out,
                r#"<guid isPermaLink="false">{}</guid>"#,
                escape(&item.guid)
            )?;
            if let Some(description) = &item.description {
                writeln!(out, "<description>{}</description>", escape(description))?;
            }
            if let Some(published) = &item.published {
                writeln!(out, "<pubDate>{}</pubDate>", published.to_rfc2822())?;
            }
            if let Some(duration) = item.duration {
                writeln!(out, "<itunes:duration>{}</itunes:duration>", duration.as_secs())?;
            }
            writeln!(
                out,
                r#"<enclosure url="{}" length="0" type="{}"/>"#,
                escape(&item.link),
                escape(&self.enclosure_type)
            )?;
            writeln!(out, "</item>")?;
        }

        writeln!(out, "</channel>")?;
        write!(out, "</rss>")
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Not allowed anywhere in an XML 1.0 document.
            c if c < ' ' && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}
