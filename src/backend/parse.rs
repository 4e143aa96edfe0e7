//! Preview body parsing.
//!
//! The preview endpoint answers either with a JSON envelope or with the raw
//! RSS/Atom document proxied from the source. Both end up as a [`FeedPreview`].

use chrono::{DateTime, Utc};
use feed_rs::parser;
use serde::Deserialize;

use crate::backend::FeedPreview;
use crate::discovery::types::Entry;
use crate::{Result, ScoutError};

/// Maximum preview body size in bytes (5MB).
pub const MAX_PREVIEW_SIZE: u64 = 5 * 1024 * 1024;

/// Title used for entries that carry none.
const UNTITLED_ENTRY: &str = "Untitled";

#[derive(Debug, Deserialize)]
struct PreviewEnvelope {
    #[serde(default)]
    data: Option<PreviewData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PreviewData {
    #[serde(default)]
    feed: Option<FeedMeta>,
    #[serde(default)]
    entries: Vec<WireEntry>,
}

#[derive(Debug, Deserialize)]
struct FeedMeta {
    #[serde(default)]
    title: Option<String>,
}

/// Entry as it appears in backend JSON.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireEntry {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
}

impl WireEntry {
    /// Convert to an [`Entry`], dropping entries without a usable link.
    pub(crate) fn into_entry(self) -> Option<Entry> {
        let link = usable_link(self.link.as_deref()?)?;
        let title = self
            .title
            .map(|t| plain_text(&t))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED_ENTRY.to_string());
        let published_at = self.published.as_deref().and_then(parse_published);
        Some(Entry {
            title,
            link,
            published_at,
        })
    }
}

/// Return the trimmed link if it is an absolute http(s) URL with a host.
pub fn usable_link(link: &str) -> Option<String> {
    let trimmed = link.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = url::Url::parse(trimmed).ok()?;
    match parsed.scheme() {
        "http" | "https" if parsed.host().is_some() => Some(trimmed.to_string()),
        _ => None,
    }
}

/// Parse RFC 3339 or RFC 2822 timestamps.
fn parse_published(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn looks_like_xml(bytes: &[u8], content_type: Option<&str>) -> bool {
    if content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("xml")) {
        return true;
    }
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'<')
}

/// Parse a preview response body.
pub fn parse_preview_body(bytes: &[u8], content_type: Option<&str>) -> Result<FeedPreview> {
    if bytes.len() as u64 > MAX_PREVIEW_SIZE {
        return Err(ScoutError::Preview(format!(
            "preview too large: {} bytes (max {} bytes)",
            bytes.len(),
            MAX_PREVIEW_SIZE
        )));
    }

    if looks_like_xml(bytes, content_type) {
        return parse_feed(bytes);
    }

    let envelope: PreviewEnvelope = serde_json::from_slice(bytes)
        .map_err(|e| ScoutError::Preview(format!("invalid preview JSON: {e}")))?;

    if let Some(error) = envelope.error {
        return Err(ScoutError::Preview(error));
    }

    let data = envelope
        .data
        .ok_or_else(|| ScoutError::Preview("preview response has no data".to_string()))?;

    Ok(FeedPreview {
        title: data
            .feed
            .and_then(|f| f.title)
            .map(|t| plain_text(&t))
            .filter(|t| !t.is_empty()),
        entries: data
            .entries
            .into_iter()
            .filter_map(WireEntry::into_entry)
            .collect(),
    })
}

/// Parse raw RSS/Atom bytes into a preview.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedPreview> {
    let feed = parser::parse(bytes)
        .map_err(|e| ScoutError::Preview(format!("failed to parse feed: {}", e)))?;

    let title = feed
        .title
        .map(|t| plain_text(&t.content))
        .filter(|t| !t.is_empty());

    let entries = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry
                .links
                .iter()
                .find_map(|l| usable_link(&l.href))?;
            let title = entry
                .title
                .map(|t| plain_text(&t.content))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| UNTITLED_ENTRY.to_string());
            Some(Entry {
                title,
                link,
                published_at: entry.published.or(entry.updated),
            })
        })
        .collect();

    Ok(FeedPreview { title, entries })
}

/// Plain text of an HTML fragment: tags dropped, entities decoded,
/// whitespace collapsed.
fn plain_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(open) = rest.find('<') {
        text.push_str(&rest[..open]);
        // An unterminated tag swallows the remainder.
        rest = match rest[open..].find('>') {
            Some(close) => &rest[open + close + 1..],
            None => "",
        };
    }
    text.push_str(rest);

    decode_entities(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        let decoded = tail.find(';').and_then(|end| {
            let name = &tail[..end];
            let valid = !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '#');
            valid.then(|| entity_char(name)).flatten().map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Character for a named or numeric (`#65`, `#x41`) entity.
fn entity_char(name: &str) -> Option<char> {
    let code = match name {
        "amp" => return Some('&'),
        "lt" => return Some('<'),
        "gt" => return Some('>'),
        "quot" => return Some('"'),
        "apos" => return Some('\''),
        "nbsp" => return Some(' '),
        _ => {
            let digits = name.strip_prefix('#')?;
            match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse().ok()?,
            }
        }
    };
    char::from_u32(code)
}
