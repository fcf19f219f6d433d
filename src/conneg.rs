//! Content negotiation for output nodes.

use std::fmt;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const TEXT_HTML: &str = "text/html; charset=utf-8";
pub const APPLICATION_JSON: &str = "application/json";

/// A way an output node can write an action result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaWriter {
    Html,
    Text,
    Json,
    /// Writes asset bytes with the asset's own content type.
    Raw,
}

impl MediaWriter {
    /// Media type matched against `Accept`; `None` for raw assets.
    pub fn media_type(self) -> Option<&'static str> {
        match self {
            Self::Html => Some("text/html"),
            Self::Text => Some("text/plain"),
            Self::Json => Some("application/json"),
            Self::Raw => None,
        }
    }

    /// Full `Content-Type` value written with the output.
    pub fn content_type(self) -> Option<&'static str> {
        match self {
            Self::Html => Some(TEXT_HTML),
            Self::Text => Some(TEXT_PLAIN),
            Self::Json => Some(APPLICATION_JSON),
            Self::Raw => None,
        }
    }

    fn accepts(self, range: &MediaRange<'_>) -> bool {
        let Some(media_type) = self.media_type() else {
            return true;
        };
        let (kind, subtype) = media_type.split_once('/').unwrap_or((media_type, "*"));
        (range.kind == "*" || range.kind.eq_ignore_ascii_case(kind))
            && (range.subtype == "*" || range.subtype.eq_ignore_ascii_case(subtype))
    }

    fn refused_by(self, refused: &[&MediaRange<'_>]) -> bool {
        self.media_type().is_some() && refused.iter().any(|range| self.accepts(range))
    }
}

impl fmt::Display for MediaWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Html => "html",
            Self::Text => "text",
            Self::Json => "json",
            Self::Raw => "raw",
        };
        f.write_str(name)
    }
}

#[derive(Debug, PartialEq)]
struct MediaRange<'a> {
    kind: &'a str,
    subtype: &'a str,
    quality: f32,
}

fn parse_accept(header: &str) -> Vec<MediaRange<'_>> {
    let mut ranges: Vec<MediaRange<'_>> = header
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.split(';').map(str::trim);
            let media = pieces.next().filter(|m| !m.is_empty())?;
            let (kind, subtype) = media.split_once('/').unwrap_or((media, "*"));
            let quality = pieces
                .filter_map(|param| param.strip_prefix("q="))
                .find_map(|q| q.parse::<f32>().ok())
                .unwrap_or(1.0);
            Some(MediaRange {
                kind: kind.trim(),
                subtype: subtype.trim(),
                quality,
            })
        })
        .collect();
    // Stable sort keeps header order among equal weights.
    ranges.sort_by(|a, b| b.quality.total_cmp(&a.quality));
    ranges
}

/// Pick the writer for a request.
///
/// Without an `Accept` header the first writer wins. Otherwise media ranges
/// are tried by descending quality and each is matched against the writers
/// in their preference order. `None` means nothing acceptable (406).
pub fn negotiate(writers: &[MediaWriter], accept: Option<&str>) -> Option<MediaWriter> {
    let accept = accept.map(str::trim).filter(|value| !value.is_empty());
    let Some(accept) = accept else {
        return writers.first().copied();
    };

    let ranges = parse_accept(accept);
    let (accepted, refused): (Vec<_>, Vec<_>) =
        ranges.iter().partition(|range| range.quality > 0.0);

    accepted.iter().find_map(|range| {
        writers
            .iter()
            .copied()
            .find(|writer| writer.accepts(range) && !writer.refused_by(&refused))
    })
}
