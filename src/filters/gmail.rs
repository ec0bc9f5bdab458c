//! Gmail compose filter
//!
//! Converts the tiny subset of HTML used by gmail's "plain text"
//! compose window into actual plain text and back. Empirically enough
//! to edit a compose body, but somewhat fragile: only the handful of
//! tags gmail emits are translated, anything else is preserved via a
//! guard marker so the round trip stays lossless.

use axum::http::HeaderMap;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::filters::{CodecError, ContentCodec, ContentFilter};

// The "_!!" marker is prepended to literal < and > during decode so
// they stay distinguishable from characters produced by entity
// unescaping; encode strips it while re-escaping.
const REPLACE_HTML: [(&str, &str); 4] = [
    ("<div><br></div>", "\n"),
    ("<br>", "\n"),
    ("<div>", "\n"),
    ("</div>", ""),
];

// ============================================================================
// Filter
// ============================================================================

/// Matches gmail compose requests by source URL and content shape
pub struct GmailFilter;

impl ContentFilter for GmailFilter {
    fn name(&self) -> &'static str {
        "gmail"
    }

    fn matches(
        &self,
        headers: &HeaderMap,
        contents: &str,
    ) -> Result<Option<Arc<dyn ContentCodec>>, CodecError> {
        let Some(raw_url) = headers.get("x-url").and_then(|v| v.to_str().ok()) else {
            return Ok(None);
        };
        let url = Url::parse(raw_url)?;
        debug!("text is from URL: {}", url);

        if url.host_str() == Some("mail.google.com")
            && (contents.contains("<br>") || contents.contains("<div>"))
        {
            return Ok(Some(Arc::new(GmailCodec)));
        }
        Ok(None)
    }
}

// ============================================================================
// Codec
// ============================================================================

/// HTML-subset to plain text codec for gmail compose bodies
pub struct GmailCodec;

impl ContentCodec for GmailCodec {
    fn decode(&self, contents: &str) -> Result<String, CodecError> {
        let mut text = contents.to_string();
        for (before, after) in REPLACE_HTML {
            text = text.replace(before, after);
        }
        // Remaining literal < and > (unknown tags) must stay
        // distinguishable from entities that unescape to < and >
        text = text.replace('<', "_!!<").replace('>', "_!!>");
        Ok(unescape(&text))
    }

    fn encode(&self, contents: &str) -> Result<String, CodecError> {
        let mut text = escape(contents);
        text = text
            .replace("_!!&lt;", "<")
            .replace("_!!&gt;", ">")
            .replace('\n', "<br>");
        Ok(text)
    }
}

/// Escape `&`, `<`, `>` as HTML entities
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Decode HTML character references
///
/// Handles the named entities gmail emits plus numeric references in
/// both forms. Anything unrecognized stays as literal text, which
/// [`escape`] then re-escapes, so the round trip holds either way.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match parse_entity(tail) {
            Some((ch, len)) => {
                out.push(ch);
                rest = &tail[len..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Parse one character reference at the start of `text` (which begins
/// with `&`), returning the decoded character and the byte length
/// consumed
fn parse_entity(text: &str) -> Option<(char, usize)> {
    let semi = text[1..].find(';')? + 1;
    let body = &text[1..semi];
    let ch = if let Some(num) = body.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        char::from_u32(code)?
    } else {
        match body {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            "nbsp" => '\u{a0}',
            _ => return None,
        }
    };
    Some((ch, semi + 1))
}

// ============================================================================
// Tests
// ============================================================================
