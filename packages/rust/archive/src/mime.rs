//! Minimal MIME reader for saved web archives (MHTML).
//!
//! Handles what browsers emit when saving a page: a header block, an optional
//! `multipart/*` body split on a boundary, and `quoted-printable` or `base64`
//! transfer encodings. Headers are read as ASCII; bodies stay as bytes until
//! the charset is known.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use chatsplit_shared::{ChatsplitError, Result};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One MIME entity: the whole message or a single part of it.
#[derive(Debug, Clone)]
pub(crate) struct Entity<'a> {
    pub headers: Vec<(String, String)>,
    pub body: &'a [u8],
}

/// A parsed `Content-Type` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ContentType {
    /// Lowercased `type/subtype`.
    pub media_type: String,
    /// Parameters with lowercased names and unquoted values.
    pub params: Vec<(String, String)>,
}

impl ContentType {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_multipart(&self) -> bool {
        self.media_type.starts_with("multipart/")
    }
}

impl<'a> Entity<'a> {
    /// Split raw bytes into unfolded headers and body.
    ///
    /// Returns `None` when the bytes do not start with a header block.
    pub fn parse(raw: &'a [u8]) -> Option<Self> {
        let (head, body) = split_head(raw)?;
        let head = String::from_utf8_lossy(head);

        let mut headers: Vec<(String, String)> = Vec::new();
        for line in head.lines() {
            if line.starts_with([' ', '\t']) {
                // Folded continuation of the previous header.
                let (_, value) = headers.last_mut()?;
                value.push(' ');
                value.push_str(line.trim());
                continue;
            }
            let (name, value) = line.split_once(':')?;
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return None;
            }
            headers.push((name.to_ascii_lowercase(), value.trim().to_string()));
        }

        Some(Self { headers, body })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<ContentType> {
        self.header("content-type").map(parse_content_type)
    }

    /// Body with the transfer encoding undone.
    pub fn decoded_body(&self) -> Result<Vec<u8>> {
        let encoding = self
            .header("content-transfer-encoding")
            .map(|e| e.trim().to_ascii_lowercase())
            .unwrap_or_default();

        match encoding.as_str() {
            "quoted-printable" => Ok(decode_quoted_printable(self.body)),
            "base64" => decode_base64(self.body),
            _ => Ok(self.body.to_vec()),
        }
    }
}

// ---------------------------------------------------------------------------
// Header parsing
// ---------------------------------------------------------------------------

/// Split at the first empty line (`\r\n\r\n` or `\n\n`).
fn split_head(raw: &[u8]) -> Option<(&[u8], &[u8])> {
    let crlf = find(raw, b"\r\n\r\n", 0).map(|i| (i, i + 4));
    let lf = find(raw, b"\n\n", 0).map(|i| (i, i + 2));

    let (end, body_start) = match (crlf, lf) {
        (Some(a), Some(b)) => a.min(b),
        (a, b) => a.or(b)?,
    };
    Some((&raw[..end], &raw[body_start..]))
}

pub(crate) fn parse_content_type(value: &str) -> ContentType {
    let mut pieces = value.split(';');
    let media_type = pieces
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let params = pieces
        .filter_map(|piece| {
            let (name, value) = piece.split_once('=')?;
            let value = value.trim().trim_matches('"');
            Some((name.trim().to_ascii_lowercase(), value.to_string()))
        })
        .collect();

    ContentType { media_type, params }
}

// ---------------------------------------------------------------------------
// Multipart
// ---------------------------------------------------------------------------

/// Bodies of the parts of a multipart body, in order.
///
/// A delimiter is `--boundary` at the start of a line; `--boundary--` closes
/// the body. Text before the first delimiter is the preamble and is skipped.
pub(crate) fn split_parts<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}").into_bytes();

    let mut starts = Vec::new();
    let mut from = 0;
    while let Some(i) = find(body, &delimiter, from) {
        from = i + delimiter.len();
        if i == 0 || body[i - 1] == b'\n' {
            starts.push(i);
        }
    }

    let mut parts = Vec::new();
    for (n, &at) in starts.iter().enumerate() {
        let after = at + delimiter.len();
        if body[after..].starts_with(b"--") {
            break;
        }

        // The part starts on the line after the delimiter.
        let Some(line_end) = find(body, b"\n", after) else {
            break;
        };
        let content_start = line_end + 1;
        let content_end = starts.get(n + 1).copied().unwrap_or(body.len());
        if content_start > content_end {
            continue;
        }

        // The line break before the next delimiter belongs to the delimiter.
        let mut part = &body[content_start..content_end];
        part = part.strip_suffix(b"\n").unwrap_or(part);
        part = part.strip_suffix(b"\r").unwrap_or(part);
        parts.push(part);
    }

    parts
}

// ---------------------------------------------------------------------------
// Transfer encodings
// ---------------------------------------------------------------------------

/// Undo quoted-printable: `=XX` escapes and `=` soft line breaks.
/// Malformed escapes are kept literally.
pub(crate) fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        let byte = input[i];
        if byte != b'=' {
            out.push(byte);
            i += 1;
            continue;
        }

        let rest = &input[i + 1..];
        if rest.starts_with(b"\r\n") {
            i += 3;
        } else if rest.starts_with(b"\n") {
            i += 2;
        } else if let Some(decoded) = rest.get(..2).and_then(hex_pair) {
            out.push(decoded);
            i += 3;
        } else {
            out.push(byte);
            i += 1;
        }
    }

    out
}

fn hex_pair(pair: &[u8]) -> Option<u8> {
    if !pair.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let text = std::str::from_utf8(pair).ok()?;
    u8::from_str_radix(text, 16).ok()
}

fn decode_base64(input: &[u8]) -> Result<Vec<u8>> {
    let compact: Vec<u8> = input
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    STANDARD
        .decode(&compact)
        .map_err(|e| ChatsplitError::decode(format!("invalid base64 body: {e}")))
}

/// Position of `needle` in `haystack` at or after `from`.
fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}
