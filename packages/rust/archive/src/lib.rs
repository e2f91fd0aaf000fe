//! Extraction of conversation HTML from saved web archives.
//!
//! Browsers save a chat page either as plain HTML or as an MHTML archive (a
//! MIME message bundling the page with its resources). [`extract_html`]
//! accepts both and returns the page HTML as text.

mod mime;

use encoding_rs::Encoding;
use tracing::{debug, instrument, warn};

use chatsplit_shared::{ChatsplitError, Result};

use crate::mime::Entity;

/// Charsets tried after the declared one, in order.
const FALLBACK_CHARSETS: [&str; 2] = ["utf-8", "windows-1251"];

/// Extract the HTML document from archive bytes.
///
/// MIME input yields its first `text/html` part (searching nested
/// multiparts depth-first), with the transfer encoding undone and the text
/// decoded by [`decode_text`]. Input that is not a MIME message is taken to
/// be the HTML itself.
///
/// Fails with [`ChatsplitError::Decode`] when a MIME message holds no HTML
/// part or a part body cannot be decoded.
#[instrument(skip_all, fields(len = bytes.len()))]
pub fn extract_html(bytes: &[u8]) -> Result<String> {
    let entity = match Entity::parse(bytes) {
        Some(entity) if !starts_with_markup(bytes) && entity.content_type().is_some() => entity,
        _ => {
            debug!("input is not a MIME message, reading as bare HTML");
            return Ok(decode_text(bytes, None));
        }
    };

    find_html(&entity)?
        .ok_or_else(|| ChatsplitError::decode("archive contains no text/html part"))
}

fn find_html(entity: &Entity<'_>) -> Result<Option<String>> {
    let Some(content_type) = entity.content_type() else {
        return Ok(None);
    };

    if content_type.is_multipart() {
        let boundary = content_type.param("boundary").ok_or_else(|| {
            ChatsplitError::decode(format!(
                "{} message has no boundary",
                content_type.media_type
            ))
        })?;

        let parts = mime::split_parts(entity.body, boundary);
        debug!(parts = parts.len(), "multipart message");

        for part in parts {
            let Some(part) = Entity::parse(part) else {
                continue;
            };
            if let Some(html) = find_html(&part)? {
                return Ok(Some(html));
            }
        }
        return Ok(None);
    }

    if content_type.media_type != "text/html" {
        return Ok(None);
    }

    let body = entity.decoded_body()?;
    Ok(Some(decode_text(&body, content_type.param("charset"))))
}

fn starts_with_markup(bytes: &[u8]) -> bool {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'<')
}

/// Decode text bytes, trying the declared charset, then UTF-8, then
/// windows-1251, each strictly. If all of them reject the bytes, falls back
/// to lossy UTF-8. A byte order mark overrides everything.
pub fn decode_text(bytes: &[u8], declared: Option<&str>) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        debug!(encoding = encoding.name(), "decoding by byte order mark");
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }

    for label in declared.into_iter().chain(FALLBACK_CHARSETS) {
        let Some(encoding) = Encoding::for_label(label.trim().as_bytes()) else {
            debug!(label, "unknown charset label, skipping");
            continue;
        };
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            debug!(encoding = encoding.name(), "decoded");
            return text.into_owned();
        }
        debug!(encoding = encoding.name(), "bytes rejected");
    }

    warn!("no charset decoded cleanly, using lossy UTF-8");
    String::from_utf8_lossy(bytes).into_owned()
}
