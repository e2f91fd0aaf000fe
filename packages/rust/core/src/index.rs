//! Header index builder.
//!
//! Lists every page of a run with a short excerpt so the set can be browsed
//! from one note (`headers_{start}.md`).

use tracing::{debug, instrument};

use chatsplit_shared::{HeaderEntry, HeaderIndex, Page, TURN_MARKER};

use crate::assembler::{header_name, join_queries};

/// Longest excerpt kept before truncation, in characters.
pub const EXCERPT_LEN: usize = 80;

/// Build the header index for assembled pages.
#[instrument(skip_all, fields(pages = pages.len(), start = start_number))]
pub fn build_header_index(pages: &[Page], start_number: u32) -> HeaderIndex {
    let entries: Vec<HeaderEntry> = pages
        .iter()
        .map(|page| HeaderEntry {
            position: page.position,
            link: page.name.clone(),
            queries: page.queries.clone(),
            excerpt: excerpt(&page.body),
        })
        .collect();

    debug!(entries = entries.len(), "header index built");

    HeaderIndex {
        name: header_name(start_number),
        start_number,
        entries,
    }
}

/// First meaningful line of a page body.
///
/// Blank lines and turn marker lines are skipped, a block-quote prefix is
/// stripped, and the result is cut to [`EXCERPT_LEN`] characters followed by
/// `...` when longer.
pub fn excerpt(body: &str) -> String {
    let Some(line) = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(TURN_MARKER))
        .map(|line| line.trim_start_matches('>').trim())
        .find(|line| !line.is_empty())
    else {
        return String::new();
    };

    if line.chars().count() <= EXCERPT_LEN {
        return line.to_string();
    }

    let cut: String = line.chars().take(EXCERPT_LEN).collect();
    format!("{}...", cut.trim_end())
}

/// Render the header index note.
///
/// ```text
/// # headers_1
///
/// - [[page 001]] (1) · queries 1, 4 · How do I read a file?
/// - [[page 002]] (2) · Compare the options
/// ```
pub fn render_header_index(index: &HeaderIndex) -> String {
    let mut out = format!("# {}\n\n", index.name);

    for entry in &index.entries {
        out.push_str(&format!("- [[{}]] ({})", entry.link, entry.position));
        if let Some(queries) = &entry.queries {
            out.push_str(&format!(" · queries {}", join_queries(queries)));
        }
        if !entry.excerpt.is_empty() {
            out.push_str(&format!(" · {}", entry.excerpt));
        }
        out.push('\n');
    }

    out
}
