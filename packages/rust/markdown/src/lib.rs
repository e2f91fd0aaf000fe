//! HTML-to-Markdown normalization for exported chat conversations.
//!
//! Converts the decoded HTML of a saved conversation page to Markdown using
//! the `htmd` crate, then applies the repair passes in [`cleanup`] that fix
//! converter artifacts and insert the turn markers the segmenter splits on.

mod cleanup;

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, instrument};

use chatsplit_shared::{ChatsplitError, Replacement, Result, TURN_MARKER};

/// Tags dropped entirely by the converter.
const SKIP_TAGS: [&str; 6] = ["script", "style", "nav", "iframe", "noscript", "svg"];

/// Content containers tried in priority order before falling back to `<body>`.
const CONTENT_SELECTORS: [&str; 3] = ["main", "[role=\"main\"]", "body"];

/// Prefix of the paragraph that stands in for a table during conversion.
const TABLE_PLACEHOLDER: &str = "CHATSPLITTABLE";

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Convert conversation HTML to repaired Markdown.
///
/// This is the main entry point. It:
/// 1. Narrows the document to its main content container
/// 2. Pre-renders HTML tables into soft-wrapped text tables
/// 3. Converts HTML → Markdown via `htmd`
/// 4. Runs the repair pipeline (fences, substitutions, turn markers, tables,
///    trim, de-indent)
///
/// A document without recognizable turns is not an error: the result simply
/// contains no turn markers.
#[instrument(skip_all, fields(html_len = html.len(), replacements = replacements.len()))]
pub fn normalize(html: &str, replacements: &[Replacement]) -> Result<String> {
    // Step 1 + 2: Extract content and swap tables for placeholders
    let prepared = prepare_html(html);

    // Step 3: Convert HTML → Markdown using htmd
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();

    let mut raw_markdown = converter
        .convert(&prepared.content_html)
        .map_err(|e| ChatsplitError::Conversion(format!("htmd conversion failed: {e}")))?;

    // Highest index first so `..TABLE1` never clobbers the prefix of `..TABLE10`.
    for (n, table) in prepared.tables.iter().enumerate().rev() {
        raw_markdown = raw_markdown.replace(&table_placeholder(n), table);
    }

    debug!(
        raw_len = raw_markdown.len(),
        tables = prepared.tables.len(),
        "htmd conversion complete"
    );

    // Step 4: Run repair pipeline
    let normalized = cleanup::run_pipeline(&raw_markdown, replacements);

    debug!(
        final_len = normalized.len(),
        turns = normalized.matches(TURN_MARKER).count(),
        "normalization complete"
    );

    Ok(normalized)
}

// ---------------------------------------------------------------------------
// HTML preparation
// ---------------------------------------------------------------------------

/// Content HTML ready for conversion, with tables replaced by placeholders.
struct PreparedHtml {
    content_html: String,
    /// Rendered tables, indexed by placeholder number.
    tables: Vec<String>,
}

fn table_placeholder(n: usize) -> String {
    format!("{TABLE_PLACEHOLDER}{n}")
}

/// Extract the main content HTML and pre-render its tables.
///
/// `htmd` 0.1 doesn't support table conversion, so each table is rendered to
/// text here and swapped back in after conversion. The table HTML is located
/// in the serialized container by its own serialization, which always matches
/// because both come from the same parsed tree.
fn prepare_html(html: &str) -> PreparedHtml {
    static TABLE_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("table").expect("valid selector"));

    let doc = Html::parse_document(html);

    let Some(root) = find_content_root(&doc) else {
        return PreparedHtml {
            content_html: html.to_string(),
            tables: Vec::new(),
        };
    };

    let mut content_html = root.inner_html();
    let mut tables = Vec::new();

    for table in root.select(&TABLE_SEL) {
        let table_html = table.html();
        if !content_html.contains(&table_html) {
            // Nested inside a table already replaced.
            continue;
        }
        let placeholder = format!("<p>{}</p>", table_placeholder(tables.len()));
        content_html = content_html.replacen(&table_html, &placeholder, 1);
        tables.push(render_table(&table));
    }

    PreparedHtml {
        content_html,
        tables,
    }
}

/// Find the element holding the conversation, falling back to `<body>`.
fn find_content_root(doc: &Html) -> Option<ElementRef<'_>> {
    CONTENT_SELECTORS.iter().find_map(|sel_str| {
        let selector = Selector::parse(sel_str).ok()?;
        doc.select(&selector).next()
    })
}

/// Render a table in the converter's soft-wrapped text form.
///
/// ```text
/// Name | Notes
/// ---|---
/// foo | first
/// part
///   (a line of exactly two spaces closes the table)
/// ```
///
/// Every logical row ends in two spaces; line breaks inside a cell are kept
/// as raw newlines, leaving continuation lines for the reflow pass to join.
fn render_table(table: &ElementRef) -> String {
    static TR_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
    static CELL_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("th, td").expect("valid selector"));

    let rows: Vec<Vec<String>> = table
        .select(&TR_SEL)
        .map(|tr| tr.select(&CELL_SEL).map(|cell| cell_text(&cell)).collect::<Vec<_>>())
        .filter(|cells| !cells.is_empty())
        .collect();

    let col_count = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    if col_count == 0 {
        return String::new();
    }

    let mut md = String::from("\n\n");

    for (i, row) in rows.iter().enumerate() {
        let mut cells = row.clone();
        cells.resize(col_count, String::new());
        md.push_str(&cells.join(" | "));
        md.push_str("  \n");

        if i == 0 {
            md.push_str(&vec!["---"; col_count].join("|"));
            md.push('\n');
        }
    }

    md.push_str("  \n\n");
    md
}

/// Cell text with whitespace collapsed, keeping `<br>` and block breaks as
/// newlines.
fn cell_text(cell: &ElementRef) -> String {
    let mut raw = String::new();

    for node in cell.descendants() {
        match node.value() {
            Node::Text(text) => raw.push_str(&text.replace('\n', " ")),
            Node::Element(el) if matches!(el.name(), "br" | "p" | "div" | "li") => {
                raw.push('\n');
            }
            _ => {}
        }
    }

    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
