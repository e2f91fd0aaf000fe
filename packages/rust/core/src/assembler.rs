//! Page assembler.
//!
//! Merges turns into pages, one page per range group, and links the pages
//! to each other and to the header index.

use tracing::{debug, instrument, warn};

use chatsplit_shared::{NavLinks, Page, RangeGroup, Turn, Warning, WarningKind};

/// Start number used when none (or an unusable one) is given.
pub const DEFAULT_START_NUMBER: u32 = 1;

/// Settings shared by every page of one assembly.
#[derive(Debug, Clone)]
pub struct AssembleConfig {
    /// Position of the first page.
    pub start_number: u32,
    /// Page name prefix, e.g. `page` -> `page 001`.
    pub name_template: String,
    /// Whether the user supplied a range expression. Grouped pages record
    /// the turns they were built from.
    pub grouped: bool,
}

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// Link name of the page at `position`.
pub fn page_name(template: &str, position: u32) -> String {
    format!("{template} {position:03}")
}

/// Link name of the header index for a run starting at `start_number`.
pub fn header_name(start_number: u32) -> String {
    format!("headers_{start_number}")
}

/// Resolve the user's start number text.
///
/// Blank text silently means [`DEFAULT_START_NUMBER`]. Anything that is not
/// a positive integer also falls back to it, with a warning.
pub fn resolve_start_number(raw: &str) -> (u32, Option<Warning>) {
    let raw = raw.trim();
    if raw.is_empty() {
        return (DEFAULT_START_NUMBER, None);
    }

    match raw.parse::<u32>() {
        Ok(n) if n > 0 => (n, None),
        _ => {
            let message = format!(
                "start number {raw:?} is not a positive integer, using {DEFAULT_START_NUMBER}"
            );
            warn!("{message}");
            (
                DEFAULT_START_NUMBER,
                Some(Warning::new(WarningKind::InvalidStartNumber, message)),
            )
        }
    }
}

/// Keep the last page position representable.
///
/// When `start_number + page_count - 1` overflows `u32`, the run restarts at
/// [`DEFAULT_START_NUMBER`] with a warning.
pub fn fit_start_number(start_number: u32, page_count: usize) -> (u32, Option<Warning>) {
    let span = u32::try_from(page_count.saturating_sub(1)).unwrap_or(u32::MAX);
    if start_number.checked_add(span).is_some() {
        return (start_number, None);
    }

    let message = format!(
        "start number {start_number} leaves no room for {page_count} pages, using {DEFAULT_START_NUMBER}"
    );
    warn!("{message}");
    (
        DEFAULT_START_NUMBER,
        Some(Warning::new(WarningKind::InvalidStartNumber, message)),
    )
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Build one page per group, in group order.
///
/// An empty `groups` list means one page per turn. Groups must already be
/// resolved against `turns` (see [`crate::ranges::resolve_groups`]); an
/// index with no matching turn is skipped. Tags are left empty for the tag
/// matcher to fill in. Positions saturate at `u32::MAX`; callers fit the
/// start number first with [`fit_start_number`].
#[instrument(skip_all, fields(turns = turns.len(), groups = groups.len(), start = config.start_number))]
pub fn assemble(turns: &[Turn], groups: &[RangeGroup], config: &AssembleConfig) -> Vec<Page> {
    let singletons: Vec<RangeGroup>;
    let groups = if groups.is_empty() {
        singletons = turns.iter().map(|t| RangeGroup::single(t.index)).collect();
        &singletons
    } else {
        groups
    };

    let header = header_name(config.start_number);
    let last = groups.len().saturating_sub(1);
    let position_of = |ordinal: usize| {
        let offset = u32::try_from(ordinal).unwrap_or(u32::MAX);
        config.start_number.saturating_add(offset)
    };

    let pages: Vec<Page> = groups
        .iter()
        .enumerate()
        .map(|(ordinal, group)| {
            let position = position_of(ordinal);
            let nav = NavLinks {
                previous: (ordinal > 0)
                    .then(|| page_name(&config.name_template, position_of(ordinal - 1))),
                header: header.clone(),
                next: (ordinal < last)
                    .then(|| page_name(&config.name_template, position_of(ordinal + 1))),
            };

            Page {
                position,
                name: page_name(&config.name_template, position),
                queries: config.grouped.then(|| group.indices().to_vec()),
                tags: Vec::new(),
                tag_block: String::new(),
                nav,
                body: merge_turns(turns, group),
            }
        })
        .collect();

    debug!(pages = pages.len(), "pages assembled");
    pages
}

/// Turn Markdown for every index of the group, separated by a blank line.
fn merge_turns(turns: &[Turn], group: &RangeGroup) -> String {
    group
        .indices()
        .iter()
        .filter_map(|&index| turns.iter().find(|t| t.index == index))
        .map(|turn| turn.to_markdown().trim_matches('\n').to_string())
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render the navigation line, e.g.
/// `[[page 001|previous]] · [[headers_1|headers]] · [[page 003|next]]`.
pub fn render_nav(nav: &NavLinks) -> String {
    let mut links = Vec::with_capacity(3);
    if let Some(prev) = &nav.previous {
        links.push(format!("[[{prev}|previous]]"));
    }
    links.push(format!("[[{}|headers]]", nav.header));
    if let Some(next) = &nav.next {
        links.push(format!("[[{next}|next]]"));
    }
    links.join(" · ")
}

/// Comma-separated turn list, e.g. `1, 4`.
pub(crate) fn join_queries(queries: &[usize]) -> String {
    queries
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render the complete file content of a page.
///
/// ```text
///
/// ---
/// Queries included: 1, 4
/// [[page 001|previous]] · [[headers_1|headers]] · [[page 003|next]]
///
/// ---
/// #rust #server
///
/// ---
///
/// <body>
/// ```
///
/// Text lines are followed by a blank line before each rule so the rule is
/// never read as a setext underline. Without tags the two rules around the
/// tag block are still separated by one blank line.
pub fn render_page(page: &Page) -> String {
    let mut out = String::from("\n---\n");

    if let Some(queries) = &page.queries {
        out.push_str(&format!("Queries included: {}\n", join_queries(queries)));
    }
    out.push_str(&render_nav(&page.nav));
    out.push_str("\n\n---\n");

    if page.tag_block.is_empty() {
        out.push('\n');
    } else {
        out.push_str(&page.tag_block);
        out.push_str("\n\n");
    }
    out.push_str("---\n\n");

    out.push_str(&page.body);
    out.push('\n');
    out
}
