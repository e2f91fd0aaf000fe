//! End-to-end conversion: HTML → normalize → segment → group → assemble → tag.
//!
//! The pipeline is pure: it takes a [`ConversionRequest`] and returns a
//! [`ConversionResult`] holding every page in memory. Writing the result to
//! disk is the job of [`crate::writer`].

use std::time::Instant;

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{info, instrument, warn};

use chatsplit_shared::{
    ChatsplitError, HeaderIndex, Keyword, Page, RangeGroup, Replacement, Result, Turn, Warning,
    WarningKind,
};

use crate::assembler::{self, AssembleConfig};
use crate::{index, ranges, segment, tags};

/// Inputs of one conversion.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Decoded HTML of the conversation page.
    pub document: String,
    /// Grouping expression, e.g. `1-3,(8,11-13),5`. Blank for one page per turn.
    pub range_expression: String,
    pub keywords: Vec<Keyword>,
    /// Literal substitutions applied during normalization.
    pub replacements: Vec<Replacement>,
    /// Page name prefix.
    pub name_template: String,
    /// Start number as typed by the user; resolved leniently.
    pub start_number: String,
    /// Tags per line in the tag block (0 disables wrapping).
    pub tag_wrap_width: usize,
}

impl ConversionRequest {
    /// Request with default settings for `document`.
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            range_expression: String::new(),
            keywords: Vec::new(),
            replacements: Vec::new(),
            name_template: "page".into(),
            start_number: String::new(),
            tag_wrap_width: 5,
        }
    }
}

/// Everything a conversion produced.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    /// Full normalized Markdown (the single-file export).
    pub normalized: String,
    pub turns: Vec<Turn>,
    pub pages: Vec<Page>,
    pub header_index: HeaderIndex,
    /// Start number actually used.
    pub start_number: u32,
    pub warnings: Vec<Warning>,
}

/// A file ready to be written: name relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub name: String,
    pub content: String,
}

impl ConversionResult {
    /// Split-mode files: the header index followed by every page.
    pub fn page_files(&self) -> Vec<OutputFile> {
        let mut files = Vec::with_capacity(self.pages.len() + 1);
        files.push(OutputFile {
            name: format!("{}.md", self.header_index.name),
            content: index::render_header_index(&self.header_index),
        });
        files.extend(self.pages.iter().map(|page| OutputFile {
            name: format!("{}.md", page.name),
            content: assembler::render_page(page),
        }));
        files
    }

    /// Single-file export of the normalized text, named by timestamp.
    pub fn single_file(&self, at: DateTime<Local>) -> OutputFile {
        OutputFile {
            name: format!("exported_file_{}.md", at.format("%Y%m%d_%H%M%S")),
            content: self.normalized.clone(),
        }
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each output file is staged.
    fn file_written(&self, name: &str, current: usize, total: usize);
    /// Called when a conversion completes.
    fn done(&self, result: &ConversionResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn file_written(&self, _name: &str, _current: usize, _total: usize) {}
    fn done(&self, _result: &ConversionResult) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run the full conversion on an HTML document.
///
/// The range expression and name template are checked first, so a malformed
/// request fails before any conversion work is done.
#[instrument(skip_all, fields(html_len = request.document.len(), ranges = %request.range_expression))]
pub fn convert(
    request: &ConversionRequest,
    progress: &dyn ProgressReporter,
) -> Result<ConversionResult> {
    let groups = check_request(request)?;

    progress.phase("Normalizing");
    let normalized = chatsplit_markdown::normalize(&request.document, &request.replacements)?;

    Ok(build(normalized, &groups, request, progress))
}

/// Run the pipeline on text that is already normalized Markdown.
///
/// `request.document` and `request.replacements` are ignored.
#[instrument(skip_all, fields(md_len = markdown.len(), ranges = %request.range_expression))]
pub fn convert_markdown(
    markdown: &str,
    request: &ConversionRequest,
    progress: &dyn ProgressReporter,
) -> Result<ConversionResult> {
    let groups = check_request(request)?;
    Ok(build(markdown.to_string(), &groups, request, progress))
}

fn check_request(request: &ConversionRequest) -> Result<Vec<RangeGroup>> {
    let template = request.name_template.trim();
    if template.is_empty() {
        return Err(ChatsplitError::validation("name template must not be empty"));
    }
    if template.contains(['/', '\\']) {
        return Err(ChatsplitError::validation(format!(
            "name template {template:?} must not contain path separators"
        )));
    }

    ranges::parse(&request.range_expression)
}

fn build(
    normalized: String,
    parsed_groups: &[RangeGroup],
    request: &ConversionRequest,
    progress: &dyn ProgressReporter,
) -> ConversionResult {
    let start = Instant::now();
    let mut warnings = Vec::new();

    let (requested_start, start_warning) = assembler::resolve_start_number(&request.start_number);
    warnings.extend(start_warning);

    // --- Segment ---
    progress.phase("Segmenting turns");
    let turns = segment::segment(&normalized);
    if turns.iter().all(|t| !t.has_marker) {
        let message = if turns.is_empty() {
            "document has no content".to_string()
        } else {
            "no conversation turns found, the whole document becomes one page".to_string()
        };
        warn!("{message}");
        warnings.push(Warning::new(WarningKind::NoTurnsFound, message));
    }

    // --- Group ---
    let grouped = !parsed_groups.is_empty();
    let (groups, group_warnings) = ranges::resolve_groups(parsed_groups, turns.len());
    warnings.extend(group_warnings);

    let page_count = if grouped { groups.len() } else { turns.len() };
    let (start_number, fit_warning) = assembler::fit_start_number(requested_start, page_count);
    warnings.extend(fit_warning);

    // --- Assemble ---
    progress.phase("Assembling pages");
    let config = AssembleConfig {
        start_number,
        name_template: request.name_template.trim().to_string(),
        grouped,
    };
    // Grouping that resolved to nothing must not fall back to one page per turn.
    let mut pages = if grouped && groups.is_empty() {
        Vec::new()
    } else {
        assembler::assemble(&turns, &groups, &config)
    };

    // --- Tag ---
    progress.phase("Tagging pages");
    for page in &mut pages {
        let found = tags::match_tags(&page.body, &request.keywords, request.tag_wrap_width);
        page.tags = found.labels;
        page.tag_block = found.block;
    }

    let header_index = index::build_header_index(&pages, start_number);

    let result = ConversionResult {
        normalized,
        turns,
        pages,
        header_index,
        start_number,
        warnings,
    };

    progress.done(&result);
    info!(
        turns = result.turns.len(),
        pages = result.pages.len(),
        warnings = result.warnings.len(),
        elapsed_ms = start.elapsed().as_millis(),
        "conversion complete"
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsplit_shared::TURN_MARKER;

    fn two_turn_markdown() -> String {
        format!(
            "{TURN_MARKER}\n> What is a server?\n\nA program that answers requests.\n\n\
             {TURN_MARKER}\n> And a client?\n\nThe other side.\n"
        )
    }

    #[test]
    fn end_to_end_two_turns() {
        let request = ConversionRequest::new("");
        let result = convert_markdown(&two_turn_markdown(), &request, &SilentProgress).unwrap();

        assert_eq!(result.turns.len(), 2);
        assert_eq!(result.pages.len(), 2);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);

        let names: Vec<_> = result.page_files().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["headers_1.md", "page 001.md", "page 002.md"]);

        let first = &result.pages[0];
        assert_eq!(first.nav.previous, None);
        assert_eq!(first.nav.next.as_deref(), Some("page 002"));
        assert_eq!(first.nav.header, "headers_1");
        assert_eq!(result.pages[1].nav.previous.as_deref(), Some("page 001"));
        assert_eq!(result.pages[1].nav.next, None);
    }

    #[test]
    fn grouping_and_tags() {
        let mut request = ConversionRequest::new("");
        request.range_expression = "(1,2)".into();
        request.keywords = vec![Keyword::from_raw("infra/Server").unwrap()];
        request.start_number = "4".into();

        let result = convert_markdown(&two_turn_markdown(), &request, &SilentProgress).unwrap();

        assert_eq!(result.start_number, 4);
        assert_eq!(result.pages.len(), 1);
        let page = &result.pages[0];
        assert_eq!(page.name, "page 004");
        assert_eq!(page.queries.as_deref(), Some(&[1, 2][..]));
        assert_eq!(page.tags, vec!["Server"]);

        let files = result.page_files();
        assert_eq!(files[0].name, "headers_4.md");
        assert!(files[1].content.contains("Queries included: 1, 2"));
        assert!(files[1].content.contains("#Server"));
        assert_eq!(files[1].content.matches(TURN_MARKER).count(), 2);
    }

    #[test]
    fn out_of_range_groups_become_warnings() {
        let mut request = ConversionRequest::new("");
        request.range_expression = "2,9".into();

        let result = convert_markdown(&two_turn_markdown(), &request, &SilentProgress).unwrap();
        assert_eq!(result.pages.len(), 1);
        assert_eq!(result.pages[0].queries.as_deref(), Some(&[2][..]));
        assert!(result.warnings.iter().any(|w| w.kind == WarningKind::EmptyGroup));
    }

    #[test]
    fn fully_dropped_grouping_yields_no_pages() {
        let mut request = ConversionRequest::new("");
        request.range_expression = "7,8".into();

        let result = convert_markdown(&two_turn_markdown(), &request, &SilentProgress).unwrap();
        assert!(result.pages.is_empty());
        assert_eq!(result.page_files().len(), 1);
    }

    #[test]
    fn malformed_range_fails_before_conversion() {
        let mut request = ConversionRequest::new("<html><body>x</body></html>");
        request.range_expression = "3-1".into();

        let err = convert(&request, &SilentProgress).unwrap_err();
        assert!(matches!(err, ChatsplitError::Parse { .. }));
    }

    #[test]
    fn empty_template_is_rejected() {
        let mut request = ConversionRequest::new("");
        request.name_template = "  ".into();
        let err = convert_markdown("text", &request, &SilentProgress).unwrap_err();
        assert!(matches!(err, ChatsplitError::Validation { .. }));
    }

    #[test]
    fn bad_start_number_is_a_warning() {
        let mut request = ConversionRequest::new("");
        request.start_number = "abc".into();
        let result = convert_markdown(&two_turn_markdown(), &request, &SilentProgress).unwrap();
        assert_eq!(result.start_number, 1);
        assert_eq!(result.warnings[0].kind, WarningKind::InvalidStartNumber);
    }

    #[test]
    fn start_number_without_room_for_all_pages_restarts_at_one() {
        let mut request = ConversionRequest::new("");
        request.start_number = "4294967295".into();
        let result = convert_markdown(&two_turn_markdown(), &request, &SilentProgress).unwrap();

        assert_eq!(result.start_number, 1);
        assert_eq!(result.pages[0].name, "page 001");
        assert_eq!(result.pages[1].name, "page 002");
        assert_eq!(result.header_index.name, "headers_1");
        assert_eq!(result.warnings[0].kind, WarningKind::InvalidStartNumber);
    }

    #[test]
    fn unmarked_text_is_one_page_with_warning() {
        let request = ConversionRequest::new("");
        let result = convert_markdown("plain notes", &request, &SilentProgress).unwrap();
        assert_eq!(result.pages.len(), 1);
        assert_eq!(result.pages[0].body, "plain notes");
        assert_eq!(result.warnings[0].kind, WarningKind::NoTurnsFound);
    }

    #[test]
    fn single_file_name_uses_timestamp() {
        let request = ConversionRequest::new("");
        let result = convert_markdown(&two_turn_markdown(), &request, &SilentProgress).unwrap();

        let at = chrono::NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(14, 5, 7))
            .and_then(|dt| dt.and_local_timezone(Local).single())
            .unwrap();
        let file = result.single_file(at);
        assert_eq!(file.name, "exported_file_20240309_140507.md");
        assert_eq!(file.content, result.normalized);
    }

    #[test]
    fn convert_html_fixture() {
        let html = std::fs::read_to_string(
            std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("../../../fixtures/html/conversation.html"),
        )
        .unwrap();
        let mut request = ConversionRequest::new(html);
        request.range_expression = "1-2,3".into();
        request.keywords = vec![Keyword::from_raw("server").unwrap()];

        let result = convert(&request, &SilentProgress).unwrap();
        assert_eq!(result.turns.len(), 3);
        assert_eq!(result.pages.len(), 2);
        assert!(result.pages[0].tags.is_empty());
        assert_eq!(result.pages[1].tags, vec!["server"]);
        assert_eq!(
            result.header_index.entries[0].excerpt,
            "How do I read a file in Rust?"
        );

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["start_number"], 1);
    }
}
