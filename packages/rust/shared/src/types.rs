//! Core domain types for chatsplit conversions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Canonical callout line that opens every conversation turn.
///
/// Inserted by the normalizer and used by the segmenter as the split point.
/// Nothing else in the normalized text may contain this sequence.
pub const TURN_MARKER: &str = "> [!important] Question:";

// ---------------------------------------------------------------------------
// Turn
// ---------------------------------------------------------------------------

/// One question/answer exchange from the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    /// 1-based position in source order.
    pub index: usize,
    /// Markdown following the turn marker (question quote + answer).
    pub content: String,
    /// False only for the implicit turn of a text with no turn markers.
    pub has_marker: bool,
}

impl Turn {
    /// The turn as it appears in the normalized text, marker included.
    pub fn to_markdown(&self) -> String {
        if self.has_marker {
            format!("{TURN_MARKER}{}", self.content)
        } else {
            self.content.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// RangeGroup
// ---------------------------------------------------------------------------

/// A resolved group of turn indices: distinct and ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RangeGroup(Vec<usize>);

impl RangeGroup {
    /// Build a group from indices in any order; duplicates collapse.
    pub fn from_indices(indices: impl IntoIterator<Item = usize>) -> Self {
        let set: BTreeSet<usize> = indices.into_iter().collect();
        Self(set.into_iter().collect())
    }

    /// Group holding a single turn index.
    pub fn single(index: usize) -> Self {
        Self(vec![index])
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<usize>> for RangeGroup {
    fn from(indices: Vec<usize>) -> Self {
        Self::from_indices(indices)
    }
}

// ---------------------------------------------------------------------------
// Keyword
// ---------------------------------------------------------------------------

/// Middle dot used inside tag labels in place of spaces.
const TAG_SEPARATOR: &str = "·";

/// A configured keyword: the phrase searched for and the tag it produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Keyword {
    /// Lowercased phrase matched as a substring of page content.
    pub match_phrase: String,
    /// Tag label rendered as `#label`.
    pub tag_label: String,
}

impl Keyword {
    /// Canonicalize a raw configured phrase such as `dev/ml/machine·learning`.
    ///
    /// Everything up to the last `/` is a grouping path and is dropped. The
    /// label keeps middle dots and turns whitespace into middle dots; the match
    /// phrase turns middle dots and underscores into spaces.
    ///
    /// Returns `None` when nothing usable remains.
    pub fn from_raw(raw: &str) -> Option<Self> {
        let name = raw.trim();
        let name = name.rsplit_once('/').map_or(name, |(_, tail)| tail).trim();
        if name.is_empty() {
            return None;
        }

        let tag_label = name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(TAG_SEPARATOR);

        let match_phrase = name
            .replace(TAG_SEPARATOR, " ")
            .replace('_', " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        if match_phrase.is_empty() {
            return None;
        }

        Some(Self {
            match_phrase,
            tag_label,
        })
    }
}

// ---------------------------------------------------------------------------
// Replacement
// ---------------------------------------------------------------------------

/// A literal `find -> replace` substitution applied during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub find: String,
    pub replace: String,
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// Navigation targets of a page, as link names (no `.md` suffix).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavLinks {
    pub previous: Option<String>,
    pub header: String,
    pub next: Option<String>,
}

/// One output page assembled from a single range group.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    /// Display position (group ordinal + start number).
    pub position: u32,
    /// Link name, e.g. `page 007`. The file is `{name}.md`.
    pub name: String,
    /// Source turn indices, recorded only when grouping was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queries: Option<Vec<usize>>,
    /// Matched tag labels in keyword-table order.
    pub tags: Vec<String>,
    /// Rendered, width-wrapped tag block.
    pub tag_block: String,
    pub nav: NavLinks,
    /// Concatenated turn Markdown.
    pub body: String,
}

// ---------------------------------------------------------------------------
// HeaderIndex
// ---------------------------------------------------------------------------

/// A single line of the header index.
#[derive(Debug, Clone, Serialize)]
pub struct HeaderEntry {
    pub position: u32,
    /// Link name of the page.
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queries: Option<Vec<usize>>,
    /// Short identifying text taken from the page body.
    pub excerpt: String,
}

/// Listing of every page produced by one run (`headers_{start}.md`).
#[derive(Debug, Clone, Serialize)]
pub struct HeaderIndex {
    /// Link name, e.g. `headers_1`.
    pub name: String,
    pub start_number: u32,
    pub entries: Vec<HeaderEntry>,
}

// ---------------------------------------------------------------------------
// Warning
// ---------------------------------------------------------------------------

/// Category of a tolerated input problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A group referenced a turn that does not exist.
    IndexOutOfRange,
    /// Every index of a group was dropped, so the group was dropped too.
    EmptyGroup,
    /// The start number was not a positive integer; the default was used.
    InvalidStartNumber,
    /// The document contained no recognizable turns.
    NoTurnsFound,
}

/// A tolerated problem reported alongside a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
