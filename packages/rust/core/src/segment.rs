//! Turn segmentation.
//!
//! Splits normalized Markdown on the turn marker inserted by the normalizer.

use tracing::{debug, instrument};

use chatsplit_shared::{TURN_MARKER, Turn};

/// Split normalized Markdown into turns, in source order, indexed from 1.
///
/// Text before the first marker is discarded (the normalizer has already
/// trimmed it). Text with no marker at all becomes a single implicit turn;
/// blank text yields no turns.
#[instrument(skip_all, fields(len = markdown.len()))]
pub fn segment(markdown: &str) -> Vec<Turn> {
    if markdown.trim().is_empty() {
        return Vec::new();
    }

    let mut fragments = markdown.split(TURN_MARKER);
    if let Some(lead) = fragments.next() {
        if !lead.trim().is_empty() {
            debug!(dropped = lead.len(), "discarding text before first turn marker");
        }
    }

    let turns: Vec<Turn> = fragments
        .enumerate()
        .map(|(i, content)| Turn {
            index: i + 1,
            content: content.to_string(),
            has_marker: true,
        })
        .collect();

    if turns.is_empty() {
        debug!("no turn markers, using whole text as one turn");
        return vec![Turn {
            index: 1,
            content: markdown.to_string(),
            has_marker: false,
        }];
    }

    debug!(turns = turns.len(), "segmented");
    turns
}
