//! Range expression parsing.
//!
//! Grammar (whitespace is ignored):
//!
//! ```text
//! expr  := item ("," item)*
//! item  := term | "(" term ("," term)* ")"
//! term  := N | N "-" N
//! ```
//!
//! Every top-level item becomes one [`RangeGroup`], so `1-3,(8,11-13),5`
//! yields `[1,2,3] [8,11,12,13] [5]`.

use std::ops::RangeInclusive;

use tracing::{debug, instrument, warn};

use chatsplit_shared::{ChatsplitError, RangeGroup, Result, Warning, WarningKind};

/// Widest range a single `A-B` term may cover.
pub const MAX_RANGE_SPAN: usize = 10_000;

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a range expression into groups in order of appearance.
///
/// A blank expression means "no grouping" and yields an empty list.
#[instrument(skip_all, fields(expr = %expr))]
pub fn parse(expr: &str) -> Result<Vec<RangeGroup>> {
    let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Ok(Vec::new());
    }

    let groups = split_items(&compact)?
        .into_iter()
        .map(parse_item)
        .collect::<Result<Vec<_>>>()?;

    debug!(groups = groups.len(), "range expression parsed");
    Ok(groups)
}

/// Split at top-level commas, checking parentheses on the way.
fn split_items(expr: &str) -> Result<Vec<&str>> {
    let mut items = Vec::new();
    let mut open_at: Option<usize> = None;
    let mut start = 0;

    for (i, c) in expr.char_indices() {
        match c {
            '(' => {
                if open_at.is_some() {
                    return Err(ChatsplitError::parse(format!(
                        "nested parenthesis at position {} in {expr:?}",
                        i + 1
                    )));
                }
                open_at = Some(i);
            }
            ')' => {
                if open_at.take().is_none() {
                    return Err(ChatsplitError::parse(format!(
                        "unmatched ')' at position {} in {expr:?}",
                        i + 1
                    )));
                }
            }
            ',' if open_at.is_none() => {
                items.push(&expr[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if let Some(i) = open_at {
        return Err(ChatsplitError::parse(format!(
            "unclosed '(' at position {} in {expr:?}",
            i + 1
        )));
    }

    items.push(&expr[start..]);
    Ok(items)
}

fn parse_item(item: &str) -> Result<RangeGroup> {
    if item.is_empty() {
        return Err(ChatsplitError::parse("empty item (stray comma?)"));
    }

    let Some(inner) = item.strip_prefix('(') else {
        if item.contains(')') {
            return Err(ChatsplitError::parse(format!(
                "unexpected ')' in {item:?}"
            )));
        }
        return Ok(RangeGroup::from_indices(parse_term(item)?));
    };

    let Some(inner) = inner.strip_suffix(')') else {
        return Err(ChatsplitError::parse(format!(
            "text after closing ')' in {item:?}"
        )));
    };
    if inner.is_empty() {
        return Err(ChatsplitError::parse("empty group '()'"));
    }

    let mut indices = Vec::new();
    for term in inner.split(',') {
        if term.is_empty() {
            return Err(ChatsplitError::parse(format!("empty item in {item:?}")));
        }
        indices.extend(parse_term(term)?);
    }
    Ok(RangeGroup::from_indices(indices))
}

/// `N` or `A-B` as an inclusive range.
fn parse_term(term: &str) -> Result<RangeInclusive<usize>> {
    let Some((from, to)) = term.split_once('-') else {
        let n = parse_index(term, term)?;
        return Ok(n..=n);
    };

    let from = parse_index(from, term)?;
    let to = parse_index(to, term)?;

    if to < from {
        return Err(ChatsplitError::parse(format!(
            "descending range {term:?}: end must not be below start"
        )));
    }
    if to - from >= MAX_RANGE_SPAN {
        return Err(ChatsplitError::parse(format!(
            "range {term:?} spans more than {MAX_RANGE_SPAN} turns"
        )));
    }

    Ok(from..=to)
}

fn parse_index(token: &str, term: &str) -> Result<usize> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ChatsplitError::parse(format!(
            "{token:?} in {term:?} is not a number"
        )));
    }
    token
        .parse()
        .map_err(|_| ChatsplitError::parse(format!("{token:?} is too large")))
}

// ---------------------------------------------------------------------------
// Resolution against a turn count
// ---------------------------------------------------------------------------

/// Drop indices outside `1..=turn_count`, then drop groups left empty.
///
/// Each dropped index and group is reported as a [`Warning`]; the remaining
/// groups keep their order.
pub fn resolve_groups(
    groups: &[RangeGroup],
    turn_count: usize,
) -> (Vec<RangeGroup>, Vec<Warning>) {
    let mut resolved = Vec::with_capacity(groups.len());
    let mut warnings = Vec::new();

    for (ordinal, group) in groups.iter().enumerate() {
        let (kept, dropped): (Vec<usize>, Vec<usize>) = group
            .indices()
            .iter()
            .copied()
            .partition(|i| (1..=turn_count).contains(i));

        for index in dropped {
            let message = format!(
                "group {}: turn {index} does not exist ({turn_count} turns found)",
                ordinal + 1
            );
            warn!("{message}");
            warnings.push(Warning::new(WarningKind::IndexOutOfRange, message));
        }

        if kept.is_empty() {
            let message = format!("group {} has no existing turns, skipped", ordinal + 1);
            warn!("{message}");
            warnings.push(Warning::new(WarningKind::EmptyGroup, message));
            continue;
        }

        resolved.push(RangeGroup::from_indices(kept));
    }

    (resolved, warnings)
}
