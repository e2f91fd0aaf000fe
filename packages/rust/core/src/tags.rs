//! Keyword tagging.

use chatsplit_shared::{Keyword, TURN_MARKER};

/// Tags found in one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMatch {
    /// Matched labels in keyword-table order.
    pub labels: Vec<String>,
    /// `#label` tags, at most `wrap_width` per line.
    pub block: String,
}

/// Match keywords against page content, case-insensitively.
///
/// Turn marker text is not searched. A `wrap_width` of 0 puts every tag on
/// one line.
pub fn match_tags(content: &str, keywords: &[Keyword], wrap_width: usize) -> TagMatch {
    let haystack = content
        .lines()
        .map(|line| line.trim_start().strip_prefix(TURN_MARKER).unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase();

    let labels: Vec<String> = keywords
        .iter()
        .filter(|kw| haystack.contains(&kw.match_phrase))
        .map(|kw| kw.tag_label.clone())
        .collect();

    let tags: Vec<String> = labels.iter().map(|l| format!("#{l}")).collect();
    let per_line = if wrap_width == 0 { tags.len().max(1) } else { wrap_width };

    let block = tags
        .chunks(per_line)
        .map(|line| line.join(" "))
        .collect::<Vec<_>>()
        .join("\n");

    TagMatch { labels, block }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords(raw: &[&str]) -> Vec<Keyword> {
        raw.iter().filter_map(|r| Keyword::from_raw(r)).collect()
    }

    #[test]
    fn matches_case_insensitively() {
        let kws = keywords(&["infra/Server"]);
        let found = match_tags("my SERVER crashed", &kws, 5);
        assert_eq!(found.labels, vec!["Server"]);
        assert_eq!(found.block, "#Server");
    }

    #[test]
    fn multi_word_phrase_matches_spaced_text() {
        let kws = keywords(&["ml/machine·learning", "lang/type_inference"]);
        let found = match_tags("Type inference meets machine learning.", &kws, 5);
        assert_eq!(found.labels, vec!["machine·learning", "type_inference"]);
    }

    #[test]
    fn labels_keep_keyword_order() {
        let kws = keywords(&["zeta", "alpha", "mid"]);
        let found = match_tags("alpha mid zeta", &kws, 0);
        assert_eq!(found.block, "#zeta #alpha #mid");
    }

    #[test]
    fn block_wraps_at_width() {
        let kws = keywords(&["a1", "b2", "c3", "d4", "e5"]);
        let found = match_tags("a1 b2 c3 d4 e5", &kws, 2);
        assert_eq!(found.block, "#a1 #b2\n#c3 #d4\n#e5");
    }

    #[test]
    fn turn_marker_text_is_not_matched() {
        let kws = keywords(&["question", "important"]);
        let body = format!("{TURN_MARKER}\n> How do sockets work?\n\nThey pass bytes.");
        let found = match_tags(&body, &kws, 5);
        assert!(found.labels.is_empty(), "{found:?}");

        let body = format!("{TURN_MARKER}\n> One more question\n\nSure.");
        let found = match_tags(&body, &kws, 5);
        assert_eq!(found.labels, vec!["question"]);

        let found = match_tags(&format!("{TURN_MARKER} inline question"), &kws, 5);
        assert_eq!(found.labels, vec!["question"]);
    }

    #[test]
    fn no_match_gives_empty_block() {
        let kws = keywords(&["server"]);
        let found = match_tags("nothing relevant", &kws, 0);
        assert!(found.labels.is_empty());
        assert_eq!(found.block, "");
    }
}
