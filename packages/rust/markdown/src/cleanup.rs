//! Post-conversion repair pipeline for exported conversations.
//!
//! Each pass is a function `&str -> String` applied in sequence. Order is
//! load-bearing: later passes rely on the shapes produced by earlier ones
//! (fence repair before emphasis escaping, turn markers before the leading
//! trim, and so on).

use std::sync::LazyLock;

use regex::{Captures, Regex};

use chatsplit_shared::{Replacement, TURN_MARKER};

/// UI text the chat page renders next to every code block.
const COPY_MARKERS: [&str; 2] = ["КопироватьРедактировать", "CopyEdit"];

/// Language tag used when a code block has none.
const FALLBACK_LANGUAGE: &str = "text";

/// Substitutions applied after the caller's replacement table.
///
/// The first keeps a tag-like sequence from being swallowed by the note
/// viewer. The second guarantees that only the markers inserted by
/// [`insert_turn_markers`] render as the turn callout.
const FIXED_SUBSTITUTIONS: [(&str, &str); 2] = [
    ("<module>", "<_module_>"),
    ("> [!important]", "> \\[!important]"),
];

/// Run the full repair pipeline on raw converter output.
pub(crate) fn run_pipeline(md: &str, replacements: &[Replacement]) -> String {
    let mut result = md.to_string();

    result = split_glued_copy_markers(&result);
    result = synthesize_missing_languages(&result);
    result = rewrite_copy_blocks(&result);
    result = escape_emphasis_before_fences(&result);
    result = apply_replacements(&result, replacements);
    result = insert_turn_markers(&result);
    result = reflow_tables(&result);
    result = trim_leading_noise(&result);
    result = fix_table_leaders(&result);
    result = dedent_code_blocks(&result);

    result
}

fn copy_marker_alternation() -> String {
    COPY_MARKERS
        .iter()
        .map(|m| regex::escape(m))
        .collect::<Vec<_>>()
        .join("|")
}

fn is_copy_marker_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    COPY_MARKERS.iter().any(|m| trimmed.starts_with(m))
}

fn is_language_tag(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| c.is_alphanumeric() || c == '_')
}

// ---------------------------------------------------------------------------
// Pass 1: Code-fence repair
// ---------------------------------------------------------------------------

/// Move a copy marker glued to its language tag (`pythonCopyEdit`) onto its
/// own line, separated by a blank line.
fn split_glued_copy_markers(md: &str) -> String {
    static GLUED_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(&format!(
            r"(?m)^([ \t]*\w+?)[ \t]*({})",
            copy_marker_alternation()
        ))
        .expect("valid regex")
    });

    GLUED_RE.replace_all(md, "$1\n\n$2").to_string()
}

/// Give every copy marker a language tag line, inserting `text` where the
/// converter dropped it.
fn synthesize_missing_languages(md: &str) -> String {
    let mut out: Vec<&str> = Vec::new();

    for line in md.split('\n') {
        if is_copy_marker_line(line) {
            let has_tag = out
                .iter()
                .rev()
                .find(|l| !l.trim().is_empty())
                .is_some_and(|l| is_language_tag(l));
            let blank_before = out.last().is_some_and(|l| l.trim().is_empty());

            if has_tag {
                if !blank_before {
                    out.push("");
                }
            } else {
                if out.last().is_some_and(|l| !l.trim().is_empty()) {
                    out.push("");
                }
                out.push(FALLBACK_LANGUAGE);
                out.push("");
            }
        }
        out.push(line);
    }

    out.join("\n")
}

/// Rewrite `lang / blank / marker` and the code after it into a fenced block
/// tagged with `lang`.
///
/// Blank lines after the marker are skipped. The code then takes one of
/// three shapes: a fence the converter already emitted (relabelled), a
/// backtick-wrapped span (unwrapped), or plain lines up to the next empty
/// line.
fn rewrite_copy_blocks(md: &str) -> String {
    let lines: Vec<&str> = md.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let lang = if is_copy_marker_line(line) {
            pop_language_tag(&mut out)
        } else {
            None
        };
        let Some(lang) = lang else {
            out.push(line.to_string());
            i += 1;
            continue;
        };

        let rest = strip_copy_marker(line);
        let (code, next) = if rest.trim().is_empty() {
            take_code(&lines, i + 1)
        } else {
            let (mut code, next) = take_plain(&lines, i + 1);
            code.insert(0, rest.to_string());
            (code, next)
        };

        out.push(format!("```{lang}"));
        out.extend(code);
        out.push("```".to_string());
        i = next;
    }

    out.join("\n")
}

/// Remove the language tag line (and the blank lines after it) ending `out`.
fn pop_language_tag(out: &mut Vec<String>) -> Option<String> {
    let k = out.iter().rposition(|l| !l.trim().is_empty())?;
    if !is_language_tag(&out[k]) {
        return None;
    }
    let lang = out[k].trim().to_string();
    out.truncate(k);
    Some(lang)
}

fn strip_copy_marker(line: &str) -> &str {
    let trimmed = line.trim_start();
    COPY_MARKERS
        .iter()
        .find_map(|m| trimmed.strip_prefix(m))
        .unwrap_or(trimmed)
}

/// Code lines starting at the first non-blank line at or after `from`, and
/// the index of the first line after them.
fn take_code(lines: &[&str], from: usize) -> (Vec<String>, usize) {
    let Some(open) = (from..lines.len()).find(|&j| !lines[j].trim().is_empty()) else {
        return (Vec::new(), lines.len());
    };

    let first = lines[open].trim_start();
    if first.starts_with("```") {
        return take_fence(lines, open);
    }
    if first.starts_with('`') {
        if let Some(taken) = take_backticked(lines, open) {
            return taken;
        }
    }
    take_plain(lines, open)
}

/// Lines up to (not including) the next empty line.
fn take_plain(lines: &[&str], from: usize) -> (Vec<String>, usize) {
    let end = (from..lines.len())
        .find(|&j| lines[j].is_empty())
        .unwrap_or(lines.len());
    let code = lines[from..end].iter().map(|l| l.to_string()).collect();
    (code, end)
}

/// Inner lines of the fence opening at `open`. An unclosed fence runs to the
/// end of the text.
fn take_fence(lines: &[&str], open: usize) -> (Vec<String>, usize) {
    let close = (open + 1..lines.len()).find(|&j| {
        let t = lines[j].trim();
        t.starts_with("```") && t.trim_start_matches('`').is_empty()
    });
    let end = close.unwrap_or(lines.len());
    let code = lines[open + 1..end].iter().map(|l| l.to_string()).collect();
    (code, close.map_or(lines.len(), |c| c + 1))
}

/// Content of a backtick span opening at `open` and closing on a later (or
/// the same) line. `None` when the span never closes.
fn take_backticked(lines: &[&str], open: usize) -> Option<(Vec<String>, usize)> {
    let first = lines[open].trim_start();
    let ticks = first.len() - first.trim_start_matches('`').len();
    let delimiter = &first[..ticks];

    let close = (open..lines.len()).find(|&j| {
        let tail = if j == open { &first[ticks..] } else { lines[j] };
        tail.trim_end().ends_with(delimiter)
    })?;

    let joined = lines[open..=close].join("\n");
    let trimmed = joined.trim();
    let mut inner = &trimmed[ticks..trimmed.len() - ticks];
    // Multi-backtick spans pad their content with one space on each side.
    if ticks > 1 {
        inner = inner.strip_prefix(' ').unwrap_or(inner);
        inner = inner.strip_suffix(' ').unwrap_or(inner);
    }

    let code = inner.split('\n').map(str::to_string).collect();
    Some((code, close + 1))
}

// ---------------------------------------------------------------------------
// Pass 2: Escape emphasis runs that open onto a fence
// ---------------------------------------------------------------------------

/// A lone emphasis run (`*` to `***`, `_` to `___`) directly above a fence
/// would be read as spanning the block; escape it.
fn escape_emphasis_before_fences(md: &str) -> String {
    static EMPHASIS_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^(\*{1,3}|_{1,3})[ \t]*\n```").expect("valid regex")
    });

    EMPHASIS_FENCE_RE.replace_all(md, "\\$1\n```").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Literal substitutions
// ---------------------------------------------------------------------------

/// Apply the caller's table in order, then the fixed substitutions.
fn apply_replacements(md: &str, replacements: &[Replacement]) -> String {
    let mut result = md.to_string();

    for r in replacements {
        result = result.replace(&r.find, &r.replace);
    }
    for (find, replace) in FIXED_SUBSTITUTIONS {
        result = result.replace(find, replace);
    }

    result
}

// ---------------------------------------------------------------------------
// Pass 4: Turn markers
// ---------------------------------------------------------------------------

/// Replace each "you said ... assistant said" header pair with the turn
/// marker followed by the quoted question.
fn insert_turn_markers(md: &str) -> String {
    static TURN_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?ms)^#{1,6}[ \t]*(?:You said|Вы сказали):[ \t]*\n\s*(.*?)\n\s*#{1,6}[ \t]*(?:ChatGPT said|ChatGPT сказал):[ \t]*",
        )
        .expect("valid regex")
    });

    TURN_RE
        .replace_all(md, |caps: &Captures| {
            let question = caps[1]
                .trim_end()
                .lines()
                .map(|l| if l.is_empty() { ">".to_string() } else { format!("> {l}") })
                .collect::<Vec<_>>()
                .join("\n");
            format!("{TURN_MARKER}\n{question}\n")
        })
        .to_string()
}

// ---------------------------------------------------------------------------
// Pass 5: Table reflow
// ---------------------------------------------------------------------------

/// Re-join soft-wrapped rows between a `---|---` separator and the closing
/// two-space line. A row is complete once a line ends in two spaces.
fn reflow_tables(md: &str) -> String {
    static TABLE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?ms)^((?:---\|)+---)[ \t]*\n(.*?)^(  )$").expect("valid regex")
    });

    TABLE_BLOCK_RE
        .replace_all(md, |caps: &Captures| {
            let separator = &caps[1];
            let body = &caps[2];
            let end = &caps[3];

            let mut rows: Vec<String> = Vec::new();
            let mut buffer = String::new();

            for line in body.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                if line.ends_with("  ") {
                    buffer.push_str(line);
                    rows.push(std::mem::take(&mut buffer));
                } else {
                    buffer.push_str(line);
                    buffer.push(' ');
                }
            }
            // Keep a dangling row rather than losing its text.
            if !buffer.is_empty() {
                rows.push(format!("{}  ", buffer.trim_end()));
            }

            if rows.is_empty() {
                format!("{separator}\n{end}")
            } else {
                format!("{separator}\n{}\n{end}", rows.join("\n"))
            }
        })
        .to_string()
}

// ---------------------------------------------------------------------------
// Pass 6: Leading-noise trim
// ---------------------------------------------------------------------------

/// Drop everything before the first turn marker (page chrome, titles).
fn trim_leading_noise(md: &str) -> String {
    match md.find(TURN_MARKER) {
        Some(pos) => md[pos..].to_string(),
        None => md.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Pass 7: Table-leader fix
// ---------------------------------------------------------------------------

/// Prefix lines starting with a bare `|` so strict table parsers accept them.
fn fix_table_leaders(md: &str) -> String {
    static LEADER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^\|").expect("valid regex"));

    LEADER_RE.replace_all(md, "-|").to_string()
}

// ---------------------------------------------------------------------------
// Pass 8: Code-block de-indentation
// ---------------------------------------------------------------------------

/// Indent the list renderer adds to nested code.
const INHERITED_INDENT: usize = 4;

/// Strip the inherited 4-space indent from fenced blocks and drop leading
/// blank lines inside them.
///
/// Only blocks whose shallowest non-blank line sits at exactly four spaces
/// are touched, which makes the pass idempotent.
fn dedent_code_blocks(md: &str) -> String {
    static FENCED_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?ms)^(```[^\n]*\n)(.*?)(^```[ \t]*$)").expect("valid regex")
    });

    FENCED_RE
        .replace_all(md, |caps: &Captures| {
            let open = &caps[1];
            let close = &caps[3];

            let lines: Vec<&str> = caps[2]
                .split_inclusive('\n')
                .skip_while(|l| l.trim().is_empty())
                .collect();

            let min_indent = lines
                .iter()
                .filter(|l| !l.trim().is_empty())
                .map(|l| l.len() - l.trim_start_matches(' ').len())
                .min();

            let body: String = if min_indent == Some(INHERITED_INDENT) {
                lines
                    .iter()
                    .map(|l| {
                        let strip = l.len() - l.trim_start_matches(' ').len();
                        &l[strip.min(INHERITED_INDENT)..]
                    })
                    .collect()
            } else {
                lines.concat()
            };

            format!("{open}{body}{close}")
        })
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glued_marker_moves_to_own_line() {
        let input = "pythonCopyEdit\n    print(1)\n";
        let result = split_glued_copy_markers(input);
        assert_eq!(result, "python\n\nCopyEdit\n    print(1)\n");
    }

    #[test]
    fn glued_marker_ignores_prose() {
        let input = "Click the button labelled CopyEdit to copy.";
        assert_eq!(split_glued_copy_markers(input), input);
    }

    #[test]
    fn bare_marker_line_is_not_split() {
        let input = "rust\n\nКопироватьРедактировать\nfn main() {}\n";
        assert_eq!(split_glued_copy_markers(input), input);
    }

    #[test]
    fn missing_language_gets_text_tag() {
        let input = "Run this:\nCopyEdit\necho hi\n";
        let result = synthesize_missing_languages(input);
        assert_eq!(result, "Run this:\n\ntext\n\nCopyEdit\necho hi\n");
    }

    #[test]
    fn existing_language_tag_kept() {
        let input = "bash\n\nCopyEdit\necho hi\n";
        assert_eq!(synthesize_missing_languages(input), input);

        let input = "bash\nCopyEdit\necho hi\n";
        assert_eq!(
            synthesize_missing_languages(input),
            "bash\n\nCopyEdit\necho hi\n"
        );
    }

    #[test]
    fn copy_block_becomes_fence() {
        let input = "Intro\n\npython\n\nCopyEdit\nimport os\nprint(os.name)\n\nAfter";
        let result = rewrite_copy_blocks(input);
        assert_eq!(
            result,
            "Intro\n\n```python\nimport os\nprint(os.name)\n```\n\nAfter"
        );
    }

    #[test]
    fn copy_marker_before_converter_fence_relabels_it() {
        let input = "Here:\n\npython\n\nCopyEdit\n\n```\nimport os\n\nprint(os.name)\n```\n\nAfter.";
        assert_eq!(
            rewrite_copy_blocks(input),
            "Here:\n\n```python\nimport os\n\nprint(os.name)\n```\n\nAfter."
        );
    }

    #[test]
    fn copy_marker_before_backtick_span_unwraps_it() {
        let input = "Here:\n\npython\n\nCopyEdit\n\n`import os\nprint(os.name)`\n\nAfter.";
        assert_eq!(
            rewrite_copy_blocks(input),
            "Here:\n\n```python\nimport os\nprint(os.name)\n```\n\nAfter."
        );

        let input = "rust\n\nCopyEdit\n\n`` let s = `x`; ``";
        assert_eq!(rewrite_copy_blocks(input), "```rust\nlet s = `x`;\n```");
    }

    #[test]
    fn blank_lines_after_marker_are_skipped() {
        let input = "bash\n\nCopyEdit\n\n\necho hi\n\nDone.";
        assert_eq!(rewrite_copy_blocks(input), "```bash\necho hi\n```\n\nDone.");
    }

    #[test]
    fn unclosed_backtick_span_is_plain_code() {
        let input = "sh\n\nCopyEdit\n\n`rm -rf build\n\nnext";
        assert_eq!(rewrite_copy_blocks(input), "```sh\n`rm -rf build\n```\n\nnext");
    }

    #[test]
    fn copy_block_at_end_of_text_is_closed() {
        let input = "sql\n\nКопироватьРедактировать\nSELECT 1;";
        let result = rewrite_copy_blocks(input);
        assert_eq!(result, "```sql\nSELECT 1;\n```");
    }

    #[test]
    fn fence_repair_sub_passes_compose() {
        let input = "Here:\n\njsonCopyEdit\n{\"a\": 1}\n\nDone.\n\nCopyEdit\nplain\n\nEnd";
        let mut result = split_glued_copy_markers(input);
        result = synthesize_missing_languages(&result);
        result = rewrite_copy_blocks(&result);

        assert!(result.contains("```json\n{\"a\": 1}\n```"), "{result}");
        assert!(result.contains("```text\nplain\n```"), "{result}");
        assert!(!result.contains("CopyEdit"));
    }

    #[test]
    fn emphasis_before_fence_is_escaped() {
        let input = "**\n```rust\nfn x() {}\n```";
        assert_eq!(
            escape_emphasis_before_fences(input),
            "\\**\n```rust\nfn x() {}\n```"
        );
    }

    #[test]
    fn triple_emphasis_runs_before_fence_are_escaped() {
        assert_eq!(
            escape_emphasis_before_fences("***\n```rust\nx\n```"),
            "\\***\n```rust\nx\n```"
        );
        assert_eq!(
            escape_emphasis_before_fences("___\n```\nx\n```"),
            "\\___\n```\nx\n```"
        );
        assert_eq!(
            escape_emphasis_before_fences("_\n```\nx\n```"),
            "\\_\n```\nx\n```"
        );
    }

    #[test]
    fn emphasis_escape_leaves_other_lines() {
        let input = "**bold**\n```rust\n```\n---\n```";
        assert_eq!(escape_emphasis_before_fences(input), input);
        let once = escape_emphasis_before_fences("_\n```\n```");
        assert_eq!(escape_emphasis_before_fences(&once), once);
    }

    #[test]
    fn replacements_run_in_order_before_fixed() {
        let table = vec![
            Replacement {
                find: "&nbsp;".into(),
                replace: " ".into(),
            },
            Replacement {
                find: "mod".into(),
                replace: "<module>".into(),
            },
        ];
        let result = apply_replacements("a&nbsp;b mod", &table);
        assert_eq!(result, "a b <_module_>");
    }

    #[test]
    fn literal_callout_is_neutralized() {
        let input = "> [!important] Question: not a real turn";
        let result = apply_replacements(input, &[]);
        assert!(!result.contains(TURN_MARKER));
    }

    #[test]
    fn turn_markers_capture_each_question_once() {
        let input = "# Chat\n\n##### You said:\n\nWhat is Rust?\n\n###### ChatGPT said:\n\nA language.\n\n##### You said:\n\nAnd Go?\n\n###### ChatGPT said:\n\nAlso a language.\n";
        let result = insert_turn_markers(input);

        assert_eq!(result.matches(TURN_MARKER).count(), 2);
        assert!(result.contains(&format!("{TURN_MARKER}\n> What is Rust?\n")));
        assert!(result.contains(&format!("{TURN_MARKER}\n> And Go?\n")));
        assert!(!result.contains("You said"));
        assert!(!result.contains("ChatGPT said"));
        assert!(result.contains("A language."));
    }

    #[test]
    fn turn_markers_localized_headers() {
        let input = "##### Вы сказали:\nПривет\n###### ChatGPT сказал:\nЗдравствуйте";
        let result = insert_turn_markers(input);
        assert_eq!(result, format!("{TURN_MARKER}\n> Привет\n\nЗдравствуйте"));
    }

    #[test]
    fn multi_line_question_stays_quoted() {
        let input = "##### You said:\nline one\n\nline two\n###### ChatGPT said:\nok";
        let result = insert_turn_markers(input);
        assert_eq!(
            result,
            format!("{TURN_MARKER}\n> line one\n>\n> line two\n\nok")
        );
    }

    #[test]
    fn reflow_joins_wrapped_rows() {
        let input = "Name | Notes  \n---|---\nfoo | first\npart  \nbar | ok  \n  \nafter";
        let result = reflow_tables(input);
        assert_eq!(
            result,
            "Name | Notes  \n---|---\nfoo | first part  \nbar | ok  \n  \nafter"
        );
    }

    #[test]
    fn reflow_keeps_dangling_row() {
        let input = "---|---|---\na | b\n  \n";
        let result = reflow_tables(input);
        assert_eq!(result, "---|---|---\na | b  \n  \n");
    }

    #[test]
    fn reflow_without_closing_line_is_untouched() {
        let input = "---|---\na |\nb  \nno end";
        assert_eq!(reflow_tables(input), input);
    }

    #[test]
    fn trim_drops_text_before_first_marker() {
        let input = format!("Sidebar\nNew chat\n{TURN_MARKER}\n> hi\n");
        assert_eq!(trim_leading_noise(&input), format!("{TURN_MARKER}\n> hi\n"));
        assert_eq!(trim_leading_noise("no markers"), "no markers");
    }

    #[test]
    fn table_leader_gets_hyphen() {
        let input = "| a | b\ntext | x\n|c";
        assert_eq!(fix_table_leaders(input), "-| a | b\ntext | x\n-|c");
    }

    #[test]
    fn dedent_strips_inherited_indent() {
        let input = "```python\n\n    def f():\n        return 1\n```\n";
        assert_eq!(
            dedent_code_blocks(input),
            "```python\ndef f():\n    return 1\n```\n"
        );
    }

    #[test]
    fn dedent_leaves_unindented_blocks() {
        let input = "```rust\nfn main() {\n    run();\n}\n```";
        assert_eq!(dedent_code_blocks(input), input);
    }

    #[test]
    fn dedent_is_idempotent() {
        let input = "```text\n\n\n    a\n        b\n\n    c\n```\n\n```bash\n        deep\n        deeper\n```\n";
        let once = dedent_code_blocks(input);
        let twice = dedent_code_blocks(&once);
        assert_eq!(once, twice);
        assert!(once.starts_with("```text\na\n    b\n\nc\n```"), "{once}");
    }

    #[test]
    fn full_pipeline_repairs_export() {
        let input = "ChatGPT\n\nNew chat\n\n##### You said:\n\nShow code\n\n###### ChatGPT said:\n\nSure:\n\n    pythonCopyEdit\n    \n    print('hi')\n\n| lead\n\nName | Value  \n---|---\nfoo | bar\nbaz  \n  \n";
        let result = run_pipeline(input, &[]);

        assert!(result.starts_with(TURN_MARKER), "{result}");
        assert!(!result.contains("New chat"));
        assert!(result.contains("> Show code"));
        assert!(result.contains("foo | bar baz  "));
        assert!(result.contains("-| lead"));
        assert!(!result.contains("CopyEdit"));
    }

    #[test]
    fn full_pipeline_tags_converter_fence_after_copy_marker() {
        let input = "##### You said:\n\ncode?\n\n###### ChatGPT said:\n\nHere:\n\npython\n\nCopyEdit\n\n```\nimport os\nprint(os.name)\n```\n\nAfter.";
        let result = run_pipeline(input, &[]);

        assert!(
            result.contains("Here:\n\n```python\nimport os\nprint(os.name)\n```\n\nAfter."),
            "{result}"
        );
        assert!(!result.contains("```python\n```"), "{result}");
    }
}
