//! Query-centred excerpts for search results.
//!
//! Lengths and offsets are counted in characters, never bytes, so
//! multibyte text is never split inside a code point.
//!
//! When the query occurs in the content the window is centred on the first
//! case-insensitive match, then nudged so that it:
//!
//! 1. starts at a line boundary if a newline lies within 20 characters
//!    before the start, and
//! 2. does not stop inside a fenced code block (```` ``` ```` or `~~~`),
//!    extending forward to the closing fence as long as the window stays
//!    within twice the requested length.
//!
//! The fence check is a heuristic. Nested fences or a closing fence beyond
//! the extension budget still yield an unbalanced excerpt.

const ELLIPSIS: &str = "...";
const NEWLINE_LOOKBACK: usize = 20;
const FENCE_LEN: usize = 3;

/// Excerpt of at most roughly `max_length` characters from `content`.
///
/// - Content no longer than `max_length` is returned unchanged.
/// - With an empty or unmatched query, the first `max_length` characters
///   are returned followed by `...`.
/// - Otherwise `...` marks each side where the window was cut.
pub fn extract_snippet(content: &str, query: &str, max_length: usize) -> String {
    let chars: Vec<char> = content.chars().collect();
    let len = chars.len();
    if len <= max_length {
        return content.to_string();
    }

    let needle: Vec<char> = query.trim().chars().map(fold_case).collect();
    let Some(pos) = find_ignore_case(&chars, &needle) else {
        return format!("{}{}", collect(&chars[..max_length]), ELLIPSIS);
    };
    let match_end = pos + needle.len();

    let center = pos + needle.len() / 2;
    let mut start = center.saturating_sub(max_length / 2);
    let mut end = (start + max_length).min(len);
    if end - start < max_length {
        start = end.saturating_sub(max_length);
    }

    if start > 0 {
        let from = start.saturating_sub(NEWLINE_LOOKBACK);
        if let Some(offset) = chars[from..start].iter().rposition(|&c| c == '\n') {
            let line_start = from + offset + 1;
            let line_end = (line_start + max_length).min(len);
            if line_end >= match_end {
                start = line_start;
                end = line_end;
            }
        }
    }

    if let Some(close) = unclosed_fence_end(&chars, end) {
        if close - start <= max_length * 2 {
            end = close;
        }
    }

    let prefix = if start > 0 { ELLIPSIS } else { "" };
    let suffix = if end < len { ELLIPSIS } else { "" };
    format!("{}{}{}", prefix, collect(&chars[start..end]), suffix)
}

fn fold_case(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn find_ignore_case(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| {
        w.iter()
            .zip(needle.iter())
            .all(|(&h, &n)| fold_case(h) == n)
    })
}

fn collect(chars: &[char]) -> String {
    chars.iter().collect()
}

fn fence_at(chars: &[char], i: usize) -> Option<char> {
    let c = *chars.get(i)?;
    if (c == '`' || c == '~') && chars.get(i..i + FENCE_LEN)?.iter().all(|&x| x == c) {
        Some(c)
    } else {
        None
    }
}

/// If a fence is open at `end`, the index just past its closing marker.
///
/// Only markers lying entirely before `end` count towards the open/closed
/// state. A fence is closed only by a marker of the same kind.
fn unclosed_fence_end(chars: &[char], end: usize) -> Option<usize> {
    let mut open: Option<char> = None;
    let mut i = 0;
    while i + FENCE_LEN <= end {
        match fence_at(chars, i) {
            Some(kind) => {
                open = match open {
                    None => Some(kind),
                    Some(current) if current == kind => None,
                    keep => keep,
                };
                i += FENCE_LEN;
            }
            None => i += 1,
        }
    }

    let kind = open?;
    (i..chars.len()).find_map(|j| match fence_at(chars, j) {
        Some(k) if k == kind => Some(j + FENCE_LEN),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_content_unchanged() {
        let content = "# Intro\nUse ```go\nfmt.Println(1)\n``` here";
        assert_eq!(extract_snippet(content, "fmt", 200), content);
        assert_eq!(extract_snippet("exact", "", 5), "exact");
    }

    #[test]
    fn test_empty_query_takes_prefix() {
        let content = "a".repeat(500);
        let snippet = extract_snippet(&content, "", 50);
        assert_eq!(snippet.chars().count(), 53);
        assert!(snippet.ends_with("..."));
    }

    #[test]
    fn test_unmatched_query_takes_prefix() {
        let content = format!("{}{}", "abc ".repeat(30), "tail");
        let snippet = extract_snippet(&content, "zebra", 10);
        assert_eq!(snippet, "abc abc ab...");
    }

    #[test]
    fn test_window_centred_on_case_insensitive_match() {
        let content = format!("{}Needle{}", "x".repeat(100), "y".repeat(100));
        let snippet = extract_snippet(&content, "needle", 20);
        assert_eq!(snippet, format!("...{}Needle{}...", "x".repeat(7), "y".repeat(7)));
    }

    #[test]
    fn test_window_clamped_at_content_end() {
        let content = format!("{}end", "z".repeat(100));
        let snippet = extract_snippet(&content, "END", 10);
        assert_eq!(snippet, format!("...{}end", "z".repeat(7)));
    }

    #[test]
    fn test_window_start_snaps_to_newline() {
        let content = format!(
            "{}\n{}target{}",
            "a".repeat(60),
            "b".repeat(30),
            "c".repeat(100)
        );
        let snippet = extract_snippet(&content, "target", 40);
        assert_eq!(snippet, format!("...{}targetcccc...", "b".repeat(30)));
    }

    fn fenced(marker: &str) -> String {
        format!(
            "{p}\n{m}rust\nlet needle = 1;\nlet more = 2;\n{m}\n{q}",
            p = "p".repeat(100),
            m = marker,
            q = "q".repeat(100)
        )
    }

    #[test]
    fn test_window_extends_to_close_fence() {
        let snippet = extract_snippet(&fenced("```"), "needle", 30);
        assert_eq!(
            snippet,
            "...```rust\nlet needle = 1;\nlet more = 2;\n```..."
        );
    }

    #[test]
    fn test_tilde_fence_extends_too() {
        let snippet = extract_snippet(&fenced("~~~"), "needle", 30);
        assert_eq!(
            snippet,
            "...~~~rust\nlet needle = 1;\nlet more = 2;\n~~~..."
        );
    }

    #[test]
    fn test_fence_extension_bounded_by_budget() {
        let snippet = extract_snippet(&fenced("```"), "needle", 10);
        assert_eq!(snippet, "...let needle...");
    }

    #[test]
    fn test_closed_fence_is_left_alone() {
        let content = format!("```\ncode\n```\n{}hit{}", "m".repeat(40), "n".repeat(100));
        let snippet = extract_snippet(&content, "hit", 20);
        assert!(snippet.contains("hit"));
        assert!(!snippet.contains("```"));
    }

    #[test]
    fn test_multibyte_content() {
        let content = format!("{}世界{}", "こ".repeat(50), "ん".repeat(50));
        let snippet = extract_snippet(&content, "世界", 10);
        assert!(snippet.contains("世界"));
        assert_eq!(snippet.chars().count(), 16);
    }
}
