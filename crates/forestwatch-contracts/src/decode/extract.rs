use std::sync::OnceLock;

use regex::Regex;

/// Tried in order against the raw reply: the widest object span, then spans
/// anchored on the comparison score key, then on any `vegetation_score` key.
const OBJECT_PATTERNS: [&str; 3] = [
    r"\{[\s\S]*\}",
    r#"\{[\s\S]*?"vegetation_score_image1"[\s\S]*?\}"#,
    r#"\{[\s\S]*?"vegetation_score"[\s\S]*?\}"#,
];

fn object_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        OBJECT_PATTERNS
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

/// Drops fence lines such as "```" or "```json", keeping everything else.
pub(crate) fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !is_fence_line(line))
        .collect::<Vec<&str>>()
        .join("\n")
}

fn is_fence_line(line: &str) -> bool {
    let Some(tag) = line.trim().strip_prefix("```") else {
        return false;
    };
    tag.trim()
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '+' | '.'))
}

/// Span from the first `{` through the last `}`, inclusive.
pub(crate) fn outer_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

/// First match of each object pattern, in pattern order.
pub(crate) fn pattern_candidates(text: &str) -> Vec<&str> {
    object_patterns()
        .iter()
        .filter_map(|pattern| pattern.find(text))
        .map(|found| found.as_str())
        .collect()
}

/// Lines from the first one holding `{` until the running `{`/`}` balance
/// returns to zero. Text before the opening brace and after the closing one
/// is left out.
pub(crate) fn balanced_line_block(text: &str) -> Option<String> {
    let mut block: Vec<&str> = Vec::new();
    let mut depth: i64 = 0;
    for line in text.lines() {
        let line = if block.is_empty() {
            match line.find('{') {
                Some(start) => &line[start..],
                None => continue,
            }
        } else {
            line
        };
        let mut closed_at = None;
        for (index, ch) in line.char_indices() {
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        closed_at = Some(index);
                        break;
                    }
                }
                _ => {}
            }
        }
        match closed_at {
            Some(end) => {
                block.push(&line[..=end]);
                break;
            }
            None => block.push(line),
        }
    }
    if block.is_empty() {
        return None;
    }
    Some(block.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::{balanced_line_block, outer_object_span, pattern_candidates, strip_code_fences};

    #[test]
    fn fence_lines_with_and_without_tags_are_removed() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(text), "{\"a\": 1}");

        let text = "  ```JSON  \n{\"a\": 1}\n  ```  ";
        assert_eq!(strip_code_fences(text), "{\"a\": 1}");
    }

    #[test]
    fn fence_stripping_keeps_prose_lines() {
        let text = "Here you go:\n```\n{\"a\": 1}\n```\nUse ``` for code.";
        assert_eq!(
            strip_code_fences(text),
            "Here you go:\n{\"a\": 1}\nUse ``` for code."
        );
    }

    #[test]
    fn outer_span_requires_ordered_braces() {
        assert_eq!(outer_object_span("x {\"a\": {}} y"), Some("{\"a\": {}}"));
        assert_eq!(outer_object_span("} backwards {"), None);
        assert_eq!(outer_object_span("no braces"), None);
    }

    #[test]
    fn pattern_candidates_follow_pattern_order() {
        let text = "{\"note\": 1} and {\"vegetation_score_image1\": 2}";
        let candidates = pattern_candidates(text);
        assert_eq!(candidates, vec![text, text]);

        let text = "{\"vegetation_score_image1\": 2} trailing }";
        let candidates = pattern_candidates(text);
        assert_eq!(candidates, vec![text, "{\"vegetation_score_image1\": 2}"]);

        let text = "{\"vegetation_score\": 3} trailing }";
        let candidates = pattern_candidates(text);
        assert_eq!(candidates, vec![text, "{\"vegetation_score\": 3}"]);
    }

    #[test]
    fn pattern_candidates_empty_without_braces() {
        assert!(pattern_candidates("I cannot help with that.").is_empty());
    }

    #[test]
    fn balanced_block_stops_when_depth_returns_to_zero() {
        let text = "Result: {\n  \"a\": \"{x}\",\n  \"b\": 2\n}\nNotes: {ref}";
        assert_eq!(
            balanced_line_block(text).as_deref(),
            Some("{\n  \"a\": \"{x}\",\n  \"b\": 2\n}")
        );
    }

    #[test]
    fn balanced_block_drops_text_after_closing_brace() {
        let text = "Analysis {\n  \"a\": 1\n} (end of report)\nMore text";
        assert_eq!(
            balanced_line_block(text).as_deref(),
            Some("{\n  \"a\": 1\n}")
        );
        assert_eq!(
            balanced_line_block("{\"a\": 1} and {\"b\": 2}").as_deref(),
            Some("{\"a\": 1}")
        );
    }

    #[test]
    fn balanced_block_runs_to_end_when_unclosed() {
        assert_eq!(balanced_line_block("{\n\"a\": 1").as_deref(), Some("{\n\"a\": 1"));
        assert_eq!(balanced_line_block("plain text"), None);
    }
}
