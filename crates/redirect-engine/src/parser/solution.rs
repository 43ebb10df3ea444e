//! Solution extraction for calls that end without a redirect
//!
//! The solution is the first block of prose in the text. Marker lines, fenced
//! blocks and other `ALL_CAPS_KEY:` lines act as block separators, and prose
//! that precedes an inline marker is kept.

use std::sync::LazyLock;

use regex::Regex;

use super::markers::MarkerExtractor;

static STRUCTURED_KEY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\s*_#>`~-]*[A-Z][A-Z0-9_]{2,}[\s*_`~]*:").expect("key line pattern is valid")
});

/// First prose block of `text`, or `None` when it has no prose at all
pub fn extract_solution(text: &str, markers: &MarkerExtractor) -> Option<String> {
    let mut block: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("```") {
            let single_line = !in_fence && trimmed.len() > 3 && trimmed[3..].contains("```");
            if !single_line {
                in_fence = !in_fence;
            }
            if !block.is_empty() {
                break;
            }
            continue;
        }
        if in_fence {
            continue;
        }

        let prose = match markers.prose_before_marker(line) {
            Some(before) => before,
            None if STRUCTURED_KEY_LINE.is_match(line) => "",
            None => trimmed,
        };

        if prose.is_empty() {
            if !block.is_empty() {
                break;
            }
            continue;
        }
        block.push(prose);
    }

    let solution = block.join("\n").trim().to_string();
    (!solution.is_empty()).then_some(solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarkerVocabulary;

    fn solution(text: &str) -> Option<String> {
        extract_solution(text, &MarkerExtractor::new(&MarkerVocabulary::default()).unwrap())
    }

    #[test]
    fn first_paragraph_only() {
        assert_eq!(
            solution(
                "Clear the print spooler.\nThen re-add the printer.\n\nLet me know if that helps."
            ),
            Some("Clear the print spooler.\nThen re-add the printer.".to_string())
        );
    }

    #[test]
    fn markers_and_key_lines_are_skipped() {
        let text =
            "REDIRECT_REQUESTED: NO\nSTATUS: resolved\n\nReset the password from the admin portal.";
        assert_eq!(
            solution(text),
            Some("Reset the password from the admin portal.".to_string())
        );
    }

    #[test]
    fn prose_before_inline_marker_is_kept() {
        assert_eq!(
            solution("Rebooted the switch and it came back. REDIRECT_REQUESTED: no"),
            Some("Rebooted the switch and it came back.".to_string())
        );
    }

    #[test]
    fn fenced_blocks_end_the_paragraph() {
        let text = "Run the migration again.\n```bash\nmake migrate\n```\nAfterwards it worked.";
        assert_eq!(solution(text), Some("Run the migration again.".to_string()));
        assert_eq!(solution("```{\"score\": 1}```\nDone."), Some("Done.".to_string()));
    }

    #[test]
    fn nothing_but_structure() {
        assert_eq!(solution(""), None);
        assert_eq!(solution("```json\n{\"score\": 9}\n```"), None);
        assert_eq!(solution("USERNAME_TO_REDIRECT: none"), None);
    }
}
