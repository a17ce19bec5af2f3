//! Cleanup of raw oracle text: layout extraction and code stripping.
//!
//! Both operations are purely syntactic. Nothing here rewrites code semantics.

use anyhow::{Context, Result, anyhow};
use serde_json::Value;

use crate::core::layout::LayoutTree;

const FENCE: &str = "```";
const FILE_LABEL: &str = "file:";

/// Extract and validate a layout from raw oracle text.
///
/// Only the span from the first `{` to the last `}` is parsed, so prose around the
/// JSON object is tolerated.
pub fn extract_layout(raw: &str) -> Result<LayoutTree> {
    let json = json_object_span(raw).ok_or_else(|| anyhow!("no JSON object in oracle reply"))?;
    let value: Value = serde_json::from_str(json).context("parse layout json")?;
    LayoutTree::from_value(&value)
}

fn json_object_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Strip fence markers and `File:` labels from a single-file reply.
///
/// Every other line is kept verbatim. Trailing whitespace is trimmed and a non-empty
/// result ends with exactly one newline. Applying this twice equals applying it once.
pub fn clean_code(raw: &str) -> String {
    let kept: Vec<&str> = raw
        .lines()
        .filter(|line| !is_fence(line) && !is_file_label(line))
        .collect();
    let mut cleaned = kept.join("\n").trim_end().to_string();
    if !cleaned.is_empty() {
        cleaned.push('\n');
    }
    cleaned
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with(FENCE)
}

fn is_file_label(line: &str) -> bool {
    line.get(..FILE_LABEL.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(FILE_LABEL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_layout_surrounded_by_prose() {
        let raw = "Sure! Here is the layout:\n{\"project_name\":\"p1\",\"structure\":{\"main.py\":\"\"}}\nHope this helps.";
        let tree = extract_layout(raw).expect("layout");
        assert_eq!(tree.project_name, "p1");
        assert_eq!(tree.leaves()[0].relative_path, "main.py");
    }

    #[test]
    fn extracts_layout_inside_fence() {
        let raw = "```json\n{\"project_name\":\"p\",\"structure\":{\"app.py\":\"\"}}\n```";
        let tree = extract_layout(raw).expect("layout");
        assert_eq!(tree.entry_leaf().expect("entry").relative_path, "app.py");
    }

    #[test]
    fn refusal_has_no_layout() {
        let err = extract_layout("I cannot comply.").unwrap_err();
        assert!(err.to_string().contains("no JSON object"));
    }

    #[test]
    fn broken_json_is_a_parse_failure() {
        let err = extract_layout("{\"project_name\": \"p\", \"structure\": {").unwrap_err();
        assert!(err.to_string().contains("no JSON object") || err.to_string().contains("parse"));
    }

    #[test]
    fn clean_strips_fences() {
        assert_eq!(clean_code("```python\nprint(1)\n```"), "print(1)\n");
        assert_eq!(clean_code("  ```\nx = 1\n  ```  \n"), "x = 1\n");
    }

    #[test]
    fn clean_strips_file_labels_case_insensitively() {
        let raw = "File: main.py\nFILE: other\nprofile = 1\nprint(profile)\n";
        assert_eq!(clean_code(raw), "profile = 1\nprint(profile)\n");
    }

    #[test]
    fn clean_keeps_indented_file_attributes() {
        let raw = "File: models.py\nfrom dataclasses import dataclass\n\n@dataclass\nclass Upload:\n    name: str\n    file: str\n    File: bytes = b''\n";
        assert_eq!(
            clean_code(raw),
            "from dataclasses import dataclass\n\n@dataclass\nclass Upload:\n    name: str\n    file: str\n    File: bytes = b''\n"
        );
    }

    #[test]
    fn clean_preserves_indentation_and_inner_blank_lines() {
        let raw = "def f():\n    return 1\n\n\nprint(f())   \n\n";
        assert_eq!(clean_code(raw), "def f():\n    return 1\n\n\nprint(f())\n");
    }

    #[test]
    fn clean_is_idempotent() {
        let samples = [
            "```python\nimport os\n\nprint(os.getcwd())\n```\n",
            "File: a.py\n\tx = 1  \n",
            "",
            "   \n\n",
        ];
        for sample in samples {
            let once = clean_code(sample);
            assert_eq!(clean_code(&once), once, "sample {sample:?}");
        }
    }

    #[test]
    fn clean_of_fences_only_is_empty() {
        assert_eq!(clean_code("```\n```"), "");
    }
}
