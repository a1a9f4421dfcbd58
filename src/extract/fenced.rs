//! Fenced code regions.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use super::RawBlock;
use crate::domain::block::normalize_language;

/// ```` ```lang ... ``` ````, tolerating a "Copy code" line copied from the UI.
static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```([\w+#-]*)[^\S\n]*\n(?:Copy\s*code\s*\n)?(.*?)\n[^\S\n]*```")
        .expect("constant regex pattern is valid")
});

/// Extract fenced blocks in document order, dropping duplicate bodies.
pub fn extract_fenced(text: &str) -> Vec<RawBlock> {
    let mut seen = HashSet::new();
    let mut blocks = Vec::new();

    for caps in FENCED_BLOCK.captures_iter(text) {
        let (Some(whole), Some(lang), Some(body)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let code = body.as_str().trim();
        if code.is_empty() || !seen.insert(code.to_string()) {
            continue;
        }
        blocks.push(RawBlock {
            language: normalize_language(lang.as_str()),
            code: code.to_string(),
            offset: whole.start(),
        });
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_python_block() {
        let text = "Here you go:\n\n```python\nprint('hi')\n```\n\nEnjoy.";
        let blocks = extract_fenced(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language, "python");
        assert_eq!(blocks[0].code, "print('hi')");
        assert_eq!(blocks[0].offset, text.find("```").unwrap());
    }

    #[test]
    fn test_copy_code_line_is_skipped() {
        let text = "```bash\nCopy code\necho hello\n```";
        let blocks = extract_fenced(text);
        assert_eq!(blocks[0].code, "echo hello");
    }

    #[test]
    fn test_untagged_fence_is_txt() {
        let blocks = extract_fenced("```\nsome output\n```");
        assert_eq!(blocks[0].language, "txt");
    }

    #[test]
    fn test_cpp_tag() {
        let blocks = extract_fenced("```c++\nint main() { return 0; }\n```");
        assert_eq!(blocks[0].language, "cpp");
    }

    #[test]
    fn test_duplicates_dropped() {
        let text = "```python\nx = 1\n```\ntext\n```python\nx = 1\n```\n```python\ny = 2\n```";
        let blocks = extract_fenced(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].code, "y = 2");
    }

    #[test]
    fn test_multiple_blocks_keep_order() {
        let text = "```c\nint a;\n```\n\n```python\nimport os\n```";
        let blocks = extract_fenced(text);
        assert_eq!(blocks[0].language, "c");
        assert_eq!(blocks[1].language, "python");
        assert!(blocks[0].offset < blocks[1].offset);
    }

    #[test]
    fn test_no_fences() {
        assert!(extract_fenced("just some prose, no code").is_empty());
    }
}
