//! Extracted code blocks.

use serde::{Deserialize, Serialize};

/// How a kept block is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Saved to a file, then run (or compiled and run)
    Program,
    /// Short stop/kill shell line, run from a script file in the work dir
    DirectCommand,
}

/// Where a block's filename came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilenameOrigin {
    /// Named in the response text (`**pi_blink.py**`, "save it as ...")
    Response,
    /// Built by the harness from the prompt or a counter
    #[default]
    Generated,
}

/// A single code block recovered from a chat response.
///
/// Created once during extraction and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    /// Normalized language tag ("python", "bash", "c", ...; "txt" when unknown)
    pub language: String,
    /// Block body with surrounding whitespace trimmed
    pub code: String,
    /// Filename the block is saved under
    pub filename: String,
    #[serde(default)]
    pub origin: FilenameOrigin,
    /// Byte offset of the block in the response text
    pub offset: usize,
    pub kind: BlockKind,
}

impl CodeBlock {
    /// File extension for this block's language, including the dot.
    pub fn extension(&self) -> &'static str {
        extension_for(&self.language)
    }

    /// Lines that carry content.
    pub fn content_lines(&self) -> Vec<&str> {
        content_lines(&self.code)
    }

    pub fn is_shell(&self) -> bool {
        is_shell_language(&self.language)
    }

    /// One-line preview for logs and the transcript.
    pub fn preview(&self, max_chars: usize) -> String {
        preview(&self.code, max_chars)
    }
}

/// Normalize a raw fence tag ("Python", "c++", "") to the canonical name.
pub fn normalize_language(raw: &str) -> String {
    let lang = raw.trim().to_lowercase();
    match lang.as_str() {
        "" => "txt".to_string(),
        "py" | "python3" => "python".to_string(),
        "sh" | "shell" | "zsh" => "bash".to_string(),
        "c++" | "cxx" => "cpp".to_string(),
        "js" | "node" => "javascript".to_string(),
        "ts" => "typescript".to_string(),
        "yml" => "yaml".to_string(),
        _ => lang,
    }
}

/// File extension for a normalized language tag.
pub fn extension_for(language: &str) -> &'static str {
    match language {
        "python" => ".py",
        "bash" => ".sh",
        "c" => ".c",
        "cpp" => ".cpp",
        "javascript" => ".js",
        "typescript" => ".ts",
        "rust" => ".rs",
        "java" => ".java",
        "json" => ".json",
        "yaml" => ".yaml",
        "html" => ".html",
        "css" => ".css",
        "makefile" => ".mk",
        _ => ".txt",
    }
}

/// Language tag for a file extension, the inverse of [`extension_for`].
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    match ext.trim_start_matches('.').to_lowercase().as_str() {
        "py" => Some("python"),
        "sh" => Some("bash"),
        "c" | "h" => Some("c"),
        "cpp" | "cc" | "hpp" => Some("cpp"),
        "js" | "mjs" => Some("javascript"),
        _ => None,
    }
}

pub fn is_shell_language(language: &str) -> bool {
    matches!(language, "bash" | "console" | "txt" | "")
}

pub(crate) fn content_lines(code: &str) -> Vec<&str> {
    code.lines().filter(|l| !l.trim().is_empty()).collect()
}

pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() > max_chars {
        format!("{}...", flat.chars().take(max_chars).collect::<String>())
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(language: &str, code: &str) -> CodeBlock {
        CodeBlock {
            language: language.to_string(),
            code: code.to_string(),
            filename: format!("program{}", extension_for(language)),
            origin: FilenameOrigin::Generated,
            offset: 0,
            kind: BlockKind::Program,
        }
    }

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language("Python"), "python");
        assert_eq!(normalize_language("py"), "python");
        assert_eq!(normalize_language("sh"), "bash");
        assert_eq!(normalize_language("C++"), "cpp");
        assert_eq!(normalize_language(""), "txt");
    }

    #[test]
    fn test_extension() {
        assert_eq!(block("python", "print(1)").extension(), ".py");
        assert_eq!(block("cpp", "int main(){}").extension(), ".cpp");
        assert_eq!(block("brainfuck", "+++").extension(), ".txt");
    }

    #[test]
    fn test_language_for_extension() {
        assert_eq!(language_for_extension(".py"), Some("python"));
        assert_eq!(language_for_extension("h"), Some("c"));
        assert_eq!(language_for_extension(".md"), None);
    }

    #[test]
    fn test_content_lines_skip_blank() {
        let b = block("python", "import os\n\n\nprint(os.getcwd())\n   \n");
        assert_eq!(b.content_lines().len(), 2);
    }

    #[test]
    fn test_preview_truncates() {
        let b = block("python", "print('hello')\nprint('world')");
        assert_eq!(b.preview(8), "print('h...");
        assert_eq!(b.preview(100), "print('hello') print('world')");
    }
}
