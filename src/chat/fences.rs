//! Putting code fences back into text scraped with `innerText`.
//!
//! `innerText` drops the fences around rendered code blocks and leaves the
//! language label and the "Copy code" button text in their place. The code
//! elements themselves are read separately, so each block can be found in
//! the flattened text and wrapped again.

/// Replace each flattened block in `text` with a fenced one.
///
/// `blocks` holds `(language, code)` as read from the page. A block whose
/// flattened form cannot be found is appended at the end.
pub fn reconstruct_fences(text: &str, blocks: &[(String, String)]) -> String {
    let mut out = text.to_string();
    for (lang, code) in blocks {
        let code = code.trim();
        if code.is_empty() {
            continue;
        }
        let fenced = format!("```{}\n{}\n```", lang, code);

        let mut variants = Vec::new();
        if !lang.is_empty() {
            variants.push(format!("{}\nCopy code\n{}", lang, code));
            variants.push(format!("{}\n Copy code\n{}", lang, code));
            variants.push(format!("{}\nCopy\n{}", lang, code));
            variants.push(format!("{}\n{}", lang, code));
        }
        variants.push(code.to_string());

        match variants.iter().find(|v| out.contains(v.as_str())) {
            Some(flat) => out = out.replacen(flat.as_str(), &fenced, 1),
            None => {
                out.push_str("\n\n");
                out.push_str(&fenced);
                out.push('\n');
            }
        }
    }
    out.trim().to_string()
}

/// Language from a code element's class list (`language-x` or `lang-x`).
pub fn language_from_class(class: &str) -> String {
    class
        .split_whitespace()
        .find_map(|c| c.strip_prefix("language-").or_else(|| c.strip_prefix("lang-")))
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_code_variant_replaced() {
        let text = "Here:\npython\nCopy code\nprint('hi')\nDone.";
        let blocks = vec![("python".to_string(), "print('hi')".to_string())];
        assert_eq!(
            reconstruct_fences(text, &blocks),
            "Here:\n```python\nprint('hi')\n```\nDone."
        );
    }

    #[test]
    fn test_missing_block_appended() {
        let text = "Some prose only.";
        let blocks = vec![("c".to_string(), "int main(void) { return 0; }".to_string())];
        let out = reconstruct_fences(text, &blocks);
        assert!(out.starts_with("Some prose only."));
        assert!(out.ends_with("```c\nint main(void) { return 0; }\n```"));
    }

    #[test]
    fn test_unlabelled_block_wrapped_in_place() {
        let text = "Run:\necho hi\nThat's it.";
        let blocks = vec![(String::new(), "echo hi".to_string())];
        assert_eq!(reconstruct_fences(text, &blocks), "Run:\n```\necho hi\n```\nThat's it.");
    }

    #[test]
    fn test_language_from_class() {
        assert_eq!(language_from_class("hljs language-python"), "python");
        assert_eq!(language_from_class("lang-c whitespace-pre"), "c");
        assert_eq!(language_from_class("hljs"), "");
    }
}
