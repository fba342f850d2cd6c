//! Pure transformations over assistant text.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static FENCE_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*```[^\n]*(?:\n|$)").unwrap());
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]+").unwrap());
static QUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*>[ \t]?").unwrap());
static LIST_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:[-*+]|\d+[.)])[ \t]+").unwrap()
});
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!?\[([^\]\n]*)\]\([^)\n]*\)").unwrap());
static BOLD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*(\S[^*\n]*?\S|\S)\*\*|__(\S[^_\n]*?\S|\S)__").unwrap()
});
static ITALIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*(\S[^*\n]*?\S|\S)\*|\b_(\S[^_\n]*?\S|\S)_\b").unwrap()
});
static INLINE_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`\n]+)`").unwrap());
static FENCED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^```([^\n`]*)\n(.*?)^```[ \t]*$").unwrap()
});

/// Removes markdown formatting, keeping the readable text.
///
/// Headings, block quotes, list markers, emphasis, inline code ticks and
/// code fence lines are dropped. Links and images are replaced by their
/// text. Code inside fences is kept untouched. Emphasis markers only
/// count when they hug the text, so `w * h * 2` stays as written.
///
/// ```
/// use zyquence_core::text::strip_markdown;
///
/// let text = "## Plan\n- **Save** 10% via [index funds](https://x.io)";
/// assert_eq!(strip_markdown(text), "Plan\nSave 10% via index funds");
/// ```
pub fn strip_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in FENCED_BLOCK_RE.captures_iter(text) {
        let (Some(block), Some(body)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        out.push_str(&strip_prose(&text[last..block.start()]));
        out.push_str(body.as_str());
        last = block.end();
        // The closing fence line goes away along with its newline.
        if text[last..].starts_with('\n') {
            last += 1;
        }
    }
    out.push_str(&strip_prose(&text[last..]));
    out.truncate(out.trim_end().len());
    out
}

fn strip_prose(text: &str) -> String {
    // Unterminated fences only lose the fence line itself.
    let text = FENCE_LINE_RE.replace_all(text, "");
    let text = HEADING_RE.replace_all(&text, "");
    let text = QUOTE_RE.replace_all(&text, "");
    let text = LIST_MARKER_RE.replace_all(&text, "");
    let text = LINK_RE.replace_all(&text, "$1");
    let text = BOLD_RE.replace_all(&text, "$1$2");
    let text = ITALIC_RE.replace_all(&text, "$1$2");
    INLINE_CODE_RE.replace_all(&text, "$1").into_owned()
}

/// A source file produced by the assistant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeneratedFile {
    /// Where the file should go, as written by the assistant.
    pub path: String,
    /// The language named on the fence, if any.
    pub language: Option<String>,
    /// The file body, including its trailing newline.
    pub contents: String,
}

/// Collects fenced code blocks that name a file path.
///
/// Both ```` ```rust src/main.rs ```` and ```` ```src/main.rs ```` are
/// recognized. Blocks with only a language are skipped.
///
/// ```
/// use zyquence_core::text::extract_files;
///
/// let text = "Here:\n```rust src/main.rs\nfn main() {}\n```\n";
/// let files = extract_files(text);
/// assert_eq!(files[0].path, "src/main.rs");
/// assert_eq!(files[0].language.as_deref(), Some("rust"));
/// assert_eq!(files[0].contents, "fn main() {}\n");
/// ```
pub fn extract_files(text: &str) -> Vec<GeneratedFile> {
    fenced_blocks(text)
        .filter_map(|(info, body)| {
            let mut words = info.split_whitespace();
            let (language, path) = match (words.next(), words.next()) {
                (Some(language), Some(path)) => (Some(language), path),
                (Some(word), None) if looks_like_path(word) => (None, word),
                _ => return None,
            };
            Some(GeneratedFile {
                path: path.to_owned(),
                language: language.map(str::to_owned),
                contents: body.to_owned(),
            })
        })
        .collect()
}

/// Iterates over `(info string, body)` of every fenced block.
pub(crate) fn fenced_blocks(
    text: &str,
) -> impl Iterator<Item = (&str, &str)> + '_ {
    FENCED_BLOCK_RE.captures_iter(text).filter_map(|caps| {
        let info = caps.get(1)?.as_str().trim();
        let body = caps.get(2)?.as_str();
        Some((info, body))
    })
}

fn looks_like_path(word: &str) -> bool {
    word.contains('/') || word.contains('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markdown() {
        let text = "# Title\n\n\
            Some **bold** and *italic* text with `code` and a \
            [link](https://x.io).\n\
            > quoted\n\
            - one\n\
            * two\n\
            1. first\n";
        assert_eq!(
            strip_markdown(text),
            "Title\n\nSome bold and italic text with code and a link.\n\
             quoted\none\ntwo\nfirst"
        );
    }

    #[test]
    fn test_strip_markdown_keeps_identifiers() {
        assert_eq!(
            strip_markdown("call snake_case_name with 2 * 3"),
            "call snake_case_name with 2 * 3"
        );
        assert_eq!(strip_markdown("an _aside_ here"), "an aside here");
        assert_eq!(strip_markdown("area = w * h * 2"), "area = w * h * 2");
        assert_eq!(strip_markdown("a **b** * c"), "a b * c");
    }

    #[test]
    fn test_strip_markdown_fences() {
        let text = "Run:\n```sh\ncargo run\n```\nDone.";
        assert_eq!(strip_markdown(text), "Run:\ncargo run\nDone.");
    }

    #[test]
    fn test_strip_markdown_keeps_code_bodies() {
        let text = "```py\nx = a * b * c\n- not a list\n# comment\n```";
        assert_eq!(
            strip_markdown(text),
            "x = a * b * c\n- not a list\n# comment"
        );

        let text = "- **Step**\n```sh\n> out.txt\n```\n- _done_\n";
        assert_eq!(strip_markdown(text), "Step\n> out.txt\ndone");
    }

    #[test]
    fn test_strip_markdown_unclosed_fence() {
        let text = "Try:\n```sh\ncargo run";
        assert_eq!(strip_markdown(text), "Try:\ncargo run");
    }

    #[test]
    fn test_extract_files() {
        let text = "\
Two files:

```rust src/lib.rs
pub fn add(a: i32, b: i32) -> i32 {
    a + b
}
```

```sh
cargo test
```

```Cargo.toml
[package]
name = \"demo\"
```
";
        let files = extract_files(text);
        assert_eq!(
            files,
            vec![
                GeneratedFile {
                    path: "src/lib.rs".to_owned(),
                    language: Some("rust".to_owned()),
                    contents: "pub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n"
                        .to_owned(),
                },
                GeneratedFile {
                    path: "Cargo.toml".to_owned(),
                    language: None,
                    contents: "[package]\nname = \"demo\"\n".to_owned(),
                },
            ]
        );
    }

    #[test]
    fn test_extract_files_none() {
        assert!(extract_files("no code here").is_empty());
        assert!(extract_files("```\nplain\n```").is_empty());
    }
}
