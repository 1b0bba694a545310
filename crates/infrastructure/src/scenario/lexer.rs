//! Line splitting for the scenario language.
//!
//! `;` starts a comment unless it appears inside a double-quoted string.
//! A backslash escapes the next character both inside and outside quotes.

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Line {
    /// 1-based line number in the source file.
    pub number: usize,
    /// Comment-stripped, trimmed text.
    pub text: String,
    pub tokens: Vec<String>,
    /// True only for lines with no characters at all besides whitespace.
    /// A comment-only line has no tokens but is not blank.
    pub blank: bool,
}

impl Line {
    pub fn keyword(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    pub fn args(&self) -> &[String] {
        self.tokens.get(1..).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

pub(crate) fn split_lines(text: &str) -> Vec<Line> {
    text.lines()
        .enumerate()
        .map(|(i, raw)| {
            let stripped = strip_comment(raw).trim();
            Line {
                number: i + 1,
                text: stripped.to_string(),
                tokens: tokenize(stripped),
                blank: raw.trim().is_empty(),
            }
        })
        .collect()
}

pub(crate) fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Whitespace split that keeps quoted strings (quotes included) together.
pub(crate) fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in line.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                current.push(c);
                in_quotes = !in_quotes;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_outside_quotes_is_stripped() {
        assert_eq!(strip_comment("STEP 1 QUERY ; send it"), "STEP 1 QUERY ");
        assert_eq!(
            strip_comment(r#"a. TXT "semi;colon" ; real"#),
            r#"a. TXT "semi;colon" "#
        );
        assert_eq!(strip_comment(r"a. TXT not\;comment"), r"a. TXT not\;comment");
    }

    #[test]
    fn test_tokenize_keeps_quoted_strings() {
        let tokens = tokenize(r#"txt.example.  IN TXT "hello world"  "x\"y""#);
        assert_eq!(
            tokens,
            vec!["txt.example.", "IN", "TXT", "\"hello world\"", r#""x\"y""#]
        );
    }

    #[test]
    fn test_blank_versus_comment_only() {
        let lines = split_lines("STEP 1 REPLAY\n; note\n\nEND");
        assert!(!lines[1].blank);
        assert!(lines[1].is_empty());
        assert!(lines[2].blank);
        assert_eq!(lines[3].number, 4);
        assert_eq!(lines[0].keyword(), Some("STEP"));
        assert_eq!(lines[0].args().len(), 2);
    }
}
