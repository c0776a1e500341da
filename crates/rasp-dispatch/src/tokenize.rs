//! Lexical spans for SQL statements and shell commands.

use serde::{Deserialize, Serialize};

pub const SQL_GRAMMAR: &str = "sql";
pub const BASH_GRAMMAR: &str = "bash";

/// A native lexer producing token boundaries.
///
/// `lex` returns a flat list of byte offsets, `[start0, stop0, start1, stop1, ...]`.
pub trait SpanLexer: Send + Sync {
    fn lex(&self, text: &str, grammar: &str) -> Vec<usize>;
}

impl<F> SpanLexer for F
where
    F: Fn(&str, &str) -> Vec<usize> + Send + Sync,
{
    fn lex(&self, text: &str, grammar: &str) -> Vec<usize> {
        self(text, grammar)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub start: usize,
    pub stop: usize,
    pub text: String,
}

/// Split `text` into tokens using `lexer`.
///
/// Never fails: without a lexer, or for empty input, the result is empty.
/// Offsets are paired in order and an unpaired trailing offset is ignored.
/// Offsets past the end are clamped, a reversed pair is swapped, and a span
/// that cuts through a multi-byte character is decoded lossily.
pub fn tokenize(text: &str, grammar: &str, lexer: Option<&dyn SpanLexer>) -> Vec<Token> {
    let Some(lexer) = lexer else {
        return Vec::new();
    };
    if text.is_empty() {
        return Vec::new();
    }

    let bytes = text.as_bytes();
    let offsets = lexer.lex(text, grammar);

    offsets
        .chunks_exact(2)
        .map(|pair| {
            let start = pair[0];
            let stop = pair[1];
            let (lo, hi) = if start <= stop {
                (start, stop)
            } else {
                (stop, start)
            };
            let lo = lo.min(bytes.len());
            let hi = hi.min(bytes.len());
            Token {
                start,
                stop,
                text: String::from_utf8_lossy(&bytes[lo..hi]).into_owned(),
            }
        })
        .collect()
}

pub fn sql_tokenize(query: &str, lexer: Option<&dyn SpanLexer>) -> Vec<Token> {
    tokenize(query, SQL_GRAMMAR, lexer)
}

pub fn cmd_tokenize(command: &str, lexer: Option<&dyn SpanLexer>) -> Vec<Token> {
    tokenize(command, BASH_GRAMMAR, lexer)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Splits on ASCII whitespace, like a trivial shell lexer.
    fn whitespace_lexer(text: &str, _grammar: &str) -> Vec<usize> {
        let mut offsets = Vec::new();
        let mut start = None;
        for (i, b) in text.bytes().enumerate() {
            match (b.is_ascii_whitespace(), start) {
                (false, None) => start = Some(i),
                (true, Some(s)) => {
                    offsets.extend([s, i]);
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            offsets.extend([s, text.len()]);
        }
        offsets
    }

    #[test]
    fn pairs_offsets_into_tokens() {
        let tokens = cmd_tokenize("cat /etc/passwd", Some(&whitespace_lexer));
        assert_eq!(
            tokens,
            vec![
                Token {
                    start: 0,
                    stop: 3,
                    text: "cat".to_string()
                },
                Token {
                    start: 4,
                    stop: 15,
                    text: "/etc/passwd".to_string()
                },
            ]
        );
    }

    #[test]
    fn missing_lexer_or_empty_input_yields_nothing() {
        assert!(sql_tokenize("select 1", None).is_empty());
        assert!(sql_tokenize("", Some(&whitespace_lexer)).is_empty());
    }

    #[test]
    fn odd_trailing_offset_is_ignored() {
        let lexer = |_: &str, _: &str| vec![0, 6, 7];
        let tokens = sql_tokenize("select 1", Some(&lexer));
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "select");
    }

    #[test]
    fn out_of_range_and_reversed_offsets_are_tolerated() {
        let lexer = |_: &str, _: &str| vec![6, 0, 7, 99];
        let tokens = sql_tokenize("select 1", Some(&lexer));
        assert_eq!(tokens[0].text, "select");
        assert_eq!(tokens[1].text, "1");
        assert_eq!(tokens[1].stop, 99);
    }

    #[test]
    fn grammar_is_forwarded() {
        let lexer = |text: &str, grammar: &str| {
            assert_eq!(grammar, SQL_GRAMMAR);
            vec![0, text.len()]
        };
        assert_eq!(sql_tokenize("x", Some(&lexer)).len(), 1);
    }
}
