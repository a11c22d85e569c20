//! SQL tokenizer
//!
//! Produces words, quoted identifiers, literals and single-character symbols
//! with their byte offsets. Comments and whitespace are skipped.

use crate::detection::{ParseError, ParseResult};

/// Token kind
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare word: keyword or unquoted identifier
    Word(String),
    /// `"ident"`, `` `ident` `` or `[ident]`
    Quoted(String),
    /// `'text'`
    Str(String),
    /// Numeric literal
    Number(String),
    /// Punctuation or operator character
    Symbol(char),
}

/// Token with its byte offset
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token kind
    pub kind: TokenKind,
    /// Offset of the first byte
    pub offset: usize,
}

impl Token {
    /// Whether this is the given keyword, case-insensitively
    #[must_use]
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.kind, TokenKind::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    /// Whether this is the given symbol
    #[must_use]
    pub fn is_symbol(&self, symbol: char) -> bool {
        self.kind == TokenKind::Symbol(symbol)
    }

    /// Identifier text of a word or quoted identifier
    #[must_use]
    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Word(w) | TokenKind::Quoted(w) => Some(w),
            _ => None,
        }
    }

    /// Source-like rendering used when reassembling type names and defaults
    #[must_use]
    pub fn text(&self) -> String {
        match &self.kind {
            TokenKind::Word(w) | TokenKind::Quoted(w) | TokenKind::Number(w) => w.clone(),
            TokenKind::Str(s) => format!("'{s}'"),
            TokenKind::Symbol(c) => c.to_string(),
        }
    }
}

/// Tokenize SQL text
///
/// # Errors
///
/// Returns a syntax error at the start of an unterminated string, quoted
/// identifier or block comment
pub fn tokenize(text: &str) -> ParseResult<Vec<Token>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let c = bytes[pos];
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => pos += 1,
            b'-' if bytes.get(pos + 1) == Some(&b'-') => {
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
            }
            b'#' => {
                // MySQL line comment
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
            }
            b'/' if bytes.get(pos + 1) == Some(&b'*') => {
                let start = pos;
                let end = text[pos + 2..]
                    .find("*/")
                    .ok_or_else(|| unterminated("block comment", start))?;
                pos += 2 + end + 2;
            }
            b'\'' => {
                let (value, next) = quoted(text, pos, '\'', "string literal")?;
                tokens.push(Token { kind: TokenKind::Str(value), offset: pos });
                pos = next;
            }
            b'"' => {
                let (value, next) = quoted(text, pos, '"', "quoted identifier")?;
                tokens.push(Token { kind: TokenKind::Quoted(value), offset: pos });
                pos = next;
            }
            b'`' => {
                let (value, next) = quoted(text, pos, '`', "quoted identifier")?;
                tokens.push(Token { kind: TokenKind::Quoted(value), offset: pos });
                pos = next;
            }
            b'[' if bytes.get(pos + 1).is_some_and(|b| *b != b']') => {
                let (value, next) = quoted(text, pos, ']', "bracketed identifier")?;
                tokens.push(Token { kind: TokenKind::Quoted(value), offset: pos });
                pos = next;
            }
            b'0'..=b'9' => {
                let start = pos;
                while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                    pos += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Number(text[start..pos].to_string()),
                    offset: start,
                });
            }
            c if c.is_ascii_alphabetic() || c == b'_' || c >= 0x80 => {
                let start = pos;
                while pos < bytes.len()
                    && (bytes[pos].is_ascii_alphanumeric()
                        || bytes[pos] == b'_'
                        || bytes[pos] == b'$'
                        || bytes[pos] >= 0x80)
                {
                    pos += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Word(text[start..pos].to_string()),
                    offset: start,
                });
            }
            _ => {
                let symbol = text[pos..].chars().next().unwrap_or(' ');
                tokens.push(Token { kind: TokenKind::Symbol(symbol), offset: pos });
                pos += symbol.len_utf8();
            }
        }
    }
    Ok(tokens)
}

fn unterminated(what: &str, offset: usize) -> ParseError {
    ParseError::syntax_at(format!("unterminated {what}"), Some(offset), None)
}

/// Read a delimited value starting at `start`; a doubled closing delimiter
/// is an escaped delimiter
fn quoted(text: &str, start: usize, close: char, what: &str) -> ParseResult<(String, usize)> {
    let mut value = String::new();
    let mut chars = text[start + 1..].char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        if ch == close {
            if chars.peek().is_some_and(|(_, next)| *next == close) {
                value.push(close);
                chars.next();
                continue;
            }
            return Ok((value, start + 1 + idx + ch.len_utf8()));
        }
        value.push(ch);
    }
    Err(unterminated(what, start))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_and_offsets() {
        let tokens = tokenize("CREATE TABLE `users` (id INT); -- trailing").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Word("CREATE".into()));
        assert_eq!(tokens[2].kind, TokenKind::Quoted("users".into()));
        assert_eq!(tokens[2].offset, 13);
        assert!(tokens.last().unwrap().is_symbol(';'));
    }

    #[test]
    fn test_array_brackets_are_symbols() {
        let tokens = tokenize("tags TEXT[] , [Order Id] INT").unwrap();
        assert!(tokens[2].is_symbol('['));
        assert!(tokens[3].is_symbol(']'));
        assert_eq!(tokens[5].kind, TokenKind::Quoted("Order Id".into()));
    }

    #[test]
    fn test_escaped_quotes_and_unterminated_string() {
        let tokens = tokenize("DEFAULT 'it''s'").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Str("it's".into()));

        let err = tokenize("x VARCHAR DEFAULT 'oops").unwrap_err();
        assert_eq!(err.offset, Some(18));
    }
}
