//! Tolerant token scanner for JS/TS module source.
//!
//! The transform only needs to see the module's top-level statement
//! structure: imports, exports, declarations, and the spans of initializer
//! expressions. A full ECMAScript grammar is out of scope; this scanner
//! produces significant tokens with byte spans, skipping whitespace and
//! comments, and treating string/template/regex literals as single tokens
//! so that brace tracking above them stays exact.
//!
//! Anything the scanner cannot tokenize is a [`ParseError`], which the
//! caller turns into "no transform applicable", never a corrupted module.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unterminated string literal starting at byte {0}")]
    UnterminatedString(usize),
    #[error("unterminated template literal starting at byte {0}")]
    UnterminatedTemplate(usize),
    #[error("unterminated block comment starting at byte {0}")]
    UnterminatedComment(usize),
    #[error("unterminated regex literal starting at byte {0}")]
    UnterminatedRegex(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    Template,
    Regex,
    Punct,
}

/// A significant token with its byte span in the original source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'s>(&self, src: &'s str) -> &'s str {
        &src[self.start..self.end]
    }

    pub fn is_punct(&self, src: &str, p: &str) -> bool {
        self.kind == TokenKind::Punct && self.text(src) == p
    }

    pub fn is_ident(&self, src: &str, name: &str) -> bool {
        self.kind == TokenKind::Ident && self.text(src) == name
    }
}

/// Keywords after which a `/` starts a regex literal rather than division.
const REGEX_PRECEDING_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

pub fn tokenize(src: &str) -> Result<Vec<Token>, ParseError> {
    let bytes = src.as_bytes();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'/' => {
                if bytes.get(i + 1) == Some(&b'/') {
                    i = skip_line_comment(bytes, i);
                } else if bytes.get(i + 1) == Some(&b'*') {
                    i = skip_block_comment(bytes, i)?;
                } else if regex_allowed(src, &tokens) {
                    let end = scan_regex(bytes, i)?;
                    tokens.push(Token { kind: TokenKind::Regex, start: i, end });
                    i = end;
                } else {
                    tokens.push(Token { kind: TokenKind::Punct, start: i, end: i + 1 });
                    i += 1;
                }
            }
            b'"' | b'\'' => {
                let end = scan_string(bytes, i)?;
                tokens.push(Token { kind: TokenKind::Str, start: i, end });
                i = end;
            }
            b'`' => {
                let end = scan_template(bytes, i)?;
                tokens.push(Token { kind: TokenKind::Template, start: i, end });
                i = end;
            }
            b'0'..=b'9' => {
                let end = scan_number(bytes, i);
                tokens.push(Token { kind: TokenKind::Number, start: i, end });
                i = end;
            }
            b'.' if matches!(bytes.get(i + 1), Some(b'.')) && matches!(bytes.get(i + 2), Some(b'.')) => {
                tokens.push(Token { kind: TokenKind::Punct, start: i, end: i + 3 });
                i += 3;
            }
            b'=' if bytes.get(i + 1) == Some(&b'>') => {
                tokens.push(Token { kind: TokenKind::Punct, start: i, end: i + 2 });
                i += 2;
            }
            _ if is_ident_start(b) => {
                let end = scan_ident(bytes, i);
                tokens.push(Token { kind: TokenKind::Ident, start: i, end });
                i = end;
            }
            _ => {
                // Multi-byte UTF-8 outside identifiers only occurs inside
                // literals, which are consumed above; everything else is a
                // one-byte punctuator.
                let len = utf8_len(b);
                tokens.push(Token { kind: TokenKind::Punct, start: i, end: i + len });
                i += len;
            }
        }
    }

    Ok(tokens)
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$' || b >= 0x80
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

fn utf8_len(b: u8) -> usize {
    match b {
        0xF0..=0xF7 => 4,
        0xE0..=0xEF => 3,
        0xC0..=0xDF => 2,
        _ => 1,
    }
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 2;
    while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
    }
    i
}

fn skip_block_comment(bytes: &[u8], start: usize) -> Result<usize, ParseError> {
    let mut i = start + 2;
    while i + 1 < bytes.len() {
        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            return Ok(i + 2);
        }
        i += 1;
    }
    Err(ParseError::UnterminatedComment(start))
}

fn scan_string(bytes: &[u8], start: usize) -> Result<usize, ParseError> {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return Err(ParseError::UnterminatedString(start)),
            b if b == quote => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(ParseError::UnterminatedString(start))
}

/// Scan a template literal as one token, including `${ … }` interpolations.
/// Interpolation bodies get brace-balanced skipping with comments, strings
/// and nested templates respected; `/` inside an interpolation is treated as
/// a plain character.
fn scan_template(bytes: &[u8], start: usize) -> Result<usize, ParseError> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => return Ok(i + 1),
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                i = skip_interpolation(bytes, i + 2, start)?;
            }
            _ => i += 1,
        }
    }
    Err(ParseError::UnterminatedTemplate(start))
}

fn skip_interpolation(bytes: &[u8], mut i: usize, template_start: usize) -> Result<usize, ParseError> {
    let mut depth = 1usize;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            b'\'' | b'"' => i = scan_string(bytes, i)?,
            b'`' => i = scan_template(bytes, i)?,
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i)?,
            b'\\' => i += 2,
            _ => i += 1,
        }
    }
    Err(ParseError::UnterminatedTemplate(template_start))
}

fn scan_number(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'$' {
            i += 1;
        } else if (b == b'+' || b == b'-') && matches!(bytes.get(i.wrapping_sub(1)), Some(b'e' | b'E')) {
            i += 1;
        } else {
            break;
        }
    }
    i
}

fn scan_ident(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() && is_ident_continue(bytes[i]) {
        i += 1;
    }
    i
}

fn scan_regex(bytes: &[u8], start: usize) -> Result<usize, ParseError> {
    let mut i = start + 1;
    let mut in_class = false;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return Err(ParseError::UnterminatedRegex(start)),
            b'[' => {
                in_class = true;
                i += 1;
            }
            b']' => {
                in_class = false;
                i += 1;
            }
            b'/' if !in_class => {
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
                    i += 1;
                }
                return Ok(i);
            }
            _ => i += 1,
        }
    }
    Err(ParseError::UnterminatedRegex(start))
}

/// Decide whether a `/` at the current position starts a regex literal,
/// using the previous significant token. A `/` after an identifier,
/// literal, `)` or `]` is division; after `<` it is a JSX closing-tag
/// slash, never a regex. Mis-classification can only happen inside
/// expression bodies the classifier never rewrites, and at worst degrades
/// to a parse error and an untouched module.
fn regex_allowed(src: &str, tokens: &[Token]) -> bool {
    let Some(prev) = tokens.last() else {
        return true;
    };
    match prev.kind {
        TokenKind::Number | TokenKind::Str | TokenKind::Template | TokenKind::Regex => false,
        TokenKind::Ident => REGEX_PRECEDING_KEYWORDS.contains(&prev.text(src)),
        TokenKind::Punct => !matches!(prev.text(src), ")" | "]" | "}" | "<"),
    }
}
