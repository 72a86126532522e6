//! The token-stream contract shared by every front-end.
//!
//! Tokens are tagged unions carrying their source origin; a pushback buffer
//! sits in front of any token source so parsers can peek and retreat. The
//! concrete tokenizers live with their front-ends (see `guppy::lexer`); this
//! module owns the shapes and the escape alphabet common to all of them.

use crate::origin::Origin;

/// Token tags.
///
/// `Iname` is an in-line name special (used by the assembler front-ends);
/// `Lspecial` carries language-specific punctuation the shared machinery
/// passes through untouched.
#[derive(Debug, Clone, PartialEq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum TokenKind {
    NoToken,
    Keyword(String),
    Integer(i64),
    Real(f64),
    /// Owned bytes: the escape alphabet has already been decoded.
    Str(Vec<u8>),
    Name(String),
    Symbol(String),
    Comment,
    Newline,
    Indent,
    Outdent,
    Iname(String),
    Lspecial(String),
    End,
}

/// One token with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub origin: Origin,
}

impl Token {
    #[must_use]
    pub fn new(kind: TokenKind, origin: Origin) -> Self {
        Self { kind, origin }
    }

    /// Whether this is the end-of-stream token.
    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self.kind, TokenKind::End)
    }
}

/// Anything that yields tokens. Returns `End` forever once exhausted.
pub trait TokenSource {
    fn next_token(&mut self) -> Token;
}

/// Token source over a pre-lexed vector; used by tests and by tokenizers
/// that lex a whole file up front.
#[derive(Debug)]
pub struct VecSource {
    tokens: std::vec::IntoIter<Token>,
    end_origin: Origin,
}

impl VecSource {
    #[must_use]
    pub fn new(tokens: Vec<Token>, end_origin: Origin) -> Self {
        Self {
            tokens: tokens.into_iter(),
            end_origin,
        }
    }
}

impl TokenSource for VecSource {
    fn next_token(&mut self) -> Token {
        self.tokens
            .next()
            .unwrap_or_else(|| Token::new(TokenKind::End, self.end_origin))
    }
}

/// Pushback buffer in front of a token source.
///
/// `push_back` returns tokens in LIFO order, so a parser can retreat over
/// several tokens and re-read them in their original order.
#[derive(Debug)]
pub struct TokenBuffer<S: TokenSource> {
    source: S,
    pushback: Vec<Token>,
}

impl<S: TokenSource> TokenBuffer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            pushback: Vec::new(),
        }
    }

    /// Next token, preferring pushed-back ones.
    pub fn next(&mut self) -> Token {
        self.pushback.pop().unwrap_or_else(|| self.source.next_token())
    }

    /// Returns a token to the front of the stream.
    pub fn push_back(&mut self, token: Token) {
        self.pushback.push(token);
    }

    /// Peeks at the next token without consuming it.
    pub fn peek(&mut self) -> Token {
        let token = self.next();
        self.push_back(token.clone());
        token
    }

    /// Consumes the next token if it matches, else pushes it back.
    pub fn accept(&mut self, kind: &TokenKind) -> bool {
        let token = self.next();
        if token.kind == *kind {
            true
        } else {
            self.push_back(token);
            false
        }
    }
}

/// Failure decoding a string escape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscapeError {
    /// `\` at end of input.
    Truncated,
    /// Unknown escape character.
    Unknown(char),
    /// `\x` not followed by two hex digits.
    BadHex,
}

impl std::fmt::Display for EscapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated => write!(f, "string ends inside an escape"),
            Self::Unknown(c) => write!(f, "unknown escape character '\\{c}'"),
            Self::BadHex => write!(f, "\\x escape needs two hex digits"),
        }
    }
}

/// Decodes the shared escape alphabet: `\n \r \t \' \" \\` and `\xHH`.
///
/// Front-ends with richer alphabets decode their extras first and delegate
/// the common cases here.
pub fn decode_escapes(raw: &str) -> Result<Vec<u8>, EscapeError> {
    let mut out = Vec::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            None => return Err(EscapeError::Truncated),
            Some('n') => out.push(b'\n'),
            Some('r') => out.push(b'\r'),
            Some('t') => out.push(b'\t'),
            Some('\'') => out.push(b'\''),
            Some('"') => out.push(b'"'),
            Some('\\') => out.push(b'\\'),
            Some('x') => {
                let hi = chars.next().and_then(|c| c.to_digit(16)).ok_or(EscapeError::BadHex)?;
                let lo = chars.next().and_then(|c| c.to_digit(16)).ok_or(EscapeError::BadHex)?;
                out.push(u8::try_from(hi * 16 + lo).expect("two hex digits fit a byte"));
            }
            Some(other) => return Err(EscapeError::Unknown(other)),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(kind: TokenKind) -> Token {
        Token::new(kind, Origin::BUILTIN)
    }

    #[test]
    fn test_pushback_preserves_order() {
        let tokens = vec![tok(TokenKind::Name("a".into())), tok(TokenKind::Name("b".into()))];
        let mut buf = TokenBuffer::new(VecSource::new(tokens, Origin::BUILTIN));

        let a = buf.next();
        let b = buf.next();
        buf.push_back(b.clone());
        buf.push_back(a.clone());
        assert_eq!(buf.next(), a);
        assert_eq!(buf.next(), b);
        assert!(buf.next().is_end());
        assert!(buf.next().is_end(), "end repeats forever");
    }

    #[test]
    fn test_peek_does_not_consume() {
        let tokens = vec![tok(TokenKind::Integer(42))];
        let mut buf = TokenBuffer::new(VecSource::new(tokens, Origin::BUILTIN));
        assert_eq!(buf.peek().kind, TokenKind::Integer(42));
        assert_eq!(buf.next().kind, TokenKind::Integer(42));
    }

    #[test]
    fn test_decode_escapes() {
        assert_eq!(decode_escapes("a\\nb").expect("valid"), b"a\nb");
        assert_eq!(decode_escapes("\\x41\\x0a").expect("valid"), b"A\n");
        assert_eq!(decode_escapes("\\'\\\"\\\\").expect("valid"), b"'\"\\");
        assert_eq!(decode_escapes("\\q"), Err(EscapeError::Unknown('q')));
        assert_eq!(decode_escapes("\\x4"), Err(EscapeError::BadHex));
        assert_eq!(decode_escapes("tail\\"), Err(EscapeError::Truncated));
    }
}
