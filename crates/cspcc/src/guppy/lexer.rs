//! The Guppy tokenizer.
//!
//! Guppy is indentation-structured. Indentation is measured in columns
//! after expanding tabs to the next multiple of 8; each strictly-greater
//! column pushes one `Indent`, a smaller column pops matching levels and
//! must land exactly on a previously seen column (otherwise an error is
//! recorded and the nearest enclosing level is assumed).

use crate::{
    lexer::{Token, TokenKind, decode_escapes},
    origin::{LexFileId, Origin},
};

/// Keywords recognised by this front-end.
pub const KEYWORDS: &[&str] = &[
    "alt", "bool", "byte", "chan", "def", "else", "false", "for", "if", "int", "par", "pri", "real", "return", "seq",
    "skip", "stop", "string", "timer", "true", "val", "var", "while",
];

/// Multi-character symbols, longest first so prefixes don't shadow them.
const SYMBOLS2: &[&str] = &[":=", "::", "->", "<=", ">=", "<>"];
const SYMBOLS1: &[char] = &[
    '?', '!', '+', '-', '*', '/', '\\', '(', ')', '[', ']', ',', '=', '<', '>', '.', '%', ':',
];

const TAB_WIDTH: usize = 8;

/// Tokenizer output: the token stream plus any recorded errors.
#[derive(Debug)]
pub struct LexOutput {
    pub tokens: Vec<Token>,
    /// `(line, message)` pairs for the caller to report.
    pub errors: Vec<(u32, String)>,
}

/// Tokenizes a whole source buffer.
#[must_use]
pub fn tokenize(src: &str, file: LexFileId) -> LexOutput {
    let mut tokens = Vec::new();
    let mut errors: Vec<(u32, String)> = Vec::new();
    let mut indent_stack: Vec<usize> = vec![0];
    let mut lineno: u32 = 0;

    for line in src.lines() {
        lineno += 1;
        let origin = Origin::new(file, lineno);

        // measure indentation, expanding tabs
        let mut column = 0usize;
        let mut rest = line;
        for (i, c) in line.char_indices() {
            match c {
                ' ' => column += 1,
                '\t' => column = (column / TAB_WIDTH + 1) * TAB_WIDTH,
                _ => {
                    rest = &line[i..];
                    break;
                }
            }
        }
        if line.chars().all(char::is_whitespace) {
            // blank lines carry no indentation structure
            continue;
        }

        let current = *indent_stack.last().expect("indent stack never empties");
        if column > current {
            indent_stack.push(column);
            tokens.push(Token::new(TokenKind::Indent, origin));
        } else if column < current {
            while *indent_stack.last().expect("indent stack never empties") > column {
                indent_stack.pop();
                tokens.push(Token::new(TokenKind::Outdent, origin));
            }
            if *indent_stack.last().expect("indent stack never empties") != column {
                errors.push((lineno, format!("bad outdent to column {column}")));
                indent_stack.push(column);
            }
        }

        lex_line(rest, origin, &mut tokens, &mut errors);
        tokens.push(Token::new(TokenKind::Newline, origin));
    }

    let end_origin = Origin::new(file, lineno + 1);
    while indent_stack.len() > 1 {
        indent_stack.pop();
        tokens.push(Token::new(TokenKind::Outdent, end_origin));
    }
    tokens.push(Token::new(TokenKind::End, end_origin));
    LexOutput { tokens, errors }
}

fn lex_line(text: &str, origin: Origin, tokens: &mut Vec<Token>, errors: &mut Vec<(u32, String)>) {
    let mut chars = text.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c == ' ' || c == '\t' {
            chars.next();
            continue;
        }
        if c == '#' {
            tokens.push(Token::new(TokenKind::Comment, origin));
            return;
        }
        if c == '"' {
            chars.next();
            let mut raw = String::new();
            let mut closed = false;
            let mut prev_backslash = false;
            for (_, sc) in chars.by_ref() {
                if sc == '"' && !prev_backslash {
                    closed = true;
                    break;
                }
                prev_backslash = sc == '\\' && !prev_backslash;
                raw.push(sc);
            }
            if !closed {
                errors.push((origin.line, "unterminated string literal".to_owned()));
            }
            match decode_escapes(&raw) {
                Ok(bytes) => tokens.push(Token::new(TokenKind::Str(bytes), origin)),
                Err(err) => errors.push((origin.line, err.to_string())),
            }
            continue;
        }
        if c == '\'' {
            chars.next();
            let mut raw = String::new();
            let mut closed = false;
            let mut prev_backslash = false;
            for (_, sc) in chars.by_ref() {
                if sc == '\'' && !prev_backslash {
                    closed = true;
                    break;
                }
                prev_backslash = sc == '\\' && !prev_backslash;
                raw.push(sc);
            }
            if !closed {
                errors.push((origin.line, "unterminated character literal".to_owned()));
            }
            match decode_escapes(&raw) {
                Ok(bytes) if bytes.len() == 1 => {
                    tokens.push(Token::new(TokenKind::Integer(i64::from(bytes[0])), origin));
                }
                Ok(_) => errors.push((origin.line, "character literal must be one byte".to_owned())),
                Err(err) => errors.push((origin.line, err.to_string())),
            }
            continue;
        }
        if c.is_ascii_digit() {
            let text_rest = &text[start..];
            let (token, used) = lex_number(text_rest);
            match token {
                Ok(kind) => tokens.push(Token::new(kind, origin)),
                Err(msg) => errors.push((origin.line, msg)),
            }
            for _ in 0..used {
                chars.next();
            }
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let mut end = start;
            while let Some(&(i, nc)) = chars.peek() {
                if nc.is_ascii_alphanumeric() || nc == '_' || nc == '.' {
                    end = i + nc.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let word = &text[start..end];
            if KEYWORDS.contains(&word) {
                tokens.push(Token::new(TokenKind::Keyword(word.to_owned()), origin));
            } else {
                tokens.push(Token::new(TokenKind::Name(word.to_owned()), origin));
            }
            continue;
        }
        // symbols, longest first
        let text_rest = &text[start..];
        if let Some(sym) = SYMBOLS2.iter().find(|s| text_rest.starts_with(**s)) {
            tokens.push(Token::new(TokenKind::Symbol((*sym).to_owned()), origin));
            chars.next();
            chars.next();
            continue;
        }
        if SYMBOLS1.contains(&c) {
            tokens.push(Token::new(TokenKind::Symbol(c.to_string()), origin));
            chars.next();
            continue;
        }
        errors.push((origin.line, format!("unexpected character '{c}'")));
        chars.next();
    }
}

/// Lexes a number at the start of `text`; returns the token and the number
/// of characters consumed.
fn lex_number(text: &str) -> (Result<TokenKind, String>, usize) {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        let digits: String = hex.chars().take_while(char::is_ascii_hexdigit).collect();
        if digits.is_empty() {
            return (Err("hex literal needs digits".to_owned()), 2);
        }
        let used = 2 + digits.len();
        return match i64::from_str_radix(&digits, 16) {
            Ok(v) => (Ok(TokenKind::Integer(v)), used),
            Err(_) => (Err(format!("hex literal 0x{digits} out of range")), used),
        };
    }
    let int_digits: String = text.chars().take_while(char::is_ascii_digit).collect();
    let after = &text[int_digits.len()..];
    // a real needs digits on both sides of the point
    if let Some(frac_text) = after.strip_prefix('.') {
        let frac: String = frac_text.chars().take_while(char::is_ascii_digit).collect();
        if !frac.is_empty() {
            let used = int_digits.len() + 1 + frac.len();
            let literal = &text[..used];
            return match literal.parse::<f64>() {
                Ok(v) => (Ok(TokenKind::Real(v)), used),
                Err(_) => (Err(format!("bad real literal {literal}")), used),
            };
        }
    }
    let used = int_digits.len();
    match int_digits.parse::<i64>() {
        Ok(v) => (Ok(TokenKind::Integer(v)), used),
        Err(_) => (Err(format!("integer literal {int_digits} out of range")), used),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::LexFileId;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src, LexFileId::BUILTIN).tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords_names_and_symbols() {
        let toks = kinds("seq x := 1");
        assert_eq!(
            toks,
            vec![
                TokenKind::Keyword("seq".into()),
                TokenKind::Name("x".into()),
                TokenKind::Symbol(":=".into()),
                TokenKind::Integer(1),
                TokenKind::Newline,
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn test_indent_outdent_pairing() {
        let src = "seq\n  x := 1\n  y := 2\nskip\n";
        let toks = kinds(src);
        let indents = toks.iter().filter(|t| **t == TokenKind::Indent).count();
        let outdents = toks.iter().filter(|t| **t == TokenKind::Outdent).count();
        assert_eq!(indents, 1);
        assert_eq!(outdents, 1);
    }

    #[test]
    fn test_dangling_indent_closed_at_end() {
        let toks = kinds("seq\n  par\n    skip\n");
        let indents = toks.iter().filter(|t| **t == TokenKind::Indent).count();
        let outdents = toks.iter().filter(|t| **t == TokenKind::Outdent).count();
        assert_eq!(indents, 2);
        assert_eq!(outdents, 2, "end of file closes open indents");
        assert_eq!(toks.last(), Some(&TokenKind::End));
    }

    #[test]
    fn test_bad_outdent_reported() {
        let out = tokenize("seq\n    skip\n  skip\n", LexFileId::BUILTIN);
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].1.contains("bad outdent"));
    }

    #[test]
    fn test_tab_expansion() {
        // a tab indents to column 8; two spaces only to column 2
        let out = tokenize("seq\n\tskip\n", LexFileId::BUILTIN);
        let indents = out.tokens.iter().filter(|t| t.kind == TokenKind::Indent).count();
        assert_eq!(indents, 1);
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_string_and_char_literals() {
        let toks = kinds("\"ab\\n\" 'x'");
        assert_eq!(
            toks,
            vec![
                TokenKind::Str(b"ab\n".to_vec()),
                TokenKind::Integer(i64::from(b'x')),
                TokenKind::Newline,
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let toks = kinds("42 0x1f 3.5");
        assert_eq!(
            toks,
            vec![
                TokenKind::Integer(42),
                TokenKind::Integer(31),
                TokenKind::Real(3.5),
                TokenKind::Newline,
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn test_comment_runs_to_end_of_line() {
        let toks = kinds("x # trailing words := 9\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::Name("x".into()),
                TokenKind::Comment,
                TokenKind::Newline,
                TokenKind::End,
            ]
        );
    }
}
