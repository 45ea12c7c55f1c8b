use std::fmt;

use lazy_static::lazy_static;
use miette::Result;
use regex::Regex;

use crate::error;
use crate::lexer::cursor::Cursor;
use crate::symbol::{Register, Span, SrcOffset};

pub mod cursor;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LiteralKind {
    /// `7Fh` or `0x7F`
    Hex(u16),
    /// `123`
    Dec(u16),
    /// `"…"` or `'…'`, span includes the quotes
    Str,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    /// Mnemonic, directive, or label name.
    Ident,
    Reg(Register),
    Lit(LiteralKind),
    Colon,
    Comma,
    LBracket,
    RBracket,
    Comment,
    /// Whitespace
    Junk,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Ident => "identifier",
            TokenKind::Reg(_) => "register",
            TokenKind::Lit(LiteralKind::Str) => "string literal",
            TokenKind::Lit(_) => "numeric literal",
            TokenKind::Colon => "':'",
            TokenKind::Comma => "','",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Comment => "comment",
            TokenKind::Junk => "whitespace",
            TokenKind::Eof => "end of line",
        };
        f.write_str(name)
    }
}

/// Pattern discriminants; values are attached after the match.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Pat {
    Junk,
    Comment,
    HexPrefix,
    HexSuffix,
    Dec,
    Reg,
    Ident,
    Str,
    Colon,
    Comma,
    LBracket,
    RBracket,
}

lazy_static! {
    // Order is important since some patterns are subpatterns of others.
    // Do NOT rearrange without a good hard think.
    static ref PATTERNS: Vec<(Pat, Regex)> = vec![
        (Pat::Junk, Regex::new(r"^\s+").unwrap()),
        (Pat::Comment, Regex::new(r"^;.*").unwrap()),
        (Pat::HexPrefix, Regex::new(r"^0[xX][0-9a-fA-F]+\b").unwrap()),
        (Pat::HexSuffix, Regex::new(r"^[0-9][0-9a-fA-F]*[hH]\b").unwrap()),
        (Pat::Dec, Regex::new(r"^[0-9]+\b").unwrap()),
        (
            Pat::Reg,
            Regex::new(r"^(?i)(AL|CL|DL|BL|AH|CH|DH|BH|AX|CX|DX|BX|SP|BP|SI|DI)\b").unwrap(),
        ),
        // Includes mnemonics, directives, and labels.
        (Pat::Ident, Regex::new(r"^[a-zA-Z_]\w*\b").unwrap()),
        (Pat::Str, Regex::new(r#"^("([^"\\]|\\.)*"|'([^'\\]|\\.)*')"#).unwrap()),
        (Pat::Colon, Regex::new(r"^:").unwrap()),
        (Pat::Comma, Regex::new(r"^,").unwrap()),
        (Pat::LBracket, Regex::new(r"^\[").unwrap()),
        (Pat::RBracket, Regex::new(r"^\]").unwrap()),
    ];
}

/// Tokenize one source line, dropping whitespace and comments. `base` is the
/// line's byte offset within the full source.
pub fn tokenize_line(line: &str, base: usize) -> Result<Vec<Token>> {
    let mut cursor = Cursor::new(line, base);
    let mut toks = Vec::new();
    loop {
        let token = cursor.advance_token()?;
        match token.kind {
            TokenKind::Eof => break,
            TokenKind::Junk | TokenKind::Comment => continue,
            _ => toks.push(token),
        }
    }
    Ok(toks)
}

impl Cursor<'_> {
    pub fn advance_token(&mut self) -> Result<Token> {
        if self.is_eof() {
            return Ok(Token {
                kind: TokenKind::Eof,
                span: Span::new(SrcOffset(self.abs_pos()), 0),
            });
        }

        for (pat, re) in PATTERNS.iter() {
            if let Some(tok) = re.find(self.rest()) {
                let span = Span::new(SrcOffset(self.abs_pos()), tok.len());
                let kind = token_kind(*pat, tok.as_str(), span)?;
                self.advance(tok.len());
                return Ok(Token { kind, span });
            }
        }

        // An opening quote with no matching close never fits the Str pattern.
        let rest = self.rest();
        if rest.starts_with('"') || rest.starts_with('\'') {
            return Err(error::lex_unclosed_str(Span::new(
                SrcOffset(self.abs_pos()),
                rest.len(),
            )));
        }
        let start = self.abs_pos();
        self.bump();
        Err(error::lex_unknown(Span::new(
            SrcOffset(start),
            self.abs_pos() - start,
        )))
    }
}

fn token_kind(pat: Pat, text: &str, span: Span) -> Result<TokenKind> {
    let kind = match pat {
        Pat::Junk => TokenKind::Junk,
        Pat::Comment => TokenKind::Comment,
        Pat::HexPrefix => TokenKind::Lit(LiteralKind::Hex(parse_lit(&text[2..], 16, span)?)),
        Pat::HexSuffix => TokenKind::Lit(LiteralKind::Hex(parse_lit(
            &text[..text.len() - 1],
            16,
            span,
        )?)),
        Pat::Dec => TokenKind::Lit(LiteralKind::Dec(parse_lit(text, 10, span)?)),
        // The pattern only matches valid register names.
        Pat::Reg => TokenKind::Reg(text.parse().unwrap()),
        Pat::Ident => TokenKind::Ident,
        Pat::Str => TokenKind::Lit(LiteralKind::Str),
        Pat::Colon => TokenKind::Colon,
        Pat::Comma => TokenKind::Comma,
        Pat::LBracket => TokenKind::LBracket,
        Pat::RBracket => TokenKind::RBracket,
    };
    Ok(kind)
}

fn parse_lit(digits: &str, radix: u32, span: Span) -> Result<u16> {
    match u32::from_str_radix(digits, radix) {
        Ok(val) if val <= 0xFFFF => Ok(val as u16),
        _ => Err(error::lex_invalid_lit(span)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(line: &str) -> Vec<TokenKind> {
        tokenize_line(line, 0)
            .unwrap()
            .into_iter()
            .map(|tok| tok.kind)
            .collect()
    }

    #[test]
    fn tokenize_instruction() {
        assert_eq!(
            kinds("MOV AX, 10"),
            vec![
                TokenKind::Ident,
                TokenKind::Reg(Register::AX),
                TokenKind::Comma,
                TokenKind::Lit(LiteralKind::Dec(10)),
            ]
        );
    }

    #[test]
    fn tokenize_hex_forms() {
        assert_eq!(
            kinds("7Fh 0x7F 0FFh"),
            vec![
                TokenKind::Lit(LiteralKind::Hex(0x7F)),
                TokenKind::Lit(LiteralKind::Hex(0x7F)),
                TokenKind::Lit(LiteralKind::Hex(0xFF)),
            ]
        );
    }

    #[test]
    fn tokenize_indexed_operand() {
        assert_eq!(
            kinds("data[SI]"),
            vec![
                TokenKind::Ident,
                TokenKind::LBracket,
                TokenKind::Reg(Register::SI),
                TokenKind::RBracket,
            ]
        );
    }

    #[test]
    fn tokenize_comment_only() {
        assert!(kinds("  ; just a comment").is_empty());
    }

    #[test]
    fn tokenize_label_with_colon() {
        assert_eq!(kinds("top:"), vec![TokenKind::Ident, TokenKind::Colon]);
    }

    #[test]
    fn tokenize_oversized_literal() {
        assert!(tokenize_line("DW 65536", 0).is_err());
    }

    #[test]
    fn tokenize_unclosed_string() {
        assert!(tokenize_line("DB \"oops", 0).is_err());
    }

    #[test]
    fn register_names_case_insensitive() {
        assert_eq!(kinds("al")[0], TokenKind::Reg(Register::AL));
    }
}
