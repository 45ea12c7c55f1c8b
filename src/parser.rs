use std::{borrow::Cow, iter::Peekable, str::FromStr, vec::IntoIter};

use miette::{Report, Result};

use crate::{
    air::{Air, AirStmt, AsmLine, Expr, Operand},
    error,
    lexer::{self, LiteralKind, Token, TokenKind},
    symbol::{DirKind, InstrKind, Span, SrcOffset},
};

/// Transforms source text into AIR, one line at a time.
pub struct AsmParser<'a> {
    /// Reference to the source file
    src: &'a str,
    /// Tokens of the line currently being parsed
    toks: Peekable<IntoIter<Token>>,
    /// Assembly intermediate representation
    air: Air,
}

impl<'a> AsmParser<'a> {
    pub fn new(src: &'a str) -> Self {
        AsmParser {
            src,
            toks: Vec::new().into_iter().peekable(),
            air: Air::new(),
        }
    }

    fn get_span(&self, span: Span) -> &'a str {
        &self.src[span.as_range()]
    }

    /// Parse every line. Errors are line-scoped: a broken line is skipped
    /// and reported, the rest of the file still parses.
    pub fn parse(mut self) -> (Air, Vec<(u32, Report)>) {
        let mut errors = Vec::new();
        let mut base = 0usize;
        let src = self.src;
        for (idx, raw) in src.split('\n').enumerate() {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            match self.parse_line(idx as u32, line, base) {
                Ok(Some(asm_line)) => self.air.push(asm_line),
                Ok(None) => {}
                Err(report) => errors.push((idx as u32, report)),
            }
            base += raw.len() + 1;
        }
        (self.air, errors)
    }

    fn parse_line(&mut self, idx: u32, line: &str, base: usize) -> Result<Option<AsmLine>> {
        let mut toks = lexer::tokenize_line(line, base)?;

        // A leading identifier is a label when followed by a colon, or bare
        // when a data directive follows.
        let mut label = None;
        if toks.len() >= 2 && toks[0].kind == TokenKind::Ident {
            match toks[1].kind {
                TokenKind::Colon => {
                    label = Some(self.get_span(toks[0].span).to_string());
                    toks.drain(..2);
                }
                TokenKind::Ident => {
                    let next = self.get_span(toks[1].span);
                    if DirKind::from_str(next).is_ok_and(|dir| dir.takes_bare_label()) {
                        label = Some(self.get_span(toks[0].span).to_string());
                        toks.drain(..1);
                    }
                }
                _ => {}
            }
        }

        self.toks = toks.into_iter().peekable();
        if self.toks.peek().is_none() {
            return Ok(label.map(|name| AsmLine::new(idx, Some(name), None)));
        }

        let has_label = label.is_some();
        let stmt = self.parse_stmt(has_label)?;
        if let Some(tok) = self.toks.next() {
            return Err(error::parse_trailing(tok.span));
        }
        Ok(Some(AsmLine::new(idx, label, Some(stmt))))
    }

    fn parse_stmt(&mut self, has_label: bool) -> Result<AirStmt> {
        let tok = self.next_or("a mnemonic or directive")?;
        if tok.kind != TokenKind::Ident {
            return Err(error::parse_unexpected("a mnemonic or directive", &tok));
        }
        let name = self.get_span(tok.span);
        if let Ok(dir) = DirKind::from_str(name) {
            return self.parse_directive(dir, has_label, tok.span);
        }
        if let Ok(kind) = InstrKind::from_str(name) {
            return self.parse_instr(kind);
        }
        Err(error::parse_unknown_mnemonic(tok.span, name))
    }

    /// Process operand tokens to form a valid AIR statement.
    fn parse_instr(&mut self, kind: InstrKind) -> Result<AirStmt> {
        match kind {
            InstrKind::Mov => {
                let (dst, dst_span) = self.expect_operand()?;
                self.expect(TokenKind::Comma)?;
                let (src, src_span) = self.expect_operand()?;
                if matches!(dst, Operand::Imm(_)) {
                    return Err(error::parse_bad_destination(dst_span));
                }
                if dst.is_mem() && src.is_mem() {
                    return Err(error::parse_mem_to_mem(src_span));
                }
                Ok(AirStmt::Mov { dst, src })
            }
            InstrKind::Bin(op) => {
                let (dst, dst_span) = self.expect_operand()?;
                self.expect(TokenKind::Comma)?;
                let (src, _) = self.expect_operand()?;
                let dst = match dst {
                    Operand::Reg(reg) => reg,
                    Operand::Imm(_) => return Err(error::parse_bad_destination(dst_span)),
                    _ => return Err(error::parse_reg_destination(dst_span, &op.to_string())),
                };
                Ok(AirStmt::Binary { op, dst, src })
            }
            InstrKind::Unary(op) => {
                let (target, span) = self.expect_operand()?;
                if matches!(target, Operand::Imm(_)) {
                    return Err(error::parse_invalid_unary(span, &op.to_string()));
                }
                Ok(AirStmt::Unary { op, target })
            }
            InstrKind::Jmp => Ok(AirStmt::Jmp {
                target: self.expect_expr()?,
            }),
            InstrKind::Jcc(cond) => Ok(AirStmt::Jcc {
                cond,
                target: self.expect_expr()?,
            }),
            InstrKind::Loop => Ok(AirStmt::Loop {
                target: self.expect_expr()?,
            }),
            InstrKind::Int => Ok(AirStmt::Int {
                vector: self.expect_expr()?,
            }),
            InstrKind::Nop => Ok(AirStmt::Nop),
            InstrKind::Hlt => Ok(AirStmt::Hlt),
            InstrKind::Ret => Ok(AirStmt::Ret),
        }
    }

    fn parse_directive(&mut self, dir: DirKind, has_label: bool, span: Span) -> Result<AirStmt> {
        match dir {
            DirKind::Org => {
                let tok = self.next_or("an address")?;
                match tok.kind {
                    TokenKind::Lit(LiteralKind::Dec(addr) | LiteralKind::Hex(addr)) => {
                        Ok(AirStmt::Org { addr })
                    }
                    _ => Err(error::parse_unexpected("a numeric address", &tok)),
                }
            }
            DirKind::Db => {
                let mut bytes = Vec::new();
                loop {
                    let tok = self.next_or("a byte value or string")?;
                    match tok.kind {
                        TokenKind::Lit(LiteralKind::Dec(val) | LiteralKind::Hex(val)) => {
                            if val > 0xFF {
                                return Err(error::asm_byte_range(val));
                            }
                            bytes.push(val as u8);
                        }
                        TokenKind::Lit(LiteralKind::Str) => {
                            let raw = self.get_span(tok.span);
                            // Each codepoint lands as one byte.
                            for c in unescape(&raw[1..raw.len() - 1]).chars() {
                                bytes.push((c as u32 & 0xFF) as u8);
                            }
                        }
                        _ => return Err(error::parse_unexpected("a byte value or string", &tok)),
                    }
                    if !self.take_comma() {
                        break;
                    }
                }
                Ok(AirStmt::Db { bytes })
            }
            DirKind::Dw => {
                let mut words = vec![self.expect_expr()?];
                while self.take_comma() {
                    words.push(self.expect_expr()?);
                }
                Ok(AirStmt::Dw { words })
            }
            DirKind::Equ => {
                if !has_label {
                    return Err(error::parse_equ_needs_label(span));
                }
                Ok(AirStmt::Equ {
                    value: self.expect_expr()?,
                })
            }
        }
    }

    /// Register, immediate, direct `[expr]`, or indexed `base[idx]`. A bare
    /// label reads as an immediate holding the label's address.
    fn expect_operand(&mut self) -> Result<(Operand, Span)> {
        let tok = self.next_or("an operand")?;
        match tok.kind {
            TokenKind::Reg(reg) => Ok((Operand::Reg(reg), tok.span)),
            TokenKind::Lit(LiteralKind::Dec(val) | LiteralKind::Hex(val)) => {
                Ok((Operand::Imm(Expr::Num(val)), tok.span))
            }
            TokenKind::LBracket => {
                let inner = self.expect_expr()?;
                let close = self.expect(TokenKind::RBracket)?;
                Ok((Operand::Direct(inner), join(tok.span, close.span)))
            }
            TokenKind::Ident => {
                let name = self.get_span(tok.span).to_string();
                if self
                    .toks
                    .peek()
                    .is_some_and(|next| next.kind == TokenKind::LBracket)
                {
                    self.toks.next();
                    let idx_tok = self.next_or("an index register")?;
                    let index = match idx_tok.kind {
                        TokenKind::Reg(reg) => reg,
                        _ => return Err(error::parse_invalid_index(idx_tok.span)),
                    };
                    let close = self.expect(TokenKind::RBracket)?;
                    Ok((
                        Operand::Indexed {
                            base: Expr::Sym(name),
                            index,
                        },
                        join(tok.span, close.span),
                    ))
                } else {
                    Ok((Operand::Imm(Expr::Sym(name)), tok.span))
                }
            }
            _ => Err(error::parse_unexpected("an operand", &tok)),
        }
    }

    fn expect_expr(&mut self) -> Result<Expr> {
        let tok = self.next_or("a number or label")?;
        match tok.kind {
            TokenKind::Lit(LiteralKind::Dec(val) | LiteralKind::Hex(val)) => Ok(Expr::Num(val)),
            TokenKind::Ident => Ok(Expr::Sym(self.get_span(tok.span).to_string())),
            _ => Err(error::parse_unexpected("a number or label", &tok)),
        }
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token> {
        match self.toks.next() {
            Some(tok) if tok.kind == expected => Ok(tok),
            Some(tok) => Err(error::parse_unexpected(&expected.to_string(), &tok)),
            None => Err(error::parse_eol(&expected.to_string())),
        }
    }

    fn take_comma(&mut self) -> bool {
        if self
            .toks
            .peek()
            .is_some_and(|tok| tok.kind == TokenKind::Comma)
        {
            self.toks.next();
            true
        } else {
            false
        }
    }

    fn next_or(&mut self, expected: &str) -> Result<Token> {
        self.toks.next().ok_or_else(|| error::parse_eol(expected))
    }
}

fn join(a: Span, b: Span) -> Span {
    Span::new(SrcOffset(a.offs()), b.end() - a.offs())
}

fn unescape(s: &str) -> Cow<str> {
    if s.find('\\').is_none() {
        return Cow::Borrowed(s);
    }
    let mut result = String::new();
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some('\'') => result.push('\''),
                Some(c) => {
                    result.push('\\');
                    result.push(c);
                }
                None => {
                    // Trailing backslash; include it as is
                    result.push('\\');
                }
            }
        } else {
            result.push(c);
        }
    }
    Cow::Owned(result)
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::symbol::{BinOp, Cond, Register, UnaryOp};

    fn parse_ok(src: &str) -> Air {
        let (air, errors) = AsmParser::new(src).parse();
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        air
    }

    fn parse_err(src: &str) -> String {
        let (_, errors) = AsmParser::new(src).parse();
        assert_eq!(errors.len(), 1, "expected exactly one error");
        errors[0].1.to_string()
    }

    #[test]
    fn parse_mov_basic() {
        let air = parse_ok("MOV AX, BX");
        assert_eq!(
            air.get(0),
            &AsmLine {
                line: 0,
                label: None,
                stmt: Some(AirStmt::Mov {
                    dst: Operand::Reg(Register::AX),
                    src: Operand::Reg(Register::BX),
                }),
            }
        );
    }

    #[test]
    fn parse_number_forms() {
        let air = parse_ok("MOV AX, 10\nmov ax, 0x0A\nMOV AX, 0Ah");
        for i in 0..3 {
            assert_eq!(
                air.get(i).stmt,
                Some(AirStmt::Mov {
                    dst: Operand::Reg(Register::AX),
                    src: Operand::Imm(Expr::Num(10)),
                })
            );
        }
    }

    #[test]
    fn parse_label_with_colon() {
        let air = parse_ok("top: INC AX");
        assert_eq!(air.get(0).label.as_deref(), Some("top"));
        assert_eq!(
            air.get(0).stmt,
            Some(AirStmt::Unary {
                op: UnaryOp::Inc,
                target: Operand::Reg(Register::AX),
            })
        );
    }

    #[test]
    fn parse_label_only_line() {
        let air = parse_ok("alone:\nHLT");
        assert_eq!(air.get(0).label.as_deref(), Some("alone"));
        assert_eq!(air.get(0).stmt, None);
        assert_eq!(air.get(1).stmt, Some(AirStmt::Hlt));
    }

    #[test]
    fn parse_bare_data_label() {
        let air = parse_ok("msg DB \"Hi$\"");
        assert_eq!(air.get(0).label.as_deref(), Some("msg"));
        assert_eq!(
            air.get(0).stmt,
            Some(AirStmt::Db {
                bytes: vec![b'H', b'i', b'$'],
            })
        );
    }

    #[test]
    fn parse_db_mixed_operands() {
        let air = parse_ok("data DB 11h, 'ab', 255");
        assert_eq!(
            air.get(0).stmt,
            Some(AirStmt::Db {
                bytes: vec![0x11, b'a', b'b', 255],
            })
        );
    }

    #[test]
    fn parse_db_escapes() {
        let air = parse_ok("s DB \"a\\n\"");
        assert_eq!(
            air.get(0).stmt,
            Some(AirStmt::Db {
                bytes: vec![b'a', b'\n'],
            })
        );
    }

    #[test]
    fn parse_dw_labels() {
        let air = parse_ok("table DW 1, msg");
        assert_eq!(
            air.get(0).stmt,
            Some(AirStmt::Dw {
                words: vec![Expr::Num(1), Expr::Sym("msg".into())],
            })
        );
    }

    #[test]
    fn parse_indexed_operand() {
        let air = parse_ok("MOV AL, data[SI]");
        assert_eq!(
            air.get(0).stmt,
            Some(AirStmt::Mov {
                dst: Operand::Reg(Register::AL),
                src: Operand::Indexed {
                    base: Expr::Sym("data".into()),
                    index: Register::SI,
                },
            })
        );
    }

    #[test]
    fn parse_bare_label_reads_as_address() {
        let air = parse_ok("MOV DX, msg");
        assert_eq!(
            air.get(0).stmt,
            Some(AirStmt::Mov {
                dst: Operand::Reg(Register::DX),
                src: Operand::Imm(Expr::Sym("msg".into())),
            })
        );
    }

    #[test]
    fn parse_direct_operand() {
        let air = parse_ok("MOV AX, [0x200]\nMOV [msg], AL");
        assert_eq!(
            air.get(0).stmt,
            Some(AirStmt::Mov {
                dst: Operand::Reg(Register::AX),
                src: Operand::Direct(Expr::Num(0x200)),
            })
        );
        assert_eq!(
            air.get(1).stmt,
            Some(AirStmt::Mov {
                dst: Operand::Direct(Expr::Sym("msg".into())),
                src: Operand::Reg(Register::AL),
            })
        );
    }

    #[test]
    fn parse_mem_to_mem_rejected() {
        let msg = parse_err("MOV [0x200], [0x300]");
        assert_eq!(
            msg,
            "Memory to Memory transfer not allowed. Use a register as intermediate."
        );
    }

    #[test]
    fn parse_imm_destination_rejected() {
        assert!(parse_err("MOV 5, AX").contains("destination"));
    }

    #[test]
    fn parse_binary_needs_reg_destination() {
        assert!(parse_err("ADD [0x200], AX").contains("must be a register"));
    }

    #[test]
    fn parse_unary_rejects_immediate() {
        assert!(parse_err("INC 5").contains("Invalid operand to INC"));
        assert!(parse_err("DIV 3").contains("Invalid operand to DIV"));
    }

    #[test]
    fn parse_unknown_mnemonic() {
        assert!(parse_err("FROB AX, 1").contains("Unknown mnemonic 'FROB'"));
    }

    #[test]
    fn parse_invalid_index_register() {
        assert!(parse_err("MOV AL, data[5]").contains("Invalid index register"));
    }

    #[test]
    fn parse_equ_requires_label() {
        assert!(parse_err("EQU 5").contains("label"));
        let air = parse_ok("count EQU 5");
        assert_eq!(
            air.get(0).stmt,
            Some(AirStmt::Equ {
                value: Expr::Num(5),
            })
        );
    }

    #[test]
    fn parse_trailing_tokens_rejected() {
        assert!(parse_err("MOV AX, BX CX").contains("after operands"));
    }

    #[test]
    fn parse_skips_blank_and_comment_lines() {
        let air = parse_ok("\n; comment only\n  \nNOP ; trailing comment\n");
        assert_eq!(air.len(), 1);
        assert_eq!(air.get(0).line, 3);
        assert_eq!(air.get(0).stmt, Some(AirStmt::Nop));
    }

    #[test]
    fn parse_conditional_aliases() {
        let air = parse_ok("JE x\nJZ x\nJNAE x\nJNC x");
        for (i, cond) in [Cond::Eq, Cond::Eq, Cond::B, Cond::Ae].iter().enumerate() {
            assert_eq!(
                air.get(i).stmt,
                Some(AirStmt::Jcc {
                    cond: *cond,
                    target: Expr::Sym("x".into()),
                })
            );
        }
    }

    #[test]
    fn parse_binary_shapes() {
        let air = parse_ok("CMP AX, BX\nSUB CL, 1\nXOR AX, [0x200]\nOR AX, tbl[DI]");
        assert_eq!(
            air.get(0).stmt,
            Some(AirStmt::Binary {
                op: BinOp::Cmp,
                dst: Register::AX,
                src: Operand::Reg(Register::BX),
            })
        );
        assert_eq!(
            air.get(1).stmt,
            Some(AirStmt::Binary {
                op: BinOp::Sub,
                dst: Register::CL,
                src: Operand::Imm(Expr::Num(1)),
            })
        );
        assert_eq!(
            air.get(2).stmt,
            Some(AirStmt::Binary {
                op: BinOp::Xor,
                dst: Register::AX,
                src: Operand::Direct(Expr::Num(0x200)),
            })
        );
        assert_eq!(
            air.get(3).stmt,
            Some(AirStmt::Binary {
                op: BinOp::Or,
                dst: Register::AX,
                src: Operand::Indexed {
                    base: Expr::Sym("tbl".into()),
                    index: Register::DI,
                },
            })
        );
    }
}
