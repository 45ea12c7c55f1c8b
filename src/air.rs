use miette::Result;

use crate::error;
use crate::ops::{self, BinShape};
use crate::symbol::{BinOp, Cond, Register, SymbolTable, UnaryOp};

/// Assembly intermediate representation: one entry per source line that
/// carries a label or a statement.
#[derive(Default, Debug)]
pub struct Air {
    lines: Vec<AsmLine>,
}

impl Air {
    pub fn new() -> Self {
        Air::default()
    }

    pub fn push(&mut self, line: AsmLine) {
        self.lines.push(line);
    }

    pub fn get(&self, idx: usize) -> &AsmLine {
        &self.lines[idx]
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AsmLine> {
        self.lines.iter()
    }
}

/// A parsed source line: optional label definition plus optional statement.
#[derive(PartialEq, Eq, Debug)]
pub struct AsmLine {
    /// 0-based source line index.
    pub line: u32,
    pub label: Option<String>,
    pub stmt: Option<AirStmt>,
}

/// A numeric operand that may reference the symbol table.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Expr {
    Num(u16),
    Sym(String),
}

impl Expr {
    /// Look the value up. Unresolved symbols read as 0 during the sizing
    /// pass and are an error during emission.
    pub fn resolve(&self, symbols: &SymbolTable, resolve: Resolve) -> Result<u16> {
        match self {
            Expr::Num(val) => Ok(*val),
            Expr::Sym(name) => match symbols.lookup(name) {
                Some(val) => Ok(val),
                None => match resolve {
                    Resolve::AllowUnresolved => Ok(0),
                    Resolve::Strict => Err(error::asm_unknown_label(name)),
                },
            },
        }
    }
}

/// Encoding mode: the first pass sizes instructions before all labels are
/// known, the second demands a complete symbol table.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Resolve {
    AllowUnresolved,
    Strict,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Operand {
    Reg(Register),
    Imm(Expr),
    /// `[expr]`
    Direct(Expr),
    /// `base[idx]`
    Indexed { base: Expr, index: Register },
}

impl Operand {
    pub fn is_mem(&self) -> bool {
        matches!(self, Operand::Direct(_) | Operand::Indexed { .. })
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AirStmt {
    /// Copy src into dst; any operand shape except memory to memory.
    Mov { dst: Operand, src: Operand },
    /// Arithmetic/logic with a register destination.
    Binary {
        op: BinOp,
        dst: Register,
        src: Operand,
    },
    /// Single-operand arithmetic on a register or byte of memory.
    Unary { op: UnaryOp, target: Operand },
    /// Relative jump with 16-bit reach.
    Jmp { target: Expr },
    /// Conditional jump with 8-bit reach.
    Jcc { cond: Cond, target: Expr },
    /// Decrement CX and jump while non-zero.
    Loop { target: Expr },
    /// Software interrupt.
    Int { vector: Expr },
    Nop,
    Hlt,
    Ret,
    /// Move the emit offset.
    Org { addr: u16 },
    /// Raw bytes, string operands already flattened.
    Db { bytes: Vec<u8> },
    /// Raw little-endian words.
    Dw { words: Vec<Expr> },
    /// Define the preceding label as a constant instead of an address.
    Equ { value: Expr },
}

impl AsmLine {
    pub fn new(line: u32, label: Option<String>, stmt: Option<AirStmt>) -> Self {
        AsmLine { line, label, stmt }
    }

    /// Encode the statement at `offset`. `Org`/`Equ` and label-only lines
    /// produce no bytes.
    pub fn encode(
        &self,
        offset: u16,
        symbols: &SymbolTable,
        resolve: Resolve,
    ) -> Result<Vec<u8>> {
        match &self.stmt {
            Some(stmt) => stmt.encode(offset, symbols, resolve),
            None => Ok(Vec::new()),
        }
    }
}

impl AirStmt {
    pub fn encode(&self, offset: u16, symbols: &SymbolTable, resolve: Resolve) -> Result<Vec<u8>> {
        let bytes = match self {
            AirStmt::Mov { dst, src } => encode_mov(dst, src, symbols, resolve)?,
            AirStmt::Binary { op, dst, src } => encode_binary(*op, *dst, src, symbols, resolve)?,
            AirStmt::Unary { op, target } => encode_unary(*op, target, symbols, resolve)?,
            AirStmt::Jmp { target } => {
                let addr = target.resolve(symbols, resolve)?;
                // Displacement is taken from the end of the 3-byte encoding.
                let disp = (addr as i32 - (offset as i32 + 3)) as u16;
                vec![ops::JMP, disp as u8, (disp >> 8) as u8]
            }
            AirStmt::Jcc { cond, target } => {
                let disp = short_disp(target, offset, symbols, resolve)?;
                vec![cond.opcode(), disp]
            }
            AirStmt::Loop { target } => {
                let disp = short_disp(target, offset, symbols, resolve)?;
                vec![ops::LOOP, disp]
            }
            AirStmt::Int { vector } => {
                let vector = byte_value(vector, symbols, resolve)?;
                vec![ops::INT, vector]
            }
            AirStmt::Nop => vec![ops::NOP],
            AirStmt::Hlt => vec![ops::HLT],
            AirStmt::Ret => vec![ops::RET],
            AirStmt::Db { bytes } => bytes.clone(),
            AirStmt::Dw { words } => {
                let mut bytes = Vec::with_capacity(words.len() * 2);
                for word in words {
                    let val = word.resolve(symbols, resolve)?;
                    bytes.push(val as u8);
                    bytes.push((val >> 8) as u8);
                }
                bytes
            }
            AirStmt::Org { .. } | AirStmt::Equ { .. } => Vec::new(),
        };
        Ok(bytes)
    }
}

fn encode_mov(
    dst: &Operand,
    src: &Operand,
    symbols: &SymbolTable,
    resolve: Resolve,
) -> Result<Vec<u8>> {
    let bytes = match (dst, src) {
        (Operand::Reg(d), Operand::Reg(s)) => {
            vec![ops::MOV_RR, (d.id() << 4) | s.id()]
        }
        (Operand::Reg(d), Operand::Imm(expr)) => {
            let val = expr.resolve(symbols, resolve)?;
            vec![ops::MOV_RI, d.id(), val as u8, (val >> 8) as u8]
        }
        (Operand::Reg(d), Operand::Direct(expr)) => {
            let addr = expr.resolve(symbols, resolve)?;
            vec![ops::MOV_RM, d.id(), addr as u8, (addr >> 8) as u8]
        }
        (Operand::Direct(expr), Operand::Reg(s)) => {
            let addr = expr.resolve(symbols, resolve)?;
            vec![ops::MOV_MR, s.id(), addr as u8, (addr >> 8) as u8]
        }
        (Operand::Reg(d), Operand::Indexed { base, index }) => {
            let base = base.resolve(symbols, resolve)?;
            vec![ops::MOV_RX, d.id(), index.id(), base as u8, (base >> 8) as u8]
        }
        (Operand::Indexed { base, index }, Operand::Reg(s)) => {
            let base = base.resolve(symbols, resolve)?;
            vec![ops::MOV_XR, s.id(), index.id(), base as u8, (base >> 8) as u8]
        }
        (Operand::Direct(expr), Operand::Imm(imm)) => {
            let addr = expr.resolve(symbols, resolve)?;
            let val = byte_value(imm, symbols, resolve)?;
            vec![ops::MOV_MI, addr as u8, (addr >> 8) as u8, val]
        }
        (Operand::Indexed { base, index }, Operand::Imm(imm)) => {
            let base = base.resolve(symbols, resolve)?;
            let val = byte_value(imm, symbols, resolve)?;
            vec![ops::MOV_XI, index.id(), base as u8, (base >> 8) as u8, val]
        }
        // The parser rejects memory-to-memory and immediate destinations.
        _ => unreachable!("operand shape rejected during parsing"),
    };
    Ok(bytes)
}

fn encode_binary(
    op: BinOp,
    dst: Register,
    src: &Operand,
    symbols: &SymbolTable,
    resolve: Resolve,
) -> Result<Vec<u8>> {
    let bytes = match src {
        Operand::Reg(s) => {
            vec![op.opcode(BinShape::RegReg), (dst.id() << 4) | s.id()]
        }
        Operand::Imm(expr) => {
            let val = expr.resolve(symbols, resolve)?;
            vec![
                op.opcode(BinShape::RegImm),
                dst.id(),
                val as u8,
                (val >> 8) as u8,
            ]
        }
        Operand::Direct(expr) => {
            let addr = expr.resolve(symbols, resolve)?;
            vec![
                op.opcode(BinShape::RegMem),
                dst.id(),
                addr as u8,
                (addr >> 8) as u8,
            ]
        }
        Operand::Indexed { base, index } => {
            let base = base.resolve(symbols, resolve)?;
            vec![
                op.opcode(BinShape::RegIdx),
                dst.id(),
                index.id(),
                base as u8,
                (base >> 8) as u8,
            ]
        }
    };
    Ok(bytes)
}

fn encode_unary(
    op: UnaryOp,
    target: &Operand,
    symbols: &SymbolTable,
    resolve: Resolve,
) -> Result<Vec<u8>> {
    let [mem_op, idx_op] = op.mem_opcodes();
    let bytes = match target {
        Operand::Reg(r) => vec![op.reg_opcode(), r.id()],
        Operand::Direct(expr) => {
            let addr = expr.resolve(symbols, resolve)?;
            vec![mem_op, addr as u8, (addr >> 8) as u8]
        }
        Operand::Indexed { base, index } => {
            let base = base.resolve(symbols, resolve)?;
            vec![idx_op, index.id(), base as u8, (base >> 8) as u8]
        }
        Operand::Imm(_) => unreachable!("operand shape rejected during parsing"),
    };
    Ok(bytes)
}

/// 8-bit displacement from the end of a 2-byte instruction, range-checked
/// only once symbols must resolve.
fn short_disp(
    target: &Expr,
    offset: u16,
    symbols: &SymbolTable,
    resolve: Resolve,
) -> Result<u8> {
    let addr = target.resolve(symbols, resolve)?;
    let disp = addr as i32 - (offset as i32 + 2);
    if resolve == Resolve::Strict && !(-128..=127).contains(&disp) {
        return Err(error::asm_jump_too_far(disp));
    }
    Ok(disp as u8)
}

fn byte_value(expr: &Expr, symbols: &SymbolTable, resolve: Resolve) -> Result<u8> {
    let val = expr.resolve(symbols, resolve)?;
    if val > 0xFF {
        return Err(error::asm_byte_range(val));
    }
    Ok(val as u8)
}

#[cfg(test)]
mod test {
    use super::*;

    fn enc(stmt: AirStmt, offset: u16) -> Vec<u8> {
        stmt.encode(offset, &SymbolTable::default(), Resolve::Strict)
            .unwrap()
    }

    #[test]
    fn emit_mov_reg_reg() {
        let stmt = AirStmt::Mov {
            dst: Operand::Reg(Register::AX),
            src: Operand::Reg(Register::BX),
        };
        assert_eq!(enc(stmt, 0x100), vec![0x10, 0x8B]);
    }

    #[test]
    fn emit_mov_imm_into_byte_reg() {
        // 8-bit destinations still carry a 16-bit immediate.
        let stmt = AirStmt::Mov {
            dst: Operand::Reg(Register::AH),
            src: Operand::Imm(Expr::Num(0x09)),
        };
        assert_eq!(enc(stmt, 0x100), vec![0x11, 0x04, 0x09, 0x00]);
    }

    #[test]
    fn emit_mov_indexed_load() {
        let mut symbols = SymbolTable::default();
        symbols.define("data", 0x123).unwrap();
        let stmt = AirStmt::Mov {
            dst: Operand::Reg(Register::AL),
            src: Operand::Indexed {
                base: Expr::Sym("data".into()),
                index: Register::SI,
            },
        };
        let bytes = stmt.encode(0x100, &symbols, Resolve::Strict).unwrap();
        assert_eq!(bytes, vec![0x8A, 0x00, 0x0E, 0x23, 0x01]);
    }

    #[test]
    fn emit_mov_mem_imm_is_byte_sized() {
        let stmt = AirStmt::Mov {
            dst: Operand::Direct(Expr::Num(0x200)),
            src: Operand::Imm(Expr::Num(0x41)),
        };
        assert_eq!(enc(stmt, 0x100), vec![0xC6, 0x00, 0x02, 0x41]);

        let stmt = AirStmt::Mov {
            dst: Operand::Direct(Expr::Num(0x200)),
            src: Operand::Imm(Expr::Num(0x1234)),
        };
        assert!(stmt
            .encode(0x100, &SymbolTable::default(), Resolve::Strict)
            .is_err());
    }

    #[test]
    fn emit_add_reg_imm() {
        let stmt = AirStmt::Binary {
            op: BinOp::Add,
            dst: Register::CX,
            src: Operand::Imm(Expr::Num(0x1234)),
        };
        assert_eq!(enc(stmt, 0x100), vec![0x21, 0x09, 0x34, 0x12]);
    }

    #[test]
    fn emit_jmp_backward() {
        // Target at 0x100, instruction at 0x105: disp = 0x100 - 0x108.
        let stmt = AirStmt::Jmp {
            target: Expr::Num(0x100),
        };
        assert_eq!(enc(stmt, 0x105), vec![0xE9, 0xF8, 0xFF]);
    }

    #[test]
    fn emit_jmp_to_self() {
        let stmt = AirStmt::Jmp {
            target: Expr::Num(0x100),
        };
        assert_eq!(enc(stmt, 0x100), vec![0xE9, 0xFD, 0xFF]);
    }

    #[test]
    fn emit_loop_forward_and_back() {
        let stmt = AirStmt::Loop {
            target: Expr::Num(0x100),
        };
        assert_eq!(enc(stmt, 0x104), vec![0xE2, 0xFA]);

        let stmt = AirStmt::Loop {
            target: Expr::Num(0x110),
        };
        assert_eq!(enc(stmt, 0x104), vec![0xE2, 0x0A]);
    }

    #[test]
    fn emit_short_jump_bad_range() {
        let stmt = AirStmt::Jcc {
            cond: Cond::Eq,
            target: Expr::Num(0x300),
        };
        assert!(stmt
            .encode(0x100, &SymbolTable::default(), Resolve::Strict)
            .is_err());
        // Unresolved sizing pass does not range-check.
        assert!(stmt
            .encode(0x100, &SymbolTable::default(), Resolve::AllowUnresolved)
            .is_ok());
    }

    #[test]
    fn emit_unary_forms() {
        let stmt = AirStmt::Unary {
            op: UnaryOp::Inc,
            target: Operand::Reg(Register::AX),
        };
        assert_eq!(enc(stmt, 0x100), vec![0x40, 0x08]);

        let stmt = AirStmt::Unary {
            op: UnaryOp::Div,
            target: Operand::Direct(Expr::Num(0x140)),
        };
        assert_eq!(enc(stmt, 0x100), vec![0xAC, 0x40, 0x01]);
    }

    #[test]
    fn emit_dw_resolves_labels() {
        let mut symbols = SymbolTable::default();
        symbols.define("msg", 0x10A).unwrap();
        let stmt = AirStmt::Dw {
            words: vec![Expr::Num(1), Expr::Sym("msg".into())],
        };
        let bytes = stmt.encode(0x100, &symbols, Resolve::Strict).unwrap();
        assert_eq!(bytes, vec![0x01, 0x00, 0x0A, 0x01]);
    }

    #[test]
    fn emit_unknown_label_strict_only() {
        let stmt = AirStmt::Jmp {
            target: Expr::Sym("nowhere".into()),
        };
        let symbols = SymbolTable::default();
        assert!(stmt.encode(0x100, &symbols, Resolve::Strict).is_err());
        assert!(stmt
            .encode(0x100, &symbols, Resolve::AllowUnresolved)
            .is_ok());
    }
}
