use std::{fmt, ops::Range, str::FromStr};

use fxhash::FxHashMap;
use miette::SourceSpan;

use crate::error;

/// Addresses assigned to labels during the first assembler pass.
#[derive(Default, Debug)]
pub struct SymbolTable {
    table: FxHashMap<String, u16>,
}

impl SymbolTable {
    /// Record a label definition. Errors on duplicates.
    pub fn define(&mut self, name: &str, value: u16) -> miette::Result<()> {
        // Some is returned if the label already exists
        if self.table.insert(name.to_string(), value).is_some() {
            Err(error::asm_duplicate_label(name))
        } else {
            Ok(())
        }
    }

    pub fn lookup(&self, name: &str) -> Option<u16> {
        self.table.get(name).copied()
    }
}

/// Location within source str
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Span {
    offs: SrcOffset,
    len: usize,
}

impl Span {
    pub fn new(offs: SrcOffset, len: usize) -> Self {
        Span { offs, len }
    }

    /// Non-source span
    pub fn dummy() -> Self {
        Span {
            offs: SrcOffset(0),
            len: 0,
        }
    }

    /// Returns a range that can be used to index the source
    pub fn as_range(&self) -> Range<usize> {
        self.offs()..self.end()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn offs(&self) -> usize {
        self.offs.0
    }

    pub fn end(&self) -> usize {
        self.offs.0 + self.len
    }
}

// Used for miette conversion
impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

impl From<Span> for Range<usize> {
    fn from(value: Span) -> Self {
        value.offs()..value.end()
    }
}

/// Used to refer to offsets from the start of a source file.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct SrcOffset(pub usize);

/// The sixteen registers reachable from bytecode.
///
/// Discriminants are the wire ids: 0..8 select an 8-bit half, 8..16 a full
/// 16-bit register. `AH`/`AL` share storage with `AX` and so on.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Register {
    AL = 0,
    CL,
    DL,
    BL,
    AH,
    CH,
    DH,
    BH,
    AX,
    CX,
    DX,
    BX,
    /// Initialised to 0xFFFE.
    SP,
    BP,
    SI,
    DI,
}

impl Register {
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Decode a wire id. Ids are 4 bits wide so the high nibble is ignored.
    pub fn from_id(id: u8) -> Register {
        match id & 0xF {
            0 => Register::AL,
            1 => Register::CL,
            2 => Register::DL,
            3 => Register::BL,
            4 => Register::AH,
            5 => Register::CH,
            6 => Register::DH,
            7 => Register::BH,
            8 => Register::AX,
            9 => Register::CX,
            10 => Register::DX,
            11 => Register::BX,
            12 => Register::SP,
            13 => Register::BP,
            14 => Register::SI,
            15 => Register::DI,
            _ => unreachable!(),
        }
    }

    /// True for the 16-bit registers, false for the 8-bit halves.
    pub fn is_wide(self) -> bool {
        self.id() >= 8
    }
}

impl FromStr for Register {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AL" => Ok(Register::AL),
            "CL" => Ok(Register::CL),
            "DL" => Ok(Register::DL),
            "BL" => Ok(Register::BL),
            "AH" => Ok(Register::AH),
            "CH" => Ok(Register::CH),
            "DH" => Ok(Register::DH),
            "BH" => Ok(Register::BH),
            "AX" => Ok(Register::AX),
            "CX" => Ok(Register::CX),
            "DX" => Ok(Register::DX),
            "BX" => Ok(Register::BX),
            "SP" => Ok(Register::SP),
            "BP" => Ok(Register::BP),
            "SI" => Ok(Register::SI),
            "DI" => Ok(Register::DI),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Two-operand arithmetic and logic instructions.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinOp {
    Add,
    Sub,
    Cmp,
    And,
    Or,
    Xor,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinOp::Add => "ADD",
            BinOp::Sub => "SUB",
            BinOp::Cmp => "CMP",
            BinOp::And => "AND",
            BinOp::Or => "OR",
            BinOp::Xor => "XOR",
        };
        f.write_str(name)
    }
}

/// Single-operand instructions.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnaryOp {
    Inc,
    Dec,
    Not,
    Mul,
    Div,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnaryOp::Inc => "INC",
            UnaryOp::Dec => "DEC",
            UnaryOp::Not => "NOT",
            UnaryOp::Mul => "MUL",
            UnaryOp::Div => "DIV",
        };
        f.write_str(name)
    }
}

/// Conditions evaluated by the short-jump family.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cond {
    /// ZF
    Eq,
    /// !ZF
    Ne,
    /// SF != OF
    Lt,
    /// ZF or SF != OF
    Le,
    /// !ZF and SF == OF
    Gt,
    /// SF == OF
    Ge,
    /// CF
    B,
    /// CF or ZF
    Be,
    /// !CF and !ZF
    A,
    /// !CF
    Ae,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InstrKind {
    Mov,
    Bin(BinOp),
    Unary(UnaryOp),
    Jmp,
    Jcc(Cond),
    Loop,
    Int,
    Nop,
    Hlt,
    Ret,
}

impl FromStr for InstrKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.to_ascii_uppercase().as_str() {
            "MOV" => InstrKind::Mov,
            "ADD" => InstrKind::Bin(BinOp::Add),
            "SUB" => InstrKind::Bin(BinOp::Sub),
            "CMP" => InstrKind::Bin(BinOp::Cmp),
            "AND" => InstrKind::Bin(BinOp::And),
            "OR" => InstrKind::Bin(BinOp::Or),
            "XOR" => InstrKind::Bin(BinOp::Xor),
            "NOT" => InstrKind::Unary(UnaryOp::Not),
            "INC" => InstrKind::Unary(UnaryOp::Inc),
            "DEC" => InstrKind::Unary(UnaryOp::Dec),
            "MUL" => InstrKind::Unary(UnaryOp::Mul),
            "DIV" => InstrKind::Unary(UnaryOp::Div),
            "JMP" => InstrKind::Jmp,
            "LOOP" => InstrKind::Loop,
            "INT" => InstrKind::Int,
            "NOP" => InstrKind::Nop,
            "HLT" => InstrKind::Hlt,
            "RET" => InstrKind::Ret,
            "JE" | "JZ" => InstrKind::Jcc(Cond::Eq),
            "JNE" | "JNZ" => InstrKind::Jcc(Cond::Ne),
            "JL" | "JNGE" => InstrKind::Jcc(Cond::Lt),
            "JLE" | "JNG" => InstrKind::Jcc(Cond::Le),
            "JG" | "JNLE" => InstrKind::Jcc(Cond::Gt),
            "JGE" | "JNL" => InstrKind::Jcc(Cond::Ge),
            "JB" | "JNAE" | "JC" => InstrKind::Jcc(Cond::B),
            "JBE" | "JNA" => InstrKind::Jcc(Cond::Be),
            "JA" | "JNBE" => InstrKind::Jcc(Cond::A),
            "JAE" | "JNB" | "JNC" => InstrKind::Jcc(Cond::Ae),
            _ => return Err(()),
        };
        Ok(kind)
    }
}

/// Assembler directives.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DirKind {
    Org,
    Db,
    Dw,
    Equ,
}

impl DirKind {
    /// Directives that may be preceded by a bare label without a colon.
    pub fn takes_bare_label(self) -> bool {
        matches!(self, DirKind::Db | DirKind::Dw | DirKind::Equ)
    }
}

impl FromStr for DirKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ORG" => Ok(DirKind::Org),
            "DB" => Ok(DirKind::Db),
            "DW" => Ok(DirKind::Dw),
            "EQU" => Ok(DirKind::Equ),
            _ => Err(()),
        }
    }
}
