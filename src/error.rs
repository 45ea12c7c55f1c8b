use miette::{miette, LabeledSpan, Report, Severity};

use crate::lexer::Token;
use crate::symbol::Span;

// Lexer errors

pub fn lex_unknown(span: Span) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::unknown",
        help = "only mnemonics, registers, numbers, strings, and punctuation are allowed",
        labels = vec![LabeledSpan::at(span, "unknown token")],
        "Encountered an unknown token",
    )
}

pub fn lex_unclosed_str(span: Span) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::str_lit",
        help = "close string literals with a matching \" or ' character",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Encountered an unterminated string literal",
    )
}

pub fn lex_invalid_lit(span: Span) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::bad_lit",
        help = "values from 0 to 65,535 (0FFFFh) are allowed",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Numeric literal out of range",
    )
}

// Parser errors

pub fn parse_unknown_mnemonic(span: Span, name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::mnemonic",
        help = "check the list of supported instructions and directives",
        labels = vec![LabeledSpan::at(span, "not a mnemonic")],
        "Unknown mnemonic '{name}'",
    )
}

pub fn parse_unexpected(expected: &str, found: &Token) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::unexpected_token",
        help = "check the type of operands allowed for this instruction",
        labels = vec![LabeledSpan::at(found.span, "unexpected token")],
        "Expected {expected}, found {}",
        found.kind,
    )
}

pub fn parse_eol(expected: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::unexpected_eol",
        help = "the statement is missing operands",
        "Expected {expected}, found end of line",
    )
}

pub fn parse_trailing(span: Span) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::trailing",
        help = "separate operands with commas; anything after the operands must be a ; comment",
        labels = vec![LabeledSpan::at(span, "unexpected token")],
        "Unexpected token after operands",
    )
}

pub fn parse_mem_to_mem(span: Span) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::mem_to_mem",
        help = "load the source into a register first",
        labels = vec![LabeledSpan::at(span, "second memory operand")],
        "Memory to Memory transfer not allowed. Use a register as intermediate.",
    )
}

pub fn parse_bad_destination(span: Span) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::destination",
        help = "destinations must be a register or a memory reference",
        labels = vec![LabeledSpan::at(span, "not writable")],
        "Immediate value cannot be a destination",
    )
}

pub fn parse_reg_destination(span: Span, mnemonic: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::destination",
        help = "only MOV can write to memory; use a register destination here",
        labels = vec![LabeledSpan::at(span, "memory destination")],
        "Destination of {mnemonic} must be a register",
    )
}

pub fn parse_invalid_unary(span: Span, mnemonic: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::unary",
        help = "the operand must be a register or a memory reference",
        labels = vec![LabeledSpan::at(span, "invalid operand")],
        "Invalid operand to {mnemonic}",
    )
}

pub fn parse_invalid_index(span: Span) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::index",
        help = "indexed operands look like LABEL[REG]",
        labels = vec![LabeledSpan::at(span, "invalid index register")],
        "Invalid index register",
    )
}

pub fn parse_equ_needs_label(span: Span) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::equ",
        help = "write NAME EQU value",
        labels = vec![LabeledSpan::at(span, "unlabeled directive")],
        "EQU requires a label to define",
    )
}

// Encoder errors

pub fn asm_duplicate_label(name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::duplicate_label",
        help = "labels may only be defined once per file",
        "Duplicate label '{name}'",
    )
}

pub fn asm_unknown_label(name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::unknown_label",
        help = "labels are case-sensitive as written",
        "Unknown label '{name}'",
    )
}

pub fn asm_byte_range(value: u16) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::byte_range",
        help = "byte operands range from 0 to 255 (0FFh)",
        "Value {value} does not fit in a byte",
    )
}

pub fn asm_jump_too_far(distance: i32) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::jump_range",
        help = "conditional jumps and LOOP reach -128..127 bytes; use JMP for longer distances",
        "Jump target out of range ({distance} bytes away)",
    )
}

pub fn asm_image_overflow() -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::overflow",
        help = "the machine image is 64 KiB; check ORG directives and data sizes",
        "Emitted bytes run past the end of the image",
    )
}
