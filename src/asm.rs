use fxhash::FxHashMap;

use crate::air::{AirStmt, Resolve};
use crate::error;
use crate::parser::AsmParser;
use crate::runtime::MEMORY_MAX;
use crate::symbol::SymbolTable;

/// Address where emission and execution begin.
pub const ENTRY: u16 = 0x100;

/// Result of assembling one source file. The image is always present;
/// a non-empty error list means it should not be loaded.
pub struct Assembly {
    pub image: Box<[u8; MEMORY_MAX]>,
    pub entry: u16,
    /// `Line N: message` entries, 1-based, ordered by line.
    pub errors: Vec<String>,
    /// Emitted byte offset to 0-based source line index.
    pub sourcemap: FxHashMap<u16, u32>,
}

/// Assemble source text into a machine image.
///
/// Never fails: diagnostics are collected per line and the image holds
/// whatever could be emitted.
pub fn compile(src: &str) -> Assembly {
    let (air, parse_errors) = AsmParser::new(src).parse();
    let mut errors: Vec<(u32, String)> = parse_errors
        .into_iter()
        .map(|(line, report)| (line, report.to_string()))
        .collect();

    // Pass 1: walk the statements assigning label addresses. Instructions
    // are sized with unresolved labels reading as zero; encoding errors are
    // left for the second pass so each broken line is reported once.
    let mut symbols = SymbolTable::default();
    let mut offset = ENTRY as u32;
    for line in air.iter() {
        if let Some(name) = &line.label {
            let value = match &line.stmt {
                Some(AirStmt::Equ { value }) => match value.resolve(&symbols, Resolve::Strict) {
                    Ok(val) => Some(val),
                    Err(report) => {
                        errors.push((line.line, report.to_string()));
                        None
                    }
                },
                _ => Some(offset as u16),
            };
            if let Some(value) = value {
                if let Err(report) = symbols.define(name, value) {
                    errors.push((line.line, report.to_string()));
                }
            }
        }
        match &line.stmt {
            Some(AirStmt::Org { addr }) => offset = *addr as u32,
            Some(AirStmt::Equ { .. }) | None => {}
            Some(_) => {
                if let Ok(bytes) = line.encode(offset as u16, &symbols, Resolve::AllowUnresolved) {
                    offset += bytes.len() as u32;
                }
            }
        }
    }

    // Pass 2: emit with the complete symbol table.
    let mut image = Box::new([0u8; MEMORY_MAX]);
    let mut sourcemap = FxHashMap::default();
    let mut offset = ENTRY as u32;
    for line in air.iter() {
        match &line.stmt {
            Some(AirStmt::Org { addr }) => {
                offset = *addr as u32;
                continue;
            }
            Some(AirStmt::Equ { .. }) | None => continue,
            Some(_) => {}
        }
        match line.encode(offset as u16, &symbols, Resolve::Strict) {
            Ok(bytes) => {
                if bytes.is_empty() {
                    continue;
                }
                let end = offset as usize + bytes.len();
                if end > MEMORY_MAX {
                    errors.push((line.line, error::asm_image_overflow().to_string()));
                    continue;
                }
                sourcemap.insert(offset as u16, line.line);
                image[offset as usize..end].copy_from_slice(&bytes);
                offset = end as u32;
            }
            Err(report) => errors.push((line.line, report.to_string())),
        }
    }

    // Stable by construction within a line, ordered across lines.
    errors.sort_by_key(|(line, _)| *line);
    let errors = errors
        .into_iter()
        .map(|(line, msg)| format!("Line {}: {}", line + 1, msg))
        .collect();

    Assembly {
        image,
        entry: ENTRY,
        errors,
        sourcemap,
    }
}
