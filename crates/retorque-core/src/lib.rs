//! TorqueScript DSO decompiler core.
//!
//! Pipeline, in data-flow order:
//! - `disasm`: opcode stream → typed instruction list with branch targets
//! - `cfg`: instruction list → one control-flow graph per code span,
//!   plus dominator information
//! - `structure`: CFG → tree of structured regions (sequence, if, loop,
//!   goto fallbacks)
//! - `ast`: region tree → statements → TorqueScript source text
//!
//! [`decompile`] runs the whole pipeline over a loaded [`dso::FileData`].

pub mod ast;
pub mod cfg;
pub mod disasm;
pub mod error;
pub mod structure;

pub use error::{Error, ErrorKind, Result};

use dso::FileData;

/// Decompile a loaded DSO file to TorqueScript source.
///
/// An empty code segment produces the empty string. Errors abort the whole
/// file; no partial output is returned.
pub fn decompile(file: &FileData) -> Result<String> {
    let disassembly = disasm::disassemble(file)?;
    if disassembly.is_empty() {
        return Ok(String::new());
    }

    let cfgs = cfg::build_cfgs(&disassembly)?;
    let mut stmts = Vec::new();
    for graph in &cfgs {
        let region = structure::analyze(graph)?;
        stmts.extend(ast::lift(&region, file)?);
    }
    Ok(ast::printer::print_program(&stmts))
}
