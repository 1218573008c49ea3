use thiserror::Error;

/// Broad classification used by callers to map errors to exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed bytecode: the file cannot be disassembled.
    Format,
    /// The instruction stream disassembled, but its control flow violates
    /// what the Torque compiler can emit.
    Structure,
    /// A broken invariant in the decompiler itself.
    Internal,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown opcode {word:#x} at {addr:#x}")]
    UnknownOpcode { addr: u32, word: u32 },

    #[error("code segment truncated at {addr:#x} (instruction at {start:#x} needs {need} operand words)")]
    TruncatedCode { addr: u32, start: u32, need: u32 },

    #[error("branch at {addr:#x} targets {target:#x}, which is not an instruction boundary")]
    InvalidBranchTarget { addr: u32, target: u32 },

    #[error("invalid append-string character {word:#x} at {addr:#x}")]
    InvalidAppendChar { addr: u32, word: u32 },

    #[error("function {name:?} at {addr:#x} has invalid end address {end:#x}")]
    InvalidFunctionEnd { addr: u32, end: u32, name: String },

    #[error("function declaration at {addr:#x} is nested inside another function body")]
    NestedFunction { addr: u32 },

    #[error("block at {addr:#x} has {count} successors")]
    TooManySuccessors { addr: u32, count: usize },

    #[error("cyclic block at {addr:#x} does not end in a branch")]
    CyclicNoBranch { addr: u32 },

    #[error("structural analysis stalled with {remaining} regions left")]
    AnalysisStalled { remaining: usize },

    #[error("expression stack underflow at {addr:#x} ({context})")]
    StackUnderflow { addr: u32, context: &'static str },

    #[error("no immediate dominator for reachable block {addr:#x}")]
    MissingDominator { addr: u32 },

    #[error("file error: {0}")]
    File(#[from] dso::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownOpcode { .. }
            | Error::TruncatedCode { .. }
            | Error::InvalidBranchTarget { .. }
            | Error::InvalidAppendChar { .. }
            | Error::InvalidFunctionEnd { .. }
            | Error::File(_) => ErrorKind::Format,
            Error::NestedFunction { .. }
            | Error::TooManySuccessors { .. }
            | Error::CyclicNoBranch { .. }
            | Error::AnalysisStalled { .. }
            | Error::StackUnderflow { .. } => ErrorKind::Structure,
            Error::MissingDominator { .. } => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
