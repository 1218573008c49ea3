use serde::Serialize;

use super::opcode::{BinaryOp, BranchKind, ConvertTarget, Opcode, UnaryOp, ValueType};

/// A decoded instruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instruction {
    /// Word offset within the code segment.
    pub addr: u32,
    /// The raw operation.
    pub opcode: Opcode,
    /// Set by the branch-target pass when some branch jumps here.
    pub is_branch_target: bool,
    /// The decoded operation with its operands.
    pub kind: InstKind,
}

/// Header of a function declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionHeader {
    pub name: String,
    pub namespace: Option<String>,
    pub package: Option<String>,
    /// False for a bodiless (forward) declaration.
    pub has_body: bool,
    /// First code offset past the function body.
    pub end_addr: u32,
    /// Argument names, sigils included (`%a`).
    pub args: Vec<String>,
}

/// Immediate operand of a load-immediate opcode. String and tag refs stay
/// raw; the AST lift resolves them against the file's tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Immediate {
    Uint(u32),
    /// Index into the global float table.
    Float(u32),
    /// Byte offset into the global string table.
    StringRef(u32),
    /// Byte offset into the global string table, emitted as a tag string.
    TagRef(u32),
    /// Identifier, resolved through the fixup table at decode time.
    IdentRef(String),
}

/// What to append when advancing the string register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdvanceKind {
    Plain,
    AppendChar(char),
    Comma,
    Null,
}

/// How a call resolves its callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallType {
    Function,
    Method,
    Parent,
}

impl CallType {
    pub fn from_u32(v: u32) -> Self {
        match v {
            1 => CallType::Method,
            2 => CallType::Parent,
            _ => CallType::Function,
        }
    }
}

/// Decoded instruction variants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum InstKind {
    FunctionDecl(FunctionHeader),
    CreateObject {
        parent: Option<String>,
        is_datablock: bool,
        fail_jump_addr: u32,
    },
    AddObject {
        place_at_root: bool,
    },
    EndObject {
        place_at_root: bool,
    },
    Branch {
        target_addr: u32,
        kind: BranchKind,
    },
    Return {
        returns_value: bool,
    },
    Binary(BinaryOp),
    Unary(UnaryOp),
    StringCompare,
    SetCurVar {
        name: String,
        create: bool,
    },
    SetCurVarArray {
        create: bool,
    },
    LoadVar(ValueType),
    SaveVar(ValueType),
    SetCurObject {
        is_new: bool,
    },
    SetCurField {
        name: String,
    },
    SetCurFieldArray,
    LoadField(ValueType),
    SaveField(ValueType),
    ConvertToType(ConvertTarget),
    LoadImmediate(Immediate),
    Call {
        name: String,
        namespace: Option<String>,
        call_type: CallType,
    },
    AdvanceString(AdvanceKind),
    Rewind {
        terminate: bool,
    },
    Push,
    PushFrame,
    DebugBreak,
    Unused,
}

impl Instruction {
    /// Branch target and kind, when this is a branch.
    pub fn branch(&self) -> Option<(BranchKind, u32)> {
        match self.kind {
            InstKind::Branch { target_addr, kind } => Some((kind, target_addr)),
            _ => None,
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self.kind, InstKind::Branch { .. })
    }

    pub fn is_return(&self) -> bool {
        matches!(self.kind, InstKind::Return { .. })
    }

    /// Function header, when this opens a function body.
    pub fn function_body(&self) -> Option<&FunctionHeader> {
        match &self.kind {
            InstKind::FunctionDecl(header) if header.has_body => Some(header),
            _ => None,
        }
    }
}
