use serde::Serialize;

/// Opcodes for the Torque Game Engine script VM (TGE 1.x numbering).
///
/// One opcode per 32-bit code word; operand words follow inline. The
/// `Unused1`/`Unused2` slots are filler in some engine builds and decode to
/// no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u32)]
pub enum Opcode {
    FuncDecl = 0x00,
    CreateObject = 0x01,
    AddObject = 0x02,
    EndObject = 0x03,

    // Branches
    JmpIffNot = 0x04,
    JmpIfNot = 0x05,
    JmpIff = 0x06,
    JmpIf = 0x07,
    JmpIfNotNp = 0x08,
    JmpIfNp = 0x09,
    Jmp = 0x0A,
    Return = 0x0B,

    // Comparison (operates on the numeric stacks)
    CmpEq = 0x0C,
    CmpGr = 0x0D,
    CmpGe = 0x0E,
    CmpLt = 0x0F,
    CmpLe = 0x10,
    CmpNe = 0x11,

    // Arithmetic/logic (two-operand)
    Xor = 0x12,
    Mod = 0x13,
    BitAnd = 0x14,
    BitOr = 0x15,
    Not = 0x16,
    NotF = 0x17,
    OnesComplement = 0x18,
    Shr = 0x19,
    Shl = 0x1A,
    And = 0x1B,
    Or = 0x1C,
    Add = 0x1D,
    Sub = 0x1E,
    Mul = 0x1F,
    Div = 0x20,
    Neg = 0x21,

    // Variable access
    SetCurVar = 0x22,
    SetCurVarCreate = 0x23,
    SetCurVarArray = 0x24,
    SetCurVarArrayCreate = 0x25,
    LoadVarUint = 0x26,
    LoadVarFlt = 0x27,
    LoadVarStr = 0x28,
    SaveVarUint = 0x29,
    SaveVarFlt = 0x2A,
    SaveVarStr = 0x2B,

    // Object field access
    SetCurObject = 0x2C,
    SetCurObjectNew = 0x2D,
    SetCurField = 0x2E,
    SetCurFieldArray = 0x2F,
    LoadFieldUint = 0x30,
    LoadFieldFlt = 0x31,
    LoadFieldStr = 0x32,
    SaveFieldUint = 0x33,
    SaveFieldFlt = 0x34,
    SaveFieldStr = 0x35,

    // Register conversions
    StrToUint = 0x36,
    StrToFlt = 0x37,
    StrToNone = 0x38,
    FltToUint = 0x39,
    FltToStr = 0x3A,
    FltToNone = 0x3B,
    UintToFlt = 0x3C,
    UintToStr = 0x3D,
    UintToNone = 0x3E,

    // Immediates
    LoadImmedUint = 0x3F,
    LoadImmedFlt = 0x40,
    TagToStr = 0x41,
    LoadImmedStr = 0x42,
    LoadImmedIdent = 0x43,

    // Calls
    CallFuncResolve = 0x44,
    CallFunc = 0x45,

    // String register manipulation
    AdvanceStr = 0x46,
    AdvanceStrAppendChar = 0x47,
    AdvanceStrComma = 0x48,
    AdvanceStrNul = 0x49,
    RewindStr = 0x4A,
    TerminateRewindStr = 0x4B,
    CompareStr = 0x4C,

    // Call frame
    Push = 0x4D,
    PushFrame = 0x4E,

    DebugBreak = 0x4F,
    Unused1 = 0x50,
    Unused2 = 0x51,
}

/// Branch sub-kind. The `_NP` ("no pop") variants leave the tested operand
/// on the stack; the compiler uses them for short-circuit `&&`/`||`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BranchKind {
    Jmp,
    JmpIf,
    JmpIff,
    JmpIfNot,
    JmpIffNot,
    JmpIfNp,
    JmpIfNotNp,
}

impl BranchKind {
    pub fn is_unconditional(self) -> bool {
        self == BranchKind::Jmp
    }

    /// Whether the branch is taken when the condition is false.
    pub fn inverted(self) -> bool {
        matches!(
            self,
            BranchKind::JmpIfNot | BranchKind::JmpIffNot | BranchKind::JmpIfNotNp
        )
    }

    /// Whether the conditionally executed code is the fall-through side.
    ///
    /// True for the inverted branches (skip-over-then encoding) and both
    /// `_NP` short-circuit forms.
    pub fn then_is_fallthrough(self) -> bool {
        matches!(
            self,
            BranchKind::JmpIfNot | BranchKind::JmpIffNot | BranchKind::JmpIfNp | BranchKind::JmpIfNotNp
        )
    }

    pub fn no_pop(self) -> bool {
        matches!(self, BranchKind::JmpIfNp | BranchKind::JmpIfNotNp)
    }
}

/// Target register of a conversion opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConvertTarget {
    Float,
    Uint,
    String,
    /// Discard; ends a statement-expression.
    None,
}

/// Which register a load/save opcode moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueType {
    Uint,
    Flt,
    Str,
}

/// Binary operators, in source form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
    Ne,
    Xor,
    Mod,
    BitAnd,
    BitOr,
    Shr,
    Shl,
    LogicAnd,
    LogicOr,
    Add,
    Sub,
    Mul,
    Div,
    /// `$=`, string equality via the compare-string opcode.
    StrEq,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Not,
    OnesComplement,
    Neg,
}

impl Opcode {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0x00 => Self::FuncDecl,
            0x01 => Self::CreateObject,
            0x02 => Self::AddObject,
            0x03 => Self::EndObject,
            0x04 => Self::JmpIffNot,
            0x05 => Self::JmpIfNot,
            0x06 => Self::JmpIff,
            0x07 => Self::JmpIf,
            0x08 => Self::JmpIfNotNp,
            0x09 => Self::JmpIfNp,
            0x0A => Self::Jmp,
            0x0B => Self::Return,
            0x0C => Self::CmpEq,
            0x0D => Self::CmpGr,
            0x0E => Self::CmpGe,
            0x0F => Self::CmpLt,
            0x10 => Self::CmpLe,
            0x11 => Self::CmpNe,
            0x12 => Self::Xor,
            0x13 => Self::Mod,
            0x14 => Self::BitAnd,
            0x15 => Self::BitOr,
            0x16 => Self::Not,
            0x17 => Self::NotF,
            0x18 => Self::OnesComplement,
            0x19 => Self::Shr,
            0x1A => Self::Shl,
            0x1B => Self::And,
            0x1C => Self::Or,
            0x1D => Self::Add,
            0x1E => Self::Sub,
            0x1F => Self::Mul,
            0x20 => Self::Div,
            0x21 => Self::Neg,
            0x22 => Self::SetCurVar,
            0x23 => Self::SetCurVarCreate,
            0x24 => Self::SetCurVarArray,
            0x25 => Self::SetCurVarArrayCreate,
            0x26 => Self::LoadVarUint,
            0x27 => Self::LoadVarFlt,
            0x28 => Self::LoadVarStr,
            0x29 => Self::SaveVarUint,
            0x2A => Self::SaveVarFlt,
            0x2B => Self::SaveVarStr,
            0x2C => Self::SetCurObject,
            0x2D => Self::SetCurObjectNew,
            0x2E => Self::SetCurField,
            0x2F => Self::SetCurFieldArray,
            0x30 => Self::LoadFieldUint,
            0x31 => Self::LoadFieldFlt,
            0x32 => Self::LoadFieldStr,
            0x33 => Self::SaveFieldUint,
            0x34 => Self::SaveFieldFlt,
            0x35 => Self::SaveFieldStr,
            0x36 => Self::StrToUint,
            0x37 => Self::StrToFlt,
            0x38 => Self::StrToNone,
            0x39 => Self::FltToUint,
            0x3A => Self::FltToStr,
            0x3B => Self::FltToNone,
            0x3C => Self::UintToFlt,
            0x3D => Self::UintToStr,
            0x3E => Self::UintToNone,
            0x3F => Self::LoadImmedUint,
            0x40 => Self::LoadImmedFlt,
            0x41 => Self::TagToStr,
            0x42 => Self::LoadImmedStr,
            0x43 => Self::LoadImmedIdent,
            0x44 => Self::CallFuncResolve,
            0x45 => Self::CallFunc,
            0x46 => Self::AdvanceStr,
            0x47 => Self::AdvanceStrAppendChar,
            0x48 => Self::AdvanceStrComma,
            0x49 => Self::AdvanceStrNul,
            0x4A => Self::RewindStr,
            0x4B => Self::TerminateRewindStr,
            0x4C => Self::CompareStr,
            0x4D => Self::Push,
            0x4E => Self::PushFrame,
            0x4F => Self::DebugBreak,
            0x50 => Self::Unused1,
            0x51 => Self::Unused2,
            _ => return None,
        })
    }

    /// Branch sub-kind, for the branch opcodes.
    pub fn branch_kind(self) -> Option<BranchKind> {
        Some(match self {
            Self::Jmp => BranchKind::Jmp,
            Self::JmpIf => BranchKind::JmpIf,
            Self::JmpIff => BranchKind::JmpIff,
            Self::JmpIfNot => BranchKind::JmpIfNot,
            Self::JmpIffNot => BranchKind::JmpIffNot,
            Self::JmpIfNp => BranchKind::JmpIfNp,
            Self::JmpIfNotNp => BranchKind::JmpIfNotNp,
            _ => return None,
        })
    }

    /// Source-level operator for the two-operand opcodes.
    pub fn binary_op(self) -> Option<BinaryOp> {
        Some(match self {
            Self::CmpEq => BinaryOp::Eq,
            Self::CmpGr => BinaryOp::Gt,
            Self::CmpGe => BinaryOp::Ge,
            Self::CmpLt => BinaryOp::Lt,
            Self::CmpLe => BinaryOp::Le,
            Self::CmpNe => BinaryOp::Ne,
            Self::Xor => BinaryOp::Xor,
            Self::Mod => BinaryOp::Mod,
            Self::BitAnd => BinaryOp::BitAnd,
            Self::BitOr => BinaryOp::BitOr,
            Self::Shr => BinaryOp::Shr,
            Self::Shl => BinaryOp::Shl,
            Self::And => BinaryOp::LogicAnd,
            Self::Or => BinaryOp::LogicOr,
            Self::Add => BinaryOp::Add,
            Self::Sub => BinaryOp::Sub,
            Self::Mul => BinaryOp::Mul,
            Self::Div => BinaryOp::Div,
            _ => return None,
        })
    }

    /// Source-level operator for the one-operand opcodes. `Not` and `NotF`
    /// differ only in which register they test.
    pub fn unary_op(self) -> Option<UnaryOp> {
        Some(match self {
            Self::Not | Self::NotF => UnaryOp::Not,
            Self::OnesComplement => UnaryOp::OnesComplement,
            Self::Neg => UnaryOp::Neg,
            _ => return None,
        })
    }

    pub fn convert_target(self) -> Option<ConvertTarget> {
        Some(match self {
            Self::StrToUint | Self::FltToUint => ConvertTarget::Uint,
            Self::StrToFlt | Self::UintToFlt => ConvertTarget::Float,
            Self::FltToStr | Self::UintToStr => ConvertTarget::String,
            Self::StrToNone | Self::FltToNone | Self::UintToNone => ConvertTarget::None,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_known_opcode() {
        for v in 0x00..=0x51u32 {
            let op = Opcode::from_u32(v).expect("gap in opcode table");
            assert_eq!(op as u32, v);
        }
        assert_eq!(Opcode::from_u32(0x52), None);
        assert_eq!(Opcode::from_u32(0xFFFF_FFFF), None);
    }

    #[test]
    fn branch_classification() {
        assert!(Opcode::Jmp.branch_kind().unwrap().is_unconditional());
        assert!(Opcode::JmpIfNot.branch_kind().unwrap().then_is_fallthrough());
        assert!(!Opcode::JmpIf.branch_kind().unwrap().then_is_fallthrough());
        assert!(Opcode::JmpIfNp.branch_kind().unwrap().no_pop());
        assert_eq!(Opcode::Return.branch_kind(), None);
    }
}
