//! Linear-sweep disassembler for the DSO code segment.
//!
//! Walks the code words from offset 0, dispatching each opcode to a decoder
//! that consumes its operand words, then runs a branch-target pass that
//! marks every jumped-to instruction. Identifier operands are resolved
//! through the loader's fixup table as they are read.

pub mod inst;
pub mod opcode;

use std::collections::BTreeMap;

use dso::FileData;

use crate::error::{Error, Result};
use inst::{AdvanceKind, CallType, FunctionHeader, Immediate, InstKind, Instruction};
use opcode::{ConvertTarget, Opcode, ValueType};

/// Address-keyed, address-ordered instruction map.
#[derive(Debug, Default)]
pub struct Disassembly {
    instructions: BTreeMap<u32, Instruction>,
}

impl Disassembly {
    pub fn get(&self, addr: u32) -> Option<&Instruction> {
        self.instructions.get(&addr)
    }

    pub fn contains(&self, addr: u32) -> bool {
        self.instructions.contains_key(&addr)
    }

    /// Instructions in address order.
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.values()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Disassemble the whole code segment.
pub fn disassemble(file: &FileData) -> Result<Disassembly> {
    let mut d = Decoder {
        file,
        ip: 0,
        start: 0,
        returnable_value: false,
    };

    let mut instructions = BTreeMap::new();
    while d.ip < file.code_size() {
        let inst = d.decode_one()?;
        instructions.insert(inst.addr, inst);
    }

    let mut disassembly = Disassembly { instructions };
    mark_branch_targets(&mut disassembly, file.code_size())?;
    Ok(disassembly)
}

struct Decoder<'a> {
    file: &'a FileData,
    ip: u32,
    /// Address of the instruction currently being decoded.
    start: u32,
    /// Models the VM's scalar return register ("STR"): true while the most
    /// recent value-producing op left something returnable in it.
    returnable_value: bool,
}

impl<'a> Decoder<'a> {
    /// Consume the next code word.
    fn word(&mut self) -> Result<u32> {
        let w = self.file.op(self.ip).ok_or(Error::TruncatedCode {
            addr: self.ip,
            start: self.start,
            need: self.ip - self.start,
        })?;
        self.ip += 1;
        Ok(w)
    }

    /// Consume an identifier operand, resolving through the fixup table.
    fn ident(&mut self) -> Result<Option<String>> {
        let at = self.ip;
        let raw = self.word()?;
        Ok(self.file.identifier(at, raw))
    }

    fn decode_one(&mut self) -> Result<Instruction> {
        self.start = self.ip;
        let addr = self.ip;
        let word = self.word()?;
        let opcode = Opcode::from_u32(word).ok_or(Error::UnknownOpcode { addr, word })?;
        let kind = self.decode_kind(opcode)?;

        // STR register tracking: value-producing ops set the bit, the
        // discarding converts clear it, Return consumes it.
        match &kind {
            InstKind::LoadVar(ValueType::Str)
            | InstKind::SaveVar(ValueType::Str)
            | InstKind::LoadField(ValueType::Str)
            | InstKind::SaveField(ValueType::Str)
            | InstKind::LoadImmediate(_)
            | InstKind::Call { .. }
            | InstKind::Rewind { .. }
            | InstKind::ConvertToType(ConvertTarget::String) => {
                self.returnable_value = true;
            }
            InstKind::ConvertToType(ConvertTarget::None) => {
                self.returnable_value = false;
            }
            InstKind::Return { .. } => {
                self.returnable_value = false;
            }
            _ => {}
        }

        Ok(Instruction {
            addr,
            opcode,
            is_branch_target: false,
            kind,
        })
    }

    fn decode_kind(&mut self, opcode: Opcode) -> Result<InstKind> {
        if let Some(kind) = opcode.branch_kind() {
            let target_addr = self.word()?;
            return Ok(InstKind::Branch { target_addr, kind });
        }
        if let Some(op) = opcode.binary_op() {
            return Ok(InstKind::Binary(op));
        }
        if let Some(op) = opcode.unary_op() {
            return Ok(InstKind::Unary(op));
        }
        if let Some(target) = opcode.convert_target() {
            return Ok(InstKind::ConvertToType(target));
        }

        Ok(match opcode {
            Opcode::FuncDecl => {
                let name = self.ident()?.unwrap_or_default();
                let namespace = self.ident()?;
                let package = self.ident()?;
                let has_body = self.word()? != 0;
                let end_addr = self.word()?;
                let argc = self.word()?;
                let mut args = Vec::with_capacity(argc as usize);
                for i in 0..argc {
                    args.push(self.ident()?.unwrap_or_else(|| format!("%arg{i}")));
                }
                InstKind::FunctionDecl(FunctionHeader {
                    name,
                    namespace,
                    package,
                    has_body,
                    end_addr,
                    args,
                })
            }
            Opcode::CreateObject => {
                let parent = self.ident()?;
                let is_datablock = self.word()? != 0;
                let fail_jump_addr = self.word()?;
                InstKind::CreateObject {
                    parent,
                    is_datablock,
                    fail_jump_addr,
                }
            }
            Opcode::AddObject => InstKind::AddObject {
                place_at_root: self.word()? != 0,
            },
            Opcode::EndObject => InstKind::EndObject {
                place_at_root: self.word()? != 0,
            },
            Opcode::Return => InstKind::Return {
                // Captured before decode_one clears the bit.
                returns_value: self.returnable_value,
            },
            Opcode::CompareStr => InstKind::StringCompare,
            Opcode::SetCurVar | Opcode::SetCurVarCreate => InstKind::SetCurVar {
                name: self.ident()?.unwrap_or_default(),
                create: opcode == Opcode::SetCurVarCreate,
            },
            Opcode::SetCurVarArray | Opcode::SetCurVarArrayCreate => InstKind::SetCurVarArray {
                create: opcode == Opcode::SetCurVarArrayCreate,
            },
            Opcode::LoadVarUint => InstKind::LoadVar(ValueType::Uint),
            Opcode::LoadVarFlt => InstKind::LoadVar(ValueType::Flt),
            Opcode::LoadVarStr => InstKind::LoadVar(ValueType::Str),
            Opcode::SaveVarUint => InstKind::SaveVar(ValueType::Uint),
            Opcode::SaveVarFlt => InstKind::SaveVar(ValueType::Flt),
            Opcode::SaveVarStr => InstKind::SaveVar(ValueType::Str),
            Opcode::SetCurObject => InstKind::SetCurObject { is_new: false },
            Opcode::SetCurObjectNew => InstKind::SetCurObject { is_new: true },
            Opcode::SetCurField => InstKind::SetCurField {
                name: self.ident()?.unwrap_or_default(),
            },
            Opcode::SetCurFieldArray => InstKind::SetCurFieldArray,
            Opcode::LoadFieldUint => InstKind::LoadField(ValueType::Uint),
            Opcode::LoadFieldFlt => InstKind::LoadField(ValueType::Flt),
            Opcode::LoadFieldStr => InstKind::LoadField(ValueType::Str),
            Opcode::SaveFieldUint => InstKind::SaveField(ValueType::Uint),
            Opcode::SaveFieldFlt => InstKind::SaveField(ValueType::Flt),
            Opcode::SaveFieldStr => InstKind::SaveField(ValueType::Str),
            Opcode::LoadImmedUint => InstKind::LoadImmediate(Immediate::Uint(self.word()?)),
            Opcode::LoadImmedFlt => InstKind::LoadImmediate(Immediate::Float(self.word()?)),
            Opcode::TagToStr => InstKind::LoadImmediate(Immediate::TagRef(self.word()?)),
            Opcode::LoadImmedStr => InstKind::LoadImmediate(Immediate::StringRef(self.word()?)),
            Opcode::LoadImmedIdent => InstKind::LoadImmediate(Immediate::IdentRef(
                self.ident()?.unwrap_or_default(),
            )),
            Opcode::CallFunc | Opcode::CallFuncResolve => {
                let name = self.ident()?.unwrap_or_default();
                let namespace = self.ident()?;
                let call_type = CallType::from_u32(self.word()?);
                InstKind::Call {
                    name,
                    namespace,
                    call_type,
                }
            }
            Opcode::AdvanceStr => InstKind::AdvanceString(AdvanceKind::Plain),
            Opcode::AdvanceStrAppendChar => {
                let at = self.ip;
                let word = self.word()?;
                let ch = char::from_u32(word)
                    .ok_or(Error::InvalidAppendChar { addr: at, word })?;
                InstKind::AdvanceString(AdvanceKind::AppendChar(ch))
            }
            Opcode::AdvanceStrComma => InstKind::AdvanceString(AdvanceKind::Comma),
            Opcode::AdvanceStrNul => InstKind::AdvanceString(AdvanceKind::Null),
            Opcode::RewindStr => InstKind::Rewind { terminate: false },
            Opcode::TerminateRewindStr => InstKind::Rewind { terminate: true },
            Opcode::Push => InstKind::Push,
            Opcode::PushFrame => InstKind::PushFrame,
            Opcode::DebugBreak => InstKind::DebugBreak,
            Opcode::Unused1 | Opcode::Unused2 => InstKind::Unused,
            // Branches, binaries, unaries, converts, Return handled above.
            _ => unreachable!("opcode {opcode:?} not covered by a decoder"),
        })
    }
}

/// Validate branch targets and function end addresses, then flag every
/// branched-to instruction.
fn mark_branch_targets(disassembly: &mut Disassembly, code_size: u32) -> Result<()> {
    let mut targets = Vec::new();
    for inst in disassembly.iter() {
        if let Some((_, target)) = inst.branch() {
            if !disassembly.contains(target) {
                return Err(Error::InvalidBranchTarget {
                    addr: inst.addr,
                    target,
                });
            }
            targets.push(target);
        }
        if let Some(header) = inst.function_body() {
            let end = header.end_addr;
            if end <= inst.addr || (end != code_size && !disassembly.contains(end)) {
                return Err(Error::InvalidFunctionEnd {
                    addr: inst.addr,
                    end,
                    name: header.name.clone(),
                });
            }
        }
    }
    for target in targets {
        if let Some(inst) = disassembly.instructions.get_mut(&target) {
            inst.is_branch_target = true;
        }
    }
    Ok(())
}
