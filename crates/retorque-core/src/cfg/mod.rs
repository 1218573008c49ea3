//! Basic blocks and per-span control-flow graphs.
//!
//! The main script body and each function body form separate code spans;
//! every span gets its own graph. Blocks are keyed by the address of their
//! first instruction, edges by address.

pub mod dom;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::disasm::inst::{InstKind, Instruction};
use crate::disasm::Disassembly;
use crate::error::{Error, Result};

/// A basic block: a maximal straight-line instruction run.
#[derive(Debug)]
pub struct BasicBlock {
    /// Address of the first instruction; the block's key.
    pub addr: u32,
    pub code: Vec<Instruction>,
    /// Successor addresses. For a conditional branch the order is fixed:
    /// branch target first, fall-through second.
    pub successors: Vec<u32>,
    pub predecessors: Vec<u32>,
    /// True when the first instruction opens a function body.
    pub is_function: bool,
}

impl BasicBlock {
    pub fn last(&self) -> &Instruction {
        // Blocks are never empty by construction.
        self.code.last().expect("empty basic block")
    }
}

/// Control-flow graph over one code span.
#[derive(Debug)]
pub struct Cfg {
    pub entry: u32,
    pub blocks: BTreeMap<u32, BasicBlock>,
}

impl Cfg {
    pub fn block(&self, addr: u32) -> &BasicBlock {
        &self.blocks[&addr]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Build one CFG per code span: the main script body plus one per function
/// body, in entry-address order. An empty disassembly produces no CFGs.
pub fn build_cfgs(disassembly: &Disassembly) -> Result<Vec<Cfg>> {
    let spans = split_spans(disassembly)?;
    let mut cfgs = Vec::with_capacity(spans.len());
    for span in spans {
        cfgs.push(build_cfg(span)?);
    }
    cfgs.sort_by_key(|c| c.entry);
    Ok(cfgs)
}

/// Partition the instruction stream into the main span and one span per
/// function body. The declaring instruction belongs to its function's span;
/// main-script execution skips straight to the function's end address.
fn split_spans(disassembly: &Disassembly) -> Result<Vec<Vec<Instruction>>> {
    let mut main = Vec::new();
    let mut functions = Vec::new();
    let mut current: Option<(Vec<Instruction>, u32)> = None;

    for inst in disassembly.iter() {
        if let Some((body, end)) = &mut current {
            if inst.addr < *end {
                if inst.function_body().is_some() {
                    return Err(Error::NestedFunction { addr: inst.addr });
                }
                body.push(inst.clone());
                continue;
            }
            functions.push(std::mem::take(body));
            current = None;
        }

        if let Some(header) = inst.function_body() {
            current = Some((vec![inst.clone()], header.end_addr));
        } else {
            main.push(inst.clone());
        }
    }
    if let Some((body, _)) = current {
        functions.push(body);
    }

    let mut spans = Vec::new();
    if !main.is_empty() {
        spans.push(main);
    }
    spans.extend(functions);
    Ok(spans)
}

/// Build the CFG for one span.
fn build_cfg(span: Vec<Instruction>) -> Result<Cfg> {
    let index: HashMap<u32, usize> = span
        .iter()
        .enumerate()
        .map(|(i, inst)| (inst.addr, i))
        .collect();

    // Leader set: span entry, branch targets, and instructions following a
    // branch, return, or function-body declaration.
    let mut leaders = HashSet::new();
    leaders.insert(span[0].addr);
    for (i, inst) in span.iter().enumerate() {
        if inst.is_branch_target {
            leaders.insert(inst.addr);
        }
        if i > 0 {
            let prev = &span[i - 1];
            if prev.is_branch() || prev.is_return() || prev.function_body().is_some() {
                leaders.insert(inst.addr);
            }
        }
    }

    // Cut the span at the leaders.
    let mut blocks: BTreeMap<u32, BasicBlock> = BTreeMap::new();
    let mut current: Option<BasicBlock> = None;
    for inst in span {
        if leaders.contains(&inst.addr) {
            if let Some(block) = current.take() {
                blocks.insert(block.addr, block);
            }
            current = Some(BasicBlock {
                addr: inst.addr,
                is_function: inst.function_body().is_some(),
                code: Vec::new(),
                successors: Vec::new(),
                predecessors: Vec::new(),
            });
        }
        current
            .as_mut()
            .expect("span entry is always a leader")
            .code
            .push(inst);
    }
    if let Some(block) = current {
        blocks.insert(block.addr, block);
    }

    // Edges. A branch targeting another span would have survived the
    // disassembler's global target check but cannot be wired here.
    let addrs: Vec<u32> = blocks.keys().copied().collect();
    let mut succ_map: HashMap<u32, Vec<u32>> = HashMap::new();
    for (pos, &addr) in addrs.iter().enumerate() {
        let block = &blocks[&addr];
        let fall_through = addrs.get(pos + 1).copied();
        let last = block.last();

        let mut succs = Vec::new();
        match &last.kind {
            InstKind::Branch { target_addr, kind } => {
                if !index.contains_key(target_addr) {
                    return Err(Error::InvalidBranchTarget {
                        addr: last.addr,
                        target: *target_addr,
                    });
                }
                succs.push(*target_addr);
                if !kind.is_unconditional() {
                    if let Some(next) = fall_through {
                        succs.push(next);
                    }
                }
            }
            InstKind::Return { .. } => {}
            _ => {
                if let Some(next) = fall_through {
                    succs.push(next);
                }
            }
        }
        succs.dedup();
        succ_map.insert(addr, succs);
    }

    // Drop blocks unreachable from the entry, then wire predecessor lists.
    let entry = addrs[0];
    let mut reachable = HashSet::new();
    let mut queue = VecDeque::from([entry]);
    while let Some(addr) = queue.pop_front() {
        if !reachable.insert(addr) {
            continue;
        }
        for &s in &succ_map[&addr] {
            queue.push_back(s);
        }
    }

    blocks.retain(|addr, _| reachable.contains(addr));
    for (&addr, succs) in &succ_map {
        if !reachable.contains(&addr) {
            continue;
        }
        for &s in succs {
            blocks
                .get_mut(&s)
                .expect("reachable successor")
                .predecessors
                .push(addr);
        }
    }
    for (addr, block) in blocks.iter_mut() {
        block.successors = succ_map.remove(addr).unwrap_or_default();
        block.predecessors.sort_unstable();
        block.predecessors.dedup();
    }

    Ok(Cfg { entry, blocks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disasm::disassemble;
    use crate::disasm::opcode::Opcode;
    use dso::FileData;
    use std::collections::HashMap as StdHashMap;

    fn cfgs_for(code: Vec<u32>) -> Vec<Cfg> {
        let file = FileData::from_parts(44, b"f\0".to_vec(), vec![], code, StdHashMap::new());
        let d = disassemble(&file).unwrap();
        build_cfgs(&d).unwrap()
    }

    #[test]
    fn empty_disassembly_yields_no_cfgs() {
        assert!(cfgs_for(vec![]).is_empty());
    }

    #[test]
    fn self_loop_is_one_block_with_self_edge() {
        let cfgs = cfgs_for(vec![Opcode::Jmp as u32, 0]);
        assert_eq!(cfgs.len(), 1);
        let cfg = &cfgs[0];
        assert_eq!(cfg.len(), 1);
        let block = cfg.block(0);
        assert_eq!(block.successors, vec![0]);
        assert_eq!(block.predecessors, vec![0]);
    }

    #[test]
    fn conditional_branch_splits_blocks() {
        // 0: LOADIMMED_UINT 1
        // 2: JMPIFNOT 6
        // 4: LOADIMMED_UINT 2
        // 6: RETURN
        let cfgs = cfgs_for(vec![
            Opcode::LoadImmedUint as u32,
            1,
            Opcode::JmpIfNot as u32,
            6,
            Opcode::LoadImmedUint as u32,
            2,
            Opcode::Return as u32,
        ]);
        assert_eq!(cfgs.len(), 1);
        let cfg = &cfgs[0];
        assert_eq!(cfg.entry, 0);
        assert_eq!(cfg.len(), 3);
        // Branch target first, fall-through second.
        assert_eq!(cfg.block(0).successors, vec![6, 4]);
        assert_eq!(cfg.block(4).successors, vec![6]);
        assert_eq!(cfg.block(6).successors, Vec::<u32>::new());
        assert_eq!(cfg.block(6).predecessors, vec![0, 4]);
    }

    #[test]
    fn function_body_becomes_its_own_cfg() {
        // 0: FUNC_DECL "f" end=8, argc=0
        // 7: RETURN            (function body)
        // 8: RETURN            (main script resumes at the end address)
        let code = vec![
            Opcode::FuncDecl as u32,
            0,                   // "f"
            dso::file::NO_IDENT, // namespace
            dso::file::NO_IDENT, // package
            1,                   // has_body
            8,                   // end_addr
            0,                   // argc
            Opcode::Return as u32,
            Opcode::Return as u32,
        ];
        let cfgs = cfgs_for(code);
        assert_eq!(cfgs.len(), 2);
        // Function CFG first by entry address.
        let func = &cfgs[0];
        assert_eq!(func.entry, 0);
        assert!(func.block(0).is_function);
        // The decl instruction sits alone in the entry block.
        assert_eq!(func.block(0).code.len(), 1);
        assert_eq!(func.block(0).successors, vec![7]);
        // Main CFG holds the trailing return.
        let main = &cfgs[1];
        assert_eq!(main.entry, 8);
        assert_eq!(main.len(), 1);
    }

    #[test]
    fn unreachable_code_is_dropped() {
        // 0: RETURN
        // 1: LOADIMMED_UINT 9   (dead)
        let cfgs = cfgs_for(vec![Opcode::Return as u32, Opcode::LoadImmedUint as u32, 9]);
        assert_eq!(cfgs.len(), 1);
        assert_eq!(cfgs[0].len(), 1);
        assert!(cfgs[0].blocks.contains_key(&0));
    }
}
