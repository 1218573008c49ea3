//! Structural analysis: collapse a CFG into a tree of high-level regions.
//!
//! The analyzer works on a region graph that starts as a 1:1 mirror of the
//! CFG and shrinks as patterns are recognized. Each post-order sweep tries
//! acyclic reductions (sequence, if-then, if-then-else) away from cycle
//! ends and cyclic reductions (loops) at cycle starts. When a full sweep
//! makes no progress, refinement virtualizes edges of irreducible
//! subgraphs into `Goto` regions until reduction can continue; one
//! last-resort cut per stalled sweep bounds the whole loop.

pub mod region;

use std::collections::{HashMap, HashSet};

use crate::cfg::dom::DominatorTree;
use crate::cfg::Cfg;
use crate::disasm::opcode::BranchKind;
use crate::error::{Error, Result};
use region::{push_region, rewrite_jumps, BlockCode, Region};

/// Mutable mirror of one CFG node during reduction.
///
/// For a two-successor node the edge order is an invariant: branch target
/// first, fall-through second. All rewiring below preserves it.
struct RegionNode {
    succs: Vec<u32>,
    preds: Vec<u32>,
    /// CFG block currently providing this node's outgoing branch. Updated
    /// when a successor is merged in.
    tail: u32,
}

/// Collapse `cfg` into a single structured region.
pub fn analyze(cfg: &Cfg) -> Result<Region> {
    Analyzer::new(cfg)?.run()
}

struct Analyzer<'a> {
    cfg: &'a Cfg,
    dom: DominatorTree,
    nodes: HashMap<u32, RegionNode>,
    entry: u32,
    /// Virtual regions, keyed by the region-graph node that owns them.
    regions: HashMap<u32, Region>,
    /// Cycle-start nodes whose loops resisted cyclic reduction.
    unreduced_loops: Vec<u32>,
}

impl<'a> Analyzer<'a> {
    fn new(cfg: &'a Cfg) -> Result<Self> {
        let dom = DominatorTree::build(cfg)?;
        let nodes = cfg
            .blocks
            .values()
            .map(|b| {
                (
                    b.addr,
                    RegionNode {
                        succs: b.successors.clone(),
                        preds: b.predecessors.clone(),
                        tail: b.addr,
                    },
                )
            })
            .collect();
        Ok(Self {
            cfg,
            dom,
            nodes,
            entry: cfg.entry,
            regions: HashMap::new(),
            unreduced_loops: Vec::new(),
        })
    }

    fn run(&mut self) -> Result<Region> {
        loop {
            let mut progressed = false;
            for n in self.postorder() {
                if self.nodes.contains_key(&n) {
                    progressed |= self.reduce_node(n)?;
                }
            }
            if self.nodes.len() == 1 {
                break;
            }
            if !progressed {
                self.refine()?;
            }
        }
        let last = *self.nodes.keys().next().expect("analysis left no node");
        let region = self.take_region(last);
        Ok(self.wrap_function(last, region))
    }

    // -- graph helpers ----------------------------------------------------

    fn postorder(&self) -> Vec<u32> {
        fn dfs(
            n: u32,
            nodes: &HashMap<u32, RegionNode>,
            visited: &mut HashSet<u32>,
            out: &mut Vec<u32>,
        ) {
            if !visited.insert(n) {
                return;
            }
            if let Some(node) = nodes.get(&n) {
                for &s in &node.succs {
                    dfs(s, nodes, visited, out);
                }
            }
            out.push(n);
        }

        let mut visited = HashSet::new();
        let mut out = Vec::new();
        dfs(self.entry, &self.nodes, &mut visited, &mut out);
        out
    }

    fn only_pred(&self, n: u32) -> Option<u32> {
        match self.nodes[&n].preds.as_slice() {
            [p] => Some(*p),
            _ => None,
        }
    }

    /// A back edge leaves this node: some current successor dominates it.
    fn is_cycle_end(&self, n: u32) -> bool {
        self.nodes[&n]
            .succs
            .iter()
            .any(|&s| self.dom.dominates(s, n, false))
    }

    /// A back edge enters this node: it dominates some current predecessor.
    fn is_cycle_start(&self, n: u32) -> bool {
        self.nodes[&n]
            .preds
            .iter()
            .any(|&p| self.dom.dominates(n, p, false))
    }

    fn cut(&mut self, a: u32, b: u32) {
        if let Some(node) = self.nodes.get_mut(&a) {
            node.succs.retain(|&x| x != b);
        }
        if let Some(node) = self.nodes.get_mut(&b) {
            node.preds.retain(|&x| x != a);
        }
    }

    /// Branch kind of the node's current trailing instruction, if any.
    fn tail_branch(&self, n: u32) -> Option<BranchKind> {
        let tail = self.nodes[&n].tail;
        self.cfg.blocks[&tail].last().branch().map(|(kind, _)| kind)
    }

    /// Split a two-successor node's edges into (then, else) following the
    /// branch polarity: inverted and no-pop branches execute the
    /// fall-through side.
    fn then_else(&self, n: u32) -> Option<(u32, u32)> {
        let kind = self.tail_branch(n)?;
        let succs = &self.nodes[&n].succs;
        if succs.len() != 2 {
            return None;
        }
        let (target, fall) = (succs[0], succs[1]);
        if kind.then_is_fallthrough() {
            Some((fall, target))
        } else {
            Some((target, fall))
        }
    }

    // -- virtual region bookkeeping ---------------------------------------

    fn block_code(&self, n: u32) -> BlockCode {
        let block = &self.cfg.blocks[&n];
        BlockCode {
            addr: block.addr,
            code: block.code.clone(),
        }
    }

    /// The node's virtual region, or a fresh leaf copy of its block.
    fn take_region(&mut self, n: u32) -> Region {
        self.regions
            .remove(&n)
            .unwrap_or_else(|| Region::Block(self.block_code(n)))
    }

    /// Install a reduced region, wrapping it as a `Function` when the node
    /// opens a function body.
    fn install(&mut self, n: u32, region: Region) {
        let region = self.wrap_function(n, region);
        self.regions.insert(n, region);
    }

    fn wrap_function(&self, n: u32, region: Region) -> Region {
        if !self.cfg.blocks[&n].is_function || matches!(region, Region::Function { .. }) {
            return region;
        }
        let header = self.cfg.blocks[&n]
            .code
            .first()
            .and_then(|i| i.function_body())
            .expect("is_function block without declaration")
            .clone();
        let mut body = Vec::new();
        push_region(&mut body, region);
        Region::Function { header, body }
    }

    /// Append a trailing element (typically a `Goto`) to a node's region.
    fn append_region(&mut self, n: u32, extra: Region) {
        let current = self.take_region(n);
        let merged = match current {
            Region::Function { header, mut body } => {
                push_region(&mut body, extra);
                Region::Function { header, body }
            }
            Region::Sequence(mut body) => {
                push_region(&mut body, extra);
                Region::Sequence(body)
            }
            other => {
                let mut body = Vec::new();
                push_region(&mut body, other);
                push_region(&mut body, extra);
                Region::Sequence(body)
            }
        };
        self.regions.insert(n, merged);
    }

    // -- reduction --------------------------------------------------------

    fn reduce_node(&mut self, n: u32) -> Result<bool> {
        let mut any = false;
        let mut reduced = true;
        while reduced && self.nodes.contains_key(&n) {
            reduced = false;
            if !self.is_cycle_end(n) {
                reduced = self.reduce_acyclic(n)?;
            }
            if !reduced && self.is_cycle_start(n) {
                reduced = self.reduce_cyclic(n)?;
            }
            any |= reduced;
        }
        Ok(any)
    }

    fn reduce_acyclic(&mut self, n: u32) -> Result<bool> {
        let succs = self.nodes[&n].succs.clone();
        match succs.len() {
            0 => Ok(false),
            1 => Ok(self.reduce_sequence(n, succs[0])),
            2 => Ok(self.reduce_conditional(n)),
            count => Err(Error::TooManySuccessors { addr: n, count }),
        }
    }

    /// Merge a sole successor whose only predecessor is `n`.
    fn reduce_sequence(&mut self, n: u32, s: u32) -> bool {
        if s == n || self.only_pred(s) != Some(n) {
            return false;
        }

        let first = self.take_region(n);
        // A cycle-end successor closes an enclosing loop; a bare block is
        // marked as the loop footer so it stays inside the loop body.
        let second = if self.is_cycle_end(s) && !self.regions.contains_key(&s) {
            Region::LoopFooter(self.block_code(s))
        } else {
            self.take_region(s)
        };

        let merged = match first {
            Region::Function { header, mut body } => {
                push_region(&mut body, second);
                Region::Function { header, body }
            }
            Region::Sequence(mut body) => {
                push_region(&mut body, second);
                Region::Sequence(body)
            }
            other => {
                let mut body = Vec::new();
                push_region(&mut body, other);
                push_region(&mut body, second);
                Region::Sequence(body)
            }
        };
        self.install(n, merged);

        // Rewire: n inherits s's successors and tail.
        let s_node = self.nodes.remove(&s).expect("merged node exists");
        for &x in &s_node.succs {
            let preds = &mut self.nodes.get_mut(&x).expect("successor exists").preds;
            for p in preds.iter_mut() {
                if *p == s {
                    *p = n;
                }
            }
            preds.sort_unstable();
            preds.dedup();
        }
        let node = self.nodes.get_mut(&n).expect("node exists");
        node.succs = s_node.succs;
        node.tail = s_node.tail;
        true
    }

    /// Collapse an if-then / if-then-else rooted at `n`.
    fn reduce_conditional(&mut self, n: u32) -> bool {
        let Some((t, e)) = self.then_else(n) else {
            return false;
        };
        if t == e || t == n || e == n {
            return false;
        }

        let t_succs = self.nodes[&t].succs.clone();
        let e_succs = self.nodes[&e].succs.clone();
        let t_only = self.only_pred(t) == Some(n);
        let e_only = self.only_pred(e) == Some(n);

        // if-then: the then arm falls through to the else edge.
        if t_only && t_succs == [e] {
            return self.fold_one_arm(n, t, e, true);
        }
        // Inverted if-then: the else arm falls through to the then edge.
        if e_only && e_succs == [t] {
            return self.fold_one_arm(n, e, t, false);
        }
        // if-then-else: both arms converge on one merge block.
        if t_only && e_only && t_succs.len() == 1 && t_succs == e_succs && t_succs[0] != n {
            let m = t_succs[0];
            let head = self.take_region(n);
            let mut then_body = Vec::new();
            push_region(&mut then_body, self.take_region(t));
            let mut else_body = Vec::new();
            push_region(&mut else_body, self.take_region(e));
            self.install(
                n,
                Region::Conditional {
                    head: Box::new(head),
                    then_body,
                    else_body,
                },
            );
            self.nodes.remove(&t);
            self.nodes.remove(&e);
            self.nodes.get_mut(&n).expect("node exists").succs = vec![m];
            let m_preds = &mut self.nodes.get_mut(&m).expect("merge exists").preds;
            m_preds.retain(|&x| x != t && x != e);
            m_preds.push(n);
            m_preds.sort_unstable();
            m_preds.dedup();
            return true;
        }
        // The remaining folds absorb dead-end arms. On a loop header the
        // dead end is the loop exit, which cyclic reduction must keep.
        if self.is_cycle_start(n) {
            return false;
        }
        // Both arms terminate (returns on both sides): fold with no merge.
        if t_only && e_only && t_succs.is_empty() && e_succs.is_empty() {
            let head = self.take_region(n);
            let mut then_body = Vec::new();
            push_region(&mut then_body, self.take_region(t));
            let mut else_body = Vec::new();
            push_region(&mut else_body, self.take_region(e));
            self.install(
                n,
                Region::Conditional {
                    head: Box::new(head),
                    then_body,
                    else_body,
                },
            );
            self.nodes.remove(&t);
            self.nodes.remove(&e);
            self.nodes.get_mut(&n).expect("node exists").succs = Vec::new();
            return true;
        }
        // One arm terminates, the other continues the surrounding flow.
        if t_only && t_succs.is_empty() {
            return self.fold_one_arm(n, t, e, true);
        }
        if e_only && e_succs.is_empty() {
            return self.fold_one_arm(n, e, t, false);
        }
        false
    }

    /// Fold a single-arm conditional: `arm` is absorbed, `next` remains the
    /// node's sole successor. `arm_is_then` keeps the branch polarity.
    fn fold_one_arm(&mut self, n: u32, arm: u32, next: u32, arm_is_then: bool) -> bool {
        let head = self.take_region(n);
        let mut arm_body = Vec::new();
        push_region(&mut arm_body, self.take_region(arm));
        let (then_body, else_body) = if arm_is_then {
            (arm_body, Vec::new())
        } else {
            (Vec::new(), arm_body)
        };
        self.install(
            n,
            Region::Conditional {
                head: Box::new(head),
                then_body,
                else_body,
            },
        );
        let arm_succs = self.nodes[&arm].succs.clone();
        self.nodes.remove(&arm);
        self.nodes.get_mut(&n).expect("node exists").succs = vec![next];
        if arm_succs.contains(&next) {
            self.nodes
                .get_mut(&next)
                .expect("successor exists")
                .preds
                .retain(|&x| x != arm);
        }
        true
    }

    /// Collapse a loop at cycle-start `n`: either a self-loop or a
    /// header/latch pair where the latch's first successor is `n` and `n`
    /// is its only predecessor.
    fn reduce_cyclic(&mut self, n: u32) -> Result<bool> {
        let succs = self.nodes[&n].succs.clone();
        for s in succs {
            let matched = s == n || {
                let s_node = &self.nodes[&s];
                s_node.succs.first() == Some(&n) && self.only_pred(s) == Some(n)
            };
            if !matched {
                continue;
            }

            // The block closing the cycle must end in a branch.
            let back_tail = self.nodes[&s].tail;
            if !self.cfg.blocks[&back_tail].last().is_branch() {
                return Err(Error::CyclicNoBranch { addr: back_tail });
            }

            let mut body = Vec::new();
            push_region(&mut body, self.take_region(n));
            if s != n {
                push_region(&mut body, self.take_region(s));
            }

            if s == n {
                let node = self.nodes.get_mut(&n).expect("node exists");
                node.succs.retain(|&x| x != n);
                node.preds.retain(|&x| x != n);
            } else {
                let s_node = self.nodes.remove(&s).expect("latch exists");
                {
                    let node = self.nodes.get_mut(&n).expect("node exists");
                    node.succs.retain(|&x| x != s);
                    node.preds.retain(|&x| x != s);
                }
                // The latch's remaining successors become loop exits of n.
                for &x in s_node.succs.iter().filter(|&&x| x != n) {
                    if !self.nodes[&n].succs.contains(&x) {
                        self.nodes.get_mut(&n).expect("node exists").succs.push(x);
                    }
                    let preds = &mut self.nodes.get_mut(&x).expect("exit exists").preds;
                    for p in preds.iter_mut() {
                        if *p == s {
                            *p = n;
                        }
                    }
                    preds.sort_unstable();
                    preds.dedup();
                }
            }

            // No exit edge left means the loop can only spin.
            let exits = self.nodes[&n].succs.clone();
            let infinite = exits.is_empty();
            rewrite_jumps(&mut body, n, &exits);
            self.install(n, Region::Loop { infinite, body });
            return Ok(true);
        }

        if !self.unreduced_loops.contains(&n) {
            self.unreduced_loops.push(n);
        }
        Ok(false)
    }

    // -- refinement -------------------------------------------------------

    fn refine(&mut self) -> Result<()> {
        let mut progressed = false;

        let heads = std::mem::take(&mut self.unreduced_loops);
        for h in heads {
            if self.nodes.contains_key(&h) {
                progressed |= self.ensure_single_entry(h);
            }
        }

        // A reduce-tail-successors pass would fold two-successor nodes
        // whose then arm is a dead-end tail here; the conditional cases
        // above cover the common shapes, and what remains falls through to
        // the goto cuts below at the cost of less tidy output.

        if !progressed {
            progressed = self.last_resort();
        }
        if progressed {
            Ok(())
        } else {
            Err(Error::AnalysisStalled {
                remaining: self.nodes.len(),
            })
        }
    }

    /// Natural loop of head `h` over the current region graph: nodes on a
    /// backward path from a back edge into `h`, without leaving the region
    /// `h` dominates.
    fn natural_loop(&self, h: u32) -> Vec<u32> {
        let mut body = HashSet::from([h]);
        let mut queue: Vec<u32> = Vec::new();
        for &p in &self.nodes[&h].preds {
            if self.dom.dominates(h, p, false) && body.insert(p) {
                queue.push(p);
            }
        }
        while let Some(cur) = queue.pop() {
            for &p in &self.nodes[&cur].preds {
                if self.dom.dominates(h, p, false) && body.insert(p) {
                    queue.push(p);
                }
            }
        }
        let mut out: Vec<u32> = body.into_iter().collect();
        out.sort_unstable();
        out
    }

    /// Give an irreducible loop a single entry: the member with the most
    /// external incoming edges stays the real head; every external edge
    /// into any other member is virtualized into a `Goto` at its source.
    fn ensure_single_entry(&mut self, h: u32) -> bool {
        let members = self.natural_loop(h);
        if members.len() <= 1 {
            return false;
        }
        let external = |this: &Self, m: u32| -> Vec<u32> {
            this.nodes[&m]
                .preds
                .iter()
                .copied()
                .filter(|p| !members.contains(p))
                .collect()
        };

        let head = members
            .iter()
            .copied()
            .max_by_key(|&m| (external(self, m).len(), m == h))
            .unwrap_or(h);

        let mut progressed = false;
        for &m in &members {
            if m == head {
                continue;
            }
            for src in external(self, m) {
                self.append_region(src, Region::Goto { target_addr: m });
                self.cut(src, m);
                progressed = true;
            }
        }
        progressed
    }

    /// Make exactly one edge cut to break a stall: prefer an edge with no
    /// dominance relationship between its endpoints (the classic
    /// irreducible case), never orphaning the target.
    fn last_resort(&mut self) -> bool {
        for n in self.postorder() {
            if !self.nodes.contains_key(&n) {
                continue;
            }
            let succs = self.nodes[&n].succs.clone();
            match succs.len() {
                1 => {
                    let s = succs[0];
                    if s != n
                        && !self.dom.dominates(n, s, false)
                        && !self.dom.dominates(s, n, false)
                        && self.only_pred(s) != Some(n)
                    {
                        self.append_region(n, Region::Goto { target_addr: s });
                        self.cut(n, s);
                        return true;
                    }
                }
                2 => {
                    let Some((_, e)) = self.then_else(n) else {
                        continue;
                    };
                    if !self.dom.dominates(n, e, false)
                        && !self.dom.dominates(e, n, false)
                        && self.only_pred(e) != Some(n)
                    {
                        let head = self.take_region(n);
                        self.install(
                            n,
                            Region::ConditionalGoto {
                                head: Box::new(head),
                                target_addr: e,
                            },
                        );
                        self.cut(n, e);
                        return true;
                    }
                }
                _ => {}
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_cfgs;
    use crate::disasm::disassemble;
    use crate::disasm::opcode::Opcode;
    use dso::FileData;
    use std::collections::HashMap as StdHashMap;

    fn analyze_code(code: Vec<u32>) -> Region {
        let file = FileData::from_parts(44, b"f\0".to_vec(), vec![], code, StdHashMap::new());
        let d = disassemble(&file).unwrap();
        let cfgs = build_cfgs(&d).unwrap();
        assert_eq!(cfgs.len(), 1, "expected a single CFG");
        analyze(&cfgs[0]).unwrap()
    }

    #[test]
    fn self_jump_is_infinite_loop() {
        // 0: JMP 0
        let region = analyze_code(vec![Opcode::Jmp as u32, 0]);
        match region {
            Region::Loop { infinite, body } => {
                assert!(infinite);
                assert_eq!(body.len(), 1);
                assert!(matches!(&body[0], Region::Block(b) if b.addr == 0));
            }
            other => panic!("expected Loop, got {other:?}"),
        }
    }

    #[test]
    fn if_then_collapses_with_empty_else() {
        // 0: LOADIMMED_UINT 1
        // 2: JMPIFNOT 6
        // 4: LOADIMMED_UINT 2
        // 6: RETURN
        let region = analyze_code(vec![
            Opcode::LoadImmedUint as u32,
            1,
            Opcode::JmpIfNot as u32,
            6,
            Opcode::LoadImmedUint as u32,
            2,
            Opcode::Return as u32,
        ]);
        let Region::Sequence(body) = region else {
            panic!("expected Sequence, got {region:?}");
        };
        assert_eq!(body.len(), 2);
        match &body[0] {
            Region::Conditional {
                then_body,
                else_body,
                ..
            } => {
                assert_eq!(then_body.len(), 1);
                assert!(matches!(&then_body[0], Region::Block(b) if b.addr == 4));
                assert!(else_body.is_empty());
            }
            other => panic!("expected Conditional, got {other:?}"),
        }
        assert!(matches!(&body[1], Region::Block(b) if b.addr == 6));
    }

    #[test]
    fn if_then_else_collapses_both_arms() {
        // 0: LOADIMMED_UINT 1
        // 2: JMPIFNOT 8      (else at 8)
        // 4: LOADIMMED_UINT 2
        // 6: JMP 10
        // 8: LOADIMMED_UINT 3
        // 10: RETURN
        let region = analyze_code(vec![
            Opcode::LoadImmedUint as u32,
            1,
            Opcode::JmpIfNot as u32,
            8,
            Opcode::LoadImmedUint as u32,
            2,
            Opcode::Jmp as u32,
            10,
            Opcode::LoadImmedUint as u32,
            3,
            Opcode::Return as u32,
        ]);
        let Region::Sequence(body) = region else {
            panic!("expected Sequence, got {region:?}");
        };
        match &body[0] {
            Region::Conditional {
                then_body,
                else_body,
                ..
            } => {
                assert!(matches!(&then_body[0], Region::Block(b) if b.addr == 4));
                assert!(matches!(&else_body[0], Region::Block(b) if b.addr == 8));
            }
            other => panic!("expected Conditional, got {other:?}"),
        }
    }

    #[test]
    fn while_loop_is_finite_with_footer() {
        // 0: LOADIMMED_UINT 1    (header / condition)
        // 2: JMPIFNOT 8          (exit)
        // 4: LOADIMMED_UINT 2    (body)
        // 6: JMP 0               (back edge)
        // 8: RETURN
        let region = analyze_code(vec![
            Opcode::LoadImmedUint as u32,
            1,
            Opcode::JmpIfNot as u32,
            8,
            Opcode::LoadImmedUint as u32,
            2,
            Opcode::Jmp as u32,
            0,
            Opcode::Return as u32,
        ]);
        let Region::Sequence(body) = region else {
            panic!("expected Sequence, got {region:?}");
        };
        match &body[0] {
            Region::Loop { infinite, body } => {
                assert!(!infinite);
                // Header block, then the latch as a plain body block.
                assert!(matches!(&body[0], Region::Block(b) if b.addr == 0));
                assert!(matches!(&body[1], Region::Block(b) if b.addr == 4));
            }
            other => panic!("expected Loop, got {other:?}"),
        }
        assert!(matches!(&body[1], Region::Block(b) if b.addr == 8));
    }

    #[test]
    fn multi_block_loop_body_keeps_footer_inside() {
        // 0: LOADIMMED_UINT 1      header
        // 2: JMPIFNOT 12           exit
        // 4: LOADIMMED_UINT 2      body a
        // 6: UINT_TO_NONE
        // 7: JMPIF 10              body split (forces a second body block)
        // 9: RETURN
        // 10: JMP 0                footer with the back edge
        // 12: RETURN
        let region = analyze_code(vec![
            Opcode::LoadImmedUint as u32,
            1,
            Opcode::JmpIfNot as u32,
            12,
            Opcode::LoadImmedUint as u32,
            2,
            Opcode::UintToNone as u32,
            Opcode::JmpIf as u32,
            10,
            Opcode::Return as u32,
            Opcode::Jmp as u32,
            0,
            Opcode::Return as u32,
        ]);
        // The loop footer (block 10) must appear inside the loop body, not
        // as a sibling of the loop.
        fn find_footer(r: &Region) -> bool {
            match r {
                Region::LoopFooter(b) => b.addr == 10,
                Region::Sequence(body)
                | Region::Loop { body, .. }
                | Region::Function { body, .. } => body.iter().any(find_footer),
                Region::Conditional {
                    head,
                    then_body,
                    else_body,
                } => {
                    find_footer(head)
                        || then_body.iter().any(find_footer)
                        || else_body.iter().any(find_footer)
                }
                _ => false,
            }
        }
        let Region::Sequence(body) = &region else {
            panic!("expected Sequence, got {region:?}");
        };
        let Region::Loop { body: loop_body, .. } = &body[0] else {
            panic!("expected Loop first, got {:?}", body[0]);
        };
        assert!(
            loop_body.iter().any(find_footer),
            "loop footer not inside loop body: {region:?}"
        );
    }

    #[test]
    fn function_region_wraps_body() {
        // 0: FUNC_DECL f end=9
        // 7: LOADIMMED_UINT 1
        // (no trailing return; body falls off the end)
        let code = vec![
            Opcode::FuncDecl as u32,
            0,
            dso::file::NO_IDENT,
            dso::file::NO_IDENT,
            1,
            9,
            0,
            Opcode::LoadImmedUint as u32,
            1,
        ];
        let file = FileData::from_parts(44, b"f\0".to_vec(), vec![], code, StdHashMap::new());
        let d = disassemble(&file).unwrap();
        let cfgs = build_cfgs(&d).unwrap();
        assert_eq!(cfgs.len(), 1);
        let region = analyze(&cfgs[0]).unwrap();
        match region {
            Region::Function { header, body } => {
                assert_eq!(header.name, "f");
                assert!(!body.is_empty());
            }
            other => panic!("expected Function, got {other:?}"),
        }
    }

    #[test]
    fn irreducible_two_entry_cycle_synthesizes_goto() {
        // 0: JMPIF 6          → enters the cycle at 6 or (fall) at 2
        // 2: LOADIMMED_UINT 1
        // 4: JMP 6
        // 6: LOADIMMED_UINT 2
        // 8: JMP 2            → 2 ↔ 6 form a cycle with two entries
        //
        // Neither cycle node dominates the other, so there is no back edge
        // to anchor a loop; refinement has to cut an edge into a goto
        // before the rest collapses.
        let region = analyze_code(vec![
            Opcode::JmpIf as u32,
            6,
            Opcode::LoadImmedUint as u32,
            1,
            Opcode::Jmp as u32,
            6,
            Opcode::LoadImmedUint as u32,
            2,
            Opcode::Jmp as u32,
            2,
        ]);
        let mut targets = std::collections::HashSet::new();
        region::collect_goto_targets(&region, &mut targets);
        assert!(
            !targets.is_empty(),
            "expected at least one synthesized goto in {region:?}"
        );
    }
}
