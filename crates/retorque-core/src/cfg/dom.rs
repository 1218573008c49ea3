//! Dominator tree, computed with the Cooper-Harvey-Kennedy iterative
//! algorithm over a reverse-postorder work list.

use std::collections::{HashMap, HashSet};

use super::Cfg;
use crate::error::{Error, Result};

pub struct DominatorTree {
    entry: u32,
    /// Immediate dominator of each non-entry block.
    idom: HashMap<u32, u32>,
    /// Memoized reverse-postorder numbering.
    rpo_number: HashMap<u32, usize>,
}

impl DominatorTree {
    pub fn build(cfg: &Cfg) -> Result<Self> {
        let entry = cfg.entry;
        let rpo = reverse_postorder(cfg);
        let rpo_number: HashMap<u32, usize> =
            rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

        // The entry is self-dominated while iterating; reset afterwards.
        let mut idom: HashMap<u32, u32> = HashMap::new();
        idom.insert(entry, entry);

        let intersect = |mut a: u32, mut b: u32, idom: &HashMap<u32, u32>| -> u32 {
            while a != b {
                while rpo_number[&a] > rpo_number[&b] {
                    a = idom[&a];
                }
                while rpo_number[&b] > rpo_number[&a] {
                    b = idom[&b];
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &b in &rpo {
                if b == entry {
                    continue;
                }
                let mut new_idom: Option<u32> = None;
                for &p in &cfg.blocks[&b].predecessors {
                    if !idom.contains_key(&p) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(current) => intersect(p, current, &idom),
                    });
                }
                if let Some(new) = new_idom {
                    if idom.get(&b) != Some(&new) {
                        idom.insert(b, new);
                        changed = true;
                    }
                }
            }
        }

        idom.remove(&entry);

        // Every reachable block except the entry must have been assigned.
        for &b in cfg.blocks.keys() {
            if b != entry && !idom.contains_key(&b) {
                return Err(Error::MissingDominator { addr: b });
            }
        }

        Ok(Self {
            entry,
            idom,
            rpo_number,
        })
    }

    /// Immediate dominator, or `None` for the entry.
    pub fn immediate_dom(&self, n: u32) -> Option<u32> {
        self.idom.get(&n).copied()
    }

    pub fn rpo_number(&self, n: u32) -> Option<usize> {
        self.rpo_number.get(&n).copied()
    }

    /// Does `a` dominate `b`? With `strict`, `a == b` does not count.
    pub fn dominates(&self, a: u32, b: u32, strict: bool) -> bool {
        if a == b {
            return !strict;
        }
        let mut cur = b;
        while let Some(parent) = self.immediate_dom(cur) {
            if parent == a {
                return true;
            }
            cur = parent;
        }
        false
    }

    /// Closest common dominator of `a` and `b` ("two fingers"): repeatedly
    /// advance whichever finger has the higher reverse-postorder number.
    pub fn common_dominator(&self, mut a: u32, mut b: u32) -> u32 {
        while a != b {
            let ra = self.rpo_number[&a];
            let rb = self.rpo_number[&b];
            if ra > rb {
                a = self.immediate_dom(a).unwrap_or(self.entry);
            } else {
                b = self.immediate_dom(b).unwrap_or(self.entry);
            }
        }
        a
    }
}

/// Reverse-postorder traversal of the CFG from its entry.
fn reverse_postorder(cfg: &Cfg) -> Vec<u32> {
    fn dfs(b: u32, cfg: &Cfg, visited: &mut HashSet<u32>, postorder: &mut Vec<u32>) {
        if !visited.insert(b) {
            return;
        }
        for &s in &cfg.blocks[&b].successors {
            dfs(s, cfg, visited, postorder);
        }
        postorder.push(b);
    }

    let mut visited = HashSet::new();
    let mut postorder = Vec::new();
    dfs(cfg.entry, cfg, &mut visited, &mut postorder);
    postorder.reverse();
    postorder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::BasicBlock;
    use crate::disasm::inst::{InstKind, Instruction};
    use crate::disasm::opcode::Opcode;
    use std::collections::BTreeMap;

    /// Hand-build a CFG from an edge list; block code is a placeholder.
    fn cfg_from_edges(entry: u32, edges: &[(u32, u32)]) -> Cfg {
        let mut blocks: BTreeMap<u32, BasicBlock> = BTreeMap::new();
        let mut addrs: Vec<u32> = edges.iter().flat_map(|&(a, b)| [a, b]).collect();
        addrs.push(entry);
        addrs.sort_unstable();
        addrs.dedup();
        for addr in addrs {
            blocks.insert(
                addr,
                BasicBlock {
                    addr,
                    code: vec![Instruction {
                        addr,
                        opcode: Opcode::Return,
                        is_branch_target: false,
                        kind: InstKind::Return {
                            returns_value: false,
                        },
                    }],
                    successors: Vec::new(),
                    predecessors: Vec::new(),
                    is_function: false,
                },
            );
        }
        for &(a, b) in edges {
            blocks.get_mut(&a).unwrap().successors.push(b);
            blocks.get_mut(&b).unwrap().predecessors.push(a);
        }
        Cfg { entry, blocks }
    }

    #[test]
    fn diamond_idoms() {
        // 0 → {1, 2} → 3
        let cfg = cfg_from_edges(0, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let dom = DominatorTree::build(&cfg).unwrap();

        assert_eq!(dom.immediate_dom(0), None);
        assert_eq!(dom.immediate_dom(1), Some(0));
        assert_eq!(dom.immediate_dom(2), Some(0));
        assert_eq!(dom.immediate_dom(3), Some(0));

        assert!(dom.dominates(0, 3, true));
        assert!(!dom.dominates(1, 3, false));
        assert!(!dom.dominates(2, 3, false));
        assert_eq!(dom.common_dominator(1, 2), 0);
    }

    #[test]
    fn reflexive_and_transitive() {
        // 0 → 1 → 2 → 3
        let cfg = cfg_from_edges(0, &[(0, 1), (1, 2), (2, 3)]);
        let dom = DominatorTree::build(&cfg).unwrap();

        for n in [0, 1, 2, 3] {
            assert!(dom.dominates(n, n, false));
            assert!(!dom.dominates(n, n, true));
        }
        // 0 dom 1, 1 dom 2 ⇒ 0 dom 2.
        assert!(dom.dominates(0, 1, false));
        assert!(dom.dominates(1, 2, false));
        assert!(dom.dominates(0, 2, false));
        assert!(dom.dominates(0, 3, true));
    }

    #[test]
    fn loop_back_edge_keeps_header_dominating() {
        // 0 → 1 → 2, 2 → 1 (back edge), 1 → 3
        let cfg = cfg_from_edges(0, &[(0, 1), (1, 2), (2, 1), (1, 3)]);
        let dom = DominatorTree::build(&cfg).unwrap();

        assert!(dom.dominates(1, 2, true));
        assert_eq!(dom.immediate_dom(2), Some(1));
        assert_eq!(dom.immediate_dom(3), Some(1));
        assert_eq!(dom.common_dominator(2, 3), 1);
    }
}
