//! Structured regions recovered from the control-flow graph.

use crate::disasm::inst::{FunctionHeader, Instruction};

/// Instruction payload of a leaf region: one basic block's code.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockCode {
    pub addr: u32,
    pub code: Vec<Instruction>,
}

/// A node in the structured tree produced by collapsing the region graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    /// Straight-line code from one basic block.
    Block(BlockCode),
    /// The trailing block that closes a loop (holds the back branch).
    LoopFooter(BlockCode),
    /// Regions in execution order. Never directly nests another `Sequence`;
    /// see [`push_region`].
    Sequence(Vec<Region>),
    Function {
        header: FunctionHeader,
        body: Vec<Region>,
    },
    /// `head` computes the condition and ends with the conditional branch.
    /// `else_body` may be empty; an empty `then_body` with a non-empty
    /// `else_body` means the condition is to be inverted on emission.
    Conditional {
        head: Box<Region>,
        then_body: Vec<Region>,
        else_body: Vec<Region>,
    },
    Loop {
        infinite: bool,
        body: Vec<Region>,
    },
    /// `head` computes a condition whose taken side jumps to `target_addr`;
    /// the fall-through continues in the surrounding region.
    ConditionalGoto {
        head: Box<Region>,
        target_addr: u32,
    },
    Goto {
        target_addr: u32,
    },
    Break,
    Continue,
}

/// Append a region to a body, splicing `Sequence` elements so sequences
/// never nest directly.
pub fn push_region(body: &mut Vec<Region>, region: Region) {
    match region {
        Region::Sequence(elems) => {
            for e in elems {
                push_region(body, e);
            }
        }
        other => body.push(other),
    }
}

/// Rewrite jumps inside a freshly built loop body: a `Goto` back to the
/// loop head becomes `Continue`, a `Goto` to one of the loop's exit
/// addresses becomes `Break`. Nested loops own their jumps and are not
/// descended into.
pub fn rewrite_jumps(body: &mut [Region], head: u32, exits: &[u32]) {
    for region in body {
        match region {
            Region::Goto { target_addr } => {
                if *target_addr == head {
                    *region = Region::Continue;
                } else if exits.contains(target_addr) {
                    *region = Region::Break;
                }
            }
            Region::Sequence(elems) => rewrite_jumps(elems, head, exits),
            Region::Conditional {
                then_body,
                else_body,
                ..
            } => {
                rewrite_jumps(then_body, head, exits);
                rewrite_jumps(else_body, head, exits);
            }
            _ => {}
        }
    }
}

/// Collect the targets of all residual gotos, so the emitter knows which
/// blocks need labels.
pub fn collect_goto_targets(region: &Region, out: &mut std::collections::HashSet<u32>) {
    match region {
        Region::Goto { target_addr } | Region::ConditionalGoto { target_addr, .. } => {
            out.insert(*target_addr);
            if let Region::ConditionalGoto { head, .. } = region {
                collect_goto_targets(head, out);
            }
        }
        Region::Sequence(body) | Region::Function { body, .. } | Region::Loop { body, .. } => {
            for r in body {
                collect_goto_targets(r, out);
            }
        }
        Region::Conditional {
            head,
            then_body,
            else_body,
        } => {
            collect_goto_targets(head, out);
            for r in then_body.iter().chain(else_body) {
                collect_goto_targets(r, out);
            }
        }
        Region::Block(_) | Region::LoopFooter(_) | Region::Break | Region::Continue => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(addr: u32) -> Region {
        Region::Block(BlockCode {
            addr,
            code: Vec::new(),
        })
    }

    #[test]
    fn sequences_splice_flat() {
        let mut body = Vec::new();
        push_region(&mut body, block(0));
        push_region(
            &mut body,
            Region::Sequence(vec![block(2), Region::Sequence(vec![block(4)])]),
        );
        assert_eq!(body, vec![block(0), block(2), block(4)]);
        assert!(!body.iter().any(|r| matches!(r, Region::Sequence(_))));
    }

    #[test]
    fn loop_jumps_become_break_and_continue() {
        let mut body = vec![
            Region::Goto { target_addr: 0 },
            Region::Conditional {
                head: Box::new(block(2)),
                then_body: vec![Region::Goto { target_addr: 9 }],
                else_body: vec![],
            },
            Region::Goto { target_addr: 5 },
        ];
        rewrite_jumps(&mut body, 0, &[9]);
        assert_eq!(body[0], Region::Continue);
        assert!(matches!(
            &body[1],
            Region::Conditional { then_body, .. } if then_body[0] == Region::Break
        ));
        // Unrelated targets stay as gotos.
        assert_eq!(body[2], Region::Goto { target_addr: 5 });
    }
}
