//! Region-to-AST lift.
//!
//! Walks the structured region tree with a small stack machine that mirrors
//! the VM: expressions accumulate on a stack, the current variable / object
//! / field registers track access targets, call frames collect pushed
//! arguments, and the string register's advance/rewind pairs become concat
//! expressions. Conditional and loop regions pop their condition off the
//! stack where the trailing branch left it.

use std::collections::HashSet;

use dso::FileData;

use super::{ConcatOp, Expr, FieldInit, ObjectDecl, Stmt};
use crate::disasm::inst::{AdvanceKind, Immediate, InstKind, Instruction};
use crate::disasm::opcode::{BinaryOp, BranchKind, ConvertTarget};
use crate::error::{Error, Result};
use crate::structure::region::{collect_goto_targets, BlockCode, Region};

/// Lift one analyzed region tree into statements.
pub fn lift(region: &Region, file: &FileData) -> Result<Vec<Stmt>> {
    let mut labels = HashSet::new();
    collect_goto_targets(region, &mut labels);

    let mut machine = Machine {
        file,
        labels,
        stack: Vec::new(),
        frames: Vec::new(),
        concat: Vec::new(),
        cur_var: None,
        cur_obj: None,
        cur_obj_new: false,
        cur_field: None,
        objects: Vec::new(),
        pending_branch: None,
        loop_heads: Vec::new(),
        addr: 0,
    };

    let mut stmts = Vec::new();
    machine.emit_region(region, &mut stmts)?;
    machine.flush_leftovers(&mut stmts);
    Ok(stmts)
}

/// An object declaration under construction between CreateObject and
/// EndObject.
struct ObjectBuild {
    class: Expr,
    name: Option<Expr>,
    args: Vec<Expr>,
    parent: Option<String>,
    is_datablock: bool,
    place_at_root: bool,
    fields: Vec<FieldInit>,
    children: Vec<ObjectDecl>,
}

impl ObjectBuild {
    fn build(self) -> ObjectDecl {
        ObjectDecl {
            class: self.class,
            name: self.name,
            args: self.args,
            parent: self.parent,
            is_datablock: self.is_datablock,
            place_at_root: self.place_at_root,
            fields: self.fields,
            children: self.children,
        }
    }
}

struct Machine<'a> {
    file: &'a FileData,
    /// Addresses that need a label (goto destinations).
    labels: HashSet<u32>,
    stack: Vec<Expr>,
    /// Argument frames opened by PushFrame.
    frames: Vec<Vec<Expr>>,
    /// Saved string-register fragments from AdvanceString.
    concat: Vec<(Option<Expr>, AdvanceKind)>,
    cur_var: Option<Expr>,
    cur_obj: Option<Expr>,
    /// True between SetCurObjectNew and the matching EndObject.
    cur_obj_new: bool,
    cur_field: Option<(String, Option<Expr>)>,
    objects: Vec<ObjectBuild>,
    /// Branch left dangling by the last simulated instruction; consumed by
    /// the enclosing conditional/loop region.
    pending_branch: Option<(BranchKind, u32)>,
    /// Innermost-last loop head addresses, for goto → continue rewriting.
    loop_heads: Vec<u32>,
    /// Address of the instruction being simulated, for diagnostics.
    addr: u32,
}

impl<'a> Machine<'a> {
    fn pop(&mut self, context: &'static str) -> Result<Expr> {
        self.stack.pop().ok_or(Error::StackUnderflow {
            addr: self.addr,
            context,
        })
    }

    fn flush_leftovers(&mut self, out: &mut Vec<Stmt>) {
        for expr in std::mem::take(&mut self.stack) {
            if expr.has_side_effects() {
                out.push(Stmt::Expr(expr));
            }
        }
    }

    // -- region visitors --------------------------------------------------

    fn emit_region(&mut self, region: &Region, out: &mut Vec<Stmt>) -> Result<()> {
        match region {
            Region::Block(code) | Region::LoopFooter(code) => self.emit_block(code, out),
            Region::Sequence(body) => {
                for r in body {
                    self.emit_region(r, out)?;
                }
                Ok(())
            }
            Region::Function { header, body } => {
                // Function bodies evaluate on a fresh stack.
                let saved_stack = std::mem::take(&mut self.stack);
                let saved_frames = std::mem::take(&mut self.frames);
                let mut inner = Vec::new();
                for r in body {
                    self.emit_region(r, &mut inner)?;
                }
                self.flush_leftovers(&mut inner);
                self.stack = saved_stack;
                self.frames = saved_frames;
                out.push(Stmt::FunctionDecl {
                    name: header.name.clone(),
                    namespace: header.namespace.clone(),
                    package: header.package.clone(),
                    args: header.args.clone(),
                    body: inner,
                });
                Ok(())
            }
            Region::Conditional {
                head,
                then_body,
                else_body,
            } => self.emit_conditional(head, then_body, else_body, out),
            Region::Loop { infinite, body } => self.emit_loop(*infinite, body, out),
            Region::ConditionalGoto { head, target_addr } => {
                self.emit_region(head, out)?;
                let (kind, branch_target) =
                    self.pending_branch.take().ok_or(Error::StackUnderflow {
                        addr: self.addr,
                        context: "conditional goto without branch",
                    })?;
                let cond = self.pop("conditional goto")?;
                let taken = if kind.inverted() { cond.negate() } else { cond };
                // The goto may virtualize either edge of the branch; when
                // it is the fall-through, the branch condition inverts.
                let cond = if *target_addr == branch_target {
                    taken
                } else {
                    taken.negate()
                };
                out.push(self.jump_stmt(Some(cond), *target_addr));
                Ok(())
            }
            Region::Goto { target_addr } => {
                out.push(self.jump_stmt(None, *target_addr));
                Ok(())
            }
            Region::Break => {
                out.push(Stmt::Break);
                Ok(())
            }
            Region::Continue => {
                out.push(Stmt::Continue);
                Ok(())
            }
        }
    }

    /// A goto, unless it targets the innermost loop head, which reads as
    /// a continue.
    fn jump_stmt(&self, cond: Option<Expr>, target: u32) -> Stmt {
        let continues = self.loop_heads.last() == Some(&target);
        match (cond, continues) {
            (None, true) => Stmt::Continue,
            (None, false) => Stmt::Goto(target),
            (Some(cond), true) => Stmt::If {
                cond,
                then_body: vec![Stmt::Continue],
                else_body: Vec::new(),
            },
            (Some(cond), false) => Stmt::CondGoto { cond, target },
        }
    }

    fn emit_block(&mut self, code: &BlockCode, out: &mut Vec<Stmt>) -> Result<()> {
        if self.labels.contains(&code.addr) {
            out.push(Stmt::Label(code.addr));
        }
        for inst in &code.code {
            self.step(inst, out)?;
        }
        Ok(())
    }

    fn emit_conditional(
        &mut self,
        head: &Region,
        then_body: &[Region],
        else_body: &[Region],
        out: &mut Vec<Stmt>,
    ) -> Result<()> {
        self.emit_region(head, out)?;
        let (kind, _) = self.pending_branch.take().ok_or(Error::StackUnderflow {
            addr: self.addr,
            context: "conditional without branch",
        })?;
        let cond = self.pop("conditional")?;

        // The no-pop branches are the compiler's short-circuit forms: the
        // conditional arm computes the right-hand side of `&&` / `||`.
        if kind.no_pop() {
            for r in then_body {
                self.emit_region(r, out)?;
            }
            let rhs = self.pop("short-circuit operand")?;
            let op = match kind {
                BranchKind::JmpIfNp => BinaryOp::LogicOr,
                _ => BinaryOp::LogicAnd,
            };
            self.stack.push(Expr::Binary {
                op,
                lhs: Box::new(cond),
                rhs: Box::new(rhs),
            });
            return Ok(());
        }

        // Empty then with a non-empty else reads better inverted.
        let (cond, then_body, else_body) = if then_body.is_empty() && !else_body.is_empty() {
            (cond.negate(), else_body, then_body)
        } else {
            (cond, then_body, else_body)
        };

        let mut then_stmts = Vec::new();
        for r in then_body {
            self.emit_region(r, &mut then_stmts)?;
        }
        let mut else_stmts = Vec::new();
        for r in else_body {
            self.emit_region(r, &mut else_stmts)?;
        }
        // The arms' closing jumps to the merge point are structural.
        self.pending_branch = None;
        out.push(Stmt::If {
            cond,
            then_body: then_stmts,
            else_body: else_stmts,
        });
        Ok(())
    }

    fn emit_loop(&mut self, infinite: bool, body: &[Region], out: &mut Vec<Stmt>) -> Result<()> {
        let head = body.first().and_then(region_addr).unwrap_or(0);
        self.loop_heads.push(head);

        let mut inner = Vec::new();
        let mut cond: Option<Expr> = None;
        for r in body {
            self.emit_region(r, &mut inner)?;
            match self.pending_branch {
                Some((kind, target)) if !kind.is_unconditional() => {
                    // The loop's exit test; polarity depends on whether the
                    // branch jumps back to the head or out of the loop.
                    if cond.is_none() && !infinite && !self.stack.is_empty() {
                        self.pending_branch = None;
                        let raw = self.pop("loop condition")?;
                        let continues_on_true =
                            (target == head) != kind.inverted();
                        cond = Some(if continues_on_true { raw } else { raw.negate() });
                    }
                }
                Some(_) => {
                    // Unconditional back edge; nothing to recover.
                    self.pending_branch = None;
                }
                None => {}
            }
        }

        self.loop_heads.pop();
        self.pending_branch = None;
        out.push(Stmt::While {
            cond: cond.unwrap_or(Expr::Bool(true)),
            body: inner,
        });
        Ok(())
    }

    // -- instruction simulation -------------------------------------------

    fn step(&mut self, inst: &Instruction, out: &mut Vec<Stmt>) -> Result<()> {
        self.addr = inst.addr;
        match &inst.kind {
            // Structural: the function wrapper and branch consumers handle
            // these at the region level.
            InstKind::FunctionDecl(_) => {}
            InstKind::Branch { target_addr, kind } => {
                self.pending_branch = Some((*kind, *target_addr));
            }

            InstKind::Return { returns_value } => {
                let value = if *returns_value {
                    Some(self.pop("return value")?)
                } else {
                    None
                };
                out.push(Stmt::Return(value));
            }

            InstKind::Binary(op) => {
                let rhs = self.pop("binary rhs")?;
                let lhs = self.pop("binary lhs")?;
                self.stack.push(Expr::Binary {
                    op: *op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                });
            }
            InstKind::Unary(op) => {
                let expr = self.pop("unary operand")?;
                self.stack.push(Expr::Unary {
                    op: *op,
                    expr: Box::new(expr),
                });
            }
            InstKind::StringCompare => {
                let rhs = self.pop("string compare rhs")?;
                // The left side was parked by an AdvanceStr(Null).
                let lhs = match self.concat.pop() {
                    Some((Some(prev), AdvanceKind::Null)) => prev,
                    Some((prev, kind)) => {
                        self.concat.push((prev, kind));
                        self.pop("string compare lhs")?
                    }
                    None => self.pop("string compare lhs")?,
                };
                self.stack.push(Expr::Binary {
                    op: BinaryOp::StrEq,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                });
            }

            InstKind::SetCurVar { name, .. } => {
                self.cur_var = Some(Expr::Var {
                    name: Box::new(Expr::Ident(name.clone())),
                    index: None,
                });
            }
            InstKind::SetCurVarArray { .. } => {
                let built = self.pop("array variable name")?;
                self.cur_var = Some(split_array_ref(built));
            }
            InstKind::LoadVar(_) => {
                let var = self.cur_var.clone().ok_or(Error::StackUnderflow {
                    addr: self.addr,
                    context: "load without current variable",
                })?;
                self.stack.push(var);
            }
            InstKind::SaveVar(_) => {
                let value = self.pop("assignment value")?;
                let target = self.cur_var.clone().ok_or(Error::StackUnderflow {
                    addr: self.addr,
                    context: "save without current variable",
                })?;
                self.stack.push(Expr::Assign {
                    target: Box::new(target),
                    op: None,
                    value: Box::new(value),
                });
            }

            InstKind::SetCurObject { is_new } => {
                if *is_new {
                    self.cur_obj_new = true;
                    self.cur_obj = None;
                } else {
                    self.cur_obj_new = false;
                    self.cur_obj = Some(self.pop("current object")?);
                }
            }
            InstKind::SetCurField { name } => {
                self.cur_field = Some((name.clone(), None));
            }
            InstKind::SetCurFieldArray => {
                let index = self.pop("field index")?;
                if let Some(field) = &mut self.cur_field {
                    field.1 = Some(index);
                }
            }
            InstKind::LoadField(_) => {
                let (name, index) = self.cur_field.clone().ok_or(Error::StackUnderflow {
                    addr: self.addr,
                    context: "load without current field",
                })?;
                self.stack.push(Expr::Field {
                    object: self.cur_obj.clone().map(Box::new),
                    name,
                    index: index.map(Box::new),
                });
            }
            InstKind::SaveField(_) => {
                let value = self.pop("field value")?;
                let (name, index) = self.cur_field.clone().ok_or(Error::StackUnderflow {
                    addr: self.addr,
                    context: "save without current field",
                })?;
                if self.cur_obj_new {
                    // Field initializer inside an object declaration.
                    if let Some(object) = self.objects.last_mut() {
                        object.fields.push(FieldInit { name, index, value });
                        return Ok(());
                    }
                }
                self.stack.push(Expr::Assign {
                    target: Box::new(Expr::Field {
                        object: self.cur_obj.clone().map(Box::new),
                        name,
                        index: index.map(Box::new),
                    }),
                    op: None,
                    value: Box::new(value),
                });
            }

            InstKind::ConvertToType(ConvertTarget::None) => {
                // Statement boundary: the computed value is discarded.
                if let Some(expr) = self.stack.pop() {
                    if expr.has_side_effects() {
                        out.push(Stmt::Expr(expr));
                    }
                }
            }
            InstKind::ConvertToType(_) => {}

            InstKind::LoadImmediate(imm) => {
                let expr = match imm {
                    Immediate::Uint(v) => Expr::UintConst(*v),
                    Immediate::Float(idx) => Expr::FloatConst(self.file.float_table(*idx)?),
                    Immediate::StringRef(off) => {
                        Expr::StrConst(self.file.string_table(*off)?)
                    }
                    Immediate::TagRef(off) => Expr::TagConst(self.file.string_table(*off)?),
                    Immediate::IdentRef(name) => Expr::Ident(name.clone()),
                };
                self.stack.push(expr);
            }

            InstKind::Call {
                name,
                namespace,
                call_type,
            } => {
                let args = self.frames.pop().ok_or(Error::StackUnderflow {
                    addr: self.addr,
                    context: "call without frame",
                })?;
                self.stack.push(Expr::Call {
                    name: name.clone(),
                    namespace: namespace.clone(),
                    call_type: *call_type,
                    args,
                });
            }

            InstKind::CreateObject {
                parent,
                is_datablock,
                ..
            } => {
                let mut args = self.frames.pop().ok_or(Error::StackUnderflow {
                    addr: self.addr,
                    context: "object creation without frame",
                })?;
                if args.is_empty() {
                    return Err(Error::StackUnderflow {
                        addr: self.addr,
                        context: "object creation without class",
                    });
                }
                let class = args.remove(0);
                let name = if args.is_empty() {
                    None
                } else {
                    Some(args.remove(0)).filter(|n| *n != Expr::StrConst(String::new()))
                };
                self.objects.push(ObjectBuild {
                    class,
                    name,
                    args,
                    parent: parent.clone(),
                    is_datablock: *is_datablock,
                    place_at_root: false,
                    fields: Vec::new(),
                    children: Vec::new(),
                });
            }
            InstKind::AddObject { place_at_root } => {
                if let Some(object) = self.objects.last_mut() {
                    object.place_at_root = *place_at_root;
                }
            }
            InstKind::EndObject { .. } => {
                let object = self.objects.pop().ok_or(Error::StackUnderflow {
                    addr: self.addr,
                    context: "end without object",
                })?;
                let decl = object.build();
                self.cur_obj_new = !self.objects.is_empty();
                if let Some(parent) = self.objects.last_mut() {
                    parent.children.push(decl);
                } else {
                    self.stack.push(Expr::NewObject(Box::new(decl)));
                }
            }

            InstKind::AdvanceString(kind) => {
                let saved = self.stack.pop();
                self.concat.push((saved, *kind));
            }
            InstKind::Rewind { terminate } => {
                let current = self.pop("string rewind")?;
                let (saved, kind) = self.concat.pop().ok_or(Error::StackUnderflow {
                    addr: self.addr,
                    context: "rewind without advance",
                })?;
                if *terminate {
                    // Discard the working string, restoring what was saved.
                    if let Some(prev) = saved {
                        self.stack.push(prev);
                    }
                } else {
                    self.stack.push(make_concat(saved, kind, current));
                }
            }

            InstKind::Push => {
                let expr = self.pop("argument")?;
                let frame = self.frames.last_mut().ok_or(Error::StackUnderflow {
                    addr: self.addr,
                    context: "push without frame",
                })?;
                frame.push(expr);
            }
            InstKind::PushFrame => self.frames.push(Vec::new()),

            InstKind::DebugBreak | InstKind::Unused => {}
        }
        Ok(())
    }
}

/// Entry address of a region, for loop-head bookkeeping.
fn region_addr(region: &Region) -> Option<u32> {
    match region {
        Region::Block(b) | Region::LoopFooter(b) => Some(b.addr),
        Region::Sequence(body) | Region::Function { body, .. } | Region::Loop { body, .. } => {
            body.first().and_then(region_addr)
        }
        Region::Conditional { head, .. } | Region::ConditionalGoto { head, .. } => {
            region_addr(head)
        }
        Region::Goto { .. } | Region::Break | Region::Continue => None,
    }
}

/// Split a rebuilt array-variable name (`base @ index`) into a reference.
fn split_array_ref(expr: Expr) -> Expr {
    match expr {
        Expr::Concat { lhs, rhs, .. } => Expr::Var {
            name: lhs,
            index: Some(rhs),
        },
        other => Expr::Var {
            name: Box::new(other),
            index: None,
        },
    }
}

fn make_concat(saved: Option<Expr>, kind: AdvanceKind, current: Expr) -> Expr {
    let Some(prev) = saved else {
        return current;
    };
    let op = match kind {
        AdvanceKind::Plain | AdvanceKind::Null => ConcatOp::None,
        AdvanceKind::Comma => ConcatOp::Comma,
        AdvanceKind::AppendChar(' ') => ConcatOp::Space,
        AdvanceKind::AppendChar('\t') => ConcatOp::Tab,
        AdvanceKind::AppendChar('\n') => ConcatOp::Newline,
        AdvanceKind::AppendChar(c) => ConcatOp::Char(c),
    };
    Expr::Concat {
        op,
        lhs: Box::new(prev),
        rhs: Box::new(current),
    }
}
