//! TorqueScript source printer.
//!
//! Renders recovered statements to text: semicolon-terminated statements,
//! brace-delimited blocks, two-space indent steps. `%local` and `$global`
//! sigils are part of the identifiers and pass through untouched.

use std::fmt::Write;

use super::{ConcatOp, Expr, ObjectDecl, Stmt};
use crate::disasm::inst::CallType;
use crate::disasm::opcode::{BinaryOp, UnaryOp};

/// Print a whole recovered program.
pub fn print_program(stmts: &[Stmt]) -> String {
    let mut out = String::new();
    print_stmts(stmts, &mut out, "");
    out
}

fn print_stmts(stmts: &[Stmt], out: &mut String, indent: &str) {
    for stmt in stmts {
        print_stmt(stmt, out, indent);
    }
}

fn print_stmt(stmt: &Stmt, out: &mut String, indent: &str) {
    match stmt {
        Stmt::Expr(expr) => {
            let _ = write!(out, "{indent}");
            print_expr(expr, out, indent);
            let _ = writeln!(out, ";");
        }
        Stmt::If {
            cond,
            then_body,
            else_body,
        } => {
            let _ = write!(out, "{indent}if (");
            print_expr(cond, out, indent);
            let _ = writeln!(out, ") {{");
            let inner = format!("{indent}  ");
            print_stmts(then_body, out, &inner);
            if else_body.is_empty() {
                let _ = writeln!(out, "{indent}}}");
            } else {
                let _ = writeln!(out, "{indent}}} else {{");
                print_stmts(else_body, out, &inner);
                let _ = writeln!(out, "{indent}}}");
            }
        }
        Stmt::While { cond, body } => {
            let _ = write!(out, "{indent}while (");
            print_expr(cond, out, indent);
            let _ = writeln!(out, ") {{");
            print_stmts(body, out, &format!("{indent}  "));
            let _ = writeln!(out, "{indent}}}");
        }
        Stmt::FunctionDecl {
            name,
            namespace,
            package,
            args,
            body,
        } => {
            // Packaged functions re-open their package around each decl.
            let (indent, packaged) = if let Some(package) = package {
                let _ = writeln!(out, "{indent}package {package} {{");
                (format!("{indent}  "), true)
            } else {
                (indent.to_string(), false)
            };
            let _ = write!(out, "{indent}function ");
            if let Some(namespace) = namespace {
                let _ = write!(out, "{namespace}::");
            }
            let _ = writeln!(out, "{name}({}) {{", args.join(", "));
            print_stmts(body, out, &format!("{indent}  "));
            let _ = writeln!(out, "{indent}}}");
            if packaged {
                let outer = &indent[..indent.len() - 2];
                let _ = writeln!(out, "{outer}}};");
            }
            let _ = writeln!(out);
        }
        Stmt::Return(None) => {
            let _ = writeln!(out, "{indent}return;");
        }
        Stmt::Return(Some(expr)) => {
            let _ = write!(out, "{indent}return ");
            print_expr(expr, out, indent);
            let _ = writeln!(out, ";");
        }
        Stmt::Break => {
            let _ = writeln!(out, "{indent}break;");
        }
        Stmt::Continue => {
            let _ = writeln!(out, "{indent}continue;");
        }
        Stmt::Goto(target) => {
            let _ = writeln!(out, "{indent}goto {};", label(*target));
        }
        Stmt::CondGoto { cond, target } => {
            let _ = write!(out, "{indent}if (");
            print_expr(cond, out, indent);
            let _ = writeln!(out, ") goto {};", label(*target));
        }
        Stmt::Label(target) => {
            let _ = writeln!(out, "{indent}{}:", label(*target));
        }
    }
}

fn label(target: u32) -> String {
    format!("label_{target:#x}")
}

fn print_expr(expr: &Expr, out: &mut String, indent: &str) {
    match expr {
        Expr::UintConst(v) => {
            let _ = write!(out, "{v}");
        }
        Expr::FloatConst(v) => {
            let _ = write!(out, "{v}");
        }
        Expr::StrConst(s) => {
            let _ = write!(out, "\"{}\"", escape(s));
        }
        Expr::TagConst(s) => {
            let _ = write!(out, "'{}'", escape(s));
        }
        Expr::Bool(v) => {
            let _ = write!(out, "{v}");
        }
        Expr::Ident(name) => {
            let _ = write!(out, "{name}");
        }
        Expr::Var { name, index } => {
            print_expr(name, out, indent);
            if let Some(index) = index {
                let _ = write!(out, "[");
                print_expr(index, out, indent);
                let _ = write!(out, "]");
            }
        }
        Expr::Field {
            object,
            name,
            index,
        } => {
            if let Some(object) = object {
                print_operand(object, out, indent);
                let _ = write!(out, ".");
            }
            let _ = write!(out, "{name}");
            if let Some(index) = index {
                let _ = write!(out, "[");
                print_expr(index, out, indent);
                let _ = write!(out, "]");
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            print_operand(lhs, out, indent);
            let _ = write!(out, " {} ", binary_op_str(*op));
            print_operand(rhs, out, indent);
        }
        Expr::Unary { op, expr } => {
            let _ = write!(out, "{}", unary_op_str(*op));
            print_operand(expr, out, indent);
        }
        Expr::Concat { op, lhs, rhs } => {
            print_operand(lhs, out, indent);
            match op {
                ConcatOp::None => {
                    let _ = write!(out, " @ ");
                }
                ConcatOp::Space => {
                    let _ = write!(out, " SPC ");
                }
                ConcatOp::Tab => {
                    let _ = write!(out, " TAB ");
                }
                ConcatOp::Newline => {
                    let _ = write!(out, " NL ");
                }
                ConcatOp::Comma => {
                    let _ = write!(out, ", ");
                }
                ConcatOp::Char(c) => {
                    let _ = write!(out, " @ \"{}\" @ ", escape(&c.to_string()));
                }
            }
            print_operand(rhs, out, indent);
        }
        Expr::Assign { target, op, value } => print_assign(target, *op, value, out, indent),
        Expr::Call {
            name,
            namespace,
            call_type,
            args,
        } => print_call(name, namespace.as_deref(), *call_type, args, out, indent),
        Expr::NewObject(decl) => print_object(decl, out, indent),
    }
}

/// Print a sub-expression, parenthesized when its looseness could change
/// the reading.
fn print_operand(expr: &Expr, out: &mut String, indent: &str) {
    let needs_parens = matches!(
        expr,
        Expr::Binary { .. } | Expr::Assign { .. } | Expr::Concat { .. }
    );
    if needs_parens {
        let _ = write!(out, "(");
        print_expr(expr, out, indent);
        let _ = write!(out, ")");
    } else {
        print_expr(expr, out, indent);
    }
}

fn print_assign(target: &Expr, op: Option<BinaryOp>, value: &Expr, out: &mut String, indent: &str) {
    // `x = x op v` prints as the compound form; `x = x ± 1` as `x++`/`x--`.
    if op.is_none() {
        if let Expr::Binary {
            op: bin_op,
            lhs,
            rhs,
        } = value
        {
            if **lhs == *target {
                if let Some(token) = increment_token(*bin_op, rhs) {
                    print_expr(target, out, indent);
                    let _ = write!(out, "{token}");
                    return;
                }
                if compoundable(*bin_op) {
                    print_expr(target, out, indent);
                    let _ = write!(out, " {}= ", binary_op_str(*bin_op));
                    print_operand(rhs, out, indent);
                    return;
                }
            }
        }
    }
    print_expr(target, out, indent);
    match op {
        Some(op) => {
            let _ = write!(out, " {}= ", binary_op_str(op));
        }
        None => {
            let _ = write!(out, " = ");
        }
    }
    print_expr(value, out, indent);
}

fn increment_token(op: BinaryOp, rhs: &Expr) -> Option<&'static str> {
    let is_one = matches!(rhs, Expr::UintConst(1)) || matches!(rhs, Expr::FloatConst(v) if *v == 1.0);
    if !is_one {
        return None;
    }
    match op {
        BinaryOp::Add => Some("++"),
        BinaryOp::Sub => Some("--"),
        _ => None,
    }
}

fn compoundable(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Mod
            | BinaryOp::BitAnd
            | BinaryOp::BitOr
            | BinaryOp::Xor
            | BinaryOp::Shl
            | BinaryOp::Shr
    )
}

fn print_call(
    name: &str,
    namespace: Option<&str>,
    call_type: CallType,
    args: &[Expr],
    out: &mut String,
    indent: &str,
) {
    let print_args = |args: &[Expr], out: &mut String| {
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                let _ = write!(out, ", ");
            }
            print_expr(arg, out, indent);
        }
    };

    match call_type {
        CallType::Method if !args.is_empty() => {
            print_operand(&args[0], out, indent);
            let _ = write!(out, ".{name}(");
            print_args(&args[1..], out);
            let _ = write!(out, ")");
        }
        CallType::Parent => {
            let _ = write!(out, "Parent::{name}(");
            print_args(args, out);
            let _ = write!(out, ")");
        }
        _ => {
            if let Some(namespace) = namespace {
                let _ = write!(out, "{namespace}::");
            }
            let _ = write!(out, "{name}(");
            print_args(args, out);
            let _ = write!(out, ")");
        }
    }
}

fn print_object(decl: &ObjectDecl, out: &mut String, indent: &str) {
    let keyword = if decl.is_datablock { "datablock" } else { "new" };
    let _ = write!(out, "{keyword} ");
    match &decl.class {
        Expr::Ident(name) | Expr::StrConst(name) => {
            let _ = write!(out, "{name}");
        }
        other => {
            let _ = write!(out, "(");
            print_expr(other, out, indent);
            let _ = write!(out, ")");
        }
    }
    let _ = write!(out, "(");
    if let Some(name) = &decl.name {
        match name {
            Expr::StrConst(n) | Expr::Ident(n) => {
                let _ = write!(out, "{n}");
            }
            other => print_expr(other, out, indent),
        }
    }
    if let Some(parent) = &decl.parent {
        let _ = write!(out, " : {parent}");
    }
    for arg in &decl.args {
        let _ = write!(out, ", ");
        print_expr(arg, out, indent);
    }
    let _ = write!(out, ")");

    if decl.fields.is_empty() && decl.children.is_empty() {
        return;
    }
    let _ = writeln!(out, " {{");
    let inner = format!("{indent}  ");
    for field in &decl.fields {
        let _ = write!(out, "{inner}{}", field.name);
        if let Some(index) = &field.index {
            let _ = write!(out, "[");
            print_expr(index, out, &inner);
            let _ = write!(out, "]");
        }
        let _ = write!(out, " = ");
        print_expr(&field.value, out, &inner);
        let _ = writeln!(out, ";");
    }
    for child in &decl.children {
        let _ = write!(out, "{inner}");
        print_object(child, out, &inner);
        let _ = writeln!(out, ";");
    }
    let _ = write!(out, "{indent}}}");
}

fn binary_op_str(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Eq => "==",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Ne => "!=",
        BinaryOp::Xor => "^",
        BinaryOp::Mod => "%",
        BinaryOp::BitAnd => "&",
        BinaryOp::BitOr => "|",
        BinaryOp::Shr => ">>",
        BinaryOp::Shl => "<<",
        BinaryOp::LogicAnd => "&&",
        BinaryOp::LogicOr => "||",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::StrEq => "$=",
    }
}

fn unary_op_str(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Not => "!",
        UnaryOp::OnesComplement => "~",
        UnaryOp::Neg => "-",
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}
