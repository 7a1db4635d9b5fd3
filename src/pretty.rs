//! Stable IR pretty-printing for `Expr`/`Stmt` `Debug` output. Grounded on
//! the shape of the teacher's `pretty/pretty_printer.rs` (a recursive
//! descent over the IR producing a `Doc`), simplified here to a plain
//! recursive writer over `std::fmt::Formatter` since nothing downstream
//! needs the teacher's width-aware line-breaking combinators -- debug
//! output and the `log::PassLog` dumps both just need a deterministic,
//! readable single-line-per-node rendering.

use std::fmt;

use crate::expr::{BinOp, ClampKind, CmpOp, Expr, InnerExpr, LogicalOp};
use crate::stmt::{ForType, InnerStmt, Stmt};

fn bin_op_str(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Min => "min",
        BinOp::Max => "max",
        BinOp::BitAnd => "&",
        BinOp::BitOr => "|",
        BinOp::BitXor => "^",
    }
}

fn cmp_op_str(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "==",
        CmpOp::Ne => "!=",
        CmpOp::Lt => "<",
        CmpOp::Le => "<=",
        CmpOp::Gt => ">",
        CmpOp::Ge => ">=",
    }
}

fn logical_op_str(op: LogicalOp) -> &'static str {
    match op {
        LogicalOp::And => "&&",
        LogicalOp::Or => "||",
    }
}

fn clamp_kind_str(k: ClampKind) -> &'static str {
    match k {
        ClampKind::None => "none",
        ClampKind::Replicate => "replicate",
        ClampKind::Wrap => "wrap",
        ClampKind::Reflect => "reflect",
        ClampKind::Reflect101 => "reflect101",
        ClampKind::Tile => "tile",
    }
}

/// Writes `e` in a stable, human-readable form. Used by `Expr`'s `Debug`
/// impl so assertion failures and trace output read as expressions rather
/// than as raw `Arc<InnerExpr>` dumps.
pub fn write_expr(f: &mut fmt::Formatter<'_>, e: &Expr) -> fmt::Result {
    match e.inner() {
        InnerExpr::IntImm { value, .. } => write!(f, "{}", value),
        InnerExpr::FloatImm { value, .. } => write!(f, "{}f", value),
        InnerExpr::Variable { name, .. } => write!(f, "{}", name),
        InnerExpr::Cast { to_type, value, .. } => {
            write!(f, "cast<{:?}>(", to_type)?;
            write_expr(f, value)?;
            write!(f, ")")
        }
        InnerExpr::Not { value, .. } => {
            write!(f, "!(")?;
            write_expr(f, value)?;
            write!(f, ")")
        }
        InnerExpr::SignFill { ty, sign, .. } => write!(f, "sign_fill<{:?}>({:?})", ty, sign),
        InnerExpr::Bin { op, a, b, .. } => {
            write!(f, "(")?;
            write_expr(f, a)?;
            write!(f, " {} ", bin_op_str(*op))?;
            write_expr(f, b)?;
            write!(f, ")")
        }
        InnerExpr::Cmp { op, a, b, .. } => {
            write!(f, "(")?;
            write_expr(f, a)?;
            write!(f, " {} ", cmp_op_str(*op))?;
            write_expr(f, b)?;
            write!(f, ")")
        }
        InnerExpr::Logical { op, a, b, .. } => {
            write!(f, "(")?;
            write_expr(f, a)?;
            write!(f, " {} ", logical_op_str(*op))?;
            write_expr(f, b)?;
            write!(f, ")")
        }
        InnerExpr::Select { cond, true_value, false_value, .. } => {
            write!(f, "select(")?;
            write_expr(f, cond)?;
            write!(f, ", ")?;
            write_expr(f, true_value)?;
            write!(f, ", ")?;
            write_expr(f, false_value)?;
            write!(f, ")")
        }
        InnerExpr::Load { name, index, .. } => {
            write!(f, "{}[", name)?;
            write_expr(f, index)?;
            write!(f, "]")
        }
        InnerExpr::Ramp { base, stride, lanes, .. } => {
            write!(f, "ramp(")?;
            write_expr(f, base)?;
            write!(f, ", ")?;
            write_expr(f, stride)?;
            write!(f, ", {})", lanes)
        }
        InnerExpr::Broadcast { value, lanes, .. } => {
            write!(f, "broadcast(")?;
            write_expr(f, value)?;
            write!(f, ", {})", lanes)
        }
        InnerExpr::Call { name, args, call_type, .. } => {
            write!(f, "{:?}::{}(", call_type, name)?;
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_expr(f, a)?;
            }
            write!(f, ")")
        }
        InnerExpr::Let { name, value, body, .. } => {
            write!(f, "let {} = ", name)?;
            write_expr(f, value)?;
            write!(f, " in ")?;
            write_expr(f, body)
        }
        InnerExpr::Clamp { kind, a, min, max, p1, .. } => {
            write!(f, "clamp[{}](", clamp_kind_str(*kind))?;
            write_expr(f, a)?;
            write!(f, ", ")?;
            write_expr(f, min)?;
            write!(f, ", ")?;
            write_expr(f, max)?;
            if let Some(p1) = p1 {
                write!(f, ", ")?;
                write_expr(f, p1)?;
            }
            write!(f, ")")
        }
        InnerExpr::Infinity { sign, count, .. } => write!(f, "inf({:?}, {})", sign, count),
        InnerExpr::Solve { var, body, .. } => {
            write!(f, "solve({}, ", var)?;
            write_expr(f, body)?;
            write!(f, ")")
        }
        InnerExpr::TargetVar { name, body, .. } => {
            write!(f, "target_var({}, ", name)?;
            write_expr(f, body)?;
            write!(f, ")")
        }
    }
}

fn for_type_str(ft: ForType) -> &'static str {
    match ft {
        ForType::Serial => "serial",
        ForType::Parallel => "parallel",
        ForType::Vectorized => "vectorized",
        ForType::Unrolled => "unrolled",
    }
}

/// Writes `s` in a stable, human-readable, indented form.
pub fn write_stmt(f: &mut fmt::Formatter<'_>, s: &Stmt) -> fmt::Result {
    write_stmt_indent(f, s, 0)
}

fn pad(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        write!(f, "  ")?;
    }
    Ok(())
}

fn write_stmt_indent(f: &mut fmt::Formatter<'_>, s: &Stmt, depth: usize) -> fmt::Result {
    match s.inner() {
        InnerStmt::NoOp { .. } => {
            pad(f, depth)?;
            write!(f, "{{}}")
        }
        InnerStmt::LetStmt { name, value, body, .. } => {
            pad(f, depth)?;
            write!(f, "let {} = ", name)?;
            write_expr(f, value)?;
            writeln!(f, ";")?;
            write_stmt_indent(f, body, depth)
        }
        InnerStmt::AssertStmt { cond, message, .. } => {
            pad(f, depth)?;
            write!(f, "assert(")?;
            write_expr(f, cond)?;
            write!(f, ", \"{}\");", message)
        }
        InnerStmt::PrintStmt { prefix, args, .. } => {
            pad(f, depth)?;
            write!(f, "print(\"{}\"", prefix)?;
            for a in args {
                write!(f, ", ")?;
                write_expr(f, a)?;
            }
            write!(f, ");")
        }
        InnerStmt::For { name, min, extent, for_type, body, .. } => {
            pad(f, depth)?;
            write!(f, "for ({}, {} in ", for_type_str(*for_type), name)?;
            write_expr(f, min)?;
            write!(f, "..")?;
            write_expr(f, extent)?;
            writeln!(f, ") {{")?;
            write_stmt_indent(f, body, depth + 1)?;
            writeln!(f)?;
            pad(f, depth)?;
            write!(f, "}}")
        }
        InnerStmt::Store { name, value, index, .. } => {
            pad(f, depth)?;
            write!(f, "{}[", name)?;
            write_expr(f, index)?;
            write!(f, "] = ")?;
            write_expr(f, value)?;
            write!(f, ";")
        }
        InnerStmt::Provide { name, value, args, .. } => {
            pad(f, depth)?;
            write!(f, "{}(", name)?;
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_expr(f, a)?;
            }
            write!(f, ") = ")?;
            write_expr(f, value)?;
            write!(f, ";")
        }
        InnerStmt::Allocate { name, ty, size, body, .. } => {
            pad(f, depth)?;
            write!(f, "allocate {}[", name)?;
            write_expr(f, size)?;
            writeln!(f, "] : {:?} {{", ty)?;
            write_stmt_indent(f, body, depth + 1)?;
            writeln!(f)?;
            pad(f, depth)?;
            write!(f, "}}")
        }
        InnerStmt::Realize { name, ty, bounds, body, .. } => {
            pad(f, depth)?;
            write!(f, "realize {} : {:?} [", name, ty)?;
            for (i, r) in bounds.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_expr(f, &r.min)?;
                write!(f, "..")?;
                write_expr(f, &r.extent)?;
            }
            writeln!(f, "] {{")?;
            write_stmt_indent(f, body, depth + 1)?;
            writeln!(f)?;
            pad(f, depth)?;
            write!(f, "}}")
        }
        InnerStmt::Pipeline { name, produce, update, consume, .. } => {
            pad(f, depth)?;
            writeln!(f, "produce {} {{", name)?;
            write_stmt_indent(f, produce, depth + 1)?;
            writeln!(f)?;
            if let Some(update) = update {
                pad(f, depth)?;
                writeln!(f, "}} update {{")?;
                write_stmt_indent(f, update, depth + 1)?;
                writeln!(f)?;
            }
            pad(f, depth)?;
            writeln!(f, "}}")?;
            write_stmt_indent(f, consume, depth)
        }
        InnerStmt::Block { first, rest, .. } => {
            write_stmt_indent(f, first, depth)?;
            if !rest.is_no_op() {
                writeln!(f)?;
                write_stmt_indent(f, rest, depth)?;
            }
            Ok(())
        }
        InnerStmt::StmtTargetVar { name, body, .. } => {
            pad(f, depth)?;
            writeln!(f, "target_var {} {{", name)?;
            write_stmt_indent(f, body, depth + 1)?;
            writeln!(f)?;
            pad(f, depth)?;
            write!(f, "}}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{mk_bin, mk_int_imm, mk_variable, BinOp};
    use crate::name::Symbol;
    use crate::types::Type;

    #[test]
    fn expr_debug_renders_infix_form() {
        let ty = Type::int(32);
        let e = mk_bin(BinOp::Add, ty, mk_variable(ty, Symbol::new("x")), mk_int_imm(ty, 1));
        assert_eq!(format!("{:?}", e), "(x + 1)");
    }

    #[test]
    fn stmt_debug_renders_store() {
        let ty = Type::int(32);
        let s = crate::stmt::mk_store(Symbol::new("buf"), mk_int_imm(ty, 0), mk_variable(ty, Symbol::new("x")));
        assert_eq!(format!("{:?}", s), "buf[x] = 0;");
    }
}
