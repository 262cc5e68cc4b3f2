//! DOT (Graphviz) dumps of expression trees.
//!
//! Each node becomes a `record`-shaped box labelled with the operator name
//! and the node id, with one output port per child; terminals get a
//! parallelogram. Mainly for debugging.

use crate::exp::{Def, Exp, Value};
use std::fmt::Write;

/// Escape special characters for DOT label strings.
pub fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('<', "\\<")
        .replace('>', "\\>")
}

impl Exp {
    /// The whole tree as a `digraph`.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph Exp {\n");
        let mut next = 0u32;
        append_dot(&mut out, self, &mut next);
        out.push_str("}\n");
        out
    }
}

/// Emit this node and its subtree; returns the node's id.
fn append_dot(out: &mut String, e: &Exp, next: &mut u32) -> u32 {
    let id = *next;
    *next += 1;
    match e {
        Exp::Terminal(op) => {
            let _ = writeln!(
                out,
                "e{id} [shape=parallelogram,label=\"{}\\ne{id}\"];",
                escape_dot(op.name())
            );
        }
        Exp::Const(c) => {
            let payload = match &c.value {
                Value::Int(i) => i.to_string(),
                Value::Long(l) => l.to_string(),
                Value::Flt(d) => d.to_string(),
                Value::Str(s) => format!("\\\"{s}\\\""),
                Value::Func(n) => n.clone(),
            };
            let _ = writeln!(
                out,
                "e{id} [shape=record,label=\"{{{}\\ne{id} | {} }}\"];",
                escape_dot(c.op().name()),
                escape_dot(&payload)
            );
        }
        Exp::TypeVal(ty) => {
            let _ = writeln!(
                out,
                "e{id} [shape=record,label=\"{{typeval\\ne{id} | {} }}\"];",
                escape_dot(&ty.ctype())
            );
        }
        Exp::Typed { ty, sub } => {
            let _ = writeln!(
                out,
                "e{id} [shape=record,label=\"{{typedexp\\ne{id} | {} | <p1> }}\"];",
                escape_dot(&ty.ctype())
            );
            let child = append_dot(out, sub, next);
            let _ = writeln!(out, "e{id}:p1->e{child};");
        }
        Exp::Ref { sub, def } => {
            let d = match def {
                Def::Implicit => "-".to_string(),
                Def::Wild => "WILD".to_string(),
                Def::Stmt(n) | Def::ImplicitStmt(n) => n.to_string(),
            };
            let _ = writeln!(
                out,
                "e{id} [shape=record,label=\"{{subscript\\ne{id} | {{{d} | <p1>}} }}\"];",
            );
            let child = append_dot(out, sub, next);
            let _ = writeln!(out, "e{id}:p1->e{child};");
        }
        Exp::Unary { op, sub } | Exp::Location { op, sub, .. } => {
            let _ = writeln!(
                out,
                "e{id} [shape=record,label=\"{{{}\\ne{id} | <p1> }}\"];",
                escape_dot(op.name())
            );
            let child = append_dot(out, sub, next);
            let _ = writeln!(out, "e{id}:p1->e{child};");
        }
        Exp::Binary { op, lhs, rhs } => {
            let _ = writeln!(
                out,
                "e{id} [shape=record,label=\"{{{}\\ne{id} | {{<p1> | <p2>}} }}\"];",
                escape_dot(op.name())
            );
            let c1 = append_dot(out, lhs, next);
            let _ = writeln!(out, "e{id}:p1->e{c1};");
            let c2 = append_dot(out, rhs, next);
            let _ = writeln!(out, "e{id}:p2->e{c2};");
        }
        Exp::Ternary { op, fst, snd, trd } => {
            let _ = writeln!(
                out,
                "e{id} [shape=record,label=\"{{{}\\ne{id} | {{<p1> | <p2> | <p3>}} }}\"];",
                escape_dot(op.name())
            );
            let c1 = append_dot(out, fst, next);
            let _ = writeln!(out, "e{id}:p1->e{c1};");
            let c2 = append_dot(out, snd, next);
            let _ = writeln!(out, "e{id}:p2->e{c2};");
            let c3 = append_dot(out, trd, next);
            let _ = writeln!(out, "e{id}:p3->e{c3};");
        }
    }
    id
}
