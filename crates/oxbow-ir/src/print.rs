//! Infix printing of expressions.
//!
//! `Display` gives the one-line infix form used everywhere in diagnostics
//! and by the C emitter. The recursive variant wraps subexpressions in
//! parentheses except for the operators that carry their own brackets
//! (lists, sizes, the function-like ternaries). An HTML mode escapes angle
//! brackets and renders subscripts with `<sub>` tags.

use crate::exp::{Const, Def, Exp, Value};
use crate::oper::Oper;
use std::fmt::{self, Write};

impl fmt::Display for Exp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        print_exp(&mut out, self, false).map_err(|_| fmt::Error)?;
        f.write_str(&out)
    }
}

impl Exp {
    /// The one-line infix form, optionally HTML-escaped.
    pub fn to_text(&self, html: bool) -> String {
        let mut out = String::new();
        let _ = print_exp(&mut out, self, html);
        out
    }

    /// Print with the type in angle brackets after a typed expression.
    pub fn to_text_typed(&self) -> String {
        let mut out = self.to_text(false);
        if let Exp::Typed { ty, .. } = self {
            let _ = write!(out, "<{}>", ty.size());
        }
        out
    }

    /// High-level rendering: `r[8]` prints as `r8`, `v[5]` as `v5`.
    pub fn to_text_hl(&self) -> String {
        let mut s = self.to_text(false);
        if s.len() >= 4 && s.as_bytes()[1] == b'[' && s.ends_with(']') {
            s.remove(1);
            s.pop();
        }
        s
    }

    /// One line per node, indented by depth from the given column. For
    /// debugger use.
    pub fn printx(&self, ind: usize) -> String {
        let mut out = String::new();
        printx_into(&mut out, self, ind);
        out
    }

    /// Debugger entry point: the infix form in an owned buffer.
    pub fn prints(&self) -> String {
        self.to_text(false)
    }
}

fn printx_into(out: &mut String, e: &Exp, ind: usize) {
    let _ = write!(out, "{:ind$}{}", "", e.op().name(), ind = ind);
    match e {
        Exp::Const(c) => {
            match &c.value {
                Value::Int(i) => {
                    let _ = write!(out, " {i}");
                }
                Value::Long(l) => {
                    let _ = write!(out, " {l}");
                }
                Value::Flt(d) => {
                    let _ = write!(out, " {d}");
                }
                Value::Str(s) => {
                    let _ = write!(out, " \"{s}\"");
                }
                Value::Func(n) => {
                    let _ = write!(out, " {n}");
                }
            }
            if c.conscript != 0 {
                let _ = write!(out, " \\{}\\", c.conscript);
            }
        }
        Exp::Ref { def, .. } => {
            let _ = match def {
                Def::Implicit => write!(out, " {{-}}"),
                Def::Wild => write!(out, " {{WILD}}"),
                Def::Stmt(n) | Def::ImplicitStmt(n) => write!(out, " {{{n}}}"),
            };
        }
        Exp::Typed { ty, .. } => {
            let _ = write!(out, " {}", ty.ctype());
        }
        Exp::TypeVal(ty) => {
            let _ = write!(out, " {}", ty.ctype());
        }
        _ => {}
    }
    out.push('\n');
    for i in 0..e.child_count() {
        printx_into(out, e.child(i), ind + 4);
    }
}

fn print_const(out: &mut String, c: &Const) -> fmt::Result {
    match &c.value {
        Value::Int(i) => {
            if *i < -1000 || *i > 1000 {
                write!(out, "0x{:x}", *i as u32)?;
            } else {
                write!(out, "{i}")?;
            }
        }
        Value::Long(l) => {
            if *l < -1000 || *l > 1000 {
                write!(out, "0x{:x}LL", *l as u64)?;
            } else {
                write!(out, "{l}LL")?;
            }
        }
        Value::Flt(d) => write!(out, "{d:.4}")?,
        Value::Str(s) => write!(out, "\"{s}\"")?,
        Value::Func(name) => write!(out, "{name}")?,
    }
    if c.conscript != 0 {
        write!(out, "\\{}\\", c.conscript)?;
    }
    Ok(())
}

/// A string constant without the quotes; anything else as normal.
fn print_no_quotes(out: &mut String, e: &Exp, html: bool) -> fmt::Result {
    match e {
        Exp::Const(Const {
            value: Value::Str(s),
            ..
        }) => out.write_str(s),
        _ => print_exp(out, e, html),
    }
}

fn infix(op: Oper, html: bool) -> &'static str {
    match (op, html) {
        (Oper::Plus, _) => " + ",
        (Oper::Minus, _) => " - ",
        (Oper::Mult, _) => " * ",
        (Oper::Mults, _) => " *! ",
        (Oper::Div, _) => " / ",
        (Oper::Divs, _) => " /! ",
        (Oper::Mod, _) => " % ",
        (Oper::Mods, _) => " %! ",
        (Oper::FPlus, _) => " +f ",
        (Oper::FMinus, _) => " -f ",
        (Oper::FMult, _) => " *f ",
        (Oper::FDiv, _) => " /f ",
        (Oper::Pow, _) => " pow ",
        (Oper::And, _) => " and ",
        (Oper::Or, _) => " or ",
        (Oper::BitAnd, _) => " & ",
        (Oper::BitOr, _) => " | ",
        (Oper::BitXor, _) => " ^ ",
        (Oper::Equals, _) => " = ",
        (Oper::NotEqual, _) => " ~= ",
        (Oper::Less, false) => " < ",
        (Oper::Less, true) => " &lt; ",
        (Oper::Gtr, false) => " > ",
        (Oper::Gtr, true) => " &gt; ",
        (Oper::LessEq, false) => " <= ",
        (Oper::LessEq, true) => " &lt;= ",
        (Oper::GtrEq, false) => " >= ",
        (Oper::GtrEq, true) => " &gt;= ",
        (Oper::LessUns, false) => " <u ",
        (Oper::LessUns, true) => " &lt;u ",
        (Oper::GtrUns, false) => " >u ",
        (Oper::GtrUns, true) => " &gt;u ",
        (Oper::LessEqUns, false) => " <=u ",
        (Oper::LessEqUns, true) => " &lt;=u ",
        (Oper::GtrEqUns, false) => " >=u ",
        (Oper::GtrEqUns, true) => " &gt;=u ",
        (Oper::Upper, _) => " GT ",
        (Oper::Lower, _) => " LT ",
        (Oper::ShiftL, false) => " << ",
        (Oper::ShiftL, true) => " &lt;&lt; ",
        (Oper::ShiftR, false) => " >> ",
        (Oper::ShiftR, true) => " &gt;&gt; ",
        (Oper::ShiftRa, false) => " >>A ",
        (Oper::ShiftRa, true) => " &gt;&gt;A ",
        (Oper::RotateL, _) => " rl ",
        (Oper::RotateR, _) => " rr ",
        (Oper::RotateLC, _) => " rlc ",
        (Oper::RotateRC, _) => " rrc ",
        _ => unreachable!("no infix spelling for {}", op.name()),
    }
}

/// Top-level print: no outer parentheses.
fn print_exp(out: &mut String, e: &Exp, html: bool) -> fmt::Result {
    match e {
        Exp::Const(c) => print_const(out, c),
        Exp::Terminal(op) => {
            match op {
                // `nil` prints as nothing: it terminates lists.
                Oper::Nil => Ok(()),
                _ => out.write_str(op.name()),
            }
        }
        Exp::Typed { ty, sub } => {
            write!(out, "*{}* ", ty.ctype())?;
            print_exp(out, sub, html)
        }
        Exp::Ref { sub, def } => {
            print_exp(out, sub, html)?;
            out.write_str(if html { "<sub>" } else { "{" })?;
            match def {
                Def::Implicit => out.write_str("-")?,
                Def::Wild => out.write_str("WILD")?,
                Def::Stmt(n) | Def::ImplicitStmt(n) => write!(out, "{n}")?,
            }
            out.write_str(if html { "</sub>" } else { "}" })
        }
        Exp::TypeVal(ty) => {
            if html {
                write!(out, "&lt;{}&gt;", ty.ctype())
            } else {
                write!(out, "<{}>", ty.ctype())
            }
        }
        Exp::Unary { op, sub } | Exp::Location { op, sub, .. } => print_unary(out, *op, sub, html),
        Exp::Binary { op, lhs, rhs } => print_binary(out, *op, lhs, rhs, html),
        Exp::Ternary { op, fst, snd, trd } => print_ternary(out, *op, fst, snd, trd, html),
    }
}

/// Recursive print: parenthesise unless the operator brings its own
/// brackets.
fn print_r(out: &mut String, e: &Exp, html: bool) -> fmt::Result {
    let parens = match e {
        Exp::Binary { op, .. } => !matches!(op, Oper::Size | Oper::List),
        Exp::Ternary { op, .. } => matches!(op, Oper::Tern | Oper::At),
        _ => false,
    };
    if parens {
        out.write_str("(")?;
        print_exp(out, e, html)?;
        out.write_str(")")
    } else {
        print_exp(out, e, html)
    }
}

fn print_unary(out: &mut String, op: Oper, sub: &Exp, html: bool) -> fmt::Result {
    match op {
        Oper::RegOf => {
            // The very common r[k] case prints as rk.
            if sub.is_int_const() {
                return write!(out, "r{}", sub.int_const().unwrap());
            }
            if sub.is_temp() {
                return print_exp(out, sub, html);
            }
            out.write_str("r[")?;
            print_exp(out, sub, html)?;
            out.write_str("]")
        }
        Oper::MemOf | Oper::AddrOf | Oper::Var | Oper::TypeOf | Oper::KindOf => {
            out.write_str(match op {
                Oper::MemOf => "m[",
                Oper::AddrOf => "a[",
                Oper::Var => "v[",
                Oper::TypeOf => "T[",
                _ => "K[",
            })?;
            if op == Oper::Var {
                print_no_quotes(out, sub, html)?;
            } else {
                // The brackets act as parentheses, so this is a top level
                // again.
                print_exp(out, sub, html)?;
            }
            out.write_str("]")
        }
        Oper::Not | Oper::LNot | Oper::Neg | Oper::FNeg => {
            out.write_str(match op {
                Oper::Not => "~",
                Oper::LNot => "L~",
                Oper::FNeg => "~f ",
                _ => "-",
            })?;
            print_r(out, sub, html)
        }
        Oper::SignExt => {
            print_r(out, sub, html)?;
            out.write_str("!")
        }
        Oper::Temp | Oper::Global | Oper::Local | Oper::Param => {
            // Concise form: just the name, no quotes.
            print_no_quotes(out, sub, html)
        }
        Oper::InitValueOf => {
            print_r(out, sub, html)?;
            out.write_str("'")
        }
        Oper::Guard => {
            print_exp(out, sub, html)?;
            out.write_str(" => ")
        }
        Oper::Phi | Oper::FTrunc | Oper::FAbs => {
            write!(out, "{}(", op.name())?;
            print_exp(out, sub, html)?;
            out.write_str(")")
        }
        Oper::Successor
        | Oper::MachFtr
        | Oper::Execute
        | Oper::Sqrt
        | Oper::SqrtS
        | Oper::SqrtD
        | Oper::SqrtQ
        | Oper::Sin
        | Oper::Cos
        | Oper::Tan
        | Oper::ArcTan
        | Oper::Log2
        | Oper::Log10
        | Oper::LogE => {
            write!(out, "{}(", op.name())?;
            print_r(out, sub, html)?;
            out.write_str(")")
        }
        _ => unreachable!("print of unary {}", op.name()),
    }
}

fn print_binary(out: &mut String, op: Oper, lhs: &Exp, rhs: &Exp, html: bool) -> fmt::Result {
    match op {
        Oper::Size => {
            // The size is printed after the expression it qualifies.
            print_r(out, rhs, html)?;
            out.write_str("*")?;
            print_r(out, lhs, html)?;
            return out.write_str("*");
        }
        Oper::FlagCall => {
            // The name of the flag function (e.g. ADDFLAGS) is enough.
            print_no_quotes(out, lhs, html)?;
            out.write_str("( ")?;
            print_r(out, rhs, html)?;
            return out.write_str(" )");
        }
        Oper::ExpTable | Oper::NameTable => {
            out.write_str(if op == Oper::ExpTable {
                "exptable("
            } else {
                "nametable("
            })?;
            print_exp(out, lhs, html)?;
            out.write_str(", ")?;
            print_exp(out, rhs, html)?;
            return out.write_str(")");
        }
        Oper::List => {
            // "," has the lowest precedence, no parens needed.
            print_exp(out, lhs, html)?;
            if !rhs.is_nil() {
                out.write_str(", ")?;
            }
            return print_exp(out, rhs, html);
        }
        Oper::MemberAccess => {
            print_exp(out, lhs, html)?;
            out.write_str(".")?;
            return print_no_quotes(out, rhs, html);
        }
        Oper::ArrayIndex => {
            print_exp(out, lhs, html)?;
            out.write_str("[")?;
            print_exp(out, rhs, html)?;
            return out.write_str("]");
        }
        _ => {}
    }
    print_r(out, lhs, html)?;
    out.write_str(infix(op, html))?;
    print_r(out, rhs, html)
}

fn print_ternary(
    out: &mut String,
    op: Oper,
    fst: &Exp,
    snd: &Exp,
    trd: &Exp,
    html: bool,
) -> fmt::Result {
    match op {
        Oper::TruncU
        | Oper::TruncS
        | Oper::ZFill
        | Oper::SgnEx
        | Oper::FSize
        | Oper::Itof
        | Oper::Ftoi
        | Oper::FRound
        | Oper::OpTable => {
            write!(out, "{}(", op.name())?;
            print_exp(out, fst, html)?;
            out.write_str(",")?;
            print_exp(out, snd, html)?;
            out.write_str(",")?;
            print_exp(out, trd, html)?;
            out.write_str(")")
        }
        Oper::Tern => {
            print_r(out, fst, html)?;
            out.write_str(" ? ")?;
            print_r(out, snd, html)?;
            out.write_str(" : ")?;
            print_exp(out, trd, html)
        }
        Oper::At => {
            print_r(out, fst, html)?;
            out.write_str("@")?;
            print_r(out, snd, html)?;
            out.write_str(":")?;
            print_r(out, trd, html)
        }
        _ => unreachable!("print of ternary {}", op.name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exp::Def;

    #[test]
    fn constants() {
        assert_eq!(Exp::int(5).to_string(), "5");
        assert_eq!(Exp::int(-1000).to_string(), "-1000");
        assert_eq!(Exp::int(5000).to_string(), "0x1388");
        assert_eq!(Exp::int(-2000).to_string(), "0xfffff830");
        assert_eq!(Exp::str_const("hi").to_string(), "\"hi\"");
    }

    #[test]
    fn locations() {
        assert_eq!(Exp::reg_of(28).to_string(), "r28");
        assert_eq!(Exp::mem_of(Exp::reg_of(28)).to_string(), "m[r28]");
        assert_eq!(
            Exp::addr_of(Exp::mem_of(Exp::reg_of(29))).to_string(),
            "a[m[r29]]"
        );
        assert_eq!(Exp::local("loc1", None).to_string(), "loc1");
    }

    #[test]
    fn infix_nesting() {
        let e = Exp::binary(
            Oper::Plus,
            Exp::binary(Oper::Mult, Exp::reg_of(8), Exp::int(4)),
            Exp::int(12),
        );
        assert_eq!(e.to_string(), "(r8 * 4) + 12");
    }

    #[test]
    fn member_and_index() {
        let e = Exp::binary(
            Oper::MemberAccess,
            Exp::mem_of(Exp::reg_of(28)),
            Exp::str_const("next"),
        );
        assert_eq!(e.to_string(), "m[r28].next");
        let ix = Exp::binary(Oper::ArrayIndex, Exp::global("tab"), Exp::reg_of(9));
        assert_eq!(ix.to_string(), "tab[r9]");
    }

    #[test]
    fn ternaries() {
        let t = Exp::ternary(
            Oper::Tern,
            Exp::reg_of(1),
            Exp::int(1),
            Exp::int(0),
        );
        assert_eq!(t.to_string(), "r1 ? 1 : 0");
        let z = Exp::ternary(Oper::ZFill, Exp::int(8), Exp::int(32), Exp::reg_of(3));
        assert_eq!(z.to_string(), "zfill(8,32,r3)");
    }

    #[test]
    fn subscripts() {
        let r = Exp::subscripted(Exp::reg_of(24), Def::Stmt(7));
        assert_eq!(r.to_string(), "r24{7}");
        let imp = Exp::subscripted(Exp::reg_of(24), Def::Implicit);
        assert_eq!(imp.to_string(), "r24{-}");
        assert_eq!(imp.to_text(true), "r24<sub>-</sub>");
    }

    #[test]
    fn html_escaping() {
        let e = Exp::binary(Oper::Less, Exp::reg_of(1), Exp::int(2));
        assert_eq!(e.to_text(true), "r1 &lt; 2");
    }

    #[test]
    fn hl_form() {
        assert_eq!(Exp::reg_of_exp(Exp::reg_of(2)).to_text_hl(), "rr2");
        assert_eq!(Exp::var(5).to_text_hl(), "v5");
    }

    #[test]
    fn printx_indents() {
        let e = Exp::binary(Oper::Plus, Exp::reg_of(8), Exp::int(1));
        let dump = e.printx(0);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines[0], "+");
        assert!(lines[1].starts_with("    r[]"));
    }

    #[test]
    fn list_printing() {
        let l = Exp::binary(
            Oper::List,
            Exp::reg_of(8),
            Exp::binary(Oper::List, Exp::reg_of(9), Exp::terminal(Oper::Nil)),
        );
        assert_eq!(l.to_string(), "r8, r9");
    }
}
