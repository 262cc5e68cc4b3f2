//! Pattern matching with variable binding.
//!
//! Two surfaces:
//!
//! - structural: [`Exp::match_pattern`] matches an expression against a
//!   pattern expression whose `v[...]` leaves bind whatever they meet;
//! - textual: [`match_text`] matches against a pattern string such as
//!   `m[base + idx]` or `x{3}`, binding the identifiers.
//!
//! The textual grammar:
//!
//! ```text
//! pattern := ident                 bind the whole expression
//!          | 'a[' pattern ']'      address-of
//!          | 'm[' pattern ']'      memory-of
//!          | 'r[' pattern ']'      register-of
//!          | pattern '.' ident     member access (field may bind)
//!          | pattern '[' pattern ']'  array index
//!          | pattern '+' pattern   sum, split at the outermost '+'
//!          | pattern '-' pattern   difference, at the outermost '-'
//!          | pattern '{' num '}'   subscript with that statement number
//!          | pattern '{-}'         subscript with a null definition
//! ```
//!
//! A pattern that fails to parse simply fails to match; malformed input
//! is never a fault.

use crate::exp::{Def, Exp};
use crate::oper::Oper;
use std::collections::BTreeMap;

/// Variable bindings produced by a match.
pub type Bindings = BTreeMap<String, Exp>;

impl Exp {
    /// Match against a pattern expression. `v[...]` nodes in the pattern
    /// bind the subexpression they are matched with. Returns the bindings
    /// as (variable, bound expression) pairs, or None when there is no
    /// match. The same variable bound twice must bind equal expressions.
    pub fn match_pattern(&self, pattern: &Exp) -> Option<Vec<(Exp, Exp)>> {
        // The base cases: exact match binds nothing, a variable binds
        // everything.
        let base = |e: &Exp| -> Option<Vec<(Exp, Exp)>> {
            if e == pattern {
                return Some(Vec::new());
            }
            if pattern.op() == Oper::Var {
                return Some(vec![(pattern.clone(), e.clone())]);
            }
            None
        };

        match self {
            Exp::Unary { op, sub } if *op == pattern.op() => sub.match_pattern(pattern.sub1()),
            Exp::Location { op, sub, .. } if *op == pattern.op() => {
                sub.match_pattern(pattern.sub1())
            }
            Exp::Ref { sub, .. } if pattern.op() == Oper::Subscript => {
                sub.match_pattern(pattern.sub1())
            }
            Exp::Binary { op, lhs, rhs } if *op == pattern.op() => {
                let b_lhs = lhs.match_pattern(pattern.sub1())?;
                let b_rhs = rhs.match_pattern(pattern.sub2())?;
                // The two sides must agree on shared variables.
                for (var, bound) in &b_lhs {
                    for (var2, bound2) in &b_rhs {
                        if var == var2 && bound != bound2 {
                            return None;
                        }
                    }
                }
                let mut out = b_lhs;
                for (var, bound) in b_rhs {
                    if !out.iter().any(|(v, _)| *v == var) {
                        out.push((var, bound));
                    }
                }
                Some(out)
            }
            _ => base(self),
        }
    }
}

/// Find `ch` at the outermost bracket level of `s`, skipping over `[...]`,
/// `{...}` and `(...)` spans. Returns the byte index.
fn find_outer(s: &str, ch: u8) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == ch {
            return Some(i);
        }
        let close = match bytes[i] {
            b'[' => b']',
            b'{' => b'}',
            b'(' => b')',
            _ => {
                i += 1;
                continue;
            }
        };
        i += 1;
        while i < bytes.len() && bytes[i] != close {
            i += 1;
        }
        i += 1;
    }
    None
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Match `e` against the textual `pattern`, adding variable bindings.
pub fn match_text(e: &Exp, pattern: &str, bindings: &mut Bindings) -> bool {
    let pattern = pattern.trim();

    // Most obvious: the printed form is the pattern.
    if e.to_text(false) == pattern {
        return true;
    }
    // An identifier binds the whole expression.
    if is_identifier(pattern) {
        bindings.insert(pattern.to_string(), e.clone());
        return true;
    }

    match e {
        Exp::Unary { op: Oper::AddrOf, sub } => {
            if let Some(inner) = pattern.strip_prefix("a[").and_then(|p| p.strip_suffix(']')) {
                return match_text(sub, inner, bindings);
            }
            false
        }
        Exp::Location { op, sub, .. } if matches!(op, Oper::MemOf | Oper::RegOf) => {
            let prefix = if *op == Oper::MemOf { "m[" } else { "r[" };
            if let Some(inner) = pattern.strip_prefix(prefix).and_then(|p| p.strip_suffix(']')) {
                return match_text(sub, inner, bindings);
            }
            false
        }
        Exp::Ref { sub, def } => {
            if let Some(rest) = pattern.strip_suffix("{-}") {
                return *def == Def::Implicit && match_text(sub, rest, bindings);
            }
            if pattern.ends_with('}') {
                if let Some(open) = pattern.rfind('{') {
                    let num: Option<u32> = pattern[open + 1..pattern.len() - 1].parse().ok();
                    if let (Some(num), Some(d)) = (num, def.stmt()) {
                        if num == d {
                            return match_text(sub, &pattern[..open], bindings);
                        }
                    }
                }
            }
            false
        }
        Exp::Binary { op: Oper::MemberAccess, lhs, rhs } => {
            let Some(dot) = find_outer(pattern, b'.') else {
                return false;
            };
            let (left, follow) = (&pattern[..dot], &pattern[dot + 1..]);
            if !match_text(lhs, left, bindings) {
                return false;
            }
            let field = rhs.as_const().map(|c| c.str()).unwrap_or_default();
            if follow == field {
                return true;
            }
            if is_identifier(follow) {
                bindings.insert(follow.to_string(), (**rhs).clone());
                return true;
            }
            false
        }
        Exp::Binary { op: Oper::ArrayIndex, lhs, rhs } => {
            let Some(stripped) = pattern.strip_suffix(']') else {
                return false;
            };
            let Some(open) = stripped.rfind('[') else {
                return false;
            };
            match_text(lhs, &stripped[..open], bindings)
                && match_text(rhs, &stripped[open + 1..], bindings)
        }
        Exp::Binary { op, lhs, rhs } if matches!(op, Oper::Plus | Oper::Minus) => {
            let split = match op {
                Oper::Plus => find_outer(pattern, b'+'),
                _ => find_outer(pattern, b'-'),
            };
            let Some(split) = split else { return false };
            match_text(lhs, &pattern[..split], bindings)
                && match_text(rhs, &pattern[split + 1..], bindings)
        }
        _ => false,
    }
}
