//! Expression simplification.
//!
//! [`Exp::simplify`] runs the polymorphic rewrite rules bottom-up until a
//! full pass makes no change. The rules fold constants, cancel inverse
//! operations, canonicalise operand order (an integer constant always ends
//! up on the right of a sum) and normalise comparisons; the commutation
//! steps deliberately do not count as modifications, or the fixpoint loop
//! would oscillate. Rewrites that need knowledge the expression itself
//! does not carry (declared types of definitions, constants in the
//! program image, architecture quirks) go through a [`SimplifyCtx`]
//! supplied by the caller; without one, those rules simply do not fire
//! and simplification is still total.
//!
//! The arithmetic `+`/`-` partitioning lives in [`Exp::simplify_arith`]
//! and is invoked explicitly where beneficial, not from the fixpoint
//! loop.

mod arith;
mod poly;

use crate::exp::{Def, Exp};
use crate::oper::Oper;
use oxbow_types::Type;

/// External knowledge consulted by the simplifier. All methods default to
/// "don't know", which disables the rules needing them.
pub trait SimplifyCtx {
    /// The declared type of `base` at its defining statement.
    fn def_type(&self, _def: Def, _base: &Exp) -> Option<Type> {
        None
    }

    /// A floating constant of the given size in bits at the given address
    /// in the program image.
    fn float_at(&self, _addr: u64, _size: i32) -> Option<f64> {
        None
    }

    /// The left-hand side of the defining statement, when it is an
    /// assignment.
    fn def_lhs(&self, _def: Def) -> Option<Exp> {
        None
    }

    /// Architecture-specific rewrite rules, if any.
    fn arch(&self) -> Option<&dyn ArchRules> {
        None
    }
}

/// Architecture-specific simplification hooks.
pub trait ArchRules {
    /// Rewrite a subscripted expression `sub{def}`, or None to leave it.
    fn ref_rewrite(&self, sub: &Exp, def: Def, ctx: &dyn SimplifyCtx) -> Option<Exp>;
}

/// The x86 register-aliasing rules.
///
/// `r0{def}` (ax) where the definition assigns `r24` (eax) becomes a
/// 16-bit view of `r24{def}`.
pub struct PentiumRules;

impl ArchRules for PentiumRules {
    fn ref_rewrite(&self, sub: &Exp, def: Def, ctx: &dyn SimplifyCtx) -> Option<Exp> {
        if sub.is_reg_n(0) && def.stmt().is_some() {
            let lhs = ctx.def_lhs(def)?;
            if lhs.is_reg_n(24) {
                return Some(Exp::typed(
                    Type::int(16),
                    Exp::subscripted(Exp::reg_of(24), def),
                ));
            }
        }
        None
    }
}

/// The context used when the caller has nothing to offer.
struct NullCtx;

impl SimplifyCtx for NullCtx {}

impl Exp {
    /// Apply the polymorphic rewrite rules until a pass makes no change.
    /// Context-free: type-informed and architecture rules do not fire.
    pub fn simplify(self) -> Exp {
        self.simplify_with(&NullCtx)
    }

    /// Like [`Exp::simplify`], with external knowledge.
    pub fn simplify_with(self, ctx: &dyn SimplifyCtx) -> Exp {
        let mut res = self;
        loop {
            let mut modified = false;
            res = poly::poly_simplify(res, ctx, &mut modified);
            if !modified {
                return res;
            }
        }
    }

    /// Address-of simplification only: `a[m[x]]` and `m[a[x]]` become
    /// `x`, including through a size wrapper: `a[size(k, m[x])]` becomes
    /// `x`. Kept separate from the main rule set because propagation
    /// wants it on its own.
    pub fn simplify_addr(self) -> Exp {
        match self {
            // m[a[x]] == x
            Exp::Location { op: Oper::MemOf, sub, proc } => {
                if sub.op() == Oper::AddrOf {
                    sub.into_sub1().simplify_addr()
                } else {
                    Exp::Location {
                        op: Oper::MemOf,
                        sub: Box::new(sub.simplify_addr()),
                        proc,
                    }
                }
            }
            Exp::Unary { op: Oper::AddrOf, sub } => {
                // a[m[x]] == x
                if sub.op() == Oper::MemOf {
                    return sub.into_sub1().simplify_addr();
                }
                // a[size(k, m[x])] == x
                if sub.op() == Oper::Size && sub.sub2().op() == Oper::MemOf {
                    return sub.into_sub2().into_sub1().simplify_addr();
                }
                Exp::Unary {
                    op: Oper::AddrOf,
                    sub: Box::new(sub.simplify_addr()),
                }
            }
            mut other => {
                for i in 0..other.child_count() {
                    let child = std::mem::replace(other.child_mut(i), Exp::Terminal(Oper::Nil));
                    *other.child_mut(i) = child.simplify_addr();
                }
                other
            }
        }
    }

    /// Fold `type-value = type-value` comparisons in a constraint
    /// expression, and simplify through the `and`/`or`/`not` structure.
    /// Comparisons involving a pointer-to-alpha stay symbolic.
    pub fn simplify_constraint(self) -> Exp {
        match self {
            Exp::Binary { op, lhs, rhs } => {
                let lhs = lhs.simplify_constraint();
                let rhs = rhs.simplify_constraint();
                match op {
                    Oper::Equals => {
                        if let (Exp::TypeVal(t1), Exp::TypeVal(t2)) = (&lhs, &rhs) {
                            if !t1.is_pointer_to_alpha() && !t2.is_pointer_to_alpha() {
                                return if t1 == t2 {
                                    Exp::terminal(Oper::True)
                                } else {
                                    Exp::terminal(Oper::False)
                                };
                            }
                        }
                        Exp::Binary {
                            op,
                            lhs: Box::new(lhs),
                            rhs: Box::new(rhs),
                        }
                    }
                    Oper::Or | Oper::And => Exp::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    }
                    .simplify(),
                    _ => Exp::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                }
            }
            Exp::Unary { op, sub } => {
                let sub = Box::new(sub.simplify_constraint());
                let e = Exp::Unary { op, sub };
                if op == Oper::LNot {
                    e.simplify()
                } else {
                    e
                }
            }
            other => other,
        }
    }

    /// Replace `succ(r[k])` with `r[k+1]`. At most one successor function
    /// is expected in an expression.
    pub fn fix_successor(self) -> Exp {
        let pat = Exp::unary(Oper::Successor, Exp::reg_of_exp(Exp::terminal(Oper::Wild)));
        let Some(hit) = self.search(&pat) else {
            return self;
        };
        // hit is succ(r[K]); the register number must be constant.
        let k = hit
            .sub1()
            .sub1()
            .int_const()
            .expect("succ of a non-constant register");
        let hit = hit.clone();
        let repl = Exp::reg_of(k + 1);
        let (res, _) = self.search_replace(&hit, &repl);
        res
    }

    /// Remove all zero-fill and sign-extend wrappers, keeping the value
    /// child. Does not handle truncation.
    pub fn kill_fill(self) -> Exp {
        match self {
            Exp::Ternary { op, trd, .. } if matches!(op, Oper::ZFill | Oper::SgnEx) => {
                trd.kill_fill()
            }
            mut other => {
                for i in 0..other.child_count() {
                    let child = std::mem::replace(other.child_mut(i), Exp::Terminal(Oper::Nil));
                    *other.child_mut(i) = child.kill_fill();
                }
                other
            }
        }
    }

    /// Strip `size` casts everywhere.
    pub fn strip_sizes(self) -> Exp {
        self.accept_mod(&mut crate::visit::SizeStripper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_mem_cancellation() {
        // m[a[m[x]]] => m[x]
        let mx = Exp::mem_of(Exp::reg_of(1));
        let e = Exp::mem_of(Exp::addr_of(mx.clone()));
        assert_eq!(e.simplify_addr(), mx);

        let e2 = Exp::addr_of(Exp::mem_of(Exp::reg_of(2)));
        assert_eq!(e2.simplify_addr(), Exp::reg_of(2));
    }

    #[test]
    fn addr_through_size() {
        // a[size(32, m[x])] => x
        let e = Exp::addr_of(Exp::binary(
            Oper::Size,
            Exp::int(32),
            Exp::mem_of(Exp::reg_of(3)),
        ));
        assert_eq!(e.simplify_addr(), Exp::reg_of(3));
    }

    #[test]
    fn fix_successor_increments() {
        // succ(r5) => r6
        let e = Exp::unary(Oper::Successor, Exp::reg_of(5));
        assert_eq!(e.fix_successor(), Exp::reg_of(6));

        // Inside a larger expression too.
        let e = Exp::binary(
            Oper::Plus,
            Exp::unary(Oper::Successor, Exp::reg_of(8)),
            Exp::int(1),
        );
        assert_eq!(
            e.fix_successor(),
            Exp::binary(Oper::Plus, Exp::reg_of(9), Exp::int(1))
        );
    }

    #[test]
    fn fix_successor_without_succ_is_identity() {
        let e = Exp::reg_of(5);
        assert_eq!(e.clone().fix_successor(), e);
    }

    #[test]
    fn kill_fill_unwraps() {
        let v = Exp::reg_of(8);
        let e = Exp::ternary(
            Oper::ZFill,
            Exp::int(8),
            Exp::int(32),
            Exp::ternary(Oper::SgnEx, Exp::int(16), Exp::int(32), v.clone()),
        );
        assert_eq!(e.kill_fill(), v);
    }

    #[test]
    fn constraint_folding() {
        use oxbow_types::Type;
        let t_int = Exp::typeval(Type::int(32));
        let eq = Exp::binary(Oper::Equals, t_int.clone(), t_int.clone());
        assert_eq!(eq.simplify_constraint(), Exp::terminal(Oper::True));

        let ne = Exp::binary(Oper::Equals, t_int.clone(), Exp::typeval(Type::float(32)));
        assert_eq!(ne.simplify_constraint(), Exp::terminal(Oper::False));

        // Pointer-to-alpha stays symbolic.
        let alpha = Exp::typeval(Type::pointer(Type::Alpha(1)));
        let sym = Exp::binary(Oper::Equals, alpha.clone(), t_int.clone());
        assert_eq!(sym.clone().simplify_constraint(), sym);

        // And the conjunction structure folds through.
        let conj = Exp::binary(
            Oper::And,
            Exp::binary(Oper::Equals, t_int.clone(), t_int.clone()),
            Exp::terminal(Oper::True),
        );
        assert_eq!(conj.simplify_constraint(), Exp::terminal(Oper::True));
    }
}
