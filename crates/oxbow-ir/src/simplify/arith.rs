//! Arithmetic simplification of `+`/`-` chains.
//!
//! An expression built from sums and differences is partitioned into
//! positive non-integer terms, negative non-integer terms and integer
//! terms; equal positive/negative pairs cancel, the integers are summed,
//! and the result is reassembled in canonical shape. For example
//! `(sp + 108) + (n - (sp + 92))` partitions into positives `{sp, n}`,
//! negatives `{sp}` and integers `{108, -92}`, and reassembles as
//! `n + 16`.

use crate::exp::Exp;
use crate::oper::Oper;

/// Partition the terms of a `+`/`-` tree. Typed wrappers are transparent.
/// `negate` flips the sign of everything below (the right-hand side of a
/// difference).
pub(crate) fn partition_terms(
    e: &Exp,
    positives: &mut Vec<Exp>,
    negatives: &mut Vec<Exp>,
    integers: &mut Vec<i32>,
    negate: bool,
) {
    match e.op() {
        Oper::Plus => {
            partition_terms(e.sub1(), positives, negatives, integers, negate);
            partition_terms(e.sub2(), positives, negatives, integers, negate);
        }
        Oper::Minus => {
            partition_terms(e.sub1(), positives, negatives, integers, negate);
            partition_terms(e.sub2(), positives, negatives, integers, !negate);
        }
        Oper::TypedExp => {
            partition_terms(e.sub1(), positives, negatives, integers, negate);
        }
        Oper::IntConst => {
            let k = e.int_const().unwrap();
            integers.push(if negate { k.wrapping_neg() } else { k });
        }
        _ => {
            // Any other expression tree is an opaque term.
            if negate {
                negatives.push(e.clone());
            } else {
                positives.push(e.clone());
            }
        }
    }
}

/// The sum of a list of expressions as a right-leaning `+` chain over
/// clones. Empty list gives `0`, a single entry gives a clone of it.
pub(crate) fn accumulate(terms: &[Exp]) -> Exp {
    match terms {
        [] => Exp::int(0),
        [single] => single.clone(),
        [head @ .., last] => {
            let mut res = last.clone();
            for t in head.iter().rev() {
                res = Exp::binary(Oper::Plus, t.clone(), res);
            }
            res
        }
    }
}

impl Exp {
    /// Simplify an expression consisting of `+` and `-` at the top level,
    /// e.g. `(sp + 100) - (sp + 92)` becomes `8`. Recurses through memory
    /// addresses and subscripts so stack slots get canonical offsets.
    pub fn simplify_arith(self) -> Exp {
        match self {
            Exp::Location { op, sub, proc } => {
                let sub = Box::new(sub.simplify_arith());
                Exp::Location { op, sub, proc }
            }
            Exp::Unary { op: Oper::AddrOf, sub } => Exp::Unary {
                op: Oper::AddrOf,
                sub: Box::new(sub.simplify_arith()),
            },
            Exp::Ref { sub, def } => Exp::Ref {
                sub: Box::new(sub.simplify_arith()),
                def,
            },
            Exp::Ternary { op, fst, snd, trd } => Exp::Ternary {
                op,
                fst: Box::new(fst.simplify_arith()),
                snd: Box::new(snd.simplify_arith()),
                trd: Box::new(trd.simplify_arith()),
            },
            Exp::Binary { op, lhs, rhs } => {
                let lhs = lhs.simplify_arith();
                let rhs = rhs.simplify_arith();
                let e = Exp::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                };
                if op != Oper::Plus && op != Oper::Minus {
                    return e;
                }

                let mut positives = Vec::new();
                let mut negatives = Vec::new();
                let mut integers = Vec::new();
                partition_terms(&e, &mut positives, &mut negatives, &mut integers, false);

                // Cancel equal positive/negative pairs.
                let mut p = 0;
                while p < positives.len() {
                    if let Some(n) = negatives.iter().position(|n| *n == positives[p]) {
                        positives.remove(p);
                        negatives.remove(n);
                    } else {
                        p += 1;
                    }
                }

                let sum: i32 = integers.into_iter().fold(0, i32::wrapping_add);
                rebuild(&positives, &negatives, sum)
            }
            other => other,
        }
    }
}

/// Reassemble the partition with canonical shape.
fn rebuild(positives: &[Exp], negatives: &[Exp], sum: i32) -> Exp {
    if positives.is_empty() {
        if negatives.is_empty() {
            return Exp::int(sum);
        }
        // No positives, some negatives: sum - negs.
        return Exp::binary(Oper::Minus, Exp::int(sum), accumulate(negatives));
    }
    if negatives.is_empty() {
        if sum == 0 {
            return accumulate(positives);
        }
        let (op, k) = if sum < 0 {
            (Oper::Minus, sum.wrapping_neg())
        } else {
            (Oper::Plus, sum)
        };
        return Exp::binary(op, accumulate(positives), Exp::int(k));
    }
    let diff = Exp::binary(Oper::Minus, accumulate(positives), accumulate(negatives));
    if sum == 0 {
        return diff;
    }
    let (op, k) = if sum < 0 {
        (Oper::Minus, sum.wrapping_neg())
    } else {
        (Oper::Plus, sum)
    };
    Exp::binary(op, diff, Exp::int(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp() -> Exp {
        Exp::reg_of(28)
    }

    #[test]
    fn cancels_stack_pointer_pair() {
        // (r28 + 108) + (n - (r28 + 92))  =>  n + 16
        let n = Exp::local("n", None);
        let e = Exp::binary(
            Oper::Plus,
            Exp::binary(Oper::Plus, sp(), Exp::int(108)),
            Exp::binary(
                Oper::Minus,
                n.clone(),
                Exp::binary(Oper::Plus, sp(), Exp::int(92)),
            ),
        );
        assert_eq!(
            e.simplify_arith(),
            Exp::binary(Oper::Plus, n, Exp::int(16))
        );
    }

    #[test]
    fn pure_constant_difference() {
        // (r28 + 100) - (r28 + 92) => 8
        let e = Exp::binary(
            Oper::Minus,
            Exp::binary(Oper::Plus, sp(), Exp::int(100)),
            Exp::binary(Oper::Plus, sp(), Exp::int(92)),
        );
        assert_eq!(e.simplify_arith(), Exp::int(8));
    }

    #[test]
    fn negatives_only() {
        // 4 - n => 4 - n, unchanged shape but canonical
        let n = Exp::local("n", None);
        let e = Exp::binary(Oper::Minus, Exp::int(4), n.clone());
        assert_eq!(
            e.simplify_arith(),
            Exp::binary(Oper::Minus, Exp::int(4), n)
        );
    }

    #[test]
    fn negative_sum_becomes_subtraction() {
        // (n - 8) + 4 => n - 4
        let n = Exp::local("n", None);
        let e = Exp::binary(
            Oper::Plus,
            Exp::binary(Oper::Minus, n.clone(), Exp::int(8)),
            Exp::int(4),
        );
        assert_eq!(
            e.simplify_arith(),
            Exp::binary(Oper::Minus, n, Exp::int(4))
        );
    }

    #[test]
    fn recurses_into_memory_addresses() {
        // m[(r28 + 8) - 8] => m[r28]
        let e = Exp::mem_of(Exp::binary(
            Oper::Minus,
            Exp::binary(Oper::Plus, sp(), Exp::int(8)),
            Exp::int(8),
        ));
        assert_eq!(e.simplify_arith(), Exp::mem_of(sp()));
    }

    #[test]
    fn accumulate_shapes() {
        assert_eq!(accumulate(&[]), Exp::int(0));
        assert_eq!(accumulate(&[sp()]), sp());
        let three = accumulate(&[Exp::int(1), Exp::int(2), Exp::int(3)]);
        // Right-leaning: 1 + (2 + 3)
        assert_eq!(
            three,
            Exp::binary(
                Oper::Plus,
                Exp::int(1),
                Exp::binary(Oper::Plus, Exp::int(2), Exp::int(3))
            )
        );
    }

    #[test]
    fn both_sides_with_constant() {
        // (a - b) + 5 shape for {pos a} {neg b} sum 5
        let a = Exp::local("a", None);
        let b = Exp::local("b", None);
        let e = Exp::binary(
            Oper::Plus,
            Exp::binary(Oper::Minus, a.clone(), b.clone()),
            Exp::int(5),
        );
        assert_eq!(
            e.simplify_arith(),
            Exp::binary(
                Oper::Plus,
                Exp::binary(Oper::Minus, a, b),
                Exp::int(5)
            )
        );
    }
}
