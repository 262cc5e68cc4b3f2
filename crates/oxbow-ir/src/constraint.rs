//! Type-constraint emission.
//!
//! Every node kind can describe the types it admits as a constraint
//! expression handed to the external inference engine. When the expected
//! `result` is a concrete type value, the constraint collapses toward a
//! satisfiability check (`true`/`false`, or an equation re-coercing the
//! node); when it is a type variable such as `T[x]`, the constraint stays
//! symbolic, a disjunction of the admissible typings.
//!
//! Constraints are ordinary expressions over `=`, `and`, `or`, `T[...]`
//! and type values, so the whole rewrite machinery applies to them.

use crate::exp::{Exp, Value};
use crate::oper::Oper;
use oxbow_types::{Type, STD_SIZE};

/// Constraint generator. Owns the counter for fresh pointer-target type
/// variables.
#[derive(Default)]
pub struct ConstraintGen {
    next_alpha: u32,
}

fn conj(a: Exp, b: Exp) -> Exp {
    Exp::binary(Oper::And, a, b)
}

fn disj(a: Exp, b: Exp) -> Exp {
    Exp::binary(Oper::Or, a, b)
}

fn equ(a: Exp, b: Exp) -> Exp {
    Exp::binary(Oper::Equals, a, b)
}

fn type_of(e: &Exp) -> Exp {
    Exp::unary(Oper::TypeOf, e.clone())
}

impl ConstraintGen {
    pub fn new() -> ConstraintGen {
        ConstraintGen::default()
    }

    /// A fresh pointer to an unconstrained type variable.
    fn fresh_ptr_alpha(&mut self) -> Type {
        self.next_alpha += 1;
        Type::pointer(Type::Alpha(self.next_alpha))
    }

    /// Emit the constraints for `e` given the expected `result`, which is
    /// either a type value or a type variable expression.
    pub fn generate(&mut self, e: &Exp, result: &Exp) -> Exp {
        match e {
            Exp::Const(c) => self.gen_const(e, &c.value, result),
            Exp::Unary { op, .. } | Exp::Location { op, .. } => match op {
                // Should be no params at constraint time, but the
                // constraint is the same shape for all of these.
                Oper::RegOf | Oper::Param | Oper::Global | Oper::Local => {
                    if result.is_typeval() {
                        Exp::terminal(Oper::True)
                    } else {
                        equ(type_of(e), result.clone())
                    }
                }
                _ => Exp::terminal(Oper::True),
            },
            Exp::Ref { sub, .. } => match sub.op() {
                Oper::RegOf | Oper::Param | Oper::Global | Oper::Local => {
                    equ(type_of(e), result.clone())
                }
                _ => Exp::terminal(Oper::True),
            },
            Exp::Binary { .. } => self.gen_binary(e, result),
            Exp::Ternary { .. } => self.gen_ternary(e, result),
            _ => Exp::terminal(Oper::True),
        }
    }

    fn gen_const(&mut self, e: &Exp, value: &Value, result: &Exp) -> Exp {
        if let Exp::TypeVal(t) = result {
            // Concrete expected type: check compatibility, and emit the
            // re-coercion equation when it holds.
            let matches = match value {
                // An integer constant is compatible with any integer, with
                // a pointer when large enough to be an address, and can be
                // coerced to a float.
                Value::Int(i) => {
                    t.is_integer() || (*i as u32 >= 0x100 && t.is_pointer()) || t.is_float()
                }
                Value::Long(l) => {
                    t.is_integer() || (*l as u64 >= 0x100 && t.is_pointer()) || t.is_float()
                }
                Value::Str(_) => match t.points_to() {
                    Some(p) => {
                        p.is_char()
                            || p.as_array().is_some_and(|a| a.base.is_char())
                    }
                    None => false,
                },
                Value::Flt(_) => t.is_float(),
                _ => false,
            };
            return if matches {
                equ(type_of(e), result.clone())
            } else {
                Exp::terminal(Oper::False)
            };
        }

        // Type variable: the constant constrains it.
        match value {
            Value::Int(_) => {
                // Either both integer, or both pointer.
                let intt = Exp::typeval(Type::int(0));
                let alph = Exp::typeval(self.fresh_ptr_alpha());
                disj(
                    conj(
                        equ(result.clone(), intt.clone()),
                        equ(type_of(e), intt),
                    ),
                    conj(
                        equ(result.clone(), alph.clone()),
                        equ(type_of(e), alph),
                    ),
                )
            }
            Value::Long(_) => equ(result.clone(), Exp::typeval(Type::int(64))),
            Value::Str(_) => equ(result.clone(), Exp::typeval(Type::pointer(Type::Char))),
            // Size not known; assume double.
            Value::Flt(_) => equ(result.clone(), Exp::typeval(Type::float(64))),
            Value::Func(_) => Exp::terminal(Oper::True),
        }
    }

    /// Constrain both subterms to the given type values.
    fn constrain_sub(&mut self, e: &Exp, t1: &Exp, t2: &Exp) -> Exp {
        let con1 = self.generate(e.sub1(), t1);
        let con2 = self.generate(e.sub2(), t2);
        conj(con1, con2)
    }

    fn gen_binary(&mut self, e: &Exp, result: &Exp) -> Exp {
        let restrict_to = match result {
            Exp::TypeVal(t) => Some(t.clone()),
            _ => None,
        };
        let int_val = Exp::typeval(Type::int(0));
        match e.op() {
            Oper::FPlus | Oper::FMinus | Oper::FMult | Oper::FDiv => {
                if restrict_to.as_ref().is_some_and(|t| !t.is_float()) {
                    return Exp::terminal(Oper::False);
                }
                let ftv = Exp::typeval(Type::float(64));
                let mut res = self.constrain_sub(e, &ftv, &ftv);
                if restrict_to.is_none() {
                    res = conj(res, equ(result.clone(), ftv));
                }
                res
            }

            Oper::BitAnd | Oper::BitOr | Oper::BitXor => {
                if restrict_to.as_ref().is_some_and(|t| !t.is_integer()) {
                    return Exp::terminal(Oper::False);
                }
                let itv = Exp::typeval(Type::int(STD_SIZE));
                let mut res = self.constrain_sub(e, &itv, &itv);
                if restrict_to.is_none() {
                    res = conj(res, equ(result.clone(), itv));
                }
                res
            }

            Oper::Plus => {
                let ptr_val = Exp::typeval(self.fresh_ptr_alpha());
                let mut res: Option<Exp> = None;
                let unrestricted = restrict_to.is_none();
                if unrestricted || restrict_to.as_ref().unwrap().is_integer() {
                    // int + int -> int
                    let mut c = self.constrain_sub(e, &int_val, &int_val);
                    if unrestricted {
                        c = conj(c, equ(result.clone(), int_val.clone()));
                    }
                    res = Some(c);
                }
                if unrestricted || restrict_to.as_ref().unwrap().is_pointer() {
                    // ptr + int -> ptr
                    let mut c = self.constrain_sub(e, &ptr_val, &int_val);
                    if unrestricted {
                        c = conj(c, equ(result.clone(), ptr_val.clone()));
                    }
                    res = Some(match res {
                        Some(r) => disj(r, c),
                        None => c,
                    });
                    // int + ptr -> ptr
                    let mut c = self.constrain_sub(e, &int_val, &ptr_val);
                    if unrestricted {
                        c = conj(c, equ(result.clone(), ptr_val.clone()));
                    }
                    res = Some(disj(res.unwrap(), c));
                }
                match res {
                    Some(r) => r.simplify(),
                    None => Exp::terminal(Oper::False),
                }
            }

            Oper::Minus => {
                let ptr_val = Exp::typeval(self.fresh_ptr_alpha());
                let mut res: Option<Exp> = None;
                let unrestricted = restrict_to.is_none();
                if unrestricted || restrict_to.as_ref().unwrap().is_integer() {
                    // int - int -> int
                    let mut c = self.constrain_sub(e, &int_val, &int_val);
                    if unrestricted {
                        c = conj(c, equ(result.clone(), int_val.clone()));
                    }
                    res = Some(c);
                    // ptr - ptr -> int
                    let mut c = self.constrain_sub(e, &ptr_val, &ptr_val);
                    if unrestricted {
                        c = conj(c, equ(result.clone(), int_val.clone()));
                    }
                    res = Some(disj(res.unwrap(), c));
                }
                if unrestricted || restrict_to.as_ref().unwrap().is_pointer() {
                    // ptr - int -> ptr
                    let mut c = self.constrain_sub(e, &ptr_val, &int_val);
                    if unrestricted {
                        c = conj(c, equ(result.clone(), ptr_val.clone()));
                    }
                    res = Some(match res {
                        Some(r) => disj(r, c),
                        None => c,
                    });
                }
                match res {
                    Some(r) => r.simplify(),
                    None => Exp::terminal(Oper::False),
                }
            }

            Oper::Size => {
                // Carries the size of memory accesses from the decoder.
                let sz = e
                    .sub1()
                    .int_const()
                    .expect("size operator with non-constant size");
                if let Some(t) = restrict_to {
                    let rsz = t.size();
                    if rsz == 0 {
                        // Same type class, now with a known size.
                        return equ(
                            type_of(e.sub2()),
                            Exp::typeval(t.with_size(sz as u32)),
                        );
                    }
                    return Exp::terminal(if rsz == sz as u32 {
                        Oper::True
                    } else {
                        Oper::False
                    });
                }
                // Constrain the size but not the basic type.
                equ(result.clone(), Exp::typeval(Type::Size(sz as u32)))
            }

            _ => Exp::terminal(Oper::True),
        }
    }

    fn gen_ternary(&mut self, e: &Exp, result: &Exp) -> Exp {
        let (arg, ret) = match e.op() {
            Oper::FSize | Oper::Itof | Oper::Ftoi | Oper::SgnEx => {
                let from = e
                    .sub1()
                    .int_const()
                    .expect("conversion with non-constant from-size");
                let to = e
                    .sub2()
                    .int_const()
                    .expect("conversion with non-constant to-size");
                let (from, to) = (from as u32, to as u32);
                match e.op() {
                    Oper::FSize => (Type::float(from), Type::float(to)),
                    Oper::Itof => (Type::int(from), Type::float(to)),
                    Oper::Ftoi => (Type::float(from), Type::int(to)),
                    _ => (Type::int(from), Type::int(to)),
                }
            }
            _ => return Exp::terminal(Oper::True),
        };

        let mut res: Option<Exp> = None;
        if let Exp::TypeVal(t) = result {
            // Compare broad type classes only.
            if !ret.broad_eq(t) {
                return Exp::terminal(Oper::False);
            }
            // Just constrain the argument.
        } else {
            res = Some(equ(result.clone(), Exp::typeval(ret)));
        }
        let con = self.generate(e.sub3(), &Exp::typeval(arg));
        let out = match res {
            Some(r) => conj(r, con),
            None => con,
        };
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exp::Def;

    fn tv(t: Type) -> Exp {
        Exp::typeval(t)
    }

    #[test]
    fn int_const_against_concrete_types() {
        let mut cg = ConstraintGen::new();
        let k = Exp::int(5);
        // Small constant: integer yes, pointer no.
        let con = cg.generate(&k, &tv(Type::int(32)));
        assert_eq!(con, Exp::binary(
            Oper::Equals,
            Exp::unary(Oper::TypeOf, k.clone()),
            tv(Type::int(32)),
        ));
        assert_eq!(
            cg.generate(&k, &tv(Type::pointer(Type::Char))),
            Exp::terminal(Oper::False)
        );
        // A large constant can be a pointer.
        let big = Exp::int(0x8048000u32 as i32);
        assert_ne!(
            cg.generate(&big, &tv(Type::pointer(Type::Char))),
            Exp::terminal(Oper::False)
        );
    }

    #[test]
    fn int_const_against_type_variable() {
        let mut cg = ConstraintGen::new();
        let k = Exp::int(5);
        let result = Exp::unary(Oper::TypeOf, Exp::reg_of(8));
        let con = cg.generate(&k, &result);
        // (result = int and T[5] = int) or (result = ptr(a) and T[5] = ptr(a))
        assert_eq!(con.op(), Oper::Or);
        assert_eq!(con.sub1().op(), Oper::And);
        assert_eq!(con.sub2().op(), Oper::And);
    }

    #[test]
    fn str_const_wants_char_pointer() {
        let mut cg = ConstraintGen::new();
        let s = Exp::str_const("hi");
        assert_ne!(
            cg.generate(&s, &tv(Type::pointer(Type::Char))),
            Exp::terminal(Oper::False)
        );
        assert_eq!(
            cg.generate(&s, &tv(Type::int(32))),
            Exp::terminal(Oper::False)
        );
    }

    #[test]
    fn float_arith_constrains_both_sides() {
        let mut cg = ConstraintGen::new();
        let e = Exp::binary(Oper::FPlus, Exp::reg_of(32), Exp::reg_of(33));
        // Against a non-float the constraint is unsatisfiable.
        assert_eq!(
            cg.generate(&e, &tv(Type::int(32))),
            Exp::terminal(Oper::False)
        );
        // Against a float it constrains the operands.
        let con = cg.generate(&e, &tv(Type::float(64)));
        assert_eq!(con.op(), Oper::And);
    }

    #[test]
    fn bitand_wants_integers() {
        let mut cg = ConstraintGen::new();
        let e = Exp::binary(Oper::BitAnd, Exp::reg_of(8), Exp::reg_of(9));
        assert_eq!(
            cg.generate(&e, &tv(Type::float(32))),
            Exp::terminal(Oper::False)
        );
        assert_ne!(
            cg.generate(&e, &tv(Type::int(32))),
            Exp::terminal(Oper::False)
        );
    }

    #[test]
    fn plus_gives_disjunction_for_type_variable() {
        let mut cg = ConstraintGen::new();
        let e = Exp::binary(Oper::Plus, Exp::reg_of(8), Exp::reg_of(9));
        let result = Exp::unary(Oper::TypeOf, Exp::reg_of(10));
        let con = cg.generate(&e, &result);
        // int+int, ptr+int, int+ptr: a two-level disjunction survives
        // simplification.
        assert_eq!(con.op(), Oper::Or);
    }

    #[test]
    fn subscripted_location_constrains_like_location() {
        let mut cg = ConstraintGen::new();
        let e = Exp::subscripted(Exp::reg_of(8), Def::Stmt(2));
        let result = Exp::unary(Oper::TypeOf, Exp::reg_of(10));
        let con = cg.generate(&e, &result);
        assert_eq!(con.op(), Oper::Equals);
        assert_eq!(*con.sub1(), Exp::unary(Oper::TypeOf, e.clone()));
    }

    #[test]
    fn conversion_sizes() {
        let mut cg = ConstraintGen::new();
        // itof(32, 64, r8): argument int32, result float64.
        let e = Exp::ternary(Oper::Itof, Exp::int(32), Exp::int(64), Exp::reg_of(8));
        assert_eq!(
            cg.generate(&e, &tv(Type::int(32))),
            Exp::terminal(Oper::False)
        );
        let sym = Exp::unary(Oper::TypeOf, Exp::reg_of(9));
        let con = cg.generate(&e, &sym);
        assert_eq!(con.op(), Oper::And);
        assert_eq!(
            *con.sub1(),
            Exp::binary(Oper::Equals, sym.clone(), tv(Type::float(64)))
        );
    }

    #[test]
    fn size_operator() {
        let mut cg = ConstraintGen::new();
        let e = Exp::binary(Oper::Size, Exp::int(32), Exp::mem_of(Exp::reg_of(28)));
        // Unsized expected type gets the size filled in.
        let con = cg.generate(&e, &tv(Type::int(0)));
        assert_eq!(
            con,
            Exp::binary(
                Oper::Equals,
                Exp::unary(Oper::TypeOf, Exp::mem_of(Exp::reg_of(28))),
                tv(Type::int(32))
            )
        );
        // Matching size is satisfied, mismatching is not.
        assert_eq!(cg.generate(&e, &tv(Type::int(32))), Exp::terminal(Oper::True));
        assert_eq!(cg.generate(&e, &tv(Type::int(16))), Exp::terminal(Oper::False));
        // A type variable gets a size-only constraint.
        let sym = Exp::unary(Oper::TypeOf, Exp::reg_of(9));
        assert_eq!(
            cg.generate(&e, &sym),
            Exp::binary(Oper::Equals, sym.clone(), tv(Type::Size(32)))
        );
    }
}
