//! The polymorphic rewrite rules.
//!
//! One function per node shape, run bottom-up. Every rule that fires sets
//! the modification flag so the driver loop re-enters from the top;
//! the canonicalising commutations deliberately do not, to avoid
//! oscillation. Rule order within a pass is part of the observable
//! behaviour and follows the canonical order exactly.

use super::SimplifyCtx;
use crate::exp::{Def, Exp};
use crate::oper::Oper;
use log::debug;
use oxbow_types::{CompoundType, Type};

pub(crate) fn poly_simplify(e: Exp, ctx: &dyn SimplifyCtx, ch: &mut bool) -> Exp {
    match e {
        Exp::Unary { op, sub } => simp_unary(op, *sub, ctx, ch),
        Exp::Location { op, sub, proc } => simp_location(op, *sub, proc, ctx, ch),
        Exp::Binary { op, lhs, rhs } => simp_binary(op, *lhs, *rhs, ctx, ch),
        Exp::Ternary { op, fst, snd, trd } => simp_ternary(op, *fst, *snd, *trd, ctx, ch),
        Exp::Typed { ty, sub } => simp_typed(ty, *sub, ch),
        Exp::Ref { sub, def } => simp_ref(*sub, def, ctx, ch),
        leaf => leaf,
    }
}

fn simp_unary(op: Oper, sub: Exp, ctx: &dyn SimplifyCtx, ch: &mut bool) -> Exp {
    let sub = poly_simplify(sub, ctx, ch);

    // Push a not across a comparison: not(a = b) becomes a ~= b, and so
    // on for the other comparison operators.
    if matches!(op, Oper::Not | Oper::LNot) {
        if let Some(neg) = sub.op().negated_comparison() {
            *ch = true;
            let mut sub = sub;
            sub.set_op(neg);
            return sub;
        }
    }

    match op {
        Oper::Neg | Oper::Not | Oper::LNot => {
            // Fold -k, ~k, L~k.
            if let Some(k) = sub.int_const() {
                *ch = true;
                let k = match op {
                    Oper::Neg => k.wrapping_neg(),
                    Oper::Not => !k,
                    _ => i32::from(k == 0),
                };
                return Exp::int(k);
            }
            // Double negation, double not.
            if sub.op() == op {
                *ch = true;
                return sub.into_sub1();
            }
            Exp::unary(op, sub)
        }
        Oper::AddrOf => {
            // a[m[x]] becomes x.
            if sub.op() == Oper::MemOf {
                *ch = true;
                return sub.into_sub1();
            }
            Exp::unary(op, sub)
        }
        _ => Exp::unary(op, sub),
    }
}

fn simp_location(
    op: Oper,
    sub: Exp,
    proc: Option<crate::exp::ProcId>,
    ctx: &dyn SimplifyCtx,
    ch: &mut bool,
) -> Exp {
    let sub = poly_simplify(sub, ctx, ch);

    // m[a[x]] becomes x, member accesses included.
    if op == Oper::MemOf && sub.op() == Oper::AddrOf {
        *ch = true;
        return sub.into_sub1();
    }

    Exp::Location {
        op,
        sub: Box::new(sub),
        proc,
    }
}

fn simp_typed(ty: Type, sub: Exp, ch: &mut bool) -> Exp {
    // A type cast on a register is noise; drop the wrapper.
    if sub.op() == Oper::RegOf {
        *ch = true;
        return sub;
    }
    Exp::Typed {
        ty,
        sub: Box::new(sub.simplify()),
    }
}

fn simp_ref(sub: Exp, def: Def, ctx: &dyn SimplifyCtx, ch: &mut bool) -> Exp {
    let mut here = false;
    let sub = poly_simplify(sub, ctx, &mut here);
    if here {
        *ch = true;
        return Exp::Ref {
            sub: Box::new(sub),
            def,
        };
    }

    // %DF{-} is 0: by convention the direction flag is clear on entry to
    // a procedure.
    if sub.op() == Oper::DF && def == Def::Implicit {
        *ch = true;
        return Exp::int(0);
    }

    if let Some(arch) = ctx.arch() {
        if let Some(res) = arch.ref_rewrite(&sub, def, ctx) {
            *ch = true;
            return res;
        }
    }

    Exp::Ref {
        sub: Box::new(sub),
        def,
    }
}

/// Fold `k1 op k2` for the operators with well-defined 32-bit semantics.
/// Division by zero and negative shift counts do not fold; the expression
/// is simply left alone.
fn fold_const(op: Oper, k1: i32, k2: i32) -> Option<i32> {
    let (u1, u2) = (k1 as u32, k2 as u32);
    Some(match op {
        Oper::Plus => k1.wrapping_add(k2),
        Oper::Minus => k1.wrapping_sub(k2),
        Oper::Div => {
            if k2 == 0 {
                return None;
            }
            (u1 / u2) as i32
        }
        Oper::Divs => {
            if k2 == 0 || (k1 == i32::MIN && k2 == -1) {
                return None;
            }
            k1 / k2
        }
        Oper::Mod => {
            if k2 == 0 {
                return None;
            }
            (u1 % u2) as i32
        }
        Oper::Mods => {
            if k2 == 0 || (k1 == i32::MIN && k2 == -1) {
                return None;
            }
            k1 % k2
        }
        Oper::Mult => u1.wrapping_mul(u2) as i32,
        Oper::Mults => k1.wrapping_mul(k2),
        Oper::ShiftL => {
            if k2 < 0 {
                return None;
            }
            if k2 >= 32 {
                0
            } else {
                (u1 << k2) as i32
            }
        }
        Oper::ShiftR => {
            if k2 < 0 {
                return None;
            }
            if k2 >= 32 {
                0
            } else {
                (u1 >> k2) as i32
            }
        }
        Oper::ShiftRa => {
            if k2 < 0 {
                return None;
            }
            // Sign extension; shifting out everything keeps the sign.
            k1 >> k2.min(31)
        }
        Oper::BitOr => k1 | k2,
        Oper::BitAnd => k1 & k2,
        Oper::BitXor => k1 ^ k2,
        Oper::Equals => i32::from(k1 == k2),
        Oper::NotEqual => i32::from(k1 != k2),
        Oper::Less => i32::from(k1 < k2),
        Oper::Gtr => i32::from(k1 > k2),
        Oper::LessEq => i32::from(k1 <= k2),
        Oper::GtrEq => i32::from(k1 >= k2),
        Oper::LessUns => i32::from(u1 < u2),
        Oper::GtrUns => i32::from(u1 > u2),
        Oper::LessEqUns => i32::from(u1 <= u2),
        Oper::GtrEqUns => i32::from(u1 >= u2),
        _ => return None,
    })
}

fn is_mult(op: Oper) -> bool {
    matches!(op, Oper::Mult | Oper::Mults)
}

fn simp_binary(op: Oper, lhs: Exp, rhs: Exp, ctx: &dyn SimplifyCtx, ch: &mut bool) -> Exp {
    let mut op = op;
    let mut lhs = poly_simplify(lhs, ctx, ch);
    let mut rhs = poly_simplify(rhs, ctx, ch);

    // k1 op k2, where k1 and k2 are integer constants.
    if let (Some(k1), Some(k2)) = (lhs.int_const(), rhs.int_const()) {
        if let Some(k) = fold_const(op, k1, k2) {
            *ch = true;
            return Exp::int(k);
        }
    }

    // x ^ x and x - x are zero.
    if matches!(op, Oper::BitXor | Oper::Minus) && lhs == rhs {
        *ch = true;
        return Exp::int(0);
    }

    // x | x and x & x are x.
    if matches!(op, Oper::BitOr | Oper::BitAnd) && lhs == rhs {
        *ch = true;
        return lhs;
    }

    // x == x is true.
    if op == Oper::Equals && lhs == rhs {
        *ch = true;
        return Exp::terminal(Oper::True);
    }

    // Canonicalise: an integer constant on the left of a commutative
    // operator moves right. Later rules rely on this. Not counted as a
    // modification, or the fixpoint loop would never settle.
    if lhs.is_int_const()
        && matches!(
            op,
            Oper::Plus | Oper::Mult | Oper::Mults | Oper::BitOr | Oper::BitAnd
        )
    {
        std::mem::swap(&mut lhs, &mut rhs);
    }

    // Likewise boolean constants left of and/or.
    if lhs.is_bool_const() && !rhs.is_bool_const() && matches!(op, Oper::And | Oper::Or) {
        std::mem::swap(&mut lhs, &mut rhs);
    }

    // And addresses of globals on the right of a sum.
    if op == Oper::Plus
        && rhs.is_addr_of()
        && rhs.sub1().is_subscript()
        && rhs.sub1().sub1().is_global()
    {
        std::mem::swap(&mut lhs, &mut rhs);
    }

    // (x + a) + b becomes x + (a+b) when a and b are constants.
    if op == Oper::Plus
        && lhs.op() == Oper::Plus
        && rhs.is_int_const()
        && lhs.sub2().is_int_const()
    {
        let n = rhs.int_const().unwrap();
        let a = lhs.sub2().int_const().unwrap();
        lhs.sub2_mut().as_const_mut().unwrap().set_int(a.wrapping_add(n));
        *ch = true;
        return lhs;
    }

    // (x - a) + b becomes x + (b-a).
    if op == Oper::Plus
        && lhs.op() == Oper::Minus
        && rhs.is_int_const()
        && lhs.sub2().is_int_const()
    {
        let n = rhs.int_const().unwrap();
        let a = lhs.sub2().int_const().unwrap();
        lhs.set_op(Oper::Plus);
        lhs.sub2_mut()
            .as_const_mut()
            .unwrap()
            .set_int(n.wrapping_sub(a));
        *ch = true;
        return lhs;
    }

    // (x * k) - x becomes x * (k-1); same with +.
    if matches!(op, Oper::Plus | Oper::Minus) && is_mult(lhs.op()) && rhs == *lhs.sub1() {
        let inner = std::mem::replace(lhs.sub2_mut(), Exp::Terminal(Oper::Nil));
        *lhs.sub2_mut() = Exp::binary(op, inner, Exp::int(1));
        *ch = true;
        return lhs;
    }

    // x + (x * k) becomes x * (k+1).
    if op == Oper::Plus && is_mult(rhs.op()) && lhs == *rhs.sub1() {
        let inner = std::mem::replace(rhs.sub2_mut(), Exp::Terminal(Oper::Nil));
        *rhs.sub2_mut() = Exp::binary(Oper::Plus, inner, Exp::int(1));
        *ch = true;
        return rhs;
    }

    // a + -K becomes a - K, and a - -K becomes a + K (K positive).
    // Does not count as a change.
    if matches!(op, Oper::Plus | Oper::Minus) {
        if let Some(k) = rhs.int_const() {
            if k < 0 && k != i32::MIN {
                rhs.as_const_mut().unwrap().set_int(-k);
                op = if op == Oper::Plus { Oper::Minus } else { Oper::Plus };
            }
        }
    }

    // exp + 0, exp - 0, exp | 0.
    if matches!(op, Oper::Plus | Oper::Minus | Oper::BitOr) && rhs.int_const() == Some(0) {
        *ch = true;
        return lhs;
    }

    // exp or false.
    if op == Oper::Or && rhs.is_false() {
        *ch = true;
        return lhs;
    }

    // exp * 0, exp & 0.
    if matches!(op, Oper::Mult | Oper::Mults | Oper::BitAnd) && rhs.int_const() == Some(0) {
        *ch = true;
        return Exp::int(0);
    }

    // exp and false.
    if op == Oper::And && rhs.is_false() {
        *ch = true;
        return Exp::terminal(Oper::False);
    }

    // exp * 1.
    if matches!(op, Oper::Mult | Oper::Mults) && rhs.int_const() == Some(1) {
        *ch = true;
        return lhs;
    }

    // (x * y) / y becomes x.
    if matches!(op, Oper::Div | Oper::Divs) && is_mult(lhs.op()) && rhs == *lhs.sub2() {
        *ch = true;
        return lhs.into_sub1();
    }

    // exp / 1.
    if matches!(op, Oper::Div | Oper::Divs) && rhs.int_const() == Some(1) {
        *ch = true;
        return lhs;
    }

    // exp % 1.
    if matches!(op, Oper::Mod | Oper::Mods) && rhs.int_const() == Some(1) {
        *ch = true;
        return Exp::int(0);
    }

    // (x * y) % y.
    if matches!(op, Oper::Mod | Oper::Mods) && is_mult(lhs.op()) && rhs == *lhs.sub2() {
        *ch = true;
        return Exp::int(0);
    }

    // exp & -1.
    if op == Oper::BitAnd && rhs.int_const() == Some(-1) {
        *ch = true;
        return lhs;
    }

    // exp and true.
    if op == Oper::And && (rhs.int_const().is_some_and(|k| k != 0) || rhs.is_true()) {
        *ch = true;
        return lhs;
    }

    // exp or true.
    if op == Oper::Or && (rhs.int_const().is_some_and(|k| k != 0) || rhs.is_true()) {
        *ch = true;
        return Exp::terminal(Oper::True);
    }

    // exp << k becomes exp * 2^k; exp >> k becomes exp / 2^k (unsigned).
    if op == Oper::ShiftL {
        if let Some(k) = rhs.int_const() {
            if (0..32).contains(&k) {
                rhs.as_const_mut().unwrap().set_int(1 << k);
                *ch = true;
                return Exp::binary(Oper::Mult, lhs, rhs);
            }
        }
    }
    if op == Oper::ShiftR {
        if let Some(k) = rhs.int_const() {
            if (0..32).contains(&k) {
                rhs.as_const_mut().unwrap().set_int(1 << k);
                *ch = true;
                return Exp::binary(Oper::Div, lhs, rhs);
            }
        }
    }

    // (x == y) == 1 becomes x == y.
    if op == Oper::Equals && rhs.int_const() == Some(1) && lhs.op() == Oper::Equals {
        *ch = true;
        return lhs;
    }

    // x + -y == 0 becomes x == y (y stored as a negative constant).
    if op == Oper::Equals && rhs.int_const() == Some(0) && lhs.op() == Oper::Plus {
        if let Some(n) = lhs.sub2().int_const() {
            if n < 0 && n != i32::MIN {
                let (x, mut y) = lhs.into_operands();
                y.as_const_mut().unwrap().set_int(-n);
                *ch = true;
                return Exp::binary(Oper::Equals, x, y);
            }
        }
    }

    // (x == y) == 0 becomes x != y.
    if op == Oper::Equals && rhs.int_const() == Some(0) && lhs.op() == Oper::Equals {
        lhs.set_op(Oper::NotEqual);
        *ch = true;
        return lhs;
    }

    // (x == y) != 1 becomes x != y.
    if op == Oper::NotEqual && rhs.int_const() == Some(1) && lhs.op() == Oper::Equals {
        lhs.set_op(Oper::NotEqual);
        *ch = true;
        return lhs;
    }

    // (x == y) != 0 becomes x == y.
    if op == Oper::NotEqual && rhs.int_const() == Some(0) && lhs.op() == Oper::Equals {
        *ch = true;
        return lhs;
    }

    // (0 - x) != 0 becomes x != 0.
    if op == Oper::NotEqual
        && rhs.int_const() == Some(0)
        && lhs.op() == Oper::Minus
        && lhs.sub1().int_const() == Some(0)
    {
        *ch = true;
        return Exp::binary(Oper::NotEqual, lhs.into_sub2(), Exp::int(0));
    }

    // (x > y) == 0 becomes x <= y, and the unsigned analogue.
    if op == Oper::Equals && rhs.int_const() == Some(0) && lhs.op() == Oper::Gtr {
        lhs.set_op(Oper::LessEq);
        *ch = true;
        return lhs;
    }
    if op == Oper::Equals && rhs.int_const() == Some(0) && lhs.op() == Oper::GtrUns {
        lhs.set_op(Oper::LessEqUns);
        *ch = true;
        return lhs;
    }

    // (x <= y) or (x == y) becomes x <= y, when the comparisons share
    // their operands in either order.
    if op == Oper::Or
        && rhs.op() == Oper::Equals
        && matches!(
            lhs.op(),
            Oper::GtrEq | Oper::LessEq | Oper::GtrEqUns | Oper::LessEqUns
        )
    {
        let straight = lhs.sub1() == rhs.sub1() && lhs.sub2() == rhs.sub2();
        let crossed = lhs.sub1() == rhs.sub2() && lhs.sub2() == rhs.sub1();
        if straight || crossed {
            *ch = true;
            return lhs;
        }
    }

    // For a || b and a && b there is nothing more at this level.
    if matches!(op, Oper::Or | Oper::And) {
        return Exp::binary(op, lhs, rhs);
    }

    // x & x (again, after the commutation steps).
    if op == Oper::BitAnd && lhs == rhs {
        *ch = true;
        return lhs;
    }

    // (a * n) * m becomes a * (n*m).
    if op == Oper::Mult && lhs.op() == Oper::Mult && rhs.is_int_const() {
        if let Some(n) = lhs.sub2().int_const() {
            let m = rhs.int_const().unwrap();
            lhs.sub2_mut()
                .as_const_mut()
                .unwrap()
                .set_int(n.wrapping_mul(m));
            *ch = true;
            return lhs;
        }
    }

    // exp + n where exp's definition types it as a pointer to a compound:
    // rewrite to the address of the member at offset n.
    if op == Oper::Plus && lhs.is_subscript() && rhs.is_int_const() {
        let def = lhs.def().unwrap();
        if def.stmt().is_some() {
            if let Some(Type::Pointer(pointee)) = ctx.def_type(def, lhs.sub1()) {
                if let Type::Compound(c) = *pointee {
                    let n = rhs.int_const().unwrap();
                    if n >= 0 {
                        if let Some(res) = offset_to_compound(&lhs, &c, n as u32) {
                            debug!("replacing {} + {} with {}", lhs, rhs, res);
                            *ch = true;
                            return res;
                        }
                    }
                }
            }
        }
    }

    // 0.0 -f x becomes -f x.
    if op == Oper::FMinus && lhs.flt_const() == Some(0.0) {
        *ch = true;
        return Exp::unary(Oper::FNeg, rhs);
    }

    // (x * n) + n becomes (x + 1) * n; same with -.
    if matches!(op, Oper::Plus | Oper::Minus) && is_mult(lhs.op()) && rhs.is_int_const() {
        if let Some(n2) = lhs.sub2().int_const() {
            let n1 = rhs.int_const().unwrap();
            if n1 == n2 {
                let mul = lhs.op();
                let (x, _) = lhs.into_operands();
                *ch = true;
                return Exp::binary(
                    mul,
                    Exp::binary(op, x, Exp::int(1)),
                    Exp::int(n1),
                );
            }
        }
    }

    // (x + y*n) + n becomes x + (y+1)*n; same with -.
    if matches!(op, Oper::Plus | Oper::Minus)
        && lhs.op() == Oper::Plus
        && rhs.is_int_const()
        && is_mult(lhs.sub2().op())
    {
        if let Some(n2) = lhs.sub2().sub2().int_const() {
            let n1 = rhs.int_const().unwrap();
            if n1 == n2 {
                let mul = lhs.sub2().op();
                let (x, ymul) = lhs.into_operands();
                let (y, _) = ymul.into_operands();
                *ch = true;
                return Exp::binary(
                    Oper::Plus,
                    x,
                    Exp::binary(mul, Exp::binary(op, y, Exp::int(1)), Exp::int(n1)),
                );
            }
        }
    }

    // ((x * a) + (y * b)) / c where a and b divide evenly by c:
    // (x * a/c) + (y * b/c).
    if op == Oper::Div
        && lhs.op() == Oper::Plus
        && rhs.is_int_const()
        && lhs.sub1().op() == Oper::Mult
        && lhs.sub2().op() == Oper::Mult
    {
        let a = lhs.sub1().sub2().int_const();
        let b = lhs.sub2().sub2().int_const();
        let c = rhs.int_const().unwrap();
        if let (Some(a), Some(b)) = (a, b) {
            if c != 0 && a % c == 0 && b % c == 0 {
                let (xa, yb) = lhs.into_operands();
                let (x, _) = xa.into_operands();
                let (y, _) = yb.into_operands();
                *ch = true;
                return Exp::binary(
                    Oper::Plus,
                    Exp::binary(Oper::Mult, x, Exp::int(a / c)),
                    Exp::binary(Oper::Mult, y, Exp::int(b / c)),
                );
            }
        }
    }

    // ((x * a) + (y * b)) % c: drop the terms that divide evenly.
    if op == Oper::Mod
        && lhs.op() == Oper::Plus
        && rhs.is_int_const()
        && lhs.sub1().op() == Oper::Mult
        && lhs.sub2().op() == Oper::Mult
    {
        let a = lhs.sub1().sub2().int_const();
        let b = lhs.sub2().sub2().int_const();
        let c = rhs.int_const().unwrap();
        if let (Some(a), Some(b)) = (a, b) {
            if c != 0 {
                if a % c == 0 && b % c == 0 {
                    *ch = true;
                    return Exp::int(0);
                }
                if a % c == 0 {
                    *ch = true;
                    return Exp::binary(Oper::Mod, lhs.into_sub2(), rhs);
                }
                if b % c == 0 {
                    *ch = true;
                    return Exp::binary(Oper::Mod, lhs.into_sub1(), rhs);
                }
            }
        }
    }

    // (0 - (0 <u x)) & y is a carry-mask idiom; the mask is all-ones
    // exactly when it matters, so it reduces to y.
    if op == Oper::BitAnd
        && lhs.op() == Oper::Minus
        && lhs.sub1().int_const() == Some(0)
        && lhs.sub2().op() == Oper::LessUns
        && lhs.sub2().sub1().int_const() == Some(0)
    {
        *ch = true;
        return rhs;
    }

    // size(n, loc) becomes loc.
    if op == Oper::Size && rhs.is_location() {
        *ch = true;
        return rhs;
    }

    Exp::binary(op, lhs, rhs)
}

/// Build the member-access chain reaching byte offset `n` inside compound
/// `c`, starting from `parent`. Walks nested compounds, array elements
/// and their compounds. Offsets that land part-way into a scalar or into
/// a pointed-to compound reject the rewrite.
fn access_member(parent: Exp, c: &CompoundType, n: u32) -> Option<Exp> {
    let bit = n * 8;
    let name = c.name_at_offset(bit)?;
    let t = c.type_at_offset(bit)?.clone();
    let r = c.offset_remainder(bit);
    if r % 8 != 0 {
        return None;
    }
    let mut res = Exp::binary(Oper::MemberAccess, parent, Exp::str_const(name));
    match t {
        Type::Compound(inner) => {
            res = access_member(res, &inner, r / 8)?;
        }
        Type::Pointer(pointee) if pointee.is_compound() => {
            if r != 0 {
                return None;
            }
        }
        Type::Array(a) => {
            let elem_bits = a.base.size();
            if elem_bits == 0 || elem_bits % 8 != 0 {
                return None;
            }
            let b = elem_bits / 8;
            res = Exp::binary(Oper::ArrayIndex, res, Exp::int(((r / 8) / b) as i32));
            if let Type::Compound(inner) = &*a.base {
                res = access_member(res, inner, (r / 8) % b)?;
            }
        }
        _ => {}
    }
    Some(res)
}

/// `exp + n` over a pointer-to-compound: the address of the member at
/// byte offset `n`, as `a[m[exp].member...]`. Offsets past the end or
/// landing on loader padding reject the rewrite.
fn offset_to_compound(parent: &Exp, c: &CompoundType, n: u32) -> Option<Exp> {
    if n * 8 >= c.size() {
        return None;
    }
    let name = c.name_at_offset(n * 8)?;
    if name == "pad" {
        return None;
    }
    let l = Exp::mem_of(parent.clone());
    Some(Exp::addr_of(access_member(l, c, n)?))
}

fn simp_ternary(
    op: Oper,
    fst: Exp,
    snd: Exp,
    trd: Exp,
    ctx: &dyn SimplifyCtx,
    ch: &mut bool,
) -> Exp {
    let fst = poly_simplify(fst, ctx, ch);
    let snd = poly_simplify(snd, ctx, ch);
    let mut trd = poly_simplify(trd, ctx, ch);

    // p ? 1 : 0 becomes p.
    if op == Oper::Tern && snd.int_const() == Some(1) && trd.int_const() == Some(0) {
        *ch = true;
        return fst;
    }

    // 1 ? x : y becomes x; 0 ? x : y becomes y.
    if op == Oper::Tern && fst.int_const() == Some(1) {
        *ch = true;
        return snd;
    }
    if op == Oper::Tern && fst.int_const() == Some(0) {
        *ch = true;
        return trd;
    }

    // Sign extension or zero fill of a constant is the constant.
    if matches!(op, Oper::SgnEx | Oper::ZFill) && trd.is_int_const() {
        *ch = true;
        return trd;
    }

    // fsize(a, b, itof(b, a, x)) is the itof.
    if op == Oper::FSize
        && trd.op() == Oper::Itof
        && fst == *trd.sub2()
        && snd == *trd.sub1()
    {
        *ch = true;
        return trd;
    }

    // fsize of a float constant is the constant.
    if op == Oper::FSize && trd.op() == Oper::FltConst {
        *ch = true;
        return trd;
    }

    // itof(32, 32, k) is a bit-cast to float.
    if op == Oper::Itof && snd.int_const() == Some(32) {
        if let Some(k) = trd.int_const() {
            *ch = true;
            return Exp::flt(f32::from_bits(k as u32) as f64);
        }
    }

    // fsize(from, to, m[const-addr]): the program image may hold a float
    // constant at that address.
    if op == Oper::FSize && trd.is_mem_of() && trd.sub1().is_int_const() {
        let addr = trd.sub1().as_const().unwrap().addr();
        if let Some(from) = fst.int_const() {
            if let Some(d) = ctx.float_at(addr, from) {
                debug!("replacing {} with float constant {}", trd, d);
                trd = Exp::flt(d);
                *ch = true;
                return Exp::ternary(op, fst, snd, trd);
            }
        }
    }

    // truncu(32, 16|8, k) and truncs alike mask to the low bits.
    if matches!(op, Oper::TruncU | Oper::TruncS) && trd.is_int_const() {
        let from = fst.int_const();
        let to = snd.int_const();
        if from == Some(32) {
            let val = trd.int_const().unwrap();
            let mask = match to {
                Some(16) => Some(0xffff),
                Some(8) => Some(0xff),
                _ => None,
            };
            if let Some(mask) = mask {
                *ch = true;
                return Exp::int(val & mask);
            }
        }
    }

    Exp::ternary(op, fst, snd, trd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxbow_types::Field;

    #[test]
    fn comparison_normalisation() {
        // (a = b) = 0 simplifies to a ~= b.
        let a = Exp::reg_of(8);
        let b = Exp::reg_of(9);
        let e = Exp::binary(
            Oper::Equals,
            Exp::binary(Oper::Equals, a.clone(), b.clone()),
            Exp::int(0),
        );
        assert_eq!(e.simplify(), Exp::binary(Oper::NotEqual, a, b));
    }

    #[test]
    fn shift_becomes_multiply() {
        // x << 3 becomes x * 8.
        let x = Exp::local("x", None);
        let e = Exp::binary(Oper::ShiftL, x.clone(), Exp::int(3));
        assert_eq!(e.simplify(), Exp::binary(Oper::Mult, x, Exp::int(8)));
    }

    #[test]
    fn shift_right_becomes_unsigned_divide() {
        let x = Exp::local("x", None);
        let e = Exp::binary(Oper::ShiftR, x.clone(), Exp::int(2));
        assert_eq!(e.simplify(), Exp::binary(Oper::Div, x, Exp::int(4)));
    }

    #[test]
    fn memof_addrof_cancel() {
        // m[a[m[x]]] simplifies to m[x].
        let mx = Exp::mem_of(Exp::reg_of(1));
        let e = Exp::mem_of(Exp::addr_of(mx.clone()));
        assert_eq!(e.simplify(), mx);
    }

    #[test]
    fn constant_folding() {
        let e = Exp::binary(Oper::Plus, Exp::int(30), Exp::int(12));
        assert_eq!(e.simplify(), Exp::int(42));
        let e = Exp::binary(Oper::ShiftL, Exp::int(1), Exp::int(40));
        assert_eq!(e.simplify(), Exp::int(0));
        let e = Exp::binary(Oper::ShiftRa, Exp::int(-8), Exp::int(1));
        assert_eq!(e.simplify(), Exp::int(-4));
        let e = Exp::binary(Oper::LessUns, Exp::int(-1), Exp::int(1));
        assert_eq!(e.simplify(), Exp::int(0));
        let e = Exp::binary(Oper::Div, Exp::int(7), Exp::int(0));
        // Division by zero does not fold and does not fault.
        assert_eq!(e.clone().simplify(), e);
    }

    #[test]
    fn self_inverse() {
        let x = Exp::reg_of(8);
        assert_eq!(
            Exp::binary(Oper::BitXor, x.clone(), x.clone()).simplify(),
            Exp::int(0)
        );
        assert_eq!(
            Exp::binary(Oper::Minus, x.clone(), x.clone()).simplify(),
            Exp::int(0)
        );
        assert_eq!(
            Exp::binary(Oper::BitOr, x.clone(), x.clone()).simplify(),
            x
        );
        assert_eq!(
            Exp::binary(Oper::Equals, x.clone(), x.clone()).simplify(),
            Exp::terminal(Oper::True)
        );
    }

    #[test]
    fn commutation_is_not_a_modification() {
        // 3 + x canonicalises to x + 3 and the loop still terminates.
        let x = Exp::local("x", None);
        let e = Exp::binary(Oper::Plus, Exp::int(3), x.clone());
        assert_eq!(e.simplify(), Exp::binary(Oper::Plus, x, Exp::int(3)));
    }

    #[test]
    fn add_negative_becomes_subtract() {
        let x = Exp::local("x", None);
        let e = Exp::binary(Oper::Plus, x.clone(), Exp::int(-4));
        assert_eq!(e.simplify(), Exp::binary(Oper::Minus, x, Exp::int(4)));
    }

    #[test]
    fn nested_constant_chains() {
        // (x + 5) + 3 becomes x + 8.
        let x = Exp::local("x", None);
        let e = Exp::binary(
            Oper::Plus,
            Exp::binary(Oper::Plus, x.clone(), Exp::int(5)),
            Exp::int(3),
        );
        assert_eq!(e.simplify(), Exp::binary(Oper::Plus, x.clone(), Exp::int(8)));

        // (x - 5) + 3 becomes x - 2.
        let e = Exp::binary(
            Oper::Plus,
            Exp::binary(Oper::Minus, x.clone(), Exp::int(5)),
            Exp::int(3),
        );
        assert_eq!(e.simplify(), Exp::binary(Oper::Minus, x, Exp::int(2)));
    }

    #[test]
    fn identities_and_absorbers() {
        let x = Exp::local("x", None);
        assert_eq!(
            Exp::binary(Oper::Plus, x.clone(), Exp::int(0)).simplify(),
            x
        );
        assert_eq!(
            Exp::binary(Oper::Mult, x.clone(), Exp::int(1)).simplify(),
            x
        );
        assert_eq!(
            Exp::binary(Oper::Mult, x.clone(), Exp::int(0)).simplify(),
            Exp::int(0)
        );
        assert_eq!(
            Exp::binary(Oper::BitAnd, x.clone(), Exp::int(-1)).simplify(),
            x
        );
        assert_eq!(
            Exp::binary(Oper::Mod, x.clone(), Exp::int(1)).simplify(),
            Exp::int(0)
        );
        assert_eq!(
            Exp::binary(Oper::And, x.clone(), Exp::terminal(Oper::True)).simplify(),
            x
        );
        assert_eq!(
            Exp::binary(Oper::Or, x.clone(), Exp::terminal(Oper::True)).simplify(),
            Exp::terminal(Oper::True)
        );
        assert_eq!(
            Exp::binary(Oper::Or, x.clone(), Exp::terminal(Oper::False)).simplify(),
            x
        );
    }

    #[test]
    fn mul_div_cancel() {
        let x = Exp::local("x", None);
        let y = Exp::local("y", None);
        let e = Exp::binary(
            Oper::Div,
            Exp::binary(Oper::Mult, x.clone(), y.clone()),
            y.clone(),
        );
        assert_eq!(e.simplify(), x.clone());
        let e = Exp::binary(
            Oper::Mod,
            Exp::binary(Oper::Mult, x, y.clone()),
            y,
        );
        assert_eq!(e.simplify(), Exp::int(0));
    }

    #[test]
    fn not_pushdown() {
        let a = Exp::reg_of(1);
        let b = Exp::reg_of(2);
        let e = Exp::unary(Oper::LNot, Exp::binary(Oper::Less, a.clone(), b.clone()));
        assert_eq!(e.simplify(), Exp::binary(Oper::GtrEq, a.clone(), b.clone()));
        let e = Exp::unary(Oper::Not, Exp::binary(Oper::LessEqUns, a.clone(), b.clone()));
        assert_eq!(e.simplify(), Exp::binary(Oper::GtrUns, a, b));
    }

    #[test]
    fn double_negation() {
        let x = Exp::reg_of(3);
        assert_eq!(Exp::unary(Oper::Neg, Exp::unary(Oper::Neg, x.clone())).simplify(), x);
        assert_eq!(Exp::unary(Oper::Neg, Exp::int(5)).simplify(), Exp::int(-5));
        assert_eq!(Exp::unary(Oper::LNot, Exp::int(0)).simplify(), Exp::int(1));
        assert_eq!(Exp::unary(Oper::Not, Exp::int(0)).simplify(), Exp::int(-1));
    }

    #[test]
    fn comparison_or_absorption() {
        let x = Exp::reg_of(1);
        let y = Exp::reg_of(2);
        let le = Exp::binary(Oper::LessEq, x.clone(), y.clone());
        let eq_crossed = Exp::binary(Oper::Equals, y, x);
        let e = Exp::binary(Oper::Or, le.clone(), eq_crossed);
        assert_eq!(e.simplify(), le);
    }

    #[test]
    fn carry_mask_idiom() {
        // (0 - (0 <u x)) & y reduces to y.
        let x = Exp::reg_of(1);
        let y = Exp::reg_of(2);
        let e = Exp::binary(
            Oper::BitAnd,
            Exp::binary(
                Oper::Minus,
                Exp::int(0),
                Exp::binary(Oper::LessUns, Exp::int(0), x),
            ),
            y.clone(),
        );
        assert_eq!(e.simplify(), y);
    }

    #[test]
    fn ternary_rules() {
        let p = Exp::binary(Oper::Less, Exp::reg_of(1), Exp::reg_of(2));
        let e = Exp::ternary(Oper::Tern, p.clone(), Exp::int(1), Exp::int(0));
        assert_eq!(e.simplify(), p);

        let x = Exp::reg_of(1);
        let y = Exp::reg_of(2);
        assert_eq!(
            Exp::ternary(Oper::Tern, Exp::int(1), x.clone(), y.clone()).simplify(),
            x.clone()
        );
        assert_eq!(
            Exp::ternary(Oper::Tern, Exp::int(0), x.clone(), y.clone()).simplify(),
            y
        );
        assert_eq!(
            Exp::ternary(Oper::SgnEx, Exp::int(16), Exp::int(32), Exp::int(7)).simplify(),
            Exp::int(7)
        );
        assert_eq!(
            Exp::ternary(Oper::TruncU, Exp::int(32), Exp::int(16), Exp::int(0x12345)).simplify(),
            Exp::int(0x2345)
        );
        assert_eq!(
            Exp::ternary(Oper::TruncS, Exp::int(32), Exp::int(8), Exp::int(0x1ff)).simplify(),
            Exp::int(0xff)
        );
    }

    #[test]
    fn itof_bitcast() {
        let one = f32::to_bits(1.0) as i32;
        let e = Exp::ternary(Oper::Itof, Exp::int(32), Exp::int(32), Exp::int(one));
        assert_eq!(e.simplify(), Exp::flt(1.0));
    }

    #[test]
    fn fsize_of_itof_cancels() {
        let x = Exp::reg_of(1);
        let itof = Exp::ternary(Oper::Itof, Exp::int(64), Exp::int(32), x);
        let e = Exp::ternary(Oper::FSize, Exp::int(32), Exp::int(64), itof.clone());
        assert_eq!(e.simplify(), itof);
    }

    #[test]
    fn typed_regof_unwraps() {
        let e = Exp::typed(Type::int(32), Exp::reg_of(24));
        assert_eq!(e.simplify(), Exp::reg_of(24));
    }

    #[test]
    fn df_on_entry_is_zero() {
        let e = Exp::subscripted(Exp::terminal(Oper::DF), Def::Implicit);
        assert_eq!(e.simplify(), Exp::int(0));
        // But a defined DF stays.
        let defined = Exp::subscripted(Exp::terminal(Oper::DF), Def::Stmt(4));
        assert_eq!(defined.clone().simplify(), defined);
    }

    #[test]
    fn pentium_ax_alias() {
        use crate::simplify::{ArchRules, PentiumRules, SimplifyCtx};

        struct Ctx;
        impl SimplifyCtx for Ctx {
            fn def_lhs(&self, def: Def) -> Option<Exp> {
                (def == Def::Stmt(3)).then(|| Exp::reg_of(24))
            }
            fn arch(&self) -> Option<&dyn ArchRules> {
                Some(&PentiumRules)
            }
        }

        let e = Exp::subscripted(Exp::reg_of(0), Def::Stmt(3));
        let got = e.simplify_with(&Ctx);
        assert_eq!(
            got,
            Exp::typed(
                Type::int(16),
                Exp::subscripted(Exp::reg_of(24), Def::Stmt(3))
            )
        );

        // Without the arch hook nothing happens.
        let e = Exp::subscripted(Exp::reg_of(0), Def::Stmt(3));
        assert_eq!(e.clone().simplify(), e);
    }

    #[test]
    fn compound_offset_rewrite() {
        use crate::simplify::SimplifyCtx;

        // struct { int x; int y; } *p
        let point = CompoundType::new(vec![
            Field {
                ty: Type::int(32),
                name: "x".into(),
            },
            Field {
                ty: Type::int(32),
                name: "y".into(),
            },
        ]);
        struct Ctx(CompoundType);
        impl SimplifyCtx for Ctx {
            fn def_type(&self, _def: Def, _base: &Exp) -> Option<Type> {
                Some(Type::pointer(Type::Compound(self.0.clone())))
            }
        }

        let p = Exp::subscripted(Exp::reg_of(8), Def::Stmt(1));
        let e = Exp::binary(Oper::Plus, p.clone(), Exp::int(4));
        let got = e.simplify_with(&Ctx(point.clone()));
        let want = Exp::addr_of(Exp::binary(
            Oper::MemberAccess,
            Exp::mem_of(p.clone()),
            Exp::str_const("y"),
        ));
        assert_eq!(got, want);

        // Offsets past the end reject the rewrite.
        let e = Exp::binary(Oper::Plus, p, Exp::int(64));
        let unchanged = e.clone().simplify_with(&Ctx(point));
        assert_eq!(unchanged, e);
    }

    #[test]
    fn mult_chain_strength_reduction() {
        let x = Exp::local("x", None);
        // x + x*3 becomes x*4 (inner fold runs on the next pass).
        let e = Exp::binary(
            Oper::Plus,
            x.clone(),
            Exp::binary(Oper::Mult, x.clone(), Exp::int(3)),
        );
        assert_eq!(e.simplify(), Exp::binary(Oper::Mult, x.clone(), Exp::int(4)));

        // (x*3) - x becomes x*2.
        let e = Exp::binary(
            Oper::Minus,
            Exp::binary(Oper::Mult, x.clone(), Exp::int(3)),
            x.clone(),
        );
        assert_eq!(e.simplify(), Exp::binary(Oper::Mult, x.clone(), Exp::int(2)));

        // (x*2)*6 becomes x*12.
        let e = Exp::binary(
            Oper::Mult,
            Exp::binary(Oper::Mult, x.clone(), Exp::int(2)),
            Exp::int(6),
        );
        assert_eq!(e.simplify(), Exp::binary(Oper::Mult, x, Exp::int(12)));
    }

    #[test]
    fn divisibility_rules() {
        let x = Exp::local("x", None);
        let y = Exp::local("y", None);
        let sum = Exp::binary(
            Oper::Plus,
            Exp::binary(Oper::Mult, x.clone(), Exp::int(8)),
            Exp::binary(Oper::Mult, y.clone(), Exp::int(4)),
        );
        let e = Exp::binary(Oper::Div, sum.clone(), Exp::int(4));
        assert_eq!(
            e.simplify(),
            Exp::binary(
                Oper::Plus,
                Exp::binary(Oper::Mult, x.clone(), Exp::int(2)),
                y.clone()
            )
        );
        let e = Exp::binary(Oper::Mod, sum, Exp::int(4));
        assert_eq!(e.simplify(), Exp::int(0));
    }

    #[test]
    fn simplification_is_idempotent() {
        let x = Exp::local("x", None);
        let cases = vec![
            Exp::binary(
                Oper::Plus,
                Exp::binary(Oper::ShiftL, x.clone(), Exp::int(2)),
                Exp::int(0),
            ),
            Exp::binary(Oper::Plus, Exp::int(3), x.clone()),
            Exp::binary(Oper::Plus, x.clone(), Exp::int(i32::MIN)),
            Exp::unary(Oper::LNot, Exp::binary(Oper::Equals, x.clone(), Exp::int(0))),
        ];
        for e in cases {
            let once = e.simplify();
            let twice = once.clone().simplify();
            assert_eq!(once, twice);
        }
    }
}
