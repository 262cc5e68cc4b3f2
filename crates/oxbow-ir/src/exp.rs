//! Expression nodes.
//!
//! An expression is a tree of tagged nodes: constants, terminals, unary /
//! binary / ternary operators, a typed wrapper, an SSA subscript, a type
//! value, and locations (registers, memory, locals, globals, parameters,
//! temporaries) which carry a back-reference to their enclosing procedure.
//!
//! Shape invariants are enforced by the constructors: a unary-family tag
//! always has exactly one child, binary two, ternary three, and no child is
//! ever absent in a constructed node. `reg-of` and the other location tags
//! are only ever built as [`Exp::Location`] nodes. Violations are
//! programming errors and panic.

use crate::oper::{Arity, Oper};
use oxbow_types::Type;

/// Opaque identifier of a statement, assigned by the SSA builder.
pub type StmtId = u32;

/// Opaque identifier of a procedure, assigned by the program database.
pub type ProcId = u32;

/// The defining statement recorded in an SSA subscript.
///
/// This is a non-owning reference: statements live in the procedure's
/// statement list, outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Def {
    /// No definition recorded: the value on entry to the procedure.
    /// Printed as `{-}`.
    #[default]
    Implicit,
    /// Wildcard definition, used in search patterns. Matches any def.
    Wild,
    /// Defined by the numbered statement.
    Stmt(StmtId),
    /// Defined by the numbered statement, which is an implicit assignment.
    /// Equality treats this like [`Def::Implicit`].
    ImplicitStmt(StmtId),
}

impl Def {
    /// True when the definition is implicit: either unrecorded, or an
    /// implicit assignment statement.
    pub fn is_implicit(self) -> bool {
        matches!(self, Def::Implicit | Def::ImplicitStmt(_))
    }

    /// The statement number, if any.
    pub fn stmt(self) -> Option<StmtId> {
        match self {
            Def::Stmt(n) | Def::ImplicitStmt(n) => Some(n),
            _ => None,
        }
    }
}

/// Payload of a constant node. The payload determines the node's tag.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i32),
    Long(i64),
    Flt(f64),
    Str(String),
    /// A procedure constant, by name.
    Func(String),
}

/// A constant node: payload, optional conscript, resolved type.
///
/// The conscript is a small non-zero number attached during type analysis
/// to tell otherwise-identical literals apart.
#[derive(Debug, Clone)]
pub struct Const {
    pub value: Value,
    pub conscript: u32,
    pub ty: Type,
}

impl Const {
    pub fn new(value: Value) -> Const {
        Const {
            value,
            conscript: 0,
            ty: Type::Void,
        }
    }

    /// Tag implied by the payload.
    pub fn op(&self) -> Oper {
        match self.value {
            Value::Int(_) => Oper::IntConst,
            Value::Long(_) => Oper::LongConst,
            Value::Flt(_) => Oper::FltConst,
            Value::Str(_) => Oper::StrConst,
            Value::Func(_) => Oper::FuncConst,
        }
    }

    pub fn int(&self) -> i32 {
        match self.value {
            Value::Int(i) => i,
            _ => panic!("Const::int on {}", self.op().name()),
        }
    }

    /// The integer payload reinterpreted as a source address.
    pub fn addr(&self) -> u64 {
        self.int() as u32 as u64
    }

    pub fn set_int(&mut self, i: i32) {
        self.value = Value::Int(i);
    }

    pub fn flt(&self) -> f64 {
        match self.value {
            Value::Flt(d) => d,
            _ => panic!("Const::flt on {}", self.op().name()),
        }
    }

    pub fn str(&self) -> &str {
        match &self.value {
            Value::Str(s) => s,
            _ => panic!("Const::str on {}", self.op().name()),
        }
    }
}

/// An expression tree node. Children are exclusively owned; sharing is
/// only ever achieved by cloning.
#[derive(Debug, Clone)]
pub enum Exp {
    Const(Const),
    Terminal(Oper),
    Unary {
        op: Oper,
        sub: Box<Exp>,
    },
    Binary {
        op: Oper,
        lhs: Box<Exp>,
        rhs: Box<Exp>,
    },
    Ternary {
        op: Oper,
        fst: Box<Exp>,
        snd: Box<Exp>,
        trd: Box<Exp>,
    },
    /// An expression wrapped with an explicit type.
    Typed {
        ty: Type,
        sub: Box<Exp>,
    },
    /// An SSA subscript: `sub{def}`.
    Ref {
        sub: Box<Exp>,
        def: Def,
    },
    /// A type used as a value, in constraint expressions.
    TypeVal(Type),
    /// A location: reg-of, mem-of, local, global, param or temp, with a
    /// non-owning back-reference to the enclosing procedure.
    Location {
        op: Oper,
        sub: Box<Exp>,
        proc: Option<ProcId>,
    },
}

impl Exp {
    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    pub fn int(i: i32) -> Exp {
        Exp::Const(Const::new(Value::Int(i)))
    }

    pub fn long(l: i64) -> Exp {
        Exp::Const(Const::new(Value::Long(l)))
    }

    pub fn flt(d: f64) -> Exp {
        Exp::Const(Const::new(Value::Flt(d)))
    }

    pub fn str_const(s: impl Into<String>) -> Exp {
        Exp::Const(Const::new(Value::Str(s.into())))
    }

    pub fn func_const(name: impl Into<String>) -> Exp {
        Exp::Const(Const::new(Value::Func(name.into())))
    }

    /// A source address, stored as an integer constant.
    pub fn addr_const(a: u64) -> Exp {
        Exp::int(a as u32 as i32)
    }

    pub fn terminal(op: Oper) -> Exp {
        debug_assert_eq!(op.arity(), Arity::Leaf, "terminal with {} tag", op.name());
        Exp::Terminal(op)
    }

    pub fn unary(op: Oper, sub: Exp) -> Exp {
        debug_assert_eq!(op.arity(), Arity::Unary, "unary with {} tag", op.name());
        debug_assert!(!op.is_location(), "{} must be built as a Location", op.name());
        Exp::Unary {
            op,
            sub: Box::new(sub),
        }
    }

    pub fn binary(op: Oper, lhs: Exp, rhs: Exp) -> Exp {
        debug_assert_eq!(op.arity(), Arity::Binary, "binary with {} tag", op.name());
        Exp::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn ternary(op: Oper, fst: Exp, snd: Exp, trd: Exp) -> Exp {
        debug_assert_eq!(op.arity(), Arity::Ternary, "ternary with {} tag", op.name());
        Exp::Ternary {
            op,
            fst: Box::new(fst),
            snd: Box::new(snd),
            trd: Box::new(trd),
        }
    }

    pub fn typed(ty: Type, sub: Exp) -> Exp {
        Exp::Typed {
            ty,
            sub: Box::new(sub),
        }
    }

    /// Wrap an expression in an SSA subscript.
    pub fn subscripted(sub: Exp, def: Def) -> Exp {
        Exp::Ref {
            sub: Box::new(sub),
            def,
        }
    }

    pub fn typeval(ty: Type) -> Exp {
        Exp::TypeVal(ty)
    }

    fn location(op: Oper, sub: Exp, proc: Option<ProcId>) -> Exp {
        debug_assert!(op.is_location(), "location with {} tag", op.name());
        Exp::Location {
            op,
            sub: Box::new(sub),
            proc,
        }
    }

    /// `r<k>` for a numbered register.
    pub fn reg_of(k: i32) -> Exp {
        Exp::location(Oper::RegOf, Exp::int(k), None)
    }

    /// `r[e]` for a computed register number.
    pub fn reg_of_exp(e: Exp) -> Exp {
        Exp::location(Oper::RegOf, e, None)
    }

    pub fn mem_of(e: Exp) -> Exp {
        Exp::location(Oper::MemOf, e, None)
    }

    pub fn addr_of(e: Exp) -> Exp {
        Exp::unary(Oper::AddrOf, e)
    }

    pub fn temp(name: impl Into<String>) -> Exp {
        Exp::location(Oper::Temp, Exp::str_const(name), None)
    }

    pub fn local(name: impl Into<String>, proc: Option<ProcId>) -> Exp {
        Exp::location(Oper::Local, Exp::str_const(name), proc)
    }

    pub fn global(name: impl Into<String>) -> Exp {
        Exp::location(Oper::Global, Exp::str_const(name), None)
    }

    pub fn param(name: impl Into<String>, proc: Option<ProcId>) -> Exp {
        Exp::location(Oper::Param, Exp::str_const(name), proc)
    }

    /// `v[i]`, a numbered variable from the lifter.
    pub fn var(i: i32) -> Exp {
        Exp::unary(Oper::Var, Exp::int(i))
    }

    // ------------------------------------------------------------------
    // Shape access
    // ------------------------------------------------------------------

    /// This node's operator tag.
    pub fn op(&self) -> Oper {
        match self {
            Exp::Const(c) => c.op(),
            Exp::Terminal(op) => *op,
            Exp::Unary { op, .. } => *op,
            Exp::Binary { op, .. } => *op,
            Exp::Ternary { op, .. } => *op,
            Exp::Typed { .. } => Oper::TypedExp,
            Exp::Ref { .. } => Oper::Subscript,
            Exp::TypeVal(_) => Oper::TypeVal,
            Exp::Location { op, .. } => *op,
        }
    }

    /// First child. Panics on leaf nodes.
    pub fn sub1(&self) -> &Exp {
        match self {
            Exp::Unary { sub, .. }
            | Exp::Typed { sub, .. }
            | Exp::Ref { sub, .. }
            | Exp::Location { sub, .. } => sub,
            Exp::Binary { lhs, .. } => lhs,
            Exp::Ternary { fst, .. } => fst,
            _ => panic!("sub1 on {}", self.op().name()),
        }
    }

    pub fn sub1_mut(&mut self) -> &mut Exp {
        match self {
            Exp::Unary { sub, .. }
            | Exp::Typed { sub, .. }
            | Exp::Ref { sub, .. }
            | Exp::Location { sub, .. } => sub,
            Exp::Binary { lhs, .. } => lhs,
            Exp::Ternary { fst, .. } => fst,
            _ => panic!("sub1_mut on {}", self.op().name()),
        }
    }

    /// Second child. Panics unless binary- or ternary-shaped.
    pub fn sub2(&self) -> &Exp {
        match self {
            Exp::Binary { rhs, .. } => rhs,
            Exp::Ternary { snd, .. } => snd,
            _ => panic!("sub2 on {}", self.op().name()),
        }
    }

    pub fn sub2_mut(&mut self) -> &mut Exp {
        match self {
            Exp::Binary { rhs, .. } => rhs,
            Exp::Ternary { snd, .. } => snd,
            _ => panic!("sub2_mut on {}", self.op().name()),
        }
    }

    /// Third child. Panics unless ternary-shaped.
    pub fn sub3(&self) -> &Exp {
        match self {
            Exp::Ternary { trd, .. } => trd,
            _ => panic!("sub3 on {}", self.op().name()),
        }
    }

    pub fn sub3_mut(&mut self) -> &mut Exp {
        match self {
            Exp::Ternary { trd, .. } => trd,
            _ => panic!("sub3_mut on {}", self.op().name()),
        }
    }

    pub fn set_sub1(&mut self, e: Exp) {
        *self.sub1_mut() = e;
    }

    pub fn set_sub2(&mut self, e: Exp) {
        *self.sub2_mut() = e;
    }

    pub fn set_sub3(&mut self, e: Exp) {
        *self.sub3_mut() = e;
    }

    /// Consume the node and return its first child.
    pub fn into_sub1(self) -> Exp {
        match self {
            Exp::Unary { sub, .. }
            | Exp::Typed { sub, .. }
            | Exp::Ref { sub, .. }
            | Exp::Location { sub, .. } => *sub,
            Exp::Binary { lhs, .. } => *lhs,
            Exp::Ternary { fst, .. } => *fst,
            other => panic!("into_sub1 on {}", other.op().name()),
        }
    }

    /// Consume the node and return its second child.
    pub fn into_sub2(self) -> Exp {
        match self {
            Exp::Binary { rhs, .. } => *rhs,
            Exp::Ternary { snd, .. } => *snd,
            other => panic!("into_sub2 on {}", other.op().name()),
        }
    }

    /// Consume the node and return its third child.
    pub fn into_sub3(self) -> Exp {
        match self {
            Exp::Ternary { trd, .. } => *trd,
            other => panic!("into_sub3 on {}", other.op().name()),
        }
    }

    /// Consume a binary node and return both children.
    pub fn into_operands(self) -> (Exp, Exp) {
        match self {
            Exp::Binary { lhs, rhs, .. } => (*lhs, *rhs),
            other => panic!("into_operands on {}", other.op().name()),
        }
    }

    /// Swap the two children of a binary node. The tag never changes.
    pub fn commute(&mut self) {
        match self {
            Exp::Binary { lhs, rhs, .. } => std::mem::swap(lhs, rhs),
            other => panic!("commute on {}", other.op().name()),
        }
    }

    /// Retag a node in place, within the same shape family.
    pub fn set_op(&mut self, new_op: Oper) {
        match self {
            Exp::Terminal(op) => *op = new_op,
            Exp::Unary { op, .. } => {
                debug_assert_eq!(new_op.arity(), Arity::Unary);
                *op = new_op;
            }
            Exp::Binary { op, .. } => {
                debug_assert_eq!(new_op.arity(), Arity::Binary);
                *op = new_op;
            }
            Exp::Ternary { op, .. } => {
                debug_assert_eq!(new_op.arity(), Arity::Ternary);
                *op = new_op;
            }
            Exp::Location { op, .. } => {
                debug_assert!(new_op.is_location());
                *op = new_op;
            }
            other => panic!("set_op on {}", other.op().name()),
        }
    }

    // ------------------------------------------------------------------
    // Predicates and accessors
    // ------------------------------------------------------------------

    pub fn is_int_const(&self) -> bool {
        self.op() == Oper::IntConst
    }

    pub fn is_flt_const(&self) -> bool {
        self.op() == Oper::FltConst
    }

    pub fn is_str_const(&self) -> bool {
        self.op() == Oper::StrConst
    }

    pub fn is_bool_const(&self) -> bool {
        matches!(self.op(), Oper::True | Oper::False)
    }

    pub fn is_true(&self) -> bool {
        self.op() == Oper::True
    }

    pub fn is_false(&self) -> bool {
        self.op() == Oper::False
    }

    pub fn is_nil(&self) -> bool {
        self.op() == Oper::Nil
    }

    pub fn is_wild(&self) -> bool {
        self.op() == Oper::Wild
    }

    pub fn is_reg_of(&self) -> bool {
        self.op() == Oper::RegOf
    }

    /// True for `r[k]` with a constant register number.
    pub fn is_reg_of_k(&self) -> bool {
        self.is_reg_of() && self.sub1().is_int_const()
    }

    /// True for `r[n]` with the given register number.
    pub fn is_reg_n(&self, n: i32) -> bool {
        self.is_reg_of() && self.sub1().int_const() == Some(n)
    }

    pub fn is_mem_of(&self) -> bool {
        self.op() == Oper::MemOf
    }

    pub fn is_addr_of(&self) -> bool {
        self.op() == Oper::AddrOf
    }

    pub fn is_subscript(&self) -> bool {
        matches!(self, Exp::Ref { .. })
    }

    pub fn is_typeval(&self) -> bool {
        matches!(self, Exp::TypeVal(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Exp::Terminal(_))
    }

    pub fn is_location(&self) -> bool {
        matches!(self, Exp::Location { .. })
    }

    pub fn is_global(&self) -> bool {
        self.op() == Oper::Global
    }

    /// True for a temporary: `tmp...` or the legacy `r[tmp]` shape.
    pub fn is_temp(&self) -> bool {
        match self.op() {
            Oper::Temp => true,
            Oper::RegOf => self.sub1().op() == Oper::Temp,
            _ => false,
        }
    }

    /// Recognise the abstract-frame-pointer family: `%afp`, `%afp ± k`,
    /// or `a[m[...]]` around either, possibly under a typed wrapper.
    pub fn is_afp_term(&self) -> bool {
        let mut cur = self;
        if let Exp::Typed { sub, .. } = cur {
            cur = sub;
        }
        if cur.op() == Oper::AddrOf && cur.sub1().op() == Oper::MemOf {
            cur = cur.sub1().sub1();
        }
        match cur.op() {
            Oper::Afp => true,
            Oper::Plus | Oper::Minus => {
                cur.sub1().op() == Oper::Afp && cur.sub2().op() == Oper::IntConst
            }
            _ => false,
        }
    }

    /// Integer payload of a constant node, if this is one.
    pub fn int_const(&self) -> Option<i32> {
        match self {
            Exp::Const(c) => match c.value {
                Value::Int(i) => Some(i),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn flt_const(&self) -> Option<f64> {
        match self {
            Exp::Const(c) => match c.value {
                Value::Flt(d) => Some(d),
                _ => None,
            },
            _ => None,
        }
    }

    /// The constant payload if this node is a constant.
    pub fn as_const(&self) -> Option<&Const> {
        match self {
            Exp::Const(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_const_mut(&mut self) -> Option<&mut Const> {
        match self {
            Exp::Const(c) => Some(c),
            _ => None,
        }
    }

    /// The subscript's definition, if this is a subscript.
    pub fn def(&self) -> Option<Def> {
        match self {
            Exp::Ref { def, .. } => Some(*def),
            _ => None,
        }
    }

    /// Strip one `addr-of`, an optional subscript and an optional `mem-of`,
    /// and return the string constant underneath, if any.
    pub fn get_any_str_const(&self) -> Option<&str> {
        let mut e = self;
        if e.op() == Oper::AddrOf {
            e = e.sub1();
            if e.is_subscript() {
                e = e.sub1();
            }
            if e.op() == Oper::MemOf {
                e = e.sub1();
            }
        }
        match e {
            Exp::Const(c) => match &c.value {
                Value::Str(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    /// The index of a `v[i]` node. Panics if not a var.
    pub fn get_var_index(&self) -> i32 {
        assert_eq!(self.op(), Oper::Var, "get_var_index on {}", self.op().name());
        self.sub1()
            .int_const()
            .expect("var index must be an integer constant")
    }

    /// The guard expression, if this node is a guard.
    pub fn get_guard(&self) -> Option<&Exp> {
        if self.op() == Oper::Guard {
            Some(self.sub1())
        } else {
            None
        }
    }

    /// The name of a procedure constant. Panics if not one.
    pub fn get_func_name(&self) -> &str {
        match self {
            Exp::Const(Const {
                value: Value::Func(name),
                ..
            }) => name,
            other => panic!("get_func_name on {}", other.op().name()),
        }
    }

    /// Number the constants in this expression for type analysis, starting
    /// from `n`; returns the next free conscript. With `clear`, zero them
    /// instead.
    pub fn set_conscripts(&mut self, n: u32, clear: bool) -> u32 {
        let mut setter = crate::visit::ConscriptSetter::new(n, clear);
        setter.run(self)
    }

    /// Set the enclosing procedure on every location subexpression that
    /// does not have one yet.
    pub fn fix_location_proc(&mut self, proc: ProcId) {
        fn walk(e: &mut Exp, proc: ProcId) {
            if let Exp::Location { proc: p, .. } = e {
                if p.is_none() {
                    *p = Some(proc);
                }
            }
            for i in 0..e.child_count() {
                walk(e.child_mut(i), proc);
            }
        }
        walk(self, proc)
    }

    // ------------------------------------------------------------------
    // Uniform child iteration, used by traversals
    // ------------------------------------------------------------------

    /// Number of children of this node.
    pub fn child_count(&self) -> usize {
        match self {
            Exp::Const(_) | Exp::Terminal(_) | Exp::TypeVal(_) => 0,
            Exp::Unary { .. } | Exp::Typed { .. } | Exp::Ref { .. } | Exp::Location { .. } => 1,
            Exp::Binary { .. } => 2,
            Exp::Ternary { .. } => 3,
        }
    }

    /// Child by index; panics when out of range.
    pub fn child(&self, i: usize) -> &Exp {
        match (self, i) {
            (Exp::Unary { sub, .. }, 0)
            | (Exp::Typed { sub, .. }, 0)
            | (Exp::Ref { sub, .. }, 0)
            | (Exp::Location { sub, .. }, 0) => sub,
            (Exp::Binary { lhs, .. }, 0) => lhs,
            (Exp::Binary { rhs, .. }, 1) => rhs,
            (Exp::Ternary { fst, .. }, 0) => fst,
            (Exp::Ternary { snd, .. }, 1) => snd,
            (Exp::Ternary { trd, .. }, 2) => trd,
            _ => panic!("child {} on {}", i, self.op().name()),
        }
    }

    /// Mutable child by index; panics when out of range.
    pub fn child_mut(&mut self, i: usize) -> &mut Exp {
        match (self, i) {
            (Exp::Unary { sub, .. }, 0)
            | (Exp::Typed { sub, .. }, 0)
            | (Exp::Ref { sub, .. }, 0)
            | (Exp::Location { sub, .. }, 0) => sub,
            (Exp::Binary { lhs, .. }, 0) => lhs,
            (Exp::Binary { rhs, .. }, 1) => rhs,
            (Exp::Ternary { fst, .. }, 0) => fst,
            (Exp::Ternary { snd, .. }, 1) => snd,
            (Exp::Ternary { trd, .. }, 2) => trd,
            (e, i) => panic!("child_mut {} on {}", i, e.op().name()),
        }
    }
}

// ----------------------------------------------------------------------
// Equality
// ----------------------------------------------------------------------

/// True when `other`'s tag is a family wildcard matching `op`.
fn family_wildcard_matches(wild: Oper, op: Oper) -> bool {
    matches!(
        (wild, op),
        (Oper::WildIntConst, Oper::IntConst)
            | (Oper::WildStrConst, Oper::StrConst)
            | (Oper::WildRegOf, Oper::RegOf)
            | (Oper::WildMemOf, Oper::MemOf)
            | (Oper::WildAddrOf, Oper::AddrOf)
    )
}

fn def_eq(a: Def, b: Def) -> bool {
    if a == Def::Wild || b == Def::Wild {
        return true;
    }
    if a == Def::Implicit && b.is_implicit() {
        return true;
    }
    if b == Def::Implicit && a.is_implicit() {
        return true;
    }
    a == b
}

/// Strict structural equality, with wildcard awareness on either side.
impl PartialEq for Exp {
    fn eq(&self, other: &Exp) -> bool {
        let (a, b) = (self.op(), other.op());
        if a == Oper::Wild || b == Oper::Wild {
            return true;
        }
        if family_wildcard_matches(a, b) || family_wildcard_matches(b, a) {
            return true;
        }
        if a != b {
            return false;
        }
        match (self, other) {
            (Exp::Const(x), Exp::Const(y)) => {
                if x.conscript != y.conscript {
                    return false;
                }
                match (&x.value, &y.value) {
                    (Value::Int(i), Value::Int(j)) => i == j,
                    (Value::Long(i), Value::Long(j)) => i == j,
                    (Value::Flt(d), Value::Flt(e)) => d.to_bits() == e.to_bits(),
                    (Value::Str(s), Value::Str(t)) => s == t,
                    (Value::Func(s), Value::Func(t)) => s == t,
                    _ => false,
                }
            }
            (Exp::Terminal(_), Exp::Terminal(_)) => true,
            (Exp::Typed { ty: t1, sub: s1 }, Exp::Typed { ty: t2, sub: s2 }) => {
                t1 == t2 && s1 == s2
            }
            (Exp::Ref { sub: s1, def: d1 }, Exp::Ref { sub: s2, def: d2 }) => {
                s1 == s2 && def_eq(*d1, *d2)
            }
            (Exp::TypeVal(t1), Exp::TypeVal(t2)) => t1 == t2,
            _ => {
                // Same tag, same arity; locations compare like unaries,
                // ignoring the proc back-reference.
                (0..self.child_count()).all(|i| self.child(i) == other.child(i))
            }
        }
    }
}

impl Eq for Exp {}

// ----------------------------------------------------------------------
// Ordering
// ----------------------------------------------------------------------

use std::cmp::Ordering;

fn value_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(i), Value::Int(j)) => i.cmp(j),
        (Value::Long(i), Value::Long(j)) => i.cmp(j),
        (Value::Flt(d), Value::Flt(e)) => d.total_cmp(e),
        (Value::Str(s), Value::Str(t)) => s.cmp(t),
        (Value::Func(s), Value::Func(t)) => s.cmp(t),
        // Unreachable for same-tag constants; keep total anyway.
        _ => Ordering::Equal,
    }
}

fn def_cmp(a: Def, b: Def) -> Ordering {
    // A wildcard def is "not less than anything" so that it stays put in
    // sorted containers.
    if a == Def::Wild || b == Def::Wild {
        return Ordering::Equal;
    }
    a.cmp(&b)
}

impl Exp {
    fn cmp_impl(&self, other: &Exp, type_sensitive: bool) -> Ordering {
        let ord = self.op().cmp(&other.op());
        if ord != Ordering::Equal {
            return ord;
        }
        match (self, other) {
            (Exp::Const(x), Exp::Const(y)) => x
                .conscript
                .cmp(&y.conscript)
                .then_with(|| value_cmp(&x.value, &y.value)),
            (Exp::Terminal(_), Exp::Terminal(_)) => Ordering::Equal,
            (Exp::Typed { ty: t1, sub: s1 }, Exp::Typed { ty: t2, sub: s2 }) => {
                if type_sensitive {
                    t1.cmp(t2).then_with(|| s1.cmp_impl(s2, type_sensitive))
                } else {
                    s1.cmp_impl(s2, type_sensitive)
                }
            }
            (Exp::Ref { sub: s1, def: d1 }, Exp::Ref { sub: s2, def: d2 }) => s1
                .cmp_impl(s2, type_sensitive)
                .then_with(|| def_cmp(*d1, *d2)),
            (Exp::TypeVal(t1), Exp::TypeVal(t2)) => t1.cmp(t2),
            _ => {
                for i in 0..self.child_count() {
                    let ord = self.child(i).cmp_impl(other.child(i), type_sensitive);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            }
        }
    }

    /// Type-insensitive comparison: like `cmp`, but ignores the type on
    /// typed wrappers. Used when a second, weaker key is needed.
    pub fn cmp_ignoring_type(&self, other: &Exp) -> Ordering {
        self.cmp_impl(other, false)
    }

    /// Subscript-insensitive equality: a subscript compares equal to the
    /// expression it wraps. Family wildcards still apply.
    pub fn eq_no_subscript(&self, other: &Exp) -> bool {
        let a = if let Exp::Ref { sub, .. } = self { &**sub } else { self };
        let b = if let Exp::Ref { sub, .. } = other { &**sub } else { other };
        let (ao, bo) = (a.op(), b.op());
        if ao == Oper::Wild || bo == Oper::Wild {
            return true;
        }
        if family_wildcard_matches(ao, bo) || family_wildcard_matches(bo, ao) {
            return true;
        }
        if ao != bo {
            return false;
        }
        match (a, b) {
            (Exp::Const(_), Exp::Const(_))
            | (Exp::Terminal(_), Exp::Terminal(_))
            | (Exp::TypeVal(_), Exp::TypeVal(_)) => a == b,
            (Exp::Typed { ty: t1, sub: s1 }, Exp::Typed { ty: t2, sub: s2 }) => {
                t1 == t2 && s1.eq_no_subscript(s2)
            }
            _ => (0..a.child_count()).all(|i| a.child(i).eq_no_subscript(b.child(i))),
        }
    }
}

/// A strict total order, used as the key in ordered containers of
/// expressions. Consistent with `==` on the non-wildcard subset.
impl Ord for Exp {
    fn cmp(&self, other: &Exp) -> Ordering {
        self.cmp_impl(other, true)
    }
}

impl PartialOrd for Exp {
    fn partial_cmp(&self, other: &Exp) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
