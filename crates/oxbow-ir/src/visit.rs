//! Visitor framework.
//!
//! Two traversal traits: [`ExpVisitor`] for read-only walks with
//! per-variant hooks, and [`ExpModifier`] for rewriting walks with pre and
//! post hooks. Every dataflow pass in the decompiler is built on one of
//! these. The named visitors the core itself needs live here too.

use crate::exp::{Const, Def, Exp};
use crate::oper::Oper;
use std::collections::BTreeSet;

/// What a visitor hook wants the traversal to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitAction {
    /// Descend into the children.
    Continue,
    /// Do not descend, but keep visiting the rest of the tree.
    SkipChildren,
    /// Stop the whole traversal.
    Abort,
}

/// Read-only visitor with one hook per concrete node kind. Default hooks
/// descend everywhere.
pub trait ExpVisitor {
    fn visit_const(&mut self, _e: &Const) -> VisitAction {
        VisitAction::Continue
    }
    fn visit_terminal(&mut self, _op: Oper) -> VisitAction {
        VisitAction::Continue
    }
    fn visit_unary(&mut self, _e: &Exp) -> VisitAction {
        VisitAction::Continue
    }
    fn visit_binary(&mut self, _e: &Exp) -> VisitAction {
        VisitAction::Continue
    }
    fn visit_ternary(&mut self, _e: &Exp) -> VisitAction {
        VisitAction::Continue
    }
    fn visit_typed(&mut self, _e: &Exp) -> VisitAction {
        VisitAction::Continue
    }
    fn visit_ref(&mut self, _e: &Exp) -> VisitAction {
        VisitAction::Continue
    }
    fn visit_typeval(&mut self, _e: &Exp) -> VisitAction {
        VisitAction::Continue
    }
    fn visit_location(&mut self, _e: &Exp) -> VisitAction {
        VisitAction::Continue
    }
}

/// Rewriting modifier. `pre_visit` may rewrite the node and decide whether
/// the traversal recurses into the (possibly new) node's children;
/// `post_visit` runs afterwards and may replace the node with one of a
/// different kind. Hooks pattern-match on the node they are handed.
pub trait ExpModifier {
    fn pre_visit(&mut self, e: Exp) -> (Exp, bool) {
        (e, true)
    }
    fn post_visit(&mut self, e: Exp) -> Exp {
        e
    }
}

impl Exp {
    /// Walk the tree with a read-only visitor. Returns false when the
    /// traversal was aborted.
    pub fn accept<V: ExpVisitor + ?Sized>(&self, v: &mut V) -> bool {
        let action = match self {
            Exp::Const(c) => v.visit_const(c),
            Exp::Terminal(op) => v.visit_terminal(*op),
            Exp::Unary { .. } => v.visit_unary(self),
            Exp::Binary { .. } => v.visit_binary(self),
            Exp::Ternary { .. } => v.visit_ternary(self),
            Exp::Typed { .. } => v.visit_typed(self),
            Exp::Ref { .. } => v.visit_ref(self),
            Exp::TypeVal(_) => v.visit_typeval(self),
            Exp::Location { .. } => v.visit_location(self),
        };
        match action {
            VisitAction::Abort => false,
            VisitAction::SkipChildren => true,
            VisitAction::Continue => {
                for i in 0..self.child_count() {
                    if !self.child(i).accept(v) {
                        return false;
                    }
                }
                true
            }
        }
    }

    /// Rewrite the tree with a modifier: pre hook, optional descent that
    /// rebinds each child to its rewritten form, then post hook.
    pub fn accept_mod<M: ExpModifier + ?Sized>(self, m: &mut M) -> Exp {
        let (mut e, recurse) = m.pre_visit(self);
        if recurse {
            for i in 0..e.child_count() {
                let child = std::mem::replace(e.child_mut(i), Exp::Terminal(Oper::Nil));
                *e.child_mut(i) = child.accept_mod(m);
            }
        }
        m.post_visit(e)
    }
}

// ----------------------------------------------------------------------
// Named visitors
// ----------------------------------------------------------------------

/// Terminals that count as locations for use-collection.
fn is_location_terminal(op: Oper) -> bool {
    matches!(
        op,
        Oper::Pc
            | Oper::Flags
            | Oper::FFlags
            | Oper::CF
            | Oper::ZF
            | Oper::OF
            | Oper::NF
            | Oper::DF
            | Oper::Afp
            | Oper::Agp
    )
}

/// Collects the locations used by an expression.
pub struct UsedLocsFinder {
    pub locs: BTreeSet<Exp>,
    mem_only: bool,
}

impl UsedLocsFinder {
    pub fn new(mem_only: bool) -> UsedLocsFinder {
        UsedLocsFinder {
            locs: BTreeSet::new(),
            mem_only,
        }
    }

    fn walk(&mut self, e: &Exp, in_mem: bool) {
        match e {
            Exp::Ref { sub, .. } if sub.is_location() || matches!(**sub, Exp::Terminal(op) if is_location_terminal(op)) =>
            {
                if !self.mem_only || in_mem {
                    self.locs.insert(e.clone());
                }
                // The address of a subscripted m[x] still uses x.
                if sub.is_mem_of() {
                    self.walk(sub.sub1(), true);
                }
            }
            Exp::Location { op, sub, .. } => {
                if !self.mem_only || in_mem {
                    self.locs.insert(e.clone());
                }
                if *op == Oper::MemOf {
                    self.walk(sub, true);
                }
            }
            Exp::Terminal(op) if is_location_terminal(*op) => {
                if !self.mem_only || in_mem {
                    self.locs.insert(e.clone());
                }
            }
            _ => {
                for i in 0..e.child_count() {
                    self.walk(e.child(i), in_mem);
                }
            }
        }
    }
}

impl Exp {
    /// The set of locations this expression uses. With `mem_only`, only
    /// locations appearing inside a memory address.
    pub fn used_locs(&self, mem_only: bool) -> BTreeSet<Exp> {
        let mut f = UsedLocsFinder::new(mem_only);
        f.walk(self, false);
        f.locs
    }

    /// Subscript every occurrence of the location `target` with `def`.
    /// Wildcards in `target` subscript every location. Locations already
    /// carrying a subscript over the same base are left alone.
    pub fn subscript_var(self, target: &Exp, def: Def) -> Exp {
        fn candidate(e: &Exp) -> bool {
            e.is_location() || matches!(e, Exp::Terminal(op) if is_location_terminal(*op))
        }
        fn walk(e: Exp, target: &Exp, def: Def) -> Exp {
            if let Exp::Ref { mut sub, def: d } = e {
                // Already subscripted: don't wrap again, but the address
                // parts of an m[x]{d} are still fair game.
                if sub.is_mem_of() {
                    let addr = std::mem::replace(sub.sub1_mut(), Exp::Terminal(Oper::Nil));
                    *sub.sub1_mut() = walk(addr, target, def);
                }
                return Exp::Ref { sub, def: d };
            }
            if candidate(&e) && &e == target {
                // Subscript the matching location as a whole; later passes
                // handle the components of its address separately.
                return Exp::subscripted(e, def);
            }
            let mut e = e;
            for i in 0..e.child_count() {
                let child = std::mem::replace(e.child_mut(i), Exp::Terminal(Oper::Nil));
                *e.child_mut(i) = walk(child, target, def);
            }
            e
        }
        walk(self, target, def)
    }

    /// Subscript every occurrence of `target` with the implicit definition.
    pub fn subscript_val_null(self, target: &Exp) -> Exp {
        self.subscript_var(target, Def::Implicit)
    }

    /// Subscript every location with the implicit definition.
    pub fn subscript_all_null(self) -> Exp {
        let wild = Exp::Terminal(Oper::Wild);
        self.subscript_var(&wild, Def::Implicit)
    }

    /// Remove every SSA subscript, unwrapping to the base expression.
    /// `all_zero` is set when every removed subscript was null or
    /// implicit.
    pub fn remove_subscripts(self, all_zero: &mut bool) -> Exp {
        *all_zero = true;
        fn walk(e: Exp, all_zero: &mut bool) -> Exp {
            match e {
                Exp::Ref { sub, def } => {
                    if !def.is_implicit() {
                        *all_zero = false;
                    }
                    walk(*sub, all_zero)
                }
                mut other => {
                    for i in 0..other.child_count() {
                        let child =
                            std::mem::replace(other.child_mut(i), Exp::Terminal(Oper::Nil));
                        *other.child_mut(i) = walk(child, all_zero);
                    }
                    other
                }
            }
        }
        walk(self, all_zero)
    }

    /// Nesting depth of memory operations, member accesses and array
    /// indexes: a cheap complexity measure used to throttle propagation.
    pub fn complexity_depth(&self) -> usize {
        fn walk(e: &Exp) -> usize {
            let here = usize::from(matches!(
                e.op(),
                Oper::MemOf | Oper::ArrayIndex | Oper::MemberAccess
            ));
            let below = (0..e.child_count()).map(|i| walk(e.child(i))).max().unwrap_or(0);
            here + below
        }
        walk(self)
    }

    /// Maximum nesting of `m[...]`.
    pub fn mem_depth(&self) -> usize {
        fn walk(e: &Exp) -> usize {
            let here = usize::from(e.is_mem_of());
            let below = (0..e.child_count()).map(|i| walk(e.child(i))).max().unwrap_or(0);
            here + below
        }
        walk(self)
    }

    /// True when the expression contains a flag-function call.
    pub fn contains_flags(&self) -> bool {
        struct FlagsFinder {
            found: bool,
        }
        impl ExpVisitor for FlagsFinder {
            fn visit_binary(&mut self, e: &Exp) -> VisitAction {
                if e.op() == Oper::FlagCall {
                    self.found = true;
                    return VisitAction::Abort;
                }
                VisitAction::Continue
            }
        }
        let mut f = FlagsFinder { found: false };
        self.accept(&mut f);
        f.found
    }

    /// True when the expression contains a memory access with no
    /// subscript on it: a sign that SSA renaming has not reached it.
    pub fn contains_bare_memof(&self) -> bool {
        fn walk(e: &Exp, subscripted: bool) -> bool {
            match e {
                Exp::Ref { sub, .. } => walk(sub, true),
                Exp::Location { op: Oper::MemOf, sub, .. } => {
                    if !subscripted {
                        return true;
                    }
                    walk(sub, false)
                }
                _ => (0..e.child_count()).any(|i| walk(e.child(i), false)),
            }
        }
        walk(self, false)
    }
}

/// Numbers the constants in an expression for type analysis. Constants
/// that are really names (the payload of locals, globals, params and
/// temps) are not touched.
pub struct ConscriptSetter {
    next: u32,
    clear: bool,
}

impl ConscriptSetter {
    pub fn new(next: u32, clear: bool) -> ConscriptSetter {
        ConscriptSetter { next, clear }
    }

    /// Returns the next free conscript.
    pub fn run(&mut self, e: &mut Exp) -> u32 {
        self.walk(e);
        self.next
    }

    fn walk(&mut self, e: &mut Exp) {
        match e {
            Exp::Location { op, .. }
                if matches!(op, Oper::Local | Oper::Global | Oper::Param | Oper::Temp) => {}
            Exp::Const(c) => {
                if matches!(c.op(), Oper::IntConst | Oper::StrConst) {
                    if self.clear {
                        c.conscript = 0;
                    } else {
                        c.conscript = self.next;
                        self.next += 1;
                    }
                }
            }
            _ => {
                for i in 0..e.child_count() {
                    self.walk(e.child_mut(i));
                }
            }
        }
    }
}

/// Strips `size` casts, keeping the sized expression.
pub struct SizeStripper;

impl ExpModifier for SizeStripper {
    fn pre_visit(&mut self, e: Exp) -> (Exp, bool) {
        match e {
            Exp::Binary { op: Oper::Size, rhs, .. } => (*rhs, true),
            other => (other, true),
        }
    }
}
