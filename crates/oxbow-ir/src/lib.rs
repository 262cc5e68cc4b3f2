//! # oxbow-ir
//!
//! The expression algebra at the heart of the oxbow decompiler. Lifted
//! instructions become trees of [`Exp`] nodes; every analysis pass walks,
//! matches and rewrites these trees until they are fit for emission.
//!
//! The crate provides:
//!
//! - the closed operator catalog ([`Oper`]) and the node tree ([`Exp`]);
//! - structural operations: deep clone, wildcard-aware equality, a total
//!   order for keyed containers, subscript-insensitive comparison,
//!   pretty-printing and DOT dumps;
//! - sub-tree search and replace, plus a textual pattern surface with
//!   variable binding;
//! - a read-only visitor and a rewriting modifier, used by the dataflow
//!   passes;
//! - the arithmetic partition simplifier and the polymorphic rewrite
//!   engine, run to a fixpoint by [`Exp::simplify`];
//! - type-constraint emission toward the inference engine.

pub mod constraint;
pub mod dot;
pub mod exp;
pub mod oper;
pub mod pattern;
pub mod print;
pub mod search;
pub mod simplify;
pub mod visit;

pub use constraint::ConstraintGen;
pub use exp::{Const, Def, Exp, ProcId, StmtId, Value};
pub use oper::Oper;
pub use pattern::{match_text, Bindings};
pub use simplify::{ArchRules, PentiumRules, SimplifyCtx};
pub use visit::{ExpModifier, ExpVisitor, VisitAction};
