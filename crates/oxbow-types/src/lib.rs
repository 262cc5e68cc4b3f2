//! # oxbow-types
//!
//! Type representation for the oxbow decompiler core. This crate defines
//! the C-like types attached to expressions during lifting and queried by
//! the simplifier (compound-offset rewriting) and the constraint generator.

pub mod types;

pub use types::{ArrayType, CompoundType, Field, Signedness, Type};

/// Default word size in bits for the targets oxbow handles.
pub const STD_SIZE: u32 = 32;
