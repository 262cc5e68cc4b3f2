//! # oxbow-abi
//!
//! Procedure signatures and calling-convention knowledge for the oxbow
//! decompiler. A [`Signature`] records where a procedure's parameters and
//! returns live; its [`Convention`] answers the ABI questions the
//! analyses ask at call sites: where is argument `n`, what does the
//! callee promise about the stack pointer, which registers survive the
//! call, does this address name a stack local.
//!
//! Freshly discovered procedures start with a generic, unpromoted
//! signature; [`Signature::promote`] specialises it to the first
//! convention whose qualification predicate accepts the procedure.

pub mod conventions;
pub mod signature;

pub use signature::{
    convention_name, platform_name, CallConv, Convention, Parameter, Platform, ProcView, Return,
    Signature, SignatureError,
};
