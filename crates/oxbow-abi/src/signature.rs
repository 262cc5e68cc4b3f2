//! Procedure signature data model.
//!
//! A signature owns its parameter and return lists by value. Parameters
//! carry a type, a name, the expression of their location at the call
//! site, and optionally the name of another parameter bounding this one
//! (for length-of relationships). Auto-generated parameter names are
//! `param1`, `param2`, ... and stay unique under renumbering.

use crate::conventions;
use oxbow_ir::Exp;
use oxbow_types::Type;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Target platform of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Pentium,
    Sparc,
    M68k,
    Parisc,
    Ppc,
    Mips,
    St20,
    Unknown,
}

/// Calling convention family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallConv {
    C,
    Pascal,
    ThisCall,
    Unknown,
}

/// Short platform name for signature files and diagnostics.
pub fn platform_name(plat: Platform) -> &'static str {
    match plat {
        Platform::Pentium => "pentium",
        Platform::Sparc => "sparc",
        Platform::M68k => "m68k",
        Platform::Parisc => "parisc",
        Platform::Ppc => "ppc",
        Platform::Mips => "mips",
        Platform::St20 => "st20",
        Platform::Unknown => "???",
    }
}

/// Short convention name for signature files and diagnostics.
pub fn convention_name(cc: CallConv) -> &'static str {
    match cc {
        CallConv::C => "stdc",
        CallConv::Pascal => "pascal",
        CallConv::ThisCall => "thiscall",
        CallConv::Unknown => "??",
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(platform_name(*self))
    }
}

impl fmt::Display for CallConv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(convention_name(*self))
    }
}

/// The concrete (architecture, convention) pair a signature has been
/// promoted to. `Generic` is the not-yet-promoted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Convention {
    /// Not yet promoted; ABI questions have no answers.
    Generic,
    /// Win32 stdcall-style: all parameters pushed, callee pops.
    Win32,
    /// Win32 thiscall: first parameter in ecx, rest pushed.
    Win32ThisCall,
    /// Pentium cdecl.
    PentiumStdC,
    /// SPARC V8 application code.
    SparcStdC,
    /// SPARC library code; additionally preserves g2-g4.
    SparcLib,
    /// PowerPC SysV.
    PpcStdC,
    /// MIPS o32.
    MipsStdC,
    /// ST20 C convention.
    St20StdC,
    /// User-specified signature with an explicit stack register.
    Custom { sp: i32 },
}

/// Errors from the signature surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// The stack register was asked for before promotion decided one.
    #[error("stack register not defined before promotion")]
    StackRegisterNotDefined,
    /// No known signature for the platform/convention pair.
    #[error("unknown signature: {convention} {platform}")]
    UnknownSignature {
        platform: Platform,
        convention: CallConv,
    },
}

/// One formal parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    ty: Type,
    name: String,
    exp: Exp,
    bound_max: Option<String>,
}

impl Parameter {
    pub fn new(ty: Type, name: impl Into<String>, exp: Exp, bound_max: Option<String>) -> Self {
        Parameter {
            ty,
            name: name.into(),
            exp,
            bound_max,
        }
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exp(&self) -> &Exp {
        &self.exp
    }

    /// Name of the parameter bounding this one, if any.
    pub fn bound_max(&self) -> Option<&str> {
        self.bound_max.as_deref()
    }

    pub fn set_type(&mut self, ty: Type) {
        self.ty = ty;
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_exp(&mut self, exp: Exp) {
        self.exp = exp;
    }

    pub fn set_bound_max(&mut self, name: impl Into<String>) {
        self.bound_max = Some(name.into());
    }
}

/// One return location.
#[derive(Debug, Clone, PartialEq)]
pub struct Return {
    pub ty: Type,
    pub exp: Exp,
}

impl Return {
    pub fn new(ty: Type, exp: Exp) -> Return {
        Return { ty, exp }
    }
}

/// A view of the procedure being classified, provided by the analysis
/// that owns it. Promotion consults the proven post-call facts collected
/// so far.
pub trait ProcView {
    fn name(&self) -> &str;
    fn platform(&self) -> Platform;
    /// Whether the program was loaded from a Win32 image.
    fn is_win32(&self) -> bool {
        false
    }
    /// The value proven to reach `left` on return from the procedure.
    fn proven(&self, left: &Exp) -> Option<Exp>;
}

/// A procedure signature: parameters, returns, and the promoted
/// convention, if any.
#[derive(Debug, Clone)]
pub struct Signature {
    name: String,
    conv: Convention,
    pub(crate) params: Vec<Parameter>,
    pub(crate) returns: Vec<Return>,
    rettype: Type,
    ellipsis: bool,
    /// Not yet promoted to a known convention.
    unknown: bool,
    /// User-specified rather than inferred; analyses must not override it.
    forced: bool,
    prefered_name: Option<String>,
    prefered_return: Option<Exp>,
    prefered_params: Vec<usize>,
    sig_file: Option<String>,
}

impl PartialEq for Signature {
    fn eq(&self, other: &Signature) -> bool {
        // The name is not significant; parameters and returns are.
        self.params == other.params && self.returns == other.returns
    }
}

impl Signature {
    /// A fresh, unpromoted signature.
    pub fn new(name: impl Into<String>) -> Signature {
        let name = name.into();
        Signature {
            name: if name.is_empty() {
                "<ANON>".to_string()
            } else {
                name
            },
            conv: Convention::Generic,
            params: Vec::new(),
            returns: Vec::new(),
            rettype: Type::Void,
            ellipsis: false,
            unknown: true,
            forced: false,
            prefered_name: None,
            prefered_return: None,
            prefered_params: Vec::new(),
            sig_file: None,
        }
    }

    /// A signature in a known convention. The convention's stack pointer
    /// (or, for MIPS, its return register) is registered as the first
    /// return, as the SSA builder expects.
    pub fn with_convention(name: impl Into<String>, conv: Convention) -> Signature {
        let mut sig = Signature::new(name);
        sig.conv = conv;
        sig.unknown = false;
        let first_ret = match conv {
            Convention::Win32 | Convention::Win32ThisCall | Convention::PentiumStdC => Some(28),
            Convention::SparcStdC | Convention::SparcLib => Some(14),
            Convention::PpcStdC => Some(1),
            Convention::MipsStdC => Some(2),
            Convention::St20StdC => Some(3),
            Convention::Custom { sp } if sp != 0 => Some(sp),
            _ => None,
        };
        if let Some(r) = first_ret {
            sig.returns
                .push(Return::new(Type::pointer(Type::Void), Exp::reg_of(r)));
        }
        sig
    }

    /// A custom signature with an explicit stack register.
    pub fn custom(name: impl Into<String>, sp: i32) -> Signature {
        Signature::with_convention(name, Convention::Custom { sp })
    }

    /// The signature for a (platform, convention) pair, for prototypes
    /// read from signature files.
    pub fn instantiate(
        plat: Platform,
        cc: CallConv,
        name: &str,
    ) -> Result<Signature, SignatureError> {
        let conv = match plat {
            Platform::Pentium => match cc {
                // For now, assume the only pascal calling convention
                // pentium signatures will be Windows.
                CallConv::Pascal => Convention::Win32,
                CallConv::ThisCall => Convention::Win32ThisCall,
                _ => Convention::PentiumStdC,
            },
            Platform::Sparc => Convention::SparcStdC,
            Platform::Ppc => Convention::PpcStdC,
            Platform::St20 => Convention::St20StdC,
            Platform::Mips => Convention::MipsStdC,
            _ => {
                return Err(SignatureError::UnknownSignature {
                    platform: plat,
                    convention: cc,
                })
            }
        };
        Ok(Signature::with_convention(name, conv))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn convention(&self) -> Convention {
        self.conv
    }

    pub(crate) fn set_convention(&mut self, conv: Convention) {
        self.conv = conv;
    }

    /// True once the signature has been promoted to a concrete
    /// convention.
    pub fn is_promoted(&self) -> bool {
        self.conv != Convention::Generic
    }

    pub fn is_unknown(&self) -> bool {
        self.unknown
    }

    pub(crate) fn set_unknown(&mut self, unknown: bool) {
        self.unknown = unknown;
    }

    pub fn is_forced(&self) -> bool {
        self.forced
    }

    pub fn set_forced(&mut self, forced: bool) {
        self.forced = forced;
    }

    pub fn has_ellipsis(&self) -> bool {
        self.ellipsis
    }

    pub fn set_has_ellipsis(&mut self, yes: bool) {
        self.ellipsis = yes;
    }

    pub fn ret_type(&self) -> &Type {
        &self.rettype
    }

    pub fn set_ret_type(&mut self, ty: Type) {
        self.rettype = ty;
    }

    pub fn prefered_name(&self) -> Option<&str> {
        self.prefered_name.as_deref()
    }

    pub fn set_prefered_name(&mut self, name: impl Into<String>) {
        self.prefered_name = Some(name.into());
    }

    pub fn prefered_return(&self) -> Option<&Exp> {
        self.prefered_return.as_ref()
    }

    pub fn set_prefered_return(&mut self, e: Exp) {
        self.prefered_return = Some(e);
    }

    pub fn prefered_params(&self) -> &[usize] {
        &self.prefered_params
    }

    pub fn set_prefered_params(&mut self, order: Vec<usize>) {
        self.prefered_params = order;
    }

    pub fn sig_file(&self) -> Option<&str> {
        self.sig_file.as_deref()
    }

    pub fn set_sig_file(&mut self, file: impl Into<String>) {
        self.sig_file = Some(file.into());
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// Add a parameter. A missing location defaults to the convention's
    /// location for the next argument; a missing name is auto-generated
    /// (`param1`, `param2`, ..., skipping taken names); a missing type is
    /// void.
    pub fn add_parameter(
        &mut self,
        ty: Option<Type>,
        name: Option<&str>,
        exp: Option<Exp>,
        bound_max: Option<String>,
    ) {
        let exp = exp.unwrap_or_else(|| {
            self.argument_exp(self.num_params())
                .expect("no location known for parameter before promotion")
        });
        let name = match name {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => {
                let mut n = self.params.len() + 1;
                loop {
                    let candidate = format!("param{n}");
                    if !self.params.iter().any(|p| p.name == candidate) {
                        break candidate;
                    }
                    n += 1;
                }
            }
        };
        self.params
            .push(Parameter::new(ty.unwrap_or(Type::Void), name, exp, bound_max));
    }

    /// Add a parameter at a known location.
    pub fn add_param_exp(&mut self, e: Exp, ty: Type) {
        self.add_parameter(Some(ty), None, Some(e), None);
    }

    pub fn remove_parameter(&mut self, i: usize) {
        self.params.remove(i);
    }

    pub fn remove_parameter_by_exp(&mut self, e: &Exp) {
        if let Some(i) = self.find_param_by_exp(e) {
            self.params.remove(i);
        }
    }

    /// Truncate or pad (with anonymous void parameters) to `n`.
    pub fn set_num_params(&mut self, n: usize) {
        if n < self.params.len() {
            self.params.truncate(n);
        } else {
            while self.params.len() < n {
                self.add_parameter(None, None, None, None);
            }
        }
    }

    pub fn param_name(&self, n: usize) -> &str {
        &self.params[n].name
    }

    pub fn param_exp(&self, n: usize) -> &Exp {
        &self.params[n].exp
    }

    /// The parameter's type; None when recursion has not set it yet.
    pub fn param_type(&self, n: usize) -> Option<&Type> {
        self.params.get(n).map(|p| &p.ty)
    }

    pub fn param_bound_max(&self, n: usize) -> Option<&str> {
        self.params.get(n).and_then(|p| p.bound_max.as_deref())
    }

    pub fn set_param_type(&mut self, n: usize, ty: Type) {
        self.params[n].ty = ty;
    }

    pub fn set_param_type_by_name(&mut self, name: &str, ty: Type) {
        match self.find_param_by_name(name) {
            Some(i) => self.params[i].ty = ty,
            None => log::warn!("could not set type for unknown parameter {name}"),
        }
    }

    pub fn set_param_type_by_exp(&mut self, e: &Exp, ty: Type) {
        match self.find_param_by_exp(e) {
            Some(i) => self.params[i].ty = ty,
            None => log::warn!("could not set type for unknown parameter expression {e}"),
        }
    }

    pub fn set_param_name(&mut self, n: usize, name: impl Into<String>) {
        self.params[n].name = name.into();
    }

    pub fn set_param_exp(&mut self, n: usize, e: Exp) {
        self.params[n].exp = e;
    }

    pub fn rename_param(&mut self, old: &str, new: &str) {
        if let Some(p) = self.params.iter_mut().find(|p| p.name == old) {
            p.name = new.to_string();
        }
    }

    /// Index of the parameter at the given location.
    pub fn find_param_by_exp(&self, e: &Exp) -> Option<usize> {
        self.params.iter().position(|p| p.exp == *e)
    }

    pub fn find_param_by_name(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    // ------------------------------------------------------------------
    // Returns
    // ------------------------------------------------------------------

    pub fn num_returns(&self) -> usize {
        self.returns.len()
    }

    pub fn returns(&self) -> &[Return] {
        &self.returns
    }

    pub fn return_exp(&self, n: usize) -> &Exp {
        &self.returns[n].exp
    }

    pub fn return_type(&self, n: usize) -> &Type {
        &self.returns[n].ty
    }

    pub fn set_return_type(&mut self, n: usize, ty: Type) {
        if let Some(r) = self.returns.get_mut(n) {
            r.ty = ty;
        }
    }

    /// Add a return. Void returns are dropped; a missing location
    /// defaults to the convention's return register for the type.
    pub fn add_return(&mut self, ty: Type, exp: Option<Exp>) {
        if ty.is_void() {
            return;
        }
        let exp = exp
            .or_else(|| conventions::default_return_location(self.conv, &ty))
            .expect("return location required before promotion");
        self.returns.push(Return::new(ty, exp));
    }

    pub fn remove_return(&mut self, e: &Exp) {
        if let Some(i) = self.find_return(e) {
            self.returns.remove(i);
        }
    }

    pub fn find_return(&self, e: &Exp) -> Option<usize> {
        self.returns.iter().position(|r| r.exp == *e)
    }

    /// The declared type of the given return location, if any.
    pub fn get_type_for(&self, e: &Exp) -> Option<&Type> {
        self.returns.iter().find(|r| r.exp == *e).map(|r| &r.ty)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.forced {
            write!(f, "*forced* ")?;
        }
        if self.returns.is_empty() {
            write!(f, "void ")?;
        } else {
            write!(f, "{{ ")?;
            for (n, r) in self.returns.iter().enumerate() {
                write!(f, "{} {}", r.ty.ctype(), r.exp)?;
                if n != self.returns.len() - 1 {
                    write!(f, ",")?;
                }
                write!(f, " ")?;
            }
            write!(f, "}} ")?;
        }
        write!(f, "{}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            write!(f, "{} {} {}", p.ty.ctype(), p.name, p.exp)?;
            if i != self.params.len() - 1 {
                write!(f, ", ")?;
            }
        }
        write!(f, ")")
    }
}

impl Signature {
    /// Debugger entry point: the printed form in an owned buffer.
    pub fn prints(&self) -> String {
        format!("{self}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_platforms() {
        assert_eq!(platform_name(Platform::Pentium), "pentium");
        assert_eq!(platform_name(Platform::St20), "st20");
        assert_eq!(platform_name(Platform::Unknown), "???");
        assert_eq!(convention_name(CallConv::C), "stdc");
        assert_eq!(convention_name(CallConv::ThisCall), "thiscall");
        assert_eq!(convention_name(CallConv::Unknown), "??");
    }

    #[test]
    fn anonymous_signature_name() {
        let sig = Signature::new("");
        assert_eq!(sig.name(), "<ANON>");
    }

    #[test]
    fn auto_parameter_names_stay_unique() {
        let mut sig = Signature::with_convention("f", Convention::PentiumStdC);
        sig.add_parameter(Some(Type::int(32)), Some("param2"), None, None);
        sig.add_parameter(Some(Type::int(32)), None, None, None);
        sig.add_parameter(Some(Type::int(32)), None, None, None);
        let names: Vec<&str> = sig.params().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["param2", "param3", "param4"]);
    }

    #[test]
    fn set_num_params_truncates_and_pads() {
        let mut sig = Signature::with_convention("f", Convention::PentiumStdC);
        sig.set_num_params(3);
        assert_eq!(sig.num_params(), 3);
        sig.set_num_params(1);
        assert_eq!(sig.num_params(), 1);
        assert_eq!(sig.param_name(0), "param1");
    }

    #[test]
    fn find_and_remove() {
        let mut sig = Signature::with_convention("f", Convention::PentiumStdC);
        sig.add_parameter(Some(Type::int(32)), Some("a"), None, None);
        sig.add_parameter(Some(Type::int(32)), Some("b"), None, None);
        let b_loc = sig.param_exp(1).clone();
        assert_eq!(sig.find_param_by_name("b"), Some(1));
        assert_eq!(sig.find_param_by_exp(&b_loc), Some(1));
        assert_eq!(sig.find_param_by_name("zz"), None);
        sig.remove_parameter_by_exp(&b_loc);
        assert_eq!(sig.num_params(), 1);
    }

    #[test]
    fn void_returns_are_dropped() {
        let mut sig = Signature::with_convention("f", Convention::PentiumStdC);
        let before = sig.num_returns();
        sig.add_return(Type::Void, None);
        assert_eq!(sig.num_returns(), before);
    }

    #[test]
    fn equality_ignores_name() {
        let mut a = Signature::with_convention("f", Convention::PentiumStdC);
        let mut b = Signature::with_convention("g", Convention::PentiumStdC);
        assert_eq!(a, b);
        a.add_parameter(Some(Type::int(32)), None, None, None);
        assert_ne!(a, b);
        b.add_parameter(Some(Type::int(32)), None, None, None);
        assert_eq!(a, b);
    }

    #[test]
    fn instantiate_dispatch() {
        let w = Signature::instantiate(Platform::Pentium, CallConv::Pascal, "f").unwrap();
        assert_eq!(w.convention(), Convention::Win32);
        let t = Signature::instantiate(Platform::Pentium, CallConv::ThisCall, "f").unwrap();
        assert_eq!(t.convention(), Convention::Win32ThisCall);
        let c = Signature::instantiate(Platform::Pentium, CallConv::C, "f").unwrap();
        assert_eq!(c.convention(), Convention::PentiumStdC);
        // Pascal is coerced to C off Windows.
        let s = Signature::instantiate(Platform::Sparc, CallConv::Pascal, "f").unwrap();
        assert_eq!(s.convention(), Convention::SparcStdC);
        let err = Signature::instantiate(Platform::M68k, CallConv::C, "f");
        assert!(matches!(
            err,
            Err(SignatureError::UnknownSignature { .. })
        ));
    }

    #[test]
    fn display_form() {
        let mut sig = Signature::with_convention("strlen", Convention::PentiumStdC);
        sig.add_parameter(
            Some(Type::pointer(Type::Char)),
            Some("s"),
            None,
            None,
        );
        let text = sig.to_string();
        assert!(text.starts_with("{ void * r28 } strlen("));
        assert!(text.contains("char * s m[r28 + 4]"));
    }

    #[test]
    fn custom_signature_registers_sp_return() {
        let sig = Signature::custom("f", 15);
        assert_eq!(sig.convention(), Convention::Custom { sp: 15 });
        assert_eq!(*sig.return_exp(0), Exp::reg_of(15));
        assert_eq!(sig.stack_register(), Ok(15));
    }
}
