//! Per-convention ABI knowledge.
//!
//! Everything a signature answers about its calling convention lives
//! here, dispatched on [`Convention`]: argument locations by ordinal,
//! proven post-call facts, preserved registers, the locations library
//! calls clobber, the canonical stack-slot pattern, stack-locality tests,
//! the orderings used to sort call-boundary assignments, and the
//! qualification predicates behind promotion.
//!
//! Register numbering follows the lifter: on x86, r24-r31 are
//! eax/ecx/edx/ebx/esp/ebp/esi/edi and r28 is the stack pointer; on
//! SPARC r14 is %sp and r8-r13 are %o0-%o5; and so on per platform.

use crate::signature::{Convention, Platform, ProcView, Signature, SignatureError};
use log::debug;
use oxbow_ir::{Exp, Oper};
use oxbow_types::Type;
use std::cmp::Ordering;

/// Convention-default location for a return value of the given type.
pub(crate) fn default_return_location(conv: Convention, ty: &Type) -> Option<Exp> {
    match conv {
        Convention::Win32 | Convention::Win32ThisCall | Convention::PentiumStdC => {
            // Floats return on the FP stack top.
            Some(if ty.is_float() {
                Exp::reg_of(32)
            } else {
                Exp::reg_of(24)
            })
        }
        Convention::SparcStdC | Convention::SparcLib => Some(Exp::reg_of(8)),
        Convention::PpcStdC => Some(Exp::reg_of(3)),
        Convention::MipsStdC => Some(if ty.is_float() {
            Exp::reg_of(32)
        } else {
            Exp::reg_of(2)
        }),
        Convention::St20StdC => Some(Exp::reg_of(0)),
        Convention::Generic | Convention::Custom { .. } => None,
    }
}

/// `m[r<sp> + k]`.
fn stack_slot(sp: i32, k: i32) -> Exp {
    Exp::mem_of(Exp::binary(Oper::Plus, Exp::reg_of(sp), Exp::int(k)))
}

/// From `m[sp +- K]`, the offset K (negated for a subtraction), or 0 when
/// the expression is not a stack slot. The stack pointer may carry an SSA
/// subscript.
fn stack_offset(e: &Exp, sp: i32) -> i32 {
    if !e.is_mem_of() {
        return 0;
    }
    let sub = e.sub1();
    let op = sub.op();
    if op != Oper::Plus && op != Oper::Minus {
        return 0;
    }
    let mut base = sub.sub1();
    if base.is_subscript() {
        base = base.sub1();
    }
    if !base.is_reg_n(sp) {
        return 0;
    }
    let mut k = sub.sub2().int_const().unwrap_or(0);
    if op == Oper::Minus {
        k = -k;
    }
    k
}

impl Signature {
    /// The stack-pointer register index for this signature's convention,
    /// or an error before promotion.
    pub fn stack_register(&self) -> Result<i32, SignatureError> {
        match self.convention() {
            Convention::Generic => Err(SignatureError::StackRegisterNotDefined),
            Convention::Win32 | Convention::Win32ThisCall | Convention::PentiumStdC => Ok(28),
            Convention::SparcStdC | Convention::SparcLib => Ok(14),
            Convention::PpcStdC => Ok(1),
            Convention::MipsStdC => Ok(29),
            Convention::St20StdC => Ok(3),
            Convention::Custom { sp } => Ok(sp),
        }
    }

    /// The stack register for a platform, usable before promotion.
    pub fn stack_register_for(plat: Platform) -> Result<i32, SignatureError> {
        match plat {
            Platform::Sparc => Ok(14),
            Platform::Pentium => Ok(28),
            Platform::Ppc => Ok(1),
            Platform::Mips => Ok(29),
            Platform::St20 => Ok(3),
            _ => Err(SignatureError::StackRegisterNotDefined),
        }
    }

    /// Count of declared parameters, not counting the stack pointer when
    /// it is carried as an implicit first parameter.
    fn explicit_params(&self, sp: i32) -> usize {
        let n = self.num_params();
        if n > 0 && *self.param_exp(0) == Exp::reg_of(sp) {
            n - 1
        } else {
            n
        }
    }

    /// Skip over the implicit stack-pointer parameter when indexing past
    /// the declared list.
    fn hop_implicit_sp(&self, n: usize, sp: i32) -> usize {
        if self.num_params() > 0 && *self.param_exp(0) == Exp::reg_of(sp) {
            n - 1
        } else {
            n
        }
    }

    /// The location of the `n`-th actual argument at a call site.
    /// Declared parameters answer from the list; beyond it, the
    /// convention's table applies. None before promotion.
    pub fn argument_exp(&self, n: usize) -> Option<Exp> {
        if n < self.num_params() {
            return Some(self.param_exp(n).clone());
        }
        match self.convention() {
            Convention::Win32 | Convention::PentiumStdC => {
                let n = self.hop_implicit_sp(n, 28);
                Some(stack_slot(28, (n as i32 + 1) * 4))
            }
            Convention::Win32ThisCall => {
                let n = self.hop_implicit_sp(n, 28);
                if n == 0 {
                    // The first parameter is register ecx.
                    Some(Exp::reg_of(25))
                } else {
                    Some(stack_slot(28, n as i32 * 4))
                }
            }
            Convention::SparcStdC | Convention::SparcLib => {
                if n >= 6 {
                    // The seventh and subsequent parameters are at
                    // m[%sp+92], m[%sp+96], ...
                    Some(stack_slot(14, 92 + (n as i32 - 6) * 4))
                } else {
                    Some(Exp::reg_of(8 + n as i32))
                }
            }
            Convention::PpcStdC => {
                if n >= 8 {
                    // The ninth and subsequent parameters are at m[%r1+8],
                    // m[%r1+12], ...
                    Some(stack_slot(1, 8 + (n as i32 - 8) * 4))
                } else {
                    Some(Exp::reg_of(3 + n as i32))
                }
            }
            Convention::MipsStdC => {
                if n >= 4 {
                    // The first four home locations are shadowed; memory
                    // parameters start past them.
                    Some(stack_slot(29, 16 + (n as i32 - 4) * 4))
                } else {
                    Some(Exp::reg_of(8 + n as i32))
                }
            }
            Convention::St20StdC => {
                let n = self.hop_implicit_sp(n, 3);
                Some(stack_slot(3, (n as i32 + 1) * 4))
            }
            Convention::Generic | Convention::Custom { .. } => None,
        }
    }

    /// The canonical `m[sp +- anything]` pattern other analyses use to
    /// recognise stack slots. None before promotion.
    pub fn stack_wildcard(&self) -> Option<Exp> {
        let wild = Exp::terminal(Oper::Wild);
        match self.convention() {
            Convention::Win32 | Convention::Win32ThisCall | Convention::PentiumStdC => Some(
                Exp::mem_of(Exp::binary(Oper::Minus, Exp::reg_of(28), wild)),
            ),
            // SPARC locals live at positive offsets in the caller frame.
            Convention::SparcStdC | Convention::SparcLib => Some(Exp::mem_of(Exp::binary(
                Oper::Plus,
                Exp::reg_of(14),
                wild,
            ))),
            Convention::PpcStdC => Some(Exp::mem_of(Exp::binary(
                Oper::Minus,
                Exp::reg_of(1),
                wild,
            ))),
            Convention::MipsStdC => Some(Exp::mem_of(Exp::binary(
                Oper::Minus,
                Exp::reg_of(29),
                wild,
            ))),
            Convention::St20StdC => Some(Exp::mem_of(Exp::binary(
                Oper::Minus,
                Exp::reg_of(3),
                wild,
            ))),
            Convention::Generic | Convention::Custom { .. } => None,
        }
    }

    /// The value this convention promises the caller will observe at
    /// `left` after the call: the stack-pointer adjustment, or identity
    /// for the callee-saved registers.
    pub fn proven(&self, left: &Exp) -> Option<Exp> {
        let r = if left.is_reg_of_k() {
            left.sub1().int_const().unwrap()
        } else {
            return None;
        };
        match self.convention() {
            Convention::Win32 => self.win32_proven(r),
            Convention::Win32ThisCall => {
                if r == 28 {
                    // One parameter travels in ecx, so the callee pops
                    // four bytes fewer.
                    let nparams = self.explicit_params(28) as i32;
                    Some(Exp::binary(
                        Oper::Plus,
                        Exp::reg_of(28),
                        Exp::int(4 + nparams * 4 - 4),
                    ))
                } else {
                    self.win32_proven(r)
                }
            }
            Convention::PentiumStdC => match r {
                // Caller pops: only the return address is gone.
                28 => Some(Exp::binary(Oper::Plus, Exp::reg_of(28), Exp::int(4))),
                27 | 29 | 30 | 31 => Some(Exp::reg_of(r)),
                // Sub-registers of the callee-saved set.
                3 | 5 | 6 | 7 | 11 | 15 => Some(Exp::reg_of(r)),
                _ => None,
            },
            Convention::SparcStdC => match r {
                // sp and i0-i7 survive; g2-g4 do NOT in application code.
                14 | 24..=31 => Some(left.clone()),
                _ => None,
            },
            Convention::SparcLib => match r {
                // Libraries additionally preserve the application global
                // registers g2-g4.
                14 | 24..=31 | 2..=4 => Some(left.clone()),
                _ => None,
            },
            Convention::PpcStdC => match r {
                1 => Some(left.clone()),
                _ => None,
            },
            Convention::MipsStdC => match r {
                29 => Some(left.clone()),
                _ => None,
            },
            Convention::St20StdC => match r {
                3 => Some(left.clone()),
                // Registers A, B and C are callee save.
                0 | 1 | 2 => Some(Exp::reg_of(r)),
                _ => None,
            },
            Convention::Generic | Convention::Custom { .. } => None,
        }
    }

    fn win32_proven(&self, r: i32) -> Option<Exp> {
        match r {
            28 => {
                // Callee pops the arguments and the return address.
                let nparams = self.explicit_params(28) as i32;
                Some(Exp::binary(
                    Oper::Plus,
                    Exp::reg_of(28),
                    Exp::int(4 + nparams * 4),
                ))
            }
            27 | 29 | 30 | 31 => Some(Exp::reg_of(r)),
            3 | 5 | 6 | 7 | 11 | 15 => Some(Exp::reg_of(r)),
            _ => None,
        }
    }

    /// Whether the convention promises not to disturb `e`.
    pub fn is_preserved(&self, e: &Exp) -> bool {
        let Some(r) = e
            .is_reg_of_k()
            .then(|| e.sub1().int_const().unwrap())
        else {
            return false;
        };
        match self.convention() {
            Convention::Win32 | Convention::Win32ThisCall | Convention::PentiumStdC => {
                matches!(r, 29 | 27 | 30 | 31 | 3 | 5 | 6 | 7 | 11 | 15)
            }
            Convention::SparcStdC | Convention::SparcLib => matches!(r, 14 | 24..=31),
            Convention::PpcStdC => r == 1,
            Convention::MipsStdC => r == 29,
            Convention::St20StdC => matches!(r, 0..=3),
            Convention::Generic | Convention::Custom { .. } => false,
        }
    }

    /// The locations defined (clobbered) by a call into a library
    /// following this convention, consulted by SSA when modelling such
    /// calls.
    pub fn library_defines(&self) -> Vec<Exp> {
        match self.convention() {
            Convention::Win32 | Convention::Win32ThisCall | Convention::PentiumStdC => {
                // eax, ecx, edx, esp.
                vec![
                    Exp::reg_of(24),
                    Exp::reg_of(25),
                    Exp::reg_of(26),
                    Exp::reg_of(28),
                ]
            }
            Convention::SparcStdC | Convention::SparcLib => {
                (8..=15).map(Exp::reg_of).collect()
            }
            Convention::PpcStdC => (3..=12).map(Exp::reg_of).collect(),
            Convention::MipsStdC => {
                let mut v: Vec<Exp> = (16..=23).map(Exp::reg_of).collect();
                v.push(Exp::reg_of(30));
                v
            }
            _ => Vec::new(),
        }
    }

    /// The registers no procedure following the platform ABI preserves.
    /// Usable before promotion.
    pub fn abi_defines(plat: Platform) -> Vec<Exp> {
        match plat {
            Platform::Pentium => vec![Exp::reg_of(24), Exp::reg_of(25), Exp::reg_of(26)],
            Platform::Sparc => {
                let mut v: Vec<Exp> = (8..=13).map(Exp::reg_of).collect();
                v.push(Exp::reg_of(1));
                v
            }
            Platform::Ppc => (3..=12).map(Exp::reg_of).collect(),
            Platform::St20 => vec![Exp::reg_of(0), Exp::reg_of(1), Exp::reg_of(2)],
            _ => Vec::new(),
        }
    }

    /// The conventional location of the first outgoing argument, keyed
    /// by machine only. Usable before promotion.
    pub fn first_arg_loc(plat: Platform) -> Option<Exp> {
        match plat {
            Platform::Sparc => {
                Signature::with_convention("", Convention::SparcStdC).argument_exp(0)
            }
            // The first outgoing argument sits at the stack top on call.
            Platform::Pentium => Some(Exp::mem_of(Exp::reg_of(28))),
            Platform::St20 => Signature::with_convention("", Convention::St20StdC).argument_exp(0),
            _ => None,
        }
    }

    /// The conventional integer return location, keyed by machine only.
    /// Usable before promotion (the switch logic needs it early).
    pub fn return_exp_for(plat: Platform) -> Option<Exp> {
        match plat {
            Platform::Sparc => Some(Exp::reg_of(8)),
            Platform::Pentium => Some(Exp::reg_of(24)),
            Platform::St20 => Some(Exp::reg_of(0)),
            _ => None,
        }
    }

    /// The expected location of argument `n`, keyed by machine only.
    pub fn early_param_exp(plat: Platform, n: usize) -> Option<Exp> {
        let conv = match plat {
            Platform::Sparc => Convention::SparcStdC,
            Platform::Pentium => Convention::PentiumStdC,
            Platform::St20 => Convention::St20StdC,
            _ => return None,
        };
        Signature::with_convention("", conv).argument_exp(n)
    }

    // ------------------------------------------------------------------
    // Stack locality
    // ------------------------------------------------------------------

    /// Stack locals at negative offsets from the stack pointer.
    pub fn is_local_offset_negative(&self) -> bool {
        !self.is_local_offset_positive()
    }

    /// Stack locals at positive offsets (the stack frame is addressed
    /// upward from sp).
    pub fn is_local_offset_positive(&self) -> bool {
        matches!(
            self.convention(),
            Convention::SparcStdC | Convention::SparcLib | Convention::PpcStdC | Convention::MipsStdC
        )
    }

    /// Is the offset direction compatible with a stack local?
    pub fn is_op_compat_stack_local(&self, op: Oper) -> bool {
        match op {
            Oper::Minus => self.is_local_offset_negative(),
            Oper::Plus => self.is_local_offset_positive(),
            _ => false,
        }
    }

    /// Does `e` (an m[...] possibly under a subscript) name a local
    /// stack-based variable?
    pub fn is_stack_local(&self, e: &Exp) -> bool {
        if e.is_subscript() {
            return self.is_stack_local(e.sub1());
        }
        if !e.is_mem_of() {
            return false;
        }
        self.is_addr_of_stack_local(e.sub1())
    }

    /// Does `e` compute the address of a stack local? Honours the
    /// convention's stack growth direction; the stack pointer may be
    /// subscripted with an implicit definition only.
    pub fn is_addr_of_stack_local(&self, e: &Exp) -> bool {
        if matches!(
            self.convention(),
            Convention::SparcStdC | Convention::SparcLib
        ) {
            return self.sparc_addr_of_stack_local(e);
        }
        let op = e.op();
        if op == Oper::AddrOf {
            return self.is_stack_local(e.sub1());
        }
        let Ok(spr) = self.stack_register() else {
            return false;
        };
        let sp = Exp::reg_of(spr);
        if op != Oper::Minus && op != Oper::Plus {
            // Matches sp itself, or sp{-}.
            return *e == sp
                || (e.is_subscript() && e.def().unwrap().is_implicit() && *e.sub1() == sp);
        }
        if !self.is_op_compat_stack_local(op) {
            return false;
        }
        if !e.sub2().is_int_const() {
            return false;
        }
        let mut base = e.sub1();
        if base.is_subscript() {
            if !base.def().unwrap().is_implicit() {
                return false;
            }
            base = base.sub1();
        }
        *base == sp
    }

    /// SPARC: [sp+0] .. [sp+88] are effectively locals, but [sp + >=92]
    /// are memory parameters in the caller's frame.
    fn sparc_addr_of_stack_local(&self, e: &Exp) -> bool {
        let op = e.op();
        if op == Oper::AddrOf {
            return self.is_stack_local(e.sub1());
        }
        let sp = Exp::reg_of(14);
        if op != Oper::Minus && op != Oper::Plus {
            return *e == sp
                || (e.is_subscript() && e.def().unwrap().is_implicit() && *e.sub1() == sp);
        }
        if !e.sub2().is_int_const() {
            return false;
        }
        let mut base = e.sub1();
        if base.is_subscript() {
            if !base.def().unwrap().is_implicit() {
                return false;
            }
            base = base.sub1();
        }
        if *base != sp {
            return false;
        }
        e.sub2().int_const().unwrap() < 92
    }

    // ------------------------------------------------------------------
    // Orderings for call-boundary assignment lists
    // ------------------------------------------------------------------

    /// Order return locations so that the most conventional one sorts
    /// first (eax before anything on Pentium, %o0 on SPARC).
    pub fn return_compare(&self, a: &Exp, b: &Exp) -> Ordering {
        match self.convention() {
            Convention::PentiumStdC => {
                // eax is the preferred return location, then the FP stack.
                for r in [24, 30] {
                    match (a.is_reg_n(r), b.is_reg_n(r)) {
                        (true, true) => return Ordering::Equal,
                        (true, false) => return Ordering::Less,
                        (false, true) => return Ordering::Greater,
                        (false, false) => {}
                    }
                }
                a.cmp(b)
            }
            Convention::SparcStdC | Convention::SparcLib => {
                for r in [8, 32, 64] {
                    match (a.is_reg_n(r), b.is_reg_n(r)) {
                        (true, true) => return Ordering::Equal,
                        (true, false) => return Ordering::Less,
                        (false, true) => return Ordering::Greater,
                        (false, false) => {}
                    }
                }
                let sp_plus_64 = stack_slot(14, 64);
                match (*a == sp_plus_64, *b == sp_plus_64) {
                    (true, true) => return Ordering::Equal,
                    (true, false) => return Ordering::Less,
                    (false, true) => return Ordering::Greater,
                    (false, false) => {}
                }
                a.cmp(b)
            }
            _ => a.cmp(b),
        }
    }

    /// Order argument locations into conventional parameter order.
    pub fn argument_compare(&self, a: &Exp, b: &Exp) -> Ordering {
        match self.convention() {
            Convention::PentiumStdC => {
                let ma = stack_offset(a, 28);
                let mb = stack_offset(b, 28);
                match (ma != 0, mb != 0) {
                    (true, true) => ma.cmp(&mb),
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) => a.cmp(b),
                }
            }
            Convention::SparcStdC | Convention::SparcLib => {
                // %o0-%o5 are the preferred argument locations.
                let reg_rank = |e: &Exp| {
                    e.is_reg_of_k()
                        .then(|| e.sub1().int_const().unwrap())
                        .filter(|r| (8..=13).contains(r))
                };
                match (reg_rank(a), reg_rank(b)) {
                    (Some(ra), Some(rb)) => return ra.cmp(&rb),
                    (Some(_), None) => return Ordering::Less,
                    (None, Some(_)) => return Ordering::Greater,
                    (None, None) => {}
                }
                let ma = stack_offset(a, 30);
                let mb = stack_offset(b, 30);
                match (ma != 0, mb != 0) {
                    (true, true) => ma.cmp(&mb),
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) => a.cmp(b),
                }
            }
            _ => a.cmp(b),
        }
    }

    // ------------------------------------------------------------------
    // Promotion
    // ------------------------------------------------------------------

    /// Does the procedure look like it follows the given convention?
    pub fn qualified(conv: Convention, p: &dyn ProcView) -> bool {
        match conv {
            Convention::Win32 => {
                if p.platform() != Platform::Pentium || !p.is_win32() {
                    return false;
                }
                debug!("considering promotion to win32 signature for {}", p.name());
                // The return must restore pc from the stack and pop the
                // return address.
                let saved_ret = Exp::mem_of(Exp::reg_of(28));
                let got_pc = p
                    .proven(&Exp::terminal(Oper::Pc))
                    .is_some_and(|e| e == saved_ret);
                if !got_pc {
                    return false;
                }
                let sp_plus_4 = Exp::binary(Oper::Plus, Exp::reg_of(28), Exp::int(4));
                p.proven(&Exp::reg_of(28)).is_some_and(|e| e == sp_plus_4)
            }
            // Everything on Pentium falls back to cdecl.
            Convention::PentiumStdC => p.platform() == Platform::Pentium,
            Convention::SparcStdC => p.platform() == Platform::Sparc,
            Convention::PpcStdC => p.platform() == Platform::Ppc,
            Convention::MipsStdC => p.platform() == Platform::Mips,
            Convention::St20StdC => p.platform() == Platform::St20,
            _ => false,
        }
    }

    /// Specialise an unpromoted signature into the first convention whose
    /// qualification predicate accepts the procedure. Parameters and
    /// returns carry over. When nothing accepts, the signature is
    /// returned unchanged and stays unknown; downstream analyses must
    /// tolerate that. Promotion of an already-promoted signature is the
    /// identity.
    pub fn promote(&self, p: &dyn ProcView) -> Signature {
        if self.is_promoted() {
            return self.clone();
        }
        const CANDIDATES: [Convention; 6] = [
            Convention::Win32,
            Convention::PentiumStdC,
            Convention::SparcStdC,
            Convention::PpcStdC,
            Convention::MipsStdC,
            Convention::St20StdC,
        ];
        for conv in CANDIDATES {
            if Signature::qualified(conv, p) {
                debug!("promoting signature for {} to {:?}", p.name(), conv);
                let mut sig = self.clone();
                sig.set_convention(conv);
                sig.set_unknown(false);
                return sig;
            }
        }
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(conv: Convention) -> Signature {
        Signature::with_convention("f", conv)
    }

    #[test]
    fn pentium_stack_arguments() {
        let s = sig(Convention::PentiumStdC);
        assert_eq!(s.argument_exp(0), Some(stack_slot(28, 4)));
        assert_eq!(s.argument_exp(3), Some(stack_slot(28, 16)));
    }

    #[test]
    fn sparc_register_then_stack() {
        let s = sig(Convention::SparcStdC);
        assert_eq!(s.argument_exp(5), Some(Exp::reg_of(13)));
        assert_eq!(s.argument_exp(6), Some(stack_slot(14, 92)));
        assert_eq!(s.argument_exp(0), Some(Exp::reg_of(8)));
        assert_eq!(s.argument_exp(8), Some(stack_slot(14, 100)));
    }

    #[test]
    fn thiscall_first_argument_in_ecx() {
        let s = sig(Convention::Win32ThisCall);
        assert_eq!(s.argument_exp(0), Some(Exp::reg_of(25)));
        assert_eq!(s.argument_exp(1), Some(stack_slot(28, 4)));
    }

    #[test]
    fn ppc_and_mips_arguments() {
        let p = sig(Convention::PpcStdC);
        assert_eq!(p.argument_exp(0), Some(Exp::reg_of(3)));
        assert_eq!(p.argument_exp(7), Some(Exp::reg_of(10)));
        assert_eq!(p.argument_exp(8), Some(stack_slot(1, 8)));
        let m = sig(Convention::MipsStdC);
        assert_eq!(m.argument_exp(0), Some(Exp::reg_of(8)));
        assert_eq!(m.argument_exp(3), Some(Exp::reg_of(11)));
        assert_eq!(m.argument_exp(4), Some(stack_slot(29, 16)));
    }

    #[test]
    fn st20_stack_arguments() {
        let s = sig(Convention::St20StdC);
        assert_eq!(s.argument_exp(0), Some(stack_slot(3, 4)));
        assert_eq!(s.argument_exp(2), Some(stack_slot(3, 12)));
    }

    #[test]
    fn declared_parameters_take_precedence() {
        let mut s = sig(Convention::SparcStdC);
        s.add_parameter(Some(Type::int(32)), Some("a"), Some(Exp::reg_of(16)), None);
        assert_eq!(s.argument_exp(0), Some(Exp::reg_of(16)));
        // Beyond the declared list the convention's table answers.
        assert_eq!(s.argument_exp(1), Some(Exp::reg_of(9)));
    }

    #[test]
    fn win32_proven_pops_arguments() {
        // with the implicit sp parameter and one real one, the
        // callee pops 8 bytes.
        let mut s = sig(Convention::Win32);
        s.add_parameter(
            Some(Type::pointer(Type::int(32))),
            Some("esp"),
            Some(Exp::reg_of(28)),
            None,
        );
        s.add_parameter(Some(Type::int(32)), None, None, None);
        assert_eq!(
            s.proven(&Exp::reg_of(28)),
            Some(Exp::binary(Oper::Plus, Exp::reg_of(28), Exp::int(8)))
        );
        // ebx is preserved as-is.
        assert_eq!(s.proven(&Exp::reg_of(27)), Some(Exp::reg_of(27)));
        assert_eq!(s.proven(&Exp::reg_of(24)), None);
    }

    #[test]
    fn thiscall_proven_accounts_for_ecx() {
        let mut s = sig(Convention::Win32ThisCall);
        s.add_parameter(Some(Type::int(32)), None, Some(Exp::reg_of(25)), None);
        s.add_parameter(Some(Type::int(32)), None, None, None);
        // Two params, one in ecx: pops 4 + 8 - 4 = 8.
        assert_eq!(
            s.proven(&Exp::reg_of(28)),
            Some(Exp::binary(Oper::Plus, Exp::reg_of(28), Exp::int(8)))
        );
    }

    #[test]
    fn cdecl_proves_fixed_adjustment() {
        let mut s = sig(Convention::PentiumStdC);
        s.add_parameter(Some(Type::int(32)), None, None, None);
        s.add_parameter(Some(Type::int(32)), None, None, None);
        // Caller pops: the adjustment is always 4.
        assert_eq!(
            s.proven(&Exp::reg_of(28)),
            Some(Exp::binary(Oper::Plus, Exp::reg_of(28), Exp::int(4)))
        );
    }

    #[test]
    fn sparc_globals_preserved_only_in_libraries() {
        let app = sig(Convention::SparcStdC);
        let lib = sig(Convention::SparcLib);
        let g3 = Exp::reg_of(3);
        assert_eq!(app.proven(&g3), None);
        assert_eq!(lib.proven(&g3), Some(g3.clone()));
        // i-registers and sp in both.
        for r in [14, 24, 31] {
            assert!(app.proven(&Exp::reg_of(r)).is_some());
            assert!(lib.proven(&Exp::reg_of(r)).is_some());
        }
    }

    #[test]
    fn preserved_implies_proven_identity() {
        for conv in [
            Convention::Win32,
            Convention::Win32ThisCall,
            Convention::PentiumStdC,
            Convention::SparcStdC,
            Convention::SparcLib,
            Convention::PpcStdC,
            Convention::MipsStdC,
            Convention::St20StdC,
        ] {
            let s = sig(conv);
            for r in 0..64 {
                let e = Exp::reg_of(r);
                if s.is_preserved(&e) {
                    assert_eq!(s.proven(&e), Some(e), "{conv:?} r{r}");
                }
            }
        }
    }

    #[test]
    fn library_defines_per_convention() {
        assert_eq!(sig(Convention::PentiumStdC).library_defines().len(), 4);
        assert_eq!(sig(Convention::SparcStdC).library_defines().len(), 8);
        assert_eq!(sig(Convention::PpcStdC).library_defines().len(), 10);
        assert_eq!(sig(Convention::MipsStdC).library_defines().len(), 9);
        assert!(sig(Convention::Generic).library_defines().is_empty());
    }

    #[test]
    fn stack_wildcard_matches_slots() {
        let s = sig(Convention::PentiumStdC);
        let wild = s.stack_wildcard().unwrap();
        let slot = Exp::mem_of(Exp::binary(Oper::Minus, Exp::reg_of(28), Exp::int(8)));
        assert_eq!(wild, slot);
        let not_slot = Exp::mem_of(Exp::reg_of(29));
        assert_ne!(wild, not_slot);
    }

    #[test]
    fn stack_register_before_promotion_is_an_error() {
        let s = Signature::new("f");
        assert_eq!(
            s.stack_register(),
            Err(SignatureError::StackRegisterNotDefined)
        );
        assert_eq!(sig(Convention::MipsStdC).stack_register(), Ok(29));
    }

    #[test]
    fn stack_locals_honour_direction() {
        use oxbow_ir::Def;
        let pent = sig(Convention::PentiumStdC);
        let below = Exp::binary(Oper::Minus, Exp::reg_of(28), Exp::int(8));
        let above = Exp::binary(Oper::Plus, Exp::reg_of(28), Exp::int(8));
        assert!(pent.is_addr_of_stack_local(&below));
        assert!(!pent.is_addr_of_stack_local(&above));
        assert!(pent.is_stack_local(&Exp::mem_of(below.clone())));
        // The sp may be subscripted with an implicit def only.
        let sub_imp = Exp::binary(
            Oper::Minus,
            Exp::subscripted(Exp::reg_of(28), Def::Implicit),
            Exp::int(8),
        );
        assert!(pent.is_addr_of_stack_local(&sub_imp));
        let sub_real = Exp::binary(
            Oper::Minus,
            Exp::subscripted(Exp::reg_of(28), Def::Stmt(5)),
            Exp::int(8),
        );
        assert!(!pent.is_addr_of_stack_local(&sub_real));
        // Bare sp counts.
        assert!(pent.is_addr_of_stack_local(&Exp::reg_of(28)));
    }

    #[test]
    fn sparc_locals_split_at_92() {
        let s = sig(Convention::SparcStdC);
        let local = Exp::binary(Oper::Plus, Exp::reg_of(14), Exp::int(88));
        let param = Exp::binary(Oper::Plus, Exp::reg_of(14), Exp::int(92));
        assert!(s.is_addr_of_stack_local(&local));
        assert!(!s.is_addr_of_stack_local(&param));
    }

    #[test]
    fn pentium_return_ordering() {
        let s = sig(Convention::PentiumStdC);
        let eax = Exp::reg_of(24);
        let st0 = Exp::reg_of(30);
        let other = Exp::reg_of(26);
        assert_eq!(s.return_compare(&eax, &other), Ordering::Less);
        assert_eq!(s.return_compare(&other, &eax), Ordering::Greater);
        assert_eq!(s.return_compare(&st0, &other), Ordering::Less);
    }

    #[test]
    fn sparc_argument_ordering() {
        let s = sig(Convention::SparcStdC);
        let o0 = Exp::reg_of(8);
        let o1 = Exp::reg_of(9);
        let slot = stack_slot(30, 92);
        assert_eq!(s.argument_compare(&o0, &o1), Ordering::Less);
        assert_eq!(s.argument_compare(&o1, &slot), Ordering::Less);
        assert_eq!(s.argument_compare(&slot, &o0), Ordering::Greater);
    }

    #[test]
    fn pentium_argument_ordering_by_stack_offset() {
        let s = sig(Convention::PentiumStdC);
        let a = stack_slot(28, 4);
        let b = stack_slot(28, 8);
        let r = Exp::reg_of(25);
        assert_eq!(s.argument_compare(&a, &b), Ordering::Less);
        assert_eq!(s.argument_compare(&b, &a), Ordering::Greater);
        assert_eq!(s.argument_compare(&a, &r), Ordering::Less);
    }

    struct Proc {
        plat: Platform,
        win32: bool,
        cdecl_like: bool,
    }

    impl ProcView for Proc {
        fn name(&self) -> &str {
            "test_proc"
        }
        fn platform(&self) -> Platform {
            self.plat
        }
        fn is_win32(&self) -> bool {
            self.win32
        }
        fn proven(&self, left: &Exp) -> Option<Exp> {
            if !self.cdecl_like {
                return None;
            }
            if *left == Exp::terminal(Oper::Pc) {
                return Some(Exp::mem_of(Exp::reg_of(28)));
            }
            if left.is_reg_n(28) {
                return Some(Exp::binary(Oper::Plus, Exp::reg_of(28), Exp::int(4)));
            }
            None
        }
    }

    #[test]
    fn promotion_prefers_win32_when_proven() {
        let p = Proc {
            plat: Platform::Pentium,
            win32: true,
            cdecl_like: true,
        };
        let sig = Signature::new("f").promote(&p);
        assert_eq!(sig.convention(), Convention::Win32);
        assert!(!sig.is_unknown());
    }

    #[test]
    fn promotion_falls_back_to_cdecl_on_pentium() {
        let p = Proc {
            plat: Platform::Pentium,
            win32: false,
            cdecl_like: false,
        };
        let sig = Signature::new("f").promote(&p);
        assert_eq!(sig.convention(), Convention::PentiumStdC);
    }

    #[test]
    fn promotion_keeps_unknown_when_nothing_qualifies() {
        let p = Proc {
            plat: Platform::M68k,
            win32: false,
            cdecl_like: false,
        };
        let sig = Signature::new("f").promote(&p);
        assert_eq!(sig.convention(), Convention::Generic);
        assert!(sig.is_unknown());
    }

    #[test]
    fn promotion_is_stable() {
        for (plat, want) in [
            (Platform::Sparc, Convention::SparcStdC),
            (Platform::Ppc, Convention::PpcStdC),
            (Platform::Mips, Convention::MipsStdC),
            (Platform::St20, Convention::St20StdC),
        ] {
            let p = Proc {
                plat,
                win32: false,
                cdecl_like: false,
            };
            let once = Signature::new("f").promote(&p);
            assert_eq!(once.convention(), want);
            let twice = once.promote(&p);
            assert_eq!(once.convention(), twice.convention());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn promotion_preserves_parameters() {
        let mut sig = Signature::new("f");
        sig.add_parameter(Some(Type::int(32)), Some("a"), Some(Exp::reg_of(8)), None);
        let p = Proc {
            plat: Platform::Sparc,
            win32: false,
            cdecl_like: false,
        };
        let promoted = sig.promote(&p);
        assert_eq!(promoted.num_params(), 1);
        assert_eq!(promoted.param_name(0), "a");
        assert_eq!(*promoted.param_exp(0), Exp::reg_of(8));
    }

    #[test]
    fn early_helpers() {
        assert_eq!(
            Signature::early_param_exp(Platform::Sparc, 0),
            Some(Exp::reg_of(8))
        );
        assert_eq!(
            Signature::early_param_exp(Platform::Pentium, 1),
            Some(stack_slot(28, 8))
        );
        assert_eq!(
            Signature::first_arg_loc(Platform::Pentium),
            Some(Exp::mem_of(Exp::reg_of(28)))
        );
        assert_eq!(
            Signature::return_exp_for(Platform::St20),
            Some(Exp::reg_of(0))
        );
        assert_eq!(Signature::stack_register_for(Platform::Ppc), Ok(1));
        assert!(Signature::stack_register_for(Platform::M68k).is_err());
        assert_eq!(Signature::abi_defines(Platform::Sparc).len(), 7);
    }
}
