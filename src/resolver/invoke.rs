//! Native call execution
//!
//! Implements architecture-specific function invocation. Arguments are
//! partitioned by register class into fixed windows and every window
//! register is loaded unconditionally, so one assembly block per
//! architecture covers all supported shapes.

use std::sync::Arc;

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
use crate::core::tag::Width;
use crate::core::tag::{RawValue, TypeTag};
use crate::descriptor::CallDescriptor;
use crate::errors::FfiError;
use crate::signature::CallingConvention;

/// Argument register window of the running target: (integer, float)
#[cfg(all(target_arch = "x86_64", not(target_os = "windows")))]
pub const fn register_window() -> (usize, usize) {
    (6, 8)
}

#[cfg(all(target_arch = "x86_64", target_os = "windows"))]
pub const fn register_window() -> (usize, usize) {
    (4, 4)
}

#[cfg(target_arch = "aarch64")]
pub const fn register_window() -> (usize, usize) {
    (8, 8)
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub const fn register_window() -> (usize, usize) {
    (0, 0)
}

/// Execute a call through a resolved descriptor
///
/// # Safety
/// Caller must ensure:
/// - The pointer targets a live function with exactly this shape
/// - Every argument was built by a `RawValue` constructor
/// - The callee follows the platform C convention
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub(crate) unsafe fn invoke(
    ptr: *const (),
    symbol: &str,
    descriptor: &CallDescriptor,
    args: &[RawValue],
) -> Result<RawValue, FfiError> {
    if args.len() != descriptor.arity() {
        return Err(FfiError::SignatureMismatch {
            name: symbol.to_string(),
            expected: descriptor.arity(),
            found: args.len(),
        });
    }
    check_shape(symbol, descriptor)?;

    let (bits, fp) = invoke_asm(ptr, descriptor, args);
    Ok(materialize(descriptor.ret(), bits, fp))
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub(crate) unsafe fn invoke(
    _ptr: *const (),
    symbol: &str,
    descriptor: &CallDescriptor,
    args: &[RawValue],
) -> Result<RawValue, FfiError> {
    if args.len() != descriptor.arity() {
        return Err(FfiError::SignatureMismatch {
            name: symbol.to_string(),
            expected: descriptor.arity(),
            found: args.len(),
        });
    }
    Err(FfiError::module_unavailable(
        "native caller (unsupported architecture)",
    ))
}

/// Reject shapes the register-window caller cannot express
///
/// Aggregates pass by pointer only; arguments past the register window
/// would spill to the stack, which this caller does not do.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
fn check_shape(symbol: &str, descriptor: &CallDescriptor) -> Result<(), FfiError> {
    if descriptor.ret().is_aggregate() {
        return Err(FfiError::size_mismatch(
            format!("by-value aggregate return from {}", symbol),
            8,
            0,
        ));
    }

    let mut int_needed = 0;
    let mut float_needed = 0;
    for tag in descriptor.params() {
        if tag.is_aggregate() {
            return Err(FfiError::size_mismatch(
                format!("by-value aggregate argument to {}", symbol),
                8,
                0,
            ));
        }
        if tag.is_float() {
            float_needed += 1;
        } else {
            int_needed += 1;
        }
    }
    if cfg!(all(target_arch = "x86_64", target_os = "windows")) {
        // Positional slots: every argument burns one window entry
        int_needed = descriptor.arity();
        float_needed = 0;
    }

    let (int_window, float_window) = register_window();
    if int_needed > int_window {
        return Err(FfiError::size_mismatch(
            format!("register window for {}", symbol),
            int_window,
            int_needed,
        ));
    }
    if float_needed > float_window {
        return Err(FfiError::size_mismatch(
            format!("register window for {}", symbol),
            float_window,
            float_needed,
        ));
    }
    Ok(())
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
fn materialize(ret: TypeTag, bits: u64, fp: f64) -> RawValue {
    match ret {
        TypeTag::Void => RawValue::void(),
        TypeTag::Float { width: Width::W64 } => RawValue::from_f64(fp),
        TypeTag::Float { width: _ } => RawValue::from_f32(f32::from_bits(fp.to_bits() as u32)),
        _ => RawValue::from_bits(bits),
    }
}

/// Assembly-level call
#[cfg(all(target_arch = "x86_64", not(target_os = "windows")))]
unsafe fn invoke_asm(ptr: *const (), descriptor: &CallDescriptor, args: &[RawValue]) -> (u64, f64) {
    // System V AMD64: integers in RDI RSI RDX RCX R8 R9, floats in
    // XMM0-XMM7, AL carries the vector count for variadic callees
    let mut ints = [0u64; 6];
    let mut fps = [0f64; 8];
    let mut next_int = 0;
    let mut next_fp = 0;
    for (tag, value) in descriptor.params().iter().zip(args) {
        if tag.is_float() {
            fps[next_fp] = f64::from_bits(value.bits());
            next_fp += 1;
        } else {
            ints[next_int] = value.bits();
            next_int += 1;
        }
    }

    let ret_bits: u64;
    let ret_fp: f64;
    std::arch::asm!(
        "call {func}",
        func = in(reg) ptr,
        inout("rdi") ints[0] => _,
        inout("rsi") ints[1] => _,
        inout("rdx") ints[2] => _,
        inout("rcx") ints[3] => _,
        inout("r8") ints[4] => _,
        inout("r9") ints[5] => _,
        inlateout("rax") next_fp as u64 => ret_bits,
        inlateout("xmm0") fps[0] => ret_fp,
        inout("xmm1") fps[1] => _,
        inout("xmm2") fps[2] => _,
        inout("xmm3") fps[3] => _,
        inout("xmm4") fps[4] => _,
        inout("xmm5") fps[5] => _,
        inout("xmm6") fps[6] => _,
        inout("xmm7") fps[7] => _,
        clobber_abi("C"),
    );
    (ret_bits, ret_fp)
}

#[cfg(all(target_arch = "x86_64", target_os = "windows"))]
unsafe fn invoke_asm(
    ptr: *const (),
    _descriptor: &CallDescriptor,
    args: &[RawValue],
) -> (u64, f64) {
    // Windows x64: positional slots in RCX RDX R8 R9, each mirrored in
    // XMM0-XMM3; the callee owns 32 bytes of shadow space
    let mut slots = [0u64; 4];
    for (i, value) in args.iter().enumerate() {
        slots[i] = value.bits();
    }

    let ret_bits: u64;
    let ret_fp: f64;
    std::arch::asm!(
        "sub rsp, 32",
        "call {func}",
        "add rsp, 32",
        func = in(reg) ptr,
        inout("rcx") slots[0] => _,
        inout("rdx") slots[1] => _,
        inout("r8") slots[2] => _,
        inout("r9") slots[3] => _,
        lateout("rax") ret_bits,
        inlateout("xmm0") f64::from_bits(slots[0]) => ret_fp,
        inout("xmm1") f64::from_bits(slots[1]) => _,
        inout("xmm2") f64::from_bits(slots[2]) => _,
        inout("xmm3") f64::from_bits(slots[3]) => _,
        clobber_abi("C"),
    );
    (ret_bits, ret_fp)
}

#[cfg(target_arch = "aarch64")]
unsafe fn invoke_asm(ptr: *const (), descriptor: &CallDescriptor, args: &[RawValue]) -> (u64, f64) {
    // AAPCS64: integers in X0-X7, floats in V0-V7
    let mut ints = [0u64; 8];
    let mut fps = [0f64; 8];
    let mut next_int = 0;
    let mut next_fp = 0;
    for (tag, value) in descriptor.params().iter().zip(args) {
        if tag.is_float() {
            fps[next_fp] = f64::from_bits(value.bits());
            next_fp += 1;
        } else {
            ints[next_int] = value.bits();
            next_int += 1;
        }
    }

    let ret_bits: u64;
    let ret_fp: f64;
    std::arch::asm!(
        "blr {func}",
        func = in(reg) ptr,
        inlateout("x0") ints[0] => ret_bits,
        inout("x1") ints[1] => _,
        inout("x2") ints[2] => _,
        inout("x3") ints[3] => _,
        inout("x4") ints[4] => _,
        inout("x5") ints[5] => _,
        inout("x6") ints[6] => _,
        inout("x7") ints[7] => _,
        inlateout("v0") fps[0] => ret_fp,
        inout("v1") fps[1] => _,
        inout("v2") fps[2] => _,
        inout("v3") fps[3] => _,
        inout("v4") fps[4] => _,
        inout("v5") fps[5] => _,
        inout("v6") fps[6] => _,
        inout("v7") fps[7] => _,
        clobber_abi("C"),
    );
    (ret_bits, ret_fp)
}

/// A raw entry point paired with its resolved shape
///
/// Wraps a function pointer obtained outside the resolver, for callers
/// that already hold an address.
#[derive(Debug)]
pub struct NativeCall {
    ptr: *const (),
    symbol: String,
    convention: CallingConvention,
    descriptor: Arc<CallDescriptor>,
}

impl NativeCall {
    pub fn new(
        ptr: *const (),
        symbol: impl Into<String>,
        convention: CallingConvention,
        descriptor: Arc<CallDescriptor>,
    ) -> Self {
        Self {
            ptr,
            symbol: symbol.into(),
            convention,
            descriptor,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn convention(&self) -> CallingConvention {
        self.convention
    }

    pub fn descriptor(&self) -> &Arc<CallDescriptor> {
        &self.descriptor
    }

    /// Call the wrapped entry point
    ///
    /// # Safety
    /// See `invoke`; additionally the wrapped pointer must outlive the
    /// call.
    pub unsafe fn call(&self, args: &[RawValue]) -> Result<RawValue, FfiError> {
        invoke(self.ptr, &self.symbol, &self.descriptor, args)
    }
}

// Entry points are immutable addresses; sharing them across threads is
// the callee's concern, not the wrapper's
unsafe impl Send for NativeCall {}
unsafe impl Sync for NativeCall {}
