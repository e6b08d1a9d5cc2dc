//! Symbol resolution and bound callables
//!
//! Two resolvers produce `BoundFn` values: `LibraryBinding` looks
//! symbols up through the dynamic linker, `CapsuleBinding` through an
//! in-process export table. A bound function carries its shared
//! descriptor and either a live entry point or the name of the module
//! that never became available.

pub mod capsule;
pub mod invoke;
pub mod library;

pub use capsule::{CapsuleBinding, Export, ExportTable};
pub use invoke::NativeCall;
pub use library::{Library, LibraryBinding};

use std::sync::Arc;

use crate::core::tag::RawValue;
use crate::descriptor::{CallBinding, CallDescriptor};
use crate::errors::FfiError;
use crate::logging::log_invoke;
use crate::signature::CallingConvention;

#[derive(Debug)]
enum Target {
    Ptr(*const ()),
    Unavailable(String),
}

/// A declared function bound to its resolution outcome
#[derive(Debug)]
pub struct BoundFn {
    canonical: String,
    symbol: String,
    convention: CallingConvention,
    descriptor: Arc<CallDescriptor>,
    target: Target,
}

impl BoundFn {
    pub(crate) fn new(binding: CallBinding, ptr: *const ()) -> Self {
        Self {
            canonical: binding.canonical,
            symbol: binding.symbol,
            convention: binding.convention,
            descriptor: binding.descriptor,
            target: Target::Ptr(ptr),
        }
    }

    pub(crate) fn unavailable(binding: CallBinding, module: &str) -> Self {
        Self {
            canonical: binding.canonical,
            symbol: binding.symbol,
            convention: binding.convention,
            descriptor: binding.descriptor,
            target: Target::Unavailable(module.to_string()),
        }
    }

    /// Canonical declaration name
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Symbol the entry point resolved under
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn convention(&self) -> CallingConvention {
        self.convention
    }

    pub fn descriptor(&self) -> &Arc<CallDescriptor> {
        &self.descriptor
    }

    /// Check whether a live entry point backs this function
    pub fn is_available(&self) -> bool {
        matches!(self.target, Target::Ptr(_))
    }

    /// Call the bound function
    ///
    /// A deferred binding fails here with `ModuleUnavailable` on every
    /// call.
    ///
    /// # Safety
    /// Arguments must be constructor-built `RawValue`s matching the
    /// descriptor's shape, and the resolved entry point must still be
    /// loaded.
    pub unsafe fn call(&self, args: &[RawValue]) -> Result<RawValue, FfiError> {
        let ptr = match &self.target {
            Target::Ptr(ptr) => *ptr,
            Target::Unavailable(module) => {
                return Err(FfiError::module_unavailable(module.clone()))
            }
        };
        log_invoke(&self.symbol, args.len());
        invoke::invoke(ptr, &self.symbol, &self.descriptor, args)
    }
}

unsafe impl Send for BoundFn {}
unsafe impl Sync for BoundFn {}
