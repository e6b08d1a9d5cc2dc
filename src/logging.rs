//! Logging utilities for the binding layer
//!
//! Lightweight structured logging for declaration, resolution, and
//! invocation events. Uses `tracing` with minimal overhead on the call
//! path.

// Re-export tracing macros for use throughout the crate
pub use tracing::{debug, error, info, trace, warn, Level};

use crate::core::tag::TypeTag;

/// Initialize logging with sensible defaults
///
/// This should be called once, early. Production builds log at INFO
/// and above; debug builds also enable DEBUG and TRACE.
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            #[cfg(debug_assertions)]
            {
                EnvFilter::new("ffidecl=debug")
            }
            #[cfg(not(debug_assertions))]
            {
                EnvFilter::new("ffidecl=info")
            }
        });

    fmt()
        .with_env_filter(filter)
        .compact()
        .try_init()
        .ok(); // Ignore error if already initialized
}

/// Log an aggregate name reservation
#[inline]
pub fn log_aggregate_reserved(name: &str) {
    trace!(
        target: "registry",
        name,
        "aggregate reserved"
    );
}

/// Log a finalized aggregate declaration
#[inline]
pub fn log_aggregate_declared(name: &str, members: usize, size: usize) {
    debug!(
        target: "registry",
        name,
        members,
        size,
        "aggregate declared"
    );
}

/// Log a pointer binding interning
#[inline]
pub fn log_pointer_interned(target: &TypeTag, count: Option<usize>) {
    trace!(
        target: "registry",
        to = ?target,
        count = ?count,
        "pointer binding interned"
    );
}

/// Log a built signature
#[inline]
pub fn log_signature_built(name: &str, arity: usize, overridden: bool) {
    debug!(
        target: "signature",
        name,
        arity,
        overridden,
        "signature built"
    );
}

/// Log a descriptor cache lookup
#[inline]
pub fn log_descriptor_lookup(hit: bool, arity: usize) {
    trace!(
        target: "descriptor",
        hit,
        arity,
        "descriptor lookup"
    );
}

/// Log a successful bind
#[inline]
pub fn log_bind(symbol: &str, module: &str) {
    debug!(
        target: "resolver",
        symbol,
        module,
        "function bound"
    );
}

/// Log a deferred capsule module
#[inline]
pub fn log_bind_deferred(module: &str) {
    warn!(
        target: "resolver",
        module,
        "module unavailable, binding deferred"
    );
}

/// Log a loaded library
#[inline]
pub fn log_library_loaded(name: &str) {
    info!(
        target: "resolver",
        name,
        "library loaded"
    );
}

/// Log a library load failure
#[inline]
pub fn log_library_error(name: &str, error: &str) {
    error!(
        target: "resolver",
        name,
        error,
        "library load failed"
    );
}

/// Log a missing symbol
#[inline]
pub fn log_symbol_missing(symbol: &str) {
    warn!(
        target: "resolver",
        symbol,
        "symbol not found"
    );
}

/// Log a native invocation
#[inline]
pub fn log_invoke(symbol: &str, args_count: usize) {
    trace!(
        target: "resolver",
        symbol,
        args_count,
        "native call"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_functions() {
        // These should not panic
        log_aggregate_reserved("Point");
        log_aggregate_declared("Point", 2, 16);
        log_pointer_interned(&TypeTag::I32, Some(4));
        log_signature_built("strlen", 1, false);
        log_descriptor_lookup(true, 1);
        log_bind("strlen", "libc");
        log_bind_deferred("ghost");
        log_library_loaded("libm.so.6");
        log_library_error("libmissing.so", "not found");
        log_symbol_missing("no_such");
        log_invoke("strlen", 1);
    }
}
