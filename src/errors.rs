//! Error taxonomy for declaration, resolution, and invocation
//!
//! Every variant names the signature, aggregate, symbol, or module
//! involved. Declaration-time errors abort only the offending
//! declaration; resolution-time errors abort only that attempt and may
//! succeed on retry once the missing aggregate is finalized.

use std::fmt;

/// Binding failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FfiError {
    /// Declared and override argument counts disagree, or a call was
    /// issued with the wrong number of arguments. `name` is the
    /// signature name, qualified with the parameter name when a
    /// per-parameter override misses (`found` is 0 in that case).
    SignatureMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    /// Aggregate, member, or binding name declared twice
    DuplicateDeclaration { name: String },
    /// Resolution forced a forward reference that is still incomplete
    UnresolvedAggregate { name: String },
    /// Export table or library lookup failed for a symbol
    SymbolNotFound { symbol: String },
    /// Exporting module or library could not be loaded
    ModuleUnavailable { module: String },
    /// Raw-memory extent does not match the declared size exactly
    SizeMismatch {
        context: String,
        expected: usize,
        found: usize,
    },
}

impl FfiError {
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateDeclaration { name: name.into() }
    }

    pub fn unresolved(name: impl Into<String>) -> Self {
        Self::UnresolvedAggregate { name: name.into() }
    }

    pub fn symbol_not_found(symbol: impl Into<String>) -> Self {
        Self::SymbolNotFound {
            symbol: symbol.into(),
        }
    }

    pub fn module_unavailable(module: impl Into<String>) -> Self {
        Self::ModuleUnavailable {
            module: module.into(),
        }
    }

    pub fn size_mismatch(context: impl Into<String>, expected: usize, found: usize) -> Self {
        Self::SizeMismatch {
            context: context.into(),
            expected,
            found,
        }
    }
}

impl fmt::Display for FfiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignatureMismatch {
                name,
                expected,
                found,
            } => {
                write!(
                    f,
                    "Signature mismatch for '{}': expected {}, found {}",
                    name, expected, found
                )
            }
            Self::DuplicateDeclaration { name } => {
                write!(f, "Duplicate declaration: {}", name)
            }
            Self::UnresolvedAggregate { name } => {
                write!(f, "Unresolved aggregate: {}", name)
            }
            Self::SymbolNotFound { symbol } => {
                write!(f, "Symbol not found: {}", symbol)
            }
            Self::ModuleUnavailable { module } => {
                write!(f, "Module unavailable: {}", module)
            }
            Self::SizeMismatch {
                context,
                expected,
                found,
            } => {
                write!(
                    f,
                    "Size mismatch in {}: expected {}, found {}",
                    context, expected, found
                )
            }
        }
    }
}

impl std::error::Error for FfiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_entity() {
        let err = FfiError::duplicate("Point");
        assert_eq!(err.to_string(), "Duplicate declaration: Point");

        let err = FfiError::symbol_not_found("vec_len");
        assert_eq!(err.to_string(), "Symbol not found: vec_len");

        let err = FfiError::size_mismatch("Point.x", 4, 8);
        assert_eq!(err.to_string(), "Size mismatch in Point.x: expected 4, found 8");
    }

    #[test]
    fn test_mismatch_counts() {
        let err = FfiError::SignatureMismatch {
            name: "memcpy".into(),
            expected: 3,
            found: 2,
        };
        assert_eq!(
            err.to_string(),
            "Signature mismatch for 'memcpy': expected 3, found 2"
        );
    }
}
