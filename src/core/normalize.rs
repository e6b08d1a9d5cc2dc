//! Declared-type surface and scalar normalization
//!
//! `Declared` is what binding declarations are written in; normalization
//! collapses it onto the closed `TypeTag` vocabulary. The scalar mapping
//! is fixed and total; named, pointer, and buffer declarations defer to
//! the registry (`Registry::normalize`), which interns them.

use crate::core::tag::TypeTag;

/// A type as written in a binding declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Declared {
    /// No value (missing annotation or explicit unit)
    Unit,
    Bool,
    Int,
    Float,
    Str,
    /// Reference to an aggregate by declaration name, possibly forward
    Named(String),
    /// Pointer to a declared type
    Ptr(Box<Declared>),
    /// Pointer backed by an owned allocation of `n` elements
    Buffer(Box<Declared>, usize),
    /// Already-canonical tag, passed through unchanged
    Tag(TypeTag),
}

impl Declared {
    /// Shorthand for a pointer declaration
    pub fn ptr(inner: Declared) -> Self {
        Self::Ptr(Box::new(inner))
    }

    /// Shorthand for a buffer declaration
    pub fn buffer(inner: Declared, count: usize) -> Self {
        Self::Buffer(Box::new(inner), count)
    }

    /// Normalize without aggregate context
    ///
    /// Returns `None` for named, pointer, and buffer declarations,
    /// which need the registry to intern their targets.
    pub fn scalar_tag(&self) -> Option<TypeTag> {
        match self {
            Self::Unit => Some(TypeTag::VOID_PTR),
            Self::Bool | Self::Int => Some(TypeTag::I32),
            Self::Float => Some(TypeTag::F64),
            Self::Str => Some(TypeTag::NativeString),
            Self::Tag(tag) => Some(*tag),
            Self::Named(_) | Self::Ptr(_) | Self::Buffer(_, _) => None,
        }
    }
}

impl From<TypeTag> for Declared {
    fn from(tag: TypeTag) -> Self {
        Self::Tag(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_map() {
        assert_eq!(Declared::Unit.scalar_tag(), Some(TypeTag::VOID_PTR));
        assert_eq!(Declared::Bool.scalar_tag(), Some(TypeTag::I32));
        assert_eq!(Declared::Int.scalar_tag(), Some(TypeTag::I32));
        assert_eq!(Declared::Float.scalar_tag(), Some(TypeTag::F64));
        assert_eq!(Declared::Str.scalar_tag(), Some(TypeTag::NativeString));
    }

    #[test]
    fn test_tag_passthrough() {
        // Already-canonical tags survive unchanged, including Void
        assert_eq!(Declared::Tag(TypeTag::Void).scalar_tag(), Some(TypeTag::Void));
        assert_eq!(Declared::Tag(TypeTag::U16).scalar_tag(), Some(TypeTag::U16));
    }

    #[test]
    fn test_scalar_idempotence() {
        let scalars = [
            Declared::Unit,
            Declared::Bool,
            Declared::Int,
            Declared::Float,
            Declared::Str,
        ];
        for declared in scalars {
            let once = declared.scalar_tag().unwrap();
            let twice = Declared::Tag(once).scalar_tag().unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_deferred_cases() {
        assert_eq!(Declared::Named("Point".into()).scalar_tag(), None);
        assert_eq!(Declared::ptr(Declared::Int).scalar_tag(), None);
        assert_eq!(Declared::buffer(Declared::Int, 4).scalar_tag(), None);
    }
}
