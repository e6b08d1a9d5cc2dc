//! Native type tags and raw value containers
//!
//! Defines the closed type vocabulary shared by declarations,
//! descriptors, and codecs. Aggregate and pointer variants carry arena
//! indices issued by the registry, so tags stay `Copy` and tag equality
//! doubles as declaration identity.

/// Scalar width in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
}

impl Width {
    /// Width in bytes
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            Self::W8 => 1,
            Self::W16 => 2,
            Self::W32 => 4,
            Self::W64 => 8,
        }
    }
}

/// Index of an aggregate declaration in the registry arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AggregateId(u32);

impl AggregateId {
    #[inline]
    pub(crate) const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of an interned pointer binding in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(u32);

impl BindingId {
    /// The pre-interned void pointer, present in every registry
    pub const VOID: Self = Self(0);

    #[inline]
    pub(crate) const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Canonical native type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Void,
    Int { width: Width, signed: bool },
    Float { width: Width },
    /// Pointer through an interned binding; the target may be an
    /// aggregate that is not yet finalized (forward reference)
    Pointer(BindingId),
    /// By-value aggregate
    Aggregate(AggregateId),
    /// Aggregate with no visible members; only useful behind a pointer
    OpaqueAggregate(AggregateId),
    /// NUL-terminated C string, pointer-sized
    NativeString,
}

impl TypeTag {
    pub const I8: Self = Self::Int { width: Width::W8, signed: true };
    pub const I16: Self = Self::Int { width: Width::W16, signed: true };
    pub const I32: Self = Self::Int { width: Width::W32, signed: true };
    pub const I64: Self = Self::Int { width: Width::W64, signed: true };
    pub const U8: Self = Self::Int { width: Width::W8, signed: false };
    pub const U16: Self = Self::Int { width: Width::W16, signed: false };
    pub const U32: Self = Self::Int { width: Width::W32, signed: false };
    pub const U64: Self = Self::Int { width: Width::W64, signed: false };
    pub const F32: Self = Self::Float { width: Width::W32 };
    pub const F64: Self = Self::Float { width: Width::W64 };

    /// Pointer to nothing in particular, the normalization target for
    /// unit/void declarations
    pub const VOID_PTR: Self = Self::Pointer(BindingId::VOID);

    /// Size of a scalar value of this tag in bytes
    ///
    /// Aggregate extents live in the registry; by-value aggregate tags
    /// report 0 here and callers go through `Registry::size_of`.
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            Self::Void => 0,
            Self::Int { width, .. } => width.bytes(),
            Self::Float { width } => width.bytes(),
            Self::Pointer(_) | Self::NativeString => 8,
            Self::Aggregate(_) | Self::OpaqueAggregate(_) => 0,
        }
    }

    /// Alignment requirement for a scalar value of this tag
    #[inline]
    pub const fn align(self) -> usize {
        match self {
            Self::Void | Self::Aggregate(_) | Self::OpaqueAggregate(_) => 1,
            other => other.size(),
        }
    }

    /// Check if tag is an integer
    #[inline]
    pub const fn is_integral(self) -> bool {
        matches!(self, Self::Int { .. })
    }

    /// Check if tag is floating point
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float { .. })
    }

    /// Check if tag is pointer-sized (pointers and native strings)
    #[inline]
    pub const fn is_pointer(self) -> bool {
        matches!(self, Self::Pointer(_) | Self::NativeString)
    }

    /// Check if tag refers to an aggregate declaration by value
    #[inline]
    pub const fn is_aggregate(self) -> bool {
        matches!(self, Self::Aggregate(_) | Self::OpaqueAggregate(_))
    }
}

/// Untagged native value container
///
/// Constructors fill the entire word, sign- or zero-extending as
/// appropriate, so any view reads initialized bytes on little-endian
/// targets. Direct field construction skips that guarantee.
#[repr(C)]
pub union RawValue {
    pub i8: i8,
    pub i16: i16,
    pub i32: i32,
    pub i64: i64,
    pub u8: u8,
    pub u16: u16,
    pub u32: u32,
    pub u64: u64,
    pub f32: f32,
    pub f64: f64,
    pub ptr: *const std::ffi::c_void,
}

impl RawValue {
    /// Create void value, a zeroed word
    #[inline]
    pub const fn void() -> Self {
        Self { u64: 0 }
    }

    /// Create null pointer
    #[inline]
    pub const fn null() -> Self {
        Self {
            ptr: std::ptr::null(),
        }
    }

    /// Create from raw word bits
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self { u64: bits }
    }

    /// Create from signed integer, sign-extended to the full word
    #[inline]
    pub const fn from_i64(value: i64) -> Self {
        Self { i64: value }
    }

    /// Create from unsigned integer, zero-extended to the full word
    #[inline]
    pub const fn from_u64(value: u64) -> Self {
        Self { u64: value }
    }

    /// Create from single-precision float, bits in the low half-word
    #[inline]
    pub fn from_f32(value: f32) -> Self {
        Self {
            u64: value.to_bits() as u64,
        }
    }

    /// Create from double-precision float
    #[inline]
    pub const fn from_f64(value: f64) -> Self {
        Self { f64: value }
    }

    /// Create from pointer
    #[inline]
    pub const fn from_ptr(ptr: *const std::ffi::c_void) -> Self {
        Self { ptr }
    }

    /// Raw word bits
    ///
    /// # Safety
    /// The value must have been built by a constructor (or a full-word
    /// field write); partial field writes leave the upper bytes
    /// uninitialized.
    #[inline]
    pub unsafe fn bits(self) -> u64 {
        self.u64
    }
}

impl Default for RawValue {
    #[inline]
    fn default() -> Self {
        Self::null()
    }
}

// Manual impls: unions do not auto-derive Copy/Clone/Debug
impl Copy for RawValue {}
impl Clone for RawValue {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl std::fmt::Debug for RawValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawValue {{ .. }}")
    }
}

/// Tag-value pair crossing the codec and call boundaries
#[derive(Debug, Clone, Copy)]
pub struct TaggedValue {
    pub tag: TypeTag,
    pub value: RawValue,
}

impl TaggedValue {
    /// Create tagged value
    #[inline]
    pub const fn new(tag: TypeTag, value: RawValue) -> Self {
        Self { tag, value }
    }
}
