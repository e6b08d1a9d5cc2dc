//! Aggregate and pointer declaration registry
//!
//! The registry is the arena behind `TypeTag`: aggregate tags index its
//! aggregate entries, pointer tags index its interned pointer bindings.
//! Forward references are ids handed out before the aggregate is
//! finalized; the id never changes, only the entry behind it.
//!
//! Declaration happens single-threaded at start-up; afterwards the
//! registry is read-mostly and all lookups are lock-free or behind
//! short read locks.

pub mod shape;

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::core::normalize::Declared;
use crate::core::tag::{AggregateId, BindingId, TypeTag};
use crate::errors::FfiError;
use crate::logging::{log_aggregate_reserved, log_pointer_interned};

pub use shape::{AggregateBuilder, AggregateShape, Member, MemberLayout};

#[derive(Debug)]
enum AggregateEntry {
    /// Name referenced but not yet declared
    Reserved { name: String },
    /// Declaration complete; shape frozen for the process lifetime
    Finalized { shape: Arc<AggregateShape> },
}

impl AggregateEntry {
    fn name(&self) -> &str {
        match self {
            Self::Reserved { name } => name,
            Self::Finalized { shape } => shape.name(),
        }
    }
}

/// Interned pointer target
///
/// `count`, when present, directs buffer-materializing callers to back
/// the pointer with an owned allocation of that many elements. The
/// registry itself only interns the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerBinding {
    pub target: TypeTag,
    pub count: Option<usize>,
}

/// Arena of aggregate declarations and interned pointer bindings
#[derive(Debug)]
pub struct Registry {
    aggregates: RwLock<Vec<AggregateEntry>>,
    names: DashMap<String, AggregateId>,
    bindings: RwLock<Vec<PointerBinding>>,
    binding_index: DashMap<(TypeTag, Option<usize>), BindingId>,
}

impl Registry {
    pub fn new() -> Self {
        let registry = Self {
            aggregates: RwLock::new(Vec::new()),
            names: DashMap::new(),
            bindings: RwLock::new(Vec::new()),
            binding_index: DashMap::new(),
        };
        // Binding 0 is always the void pointer, so `TypeTag::VOID_PTR`
        // is valid against every registry
        let void = registry.intern_binding(TypeTag::Void, None);
        debug_assert_eq!(void, BindingId::VOID);
        registry
    }

    /// Reference an aggregate by name, reserving a forward entry if the
    /// name has not been declared yet
    pub fn aggregate_ref(&self, name: &str) -> TypeTag {
        self.canonical_tag(TypeTag::Aggregate(self.reserve(name)))
    }

    /// Begin an incremental aggregate declaration
    ///
    /// Completing a previously forward-referenced name is allowed;
    /// redeclaring a finalized name fails with `DuplicateDeclaration`.
    pub fn begin_aggregate(&self, name: &str) -> Result<AggregateBuilder<'_>, FfiError> {
        let id = self.reserve(name);
        if self.is_finalized(id) {
            return Err(FfiError::duplicate(name));
        }
        Ok(AggregateBuilder::new(self, id, name.to_string()))
    }

    /// Declare an aggregate in one shot from ordered fields
    pub fn declare_aggregate(
        &self,
        name: &str,
        fields: &[(&str, Declared)],
    ) -> Result<Arc<AggregateShape>, FfiError> {
        let mut builder = self.begin_aggregate(name)?;
        for (field, declared) in fields {
            builder.add_field(field, declared.clone());
        }
        builder.finish()
    }

    /// Declare an aggregate with no visible members
    ///
    /// Opaque aggregates cannot be rebuilt and are only useful behind a
    /// pointer; their by-value size is zero.
    pub fn declare_opaque(&self, name: &str) -> Result<TypeTag, FfiError> {
        let id = self.reserve(name);
        self.finalize(id, AggregateShape::opaque(name.to_string()))?;
        Ok(TypeTag::OpaqueAggregate(id))
    }

    /// Intern a pointer to a target tag
    pub fn pointer_to(&self, target: TypeTag) -> TypeTag {
        TypeTag::Pointer(self.intern_binding(target, None))
    }

    /// Intern a pointer to a named aggregate, possibly forward
    pub fn pointer_to_named(&self, name: &str) -> TypeTag {
        self.pointer_to(self.aggregate_ref(name))
    }

    /// Intern a pointer carrying a fixed element count
    ///
    /// A recurring `(target, count)` request returns the previously
    /// interned tag, so tag equality doubles as identity.
    pub fn bounded_pointer(&self, target: TypeTag, count: usize) -> TypeTag {
        TypeTag::Pointer(self.intern_binding(target, Some(count)))
    }

    /// Intern a bounded pointer to a named aggregate
    pub fn bounded_pointer_named(&self, name: &str, count: usize) -> TypeTag {
        self.bounded_pointer(self.aggregate_ref(name), count)
    }

    /// Normalize a declared type against this registry
    ///
    /// Total: scalars map through the fixed table, named aggregates are
    /// reserved or fetched, pointer and buffer declarations recurse and
    /// intern. Idempotent over its own output.
    pub fn normalize(&self, declared: &Declared) -> TypeTag {
        match declared {
            Declared::Unit => TypeTag::VOID_PTR,
            Declared::Bool | Declared::Int => TypeTag::I32,
            Declared::Float => TypeTag::F64,
            Declared::Str => TypeTag::NativeString,
            Declared::Tag(tag) => self.canonical_tag(*tag),
            Declared::Named(name) => self.aggregate_ref(name),
            Declared::Ptr(inner) => self.pointer_to(self.normalize(inner)),
            Declared::Buffer(inner, count) => self.bounded_pointer(self.normalize(inner), *count),
        }
    }

    /// Fold an aggregate tag onto its canonical spelling
    ///
    /// Opacity lives in the arena entry; a plain aggregate tag for a
    /// finalized opaque declaration reads back as `OpaqueAggregate`.
    pub fn canonical_tag(&self, tag: TypeTag) -> TypeTag {
        match tag {
            TypeTag::Aggregate(id) | TypeTag::OpaqueAggregate(id) => {
                match self.aggregates.read().get(id.index()) {
                    Some(AggregateEntry::Finalized { shape }) if shape.is_opaque() => {
                        TypeTag::OpaqueAggregate(id)
                    }
                    _ => TypeTag::Aggregate(id),
                }
            }
            other => other,
        }
    }

    /// Shape of a finalized aggregate
    pub fn shape(&self, id: AggregateId) -> Result<Arc<AggregateShape>, FfiError> {
        match self.aggregates.read().get(id.index()) {
            Some(AggregateEntry::Finalized { shape }) => Ok(shape.clone()),
            Some(AggregateEntry::Reserved { name }) => Err(FfiError::unresolved(name.clone())),
            None => Err(FfiError::unresolved(format!("aggregate#{}", id.index()))),
        }
    }

    /// Shape of a finalized aggregate, by declaration name
    pub fn shape_of(&self, name: &str) -> Result<Arc<AggregateShape>, FfiError> {
        let id = self
            .names
            .get(name)
            .map(|id| *id)
            .ok_or_else(|| FfiError::unresolved(name))?;
        self.shape(id)
    }

    /// Declaration name behind an aggregate id
    pub fn aggregate_name(&self, id: AggregateId) -> Option<String> {
        self.aggregates
            .read()
            .get(id.index())
            .map(|entry| entry.name().to_string())
    }

    /// Check whether an aggregate id has been finalized
    pub fn is_finalized(&self, id: AggregateId) -> bool {
        matches!(
            self.aggregates.read().get(id.index()),
            Some(AggregateEntry::Finalized { .. })
        )
    }

    /// Interned binding behind a pointer tag
    pub fn binding(&self, id: BindingId) -> Option<PointerBinding> {
        self.bindings.read().get(id.index()).copied()
    }

    /// Size in bytes of a value of this tag
    pub fn size_of(&self, tag: TypeTag) -> Result<usize, FfiError> {
        self.member_extent(tag).map(|(size, _)| size)
    }

    /// Alignment in bytes of a value of this tag
    pub fn align_of(&self, tag: TypeTag) -> Result<usize, FfiError> {
        self.member_extent(tag).map(|(_, align)| align)
    }

    /// (size, align) of a tag as a struct member
    pub(crate) fn member_extent(&self, tag: TypeTag) -> Result<(usize, usize), FfiError> {
        match tag {
            TypeTag::Aggregate(id) => {
                let shape = self.shape(id)?;
                Ok((shape.size(), shape.align()))
            }
            TypeTag::OpaqueAggregate(_) => Ok((0, 1)),
            scalar => Ok((scalar.size(), scalar.align())),
        }
    }

    /// Reserve (or fetch) the arena entry for a name
    fn reserve(&self, name: &str) -> AggregateId {
        if let Some(id) = self.names.get(name) {
            return *id;
        }
        *self.names.entry(name.to_string()).or_insert_with(|| {
            let mut aggregates = self.aggregates.write();
            let id = AggregateId::new(aggregates.len());
            aggregates.push(AggregateEntry::Reserved {
                name: name.to_string(),
            });
            log_aggregate_reserved(name);
            id
        })
    }

    /// Freeze a reserved entry
    ///
    /// First writer wins; a second finalization of the same id reports
    /// the duplicate.
    pub(crate) fn finalize(
        &self,
        id: AggregateId,
        shape: AggregateShape,
    ) -> Result<Arc<AggregateShape>, FfiError> {
        let mut aggregates = self.aggregates.write();
        match &aggregates[id.index()] {
            AggregateEntry::Finalized { shape } => Err(FfiError::duplicate(shape.name())),
            AggregateEntry::Reserved { .. } => {
                let shape = Arc::new(shape);
                aggregates[id.index()] = AggregateEntry::Finalized {
                    shape: shape.clone(),
                };
                Ok(shape)
            }
        }
    }

    fn intern_binding(&self, target: TypeTag, count: Option<usize>) -> BindingId {
        // Opacity is an entry property, not part of the interning key
        let target = match target {
            TypeTag::OpaqueAggregate(id) => TypeTag::Aggregate(id),
            other => other,
        };
        if let Some(id) = self.binding_index.get(&(target, count)) {
            return *id;
        }
        *self
            .binding_index
            .entry((target, count))
            .or_insert_with(|| {
                let mut bindings = self.bindings.write();
                let id = BindingId::new(bindings.len());
                bindings.push(PointerBinding { target, count });
                log_pointer_interned(&target, count);
                id
            })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tag::Width;

    #[test]
    fn test_void_pointer_preinterned() {
        let registry = Registry::new();
        assert_eq!(registry.pointer_to(TypeTag::Void), TypeTag::VOID_PTR);
        assert_eq!(registry.normalize(&Declared::Unit), TypeTag::VOID_PTR);
    }

    #[test]
    fn test_normalize_scalars() {
        let registry = Registry::new();
        assert_eq!(registry.normalize(&Declared::Int), TypeTag::I32);
        assert_eq!(registry.normalize(&Declared::Bool), TypeTag::I32);
        assert_eq!(registry.normalize(&Declared::Float), TypeTag::F64);
        assert_eq!(registry.normalize(&Declared::Str), TypeTag::NativeString);
    }

    #[test]
    fn test_normalize_idempotent() {
        let registry = Registry::new();
        let cases = [
            Declared::Unit,
            Declared::Int,
            Declared::Float,
            Declared::Str,
            Declared::Named("Fwd".into()),
            Declared::ptr(Declared::Named("Fwd".into())),
            Declared::buffer(Declared::Int, 16),
        ];
        for declared in cases {
            let once = registry.normalize(&declared);
            let twice = registry.normalize(&Declared::Tag(once));
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_forward_reference_becomes_concrete() {
        let registry = Registry::new();
        let before = registry.pointer_to_named("Late");
        registry
            .declare_aggregate("Late", &[("x", Declared::Int)])
            .unwrap();
        let after = registry.pointer_to_named("Late");

        // Same interned tag before and after; the entry behind it is
        // now finalized
        assert_eq!(before, after);
        let TypeTag::Pointer(binding) = after else {
            panic!("expected pointer tag");
        };
        let target = registry.binding(binding).unwrap().target;
        let TypeTag::Aggregate(id) = target else {
            panic!("expected aggregate target");
        };
        assert!(registry.is_finalized(id));
    }

    #[test]
    fn test_duplicate_declaration() {
        let registry = Registry::new();
        registry
            .declare_aggregate("Point", &[("x", Declared::Int)])
            .unwrap();
        let err = registry
            .declare_aggregate("Point", &[("x", Declared::Int)])
            .unwrap_err();
        assert_eq!(err, FfiError::duplicate("Point"));
    }

    #[test]
    fn test_reserved_name_can_still_be_declared() {
        let registry = Registry::new();
        let tag = registry.aggregate_ref("Pending");
        registry
            .declare_aggregate("Pending", &[("x", Declared::Int)])
            .unwrap();
        let TypeTag::Aggregate(id) = tag else {
            panic!("expected aggregate tag");
        };
        assert!(registry.is_finalized(id));
    }

    #[test]
    fn test_bounded_pointer_identity() {
        let registry = Registry::new();
        let first = registry.bounded_pointer(TypeTag::I8, 4);
        let second = registry.bounded_pointer(TypeTag::I8, 4);
        assert_eq!(first, second);

        let other_count = registry.bounded_pointer(TypeTag::I8, 8);
        assert_ne!(first, other_count);

        let unbounded = registry.pointer_to(TypeTag::I8);
        assert_ne!(first, unbounded);
    }

    #[test]
    fn test_opaque_aggregate() {
        let registry = Registry::new();
        let tag = registry.declare_opaque("Handle").unwrap();
        assert!(matches!(tag, TypeTag::OpaqueAggregate(_)));
        assert_eq!(registry.size_of(tag).unwrap(), 0);

        // Named references to an opaque declaration fold onto the
        // opaque spelling
        assert_eq!(registry.normalize(&Declared::Named("Handle".into())), tag);

        let err = registry.declare_opaque("Handle").unwrap_err();
        assert_eq!(err, FfiError::duplicate("Handle"));
    }

    #[test]
    fn test_opaque_and_plain_pointers_share_binding() {
        let registry = Registry::new();
        let forward = registry.pointer_to_named("Blob");
        registry.declare_opaque("Blob").unwrap();
        let after = registry.pointer_to_named("Blob");
        assert_eq!(forward, after);
    }

    #[test]
    fn test_shape_lookup_states() {
        let registry = Registry::new();
        let tag = registry.aggregate_ref("Unfinished");
        let TypeTag::Aggregate(id) = tag else {
            panic!("expected aggregate tag");
        };
        assert_eq!(registry.shape(id).unwrap_err(), FfiError::unresolved("Unfinished"));
        assert_eq!(
            registry.shape_of("NeverMentioned").unwrap_err(),
            FfiError::unresolved("NeverMentioned")
        );

        registry
            .declare_aggregate("Unfinished", &[("x", Declared::Int)])
            .unwrap();
        assert_eq!(registry.shape(id).unwrap().name(), "Unfinished");
    }

    #[test]
    fn test_int_width_tags() {
        let registry = Registry::new();
        let tag = registry.normalize(&Declared::Tag(TypeTag::U16));
        assert_eq!(tag, TypeTag::Int { width: Width::W16, signed: false });
    }

    #[test]
    fn test_concurrent_interning_yields_one_binding() {
        let registry = std::sync::Arc::new(Registry::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                registry.bounded_pointer(TypeTag::F64, 32)
            }));
        }
        let tags: Vec<TypeTag> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for tag in &tags {
            assert_eq!(*tag, tags[0]);
        }
    }
}
