//! Aggregate member layout
//!
//! Shapes are built member-by-member in declaration order, which is the
//! ABI layout order. `finish` freezes the shape and computes C struct
//! layout (member offsets, padding, total size, alignment).

use std::sync::Arc;

use crate::core::normalize::Declared;
use crate::core::tag::TypeTag;
use crate::errors::FfiError;
use crate::logging::log_aggregate_declared;
use crate::registry::Registry;
use crate::signature::Signature;

/// A single declared member of an aggregate
#[derive(Debug, Clone)]
pub enum Member {
    /// Data field
    Field(TypeTag),
    /// Callable member, laid out as a function pointer
    Method(Arc<Signature>),
}

impl Member {
    /// Tag seen by codecs and callers when reading this member's slot
    ///
    /// A method slot holds a raw entry-point address, so it reads as a
    /// void pointer.
    #[inline]
    pub fn wire_tag(&self) -> TypeTag {
        match self {
            Self::Field(tag) => *tag,
            Self::Method(_) => TypeTag::VOID_PTR,
        }
    }

    /// Signature of a method member
    pub fn signature(&self) -> Option<&Arc<Signature>> {
        match self {
            Self::Field(_) => None,
            Self::Method(sig) => Some(sig),
        }
    }
}

/// A laid-out member: name, kind, and byte extent within the aggregate
#[derive(Debug, Clone)]
pub struct MemberLayout {
    pub name: String,
    pub member: Member,
    pub offset: usize,
    pub size: usize,
}

/// Frozen ordered layout of an aggregate declaration
///
/// Member order is the declaration order and is load-bearing.
#[derive(Debug)]
pub struct AggregateShape {
    name: String,
    members: Vec<MemberLayout>,
    size: usize,
    align: usize,
    opaque: bool,
}

impl AggregateShape {
    pub(crate) fn opaque(name: String) -> Self {
        Self {
            name,
            members: Vec::new(),
            size: 0,
            align: 1,
            opaque: true,
        }
    }

    /// Declaration name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total size in bytes, including trailing padding
    pub fn size(&self) -> usize {
        self.size
    }

    /// Alignment requirement in bytes
    pub fn align(&self) -> usize {
        self.align
    }

    /// Check if the aggregate was declared without visible members
    pub fn is_opaque(&self) -> bool {
        self.opaque
    }

    /// Members in declaration order
    pub fn members(&self) -> &[MemberLayout] {
        &self.members
    }

    /// Look up a member by name
    pub fn member(&self, name: &str) -> Option<&MemberLayout> {
        self.members.iter().find(|m| m.name == name)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[inline]
const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Incremental aggregate declaration
///
/// Obtained from `Registry::begin_aggregate`; members are added in
/// declaration order and the shape is frozen by `finish`.
pub struct AggregateBuilder<'r> {
    registry: &'r Registry,
    id: crate::core::tag::AggregateId,
    name: String,
    members: Vec<(String, Member)>,
}

impl<'r> AggregateBuilder<'r> {
    pub(crate) fn new(
        registry: &'r Registry,
        id: crate::core::tag::AggregateId,
        name: String,
    ) -> Self {
        Self {
            registry,
            id,
            name,
            members: Vec::new(),
        }
    }

    /// Declaration name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tag of the aggregate under construction, usable for
    /// self-referential pointer members
    pub fn tag(&self) -> TypeTag {
        TypeTag::Aggregate(self.id)
    }

    /// Append a data field
    pub fn add_field(&mut self, name: &str, declared: Declared) -> &mut Self {
        let tag = self.registry.normalize(&declared);
        self.members.push((name.to_string(), Member::Field(tag)));
        self
    }

    /// Append a callable member, laid out as a function pointer
    pub fn add_method(&mut self, name: &str, signature: Arc<Signature>) -> &mut Self {
        self.members.push((name.to_string(), Member::Method(signature)));
        self
    }

    /// Freeze the shape: check member names, compute the C layout, and
    /// finalize the registry entry
    ///
    /// Fails with `DuplicateDeclaration` on a repeated member name and
    /// with `UnresolvedAggregate` if a by-value member's aggregate is
    /// still incomplete. Pointer members may reference incomplete
    /// aggregates, which is what makes self-referential shapes work.
    pub fn finish(self) -> Result<Arc<AggregateShape>, FfiError> {
        for (i, (name, _)) in self.members.iter().enumerate() {
            if self.members[..i].iter().any(|(seen, _)| seen == name) {
                return Err(FfiError::duplicate(format!("{}.{}", self.name, name)));
            }
        }

        let mut laid_out = Vec::with_capacity(self.members.len());
        let mut cursor = 0usize;
        let mut max_align = 1usize;

        for (name, member) in self.members {
            let (size, align) = match &member {
                Member::Field(tag) => self.registry.member_extent(*tag)?,
                Member::Method(_) => (8, 8),
            };
            let align = align.max(1);
            let offset = align_up(cursor, align);
            cursor = offset + size;
            max_align = max_align.max(align);
            laid_out.push(MemberLayout {
                name,
                member,
                offset,
                size,
            });
        }

        let shape = AggregateShape {
            name: self.name,
            size: align_up(cursor, max_align),
            align: max_align,
            members: laid_out,
            opaque: false,
        };
        let shape = self.registry.finalize(self.id, shape)?;
        log_aggregate_declared(shape.name(), shape.len(), shape.size());
        Ok(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tag::TypeTag;
    use crate::registry::Registry;

    #[test]
    fn test_c_layout_padding() {
        let registry = Registry::new();
        let mut b = registry.begin_aggregate("Header").unwrap();
        b.add_field("kind", Declared::Tag(TypeTag::I8))
            .add_field("stamp", Declared::Tag(TypeTag::I64))
            .add_field("flags", Declared::Tag(TypeTag::I16));
        let shape = b.finish().unwrap();

        assert_eq!(shape.member("kind").unwrap().offset, 0);
        assert_eq!(shape.member("stamp").unwrap().offset, 8);
        assert_eq!(shape.member("flags").unwrap().offset, 16);
        assert_eq!(shape.align(), 8);
        // 18 bytes of members, padded out to alignment
        assert_eq!(shape.size(), 24);
    }

    #[test]
    fn test_member_order_is_declaration_order() {
        let registry = Registry::new();
        let mut b = registry.begin_aggregate("Pair").unwrap();
        b.add_field("a", Declared::Tag(TypeTag::I32))
            .add_field("b", Declared::ptr(Declared::Tag(TypeTag::I8)));
        let shape = b.finish().unwrap();

        let names: Vec<&str> = shape.members().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_duplicate_member_rejected() {
        let registry = Registry::new();
        let mut b = registry.begin_aggregate("Dup").unwrap();
        b.add_field("x", Declared::Int).add_field("x", Declared::Float);
        let err = b.finish().unwrap_err();
        assert_eq!(err, FfiError::duplicate("Dup.x"));
    }

    #[test]
    fn test_self_reference_by_value_rejected() {
        let registry = Registry::new();
        let mut b = registry.begin_aggregate("Node").unwrap();
        let own = b.tag();
        b.add_field("next", Declared::Tag(own));
        let err = b.finish().unwrap_err();
        assert_eq!(err, FfiError::unresolved("Node"));
    }

    #[test]
    fn test_self_reference_by_pointer_allowed() {
        let registry = Registry::new();
        let mut b = registry.begin_aggregate("Node").unwrap();
        b.add_field("value", Declared::Int)
            .add_field("next", Declared::ptr(Declared::Named("Node".into())));
        let shape = b.finish().unwrap();
        assert_eq!(shape.member("next").unwrap().size, 8);
        assert_eq!(shape.size(), 16);
    }

    #[test]
    fn test_method_member_is_pointer_slot() {
        use crate::config::BindingConfig;
        use crate::signature::SignatureBuilder;

        let registry = std::sync::Arc::new(Registry::new());
        let sig_builder =
            SignatureBuilder::new(std::sync::Arc::clone(&registry), &BindingConfig::default());
        let destroy = sig_builder
            .build(
                "destroy",
                &[("this", Declared::ptr(Declared::Named("Vtbl".into())))],
                Declared::Unit,
            )
            .unwrap();

        let mut b = registry.begin_aggregate("Vtbl").unwrap();
        b.add_field("refcount", Declared::Tag(TypeTag::I64))
            .add_method("destroy", destroy);
        let shape = b.finish().unwrap();

        let slot = shape.member("destroy").unwrap();
        assert_eq!(slot.member.wire_tag(), TypeTag::VOID_PTR);
        assert!(slot.member.signature().is_some());
        assert_eq!(slot.offset, 8);
        assert_eq!(slot.size, 8);
        assert_eq!(shape.size(), 16);
    }

    #[test]
    fn test_nested_by_value_aggregate() {
        let registry = Registry::new();
        registry
            .declare_aggregate("Inner", &[("x", Declared::Tag(TypeTag::I64))])
            .unwrap();
        let shape = registry
            .declare_aggregate(
                "Outer",
                &[
                    ("lead", Declared::Tag(TypeTag::I8)),
                    ("inner", Declared::Named("Inner".into())),
                ],
            )
            .unwrap();
        assert_eq!(shape.member("inner").unwrap().offset, 8);
        assert_eq!(shape.size(), 16);
    }
}
