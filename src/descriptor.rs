//! Call descriptor resolution and caching
//!
//! A `CallDescriptor` is the fully resolved native shape of a call:
//! effective return tag plus effective parameter tags, with aggregate
//! references forced. Descriptors are owned by the cache and shared by
//! identity: two signatures with the same effective shape resolve to
//! the same `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use smallvec::SmallVec;

use crate::core::tag::TypeTag;
use crate::errors::FfiError;
use crate::logging::log_descriptor_lookup;
use crate::registry::Registry;
use crate::signature::{CallingConvention, Signature};

/// Resolved native call shape
#[derive(Debug, PartialEq, Eq)]
pub struct CallDescriptor {
    ret: TypeTag,
    params: SmallVec<[TypeTag; 6]>,
}

impl CallDescriptor {
    pub fn ret(&self) -> TypeTag {
        self.ret
    }

    pub fn params(&self) -> &[TypeTag] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Everything resolution produces for one signature
#[derive(Debug, Clone)]
pub struct CallBinding {
    pub descriptor: Arc<CallDescriptor>,
    pub convention: CallingConvention,
    /// Symbol to look up, override applied
    pub symbol: String,
    /// Canonical declaration name, kept for diagnostics
    pub canonical: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ShapeKey {
    ret: TypeTag,
    params: SmallVec<[TypeTag; 6]>,
}

/// Cache statistics
#[derive(Debug, Clone, Copy)]
pub struct DescriptorStats {
    pub hits: u64,
    pub misses: u64,
}

impl DescriptorStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Shape-keyed descriptor cache
///
/// Resolution is compute-or-fetch: concurrent resolvers of the same
/// shape race, the first writer wins, and everyone observes the same
/// descriptor instance afterwards.
#[derive(Debug)]
pub struct DescriptorCache {
    registry: Arc<Registry>,
    shapes: DashMap<ShapeKey, Arc<CallDescriptor>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DescriptorCache {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            shapes: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Resolve a signature to its shared descriptor
    ///
    /// Forces every aggregate the effective tags reach through pointer
    /// chains; a reference that was never finalized fails with
    /// `UnresolvedAggregate`. Members of finalized shapes are not
    /// re-forced, so self-referential shapes resolve.
    pub fn resolve(&self, signature: &Signature) -> Result<Arc<CallDescriptor>, FfiError> {
        let ret = self.force(signature.effective_ret())?;
        let mut params: SmallVec<[TypeTag; 6]> = SmallVec::new();
        for tag in signature.effective_params() {
            params.push(self.force(tag)?);
        }

        if let Some(found) = self.shapes.get(&ShapeKey {
            ret,
            params: params.clone(),
        }) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log_descriptor_lookup(true, found.arity());
            return Ok(Arc::clone(&found));
        }

        let stored = params.clone();
        let mut inserted = false;
        let descriptor = self
            .shapes
            .entry(ShapeKey { ret, params })
            .or_insert_with(|| {
                inserted = true;
                Arc::new(CallDescriptor {
                    ret,
                    params: stored,
                })
            })
            .clone();
        if inserted {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            // Lost the race; the first writer's descriptor stands
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        log_descriptor_lookup(!inserted, descriptor.arity());
        Ok(descriptor)
    }

    /// Resolve and package with convention and symbol
    pub fn bind(&self, signature: &Signature) -> Result<CallBinding, FfiError> {
        let descriptor = self.resolve(signature)?;
        Ok(CallBinding {
            descriptor,
            convention: signature.convention(),
            symbol: signature.symbol().to_string(),
            canonical: signature.name().to_string(),
        })
    }

    fn force(&self, tag: TypeTag) -> Result<TypeTag, FfiError> {
        let canonical = self.registry.canonical_tag(tag);
        let mut probe = canonical;
        loop {
            match probe {
                TypeTag::Aggregate(id) => {
                    if self.registry.is_finalized(id) {
                        return Ok(canonical);
                    }
                    let name = self
                        .registry
                        .aggregate_name(id)
                        .unwrap_or_else(|| format!("aggregate#{}", id.index()));
                    return Err(FfiError::unresolved(name));
                }
                TypeTag::Pointer(binding) => match self.registry.binding(binding) {
                    Some(b) => probe = self.registry.canonical_tag(b.target),
                    // Binding minted by another registry; nothing to force
                    None => return Ok(canonical),
                },
                _ => return Ok(canonical),
            }
        }
    }

    pub fn stats(&self) -> DescriptorStats {
        DescriptorStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::normalize::Declared;
    use crate::signature::SignatureBuilder;

    fn setup() -> (Arc<Registry>, DescriptorCache, SignatureBuilder) {
        let registry = Arc::new(Registry::new());
        let cache = DescriptorCache::new(Arc::clone(&registry));
        let builder =
            SignatureBuilder::with_convention(Arc::clone(&registry), CallingConvention::C);
        (registry, cache, builder)
    }

    #[test]
    fn test_identical_shapes_share_one_descriptor() {
        let (_, cache, builder) = setup();
        let a = builder
            .build("first", &[("n", Declared::Int)], Declared::Float)
            .unwrap();
        let b = builder
            .build("second", &[("count", Declared::Int)], Declared::Float)
            .unwrap();

        let da = cache.resolve(&a).unwrap();
        let db = cache.resolve(&b).unwrap();
        assert!(Arc::ptr_eq(&da, &db));
        assert_eq!(cache.len(), 1);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert!(stats.hit_rate() > 0.4);
    }

    #[test]
    fn test_distinct_shapes_get_distinct_descriptors() {
        let (_, cache, builder) = setup();
        let a = builder.build("a", &[], Declared::Int).unwrap();
        let b = builder.build("b", &[], Declared::Float).unwrap();

        let da = cache.resolve(&a).unwrap();
        let db = cache.resolve(&b).unwrap();
        assert!(!Arc::ptr_eq(&da, &db));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_resolution_uses_effective_tags() {
        let (_, cache, builder) = setup();
        let plain = builder.build("plain", &[], Declared::Tag(TypeTag::I64)).unwrap();
        let overridden = builder
            .build_with(
                "overridden",
                &[],
                Declared::Int,
                &crate::signature::SignatureOverride::new().with_ret(Declared::Tag(TypeTag::I64)),
            )
            .unwrap();

        let da = cache.resolve(&plain).unwrap();
        let db = cache.resolve(&overridden).unwrap();
        assert!(Arc::ptr_eq(&da, &db));
        assert_eq!(db.ret(), TypeTag::I64);
    }

    #[test]
    fn test_unresolved_aggregate_then_retry() {
        let (registry, cache, builder) = setup();
        let sig = builder
            .build(
                "use_node",
                &[("n", Declared::ptr(Declared::Named("Node".into())))],
                Declared::Unit,
            )
            .unwrap();

        let err = cache.resolve(&sig).unwrap_err();
        assert_eq!(err, FfiError::unresolved("Node"));

        registry
            .declare_aggregate("Node", &[("value", Declared::Int)])
            .unwrap();
        let descriptor = cache.resolve(&sig).unwrap();
        assert_eq!(descriptor.arity(), 1);
    }

    #[test]
    fn test_self_referential_shape_resolves() {
        let (registry, cache, builder) = setup();
        let mut agg = registry.begin_aggregate("Node").unwrap();
        let self_ptr = Declared::ptr(Declared::Tag(agg.tag()));
        agg.add_field("value", Declared::Int)
            .add_field("next", self_ptr);
        agg.finish().unwrap();

        let sig = builder
            .build(
                "head",
                &[("list", Declared::ptr(Declared::Named("Node".into())))],
                Declared::Unit,
            )
            .unwrap();
        cache.resolve(&sig).unwrap();
    }

    #[test]
    fn test_named_and_tagged_views_share_descriptor() {
        let (registry, cache, builder) = setup();
        registry
            .declare_aggregate("Pt", &[("x", Declared::Float), ("y", Declared::Float)])
            .unwrap();
        let tag = registry.aggregate_ref("Pt");

        let by_name = builder
            .build(
                "move_a",
                &[("p", Declared::ptr(Declared::Named("Pt".into())))],
                Declared::Unit,
            )
            .unwrap();
        let by_tag = builder
            .build(
                "move_b",
                &[("p", Declared::ptr(Declared::Tag(tag)))],
                Declared::Unit,
            )
            .unwrap();

        let da = cache.resolve(&by_name).unwrap();
        let db = cache.resolve(&by_tag).unwrap();
        assert!(Arc::ptr_eq(&da, &db));
    }

    #[test]
    fn test_bind_carries_symbol_and_convention() {
        let (_, cache, builder) = setup();
        let sig = builder
            .build_with(
                "open",
                &[("path", Declared::Str)],
                Declared::Int,
                &crate::signature::SignatureOverride::new().with_symbol("open64"),
            )
            .unwrap();
        let binding = cache.bind(&sig).unwrap();
        assert_eq!(binding.symbol, "open64");
        assert_eq!(binding.canonical, "open");
        assert_eq!(binding.convention, CallingConvention::C);
    }

    #[test]
    fn test_concurrent_resolution_shares_identity() {
        use std::thread;

        let (_, cache, builder) = setup();
        let cache = Arc::new(cache);
        let sig = Arc::new(
            builder
                .build(
                    "hot",
                    &[("a", Declared::Int), ("b", Declared::Float)],
                    Declared::Int,
                )
                .unwrap(),
        );

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let sig = Arc::clone(&sig);
            handles.push(thread::spawn(move || cache.resolve(&sig).unwrap()));
        }
        let descriptors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for d in &descriptors[1..] {
            assert!(Arc::ptr_eq(&descriptors[0], d));
        }
        assert_eq!(cache.len(), 1);
    }
}
