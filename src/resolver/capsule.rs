//! In-process export tables and capsule binding
//!
//! A capsule module publishes entry points through an `ExportTable`
//! instead of the dynamic linker. Binding against a table that never
//! became available can be deferred: construction succeeds and every
//! call reports the module as unavailable.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::CapsuleConfig;
use crate::descriptor::DescriptorCache;
use crate::errors::FfiError;
use crate::logging::{log_bind, log_bind_deferred, log_symbol_missing};
use crate::resolver::BoundFn;
use crate::signature::Signature;

/// One published entry point
#[derive(Debug, Clone)]
pub struct Export {
    pub ptr: *const (),
    /// Qualified export name this entry was published under, if any
    pub mangled: Option<String>,
}

unsafe impl Send for Export {}
unsafe impl Sync for Export {}

/// Named set of in-process exports
#[derive(Debug)]
pub struct ExportTable {
    module: String,
    exports: DashMap<String, Export>,
}

impl ExportTable {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            exports: DashMap::new(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Publish an entry point under its logical name
    pub fn insert(&self, name: &str, ptr: *const ()) {
        self.exports.insert(
            name.to_string(),
            Export {
                ptr,
                mangled: None,
            },
        );
    }

    /// Publish a qualified `module.function` export
    ///
    /// The logical name is the segment after the last dot; the full
    /// qualified name is retained on the export.
    pub fn insert_qualified(&self, qualified: &str, ptr: *const ()) {
        match qualified.rsplit_once('.') {
            Some((_, name)) => {
                self.exports.insert(
                    name.to_string(),
                    Export {
                        ptr,
                        mangled: Some(qualified.to_string()),
                    },
                );
            }
            None => self.insert(qualified, ptr),
        }
    }

    pub fn get(&self, name: &str) -> Option<Export> {
        self.exports.get(name).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }
}

/// Declared functions bound against one capsule module
#[derive(Debug)]
pub struct CapsuleBinding {
    module: String,
    table: Option<ExportTable>,
    cache: Arc<DescriptorCache>,
    entries: Vec<Arc<BoundFn>>,
    index: HashMap<String, usize>,
}

impl CapsuleBinding {
    /// Bind against an available export table
    pub fn new(table: ExportTable, cache: Arc<DescriptorCache>) -> Self {
        Self {
            module: table.module().to_string(),
            table: Some(table),
            cache,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Binding whose module never became available
    ///
    /// Declarations still resolve against the cache; every call through
    /// them fails with `ModuleUnavailable`.
    pub fn unavailable(module: &str, cache: Arc<DescriptorCache>) -> Self {
        Self {
            module: module.to_string(),
            table: None,
            cache,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Construct from a possibly-absent table
    ///
    /// An absent table is a hard error unless the configuration defers
    /// unavailable capsules.
    pub fn from_table(
        module: &str,
        table: Option<ExportTable>,
        cache: Arc<DescriptorCache>,
        config: &CapsuleConfig,
    ) -> Result<Self, FfiError> {
        match table {
            Some(table) => Ok(Self::new(table, cache)),
            None if config.defer_unavailable => {
                log_bind_deferred(module);
                Ok(Self::unavailable(module, cache))
            }
            None => Err(FfiError::module_unavailable(module)),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn is_available(&self) -> bool {
        self.table.is_some()
    }

    pub fn cache(&self) -> &Arc<DescriptorCache> {
        &self.cache
    }

    /// Bind one declared signature to a published export
    ///
    /// The descriptor resolves first, so an unresolved aggregate
    /// surfaces even when the module is deferred.
    pub fn bind(&mut self, signature: &Signature) -> Result<Arc<BoundFn>, FfiError> {
        if self.index.contains_key(signature.name()) {
            return Err(FfiError::duplicate(signature.name()));
        }
        let binding = self.cache.bind(signature)?;
        let bound = match &self.table {
            None => Arc::new(BoundFn::unavailable(binding, &self.module)),
            Some(table) => {
                let export = table.get(&binding.symbol).ok_or_else(|| {
                    log_symbol_missing(&binding.symbol);
                    FfiError::symbol_not_found(format!("{}::{}", self.module, binding.symbol))
                })?;
                Arc::new(BoundFn::new(binding, export.ptr))
            }
        };
        log_bind(bound.symbol(), &self.module);
        self.index
            .insert(signature.name().to_string(), self.entries.len());
        self.entries.push(Arc::clone(&bound));
        Ok(bound)
    }

    /// Look up a previously bound function by canonical name
    pub fn get(&self, name: &str) -> Option<Arc<BoundFn>> {
        self.index.get(name).map(|&i| Arc::clone(&self.entries[i]))
    }

    /// Bound functions in declaration order
    pub fn entries(&self) -> &[Arc<BoundFn>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
