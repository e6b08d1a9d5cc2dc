//! Function signature declaration and overrides
//!
//! A `Signature` keeps two views of a call shape: the declared
//! (normalized) parameter and return tags, retained for introspection,
//! and the effective tags actually used for the native call once
//! overrides are applied. The canonical name is always populated; an
//! override symbol takes precedence at resolution time without ever
//! replacing it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::BindingConfig;
use crate::core::normalize::Declared;
use crate::core::tag::TypeTag;
use crate::errors::FfiError;
use crate::logging::log_signature_built;
use crate::registry::Registry;

/// Declared calling convention
///
/// `Win32Stdcall` only differs from the C convention on 32-bit Windows;
/// 64-bit targets collapse both onto the platform convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallingConvention {
    #[serde(rename = "cdecl")]
    C,
    #[serde(rename = "stdcall")]
    Win32Stdcall,
}

impl CallingConvention {
    /// Conventional wire label
    #[inline]
    pub const fn label(self) -> &'static str {
        match self {
            Self::C => "cdecl",
            Self::Win32Stdcall => "stdcall",
        }
    }
}

impl Default for CallingConvention {
    #[inline]
    fn default() -> Self {
        Self::C
    }
}

/// Named, normalized parameter
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub tag: TypeTag,
}

/// Overrides applied to a declared signature
///
/// Override tags replace declared tags for native-call purposes only.
#[derive(Debug, Clone, Default)]
pub struct SignatureOverride {
    /// Full replacement parameter list; must match the declared count
    pub params: Option<Vec<Declared>>,
    /// Replacement return type
    pub ret: Option<Declared>,
    /// Raw or mangled symbol name used at resolution time
    pub symbol: Option<String>,
    /// Per-parameter replacements, applied on top of `params`
    pub by_name: Vec<(String, Declared)>,
    /// Per-signature calling convention
    pub convention: Option<CallingConvention>,
}

impl SignatureOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(mut self, params: Vec<Declared>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_ret(mut self, ret: Declared) -> Self {
        self.ret = Some(ret);
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, declared: Declared) -> Self {
        self.by_name.push((name.into(), declared));
        self
    }

    pub fn with_convention(mut self, convention: CallingConvention) -> Self {
        self.convention = Some(convention);
        self
    }

    fn is_empty(&self) -> bool {
        self.params.is_none()
            && self.ret.is_none()
            && self.symbol.is_none()
            && self.by_name.is_empty()
            && self.convention.is_none()
    }
}

/// Immutable normalized call signature
#[derive(Debug, Clone)]
pub struct Signature {
    name: String,
    symbol: Option<String>,
    params: Vec<Param>,
    ret: TypeTag,
    call_params: Option<SmallVec<[TypeTag; 6]>>,
    call_ret: Option<TypeTag>,
    convention: CallingConvention,
}

impl Signature {
    /// Canonical declaration name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Symbol name used at resolution time; the override, when present,
    /// takes precedence over the canonical name
    pub fn symbol(&self) -> &str {
        self.symbol.as_deref().unwrap_or(&self.name)
    }

    /// Override symbol, if any, for diagnostics
    pub fn symbol_override(&self) -> Option<&str> {
        self.symbol.as_deref()
    }

    /// Declared parameters in declaration order
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Declared return tag
    pub fn ret(&self) -> TypeTag {
        self.ret
    }

    /// Parameter count
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Parameter tags used for the native call
    pub fn effective_params(&self) -> SmallVec<[TypeTag; 6]> {
        match &self.call_params {
            Some(tags) => tags.clone(),
            None => self.params.iter().map(|p| p.tag).collect(),
        }
    }

    /// Return tag used for the native call
    pub fn effective_ret(&self) -> TypeTag {
        self.call_ret.unwrap_or(self.ret)
    }

    /// Check whether any type override is in effect
    pub fn has_type_overrides(&self) -> bool {
        self.call_params.is_some() || self.call_ret.is_some()
    }

    pub fn convention(&self) -> CallingConvention {
        self.convention
    }
}

/// Builds normalized signatures against a registry
///
/// The default convention comes from the configuration handed in at
/// construction; there is no ambient global.
#[derive(Debug)]
pub struct SignatureBuilder {
    registry: Arc<Registry>,
    default_convention: CallingConvention,
}

impl SignatureBuilder {
    pub fn new(registry: Arc<Registry>, config: &BindingConfig) -> Self {
        Self {
            registry,
            default_convention: config.convention.default,
        }
    }

    /// Build with an explicit default convention
    pub fn with_convention(registry: Arc<Registry>, convention: CallingConvention) -> Self {
        Self {
            registry,
            default_convention: convention,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Build a signature from ordered `(name, declared)` parameters
    pub fn build(
        &self,
        name: &str,
        params: &[(&str, Declared)],
        ret: Declared,
    ) -> Result<Arc<Signature>, FfiError> {
        self.build_with(name, params, ret, &SignatureOverride::default())
    }

    /// Build a signature, applying overrides
    ///
    /// An explicit override list whose length differs from the declared
    /// count, or a per-parameter override naming an unknown parameter,
    /// fails with `SignatureMismatch`.
    pub fn build_with(
        &self,
        name: &str,
        params: &[(&str, Declared)],
        ret: Declared,
        overrides: &SignatureOverride,
    ) -> Result<Arc<Signature>, FfiError> {
        let declared: Vec<Param> = params
            .iter()
            .map(|(pname, ptype)| Param {
                name: (*pname).to_string(),
                tag: self.registry.normalize(ptype),
            })
            .collect();
        let ret_tag = self.registry.normalize(&ret);

        let mut call_params: Option<SmallVec<[TypeTag; 6]>> = match &overrides.params {
            Some(list) => {
                if list.len() != declared.len() {
                    return Err(FfiError::SignatureMismatch {
                        name: name.to_string(),
                        expected: declared.len(),
                        found: list.len(),
                    });
                }
                Some(list.iter().map(|d| self.registry.normalize(d)).collect())
            }
            None => None,
        };

        for (pname, ptype) in &overrides.by_name {
            let index = declared
                .iter()
                .position(|p| p.name == *pname)
                .ok_or_else(|| FfiError::SignatureMismatch {
                    name: format!("{}.{}", name, pname),
                    expected: declared.len(),
                    found: 0,
                })?;
            let tags = call_params
                .get_or_insert_with(|| declared.iter().map(|p| p.tag).collect());
            tags[index] = self.registry.normalize(ptype);
        }

        let call_ret = overrides.ret.as_ref().map(|d| self.registry.normalize(d));
        let convention = overrides.convention.unwrap_or(self.default_convention);

        log_signature_built(name, declared.len(), !overrides.is_empty());
        Ok(Arc::new(Signature {
            name: name.to_string(),
            symbol: overrides.symbol.clone(),
            params: declared,
            ret: ret_tag,
            call_params,
            call_ret,
            convention,
        }))
    }
}
