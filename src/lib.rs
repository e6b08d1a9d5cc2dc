//! ffidecl - Declarative native-call bindings
//!
//! Normalizes declared parameter types into canonical tags, resolves
//! signatures into identity-shared call descriptors, and binds them to
//! entry points from dynamic libraries or in-process export tables.
//!
//! - `core`: type tags, declared types, raw call values
//! - `registry`: aggregate shapes and interned pointer bindings
//! - `signature`: declared signatures and overrides
//! - `descriptor`: shape-keyed descriptor cache
//! - `codec`: byte codecs over tagged values
//! - `resolver`: libraries, capsules, and bound callables
//! - `config`: explicit binding configuration
//! - `logging`: tracing helpers

pub mod codec;
pub mod config;
pub mod core;
pub mod descriptor;
pub mod errors;
pub mod logging;
pub mod registry;
pub mod resolver;
pub mod signature;

// Re-export the declaration-to-call surface
pub use crate::codec::string::CStrBuffer;
pub use crate::codec::{Codec, CodecRegistry};
pub use crate::config::{BindingConfig, CapsuleConfig, ConventionConfig, LibraryConfig};
pub use crate::core::{AggregateId, BindingId, Declared, RawValue, TaggedValue, TypeTag, Width};
pub use crate::descriptor::{CallBinding, CallDescriptor, DescriptorCache, DescriptorStats};
pub use crate::errors::FfiError;
pub use crate::registry::{
    AggregateBuilder, AggregateShape, Member, MemberLayout, PointerBinding, Registry,
};
pub use crate::resolver::{
    BoundFn, CapsuleBinding, Export, ExportTable, Library, LibraryBinding, NativeCall,
};
pub use crate::signature::{
    CallingConvention, Param, Signature, SignatureBuilder, SignatureOverride,
};
