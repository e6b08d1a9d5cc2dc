//! Core type vocabulary
//!
//! Fundamental tag and value definitions shared by the registry,
//! signature builder, descriptor cache, and codecs.

pub mod normalize;
pub mod tag;

pub use normalize::Declared;
pub use tag::{AggregateId, BindingId, RawValue, TaggedValue, TypeTag, Width};
