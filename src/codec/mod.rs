//! Pluggable value codecs
//!
//! Maps a `TypeTag` to the pair of functions that move a value between
//! raw native bytes and a `RawValue`. The registry enforces exact
//! sizes: a buffer that is too short or too long is rejected before
//! any byte moves, so a failed write never leaves a partial value.

pub mod string;

use dashmap::DashMap;

use crate::core::tag::{RawValue, TaggedValue, TypeTag};
use crate::errors::FfiError;
use crate::registry::AggregateShape;

pub type DecodeFn = fn(&[u8]) -> RawValue;
pub type EncodeFn = fn(&RawValue, &mut [u8]);

/// Byte codec for one tag
///
/// `decode` and `encode` assume the slice holds exactly `size` bytes;
/// `CodecRegistry` validates that before dispatching.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    pub size: usize,
    pub decode: DecodeFn,
    pub encode: EncodeFn,
}

fn decode_i8(bytes: &[u8]) -> RawValue {
    RawValue::from_i64(bytes[0] as i8 as i64)
}

fn decode_i16(bytes: &[u8]) -> RawValue {
    let mut buf = [0u8; 2];
    buf.copy_from_slice(&bytes[..2]);
    RawValue::from_i64(i16::from_ne_bytes(buf) as i64)
}

fn decode_i32(bytes: &[u8]) -> RawValue {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    RawValue::from_i64(i32::from_ne_bytes(buf) as i64)
}

fn decode_i64(bytes: &[u8]) -> RawValue {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    RawValue::from_i64(i64::from_ne_bytes(buf))
}

fn decode_u8(bytes: &[u8]) -> RawValue {
    RawValue::from_u64(bytes[0] as u64)
}

fn decode_u16(bytes: &[u8]) -> RawValue {
    let mut buf = [0u8; 2];
    buf.copy_from_slice(&bytes[..2]);
    RawValue::from_u64(u16::from_ne_bytes(buf) as u64)
}

fn decode_u32(bytes: &[u8]) -> RawValue {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    RawValue::from_u64(u32::from_ne_bytes(buf) as u64)
}

fn decode_u64(bytes: &[u8]) -> RawValue {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    RawValue::from_u64(u64::from_ne_bytes(buf))
}

fn decode_f32(bytes: &[u8]) -> RawValue {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    RawValue::from_f32(f32::from_ne_bytes(buf))
}

fn decode_f64(bytes: &[u8]) -> RawValue {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    RawValue::from_f64(f64::from_ne_bytes(buf))
}

// Encoding only needs the low bytes of the word; constructors filled
// the rest, so truncation is exact for every width
fn encode_word1(value: &RawValue, out: &mut [u8]) {
    out[0] = unsafe { value.bits() } as u8;
}

fn encode_word2(value: &RawValue, out: &mut [u8]) {
    out[..2].copy_from_slice(&(unsafe { value.bits() } as u16).to_ne_bytes());
}

fn encode_word4(value: &RawValue, out: &mut [u8]) {
    out[..4].copy_from_slice(&(unsafe { value.bits() } as u32).to_ne_bytes());
}

fn encode_word8(value: &RawValue, out: &mut [u8]) {
    out[..8].copy_from_slice(&unsafe { value.bits() }.to_ne_bytes());
}

const POINTER: Codec = Codec {
    size: 8,
    decode: decode_u64,
    encode: encode_word8,
};

const DEFAULTS: [(TypeTag, Codec); 12] = [
    (TypeTag::I8, Codec { size: 1, decode: decode_i8, encode: encode_word1 }),
    (TypeTag::I16, Codec { size: 2, decode: decode_i16, encode: encode_word2 }),
    (TypeTag::I32, Codec { size: 4, decode: decode_i32, encode: encode_word4 }),
    (TypeTag::I64, Codec { size: 8, decode: decode_i64, encode: encode_word8 }),
    (TypeTag::U8, Codec { size: 1, decode: decode_u8, encode: encode_word1 }),
    (TypeTag::U16, Codec { size: 2, decode: decode_u16, encode: encode_word2 }),
    (TypeTag::U32, Codec { size: 4, decode: decode_u32, encode: encode_word4 }),
    (TypeTag::U64, Codec { size: 8, decode: decode_u64, encode: encode_word8 }),
    (TypeTag::F32, Codec { size: 4, decode: decode_f32, encode: encode_word4 }),
    (TypeTag::F64, Codec { size: 8, decode: decode_f64, encode: encode_word8 }),
    (TypeTag::VOID_PTR, POINTER),
    (TypeTag::NativeString, POINTER),
];

/// Tag-keyed codec registry
///
/// `with_defaults` installs the scalar codecs; `install` replaces or
/// extends them per tag. Pointer tags not installed individually fall
/// back to the void-pointer entry, so one installed word codec covers
/// every interned binding.
#[derive(Debug)]
pub struct CodecRegistry {
    codecs: DashMap<TypeTag, Codec>,
}

impl CodecRegistry {
    /// Empty registry; every lookup misses until codecs are installed
    pub fn new() -> Self {
        Self {
            codecs: DashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for (tag, codec) in DEFAULTS {
            registry.codecs.insert(tag, codec);
        }
        registry
    }

    /// Install or replace the codec for one tag
    pub fn install(&self, tag: TypeTag, codec: Codec) {
        self.codecs.insert(tag, codec);
    }

    pub fn lookup(&self, tag: TypeTag) -> Option<Codec> {
        if let Some(found) = self.codecs.get(&tag) {
            return Some(*found);
        }
        match tag {
            TypeTag::Pointer(_) => self.codecs.get(&TypeTag::VOID_PTR).map(|c| *c),
            _ => None,
        }
    }

    /// Decode exactly `codec.size` bytes into a value
    pub fn decode_value(&self, tag: TypeTag, bytes: &[u8]) -> Result<RawValue, FfiError> {
        let codec = self.lookup(tag).ok_or_else(|| {
            FfiError::size_mismatch(format!("decode {:?}", tag), 0, bytes.len())
        })?;
        if bytes.len() != codec.size {
            return Err(FfiError::size_mismatch(
                format!("decode {:?}", tag),
                codec.size,
                bytes.len(),
            ));
        }
        Ok((codec.decode)(bytes))
    }

    /// Encode a value into exactly `codec.size` bytes
    pub fn encode_value(
        &self,
        tag: TypeTag,
        value: &RawValue,
        out: &mut [u8],
    ) -> Result<(), FfiError> {
        let codec = self.lookup(tag).ok_or_else(|| {
            FfiError::size_mismatch(format!("encode {:?}", tag), 0, out.len())
        })?;
        if out.len() != codec.size {
            return Err(FfiError::size_mismatch(
                format!("encode {:?}", tag),
                codec.size,
                out.len(),
            ));
        }
        (codec.encode)(value, out);
        Ok(())
    }

    /// Read one member out of an aggregate's backing bytes
    ///
    /// The buffer must be exactly the shape's size; method members read
    /// as their function pointer word.
    pub fn read_field(
        &self,
        shape: &AggregateShape,
        name: &str,
        bytes: &[u8],
    ) -> Result<TaggedValue, FfiError> {
        if bytes.len() != shape.size() {
            return Err(FfiError::size_mismatch(
                format!("{} buffer", shape.name()),
                shape.size(),
                bytes.len(),
            ));
        }
        let layout = shape.member(name).ok_or_else(|| {
            FfiError::symbol_not_found(format!("{}.{}", shape.name(), name))
        })?;
        let tag = layout.member.wire_tag();
        let value = self.decode_value(tag, &bytes[layout.offset..layout.offset + layout.size])?;
        Ok(TaggedValue::new(tag, value))
    }

    /// Write one member into an aggregate's backing bytes
    ///
    /// Size checks run before any byte moves; a failed write leaves the
    /// buffer untouched.
    pub fn write_field(
        &self,
        shape: &AggregateShape,
        name: &str,
        bytes: &mut [u8],
        value: &RawValue,
    ) -> Result<(), FfiError> {
        if bytes.len() != shape.size() {
            return Err(FfiError::size_mismatch(
                format!("{} buffer", shape.name()),
                shape.size(),
                bytes.len(),
            ));
        }
        let layout = shape.member(name).ok_or_else(|| {
            FfiError::symbol_not_found(format!("{}.{}", shape.name(), name))
        })?;
        let tag = layout.member.wire_tag();
        self.encode_value(tag, value, &mut bytes[layout.offset..layout.offset + layout.size])
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
