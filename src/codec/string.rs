//! C string buffers and views
//!
//! Out-parameter string buffers hand the native side a caller-owned,
//! zeroed byte region; reads stop at the first NUL.

use std::ffi::CStr;
use std::os::raw::c_char;

use crate::core::tag::{RawValue, TaggedValue, TypeTag};

/// Default out-buffer length in bytes
pub const DEFAULT_BUFFER_LEN: usize = 1024;

/// Mutable NUL-terminated byte buffer for native string out-params
#[derive(Debug)]
pub struct CStrBuffer {
    bytes: Vec<u8>,
}

impl CStrBuffer {
    pub fn new() -> Self {
        Self::with_len(DEFAULT_BUFFER_LEN)
    }

    /// Zeroed buffer of an explicit byte length
    pub fn with_len(len: usize) -> Self {
        Self {
            bytes: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_ptr(&self) -> *const c_char {
        self.bytes.as_ptr() as *const c_char
    }

    pub fn as_mut_ptr(&mut self) -> *mut c_char {
        self.bytes.as_mut_ptr() as *mut c_char
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// View as a native-string argument
    ///
    /// Takes `&mut self` because the callee may write through the
    /// pointer; the buffer must outlive the call.
    pub fn as_tagged(&mut self) -> TaggedValue {
        let ptr = self.bytes.as_mut_ptr() as *const std::ffi::c_void;
        TaggedValue::new(TypeTag::NativeString, RawValue::from_ptr(ptr))
    }

    /// Decode the buffer contents up to the first NUL
    pub fn to_string_lossy(&self) -> String {
        let end = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.bytes.len());
        String::from_utf8_lossy(&self.bytes[..end]).into_owned()
    }
}

impl Default for CStrBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy a NUL-terminated native string into an owned `String`
///
/// Returns `None` for a null pointer.
///
/// # Safety
///
/// `ptr`, when non-null, must point to a NUL-terminated sequence valid
/// for reads for its whole length.
pub unsafe fn string_from_ptr(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_length() {
        let buffer = CStrBuffer::new();
        assert_eq!(buffer.len(), DEFAULT_BUFFER_LEN);
        assert_eq!(buffer.to_string_lossy(), "");
    }

    #[test]
    fn test_read_stops_at_nul() {
        let mut buffer = CStrBuffer::with_len(16);
        let written = b"warm\0cold";
        unsafe {
            std::ptr::copy_nonoverlapping(
                written.as_ptr(),
                buffer.as_mut_ptr() as *mut u8,
                written.len(),
            );
        }
        assert_eq!(buffer.to_string_lossy(), "warm");
    }

    #[test]
    fn test_tagged_view_is_native_string() {
        let mut buffer = CStrBuffer::with_len(8);
        let tagged = buffer.as_tagged();
        assert_eq!(tagged.tag, TypeTag::NativeString);
        assert_ne!(unsafe { tagged.value.bits() }, 0);
    }

    #[test]
    fn test_string_from_ptr() {
        let source = std::ffi::CString::new("native").unwrap();
        let copied = unsafe { string_from_ptr(source.as_ptr()) };
        assert_eq!(copied.as_deref(), Some("native"));
        assert_eq!(unsafe { string_from_ptr(std::ptr::null()) }, None);
    }
}
