//! Dynamic library loading and symbol resolution
//!
//! Platform wrapper around dlopen/LoadLibrary plus the binding layer
//! that pairs exported symbols with resolved descriptors.

use std::collections::HashMap;
use std::ffi::c_void;
use std::ffi::CString;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::config::LibraryConfig;
use crate::descriptor::DescriptorCache;
use crate::errors::FfiError;
use crate::logging::{log_bind, log_library_error, log_library_loaded, log_symbol_missing};
use crate::resolver::BoundFn;
use crate::signature::Signature;

/// Handle to a dynamically loaded library
#[derive(Debug)]
pub struct Library {
    handle: NonNull<c_void>,
    /// Process handles obtained without a load are not closed on drop
    owned: bool,
}

impl Library {
    /// Load a library by name through the system search paths
    ///
    /// Use `load_path` for explicit paths and `open` for configured
    /// search paths.
    pub fn load(name: &str) -> Result<Self, FfiError> {
        Self::load_impl(name)
    }

    /// Load a library from an explicit path
    pub fn load_path(path: &str) -> Result<Self, FfiError> {
        Self::load_impl(path)
    }

    /// Load a library honoring configured search paths
    pub fn open(name: &str, config: &LibraryConfig) -> Result<Self, FfiError> {
        for dir in &config.search_paths {
            let candidate = std::path::Path::new(dir).join(name);
            if let Ok(library) = Self::load_impl(&candidate.to_string_lossy()) {
                return Ok(library);
            }
        }
        if config.system_paths {
            return Self::load_impl(name);
        }
        Err(FfiError::module_unavailable(name))
    }

    /// Handle for the running process itself
    ///
    /// Resolves symbols already linked into the process image, the way
    /// a load of a null module name does.
    #[cfg(unix)]
    pub fn this() -> Result<Self, FfiError> {
        unsafe {
            let handle = libc::dlopen(std::ptr::null(), libc::RTLD_NOW);
            NonNull::new(handle)
                .map(|handle| Self {
                    handle,
                    owned: true,
                })
                .ok_or_else(|| FfiError::module_unavailable("self"))
        }
    }

    #[cfg(windows)]
    pub fn this() -> Result<Self, FfiError> {
        use winapi::um::libloaderapi::GetModuleHandleW;

        unsafe {
            let handle = GetModuleHandleW(std::ptr::null());
            NonNull::new(handle as *mut c_void)
                .map(|handle| Self {
                    handle,
                    // GetModuleHandle does not take a reference
                    owned: false,
                })
                .ok_or_else(|| FfiError::module_unavailable("self"))
        }
    }

    #[cfg(unix)]
    fn load_impl(name: &str) -> Result<Self, FfiError> {
        use std::ffi::CStr;

        let cname = CString::new(name).map_err(|_| FfiError::module_unavailable(name))?;

        unsafe {
            let handle = libc::dlopen(cname.as_ptr(), libc::RTLD_NOW);
            match NonNull::new(handle) {
                Some(handle) => {
                    log_library_loaded(name);
                    Ok(Self {
                        handle,
                        owned: true,
                    })
                }
                None => {
                    let err = libc::dlerror();
                    let detail = if err.is_null() {
                        "unknown error".to_string()
                    } else {
                        CStr::from_ptr(err).to_string_lossy().into_owned()
                    };
                    log_library_error(name, &detail);
                    Err(FfiError::module_unavailable(name))
                }
            }
        }
    }

    #[cfg(windows)]
    fn load_impl(name: &str) -> Result<Self, FfiError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::errhandlingapi::GetLastError;
        use winapi::um::libloaderapi::LoadLibraryW;

        let wide: Vec<u16> = OsStr::new(name).encode_wide().chain(Some(0)).collect();

        unsafe {
            let handle = LoadLibraryW(wide.as_ptr());
            match NonNull::new(handle as *mut c_void) {
                Some(handle) => {
                    log_library_loaded(name);
                    Ok(Self {
                        handle,
                        owned: true,
                    })
                }
                None => {
                    let detail = format!("error code {}", GetLastError());
                    log_library_error(name, &detail);
                    Err(FfiError::module_unavailable(name))
                }
            }
        }
    }

    /// Get a function pointer by symbol name
    pub fn symbol(&self, name: &str) -> Result<*const (), FfiError> {
        self.symbol_impl(name)
    }

    #[cfg(unix)]
    fn symbol_impl(&self, name: &str) -> Result<*const (), FfiError> {
        let cname = CString::new(name).map_err(|_| FfiError::symbol_not_found(name))?;

        unsafe {
            let ptr = libc::dlsym(self.handle.as_ptr(), cname.as_ptr());
            if ptr.is_null() {
                log_symbol_missing(name);
                Err(FfiError::symbol_not_found(name))
            } else {
                Ok(ptr as *const ())
            }
        }
    }

    #[cfg(windows)]
    fn symbol_impl(&self, name: &str) -> Result<*const (), FfiError> {
        use winapi::um::libloaderapi::GetProcAddress;

        let cname = CString::new(name).map_err(|_| FfiError::symbol_not_found(name))?;

        unsafe {
            let ptr = GetProcAddress(self.handle.as_ptr() as *mut _, cname.as_ptr());
            if ptr.is_null() {
                log_symbol_missing(name);
                Err(FfiError::symbol_not_found(name))
            } else {
                Ok(ptr as *const ())
            }
        }
    }
}

impl Drop for Library {
    #[cfg(unix)]
    fn drop(&mut self) {
        if self.owned {
            unsafe {
                libc::dlclose(self.handle.as_ptr());
            }
        }
    }

    #[cfg(windows)]
    fn drop(&mut self) {
        use winapi::um::libloaderapi::FreeLibrary;

        if self.owned {
            unsafe {
                FreeLibrary(self.handle.as_ptr() as *mut _);
            }
        }
    }
}

unsafe impl Send for Library {}
unsafe impl Sync for Library {}

/// Declared functions bound against one loaded library
///
/// Entries keep declaration order; canonical names are unique within
/// one binding.
#[derive(Debug)]
pub struct LibraryBinding {
    module: String,
    library: Library,
    cache: Arc<DescriptorCache>,
    entries: Vec<Arc<BoundFn>>,
    index: HashMap<String, usize>,
}

impl LibraryBinding {
    /// Open a library and prepare an empty binding
    pub fn open(
        name: &str,
        cache: Arc<DescriptorCache>,
        config: &LibraryConfig,
    ) -> Result<Self, FfiError> {
        let library = Library::open(name, config)?;
        Ok(Self::with_library(name, library, cache))
    }

    /// Wrap an already loaded library
    pub fn with_library(module: &str, library: Library, cache: Arc<DescriptorCache>) -> Self {
        Self {
            module: module.to_string(),
            library,
            cache,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn cache(&self) -> &Arc<DescriptorCache> {
        &self.cache
    }

    /// Bind one declared signature to its exported symbol
    ///
    /// Resolution order: descriptor first, then symbol lookup, so an
    /// unresolved aggregate surfaces before a missing export. The
    /// canonical name must not already be bound here.
    pub fn bind(&mut self, signature: &Signature) -> Result<Arc<BoundFn>, FfiError> {
        if self.index.contains_key(signature.name()) {
            return Err(FfiError::duplicate(signature.name()));
        }
        let binding = self.cache.bind(signature)?;
        let ptr = self.library.symbol(&binding.symbol)?;
        let bound = Arc::new(BoundFn::new(binding, ptr));
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
