//! Delegate resolution.
//!
//! The real object-system library is opened once and the implementation of
//! each intercepted operation resolved once, into a capability object the
//! shim calls through. Resolution failure is fatal: the host operation
//! cannot proceed without the real implementation, and tracking without it
//! is meaningless.

use std::ffi::{CStr, CString};
use std::mem;
use std::os::raw::c_void;
use std::process;

use once_cell::sync::Lazy;

use crate::error::{Error, Result};
use crate::ffi;

const LIBRARY: &str = "libgobject-2.0.so.0";

/// Owned `dlopen` handle. Never closed: delegates resolved from it must
/// stay callable for the life of the process.
pub struct Library {
    handle: *mut c_void,
}

unsafe impl Send for Library {}
unsafe impl Sync for Library {}

impl Library {
    pub fn open(name: &str) -> Result<Library> {
        let c_name = CString::new(name).map_err(|err| Error::LibraryOpen {
            library: name.to_owned(),
            reason: err.to_string(),
        })?;
        let handle = unsafe { libc::dlopen(c_name.as_ptr(), libc::RTLD_LAZY) };
        if handle.is_null() {
            return Err(Error::LibraryOpen {
                library: name.to_owned(),
                reason: dl_error(),
            });
        }
        Ok(Library { handle })
    }

    pub fn symbol(&self, name: &str) -> Result<*mut c_void> {
        let c_name = CString::new(name).map_err(|err| Error::SymbolResolution {
            symbol: name.to_owned(),
            reason: err.to_string(),
        })?;
        // clear any stale error state before probing
        unsafe { libc::dlerror() };
        let sym = unsafe { libc::dlsym(self.handle, c_name.as_ptr()) };
        if sym.is_null() {
            return Err(Error::SymbolResolution {
                symbol: name.to_owned(),
                reason: dl_error(),
            });
        }
        Ok(sym)
    }
}

fn dl_error() -> String {
    let err = unsafe { libc::dlerror() };
    if err.is_null() {
        "unknown loader error".to_owned()
    } else {
        unsafe { CStr::from_ptr(err) }.to_string_lossy().into_owned()
    }
}

/// One resolved delegate per intercepted operation, plus the two support
/// operations the shim needs (finalize subscription and type-name lookup).
pub struct GObjectApi {
    pub new_valist: ffi::NewValistFn,
    pub newv: ffi::NewvFn,
    pub new_with_properties: ffi::NewWithPropertiesFn,
    pub object_ref: ffi::RefFn,
    pub object_ref_sink: ffi::RefFn,
    pub object_unref: ffi::UnrefFn,
    pub weak_ref: ffi::WeakRefFn,
    pub type_name_from_instance: ffi::TypeNameFromInstanceFn,
}

impl GObjectApi {
    pub fn resolve(library: &Library) -> Result<GObjectApi> {
        unsafe {
            Ok(GObjectApi {
                new_valist: mem::transmute(library.symbol("g_object_new_valist")?),
                newv: mem::transmute(library.symbol("g_object_newv")?),
                new_with_properties: mem::transmute(
                    library.symbol("g_object_new_with_properties")?,
                ),
                object_ref: mem::transmute(library.symbol("g_object_ref")?),
                object_ref_sink: mem::transmute(library.symbol("g_object_ref_sink")?),
                object_unref: mem::transmute(library.symbol("g_object_unref")?),
                weak_ref: mem::transmute(library.symbol("g_object_weak_ref")?),
                type_name_from_instance: mem::transmute(
                    library.symbol("g_type_name_from_instance")?,
                ),
            })
        }
    }
}

static API: Lazy<GObjectApi> = Lazy::new(|| {
    match Library::open(LIBRARY).and_then(|library| GObjectApi::resolve(&library)) {
        Ok(api) => api,
        Err(err) => {
            log::error!("{err}");
            eprintln!("gobject-tracker: {err}");
            process::abort();
        }
    }
});

/// The process-wide delegate cache, populated on first interception.
pub fn api() -> &'static GObjectApi {
    &API
}
