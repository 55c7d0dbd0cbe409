//! Minimal GObject C ABI surface.
//!
//! The tracker never links against the host library; every operation is
//! resolved at runtime (see `symbols`). Only the handful of types the
//! intercepted signatures mention are declared here.

use std::os::raw::{c_char, c_uint, c_void};

pub type GType = usize;

#[repr(C)]
pub struct GTypeInstance {
    pub g_class: *mut c_void,
}

/// Instance layout of `GObject` itself. Only `ref_count` is ever read, and
/// only for handles still present in the live set.
#[repr(C)]
pub struct GObject {
    pub g_type_instance: GTypeInstance,
    pub ref_count: c_uint,
    pub qdata: *mut c_void,
}

/// `GValue` as laid out by GLib: a type tag plus two data words.
#[repr(C)]
pub struct GValue {
    pub g_type: GType,
    pub data: [u64; 2],
}

/// Element of the (deprecated but still exported) `g_object_newv` array.
#[repr(C)]
pub struct GParameter {
    pub name: *const c_char,
    pub value: GValue,
}

/// `va_list` is forwarded opaquely: the shim never constructs or reads one,
/// it only passes the caller's through to the delegate. In parameter
/// position a C `va_list` is pointer-sized on the supported ABIs.
pub type VaList = *mut c_void;

pub type GWeakNotify = unsafe extern "C" fn(*mut c_void, *mut GObject);

pub type NewValistFn = unsafe extern "C" fn(GType, *const c_char, VaList) -> *mut GObject;
pub type NewvFn = unsafe extern "C" fn(GType, c_uint, *mut GParameter) -> *mut GObject;
pub type NewWithPropertiesFn =
    unsafe extern "C" fn(GType, c_uint, *mut *const c_char, *const GValue) -> *mut GObject;
pub type RefFn = unsafe extern "C" fn(*mut GObject) -> *mut GObject;
pub type UnrefFn = unsafe extern "C" fn(*mut GObject);
pub type WeakRefFn = unsafe extern "C" fn(*mut GObject, GWeakNotify, *mut c_void);
pub type TypeNameFromInstanceFn = unsafe extern "C" fn(*mut GTypeInstance) -> *const c_char;

/// Reads `ref_count` from a live object.
///
/// The caller must guarantee the object has not been finalized; the engine
/// only probes handles still present in the live set, under its lock.
pub unsafe fn ref_count(object: *mut GObject) -> Option<u32> {
    if object.is_null() {
        None
    } else {
        Some((*object).ref_count)
    }
}
