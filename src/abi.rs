//! Exported interception entry points.
//!
//! Signatures mirror the real library's, so the dynamic linker substitutes
//! these for the host program's calls when the crate is preloaded. Ordering
//! inside each entry point is load-bearing: creation is recorded only after
//! the delegate has produced the object, and release reporting happens
//! before the delegate gets a chance to free it.
//!
//! The variadic `g_object_new` itself cannot be defined here; its
//! fixed-arity siblings, which carry the same traffic, are intercepted
//! instead (see DESIGN.md).

use std::ffi::CStr;
use std::io;
use std::os::raw::{c_char, c_uint, c_void};
use std::ptr;

use bstr::BStr;

use crate::control;
use crate::ffi::{GObject, GParameter, GType, GTypeInstance, GValue, VaList};
use crate::symbols::{self, GObjectApi};
use crate::tracker;
use crate::types::Handle;

unsafe fn type_name<'a>(api: &GObjectApi, object: *mut GObject) -> &'a BStr {
    let name = (api.type_name_from_instance)(object as *mut GTypeInstance);
    if name.is_null() {
        BStr::new("<unknown>")
    } else {
        // type names live in static type data, they outlive the object
        BStr::new(CStr::from_ptr(name).to_bytes())
    }
}

unsafe extern "C" fn finalize_notify(_data: *mut c_void, object: *mut GObject) {
    let mut err = io::stderr().lock();
    tracker::global().observe_finalized(&mut err, Handle::from_ptr(object));
}

unsafe fn register_creation(api: &GObjectApi, object: *mut GObject) {
    if object.is_null() {
        return;
    }
    let tracker = tracker::global();
    control::ensure_installed();
    let name = type_name(api, object);
    let tracked = {
        let mut err = io::stderr().lock();
        tracker.observe_created(&mut err, Handle::from_ptr(object), name)
    };
    if tracked {
        (api.weak_ref)(object, finalize_notify, ptr::null_mut());
    }
}

#[no_mangle]
pub unsafe extern "C" fn g_object_new_valist(
    object_type: GType,
    first_property_name: *const c_char,
    var_args: VaList,
) -> *mut GObject {
    let api = symbols::api();
    let object = (api.new_valist)(object_type, first_property_name, var_args);
    register_creation(api, object);
    object
}

#[no_mangle]
pub unsafe extern "C" fn g_object_newv(
    object_type: GType,
    n_parameters: c_uint,
    parameters: *mut GParameter,
) -> *mut GObject {
    let api = symbols::api();
    let object = (api.newv)(object_type, n_parameters, parameters);
    register_creation(api, object);
    object
}

#[no_mangle]
pub unsafe extern "C" fn g_object_new_with_properties(
    object_type: GType,
    n_properties: c_uint,
    names: *mut *const c_char,
    values: *const GValue,
) -> *mut GObject {
    let api = symbols::api();
    let object = (api.new_with_properties)(object_type, n_properties, names, values);
    register_creation(api, object);
    object
}

unsafe fn acquire(object: *mut GObject, delegate: crate::ffi::RefFn) -> *mut GObject {
    if object.is_null() {
        return delegate(object);
    }
    let api = symbols::api();
    let tracker = tracker::global();
    control::ensure_installed();
    let name = type_name(api, object);
    let before = (*object).ref_count;
    let result = delegate(object);
    let after = (*object).ref_count;
    let mut err = io::stderr().lock();
    tracker.observe_acquired(&mut err, Handle::from_ptr(object), name, before, after);
    result
}

#[no_mangle]
pub unsafe extern "C" fn g_object_ref(object: *mut GObject) -> *mut GObject {
    acquire(object, symbols::api().object_ref)
}

#[no_mangle]
pub unsafe extern "C" fn g_object_ref_sink(object: *mut GObject) -> *mut GObject {
    acquire(object, symbols::api().object_ref_sink)
}

#[no_mangle]
pub unsafe extern "C" fn g_object_unref(object: *mut GObject) {
    let api = symbols::api();
    if object.is_null() {
        return (api.object_unref)(object);
    }
    let tracker = tracker::global();
    control::ensure_installed();
    let name = type_name(api, object);
    let before = (*object).ref_count;
    {
        let mut err = io::stderr().lock();
        tracker.observe_released(&mut err, Handle::from_ptr(object), name, before);
    }
    // delegate last: releasing may free the object, and nothing may touch
    // it afterwards
    (api.object_unref)(object);
}
