#![allow(clippy::not_unsafe_ptr_arg_deref)]

use crate::driver::{ScpDriverInterface, default_registry, scp_driver_interface_slots};
use crate::error::{AbiError, ManifestError};
use crate::member::{MemberPointer, SlotIndex, decode_slot};
use crate::probe::{MethodPointError, check_member_pointers};
use crate::registry::InterfaceRegistry;
use crate::shape::{InheritanceShape, measure_raw};
use crate::vtable::{count_slots_raw, read_slot_raw, set_max_scan_slots};
use std::cell::RefCell;
use std::ffi::{CStr, c_void};
use std::os::raw::c_char;

#[repr(C)]
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum scpvt_result_t {
    SCPVT_OK = 0,
    SCPVT_ERR_NULL_ARGUMENT = 1,
    SCPVT_ERR_MALFORMED_TABLE = 2,
    SCPVT_ERR_NOT_VIRTUAL = 3,
    SCPVT_ERR_SHAPE_MISMATCH = 4,
    SCPVT_ERR_SLOT_OUT_OF_RANGE = 5,
    SCPVT_ERR_INVALID_SHAPE = 6,
    SCPVT_ERR_UNKNOWN_INTERFACE = 7,
    SCPVT_ERR_LAYOUT_DRIFT = 8,
    SCPVT_ERR_MANIFEST = 9,
}

thread_local! {
    static LAST_ERROR: RefCell<String> = const { RefCell::new(String::new()) };
}

fn set_last_error(msg: impl Into<String>) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = msg.into();
    });
}

fn map_abi_error(err: &AbiError) -> scpvt_result_t {
    match err {
        AbiError::MalformedDispatchTable { .. } => scpvt_result_t::SCPVT_ERR_MALFORMED_TABLE,
        AbiError::NotAVirtualMemberPointer { .. } => scpvt_result_t::SCPVT_ERR_NOT_VIRTUAL,
        AbiError::ShapeMismatch { .. } => scpvt_result_t::SCPVT_ERR_SHAPE_MISMATCH,
        AbiError::SlotOutOfRange { .. } => scpvt_result_t::SCPVT_ERR_SLOT_OUT_OF_RANGE,
        AbiError::InvalidShape(_) => scpvt_result_t::SCPVT_ERR_INVALID_SHAPE,
        AbiError::UnknownInterface(_) => scpvt_result_t::SCPVT_ERR_UNKNOWN_INTERFACE,
        AbiError::LayoutDrift { .. } => scpvt_result_t::SCPVT_ERR_LAYOUT_DRIFT,
    }
}

fn fail(err: AbiError) -> scpvt_result_t {
    let code = map_abi_error(&err);
    set_last_error(err.to_string());
    code
}

fn fail_manifest(err: ManifestError) -> scpvt_result_t {
    match err {
        ManifestError::Shape(e) => fail(e),
        other => {
            set_last_error(other.to_string());
            scpvt_result_t::SCPVT_ERR_MANIFEST
        }
    }
}

fn cstr_to_str<'a>(ptr: *const c_char) -> Result<&'a str, &'static str> {
    if ptr.is_null() {
        return Err("null pointer");
    }
    unsafe { CStr::from_ptr(ptr).to_str().map_err(|_| "invalid utf-8") }
}

/// Copies the last error message (NUL terminated, truncated to fit) and returns its full length.
#[unsafe(no_mangle)]
pub extern "C" fn scpvt_last_error(buf: *mut u8, buf_len: usize) -> usize {
    let msg = LAST_ERROR.with(|e| e.borrow().clone());
    let bytes = msg.as_bytes();
    let copy_len = bytes.len().min(buf_len.saturating_sub(1));
    if !buf.is_null() && buf_len > 0 {
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf, copy_len);
            *buf.add(copy_len) = 0;
        }
    }
    bytes.len()
}

#[unsafe(no_mangle)]
pub extern "C" fn scpvt_set_max_scan_slots(limit: usize) {
    set_max_scan_slots(limit);
}

/// `instance` must point at a fully constructed polymorphic object.
#[unsafe(no_mangle)]
pub extern "C" fn scpvt_count_slots(instance: *const c_void, out_count: *mut usize) -> scpvt_result_t {
    set_last_error("");
    if instance.is_null() || out_count.is_null() {
        set_last_error("instance or out_count is null");
        return scpvt_result_t::SCPVT_ERR_NULL_ARGUMENT;
    }
    match unsafe { count_slots_raw(instance) } {
        Ok(count) => {
            unsafe { *out_count = count };
            scpvt_result_t::SCPVT_OK
        }
        Err(e) => fail(e),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn scpvt_decode_slot(
    raw: i64,
    pointer_width: usize,
    out_index: *mut usize,
) -> scpvt_result_t {
    set_last_error("");
    if out_index.is_null() {
        set_last_error("out_index is null");
        return scpvt_result_t::SCPVT_ERR_NULL_ARGUMENT;
    }
    match decode_slot(MemberPointer::from_raw(raw), pointer_width) {
        Ok(index) => {
            unsafe { *out_index = index.get() };
            scpvt_result_t::SCPVT_OK
        }
        Err(e) => fail(e),
    }
}

/// Writes whether the attributable slot count equals `expected`. A mismatch is
/// still `SCPVT_OK`; only malformed input is an error.
#[unsafe(no_mangle)]
pub extern "C" fn scpvt_validate_shape(
    instance: *const c_void,
    chain_depth: usize,
    baseline_per_level: usize,
    expected: usize,
    out_matches: *mut bool,
) -> scpvt_result_t {
    set_last_error("");
    if instance.is_null() || out_matches.is_null() {
        set_last_error("instance or out_matches is null");
        return scpvt_result_t::SCPVT_ERR_NULL_ARGUMENT;
    }
    let shape = match InheritanceShape::new(chain_depth, baseline_per_level) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    match unsafe { measure_raw(instance, shape, expected) } {
        Ok(report) => {
            if !report.matches() {
                set_last_error(format!(
                    "expected {} slots, observed {} ({} attributable)",
                    report.expected, report.observed, report.attributable
                ));
            }
            unsafe { *out_matches = report.matches() };
            scpvt_result_t::SCPVT_OK
        }
        Err(e) => fail(e),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn scpvt_scp_driver_interface_slots(out_slots: *mut i64) -> scpvt_result_t {
    set_last_error("");
    if out_slots.is_null() {
        set_last_error("out_slots is null");
        return scpvt_result_t::SCPVT_ERR_NULL_ARGUMENT;
    }
    match scp_driver_interface_slots() {
        Ok(n) => {
            unsafe { *out_slots = n };
            scpvt_result_t::SCPVT_OK
        }
        Err(e) => fail(e),
    }
}

/// Reads the raw entry at `index`. Never call through it.
#[unsafe(no_mangle)]
pub extern "C" fn scpvt_read_slot(
    instance: *const c_void,
    index: usize,
    out_entry: *mut *const c_void,
) -> scpvt_result_t {
    set_last_error("");
    if instance.is_null() || out_entry.is_null() {
        set_last_error("instance or out_entry is null");
        return scpvt_result_t::SCPVT_ERR_NULL_ARGUMENT;
    }
    match unsafe { read_slot_raw(instance, SlotIndex::new(index)) } {
        Ok(entry) => {
            unsafe { *out_entry = entry.cast() };
            scpvt_result_t::SCPVT_OK
        }
        Err(e) => fail(e),
    }
}

/// Measures `instance` against the built-in registry entry for `name`.
#[unsafe(no_mangle)]
pub extern "C" fn scpvt_verify_interface(
    name: *const c_char,
    instance: *const c_void,
) -> scpvt_result_t {
    set_last_error("");
    let name = match cstr_to_str(name) {
        Ok(s) => s,
        Err(e) => {
            set_last_error(format!("name: {}", e));
            return scpvt_result_t::SCPVT_ERR_NULL_ARGUMENT;
        }
    };
    if instance.is_null() {
        set_last_error("instance is null");
        return scpvt_result_t::SCPVT_ERR_NULL_ARGUMENT;
    }
    match unsafe { default_registry().verify_raw(name, instance) } {
        Ok(_) => scpvt_result_t::SCPVT_OK,
        Err(e) => fail(e),
    }
}

/// Loads a JSON manifest and compares its driver declaration with the compiled one.
#[unsafe(no_mangle)]
pub extern "C" fn scpvt_check_manifest(manifest_path: *const c_char) -> scpvt_result_t {
    set_last_error("");
    let path = match cstr_to_str(manifest_path) {
        Ok(s) => std::path::Path::new(s),
        Err(e) => {
            set_last_error(format!("manifest_path: {}", e));
            return scpvt_result_t::SCPVT_ERR_NULL_ARGUMENT;
        }
    };
    let registry = match InterfaceRegistry::load(path) {
        Ok(r) => r,
        Err(e) => return fail_manifest(e),
    };
    match registry.check_declaration::<ScpDriverInterface>() {
        Ok(()) => scpvt_result_t::SCPVT_OK,
        Err(e) => fail(e),
    }
}

/// Checks every fixture member pointer against its slot. On a mismatch writes
/// the expected raw value of the first failing method to `out_failing_raw`;
/// writes 0 when all agree.
#[unsafe(no_mangle)]
pub extern "C" fn scpvt_check_member_pointers(out_failing_raw: *mut i64) -> scpvt_result_t {
    set_last_error("");
    if out_failing_raw.is_null() {
        set_last_error("out_failing_raw is null");
        return scpvt_result_t::SCPVT_ERR_NULL_ARGUMENT;
    }
    match check_member_pointers() {
        Ok(()) => {
            unsafe { *out_failing_raw = 0 };
            scpvt_result_t::SCPVT_OK
        }
        Err(MethodPointError::Mismatch(m)) => {
            set_last_error(MethodPointError::Mismatch(m).to_string());
            unsafe { *out_failing_raw = m.expected_raw };
            scpvt_result_t::SCPVT_ERR_SHAPE_MISMATCH
        }
        Err(MethodPointError::Abi(e)) => fail(e),
    }
}
