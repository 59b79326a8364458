// Scaffolding objects for exercising the checks.
// Drop glue is the infrastructure pair every level of a chain contributes
// (the analogue of complete/deleting destructors).

use crate::error::AbiError;
use crate::member::{MemberPointer, POINTER_WIDTH, SlotIndex, decode_slot};
use crate::shape::InfrastructureBase;
use crate::virtual_member;
use crate::vtable::{Polymorphic, SlotLayout, VTable, count_slots, read_slot};
use std::ffi::c_void;
use std::mem::size_of;
use thiserror::Error;

/// Receiver passed as the first argument of every slot.
pub type This = *mut c_void;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct DropGlue {
    pub drop_in_place: unsafe extern "C" fn(this: This),
    pub release: unsafe extern "C" fn(this: This),
}

unsafe impl SlotLayout for DropGlue {}

impl InfrastructureBase for DropGlue {
    const OWN_SLOTS: usize = size_of::<DropGlue>() / POINTER_WIDTH;
}

impl DropGlue {
    /// Glue for objects owned on the Rust side, where the table is never used to free them.
    pub const INERT: DropGlue = DropGlue {
        drop_in_place: inert_glue,
        release: inert_glue,
    };
}

unsafe extern "C" fn inert_glue(_this: This) {}

/// Minimal object over any static table.
#[repr(C)]
pub struct ProbeObject<S: SlotLayout> {
    vtable: &'static VTable<S>,
}

impl<S: SlotLayout> ProbeObject<S> {
    pub const fn new(vtable: &'static VTable<S>) -> Self {
        ProbeObject { vtable }
    }

    pub fn vtable(&self) -> &'static VTable<S> {
        self.vtable
    }
}

unsafe impl<S: SlotLayout> Polymorphic for ProbeObject<S> {}

// Four methods, two per level, no glue: slots 0..4 in declaration order.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct MethodPointSlots {
    pub vfunc1: unsafe extern "C" fn(this: This) -> u32,
    pub vfunc2: unsafe extern "C" fn(this: This) -> u32,
    pub vfunc3: unsafe extern "C" fn(this: This) -> u32,
    pub vfunc4: unsafe extern "C" fn(this: This) -> u32,
}

unsafe impl SlotLayout for MethodPointSlots {}

unsafe extern "C" fn vfunc1(_this: This) -> u32 {
    1
}
unsafe extern "C" fn vfunc2(_this: This) -> u32 {
    2
}
unsafe extern "C" fn vfunc3(_this: This) -> u32 {
    3
}
unsafe extern "C" fn vfunc4(_this: This) -> u32 {
    4
}

pub static METHOD_POINT_VTABLE: VTable<MethodPointSlots> = VTable::new(MethodPointSlots {
    vfunc1,
    vfunc2,
    vfunc3,
    vfunc4,
});

/// First method whose member pointer disagrees with its slot position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodPointMismatch {
    pub method: &'static str,
    pub expected_raw: i64,
    pub actual_raw: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MethodPointError {
    #[error("{}: expected raw {}, got {}", .0.method, .0.expected_raw, .0.actual_raw)]
    Mismatch(MethodPointMismatch),

    /// The fixture table itself could not be scanned.
    #[error(transparent)]
    Abi(#[from] AbiError),
}

/// Cross-check member pointers against the table for the four-method fixture:
/// each must encode `index * POINTER_WIDTH + 1`, decode back to its index and
/// select the entry stored under its own name.
pub fn check_member_pointers() -> Result<(), MethodPointError> {
    let object = ProbeObject::new(&METHOD_POINT_VTABLE);
    let slots = METHOD_POINT_VTABLE.slots();
    let methods: [(&'static str, MemberPointer, *const ()); 4] = [
        ("vfunc1", virtual_member!(MethodPointSlots, vfunc1), slots.vfunc1 as *const ()),
        ("vfunc2", virtual_member!(MethodPointSlots, vfunc2), slots.vfunc2 as *const ()),
        ("vfunc3", virtual_member!(MethodPointSlots, vfunc3), slots.vfunc3 as *const ()),
        ("vfunc4", virtual_member!(MethodPointSlots, vfunc4), slots.vfunc4 as *const ()),
    ];

    let slot_count = count_slots(&object)?;
    tracing::trace!(slot_count, "scanned method point fixture");
    for (idx, (method, ptr, entry)) in methods.into_iter().enumerate() {
        let index = SlotIndex::new(idx);
        let expected_raw = MemberPointer::for_slot(index, POINTER_WIDTH)
            .map(MemberPointer::raw)
            .unwrap_or(-1);
        let mismatch = MethodPointError::Mismatch(MethodPointMismatch {
            method,
            expected_raw,
            actual_raw: ptr.raw(),
        });
        if ptr.raw() != expected_raw {
            return Err(mismatch);
        }
        match decode_slot(ptr, POINTER_WIDTH) {
            Ok(decoded) if decoded == index => {}
            _ => return Err(mismatch),
        }
        if read_slot(&object, index)? != entry {
            return Err(mismatch);
        }
        tracing::debug!(method, raw = ptr.raw(), "member pointer agrees with table");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_glue_contributes_two_slots() {
        assert_eq!(DropGlue::OWN_SLOTS, 2);
    }

    #[test]
    fn method_point_fixture_passes() {
        assert_eq!(check_member_pointers(), Ok(()));
    }

    #[test]
    fn mismatch_message_names_the_method() {
        let err = MethodPointError::Mismatch(MethodPointMismatch {
            method: "vfunc3",
            expected_raw: 17,
            actual_raw: 16,
        });
        assert_eq!(err.to_string(), "vfunc3: expected raw 17, got 16");
    }

    #[test]
    fn scan_failure_keeps_its_abi_error() {
        let err = MethodPointError::from(AbiError::MalformedDispatchTable { scanned: 2 });
        assert_eq!(err.to_string(), "dispatch table has no zero sentinel within 2 slots");
    }

    #[test]
    fn probe_object_counts_its_table() {
        let object = ProbeObject::new(&METHOD_POINT_VTABLE);
        assert_eq!(count_slots(&object), Ok(VTable::<MethodPointSlots>::SLOTS));
        assert!(std::ptr::eq(object.vtable(), &METHOD_POINT_VTABLE));
    }
}
