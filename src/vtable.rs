// Dispatch-table scanning over zero-terminated virtual tables.
// Non-portable by nature: only valid for layouts that place a zero word after the last slot.
// Every table built here (`VTable<S>`) carries that sentinel; foreign tables must guarantee it themselves.

use crate::error::AbiError;
use crate::member::{POINTER_WIDTH, SlotIndex};
use std::ffi::c_void;
use std::mem::size_of;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const DEFAULT_MAX_SCAN_SLOTS: usize = 4096;

// Runtime-configurable upper bound on a single scan.
static MAX_SCAN_SLOTS: AtomicUsize = AtomicUsize::new(DEFAULT_MAX_SCAN_SLOTS);

pub fn set_max_scan_slots(limit: usize) {
    // A bound of zero would reject even an empty table.
    MAX_SCAN_SLOTS.store(limit.max(1), Ordering::Relaxed);
}

pub fn max_scan_slots() -> usize {
    MAX_SCAN_SLOTS.load(Ordering::Relaxed)
}

/// Marker for `#[repr(C)]` slot structs.
///
/// # Safety
/// Implementors must be `#[repr(C)]` and consist only of non-null,
/// pointer-width entries (`extern "C"` function pointers or other
/// `SlotLayout` structs), with no padding.
pub unsafe trait SlotLayout: 'static {}

/// A virtual table image: the slots followed by a zero sentinel word.
#[repr(C)]
pub struct VTable<S: SlotLayout> {
    slots: S,
    // Only ever read by raw scans.
    #[allow(dead_code)]
    sentinel: usize,
}

impl<S: SlotLayout> VTable<S> {
    /// Slot count known at compile time from the layout alone.
    pub const SLOTS: usize = size_of::<S>() / POINTER_WIDTH;

    pub const fn new(slots: S) -> Self {
        VTable { slots, sentinel: 0 }
    }

    pub fn slots(&self) -> &S {
        &self.slots
    }
}

/// An object whose first word points at the first slot of a zero-terminated table.
///
/// # Safety
/// Implementors must be `#[repr(C)]` with the table pointer as the first
/// field, installed before the value is observable (no partially built
/// instances), and the table must end in a zero sentinel.
pub unsafe trait Polymorphic {}

fn table_of<T: Polymorphic>(instance: &T) -> *const *const () {
    // SAFETY: `Polymorphic` guarantees the first word is the table pointer.
    unsafe { *(instance as *const T).cast::<*const *const ()>() }
}

/// Number of slots reachable from `instance`'s table, excluding the sentinel.
pub fn count_slots<T: Polymorphic>(instance: &T) -> Result<usize, AbiError> {
    count_slots_bounded(instance, max_scan_slots())
}

/// Like [`count_slots`] with an explicit scan bound instead of the process-wide one.
pub fn count_slots_bounded<T: Polymorphic>(instance: &T, limit: usize) -> Result<usize, AbiError> {
    // SAFETY: the table belongs to a fully built `Polymorphic` value.
    unsafe { scan(table_of(instance), limit) }
}

/// Scan the table of an object handed over the C boundary.
///
/// # Safety
/// `instance` must be null or point at a fully constructed object whose first
/// word is a pointer to a zero-terminated table of pointer-width slots.
pub unsafe fn count_slots_raw(instance: *const c_void) -> Result<usize, AbiError> {
    if instance.is_null() {
        return Err(AbiError::MalformedDispatchTable { scanned: 0 });
    }
    unsafe {
        let table = *instance.cast::<*const *const ()>();
        scan(table, max_scan_slots())
    }
}

/// Raw entry at `index`, for asserting that a decoded slot names the expected function.
/// Never call through the returned pointer.
pub fn read_slot<T: Polymorphic>(instance: &T, index: SlotIndex) -> Result<*const (), AbiError> {
    let slot_count = count_slots(instance)?;
    if index.get() >= slot_count {
        return Err(AbiError::SlotOutOfRange {
            index: index.get(),
            slot_count,
        });
    }
    // SAFETY: index is below the sentinel position found by the scan.
    Ok(unsafe { table_of(instance).add(index.get()).read() })
}

/// [`read_slot`] for an object handed over the C boundary.
///
/// # Safety
/// Same contract as [`count_slots_raw`].
pub unsafe fn read_slot_raw(instance: *const c_void, index: SlotIndex) -> Result<*const (), AbiError> {
    let slot_count = unsafe { count_slots_raw(instance)? };
    if index.get() >= slot_count {
        return Err(AbiError::SlotOutOfRange {
            index: index.get(),
            slot_count,
        });
    }
    unsafe {
        let table = *instance.cast::<*const *const ()>();
        Ok(table.add(index.get()).read())
    }
}

unsafe fn scan(table: *const *const (), limit: usize) -> Result<usize, AbiError> {
    if table.is_null() {
        tracing::warn!("null dispatch table pointer");
        return Err(AbiError::MalformedDispatchTable { scanned: 0 });
    }
    for idx in 0..limit {
        let entry = unsafe { table.add(idx).read() };
        if entry.is_null() {
            tracing::debug!(slots = idx, "scanned dispatch table");
            return Ok(idx);
        }
    }
    tracing::warn!(limit, "no dispatch table sentinel within scan bound");
    Err(AbiError::MalformedDispatchTable { scanned: limit })
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn first() -> u32 {
        1
    }
    unsafe extern "C" fn second() -> u32 {
        2
    }
    unsafe extern "C" fn third() -> u32 {
        3
    }

    #[repr(C)]
    struct ThreeSlots {
        a: unsafe extern "C" fn() -> u32,
        b: unsafe extern "C" fn() -> u32,
        c: unsafe extern "C" fn() -> u32,
    }
    unsafe impl SlotLayout for ThreeSlots {}

    static THREE: VTable<ThreeSlots> = VTable::new(ThreeSlots {
        a: first,
        b: second,
        c: third,
    });

    #[repr(C)]
    struct Holder {
        vtable: &'static VTable<ThreeSlots>,
        payload: u64,
    }
    unsafe impl Polymorphic for Holder {}

    // Table with no sentinel; only ever scanned with a bound equal to its length.
    static UNTERMINATED: [usize; 4] = [0x10, 0x20, 0x30, 0x40];

    #[repr(C)]
    struct Unterminated {
        vtable: &'static [usize; 4],
    }
    unsafe impl Polymorphic for Unterminated {}

    #[test]
    fn counts_slots_before_sentinel() {
        let h = Holder {
            vtable: &THREE,
            payload: 7,
        };
        assert_eq!(count_slots(&h), Ok(3));
        assert_eq!(VTable::<ThreeSlots>::SLOTS, 3);
        assert_eq!(h.payload, 7);
    }

    #[test]
    fn missing_sentinel_is_malformed() {
        let u = Unterminated {
            vtable: &UNTERMINATED,
        };
        assert_eq!(
            count_slots_bounded(&u, 4),
            Err(AbiError::MalformedDispatchTable { scanned: 4 })
        );
    }

    #[test]
    fn bound_equal_to_slot_count_still_fails() {
        // The sentinel sits at index 3; a bound of 3 never reaches it.
        let h = Holder {
            vtable: &THREE,
            payload: 0,
        };
        assert_eq!(
            count_slots_bounded(&h, 3),
            Err(AbiError::MalformedDispatchTable { scanned: 3 })
        );
        assert_eq!(count_slots_bounded(&h, 4), Ok(3));
    }

    #[test]
    fn read_slot_matches_named_entry() {
        let h = Holder {
            vtable: &THREE,
            payload: 0,
        };
        let entry = read_slot(&h, SlotIndex::new(1)).unwrap();
        assert_eq!(entry, THREE.slots().b as *const ());
        assert_eq!(
            read_slot(&h, SlotIndex::new(3)),
            Err(AbiError::SlotOutOfRange {
                index: 3,
                slot_count: 3
            })
        );
    }

    #[repr(C)]
    struct NullTable {
        vtable: *const *const (),
    }
    unsafe impl Polymorphic for NullTable {}

    #[test]
    fn null_table_pointer_is_malformed() {
        let n = NullTable {
            vtable: std::ptr::null(),
        };
        assert_eq!(
            count_slots_bounded(&n, 8),
            Err(AbiError::MalformedDispatchTable { scanned: 0 })
        );
        let raw = unsafe { count_slots_raw((&n as *const NullTable).cast()) };
        assert_eq!(raw, Err(AbiError::MalformedDispatchTable { scanned: 0 }));
        assert!(read_slot(&n, SlotIndex::new(0)).is_err());
    }

    #[test]
    fn raw_read_matches_typed_read() {
        let h = Holder {
            vtable: &THREE,
            payload: 0,
        };
        let instance = (&h as *const Holder).cast();
        let entry = unsafe { read_slot_raw(instance, SlotIndex::new(2)) };
        assert_eq!(entry, Ok(THREE.slots().c as *const ()));
        assert_eq!(
            unsafe { read_slot_raw(instance, SlotIndex::new(5)) },
            Err(AbiError::SlotOutOfRange {
                index: 5,
                slot_count: 3
            })
        );
    }

    #[test]
    fn raw_null_instance_is_rejected() {
        let res = unsafe { count_slots_raw(std::ptr::null()) };
        assert_eq!(res, Err(AbiError::MalformedDispatchTable { scanned: 0 }));
    }

    #[test]
    fn raw_scan_agrees_with_typed_scan() {
        let h = Holder {
            vtable: &THREE,
            payload: 0,
        };
        let raw = unsafe { count_slots_raw((&h as *const Holder).cast()) };
        assert_eq!(raw, count_slots(&h));
    }
}
