// Pointer-to-virtual-member decoding (Itanium convention).
// A member pointer naming a virtual function stores `offset + 1`, where `offset` is the byte
// offset of the slot within the table; the low bit marks a virtual dispatch, not a code address.
// Decoded indices are for assertions only; dispatch goes through the table itself.

use crate::error::AbiError;
use std::fmt;
use std::mem::size_of;

/// Width of one table slot on the running target.
pub const POINTER_WIDTH: usize = size_of::<usize>();

/// Zero-based position of an entry within a dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex(usize);

impl SlotIndex {
    pub const fn new(index: usize) -> Self {
        SlotIndex(index)
    }

    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// Raw bit pattern of a pointer to a virtual member function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberPointer(i64);

impl MemberPointer {
    pub const fn from_raw(raw: i64) -> Self {
        MemberPointer(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Encoding of the slot at byte `offset` within its table.
    /// `None` when `offset + 1` does not fit.
    pub const fn from_slot_offset(offset: usize) -> Option<Self> {
        if offset as u64 >= i64::MAX as u64 {
            return None;
        }
        Some(MemberPointer(offset as i64 + 1))
    }

    /// Encoding of `index` for tables of `pointer_width`-byte slots.
    /// `None` for zero or odd widths (the tag bit would collide) and when the value does not fit.
    pub fn for_slot(index: SlotIndex, pointer_width: usize) -> Option<Self> {
        if pointer_width == 0 || pointer_width % 2 != 0 {
            return None;
        }
        let index = i64::try_from(index.get()).ok()?;
        let width = i64::try_from(pointer_width).ok()?;
        index
            .checked_mul(width)
            .and_then(|offset| offset.checked_add(1))
            .map(MemberPointer)
    }

    /// Low bit set: a virtual slot tag, not a direct code address.
    pub const fn is_virtual(self) -> bool {
        self.0 & 1 == 1
    }
}

/// Member pointer for a named field of a `#[repr(C)]` slot struct.
///
/// `virtual_member!(BSlots, vfunc3)` yields the value the C++ compiler would
/// produce for `&B::vfunc3`. Nested fields are written `outer.inner`.
/// Evaluated at compile time; an offset that does not fit fails the build.
#[macro_export]
macro_rules! virtual_member {
    ($slots:ty, $($field:ident).+) => {
        const {
            match $crate::member::MemberPointer::from_slot_offset(::core::mem::offset_of!(
                $slots,
                $($field).+
            )) {
                Some(ptr) => ptr,
                None => panic!("slot offset does not fit a member pointer"),
            }
        }
    };
}

/// Slot index encoded by `ptr`: `(raw - 1) / pointer_width`.
///
/// Rejects even values, a zero width, offsets that are not whole slots and
/// negative quotients.
pub fn decode_slot(ptr: MemberPointer, pointer_width: usize) -> Result<SlotIndex, AbiError> {
    let reject = || AbiError::NotAVirtualMemberPointer {
        raw: ptr.raw(),
        pointer_width,
    };

    if pointer_width == 0 || !ptr.is_virtual() {
        return Err(reject());
    }
    // Odd, so `raw - 1` cannot overflow.
    let offset = ptr.raw() - 1;
    if offset < 0 {
        return Err(reject());
    }
    let width = i64::try_from(pointer_width).map_err(|_| reject())?;
    if offset % width != 0 {
        return Err(reject());
    }
    let index = usize::try_from(offset / width).map_err(|_| reject())?;
    tracing::trace!(raw = ptr.raw(), index, "decoded member pointer");
    Ok(SlotIndex::new(index))
}
