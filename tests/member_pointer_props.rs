use proptest::prelude::*;
use scp_vtcheck::{AbiError, MemberPointer, SlotIndex, decode_slot};

proptest! {
    #[test]
    fn prop_decode_inverts_encode(
        index in 0usize..1_000_000,
        width in prop::sample::select(vec![2usize, 4, 8, 16]),
    ) {
        let ptr = MemberPointer::for_slot(SlotIndex::new(index), width).unwrap();
        prop_assert!(ptr.is_virtual());
        prop_assert_eq!(decode_slot(ptr, width), Ok(SlotIndex::new(index)));
    }

    #[test]
    fn prop_even_raw_values_are_rejected(
        half in -(1i64 << 40)..(1i64 << 40),
        width in 1usize..=64,
    ) {
        let raw = half * 2;
        prop_assert_eq!(
            decode_slot(MemberPointer::from_raw(raw), width),
            Err(AbiError::NotAVirtualMemberPointer { raw, pointer_width: width })
        );
    }

    #[test]
    fn prop_accepted_values_reencode_exactly(
        raw in (-(1i64 << 40)..(1i64 << 40)).prop_map(|r| r | 1),
        width in prop::sample::select(vec![2usize, 4, 8, 16]),
    ) {
        if let Ok(index) = decode_slot(MemberPointer::from_raw(raw), width) {
            let back = MemberPointer::for_slot(index, width).unwrap();
            prop_assert_eq!(back.raw(), raw);
        } else {
            prop_assert!(raw < 1 || (raw - 1) % width as i64 != 0);
        }
    }
}

#[test]
fn zero_width_rejects_everything() {
    for raw in [-3i64, 1, 9, 17, 25] {
        assert!(decode_slot(MemberPointer::from_raw(raw), 0).is_err());
    }
}
