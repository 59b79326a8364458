// Consensus driver callback table, laid out the way the native engine dispatches it.
// Slot order is declaration order; arguments are opaque engine objects.
// The concrete probe below exists only so the table can be measured.

use crate::error::AbiError;
use crate::probe::{DropGlue, This};
use crate::registry::{InterfaceRegistry, VirtualInterface};
use crate::shape::{InfrastructureBase, InheritanceShape, ShapeReport, measure};
use crate::vtable::{Polymorphic, SlotLayout, VTable};
use std::ffi::c_void;

/// Borrowed engine object (envelope, value, ballot, key, ...).
pub type Opaque = *const c_void;
/// Engine object the callee fills in or takes ownership of.
pub type OpaqueMut = *mut c_void;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationLevel {
    Invalid = 0,
    MaybeValid = 1,
    FullyValidated = 2,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct ScpDriverSlots {
    pub sign_envelope: unsafe extern "C" fn(this: This, envelope: OpaqueMut),
    pub get_qset: unsafe extern "C" fn(this: This, qset_hash: Opaque) -> OpaqueMut,
    pub emit_envelope: unsafe extern "C" fn(this: This, envelope: Opaque),
    pub validate_value: unsafe extern "C" fn(
        this: This,
        slot_index: u64,
        value: Opaque,
        nomination: bool,
    ) -> ValidationLevel,
    pub extract_valid_value:
        unsafe extern "C" fn(this: This, slot_index: u64, value: Opaque) -> OpaqueMut,
    pub get_value_string: unsafe extern "C" fn(this: This, value: Opaque) -> OpaqueMut,
    pub to_str_key: unsafe extern "C" fn(this: This, public_key: Opaque, full_key: bool) -> OpaqueMut,
    pub to_short_string: unsafe extern "C" fn(this: This, public_key: Opaque) -> OpaqueMut,
    pub compute_hash_node: unsafe extern "C" fn(
        this: This,
        slot_index: u64,
        prev: Opaque,
        is_priority: bool,
        round_number: i32,
        node_id: Opaque,
    ) -> u64,
    pub compute_value_hash: unsafe extern "C" fn(
        this: This,
        slot_index: u64,
        prev: Opaque,
        round_number: i32,
        value: Opaque,
    ) -> u64,
    pub combine_candidates:
        unsafe extern "C" fn(this: This, slot_index: u64, candidates: Opaque) -> OpaqueMut,
    pub setup_timer: unsafe extern "C" fn(
        this: This,
        slot_index: u64,
        timer_id: i32,
        timeout_ms: u64,
        callback: OpaqueMut,
    ),
    pub compute_timeout: unsafe extern "C" fn(this: This, round_number: u32) -> u64,
    pub value_externalized: unsafe extern "C" fn(this: This, slot_index: u64, value: Opaque),
    pub nominating_value: unsafe extern "C" fn(this: This, slot_index: u64, value: Opaque),
    pub updated_candidate_value: unsafe extern "C" fn(this: This, slot_index: u64, value: Opaque),
    pub started_ballot_protocol: unsafe extern "C" fn(this: This, slot_index: u64, ballot: Opaque),
    pub accepted_ballot_prepared: unsafe extern "C" fn(this: This, slot_index: u64, ballot: Opaque),
    pub confirmed_ballot_prepared:
        unsafe extern "C" fn(this: This, slot_index: u64, ballot: Opaque),
    pub accepted_commit: unsafe extern "C" fn(this: This, slot_index: u64, ballot: Opaque),
    pub ballot_did_hear_from_quorum:
        unsafe extern "C" fn(this: This, slot_index: u64, ballot: Opaque),
}

unsafe impl SlotLayout for ScpDriverSlots {}

pub struct ScpDriverInterface;

impl VirtualInterface for ScpDriverInterface {
    const NAME: &'static str = "ScpDriver";
    const OPERATIONS: &'static [&'static str] = &[
        "sign_envelope",
        "get_qset",
        "emit_envelope",
        "validate_value",
        "extract_valid_value",
        "get_value_string",
        "to_str_key",
        "to_short_string",
        "compute_hash_node",
        "compute_value_hash",
        "combine_candidates",
        "setup_timer",
        "compute_timeout",
        "value_externalized",
        "nominating_value",
        "updated_candidate_value",
        "started_ballot_protocol",
        "accepted_ballot_prepared",
        "confirmed_ballot_prepared",
        "accepted_commit",
        "ballot_did_hear_from_quorum",
    ];
}

// The slot struct and the operation list must describe the same table.
const _: () = assert!(
    VTable::<ScpDriverSlots>::SLOTS == <ScpDriverInterface as VirtualInterface>::OPERATIONS.len()
);

// No-op callbacks for the probe.
unsafe extern "C" fn ignore_envelope(_this: This, _envelope: OpaqueMut) {}
unsafe extern "C" fn ignore_emit(_this: This, _envelope: Opaque) {}
unsafe extern "C" fn no_object(_this: This, _arg: Opaque) -> OpaqueMut {
    std::ptr::null_mut()
}
unsafe extern "C" fn accept_value(
    _this: This,
    _slot_index: u64,
    _value: Opaque,
    _nomination: bool,
) -> ValidationLevel {
    ValidationLevel::FullyValidated
}
unsafe extern "C" fn no_slot_object(_this: This, _slot_index: u64, _arg: Opaque) -> OpaqueMut {
    std::ptr::null_mut()
}
unsafe extern "C" fn no_key_string(_this: This, _public_key: Opaque, _full_key: bool) -> OpaqueMut {
    std::ptr::null_mut()
}
unsafe extern "C" fn zero_hash_node(
    _this: This,
    _slot_index: u64,
    _prev: Opaque,
    _is_priority: bool,
    _round_number: i32,
    _node_id: Opaque,
) -> u64 {
    0
}
unsafe extern "C" fn zero_value_hash(
    _this: This,
    _slot_index: u64,
    _prev: Opaque,
    _round_number: i32,
    _value: Opaque,
) -> u64 {
    0
}
unsafe extern "C" fn ignore_timer(
    _this: This,
    _slot_index: u64,
    _timer_id: i32,
    _timeout_ms: u64,
    _callback: OpaqueMut,
) {
}
unsafe extern "C" fn fixed_timeout(_this: This, _round_number: u32) -> u64 {
    100
}
unsafe extern "C" fn ignore_slot_event(_this: This, _slot_index: u64, _arg: Opaque) {}

impl ScpDriverSlots {
    pub const INERT: ScpDriverSlots = ScpDriverSlots {
        sign_envelope: ignore_envelope,
        get_qset: no_object,
        emit_envelope: ignore_emit,
        validate_value: accept_value,
        extract_valid_value: no_slot_object,
        get_value_string: no_object,
        to_str_key: no_key_string,
        to_short_string: no_object,
        compute_hash_node: zero_hash_node,
        compute_value_hash: zero_value_hash,
        combine_candidates: no_slot_object,
        setup_timer: ignore_timer,
        compute_timeout: fixed_timeout,
        value_externalized: ignore_slot_event,
        nominating_value: ignore_slot_event,
        updated_candidate_value: ignore_slot_event,
        started_ballot_protocol: ignore_slot_event,
        accepted_ballot_prepared: ignore_slot_event,
        confirmed_ballot_prepared: ignore_slot_event,
        accepted_commit: ignore_slot_event,
        ballot_did_hear_from_quorum: ignore_slot_event,
    };
}

/// Table of the probe: the driver level (callbacks, then its glue) followed by the probe level's glue.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ScpDriverProbeSlots {
    pub driver: ScpDriverSlots,
    pub driver_glue: DropGlue,
    pub probe_glue: DropGlue,
}

unsafe impl SlotLayout for ScpDriverProbeSlots {}

static SCP_DRIVER_PROBE_VTABLE: VTable<ScpDriverProbeSlots> = VTable::new(ScpDriverProbeSlots {
    driver: ScpDriverSlots::INERT,
    driver_glue: DropGlue::INERT,
    probe_glue: DropGlue::INERT,
});

/// Two levels (driver, probe), each contributing one `DropGlue`.
pub const SCP_DRIVER_SHAPE: InheritanceShape = InheritanceShape::from_parts(2, DropGlue::OWN_SLOTS);

/// Concrete driver used only to measure the callback table.
#[repr(C)]
pub struct ScpDriverProbe {
    vtable: &'static VTable<ScpDriverProbeSlots>,
    node_id: [u8; 32],
    is_validator: bool,
}

unsafe impl Polymorphic for ScpDriverProbe {}

impl ScpDriverProbe {
    pub fn new(node_id: [u8; 32], is_validator: bool) -> Self {
        ScpDriverProbe {
            vtable: &SCP_DRIVER_PROBE_VTABLE,
            node_id,
            is_validator,
        }
    }

    pub fn node_id(&self) -> &[u8; 32] {
        &self.node_id
    }

    pub fn is_validator(&self) -> bool {
        self.is_validator
    }

    pub fn slots(&self) -> &'static ScpDriverProbeSlots {
        self.vtable.slots()
    }
}

/// Slots attributable to the driver interface once the glue of both levels is removed.
pub fn scp_driver_interface_slots() -> Result<i64, AbiError> {
    let probe = ScpDriverProbe::new([0u8; 32], true);
    let report = measure(&probe, SCP_DRIVER_SHAPE, ScpDriverInterface::declared_slots())?;
    Ok(report.attributable)
}

/// Full check of the probe against the declared interface; a mismatch is an error.
pub fn verify_scp_driver() -> Result<ShapeReport, AbiError> {
    let probe = ScpDriverProbe::new([0u8; 32], true);
    measure(&probe, SCP_DRIVER_SHAPE, ScpDriverInterface::declared_slots())?
        .into_result(ScpDriverInterface::NAME)
}

/// Registry holding every interface this crate certifies.
pub fn default_registry() -> InterfaceRegistry {
    let mut registry = InterfaceRegistry::new();
    registry.register::<ScpDriverInterface>(SCP_DRIVER_SHAPE);
    registry
}
