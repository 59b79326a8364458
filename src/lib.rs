// Virtual-table shape checks for the consensus driver callback interface.
// Read-only introspection over zero-terminated tables; nothing here dispatches through a slot.

pub mod driver;
pub mod error;
pub mod ffi;
pub mod member;
pub mod probe;
pub mod registry;
pub mod shape;
pub mod vtable;

pub use error::{AbiError, ManifestError};
pub use member::{MemberPointer, POINTER_WIDTH, SlotIndex, decode_slot};
pub use registry::{InterfaceRegistry, VirtualInterface};
pub use shape::{InfrastructureBase, InheritanceShape, ShapeReport, measure, validate};
pub use vtable::{Polymorphic, SlotLayout, VTable, count_slots, read_slot};

/*
Intentionally avoids:
- multiple or virtual inheritance layouts
- calling through decoded slots
- global mutable state beyond the scan bound
*/
