use thiserror::Error;

/// Failures raised while inspecting a dispatch table or member pointer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    /// No zero sentinel within the scan bound, or a null table pointer.
    /// The ABI assumption itself is broken; the check must stop here.
    #[error("dispatch table has no zero sentinel within {scanned} slots")]
    MalformedDispatchTable { scanned: usize },

    #[error("raw value {raw} is not a virtual member pointer for pointer width {pointer_width}")]
    NotAVirtualMemberPointer { raw: i64, pointer_width: usize },

    #[error(
        "interface {interface}: expected {expected} slots, observed {observed} ({attributable} attributable)"
    )]
    ShapeMismatch {
        interface: String,
        expected: usize,
        observed: usize,
        attributable: i64,
    },

    #[error("slot {index} is outside a table of {slot_count} slots")]
    SlotOutOfRange { index: usize, slot_count: usize },

    #[error("invalid inheritance shape: {0}")]
    InvalidShape(String),

    #[error("interface {0} is not registered")]
    UnknownInterface(String),

    #[error("interface {interface} drifted: recorded {recorded}, declared {declared}")]
    LayoutDrift {
        interface: String,
        recorded: String,
        declared: String,
    },
}

/// Failures loading or saving a shape manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to access manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid manifest entry: {0}")]
    Shape(#[from] AbiError),
}
