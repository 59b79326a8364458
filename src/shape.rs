// Interface shape validation: observed slots minus the infrastructure baseline must equal
// the interface's declared operation count.
// The baseline is caller-supplied; a new virtual added to a shared base shows up as a
// mismatch only, never as drift in the baseline itself.

use crate::error::AbiError;
use crate::vtable::{Polymorphic, count_slots, count_slots_raw};
use serde::{Deserialize, Serialize};
use std::ffi::c_void;

/// Infrastructure class contributing a fixed number of slots at every level of a chain.
pub trait InfrastructureBase {
    const OWN_SLOTS: usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritanceShape {
    chain_depth: usize,
    baseline_per_level: usize,
}

impl InheritanceShape {
    pub fn new(chain_depth: usize, baseline_per_level: usize) -> Result<Self, AbiError> {
        let shape = InheritanceShape {
            chain_depth,
            baseline_per_level,
        };
        shape.check()?;
        Ok(shape)
    }

    /// Shape whose per-level baseline is read from `B` rather than re-derived by hand.
    pub fn derived<B: InfrastructureBase>(chain_depth: usize) -> Result<Self, AbiError> {
        Self::new(chain_depth, B::OWN_SLOTS)
    }

    // Callers guarantee chain_depth >= 1.
    pub(crate) const fn from_parts(chain_depth: usize, baseline_per_level: usize) -> Self {
        InheritanceShape {
            chain_depth,
            baseline_per_level,
        }
    }

    pub(crate) fn check(&self) -> Result<(), AbiError> {
        if self.chain_depth == 0 {
            return Err(AbiError::InvalidShape(
                "chain depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub const fn chain_depth(&self) -> usize {
        self.chain_depth
    }

    pub const fn baseline_per_level(&self) -> usize {
        self.baseline_per_level
    }

    pub const fn total_baseline(&self) -> usize {
        self.chain_depth.saturating_mul(self.baseline_per_level)
    }
}

/// One measurement of an instance against a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeReport {
    pub observed: usize,
    pub baseline: usize,
    /// Negative when the baseline exceeds what the table holds.
    pub attributable: i64,
    pub expected: usize,
}

impl ShapeReport {
    fn new(observed: usize, shape: InheritanceShape, expected: usize) -> Self {
        let baseline = shape.total_baseline();
        ShapeReport {
            observed,
            baseline,
            attributable: signed(observed).saturating_sub(signed(baseline)),
            expected,
        }
    }

    pub fn matches(&self) -> bool {
        self.attributable == signed(self.expected)
    }

    /// Turn a mismatch into [`AbiError::ShapeMismatch`] for `interface`.
    pub fn into_result(self, interface: &str) -> Result<Self, AbiError> {
        if self.matches() {
            return Ok(self);
        }
        Err(AbiError::ShapeMismatch {
            interface: interface.to_string(),
            expected: self.expected,
            observed: self.observed,
            attributable: self.attributable,
        })
    }
}

fn signed(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn finish(report: ShapeReport) -> ShapeReport {
    if report.matches() {
        tracing::debug!(
            observed = report.observed,
            baseline = report.baseline,
            attributable = report.attributable,
            "interface shape matches"
        );
    } else {
        tracing::warn!(
            observed = report.observed,
            baseline = report.baseline,
            attributable = report.attributable,
            expected = report.expected,
            "interface shape mismatch"
        );
    }
    report
}

pub fn measure<T: Polymorphic>(
    instance: &T,
    shape: InheritanceShape,
    expected: usize,
) -> Result<ShapeReport, AbiError> {
    shape.check()?;
    let observed = count_slots(instance)?;
    Ok(finish(ShapeReport::new(observed, shape, expected)))
}

/// [`measure`] for an object handed over the C boundary.
///
/// # Safety
/// Same contract as [`count_slots_raw`].
pub unsafe fn measure_raw(
    instance: *const c_void,
    shape: InheritanceShape,
    expected: usize,
) -> Result<ShapeReport, AbiError> {
    shape.check()?;
    let observed = unsafe { count_slots_raw(instance)? };
    Ok(finish(ShapeReport::new(observed, shape, expected)))
}

/// True iff the slots attributable to the interface equal `expected`.
/// A malformed table is an error, not `false`.
pub fn validate<T: Polymorphic>(
    instance: &T,
    shape: InheritanceShape,
    expected: usize,
) -> Result<bool, AbiError> {
    Ok(measure(instance, shape, expected)?.matches())
}
