// Declarative registry of interface shapes.
// Each interface lists its operations in declaration order, which is also slot order.
// Entries pair that list with the inheritance shape and persist as a JSON manifest,
// so a build can compare today's declaration with the one last certified.

use crate::error::{AbiError, ManifestError};
use crate::shape::{InheritanceShape, ShapeReport, measure, measure_raw};
use crate::vtable::Polymorphic;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::ffi::c_void;
use std::fs;
use std::path::Path;

/// An interface dispatched through a virtual table.
pub trait VirtualInterface {
    const NAME: &'static str;
    /// Operation names in declaration (slot) order.
    const OPERATIONS: &'static [&'static str];

    fn declared_slots() -> usize {
        Self::OPERATIONS.len()
    }

    fn fingerprint() -> String {
        layout_fingerprint(Self::OPERATIONS)
    }
}

/// SHA-256 over the ordered operation names, hex encoded.
/// Renaming or reordering an operation changes it; so does adding one.
pub fn layout_fingerprint<S: AsRef<str>>(operations: &[S]) -> String {
    let mut hasher = Sha256::new();
    for op in operations {
        hasher.update(op.as_ref().as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceEntry {
    pub name: String,
    pub operations: Vec<String>,
    pub shape: InheritanceShape,
    pub fingerprint: String,
}

impl InterfaceEntry {
    pub fn declared_slots(&self) -> usize {
        self.operations.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceRegistry {
    #[serde(default)]
    interfaces: BTreeMap<String, InterfaceEntry>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `I` under `shape`, replacing any earlier entry of the same name.
    pub fn register<I: VirtualInterface>(&mut self, shape: InheritanceShape) {
        let entry = InterfaceEntry {
            name: I::NAME.to_string(),
            operations: I::OPERATIONS.iter().map(|op| op.to_string()).collect(),
            shape,
            fingerprint: I::fingerprint(),
        };
        self.interfaces.insert(entry.name.clone(), entry);
    }

    pub fn entry(&self, name: &str) -> Option<&InterfaceEntry> {
        self.interfaces.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.interfaces.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// Measure `instance` against the registered shape of `name`.
    pub fn verify<T: Polymorphic>(&self, name: &str, instance: &T) -> Result<ShapeReport, AbiError> {
        let entry = self
            .entry(name)
            .ok_or_else(|| AbiError::UnknownInterface(name.to_string()))?;
        measure(instance, entry.shape, entry.declared_slots())?.into_result(&entry.name)
    }

    /// [`verify`](Self::verify) for an object handed over the C boundary.
    ///
    /// # Safety
    /// Same contract as [`crate::vtable::count_slots_raw`].
    pub unsafe fn verify_raw(&self, name: &str, instance: *const c_void) -> Result<ShapeReport, AbiError> {
        let entry = self
            .entry(name)
            .ok_or_else(|| AbiError::UnknownInterface(name.to_string()))?;
        unsafe { measure_raw(instance, entry.shape, entry.declared_slots())? }.into_result(&entry.name)
    }

    /// Compare the recorded declaration of `I` with the one compiled in.
    pub fn check_declaration<I: VirtualInterface>(&self) -> Result<(), AbiError> {
        let entry = self
            .entry(I::NAME)
            .ok_or_else(|| AbiError::UnknownInterface(I::NAME.to_string()))?;
        let declared = I::fingerprint();
        if entry.fingerprint != declared {
            return Err(AbiError::LayoutDrift {
                interface: entry.name.clone(),
                recorded: entry.fingerprint.clone(),
                declared,
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, ManifestError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let registry: InterfaceRegistry = serde_json::from_str(json)?;
        for entry in registry.interfaces.values() {
            entry.shape.check()?;
        }
        Ok(registry)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ManifestError> {
        let data = fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ManifestError> {
        let path = path.as_ref();
        let data = self.to_json()?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, data)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}
