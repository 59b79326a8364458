use scp_vtcheck::driver::{ScpDriverInterface, ScpDriverProbe, default_registry};
use scp_vtcheck::probe::{DropGlue, ProbeObject, METHOD_POINT_VTABLE};
use scp_vtcheck::registry::layout_fingerprint;
use scp_vtcheck::{
    AbiError, InheritanceShape, InterfaceRegistry, ManifestError, VirtualInterface,
};

struct Quad;
impl VirtualInterface for Quad {
    const NAME: &'static str = "Quad";
    const OPERATIONS: &'static [&'static str] = &["vfunc1", "vfunc2", "vfunc3", "vfunc4"];
}

#[test]
fn manifest_round_trips_through_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("shapes.json");

    let registry = default_registry();
    registry.save(&path).expect("save manifest");
    assert!(!path.with_extension("json.tmp").exists());

    let loaded = InterfaceRegistry::load(&path).expect("load manifest");
    assert_eq!(loaded, registry);
    assert_eq!(loaded.check_declaration::<ScpDriverInterface>(), Ok(()));

    let probe = ScpDriverProbe::new([3u8; 32], false);
    let report = loaded
        .verify(ScpDriverInterface::NAME, &probe)
        .expect("driver shape");
    assert_eq!(report.attributable, 21);
}

#[test]
fn reordered_declaration_is_reported_as_drift() {
    let registry = default_registry();
    let mut json: serde_json::Value =
        serde_json::from_str(&registry.to_json().unwrap()).unwrap();

    let mut ops: Vec<&str> = ScpDriverInterface::OPERATIONS.to_vec();
    ops.swap(0, 1);
    json["interfaces"]["ScpDriver"]["fingerprint"] =
        serde_json::Value::String(layout_fingerprint(ops.as_slice()));

    let stale = InterfaceRegistry::from_json(&json.to_string()).unwrap();
    match stale.check_declaration::<ScpDriverInterface>() {
        Err(AbiError::LayoutDrift {
            interface,
            recorded,
            declared,
        }) => {
            assert_eq!(interface, "ScpDriver");
            assert_eq!(declared, ScpDriverInterface::fingerprint());
            assert_ne!(recorded, declared);
        }
        other => panic!("expected drift, got {other:?}"),
    }
}

#[test]
fn verify_surfaces_expected_and_observed() {
    let mut registry = InterfaceRegistry::new();
    // Wrong baseline: the fixture has no glue at all.
    registry.register::<Quad>(InheritanceShape::derived::<DropGlue>(1).unwrap());

    let object = ProbeObject::new(&METHOD_POINT_VTABLE);
    assert_eq!(
        registry.verify("Quad", &object),
        Err(AbiError::ShapeMismatch {
            interface: "Quad".to_string(),
            expected: 4,
            observed: 4,
            attributable: 2,
        })
    );

    registry.register::<Quad>(InheritanceShape::new(1, 0).unwrap());
    assert!(registry.verify("Quad", &object).is_ok());
    assert_eq!(
        registry.verify("Missing", &object),
        Err(AbiError::UnknownInterface("Missing".to_string()))
    );
}

#[test]
fn malformed_manifest_is_a_json_error() {
    let err = InterfaceRegistry::from_json("{ not json").unwrap_err();
    assert!(matches!(err, ManifestError::Json(_)));

    let missing = InterfaceRegistry::load("/nonexistent/shapes.json").unwrap_err();
    assert!(matches!(missing, ManifestError::Io(_)));
}
