// Property-based tests for the no-drop / no-duplicate invariants.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::HashSet;

use drvscope_inventory::{
    Inventory, KeyData, PathSettings, RegValue, ServiceKind, ServiceStatus, Snapshot, SnapshotSources,
};
use proptest::prelude::*;

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Which sources see one driver.
#[derive(Debug, Clone)]
struct DriverPresence {
    /// `(is_driver_kind, running)`
    service: Option<(bool, bool)>,
    /// `Some(None)` is a key without a `Type` value.
    key_type: Option<Option<u32>>,
    object: bool,
    module: bool,
    /// Spell the name in upper case outside the key.
    shout: bool,
}

fn arb_presence() -> impl Strategy<Value = DriverPresence> {
    (
        proptest::option::of((any::<bool>(), any::<bool>())),
        proptest::option::of(proptest::option::of(prop_oneof![
            Just(1u32),
            Just(2u32),
            Just(8u32),
            Just(16u32),
        ])),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(service, key_type, object, module, shout)| DriverPresence {
            service,
            key_type,
            object,
            module,
            shout,
        })
}

fn build(drivers: &[DriverPresence], orphan_modules: usize) -> Snapshot {
    let mut snap = Snapshot::default();
    for (i, d) in drivers.iter().enumerate() {
        let name = format!("drv{i}");
        let spelled = if d.shout { name.to_uppercase() } else { name.clone() };

        if let Some((driver_kind, running)) = d.service {
            let kind = if driver_kind { ServiceKind::KernelDriver } else { ServiceKind::Other };
            let status = if running { ServiceStatus::Running } else { ServiceStatus::Stopped };
            snap = snap.with_service(&spelled, kind, status);
        }
        if let Some(type_code) = d.key_type {
            let mut key = KeyData::new(name.clone());
            if let Some(code) = type_code {
                key = key.value("Type", RegValue::Dword(code));
            }
            snap = snap.with_key(key);
        }
        if d.object {
            snap = snap.with_object(&format!("\\Driver\\{spelled}"));
        }
        if d.module {
            snap = snap.with_module(
                &format!("{name}.sys"),
                &format!("\\SystemRoot\\System32\\Drivers\\{spelled}.SYS"),
            );
        }
    }
    for j in 0..orphan_modules {
        snap = snap.with_module(&format!("orphan{j}.sys"), &format!("\\??\\C:\\stray\\orphan{j}.sys"));
    }
    snap
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn nothing_dropped_nothing_duplicated(
        drivers in proptest::collection::vec(arb_presence(), 0..12),
        orphan_modules in 0usize..4,
    ) {
        let snap = build(&drivers, orphan_modules);
        let driver_services = snap.services.iter().filter(|s| s.kind.is_driver()).count();
        let objects = snap.objects.len();
        let modules = snap.modules.len();

        let store = SnapshotSources::new(snap);
        let mut inventory = Inventory::new(store.sources(), PathSettings::default());
        inventory.refresh().unwrap();

        let mut seen = HashSet::new();
        for entity in inventory.entities() {
            prop_assert!(seen.insert(entity.identifier().to_lowercase()),
                "duplicate identifier {}", &*entity.identifier());
            prop_assert!(entity.record().is_observed());
        }

        let with_service = inventory.entities().iter()
            .filter(|e| e.record().service.is_some()).count();
        let with_object = inventory.entities().iter()
            .filter(|e| e.record().has_namespace_object).count();
        let with_module = inventory.entities().iter()
            .filter(|e| e.record().module.is_some()).count();
        prop_assert_eq!(with_service, driver_services);
        prop_assert_eq!(with_object, objects);
        prop_assert_eq!(with_module, modules);

        // A key without a service is kept exactly when its Type names a driver.
        for (i, d) in drivers.iter().enumerate() {
            if d.service.is_none() {
                let keyed = match inventory.find(&format!("drv{i}")) {
                    Some(entity) => {
                        let record = entity.record();
                        record.config_key.is_some()
                    }
                    None => false,
                };
                let driver_type = matches!(d.key_type, Some(Some(1 | 2 | 8)));
                prop_assert_eq!(keyed, driver_type, "drv{}", i);
            }
        }
    }

    #[test]
    fn refresh_is_deterministic(
        drivers in proptest::collection::vec(arb_presence(), 0..12),
        orphan_modules in 0usize..4,
    ) {
        let snap = build(&drivers, orphan_modules);
        let paths = PathSettings::default();

        let a = SnapshotSources::new(snap.clone());
        let mut first = Inventory::new(a.sources(), paths.clone());
        first.refresh().unwrap();

        let b = SnapshotSources::new(snap);
        let mut second = Inventory::new(b.sources(), paths);
        second.refresh().unwrap();
        prop_assert_eq!(first.rows(), second.rows());

        let again = first.refresh().unwrap();
        prop_assert!(again.added.is_empty());
        prop_assert!(again.removed.is_empty());
        prop_assert_eq!(first.rows(), second.rows());
    }
}
