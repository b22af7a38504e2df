use std::collections::HashSet;

use crate::error::InventoryError;
use crate::matcher::{ConsumablePool, RecordIndex};
use crate::model::{fold, DriverRecord, ObjectNamespace, RawModuleRecord, RawNamespaceEntry, RawServiceRecord};
use crate::paths::PathSettings;
use crate::source::{ConfigKey, SourceKind, Sources};

/// Raw listings read for one refresh. Config keys are scan handles: they are
/// released when the listing is dropped, whatever the outcome of the refresh.
#[derive(Debug, Default)]
pub struct Listings {
    pub services: Vec<RawServiceRecord>,
    pub config_keys: Vec<Box<dyn ConfigKey>>,
    pub namespace: Vec<RawNamespaceEntry>,
    pub modules: Vec<RawModuleRecord>,
    /// Sources that failed and were read as empty.
    pub degraded: Vec<SourceKind>,
}

/// Read all four sources in order. A failing source is logged and treated as
/// an empty listing.
pub fn collect_listings(sources: &Sources) -> Listings {
    let mut degraded = Vec::new();

    let services = or_empty(SourceKind::Services, sources.services.list_services(), &mut degraded);
    let config_keys = or_empty(SourceKind::Config, sources.config.list_keys(), &mut degraded);

    let mut namespace = Vec::new();
    for ns in ObjectNamespace::ALL {
        namespace.extend(or_empty(
            SourceKind::Namespace,
            sources.namespace.list_objects(ns),
            &mut degraded,
        ));
    }

    let modules = or_empty(SourceKind::Modules, sources.modules.list_modules(), &mut degraded);

    log::debug!(
        "collected {} services, {} config keys, {} namespace objects, {} modules",
        services.len(),
        config_keys.len(),
        namespace.len(),
        modules.len()
    );

    Listings {
        services,
        config_keys,
        namespace,
        modules,
        degraded,
    }
}

fn or_empty<T>(
    kind: SourceKind,
    result: Result<Vec<T>, InventoryError>,
    degraded: &mut Vec<SourceKind>,
) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(e) => {
            log::warn!("{e}; continuing without {kind} listing");
            if !degraded.contains(&kind) {
                degraded.push(kind);
            }
            Vec::new()
        }
    }
}

/// Merge the four listings into one record per driver, in discovery order.
///
/// Config keys are borrowed: every record that keeps one holds its own
/// duplicate. Fails only on an identifier collision, which is a defect in
/// the inputs or the identifier rules.
pub fn reconcile(
    services: Vec<RawServiceRecord>,
    config_keys: &[Box<dyn ConfigKey>],
    namespace: Vec<RawNamespaceEntry>,
    modules: Vec<RawModuleRecord>,
    paths: &PathSettings,
) -> Result<Vec<DriverRecord>, InventoryError> {
    let mut service_pool = ConsumablePool::new(services, |s| s.name.as_str());
    if let Some(dup) = service_pool.duplicate_keys().first() {
        return Err(InventoryError::IdentifierCollision {
            identifier: dup.to_string(),
        });
    }

    // 1 ─ config keys, claiming same-named services
    let mut records: Vec<DriverRecord> = config_keys
        .iter()
        .filter_map(|key| merge_config_key(key.as_ref(), &mut service_pool))
        .collect();
    log::debug!("config pass: {} records", records.len());

    // 2 ─ services without a key
    let before = records.len();
    records.extend(
        service_pool
            .into_remaining()
            .into_iter()
            .filter(|s| s.kind.is_driver())
            .map(|service| {
                let mut record = DriverRecord::new(service.name.clone());
                record.service = Some(service);
                record
            }),
    );
    log::debug!("leftover service pass: {} records", records.len() - before);

    // 3 ─ live driver objects
    let before = records.len();
    attach_namespace_objects(&mut records, namespace);
    log::debug!("namespace pass: {} orphan objects", records.len() - before);

    // 4 ─ loaded modules by resolved image path
    let mut module_pool = ConsumablePool::new(modules, |m| m.full_path.as_str());
    attach_modules(&mut records, &mut module_pool, paths);

    // 5 ─ modules nobody claimed
    let before = records.len();
    records.extend(module_pool.into_remaining().into_iter().map(|module| {
        let mut record = DriverRecord::new(module.name.clone());
        record.module = Some(module);
        record
    }));
    log::debug!("leftover module pass: {} orphan modules", records.len() - before);

    ensure_unique(&records)?;
    Ok(records)
}

fn merge_config_key(
    key: &dyn ConfigKey,
    service_pool: &mut ConsumablePool<RawServiceRecord>,
) -> Option<DriverRecord> {
    let name = key.name();

    if let Some(service) = service_pool.take(name) {
        if !service.kind.is_driver() {
            return None;
        }
        let object = key
            .query_value("ObjectName")
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| name.to_string());

        let mut record = DriverRecord::new(name);
        record.expected_object_name = Some(service.kind.namespace().object_path(&object));
        record.config_key = retain(key);
        record.service = Some(service);
        return Some(record);
    }

    let type_code = match key.query_value("Type") {
        Some(value) => match value.as_dword() {
            Some(code) => code,
            None => {
                log::debug!("key '{name}': Type is not a dword, skipping");
                return None;
            }
        },
        None => return None,
    };
    let namespace = ObjectNamespace::for_type_code(type_code)?;

    // Without a handle and a service nothing would vouch for this record.
    let config_key = retain(key)?;
    let mut record = DriverRecord::new(name);
    record.expected_object_name = Some(namespace.object_path(name));
    record.config_key = Some(config_key);
    Some(record)
}

fn retain(key: &dyn ConfigKey) -> Option<Box<dyn ConfigKey>> {
    match key.duplicate() {
        Ok(dup) => Some(dup),
        Err(e) => {
            log::warn!("cannot retain key '{}': {e}", key.name());
            None
        }
    }
}

fn attach_namespace_objects(records: &mut Vec<DriverRecord>, entries: Vec<RawNamespaceEntry>) {
    let mut index = RecordIndex::build(records);

    for entry in entries.into_iter().filter(RawNamespaceEntry::is_driver_object) {
        match index.find_object(&entry.path, entry.leaf_name()) {
            Some(i) => records[i].has_namespace_object = true,
            None => {
                let mut record = DriverRecord::new(entry.leaf_name());
                record.has_namespace_object = true;
                record.expected_object_name = Some(entry.path);
                index.insert(records.len(), &record);
                records.push(record);
            }
        }
    }
}

fn attach_modules(
    records: &mut [DriverRecord],
    pool: &mut ConsumablePool<RawModuleRecord>,
    paths: &PathSettings,
) {
    for record in records.iter_mut() {
        let active = record.has_namespace_object
            || record.service.as_ref().is_some_and(|s| s.status.is_active());
        if !active {
            continue;
        }
        let image_path = record.expected_image_path(paths);
        record.module = pool.take(&image_path);
        if record.module.is_none() {
            log::trace!("'{}': no loaded module at {image_path}", record.identifier);
        }
    }
}

fn ensure_unique(records: &[DriverRecord]) -> Result<(), InventoryError> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(fold(&record.identifier)) {
            return Err(InventoryError::IdentifierCollision {
                identifier: record.identifier.clone(),
            });
        }
    }
    Ok(())
}
