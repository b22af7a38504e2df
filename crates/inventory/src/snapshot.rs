//! JSON snapshot of the four sources.
//!
//! Stands in for the live platform primitives: the CLI reads a captured
//! snapshot file, tests build one in code. Config-key mutations write through
//! to the shared in-memory snapshot; [`SnapshotSources::save`] persists them.

use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;
use crate::model::{
    eq_fold, ObjectNamespace, RawModuleRecord, RawNamespaceEntry, RawServiceRecord, RegValue, ServiceKind,
    ServiceStatus,
};
use crate::source::{ConfigKey, ConfigStore, ModuleSource, NamespaceSource, ServiceSource, SourceKind, Sources};

const SERVICES_ROOT: &str = "\\Registry\\Machine\\SYSTEM\\CurrentControlSet\\Services";

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub services: Vec<RawServiceRecord>,
    #[serde(default)]
    pub config_keys: Vec<KeyData>,
    #[serde(default)]
    pub objects: Vec<RawNamespaceEntry>,
    #[serde(default)]
    pub modules: Vec<RawModuleRecord>,
    /// Sources that report themselves unavailable when read.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<SourceKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyData {
    pub name: String,
    #[serde(default)]
    pub values: BTreeMap<String, RegValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_write_time: Option<DateTime<Utc>>,
}

impl KeyData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
            last_write_time: None,
        }
    }

    pub fn value(mut self, name: impl Into<String>, value: RegValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn written_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_write_time = Some(at);
        self
    }

    fn get(&self, name: &str) -> Option<&RegValue> {
        self.values
            .iter()
            .find(|(k, _)| eq_fold(k, name))
            .map(|(_, v)| v)
    }

    fn remove(&mut self, name: &str) -> Option<RegValue> {
        let existing = self.values.keys().find(|k| eq_fold(k, name)).cloned()?;
        self.values.remove(&existing)
    }
}

impl Snapshot {
    pub fn from_json(input: &str) -> Result<Self, InventoryError> {
        serde_json::from_str(input).map_err(|e| InventoryError::SnapshotParse(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, InventoryError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| InventoryError::Io(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&contents)
    }

    pub fn to_json(&self) -> Result<String, InventoryError> {
        serde_json::to_string_pretty(self).map_err(|e| InventoryError::SnapshotParse(e.to_string()))
    }

    pub fn with_service(mut self, name: &str, kind: ServiceKind, status: ServiceStatus) -> Self {
        self.services.push(RawServiceRecord {
            name: name.into(),
            display_name: name.into(),
            kind,
            status,
            start_type: None,
        });
        self
    }

    pub fn with_key(mut self, key: KeyData) -> Self {
        self.config_keys.push(key);
        self
    }

    pub fn with_object(mut self, path: &str) -> Self {
        self.objects.push(RawNamespaceEntry::new(path));
        self
    }

    pub fn with_module(mut self, name: &str, full_path: &str) -> Self {
        self.modules.push(RawModuleRecord {
            name: name.into(),
            full_path: full_path.into(),
            image_base: 0,
            mapped_base: 0,
            section: 0,
            image_size: 0,
            flags: 0,
            load_order_index: self.modules.len() as u16,
            init_order_index: 0,
            load_count: 1,
        });
        self
    }

    pub fn with_unavailable(mut self, source: SourceKind) -> Self {
        self.unavailable.push(source);
        self
    }

    fn key_position(&self, name: &str) -> Option<usize> {
        self.config_keys.iter().position(|k| eq_fold(&k.name, name))
    }

    fn check_available(&self, source: SourceKind) -> Result<(), InventoryError> {
        if self.unavailable.contains(&source) {
            return Err(InventoryError::SourceUnavailable {
                source,
                reason: "marked unavailable in snapshot".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Shared, single-threaded view over a [`Snapshot`] implementing every source
/// trait. Clones share state.
#[derive(Debug, Clone)]
pub struct SnapshotSources {
    state: Rc<RefCell<Snapshot>>,
    open_handles: Rc<Cell<usize>>,
    path: Option<PathBuf>,
}

impl SnapshotSources {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            state: Rc::new(RefCell::new(snapshot)),
            open_handles: Rc::new(Cell::new(0)),
            path: None,
        }
    }

    /// Load a snapshot file; `save` and `reload` use the same path.
    pub fn open(path: &Path) -> Result<Self, InventoryError> {
        let mut sources = Self::new(Snapshot::load(path)?);
        sources.path = Some(path.to_path_buf());
        Ok(sources)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-read the backing file, replacing the in-memory snapshot.
    pub fn reload(&self) -> Result<(), InventoryError> {
        if let Some(ref path) = self.path {
            let fresh = Snapshot::load(path)?;
            self.replace(fresh);
        }
        Ok(())
    }

    pub fn save(&self) -> Result<(), InventoryError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let json = self.state.borrow().to_json()?;
        fs::write(path, json)
            .map_err(|e| InventoryError::Io(format!("cannot write {}: {e}", path.display())))
    }

    pub fn replace(&self, snapshot: Snapshot) {
        *self.state.borrow_mut() = snapshot;
    }

    pub fn snapshot(&self) -> Ref<'_, Snapshot> {
        self.state.borrow()
    }

    /// Key handles currently open against this store.
    pub fn open_handles(&self) -> usize {
        self.open_handles.get()
    }

    pub fn sources(&self) -> Sources {
        Sources {
            services: Box::new(self.clone()),
            config: Box::new(self.clone()),
            namespace: Box::new(self.clone()),
            modules: Box::new(self.clone()),
        }
    }

    fn handle(&self, name: String) -> Box<dyn ConfigKey> {
        Box::new(SnapshotKey::new(name, Rc::clone(&self.state), Rc::clone(&self.open_handles)))
    }
}

impl ServiceSource for SnapshotSources {
    fn list_services(&self) -> Result<Vec<RawServiceRecord>, InventoryError> {
        let snap = self.state.borrow();
        snap.check_available(SourceKind::Services)?;
        Ok(snap.services.clone())
    }
}

impl ConfigStore for SnapshotSources {
    fn list_keys(&self) -> Result<Vec<Box<dyn ConfigKey>>, InventoryError> {
        let names: Vec<String> = {
            let snap = self.state.borrow();
            snap.check_available(SourceKind::Config)?;
            snap.config_keys.iter().map(|k| k.name.clone()).collect()
        };
        Ok(names.into_iter().map(|n| self.handle(n)).collect())
    }

    fn open_key(&self, name: &str) -> Result<Box<dyn ConfigKey>, InventoryError> {
        let canonical = {
            let snap = self.state.borrow();
            let pos = snap
                .key_position(name)
                .ok_or_else(|| InventoryError::KeyNotFound(name.into()))?;
            snap.config_keys[pos].name.clone()
        };
        Ok(self.handle(canonical))
    }

    fn create_key(&self, name: &str) -> Result<Box<dyn ConfigKey>, InventoryError> {
        {
            let mut snap = self.state.borrow_mut();
            if snap.key_position(name).is_none() {
                snap.config_keys
                    .push(KeyData::new(name).written_at(Utc::now()));
            }
        }
        self.open_key(name)
    }

    fn delete_key(&self, name: &str) -> Result<(), InventoryError> {
        let mut snap = self.state.borrow_mut();
        let pos = snap
            .key_position(name)
            .ok_or_else(|| InventoryError::KeyNotFound(name.into()))?;
        snap.config_keys.remove(pos);
        Ok(())
    }
}

impl NamespaceSource for SnapshotSources {
    fn list_objects(&self, namespace: ObjectNamespace) -> Result<Vec<RawNamespaceEntry>, InventoryError> {
        let snap = self.state.borrow();
        snap.check_available(SourceKind::Namespace)?;
        let prefix = format!("{}\\", namespace.prefix());
        Ok(snap
            .objects
            .iter()
            .filter(|o| {
                o.path.len() > prefix.len() && o.path.get(..prefix.len()).is_some_and(|p| eq_fold(p, &prefix))
            })
            .cloned()
            .collect())
    }
}

impl ModuleSource for SnapshotSources {
    fn list_modules(&self) -> Result<Vec<RawModuleRecord>, InventoryError> {
        let snap = self.state.borrow();
        snap.check_available(SourceKind::Modules)?;
        Ok(snap.modules.clone())
    }
}

// ---------------------------------------------------------------------------
// Key handle
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SnapshotKey {
    name: String,
    state: Rc<RefCell<Snapshot>>,
    open_handles: Rc<Cell<usize>>,
}

impl SnapshotKey {
    fn new(name: String, state: Rc<RefCell<Snapshot>>, open_handles: Rc<Cell<usize>>) -> Self {
        open_handles.set(open_handles.get() + 1);
        Self {
            name,
            state,
            open_handles,
        }
    }

    fn with_data<R>(&self, f: impl FnOnce(&KeyData) -> R) -> Option<R> {
        let snap = self.state.borrow();
        snap.key_position(&self.name).map(|pos| f(&snap.config_keys[pos]))
    }

    fn with_data_mut<R>(&self, f: impl FnOnce(&mut KeyData) -> R) -> Result<R, InventoryError> {
        let mut snap = self.state.borrow_mut();
        let pos = snap
            .key_position(&self.name)
            .ok_or_else(|| InventoryError::KeyNotFound(self.name.clone()))?;
        let key = &mut snap.config_keys[pos];
        key.last_write_time = Some(Utc::now());
        Ok(f(key))
    }
}

impl Drop for SnapshotKey {
    fn drop(&mut self) {
        self.open_handles.set(self.open_handles.get().saturating_sub(1));
    }
}

impl ConfigKey for SnapshotKey {
    fn name(&self) -> &str {
        &self.name
    }

    fn full_path(&self) -> String {
        format!("{SERVICES_ROOT}\\{}", self.name)
    }

    fn query_value(&self, name: &str) -> Option<RegValue> {
        self.with_data(|k| k.get(name).cloned()).flatten()
    }

    fn set_value(&mut self, name: &str, value: RegValue) -> Result<(), InventoryError> {
        self.with_data_mut(|k| {
            k.remove(name);
            k.values.insert(name.to_string(), value);
        })
    }

    fn delete_value(&mut self, name: &str) -> Result<(), InventoryError> {
        self.with_data_mut(|k| k.remove(name))?
            .map(|_| ())
            .ok_or_else(|| InventoryError::Store(format!("value '{name}' not found under '{}'", self.name)))
    }

    fn last_write_time(&self) -> Option<DateTime<Utc>> {
        self.with_data(|k| k.last_write_time).flatten()
    }

    fn duplicate(&self) -> Result<Box<dyn ConfigKey>, InventoryError> {
        if self.with_data(|_| ()).is_none() {
            return Err(InventoryError::KeyNotFound(self.name.clone()));
        }
        Ok(Box::new(SnapshotKey::new(
            self.name.clone(),
            Rc::clone(&self.state),
            Rc::clone(&self.open_handles),
        )))
    }
}
