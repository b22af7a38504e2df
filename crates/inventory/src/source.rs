//! Seams to the four external data sources and the configuration store.
//!
//! Implementations live outside the engine: the snapshot store in
//! [`crate::snapshot`], or platform bindings supplied by the caller.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;
use crate::model::{ObjectNamespace, RawModuleRecord, RawNamespaceEntry, RawServiceRecord, RegValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Services,
    Config,
    Namespace,
    Modules,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Services => write!(f, "services"),
            Self::Config => write!(f, "config"),
            Self::Namespace => write!(f, "namespace"),
            Self::Modules => write!(f, "modules"),
        }
    }
}

/// An open handle on one configuration-store key.
///
/// Dropping the handle releases it. `duplicate` yields an independent handle
/// on the same key that must be released separately.
pub trait ConfigKey: fmt::Debug {
    fn name(&self) -> &str;

    /// Store-qualified path of the key, as a loader would reference it.
    fn full_path(&self) -> String;

    fn query_value(&self, name: &str) -> Option<RegValue>;

    fn set_value(&mut self, name: &str, value: RegValue) -> Result<(), InventoryError>;

    fn delete_value(&mut self, name: &str) -> Result<(), InventoryError>;

    fn last_write_time(&self) -> Option<DateTime<Utc>>;

    fn duplicate(&self) -> Result<Box<dyn ConfigKey>, InventoryError>;
}

pub trait ServiceSource {
    fn list_services(&self) -> Result<Vec<RawServiceRecord>, InventoryError>;
}

pub trait ConfigStore {
    /// Open a scan handle on every accessible service key.
    fn list_keys(&self) -> Result<Vec<Box<dyn ConfigKey>>, InventoryError>;

    fn open_key(&self, name: &str) -> Result<Box<dyn ConfigKey>, InventoryError>;

    /// Create the key, or open it when it already exists.
    fn create_key(&self, name: &str) -> Result<Box<dyn ConfigKey>, InventoryError>;

    fn delete_key(&self, name: &str) -> Result<(), InventoryError>;
}

pub trait NamespaceSource {
    fn list_objects(&self, namespace: ObjectNamespace) -> Result<Vec<RawNamespaceEntry>, InventoryError>;
}

pub trait ModuleSource {
    fn list_modules(&self) -> Result<Vec<RawModuleRecord>, InventoryError>;
}

/// The four collaborators one refresh reads from.
pub struct Sources {
    pub services: Box<dyn ServiceSource>,
    pub config: Box<dyn ConfigStore>,
    pub namespace: Box<dyn NamespaceSource>,
    pub modules: Box<dyn ModuleSource>,
}
