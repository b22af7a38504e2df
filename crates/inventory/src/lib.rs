//! `drvscope-inventory`: driver inventory reconciliation.
//!
//! Pulls four raw listings (service manager, configuration store, kernel
//! object namespace, loaded modules), merges them into one record per driver,
//! and projects the result onto a stable, observable entity collection.
//! The raw access primitives sit behind the traits in [`source`].

pub mod derived;
pub mod engine;
pub mod error;
pub mod events;
pub mod inventory;
pub mod key_edit;
pub mod matcher;
pub mod model;
pub mod paths;
pub mod projector;
pub mod snapshot;
pub mod source;

pub use derived::{Capabilities, DriverRow, DriverStatus};
pub use engine::{collect_listings, reconcile, Listings};
pub use error::InventoryError;
pub use events::{EventCallback, EventCollector, InventoryEvent};
pub use inventory::{Inventory, RefreshReport};
pub use key_edit::{KeyChange, ServiceKeyEdit, ServiceKeyValues};
pub use model::{
    DriverRecord, ObjectNamespace, RawModuleRecord, RawNamespaceEntry, RawServiceRecord, RegValue, ServiceKind,
    ServiceStatus, StartType,
};
pub use paths::PathSettings;
pub use projector::{project, Change, DisplayEntity, Projection};
pub use snapshot::{KeyData, Snapshot, SnapshotSources};
pub use source::{ConfigKey, ConfigStore, ModuleSource, NamespaceSource, ServiceSource, SourceKind, Sources};
