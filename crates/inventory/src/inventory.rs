//! The observable driver collection.

use std::rc::Rc;

use serde::Serialize;

use crate::derived::DriverRow;
use crate::engine::{collect_listings, reconcile, Listings};
use crate::error::InventoryError;
use crate::events::{EventCallback, InventoryEvent};
use crate::key_edit::validate_key_name;
use crate::model::eq_fold;
use crate::paths::PathSettings;
use crate::projector::{project, DisplayEntity};
use crate::source::{ConfigKey, SourceKind, Sources};

/// Outcome of one successful refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshReport {
    pub revision: u64,
    pub total: usize,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub updated: usize,
    /// Sources that failed and were read as empty this cycle.
    pub degraded_sources: Vec<SourceKind>,
}

/// Stable collection of driver entities, refreshed on demand.
///
/// Entities are shared `Rc`s: a caller may hold one across refreshes and will
/// see its attributes change while its identity is kept.
pub struct Inventory {
    sources: Sources,
    paths: PathSettings,
    entities: Vec<Rc<DisplayEntity>>,
    subscribers: Vec<EventCallback>,
    revision: u64,
}

impl Inventory {
    pub fn new(sources: Sources, paths: PathSettings) -> Self {
        Self {
            sources,
            paths,
            entities: Vec::new(),
            subscribers: Vec::new(),
            revision: 0,
        }
    }

    pub fn paths(&self) -> &PathSettings {
        &self.paths
    }

    /// Number of successful refreshes so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn entities(&self) -> &[Rc<DisplayEntity>] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Case-insensitive lookup by identifier.
    pub fn find(&self, identifier: &str) -> Option<Rc<DisplayEntity>> {
        self.entities
            .iter()
            .find(|e| eq_fold(&e.identifier(), identifier))
            .cloned()
    }

    pub fn rows(&self) -> Vec<DriverRow> {
        self.entities.iter().map(|e| e.row(&self.paths)).collect()
    }

    pub fn subscribe(&mut self, callback: EventCallback) {
        self.subscribers.push(callback);
    }

    /// Re-read every source, reconcile, and project onto the collection.
    ///
    /// On error the collection and revision are unchanged and no event is
    /// emitted. Scan handles are released before returning either way.
    /// A `record()` borrow held across the call fails it with
    /// [`InventoryError::RecordBorrowed`].
    pub fn refresh(&mut self) -> Result<RefreshReport, InventoryError> {
        let Listings {
            services,
            config_keys,
            namespace,
            modules,
            degraded,
        } = collect_listings(&self.sources);

        let records = reconcile(services, &config_keys, namespace, modules, &self.paths)?;
        drop(config_keys);
        let projection = project(&self.entities, records)?;

        let events = projection.events();
        self.entities = projection.entities;
        self.revision += 1;

        let report = RefreshReport {
            revision: self.revision,
            total: self.entities.len(),
            added: projection.added.into_iter().map(|c| c.identifier).collect(),
            removed: projection.removed.into_iter().map(|c| c.identifier).collect(),
            updated: projection.updated,
            degraded_sources: degraded,
        };
        log::info!(
            "refresh r{}: {} drivers (+{} -{} ~{})",
            report.revision,
            report.total,
            report.added.len(),
            report.removed.len(),
            report.updated
        );

        let reset = InventoryEvent::Reset {
            revision: self.revision,
            len: self.entities.len(),
        };
        for event in events.iter().chain(std::iter::once(&reset)) {
            for subscriber in self.subscribers.iter_mut() {
                subscriber(event);
            }
        }

        Ok(report)
    }

    /// Create (or open) the service key `name` in the configuration store.
    /// The collection picks it up on the next refresh.
    pub fn create_key(&self, name: &str) -> Result<Box<dyn ConfigKey>, InventoryError> {
        let name = validate_key_name(name)?;
        log::info!("creating service key '{name}'");
        self.sources.config.create_key(&name)
    }

    /// Delete the service key backing `identifier`.
    pub fn delete_key(&self, identifier: &str) -> Result<(), InventoryError> {
        let name = self.key_name(identifier);
        log::info!("deleting service key '{name}'");
        self.sources.config.delete_key(&name)
    }

    /// A fresh handle on the key backing `identifier`, for editing. The
    /// caller owns and releases it.
    pub fn open_key_for_edit(&self, identifier: &str) -> Result<Box<dyn ConfigKey>, InventoryError> {
        if let Some(entity) = self.find(identifier) {
            let record = entity.record();
            if let Some(ref key) = record.config_key {
                return key.duplicate();
            }
        }
        self.sources.config.open_key(identifier)
    }

    fn key_name(&self, identifier: &str) -> String {
        self.find(identifier)
            .and_then(|entity| {
                let record = entity.record();
                record.config_key.as_ref().map(|k| k.name().to_string())
            })
            .unwrap_or_else(|| identifier.to_string())
    }
}
