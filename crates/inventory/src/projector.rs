//! Projects a fresh reconciliation onto the previously published collection.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::derived::{Capabilities, DriverRow, DriverStatus};
use crate::error::InventoryError;
use crate::events::InventoryEvent;
use crate::model::{fold, DriverRecord};
use crate::paths::PathSettings;

/// Stable, shared handle for one driver. Survives refreshes for as long as
/// its identifier keeps being produced; only the wrapped record changes.
#[derive(Debug)]
pub struct DisplayEntity {
    record: RefCell<DriverRecord>,
}

impl DisplayEntity {
    pub fn new(record: DriverRecord) -> Self {
        Self {
            record: RefCell::new(record),
        }
    }

    pub fn identifier(&self) -> Ref<'_, str> {
        Ref::map(self.record.borrow(), |r| r.identifier.as_str())
    }

    pub fn record(&self) -> Ref<'_, DriverRecord> {
        self.record.borrow()
    }

    /// Swap in a newer record, releasing the old one.
    pub fn replace(&self, record: DriverRecord) {
        drop(self.record.replace(record));
    }

    pub fn status(&self) -> DriverStatus {
        self.record.borrow().status()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.record.borrow().capabilities()
    }

    pub fn image_path(&self, paths: &PathSettings) -> String {
        self.record.borrow().image_path(paths)
    }

    pub fn row(&self, paths: &PathSettings) -> DriverRow {
        self.record.borrow().row(paths)
    }
}

/// Where one collection edit happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub identifier: String,
    pub index: usize,
}

#[derive(Debug, Default)]
pub struct Projection {
    pub entities: Vec<Rc<DisplayEntity>>,
    /// Removals in order; each index is valid once the earlier ones are applied.
    pub removed: Vec<Change>,
    /// Appends in order, indexed into the final collection.
    pub added: Vec<Change>,
    pub updated: usize,
}

impl Projection {
    /// Removals, then additions, as collection events.
    pub fn events(&self) -> Vec<InventoryEvent> {
        let removed = self.removed.iter().map(|c| InventoryEvent::Removed {
            identifier: c.identifier.clone(),
            index: c.index,
        });
        let added = self.added.iter().map(|c| InventoryEvent::Added {
            identifier: c.identifier.clone(),
            index: c.index,
        });
        removed.chain(added).collect()
    }

}

/// Match `records` against `previous` by case-insensitive identifier.
///
/// Survivors keep their `Rc` and position order; vanished entities are
/// dropped; new records are appended in discovery order. Duplicate
/// identifiers in `records`, or a survivor whose record is still borrowed,
/// fail the projection before anything is touched.
pub fn project(previous: &[Rc<DisplayEntity>], records: Vec<DriverRecord>) -> Result<Projection, InventoryError> {
    let mut by_identifier: HashMap<String, usize> = HashMap::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        if by_identifier.insert(fold(&record.identifier), i).is_some() {
            return Err(InventoryError::IdentifierCollision {
                identifier: record.identifier.clone(),
            });
        }
    }

    // Every survivor must be swappable before any of them is touched.
    let matches: Vec<Option<usize>> = previous
        .iter()
        .map(|entity| by_identifier.get(&fold(&entity.identifier())).copied())
        .collect();
    for (entity, matched) in previous.iter().zip(&matches) {
        if matched.is_some() && entity.record.try_borrow_mut().is_err() {
            return Err(InventoryError::RecordBorrowed {
                identifier: entity.identifier().to_string(),
            });
        }
    }

    let mut slots: Vec<Option<DriverRecord>> = records.into_iter().map(Some).collect();
    let mut projection = Projection {
        entities: Vec::with_capacity(slots.len()),
        ..Projection::default()
    };

    for (entity, matched) in previous.iter().zip(matches) {
        match matched.and_then(|i| slots[i].take()) {
            Some(record) => {
                entity.replace(record);
                projection.entities.push(Rc::clone(entity));
                projection.updated += 1;
            }
            None => projection.removed.push(Change {
                identifier: entity.identifier().to_string(),
                index: projection.entities.len(),
            }),
        }
    }

    for record in slots.into_iter().flatten() {
        projection.added.push(Change {
            identifier: record.identifier.clone(),
            index: projection.entities.len(),
        });
        projection.entities.push(Rc::new(DisplayEntity::new(record)));
    }

    Ok(projection)
}
