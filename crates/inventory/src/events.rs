//! Change notifications for the published driver collection.
//!
//! Subscribers see exactly the collection edits a refresh made, in the order
//! it made them, so a bound view can replay them instead of rebuilding.

/// Events emitted by [`crate::Inventory`] after a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryEvent {
    /// An entity was appended at `index`.
    Added { identifier: String, index: usize },

    /// An entity was removed from `index` (position before removal).
    Removed { identifier: String, index: usize },

    /// Emitted once per refresh, after all adds and removes.
    /// Surviving entities may have new attribute values.
    Reset { revision: u64, len: usize },
}

/// Callback type for receiving inventory events.
pub type EventCallback = Box<dyn FnMut(&InventoryEvent)>;

/// Simple event collector for testing.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<InventoryEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn push(&mut self, event: InventoryEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[InventoryEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn added(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                InventoryEvent::Added { identifier, .. } => Some(identifier.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn removed(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                InventoryEvent::Removed { identifier, .. } => Some(identifier.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Revisions of every Reset event, in order.
    pub fn resets(&self) -> Vec<u64> {
        self.events
            .iter()
            .filter_map(|e| match e {
                InventoryEvent::Reset { revision, .. } => Some(*revision),
                _ => None,
            })
            .collect()
    }
}
