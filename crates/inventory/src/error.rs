use std::fmt;

use crate::source::SourceKind;

#[derive(Debug)]
pub enum InventoryError {
    /// A raw listing could not be obtained (permission denied, subsystem absent).
    SourceUnavailable { source: SourceKind, reason: String },
    /// Two records resolved to the same case-insensitive identifier.
    IdentifierCollision { identifier: String },
    /// A caller still holds a borrow of this entity's record, so it cannot be
    /// swapped. Release it and refresh again.
    RecordBorrowed { identifier: String },
    /// No configuration key with this name exists.
    KeyNotFound(String),
    /// Key name rejected before reaching the store.
    InvalidKeyName(String),
    /// A value outside the accepted set (e.g. unknown service type code).
    InvalidValue { name: String, value: String },
    /// Configuration store refused a mutation.
    Store(String),
    /// Snapshot JSON could not be parsed.
    SnapshotParse(String),
    /// IO error (file read/write).
    Io(String),
}

impl fmt::Display for InventoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceUnavailable { source, reason } => {
                write!(f, "{source} source unavailable: {reason}")
            }
            Self::IdentifierCollision { identifier } => {
                write!(f, "identifier collision: '{identifier}' produced by more than one record")
            }
            Self::RecordBorrowed { identifier } => {
                write!(f, "record '{identifier}' is still borrowed; refresh skipped")
            }
            Self::KeyNotFound(name) => write!(f, "configuration key '{name}' not found"),
            Self::InvalidKeyName(msg) => write!(f, "invalid key name: {msg}"),
            Self::InvalidValue { name, value } => {
                write!(f, "invalid value for '{name}': {value}")
            }
            Self::Store(msg) => write!(f, "configuration store error: {msg}"),
            Self::SnapshotParse(msg) => write!(f, "snapshot parse error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for InventoryError {}

impl From<std::io::Error> for InventoryError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
