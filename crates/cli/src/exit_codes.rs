//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Code | Domain     | Description                                   |
//! |------|------------|-----------------------------------------------|
//! | 0    | Universal  | Success                                       |
//! | 1    | Universal  | General error (unspecified)                   |
//! | 2    | Universal  | CLI usage error (bad args, unknown column)    |
//! | 3    | snapshot   | Snapshot file missing, unreadable or invalid  |
//! | 4    | inventory  | Identifier collision during reconciliation    |
//! | 5    | key        | Configuration key not found                   |
//! | 6    | key        | Key creation, edit or deletion rejected       |
//! | 7    | inventory  | No driver with the requested identifier       |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use drvscope_inventory::InventoryError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unknown column names.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Inventory (3-7)
// =============================================================================

/// Snapshot file could not be read, parsed or written back.
pub const EXIT_SNAPSHOT: u8 = 3;

/// Two records reconciled to the same identifier; nothing was published.
pub const EXIT_COLLISION: u8 = 4;

/// The named configuration key does not exist.
pub const EXIT_KEY_NOT_FOUND: u8 = 5;

/// The configuration store rejected a key mutation (bad name, bad value).
pub const EXIT_KEY_MUTATION: u8 = 6;

/// `show`/`key` was given an identifier the inventory does not contain.
pub const EXIT_DRIVER_NOT_FOUND: u8 = 7;

/// Map an inventory error to its exit code.
pub fn inventory_exit_code(err: &InventoryError) -> u8 {
    match err {
        InventoryError::SnapshotParse(_) | InventoryError::Io(_) => EXIT_SNAPSHOT,
        InventoryError::IdentifierCollision { .. } => EXIT_COLLISION,
        InventoryError::KeyNotFound(_) => EXIT_KEY_NOT_FOUND,
        InventoryError::InvalidKeyName(_)
        | InventoryError::InvalidValue { .. }
        | InventoryError::Store(_) => EXIT_KEY_MUTATION,
        InventoryError::SourceUnavailable { .. } | InventoryError::RecordBorrowed { .. } => EXIT_ERROR,
    }
}
