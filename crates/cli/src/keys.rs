//! `drvscope key create | delete | edit`
//!
//! Mutations go through the inventory's configuration store and are written
//! back to the snapshot file only when something changed.

use std::path::Path;

use clap::Args;

use drvscope_inventory::key_edit::image_path_from_file;
use drvscope_inventory::{ConfigKey, Inventory, KeyChange, ServiceKeyEdit, ServiceKeyValues};

use crate::{CliError, Context};

/// Value overrides shared by `key create` and `key edit`.
#[derive(Args, Debug, Default)]
pub(crate) struct EditArgs {
    /// ImagePath value (empty string removes it)
    #[arg(long, value_name = "PATH", conflicts_with = "image_file")]
    image_path: Option<String>,

    /// Driver file to derive ImagePath from (C:\Windows\... becomes \SystemRoot\...)
    #[arg(long, value_name = "FILE")]
    image_file: Option<String>,

    /// Windows directory used to shorten --image-file
    #[arg(long, value_name = "DIR", default_value = "C:\\Windows")]
    windows_dir: String,

    /// DisplayName value (empty string removes it)
    #[arg(long, value_name = "TEXT")]
    display_name: Option<String>,

    /// Description value (empty string removes it)
    #[arg(long, value_name = "TEXT")]
    description: Option<String>,

    /// Group value (empty string removes it)
    #[arg(long, value_name = "NAME")]
    group: Option<String>,

    /// Service type code
    #[arg(long = "type", value_name = "CODE")]
    service_type: Option<u32>,

    /// Start type code
    #[arg(long, value_name = "CODE")]
    start: Option<u32>,

    /// Error control code
    #[arg(long, value_name = "CODE")]
    error_control: Option<u32>,
}

impl EditArgs {
    fn overlay(&self, form: &mut ServiceKeyEdit) {
        if let Some(ref file) = self.image_file {
            form.image_path = image_path_from_file(file, &self.windows_dir);
        }
        if let Some(ref path) = self.image_path {
            form.image_path = path.clone();
        }
        if let Some(ref name) = self.display_name {
            form.display_name = name.clone();
        }
        if let Some(ref text) = self.description {
            form.description = text.clone();
        }
        if let Some(ref group) = self.group {
            form.group = group.clone();
        }
        if let Some(code) = self.service_type {
            form.service_type = code;
        }
        if let Some(code) = self.start {
            form.start = code;
        }
        if let Some(code) = self.error_control {
            form.error_control = code;
        }
    }
}

// ============================================================================
// key create
// ============================================================================

pub(crate) fn cmd_key_create(ctx: &Context, snapshot: &Path, name: &str, edit: &EditArgs) -> Result<(), CliError> {
    let (store, inventory) = ctx.open(snapshot)?;

    let mut key = inventory.create_key(name).map_err(CliError::inventory)?;
    let changes = apply_edit(key.as_mut(), edit)?;
    let created = key.name().to_string();
    drop(key);

    store.save().map_err(|e| CliError::snapshot(snapshot, e))?;
    println!("created key '{}'", created);
    print_changes(&changes);
    Ok(())
}

// ============================================================================
// key delete
// ============================================================================

pub(crate) fn cmd_key_delete(ctx: &Context, snapshot: &Path, identifier: &str) -> Result<(), CliError> {
    let (store, mut inventory) = ctx.open(snapshot)?;
    refresh_for_lookup(&mut inventory);

    inventory.delete_key(identifier).map_err(CliError::inventory)?;
    store.save().map_err(|e| CliError::snapshot(snapshot, e))?;
    println!("deleted key '{}'", identifier);
    Ok(())
}

// ============================================================================
// key edit
// ============================================================================

pub(crate) fn cmd_key_edit(ctx: &Context, snapshot: &Path, identifier: &str, edit: &EditArgs) -> Result<(), CliError> {
    let (store, mut inventory) = ctx.open(snapshot)?;
    refresh_for_lookup(&mut inventory);

    let mut key = inventory.open_key_for_edit(identifier).map_err(CliError::inventory)?;
    let changes = apply_edit(key.as_mut(), edit)?;
    let edited = key.name().to_string();
    drop(key);

    if changes.is_empty() {
        println!("key '{}' unchanged", edited);
        return Ok(());
    }
    store.save().map_err(|e| CliError::snapshot(snapshot, e))?;
    println!("updated key '{}'", edited);
    print_changes(&changes);
    Ok(())
}

/// Identifier-to-key resolution needs a populated inventory. A failed
/// refresh (e.g. a collision) falls back to treating the identifier as the
/// key name, so a broken snapshot can still be repaired.
fn refresh_for_lookup(inventory: &mut Inventory) {
    if let Err(e) = inventory.refresh() {
        log::warn!("inventory refresh failed, resolving key by name: {}", e);
    }
}

fn apply_edit(key: &mut dyn ConfigKey, edit: &EditArgs) -> Result<Vec<KeyChange>, CliError> {
    let current = ServiceKeyValues::read(&*key);
    let mut form = ServiceKeyEdit::from_values(&current);
    edit.overlay(&mut form);
    form.apply(&current, key).map_err(CliError::inventory)
}

fn print_changes(changes: &[KeyChange]) {
    for change in changes {
        println!("  {}", change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> ServiceKeyEdit {
        ServiceKeyEdit::from_values(&ServiceKeyValues::default())
    }

    #[test]
    fn overlay_keeps_unset_fields() {
        let mut edit = form();
        edit.description = "kept".to_string();
        let args = EditArgs {
            start: Some(2),
            windows_dir: "C:\\Windows".to_string(),
            ..EditArgs::default()
        };
        args.overlay(&mut edit);
        assert_eq!(edit.start, 2);
        assert_eq!(edit.service_type, 1);
        assert_eq!(edit.description, "kept");
    }

    #[test]
    fn image_file_is_shortened() {
        let mut edit = form();
        let args = EditArgs {
            image_file: Some("C:\\Windows\\System32\\drivers\\beep.sys".to_string()),
            windows_dir: "C:\\Windows".to_string(),
            ..EditArgs::default()
        };
        args.overlay(&mut edit);
        assert_eq!(edit.image_path, "\\SystemRoot\\System32\\drivers\\beep.sys");
    }

    #[test]
    fn empty_string_clears() {
        let mut edit = form();
        edit.group = "Boot Bus Extender".to_string();
        let args = EditArgs {
            group: Some(String::new()),
            ..EditArgs::default()
        };
        args.overlay(&mut edit);
        assert!(edit.group.is_empty());
    }
}
