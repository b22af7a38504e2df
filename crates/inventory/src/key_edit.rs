//! Editing the well-known values of a service configuration key.
//!
//! [`ServiceKeyValues`] is what the key holds now, [`ServiceKeyEdit`] is the
//! desired state. Applying an edit writes only the values that differ.

use std::fmt;

use crate::error::InventoryError;
use crate::model::RegValue;
use crate::source::ConfigKey;

pub const SERVICE_TYPES: &[(u32, &str)] = &[
    (1, "Kernel Driver"),
    (2, "File System Driver"),
    (4, "Adapter"),
    (8, "Recognizer Driver"),
    (16, "Win32 Own Process"),
    (32, "Win32 Share Process"),
    (272, "Win32 Interactive Own Process"),
    (288, "Win32 Interactive Share Process"),
];

pub const START_TYPES: &[(u32, &str)] = &[
    (0, "Boot"),
    (1, "System"),
    (2, "Auto"),
    (3, "Demand"),
    (4, "Disabled"),
];

pub const ERROR_CONTROL_TYPES: &[(u32, &str)] = &[
    (0, "Ignore"),
    (1, "Normal"),
    (2, "Severe"),
    (3, "Critical"),
];

fn lookup(table: &[(u32, &'static str)], code: u32) -> Option<&'static str> {
    table.iter().find(|(c, _)| *c == code).map(|(_, name)| *name)
}

pub fn service_type_name(code: u32) -> Option<&'static str> {
    lookup(SERVICE_TYPES, code)
}

pub fn start_type_name(code: u32) -> Option<&'static str> {
    lookup(START_TYPES, code)
}

pub fn error_control_name(code: u32) -> Option<&'static str> {
    lookup(ERROR_CONTROL_TYPES, code)
}

/// Trimmed key name, or an error when it cannot name a service key.
pub fn validate_key_name(name: &str) -> Result<String, InventoryError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(InventoryError::InvalidKeyName("key name cannot be empty".into()));
    }
    if trimmed.contains('\\') {
        return Err(InventoryError::InvalidKeyName(format!(
            "'{trimmed}' must not contain a path separator"
        )));
    }
    Ok(trimmed.to_string())
}

/// Convert a picked file path into an `ImagePath` value: paths under the
/// Windows directory become `\SystemRoot\...`, other DOS paths get the
/// `\??\` prefix, native paths are kept.
pub fn image_path_from_file(file_path: &str, windows_dir: &str) -> String {
    let windows_dir = windows_dir.trim_end_matches('\\');
    let under_windows = !windows_dir.is_empty()
        && file_path
            .get(..windows_dir.len())
            .is_some_and(|p| p.eq_ignore_ascii_case(windows_dir))
        && file_path[windows_dir.len()..].starts_with('\\');

    if under_windows {
        format!("\\SystemRoot\\{}", file_path[windows_dir.len()..].trim_start_matches('\\'))
    } else if file_path.starts_with('\\') {
        file_path.to_string()
    } else {
        format!("\\??\\{file_path}")
    }
}

/// Current values of the editable entries; `None` when absent or of the
/// wrong type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceKeyValues {
    pub image_path: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub group: Option<String>,
    pub service_type: Option<u32>,
    pub start: Option<u32>,
    pub error_control: Option<u32>,
}

impl ServiceKeyValues {
    pub fn read(key: &dyn ConfigKey) -> Self {
        let string = |name: &str| key.query_value(name).and_then(|v| v.as_str().map(str::to_string));
        let dword = |name: &str| key.query_value(name).and_then(|v| v.as_dword());
        Self {
            image_path: string("ImagePath"),
            display_name: string("DisplayName"),
            description: string("Description"),
            group: string("Group"),
            service_type: dword("Type"),
            start: dword("Start"),
            error_control: dword("ErrorControl"),
        }
    }
}

/// One value written or removed by [`ServiceKeyEdit::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum KeyChange {
    Set { name: &'static str, value: RegValue },
    Deleted { name: &'static str },
}

impl fmt::Display for KeyChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set { name, value } => write!(f, "set {name} = {value}"),
            Self::Deleted { name } => write!(f, "deleted {name}"),
        }
    }
}

/// Desired state of a service key. Empty strings mean "remove the value".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceKeyEdit {
    pub image_path: String,
    pub display_name: String,
    pub description: String,
    pub group: String,
    pub service_type: u32,
    pub start: u32,
    pub error_control: u32,
}

impl Default for ServiceKeyEdit {
    fn default() -> Self {
        Self::from_values(&ServiceKeyValues::default())
    }
}

impl ServiceKeyEdit {
    /// Start from the key's current values. Missing codes default to a
    /// demand-start kernel driver with normal error control.
    pub fn from_values(values: &ServiceKeyValues) -> Self {
        Self {
            image_path: values.image_path.clone().unwrap_or_default(),
            display_name: values.display_name.clone().unwrap_or_default(),
            description: values.description.clone().unwrap_or_default(),
            group: values.group.clone().unwrap_or_default(),
            service_type: values.service_type.unwrap_or(1),
            start: values.start.unwrap_or(3),
            error_control: values.error_control.unwrap_or(1),
        }
    }

    pub fn validate(&self) -> Result<(), InventoryError> {
        let checks = [
            ("Type", self.service_type, service_type_name(self.service_type)),
            ("Start", self.start, start_type_name(self.start)),
            ("ErrorControl", self.error_control, error_control_name(self.error_control)),
        ];
        for (name, code, known) in checks {
            if known.is_none() {
                return Err(InventoryError::InvalidValue {
                    name: name.to_string(),
                    value: code.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Write the differences against `current` to `key`.
    pub fn apply(&self, current: &ServiceKeyValues, key: &mut dyn ConfigKey) -> Result<Vec<KeyChange>, InventoryError> {
        self.validate()?;

        let mut changes = Vec::new();
        let strings = [
            ("ImagePath", &self.image_path, &current.image_path, true),
            ("DisplayName", &self.display_name, &current.display_name, false),
            ("Description", &self.description, &current.description, false),
            ("Group", &self.group, &current.group, false),
        ];
        for (name, wanted, existing, expand) in strings {
            if wanted.is_empty() {
                if existing.is_some() {
                    key.delete_value(name)?;
                    changes.push(KeyChange::Deleted { name });
                }
            } else if existing.as_deref() != Some(wanted.as_str()) {
                let value = if expand {
                    RegValue::ExpandString(wanted.clone())
                } else {
                    RegValue::String(wanted.clone())
                };
                key.set_value(name, value.clone())?;
                changes.push(KeyChange::Set { name, value });
            }
        }

        let dwords = [
            ("Type", self.service_type, current.service_type),
            ("Start", self.start, current.start),
            ("ErrorControl", self.error_control, current.error_control),
        ];
        for (name, wanted, existing) in dwords {
            if existing != Some(wanted) {
                key.set_value(name, RegValue::Dword(wanted))?;
                changes.push(KeyChange::Set {
                    name,
                    value: RegValue::Dword(wanted),
                });
            }
        }

        log::debug!("key '{}': {} value(s) changed", key.name(), changes.len());
        Ok(changes)
    }
}
