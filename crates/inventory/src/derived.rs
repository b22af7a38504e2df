//! Attributes computed from a merged record on demand.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{DriverRecord, ServiceStatus};
use crate::paths::PathSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    /// Reported by the service manager.
    Service(ServiceStatus),
    /// Loaded, but the service manager does not know it.
    RunningServiceUnknown,
    /// Only the configuration key exists.
    StoppedUnregistered,
    Unknown,
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service(status) => write!(f, "{status}"),
            Self::RunningServiceUnknown => write!(f, "Running (service unknown)"),
            Self::StoppedUnregistered => write!(f, "Stopped (not registered with service manager)"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Actions a front end may offer for one driver. The inventory only reports
/// them; executing them is up to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub service_control: bool,
    pub start_service: bool,
    pub stop_service: bool,
    pub load_driver: bool,
    pub unload_driver: bool,
    pub force_unload: bool,
    pub create_key: bool,
    pub delete_key: bool,
    pub edit_key: bool,
}

impl Capabilities {
    /// Enabled action names, in menu order.
    pub fn enabled(&self) -> Vec<&'static str> {
        [
            ("start_service", self.start_service),
            ("stop_service", self.stop_service),
            ("load_driver", self.load_driver),
            ("unload_driver", self.unload_driver),
            ("force_unload", self.force_unload),
            ("create_key", self.create_key),
            ("delete_key", self.delete_key),
            ("edit_key", self.edit_key),
        ]
        .into_iter()
        .filter_map(|(name, on)| on.then_some(name))
        .collect()
    }
}

impl DriverRecord {
    fn reg_string(&self, name: &str) -> Option<String> {
        self.config_key
            .as_ref()?
            .query_value(name)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    fn reg_dword(&self, name: &str) -> Option<u32> {
        self.config_key.as_ref()?.query_value(name)?.as_dword()
    }

    /// `ImagePath` as stored in the key. Empty reads as absent.
    pub fn configured_image_path(&self) -> Option<String> {
        self.reg_string("ImagePath").filter(|s| !s.is_empty())
    }

    /// Where the driver image should be on disk, ignoring any loaded module.
    pub fn expected_image_path(&self, paths: &PathSettings) -> String {
        paths.resolve_image_path(
            self.configured_image_path().as_deref(),
            self.expected_object_name.as_deref(),
            &self.identifier,
        )
    }

    pub fn status(&self) -> DriverStatus {
        if let Some(ref service) = self.service {
            DriverStatus::Service(service.status)
        } else if self.is_live() {
            DriverStatus::RunningServiceUnknown
        } else if self.config_key.is_some() {
            DriverStatus::StoppedUnregistered
        } else {
            DriverStatus::Unknown
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        let has_key = self.config_key.is_some();
        let live = self.is_live();
        let status = self.service.as_ref().map(|s| s.status);
        Capabilities {
            service_control: status.is_some(),
            start_service: status == Some(ServiceStatus::Stopped),
            stop_service: status == Some(ServiceStatus::Running),
            load_driver: has_key && !live,
            unload_driver: has_key && live,
            force_unload: !has_key,
            create_key: !has_key,
            delete_key: has_key,
            edit_key: has_key,
        }
    }

    /// Loaded module path when one is mapped, else the expected path.
    pub fn image_path(&self, paths: &PathSettings) -> String {
        match self.module {
            Some(ref module) => module.full_path.clone(),
            None => self.expected_image_path(paths),
        }
    }

    /// Object path, only once the object has actually been seen.
    pub fn object_name(&self) -> &str {
        match self.expected_object_name {
            Some(ref name) if self.has_namespace_object => name,
            _ => "",
        }
    }

    pub fn last_write_time(&self) -> Option<DateTime<Utc>> {
        self.config_key.as_ref()?.last_write_time()
    }

    pub fn row(&self, paths: &PathSettings) -> DriverRow {
        let module = self.module.as_ref();
        let service = self.service.as_ref();
        let opt = |v: Option<String>| v.unwrap_or_default();
        let dword = |name: &str| opt(self.reg_dword(name).map(|v| v.to_string()));

        DriverRow {
            name: self.identifier.clone(),
            status: self.status().to_string(),
            image_path: self.image_path(paths),
            object_name: self.object_name().to_string(),
            has_module: yes_no(module.is_some()),
            has_driver_object: yes_no(self.has_namespace_object),
            has_service: yes_no(service.is_some()),
            has_registry: yes_no(self.config_key.is_some()),
            module_section: opt(module.map(|m| format!("{:X}", m.section))),
            module_mapped_base: opt(module.map(|m| format!("{:X}", m.mapped_base))),
            module_image_base: opt(module.map(|m| format!("{:X}", m.image_base))),
            module_image_size: opt(module.map(|m| m.image_size.to_string())),
            module_flags: opt(module.map(|m| format!("{:X}", m.flags))),
            module_load_order_index: opt(module.map(|m| m.load_order_index.to_string())),
            module_init_order_index: opt(module.map(|m| m.init_order_index.to_string())),
            module_load_count: opt(module.map(|m| m.load_count.to_string())),
            module_full_path_name: opt(module.map(|m| m.full_path.clone())),
            module_name: opt(module.map(|m| m.name.clone())),
            scm_service_name: opt(service.map(|s| s.name.clone())),
            scm_display_name: opt(service.map(|s| s.display_name.clone())),
            scm_service_type: opt(service.map(|s| s.kind.to_string())),
            scm_start_type: opt(service.and_then(|s| s.start_type).map(|t| t.to_string())),
            scm_status: opt(service.map(|s| s.status.to_string())),
            reg_image_path: opt(self.reg_string("ImagePath")),
            reg_object_name: opt(self.reg_string("ObjectName")),
            reg_type: dword("Type"),
            reg_start: dword("Start"),
            reg_error_control: dword("ErrorControl"),
            reg_group: opt(self.reg_string("Group")),
            reg_display_name: opt(self.reg_string("DisplayName")),
            reg_description: opt(self.reg_string("Description")),
            reg_last_write_time: self.last_write_time(),
        }
    }
}

fn yes_no(flag: bool) -> String {
    let text = if flag { "Yes" } else { "No" };
    text.to_string()
}

/// Flat, display-ready view of one record. Field names serialize as the
/// column names listed in [`DriverRow::COLUMNS`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DriverRow {
    pub name: String,
    pub status: String,
    pub image_path: String,
    pub object_name: String,
    pub has_module: String,
    pub has_driver_object: String,
    pub has_service: String,
    pub has_registry: String,
    pub module_section: String,
    pub module_mapped_base: String,
    pub module_image_base: String,
    pub module_image_size: String,
    pub module_flags: String,
    pub module_load_order_index: String,
    pub module_init_order_index: String,
    pub module_load_count: String,
    pub module_full_path_name: String,
    pub module_name: String,
    pub scm_service_name: String,
    pub scm_display_name: String,
    pub scm_service_type: String,
    pub scm_start_type: String,
    pub scm_status: String,
    pub reg_image_path: String,
    pub reg_object_name: String,
    pub reg_type: String,
    pub reg_start: String,
    pub reg_error_control: String,
    pub reg_group: String,
    pub reg_display_name: String,
    pub reg_description: String,
    pub reg_last_write_time: Option<DateTime<Utc>>,
}

impl DriverRow {
    pub const COLUMNS: &'static [&'static str] = &[
        "Name",
        "Status",
        "ImagePath",
        "ObjectName",
        "HasModule",
        "HasDriverObject",
        "HasService",
        "HasRegistry",
        "ModuleSection",
        "ModuleMappedBase",
        "ModuleImageBase",
        "ModuleImageSize",
        "ModuleFlags",
        "ModuleLoadOrderIndex",
        "ModuleInitOrderIndex",
        "ModuleLoadCount",
        "ModuleFullPathName",
        "ModuleName",
        "ScmServiceName",
        "ScmDisplayName",
        "ScmServiceType",
        "ScmStartType",
        "ScmStatus",
        "RegImagePath",
        "RegObjectName",
        "RegType",
        "RegStart",
        "RegErrorControl",
        "RegGroup",
        "RegDisplayName",
        "RegDescription",
        "RegLastWriteTime",
    ];

    /// Canonical spelling of a column name, matched case-insensitively.
    pub fn column_name(column: &str) -> Option<&'static str> {
        Self::COLUMNS
            .iter()
            .copied()
            .find(|c| c.eq_ignore_ascii_case(column))
    }

    /// Text of one column, or `None` for an unknown column name.
    pub fn get(&self, column: &str) -> Option<String> {
        let value = match Self::column_name(column)? {
            "Name" => &self.name,
            "Status" => &self.status,
            "ImagePath" => &self.image_path,
            "ObjectName" => &self.object_name,
            "HasModule" => &self.has_module,
            "HasDriverObject" => &self.has_driver_object,
            "HasService" => &self.has_service,
            "HasRegistry" => &self.has_registry,
            "ModuleSection" => &self.module_section,
            "ModuleMappedBase" => &self.module_mapped_base,
            "ModuleImageBase" => &self.module_image_base,
            "ModuleImageSize" => &self.module_image_size,
            "ModuleFlags" => &self.module_flags,
            "ModuleLoadOrderIndex" => &self.module_load_order_index,
            "ModuleInitOrderIndex" => &self.module_init_order_index,
            "ModuleLoadCount" => &self.module_load_count,
            "ModuleFullPathName" => &self.module_full_path_name,
            "ModuleName" => &self.module_name,
            "ScmServiceName" => &self.scm_service_name,
            "ScmDisplayName" => &self.scm_display_name,
            "ScmServiceType" => &self.scm_service_type,
            "ScmStartType" => &self.scm_start_type,
            "ScmStatus" => &self.scm_status,
            "RegImagePath" => &self.reg_image_path,
            "RegObjectName" => &self.reg_object_name,
            "RegType" => &self.reg_type,
            "RegStart" => &self.reg_start,
            "RegErrorControl" => &self.reg_error_control,
            "RegGroup" => &self.reg_group,
            "RegDisplayName" => &self.reg_display_name,
            "RegDescription" => &self.reg_description,
            "RegLastWriteTime" => {
                return Some(
                    self.reg_last_write_time
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_default(),
                )
            }
            _ => return None,
        };
        Some(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RawModuleRecord, RawServiceRecord, RegValue, ServiceKind};
    use crate::snapshot::{KeyData, Snapshot, SnapshotSources};
    use crate::source::ConfigStore;

    fn service(status: ServiceStatus) -> RawServiceRecord {
        RawServiceRecord {
            name: "Bar".into(),
            display_name: "Bar Driver".into(),
            kind: ServiceKind::KernelDriver,
            status,
            start_type: None,
        }
    }

    fn module() -> RawModuleRecord {
        RawModuleRecord {
            name: "bar.sys".into(),
            full_path: "\\SystemRoot\\System32\\drivers\\bar.sys".into(),
            image_base: 0xFFFF_F800_1234_0000,
            mapped_base: 0,
            section: 0,
            image_size: 4096,
            flags: 0x4900_0000,
            load_order_index: 12,
            init_order_index: 0,
            load_count: 1,
        }
    }

    fn store_with(key: KeyData) -> SnapshotSources {
        SnapshotSources::new(Snapshot::default().with_key(key))
    }

    #[test]
    fn status_precedence() {
        let mut record = DriverRecord::new("Bar");
        assert_eq!(record.status(), DriverStatus::Unknown);

        let store = store_with(KeyData::new("Bar"));
        record.config_key = Some(store.open_key("Bar").unwrap());
        assert_eq!(record.status().to_string(), "Stopped (not registered with service manager)");

        record.has_namespace_object = true;
        assert_eq!(record.status().to_string(), "Running (service unknown)");

        record.service = Some(service(ServiceStatus::StopPending));
        assert_eq!(record.status().to_string(), "StopPending");
    }

    #[test]
    fn capabilities_without_key() {
        let mut record = DriverRecord::new("Bar");
        record.module = Some(module());
        let caps = record.capabilities();
        assert!(caps.force_unload && caps.create_key);
        assert!(!caps.load_driver && !caps.unload_driver);
        assert!(!caps.delete_key && !caps.edit_key);
        assert!(!caps.service_control);
    }

    #[test]
    fn capabilities_with_key_and_service() {
        let store = store_with(KeyData::new("Bar"));
        let mut record = DriverRecord::new("Bar");
        record.config_key = Some(store.open_key("Bar").unwrap());
        record.service = Some(service(ServiceStatus::Stopped));

        let caps = record.capabilities();
        assert!(caps.service_control && caps.start_service && !caps.stop_service);
        assert!(caps.load_driver && !caps.unload_driver);
        assert!(!caps.force_unload && !caps.create_key);
        assert!(caps.delete_key && caps.edit_key);

        record.has_namespace_object = true;
        record.service = Some(service(ServiceStatus::Running));
        let caps = record.capabilities();
        assert!(caps.stop_service && !caps.start_service);
        assert!(caps.unload_driver && !caps.load_driver);
        assert_eq!(caps.enabled(), vec!["stop_service", "unload_driver", "delete_key", "edit_key"]);
    }

    #[test]
    fn pending_service_offers_neither_start_nor_stop() {
        let mut record = DriverRecord::new("Bar");
        record.service = Some(service(ServiceStatus::StartPending));
        let caps = record.capabilities();
        assert!(caps.service_control);
        assert!(!caps.start_service && !caps.stop_service);
    }

    #[test]
    fn image_path_prefers_module() {
        let store = store_with(
            KeyData::new("Bar").value("ImagePath", RegValue::ExpandString("System32\\drivers\\other.sys".into())),
        );
        let mut record = DriverRecord::new("Bar");
        record.config_key = Some(store.open_key("Bar").unwrap());
        let paths = PathSettings::default();
        assert_eq!(record.image_path(&paths), "\\SystemRoot\\System32\\drivers\\other.sys");
        record.module = Some(module());
        assert_eq!(record.image_path(&paths), "\\SystemRoot\\System32\\drivers\\bar.sys");
    }

    #[test]
    fn empty_image_path_value_reads_as_absent() {
        let store = store_with(KeyData::new("Bar").value("ImagePath", RegValue::String(String::new())));
        let mut record = DriverRecord::new("Bar");
        record.config_key = Some(store.open_key("Bar").unwrap());
        assert_eq!(
            record.image_path(&PathSettings::default()),
            "\\SystemRoot\\System32\\Drivers\\Bar.SYS"
        );
    }

    #[test]
    fn object_name_hidden_until_seen() {
        let mut record = DriverRecord::new("Bar");
        record.expected_object_name = Some("\\Driver\\Bar".into());
        assert_eq!(record.object_name(), "");
        record.has_namespace_object = true;
        assert_eq!(record.object_name(), "\\Driver\\Bar");
    }

    #[test]
    fn row_formats_module_fields_as_hex() {
        let mut record = DriverRecord::new("bar.sys");
        record.module = Some(module());
        let row = record.row(&PathSettings::default());
        assert_eq!(row.module_image_base, "FFFFF80012340000");
        assert_eq!(row.module_flags, "49000000");
        assert_eq!(row.module_image_size, "4096");
        assert_eq!(row.has_module, "Yes");
        assert_eq!(row.has_service, "No");
        assert_eq!(row.reg_type, "");
        assert_eq!(row.get("hasregistry").as_deref(), Some("No"));
        assert_eq!(row.get("NoSuchColumn"), None);
    }

    #[test]
    fn row_reads_key_values() {
        let store = store_with(
            KeyData::new("Bar")
                .value("Type", RegValue::Dword(1))
                .value("ErrorControl", RegValue::Dword(1))
                .value("Group", RegValue::String("Boot Bus Extender".into())),
        );
        let mut record = DriverRecord::new("Bar");
        record.config_key = Some(store.open_key("Bar").unwrap());
        let row = record.row(&PathSettings::default());
        assert_eq!(row.reg_type, "1");
        assert_eq!(row.reg_error_control, "1");
        assert_eq!(row.reg_group, "Boot Bus Extender");
        assert_eq!(row.reg_start, "");
    }

    #[test]
    fn every_column_resolves() {
        let row = DriverRecord::new("x").row(&PathSettings::default());
        for column in DriverRow::COLUMNS {
            assert!(row.get(column).is_some(), "{column}");
        }
        let json = serde_json::to_value(&row).unwrap();
        for column in DriverRow::COLUMNS {
            assert!(json.get(*column).is_some(), "{column}");
        }
    }
}
