//! On-disk image path resolution.

use serde::{Deserialize, Serialize};

use crate::model::eq_fold;

/// Platform pseudo-drivers that have no service key of their own but are
/// implemented inside a core image.
pub const FALLBACK_IMAGE_PATHS: &[(&str, &str)] = &[
    ("\\Driver\\ACPI_HAL", "\\SystemRoot\\system32\\ntoskrnl.exe"),
    ("\\Driver\\RegistryHiveCacheDriver", "\\SystemRoot\\system32\\ntoskrnl.exe"),
    ("\\Driver\\VERIFIER_DDI", "\\SystemRoot\\system32\\ntoskrnl.exe"),
    ("\\Driver\\VERIFIER_FILTER", "\\SystemRoot\\system32\\ntoskrnl.exe"),
    ("\\Driver\\PnpManager", "\\SystemRoot\\system32\\ntoskrnl.exe"),
    ("\\Driver\\DeviceApi", "\\SystemRoot\\system32\\ntoskrnl.exe"),
    ("\\Driver\\SoftwareDevice", "\\SystemRoot\\system32\\ntoskrnl.exe"),
    ("\\Driver\\WMIxWDM", "\\SystemRoot\\system32\\ntoskrnl.exe"),
    ("\\Driver\\WscVReg", "\\SystemRoot\\system32\\ntoskrnl.exe"),
    ("\\FileSystem\\RAW", "\\SystemRoot\\system32\\ntoskrnl.exe"),
    ("\\Driver\\Win32k", "\\SystemRoot\\system32\\win32k.sys"),
];

pub fn fallback_image_path(object_name: &str) -> Option<&'static str> {
    FALLBACK_IMAGE_PATHS
        .iter()
        .find(|(name, _)| eq_fold(name, object_name))
        .map(|(_, path)| *path)
}

/// Roots used when a driver's image path has to be synthesized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSettings {
    pub system_root: String,
    pub drivers_directory: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            system_root: "\\SystemRoot".into(),
            drivers_directory: "\\SystemRoot\\System32\\Drivers".into(),
        }
    }
}

impl PathSettings {
    /// Full path for a configured `ImagePath`, or the default driver location
    /// when the key carries none. Relative paths hang off the system root.
    pub fn build_full_driver_path(&self, image_path: Option<&str>, identifier: &str) -> String {
        match image_path {
            Some(path) if path.starts_with('\\') => path.to_string(),
            Some(path) => join(&self.system_root, path),
            None => join(&self.drivers_directory, &format!("{identifier}.SYS")),
        }
    }

    /// Expected image path: configured `ImagePath`, then the pseudo-driver
    /// table, then the drivers directory.
    pub fn resolve_image_path(
        &self,
        configured: Option<&str>,
        expected_object_name: Option<&str>,
        identifier: &str,
    ) -> String {
        let image_path = configured.or_else(|| expected_object_name.and_then(fallback_image_path));
        self.build_full_driver_path(image_path, identifier)
    }
}

fn join(dir: &str, rest: &str) -> String {
    format!("{}\\{}", dir.trim_end_matches('\\'), rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_image_path_gets_system_root() {
        let paths = PathSettings::default();
        assert_eq!(
            paths.build_full_driver_path(Some("System32\\drivers\\foo.sys"), "Foo"),
            "\\SystemRoot\\System32\\drivers\\foo.sys"
        );
    }

    #[test]
    fn absolute_image_path_is_verbatim() {
        let paths = PathSettings::default();
        assert_eq!(
            paths.build_full_driver_path(Some("\\??\\C:\\tools\\x.sys"), "X"),
            "\\??\\C:\\tools\\x.sys"
        );
    }

    #[test]
    fn missing_image_path_defaults_to_drivers_directory() {
        let paths = PathSettings::default();
        assert_eq!(
            paths.build_full_driver_path(None, "beep"),
            "\\SystemRoot\\System32\\Drivers\\beep.SYS"
        );
    }

    #[test]
    fn pseudo_drivers_resolve_through_table() {
        let paths = PathSettings::default();
        assert_eq!(
            paths.resolve_image_path(None, Some("\\driver\\acpi_hal"), "ACPI_HAL"),
            "\\SystemRoot\\system32\\ntoskrnl.exe"
        );
        assert_eq!(
            paths.resolve_image_path(None, Some("\\Driver\\Win32k"), "Win32k"),
            "\\SystemRoot\\system32\\win32k.sys"
        );
    }

    #[test]
    fn configured_path_beats_table() {
        let paths = PathSettings::default();
        assert_eq!(
            paths.resolve_image_path(Some("\\custom\\hal.sys"), Some("\\Driver\\ACPI_HAL"), "ACPI_HAL"),
            "\\custom\\hal.sys"
        );
    }

    #[test]
    fn custom_roots_are_joined_without_doubled_separators() {
        let paths = PathSettings {
            system_root: "\\Windows\\".into(),
            drivers_directory: "\\Windows\\System32\\Drivers".into(),
        };
        assert_eq!(paths.build_full_driver_path(Some("a.sys"), "A"), "\\Windows\\a.sys");
        assert_eq!(paths.build_full_driver_path(None, "A"), "\\Windows\\System32\\Drivers\\A.SYS");
    }
}
