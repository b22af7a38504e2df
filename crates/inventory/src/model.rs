use serde::{Deserialize, Serialize};

use crate::source::ConfigKey;

// ---------------------------------------------------------------------------
// Service manager
// ---------------------------------------------------------------------------

/// Declared service kind as reported by the service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    KernelDriver,
    FileSystemDriver,
    RecognizerDriver,
    Other,
}

impl ServiceKind {
    pub fn is_driver(&self) -> bool {
        !matches!(self, Self::Other)
    }

    /// Namespace a driver of this kind instantiates its object under.
    pub fn namespace(&self) -> ObjectNamespace {
        match self {
            Self::FileSystemDriver | Self::RecognizerDriver => ObjectNamespace::FileSystem,
            _ => ObjectNamespace::Driver,
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KernelDriver => write!(f, "KernelDriver"),
            Self::FileSystemDriver => write!(f, "FileSystemDriver"),
            Self::RecognizerDriver => write!(f, "RecognizerDriver"),
            Self::Other => write!(f, "Other"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Stopped,
    StartPending,
    StopPending,
    Running,
    ContinuePending,
    PausePending,
    Paused,
}

impl ServiceStatus {
    /// Running or on its way down: a module should still be mapped.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::StopPending)
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::StartPending => write!(f, "StartPending"),
            Self::StopPending => write!(f, "StopPending"),
            Self::Running => write!(f, "Running"),
            Self::ContinuePending => write!(f, "ContinuePending"),
            Self::PausePending => write!(f, "PausePending"),
            Self::Paused => write!(f, "Paused"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartType {
    Boot,
    System,
    Automatic,
    Manual,
    Disabled,
}

impl std::fmt::Display for StartType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boot => write!(f, "Boot"),
            Self::System => write!(f, "System"),
            Self::Automatic => write!(f, "Automatic"),
            Self::Manual => write!(f, "Manual"),
            Self::Disabled => write!(f, "Disabled"),
        }
    }
}

/// One service-manager entry. Re-fetched every refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawServiceRecord {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    pub kind: ServiceKind,
    pub status: ServiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_type: Option<StartType>,
}

// ---------------------------------------------------------------------------
// Configuration store values
// ---------------------------------------------------------------------------

/// Typed value stored under a configuration key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RegValue {
    Dword(u32),
    Qword(u64),
    String(String),
    ExpandString(String),
    MultiString(Vec<String>),
    Binary(Vec<u8>),
}

impl RegValue {
    /// String content for string-typed values; anything else reads as absent.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::ExpandString(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_dword(&self) -> Option<u32> {
        match self {
            Self::Dword(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for RegValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dword(v) => write!(f, "{v}"),
            Self::Qword(v) => write!(f, "{v}"),
            Self::String(s) | Self::ExpandString(s) => write!(f, "{s}"),
            Self::MultiString(items) => write!(f, "{}", items.join(", ")),
            Self::Binary(bytes) => {
                for b in bytes {
                    write!(f, "{b:02X}")?;
                }
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Kernel object namespace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectNamespace {
    Driver,
    FileSystem,
}

impl ObjectNamespace {
    pub const ALL: [ObjectNamespace; 2] = [Self::Driver, Self::FileSystem];

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Driver => "\\Driver",
            Self::FileSystem => "\\FileSystem",
        }
    }

    /// Namespace for a configuration `Type` code, or `None` when the code
    /// does not describe a driver (1 = kernel, 2 = file system, 8 = recognizer).
    pub fn for_type_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Driver),
            2 | 8 => Some(Self::FileSystem),
            _ => None,
        }
    }

    /// Fully qualified object path for `name` inside this namespace.
    pub fn object_path(&self, name: &str) -> String {
        format!("{}\\{name}", self.prefix())
    }
}

impl std::fmt::Display for ObjectNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A live object seen under one of the driver namespaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNamespaceEntry {
    pub path: String,
    #[serde(default = "default_object_type")]
    pub type_name: String,
}

fn default_object_type() -> String {
    "Driver".into()
}

impl RawNamespaceEntry {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), type_name: default_object_type() }
    }

    pub fn is_driver_object(&self) -> bool {
        self.type_name == "Driver"
    }

    /// Last `\`-separated component, used as a fallback identifier.
    pub fn leaf_name(&self) -> &str {
        self.path.rsplit('\\').next().unwrap_or(&self.path)
    }
}

// ---------------------------------------------------------------------------
// Loaded modules
// ---------------------------------------------------------------------------

/// One entry of the kernel's loaded-module list. Carries no identity beyond
/// its full path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawModuleRecord {
    pub name: String,
    pub full_path: String,
    #[serde(default)]
    pub image_base: u64,
    #[serde(default)]
    pub mapped_base: u64,
    #[serde(default)]
    pub section: u64,
    #[serde(default)]
    pub image_size: u32,
    #[serde(default)]
    pub flags: u32,
    #[serde(default)]
    pub load_order_index: u16,
    #[serde(default)]
    pub init_order_index: u16,
    #[serde(default)]
    pub load_count: u16,
}

// ---------------------------------------------------------------------------
// Merged record
// ---------------------------------------------------------------------------

/// One physical driver after reconciliation.
#[derive(Debug)]
pub struct DriverRecord {
    pub identifier: String,
    pub config_key: Option<Box<dyn ConfigKey>>,
    pub service: Option<RawServiceRecord>,
    pub expected_object_name: Option<String>,
    pub has_namespace_object: bool,
    pub module: Option<RawModuleRecord>,
}

impl DriverRecord {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            config_key: None,
            service: None,
            expected_object_name: None,
            has_namespace_object: false,
            module: None,
        }
    }

    /// Observed by at least one source.
    pub fn is_observed(&self) -> bool {
        self.config_key.is_some()
            || self.service.is_some()
            || self.has_namespace_object
            || self.module.is_some()
    }

    /// Instantiated in the kernel right now: a module is mapped or an object exists.
    pub fn is_live(&self) -> bool {
        self.module.is_some() || self.has_namespace_object
    }
}

/// Case-folded form used for every identifier and path comparison.
pub fn fold(s: &str) -> String {
    s.to_lowercase()
}

pub fn eq_fold(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || fold(a) == fold(b)
}
