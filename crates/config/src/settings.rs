// Application settings
// Loaded from ~/.config/drvscope/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default log verbosity when neither RUST_LOG nor -v is given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// How `list` renders the inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Path synthesis
    #[serde(rename = "inventory.systemRoot")]
    pub system_root: String,

    #[serde(rename = "inventory.driversDirectory")]
    pub drivers_directory: String,

    // Logging
    #[serde(rename = "log.level")]
    pub log_level: LogLevel,

    // Output
    #[serde(rename = "output.format")]
    pub output_format: OutputFormat,

    #[serde(rename = "output.columns")]
    pub output_columns: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            system_root: "\\SystemRoot".to_string(),
            drivers_directory: "\\SystemRoot\\System32\\Drivers".to_string(),
            log_level: LogLevel::Warn,
            output_format: OutputFormat::Table,
            output_columns: vec!["Name".to_string(), "Status".to_string(), "ImagePath".to_string()],
        }
    }
}

const DEFAULT_CONFIG: &str = r#"{
    // Roots used when a driver's image path has to be synthesized
    "inventory.systemRoot": "\\SystemRoot",
    "inventory.driversDirectory": "\\SystemRoot\\System32\\Drivers",

    // Log level when RUST_LOG and -v are absent
    // Options: "off", "error", "warn", "info", "debug", "trace"
    "log.level": "warn",

    // Default output of `drvscope list`
    // Format options: "table", "json", "csv"
    "output.format": "table",
    "output.columns": ["Name", "Status", "ImagePath"]
}
"#;

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("drvscope");
        config_dir.join("settings.json")
    }

    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load settings from `path`. A missing file is created with commented
    /// defaults; unreadable or invalid files yield defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            Self::create_default_file(path);
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("Error parsing {}: {}", path.display(), e);
                    log::warn!("Using default settings");
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Error reading {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse settings JSON, ignoring lines starting with //
    pub fn parse(contents: &str) -> Result<Self, serde_json::Error> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");
        serde_json::from_str(&cleaned)
    }

    /// Create default settings file with comments
    fn create_default_file(path: &Path) {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("Error creating config directory: {}", e);
                return;
            }
        }

        if let Err(e) = fs::write(path, DEFAULT_CONFIG) {
            log::warn!("Error writing default settings.json: {}", e);
        }
    }
}
