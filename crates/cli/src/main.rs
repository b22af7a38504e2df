// drvscope CLI - driver inventory from a machine snapshot

mod drivers;
mod exit_codes;
mod keys;
mod util;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Builder as LogBuilder;
use log::LevelFilter;

use drvscope_config::{OutputFormat, Settings};
use drvscope_inventory::{Inventory, InventoryError, PathSettings, RefreshReport, SnapshotSources};

use exit_codes::{
    inventory_exit_code, EXIT_DRIVER_NOT_FOUND, EXIT_ERROR, EXIT_SNAPSHOT, EXIT_SUCCESS, EXIT_USAGE,
};
use keys::EditArgs;

#[derive(Parser)]
#[command(name = "drvscope")]
#[command(about = "Reconciled kernel driver inventory (services, keys, objects, modules)")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Settings file (default: <config dir>/drvscope/settings.json)
    #[arg(long, global = true, value_name = "PATH", env = "DRVSCOPE_SETTINGS")]
    settings: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace). RUST_LOG wins.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every driver reconciled from a snapshot
    #[command(after_help = "\
Examples:
  drvscope list machine.json
  drvscope list machine.json --columns Name,Status,HasModule,ModuleImageBase
  drvscope list machine.json --format csv --all-columns > drivers.csv
  drvscope list machine.json -f json | jq '.[] | select(.HasService == \"No\")'")]
    List {
        /// Snapshot file (JSON)
        snapshot: PathBuf,

        /// Output format (default: output.format setting)
        #[arg(long, short = 'f')]
        format: Option<FormatArg>,

        /// Columns to show, comma-separated (default: output.columns setting)
        #[arg(long, value_delimiter = ',', value_name = "COLUMNS")]
        columns: Vec<String>,

        /// Show every column
        #[arg(long, conflicts_with = "columns")]
        all_columns: bool,
    },

    /// Show every attribute and the available actions of one driver
    #[command(after_help = "\
Examples:
  drvscope show machine.json Beep
  drvscope show machine.json rootkit.sys --json")]
    Show {
        /// Snapshot file (JSON)
        snapshot: PathBuf,

        /// Driver identifier (case-insensitive)
        identifier: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the column names accepted by --columns
    Columns,

    /// Re-read a snapshot periodically and report drivers appearing or vanishing
    #[command(after_help = "\
Examples:
  drvscope watch machine.json
  drvscope watch machine.json --interval 0.5 --count 20")]
    Watch {
        /// Snapshot file (JSON)
        snapshot: PathBuf,

        /// Seconds between refreshes
        #[arg(long, default_value_t = 2.0, value_name = "SECS")]
        interval: f64,

        /// Stop after this many refreshes (default: run until interrupted)
        #[arg(long, value_name = "N")]
        count: Option<u64>,
    },

    /// Create, edit or delete driver service keys in a snapshot
    #[command(subcommand)]
    Key(KeyCommands),
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Create a service key (opens it if it already exists)
    #[command(after_help = "\
Examples:
  drvscope key create machine.json MyDrv --image-file C:\\drivers\\mydrv.sys
  drvscope key create machine.json MyDrv --start 2 --display-name \"My driver\"")]
    Create {
        /// Snapshot file (JSON)
        snapshot: PathBuf,

        /// Key name
        name: String,

        #[command(flatten)]
        edit: EditArgs,
    },

    /// Delete the service key backing a driver
    Delete {
        /// Snapshot file (JSON)
        snapshot: PathBuf,

        /// Driver identifier or key name
        identifier: String,
    },

    /// Change values of the service key backing a driver
    #[command(after_help = "\
Empty strings remove a value:
  drvscope key edit machine.json Foo --description ''

Codes:
  --type           1 kernel, 2 file system, 8 recognizer, 16/32 own/share process
  --start          0 boot, 1 system, 2 auto, 3 demand, 4 disabled
  --error-control  0 ignore, 1 normal, 2 severe, 3 critical")]
    Edit {
        /// Snapshot file (JSON)
        snapshot: PathBuf,

        /// Driver identifier or key name
        identifier: String,

        #[command(flatten)]
        edit: EditArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Table,
    Json,
    Csv,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Table => OutputFormat::Table,
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Csv => OutputFormat::Csv,
        }
    }
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("DRVSCOPE_COMMIT"), ")",
        "\ninventory: drvscope-inventory ", env!("CARGO_PKG_VERSION"),
        "\ntarget:    ", env!("DRVSCOPE_TARGET"),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match cli.settings {
        Some(ref path) => Settings::load_from(path),
        None => Settings::load(),
    };
    init_logging(cli.verbose, &settings);
    let ctx = Context { settings };

    let result = match cli.command {
        Commands::List { snapshot, format, columns, all_columns } => {
            drivers::cmd_list(&ctx, &snapshot, format.map(Into::into), &columns, all_columns)
        }
        Commands::Show { snapshot, identifier, json } => drivers::cmd_show(&ctx, &snapshot, &identifier, json),
        Commands::Columns => drivers::cmd_columns(&ctx),
        Commands::Watch { snapshot, interval, count } => drivers::cmd_watch(&ctx, &snapshot, interval, count),
        Commands::Key(key_cmd) => match key_cmd {
            KeyCommands::Create { snapshot, name, edit } => keys::cmd_key_create(&ctx, &snapshot, &name, &edit),
            KeyCommands::Delete { snapshot, identifier } => keys::cmd_key_delete(&ctx, &snapshot, &identifier),
            KeyCommands::Edit { snapshot, identifier, edit } => {
                keys::cmd_key_edit(&ctx, &snapshot, &identifier, &edit)
            }
        },
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

/// RUST_LOG if set, else -v count, else the `log.level` setting.
fn init_logging(verbose: u8, settings: &Settings) {
    let mut builder = if std::env::var_os("RUST_LOG").is_some() {
        LogBuilder::from_default_env()
    } else {
        let level = match verbose {
            0 => settings.log_level.to_level_filter(),
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };
        let mut builder = LogBuilder::new();
        builder.filter_level(level);
        builder
    };
    builder.format_timestamp(None).init();
}

/// Per-invocation state shared by the commands.
pub(crate) struct Context {
    pub settings: Settings,
}

impl Context {
    pub fn paths(&self) -> PathSettings {
        PathSettings {
            system_root: self.settings.system_root.clone(),
            drivers_directory: self.settings.drivers_directory.clone(),
        }
    }

    /// Open the snapshot and bind an (empty) inventory to it.
    pub fn open(&self, snapshot: &Path) -> Result<(SnapshotSources, Inventory), CliError> {
        let store = SnapshotSources::open(snapshot).map_err(|e| CliError::snapshot(snapshot, e))?;
        let inventory = Inventory::new(store.sources(), self.paths());
        Ok((store, inventory))
    }

    /// Open the snapshot and run the first refresh.
    pub fn load(&self, snapshot: &Path) -> Result<(SnapshotSources, Inventory, RefreshReport), CliError> {
        let (store, mut inventory) = self.open(snapshot)?;
        let report = inventory.refresh().map_err(CliError::inventory)?;
        warn_degraded(&report);
        Ok((store, inventory, report))
    }
}

pub(crate) fn warn_degraded(report: &RefreshReport) {
    for source in &report.degraded_sources {
        eprintln!("warning: {} source unavailable; inventory may be incomplete", source);
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn not_found(identifier: &str) -> Self {
        Self {
            code: EXIT_DRIVER_NOT_FOUND,
            message: format!("no driver named '{}'", identifier),
            hint: Some("run `drvscope list <snapshot>` to see identifiers".to_string()),
        }
    }

    /// Snapshot could not be opened or parsed.
    pub fn snapshot(path: &Path, err: InventoryError) -> Self {
        Self {
            code: EXIT_SNAPSHOT,
            message: format!("{}: {}", path.display(), err),
            hint: None,
        }
    }

    /// Create error from inventory error with proper exit code.
    pub fn inventory(err: InventoryError) -> Self {
        let code = inventory_exit_code(&err);
        let hint = match &err {
            InventoryError::IdentifierCollision { .. } => {
                Some("two sources name the same driver differently; fix the snapshot and retry".to_string())
            }
            InventoryError::KeyNotFound(_) => {
                Some("run `drvscope list <snapshot> --columns Name,HasRegistry` to see keyed drivers".to_string())
            }
            InventoryError::InvalidValue { .. } => {
                Some("run `drvscope key edit --help` for accepted codes".to_string())
            }
            InventoryError::InvalidKeyName(_) => Some("key names must be non-empty and contain no '\\'".to_string()),
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
