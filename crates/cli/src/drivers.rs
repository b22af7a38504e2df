//! `drvscope list | show | columns | watch`

use std::cell::RefCell;
use std::io::{self, Write};
use std::path::Path;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use drvscope_config::OutputFormat;
use drvscope_inventory::{DriverRow, EventCollector, Inventory, InventoryEvent, RefreshReport, SnapshotSources};

use crate::util::{display_width, pad_right, render_table};
use crate::{warn_degraded, CliError, Context};

/// Widest a table column may grow before its cells are truncated.
const MAX_COLUMN_WIDTH: usize = 60;

// ============================================================================
// list
// ============================================================================

pub(crate) fn cmd_list(
    ctx: &Context,
    snapshot: &Path,
    format: Option<OutputFormat>,
    columns: &[String],
    all_columns: bool,
) -> Result<(), CliError> {
    let columns = resolve_columns(columns, &ctx.settings.output_columns, all_columns)?;
    let (_store, inventory, _) = ctx.load(snapshot)?;
    let rows = inventory.rows();

    let out = match format.unwrap_or(ctx.settings.output_format) {
        OutputFormat::Table => {
            let cells: Vec<Vec<String>> = rows
                .iter()
                .map(|row| columns.iter().map(|c| cell(row, c)).collect())
                .collect();
            render_table(&columns, &cells, MAX_COLUMN_WIDTH)
        }
        OutputFormat::Json => {
            let objects: Vec<serde_json::Value> = rows.iter().map(|row| row_object(row, &columns)).collect();
            let mut json = serde_json::to_string_pretty(&objects).map_err(|e| CliError::io(e.to_string()))?;
            json.push('\n');
            json
        }
        OutputFormat::Csv => rows_csv(&rows, &columns)?,
    };

    write_stdout(&out)
}

/// Canonical column names to print, in the requested order, deduplicated.
pub(crate) fn resolve_columns(
    requested: &[String],
    defaults: &[String],
    all: bool,
) -> Result<Vec<&'static str>, CliError> {
    if all {
        return Ok(DriverRow::COLUMNS.to_vec());
    }

    let names = if requested.is_empty() { defaults } else { requested };
    let mut columns = Vec::new();
    for name in names {
        let name = name.trim();
        let column = DriverRow::column_name(name).ok_or_else(|| {
            CliError::args(format!("unknown column '{}'", name))
                .with_hint("run `drvscope columns` to list valid names")
        })?;
        if !columns.contains(&column) {
            columns.push(column);
        }
    }

    if columns.is_empty() {
        return Err(CliError::args("no columns selected"));
    }
    Ok(columns)
}

fn cell(row: &DriverRow, column: &str) -> String {
    row.get(column).unwrap_or_default()
}

fn row_object(row: &DriverRow, columns: &[&str]) -> serde_json::Value {
    let mut object = serde_json::Map::new();
    for column in columns {
        object.insert(column.to_string(), serde_json::Value::String(cell(row, column)));
    }
    serde_json::Value::Object(object)
}

fn rows_csv(rows: &[DriverRow], columns: &[&str]) -> Result<String, CliError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns).map_err(|e| CliError::io(e.to_string()))?;
    for row in rows {
        writer
            .write_record(columns.iter().map(|c| cell(row, c)))
            .map_err(|e| CliError::io(e.to_string()))?;
    }
    let bytes = writer.into_inner().map_err(|e| CliError::io(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CliError::io(e.to_string()))
}

fn write_stdout(text: &str) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(text.as_bytes()).map_err(|e| CliError::io(e.to_string()))?;
    handle.flush().map_err(|e| CliError::io(e.to_string()))
}

// ============================================================================
// show
// ============================================================================

pub(crate) fn cmd_show(ctx: &Context, snapshot: &Path, identifier: &str, json: bool) -> Result<(), CliError> {
    let (_store, inventory, _) = ctx.load(snapshot)?;
    let entity = inventory.find(identifier).ok_or_else(|| CliError::not_found(identifier))?;

    let row = entity.row(inventory.paths());
    let actions = entity.capabilities().enabled();
    let expected = entity.record().expected_image_path(inventory.paths());

    if json {
        let mut value = serde_json::to_value(&row).map_err(|e| CliError::io(e.to_string()))?;
        if let serde_json::Value::Object(ref mut object) = value {
            object.insert("ExpectedImagePath".to_string(), expected.into());
            object.insert(
                "Actions".to_string(),
                actions.iter().map(|a| serde_json::Value::from(*a)).collect(),
            );
        }
        let text = serde_json::to_string_pretty(&value).map_err(|e| CliError::io(e.to_string()))?;
        return write_stdout(&format!("{}\n", text));
    }

    let label_width = DriverRow::COLUMNS
        .iter()
        .map(|c| display_width(c))
        .chain(std::iter::once(display_width("ExpectedImagePath")))
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for column in DriverRow::COLUMNS {
        let value = cell(&row, column);
        if !value.is_empty() {
            out.push_str(&format!("{}  {}\n", pad_right(column, label_width), value));
        }
    }
    out.push_str(&format!("{}  {}\n", pad_right("ExpectedImagePath", label_width), expected));
    let actions = if actions.is_empty() { "(none)".to_string() } else { actions.join(", ") };
    out.push_str(&format!("{}  {}\n", pad_right("Actions", label_width), actions));

    write_stdout(&out)
}

// ============================================================================
// columns
// ============================================================================

pub(crate) fn cmd_columns(ctx: &Context) -> Result<(), CliError> {
    let mut out = String::new();
    for column in DriverRow::COLUMNS {
        let default = ctx
            .settings
            .output_columns
            .iter()
            .any(|c| c.trim().eq_ignore_ascii_case(column));
        if default {
            out.push_str(&format!("{} (default)\n", column));
        } else {
            out.push_str(&format!("{}\n", column));
        }
    }
    write_stdout(&out)
}

// ============================================================================
// watch
// ============================================================================

pub(crate) fn cmd_watch(ctx: &Context, snapshot: &Path, interval: f64, count: Option<u64>) -> Result<(), CliError> {
    let pause = Duration::try_from_secs_f64(interval)
        .map_err(|_| CliError::args(format!("invalid interval '{}'", interval)))?;
    if count == Some(0) {
        return Err(CliError::args("--count must be at least 1"));
    }

    let (store, mut inventory) = ctx.open(snapshot)?;
    let events = Rc::new(RefCell::new(EventCollector::new()));
    let sink = Rc::clone(&events);
    inventory.subscribe(Box::new(move |e: &InventoryEvent| sink.borrow_mut().push(e.clone())));

    // First cycle failures are fatal; later ones keep the previous collection.
    let report = inventory.refresh().map_err(CliError::inventory)?;
    warn_degraded(&report);
    print_cycle(&report, &events.borrow(), true)?;
    events.borrow_mut().clear();

    let mut cycles = 1;
    while count.map_or(true, |n| cycles < n) {
        thread::sleep(pause);
        cycles += 1;
        match watch_cycle(&store, &mut inventory) {
            Ok(report) => print_cycle(&report, &events.borrow(), false)?,
            Err(message) => eprintln!("warning: {}", message),
        }
        events.borrow_mut().clear();
    }
    Ok(())
}

fn watch_cycle(store: &SnapshotSources, inventory: &mut Inventory) -> Result<RefreshReport, String> {
    store.reload().map_err(|e| format!("reload failed: {}", e))?;
    let report = inventory.refresh().map_err(|e| format!("refresh failed: {}", e))?;
    warn_degraded(&report);
    Ok(report)
}

fn print_cycle(report: &RefreshReport, events: &EventCollector, initial: bool) -> Result<(), CliError> {
    let mut out = String::new();
    if initial {
        out.push_str(&format!("[r{}] {} drivers\n", report.revision, report.total));
    } else {
        for name in events.removed() {
            out.push_str(&format!("- {}\n", name));
        }
        for name in events.added() {
            out.push_str(&format!("+ {}\n", name));
        }
        out.push_str(&format!(
            "[r{}] {} drivers (+{} -{})\n",
            report.revision,
            report.total,
            report.added.len(),
            report.removed.len()
        ));
    }
    write_stdout(&out)
}
