//! Security-control catalog CSV handling.
//!
//! Three readers share the `csv` crate:
//! - [`read_controls`] parses the FedRAMP High export with its fixed,
//!   hand-specified column layout (two banner rows, no usable header);
//! - [`format_csv_context`] renders a headed CSV as `column: value` blocks
//!   for loading into a chat context;
//! - [`csv_to_text`] flattens any CSV into comma-joined lines for chunking.

use anyhow::{bail, Context, Result};
use std::io::Read;
use std::path::Path;

/// Column layout of the control catalog export, in file order.
pub const CATALOG_COLUMNS: [&str; 11] = [
    "Count",
    "SortID",
    "Family",
    "ControlID",
    "ControlName",
    "ControlDescription",
    "FedRAMPHighBaseline",
    "Justification",
    "FedRAMPDefinedAssignment",
    "AdditionalFedRAMPRequirements",
    "FedRAMPParameter",
];

/// Rows above the data in the catalog export.
const BANNER_ROWS: usize = 2;

const COL_FAMILY: usize = 2;
const COL_CONTROL_ID: usize = 3;
const COL_CONTROL_NAME: usize = 4;
const COL_CONTROL_DESCRIPTION: usize = 5;

/// Columns picked for a chat context when the caller names none.
pub const DEFAULT_CONTEXT_COLUMNS: [&str; 3] = ["Control ID", "Control Name", "Control Text"];

const ROW_SEPARATOR_WIDTH: usize = 80;

/// One catalog row that carries a control id.
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub family: String,
    pub control_id: String,
    pub control_name: String,
    pub description: String,
}

impl Control {
    /// The text that gets embedded and returned by retrieval.
    pub fn content(&self) -> String {
        format!(
            "{} - {} - {}",
            self.control_id, self.control_name, self.description
        )
    }
}

pub fn read_controls<R: Read>(reader: R) -> Result<Vec<Control>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut controls = Vec::new();
    for (line, record) in csv_reader.records().enumerate().skip(BANNER_ROWS) {
        let record = record.with_context(|| format!("invalid catalog row {}", line + 1))?;
        let field = |idx: usize| record.get(idx).unwrap_or("").trim().to_string();

        let control_id = field(COL_CONTROL_ID);
        if control_id.is_empty() {
            continue;
        }
        controls.push(Control {
            family: field(COL_FAMILY),
            control_id,
            control_name: field(COL_CONTROL_NAME),
            description: field(COL_CONTROL_DESCRIPTION),
        });
    }
    Ok(controls)
}

pub fn load_controls(path: &Path) -> Result<Vec<Control>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open catalog: {}", path.display()))?;
    read_controls(file)
}

/// A CSV rendered for use as chat context.
#[derive(Debug, Clone)]
pub struct CsvContext {
    pub text: String,
    pub rows: usize,
    pub columns: Vec<String>,
}

pub fn format_csv_context<R: Read>(reader: R, columns: Option<&[String]>) -> Result<CsvContext> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let selected: Vec<(usize, String)> = match columns {
        Some(wanted) => {
            let mut picked = Vec::with_capacity(wanted.len());
            for name in wanted {
                let idx = headers
                    .iter()
                    .position(|h| h == name)
                    .ok_or_else(|| anyhow::anyhow!("column not found: {}", name))?;
                picked.push((idx, name.clone()));
            }
            picked
        }
        None => DEFAULT_CONTEXT_COLUMNS
            .iter()
            .filter_map(|name| {
                headers
                    .iter()
                    .position(|h| h == name)
                    .map(|idx| (idx, name.to_string()))
            })
            .collect(),
    };

    if selected.is_empty() {
        bail!(
            "none of the default columns ({}) are present",
            DEFAULT_CONTEXT_COLUMNS.join(", ")
        );
    }

    let separator = "-".repeat(ROW_SEPARATOR_WIDTH);
    let mut blocks = Vec::new();
    let mut rows = 0usize;
    for record in csv_reader.records() {
        let record = record?;
        let block = selected
            .iter()
            .map(|(idx, name)| format!("{}: {}", name, record.get(*idx).unwrap_or("")))
            .collect::<Vec<_>>()
            .join("\n");
        blocks.push(block);
        blocks.push(separator.clone());
        rows += 1;
    }

    Ok(CsvContext {
        text: blocks.join("\n"),
        rows,
        columns: selected.into_iter().map(|(_, name)| name).collect(),
    })
}

/// Every record as one `", "`-joined line.
pub fn csv_to_text<R: Read>(reader: R) -> Result<String> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut lines = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        lines.push(record.iter().collect::<Vec<_>>().join(", "));
    }
    Ok(lines.join("\n"))
}
