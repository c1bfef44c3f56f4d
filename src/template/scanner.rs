//! Placeholder scanning
//!
//! Two marker kinds live in cell text:
//! - Scalar `{{name.path}}`: resolved immediately against the sheet's record
//! - Iteration `{{@@field.member}}`: collected into [`IterationBlock`]s and
//!   filled later by the row expansion pass
//!
//! Lookups only ever read the record, so one marker's resolution can never
//! observe changes made while resolving another.

use regex::{Captures, Regex};
use serde_json::Value;

use crate::document::{format_number, CellValue, Worksheet};
use crate::error::{SheetfillError, SheetfillResult};

/// A template row to be replicated once per element of an array field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationBlock {
    /// 1-based row number before any expansion
    pub start_row: u32,
    /// Iteration fields seen in the row, in first-seen order
    pub fields: Vec<String>,
    /// Participant whose array is longest; it decides how many rows the block gets
    pub chosen: String,
    /// Length of the chosen array
    pub length: usize,
}

/// Outcome of substituting one piece of text
#[derive(Debug, Clone, PartialEq)]
pub enum Substitution {
    /// Textual substitution (possibly unchanged)
    Text(String),
    /// The whole text was a single marker; the cell takes the raw value
    Value(CellValue),
}

impl Substitution {
    pub fn into_cell_value(self) -> CellValue {
        match self {
            Substitution::Text(text) => CellValue::String(text),
            Substitution::Value(value) => value,
        }
    }

    /// Text form, for places that can only hold text (rich text runs)
    pub fn into_text(self) -> String {
        match self {
            Substitution::Text(text) => text,
            Substitution::Value(value) => value.display_text(),
        }
    }
}

pub struct PlaceholderScanner {
    scalar: Regex,
    iteration: Regex,
}

impl PlaceholderScanner {
    pub fn new() -> SheetfillResult<Self> {
        let scalar = Regex::new(r"\{\{(\w+(?:\.\w+)*)\}\}")
            .map_err(|e| SheetfillError::Config(format!("Regex error: {}", e)))?;
        let iteration = Regex::new(r"\{\{@@(\w+)\.\w+\}\}")
            .map_err(|e| SheetfillError::Config(format!("Regex error: {}", e)))?;
        Ok(Self { scalar, iteration })
    }

    /// Substitute every scalar marker in `text`, left to right.
    ///
    /// Unresolved markers are kept byte for byte. A text consisting of exactly
    /// one marker that resolves to a string, number or boolean yields that raw
    /// value instead of text.
    pub fn substitute_scalars(&self, text: &str, record: &Value) -> Substitution {
        if let Some(caps) = self.scalar.captures(text) {
            let whole = caps.get(0).map(|m| m.as_str().len()) == Some(text.len());
            if whole {
                if let Some(value) = resolve_path(record, &caps[1]).and_then(typed_value) {
                    return Substitution::Value(value);
                }
            }
        }

        let replaced = self.scalar.replace_all(text, |caps: &Captures| {
            match resolve_path(record, &caps[1]) {
                Some(value) => stringify(value),
                None => caps[0].to_string(),
            }
        });
        Substitution::Text(replaced.into_owned())
    }

    /// Distinct iteration field names referenced in `text`, in order
    pub fn iteration_fields<'t>(&self, text: &'t str) -> Vec<&'t str> {
        let mut fields: Vec<&str> = Vec::new();
        for caps in self.iteration.captures_iter(text) {
            if let Some(field) = caps.get(1).map(|m| m.as_str()) {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }
        fields
    }

    /// Resolve scalar markers across the sheet and collect its iteration
    /// blocks in ascending row order.
    pub fn scan_sheet(&self, sheet: &mut Worksheet, record: &Value) -> Vec<IterationBlock> {
        let mut blocks: Vec<IterationBlock> = Vec::new();

        for (row_number, row) in sheet.rows_mut() {
            let mut row_block: Option<usize> = None;

            for (_, cell) in row.cells_mut() {
                match cell {
                    CellValue::String(text) => {
                        for field in self.iteration_fields(text) {
                            register_field(field, record, row_number, &mut row_block, &mut blocks);
                        }
                        let outcome = self.substitute_scalars(text, record);
                        *cell = outcome.into_cell_value();
                    }
                    CellValue::RichText(runs) => {
                        for run in runs.iter_mut() {
                            for field in self.iteration_fields(&run.text) {
                                register_field(field, record, row_number, &mut row_block, &mut blocks);
                            }
                            run.text = self.substitute_scalars(&run.text, record).into_text();
                        }
                    }
                    _ => {}
                }
            }
        }

        blocks
    }
}

/// Add an iteration field seen in `row_number` to the row's block, opening
/// the block on the first valid field. Fields that do not resolve to a
/// non-empty array are ignored.
fn register_field(
    field: &str,
    record: &Value,
    row_number: u32,
    row_block: &mut Option<usize>,
    blocks: &mut Vec<IterationBlock>,
) {
    let Some(length) = iteration_length(record, field) else {
        return;
    };

    match row_block {
        None => {
            blocks.push(IterationBlock {
                start_row: row_number,
                fields: vec![field.to_string()],
                chosen: field.to_string(),
                length,
            });
            *row_block = Some(blocks.len() - 1);
        }
        Some(index) => {
            let block = &mut blocks[*index];
            if block.fields.iter().any(|f| f == field) {
                return;
            }
            block.fields.push(field.to_string());
            // Strictly longer wins; equal lengths keep the earlier field
            if length > block.length {
                block.chosen = field.to_string();
                block.length = length;
            }
        }
    }
}

/// Length of `record[field]` if it is a non-empty array
pub fn iteration_length(record: &Value, field: &str) -> Option<usize> {
    record
        .get(field)
        .and_then(Value::as_array)
        .map(Vec::len)
        .filter(|len| *len > 0)
}

/// Follow a dotted path through objects (by key) and arrays (by index)
pub fn resolve_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(record, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Raw cell value for a scalar; objects, arrays and null have none
pub fn typed_value(value: &Value) -> Option<CellValue> {
    match value {
        Value::String(s) => Some(CellValue::String(s.clone())),
        Value::Number(n) => n.as_f64().map(CellValue::Number),
        Value::Bool(b) => Some(CellValue::Bool(*b)),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Text form of a value for in-text substitution; null becomes empty
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                n.as_f64().map(format_number).unwrap_or_else(|| n.to_string())
            }
        }
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
