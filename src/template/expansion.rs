//! Row expansion for iteration blocks

use serde_json::Value;
use tracing::debug;

use super::scanner::{stringify, typed_value, IterationBlock};
use crate::document::{CellValue, Worksheet};

/// Record of one expanded block, in the coordinates the merge tracker needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockExpansion {
    /// Template row before any expansion
    pub start_row: u32,
    /// Rows the block occupies after expansion (chosen array length)
    pub length: u32,
    /// Rows inserted by earlier blocks of the same sheet
    pub offset: u32,
}

impl BlockExpansion {
    pub fn inserted_rows(&self) -> u32 {
        self.length.saturating_sub(1)
    }
}

/// Expand every block of a sheet, top to bottom.
///
/// Each block's template row is duplicated so the block spans one row per
/// element of its chosen array, then every row is filled from the matching
/// element of each participant field. Later blocks are located through the
/// running count of rows inserted above them.
pub fn expand_sheet(
    sheet: &mut Worksheet,
    blocks: &[IterationBlock],
    record: &Value,
) -> Vec<BlockExpansion> {
    let mut ordered: Vec<&IterationBlock> = blocks.iter().collect();
    ordered.sort_by_key(|block| block.start_row);

    let mut expansions = Vec::with_capacity(ordered.len());
    let mut offset: u32 = 0;

    for block in ordered {
        let length = match record.get(&block.chosen).and_then(Value::as_array) {
            Some(items) if !items.is_empty() => items.len() as u32,
            _ => continue,
        };
        let start = block.start_row + offset;

        if length > 1 {
            sheet.duplicate_row(start, length - 1);
        }

        for index in 0..length {
            if let Some(row) = sheet.row_mut(start + index) {
                for (_, cell) in row.cells_mut() {
                    fill_iteration_cell(cell, &block.fields, record, index as usize);
                }
            }
        }

        debug!(
            sheet = sheet.name(),
            row = block.start_row,
            field = %block.chosen,
            length,
            "Expanded iteration block"
        );

        expansions.push(BlockExpansion {
            start_row: block.start_row,
            length,
            offset,
        });
        offset += length - 1;
    }

    expansions
}

/// Substitute `{{@@field.member}}` markers of one cell with element `index`.
///
/// A cell that mentions a field whose array has no element at `index` is
/// cleared. Members missing from the element leave their marker in place.
/// Only plain string cells are handled; rich text keeps its iteration markers.
fn fill_iteration_cell(cell: &mut CellValue, fields: &[String], record: &Value, index: usize) {
    for field in fields {
        let CellValue::String(text) = cell else {
            return;
        };
        if !text.contains(&format!("{{{{@@{}.", field)) {
            continue;
        }

        let element = record
            .get(field)
            .and_then(Value::as_array)
            .and_then(|items| items.get(index));
        let Some(element) = element else {
            *cell = CellValue::Empty;
            return;
        };
        let Some(members) = element.as_object() else {
            continue;
        };

        for (key, value) in members {
            let marker = format!("{{{{@@{}.{}}}}}", field, key);
            if !text.contains(&marker) {
                continue;
            }
            if text.len() == marker.len() {
                if let Some(typed) = typed_value(value) {
                    *cell = typed;
                    return;
                }
            }
            *text = text.replace(&marker, &stringify(value));
        }
    }
}
