//! .xlsx → Workbook

use std::io::Cursor;

use calamine::{Data, Range, Reader, Xlsx};
use tracing::warn;

use super::package::{self, SheetParts};
use super::{CellValue, ImageAnchor, ImageId, StyleId, Workbook, Worksheet};
use crate::error::{SheetfillError, SheetfillResult};
use crate::types::CellRange;

/// Read every worksheet of an .xlsx buffer: values, formulas, merged ranges,
/// cell styles, column widths, row heights and pictures
pub(crate) fn read_workbook(bytes: Vec<u8>) -> SheetfillResult<Workbook> {
    let mut parts = package::read_package(&bytes)?;

    let mut xlsx: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| SheetfillError::Read(format!("Failed to open workbook: {}", e)))?;

    xlsx.load_merged_regions()
        .map_err(|e| SheetfillError::Read(format!("Failed to read merged cells: {}", e)))?;

    let mut workbook = Workbook::new();
    let styles: Vec<StyleId> = std::mem::take(&mut parts.styles)
        .into_iter()
        .map(|style| workbook.add_style(style))
        .collect();
    let sheet_names = xlsx.sheet_names().to_vec();

    for sheet_name in sheet_names {
        let values = xlsx.worksheet_range(&sheet_name).map_err(|e| {
            SheetfillError::Read(format!("Failed to read sheet '{}': {}", sheet_name, e))
        })?;
        // Formula parts are optional; a sheet without them still loads
        let formulas = xlsx.worksheet_formula(&sheet_name).ok();
        let merges: Vec<CellRange> = xlsx
            .merged_regions_by_sheet(&sheet_name)
            .into_iter()
            .map(|(_, _, dims)| {
                CellRange::new(
                    dims.start.0 + 1,
                    dims.start.1 + 1,
                    dims.end.0 + 1,
                    dims.end.1 + 1,
                )
            })
            .collect();

        let mut layout = parts.sheets.remove(&sheet_name).unwrap_or_default();
        let pictures = register_pictures(&mut workbook, &sheet_name, &mut layout);

        let sheet = workbook.add_worksheet(sheet_name.clone());
        load_values(sheet, &values);
        if let Some(formulas) = formulas {
            load_formulas(sheet, &formulas);
        }
        for merge in merges {
            if let Err(e) = sheet.merge_cells(merge) {
                warn!(sheet = %sheet_name, "Skipping merged range: {}", e);
            }
        }
        load_layout(sheet, &layout, &styles);
        for anchor in pictures {
            sheet.add_image(anchor);
        }
    }

    Ok(workbook)
}

/// Register a sheet's pictures with the workbook. Pictures the writer cannot
/// embed again are dropped with a warning.
fn register_pictures(
    workbook: &mut Workbook,
    sheet_name: &str,
    layout: &mut SheetParts,
) -> Vec<ImageAnchor> {
    let mut anchors = Vec::new();
    for picture in std::mem::take(&mut layout.pictures) {
        let image: ImageId = match workbook.add_image(picture.bytes) {
            Ok(id) => id,
            Err(e) => {
                warn!(sheet = %sheet_name, "Skipping template picture: {}", e);
                continue;
            }
        };
        anchors.push(ImageAnchor {
            image,
            top_left: picture.top_left,
            bottom_right: picture.bottom_right,
        });
    }
    anchors
}

fn load_layout(sheet: &mut Worksheet, layout: &SheetParts, styles: &[StyleId]) {
    for (col, width) in &layout.column_widths {
        sheet.set_column_width(*col, *width);
    }
    for (row, height) in &layout.row_heights {
        sheet.set_row_height(*row, *height);
    }
    for (row, col, index) in &layout.cell_styles {
        match styles.get(*index) {
            Some(style) => sheet.set_cell_style(*row, *col, *style),
            None => warn!(sheet = %sheet.name(), "Cell style {} is not defined", index),
        }
    }
}

fn load_values(sheet: &mut Worksheet, range: &Range<Data>) {
    let Some((start_row, start_col)) = range.start() else {
        return;
    };

    for (row, col, cell) in range.used_cells() {
        let value = convert_data(cell);
        if value.is_empty() {
            continue;
        }
        sheet.set_cell(
            start_row + row as u32 + 1,
            start_col + col as u32 + 1,
            value,
        );
    }
}

fn load_formulas(sheet: &mut Worksheet, range: &Range<String>) {
    let Some((start_row, start_col)) = range.start() else {
        return;
    };

    for (row, col, formula) in range.used_cells() {
        if formula.is_empty() {
            continue;
        }
        sheet.set_cell(
            start_row + row as u32 + 1,
            start_col + col as u32 + 1,
            CellValue::Formula(formula.clone()),
        );
    }
}

/// Convert a calamine cell to a model value
fn convert_data(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::String(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::DateTime(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::String(s.clone()),
        Data::Error(e) => CellValue::Error(e.to_string()),
    }
}
