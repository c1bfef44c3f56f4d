//! Workbook → .xlsx

use rust_xlsxwriter::{Format, Formula, Image, Workbook as XlsxWorkbook, Worksheet as XlsxWorksheet};

use super::{CellStyle, CellValue, ImageAnchor, StyleId, TextRun, Workbook, Worksheet};
use crate::error::{SheetfillError, SheetfillResult};

/// Default column width in pixels (8.43 characters)
const DEFAULT_COLUMN_WIDTH_PX: f64 = 64.0;

/// Default row height in pixels (15 points)
const DEFAULT_ROW_HEIGHT_PX: f64 = 20.0;

const DATE_NUM_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

pub(crate) fn write_workbook(workbook: &Workbook) -> SheetfillResult<Vec<u8>> {
    let mut output = XlsxWorkbook::new();
    let formats = Formats::new(workbook);

    for sheet in workbook.worksheets() {
        let target = output.add_worksheet();
        target
            .set_name(sheet.name())
            .map_err(|e| SheetfillError::Write(format!("Failed to set worksheet name: {}", e)))?;

        write_layout(sheet, target)?;
        // Merges first: writing a merge blanks its cells, values go on top
        write_merges(sheet, target, &formats)?;
        write_cells(sheet, target, &formats)?;
        write_images(workbook, sheet, target)?;
    }

    output
        .save_to_buffer()
        .map_err(|e| SheetfillError::Write(format!("Failed to serialize workbook: {}", e)))
}

/// Writer formats for every style of the workbook
struct Formats<'a> {
    styles: &'a [CellStyle],
    formats: Vec<Format>,
    plain: Format,
}

impl<'a> Formats<'a> {
    fn new(workbook: &'a Workbook) -> Self {
        Self {
            styles: workbook.styles(),
            formats: workbook.styles().iter().map(CellStyle::to_format).collect(),
            plain: Format::new(),
        }
    }

    fn get(&self, style: Option<StyleId>) -> &Format {
        style
            .and_then(|id| self.formats.get(id.index()))
            .unwrap_or(&self.plain)
    }

    /// Format for a date cell: its own number format, or the default one
    fn date(&self, style: Option<StyleId>) -> Format {
        let base = style
            .and_then(|id| self.styles.get(id.index()))
            .cloned()
            .unwrap_or_default();
        base.with_default_num_format(DATE_NUM_FORMAT).to_format()
    }
}

/// 1-based row number to the writer's zero-based index
fn to_row(row: u32) -> SheetfillResult<u32> {
    row.checked_sub(1).ok_or_else(|| {
        SheetfillError::Write("Row 0 is not addressable; rows are 1-based".to_string())
    })
}

/// 1-based column number to the writer's zero-based index
fn to_col(col: u32) -> SheetfillResult<u16> {
    let index = col.checked_sub(1).ok_or_else(|| {
        SheetfillError::Write("Column 0 is not addressable; columns are 1-based".to_string())
    })?;
    u16::try_from(index)
        .map_err(|_| SheetfillError::Write(format!("Column out of range: {}", col)))
}

fn write_layout(sheet: &Worksheet, target: &mut XlsxWorksheet) -> SheetfillResult<()> {
    for (col, width) in sheet.column_widths() {
        target
            .set_column_width(to_col(col)?, width)
            .map_err(|e| SheetfillError::Write(format!("Failed to size column {}: {}", col, e)))?;
    }
    for (row_number, row) in sheet.rows() {
        if let Some(height) = row.height() {
            target
                .set_row_height(to_row(row_number)?, height)
                .map_err(|e| {
                    SheetfillError::Write(format!("Failed to size row {}: {}", row_number, e))
                })?;
        }
    }
    Ok(())
}

fn write_merges(
    sheet: &Worksheet,
    target: &mut XlsxWorksheet,
    formats: &Formats<'_>,
) -> SheetfillResult<()> {
    for merge in sheet.merges() {
        let format = formats.get(sheet.cell_style(merge.start.row, merge.start.col));
        target
            .merge_range(
                to_row(merge.start.row)?,
                to_col(merge.start.col)?,
                to_row(merge.end.row)?,
                to_col(merge.end.col)?,
                "",
                format,
            )
            .map_err(|e| SheetfillError::Write(format!("Failed to merge {}: {}", merge, e)))?;
    }
    Ok(())
}

fn write_cells(
    sheet: &Worksheet,
    target: &mut XlsxWorksheet,
    formats: &Formats<'_>,
) -> SheetfillResult<()> {
    for (row_number, row) in sheet.rows() {
        let row_idx = to_row(row_number)?;
        for (col_number, value) in row.cells() {
            let col_idx = to_col(col_number)?;
            let style = row.style(col_number);
            let format = formats.get(style);
            let result = match value {
                CellValue::Empty if style.is_some() => {
                    target.write_blank(row_idx, col_idx, format)
                }
                CellValue::Empty => continue,
                CellValue::String(s) => target.write_string_with_format(row_idx, col_idx, s, format),
                CellValue::RichText(runs) => {
                    write_rich_text(target, row_idx, col_idx, runs, format)
                }
                CellValue::Number(n) => {
                    target.write_number_with_format(row_idx, col_idx, *n, format)
                }
                CellValue::Bool(b) => {
                    target.write_boolean_with_format(row_idx, col_idx, *b, format)
                }
                CellValue::DateTime(serial) => target.write_number_with_format(
                    row_idx,
                    col_idx,
                    *serial,
                    &formats.date(style),
                ),
                CellValue::Formula(f) => {
                    target.write_formula_with_format(row_idx, col_idx, Formula::new(f), format)
                }
                CellValue::Error(e) => target.write_string_with_format(row_idx, col_idx, e, format),
            };
            result.map_err(|e| {
                SheetfillError::Write(format!(
                    "Failed to write cell ({}, {}): {}",
                    row_number, col_number, e
                ))
            })?;
        }

        // Styled cells without a value keep their borders and fills
        for (col_number, style) in row.styles() {
            if row.cell(col_number).is_some() {
                continue;
            }
            target
                .write_blank(row_idx, to_col(col_number)?, formats.get(Some(style)))
                .map_err(|e| {
                    SheetfillError::Write(format!(
                        "Failed to write cell ({}, {}): {}",
                        row_number, col_number, e
                    ))
                })?;
        }
    }
    Ok(())
}

fn write_rich_text<'a>(
    target: &'a mut XlsxWorksheet,
    row: u32,
    col: u16,
    runs: &[TextRun],
    format: &Format,
) -> Result<&'a mut XlsxWorksheet, rust_xlsxwriter::XlsxError> {
    let run_formats: Vec<Format> = runs.iter().map(run_format).collect();
    let segments: Vec<(&Format, &str)> = runs
        .iter()
        .zip(&run_formats)
        .filter(|(run, _)| !run.text.is_empty())
        .map(|(run, run_format)| (run_format, run.text.as_str()))
        .collect();

    if segments.is_empty() {
        return target.write_string_with_format(row, col, "", format);
    }
    target.write_rich_string_with_format(row, col, &segments, format)
}

fn run_format(run: &TextRun) -> Format {
    let mut format = Format::new();
    if run.bold {
        format = format.set_bold();
    }
    if run.italic {
        format = format.set_italic();
    }
    format
}

fn write_images(
    workbook: &Workbook,
    sheet: &Worksheet,
    target: &mut XlsxWorksheet,
) -> SheetfillResult<()> {
    for anchor in sheet.images() {
        let embedded = workbook.image(anchor.image).ok_or_else(|| {
            SheetfillError::Write(format!("Unknown image handle {}", anchor.image.index()))
        })?;
        let (width, height) = anchor_size_px(sheet, anchor);
        let image = Image::new_from_buffer(&embedded.bytes)
            .map_err(|e| SheetfillError::Write(format!("Failed to embed image: {}", e)))?
            .set_scale_to_size(width, height, false);

        let col = u16::try_from(anchor.top_left.col).map_err(|_| {
            SheetfillError::Write(format!("Column out of range: {}", anchor.top_left.col))
        })?;
        target
            .insert_image(anchor.top_left.row, col, &image)
            .map_err(|e| SheetfillError::Write(format!("Failed to insert image: {}", e)))?;
    }
    Ok(())
}

/// Pixel size of an anchor rectangle on the sheet's grid
fn anchor_size_px(sheet: &Worksheet, anchor: &ImageAnchor) -> (f64, f64) {
    let last_col = anchor.bottom_right.col.max(anchor.top_left.col + 1);
    let last_row = anchor.bottom_right.row.max(anchor.top_left.row + 1);

    // Anchor points are zero-based, so point n is the left edge of column n + 1
    let width = (anchor.top_left.col..last_col)
        .map(|col| column_width_px(sheet.column_width(col + 1)))
        .sum();
    let height = (anchor.top_left.row..last_row)
        .map(|row| row_height_px(sheet.row_height(row + 1)))
        .sum();
    (width, height)
}

fn column_width_px(width: Option<f64>) -> f64 {
    match width {
        None => DEFAULT_COLUMN_WIDTH_PX,
        Some(w) if w < 1.0 => (w * 12.0).round(),
        Some(w) => (w * 7.0).round() + 5.0,
    }
}

fn row_height_px(height: Option<f64>) -> f64 {
    height.map_or(DEFAULT_ROW_HEIGHT_PX, |points| (points * 4.0 / 3.0).round())
}
