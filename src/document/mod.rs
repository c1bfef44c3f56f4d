//! Document model for .xlsx templates
//!
//! A small in-memory workbook model that the templating passes operate on:
//! - Workbook → ordered worksheets, each with a stable creation-order id
//! - Worksheet → sparse rows of sparse cells, merged ranges, image anchors,
//!   column widths and row heights
//! - Cell formats in a workbook-level table, referenced by [`StyleId`]
//! - Reader (calamine plus the package parts it skips) and writer
//!   (rust_xlsxwriter) for the binary format
//!
//! Rows and columns are 1-based everywhere except [`ImageAnchor`], which uses
//! the zero-based drawing grid.

pub mod address;
mod package;
mod reader;
mod sink;
mod source;
pub mod style;
mod writer;

pub use sink::{FileSink, MemorySink, OutputSink, XLSX_MIME_TYPE};
pub use source::TemplateSource;
pub use style::{CellStyle, NumberFormat, StyleId};

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

use crate::error::{SheetfillError, SheetfillResult};
use crate::types::{CellRange, MergedRange};

//==============================================================================
// Cell values
//==============================================================================

/// A run of rich text with its font emphasis
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextRun {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: true,
            italic: false,
        }
    }
}

/// Value stored in a cell
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    String(String),
    RichText(Vec<TextRun>),
    Number(f64),
    Bool(bool),
    /// Excel serial date
    DateTime(f64),
    /// Formula text, stored without evaluating it
    Formula(String),
    /// Error literal such as `#DIV/0!`
    Error(String),
}

impl CellValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Text as a reader of the sheet would see it
    pub fn display_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::String(s) => s.clone(),
            CellValue::RichText(runs) => runs.iter().map(|r| r.text.as_str()).collect(),
            CellValue::Number(n) | CellValue::DateTime(n) => format_number(*n),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Formula(f) => format!("={}", f.trim_start_matches('=')),
            CellValue::Error(e) => e.clone(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::String(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

/// Format a number the way it reads in a cell: integral values without a
/// fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

//==============================================================================
// Rows
//==============================================================================

/// Sparse row of cells keyed by 1-based column number. A cell may carry a
/// style without a value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: BTreeMap<u32, CellValue>,
    styles: BTreeMap<u32, StyleId>,
    /// Custom height in points
    height: Option<f64>,
}

impl Row {
    pub fn cell(&self, col: u32) -> Option<&CellValue> {
        self.cells.get(&col)
    }

    pub fn cell_mut(&mut self, col: u32) -> Option<&mut CellValue> {
        self.cells.get_mut(&col)
    }

    pub fn set_cell(&mut self, col: u32, value: CellValue) {
        self.cells.insert(col, value);
    }

    /// Cells in column order
    pub fn cells(&self) -> impl Iterator<Item = (u32, &CellValue)> {
        self.cells.iter().map(|(col, value)| (*col, value))
    }

    pub fn cells_mut(&mut self) -> impl Iterator<Item = (u32, &mut CellValue)> {
        self.cells.iter_mut().map(|(col, value)| (*col, value))
    }

    /// Highest column number holding a cell, 0 for an empty row
    pub fn cell_count(&self) -> u32 {
        self.cells.keys().next_back().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.values().all(CellValue::is_empty)
    }

    pub fn style(&self, col: u32) -> Option<StyleId> {
        self.styles.get(&col).copied()
    }

    pub fn set_style(&mut self, col: u32, style: StyleId) {
        self.styles.insert(col, style);
    }

    /// Styled cells in column order
    pub fn styles(&self) -> impl Iterator<Item = (u32, StyleId)> + '_ {
        self.styles.iter().map(|(col, style)| (*col, *style))
    }

    pub fn height(&self) -> Option<f64> {
        self.height
    }

    pub fn set_height(&mut self, height: Option<f64>) {
        self.height = height;
    }
}

//==============================================================================
// Merges and images
//==============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("range {0} is inverted")]
    Inverted(CellRange),

    #[error("range {0} covers a single cell")]
    SingleCell(CellRange),

    #[error("range {0} uses row or column 0; coordinates are 1-based")]
    ZeroCoordinate(CellRange),

    #[error("range {range} overlaps existing merge {existing}")]
    Overlap {
        range: CellRange,
        existing: CellRange,
    },
}

/// What happens to merged ranges below a row when that row is duplicated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowDuplication {
    /// Trailing merges move down with their rows
    #[default]
    CarryMerges,
    /// Trailing merges are discarded, as some spreadsheet backends do
    DetachTrailingMerges,
}

/// Handle to an image registered with a [`Workbook`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(usize);

impl ImageId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Image formats the writer can embed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
}

impl ImageFormat {
    /// Detect the format from the leading magic bytes
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(b"GIF8") {
            Some(ImageFormat::Gif)
        } else if bytes.starts_with(b"BM") {
            Some(ImageFormat::Bmp)
        } else {
            None
        }
    }
}

/// Decoded image bytes held by a workbook
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

/// Zero-based point on the drawing grid; (0, 0) is the top-left corner of A1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorPoint {
    pub row: u32,
    pub col: u32,
}

/// Two-cell image anchor: top-left inclusive, bottom-right exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageAnchor {
    pub image: ImageId,
    pub top_left: AnchorPoint,
    pub bottom_right: AnchorPoint,
}

impl ImageAnchor {
    /// Anchor spanning every cell of `range`. Row or column 0 clamps to the
    /// sheet's top-left edge.
    pub fn covering(image: ImageId, range: &CellRange) -> Self {
        let top_left = AnchorPoint {
            row: range.start.row.saturating_sub(1),
            col: range.start.col.saturating_sub(1),
        };
        Self {
            image,
            top_left,
            bottom_right: AnchorPoint {
                row: top_left.row + range.height(),
                col: top_left.col + range.width(),
            },
        }
    }
}

//==============================================================================
// Worksheet
//==============================================================================

#[derive(Debug, Clone)]
pub struct Worksheet {
    id: u32,
    name: String,
    rows: BTreeMap<u32, Row>,
    merges: Vec<MergedRange>,
    images: Vec<ImageAnchor>,
    /// 1-based column → width in character units
    column_widths: BTreeMap<u32, f64>,
    duplication: RowDuplication,
}

impl Worksheet {
    fn new(id: u32, name: String) -> Self {
        Self {
            id,
            name,
            rows: BTreeMap::new(),
            merges: Vec::new(),
            images: Vec::new(),
            column_widths: BTreeMap::new(),
            duplication: RowDuplication::default(),
        }
    }

    /// 1-based creation-order id, independent of display position
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<&CellValue> {
        self.rows.get(&row).and_then(|r| r.cell(col))
    }

    pub fn cell_mut(&mut self, row: u32, col: u32) -> Option<&mut CellValue> {
        self.rows.get_mut(&row).and_then(|r| r.cell_mut(col))
    }

    pub fn set_cell(&mut self, row: u32, col: u32, value: impl Into<CellValue>) {
        self.rows.entry(row).or_default().set_cell(col, value.into());
    }

    pub fn cell_style(&self, row: u32, col: u32) -> Option<StyleId> {
        self.rows.get(&row).and_then(|r| r.style(col))
    }

    pub fn set_cell_style(&mut self, row: u32, col: u32, style: StyleId) {
        self.rows.entry(row).or_default().set_style(col, style);
    }

    pub fn row_height(&self, row: u32) -> Option<f64> {
        self.rows.get(&row).and_then(Row::height)
    }

    pub fn set_row_height(&mut self, row: u32, height: f64) {
        self.rows.entry(row).or_default().set_height(Some(height));
    }

    pub fn column_width(&self, col: u32) -> Option<f64> {
        self.column_widths.get(&col).copied()
    }

    pub fn set_column_width(&mut self, col: u32, width: f64) {
        self.column_widths.insert(col, width);
    }

    /// Columns with a custom width, in column order
    pub fn column_widths(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.column_widths.iter().map(|(col, width)| (*col, *width))
    }

    pub fn row(&self, row: u32) -> Option<&Row> {
        self.rows.get(&row)
    }

    pub fn row_mut(&mut self, row: u32) -> Option<&mut Row> {
        self.rows.get_mut(&row)
    }

    /// Rows in ascending order
    pub fn rows(&self) -> impl Iterator<Item = (u32, &Row)> {
        self.rows.iter().map(|(number, row)| (*number, row))
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = (u32, &mut Row)> {
        self.rows.iter_mut().map(|(number, row)| (*number, row))
    }

    /// Cells stored in `row`, 0 for a missing row
    pub fn cell_count(&self, row: u32) -> u32 {
        self.rows.get(&row).map(Row::cell_count).unwrap_or(0)
    }

    /// Highest row number holding a cell, 0 for an empty sheet
    pub fn row_count(&self) -> u32 {
        self.rows
            .iter()
            .rev()
            .find(|(_, row)| row.cell_count() > 0)
            .map(|(number, _)| *number)
            .unwrap_or(0)
    }

    /// Merged ranges currently recorded on the sheet
    pub fn merges(&self) -> &[MergedRange] {
        &self.merges
    }

    /// The merge whose top-left cell is (row, col), if any
    pub fn merge_anchored_at(&self, row: u32, col: u32) -> Option<MergedRange> {
        self.merges
            .iter()
            .find(|m| m.start.row == row && m.start.col == col)
            .copied()
    }

    /// Merge a rectangle. Fails if it touches row or column 0, is inverted,
    /// covers one cell, or overlaps an existing merge; the sheet is unchanged
    /// on failure.
    pub fn merge_cells(&mut self, range: CellRange) -> Result<(), MergeError> {
        if range.start.row == 0 || range.start.col == 0 {
            return Err(MergeError::ZeroCoordinate(range));
        }
        if range.is_inverted() {
            return Err(MergeError::Inverted(range));
        }
        if range.is_single_cell() {
            return Err(MergeError::SingleCell(range));
        }
        if let Some(existing) = self.merges.iter().find(|m| m.overlaps(&range)) {
            return Err(MergeError::Overlap {
                range,
                existing: *existing,
            });
        }
        self.merges.push(range);
        Ok(())
    }

    pub fn images(&self) -> &[ImageAnchor] {
        &self.images
    }

    pub fn add_image(&mut self, anchor: ImageAnchor) {
        self.images.push(anchor);
    }

    pub fn row_duplication(&self) -> RowDuplication {
        self.duplication
    }

    pub fn set_row_duplication(&mut self, duplication: RowDuplication) {
        self.duplication = duplication;
    }

    /// Insert `count` copies of `row` directly below it, pushing every later
    /// row down. Copies carry cell values, cell styles and the row height,
    /// never merge membership; merges that contain `row` stay where they are.
    pub fn duplicate_row(&mut self, row: u32, count: u32) {
        if count == 0 {
            return;
        }

        let template = self.rows.get(&row).cloned();
        let below = self.rows.split_off(&(row + 1));
        for (number, moved) in below {
            self.rows.insert(number + count, moved);
        }
        if let Some(template) = template {
            for offset in 1..=count {
                self.rows.insert(row + offset, template.clone());
            }
        }

        match self.duplication {
            RowDuplication::CarryMerges => {
                for merge in self.merges.iter_mut().filter(|m| m.start.row > row) {
                    *merge = merge.shifted_down(count);
                }
            }
            RowDuplication::DetachTrailingMerges => {
                self.merges.retain(|m| m.start.row <= row);
            }
        }

        // Anchors are zero-based: a top edge at `row` sits below 1-based `row`
        for anchor in self.images.iter_mut().filter(|a| a.top_left.row >= row) {
            anchor.top_left.row += count;
            anchor.bottom_right.row += count;
        }
    }
}

//==============================================================================
// Workbook
//==============================================================================

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    worksheets: Vec<Worksheet>,
    images: Vec<EmbeddedImage>,
    styles: Vec<CellStyle>,
    next_sheet_id: u32,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a workbook from .xlsx bytes
    pub fn from_xlsx_bytes(bytes: Vec<u8>) -> SheetfillResult<Self> {
        reader::read_workbook(bytes)
    }

    /// Read a workbook from an .xlsx file on disk
    pub fn open(path: &Path) -> SheetfillResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_xlsx_bytes(bytes)
    }

    /// Serialize the workbook to .xlsx bytes
    pub fn to_xlsx_bytes(&self) -> SheetfillResult<Vec<u8>> {
        writer::write_workbook(self)
    }

    /// Write the workbook to an .xlsx file
    pub fn save(&self, path: &Path) -> SheetfillResult<()> {
        let bytes = self.to_xlsx_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Append a worksheet. Its id is the next creation-order number.
    pub fn add_worksheet(&mut self, name: impl Into<String>) -> &mut Worksheet {
        self.next_sheet_id += 1;
        self.worksheets
            .push(Worksheet::new(self.next_sheet_id, name.into()));
        let last = self.worksheets.len() - 1;
        &mut self.worksheets[last]
    }

    /// Worksheets in display order
    pub fn worksheets(&self) -> &[Worksheet] {
        &self.worksheets
    }

    pub fn worksheets_mut(&mut self) -> &mut [Worksheet] {
        &mut self.worksheets
    }

    pub fn worksheet(&self, index: usize) -> Option<&Worksheet> {
        self.worksheets.get(index)
    }

    pub fn worksheet_mut(&mut self, index: usize) -> Option<&mut Worksheet> {
        self.worksheets.get_mut(index)
    }

    pub fn worksheet_by_name(&self, name: &str) -> Option<&Worksheet> {
        self.worksheets.iter().find(|ws| ws.name == name)
    }

    pub fn worksheet_by_id_mut(&mut self, id: u32) -> Option<&mut Worksheet> {
        self.worksheets.iter_mut().find(|ws| ws.id == id)
    }

    /// Sheet ids in creation order
    pub fn sheet_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.worksheets.iter().map(|ws| ws.id).collect();
        ids.sort_unstable();
        ids
    }

    /// Move a worksheet to another display position; ids are unaffected
    pub fn move_worksheet(&mut self, from: usize, to: usize) {
        if from < self.worksheets.len() && to < self.worksheets.len() {
            let sheet = self.worksheets.remove(from);
            self.worksheets.insert(to, sheet);
        }
    }

    /// Register image bytes and get a handle for anchoring. The bytes must
    /// decode as an image the writer can embed.
    pub fn add_image(&mut self, bytes: Vec<u8>) -> SheetfillResult<ImageId> {
        let format = ImageFormat::detect(&bytes)
            .ok_or_else(|| SheetfillError::Image("Unrecognized image format".to_string()))?;
        rust_xlsxwriter::Image::new_from_buffer(&bytes)
            .map_err(|e| SheetfillError::Image(format!("Failed to decode image: {}", e)))?;

        self.images.push(EmbeddedImage { bytes, format });
        Ok(ImageId(self.images.len() - 1))
    }

    pub fn image(&self, id: ImageId) -> Option<&EmbeddedImage> {
        self.images.get(id.0)
    }

    pub fn images(&self) -> &[EmbeddedImage] {
        &self.images
    }

    /// Register a cell style; an equal style already in the table is reused
    pub fn add_style(&mut self, style: CellStyle) -> StyleId {
        if let Some(index) = self.styles.iter().position(|s| *s == style) {
            return StyleId(index);
        }
        self.styles.push(style);
        StyleId(self.styles.len() - 1)
    }

    pub fn style(&self, id: StyleId) -> Option<&CellStyle> {
        self.styles.get(id.0)
    }

    pub fn styles(&self) -> &[CellStyle] {
        &self.styles
    }
}
