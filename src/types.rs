use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::document::address;
use crate::error::{SheetfillError, SheetfillResult};

/// Caller data for one worksheet: a JSON-like object whose fields are scalars,
/// nested objects (reached through dotted paths) or arrays of element records.
pub type RenderRecord = serde_json::Value;

//==============================================================================
// Coordinates
//==============================================================================

/// 1-based cell coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellPosition {
    pub row: u32,
    pub col: u32,
}

impl CellPosition {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// A1-style reference ("C3")
    pub fn to_a1(&self) -> String {
        format!("{}{}", address::column_to_letters(self.col), self.row)
    }
}

/// Inclusive rectangle of cells, both corners 1-based.
///
/// Used for static merged ranges read from a template, for merges computed
/// after row expansion, and for the result of a placeholder range lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRange {
    pub start: CellPosition,
    pub end: CellPosition,
}

/// Merged range as recorded on a worksheet.
pub type MergedRange = CellRange;

/// Merged range in post-expansion coordinates, applied once all sheets of a
/// fill have been expanded.
pub type DynamicMerge = CellRange;

impl CellRange {
    pub fn new(start_row: u32, start_col: u32, end_row: u32, end_col: u32) -> Self {
        Self {
            start: CellPosition::new(start_row, start_col),
            end: CellPosition::new(end_row, end_col),
        }
    }

    /// 1x1 rectangle
    pub fn single(row: u32, col: u32) -> Self {
        Self::new(row, col, row, col)
    }

    pub fn is_single_cell(&self) -> bool {
        self.start == self.end
    }

    pub fn is_inverted(&self) -> bool {
        self.start.row > self.end.row || self.start.col > self.end.col
    }

    /// True if `row` lies within the rectangle's row interval
    pub fn contains_row(&self, row: u32) -> bool {
        self.start.row <= row && row <= self.end.row
    }

    pub fn overlaps(&self, other: &CellRange) -> bool {
        self.start.row <= other.end.row
            && other.start.row <= self.end.row
            && self.start.col <= other.end.col
            && other.start.col <= self.end.col
    }

    /// Same rectangle moved `rows` rows down
    pub fn shifted_down(&self, rows: u32) -> Self {
        Self::new(
            self.start.row + rows,
            self.start.col,
            self.end.row + rows,
            self.end.col,
        )
    }

    /// Rows spanned; an inverted range counts as one
    pub fn height(&self) -> u32 {
        self.end.row.saturating_sub(self.start.row) + 1
    }

    /// Columns spanned; an inverted range counts as one
    pub fn width(&self) -> u32 {
        self.end.col.saturating_sub(self.start.col) + 1
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_cell() {
            write!(f, "{}", self.start.to_a1())
        } else {
            write!(f, "{}:{}", self.start.to_a1(), self.end.to_a1())
        }
    }
}

//==============================================================================
// Engine configuration
//==============================================================================

/// How the merge geometry tracker compensates for the document backend's row
/// duplication behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeCorrection {
    /// Duplicating a row keeps the template row's merges and carries every
    /// merge below it along with its rows. Only the duplicated rows need new
    /// merges.
    #[default]
    Retained,
    /// Duplicating a row discards every merge below the duplicated row. Later
    /// template rows and all trailing merges must be merged again.
    Invalidated,
}

impl MergeCorrection {
    /// First element index whose row needs a merge re-applied for block
    /// `block_index` (0-based, in processing order).
    pub fn first_fixed_index(&self, block_index: usize) -> usize {
        match self {
            MergeCorrection::Retained => 1,
            MergeCorrection::Invalidated if block_index == 0 => 1,
            MergeCorrection::Invalidated => 0,
        }
    }

    /// Whether merges below expanded blocks must be re-applied at their
    /// shifted position.
    pub fn restores_trailing(&self) -> bool {
        matches!(self, MergeCorrection::Invalidated)
    }
}

impl std::str::FromStr for MergeCorrection {
    type Err = SheetfillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "retained" => Ok(MergeCorrection::Retained),
            "invalidated" => Ok(MergeCorrection::Invalidated),
            other => Err(SheetfillError::Config(format!(
                "Unknown merge correction '{}' (expected 'retained' or 'invalidated')",
                other
            ))),
        }
    }
}

/// Default marker searched by [`crate::template::placeholder_range`]
pub const DEFAULT_RANGE_MARKER: &str = "{{#placeholder}}";

/// Default timeout applied to every resource fetch
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Engine settings, loadable from a YAML file. Every field has a default, so
/// an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub fetch_timeout_secs: u64,
    pub merge_correction: MergeCorrection,
    pub parse_image: bool,
    pub range_marker: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            merge_correction: MergeCorrection::default(),
            parse_image: false,
            range_marker: DEFAULT_RANGE_MARKER.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(content: &str) -> SheetfillResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: EngineConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> SheetfillResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    fn validate(&self) -> SheetfillResult<()> {
        if self.fetch_timeout_secs == 0 {
            return Err(SheetfillError::Config(
                "fetch_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.range_marker.is_empty() {
            return Err(SheetfillError::Config(
                "range_marker must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
