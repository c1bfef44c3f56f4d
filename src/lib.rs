//! Sheetfill - spreadsheet templating for .xlsx workbooks
//!
//! Fills a template workbook from JSON-like records, one record per sheet.
//!
//! # Features
//!
//! - Scalar placeholders `{{name}}` / `{{path.to.value}}`, typed when they
//!   fill a whole cell
//! - Iteration blocks `{{@@field.member}}` that expand a template row into one
//!   row per array element
//! - Merged ranges re-created on expanded rows
//! - Image references (`http(s)://` URLs and inline `data:image/...;base64,`)
//!   turned into pictures anchored over their cell or merge
//! - Placeholder-range lookup for anchoring content added after filling
//!
//! # Example
//!
//! ```no_run
//! use sheetfill::document::{FileSink, TemplateSource};
//! use sheetfill::template::{RenderOptions, TemplateEngine};
//! use serde_json::json;
//!
//! # async fn run() -> sheetfill::SheetfillResult<()> {
//! let engine = TemplateEngine::new()?;
//! let records = vec![json!({"name": "Ann", "items": [{"no": "No.1"}, {"no": "No.2"}]})];
//! let mut sink = FileSink::new("filled.xlsx");
//!
//! let report = engine
//!     .render(TemplateSource::detect("template.xlsx")?, &records, &mut sink, RenderOptions::default())
//!     .await?;
//! println!("Inserted {} rows", report.rows_inserted);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod document;
pub mod error;
pub mod fetch;
pub mod template;
pub mod types;

// Re-export commonly used types
pub use document::{CellValue, Workbook, Worksheet};
pub use error::{SheetfillError, SheetfillResult};
pub use template::{FillReport, RenderOptions, TemplateEngine};
pub use types::{CellRange, EngineConfig, MergeCorrection, RenderRecord};
