//! Template filling
//!
//! - `scanner`: scalar substitution and iteration block discovery
//! - `expansion`: row duplication and per-element substitution
//! - `geometry`: merged ranges for duplicated and shifted rows
//! - `images`: image references resolved into anchored pictures
//! - `engine`: the orchestrator tying the passes together

pub mod engine;
pub mod expansion;
pub mod geometry;
pub mod images;
pub mod scanner;

pub use engine::{
    fill_template, load_workbook, placeholder_range, render, save_workbook, BeforeSave,
    FillReport, RenderOptions, TemplateEngine, TemplateEngineBuilder,
};
pub use expansion::{expand_sheet, BlockExpansion};
pub use geometry::{plan_dynamic_merges, MergeReport, MergeTracker};
pub use images::{ImageReport, ImageResolver};
pub use scanner::{IterationBlock, PlaceholderScanner, Substitution};
