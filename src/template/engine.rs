//! Fill orchestration: scan → expand → merge reconciliation → images

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::expansion::expand_sheet;
use super::geometry::{MergeReport, MergeTracker};
use super::images::{ImageReport, ImageResolver};
use super::scanner::PlaceholderScanner;
use crate::document::{CellValue, OutputSink, TemplateSource, Workbook, Worksheet};
use crate::error::SheetfillResult;
use crate::fetch::{HttpFetcher, ResourceFetcher};
use crate::types::{CellRange, EngineConfig, MergeCorrection, RenderRecord};

/// Hook run on the filled workbook right before it is delivered
pub type BeforeSave = Box<dyn FnOnce(&mut Workbook) -> SheetfillResult<()> + Send>;

/// Options for [`TemplateEngine::render`]
#[derive(Default)]
pub struct RenderOptions {
    pub parse_image: bool,
    pub before_save: Option<BeforeSave>,
}

impl RenderOptions {
    pub fn with_images(mut self) -> Self {
        self.parse_image = true;
        self
    }

    pub fn before_save<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut Workbook) -> SheetfillResult<()> + Send + 'static,
    {
        self.before_save = Some(Box::new(hook));
        self
    }
}

/// What a fill did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillReport {
    /// Sheets that had a usable record
    pub sheets_filled: usize,
    /// Iteration blocks expanded across all sheets
    pub blocks_expanded: usize,
    /// Rows inserted across all sheets
    pub rows_inserted: u32,
    pub merges: MergeReport,
    pub images: ImageReport,
}

/// Template filling engine.
///
/// Environment-dependent capabilities are fixed at construction: the fetcher
/// used for URL templates and image references, and the merge correction
/// matching how the document backend treats merges on row duplication.
pub struct TemplateEngine {
    fetcher: Arc<dyn ResourceFetcher>,
    merge_correction: MergeCorrection,
    scanner: PlaceholderScanner,
}

pub struct TemplateEngineBuilder {
    fetcher: Option<Arc<dyn ResourceFetcher>>,
    merge_correction: MergeCorrection,
    fetch_timeout: Duration,
}

impl TemplateEngineBuilder {
    pub fn fetcher(mut self, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn merge_correction(mut self, correction: MergeCorrection) -> Self {
        self.merge_correction = correction;
        self
    }

    /// Timeout for the default HTTP fetcher; ignored with a custom fetcher
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn build(self) -> SheetfillResult<TemplateEngine> {
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(self.fetch_timeout)?),
        };
        Ok(TemplateEngine {
            fetcher,
            merge_correction: self.merge_correction,
            scanner: PlaceholderScanner::new()?,
        })
    }
}

impl TemplateEngine {
    pub fn builder() -> TemplateEngineBuilder {
        TemplateEngineBuilder {
            fetcher: None,
            merge_correction: MergeCorrection::default(),
            fetch_timeout: Duration::from_secs(crate::types::DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }

    /// Engine with the default HTTP fetcher and retained-merge correction
    pub fn new() -> SheetfillResult<Self> {
        Self::builder().build()
    }

    pub fn from_config(config: &EngineConfig) -> SheetfillResult<Self> {
        Self::builder()
            .merge_correction(config.merge_correction)
            .fetch_timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
    }

    pub fn merge_correction(&self) -> MergeCorrection {
        self.merge_correction
    }

    /// Load a template workbook from any supported source
    pub async fn load(&self, source: TemplateSource) -> SheetfillResult<Workbook> {
        source.load(self.fetcher.as_ref()).await
    }

    /// Fill `workbook` in place.
    ///
    /// `records[i]` feeds the i-th sheet in creation order; a missing or
    /// non-object record leaves its sheet untouched. With `parse_image`,
    /// image references left in cell text are resolved afterwards.
    pub async fn fill(
        &self,
        workbook: &mut Workbook,
        records: &[RenderRecord],
        parse_image: bool,
    ) -> SheetfillResult<FillReport> {
        let mut report = FillReport::default();
        let mut tracker = MergeTracker::new(self.merge_correction);

        for (index, sheet_id) in workbook.sheet_ids().into_iter().enumerate() {
            let Some(record) = records.get(index).filter(|r| r.is_object()) else {
                continue;
            };
            let Some(sheet) = workbook.worksheet_by_id_mut(sheet_id) else {
                continue;
            };
            report.sheets_filled += 1;

            let blocks = self.scanner.scan_sheet(sheet, record);
            if blocks.is_empty() {
                continue;
            }

            // Merge metadata as loaded; expansion does not update the snapshot
            let snapshot = sheet.merges().to_vec();
            let expansions = expand_sheet(sheet, &blocks, record);
            report.blocks_expanded += expansions.len();
            report.rows_inserted += expansions.iter().map(|e| e.inserted_rows()).sum::<u32>();

            tracker.plan_sheet(sheet_id, &snapshot, &expansions);
        }

        if !tracker.is_empty() {
            debug!(sheets = tracker.pending().len(), "Applying dynamic merges");
            report.merges = tracker.apply(workbook);
        }

        if parse_image {
            let mut resolver = ImageResolver::new(self.fetcher.as_ref())?;
            report.images = resolver.resolve(workbook).await;
        }

        Ok(report)
    }

    /// Load → fill → `before_save` hook → deliver to `sink`
    pub async fn render(
        &self,
        source: TemplateSource,
        records: &[RenderRecord],
        sink: &mut dyn OutputSink,
        options: RenderOptions,
    ) -> SheetfillResult<FillReport> {
        info!(?source, sheets = records.len(), "Rendering template");
        let mut workbook = self.load(source).await?;
        let report = self.fill(&mut workbook, records, options.parse_image).await?;
        if let Some(hook) = options.before_save {
            hook(&mut workbook)?;
        }
        sink.deliver(&workbook)?;
        info!(
            blocks = report.blocks_expanded,
            rows = report.rows_inserted,
            images = report.images.anchored,
            "Rendered template"
        );
        Ok(report)
    }
}

/// Find the first cell (row-major) whose text contains `marker`.
///
/// Returns the merge anchored at that cell, or the cell itself as a 1x1
/// range. With `clear_match`, every occurrence of `marker` is removed from
/// that cell.
pub fn placeholder_range(
    sheet: &mut Worksheet,
    marker: &str,
    clear_match: bool,
) -> Option<CellRange> {
    let (row, col) = sheet.rows().find_map(|(row_number, row)| {
        row.cells().find_map(|(col, value)| {
            value
                .as_str()
                .filter(|text| text.contains(marker))
                .map(|_| (row_number, col))
        })
    })?;

    let range = sheet
        .merge_anchored_at(row, col)
        .unwrap_or_else(|| CellRange::single(row, col));

    if clear_match {
        if let Some(CellValue::String(text)) = sheet.cell_mut(row, col) {
            *text = text.replace(marker, "");
        }
    }

    Some(range)
}

/// Load a template with the default engine
pub async fn load_workbook(source: TemplateSource) -> SheetfillResult<Workbook> {
    TemplateEngine::new()?.load(source).await
}

/// Fill a workbook with the default engine
pub async fn fill_template(
    workbook: &mut Workbook,
    records: &[RenderRecord],
    parse_image: bool,
) -> SheetfillResult<FillReport> {
    TemplateEngine::new()?.fill(workbook, records, parse_image).await
}

/// Deliver a workbook to an output sink
pub fn save_workbook(workbook: &Workbook, sink: &mut dyn OutputSink) -> SheetfillResult<()> {
    sink.deliver(workbook)
}

/// Load, fill and deliver with the default engine
pub async fn render(
    source: TemplateSource,
    records: &[RenderRecord],
    sink: &mut dyn OutputSink,
    options: RenderOptions,
) -> SheetfillResult<FillReport> {
    TemplateEngine::new()?
        .render(source, records, sink, options)
        .await
}
