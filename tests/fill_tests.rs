//! End-to-end template filling tests

use async_trait::async_trait;
use base64::Engine as _;
use pretty_assertions::assert_eq;
use serde_json::json;
use rust_xlsxwriter::{Format, FormatBorder};
use sheetfill::document::{
    CellStyle, CellValue, MemorySink, NumberFormat, OutputSink, RowDuplication, TemplateSource,
    TextRun, Workbook, Worksheet,
};
use sheetfill::error::{SheetfillError, SheetfillResult};
use sheetfill::fetch::ResourceFetcher;
use sheetfill::template::{placeholder_range, RenderOptions, TemplateEngine};
use sheetfill::types::{CellRange, MergeCorrection};
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

const PIXEL_PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

fn pixel_png() -> Vec<u8> {
    base64::engine::general_purpose::STANDARD
        .decode(PIXEL_PNG)
        .unwrap()
}

/// Serves canned bytes per URL and counts every call
#[derive(Default)]
struct CountingFetcher {
    responses: HashMap<String, Vec<u8>>,
    calls: AtomicUsize,
}

impl CountingFetcher {
    fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.responses.insert(url.to_string(), bytes);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceFetcher for CountingFetcher {
    async fn fetch(&self, url: &str) -> SheetfillResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| SheetfillError::Fetch(format!("HTTP 404 for {}", url)))
    }
}

fn engine_with(fetcher: Arc<CountingFetcher>, correction: MergeCorrection) -> TemplateEngine {
    TemplateEngine::builder()
        .fetcher(fetcher)
        .merge_correction(correction)
        .build()
        .unwrap()
}

fn engine() -> TemplateEngine {
    engine_with(Arc::new(CountingFetcher::default()), MergeCorrection::Retained)
}

fn text(sheet: &Worksheet, row: u32, col: u32) -> Option<CellValue> {
    sheet.cell(row, col).cloned()
}

fn snapshot(sheet: &Worksheet) -> Vec<(u32, Vec<(u32, CellValue)>)> {
    sheet
        .rows()
        .map(|(n, row)| (n, row.cells().map(|(c, v)| (c, v.clone())).collect()))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// WORKED EXAMPLES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_iteration_block_expands_rows() {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet("Sheet1");
    sheet.set_cell(5, 1, "{{@@items.no}}");
    sheet.set_cell(6, 1, "Total");

    let records = vec![json!({"items": [{"no": "No.1"}, {"no": "No.2"}]})];
    let report = engine().fill(&mut workbook, &records, false).await.unwrap();

    let sheet = workbook.worksheet(0).unwrap();
    assert_eq!(text(sheet, 5, 1), Some(CellValue::from("No.1")));
    assert_eq!(text(sheet, 6, 1), Some(CellValue::from("No.2")));
    assert_eq!(text(sheet, 7, 1), Some(CellValue::from("Total")));
    assert_eq!(report.blocks_expanded, 1);
    assert_eq!(report.rows_inserted, 1);
}

#[tokio::test]
async fn test_scalar_placeholder_in_text() {
    let mut workbook = Workbook::new();
    workbook.add_worksheet("Sheet1").set_cell(1, 1, "Hello {{name}}!");

    engine()
        .fill(&mut workbook, &[json!({"name": "John"})], false)
        .await
        .unwrap();

    assert_eq!(
        text(workbook.worksheet(0).unwrap(), 1, 1),
        Some(CellValue::from("Hello John!"))
    );
}

#[tokio::test]
async fn test_placeholder_range_in_filled_workbook() {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet("Sheet1");
    sheet.set_cell(1, 1, "{{title}}");
    sheet.set_cell(3, 3, "{{#seal}}");
    sheet.merge_cells(CellRange::new(3, 3, 4, 4)).unwrap();

    engine()
        .fill(&mut workbook, &[json!({"title": "Contract"})], false)
        .await
        .unwrap();

    let sheet = workbook.worksheet_mut(0).unwrap();
    let range = placeholder_range(sheet, "{{#seal}}", true).unwrap();

    assert_eq!(range, CellRange::new(3, 3, 4, 4));
    assert_eq!(range.start.row, 3);
    assert_eq!(range.end.col, 4);
    assert_eq!(text(sheet, 3, 3), Some(CellValue::from("")));
}

#[tokio::test]
async fn test_missing_iteration_field_leaves_marker() {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet("Sheet1");
    sheet.set_cell(2, 1, "{{@@lines.amount}}");
    sheet.set_cell(3, 1, "end");

    let report = engine()
        .fill(&mut workbook, &[json!({"other": [1, 2]})], false)
        .await
        .unwrap();

    let sheet = workbook.worksheet(0).unwrap();
    assert_eq!(report.blocks_expanded, 0);
    assert_eq!(text(sheet, 2, 1), Some(CellValue::from("{{@@lines.amount}}")));
    assert_eq!(text(sheet, 3, 1), Some(CellValue::from("end")));
}

#[tokio::test]
async fn test_identical_image_url_fetched_once() {
    let url = "https://cdn.example.com/logo.png";
    let fetcher = Arc::new(CountingFetcher::default().with(url, pixel_png()));
    let engine = engine_with(fetcher.clone(), MergeCorrection::Retained);

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet("Sheet1");
    sheet.set_cell(1, 1, "{{logo}}");
    sheet.set_cell(4, 2, "{{logo}}");
    sheet.merge_cells(CellRange::new(4, 2, 5, 3)).unwrap();

    let report = engine
        .fill(&mut workbook, &[json!({"logo": url})], true)
        .await
        .unwrap();

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(report.images.anchored, 2);
    assert_eq!(report.images.resolved, 1);
    assert_eq!(workbook.images().len(), 1);

    let sheet = workbook.worksheet(0).unwrap();
    let anchors = sheet.images();
    assert_eq!(anchors.len(), 2);
    assert_eq!(anchors[0].image, anchors[1].image);
    // Second anchor spans the whole merge
    assert_eq!(anchors[1].top_left.row, 3);
    assert_eq!(anchors[1].top_left.col, 1);
    assert_eq!(anchors[1].bottom_right.row, 5);
    assert_eq!(anchors[1].bottom_right.col, 3);
    assert_eq!(text(sheet, 1, 1), Some(CellValue::from("")));
}

// ═══════════════════════════════════════════════════════════════════════════
// IMAGES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_inline_image_reference() {
    let mut workbook = Workbook::new();
    workbook
        .add_worksheet("Sheet1")
        .set_cell(2, 2, format!("Stamp: data:image/png;base64,{}", PIXEL_PNG));

    let report = engine().fill(&mut workbook, &[json!({})], true).await.unwrap();

    assert_eq!(report.images.anchored, 1);
    let sheet = workbook.worksheet(0).unwrap();
    assert_eq!(text(sheet, 2, 2), Some(CellValue::from("Stamp: ")));
    assert_eq!(sheet.images().len(), 1);
}

#[tokio::test]
async fn test_failed_fetch_leaves_text_and_is_not_retried() {
    let fetcher = Arc::new(CountingFetcher::default());
    let engine = engine_with(fetcher.clone(), MergeCorrection::Retained);

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet("Sheet1");
    sheet.set_cell(1, 1, "https://missing.example.com/a.png");
    sheet.set_cell(2, 1, "https://missing.example.com/a.png");
    sheet.set_cell(3, 1, "kept");

    let report = engine.fill(&mut workbook, &[json!({})], true).await.unwrap();

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(report.images.invalid, 1);
    assert_eq!(report.images.anchored, 0);
    let sheet = workbook.worksheet(0).unwrap();
    assert_eq!(
        text(sheet, 1, 1),
        Some(CellValue::from("https://missing.example.com/a.png"))
    );
    assert!(sheet.images().is_empty());
}

#[tokio::test]
async fn test_non_image_bytes_are_invalid() {
    let url = "https://example.com/page.html";
    let fetcher = Arc::new(CountingFetcher::default().with(url, b"<html></html>".to_vec()));
    let engine = engine_with(fetcher, MergeCorrection::Retained);

    let mut workbook = Workbook::new();
    workbook.add_worksheet("Sheet1").set_cell(1, 1, url);

    let report = engine.fill(&mut workbook, &[json!({})], true).await.unwrap();

    assert_eq!(report.images.invalid, 1);
    assert!(workbook.images().is_empty());
}

/// Accept connections and never answer them
async fn silent_server(listener: TcpListener) {
    let mut held = Vec::new();
    while let Ok((socket, _)) = listener.accept().await {
        held.push(socket);
    }
}

#[tokio::test]
async fn test_image_fetch_timeout_leaves_reference_invalid() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/stamp.png", listener.local_addr().unwrap());
    let server = tokio::spawn(silent_server(listener));

    let engine = TemplateEngine::builder()
        .fetch_timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let mut workbook = Workbook::new();
    workbook.add_worksheet("Sheet1").set_cell(1, 1, url.clone());

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        engine.fill(&mut workbook, &[json!({})], true),
    )
    .await
    .expect("fill outlived the fetch timeout")
    .unwrap();

    assert_eq!(report.images.invalid, 1);
    assert_eq!(report.images.anchored, 0);
    let sheet = workbook.worksheet(0).unwrap();
    assert_eq!(text(sheet, 1, 1), Some(CellValue::from(url.as_str())));
    assert!(sheet.images().is_empty());
    server.abort();
}

#[tokio::test]
async fn test_images_ignored_without_flag() {
    let fetcher = Arc::new(CountingFetcher::default());
    let engine = engine_with(fetcher.clone(), MergeCorrection::Retained);

    let mut workbook = Workbook::new();
    workbook
        .add_worksheet("Sheet1")
        .set_cell(1, 1, "https://example.com/a.png");

    engine.fill(&mut workbook, &[json!({})], false).await.unwrap();

    assert_eq!(fetcher.calls(), 0);
    assert!(workbook.worksheet(0).unwrap().images().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// RECORDS AND SHEETS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_records_follow_creation_order() {
    let mut workbook = Workbook::new();
    workbook.add_worksheet("First").set_cell(1, 1, "{{v}}");
    workbook.add_worksheet("Second").set_cell(1, 1, "{{v}}");
    workbook.move_worksheet(1, 0);

    engine()
        .fill(&mut workbook, &[json!({"v": "one"}), json!({"v": "two"})], false)
        .await
        .unwrap();

    let first = workbook.worksheet_by_name("First").unwrap();
    let second = workbook.worksheet_by_name("Second").unwrap();
    assert_eq!(text(first, 1, 1), Some(CellValue::from("one")));
    assert_eq!(text(second, 1, 1), Some(CellValue::from("two")));
}

#[tokio::test]
async fn test_missing_and_non_object_records_skip_sheets() {
    let mut workbook = Workbook::new();
    workbook.add_worksheet("A").set_cell(1, 1, "{{v}}");
    workbook.add_worksheet("B").set_cell(1, 1, "{{v}}");
    workbook.add_worksheet("C").set_cell(1, 1, "{{v}}");

    let report = engine()
        .fill(&mut workbook, &[json!({"v": 1}), json!("not a record")], false)
        .await
        .unwrap();

    assert_eq!(report.sheets_filled, 1);
    assert_eq!(text(workbook.worksheet(0).unwrap(), 1, 1), Some(CellValue::Number(1.0)));
    assert_eq!(
        text(workbook.worksheet(1).unwrap(), 1, 1),
        Some(CellValue::from("{{v}}"))
    );
    assert_eq!(
        text(workbook.worksheet(2).unwrap(), 1, 1),
        Some(CellValue::from("{{v}}"))
    );
}

#[tokio::test]
async fn test_scalars_and_iteration_in_same_row() {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet("Sheet1");
    sheet.set_cell(1, 1, "{{customer.name}}");
    sheet.set_cell(2, 1, "{{@@lines.sku}}");
    sheet.set_cell(2, 2, "{{currency}} {{@@lines.price}}");

    let record = json!({
        "customer": {"name": "ACME"},
        "currency": "EUR",
        "lines": [{"sku": "A-1", "price": 9.5}, {"sku": "B-2", "price": 12}],
    });
    engine().fill(&mut workbook, &[record], false).await.unwrap();

    let sheet = workbook.worksheet(0).unwrap();
    assert_eq!(text(sheet, 1, 1), Some(CellValue::from("ACME")));
    assert_eq!(text(sheet, 2, 2), Some(CellValue::from("EUR 9.5")));
    assert_eq!(text(sheet, 3, 1), Some(CellValue::from("B-2")));
    assert_eq!(text(sheet, 3, 2), Some(CellValue::from("EUR 12")));
}

#[tokio::test]
async fn test_longest_participant_drives_row_count() {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet("Sheet1");
    sheet.set_cell(1, 1, "{{@@short.v}}");
    sheet.set_cell(1, 2, "{{@@long.v}}");
    sheet.set_cell(2, 1, "after");

    let record = json!({
        "short": [{"v": "s1"}],
        "long": [{"v": "l1"}, {"v": "l2"}, {"v": "l3"}],
    });
    let report = engine().fill(&mut workbook, &[record], false).await.unwrap();

    let sheet = workbook.worksheet(0).unwrap();
    assert_eq!(report.rows_inserted, 2);
    assert_eq!(text(sheet, 1, 1), Some(CellValue::from("s1")));
    assert_eq!(text(sheet, 2, 1), Some(CellValue::Empty));
    assert_eq!(text(sheet, 3, 2), Some(CellValue::from("l3")));
    assert_eq!(text(sheet, 4, 1), Some(CellValue::from("after")));
}

// ═══════════════════════════════════════════════════════════════════════════
// PROPERTIES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_rich_text_iteration_marker_is_copied_verbatim() {
    let runs = vec![TextRun::bold("Item "), TextRun::plain("{{@@items.no}}")];
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet("Sheet1");
    sheet.set_cell(2, 1, "{{@@items.no}}");
    sheet.set_cell(2, 2, CellValue::RichText(runs.clone()));
    sheet.set_cell(3, 1, "end");

    let records = vec![json!({"items": [{"no": "A"}, {"no": "B"}, {"no": "C"}]})];
    let report = engine().fill(&mut workbook, &records, false).await.unwrap();

    assert_eq!(report.rows_inserted, 2);
    let sheet = workbook.worksheet(0).unwrap();
    for (row, no) in [(2, "A"), (3, "B"), (4, "C")] {
        assert_eq!(text(sheet, row, 1), Some(CellValue::from(no)));
        assert_eq!(text(sheet, row, 2), Some(CellValue::RichText(runs.clone())));
    }
    assert_eq!(text(sheet, 5, 1), Some(CellValue::from("end")));
}

#[tokio::test]
async fn test_row_count_grows_by_inserted_rows() {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet("Sheet1");
    sheet.set_cell(1, 1, "head");
    sheet.set_cell(2, 1, "{{@@a.v}}");
    sheet.set_cell(4, 1, "{{@@b.v}}");
    sheet.set_cell(6, 1, "foot");
    let before = sheet.row_count();

    let record = json!({
        "a": [{"v": 1}, {"v": 2}, {"v": 3}, {"v": 4}],
        "b": [{"v": 1}, {"v": 2}],
    });
    engine().fill(&mut workbook, &[record], false).await.unwrap();

    let after = workbook.worksheet(0).unwrap().row_count();
    assert_eq!(after, before + 3 + 1);
    assert_eq!(
        text(workbook.worksheet(0).unwrap(), after, 1),
        Some(CellValue::from("foot"))
    );
}

#[tokio::test]
async fn test_second_fill_is_a_no_op() {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet("Sheet1");
    sheet.set_cell(1, 1, "{{title}}");
    sheet.set_cell(2, 1, "{{@@rows.v}}");
    sheet.set_cell(2, 2, "x");
    sheet.merge_cells(CellRange::new(2, 2, 2, 3)).unwrap();

    let record = json!({"title": "T", "rows": [{"v": "a"}, {"v": "b"}]});
    let engine = engine();
    engine.fill(&mut workbook, &[record.clone()], false).await.unwrap();
    let cells = snapshot(workbook.worksheet(0).unwrap());
    let merges = workbook.worksheet(0).unwrap().merges().to_vec();

    let report = engine.fill(&mut workbook, &[record], false).await.unwrap();

    assert_eq!(report.blocks_expanded, 0);
    assert_eq!(snapshot(workbook.worksheet(0).unwrap()), cells);
    assert_eq!(workbook.worksheet(0).unwrap().merges(), merges.as_slice());
}

// ═══════════════════════════════════════════════════════════════════════════
// MERGES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_template_merges_repeated_on_copies() {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet("Sheet1");
    sheet.set_cell(2, 1, "{{@@rows.v}}");
    sheet.merge_cells(CellRange::new(2, 1, 2, 3)).unwrap();
    sheet.set_cell(3, 1, "note");
    sheet.merge_cells(CellRange::new(3, 1, 3, 2)).unwrap();

    let record = json!({"rows": [{"v": 1}, {"v": 2}, {"v": 3}]});
    let report = engine().fill(&mut workbook, &[record], false).await.unwrap();

    let mut merges = workbook.worksheet(0).unwrap().merges().to_vec();
    merges.sort_by_key(|m| (m.start.row, m.start.col));
    assert_eq!(
        merges,
        vec![
            CellRange::new(2, 1, 2, 3),
            CellRange::new(3, 1, 3, 3),
            CellRange::new(4, 1, 4, 3),
            CellRange::new(5, 1, 5, 2),
        ]
    );
    assert_eq!(report.merges.applied, 2);
    assert_eq!(report.merges.failed, 0);
}

#[tokio::test]
async fn test_invalidating_backend_gets_merges_restored() {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet("Sheet1");
    sheet.set_row_duplication(RowDuplication::DetachTrailingMerges);
    sheet.set_cell(1, 1, "title");
    sheet.merge_cells(CellRange::new(1, 1, 1, 4)).unwrap();
    sheet.set_cell(2, 1, "{{@@a.v}}");
    sheet.merge_cells(CellRange::new(2, 1, 2, 2)).unwrap();
    sheet.set_cell(4, 1, "{{@@b.v}}");
    sheet.merge_cells(CellRange::new(4, 1, 4, 2)).unwrap();
    sheet.set_cell(6, 1, "footer");
    sheet.merge_cells(CellRange::new(6, 1, 7, 3)).unwrap();

    let record = json!({
        "a": [{"v": 1}, {"v": 2}],
        "b": [{"v": 1}, {"v": 2}, {"v": 3}],
    });
    let engine = engine_with(Arc::new(CountingFetcher::default()), MergeCorrection::Invalidated);
    let report = engine.fill(&mut workbook, &[record], false).await.unwrap();

    let mut merges = workbook.worksheet(0).unwrap().merges().to_vec();
    merges.sort_by_key(|m| (m.start.row, m.start.col));
    assert_eq!(
        merges,
        vec![
            CellRange::new(1, 1, 1, 4),
            CellRange::new(2, 1, 2, 2),
            CellRange::new(3, 1, 3, 2),
            CellRange::new(5, 1, 5, 2),
            CellRange::new(6, 1, 6, 2),
            CellRange::new(7, 1, 7, 2),
            CellRange::new(9, 1, 10, 3),
        ]
    );
    assert_eq!(report.merges.failed, 0);
    assert_eq!(
        text(workbook.worksheet(0).unwrap(), 9, 1),
        Some(CellValue::from("footer"))
    );
}

#[tokio::test]
async fn test_conflicting_merge_is_skipped() {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet("Sheet1");
    sheet.set_cell(1, 1, "{{@@rows.v}}");
    sheet.merge_cells(CellRange::new(1, 1, 1, 2)).unwrap();

    // A merge planned for an expanded row that already overlaps one on the sheet
    let record = json!({"rows": [{"v": 1}, {"v": 2}]});
    let mut tracker = sheetfill::template::MergeTracker::new(MergeCorrection::Retained);
    let sheet = workbook.worksheet_mut(0).unwrap();
    let snapshot = sheet.merges().to_vec();
    let blocks = sheetfill::template::PlaceholderScanner::new()
        .unwrap()
        .scan_sheet(sheet, &record);
    let expansions = sheetfill::template::expand_sheet(sheet, &blocks, &record);
    sheet.merge_cells(CellRange::new(2, 2, 2, 3)).unwrap();
    let sheet_id = sheet.id();
    tracker.plan_sheet(sheet_id, &snapshot, &expansions);

    let report = tracker.apply(&mut workbook);

    assert_eq!(report.applied, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(
        workbook.worksheet(0).unwrap().merges(),
        &[CellRange::new(1, 1, 1, 2), CellRange::new(2, 2, 2, 3)]
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// RENDER
// ═══════════════════════════════════════════════════════════════════════════

fn template_bytes() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet("Invoice");
    sheet.set_cell(1, 1, "Invoice {{number}}");
    sheet.set_cell(3, 1, "{{@@items.name}}");
    sheet.set_cell(3, 2, "{{@@items.qty}}");
    sheet.set_cell(3, 3, "x");
    sheet.merge_cells(CellRange::new(3, 3, 3, 4)).unwrap();
    sheet.set_cell(4, 1, "Total");
    workbook.to_xlsx_bytes().unwrap()
}

#[tokio::test]
async fn test_render_to_memory_sink() {
    let records = vec![json!({
        "number": 42,
        "items": [{"name": "Bolt", "qty": 10}, {"name": "Nut", "qty": 20}],
    })];
    let mut sink = MemorySink::new("invoice.xlsx");

    let report = engine()
        .render(
            TemplateSource::Bytes(template_bytes()),
            &records,
            &mut sink,
            RenderOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(report.rows_inserted, 1);

    let output = Workbook::from_xlsx_bytes(sink.into_bytes().unwrap()).unwrap();
    let sheet = output.worksheet_by_name("Invoice").unwrap();
    assert_eq!(text(sheet, 1, 1), Some(CellValue::from("Invoice 42")));
    assert_eq!(text(sheet, 3, 1), Some(CellValue::from("Bolt")));
    assert_eq!(text(sheet, 4, 2), Some(CellValue::Number(20.0)));
    assert_eq!(text(sheet, 5, 1), Some(CellValue::from("Total")));
    assert!(sheet.merges().contains(&CellRange::new(4, 3, 4, 4)));
}

/// Template written straight with rust_xlsxwriter: a 40-character first
/// column, a bold percent style on A1/A2, a bordered blank B2 and a 30pt
/// iteration row.
fn styled_template_bytes() -> Vec<u8> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Report").unwrap();
    let percent = Format::new().set_bold().set_num_format("0%");
    sheet.set_column_width(0, 40).unwrap();
    sheet.set_row_height(1, 30).unwrap();
    sheet.write_string_with_format(0, 0, "{{name}}", &percent).unwrap();
    sheet
        .write_string_with_format(1, 0, "{{@@items.v}}", &percent)
        .unwrap();
    sheet
        .write_blank(1, 1, &Format::new().set_border(FormatBorder::Thin))
        .unwrap();
    sheet.write_string(2, 0, "Total").unwrap();
    workbook.save_to_buffer().unwrap()
}

fn is_bold_percent(style: &CellStyle) -> bool {
    let percent = match &style.num_format {
        Some(NumberFormat::Builtin(index)) => *index == 9,
        Some(NumberFormat::Custom(code)) => code == "0%",
        None => false,
    };
    percent && style.font.bold
}

fn sheet_part(bytes: &[u8]) -> String {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut xml = String::new();
    archive
        .by_name("xl/worksheets/sheet1.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();
    xml
}

#[tokio::test]
async fn test_render_keeps_template_formatting() {
    let records = vec![json!({"name": "Q3", "items": [{"v": 0.25}, {"v": 0.5}]})];
    let mut sink = MemorySink::new("report.xlsx");

    let report = engine()
        .render(
            TemplateSource::Bytes(styled_template_bytes()),
            &records,
            &mut sink,
            RenderOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(report.rows_inserted, 1);

    let bytes = sink.into_bytes().unwrap();
    let xml = sheet_part(&bytes);
    assert!(xml.contains("<cols>"));
    assert!(xml.contains(r#"<col min="1" max="1" width="40.7109375" customWidth="1"/>"#));
    assert!(xml.contains(r#"<c r="A3" s=""#));

    let output = Workbook::from_xlsx_bytes(bytes).unwrap();
    let sheet = output.worksheet_by_name("Report").unwrap();
    assert_eq!(sheet.column_width(1), Some(40.0));
    assert_eq!(text(sheet, 1, 1), Some(CellValue::from("Q3")));
    assert_eq!(text(sheet, 2, 1), Some(CellValue::Number(0.25)));
    assert_eq!(text(sheet, 3, 1), Some(CellValue::Number(0.5)));
    assert_eq!(text(sheet, 4, 1), Some(CellValue::from("Total")));

    // Template row and its copy share the styles and the height
    for row in 1..=3 {
        let style = sheet.cell_style(row, 1).and_then(|id| output.style(id)).unwrap();
        assert!(is_bold_percent(style), "row {} lost its style", row);
    }
    for row in 2..=3 {
        let border = sheet.cell_style(row, 2).and_then(|id| output.style(id)).unwrap();
        assert_eq!(border.borders.left.line, FormatBorder::Thin);
        assert_eq!(sheet.row_height(row), Some(30.0));
    }
    assert_eq!(sheet.row_height(4), None);
    assert_eq!(sheet.cell_style(4, 1), None);
}

#[tokio::test]
async fn test_render_keeps_template_pictures() {
    let mut template = rust_xlsxwriter::Workbook::new();
    let sheet = template.add_worksheet();
    sheet.write_string(0, 0, "{{@@items.name}}").unwrap();
    sheet.write_string(1, 0, "Signature").unwrap();
    let picture = rust_xlsxwriter::Image::new_from_buffer(&pixel_png()).unwrap();
    sheet.insert_image(1, 1, &picture).unwrap();
    let template = template.save_to_buffer().unwrap();

    let records = vec![json!({"items": [{"name": "a"}, {"name": "b"}]})];
    let mut sink = MemorySink::new("signed.xlsx");
    engine()
        .render(
            TemplateSource::Bytes(template),
            &records,
            &mut sink,
            RenderOptions::default(),
        )
        .await
        .unwrap();

    let output = Workbook::from_xlsx_bytes(sink.into_bytes().unwrap()).unwrap();
    let sheet = output.worksheet(0).unwrap();
    assert_eq!(output.images().len(), 1);
    assert_eq!(sheet.images().len(), 1);
    // The picture followed its row down past the inserted copy
    assert_eq!(sheet.images()[0].top_left.row, 2);
    assert_eq!(sheet.images()[0].top_left.col, 1);
    assert_eq!(text(sheet, 3, 1), Some(CellValue::from("Signature")));
}

#[tokio::test]
async fn test_render_runs_before_save_hook() {
    let mut sink = MemorySink::new("out.xlsx");
    let options = RenderOptions::default().before_save(|workbook| {
        let sheet = workbook
            .worksheet_mut(0)
            .ok_or_else(|| SheetfillError::Config("no sheet".to_string()))?;
        sheet.set_cell(10, 1, "signed");
        Ok(())
    });

    engine()
        .render(
            TemplateSource::Bytes(template_bytes()),
            &[json!({"number": 1, "items": [{"name": "a", "qty": 1}]})],
            &mut sink,
            options,
        )
        .await
        .unwrap();

    let output = Workbook::from_xlsx_bytes(sink.into_bytes().unwrap()).unwrap();
    assert_eq!(
        text(output.worksheet(0).unwrap(), 10, 1),
        Some(CellValue::from("signed"))
    );
}

#[tokio::test]
async fn test_render_hook_error_skips_delivery() {
    let mut sink = MemorySink::new("out.xlsx");
    let options = RenderOptions::default()
        .before_save(|_| Err(SheetfillError::Config("rejected".to_string())));

    let result = engine()
        .render(
            TemplateSource::Bytes(template_bytes()),
            &[json!({})],
            &mut sink,
            options,
        )
        .await;

    assert!(result.is_err());
    assert!(sink.bytes().is_none());
}

#[tokio::test]
async fn test_render_from_url_template() {
    let url = "https://templates.example.com/invoice.xlsx";
    let fetcher = Arc::new(CountingFetcher::default().with(url, template_bytes()));
    let engine = engine_with(fetcher.clone(), MergeCorrection::Retained);
    let mut sink = MemorySink::new("invoice.xlsx");

    engine
        .render(
            TemplateSource::detect(url).unwrap(),
            &[json!({"number": 7, "items": []})],
            &mut sink,
            RenderOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(fetcher.calls(), 1);
    assert!(sink.bytes().is_some());
}

#[tokio::test]
async fn test_render_to_file_sink() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filled.xlsx");
    let mut sink = sheetfill::document::FileSink::new(&path);

    engine()
        .render(
            TemplateSource::Bytes(template_bytes()),
            &[json!({"number": 3, "items": [{"name": "n", "qty": 1}]})],
            &mut sink,
            RenderOptions::default(),
        )
        .await
        .unwrap();

    let output = Workbook::open(&path).unwrap();
    assert_eq!(
        text(output.worksheet(0).unwrap(), 1, 1),
        Some(CellValue::from("Invoice 3"))
    );
}

#[test]
fn test_save_workbook_delivers_to_sink() {
    let mut workbook = Workbook::new();
    workbook.add_worksheet("S").set_cell(1, 1, "v");
    let mut sink = MemorySink::new("s.xlsx");

    sheetfill::template::save_workbook(&workbook, &mut sink).unwrap();
    assert!(sink.bytes().is_some());

    let mut other = MemorySink::new("t.xlsx");
    other.deliver(&workbook).unwrap();
    assert_eq!(other.file_name(), "t.xlsx");
}
