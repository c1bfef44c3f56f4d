use crate::document::{FileSink, TemplateSource};
use crate::error::{SheetfillError, SheetfillResult};
use crate::template::{placeholder_range, FillReport, RenderOptions, TemplateEngine};
use crate::types::{EngineConfig, MergeCorrection, RenderRecord};
use colored::Colorize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Arguments of the render command
#[derive(Debug, Clone, Default)]
pub struct RenderCommand {
    pub template: String,
    pub data: PathBuf,
    pub output: PathBuf,
    pub parse_image: bool,
    pub merge_correction: Option<MergeCorrection>,
    pub timeout_secs: Option<u64>,
    pub config: Option<PathBuf>,
    pub verbose: bool,
}

impl RenderCommand {
    /// Config file values with command-line flags applied on top
    fn effective_config(&self) -> SheetfillResult<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };
        if self.parse_image {
            config.parse_image = true;
        }
        if let Some(correction) = self.merge_correction {
            config.merge_correction = correction;
        }
        if let Some(secs) = self.timeout_secs {
            if secs == 0 {
                return Err(SheetfillError::Config(
                    "--timeout must be greater than zero".to_string(),
                ));
            }
            config.fetch_timeout_secs = secs;
        }
        Ok(config)
    }
}

/// Read render records from a YAML or JSON file.
///
/// A top-level sequence is the record list; a single mapping is the record of
/// the first sheet.
pub fn load_records(path: &Path) -> SheetfillResult<Vec<RenderRecord>> {
    let content = std::fs::read_to_string(path)?;
    let data: Value = serde_yaml::from_str(&content)?;
    match data {
        Value::Array(records) => Ok(records),
        Value::Object(_) => Ok(vec![data]),
        Value::Null => Ok(Vec::new()),
        other => Err(SheetfillError::UnsupportedInput(format!(
            "{}: expected a list of records or a single record, found {}",
            path.display(),
            kind_of(&other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

/// Execute the render command
pub async fn render(command: RenderCommand) -> SheetfillResult<()> {
    println!("{}", "📄 Sheetfill - Rendering template".bold().green());
    println!("   Template: {}", command.template);
    println!("   Data:     {}", command.data.display());
    println!();

    let config = command.effective_config()?;
    let records = load_records(&command.data)?;

    if command.verbose {
        println!(
            "   {} record(s), merge correction: {:?}, images: {}",
            records.len(),
            config.merge_correction,
            if config.parse_image { "on" } else { "off" }
        );
        println!();
    }

    let engine = TemplateEngine::builder()
        .merge_correction(config.merge_correction)
        .fetch_timeout(Duration::from_secs(config.fetch_timeout_secs))
        .build()?;

    let source = TemplateSource::detect(&command.template)?;
    let mut sink = FileSink::new(&command.output);
    let options = RenderOptions {
        parse_image: config.parse_image,
        before_save: None,
    };
    let report = engine.render(source, &records, &mut sink, options).await?;

    print_report(&report, command.verbose);
    println!(
        "{}",
        format!("✅ Written to {}", command.output.display())
            .bold()
            .green()
    );
    Ok(())
}

fn print_report(report: &FillReport, verbose: bool) {
    println!("{}", "📊 Fill summary:".bold());
    println!("   Sheets filled:  {}", report.sheets_filled);
    println!("   Blocks:         {}", report.blocks_expanded);
    println!("   Rows inserted:  {}", report.rows_inserted);
    if verbose || report.merges.failed > 0 {
        println!(
            "   Merges:         {} applied, {} failed",
            report.merges.applied, report.merges.failed
        );
    }
    if verbose || report.images.anchored > 0 || report.images.invalid > 0 {
        println!(
            "   Images:         {} anchored, {} invalid",
            report.images.anchored, report.images.invalid
        );
    }
    if report.merges.failed > 0 || report.images.invalid > 0 {
        println!(
            "{}",
            "⚠️  Some merges or images were skipped (see log output)".yellow()
        );
    }
    println!();
}

/// Arguments of the locate command
#[derive(Debug, Clone)]
pub struct LocateCommand {
    pub template: String,
    pub marker: Option<String>,
    /// 1-based sheet position
    pub sheet: usize,
    pub keep: bool,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// Execute the locate command
pub async fn locate(command: LocateCommand) -> SheetfillResult<()> {
    if command.sheet == 0 {
        return Err(SheetfillError::Config(
            "--sheet is 1-based and must be at least 1".to_string(),
        ));
    }
    let config = match &command.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let marker = command.marker.unwrap_or(config.range_marker);

    let engine = TemplateEngine::builder()
        .fetch_timeout(Duration::from_secs(config.fetch_timeout_secs))
        .build()?;
    let mut workbook = engine.load(TemplateSource::detect(&command.template)?).await?;
    let sheet_count = workbook.worksheets().len();

    let worksheet = workbook.worksheet_mut(command.sheet - 1).ok_or_else(|| {
        SheetfillError::UnsupportedInput(format!(
            "Sheet {} does not exist (workbook has {})",
            command.sheet, sheet_count
        ))
    })?;
    let sheet_name = worksheet.name().to_string();

    match placeholder_range(worksheet, &marker, !command.keep) {
        Some(range) => {
            println!(
                "{} {} {}",
                sheet_name.bright_blue().bold(),
                marker.cyan(),
                range.to_string().bold()
            );
        }
        None => {
            println!(
                "{}",
                format!("❌ Marker {} not found on sheet {}", marker, sheet_name).red()
            );
            return Err(SheetfillError::UnsupportedInput(format!(
                "Marker '{}' not found",
                marker
            )));
        }
    }

    if let Some(path) = command.output {
        workbook.save(&path)?;
        println!(
            "{}",
            format!("✅ Written to {}", path.display()).green()
        );
    }
    Ok(())
}
