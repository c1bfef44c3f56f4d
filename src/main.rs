use clap::{Parser, Subcommand};
use sheetfill::cli::{self, LocateCommand, RenderCommand};
use sheetfill::types::MergeCorrection;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sheetfill")]
#[command(about = "Fill .xlsx templates with placeholders, iteration rows and images.")]
#[command(long_about = "Sheetfill - spreadsheet templating for .xlsx workbooks

PLACEHOLDERS:
  {{name}} / {{a.b.c}}     - Scalar value from the sheet's record
  {{@@items.member}}       - One row per element of the 'items' array
  https://... or data:image/png;base64,...
                           - Image reference (with --parse-image)

COMMANDS:
  render  - Fill a template with records and write the result
  locate  - Find the cell range holding a marker such as {{#placeholder}}

EXAMPLES:
  sheetfill render invoice.xlsx data.yaml out.xlsx
  sheetfill render https://host/t.xlsx data.json out.xlsx --parse-image
  sheetfill locate out.xlsx --marker '{{#seal}}' --output stamped.xlsx

LOGGING:
  RUST_LOG=sheetfill=debug sheetfill render ...")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Fill a template workbook and write the result.

DATA FILE (YAML or JSON):
  A list of records, one per sheet in workbook order:

  - title: Invoice
    items:
      - no: No.1
      - no: No.2
  - {}            # second sheet left untouched

  A single mapping is the record of the first sheet.

MERGE CORRECTION:
  retained     - backend keeps merges when rows are inserted (default)
  invalidated  - backend drops merges below inserted rows; they are restored

CONFIG FILE (YAML):
  fetch_timeout_secs: 30
  merge_correction: retained
  parse_image: false

  Command-line flags override values from the config file.")]
    /// Fill a template with records
    Render {
        /// Template workbook: file path or http(s) URL
        template: String,

        /// YAML/JSON file with one record per sheet
        data: PathBuf,

        /// Output .xlsx path
        output: PathBuf,

        /// Resolve image references left in cells after filling
        #[arg(long)]
        parse_image: bool,

        /// How merged ranges are corrected after row insertion
        #[arg(long)]
        merge_correction: Option<MergeCorrection>,

        /// Timeout in seconds for every URL fetch
        #[arg(long, env = "SHEETFILL_FETCH_TIMEOUT")]
        timeout: Option<u64>,

        /// Engine config file (YAML)
        #[arg(short, long, env = "SHEETFILL_CONFIG")]
        config: Option<PathBuf>,

        /// Show verbose output and debug logs
        #[arg(short, long)]
        verbose: bool,
    },

    /// Locate the cell range of a marker
    Locate {
        /// Workbook: file path or http(s) URL
        template: String,

        /// Marker text to search for [default: {{#placeholder}}]
        #[arg(short, long)]
        marker: Option<String>,

        /// Sheet position, starting at 1
        #[arg(short, long, default_value = "1")]
        sheet: usize,

        /// Leave the marker text in the cell
        #[arg(long)]
        keep: bool,

        /// Save the workbook (with the marker cleared) to this path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Engine config file (YAML); supplies range_marker
        #[arg(short, long, env = "SHEETFILL_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "sheetfill=debug" } else { "sheetfill=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            template,
            data,
            output,
            parse_image,
            merge_correction,
            timeout,
            config,
            verbose,
        } => {
            init_tracing(verbose);
            cli::render(RenderCommand {
                template,
                data,
                output,
                parse_image,
                merge_correction,
                timeout_secs: timeout,
                config,
                verbose,
            })
            .await?;
        }

        Commands::Locate {
            template,
            marker,
            sheet,
            keep,
            output,
            config,
        } => {
            init_tracing(false);
            cli::locate(LocateCommand {
                template,
                marker,
                sheet,
                keep,
                output,
                config,
            })
            .await?;
        }
    }

    Ok(())
}
