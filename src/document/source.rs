//! Template input sources

use std::fmt;
use std::io::Read;
use std::path::PathBuf;

use super::Workbook;
use crate::error::{SheetfillError, SheetfillResult};
use crate::fetch::ResourceFetcher;

/// Where a template workbook is read from
pub enum TemplateSource {
    Path(PathBuf),
    Url(String),
    Bytes(Vec<u8>),
    Reader(Box<dyn Read + Send>),
}

impl TemplateSource {
    /// Pick a source for a string argument: `http(s)://` is a URL, any other
    /// `scheme://` is rejected, everything else is a file path.
    pub fn detect(input: &str) -> SheetfillResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(SheetfillError::UnsupportedInput(
                "Expected a file path or URL, got an empty string".to_string(),
            ));
        }

        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(TemplateSource::Url(trimmed.to_string()));
        }
        if let Some((scheme, _)) = trimmed.split_once("://") {
            return Err(SheetfillError::UnsupportedInput(format!(
                "Unsupported URL scheme '{}'. Expected file path, http(s) URL, bytes, or reader.",
                scheme
            )));
        }
        Ok(TemplateSource::Path(PathBuf::from(trimmed)))
    }

    /// Read the source fully and parse it as a workbook
    pub async fn load(self, fetcher: &dyn ResourceFetcher) -> SheetfillResult<Workbook> {
        let bytes = match self {
            TemplateSource::Path(path) => std::fs::read(&path)?,
            TemplateSource::Url(url) => fetcher.fetch(&url).await?,
            TemplateSource::Bytes(bytes) => bytes,
            TemplateSource::Reader(mut reader) => {
                let mut buffer = Vec::new();
                reader.read_to_end(&mut buffer)?;
                buffer
            }
        };
        Workbook::from_xlsx_bytes(bytes)
    }
}

impl fmt::Debug for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            TemplateSource::Url(url) => f.debug_tuple("Url").field(url).finish(),
            TemplateSource::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            TemplateSource::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl From<PathBuf> for TemplateSource {
    fn from(path: PathBuf) -> Self {
        TemplateSource::Path(path)
    }
}

impl From<Vec<u8>> for TemplateSource {
    fn from(bytes: Vec<u8>) -> Self {
        TemplateSource::Bytes(bytes)
    }
}
