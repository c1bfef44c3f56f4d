//! Output delivery for rendered workbooks

use std::path::{Path, PathBuf};

use super::Workbook;
use crate::error::SheetfillResult;

/// MIME type of an .xlsx download
pub const XLSX_MIME_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Where a rendered workbook ends up
pub trait OutputSink {
    fn deliver(&mut self, workbook: &Workbook) -> SheetfillResult<()>;
}

/// Writes the workbook to a path on disk
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputSink for FileSink {
    fn deliver(&mut self, workbook: &Workbook) -> SheetfillResult<()> {
        workbook.save(&self.path)
    }
}

/// Keeps the serialized workbook in memory, ready to be handed to a client
/// as a download named `file_name`.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    file_name: String,
    bytes: Option<Vec<u8>>,
}

impl MemorySink {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: None,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        self.bytes.as_deref()
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        self.bytes
    }
}

impl OutputSink for MemorySink {
    fn deliver(&mut self, workbook: &Workbook) -> SheetfillResult<()> {
        self.bytes = Some(workbook.to_xlsx_bytes()?);
        Ok(())
    }
}
