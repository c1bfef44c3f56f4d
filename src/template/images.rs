//! Image references in cell text
//!
//! After substitution a cell may hold an image reference: an `http(s)://` URL
//! or an inline `data:image/<png|jpeg|gif>;base64,...` payload. Each distinct
//! reference is resolved at most once per run, anchored over the cell (or its
//! whole merge when the cell anchors one) and removed from the cell text.

use std::collections::{HashMap, HashSet};

use base64::Engine as _;
use regex::Regex;
use tracing::{debug, warn};

use crate::document::{CellValue, ImageAnchor, ImageId, Workbook};
use crate::error::{SheetfillError, SheetfillResult};
use crate::fetch::ResourceFetcher;
use crate::types::CellRange;

/// Counters for one resolver pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageReport {
    /// Images anchored to cells
    pub anchored: usize,
    /// Distinct references that were fetched or decoded successfully
    pub resolved: usize,
    /// Distinct references that failed and were skipped
    pub invalid: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReferenceKind {
    Url,
    Inline,
}

/// An image reference located in cell text
#[derive(Debug, Clone, PartialEq, Eq)]
struct Reference {
    kind: ReferenceKind,
    literal: String,
    start: usize,
    end: usize,
}

pub struct ImageResolver<'f> {
    fetcher: &'f dyn ResourceFetcher,
    url: Regex,
    inline: Regex,
    resolved: HashMap<String, ImageId>,
    invalid: HashSet<String>,
}

impl<'f> ImageResolver<'f> {
    pub fn new(fetcher: &'f dyn ResourceFetcher) -> SheetfillResult<Self> {
        let url = Regex::new(r"(?i)https?://\S+")
            .map_err(|e| SheetfillError::Config(format!("Regex error: {}", e)))?;
        let inline = Regex::new(r"(?i)data:image/(?:jpeg|gif|png);base64,(\S+)")
            .map_err(|e| SheetfillError::Config(format!("Regex error: {}", e)))?;
        Ok(Self {
            fetcher,
            url,
            inline,
            resolved: HashMap::new(),
            invalid: HashSet::new(),
        })
    }

    /// Find the reference a cell's text carries; URLs take precedence
    fn find_reference(&self, text: &str) -> Option<Reference> {
        if let Some(m) = self.url.find(text) {
            return Some(Reference {
                kind: ReferenceKind::Url,
                literal: m.as_str().to_string(),
                start: m.start(),
                end: m.end(),
            });
        }
        self.inline.find(text).map(|m| Reference {
            kind: ReferenceKind::Inline,
            literal: m.as_str().to_string(),
            start: m.start(),
            end: m.end(),
        })
    }

    /// Visit every string cell of every sheet in order, resolving references
    /// one at a time.
    pub async fn resolve(&mut self, workbook: &mut Workbook) -> ImageReport {
        let mut report = ImageReport::default();

        for sheet_index in 0..workbook.worksheets().len() {
            let candidates: Vec<(u32, u32, Reference)> = match workbook.worksheet(sheet_index) {
                Some(sheet) => sheet
                    .rows()
                    .flat_map(|(row_number, row)| {
                        row.cells()
                            .filter_map(|(col, value)| value.as_str().map(|text| (col, text)))
                            .filter_map(|(col, text)| {
                                self.find_reference(text)
                                    .map(|reference| (row_number, col, reference))
                            })
                            .collect::<Vec<_>>()
                    })
                    .collect(),
                None => continue,
            };

            for (row, col, reference) in candidates {
                if self.invalid.contains(&reference.literal) {
                    continue;
                }
                let image = match self.resolved.get(&reference.literal) {
                    Some(id) => *id,
                    None => match self.load(workbook, &reference).await {
                        Ok(id) => {
                            debug!(reference = %abbreviate(&reference.literal), "Resolved image");
                            self.resolved.insert(reference.literal.clone(), id);
                            report.resolved += 1;
                            id
                        }
                        Err(e) => {
                            warn!("Fail to load image {}: {}", abbreviate(&reference.literal), e);
                            self.invalid.insert(reference.literal.clone());
                            report.invalid += 1;
                            continue;
                        }
                    },
                };

                let Some(sheet) = workbook.worksheet_mut(sheet_index) else {
                    continue;
                };
                let target = sheet
                    .merge_anchored_at(row, col)
                    .unwrap_or_else(|| CellRange::single(row, col));
                sheet.add_image(ImageAnchor::covering(image, &target));

                if let Some(CellValue::String(text)) = sheet.cell_mut(row, col) {
                    text.replace_range(reference.start..reference.end, "");
                }
                report.anchored += 1;
            }
        }

        report
    }

    async fn load(&self, workbook: &mut Workbook, reference: &Reference) -> SheetfillResult<ImageId> {
        let bytes = match reference.kind {
            ReferenceKind::Url => self.fetcher.fetch(&reference.literal).await?,
            ReferenceKind::Inline => decode_inline(&reference.literal)?,
        };
        workbook.add_image(bytes)
    }
}

/// Decode the payload of a `data:image/...;base64,` reference
fn decode_inline(literal: &str) -> SheetfillResult<Vec<u8>> {
    let payload = literal
        .split_once(',')
        .map(|(_, payload)| payload)
        .ok_or_else(|| SheetfillError::Image("Missing base64 payload".to_string()))?;
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| SheetfillError::Image(format!("Invalid base64 payload: {}", e)))
}

/// Inline payloads can be huge; keep log lines short
fn abbreviate(literal: &str) -> String {
    const MAX: usize = 64;
    if literal.chars().count() <= MAX {
        literal.to_string()
    } else {
        let head: String = literal.chars().take(MAX).collect();
        format!("{}...", head)
    }
}
