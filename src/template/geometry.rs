//! Merged-range bookkeeping across row expansion
//!
//! Duplicated rows never inherit merges, so the merges of every expanded
//! template row have to be re-created on its copies. Merges are computed per
//! sheet from a snapshot taken before expansion and applied only after every
//! sheet of the fill has been expanded.

use std::collections::BTreeMap;

use tracing::warn;

use super::expansion::BlockExpansion;
use crate::document::Workbook;
use crate::types::{DynamicMerge, MergeCorrection, MergedRange};

/// Outcome of applying pending merges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub applied: usize,
    pub failed: usize,
}

/// Collects dynamic merges per sheet id until they can be applied
#[derive(Debug, Clone, Default)]
pub struct MergeTracker {
    correction: MergeCorrection,
    pending: BTreeMap<u32, Vec<DynamicMerge>>,
}

impl MergeTracker {
    pub fn new(correction: MergeCorrection) -> Self {
        Self {
            correction,
            pending: BTreeMap::new(),
        }
    }

    /// Plan the merges for one expanded sheet
    pub fn plan_sheet(
        &mut self,
        sheet_id: u32,
        snapshot: &[MergedRange],
        expansions: &[BlockExpansion],
    ) {
        let merges = plan_dynamic_merges(snapshot, expansions, self.correction);
        if !merges.is_empty() {
            self.pending.entry(sheet_id).or_default().extend(merges);
        }
    }

    pub fn pending(&self) -> &BTreeMap<u32, Vec<DynamicMerge>> {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply and drain every pending merge. A merge that conflicts with the
    /// sheet's geometry is logged and skipped; the rest are still applied.
    pub fn apply(&mut self, workbook: &mut Workbook) -> MergeReport {
        let mut report = MergeReport::default();

        for (sheet_id, merges) in std::mem::take(&mut self.pending) {
            let Some(sheet) = workbook.worksheet_by_id_mut(sheet_id) else {
                warn!(sheet_id, "Sheet disappeared before merges could be applied");
                report.failed += merges.len();
                continue;
            };
            for merge in merges {
                match sheet.merge_cells(merge) {
                    Ok(()) => report.applied += 1,
                    Err(e) => {
                        warn!(sheet = sheet.name(), "Fail to merge cells {}: {}", merge, e);
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }
}

/// Merges to create after the given expansions of one sheet.
///
/// For every block that gained rows, each snapshot merge covering its template
/// row is repeated on the inserted rows (and on the template row itself when
/// the correction says the backend dropped it). Under
/// [`MergeCorrection::Invalidated`] every other merge below a block is also
/// re-created at its shifted position.
pub fn plan_dynamic_merges(
    snapshot: &[MergedRange],
    expansions: &[BlockExpansion],
    correction: MergeCorrection,
) -> Vec<DynamicMerge> {
    let mut merges = Vec::new();

    for (index, expansion) in expansions.iter().enumerate() {
        if expansion.length <= 1 {
            continue;
        }
        let covering: Vec<&MergedRange> = snapshot
            .iter()
            .filter(|m| m.contains_row(expansion.start_row))
            .collect();
        if covering.is_empty() {
            continue;
        }

        let first = correction.first_fixed_index(index) as u32;
        for i in first..expansion.length {
            for merge in &covering {
                merges.push(merge.shifted_down(i + expansion.offset));
            }
        }
    }

    if correction.restores_trailing() {
        let template_rows: Vec<u32> = expansions.iter().map(|e| e.start_row).collect();
        for merge in snapshot {
            if template_rows.contains(&merge.start.row) {
                continue;
            }
            let shift: u32 = expansions
                .iter()
                .filter(|e| merge.start.row > e.start_row)
                .map(BlockExpansion::inserted_rows)
                .sum();
            if shift != 0 {
                merges.push(merge.shifted_down(shift));
            }
        }
    }

    merges
}
