//! Merges discovery-time statistics with later refreshes into one fact table.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::debug;
use vstat_core::{CohortRecord, RefreshRecord};

use crate::normalize::{parse_cohort_date, NormalizeError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub rows: Vec<RefreshRecord>,
    pub replaced: usize,
}

pub fn day_zero_rows(cohort: &[CohortRecord]) -> Result<Vec<RefreshRecord>, NormalizeError> {
    cohort
        .iter()
        .map(|record| {
            let discovered = parse_cohort_date(record)?;
            Ok(RefreshRecord::day_zero(record.id.clone(), discovered, record.initial))
        })
        .collect()
}

/// Day-zero rows followed by refresh rows, deduplicated on
/// (id, collection date). A later row replaces an earlier one in place, so a
/// same-day re-measurement wins over the discovery snapshot.
pub fn reconcile(day_zero: Vec<RefreshRecord>, refreshes: Vec<RefreshRecord>) -> Reconciled {
    let mut rows: Vec<RefreshRecord> = Vec::with_capacity(day_zero.len() + refreshes.len());
    let mut positions: HashMap<(String, NaiveDate), usize> = HashMap::with_capacity(rows.capacity());
    let mut replaced = 0;

    for row in day_zero.into_iter().chain(refreshes) {
        let key = (row.id.clone(), row.collection_date);
        match positions.get(&key) {
            Some(&at) => {
                rows[at] = row;
                replaced += 1;
            }
            None => {
                positions.insert(key, rows.len());
                rows.push(row);
            }
        }
    }

    if replaced > 0 {
        debug!(replaced, "collapsed duplicate stats rows");
    }
    Reconciled { rows, replaced }
}
