//! Backward scan over the retention window for materialized cohort partitions.

use chrono::NaiveDate;
use tracing::{debug, info};
use vstat_core::RetentionWindow;
use vstat_storage::{PartitionLayout, PartitionStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedPartition {
    pub cohort_date: NaiveDate,
    pub key: String,
}

/// Walks the candidate dates newest first and stops at the first date the
/// probe reports as absent. Nothing older than a gap is ever probed.
///
/// The probe answers `Ok(Some(key))` for a present partition, `Ok(None)` for
/// an absent one, and `Err` when the store itself cannot be reached.
pub fn locate_partitions<E, F>(
    anchor: NaiveDate,
    window: &RetentionWindow,
    mut probe: F,
) -> Result<Vec<LocatedPartition>, E>
where
    F: FnMut(NaiveDate) -> Result<Option<String>, E>,
{
    window
        .candidate_dates(anchor)
        .into_iter()
        .map(|cohort_date| {
            probe(cohort_date).map(|found| found.map(|key| LocatedPartition { cohort_date, key }))
        })
        .map_while(Result::transpose)
        .collect()
}

pub fn locate_in_store(
    store: &dyn PartitionStore,
    layout: &PartitionLayout,
    anchor: NaiveDate,
    window: &RetentionWindow,
) -> Result<Vec<LocatedPartition>, StoreError> {
    let located = locate_partitions::<StoreError, _>(anchor, window, |date| {
        let prefix = layout.partition_prefix(date);
        let first = store.list(&prefix)?.into_iter().next();
        if first.is_none() {
            debug!(%date, prefix = %prefix, "no partition; stopping scan");
        }
        Ok(first)
    })?;

    if located.is_empty() {
        info!(%anchor, dataset = layout.dataset(), "no cohort partitions inside the retention window");
    } else {
        info!(%anchor, partitions = located.len(), "located cohort partitions");
    }
    Ok(located)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use vstat_storage::MemoryPartitionStore;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn gap_stops_scan_and_skips_older_probes() {
        let anchor = date(2024, 1, 14);
        let present = [date(2024, 1, 13), date(2024, 1, 12), date(2024, 1, 10), date(2024, 1, 9)];
        let probed = RefCell::new(Vec::new());

        let located = locate_partitions::<(), _>(anchor, &RetentionWindow::default(), |d| {
            probed.borrow_mut().push(d);
            Ok(present.contains(&d).then(|| format!("key-{d}")))
        })
        .unwrap();

        assert_eq!(
            located.iter().map(|p| p.cohort_date).collect::<Vec<_>>(),
            vec![date(2024, 1, 13), date(2024, 1, 12)]
        );
        assert_eq!(located[0].key, "key-2024-01-13");
        // 2024-01-11 is the gap; 01-10 and 01-09 exist but are never probed.
        assert_eq!(probed.into_inner(), vec![date(2024, 1, 13), date(2024, 1, 12), date(2024, 1, 11)]);
    }

    #[test]
    fn missing_newest_candidate_yields_nothing() {
        let located =
            locate_partitions::<(), _>(date(2024, 1, 14), &RetentionWindow::default(), |_| Ok(None)).unwrap();
        assert!(located.is_empty());
    }

    #[test]
    fn probe_errors_propagate() {
        let err = locate_partitions(date(2024, 1, 14), &RetentionWindow::default(), |_| {
            Err::<Option<String>, _>("store unreachable")
        })
        .unwrap_err();
        assert_eq!(err, "store unreachable");
    }

    #[test]
    fn offset_shifts_newest_candidate() {
        let window = RetentionWindow {
            retention_days: 3,
            lookback_offset_days: 0,
        };
        let located = locate_partitions::<(), _>(date(2024, 1, 14), &window, |d| Ok(Some(d.to_string()))).unwrap();
        assert_eq!(
            located.iter().map(|p| p.cohort_date).collect::<Vec<_>>(),
            vec![date(2024, 1, 14), date(2024, 1, 13), date(2024, 1, 12)]
        );
    }

    #[test]
    fn store_probe_uses_first_key_in_partition() {
        let store = MemoryPartitionStore::new();
        let layout = PartitionLayout::raw_videos();
        let prefix = layout.partition_prefix(date(2024, 1, 13));
        store.put(&format!("{prefix}b.parquet"), b"b").unwrap();
        store.put(&format!("{prefix}a.parquet"), b"a").unwrap();

        let located = locate_in_store(&store, &layout, date(2024, 1, 14), &RetentionWindow::default()).unwrap();
        assert_eq!(
            located,
            vec![LocatedPartition {
                cohort_date: date(2024, 1, 13),
                key: format!("{prefix}a.parquet"),
            }]
        );
    }
}
