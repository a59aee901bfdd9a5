use chrono::NaiveDate;
use vstat_core::RefreshRecord;

/// Concatenates refresh records across partitions in processing order.
#[derive(Debug, Default)]
pub struct RefreshAggregator {
    records: Vec<RefreshRecord>,
    cohorts: Vec<NaiveDate>,
}

/// The records of one refresh run, never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshBatch {
    pub records: Vec<RefreshRecord>,
    pub cohorts: Vec<NaiveDate>,
}

impl RefreshAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_partition(&mut self, cohort_date: NaiveDate, records: Vec<RefreshRecord>) {
        if records.is_empty() {
            return;
        }
        self.cohorts.push(cohort_date);
        self.records.extend(records);
    }

    /// `None` means the run produced nothing and nothing should be written.
    pub fn finish(self) -> Option<RefreshBatch> {
        if self.records.is_empty() {
            return None;
        }
        Some(RefreshBatch {
            records: self.records,
            cohorts: self.cohorts,
        })
    }
}
