//! `ActivityLog` (spec §4.4): append, filter, paginate, and prune the unified
//! activity event log.

use chrono::{DateTime, Utc};
use mcprox_config::ActivityConfig;
use mcprox_core::model::ActivityRecord;
use mcprox_core::Result;
use mcprox_store::{containers, Store};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::filter::Filter;

#[derive(Clone)]
pub struct ActivityLog {
    store: Store,
    config: ActivityConfig,
}

impl ActivityLog {
    pub fn new(store: Store, config: ActivityConfig) -> Self {
        Self { store, config }
    }

    /// Assigns a time-ordered id and timestamp if absent, persists the
    /// record, then best-effort enforces the count-based retention target —
    /// a retention failure is logged but never fails the save itself
    /// (spec §7: "retention enforcement failures must not break ingestion").
    pub fn save(&self, mut record: ActivityRecord) -> Result<ActivityRecord> {
        if record.id.is_empty() {
            record.id = Ulid::new().to_string();
        }
        self.store
            .put(containers::ACTIVITY_RECORDS, &record.id, &record)?;

        if let Err(e) = self.prune_excess(
            self.config.retention_target_max,
            self.config.retention_safety_factor,
        ) {
            warn!(error = %e, "activity retention enforcement failed after save");
        }

        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<Option<ActivityRecord>> {
        self.store.get(containers::ACTIVITY_RECORDS, id)
    }

    /// Tolerant of missing ids (spec §4.4 `Delete`).
    pub fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(containers::ACTIVITY_RECORDS, id)
    }

    pub fn count(&self) -> Result<usize> {
        self.store.count(containers::ACTIVITY_RECORDS)
    }

    /// Newest-first, filtered, paginated listing. Returns the page alongside
    /// the total count of records matching `filter` (not the storage
    /// cardinality) so callers can render pagination controls.
    pub fn list(&self, filter: &Filter) -> Result<(Vec<ActivityRecord>, usize)> {
        let rows: Vec<(String, ActivityRecord)> =
            self.store.range_scan_rev(containers::ACTIVITY_RECORDS)?;

        let matching: Vec<ActivityRecord> = rows
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| filter.matches(record))
            .collect();

        let total = matching.len();
        let limit = filter.effective_limit(self.config.default_list_limit, self.config.max_list_limit);
        let page = matching.into_iter().skip(filter.offset).take(limit).collect();

        Ok((page, total))
    }

    /// Deletes every record with `timestamp < older_than`. Returns the
    /// number of records removed.
    pub fn prune(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let rows: Vec<(String, ActivityRecord)> =
            self.store.range_scan(containers::ACTIVITY_RECORDS)?;
        let mut removed = 0usize;
        for (id, record) in rows {
            if record.timestamp < older_than {
                self.store.delete(containers::ACTIVITY_RECORDS, &id)?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "pruned activity records older than cutoff");
        }
        Ok(removed)
    }

    /// Count-based retention: if the store holds more than `target_max`
    /// records, deletes the oldest ones down to approximately
    /// `target_max * safety_factor` (spec §4.4 `PruneExcess`), so repeated
    /// saves near the threshold don't each trigger a fresh prune pass.
    pub fn prune_excess(&self, target_max: u64, safety_factor: f64) -> Result<usize> {
        let total = self.count()? as u64;
        if total <= target_max {
            return Ok(0);
        }

        let keep = ((target_max as f64) * safety_factor).floor() as u64;
        let to_remove = total.saturating_sub(keep);
        if to_remove == 0 {
            return Ok(0);
        }

        // Ascending order is oldest-first since ids are time-ordered ULIDs.
        let rows: Vec<(String, ActivityRecord)> =
            self.store.range_scan(containers::ACTIVITY_RECORDS)?;
        let mut removed = 0usize;
        for (id, _) in rows.into_iter().take(to_remove as usize) {
            self.store.delete(containers::ACTIVITY_RECORDS, &id)?;
            removed += 1;
        }
        debug!(removed, target_max, keep, "pruned excess activity records");
        Ok(removed)
    }
}
