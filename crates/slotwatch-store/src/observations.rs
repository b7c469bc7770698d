//! Bounded per-target observation log.
//!
//! Each target's entries live in `observations/<target-id>.json`, newest
//! first. Appending beyond [`MAX_ENTRIES_PER_TARGET`] evicts the oldest
//! entries in the same write.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use slotwatch_detect::{RuleId, Status};
use slotwatch_persist::{JsonStore, PersistError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{LogEntry, TargetId};

/// Entries kept per target.
pub const MAX_ENTRIES_PER_TARGET: usize = 100;

/// Append-only, bounded history of observations.
#[derive(Debug)]
pub struct ObservationLog {
    dir: PathBuf,
    capacity: usize,
    // Loaded lazily from disk, newest first.
    cache: Mutex<HashMap<TargetId, VecDeque<LogEntry>>>,
}

impl ObservationLog {
    /// Opens a log rooted at `dir`. Files are read on first access.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self::with_capacity(dir, MAX_ENTRIES_PER_TARGET)
    }

    /// Opens a log that keeps at most `capacity` entries per target.
    pub fn with_capacity(dir: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            dir: dir.into(),
            capacity: capacity.max(1),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Records one observation and evicts anything beyond capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if the target's log cannot be read or written. The
    /// log is unchanged in that case.
    pub fn append(
        &self,
        target_id: TargetId,
        checked_at: DateTime<Utc>,
        status: Status,
        evidence: Vec<RuleId>,
        error: Option<String>,
    ) -> Result<LogEntry> {
        let entry = LogEntry {
            id: Uuid::new_v4(),
            target_id,
            checked_at,
            status,
            evidence,
            error,
            created_at: Utc::now(),
        };

        let mut cache = self.cache.lock();
        let mut entries = match cache.get(&target_id) {
            Some(entries) => entries.clone(),
            None => self.read(target_id)?,
        };

        entries.push_front(entry.clone());
        let evicted = entries.len().saturating_sub(self.capacity);
        entries.truncate(self.capacity);

        self.file(target_id).save(&entries)?;
        cache.insert(target_id, entries);

        debug!(
            target_id = %target_id,
            status = %status,
            evicted,
            "appended observation"
        );
        Ok(entry)
    }

    /// Returns up to `limit` entries for a target, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the target's log exists but cannot be read.
    pub fn recent(&self, target_id: TargetId, limit: usize) -> Result<Vec<LogEntry>> {
        let mut cache = self.cache.lock();
        if !cache.contains_key(&target_id) {
            let entries = self.read(target_id)?;
            cache.insert(target_id, entries);
        }

        Ok(cache
            .get(&target_id)
            .map(|entries| entries.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    /// Drops every entry of a target.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing file cannot be deleted.
    pub fn remove(&self, target_id: TargetId) -> Result<()> {
        let mut cache = self.cache.lock();
        self.file(target_id).remove()?;
        cache.remove(&target_id);
        debug!(target_id = %target_id, "removed observation log");
        Ok(())
    }

    fn file(&self, target_id: TargetId) -> JsonStore {
        JsonStore::new(&self.dir, &target_id.to_string())
    }

    /// Loads a target's entries. A file that no longer parses is dropped
    /// with a warning so the target keeps recording; IO errors propagate.
    fn read(&self, target_id: TargetId) -> Result<VecDeque<LogEntry>> {
        let file = self.file(target_id);
        let mut entries: VecDeque<LogEntry> = match file.try_load() {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e @ PersistError::Json { .. }) => {
                warn!(
                    target_id = %target_id,
                    path = %file.path().display(),
                    error = %e,
                    "observation log is corrupt, starting a new one"
                );
                VecDeque::new()
            }
            Err(e) => return Err(e.into()),
        };
        entries.truncate(self.capacity);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn base() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn empty_target_has_no_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = ObservationLog::open(dir.path());
        assert!(log.recent(TargetId::new(), 10).unwrap().is_empty());
    }

    #[test]
    fn recent_is_newest_first_and_limited() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = ObservationLog::open(dir.path());
        let id = TargetId::new();

        for i in 0..5 {
            log.append(id, base() + Duration::minutes(i), Status::Closed, vec![], None)
                .unwrap();
        }

        let entries = log.recent(id, 3).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].checked_at, base() + Duration::minutes(4));
        assert_eq!(entries[2].checked_at, base() + Duration::minutes(2));
    }

    #[test]
    fn append_keeps_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = ObservationLog::open(dir.path());
        let id = TargetId::new();

        let entry = log
            .append(
                id,
                base(),
                Status::Unknown,
                vec![],
                Some("navigation timeout".to_string()),
            )
            .unwrap();
        assert_eq!(entry.target_id, id);
        assert_eq!(entry.error.as_deref(), Some("navigation timeout"));

        let opened = log
            .append(id, base(), Status::Open, vec![RuleId::A, RuleId::C], None)
            .unwrap();
        assert_eq!(opened.evidence, vec![RuleId::A, RuleId::C]);
        assert_ne!(opened.id, entry.id);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = ObservationLog::open(dir.path());
        let id = TargetId::new();

        for i in 0..101 {
            log.append(id, base() + Duration::seconds(i), Status::Closed, vec![], None)
                .unwrap();
        }

        let entries = log.recent(id, usize::MAX).unwrap();
        assert_eq!(entries.len(), MAX_ENTRIES_PER_TARGET);
        assert_eq!(entries[0].checked_at, base() + Duration::seconds(100));
        assert_eq!(
            entries.last().unwrap().checked_at,
            base() + Duration::seconds(1)
        );
    }

    #[test]
    fn targets_are_independent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = ObservationLog::open(dir.path());
        let a = TargetId::new();
        let b = TargetId::new();

        log.append(a, base(), Status::Open, vec![RuleId::B], None).unwrap();

        assert_eq!(log.recent(a, 10).unwrap().len(), 1);
        assert!(log.recent(b, 10).unwrap().is_empty());
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let id = TargetId::new();
        {
            let log = ObservationLog::open(dir.path());
            log.append(id, base(), Status::Closed, vec![], None).unwrap();
            log.append(id, base() + Duration::minutes(1), Status::Open, vec![RuleId::A], None)
                .unwrap();
        }

        let log = ObservationLog::open(dir.path());
        let entries = log.recent(id, 10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, Status::Open);
    }

    #[test]
    fn remove_drops_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = ObservationLog::open(dir.path());
        let id = TargetId::new();

        log.append(id, base(), Status::Closed, vec![], None).unwrap();
        log.remove(id).unwrap();
        assert!(log.recent(id, 10).unwrap().is_empty());

        // Removing again is fine.
        log.remove(id).unwrap();
        assert!(ObservationLog::open(dir.path()).recent(id, 10).unwrap().is_empty());
    }

    #[test]
    fn corrupt_log_is_replaced_on_next_append() {
        let dir = tempfile::tempdir().expect("tempdir");
        let id = TargetId::new();
        std::fs::write(dir.path().join(format!("{id}.json")), b"[{\"truncated").unwrap();

        let log = ObservationLog::open(dir.path());
        assert!(log.recent(id, 10).unwrap().is_empty());
        log.append(id, base(), Status::Open, vec![RuleId::A], None)
            .unwrap();

        let reopened = ObservationLog::open(dir.path());
        let entries = reopened.recent(id, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, Status::Open);
    }

    #[test]
    fn corrupt_log_does_not_block_first_append() {
        let dir = tempfile::tempdir().expect("tempdir");
        let id = TargetId::new();
        std::fs::write(dir.path().join(format!("{id}.json")), b"not json").unwrap();

        let log = ObservationLog::open(dir.path());
        log.append(id, base(), Status::Closed, vec![], None).unwrap();
        assert_eq!(log.recent(id, 10).unwrap().len(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_log_stays_bounded_and_ordered(count in 0usize..30, capacity in 1usize..10) {
            let dir = tempfile::tempdir().expect("tempdir");
            let log = ObservationLog::with_capacity(dir.path(), capacity);
            let id = TargetId::new();

            for i in 0..count {
                let offset = i64::try_from(i).unwrap();
                log.append(id, base() + Duration::seconds(offset), Status::Closed, vec![], None)
                    .unwrap();
            }

            let entries = log.recent(id, usize::MAX).unwrap();
            prop_assert_eq!(entries.len(), count.min(capacity));
            for pair in entries.windows(2) {
                prop_assert!(pair[0].checked_at > pair[1].checked_at);
            }
        }
    }
}
