//! Per-group in-memory index.
//!
//! Each group owns an identity-keyed map of entries plus a separately
//! maintained vector of identities ordered by `created_at` descending
//! (newest first). Insertion scans from the head; submissions arrive in
//! near-monotonic time order, so the expected position is at or near the
//! front. Eviction drops from the tail (oldest) once the group exceeds its
//! size bound.

use std::collections::HashMap;

use tracing::debug;

use crate::entry::{Entry, ProbeKind};

/// Identity map + newest-first ordered sequence for one group.
#[derive(Debug, Default)]
pub struct GroupIndex {
    entries: HashMap<String, Entry>,
    /// Identities ordered by `created_at` descending.
    order: Vec<String>,
}

impl GroupIndex {
    /// Insert or replace an entry, deriving its identity.
    ///
    /// Boolean entries key on their UTC day bucket, so a same-day
    /// resubmission overwrites in place without moving in the sequence.
    /// Metric entries key on their nanosecond timestamp (plus a collision
    /// sequence number), so each submission is a fresh insert. After a
    /// fresh insert the tail is dropped until the group fits `max_entries`.
    ///
    /// Returns the finalized entry with its derived identity.
    pub fn upsert(&mut self, mut entry: Entry, max_entries: usize) -> Entry {
        entry.id = match entry.kind {
            ProbeKind::Boolean => entry.boolean_id(),
            ProbeKind::Metric => {
                let prefix = entry.metric_id_prefix();
                let mut seq = 0u64;
                loop {
                    let candidate = format!("{prefix}{seq}");
                    if !self.entries.contains_key(&candidate) {
                        break candidate;
                    }
                    seq += 1;
                }
            }
        };

        if self.entries.contains_key(&entry.id) {
            debug!(id = %entry.id, "replacing entry");
            self.entries.insert(entry.id.clone(), entry.clone());
            return entry;
        }

        debug!(id = %entry.id, size = self.entries.len(), "inserting entry");
        // First position whose entry is strictly older goes after us;
        // equal timestamps sort the new entry first.
        let position = self
            .order
            .iter()
            .position(|id| entry.created_at >= self.entries[id].created_at)
            .unwrap_or(self.order.len());
        self.order.insert(position, entry.id.clone());
        self.entries.insert(entry.id.clone(), entry.clone());

        while self.entries.len() > max_entries {
            if let Some(oldest) = self.order.pop() {
                debug!(id = %oldest, "dropping old entry");
                self.entries.remove(&oldest);
            }
        }

        entry
    }

    /// Entries in newest-first order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.order.iter().map(|id| &self.entries[id])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ProbeStatus;

    const DAY: u64 = 24 * 60 * 60 * 1_000_000_000;

    fn entry(kind: ProbeKind, name: &str, created_at: u64) -> Entry {
        Entry {
            id: String::new(),
            group: "web".to_string(),
            name: name.to_string(),
            kind,
            output: String::new(),
            created_at,
            duration_ms: 1,
            metric_value: None,
            metric_unit: String::new(),
            status: ProbeStatus::Healthy,
            error: String::new(),
        }
    }

    #[test]
    fn boolean_same_day_replaces() {
        let mut index = GroupIndex::default();
        let first = index.upsert(entry(ProbeKind::Boolean, "up", DAY + 100), 10);
        let second = index.upsert(entry(ProbeKind::Boolean, "up", DAY + 200), 10);

        assert_eq!(first.id, second.id);
        assert_eq!(index.len(), 1);
        assert_eq!(index.iter().next().unwrap().created_at, DAY + 200);
    }

    #[test]
    fn boolean_next_day_appends() {
        let mut index = GroupIndex::default();
        index.upsert(entry(ProbeKind::Boolean, "up", DAY), 10);
        index.upsert(entry(ProbeKind::Boolean, "up", 2 * DAY), 10);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn metric_entries_accumulate() {
        let mut index = GroupIndex::default();
        for t in [100, 200, 300] {
            index.upsert(entry(ProbeKind::Metric, "latency", t), 10);
        }
        assert_eq!(index.len(), 3);
        let times: Vec<u64> = index.iter().map(|e| e.created_at).collect();
        assert_eq!(times, vec![300, 200, 100]);
    }

    #[test]
    fn metric_same_nanosecond_gets_sequence_suffix() {
        let mut index = GroupIndex::default();
        let a = index.upsert(entry(ProbeKind::Metric, "latency", 500), 10);
        let b = index.upsert(entry(ProbeKind::Metric, "latency", 500), 10);

        assert_ne!(a.id, b.id);
        assert!(a.id.ends_with("|0"));
        assert!(b.id.ends_with("|1"));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn out_of_order_insert_lands_by_timestamp() {
        let mut index = GroupIndex::default();
        index.upsert(entry(ProbeKind::Metric, "latency", 300), 10);
        index.upsert(entry(ProbeKind::Metric, "latency", 100), 10);
        index.upsert(entry(ProbeKind::Metric, "latency", 200), 10);

        let times: Vec<u64> = index.iter().map(|e| e.created_at).collect();
        assert_eq!(times, vec![300, 200, 100]);
    }

    #[test]
    fn equal_timestamps_sort_newest_submission_first() {
        let mut index = GroupIndex::default();
        let first = index.upsert(entry(ProbeKind::Metric, "a", 500), 10);
        let second = index.upsert(entry(ProbeKind::Metric, "b", 500), 10);

        let ids: Vec<&str> = index.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
    }

    #[test]
    fn eviction_keeps_most_recent() {
        let mut index = GroupIndex::default();
        for t in 1..=7u64 {
            index.upsert(entry(ProbeKind::Metric, "latency", t * 100), 5);
        }
        assert_eq!(index.len(), 5);
        let times: Vec<u64> = index.iter().map(|e| e.created_at).collect();
        assert_eq!(times, vec![700, 600, 500, 400, 300]);
    }

    #[test]
    fn replace_does_not_trigger_eviction() {
        let mut index = GroupIndex::default();
        index.upsert(entry(ProbeKind::Metric, "latency", 100), 2);
        index.upsert(entry(ProbeKind::Boolean, "up", DAY + 100), 2);
        // Same-day boolean replace; still two entries retained.
        index.upsert(entry(ProbeKind::Boolean, "up", DAY + 200), 2);
        assert_eq!(index.len(), 2);
    }
}
