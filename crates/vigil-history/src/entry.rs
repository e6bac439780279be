//! Entry model — one recorded probe observation.
//!
//! Identity keys drive upsert semantics: boolean probes collapse to one
//! retained entry per UTC day (replace), metric probes key on their
//! nanosecond timestamp (append, forming a rolling series).

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

const NANOS_PER_DAY: u64 = 24 * 60 * 60 * 1_000_000_000;

/// What a probe measures: a pass/fail check or a numeric sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    #[default]
    Boolean,
    Metric,
}

/// Classified outcome of a probe run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Healthy,
    Unhealthy,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Unhealthy => f.write_str("unhealthy"),
        }
    }
}

/// One probe observation, as stored in the index and the durable log.
///
/// `id` is derived by the store on commit, never supplied by callers.
/// The `error` field is non-empty only for unhealthy entries by convention;
/// the store does not enforce the coupling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Derived identity, unique within the group (see [`Entry::day_bucket`]).
    #[serde(default)]
    pub id: String,
    pub group: String,
    pub name: String,
    pub kind: ProbeKind,
    /// Combined stdout+stderr capture, lossy UTF-8.
    pub output: String,
    /// Completion time, nanoseconds since the Unix epoch (UTC).
    pub created_at: u64,
    /// Wall-clock run time in milliseconds.
    pub duration_ms: u64,
    /// Parsed sample value, present only for metric entries.
    #[serde(default)]
    pub metric_value: Option<f64>,
    #[serde(default)]
    pub metric_unit: String,
    pub status: ProbeStatus,
    /// Diagnostic text, empty when healthy.
    #[serde(default)]
    pub error: String,
}

impl Entry {
    /// UTC day index of `created_at`, used as the boolean identity bucket.
    pub fn day_bucket(&self) -> u64 {
        self.created_at / NANOS_PER_DAY
    }

    /// Identity for a boolean entry: one slot per probe per UTC day.
    pub fn boolean_id(&self) -> String {
        format!("{}|{}|{}|0", self.group, self.name, self.day_bucket())
    }

    /// Identity prefix for a metric entry; the store appends a collision
    /// sequence number to make it unique.
    pub fn metric_id_prefix(&self) -> String {
        format!("{}|{}|{}|", self.group, self.name, self.created_at)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Entry{{")?;
        writeln!(f, "\tgroup: {},", self.group)?;
        writeln!(f, "\tname: {},", self.name)?;
        writeln!(f, "\tkind: {:?},", self.kind)?;
        writeln!(f, "\toutput: '{}',", self.output.replace('\n', "\\n"))?;
        writeln!(f, "\tcreated_at: {},", self.created_at)?;
        if let Some(value) = self.metric_value {
            writeln!(f, "\tmetric: {}{},", value, self.metric_unit)?;
        }
        writeln!(f, "\tstatus: {},", self.status)?;
        writeln!(f, "\terror: '{}',", self.error)?;
        write!(f, "}}")
    }
}

/// Current time as nanoseconds since the Unix epoch.
pub fn epoch_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: ProbeKind, created_at: u64) -> Entry {
        Entry {
            id: String::new(),
            group: "web".to_string(),
            name: "uptime".to_string(),
            kind,
            output: "ok\n".to_string(),
            created_at,
            duration_ms: 12,
            metric_value: None,
            metric_unit: String::new(),
            status: ProbeStatus::Healthy,
            error: String::new(),
        }
    }

    #[test]
    fn boolean_ids_collide_within_a_day() {
        let morning = sample(ProbeKind::Boolean, 3 * NANOS_PER_DAY + 1);
        let evening = sample(ProbeKind::Boolean, 4 * NANOS_PER_DAY - 1);
        assert_eq!(morning.boolean_id(), evening.boolean_id());
    }

    #[test]
    fn boolean_ids_differ_across_days() {
        let today = sample(ProbeKind::Boolean, 3 * NANOS_PER_DAY);
        let yesterday = sample(ProbeKind::Boolean, 3 * NANOS_PER_DAY - 1);
        assert_ne!(today.boolean_id(), yesterday.boolean_id());
    }

    #[test]
    fn metric_prefix_includes_nanos() {
        let entry = sample(ProbeKind::Metric, 1234);
        assert_eq!(entry.metric_id_prefix(), "web|uptime|1234|");
    }

    #[test]
    fn entry_round_trips_through_json() {
        let mut entry = sample(ProbeKind::Metric, 42);
        entry.metric_value = Some(99.5);
        entry.metric_unit = "ms".to_string();
        let line = serde_json::to_string(&entry).unwrap();
        let back: Entry = serde_json::from_str(&line).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn display_escapes_newlines_in_output() {
        let mut entry = sample(ProbeKind::Boolean, 42);
        entry.output = "line one\nline two".to_string();
        let rendered = entry.to_string();
        assert!(rendered.contains("line one\\nline two"));
    }
}
