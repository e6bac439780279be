//! TOML configuration for the daemon.
//!
//! Validation fails fast, before any scheduling begins. Durations are
//! strings with `ms`/`s`/`m` suffixes; bare numbers are seconds.
//!
//! ```toml
//! name = "Statuspage"
//! log_level = "info"
//!
//! [store]
//! path = "vigil.db"
//!
//! [groups.web]
//!   [[groups.web.probes]]
//!   name = "http"
//!   cmd = "curl -fsS localhost/healthz"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use vigil_history::{ProbeKind, StoreOptions};
use vigil_probe::ProbeDefinition;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_MAX_ENTRIES: usize = 100;
const DEFAULT_MAX_PENDING_WRITES: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    name: Option<String>,
    log_level: Option<String>,
    store: RawStore,
    #[serde(default)]
    groups: BTreeMap<String, RawGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStore {
    path: PathBuf,
    max_entries: Option<usize>,
    max_pending_writes: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGroup {
    #[serde(default)]
    probes: Vec<RawProbe>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProbe {
    name: Option<String>,
    cmd: Option<String>,
    kind: Option<String>,
    interval: Option<String>,
    cmd_timeout: Option<String>,
    max_retries: Option<u32>,
    retry_interval: Option<String>,
    metric_unit: Option<String>,
}

/// Log verbosity for the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    None,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    /// Directive string for the tracing `EnvFilter`.
    pub fn directive(self) -> &'static str {
        match self {
            Self::None => "off",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

/// Validated daemon configuration.
#[derive(Debug)]
pub struct Config {
    pub name: String,
    pub log_level: LogLevel,
    pub store: StoreOptions,
    pub probes: Vec<ProbeDefinition>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text)?;

        let log_level = match raw.log_level.as_deref() {
            None | Some("info") => LogLevel::Info,
            Some("none") => LogLevel::None,
            Some("debug") => LogLevel::Debug,
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "unrecognized log level: '{other}'"
                )));
            }
        };

        if raw.store.max_entries == Some(0) {
            // A zero bound would evict every entry as it is inserted
            // while appends still report success.
            return Err(ConfigError::Invalid(
                "store.max_entries must be at least 1".to_string(),
            ));
        }

        if raw.groups.is_empty() {
            return Err(ConfigError::Invalid(
                "config contains no groups".to_string(),
            ));
        }

        let mut probes = Vec::new();
        for (group, group_config) in &raw.groups {
            if group_config.probes.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "empty group '{group}' defined in config"
                )));
            }

            for (idx, probe) in group_config.probes.iter().enumerate() {
                let name = probe.name.clone().ok_or_else(|| {
                    ConfigError::Invalid(format!("probe {idx} missing name in {group}"))
                })?;
                let cmd = probe.cmd.clone().ok_or_else(|| {
                    ConfigError::Invalid(format!("probe {idx} missing cmd in {group}"))
                })?;
                let kind = match probe.kind.as_deref() {
                    None | Some("boolean") => ProbeKind::Boolean,
                    Some("metric") => ProbeKind::Metric,
                    Some(other) => {
                        return Err(ConfigError::Invalid(format!(
                            "unrecognized probe kind '{other}' in {group}"
                        )));
                    }
                };
                let metric_unit = probe.metric_unit.clone().unwrap_or_default();
                if kind == ProbeKind::Metric && metric_unit.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "metric probe '{name}' missing metric_unit in {group}"
                    )));
                }

                probes.push(ProbeDefinition {
                    group: group.clone(),
                    name,
                    kind,
                    cmd,
                    metric_unit,
                    interval: parse_field(probe.interval.as_deref(), DEFAULT_INTERVAL, group)?,
                    cmd_timeout: parse_field(
                        probe.cmd_timeout.as_deref(),
                        DEFAULT_CMD_TIMEOUT,
                        group,
                    )?,
                    max_retries: probe.max_retries.unwrap_or(1).max(1),
                    retry_interval: parse_field(
                        probe.retry_interval.as_deref(),
                        DEFAULT_RETRY_INTERVAL,
                        group,
                    )?,
                });
            }
        }

        Ok(Self {
            name: raw.name.unwrap_or_else(|| "Statuspage".to_string()),
            log_level,
            store: StoreOptions {
                path: raw.store.path,
                max_entries: raw.store.max_entries.unwrap_or(DEFAULT_MAX_ENTRIES),
                max_pending_writes: raw
                    .store
                    .max_pending_writes
                    .unwrap_or(DEFAULT_MAX_PENDING_WRITES),
            },
            probes,
        })
    }
}

fn parse_field(
    value: Option<&str>,
    default: Duration,
    group: &str,
) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(default),
        Some(s) => parse_duration(s).ok_or_else(|| {
            ConfigError::Invalid(format!("unparseable duration '{s}' in {group}"))
        }),
    }
}

/// Parse a duration string like "5s", "500ms", "1m". Bare numbers are seconds.
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[store]
path = "vigil.db"

[groups.web]
  [[groups.web.probes]]
  name = "http"
  cmd = "curl -fsS localhost/healthz"
"#;

    #[test]
    fn minimal_config_applies_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.name, "Statuspage");
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.store.max_entries, 100);
        assert_eq!(config.store.max_pending_writes, 32);

        assert_eq!(config.probes.len(), 1);
        let probe = &config.probes[0];
        assert_eq!(probe.group, "web");
        assert_eq!(probe.kind, ProbeKind::Boolean);
        assert_eq!(probe.interval, Duration::from_secs(60));
        assert_eq!(probe.cmd_timeout, Duration::from_secs(60));
        assert_eq!(probe.max_retries, 1);
        assert_eq!(probe.retry_interval, Duration::from_secs(5));
    }

    #[test]
    fn full_probe_settings_parse() {
        let config = Config::from_toml(
            r#"
name = "Ops"
log_level = "debug"

[store]
path = "/var/lib/vigil/history.db"
max_entries = 10
max_pending_writes = 4

[groups.db]
  [[groups.db.probes]]
  name = "conns"
  cmd = "psql -tAc 'select count(*) from pg_stat_activity'"
  kind = "metric"
  metric_unit = "conns"
  interval = "30s"
  cmd_timeout = "2m"
  max_retries = 3
  retry_interval = "500ms"
"#,
        )
        .unwrap();

        assert_eq!(config.name, "Ops");
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.store.max_entries, 10);

        let probe = &config.probes[0];
        assert_eq!(probe.kind, ProbeKind::Metric);
        assert_eq!(probe.metric_unit, "conns");
        assert_eq!(probe.interval, Duration::from_secs(30));
        assert_eq!(probe.cmd_timeout, Duration::from_secs(120));
        assert_eq!(probe.max_retries, 3);
        assert_eq!(probe.retry_interval, Duration::from_millis(500));
    }

    #[test]
    fn missing_groups_rejected() {
        let err = Config::from_toml("[store]\npath = \"vigil.db\"\n").unwrap_err();
        assert!(err.to_string().contains("no groups"));
    }

    #[test]
    fn empty_group_rejected() {
        let err = Config::from_toml(
            "[store]\npath = \"vigil.db\"\n\n[groups.web]\nprobes = []\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty group 'web'"));
    }

    #[test]
    fn probe_missing_cmd_rejected() {
        let err = Config::from_toml(
            r#"
[store]
path = "vigil.db"

[groups.web]
  [[groups.web.probes]]
  name = "http"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing cmd"));
    }

    #[test]
    fn metric_probe_without_unit_rejected() {
        let err = Config::from_toml(
            r#"
[store]
path = "vigil.db"

[groups.web]
  [[groups.web.probes]]
  name = "latency"
  cmd = "echo 1"
  kind = "metric"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing metric_unit"));
    }

    #[test]
    fn unknown_log_level_rejected() {
        let toml = format!("log_level = \"loud\"\n{MINIMAL}");
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("log level"));
    }

    #[test]
    fn bad_duration_rejected() {
        let err = Config::from_toml(
            r#"
[store]
path = "vigil.db"

[groups.web]
  [[groups.web.probes]]
  name = "http"
  cmd = "true"
  interval = "soon"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unparseable duration"));
    }

    #[test]
    fn parse_duration_forms() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("later"), None);
    }

    #[test]
    fn zero_max_entries_rejected() {
        let err = Config::from_toml(
            r#"
[store]
path = "vigil.db"
max_entries = 0

[groups.web]
  [[groups.web.probes]]
  name = "http"
  cmd = "true"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_entries"));
    }

    #[test]
    fn zero_max_retries_clamps_to_one() {
        let config = Config::from_toml(
            r#"
[store]
path = "vigil.db"

[groups.web]
  [[groups.web.probes]]
  name = "http"
  cmd = "true"
  max_retries = 0
"#,
        )
        .unwrap();
        assert_eq!(config.probes[0].max_retries, 1);
    }
}
