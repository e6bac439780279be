//! Probe execution — one time-boxed subprocess attempt.
//!
//! The command runs under the resolved shell with pipe-failure propagation
//! (`-o pipefail -ec`), inheriting stdin. Stdout and stderr are captured
//! separately and interleaved into one combined buffer in chunk arrival
//! order. The outcome is classified into a single [`Entry`]; a probe
//! attempt never fails at the API level.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

use vigil_history::{Entry, ProbeKind, ProbeStatus, epoch_nanos};

/// A configured recurring probe. Immutable after construction; one
/// scheduler owns each definition.
#[derive(Debug, Clone)]
pub struct ProbeDefinition {
    pub group: String,
    pub name: String,
    pub kind: ProbeKind,
    /// Shell command to run.
    pub cmd: String,
    /// Unit label recorded on metric entries.
    pub metric_unit: String,
    /// Delay between checks.
    pub interval: Duration,
    /// Hard wall-clock deadline for one attempt.
    pub cmd_timeout: Duration,
    /// Attempts per check, minimum 1.
    pub max_retries: u32,
    /// Delay between attempts within one check.
    pub retry_interval: Duration,
}

/// Run one probe attempt and classify the outcome.
///
/// Timeouts, non-zero exits, and spawn failures become unhealthy entries.
/// A metric probe that exits zero but prints something other than a number
/// is also unhealthy: its contract includes producing a value.
pub async fn run_probe(shell: &Path, def: &ProbeDefinition) -> Entry {
    debug!(group = %def.group, name = %def.name, "checking status");
    let started = Instant::now();

    let mut entry = Entry {
        id: String::new(),
        group: def.group.clone(),
        name: def.name.clone(),
        kind: def.kind,
        output: String::new(),
        created_at: 0,
        duration_ms: 0,
        metric_value: None,
        metric_unit: def.metric_unit.clone(),
        status: ProbeStatus::Healthy,
        error: String::new(),
    };

    let mut command = Command::new(shell);
    command
        .arg("-o")
        .arg("pipefail")
        .arg("-ec")
        .arg(&def.cmd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();
    let combined = Mutex::new(Vec::new());

    match command.spawn() {
        Err(e) => {
            entry.status = ProbeStatus::Unhealthy;
            entry.error = format!("failed to run: {e}");
        }
        Ok(mut child) => {
            let stdout_pipe = child.stdout.take();
            let stderr_pipe = child.stderr.take();
            // Drain both pipes while waiting, so a chatty probe cannot
            // fill the pipe buffer and stall.
            let run = async {
                let (status, (), ()) = tokio::join!(
                    child.wait(),
                    capture(stdout_pipe, &mut stdout_buf, &combined),
                    capture(stderr_pipe, &mut stderr_buf, &combined),
                );
                status
            };

            match tokio::time::timeout(def.cmd_timeout, run).await {
                Err(_) => {
                    let _ = child.kill().await;
                    entry.status = ProbeStatus::Unhealthy;
                    entry.error = format!("timed out after {:?}", def.cmd_timeout);
                }
                Ok(Err(e)) => {
                    entry.status = ProbeStatus::Unhealthy;
                    entry.error = format!("failed to run: {e}");
                }
                Ok(Ok(status)) if !status.success() => {
                    entry.status = ProbeStatus::Unhealthy;
                    entry.error = match status.code() {
                        Some(code) => format!("process exited with status {code}"),
                        None => "process terminated by signal".to_string(),
                    };
                }
                Ok(Ok(_)) => {
                    if def.kind == ProbeKind::Metric {
                        let text = String::from_utf8_lossy(&stdout_buf);
                        match text.trim().parse::<f64>() {
                            Ok(value) => entry.metric_value = Some(value),
                            Err(e) => {
                                entry.status = ProbeStatus::Unhealthy;
                                entry.error =
                                    format!("failed to parse metric from output: {e}");
                            }
                        }
                    }
                }
            }
        }
    }

    entry.output = String::from_utf8_lossy(&combined.into_inner()).into_owned();
    entry.created_at = epoch_nanos();
    entry.duration_ms = started.elapsed().as_millis() as u64;

    info!(entry = %entry, "check completed");
    entry
}

/// Copy a pipe into its own buffer and the shared combined buffer.
async fn capture<R: AsyncRead + Unpin>(
    reader: Option<R>,
    own: &mut Vec<u8>,
    combined: &Mutex<Vec<u8>>,
) {
    let Some(mut reader) = reader else { return };
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                own.extend_from_slice(&chunk[..n]);
                combined.lock().await.extend_from_slice(&chunk[..n]);
            }
        }
    }
}
