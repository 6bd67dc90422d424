use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use relay_core::event::EventBus;
use relay_core::types::ChainEvent;

use crate::store::sanitize_filename;

/// JSONL chain run logger.
///
/// Follows one chain's events on the [`EventBus`] and appends one JSON object
/// per line to `{log_dir}/{sanitized-chain}/{timestamp}.jsonl`, flushing after
/// each entry so a crash never loses earlier lines.
pub struct ChainRunLogger {
    log_dir: PathBuf,
    level: u8,
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    chain: String,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    step_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl ChainRunLogger {
    /// `level`: 1 = chain start/finish, 2 = + step results, 3 = + step starts and retries.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    /// Subscribe now and log `chain` in the background.
    ///
    /// Subscribing happens before this returns, so no event published after
    /// the call is missed. The task ends at `ChainComplete`/`ChainFailed` or
    /// on cancellation and yields the log file path if one was opened.
    pub fn spawn(
        self,
        event_bus: &EventBus,
        chain: impl Into<String>,
        cancel: CancellationToken,
    ) -> JoinHandle<Option<PathBuf>> {
        let rx = event_bus.subscribe();
        let chain = chain.into();
        tokio::spawn(async move { self.run(rx, chain, cancel).await })
    }

    async fn run(
        self,
        mut rx: Receiver<ChainEvent>,
        chain: String,
        cancel: CancellationToken,
    ) -> Option<PathBuf> {
        let chain_dir = self.log_dir.join(sanitize_filename(&chain));
        if let Err(e) = tokio::fs::create_dir_all(&chain_dir).await {
            error!(error = %e, "Failed to create log directory");
            return None;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S%.3f").to_string();
        let log_path = chain_dir.join(format!("{}.jsonl", timestamp));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return None;
            }
        };

        debug!(path = %log_path.display(), "Chain run logger started");
        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Chain run logger cancelled");
                    break;
                }
                result = rx.recv() => match result {
                    Ok(event) => event,
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "Chain run logger lagged, skipped events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            if event.chain() != chain {
                continue;
            }

            if let Some(entry) = self.event_to_entry(&event) {
                if let Ok(json) = serde_json::to_string(&entry) {
                    let line = format!("{}\n", json);
                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                        error!(error = %e, "Failed to write log entry");
                        break;
                    }
                    if let Err(e) = writer.flush().await {
                        error!(error = %e, "Failed to flush log");
                    }
                }
            }

            if event.is_terminal() {
                break;
            }
        }

        writer.flush().await.ok();
        info!(chain = %chain, path = %log_path.display(), "Chain run log written");
        Some(log_path)
    }

    /// Convert an event to a log entry, or `None` if filtered out by level.
    fn event_to_entry(&self, event: &ChainEvent) -> Option<LogEntry> {
        let (min_level, event_type, step_id, detail) = match event {
            ChainEvent::ChainStarted { total_steps, .. } => (
                1,
                "chain_started",
                None,
                Some(serde_json::json!({ "total_steps": total_steps })),
            ),
            ChainEvent::ChainComplete {
                steps_run,
                total_duration_ms,
                ..
            } => (
                1,
                "chain_complete",
                None,
                Some(serde_json::json!({
                    "steps_run": steps_run,
                    "total_duration_ms": total_duration_ms,
                })),
            ),
            ChainEvent::ChainFailed {
                error,
                total_duration_ms,
                ..
            } => (
                1,
                "chain_failed",
                None,
                Some(serde_json::json!({
                    "error": error,
                    "total_duration_ms": total_duration_ms,
                })),
            ),
            ChainEvent::StepFinished {
                step_id,
                success,
                skipped,
                duration_ms,
                error,
                ..
            } => (
                2,
                "step_finished",
                Some(step_id.clone()),
                Some(serde_json::json!({
                    "success": success,
                    "skipped": skipped,
                    "duration_ms": duration_ms,
                    "error": error,
                })),
            ),
            ChainEvent::StepStarted {
                step_id, tool_name, ..
            } => (
                3,
                "step_started",
                Some(step_id.clone()),
                Some(serde_json::json!({ "tool_name": tool_name })),
            ),
            ChainEvent::StepRetrying { step_id, error, .. } => (
                3,
                "step_retrying",
                Some(step_id.clone()),
                Some(serde_json::json!({ "error": error })),
            ),
        };

        if self.level < min_level {
            return None;
        }

        Some(LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            chain: event.chain().to_string(),
            event_type,
            step_id,
            detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::chain::{Chain, Step};
    use crate::runner::ChainRunner;
    use relay_test_utils::ScriptedExecutor;

    fn started() -> ChainEvent {
        ChainEvent::ChainStarted {
            chain: "c".into(),
            total_steps: 1,
        }
    }

    fn step_started() -> ChainEvent {
        ChainEvent::StepStarted {
            chain: "c".into(),
            step_id: "s1".into(),
            tool_name: "read".into(),
        }
    }

    fn step_finished() -> ChainEvent {
        ChainEvent::StepFinished {
            chain: "c".into(),
            step_id: "s1".into(),
            success: true,
            skipped: false,
            duration_ms: 3,
            error: None,
        }
    }

    #[test]
    fn test_event_level_filtering() {
        let l1 = ChainRunLogger::new(PathBuf::from("/tmp"), 1);
        assert!(l1.event_to_entry(&started()).is_some());
        assert!(l1.event_to_entry(&step_finished()).is_none());
        assert!(l1.event_to_entry(&step_started()).is_none());

        let l2 = ChainRunLogger::new(PathBuf::from("/tmp"), 2);
        assert!(l2.event_to_entry(&step_finished()).is_some());
        assert!(l2.event_to_entry(&step_started()).is_none());

        let l3 = ChainRunLogger::new(PathBuf::from("/tmp"), 3);
        assert!(l3.event_to_entry(&step_started()).is_some());
    }

    #[test]
    fn test_entry_serialization() {
        let logger = ChainRunLogger::new(PathBuf::from("/tmp"), 2);
        let entry = logger.event_to_entry(&step_finished()).unwrap();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["event_type"], "step_finished");
        assert_eq!(json["step_id"], "s1");
        assert_eq!(json["detail"]["duration_ms"], 3);

        let entry = logger.event_to_entry(&started()).unwrap();
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("step_id").is_none());
    }

    #[tokio::test]
    async fn test_logs_a_chain_run() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(EventBus::default());
        let exec = Arc::new(ScriptedExecutor::new());
        let chain = Chain::new("Log Me")
            .with_step(Step::new("s1", "read"))
            .with_step(Step::new("s2", "write").depends_on(["s1"]));

        let handle = ChainRunLogger::new(dir.path().to_path_buf(), 2).spawn(
            &bus,
            chain.name.clone(),
            CancellationToken::new(),
        );
        ChainRunner::new(Some(exec))
            .with_event_bus(bus.clone())
            .execute(&chain, &HashMap::new())
            .await
            .unwrap();

        let path = handle.await.unwrap().unwrap();
        assert!(path.starts_with(dir.path().join("log-me")));
        let content = std::fs::read_to_string(path).unwrap();
        let types: Vec<String> = content
            .lines()
            .map(|l| {
                let v: serde_json::Value = serde_json::from_str(l).unwrap();
                v["event_type"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(
            types,
            vec!["chain_started", "step_finished", "step_finished", "chain_complete"]
        );
    }

    #[tokio::test]
    async fn test_ignores_other_chains_and_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::default();
        let cancel = CancellationToken::new();
        let handle =
            ChainRunLogger::new(dir.path().to_path_buf(), 3).spawn(&bus, "mine", cancel.clone());

        bus.publish(ChainEvent::ChainComplete {
            chain: "other".into(),
            steps_run: 1,
            total_duration_ms: 1,
        });
        bus.publish(ChainEvent::ChainStarted {
            chain: "mine".into(),
            total_steps: 2,
        });
        // give the logger a chance to drain before cancelling
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();

        let path = handle.await.unwrap().unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("chain_started"));
    }
}
