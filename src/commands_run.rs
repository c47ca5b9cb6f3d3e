use std::path::Path;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::auth::normalize_identity;
use crate::config::GraderConfig;
use crate::db::Database;
use crate::models::{ControlMessage, PipelineEvent, RunSummary, TestSpec};
use crate::pipeline::Pipeline;
use crate::state::GraderState;
use crate::task_worker::CancelHandle;

pub const NO_NODES_MESSAGE: &str = "no hypervisor nodes registered";

pub fn load_spec(path: &Path) -> Result<TestSpec, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|error| format!("Failed to read test spec `{}`: {error}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|error| format!("Invalid test spec `{}`: {error}", path.display()))
}

/// Grades one attempt, writing every event to stdout as one JSON line.
pub async fn run_grading(
    config: &GraderConfig,
    database: &Database,
    spec_path: &Path,
    identity: Option<String>,
) -> Result<(), String> {
    let spec = load_spec(spec_path)?;
    let identity = normalize_identity(identity);
    let nodes = database.node_credentials()?;
    if nodes.is_empty() {
        return Err(NO_NODES_MESSAGE.to_string());
    }

    let state = GraderState::new(config.worker_pool_size);
    let mut handle = state.start(Pipeline::with_config(spec, nodes, config)).await;
    let listener = tokio::spawn(listen_for_cancel(handle.cancel.clone()));

    let mut stdout = tokio::io::stdout();
    let mut finished = None;
    while let Some(event) = handle.next_event().await {
        write_event(&mut stdout, &event).await?;
        if let PipelineEvent::Finished(summary) = event {
            finished = Some(summary);
        }
    }
    listener.abort();
    state.finish(&handle.run_id).await;

    match (finished, identity) {
        (Some(summary), Some(identity)) => record_result(config, database, &identity, &summary),
        _ => Ok(()),
    }
}

async fn write_event<W>(writer: &mut W, event: &PipelineEvent) -> Result<(), String>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_string(event)
        .map_err(|error| format!("Failed to encode event: {error}"))?;
    line.push('\n');
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|error| format!("Failed to write event: {error}"))?;
    writer
        .flush()
        .await
        .map_err(|error| format!("Failed to flush event: {error}"))
}

/// Cancels on a `{"action":"cancel"}` line on stdin or on Ctrl-C.
async fn listen_for_cancel(cancel: CancelHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if is_cancel_request(&line) {
                        break;
                    }
                }
                Ok(None) | Err(_) => {
                    if tokio::signal::ctrl_c().await.is_err() {
                        return;
                    }
                    break;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                if signal.is_err() {
                    return;
                }
                break;
            }
        }
    }
    info!("cancel requested");
    cancel.cancel();
}

pub fn is_cancel_request(line: &str) -> bool {
    serde_json::from_str::<ControlMessage>(line.trim())
        .map(|message| message.is_cancel())
        .unwrap_or(false)
}

/// Leaderboard side effect of a finished run.
pub fn record_result(
    config: &GraderConfig,
    database: &Database,
    identity: &str,
    summary: &RunSummary,
) -> Result<(), String> {
    if !config.is_leaderboard_eligible(summary.percentage) {
        info!(identity, percentage = summary.percentage, "below leaderboard threshold");
        return Ok(());
    }
    if database.record_leaderboard_if_absent(identity, summary, Utc::now())? {
        info!(identity, percentage = summary.percentage, "leaderboard entry recorded");
    } else {
        warn!(identity, "leaderboard already has an entry for this identity");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{is_cancel_request, load_spec, record_result, write_event};
    use crate::config::GraderConfig;
    use crate::db::Database;
    use crate::models::{Grade, PipelineEvent, RunSummary};

    fn summary(percentage: f64) -> RunSummary {
        RunSummary {
            total: percentage as u32,
            max: 100,
            percentage,
            grade: Grade::from_percentage(percentage),
        }
    }

    #[test]
    fn only_cancel_frames_cancel() {
        assert!(is_cancel_request(r#"{"action":"cancel"}"#));
        assert!(is_cancel_request(" {\"action\": \"CANCEL\"}\n"));
        assert!(!is_cancel_request(r#"{"action":"pause"}"#));
        assert!(!is_cancel_request("cancel"));
    }

    #[test]
    fn leaderboard_only_takes_eligible_runs() {
        let dir = tempfile::tempdir().unwrap();
        let database = Database::open(&dir.path().join("grader.sqlite")).unwrap();
        let config = GraderConfig::default();

        record_result(&config, &database, "siswa-01", &summary(69.99)).unwrap();
        record_result(&config, &database, "siswa-02", &summary(70.0)).unwrap();
        record_result(&config, &database, "siswa-02", &summary(95.0)).unwrap();

        let board = database.list_leaderboard().unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].identity, "siswa-02");
        assert_eq!(board[0].percentage, 70.0);
    }

    #[test]
    fn spec_file_must_be_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.json");
        std::fs::write(&path, "{\"php\": {\"expected\": {}}}").unwrap();
        assert!(load_spec(&path).unwrap().as_value().get("php").is_some());

        std::fs::write(&path, "php: {}").unwrap();
        assert!(load_spec(&path).unwrap_err().starts_with("Invalid test spec"));
    }

    #[tokio::test]
    async fn events_are_written_as_json_lines() {
        let mut buffer = Vec::new();
        write_event(&mut buffer, &PipelineEvent::Start).await.unwrap();
        write_event(&mut buffer, &PipelineEvent::Stopped(None)).await.unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "{\"event\":\"start\"}\n{\"event\":\"error\",\"message\":null}\n"
        );
    }
}
