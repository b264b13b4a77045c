use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use uuid::Uuid;

use super::{BridgeCommand, BridgeError, BridgeResult, ExecutionBridge};

const HEARTBEAT_FILE: &str = "heartbeat";

/// File-drop transport: one directory per worker under `root`.
///
/// Layout: `<root>/<worker_id>/in/<dispatch_id>.json` for commands,
/// `<root>/<worker_id>/out/<dispatch_id>.json` for results, and a
/// `heartbeat` file the worker touches periodically. Command files are
/// written tmp-then-rename so the worker never reads a half-written one.
pub struct FileDropBridge {
    root: PathBuf,
    heartbeat_ttl: Duration,
}

impl FileDropBridge {
    pub fn new(root: impl Into<PathBuf>, heartbeat_ttl: Duration) -> Self {
        Self {
            root: root.into(),
            heartbeat_ttl,
        }
    }

    pub fn worker_dir(&self, worker_id: Uuid) -> PathBuf {
        self.root.join(worker_id.to_string())
    }

    /// Create the in/out directories for a fresh worker workspace.
    pub async fn create_workspace(&self, worker_id: Uuid) -> Result<(), BridgeError> {
        let dir = self.worker_dir(worker_id);
        tokio::fs::create_dir_all(dir.join("in")).await?;
        tokio::fs::create_dir_all(dir.join("out")).await?;
        Ok(())
    }

    async fn write_atomic(path: &Path, payload: &[u8]) -> Result<(), std::io::Error> {
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl ExecutionBridge for FileDropBridge {
    async fn send(&self, worker_id: Uuid, command: &BridgeCommand) -> Result<(), BridgeError> {
        let in_dir = self.worker_dir(worker_id).join("in");
        if !in_dir.is_dir() {
            return Err(BridgeError::Unreachable {
                worker_id,
                reason: "worker inbox missing".into(),
            });
        }

        let payload = serde_json::to_vec(command)
            .map_err(|e| BridgeError::Malformed(e.to_string()))?;
        let path = in_dir.join(format!("{}.json", command.dispatch_id));
        Self::write_atomic(&path, &payload).await?;

        tracing::debug!(
            worker_id = %worker_id,
            dispatch_id = %command.dispatch_id,
            path = %path.display(),
            "Command dropped"
        );
        Ok(())
    }

    async fn poll_result(
        &self,
        worker_id: Uuid,
        dispatch_id: &str,
    ) -> Result<Option<BridgeResult>, BridgeError> {
        let path = self
            .worker_dir(worker_id)
            .join("out")
            .join(format!("{dispatch_id}.json"));

        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let result: BridgeResult = serde_json::from_slice(&raw)
            .map_err(|e| BridgeError::Malformed(format!("{dispatch_id}: {e}")))?;

        if result.dispatch_id != dispatch_id {
            return Err(BridgeError::Malformed(format!(
                "result file {} carries dispatch_id {}",
                path.display(),
                result.dispatch_id
            )));
        }
        Ok(Some(result))
    }

    async fn probe(&self, worker_id: Uuid) -> Result<(), BridgeError> {
        let path = self.worker_dir(worker_id).join(HEARTBEAT_FILE);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|_| BridgeError::Unreachable {
                worker_id,
                reason: "no heartbeat file".into(),
            })?;

        let modified = meta.modified()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age > self.heartbeat_ttl {
            return Err(BridgeError::Unreachable {
                worker_id,
                reason: format!("heartbeat stale by {}s", age.as_secs()),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeResultStatus;
    use crate::models::Direction;
    use rust_decimal::Decimal;

    fn sample_command(dispatch_id: &str) -> BridgeCommand {
        BridgeCommand {
            dispatch_id: dispatch_id.into(),
            symbol: "EURUSD".into(),
            direction: Direction::Buy,
            lot_size: Decimal::ONE,
            entry_offset_pips: Decimal::ZERO,
            entry_delay_ms: 0,
            stop_loss: Decimal::new(10780, 4),
            take_profit: Decimal::new(10860, 4),
            magic_number: 310_000,
        }
    }

    #[tokio::test]
    async fn test_send_writes_command_file() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = FileDropBridge::new(dir.path(), Duration::from_secs(30));
        let worker_id = Uuid::new_v4();
        bridge.create_workspace(worker_id).await.unwrap();

        bridge
            .send(worker_id, &sample_command("d1"))
            .await
            .unwrap();

        let path = bridge.worker_dir(worker_id).join("in").join("d1.json");
        let raw = tokio::fs::read(&path).await.unwrap();
        let round: BridgeCommand = serde_json::from_slice(&raw).unwrap();
        assert_eq!(round.dispatch_id, "d1");
        assert_eq!(round.symbol, "EURUSD");
    }

    #[tokio::test]
    async fn test_send_without_workspace_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = FileDropBridge::new(dir.path(), Duration::from_secs(30));

        let err = bridge
            .send(Uuid::new_v4(), &sample_command("d1"))
            .await
            .expect_err("no workspace");
        assert!(matches!(err, BridgeError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn test_poll_result_none_then_some() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = FileDropBridge::new(dir.path(), Duration::from_secs(30));
        let worker_id = Uuid::new_v4();
        bridge.create_workspace(worker_id).await.unwrap();

        assert!(bridge.poll_result(worker_id, "d1").await.unwrap().is_none());

        let result = BridgeResult {
            dispatch_id: "d1".into(),
            status: BridgeResultStatus::Filled,
            fill_price: Some(Decimal::new(10851, 4)),
            ticket_id: Some(700123),
            message: None,
        };
        let path = bridge.worker_dir(worker_id).join("out").join("d1.json");
        tokio::fs::write(&path, serde_json::to_vec(&result).unwrap())
            .await
            .unwrap();

        let polled = bridge
            .poll_result(worker_id, "d1")
            .await
            .unwrap()
            .expect("result should be visible");
        assert_eq!(polled.ticket_id, Some(700123));
    }

    #[tokio::test]
    async fn test_probe_requires_fresh_heartbeat() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = FileDropBridge::new(dir.path(), Duration::from_secs(30));
        let worker_id = Uuid::new_v4();
        bridge.create_workspace(worker_id).await.unwrap();

        assert!(bridge.probe(worker_id).await.is_err());

        let hb = bridge.worker_dir(worker_id).join(HEARTBEAT_FILE);
        tokio::fs::write(&hb, b"ok").await.unwrap();
        assert!(bridge.probe(worker_id).await.is_ok());
    }
}
