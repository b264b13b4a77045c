use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::models::{BrokerProfile, Worker};

/// Starts and stops terminal processes. The actual terminal is an external
/// program under a process supervisor; this trait is the seam so tests can
/// substitute an instant in-memory launcher.
#[async_trait]
pub trait TerminalLauncher: Send + Sync {
    async fn launch(&self, worker: &Worker, profile: &BrokerProfile) -> anyhow::Result<()>;
    async fn terminate(&self, worker_id: Uuid) -> anyhow::Result<()>;
}

/// Production launcher: materializes a worker workspace from the frozen
/// template and drops a `launch.json` request that the terminal supervisor
/// consumes. Teardown drops a `stop.request` marker the same way.
pub struct FileDropLauncher {
    runtime_root: PathBuf,
    template_dir: PathBuf,
}

impl FileDropLauncher {
    pub fn new(runtime_root: impl Into<PathBuf>, template_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime_root: runtime_root.into(),
            template_dir: template_dir.into(),
        }
    }

    fn worker_dir(&self, worker_id: Uuid) -> PathBuf {
        self.runtime_root.join(worker_id.to_string())
    }

    async fn write_atomic(path: &Path, payload: &[u8]) -> anyhow::Result<()> {
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl TerminalLauncher for FileDropLauncher {
    async fn launch(&self, worker: &Worker, profile: &BrokerProfile) -> anyhow::Result<()> {
        let dir = self.worker_dir(worker.worker_id);
        tokio::fs::create_dir_all(dir.join("in")).await?;
        tokio::fs::create_dir_all(dir.join("out")).await?;

        let request = json!({
            "worker_id": worker.worker_id,
            "template": self.template_dir,
            "port": worker.allocated_port,
            "magic_number": worker.allocated_magic_number,
            "broker": {
                "type": profile.broker_type,
                "server": profile.server,
                "login": profile.login,
                "password": profile.password,
            },
        });
        Self::write_atomic(&dir.join("launch.json"), &serde_json::to_vec_pretty(&request)?).await?;

        tracing::info!(
            worker_id = %worker.worker_id,
            port = worker.allocated_port,
            dir = %dir.display(),
            "Launch request dropped"
        );
        Ok(())
    }

    async fn terminate(&self, worker_id: Uuid) -> anyhow::Result<()> {
        let dir = self.worker_dir(worker_id);
        if !dir.is_dir() {
            // Nothing running; termination is idempotent.
            return Ok(());
        }
        Self::write_atomic(&dir.join("stop.request"), b"stop").await?;
        tracing::info!(worker_id = %worker_id, "Stop request dropped");
        Ok(())
    }
}
