//! Durable checkpoint persistence.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use cadence_core::{Checkpoint, RunId};

/// Error type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur while saving or loading checkpoints.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Writes and reads run checkpoints under a root directory.
///
/// Each run gets its own directory of numbered snapshot files
/// (`000001.json`, `000002.json`, ...). Writes go to a temporary file
/// in the same directory and are renamed into place, so a reader never
/// observes a partial snapshot.
pub struct CheckpointManager {
    root: PathBuf,
    auto_cleanup: bool,
}

impl CheckpointManager {
    /// Create a manager rooted at the given directory. Auto-cleanup of
    /// successful runs is on by default.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            auto_cleanup: true,
        }
    }

    /// Enable or disable deletion of a run's checkpoints on success.
    pub fn with_auto_cleanup(mut self, enabled: bool) -> Self {
        self.auto_cleanup = enabled;
        self
    }

    fn run_dir(&self, run_id: RunId) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    fn snapshot_path(&self, run_id: RunId, step_number: u64) -> PathBuf {
        self.run_dir(run_id).join(format!("{step_number:06}.json"))
    }

    /// Persist a snapshot atomically.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let dir = self.run_dir(checkpoint.run_id);
        fs::create_dir_all(&dir).await?;

        let path = self.snapshot_path(checkpoint.run_id, checkpoint.step_number);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(checkpoint)?;
        fs::write(&tmp, json.as_bytes()).await?;
        fs::rename(&tmp, &path).await?;

        debug!(
            run = %checkpoint.run_id,
            step_number = checkpoint.step_number,
            completed = checkpoint.completed_steps.len(),
            "checkpoint saved"
        );
        Ok(())
    }

    /// Whether any snapshot exists for the run.
    pub async fn can_resume(&self, run_id: RunId) -> bool {
        matches!(self.latest_path(run_id).await, Ok(Some(_)))
    }

    /// Load the most recent snapshot for the run, if any.
    pub async fn load_latest(&self, run_id: RunId) -> Result<Option<Checkpoint>> {
        let Some(path) = self.latest_path(run_id).await? else {
            return Ok(None);
        };
        let contents = fs::read_to_string(&path).await?;
        let checkpoint = serde_json::from_str(&contents)?;
        Ok(Some(checkpoint))
    }

    async fn latest_path(&self, run_id: RunId) -> Result<Option<PathBuf>> {
        let dir = self.run_dir(run_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // Zero-padded names make the lexicographic max the latest.
        let mut latest: Option<PathBuf> = None;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if latest.as_ref().map_or(true, |l| path > *l) {
                latest = Some(path);
            }
        }
        Ok(latest)
    }

    /// Called when execution pauses for human approval. The pausing
    /// checkpoint has already been saved by this point.
    pub async fn on_pause(&self, run_id: RunId) {
        info!(run = %run_id, "execution paused; checkpoints retained for resume");
    }

    /// Called when a run finishes. Successful runs have their
    /// checkpoints pruned when auto-cleanup is enabled; failed runs
    /// keep them indefinitely for diagnosis and resume.
    pub async fn on_execution_complete(
        &self,
        run_id: RunId,
        success: bool,
        error: Option<&str>,
    ) -> Result<()> {
        if success && self.auto_cleanup {
            let dir = self.run_dir(run_id);
            match fs::remove_dir_all(&dir).await {
                Ok(()) => info!(run = %run_id, "run succeeded; checkpoints pruned"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(run = %run_id, error = %e, "failed to prune checkpoints");
                    return Err(e.into());
                }
            }
        } else if !success {
            info!(
                run = %run_id,
                error = error.unwrap_or("unspecified"),
                "run did not succeed; checkpoints retained"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::Context;
    use serde_json::json;

    fn checkpoint(run_id: RunId, step_number: u64, completed: &[&str]) -> Checkpoint {
        let mut context = Context::new();
        context.insert("x".to_string(), json!(step_number));
        Checkpoint::new(
            run_id,
            step_number,
            completed.iter().map(|s| s.to_string()).collect(),
            context,
            1,
            10 * step_number,
            50 * step_number,
        )
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path());
        let run_id = RunId::new();

        let saved = checkpoint(run_id, 2, &["a", "b"]);
        manager.save(&saved).await.unwrap();

        let loaded = manager.load_latest(run_id).await.unwrap().unwrap();
        assert_eq!(loaded.step_number, 2);
        assert_eq!(loaded.completed_steps, vec!["a", "b"]);
        assert_eq!(loaded.context, saved.context);
        assert_eq!(loaded.total_tokens, 20);
        assert_eq!(loaded.total_latency_ms, 100);
    }

    #[tokio::test]
    async fn test_load_latest_picks_highest_step_number() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path());
        let run_id = RunId::new();

        manager.save(&checkpoint(run_id, 1, &["a"])).await.unwrap();
        manager.save(&checkpoint(run_id, 3, &["a", "b", "c"])).await.unwrap();
        manager.save(&checkpoint(run_id, 2, &["a", "b"])).await.unwrap();

        let loaded = manager.load_latest(run_id).await.unwrap().unwrap();
        assert_eq!(loaded.step_number, 3);
    }

    #[tokio::test]
    async fn test_can_resume_reflects_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path());
        let run_id = RunId::new();

        assert!(!manager.can_resume(run_id).await);
        manager.save(&checkpoint(run_id, 1, &["a"])).await.unwrap();
        assert!(manager.can_resume(run_id).await);
    }

    #[tokio::test]
    async fn test_success_with_auto_cleanup_prunes() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path());
        let run_id = RunId::new();

        manager.save(&checkpoint(run_id, 1, &["a"])).await.unwrap();
        manager
            .on_execution_complete(run_id, true, None)
            .await
            .unwrap();
        assert!(!manager.can_resume(run_id).await);
    }

    #[tokio::test]
    async fn test_failure_retains_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path());
        let run_id = RunId::new();

        manager.save(&checkpoint(run_id, 1, &["a"])).await.unwrap();
        manager
            .on_execution_complete(run_id, false, Some("boom"))
            .await
            .unwrap();
        assert!(manager.can_resume(run_id).await);
    }

    #[tokio::test]
    async fn test_auto_cleanup_disabled_keeps_success_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path()).with_auto_cleanup(false);
        let run_id = RunId::new();

        manager.save(&checkpoint(run_id, 1, &["a"])).await.unwrap();
        manager
            .on_execution_complete(run_id, true, None)
            .await
            .unwrap();
        assert!(manager.can_resume(run_id).await);
    }

    #[tokio::test]
    async fn test_no_stray_temp_files_after_save() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path());
        let run_id = RunId::new();
        manager.save(&checkpoint(run_id, 1, &["a"])).await.unwrap();

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path().join(run_id.to_string()))
            .await
            .unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["000001.json"]);
    }
}
