//! Plain-file artifact writer.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::{ArtifactSink, SinkFuture};
use crate::models::summary::{ManualInstruction, SessionSummary};
use crate::{AppError, Result};

/// Writes artifacts as files in a single directory.
///
/// - `session_summary_<id>_<status>.json` — pretty-printed summary.
/// - `manual_setup_<id>.txt` — manual delivery instructions.
pub struct FileArtifactWriter {
    dir: PathBuf,
}

impl FileArtifactWriter {
    /// Construct a writer that stores artifacts in `dir`.
    ///
    /// Creates `dir` and all parent directories if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Artifact`] if the directory cannot be created.
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(|e| {
            AppError::Artifact(format!(
                "failed to create artifact directory {}: {e}",
                dir.display()
            ))
        })?;
        Ok(Self { dir })
    }

    /// Directory receiving artifacts.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a summary for `session_id` in `status` is written to.
    #[must_use]
    pub fn summary_path(&self, session_id: &str, status: &str) -> PathBuf {
        self.dir
            .join(format!("session_summary_{session_id}_{status}.json"))
    }

    /// Path manual instructions for `session_id` are written to.
    #[must_use]
    pub fn manual_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("manual_setup_{session_id}.txt"))
    }

    async fn write(path: PathBuf, contents: String) -> Result<()> {
        tokio::fs::write(&path, contents).await.map_err(|e| {
            warn!("failed to write artifact {}: {e}", path.display());
            AppError::Artifact(format!("failed to write {}: {e}", path.display()))
        })
    }
}

impl ArtifactSink for FileArtifactWriter {
    fn record_summary<'a>(&'a self, summary: &'a SessionSummary) -> SinkFuture<'a> {
        Box::pin(async move {
            let path = self.summary_path(&summary.session_id, summary.status.as_str());
            let json = serde_json::to_string_pretty(summary)?;
            Self::write(path.clone(), json).await?;
            info!(session_id = %summary.session_id, path = %path.display(), "session summary saved");
            Ok(())
        })
    }

    fn record_manual_instructions<'a>(
        &'a self,
        instruction: &'a ManualInstruction,
    ) -> SinkFuture<'a> {
        Box::pin(async move {
            let path = self.manual_path(&instruction.session_id);
            Self::write(path.clone(), instruction.render()).await?;
            warn!(
                session_id = %instruction.session_id,
                path = %path.display(),
                "manual setup required"
            );
            Ok(())
        })
    }
}
