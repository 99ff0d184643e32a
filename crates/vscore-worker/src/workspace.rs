//! Per-run scratch directory.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use vscore_models::RunId;

use crate::error::PipelineResult;

/// Local files for one run. Everything is deleted when this is dropped,
/// whichever way the run ends.
#[derive(Debug)]
pub struct RunWorkspace {
    dir: TempDir,
}

impl RunWorkspace {
    /// Create a fresh directory under `parent`.
    pub async fn create(parent: impl AsRef<Path>, run_id: &RunId) -> PipelineResult<Self> {
        let parent = parent.as_ref();
        tokio::fs::create_dir_all(parent).await?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("run-{}-", run_id))
            .tempdir_in(parent)?;
        tokio::fs::create_dir_all(dir.path().join("frames")).await?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Downloaded source video.
    pub fn source_video(&self, filename: Option<&str>) -> PathBuf {
        let ext = filename
            .and_then(|f| Path::new(f).extension())
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        self.dir.path().join(format!("source.{}", ext))
    }

    /// Scratch space for frame decoding.
    pub fn frames_dir(&self) -> PathBuf {
        self.dir.path().join("frames")
    }

    pub fn raw_audio(&self) -> PathBuf {
        self.dir.path().join("music_raw.wav")
    }

    pub fn reconciled_audio(&self) -> PathBuf {
        self.dir.path().join("music_reconciled.wav")
    }

    pub fn final_video(&self) -> PathBuf {
        self.dir.path().join("final.mp4")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_workspace_is_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = RunWorkspace::create(parent.path(), &RunId::from("r1")).await.unwrap();
        let path = workspace.path().to_path_buf();

        assert!(path.starts_with(parent.path()));
        assert!(workspace.frames_dir().is_dir());
        assert_eq!(
            workspace.source_video(Some("clip.MOV")).file_name().unwrap(),
            "source.MOV"
        );
        assert_eq!(workspace.source_video(None).file_name().unwrap(), "source.mp4");

        drop(workspace);
        assert!(!path.exists());
    }
}
