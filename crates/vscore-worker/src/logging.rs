//! Structured run logging.

use tracing::{error, info, warn, Span};
use vscore_models::{RunId, VideoId};

/// Consistent lifecycle logging for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunLogger {
    video_id: String,
    run_id: String,
}

impl RunLogger {
    pub fn new(video_id: &VideoId, run_id: &RunId) -> Self {
        Self {
            video_id: video_id.to_string(),
            run_id: run_id.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(video_id = %self.video_id, run_id = %self.run_id, "Run started: {}", message);
    }

    /// Log a stage transition or other progress.
    pub fn log_progress(&self, stage: &str, message: &str) {
        info!(
            video_id = %self.video_id,
            run_id = %self.run_id,
            stage = %stage,
            "Run progress: {}", message
        );
    }

    pub fn log_warning(&self, stage: &str, message: &str) {
        warn!(
            video_id = %self.video_id,
            run_id = %self.run_id,
            stage = %stage,
            "Run warning: {}", message
        );
    }

    pub fn log_error(&self, stage: &str, message: &str) {
        error!(
            video_id = %self.video_id,
            run_id = %self.run_id,
            stage = %stage,
            "Run error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(video_id = %self.video_id, run_id = %self.run_id, "Run completed: {}", message);
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Span covering the whole run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("pipeline_run", video_id = %self.video_id, run_id = %self.run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_logger_ids() {
        let logger = RunLogger::new(&VideoId::from("video-1"), &RunId::from("run-1"));
        assert_eq!(logger.video_id(), "video-1");
        assert_eq!(logger.run_id(), "run-1");
    }
}
