//! Worker and pipeline configuration.

use std::time::Duration;

use vscore_models::encoding::{
    DEFAULT_FRAME_COUNT, DEFAULT_FRAME_SEARCH_WINDOW_SECS, FADE_OUT_SECS, MIN_LOOPABLE_AUDIO_SECS,
    MIN_PARTIAL_LOOP_SECS,
};

use crate::prompt_checker::DEFAULT_PROMPT_MAX_LENGTH;

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(env_parse(name).unwrap_or(default))
}

/// Process-level worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent pipeline runs
    pub max_concurrent_runs: usize,
    /// Parent directory for per-run scratch directories
    pub work_dir: String,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Use in-memory stores and scripted model clients
    pub dry_run: bool,
    /// Port for the Prometheus exporter
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 2,
            work_dir: "/tmp/vscore".to_string(),
            shutdown_timeout: Duration::from_secs(30),
            dry_run: false,
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_runs: env_parse::<usize>("WORKER_MAX_RUNS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_runs),
            work_dir: std::env::var("WORKER_WORK_DIR").unwrap_or(defaults.work_dir),
            shutdown_timeout: env_secs("WORKER_SHUTDOWN_TIMEOUT", 30),
            dry_run: std::env::var("VSCORE_DRY_RUN")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            metrics_port: env_parse("METRICS_PORT"),
        }
    }
}

/// Upper bounds for each stage's external work.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageTimeouts {
    pub download: Duration,
    pub frames: Duration,
    pub analysis: Duration,
    pub music: Duration,
    pub combine: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            download: Duration::from_secs(120),
            frames: Duration::from_secs(120),
            analysis: Duration::from_secs(60),
            music: Duration::from_secs(180),
            combine: Duration::from_secs(300),
        }
    }
}

/// Tunables for a single pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Frames sampled per video
    pub frame_count: u32,
    /// Backward search window for undecodable frames
    pub frame_search_window_secs: f64,
    /// Tighter duration tolerance; never looser than one frame interval
    pub tolerance_override: Option<f64>,
    /// Audio below this length is padded instead of looped
    pub min_loopable_secs: f64,
    /// Fade-out applied when trimming audio
    pub fade_secs: f64,
    /// Maximum validated prompt length in characters
    pub prompt_max_length: usize,
    pub timeouts: StageTimeouts,
    /// Delay before the single music retry
    pub music_retry_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_count: DEFAULT_FRAME_COUNT,
            frame_search_window_secs: DEFAULT_FRAME_SEARCH_WINDOW_SECS,
            tolerance_override: None,
            min_loopable_secs: MIN_LOOPABLE_AUDIO_SECS,
            fade_secs: FADE_OUT_SECS,
            prompt_max_length: DEFAULT_PROMPT_MAX_LENGTH,
            timeouts: StageTimeouts::default(),
            music_retry_backoff: Duration::from_secs(2),
        }
    }
}

impl PipelineConfig {
    /// Create config from `PIPELINE_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let t = defaults.timeouts;
        Self {
            frame_count: env_parse::<u32>("PIPELINE_FRAME_COUNT")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.frame_count),
            frame_search_window_secs: env_parse("PIPELINE_FRAME_SEARCH_WINDOW_SECS")
                .unwrap_or(defaults.frame_search_window_secs),
            tolerance_override: env_parse::<f64>("PIPELINE_DURATION_TOLERANCE_SECS").filter(|t| *t > 0.0),
            min_loopable_secs: env_parse::<f64>("PIPELINE_MIN_LOOPABLE_SECS")
                .filter(|s| s.is_finite())
                .unwrap_or(defaults.min_loopable_secs)
                .max(MIN_PARTIAL_LOOP_SECS),
            fade_secs: env_parse("PIPELINE_FADE_SECS").unwrap_or(defaults.fade_secs),
            prompt_max_length: env_parse("PIPELINE_PROMPT_MAX_LENGTH").unwrap_or(defaults.prompt_max_length),
            timeouts: StageTimeouts {
                download: env_secs("PIPELINE_DOWNLOAD_TIMEOUT_SECS", t.download.as_secs()),
                frames: env_secs("PIPELINE_FRAMES_TIMEOUT_SECS", t.frames.as_secs()),
                analysis: env_secs("PIPELINE_ANALYSIS_TIMEOUT_SECS", t.analysis.as_secs()),
                music: env_secs("PIPELINE_MUSIC_TIMEOUT_SECS", t.music.as_secs()),
                combine: env_secs("PIPELINE_COMBINE_TIMEOUT_SECS", t.combine.as_secs()),
            },
            music_retry_backoff: Duration::from_millis(
                env_parse("PIPELINE_MUSIC_RETRY_BACKOFF_MS").unwrap_or(2000),
            ),
        }
    }

    /// Tolerance for a source with the given frame interval.
    pub fn tolerance_for(&self, frame_interval: f64) -> f64 {
        self.tolerance_override
            .map_or(frame_interval, |t| t.min(frame_interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_worker_config_defaults() {
        std::env::remove_var("WORKER_MAX_RUNS");
        std::env::remove_var("VSCORE_DRY_RUN");
        let config = WorkerConfig::from_env();
        assert_eq!(config.max_concurrent_runs, 2);
        assert!(!config.dry_run);
    }

    #[test]
    #[serial]
    fn test_pipeline_config_from_env() {
        std::env::set_var("PIPELINE_FRAME_COUNT", "8");
        std::env::set_var("PIPELINE_MUSIC_TIMEOUT_SECS", "30");
        std::env::set_var("PIPELINE_DURATION_TOLERANCE_SECS", "0");
        let config = PipelineConfig::from_env();
        assert_eq!(config.frame_count, 8);
        assert_eq!(config.timeouts.music, Duration::from_secs(30));
        assert_eq!(config.timeouts.analysis, Duration::from_secs(60));
        assert_eq!(config.tolerance_override, None);
        std::env::remove_var("PIPELINE_FRAME_COUNT");
        std::env::remove_var("PIPELINE_MUSIC_TIMEOUT_SECS");
        std::env::remove_var("PIPELINE_DURATION_TOLERANCE_SECS");
    }

    #[test]
    #[serial]
    fn test_min_loopable_never_below_a_millisecond() {
        for raw in ["0", "-2.5", "NaN"] {
            std::env::set_var("PIPELINE_MIN_LOOPABLE_SECS", raw);
            let config = PipelineConfig::from_env();
            assert!(config.min_loopable_secs >= MIN_PARTIAL_LOOP_SECS, "{raw}");
        }
        std::env::remove_var("PIPELINE_MIN_LOOPABLE_SECS");
    }

    #[test]
    fn test_tolerance_capped_at_frame_interval() {
        let frame = 1.0 / 30.0;
        let mut config = PipelineConfig::default();
        assert_eq!(config.tolerance_for(frame), frame);

        config.tolerance_override = Some(2.0);
        assert_eq!(config.tolerance_for(frame), frame);

        config.tolerance_override = Some(0.01);
        assert_eq!(config.tolerance_for(frame), 0.01);
    }
}
