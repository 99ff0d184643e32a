//! End-to-end pipeline runs against in-memory stores, scripted model
//! clients and a simulated media toolkit.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use vscore_ai::{silent_wav, wav_duration, ScriptedMusicGenerator, ScriptedVisionAnalyzer};
use vscore_firestore::{AssetStore, InMemoryAssetStore};
use vscore_media::{
    FrameDecoder, FrameSampler, MediaError, MediaResult, MediaToolkit, ReconcilePlan, RecombineOutcome,
    RecombineRequest, VideoInfo,
};
use vscore_models::{
    ArtifactStatus, GenerationStatus, PipelineStage, PipelineStatus, PromptSource, TrimWindow, VideoAsset,
    VideoId,
};
use vscore_storage::{video_key, MemoryObjectStore, ObjectStore};
use vscore_worker::{Pipeline, PipelineConfig, PipelineDeps, PipelineError, RunOptions};

const VISION_REPLY: &str = "Bright acoustic folk, Studio recording, featuring guitar and violin, joyful and uplifting.";

/// Returns the same tiny JPEG for every timestamp.
struct StillFrames;

#[async_trait]
impl FrameDecoder for StillFrames {
    async fn decode_frame(&self, _video: &Path, _timestamp: f64) -> MediaResult<Vec<u8>> {
        Ok(vec![0xFF, 0xD8, 0xFF, 0xE0, 0xFF, 0xD9])
    }
}

/// Media toolkit that writes silent WAVs instead of running ffmpeg.
struct SimulatedMedia {
    info: VideoInfo,
    probe_fails: bool,
    recombine_fails: bool,
    plans: Mutex<Vec<ReconcilePlan>>,
}

impl SimulatedMedia {
    fn with_duration(duration: f64) -> Self {
        Self {
            info: VideoInfo {
                duration,
                width: 1280,
                height: 720,
                fps: 30.0,
                frame_count: (duration * 30.0) as u64,
                codec: "h264".to_string(),
                has_audio: false,
            },
            probe_fails: false,
            recombine_fails: false,
            plans: Mutex::new(Vec::new()),
        }
    }

    fn failing_probe(mut self) -> Self {
        self.probe_fails = true;
        self
    }

    fn failing_recombine(mut self) -> Self {
        self.recombine_fails = true;
        self
    }

    fn plans(&self) -> Vec<ReconcilePlan> {
        self.plans.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaToolkit for SimulatedMedia {
    async fn probe_video(&self, _path: &Path) -> MediaResult<VideoInfo> {
        if self.probe_fails {
            return Err(MediaError::unreadable("moov atom not found"));
        }
        Ok(self.info.clone())
    }

    fn frame_sampler(
        &self,
        video: &Path,
        window: TrimWindow,
        frame_count: u32,
        frame_interval: f64,
        _scratch_dir: &Path,
    ) -> FrameSampler {
        FrameSampler::new(Arc::new(StillFrames), video, window, frame_count, frame_interval)
    }

    async fn probe_audio_duration(&self, path: &Path) -> MediaResult<f64> {
        let bytes = tokio::fs::read(path).await?;
        wav_duration(&bytes).map_err(|e| MediaError::unreadable(e.to_string()))
    }

    async fn reconcile_audio(&self, plan: &ReconcilePlan, _input: &Path, output: &Path) -> MediaResult<()> {
        self.plans.lock().unwrap().push(*plan);
        let wav = silent_wav(plan.output_duration(), 8000).map_err(|e| MediaError::internal(e.to_string()))?;
        tokio::fs::write(output, wav).await?;
        Ok(())
    }

    async fn recombine(&self, request: &RecombineRequest) -> MediaResult<RecombineOutcome> {
        if self.recombine_fails {
            return Err(MediaError::combination_failed(2, "duration mismatch after re-encode"));
        }
        let audio = tokio::fs::read(&request.audio).await?;
        let duration = wav_duration(&audio).map_err(|e| MediaError::internal(e.to_string()))?;
        tokio::fs::write(&request.output, &audio).await?;
        Ok(RecombineOutcome { duration, attempts: 1 })
    }
}

struct Harness {
    pipeline: Pipeline,
    storage: Arc<MemoryObjectStore>,
    store: InMemoryAssetStore,
    vision: Arc<ScriptedVisionAnalyzer>,
    music: Arc<ScriptedMusicGenerator>,
    media: Arc<SimulatedMedia>,
    work_dir: TempDir,
}

impl Harness {
    fn new(media: SimulatedMedia, vision: ScriptedVisionAnalyzer, music: ScriptedMusicGenerator) -> Self {
        Self::configured(media, vision, music, |_| {})
    }

    fn configured(
        media: SimulatedMedia,
        vision: ScriptedVisionAnalyzer,
        music: ScriptedMusicGenerator,
        tune: impl FnOnce(&mut PipelineConfig),
    ) -> Self {
        let storage = Arc::new(MemoryObjectStore::new());
        let store = InMemoryAssetStore::new();
        let vision = Arc::new(vision);
        let music = Arc::new(music);
        let media = Arc::new(media);
        let work_dir = tempfile::tempdir().unwrap();

        let mut config = PipelineConfig::default();
        config.timeouts.analysis = Duration::from_millis(200);
        config.timeouts.music = Duration::from_secs(2);
        config.music_retry_backoff = Duration::from_millis(1);
        tune(&mut config);

        let deps = PipelineDeps {
            storage: storage.clone(),
            store: Arc::new(store.clone()),
            vision: vision.clone(),
            music: music.clone(),
            media: media.clone(),
        };
        let pipeline = Pipeline::new(config, deps, work_dir.path());

        Self {
            pipeline,
            storage,
            store,
            vision,
            music,
            media,
            work_dir,
        }
    }

    fn standard(video_secs: f64, audio_secs: f64) -> Self {
        Self::new(
            SimulatedMedia::with_duration(video_secs),
            ScriptedVisionAnalyzer::responding(VISION_REPLY),
            ScriptedMusicGenerator::producing(audio_secs),
        )
    }

    async fn add_asset(&self, id: &str, trim: Option<TrimWindow>) -> VideoId {
        let video_id = VideoId::from(id);
        let locator = self
            .storage
            .put(b"not really an mp4".to_vec(), &video_key(&video_id, "clip.mp4"), "video/mp4")
            .await
            .unwrap();
        let mut asset = VideoAsset::new(video_id.clone(), locator).with_filename("clip.mp4");
        if let Some(trim) = trim {
            asset = asset.with_trim(trim);
        }
        self.store.create_asset(&asset).await.unwrap();
        video_id
    }

    async fn run(&self, video_id: &VideoId) -> Result<vscore_models::FinalArtifact, PipelineError> {
        self.pipeline.run_pipeline(video_id, RunOptions::default()).await
    }
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

const HAPPY_PATH: [PipelineStatus; 8] = [
    PipelineStatus::FramesExtracting,
    PipelineStatus::FramesExtracted,
    PipelineStatus::Analyzing,
    PipelineStatus::Analyzed,
    PipelineStatus::GeneratingMusic,
    PipelineStatus::MusicCompleted,
    PipelineStatus::CombiningVideo,
    PipelineStatus::Completed,
];

#[tokio::test]
async fn test_longer_audio_is_trimmed_with_fade() {
    let harness = Harness::standard(15.0, 20.0);
    let video_id = harness.add_asset("trim", None).await;

    let artifact = harness.run(&video_id).await.unwrap();

    assert_eq!(harness.media.plans(), vec![ReconcilePlan::Trim { target: 15.0, fade: 0.05 }]);
    assert_eq!(artifact.status, ArtifactStatus::Completed);
    assert_eq!(artifact.reconcile_policy.as_deref(), Some("trim"));
    assert!(approx(artifact.output_duration_secs.unwrap(), 15.0));
    assert_eq!(harness.store.status_history(&video_id).await, HAPPY_PATH.to_vec());

    let frame_sets = harness.store.frame_sets(&video_id).await;
    assert_eq!(frame_sets.len(), 1);
    assert_eq!(frame_sets[0].len(), 5);
    let timestamps: Vec<f64> = frame_sets[0].frames.iter().map(|f| f.timestamp_secs).collect();
    assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
    assert!(timestamps.iter().all(|t| (0.0..=15.0).contains(t)));
}

#[tokio::test]
async fn test_short_audio_is_looped() {
    let harness = Harness::standard(15.0, 4.0);
    let video_id = harness.add_asset("loop", None).await;

    let artifact = harness.run(&video_id).await.unwrap();

    match harness.media.plans()[..] {
        [ReconcilePlan::Loop {
            source,
            full_loops,
            partial,
            target,
        }] => {
            assert!(approx(source, 4.0));
            assert_eq!(full_loops, 3);
            assert!(approx(partial, 3.0));
            assert!(approx(target, 15.0));
        }
        ref other => panic!("expected a single loop plan, got {:?}", other),
    }
    assert!(approx(artifact.output_duration_secs.unwrap(), 15.0));
}

#[tokio::test]
async fn test_tiny_audio_is_padded_with_silence() {
    let harness = Harness::standard(10.0, 0.05);
    let video_id = harness.add_asset("pad", None).await;

    let artifact = harness.run(&video_id).await.unwrap();

    match harness.media.plans()[..] {
        [ReconcilePlan::Pad { audio, silence, target }] => {
            assert!(approx(audio, 0.05));
            assert!(approx(silence, 9.95));
            assert!(approx(target, 10.0));
        }
        ref other => panic!("expected a single pad plan, got {:?}", other),
    }
    assert!(artifact.duration_matches(1.0 / 30.0));
}

#[tokio::test]
async fn test_loose_tolerance_override_is_capped_at_one_frame() {
    let harness = Harness::configured(
        SimulatedMedia::with_duration(10.0),
        ScriptedVisionAnalyzer::responding(VISION_REPLY),
        ScriptedMusicGenerator::producing(11.5),
        |config| config.tolerance_override = Some(2.0),
    );
    let video_id = harness.add_asset("loose", None).await;

    let artifact = harness.run(&video_id).await.unwrap();

    assert_eq!(harness.media.plans(), vec![ReconcilePlan::Trim { target: 10.0, fade: 0.05 }]);
    assert_eq!(artifact.status, ArtifactStatus::Completed);
    assert!(artifact.duration_matches(1.0 / 30.0));
}

#[tokio::test]
async fn test_vision_timeout_uses_fallback_and_completes() {
    let harness = Harness::new(
        SimulatedMedia::with_duration(12.0),
        ScriptedVisionAnalyzer::responding(VISION_REPLY).with_delay(Duration::from_secs(2)),
        ScriptedMusicGenerator::producing(12.0),
    );
    let video_id = harness.add_asset("fallback", None).await;

    harness.run(&video_id).await.unwrap();

    assert_eq!(
        harness.store.status_history(&video_id).await,
        vec![
            PipelineStatus::FramesExtracting,
            PipelineStatus::FramesExtracted,
            PipelineStatus::Analyzing,
            PipelineStatus::AnalysisFailed,
            PipelineStatus::GeneratingMusic,
            PipelineStatus::MusicCompleted,
            PipelineStatus::CombiningVideo,
            PipelineStatus::Completed,
        ]
    );

    let asset = harness.store.get_asset(&video_id).await.unwrap().unwrap();
    assert_eq!(asset.status, PipelineStatus::Completed);
    assert!(asset.analysis_used_fallback);

    let prompts = harness.store.prompts(&video_id).await;
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].used_fallback);
    assert!(prompts[0].validated_prompt.starts_with("Ambient instrumental background music"));
}

#[tokio::test]
async fn test_trim_window_sets_target_duration() {
    let harness = Harness::standard(15.0, 12.0);
    let video_id = harness.add_asset("window", Some(TrimWindow::new(2.0, 8.0).unwrap())).await;

    let artifact = harness.run(&video_id).await.unwrap();

    assert!(approx(artifact.target_duration_secs, 6.0));
    assert!(approx(artifact.output_duration_secs.unwrap(), 6.0));
    let frames = &harness.store.frame_sets(&video_id).await[0].frames;
    assert!(frames.iter().all(|f| f.timestamp_secs >= 2.0 && f.timestamp_secs <= 8.0));
}

#[tokio::test]
async fn test_rerun_produces_new_records_and_supersedes_prompt() {
    let harness = Harness::standard(15.0, 15.0);
    let video_id = harness.add_asset("rerun", None).await;

    let first = harness.run(&video_id).await.unwrap();
    let second = harness.run(&video_id).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(harness.store.artifacts(&video_id).await.len(), 2);
    assert_eq!(harness.store.generations(&video_id).await.len(), 2);

    let prompts = harness.store.prompts(&video_id).await;
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].active);
    assert!(prompts[0].superseded_at.is_some());
    assert!(prompts[1].active);

    let active = harness.store.active_prompt(&video_id).await.unwrap().unwrap();
    assert_eq!(active.id, prompts[1].id);
}

#[tokio::test]
async fn test_single_music_failure_is_retried() {
    let harness = Harness::new(
        SimulatedMedia::with_duration(10.0),
        ScriptedVisionAnalyzer::responding(VISION_REPLY),
        ScriptedMusicGenerator::producing(10.0).with_failures(1),
    );
    let video_id = harness.add_asset("retry", None).await;

    harness.run(&video_id).await.unwrap();

    assert_eq!(harness.music.calls(), 2);
    assert_eq!(
        harness.store.generations(&video_id).await[0].status,
        GenerationStatus::Completed
    );
}

#[tokio::test]
async fn test_repeated_music_failure_fails_the_run() {
    let harness = Harness::new(
        SimulatedMedia::with_duration(10.0),
        ScriptedVisionAnalyzer::responding(VISION_REPLY),
        ScriptedMusicGenerator::producing(10.0).with_failures(2),
    );
    let video_id = harness.add_asset("music-down", None).await;

    let err = harness.run(&video_id).await.unwrap_err();

    assert_eq!(err.stage(), Some(PipelineStage::MusicSynthesis));
    assert!(matches!(err.root_cause(), PipelineError::GenerationUnavailable(_)));
    assert_eq!(harness.music.calls(), 2);

    let asset = harness.store.get_asset(&video_id).await.unwrap().unwrap();
    assert_eq!(asset.status, PipelineStatus::MusicFailed);
    assert_eq!(asset.failed_stage, Some(PipelineStage::MusicSynthesis));
    assert!(asset.status_detail.is_some());
    assert!(harness.store.artifacts(&video_id).await.is_empty());

    let status = harness.pipeline.get_status(&video_id).await.unwrap();
    assert_eq!(status.status, PipelineStatus::MusicFailed);
}

#[tokio::test]
async fn test_concurrent_run_for_same_asset_is_rejected() {
    let harness = Harness::new(
        SimulatedMedia::with_duration(10.0),
        ScriptedVisionAnalyzer::responding(VISION_REPLY).with_delay(Duration::from_millis(50)),
        ScriptedMusicGenerator::producing(10.0),
    );
    let video_id = harness.add_asset("busy", None).await;

    let (first, second) = tokio::join!(harness.run(&video_id), harness.run(&video_id));

    assert!(first.is_ok());
    assert!(matches!(second, Err(PipelineError::RunInProgress(id)) if id == video_id));

    // The slot is released once the first run ends.
    assert!(harness.run(&video_id).await.is_ok());
}

#[tokio::test]
async fn test_music_prompt_override_skips_vision() {
    let harness = Harness::standard(10.0, 10.0);
    let video_id = harness.add_asset("override", None).await;
    let options = RunOptions {
        music_prompt_override: Some("slow jazz trio with brushed drums".to_string()),
        ..RunOptions::default()
    };

    harness.pipeline.run_pipeline(&video_id, options).await.unwrap();

    assert_eq!(harness.vision.calls(), 0);
    let prompt = harness.store.active_prompt(&video_id).await.unwrap().unwrap();
    assert_eq!(prompt.source, PromptSource::UserOverride);
    assert!(prompt.validated_prompt.starts_with("Slow jazz trio"));
    assert!(harness
        .store
        .status_history(&video_id)
        .await
        .contains(&PipelineStatus::Analyzed));

    let generation = &harness.store.generations(&video_id).await[0];
    assert_eq!(generation.music_prompt.as_deref(), Some("slow jazz trio with brushed drums"));
}

#[tokio::test]
async fn test_unknown_asset_is_reported() {
    let harness = Harness::standard(10.0, 10.0);
    let missing = VideoId::from("missing");

    assert!(matches!(harness.run(&missing).await, Err(PipelineError::AssetNotFound(_))));
    assert!(matches!(
        harness.pipeline.get_status(&missing).await,
        Err(PipelineError::AssetNotFound(_))
    ));
}

#[tokio::test]
async fn test_unreadable_video_fails_frame_sampling() {
    let harness = Harness::new(
        SimulatedMedia::with_duration(10.0).failing_probe(),
        ScriptedVisionAnalyzer::responding(VISION_REPLY),
        ScriptedMusicGenerator::producing(10.0),
    );
    let video_id = harness.add_asset("broken", None).await;

    let err = harness.run(&video_id).await.unwrap_err();

    assert_eq!(err.stage(), Some(PipelineStage::FrameSampling));
    assert!(matches!(err.root_cause(), PipelineError::UnreadableMedia(_)));
    assert_eq!(
        harness.store.status_history(&video_id).await,
        vec![PipelineStatus::FramesExtracting, PipelineStatus::FramesFailed]
    );
    assert_eq!(harness.vision.calls(), 0);
    assert_eq!(harness.music.calls(), 0);
}

#[tokio::test]
async fn test_recombine_failure_marks_artifact_failed() {
    let harness = Harness::new(
        SimulatedMedia::with_duration(10.0).failing_recombine(),
        ScriptedVisionAnalyzer::responding(VISION_REPLY),
        ScriptedMusicGenerator::producing(10.0),
    );
    let video_id = harness.add_asset("mux", None).await;

    let err = harness.run(&video_id).await.unwrap_err();

    assert_eq!(err.stage(), Some(PipelineStage::Combination));
    let asset = harness.store.get_asset(&video_id).await.unwrap().unwrap();
    assert_eq!(asset.status, PipelineStatus::CombinationFailed);

    let artifacts = harness.store.artifacts(&video_id).await;
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].status, ArtifactStatus::Failed);
    assert_eq!(artifacts[0].attempts, 2);
    assert!(artifacts[0].output_locator.is_none());
}

#[tokio::test]
async fn test_run_leaves_no_scratch_files() {
    let harness = Harness::standard(10.0, 10.0);
    let video_id = harness.add_asset("scratch", None).await;

    harness.run(&video_id).await.unwrap();

    let leftover = std::fs::read_dir(harness.work_dir.path()).unwrap().count();
    assert_eq!(leftover, 0);
    assert_eq!(
        harness.storage.keys_with_prefix("final/scratch/").await.len(),
        1
    );
}

#[tokio::test]
async fn test_failed_runs_leave_no_scratch_files() {
    let harnesses = [
        Harness::new(
            SimulatedMedia::with_duration(10.0).failing_probe(),
            ScriptedVisionAnalyzer::responding(VISION_REPLY),
            ScriptedMusicGenerator::producing(10.0),
        ),
        Harness::new(
            SimulatedMedia::with_duration(10.0).failing_recombine(),
            ScriptedVisionAnalyzer::responding(VISION_REPLY),
            ScriptedMusicGenerator::producing(10.0),
        ),
    ];

    for harness in &harnesses {
        let video_id = harness.add_asset("scratch-fail", None).await;
        harness.run(&video_id).await.unwrap_err();

        let leftover = std::fs::read_dir(harness.work_dir.path()).unwrap().count();
        assert_eq!(leftover, 0);
    }
}
