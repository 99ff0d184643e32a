//! Pipeline orchestration.
//!
//! Drives one asset through frame sampling, analysis, music synthesis and
//! combination. Stages run strictly in order; every status change goes
//! through the [`RunStateMachine`] and is persisted before the next stage
//! starts.

use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::Instrument;
use vscore_ai::{MusicGenerator, VisionAnalyzer};
use vscore_firestore::{AssetStore, StatusUpdate};
use vscore_media::{plan_reconciliation, MediaError, MediaToolkit, ReconcileOptions, RecombineRequest};
use vscore_models::{
    FinalArtifact, FrameRef, FrameSet, MediaFacts, ModelError, MusicGeneration, PipelineStage, PromptRecord,
    PromptSource, RunId, StatusRecord, TrimWindow, VideoAsset, VideoId,
};
use vscore_storage::{final_key, frame_key, ObjectStore};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::RunLogger;
use crate::metrics::{record_analysis_fallback, record_reconcile_policy, record_run, record_stage_duration};
use crate::prompt_checker::PromptChecker;
use crate::prompt_generator::PromptGenerator;
use crate::state_machine::{RunStateMachine, StageEvent};
use crate::synthesizer::{MusicSynthesizer, SynthesisRequest};
use crate::workspace::RunWorkspace;

/// Per-run overrides.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Replaces the vision instruction template
    pub vision_prompt_override: Option<String>,
    /// Used as the raw music prompt; the vision call is skipped
    pub music_prompt_override: Option<String>,
}

/// External collaborators of the pipeline.
#[derive(Clone)]
pub struct PipelineDeps {
    pub storage: Arc<dyn ObjectStore>,
    pub store: Arc<dyn AssetStore>,
    pub vision: Arc<dyn VisionAnalyzer>,
    pub music: Arc<dyn MusicGenerator>,
    pub media: Arc<dyn MediaToolkit>,
}

/// Mutable state of one run.
struct Run {
    asset: VideoAsset,
    run_id: RunId,
    logger: RunLogger,
    fsm: RunStateMachine,
}

/// Output of the frame sampling stage.
struct SampledSource {
    workspace: RunWorkspace,
    video_path: PathBuf,
    facts: MediaFacts,
    window: TrimWindow,
    frames: Vec<Vec<u8>>,
}

/// Validated prompt and where it came from.
struct AnalysisOutcome {
    prompt: String,
    raw: String,
    source: PromptSource,
}

/// Releases the per-asset run slot on drop.
struct ActiveRunGuard<'a> {
    active: &'a Mutex<HashSet<VideoId>>,
    video_id: VideoId,
}

impl Drop for ActiveRunGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.video_id);
    }
}

/// The video-to-music pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    deps: PipelineDeps,
    work_dir: PathBuf,
    generator: PromptGenerator,
    checker: PromptChecker,
    synthesizer: MusicSynthesizer,
    active: Mutex<HashSet<VideoId>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, deps: PipelineDeps, work_dir: impl Into<PathBuf>) -> Self {
        let generator = PromptGenerator::new(
            Arc::clone(&deps.vision),
            config.timeouts.analysis,
            config.prompt_max_length,
        );
        let checker = PromptChecker::new(config.prompt_max_length);
        let synthesizer = MusicSynthesizer::new(
            Arc::clone(&deps.music),
            Arc::clone(&deps.storage),
            Arc::clone(&deps.store),
            config.timeouts.music,
            config.music_retry_backoff,
        );
        Self {
            config,
            deps,
            work_dir: work_dir.into(),
            generator,
            checker,
            synthesizer,
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current status of an asset.
    pub async fn get_status(&self, video_id: &VideoId) -> PipelineResult<StatusRecord> {
        self.deps
            .store
            .get_status(video_id)
            .await?
            .ok_or_else(|| PipelineError::AssetNotFound(video_id.clone()))
    }

    /// Run the whole pipeline for one asset.
    ///
    /// Each call is a fresh run that recomputes everything from the stored
    /// video. A second call for the same asset while one is in flight fails
    /// with [`PipelineError::RunInProgress`].
    pub async fn run_pipeline(&self, video_id: &VideoId, options: RunOptions) -> PipelineResult<FinalArtifact> {
        let _guard = self.claim(video_id)?;

        let asset = self
            .deps
            .store
            .get_asset(video_id)
            .await?
            .ok_or_else(|| PipelineError::AssetNotFound(video_id.clone()))?;

        let run_id = RunId::new();
        let logger = RunLogger::new(video_id, &run_id);
        let span = logger.create_span();
        let mut run = Run {
            asset,
            run_id,
            logger,
            fsm: RunStateMachine::new(),
        };

        async {
            run.logger.log_start(&format!(
                "previous status {}, trim {:?}",
                run.asset.status, run.asset.trim
            ));
            let result = self.execute(&mut run, &options).await;
            match &result {
                Ok(artifact) => {
                    record_run(run.fsm.current().as_str());
                    run.logger.log_completion(&format!(
                        "artifact {} ({:.3}s, fallback={})",
                        artifact.id,
                        artifact.output_duration_secs.unwrap_or_default(),
                        run.fsm.used_fallback()
                    ));
                }
                Err(e) => {
                    record_run(run.fsm.current().as_str());
                    run.logger.log_error(run.fsm.current().as_str(), &e.to_string());
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    fn claim(&self, video_id: &VideoId) -> PipelineResult<ActiveRunGuard<'_>> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(video_id.clone()) {
            return Err(PipelineError::RunInProgress(video_id.clone()));
        }
        Ok(ActiveRunGuard {
            active: &self.active,
            video_id: video_id.clone(),
        })
    }

    async fn execute(&self, run: &mut Run, options: &RunOptions) -> PipelineResult<FinalArtifact> {
        // A new run clears the previous run's fallback flag.
        self.advance(run, PipelineStage::FrameSampling, StageEvent::Start, |u| u.with_fallback(false))
            .await?;
        let started = Instant::now();
        let sampled = self.sample_frames(run).await;
        let source = match sampled {
            Ok(source) => source,
            Err(e) => return Err(self.fail_stage(run, PipelineStage::FrameSampling, e).await),
        };
        record_stage_duration(PipelineStage::FrameSampling.label(), started.elapsed());
        self.advance(run, PipelineStage::FrameSampling, StageEvent::Succeed, |u| u).await?;

        self.advance(run, PipelineStage::Analysis, StageEvent::Start, |u| u).await?;
        let started = Instant::now();
        let analysis = self
            .analyze(run, &source.frames, options)
            .await
            .map_err(|e| e.in_stage(PipelineStage::Analysis))?;
        record_stage_duration(PipelineStage::Analysis.label(), started.elapsed());

        self.advance(run, PipelineStage::MusicSynthesis, StageEvent::Start, |u| u).await?;
        let started = Instant::now();
        let synthesized = self
            .synthesizer
            .synthesize(SynthesisRequest {
                video_id: &run.asset.id,
                run_id: &run.run_id,
                prompt: &analysis.prompt,
                vision_prompt: (analysis.source == PromptSource::VisionModel).then_some(analysis.raw.as_str()),
                music_prompt: (analysis.source == PromptSource::UserOverride).then_some(analysis.raw.as_str()),
            })
            .await;
        let generation = match synthesized {
            Ok(generation) => generation,
            Err(e) => return Err(self.fail_stage(run, PipelineStage::MusicSynthesis, e).await),
        };
        record_stage_duration(PipelineStage::MusicSynthesis.label(), started.elapsed());
        self.advance(run, PipelineStage::MusicSynthesis, StageEvent::Succeed, |u| u).await?;

        self.advance(run, PipelineStage::Combination, StageEvent::Start, |u| u).await?;
        let started = Instant::now();
        let combined = self.combine(run, &source, &generation).await;
        let artifact = match combined {
            Ok(artifact) => artifact,
            Err(e) => return Err(self.fail_stage(run, PipelineStage::Combination, e).await),
        };
        record_stage_duration(PipelineStage::Combination.label(), started.elapsed());
        self.advance(run, PipelineStage::Combination, StageEvent::Succeed, |u| u).await?;

        Ok(artifact)
    }

    /// Apply `event` for `stage` and persist the resulting status.
    async fn advance(
        &self,
        run: &mut Run,
        stage: PipelineStage,
        event: StageEvent,
        decorate: impl FnOnce(StatusUpdate) -> StatusUpdate,
    ) -> PipelineResult<()> {
        let status = run.fsm.apply_in(stage, event)?;
        self.deps
            .store
            .set_status(&run.asset.id, &decorate(StatusUpdate::to(status)))
            .await?;
        run.logger.log_progress(status.as_str(), "status persisted");
        Ok(())
    }

    /// Persist the stage's failure status and return the stage-tagged error.
    async fn fail_stage(&self, run: &mut Run, stage: PipelineStage, err: PipelineError) -> PipelineError {
        run.logger.log_error(stage.label(), &err.to_string());
        match run.fsm.apply_in(stage, StageEvent::Fail) {
            Ok(status) => {
                let update = StatusUpdate::failed(stage, status, err.to_string());
                if let Err(persist) = self.deps.store.set_status(&run.asset.id, &update).await {
                    run.logger
                        .log_error(stage.label(), &format!("failed to persist failure status: {}", persist));
                }
            }
            Err(transition) => run.logger.log_error(stage.label(), &transition.to_string()),
        }
        err.in_stage(stage)
    }

    /// Download, probe, sample and upload frames.
    async fn sample_frames(&self, run: &Run) -> PipelineResult<SampledSource> {
        let timeouts = self.config.timeouts;
        let workspace = RunWorkspace::create(&self.work_dir, &run.run_id).await?;
        let video_path = workspace.source_video(run.asset.filename.as_deref());

        let bytes = bounded("download", timeouts.download, async {
            self.deps
                .storage
                .get_to_file(&run.asset.storage_locator, &video_path)
                .await
                .map_err(PipelineError::from)
        })
        .await?;
        run.logger
            .log_progress(PipelineStage::FrameSampling.label(), &format!("downloaded {} bytes", bytes));

        let info = bounded("probe", timeouts.frames, async {
            self.deps.media.probe_video(&video_path).await.map_err(PipelineError::from)
        })
        .await?;
        let facts = info.facts();
        self.deps.store.update_media_facts(&run.asset.id, &facts).await?;

        let window = run.asset.effective_trim(facts.duration_secs)?;
        let sampler = self
            .deps
            .media
            .frame_sampler(
                &video_path,
                window,
                self.config.frame_count,
                facts.frame_interval(),
                &workspace.frames_dir(),
            )
            .with_search_window(self.config.frame_search_window_secs);
        let sampled = bounded("frame extraction", timeouts.frames, async {
            sampler.collect().await.map_err(PipelineError::from)
        })
        .await?;

        let mut refs = Vec::with_capacity(sampled.len());
        let mut frames = Vec::with_capacity(sampled.len());
        for frame in sampled {
            let key = frame_key(&run.asset.id, &run.run_id, frame.index);
            let locator = self.deps.storage.put(frame.jpeg.clone(), &key, "image/jpeg").await?;
            refs.push(FrameRef {
                index: frame.index,
                requested_secs: frame.requested_secs,
                timestamp_secs: frame.timestamp_secs,
                substituted: frame.substituted,
                locator,
            });
            frames.push(frame.jpeg);
        }
        let frame_set = FrameSet::new(run.asset.id.clone(), run.run_id.clone(), refs);
        self.deps.store.save_frame_set(&frame_set).await?;

        if frame_set.substituted_count() > 0 {
            run.logger.log_warning(
                PipelineStage::FrameSampling.label(),
                &format!("{} frames substituted from nearby timestamps", frame_set.substituted_count()),
            );
        }
        run.logger.log_progress(
            PipelineStage::FrameSampling.label(),
            &format!(
                "{} frames over [{:.3}, {:.3}] of {:.3}s at {:.2} fps",
                frame_set.len(),
                window.start,
                window.end,
                facts.duration_secs,
                facts.fps
            ),
        );

        Ok(SampledSource {
            workspace,
            video_path,
            facts,
            window,
            frames,
        })
    }

    /// Produce, check and record the music prompt. Never fails on model
    /// problems; only persistence errors surface.
    async fn analyze(&self, run: &mut Run, frames: &[Vec<u8>], options: &RunOptions) -> PipelineResult<AnalysisOutcome> {
        let stage = PipelineStage::Analysis.label();

        let (raw, source, fallback_cause) = match options.music_prompt_override.as_deref() {
            Some(prompt) => {
                run.logger.log_progress(stage, "using music prompt override");
                (prompt.to_string(), PromptSource::UserOverride, None)
            }
            None => {
                let generated = self
                    .generator
                    .generate(frames, options.vision_prompt_override.as_deref())
                    .await;
                let cause = generated.cause.map(|e| e.to_string());
                (generated.text, PromptSource::VisionModel, cause)
            }
        };

        let checked = self.checker.check(&raw);
        if !checked.ok {
            let err = PipelineError::PromptInvalid(checked.issues.join("; "));
            run.logger.log_warning(stage, &err.to_string());
        }

        let fallback_cause = fallback_cause.or_else(|| {
            checked
                .used_fallback
                .then(|| "prompt empty after cleaning".to_string())
        });
        let used_fallback = fallback_cause.is_some();

        let record = PromptRecord::new(
            run.asset.id.clone(),
            run.run_id.clone(),
            raw.clone(),
            checked.prompt.clone(),
            source,
        )
        .with_fallback(used_fallback)
        .with_issues(checked.issues);
        self.deps.store.activate_prompt(&record).await?;

        let event = match &fallback_cause {
            Some(cause) => {
                record_analysis_fallback();
                run.logger.log_warning(stage, &format!("using fallback prompt: {}", cause));
                StageEvent::FallBack
            }
            None => StageEvent::Succeed,
        };
        let raw_for_status = raw.clone();
        self.advance(run, PipelineStage::Analysis, event, |u| {
            let u = u.with_fallback(used_fallback).with_vision_analysis(raw_for_status);
            match fallback_cause {
                Some(cause) => u.with_detail(PipelineError::AnalysisUnavailable(cause).to_string()),
                None => u,
            }
        })
        .await?;

        run.logger.log_progress(
            stage,
            &format!("prompt ready (score {}, source {})", checked.score, source.as_str()),
        );
        Ok(AnalysisOutcome {
            prompt: checked.prompt,
            raw,
            source,
        })
    }

    /// Reconcile the generated audio to the window and mux it onto the video.
    async fn combine(
        &self,
        run: &Run,
        source: &SampledSource,
        generation: &MusicGeneration,
    ) -> PipelineResult<FinalArtifact> {
        let target = source.window.duration();
        let mut artifact = FinalArtifact::pending(
            run.asset.id.clone(),
            run.run_id.clone(),
            generation.id.clone(),
            target,
        );
        self.deps.store.save_artifact(&artifact).await?;

        let result = bounded(
            "combination",
            self.config.timeouts.combine,
            self.render(run, source, generation, &mut artifact),
        )
        .await;

        match result {
            Ok(()) => Ok(artifact),
            Err(e) => {
                if artifact.fail(e.to_string(), artifact.attempts).is_ok() {
                    if let Err(persist) = self.deps.store.save_artifact(&artifact).await {
                        run.logger.log_error(
                            PipelineStage::Combination.label(),
                            &format!("failed to persist artifact failure: {}", persist),
                        );
                    }
                }
                Err(e)
            }
        }
    }

    async fn render(
        &self,
        run: &Run,
        source: &SampledSource,
        generation: &MusicGeneration,
        artifact: &mut FinalArtifact,
    ) -> PipelineResult<()> {
        let stage = PipelineStage::Combination.label();
        let workspace = &source.workspace;
        let audio_locator = generation
            .audio_locator
            .as_deref()
            .ok_or(ModelError::MissingLocator("music_generation"))?;

        let raw_audio = workspace.raw_audio();
        self.deps.storage.get_to_file(audio_locator, &raw_audio).await?;
        let audio_secs = self.deps.media.probe_audio_duration(&raw_audio).await?;

        let tolerance = self.config.tolerance_for(source.facts.frame_interval());
        let options = ReconcileOptions {
            tolerance,
            fade_secs: self.config.fade_secs,
            min_loopable_secs: self.config.min_loopable_secs,
        };
        let plan = plan_reconciliation(audio_secs, artifact.target_duration_secs, &options)?;
        record_reconcile_policy(plan.label());
        artifact.mark_processing(plan.label())?;
        self.deps.store.save_artifact(artifact).await?;
        run.logger.log_progress(
            stage,
            &format!(
                "reconciling {:.3}s of audio to {:.3}s ({}, tolerance {:.4}s)",
                audio_secs,
                artifact.target_duration_secs,
                plan.label(),
                tolerance
            ),
        );

        let reconciled = workspace.reconciled_audio();
        self.deps.media.reconcile_audio(&plan, &raw_audio, &reconciled).await?;

        let request = RecombineRequest {
            video: source.video_path.clone(),
            audio: reconciled,
            output: workspace.final_video(),
            window: source.window,
            source_duration: source.facts.duration_secs,
            tolerance,
        };
        let outcome = match self.deps.media.recombine(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if let MediaError::CombinationFailed { attempts, .. } = &e {
                    artifact.attempts = *attempts;
                }
                return Err(e.into());
            }
        };

        let key = final_key(&run.asset.id, &artifact.id);
        let locator = self.deps.storage.put_file(&request.output, &key).await?;
        artifact.complete(locator, outcome.duration, outcome.attempts)?;
        self.deps.store.save_artifact(artifact).await?;
        run.logger.log_progress(
            stage,
            &format!("final video {:.3}s after {} attempt(s)", outcome.duration, outcome.attempts),
        );
        Ok(())
    }
}

/// Bound `fut` by `limit`, mapping expiry to a stage timeout.
async fn bounded<T, F>(operation: &'static str, limit: Duration, fut: F) -> PipelineResult<T>
where
    F: Future<Output = PipelineResult<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| PipelineError::timeout(operation, limit))?
}
