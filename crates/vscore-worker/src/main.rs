//! Video-to-music worker binary.
//!
//! ```text
//! vscore-worker [--vision-prompt TEXT] [--music-prompt TEXT] <asset-id>...
//! vscore-worker --status <asset-id>
//! ```
//!
//! With `VSCORE_DRY_RUN=1` the arguments are local video files, loaded into
//! in-memory stores and run against scripted model clients.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vscore_ai::{GroqVisionClient, LyriaClient, ScriptedMusicGenerator, ScriptedVisionAnalyzer};
use vscore_firestore::{AssetStore, FirestoreAssetStore, InMemoryAssetStore};
use vscore_media::FfmpegToolkit;
use vscore_models::{VideoAsset, VideoId};
use vscore_storage::{video_key, MemoryObjectStore, ObjectStore, R2Client};
use vscore_worker::metrics::init_metrics;
use vscore_worker::{Pipeline, PipelineConfig, PipelineDeps, PipelineError, RunOptions, WorkerConfig};

/// Length of the scripted track produced in dry runs.
const DRY_RUN_TRACK_SECS: f64 = 12.0;

const DRY_RUN_PROMPT: &str = "Warm Contemporary Film Score, Studio recording, featuring piano and strings, peaceful and uplifting.";

#[derive(Parser, Debug)]
#[command(name = "vscore-worker")]
#[command(about = "Score videos with generated music", long_about = None)]
struct Cli {
    /// Print the status record of an asset and exit
    #[arg(long, value_name = "ASSET_ID", conflicts_with_all = ["vision_prompt", "music_prompt"])]
    status: Option<String>,

    /// Replace the vision instruction for these runs
    #[arg(long)]
    vision_prompt: Option<String>,

    /// Use this music prompt and skip vision analysis
    #[arg(long)]
    music_prompt: Option<String>,

    /// Asset ids, or local video files with VSCORE_DRY_RUN=1
    #[arg(required_unless_present = "status", conflicts_with = "status")]
    targets: Vec<String>,
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            vision_prompt_override: self.vision_prompt.clone(),
            music_prompt_override: self.music_prompt.clone(),
        }
    }
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vscore=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

struct Runtime {
    pipeline: Arc<Pipeline>,
    /// Set in dry runs so local files can be loaded as assets
    dry_run_stores: Option<(Arc<MemoryObjectStore>, Arc<InMemoryAssetStore>)>,
}

async fn build_runtime(worker: &WorkerConfig) -> Result<Runtime, String> {
    let config = PipelineConfig::from_env();
    let media = Arc::new(
        FfmpegToolkit::new()
            .with_frame_timeout(config.timeouts.frames.as_secs())
            .with_encode_timeout(config.timeouts.combine.as_secs())
            .with_search_window(config.frame_search_window_secs),
    );

    if worker.dry_run {
        let storage = Arc::new(MemoryObjectStore::new());
        let store = Arc::new(InMemoryAssetStore::new());
        let deps = PipelineDeps {
            storage: storage.clone(),
            store: store.clone(),
            vision: Arc::new(ScriptedVisionAnalyzer::responding(DRY_RUN_PROMPT)),
            music: Arc::new(ScriptedMusicGenerator::producing(DRY_RUN_TRACK_SECS)),
            media,
        };
        return Ok(Runtime {
            pipeline: Arc::new(Pipeline::new(config, deps, &worker.work_dir)),
            dry_run_stores: Some((storage, store)),
        });
    }

    let storage = R2Client::from_env().map_err(|e| format!("storage: {}", e))?;
    let store = FirestoreAssetStore::from_env().map_err(|e| format!("firestore: {}", e))?;
    let vision = GroqVisionClient::from_env().map_err(|e| format!("vision: {}", e))?;
    let music = LyriaClient::from_env().await.map_err(|e| format!("music: {}", e))?;

    let deps = PipelineDeps {
        storage: Arc::new(storage),
        store: Arc::new(store),
        vision: Arc::new(vision),
        music: Arc::new(music),
        media,
    };
    Ok(Runtime {
        pipeline: Arc::new(Pipeline::new(config, deps, &worker.work_dir)),
        dry_run_stores: None,
    })
}

/// Load a local video into the in-memory stores as a new asset.
async fn seed_local_video(
    storage: &MemoryObjectStore,
    store: &InMemoryAssetStore,
    path: &str,
) -> Result<VideoId, String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("cannot read {}: {}", path, e))?;
    let filename = Path::new(path)
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("video.mp4")
        .to_string();

    let id = VideoId::new();
    let key = video_key(&id, &filename);
    let locator = storage
        .put(bytes, &key, "video/mp4")
        .await
        .map_err(|e| e.to_string())?;
    let asset = VideoAsset::new(id.clone(), locator).with_filename(filename);
    store.create_asset(&asset).await.map_err(|e| e.to_string())?;
    Ok(id)
}

async fn resolve_targets(runtime: &Runtime, targets: Vec<String>) -> Vec<VideoId> {
    let Some((storage, store)) = &runtime.dry_run_stores else {
        return targets.into_iter().map(VideoId::from).collect();
    };

    let mut ids = Vec::with_capacity(targets.len());
    for path in targets {
        match seed_local_video(storage, store, &path).await {
            Ok(id) => {
                info!(video_id = %id, path = %path, "Loaded local video");
                ids.push(id);
            }
            Err(e) => error!("Skipping {}: {}", path, e),
        }
    }
    ids
}

/// Run every asset, at most `max_concurrent_runs` at a time. Returns the
/// number of failed runs.
async fn run_all(pipeline: Arc<Pipeline>, ids: Vec<VideoId>, options: RunOptions, worker: &WorkerConfig) -> usize {
    let semaphore = Arc::new(Semaphore::new(worker.max_concurrent_runs));
    let shutdown = Arc::new(AtomicBool::new(false));

    let signal = {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal; no new runs will start");
                shutdown.store(true, Ordering::SeqCst);
            }
        })
    };

    let mut runs = JoinSet::new();
    let mut skipped = 0usize;
    for id in ids {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        if shutdown.load(Ordering::SeqCst) {
            skipped += 1;
            continue;
        }

        let pipeline = Arc::clone(&pipeline);
        let options = options.clone();
        runs.spawn(async move {
            let _permit = permit;
            let result = pipeline.run_pipeline(&id, options).await;
            (id, result)
        });
    }
    if skipped > 0 {
        warn!("{} runs not started because of shutdown", skipped);
    }

    let mut failures = skipped;
    let drain = async {
        while let Some(joined) = runs.join_next().await {
            match joined {
                Ok((id, Ok(artifact))) => info!(
                    video_id = %id,
                    artifact_id = %artifact.id,
                    locator = artifact.output_locator.as_deref().unwrap_or_default(),
                    "Run completed"
                ),
                Ok((id, Err(e))) => {
                    failures += 1;
                    report_failure(&id, &e);
                }
                Err(e) => {
                    failures += 1;
                    error!("Run task panicked: {}", e);
                }
            }
        }
    };

    if shutdown.load(Ordering::SeqCst) {
        if tokio::time::timeout(worker.shutdown_timeout, drain).await.is_err() {
            warn!("Shutdown timeout reached with runs still in flight");
        }
    } else {
        drain.await;
    }

    signal.abort();
    failures
}

fn report_failure(id: &VideoId, err: &PipelineError) {
    match err.stage() {
        Some(stage) => error!(video_id = %id, stage = %stage, "Run failed: {}", err.root_cause()),
        None => error!(video_id = %id, "Run failed: {}", err),
    }
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let worker = WorkerConfig::from_env();
    info!("Worker config: {:?}", worker);

    if let Some(port) = worker.metrics_port {
        match init_metrics(port) {
            Ok(()) => info!("Serving Prometheus metrics on port {}", port),
            Err(e) => warn!("Failed to start metrics exporter: {}", e),
        }
    }

    let runtime = match build_runtime(&worker).await {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to initialise pipeline: {}", e);
            std::process::exit(1);
        }
    };

    let options = cli.run_options();
    match cli.status {
        Some(id) => match runtime.pipeline.get_status(&VideoId::from(id)).await {
            Ok(record) => match serde_json::to_string_pretty(&record) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    error!("Failed to encode status: {}", e);
                    std::process::exit(1);
                }
            },
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        },
        None => {
            let ids = resolve_targets(&runtime, cli.targets).await;
            let total = ids.len();
            let failures = run_all(Arc::clone(&runtime.pipeline), ids, options, &worker).await;
            info!("Worker finished: {} of {} runs succeeded", total.saturating_sub(failures), total);
            if failures > 0 {
                std::process::exit(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = Cli::try_parse_from(["vscore-worker", "--music-prompt", "Lo-fi piano", "a", "b"]).unwrap();
        assert_eq!(cli.targets, vec!["a", "b"]);
        assert!(cli.status.is_none());
        let options = cli.run_options();
        assert_eq!(options.music_prompt_override.as_deref(), Some("Lo-fi piano"));
        assert!(options.vision_prompt_override.is_none());
    }

    #[test]
    fn test_parse_status_and_errors() {
        let cli = Cli::try_parse_from(["vscore-worker", "--status", "v1"]).unwrap();
        assert_eq!(cli.status.as_deref(), Some("v1"));
        assert!(cli.targets.is_empty());

        assert!(Cli::try_parse_from(["vscore-worker"]).is_err());
        assert!(Cli::try_parse_from(["vscore-worker", "--status"]).is_err());
        assert!(Cli::try_parse_from(["vscore-worker", "--verbose", "v1"]).is_err());
        assert!(Cli::try_parse_from(["vscore-worker", "--status", "v1", "v2"]).is_err());
    }
}
