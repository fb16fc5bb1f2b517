//! Video object removal CLI
//!
//! Removes every instance of one object class from videos. Without arguments
//! it asks for the input video and the object on stdin.

use super::config::CliConfigBuilder;
use crate::{
    cache::{format_size, ModelCache, CACHE_DIR_ENV},
    detector::COCO_LABELS,
    download::{validate_model_url, ModelDownloader},
    models::{ModelManager, ModelSource, ModelSpec},
    pipeline::ObjectRemovalPipeline,
    services::{create_cli_progress_reporter, VideoIOService},
    tracing_config::{init_cli_tracing, spans},
    utils::ExecutionProviderManager,
    EraseConfig,
};
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Objects suggested when asking what to remove
pub const COMMON_OBJECTS: [&str; 9] = [
    "person", "car", "dog", "cat", "chair", "bottle", "laptop", "tv", "phone",
];

/// Remove a chosen object class from videos
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "imgly-objremove")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input video files or directories; asks on stdin when omitted
    #[arg(value_name = "INPUT")]
    pub input: Vec<String>,

    /// Object class to remove (e.g. person); asks on stdin when omitted
    #[arg(short = 'T', long)]
    pub target: Option<String>,

    /// Workspace root holding models/, input/ and output/
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub workspace: PathBuf,

    /// Directory for rendered videos [default: <workspace>/output]
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Read inputs in place instead of copying them into <workspace>/input
    #[arg(long)]
    pub no_copy: bool,

    /// Match the target class case-insensitively
    #[arg(long)]
    pub ignore_case: bool,

    /// Fail when the target is not a label of the detector instead of warning
    #[arg(long)]
    pub strict_target: bool,

    /// Only erase detections at or above this confidence
    #[arg(long, value_name = "SCORE")]
    pub min_confidence: Option<f32>,

    /// Detector confidence threshold
    #[arg(long, default_value_t = 0.25)]
    pub conf_threshold: f32,

    /// Detector NMS IoU threshold
    #[arg(long, default_value_t = 0.7)]
    pub iou_threshold: f32,

    /// Square detector input size (multiple of 32)
    #[arg(long, default_value_t = 640)]
    pub input_size: u32,

    /// Model file, model folder, cached model ID or URL [default: <workspace>/models, then the cached default model]
    #[arg(short, long)]
    pub model: Option<String>,

    /// Label table (JSON array or {"0": "person", ...}) overriding the model's labels
    #[arg(long, value_name = "PATH")]
    pub labels: Option<PathBuf>,

    /// URL used when the model has to be downloaded
    #[arg(long, value_name = "URL")]
    pub model_url: Option<String>,

    /// Four-character codec tag of the output video
    #[arg(long, default_value = "mp4v")]
    pub fourcc: String,

    /// Execution provider in format backend:provider (e.g., onnx:auto, onnx:coreml, tract:cpu)
    #[arg(short, long, default_value = "onnx:auto")]
    pub execution_provider: String,

    /// Number of threads (0 = auto-detect optimal threading)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Pattern for directory inputs (e.g., "*.mp4")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Show a progress bar instead of the plain percentage line
    #[arg(long)]
    pub progress: bool,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,

    /// List cached models and exit
    #[arg(long)]
    pub list_models: bool,

    /// Download the model but don't process any video
    #[arg(long)]
    pub only_download: bool,

    /// Clear cached models (combine with --model to clear a specific model)
    #[arg(long)]
    pub clear_cache: bool,

    /// Show current cache directory
    #[arg(long)]
    pub show_cache_dir: bool,

    /// Use custom cache directory
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// List removable object classes and exit
    #[arg(long)]
    pub list_objects: bool,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _tracing_guard = init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    if cli.list_objects {
        list_objects();
        return Ok(());
    }

    let cache = open_cache(&cli)?;

    if cli.show_cache_dir {
        show_current_cache_dir(&cache);
        return Ok(());
    }

    if cli.list_models {
        return list_cached_models(&cache);
    }

    if cli.clear_cache {
        return clear_cache_models(&cli, &cache);
    }

    if cli.only_download {
        return download_model_only(&cli, cache).await;
    }

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;

    println!("=== Video Object Remover ===");

    let inputs = match collect_inputs(&cli)? {
        Some(inputs) => inputs,
        None => {
            println!("No input video selected. Exiting...");
            return Ok(());
        },
    };
    if inputs.is_empty() {
        anyhow::bail!("No video files found in the given inputs");
    }

    let target = match &cli.target {
        Some(target) => target.clone(),
        None => prompt_target()?,
    };
    if target.trim().is_empty() {
        println!("No object selected. Exiting...");
        return Ok(());
    }

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    config
        .workspace
        .ensure_exist()
        .context("Failed to create workspace directories")?;

    println!("Initializing Video Object Remover...");
    ensure_model_available(&cli, &config.model_spec, &cache)
        .await
        .context("Failed to ensure model is available")?;

    let session_id = uuid::Uuid::new_v4().to_string();
    let session_span = spans::session(
        &session_id,
        &config.model_spec.source.display_name(),
        &cli.execution_provider,
    );
    let _session = session_span.enter();

    let mut pipeline = build_pipeline(&cli, config, cache)?;
    println!("Initialization complete!");

    let start_time = Instant::now();
    let mut processed = 0usize;
    for input in &inputs {
        process_video(&cli, &mut pipeline, input, &target)
            .with_context(|| format!("Failed to process {}", input.display()))?;
        processed += 1;
    }

    info!(
        "Processed {} video(s) in {:.2}s",
        processed,
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

fn open_cache(cli: &Cli) -> Result<ModelCache> {
    match &cli.cache_dir {
        Some(dir) => ModelCache::with_custom_cache_dir(dir)
            .context("Failed to create cache with custom directory"),
        None => ModelCache::new().context("Failed to create model cache"),
    }
}

fn build_pipeline(cli: &Cli, config: EraseConfig, cache: ModelCache) -> Result<ObjectRemovalPipeline> {
    let model_manager = ModelManager::from_spec_with_cache(&config.model_spec, cache)
        .context("Failed to resolve detector model")?;
    let pipeline = ObjectRemovalPipeline::with_model_manager(
        config,
        model_manager,
        &crate::inference::DefaultBackendFactory,
    )
    .context("Failed to create object removal pipeline")?;

    let reporter = create_cli_progress_reporter(cli.progress, cli.verbose > 0);
    Ok(pipeline.with_progress(reporter))
}

/// Inputs from the command line, or one path asked on stdin.
///
/// `None` means the user declined to pick a file.
fn collect_inputs(cli: &Cli) -> Result<Option<Vec<PathBuf>>> {
    if cli.input.is_empty() {
        println!("\nSelect your input video...");
        let answer = prompt("Path to input video: ")?;
        let answer = answer.trim().trim_matches(|c| c == '"' || c == '\'');
        if answer.is_empty() {
            return Ok(None);
        }
        return Ok(Some(vec![PathBuf::from(answer)]));
    }

    let mut files = Vec::new();
    for input in &cli.input {
        let path = Path::new(input);
        if path.is_dir() {
            let mut found = find_video_files(path, cli.recursive, cli.pattern.as_deref())?;
            found.sort();
            files.extend(found);
        } else {
            files.push(path.to_path_buf());
        }
    }
    Ok(Some(files))
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush().context("Failed to flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line)
}

fn prompt_target() -> Result<String> {
    print_common_objects();
    let answer = prompt("\nWhat would you like to remove? ")?;
    Ok(answer.trim().to_lowercase())
}

fn print_common_objects() {
    println!("\nCommon objects that can be removed:");
    for object in COMMON_OBJECTS {
        println!("- {object}");
    }
}

fn list_objects() {
    print_common_objects();
    println!("\nAll classes of the default detector:");
    for chunk in COCO_LABELS.chunks(6) {
        println!("  {}", chunk.join(", "));
    }
}

fn process_video(
    cli: &Cli,
    pipeline: &mut ObjectRemovalPipeline,
    input: &Path,
    target: &str,
) -> Result<()> {
    let workspace = &pipeline.config().workspace;
    let input = if cli.no_copy {
        input.to_path_buf()
    } else {
        VideoIOService::stage_input(input, workspace).context("Failed to stage input video")?
    };
    let output = VideoIOService::derive_output_path(&input, target, &workspace.output)?;

    let _span = spans::video_processing(&input, target).entered();
    println!("\nProcessing video to remove {target}...");
    run_job(pipeline, &input, &output, target)?;
    println!("\n\nDone! Processed video saved to: {}", output.display());
    Ok(())
}

#[cfg(feature = "video-support")]
fn run_job(
    pipeline: &mut ObjectRemovalPipeline,
    input: &Path,
    output: &Path,
    target: &str,
) -> Result<()> {
    let job = crate::types::VideoJob::probe(input, output, target).context("Failed to read video metadata")?;
    info!(
        "{}x{} @ {:.2} fps, {} frames",
        job.frame_dimensions().0,
        job.frame_dimensions().1,
        job.frame_rate(),
        job.frame_count()
    );
    let summary = pipeline.run_file(&job)?;
    info!(
        "{} of {} frames inpainted",
        summary.frames_modified, summary.frames_processed
    );
    Ok(())
}

#[cfg(not(feature = "video-support"))]
fn run_job(
    _pipeline: &mut ObjectRemovalPipeline,
    _input: &Path,
    _output: &Path,
    _target: &str,
) -> Result<()> {
    anyhow::bail!("Video support not enabled. Rebuild with --features video-support")
}

/// Download the configured model when it is not cached yet
async fn ensure_model_available(cli: &Cli, model_spec: &ModelSpec, cache: &ModelCache) -> Result<()> {
    let ModelSource::Downloaded(model_id) = &model_spec.source else {
        return Ok(());
    };
    if cache.is_model_cached(model_id) {
        return Ok(());
    }

    let url = CliConfigBuilder::download_url_for(cli, model_id).with_context(|| {
        format!(
            "Model '{model_id}' not found in cache. Use --model-url to say where to download it from, or --list-models to see cached models."
        )
    })?;

    println!("Downloading AI model (this will happen only once)...");
    let downloader = ModelDownloader::with_cache(cache.clone())
        .context("Failed to create model downloader")?;
    let _span = spans::download(&url).entered();
    let downloaded_id = downloader
        .download_model(&url, true)
        .await
        .context("Failed to download model")?;

    if downloaded_id != *model_id {
        anyhow::bail!(
            "Downloaded model ID '{}' doesn't match expected '{}'",
            downloaded_id,
            model_id
        );
    }
    Ok(())
}

fn show_provider_diagnostics() {
    println!("🔍 Backend and Execution Provider Diagnostics");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("💻 System: {cpu_count} CPU cores detected");

    println!("\n🚀 Execution Providers:");
    for provider_info in ExecutionProviderManager::list_all_providers() {
        let status = if provider_info.available {
            "✅ Available"
        } else {
            "❌ Not Available"
        };
        println!(
            "  • {}: {} - {}",
            provider_info.name, status, provider_info.description
        );
    }

    println!("\n💡 Usage Examples:");
    println!("  --execution-provider onnx:auto    # Auto-select best ONNX provider (default)");
    println!("  --execution-provider onnx:cuda    # Use NVIDIA CUDA");
    println!("  --execution-provider tract:cpu    # Use pure Rust Tract backend");
}

fn list_cached_models(cache: &ModelCache) -> Result<()> {
    let models = cache
        .scan_cached_models()
        .context("Failed to list cached models")?;

    println!("📦 Cached Models");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if models.is_empty() {
        println!("No cached models found.");
        println!("\n💡 To download the default detector, use:");
        println!("  imgly-objremove --only-download");
        return Ok(());
    }

    for model in models {
        println!("📁 Model ID: {}", model.model_id);
        println!("  └─ Cache location: {}", model.path.display());
        println!("  └─ Size: {}", format_size(model.size_bytes));
        println!(
            "  └─ Labels: {}",
            if model.has_labels {
                "labels.json"
            } else {
                "COCO (built in)"
            }
        );
        println!();
    }

    Ok(())
}

async fn download_model_only(cli: &Cli, cache: ModelCache) -> Result<()> {
    let model_url = match (&cli.model_url, &cli.model) {
        (Some(url), _) => url.clone(),
        (None, Some(model)) if model.starts_with("http") => model.clone(),
        (None, Some(_)) => {
            anyhow::bail!("--only-download requires a URL. Use --model-url with a URL like {}", ModelCache::get_default_model_url())
        },
        (None, None) => ModelCache::get_default_model_url().to_string(),
    };

    validate_model_url(&model_url).context("Invalid model URL")?;
    println!("📦 Downloading model from: {model_url}");

    let downloader = ModelDownloader::with_cache(cache).context("Failed to create model downloader")?;
    let model_id = downloader
        .download_model(&model_url, true)
        .await
        .context("Failed to download model")?;

    println!("✅ Successfully downloaded model!");
    println!("   Model ID: {model_id}");
    println!(
        "   Cache location: {}",
        downloader.cache().get_model_path(&model_id).display()
    );
    println!("\n💡 To use this model:");
    println!("   imgly-objremove --model {model_id} input.mp4");
    Ok(())
}

fn clear_cache_models(cli: &Cli, cache: &ModelCache) -> Result<()> {
    if let Some(model_id) = &cli.model {
        println!("🗑️  Clearing specific model: {model_id}");
        if cache
            .clear_specific_model(model_id)
            .with_context(|| format!("Failed to clear model '{model_id}'"))?
        {
            println!("✅ Successfully removed model: {model_id}");
        } else {
            println!("⚠️  Model '{model_id}' not found in cache");
            println!("   Use --list-models to see available models");
        }
    } else {
        println!("🗑️  Clearing entire model cache...");
        let removed = cache.clear_all_models().context("Failed to clear cache")?;
        if removed.is_empty() {
            println!("💡 Cache was already empty");
        } else {
            println!("✅ Successfully removed {} model(s):", removed.len());
            for model_id in &removed {
                println!("   • {model_id}");
            }
        }
    }
    println!(
        "   Cache location: {}",
        cache.get_current_cache_dir().display()
    );
    Ok(())
}

fn show_current_cache_dir(cache: &ModelCache) {
    println!("📁 Current cache directory:");
    println!("   Path: {}", cache.get_current_cache_dir().display());
    if std::env::var(CACHE_DIR_ENV).is_ok() {
        println!("   Source: {CACHE_DIR_ENV} environment variable");
    } else {
        println!("   Source: platform cache directory");
    }
    println!("\n💡 To use a custom cache directory:");
    println!("   imgly-objremove --cache-dir /path/to/custom/cache");
    println!("   or set {CACHE_DIR_ENV}");
}

/// Video files in a directory, optionally recursive and filtered by a glob
fn find_video_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let pattern = pattern
        .map(glob::Pattern::new)
        .transpose()
        .context("Invalid --pattern")?;
    let matches = |path: &Path| {
        VideoIOService::is_supported_format(path)
            && pattern.as_ref().map_or(true, |p| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| p.matches(name))
            })
    };

    let mut files = Vec::new();
    let max_depth = if recursive { usize::MAX } else { 1 };
    for entry in walkdir::WalkDir::new(dir).max_depth(max_depth) {
        let entry = entry?;
        if entry.file_type().is_file() && matches(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parses_defaults() {
        let cli = Cli::parse_from(["imgly-objremove", "clip.mp4", "--target", "person"]);
        assert_eq!(cli.input, vec!["clip.mp4".to_string()]);
        assert_eq!(cli.target.as_deref(), Some("person"));
        assert_eq!(cli.fourcc, "mp4v");
        assert_eq!(cli.execution_provider, "onnx:auto");
        assert!(!cli.ignore_case);
        assert!(!cli.strict_target);
    }

    #[test]
    fn test_cli_accepts_no_input_for_prompting() {
        let cli = Cli::parse_from(["imgly-objremove"]);
        assert!(cli.input.is_empty());
        assert!(cli.target.is_none());
    }

    #[test]
    fn test_find_video_files_filters_by_extension_and_pattern() {
        let dir = TempDir::new().unwrap();
        for name in ["a.mp4", "b.MOV", "notes.txt", "c.avi"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/d.mp4"), b"x").unwrap();

        let mut flat = find_video_files(dir.path(), false, None).unwrap();
        flat.sort();
        let names: Vec<_> = flat
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.mp4", "b.MOV", "c.avi"]);

        let recursive = find_video_files(dir.path(), true, Some("*.mp4")).unwrap();
        assert_eq!(recursive.len(), 2);
    }

    #[test]
    fn test_common_objects_mostly_known_to_coco() {
        let unknown: Vec<_> = COMMON_OBJECTS
            .iter()
            .filter(|o| !COCO_LABELS.contains(o))
            .collect();
        assert_eq!(unknown, vec![&"phone"]);
    }
}
