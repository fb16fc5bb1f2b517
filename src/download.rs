//! Model downloading
//!
//! Fetches a detector into the [`ModelCache`] from either a `HuggingFace`
//! repository or a direct `.onnx` URL. Files land in a temporary directory
//! first and are moved into the cache only once the model file is complete.

use crate::cache::{ModelCache, LABELS_FILE, MODEL_FILE};
use crate::error::{ObjRemovalError, Result};
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

const HUGGINGFACE_PREFIX: &str = "https://huggingface.co/";

/// Locations tried, in order, for the network weights inside a repository
const REPOSITORY_MODEL_FILES: &[&str] = &["model.onnx", "onnx/model.onnx"];

/// Where a model is fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelLocation {
    /// `https://huggingface.co/<user>/<repo>`; weights and optional labels are resolved inside it
    Repository(String),
    /// A URL pointing straight at an `.onnx` file; no label table is fetched
    File(String),
}

impl ModelLocation {
    /// Classify a model URL
    ///
    /// # Errors
    /// - The URL is neither a `HuggingFace` repository nor an `.onnx` file over HTTP(S)
    pub fn parse(url: &str) -> Result<Self> {
        validate_model_url(url)?;
        if is_onnx_file_url(url) {
            Ok(Self::File(url.to_string()))
        } else {
            Ok(Self::Repository(url.trim_end_matches('/').to_string()))
        }
    }

    /// Candidate URLs for the model weights
    #[must_use]
    pub fn model_urls(&self) -> Vec<String> {
        match self {
            Self::Repository(base) => REPOSITORY_MODEL_FILES
                .iter()
                .map(|file| format!("{base}/resolve/main/{file}"))
                .collect(),
            Self::File(url) => vec![url.clone()],
        }
    }

    #[must_use]
    pub fn labels_url(&self) -> Option<String> {
        match self {
            Self::Repository(base) => Some(format!("{base}/resolve/main/{LABELS_FILE}")),
            Self::File(_) => None,
        }
    }
}

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {},
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {},
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {},
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {},
        }
    }
}

/// Model downloader with progress reporting
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

impl ModelDownloader {
    /// Create a downloader writing into the default cache
    ///
    /// # Errors
    /// - The HTTP client cannot be built
    /// - The cache directory cannot be created
    pub fn new() -> Result<Self> {
        Self::with_cache(ModelCache::new()?)
    }

    /// Create a downloader writing into `cache`
    ///
    /// # Errors
    /// - The HTTP client cannot be built
    pub fn with_cache(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| ObjRemovalError::network_error("Failed to create HTTP client", e))?;
        Ok(Self { client, cache })
    }

    /// Download a model into the cache and return its model ID
    ///
    /// Already cached models are not fetched again.
    ///
    /// # Errors
    /// - Unsupported URL
    /// - Network or HTTP errors while fetching the model file
    /// - File system errors while moving the model into the cache
    pub async fn download_model(&self, url: &str, show_progress: bool) -> Result<String> {
        let location = ModelLocation::parse(url)?;
        let model_id = ModelCache::url_to_model_id(url);
        log::info!("Downloading model from: {}", url);
        log::info!("Model ID: {}", model_id);

        if self.cache.is_model_cached(&model_id) {
            log::info!("Model already cached: {}", model_id);
            return Ok(model_id);
        }

        let temp_dir = Self::create_temp_download_dir(&model_id)?;
        let final_dir = self.cache.get_model_path(&model_id);

        let progress = show_progress.then(Self::create_progress_indicator);

        match self
            .download_model_files(&location, &temp_dir, progress.as_ref())
            .await
        {
            Ok(()) => {
                if final_dir.exists() {
                    fs::remove_dir_all(&final_dir).map_err(|e| {
                        ObjRemovalError::file_io_error(
                            "remove existing model directory",
                            &final_dir,
                            &e,
                        )
                    })?;
                }

                fs::rename(&temp_dir, &final_dir).map_err(|e| {
                    ObjRemovalError::file_io_error("move downloaded model to cache", &final_dir, &e)
                })?;

                if let Some(pb) = progress {
                    pb.finish_with_message(format!("✅ Downloaded {model_id}"));
                }

                log::info!("Successfully downloaded model: {}", model_id);
                Ok(model_id)
            },
            Err(e) => {
                if temp_dir.exists() {
                    if let Err(cleanup_err) = fs::remove_dir_all(&temp_dir) {
                        log::warn!("Failed to cleanup temp directory: {}", cleanup_err);
                    }
                }

                if let Some(pb) = progress {
                    pb.finish_with_message("❌ Download failed".to_string());
                }

                Err(e)
            },
        }
    }

    fn create_temp_download_dir(model_id: &str) -> Result<PathBuf> {
        let temp_dir = std::env::temp_dir().join(format!("imgly-objremove-{model_id}"));

        if temp_dir.exists() {
            fs::remove_dir_all(&temp_dir).map_err(|e| {
                ObjRemovalError::file_io_error("remove existing temp directory", &temp_dir, &e)
            })?;
        }

        fs::create_dir_all(&temp_dir)
            .map_err(|e| ObjRemovalError::file_io_error("create temp directory", &temp_dir, &e))?;

        Ok(temp_dir)
    }

    fn create_progress_indicator() -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(100);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            ProgressIndicator::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            ProgressIndicator::NoOp
        }
    }

    async fn download_model_files(
        &self,
        location: &ModelLocation,
        download_dir: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<()> {
        let model_path = download_dir.join(MODEL_FILE);
        let mut last_error = None;

        for url in location.model_urls() {
            if let Some(pb) = progress {
                pb.set_message("Downloading model".to_string());
            }
            match self.download_file(&url, &model_path, progress).await {
                Ok(()) => {
                    last_error = None;
                    break;
                },
                Err(e) => {
                    log::debug!("Model not found at {}: {}", url, e);
                    last_error = Some(e);
                },
            }
        }

        if let Some(e) = last_error {
            return Err(e);
        }

        // The label table is optional; a missing one falls back to COCO names.
        if let Some(labels_url) = location.labels_url() {
            if let Some(pb) = progress {
                pb.set_message("Downloading labels".to_string());
            }
            let labels_path = download_dir.join(LABELS_FILE);
            if let Err(e) = self.download_file(&labels_url, &labels_path, progress).await {
                log::info!("No label table published with the model: {}", e);
                if labels_path.exists() {
                    fs::remove_file(&labels_path).map_err(|e| {
                        ObjRemovalError::file_io_error("remove partial labels", &labels_path, &e)
                    })?;
                }
            }
        }

        Ok(())
    }

    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<()> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ObjRemovalError::file_io_error("create directory", parent, &e))?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ObjRemovalError::network_error(&format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(ObjRemovalError::network_error(
                &format!("Failed to download {url}"),
                format!("HTTP {}", response.status()),
            ));
        }

        let total_size = response.content_length();

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| ObjRemovalError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut downloaded = 0u64;
        let mut buffer = vec![0; 8192];

        loop {
            let bytes_read = tokio::io::AsyncReadExt::read(&mut stream, &mut buffer)
                .await
                .map_err(|e| ObjRemovalError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break;
            }

            file.write_all(buffer.get(..bytes_read).unwrap_or(&[]))
                .await
                .map_err(|e| ObjRemovalError::file_io_error("write to file", local_path, &e))?;

            downloaded += bytes_read as u64;

            if let Some(pb) = progress {
                if let Some(total) = total_size {
                    pb.set_length(total);
                    pb.set_position(downloaded);
                } else {
                    pb.set_message(format!(
                        "Downloaded {:.1} MB",
                        downloaded as f64 / 1_048_576.0
                    ));
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| ObjRemovalError::file_io_error("flush file", local_path, &e))?;

        log::debug!("Downloaded {} bytes to {}", downloaded, local_path.display());
        Ok(())
    }

    /// Compare a file's SHA-256 with `expected_hash`; `None` skips the check
    ///
    /// # Errors
    /// - The file cannot be read
    pub fn verify_file_integrity(
        &self,
        file_path: &Path,
        expected_hash: Option<&str>,
    ) -> Result<bool> {
        let Some(expected) = expected_hash else {
            return Ok(true);
        };

        let contents = fs::read(file_path).map_err(|e| {
            ObjRemovalError::file_io_error("read file for verification", file_path, &e)
        })?;

        let actual_hash = format!("{:x}", Sha256::digest(&contents));
        if actual_hash.eq_ignore_ascii_case(expected) {
            Ok(true)
        } else {
            log::warn!(
                "File integrity check failed for {}: expected {}, got {}",
                file_path.display(),
                expected,
                actual_hash
            );
            Ok(false)
        }
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

fn is_onnx_file_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"))
}

/// Check that a URL names a downloadable model
///
/// Accepted forms are `HuggingFace` repositories
/// (`https://huggingface.co/<user>/<repo>`) and any HTTP(S) URL ending in `.onnx`.
///
/// # Errors
/// - Empty URL, unsupported scheme, or incomplete repository path
pub fn validate_model_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(ObjRemovalError::invalid_config("Model URL cannot be empty"));
    }

    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(ObjRemovalError::invalid_config(format!(
            "Unsupported URL format: {url}. Use a HuggingFace repository or a direct .onnx URL"
        )));
    }

    if is_onnx_file_url(url) {
        return Ok(());
    }

    let Some(repo_path) = url.strip_prefix(HUGGINGFACE_PREFIX) else {
        return Err(ObjRemovalError::invalid_config(format!(
            "Unsupported URL format: {url}. Only HuggingFace repositories or .onnx files are supported"
        )));
    };

    let mut parts = repo_path.split('/').filter(|p| !p.is_empty());
    if parts.next().is_none() || parts.next().is_none() {
        return Err(ObjRemovalError::invalid_config(format!(
            "Invalid HuggingFace repository URL: {url}. Expected format: https://huggingface.co/username/repo-name"
        )));
    }

    Ok(())
}

/// Split a `HuggingFace` repository URL into `(username, repository)`
///
/// # Errors
/// - The URL is not a `HuggingFace` repository URL
pub fn parse_huggingface_url(url: &str) -> Result<(String, String)> {
    validate_model_url(url)?;

    let mut parts = url
        .strip_prefix(HUGGINGFACE_PREFIX)
        .unwrap_or_default()
        .split('/')
        .filter(|p| !p.is_empty());

    match (parts.next(), parts.next()) {
        (Some(user), Some(repo)) => Ok((user.to_string(), repo.to_string())),
        _ => Err(ObjRemovalError::invalid_config(format!(
            "Invalid HuggingFace URL format: {url}"
        ))),
    }
}
