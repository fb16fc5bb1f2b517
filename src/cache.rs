//! Local cache for downloaded detection models
//!
//! Each model lives in its own directory below the cache root:
//!
//! ```text
//! <cache>/models/<model-id>/model.onnx
//! <cache>/models/<model-id>/labels.json   (optional)
//! ```

use crate::error::{ObjRemovalError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "IMGLY_OBJREMOVE_CACHE_DIR";

/// File name of the network weights inside a model directory
pub const MODEL_FILE: &str = "model.onnx";

/// File name of the optional class-name table inside a model directory
pub const LABELS_FILE: &str = "labels.json";

const DEFAULT_MODEL_URL: &str = "https://huggingface.co/imgly/yolov8n-onnx";

/// Information about a cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    /// Model identifier (derived from URL)
    pub model_id: String,
    /// Path to the cached model directory
    pub path: PathBuf,
    /// Whether a `labels.json` ships with the model
    pub has_labels: bool,
    /// Size of the model directory in bytes
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a cache manager rooted at the user cache directory
    ///
    /// - Linux: `~/.cache/imgly-objremove/models/`
    /// - macOS: `~/Library/Caches/imgly-objremove/models/`
    /// - Windows: `%LOCALAPPDATA%/imgly-objremove/models/`
    ///
    /// `IMGLY_OBJREMOVE_CACHE_DIR` overrides the root.
    ///
    /// # Errors
    /// - No user cache directory could be determined
    /// - The cache directory cannot be created
    pub fn new() -> Result<Self> {
        let cache_dir = Self::get_cache_dir()?;

        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                ObjRemovalError::file_io_error("create cache directory", &cache_dir, &e)
            })?;
        }

        Ok(Self { cache_dir })
    }

    fn get_cache_dir() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var(CACHE_DIR_ENV) {
            return Ok(PathBuf::from(cache_override).join("models"));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                ObjRemovalError::invalid_config(format!(
                    "Failed to determine cache directory. Set {CACHE_DIR_ENV} environment variable."
                ))
            })?
            .join("imgly-objremove")
            .join("models"))
    }

    /// Generate a cache-safe model ID from a URL
    ///
    /// ```
    /// use imgly_objremove::cache::ModelCache;
    ///
    /// let id = ModelCache::url_to_model_id("https://huggingface.co/imgly/yolov8n-onnx");
    /// assert_eq!(id, "imgly--yolov8n-onnx");
    /// ```
    #[must_use]
    pub fn url_to_model_id(url: &str) -> String {
        let prefix = "https://huggingface.co/";
        if let Some(path) = url.strip_prefix(prefix) {
            path.replace('/', "--")
        } else {
            use sha2::{Digest, Sha256};
            let mut hasher = Sha256::new();
            hasher.update(url.as_bytes());
            let hash_string = format!("url-{:x}", hasher.finalize());
            hash_string.get(..16).unwrap_or(&hash_string).to_string()
        }
    }

    /// Whether `model_id` is present and holds a model file
    #[must_use]
    pub fn is_model_cached(&self, model_id: &str) -> bool {
        Self::validate_model_directory(&self.get_model_path(model_id))
    }

    /// Path of a model directory (may not exist)
    #[must_use]
    pub fn get_model_path(&self, model_id: &str) -> PathBuf {
        self.cache_dir.join(model_id)
    }

    /// Path of a model's ONNX file (may not exist)
    #[must_use]
    pub fn get_model_file(&self, model_id: &str) -> PathBuf {
        self.get_model_path(model_id).join(MODEL_FILE)
    }

    /// Path of a model's label table, if one was downloaded
    #[must_use]
    pub fn get_labels_file(&self, model_id: &str) -> Option<PathBuf> {
        let path = self.get_model_path(model_id).join(LABELS_FILE);
        path.is_file().then_some(path)
    }

    /// List every valid model directory, sorted by ID
    ///
    /// # Errors
    /// - The cache directory cannot be read
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();
        for path in self.model_directories()? {
            if let Some(model_info) = Self::analyze_model_directory(&path)? {
                models.push(model_info);
            }
        }
        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(models)
    }

    fn model_directories(&self) -> Result<Vec<PathBuf>> {
        if !self.cache_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            ObjRemovalError::file_io_error("read cache directory", &self.cache_dir, &e)
        })?;

        let mut directories = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| {
                    ObjRemovalError::file_io_error("read cache directory entry", &self.cache_dir, &e)
                })?
                .path();
            if path.is_dir() {
                directories.push(path);
            }
        }
        Ok(directories)
    }

    fn validate_model_directory(model_path: &Path) -> bool {
        model_path.join(MODEL_FILE).is_file()
    }

    fn analyze_model_directory(model_path: &Path) -> Result<Option<CachedModelInfo>> {
        let model_id = model_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ObjRemovalError::invalid_config(format!(
                    "Invalid model directory name: {}",
                    model_path.display()
                ))
            })?
            .to_string();

        if !Self::validate_model_directory(model_path) {
            log::debug!("Skipping invalid model directory: {}", model_path.display());
            return Ok(None);
        }

        Ok(Some(CachedModelInfo {
            model_id,
            path: model_path.to_path_buf(),
            has_labels: model_path.join(LABELS_FILE).is_file(),
            size_bytes: Self::calculate_directory_size(model_path).unwrap_or(0),
        }))
    }

    fn calculate_directory_size(dir_path: &Path) -> Result<u64> {
        let mut total_size = 0;
        Self::visit_dir(dir_path, &mut total_size).map_err(|e| {
            ObjRemovalError::file_io_error("calculate directory size", dir_path, &e)
        })?;
        Ok(total_size)
    }

    fn visit_dir(dir: &Path, total: &mut u64) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                Self::visit_dir(&path, total)?;
            } else {
                *total += entry.metadata()?.len();
            }
        }
        Ok(())
    }

    /// ID of the default detector (YOLOv8n, COCO classes)
    #[must_use]
    pub fn get_default_model_id() -> String {
        Self::url_to_model_id(DEFAULT_MODEL_URL)
    }

    #[must_use]
    pub fn get_default_model_url() -> &'static str {
        DEFAULT_MODEL_URL
    }

    /// Remove directories that do not contain a model file
    ///
    /// # Errors
    /// - The cache directory cannot be read or an entry cannot be removed
    pub fn cleanup_invalid_models(&self) -> Result<Vec<String>> {
        let mut removed_models = Vec::new();
        for path in self.model_directories()? {
            if Self::validate_model_directory(&path) {
                continue;
            }
            log::warn!("Removing invalid model directory: {}", path.display());
            fs::remove_dir_all(&path).map_err(|e| {
                ObjRemovalError::file_io_error("remove invalid model directory", &path, &e)
            })?;
            removed_models.push(directory_name(&path));
        }
        Ok(removed_models)
    }

    /// Remove every cached model, returning the removed IDs
    ///
    /// # Errors
    /// - The cache directory cannot be read or an entry cannot be removed
    pub fn clear_all_models(&self) -> Result<Vec<String>> {
        let mut removed_models = Vec::new();
        for path in self.model_directories()? {
            let model_id = directory_name(&path);
            log::info!("Removing cached model: {}", model_id);
            fs::remove_dir_all(&path).map_err(|e| {
                ObjRemovalError::file_io_error("remove cached model directory", &path, &e)
            })?;
            removed_models.push(model_id);
        }
        Ok(removed_models)
    }

    /// Remove one cached model; `false` when it was not cached
    ///
    /// # Errors
    /// - The model directory cannot be removed
    pub fn clear_specific_model(&self, model_id: &str) -> Result<bool> {
        let model_path = self.get_model_path(model_id);
        if !model_path.exists() {
            return Ok(false);
        }

        log::info!("Removing cached model: {}", model_id);
        fs::remove_dir_all(&model_path).map_err(|e| {
            ObjRemovalError::file_io_error("remove specific cached model", &model_path, &e)
        })?;
        Ok(true)
    }

    /// Cache rooted at `cache_dir` instead of the user cache directory
    ///
    /// # Errors
    /// - The directory cannot be created
    pub fn with_custom_cache_dir(cache_dir: &Path) -> Result<Self> {
        let models_dir = cache_dir.join("models");
        if !models_dir.exists() {
            fs::create_dir_all(&models_dir).map_err(|e| {
                ObjRemovalError::file_io_error("create custom cache directory", &models_dir, &e)
            })?;
        }
        Ok(Self {
            cache_dir: models_dir,
        })
    }

    #[must_use]
    pub fn get_current_cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }
}

fn directory_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Format a byte count for humans
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    let unit = UNITS.get(unit_index).unwrap_or(&"B");
    if unit_index == 0 {
        format!("{bytes} {unit}")
    } else {
        format!("{size:.1} {unit}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_model(cache: &ModelCache, model_id: &str, with_labels: bool) -> PathBuf {
        let path = cache.get_model_path(model_id);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(MODEL_FILE), b"fake onnx bytes").unwrap();
        if with_labels {
            fs::write(path.join(LABELS_FILE), r#"["person","car"]"#).unwrap();
        }
        path
    }

    #[test]
    fn test_url_to_model_id() {
        assert_eq!(
            ModelCache::url_to_model_id("https://huggingface.co/imgly/yolov8n-onnx"),
            "imgly--yolov8n-onnx"
        );
        assert_eq!(
            ModelCache::url_to_model_id("https://huggingface.co/user/model/tree/main"),
            "user--model--tree--main"
        );

        let id = ModelCache::url_to_model_id("https://example.com/yolov8s.onnx");
        assert!(id.starts_with("url-"));
        assert_eq!(id.len(), 16);
        assert_eq!(id, ModelCache::url_to_model_id("https://example.com/yolov8s.onnx"));
        assert_ne!(id, ModelCache::url_to_model_id("https://example.com/yolov8m.onnx"));
    }

    #[test]
    fn test_default_model_constants() {
        assert_eq!(ModelCache::get_default_model_id(), "imgly--yolov8n-onnx");
        assert!(ModelCache::get_default_model_url().starts_with("https://"));
    }

    #[test]
    fn test_custom_cache_dir() {
        let temp_dir = TempDir::new().unwrap();
        let custom_cache = temp_dir.path().join("custom_cache");

        let cache = ModelCache::with_custom_cache_dir(&custom_cache).unwrap();
        assert!(custom_cache.join("models").exists());
        assert_eq!(cache.get_current_cache_dir(), &custom_cache.join("models"));
    }

    #[test]
    fn test_is_model_cached_requires_model_file() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();

        assert!(!cache.is_model_cached("yolo"));
        fs::create_dir_all(cache.get_model_path("yolo")).unwrap();
        assert!(!cache.is_model_cached("yolo"));

        write_model(&cache, "yolo", false);
        assert!(cache.is_model_cached("yolo"));
        assert!(cache.get_labels_file("yolo").is_none());
        assert_eq!(cache.get_model_file("yolo"), cache.get_model_path("yolo").join("model.onnx"));
    }

    #[test]
    fn test_scan_cached_models() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();

        write_model(&cache, "zebra", true);
        write_model(&cache, "alpha", false);
        fs::create_dir_all(cache.get_model_path("broken")).unwrap();
        fs::write(cache.get_current_cache_dir().join("readme.txt"), "info").unwrap();

        let models = cache.scan_cached_models().unwrap();
        let ids: Vec<_> = models.iter().map(|m| m.model_id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zebra"]);
        assert!(!models[0].has_labels);
        assert!(models[1].has_labels);
        assert!(models[1].size_bytes > models[0].size_bytes);
    }

    #[test]
    fn test_scan_missing_cache_dir_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        fs::remove_dir_all(cache.get_current_cache_dir()).unwrap();

        assert!(cache.scan_cached_models().unwrap().is_empty());
        assert!(cache.cleanup_invalid_models().unwrap().is_empty());
        assert!(cache.clear_all_models().unwrap().is_empty());
    }

    #[test]
    fn test_cleanup_invalid_models() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();

        let valid = write_model(&cache, "valid", true);
        let invalid = cache.get_model_path("invalid");
        fs::create_dir_all(&invalid).unwrap();
        fs::write(invalid.join("partial.tmp"), "x").unwrap();

        let removed = cache.cleanup_invalid_models().unwrap();
        assert_eq!(removed, vec!["invalid".to_string()]);
        assert!(valid.exists());
        assert!(!invalid.exists());
    }

    #[test]
    fn test_clear_models() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();

        write_model(&cache, "one", false);
        write_model(&cache, "two", false);

        assert!(cache.clear_specific_model("one").unwrap());
        assert!(!cache.clear_specific_model("one").unwrap());

        let removed = cache.clear_all_models().unwrap();
        assert_eq!(removed, vec!["two".to_string()]);
        assert!(cache.scan_cached_models().unwrap().is_empty());
    }

    #[test]
    fn test_calculate_directory_size() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("size-test");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("a.bin"), "12345").unwrap();
        fs::write(dir.join("nested").join("b.bin"), "abc").unwrap();

        assert_eq!(ModelCache::calculate_directory_size(&dir).unwrap(), 8);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(999), "999 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1024 * 1024 * 6), "6.0 MB");
        assert_eq!(format_size(1024_u64 * 1024 * 1024 * 1024 * 1024), "1024.0 TB");
    }
}
