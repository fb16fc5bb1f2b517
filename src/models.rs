//! Detector model resolution and loading

use crate::cache::{ModelCache, LABELS_FILE, MODEL_FILE};
use crate::error::{ObjRemovalError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Where the detector weights come from
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ModelSource {
    /// An `.onnx` file, or a directory holding `model.onnx`
    External(PathBuf),
    /// A model in the local cache, by model ID
    Downloaded(String),
}

impl ModelSource {
    /// Short name for logs
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            ModelSource::External(path) => {
                format!(
                    "external:{}",
                    path.file_name().unwrap_or_default().to_string_lossy()
                )
            },
            ModelSource::Downloaded(model_id) => format!("cached:{model_id}"),
        }
    }
}

/// Model source plus an optional label table override
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelSpec {
    pub source: ModelSource,
    /// JSON label table replacing the one shipped with the model
    pub labels: Option<PathBuf>,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self::downloaded(ModelCache::get_default_model_id())
    }
}

impl ModelSpec {
    #[must_use]
    pub fn external<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            source: ModelSource::External(path.into()),
            labels: None,
        }
    }

    #[must_use]
    pub fn downloaded<S: Into<String>>(model_id: S) -> Self {
        Self {
            source: ModelSource::Downloaded(model_id.into()),
            labels: None,
        }
    }

    #[must_use]
    pub fn with_labels<P: Into<PathBuf>>(mut self, labels: P) -> Self {
        self.labels = Some(labels.into());
        self
    }
}

/// Access to the bytes and label table of one model
pub trait ModelProvider: std::fmt::Debug {
    /// Load the ONNX bytes
    ///
    /// # Errors
    /// - The model file cannot be read
    fn load_model_data(&self) -> Result<Vec<u8>>;

    /// Path of the ONNX file
    ///
    /// # Errors
    /// - The provider has no file on disk
    fn get_model_path(&self) -> Result<PathBuf>;

    /// Label table shipped next to the model, if any
    ///
    /// # Errors
    /// - A label file exists but cannot be parsed
    fn load_labels(&self) -> Result<Option<Vec<String>>>;
}

fn read_model_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        ObjRemovalError::model_error_with_context(
            "read model file",
            path,
            &e.to_string(),
            &[
                "check that the file exists and is readable",
                "download the default detector with --only-download",
            ],
        )
    })
}

/// Model loaded from a path chosen by the user
#[derive(Debug)]
pub struct ExternalModelProvider {
    model_path: PathBuf,
}

impl ExternalModelProvider {
    /// Accepts an `.onnx` file or a directory containing `model.onnx`
    ///
    /// # Errors
    /// - The path does not lead to a model file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let model_path = if path.is_dir() {
            path.join(MODEL_FILE)
        } else {
            path.to_path_buf()
        };

        if !model_path.is_file() {
            return Err(ObjRemovalError::model_error_with_context(
                "locate model",
                &model_path,
                "model file not found",
                &["pass an .onnx file or a directory containing model.onnx"],
            ));
        }

        Ok(Self { model_path })
    }
}

impl ModelProvider for ExternalModelProvider {
    fn load_model_data(&self) -> Result<Vec<u8>> {
        read_model_file(&self.model_path)
    }

    fn get_model_path(&self) -> Result<PathBuf> {
        Ok(self.model_path.clone())
    }

    fn load_labels(&self) -> Result<Option<Vec<String>>> {
        let Some(dir) = self.model_path.parent() else {
            return Ok(None);
        };
        let labels_path = dir.join(LABELS_FILE);
        if labels_path.is_file() {
            load_labels_file(&labels_path).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Model held in the local cache
#[derive(Debug)]
pub struct DownloadedModelProvider {
    cache: ModelCache,
    model_id: String,
}

impl DownloadedModelProvider {
    /// # Errors
    /// - The model is not in `cache`
    pub fn new(cache: ModelCache, model_id: String) -> Result<Self> {
        if !cache.is_model_cached(&model_id) {
            return Err(ObjRemovalError::model_error_with_context(
                "load cached model",
                cache.get_model_path(&model_id),
                &format!("model '{model_id}' is not cached"),
                &[
                    "run with --only-download to fetch the default detector",
                    "use --list-models to see cached models",
                ],
            ));
        }
        Ok(Self { cache, model_id })
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

impl ModelProvider for DownloadedModelProvider {
    fn load_model_data(&self) -> Result<Vec<u8>> {
        read_model_file(&self.cache.get_model_file(&self.model_id))
    }

    fn get_model_path(&self) -> Result<PathBuf> {
        Ok(self.cache.get_model_file(&self.model_id))
    }

    fn load_labels(&self) -> Result<Option<Vec<String>>> {
        self.cache
            .get_labels_file(&self.model_id)
            .map(|path| load_labels_file(&path))
            .transpose()
    }
}

/// Resolves a [`ModelSpec`] to model bytes and class names
#[derive(Debug)]
pub struct ModelManager {
    provider: Box<dyn ModelProvider>,
    labels_override: Option<PathBuf>,
    display_name: String,
}

impl ModelManager {
    /// Resolve against the default cache
    ///
    /// # Errors
    /// - The cache cannot be opened
    /// - The model cannot be found
    pub fn from_spec(spec: &ModelSpec) -> Result<Self> {
        match &spec.source {
            ModelSource::External(_) => Self::build(spec, None),
            ModelSource::Downloaded(_) => Self::build(spec, Some(ModelCache::new()?)),
        }
    }

    /// Resolve against an explicit cache
    ///
    /// # Errors
    /// - The model cannot be found
    pub fn from_spec_with_cache(spec: &ModelSpec, cache: ModelCache) -> Result<Self> {
        Self::build(spec, Some(cache))
    }

    fn build(spec: &ModelSpec, cache: Option<ModelCache>) -> Result<Self> {
        let provider: Box<dyn ModelProvider> = match (&spec.source, cache) {
            (ModelSource::External(path), _) => Box::new(ExternalModelProvider::new(path)?),
            (ModelSource::Downloaded(model_id), Some(cache)) => {
                Box::new(DownloadedModelProvider::new(cache, model_id.clone())?)
            },
            (ModelSource::Downloaded(_), None) => {
                return Err(ObjRemovalError::internal("cached model requested without a cache"))
            },
        };

        Ok(Self {
            provider,
            labels_override: spec.labels.clone(),
            display_name: spec.source.display_name(),
        })
    }

    /// Wrap an already constructed provider
    #[must_use]
    pub fn with_provider(provider: Box<dyn ModelProvider>, display_name: &str) -> Self {
        Self {
            provider,
            labels_override: None,
            display_name: display_name.to_string(),
        }
    }

    /// # Errors
    /// - The model file cannot be read
    pub fn load_model(&self) -> Result<Vec<u8>> {
        self.provider.load_model_data()
    }

    /// # Errors
    /// - The provider has no file on disk
    pub fn get_model_path(&self) -> Result<PathBuf> {
        self.provider.get_model_path()
    }

    /// Class names for the model's output channels
    ///
    /// An explicit label file in the `ModelSpec` wins over the table shipped with
    /// the model. `None` means the caller should assume COCO order.
    ///
    /// # Errors
    /// - A label file exists but cannot be parsed
    pub fn load_labels(&self) -> Result<Option<Vec<String>>> {
        match &self.labels_override {
            Some(path) => load_labels_file(path).map(Some),
            None => self.provider.load_labels(),
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

/// Parse a label table
///
/// Accepts either a JSON array of names in class order or an object mapping
/// class indices to names (`{"0": "person", "1": "bicycle"}`).
///
/// # Errors
/// - Malformed JSON, an empty table, or non-contiguous indices
pub fn parse_labels(json: &str) -> Result<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| ObjRemovalError::model(format!("Invalid label table: {e}")))?;

    let labels = match value {
        serde_json::Value::Array(_) => serde_json::from_value::<Vec<String>>(value)
            .map_err(|e| ObjRemovalError::model(format!("Invalid label table: {e}")))?,
        serde_json::Value::Object(map) => {
            let mut indexed = BTreeMap::new();
            for (key, name) in map {
                let index: usize = key.parse().map_err(|_| {
                    ObjRemovalError::model(format!("Label index '{key}' is not a number"))
                })?;
                let name = name.as_str().ok_or_else(|| {
                    ObjRemovalError::model(format!("Label {index} is not a string"))
                })?;
                indexed.insert(index, name.to_string());
            }
            if indexed.keys().copied().ne(0..indexed.len()) {
                return Err(ObjRemovalError::model(
                    "Label indices must run from 0 without gaps",
                ));
            }
            indexed.into_values().collect()
        },
        _ => {
            return Err(ObjRemovalError::model(
                "Label table must be a JSON array or object",
            ))
        },
    };

    if labels.is_empty() {
        return Err(ObjRemovalError::model("Label table is empty"));
    }
    Ok(labels)
}

/// Read and parse a label table from disk
///
/// # Errors
/// - The file cannot be read or parsed
pub fn load_labels_file(path: &Path) -> Result<Vec<String>> {
    let json = fs::read_to_string(path)
        .map_err(|e| ObjRemovalError::file_io_error("read label table", path, &e))?;
    parse_labels(&json)
}
