//! Configuration types for object removal runs

use crate::backends::video::FourCc;
use crate::error::{ObjRemovalError, Result};
use crate::inpaint::INPAINT_RADIUS;
use crate::mask::MaskPolicy;
use crate::models::ModelSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Inference engine used to run the detector model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    #[default]
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Detector thresholds applied inside the model adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorParams {
    /// Square model input side in pixels
    pub input_size: u32,
    /// Minimum class score for a candidate box
    pub conf_threshold: f32,
    /// IoU above which a lower-scored box of the same class is suppressed
    pub iou_threshold: f32,
    /// Upper bound on detections per frame
    pub max_detections: usize,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

impl DetectorParams {
    /// Validate ranges
    ///
    /// # Errors
    /// - Input size not a positive multiple of 32
    /// - Thresholds outside `0.0..=1.0`
    /// - Zero `max_detections`
    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 || self.input_size % 32 != 0 {
            return Err(ObjRemovalError::config_value_error(
                "detector input size",
                self.input_size,
                "positive multiple of 32",
                Some(640),
            ));
        }
        if !(0.0..=1.0).contains(&self.conf_threshold) {
            return Err(ObjRemovalError::config_value_error(
                "confidence threshold",
                self.conf_threshold,
                "0.0-1.0",
                Some(0.25),
            ));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(ObjRemovalError::config_value_error(
                "IoU threshold",
                self.iou_threshold,
                "0.0-1.0",
                Some(0.7),
            ));
        }
        if self.max_detections == 0 {
            return Err(ObjRemovalError::config_value_error(
                "max detections",
                self.max_detections,
                "at least 1",
                Some(300),
            ));
        }
        Ok(())
    }
}

/// Reaction to a target class the detector can never produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UnknownTargetPolicy {
    /// Process silently; every frame passes through
    Ignore,
    /// Log a warning before and after processing
    #[default]
    Warn,
    /// Fail before any frame is processed
    Reject,
}

/// Working directories used by the command-line front end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceDirs {
    /// Local model assets
    pub models: PathBuf,
    /// Staged copies of input videos
    pub input: PathBuf,
    /// Rendered output videos
    pub output: PathBuf,
}

impl Default for WorkspaceDirs {
    fn default() -> Self {
        Self::rooted_at(".")
    }
}

impl WorkspaceDirs {
    /// `models/`, `input/` and `output/` below a common root
    #[must_use]
    pub fn rooted_at<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            models: root.join("models"),
            input: root.join("input"),
            output: root.join("output"),
        }
    }

    /// Create all three directories
    ///
    /// # Errors
    /// - Directory creation fails
    pub fn ensure_exist(&self) -> Result<()> {
        for dir in [&self.models, &self.input, &self.output] {
            std::fs::create_dir_all(dir)
                .map_err(|e| ObjRemovalError::file_io_error("create workspace directory", dir, &e))?;
        }
        Ok(())
    }
}

/// Configuration for an object removal run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EraseConfig {
    /// Inference engine
    pub backend_type: BackendType,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Detector model location
    pub model_spec: ModelSpec,

    /// Detector thresholds
    pub detector: DetectorParams,

    /// Which detections contribute to the mask
    pub mask_policy: MaskPolicy,

    /// Reaction to a target class outside the label set
    pub unknown_target: UnknownTargetPolicy,

    /// Inpainting neighborhood radius in pixels
    pub inpaint_radius: u32,

    /// Output codec tag
    pub fourcc: FourCc,

    /// Working directories
    pub workspace: WorkspaceDirs,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Enable debug mode (additional logging)
    pub debug: bool,
}

impl Default for EraseConfig {
    fn default() -> Self {
        Self {
            backend_type: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            model_spec: ModelSpec::default(),
            detector: DetectorParams::default(),
            mask_policy: MaskPolicy::default(),
            unknown_target: UnknownTargetPolicy::default(),
            inpaint_radius: INPAINT_RADIUS,
            fourcc: FourCc::default(),
            workspace: WorkspaceDirs::default(),
            intra_threads: 0,
            inter_threads: 0,
            debug: false,
        }
    }
}

impl EraseConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use imgly_objremove::{EraseConfig, ExecutionProvider};
    ///
    /// let config = EraseConfig::builder()
    ///     .execution_provider(ExecutionProvider::Cpu)
    ///     .conf_threshold(0.4)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.detector.conf_threshold, 0.4);
    /// ```
    #[must_use]
    pub fn builder() -> EraseConfigBuilder {
        EraseConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Detector thresholds out of range
    /// - Mask confidence floor outside `0.0..=1.0`
    /// - Inpaint radius other than the fixed radius
    /// - Tract backend combined with a GPU provider
    pub fn validate(&self) -> Result<()> {
        self.detector.validate()?;

        if let Some(min) = self.mask_policy.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err(ObjRemovalError::config_value_error(
                    "mask minimum confidence",
                    min,
                    "0.0-1.0",
                    None::<f32>,
                ));
            }
        }

        if self.inpaint_radius != INPAINT_RADIUS {
            return Err(ObjRemovalError::config_value_error(
                "inpaint radius",
                self.inpaint_radius,
                "fixed at 3",
                Some(INPAINT_RADIUS),
            ));
        }

        if self.backend_type == BackendType::Tract
            && !matches!(self.execution_provider, ExecutionProvider::Cpu | ExecutionProvider::Auto)
        {
            return Err(ObjRemovalError::invalid_config(format!(
                "Tract backend only supports CPU execution, got '{}'",
                self.execution_provider
            )));
        }

        Ok(())
    }
}

/// Builder for `EraseConfig`
#[derive(Debug, Default)]
pub struct EraseConfigBuilder {
    config: EraseConfig,
}

impl EraseConfigBuilder {
    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    #[must_use]
    pub fn detector(mut self, detector: DetectorParams) -> Self {
        self.config.detector = detector;
        self
    }

    /// Set the detector confidence threshold
    #[must_use]
    pub fn conf_threshold(mut self, threshold: f32) -> Self {
        self.config.detector.conf_threshold = threshold;
        self
    }

    /// Set the detector NMS IoU threshold
    #[must_use]
    pub fn iou_threshold(mut self, threshold: f32) -> Self {
        self.config.detector.iou_threshold = threshold;
        self
    }

    #[must_use]
    pub fn mask_policy(mut self, policy: MaskPolicy) -> Self {
        self.config.mask_policy = policy;
        self
    }

    #[must_use]
    pub fn unknown_target(mut self, policy: UnknownTargetPolicy) -> Self {
        self.config.unknown_target = policy;
        self
    }

    #[must_use]
    pub fn inpaint_radius(mut self, radius: u32) -> Self {
        self.config.inpaint_radius = radius;
        self
    }

    #[must_use]
    pub fn fourcc(mut self, fourcc: FourCc) -> Self {
        self.config.fourcc = fourcc;
        self
    }

    #[must_use]
    pub fn workspace(mut self, workspace: WorkspaceDirs) -> Self {
        self.config.workspace = workspace;
        self
    }

    /// Set only the output directory of the workspace
    #[must_use]
    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.workspace.output = dir.into();
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// Set both intra and inter threads (inter = threads / 2, at least 1; 0 = auto)
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self.config.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any rule checked by [`EraseConfig::validate`]
    pub fn build(self) -> Result<EraseConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
