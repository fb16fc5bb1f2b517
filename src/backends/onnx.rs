//! ONNX Runtime backend for the detector
//!
//! Supports CPU, CUDA and `CoreML` execution providers. Requested GPU providers
//! that are unavailable at runtime fall back to the CPU with a warning.

use crate::config::{EraseConfig, ExecutionProvider};
use crate::error::{ObjRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::ModelManager;
use ndarray::{Array4, ArrayD};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::time::Instant;

#[derive(Debug)]
pub struct OnnxBackend {
    session: Option<Session>,
    model_manager: Option<ModelManager>,
    initialized: bool,
}

fn cuda_available() -> bool {
    OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false)
}

fn coreml_available() -> bool {
    OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default()).unwrap_or(false)
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(8)
}

impl OnnxBackend {
    /// Execution providers with availability as `(name, available, description)`
    ///
    /// ```rust,no_run
    /// use imgly_objremove::backends::OnnxBackend;
    ///
    /// for (name, available, description) in OnnxBackend::list_providers() {
    ///     println!("{}: {} - {}", name, if available { "✅" } else { "❌" }, description);
    /// }
    /// ```
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!("🔍 System Hardware Analysis:");
        log::debug!("  - Platform: {os}", os = std::env::consts::OS);
        log::debug!("  - Architecture: {arch}", arch = std::env::consts::ARCH);
        log::debug!("  - CPU cores: {cores}", cores = available_cores());

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available(),
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available(),
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            session: None,
            model_manager: Some(model_manager),
            initialized: false,
        }
    }

    fn select_providers(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let mut providers = Vec::new();
        match requested {
            ExecutionProvider::Auto => {
                if cuda_available() {
                    log::info!("🚀 CUDA execution provider is available and will be used");
                    providers.push(CUDAExecutionProvider::default().build());
                }
                if coreml_available() {
                    log::info!("🍎 CoreML execution provider is available and will be used");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    log::info!("No hardware acceleration available, using CPU");
                }
            },
            ExecutionProvider::Cpu => log::info!("Using CPU execution provider"),
            ExecutionProvider::Cuda => {
                if cuda_available() {
                    log::info!("Using CUDA execution provider");
                    providers.push(CUDAExecutionProvider::default().build());
                } else {
                    log::warn!(
                        "CUDA execution provider requested but not available, falling back to CPU"
                    );
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available() {
                    log::info!("🍎 Using CoreML execution provider (explicitly requested)");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                } else {
                    log::warn!(
                        "CoreML execution provider requested but not available, falling back to CPU"
                    );
                }
            },
        }
        providers
    }

    fn load_model(&mut self, config: &EraseConfig) -> Result<std::time::Duration> {
        let model_load_start = Instant::now();

        let model_manager = self
            .model_manager
            .as_ref()
            .ok_or_else(|| ObjRemovalError::model("No model manager available for ONNX backend"))?;

        let model_data = model_manager.load_model()?;

        let mut session_builder = Session::builder()
            .map_err(|e| {
                ObjRemovalError::inference(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                ObjRemovalError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        let providers = Self::select_providers(config.execution_provider);
        if !providers.is_empty() {
            session_builder = session_builder
                .with_execution_providers(providers)
                .map_err(|e| {
                    ObjRemovalError::inference(format!("Failed to set execution providers: {e}"))
                })?;
        }

        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            available_cores()
        };
        let inter_threads = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (available_cores() / 4).max(1)
        };

        let session = session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| ObjRemovalError::inference(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| ObjRemovalError::inference(format!("Failed to set inter threads: {e}")))?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                ObjRemovalError::model_error_with_context(
                    "create session for",
                    model_manager.get_model_path().unwrap_or_default(),
                    &e.to_string(),
                    &["check that the file is a YOLOv8 detection model exported to ONNX"],
                )
            })?;

        log::debug!("✅ ONNX Runtime session created successfully");
        log::debug!("  - Requested provider: {:?}", config.execution_provider);
        log::debug!(
            "  - Threading: {intra_threads} intra-op threads, {inter_threads} inter-op threads"
        );
        log::debug!("  - Model: {}", model_manager.display_name());
        log::debug!(
            "  - Model size: {:.2} MB",
            model_data.len() as f64 / (1024.0 * 1024.0)
        );

        self.session = Some(session);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "📊 Model loading complete: {:.0}ms",
            model_load_time.as_secs_f64() * 1000.0
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &EraseConfig) -> Result<Option<std::time::Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>> {
        if !self.initialized {
            return Err(ObjRemovalError::internal("Backend not initialized"));
        }

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| ObjRemovalError::internal("ONNX session not initialized"))?;

        let inference_start = Instant::now();
        log::debug!("🚀 Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            ObjRemovalError::processing(format!("Failed to convert input tensor: {e}"))
        })?;

        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| ObjRemovalError::inference(format!("ONNX inference failed: {e}")))?;

        let output = {
            let keys: Vec<_> = outputs.keys().collect();
            let first_key = keys
                .first()
                .ok_or_else(|| ObjRemovalError::inference("No output tensors found"))?;
            outputs
                .get(first_key)
                .ok_or_else(|| ObjRemovalError::inference("First output tensor not found"))?
                .try_extract_array::<f32>()
                .map_err(|e| {
                    ObjRemovalError::inference(format!("Failed to extract output tensor: {e}"))
                })?
                .to_owned()
        };

        log::debug!(
            "📊 Inference complete: {:.2}ms, output {:?}",
            inference_start.elapsed().as_secs_f64() * 1000.0,
            output.shape()
        );

        Ok(output)
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
