//! Tract backend for the detector
//!
//! Pure Rust inference on the CPU. Slower than ONNX Runtime but needs no
//! native libraries.

use crate::config::EraseConfig;
use crate::error::{ObjRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::ModelManager;
use ndarray::{Array4, ArrayD};
use tract_onnx::prelude::*;

type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

#[derive(Debug)]
pub struct TractBackend {
    model: Option<TractModel>,
    model_manager: Option<ModelManager>,
    initialized: bool,
}

impl TractBackend {
    /// Execution providers offered by Tract as `(name, available, description)`
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!("🔍 Tract Backend System Analysis:");
        log::debug!("  - Platform: {os}", os = std::env::consts::OS);
        log::debug!("  - Architecture: {arch}", arch = std::env::consts::ARCH);

        vec![(
            "CPU".to_string(),
            true,
            "Pure Rust CPU inference with no external dependencies".to_string(),
        )]
    }

    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            model: None,
            model_manager: Some(model_manager),
            initialized: false,
        }
    }

    fn load_model(&mut self, config: &EraseConfig) -> Result<Duration> {
        let model_load_start = Instant::now();

        let Some(ref model_manager) = self.model_manager else {
            return Err(ObjRemovalError::model(
                "No model manager available for Tract backend",
            ));
        };

        let model_data = model_manager.load_model()?;
        let side = config.detector.input_size as usize;

        log::info!("🚀 Initializing Tract Backend");
        log::info!("🧠 Model: {}", model_manager.display_name());
        log::info!("📐 Input: 1x3x{side}x{side}");
        log::info!(
            "📏 Model size: {:.2} MB",
            model_data.len() as f64 / (1024.0 * 1024.0)
        );

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| ObjRemovalError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())
            .map_err(|e| ObjRemovalError::model(format!("Failed to fix input shape: {e}")))?
            .into_optimized()
            .map_err(|e| ObjRemovalError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| {
                ObjRemovalError::model(format!("Failed to create runnable model: {e}"))
            })?;

        self.model = Some(model);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "✅ Tract backend initialized in {}ms",
            model_load_time.as_millis()
        );

        Ok(model_load_time)
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, config: &EraseConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| ObjRemovalError::inference("Tract model not initialized"))?;

        log::debug!("🔮 Running Tract inference on {:?}", input.shape());
        let inference_start = Instant::now();

        let outputs = model
            .run(tvec![Tensor::from(input.clone()).into()])
            .map_err(|e| ObjRemovalError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| ObjRemovalError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output = output_tensor
            .to_array_view::<f32>()
            .map_err(|e| {
                ObjRemovalError::inference(format!("Failed to convert output tensor: {e}"))
            })?
            .to_owned();

        log::debug!(
            "✅ Tract inference completed in {}ms, output {:?}",
            inference_start.elapsed().as_millis(),
            output.shape()
        );

        Ok(output)
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
