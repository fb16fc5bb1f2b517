//! Inference backend abstraction and backend construction

use crate::config::{BackendType, EraseConfig};
use crate::error::{ObjRemovalError, Result};
use crate::models::ModelManager;
use ndarray::{Array4, ArrayD};

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// An engine able to run the detector network
pub trait InferenceBackend: std::fmt::Debug {
    /// Load the model; returns the load time on first initialization only
    ///
    /// # Errors
    /// - Model loading or session creation failures
    fn initialize(&mut self, config: &EraseConfig) -> Result<Option<Duration>>;

    /// Run the network on an NCHW tensor and return its first output
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Inference or tensor conversion failures
    fn infer(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>>;

    /// Whether [`InferenceBackend::initialize`] has completed
    fn is_initialized(&self) -> bool;
}

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backend bound to `model_manager`
    ///
    /// # Errors
    /// - The backend was not compiled in
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// Backends this factory can create
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory over the backends enabled at compile time
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    #[allow(unused_variables)]
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::with_model_manager(
                model_manager,
            ))),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(crate::backends::TractBackend::with_model_manager(
                model_manager,
            ))),
            #[allow(unreachable_patterns)]
            other => Err(ObjRemovalError::invalid_config(format!(
                "The {other} backend is not enabled in this build"
            ))),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        backends
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockYoloBackend;

    #[test]
    fn test_mock_backend_lifecycle() {
        let mut backend = MockYoloBackend::new(80);
        assert!(!backend.is_initialized());
        assert!(backend.infer(&Array4::zeros((1, 3, 64, 64))).is_err());

        let load_time = backend.initialize(&EraseConfig::default()).unwrap();
        assert!(load_time.is_some());
        assert!(backend.is_initialized());
        assert!(backend.initialize(&EraseConfig::default()).unwrap().is_none());

        let output = backend.infer(&Array4::zeros((1, 3, 64, 64))).unwrap();
        assert_eq!(output.shape(), &[1, 84, 84]);
    }

    #[test]
    fn test_default_factory_lists_compiled_backends() {
        let backends = DefaultBackendFactory.available_backends();
        assert_eq!(backends.contains(&BackendType::Onnx), cfg!(feature = "onnx"));
        assert_eq!(backends.contains(&BackendType::Tract), cfg!(feature = "tract"));
    }

    #[test]
    fn test_boxed_backend_is_object_safe() {
        let mut backend: Box<dyn InferenceBackend> = Box::new(MockYoloBackend::new(2));
        backend.initialize(&EraseConfig::default()).unwrap();
        let output = backend.infer(&Array4::zeros((1, 3, 32, 32))).unwrap();
        assert_eq!(output.shape(), &[1, 6, 21]);
    }
}
