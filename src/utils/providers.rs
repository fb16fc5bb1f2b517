//! `backend:provider` strings used on the command line

use crate::{
    config::{BackendType, ExecutionProvider},
    error::{ObjRemovalError, Result},
};

/// One selectable backend/provider combination
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub execution_provider: ExecutionProvider,
    pub available: bool,
    pub description: String,
}

const ONNX_PROVIDERS: &[(ExecutionProvider, &str)] = &[
    (ExecutionProvider::Auto, "ONNX Runtime with auto-selected provider"),
    (ExecutionProvider::Cpu, "ONNX Runtime CPU execution"),
    (ExecutionProvider::Cuda, "ONNX Runtime CUDA GPU acceleration"),
    (ExecutionProvider::CoreMl, "ONNX Runtime CoreML (Apple Silicon) acceleration"),
];

/// Parsing and listing of execution providers
#[derive(Debug)]
pub struct ExecutionProviderManager;

impl ExecutionProviderManager {
    /// Parse `backend:provider` (or a bare backend name)
    ///
    /// ```rust
    /// use imgly_objremove::utils::ExecutionProviderManager;
    /// use imgly_objremove::{BackendType, ExecutionProvider};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let (backend, provider) = ExecutionProviderManager::parse_provider_string("onnx:cuda")?;
    /// assert_eq!((backend, provider), (BackendType::Onnx, ExecutionProvider::Cuda));
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// - Unknown backend or provider
    pub fn parse_provider_string(provider_str: &str) -> Result<(BackendType, ExecutionProvider)> {
        let Some((backend, provider)) = provider_str.split_once(':') else {
            return match provider_str {
                "onnx" => Ok((BackendType::Onnx, ExecutionProvider::Auto)),
                "tract" => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
                _ => Err(ObjRemovalError::invalid_config(
                    "Invalid provider format. Use backend:provider (e.g., onnx:auto, tract:cpu)",
                )),
            };
        };

        match backend {
            "onnx" => ONNX_PROVIDERS
                .iter()
                .find(|(p, _)| p.to_string() == provider)
                .map(|(p, _)| (BackendType::Onnx, *p))
                .ok_or_else(|| {
                    ObjRemovalError::invalid_config(format!(
                        "Unknown ONNX provider: {provider}. Supported: auto, cpu, cuda, coreml"
                    ))
                }),
            "tract" if provider == "cpu" => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
            "tract" => Err(ObjRemovalError::invalid_config(format!(
                "Unknown Tract provider: {provider}. Tract only supports 'cpu'"
            ))),
            _ => Err(ObjRemovalError::invalid_config(format!(
                "Unknown backend: {backend}. Supported backends: onnx, tract"
            ))),
        }
    }

    /// Every combination with its runtime availability
    #[must_use]
    pub fn list_all_providers() -> Vec<ProviderInfo> {
        let mut providers = Vec::new();

        #[cfg(feature = "onnx")]
        let onnx_availability: std::collections::HashMap<String, bool> =
            crate::backends::OnnxBackend::list_providers()
                .into_iter()
                .map(|(name, available, _)| (name.to_lowercase(), available))
                .collect();

        for (provider, description) in ONNX_PROVIDERS {
            #[cfg(feature = "onnx")]
            let (available, description) = (
                match provider {
                    ExecutionProvider::Auto => onnx_availability.values().any(|&a| a),
                    other => onnx_availability
                        .get(&other.to_string())
                        .copied()
                        .unwrap_or(false),
                },
                (*description).to_string(),
            );
            #[cfg(not(feature = "onnx"))]
            let (available, description) = (false, format!("{description} (feature disabled)"));

            providers.push(ProviderInfo {
                name: Self::provider_to_string(BackendType::Onnx, *provider),
                backend_type: BackendType::Onnx,
                execution_provider: *provider,
                available,
                description,
            });
        }

        #[cfg(feature = "tract")]
        for (name, available, description) in crate::backends::TractBackend::list_providers() {
            providers.push(ProviderInfo {
                name: format!("tract:{}", name.to_lowercase()),
                backend_type: BackendType::Tract,
                execution_provider: ExecutionProvider::Cpu,
                available,
                description,
            });
        }

        #[cfg(not(feature = "tract"))]
        providers.push(ProviderInfo {
            name: "tract:cpu".to_string(),
            backend_type: BackendType::Tract,
            execution_provider: ExecutionProvider::Cpu,
            available: false,
            description: "Pure Rust CPU inference via Tract (feature disabled)".to_string(),
        });

        providers
    }

    #[must_use]
    pub fn is_valid_provider_string(provider_str: &str) -> bool {
        Self::parse_provider_string(provider_str).is_ok()
    }

    #[must_use]
    pub fn default_provider_for_backend(backend_type: BackendType) -> ExecutionProvider {
        match backend_type {
            BackendType::Onnx => ExecutionProvider::Auto,
            BackendType::Tract => ExecutionProvider::Cpu,
        }
    }

    /// Inverse of [`ExecutionProviderManager::parse_provider_string`]
    #[must_use]
    pub fn provider_to_string(backend_type: BackendType, provider: ExecutionProvider) -> String {
        format!("{backend_type}:{provider}")
    }
}
