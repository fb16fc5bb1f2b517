//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{
    backends::video::FourCc,
    cache::ModelCache,
    config::{DetectorParams, EraseConfig, UnknownTargetPolicy, WorkspaceDirs},
    download::validate_model_url,
    mask::{LabelMatch, MaskPolicy},
    models::ModelSpec,
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Convert CLI arguments to an [`EraseConfig`]
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the erase configuration from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<EraseConfig> {
        let (backend_type, execution_provider) =
            ExecutionProviderManager::parse_provider_string(&cli.execution_provider)
                .context("Invalid execution provider format")?;

        let mut workspace = WorkspaceDirs::rooted_at(&cli.workspace);
        if let Some(output_dir) = &cli.output_dir {
            workspace.output = output_dir.clone();
        }

        let model_spec = Self::resolve_model_spec(cli, &workspace)?;
        let fourcc: FourCc = cli.fourcc.parse().context("Invalid --fourcc")?;

        let mut mask_policy = MaskPolicy::default().with_label_match(if cli.ignore_case {
            LabelMatch::CaseInsensitive
        } else {
            LabelMatch::Exact
        });
        if let Some(min_confidence) = cli.min_confidence {
            mask_policy = mask_policy.with_min_confidence(min_confidence);
        }

        let config = EraseConfig::builder()
            .backend_type(backend_type)
            .execution_provider(execution_provider)
            .model_spec(model_spec)
            .detector(DetectorParams {
                input_size: cli.input_size,
                conf_threshold: cli.conf_threshold,
                iou_threshold: cli.iou_threshold,
                ..DetectorParams::default()
            })
            .mask_policy(mask_policy)
            .unknown_target(if cli.strict_target {
                UnknownTargetPolicy::Reject
            } else {
                UnknownTargetPolicy::Warn
            })
            .fourcc(fourcc)
            .workspace(workspace)
            .num_threads(cli.threads)
            .debug(cli.verbose >= 2)
            .build()
            .context("Invalid configuration")?;

        Ok(config)
    }

    /// Pick the detector model
    ///
    /// `--model` (path, URL or cached ID), then `--model-url`, then the first
    /// `.onnx` file in the workspace models folder, then the default model.
    fn resolve_model_spec(cli: &Cli, workspace: &WorkspaceDirs) -> Result<ModelSpec> {
        let spec = if let Some(model) = &cli.model {
            if is_url(model) {
                ModelSpec::downloaded(ModelCache::url_to_model_id(model))
            } else if Path::new(model).exists() {
                ModelSpec::external(model)
            } else {
                ModelSpec::downloaded(model.clone())
            }
        } else if let Some(url) = &cli.model_url {
            ModelSpec::downloaded(ModelCache::url_to_model_id(url))
        } else if let Some(local) = first_onnx_file(&workspace.models)? {
            log::info!("Using model from workspace: {}", local.display());
            ModelSpec::external(local)
        } else {
            ModelSpec::downloaded(ModelCache::get_default_model_id())
        };

        Ok(match &cli.labels {
            Some(labels) => spec.with_labels(labels),
            None => spec,
        })
    }

    /// URL a missing cached model can be fetched from, if any argument names one
    pub(crate) fn download_url_for(cli: &Cli, model_id: &str) -> Option<String> {
        let candidates = [
            cli.model.as_deref().filter(|m| is_url(m)),
            cli.model_url.as_deref(),
            Some(ModelCache::get_default_model_url()),
        ];
        candidates
            .into_iter()
            .flatten()
            .find(|url| ModelCache::url_to_model_id(url) == model_id)
            .map(str::to_string)
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        ExecutionProviderManager::parse_provider_string(&cli.execution_provider)
            .context("Invalid execution provider format")?;

        cli.fourcc
            .parse::<FourCc>()
            .context("Invalid --fourcc")?;

        DetectorParams {
            input_size: cli.input_size,
            conf_threshold: cli.conf_threshold,
            iou_threshold: cli.iou_threshold,
            ..DetectorParams::default()
        }
        .validate()
        .context("Invalid detector settings")?;

        if let Some(min_confidence) = cli.min_confidence {
            if !(0.0..=1.0).contains(&min_confidence) {
                anyhow::bail!("--min-confidence must be within 0.0-1.0, got {min_confidence}");
            }
        }

        if let Some(url) = &cli.model_url {
            validate_model_url(url).context("Invalid --model-url")?;
        }
        if let Some(model) = cli.model.as_deref().filter(|m| is_url(m)) {
            validate_model_url(model).context("Invalid model URL")?;
        }

        if let Some(labels) = &cli.labels {
            if !labels.is_file() {
                anyhow::bail!("Label file not found: {}", labels.display());
            }
        }

        Ok(())
    }
}

fn is_url(value: &str) -> bool {
    value.starts_with("https://") || value.starts_with("http://")
}

fn first_onnx_file(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut models: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"))
        })
        .collect();
    models.sort();
    Ok(models.into_iter().next())
}
