//! Video file placement: staging inputs and naming outputs
//!
//! Decoding and encoding live in [`crate::backends::video`]; this service only
//! decides where files go on disk.

use crate::{
    backends::video::VideoFormat,
    config::WorkspaceDirs,
    error::{ObjRemovalError, Result},
};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Prefix of every rendered output file
pub const OUTPUT_PREFIX: &str = "removed_";

/// Service for placing input and output video files
#[derive(Debug)]
pub struct VideoIOService;

impl VideoIOService {
    /// Output path `<output_dir>/removed_<target>_<original_filename>`
    ///
    /// # Examples
    /// ```rust
    /// use imgly_objremove::services::VideoIOService;
    /// use std::path::Path;
    ///
    /// let out = VideoIOService::derive_output_path("clips/walk.mp4", "person", "output")?;
    /// assert_eq!(out, Path::new("output/removed_person_walk.mp4"));
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// # Errors
    /// - Input path has no file name
    /// - Target class is empty
    pub fn derive_output_path<P: AsRef<Path>, Q: AsRef<Path>>(
        input: P,
        target_class: &str,
        output_dir: Q,
    ) -> Result<PathBuf> {
        let input = input.as_ref();
        let file_name = input.file_name().ok_or_else(|| {
            ObjRemovalError::invalid_config(format!(
                "Input path '{}' has no file name",
                input.display()
            ))
        })?;
        if target_class.trim().is_empty() {
            return Err(ObjRemovalError::invalid_config(
                "Target class must not be empty",
            ));
        }

        let mut name = OsString::from(format!("{OUTPUT_PREFIX}{target_class}_"));
        name.push(file_name);
        Ok(output_dir.as_ref().join(name))
    }

    /// Copy `input` into the workspace input directory unless it already lives there
    ///
    /// Returns the path the pipeline should read from.
    ///
    /// # Errors
    /// - Input does not exist
    /// - Copy fails
    pub fn stage_input<P: AsRef<Path>>(input: P, workspace: &WorkspaceDirs) -> Result<PathBuf> {
        let input = input.as_ref();
        if !input.is_file() {
            return Err(ObjRemovalError::file_io_error(
                "read input video",
                input,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        if Self::is_inside(input, &workspace.input) {
            return Ok(input.to_path_buf());
        }

        let file_name = input.file_name().ok_or_else(|| {
            ObjRemovalError::invalid_config(format!(
                "Input path '{}' has no file name",
                input.display()
            ))
        })?;

        std::fs::create_dir_all(&workspace.input).map_err(|e| {
            ObjRemovalError::file_io_error("create input directory", &workspace.input, &e)
        })?;
        let staged = workspace.input.join(file_name);
        std::fs::copy(input, &staged)
            .map_err(|e| ObjRemovalError::file_io_error("copy input video", input, &e))?;

        log::info!(
            "📥 Copied video to input folder: {}",
            file_name.to_string_lossy()
        );
        Ok(staged)
    }

    /// Create the parent directory of an output path
    ///
    /// # Errors
    /// - Directory creation fails
    pub fn prepare_output<P: AsRef<Path>>(output: P) -> Result<()> {
        if let Some(parent) = output.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ObjRemovalError::file_io_error("create output directory", parent, &e)
                })?;
            }
        }
        Ok(())
    }

    /// Whether the extension names a container the decoder accepts
    #[must_use]
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        VideoFormat::from_path(path.as_ref()).is_some()
    }

    fn is_inside(path: &Path, dir: &Path) -> bool {
        match (path.canonicalize(), dir.canonicalize()) {
            (Ok(path), Ok(dir)) => path.starts_with(dir),
            _ => false,
        }
    }
}
