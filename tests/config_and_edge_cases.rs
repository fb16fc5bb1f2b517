//! Configuration validation and boundary conditions
//!
//! Covers builder validation, the unknown-target policies and mask/inpaint
//! behavior at the edges of the frame.

mod common;

use common::{person, person_scenario, pipeline_with, ScriptedDetector};
use image::{Rgb, RgbImage};
use imgly_objremove::{
    build_mask, BackendType, BoundingBox, Detection, DetectorParams, EraseConfig,
    ExecutionProvider, FrameSource, Inpainter, Mask, MemorySink, MemorySource, ModelSource,
    ModelSpec, ObjRemovalError, Result, TeleaInpainter, UnknownTargetPolicy, VideoIOService,
    VideoJob, WorkspaceDirs,
};
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_config_defaults() -> Result<()> {
    let config = EraseConfig::builder().build()?;
    assert_eq!(config.backend_type, BackendType::Onnx);
    assert_eq!(config.execution_provider, ExecutionProvider::Auto);
    assert_eq!(config.unknown_target, UnknownTargetPolicy::Warn);
    assert_eq!(config.inpaint_radius, 3);
    assert_eq!(config.detector, DetectorParams::default());
    assert_eq!(config.mask_policy.min_confidence, None);
    assert_eq!(config.fourcc.to_string(), "mp4v");
    Ok(())
}

#[test]
fn test_config_validation_edge_cases() -> Result<()> {
    let config = EraseConfig::builder()
        .conf_threshold(0.0)
        .iou_threshold(1.0)
        .build()?;
    assert!(config.validate().is_ok());

    let err = EraseConfig::builder()
        .conf_threshold(1.5)
        .build()
        .unwrap_err();
    assert!(matches!(err, ObjRemovalError::InvalidConfig(_)));
    assert!(err.to_string().contains("confidence threshold"));

    let mut config = EraseConfig::default();
    config.detector.input_size = 500;
    assert!(config.validate().is_err());

    let mut config = EraseConfig::default();
    config.inpaint_radius = 5;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("inpaint radius"));

    let err = EraseConfig::builder()
        .backend_type(BackendType::Tract)
        .execution_provider(ExecutionProvider::Cuda)
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("Tract"));
    Ok(())
}

#[test]
fn test_config_serde_round_trip_keeps_model_spec() -> Result<()> {
    let config = EraseConfig::builder()
        .model_spec(ModelSpec::external("models/yolov8s.onnx").with_labels("models/labels.json"))
        .output_dir("renders")
        .build()?;
    let json = serde_json::to_string(&config).map_err(|e| ObjRemovalError::internal(e.to_string()))?;
    let restored: EraseConfig =
        serde_json::from_str(&json).map_err(|e| ObjRemovalError::internal(e.to_string()))?;
    assert_eq!(restored, config);
    assert_eq!(
        restored.model_spec.source,
        ModelSource::External(PathBuf::from("models/yolov8s.onnx"))
    );
    assert_eq!(restored.workspace.output, PathBuf::from("renders"));
    Ok(())
}

#[test]
fn test_unknown_target_ignore_policy_runs_silently() -> Result<()> {
    let (frames, detector) = person_scenario();
    let config = EraseConfig::builder()
        .unknown_target(UnknownTargetPolicy::Ignore)
        .build()?;
    let mut pipeline = pipeline_with(detector, config);
    let mut source = MemorySource::from_frames(frames, 30.0)?;
    let job = VideoJob::new("in.mp4", "out.mp4", "unicorn", source.metadata().clone())?;
    let mut sink = MemorySink::new();

    let summary = pipeline.run(&job, &mut source, &mut sink)?;
    assert_eq!(summary.frames_processed, 10);
    assert_eq!(summary.frames_modified, 0);
    Ok(())
}

#[test]
fn test_unknown_target_reject_writes_nothing() -> Result<()> {
    let (frames, detector) = person_scenario();
    let calls = detector.calls();
    let config = EraseConfig::builder()
        .unknown_target(UnknownTargetPolicy::Reject)
        .build()?;
    let mut pipeline = pipeline_with(detector, config);
    let mut source = MemorySource::from_frames(frames, 30.0)?;
    let job = VideoJob::new("in.mp4", "out.mp4", "phone", source.metadata().clone())?;
    let mut sink = MemorySink::new();

    let err = pipeline.run(&job, &mut source, &mut sink).unwrap_err();
    assert!(matches!(err, ObjRemovalError::InvalidConfig(_)));
    assert!(err.to_string().contains("phone"));
    assert_eq!(*calls.lock().unwrap(), 0);
    assert!(sink.frames().is_empty());
    assert!(sink.is_finished());
    assert_eq!(sink.finish_calls(), 1);
    Ok(())
}

#[test]
fn test_video_job_rejects_empty_target() -> Result<()> {
    let source = MemorySource::from_frames(vec![RgbImage::new(8, 8)], 30.0)?;
    let err = VideoJob::new("in.mp4", "out.mp4", "  ", source.metadata().clone()).unwrap_err();
    assert!(matches!(err, ObjRemovalError::InvalidConfig(_)));
    Ok(())
}

#[test]
fn test_mask_dimensions_match_frame_for_any_detection_count() {
    let detections: Vec<Detection> = (0..5)
        .map(|i| person(i as f32 * 7.0, 0.0, i as f32 * 7.0 + 10.0, 12.0, 0.5))
        .collect();
    for count in [0, 1, detections.len()] {
        let mask = build_mask(&detections[..count], "person", (33, 17));
        assert_eq!(mask.dimensions(), (33, 17));
    }
}

#[test]
fn test_mask_truncates_fractional_coordinates() {
    let detections = vec![Detection::new(
        BoundingBox::new(2.9, 3.7, 6.2, 5.99),
        0.4,
        0,
        "person",
    )];
    let mask = build_mask(&detections, "person", (10, 10));
    // x in [2, 6), y in [3, 5)
    assert_eq!(mask.erased_count(), 4 * 2);
    assert!(mask.is_erased(2, 3));
    assert!(!mask.is_erased(6, 3));
    assert!(!mask.is_erased(2, 5));
}

#[test]
fn test_inverted_box_contributes_nothing() {
    let detections = vec![person(40.0, 40.0, 10.0, 10.0, 0.9)];
    assert!(build_mask(&detections, "person", (64, 64)).is_empty());
}

#[test]
fn test_inpaint_box_touching_frame_edge() -> Result<()> {
    let mut frame = RgbImage::from_pixel(32, 32, Rgb([40, 160, 200]));
    for y in 0..8 {
        for x in 0..8 {
            frame.put_pixel(x, y, Rgb([255, 255, 0]));
        }
    }
    let mask = build_mask(&[person(-5.0, -5.0, 8.0, 8.0, 0.9)], "person", (32, 32));
    let out = TeleaInpainter::new().inpaint(&frame, &mask)?;

    assert_ne!(*out.get_pixel(0, 0), Rgb([255, 255, 0]));
    assert_eq!(out.get_pixel(20, 20), frame.get_pixel(20, 20));
    Ok(())
}

#[test]
fn test_inpaint_rejects_mismatched_mask() {
    let frame = RgbImage::new(16, 16);
    let mask = Mask::new(8, 8);
    assert!(TeleaInpainter::new().inpaint(&frame, &mask).is_err());
}

#[test]
fn test_scripted_detector_past_script_returns_nothing() -> Result<()> {
    use imgly_objremove::ObjectDetector;

    let mut detector = ScriptedDetector::new(vec![vec![person(0.0, 0.0, 1.0, 1.0, 0.9)]]);
    let frame = RgbImage::new(4, 4);
    assert_eq!(detector.detect(&frame)?.len(), 1);
    assert!(detector.detect(&frame)?.is_empty());
    Ok(())
}

#[test]
fn test_output_naming_and_staging_in_workspace() -> Result<()> {
    let temp = TempDir::new().map_err(ObjRemovalError::Io)?;
    let workspace = WorkspaceDirs::rooted_at(temp.path());
    workspace.ensure_exist()?;

    let outside = temp.path().join("holiday.mp4");
    std::fs::write(&outside, b"not really a video").map_err(ObjRemovalError::Io)?;

    let staged = VideoIOService::stage_input(&outside, &workspace)?;
    assert_eq!(staged, workspace.input.join("holiday.mp4"));

    let output = VideoIOService::derive_output_path(&staged, "car", &workspace.output)?;
    assert_eq!(output, workspace.output.join("removed_car_holiday.mp4"));

    // Staging again from inside the workspace does not copy
    assert_eq!(VideoIOService::stage_input(&staged, &workspace)?, staged);
    Ok(())
}
