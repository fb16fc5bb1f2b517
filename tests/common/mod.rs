//! Shared helpers for the integration tests
//!
//! Frames are synthetic and detections are scripted, so no model or video
//! file is needed.

#![allow(dead_code)]

use image::{Rgb, RgbImage};
use imgly_objremove::{
    coco_labels, BoundingBox, Detection, EraseConfig, ObjectDetector, ObjectRemovalPipeline,
    Result, TeleaInpainter,
};
use std::sync::{Arc, Mutex};

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 64;
pub const BACKGROUND: Rgb<u8> = Rgb([90, 90, 90]);
pub const OBJECT: Rgb<u8> = Rgb([220, 30, 30]);

/// Detector returning a fixed list of detections per call, in call order
///
/// Calls past the end of the script return no detections.
#[derive(Debug, Clone)]
pub struct ScriptedDetector {
    script: Vec<Vec<Detection>>,
    labels: Vec<String>,
    calls: Arc<Mutex<usize>>,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script,
            labels: coco_labels(),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Handle to the call counter, readable after the detector moved into a pipeline
    pub fn calls(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.calls)
    }
}

impl ObjectDetector for ScriptedDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
        let mut calls = self.calls.lock().unwrap();
        let detections = self.script.get(*calls).cloned().unwrap_or_default();
        *calls += 1;
        Ok(detections)
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

pub fn person(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Detection {
    Detection::new(BoundingBox::new(x1, y1, x2, y2), confidence, 0, "person")
}

/// `count` frames of flat background; frames in `with_object` carry a solid
/// object over `[10, 50) x [10, 50)`
pub fn synthetic_frames(count: usize, with_object: impl Fn(usize) -> bool) -> Vec<RgbImage> {
    (0..count)
        .map(|i| {
            let mut frame = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);
            if with_object(i) {
                for y in 10..50 {
                    for x in 10..50 {
                        frame.put_pixel(x, y, OBJECT);
                    }
                }
            }
            frame
        })
        .collect()
}

/// Ten frames; frames 0-4 show a person at (10,10)-(50,50), frames 5-9 nothing
pub fn person_scenario() -> (Vec<RgbImage>, ScriptedDetector) {
    let frames = synthetic_frames(10, |i| i < 5);
    let script = (0..10)
        .map(|i| {
            if i < 5 {
                vec![person(10.0, 10.0, 50.0, 50.0, 0.9)]
            } else {
                Vec::new()
            }
        })
        .collect();
    (frames, ScriptedDetector::new(script))
}

pub fn pipeline_with(detector: ScriptedDetector, config: EraseConfig) -> ObjectRemovalPipeline {
    ObjectRemovalPipeline::new(Box::new(detector), Box::new(TeleaInpainter::new()), config)
}
