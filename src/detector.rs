//! Object detection on single frames
//!
//! [`YoloDetector`] runs a YOLOv8 detection head through any
//! [`InferenceBackend`]: letterbox the frame into the square model input,
//! run the network, pick the best class per anchor, drop low scores, map
//! boxes back to frame pixels and apply class-wise non-maximum suppression.

use crate::config::{DetectorParams, EraseConfig};
use crate::error::{ObjRemovalError, Result};
use crate::inference::{BackendFactory, InferenceBackend};
use crate::models::ModelManager;
use crate::types::{BoundingBox, Detection};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{Array4, ArrayD, ArrayView2, Axis, Ix2};
use std::borrow::Cow;

/// Gray used for letterbox padding
pub const PAD_VALUE: u8 = 114;

/// Class names of the COCO-trained YOLOv8 models, in output channel order
pub const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// COCO names as owned strings
#[must_use]
pub fn coco_labels() -> Vec<String> {
    COCO_LABELS.iter().map(|&l| l.to_string()).collect()
}

/// Anything that turns a frame into labelled boxes in frame coordinates
pub trait ObjectDetector {
    /// Detect objects in one RGB frame
    ///
    /// # Errors
    /// - Inference failures
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;

    /// Every label this detector can produce
    fn labels(&self) -> &[String];
}

impl<D: ObjectDetector + ?Sized> ObjectDetector for Box<D> {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        (**self).detect(image)
    }

    fn labels(&self) -> &[String] {
        (**self).labels()
    }
}

/// Resize `image` into a `size`x`size` NCHW tensor, keeping aspect ratio.
///
/// The resized image sits in the top-left corner; the rest is filled with
/// [`PAD_VALUE`]. Values are scaled to `0.0..=1.0`. Returns the tensor and
/// the scale factor applied to the image.
#[must_use]
pub fn letterbox(image: &RgbImage, size: u32) -> (Array4<f32>, f32) {
    let (width, height) = image.dimensions();
    let side = size as usize;
    let mut input = Array4::from_elem((1, 3, side, side), f32::from(PAD_VALUE) / 255.0);
    if width == 0 || height == 0 || size == 0 {
        return (input, 1.0);
    }

    let ratio = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_width = ((width as f32 * ratio).round() as u32).clamp(1, size);
    let new_height = ((height as f32 * ratio).round() as u32).clamp(1, size);

    let resized = if (new_width, new_height) == (width, height) {
        Cow::Borrowed(image)
    } else {
        Cow::Owned(imageops::resize(image, new_width, new_height, FilterType::Triangle))
    };

    for (x, y, pixel) in resized.enumerate_pixels() {
        for (channel, &value) in pixel.0.iter().enumerate() {
            input[[0, channel, y as usize, x as usize]] = f32::from(value) / 255.0;
        }
    }

    (input, ratio)
}

/// Keep the highest-scoring boxes, dropping same-class boxes that overlap
/// a kept one by more than `iou_threshold`. Output is sorted by confidence.
#[must_use]
pub fn non_max_suppression(
    mut detections: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// View a raw head output as `[4 + classes, anchors]`
fn prediction_view(output: &ArrayD<f32>, channels: usize) -> Result<ArrayView2<'_, f32>> {
    let view = match output.ndim() {
        3 if output.shape()[0] == 1 => output.index_axis(Axis(0), 0),
        2 => output.view(),
        _ => {
            return Err(ObjRemovalError::inference(format!(
                "Unexpected detector output shape {:?}; expected [1, {channels}, anchors]",
                output.shape()
            )))
        },
    };
    let view = view
        .into_dimensionality::<Ix2>()
        .map_err(|e| ObjRemovalError::inference(format!("Invalid detector output: {e}")))?;

    if view.shape()[0] == channels {
        Ok(view)
    } else if view.shape()[1] == channels {
        Ok(view.reversed_axes())
    } else {
        Err(ObjRemovalError::inference(format!(
            "Detector output {:?} does not match {} labels; pass a label table matching the model",
            output.shape(),
            channels - 4
        )))
    }
}

/// YOLOv8 detector on top of an inference backend
#[derive(Debug)]
pub struct YoloDetector {
    backend: Box<dyn InferenceBackend>,
    labels: Vec<String>,
    params: DetectorParams,
}

impl YoloDetector {
    /// Wrap a backend; call [`YoloDetector::initialize`] before detecting
    #[must_use]
    pub fn new(backend: Box<dyn InferenceBackend>, labels: Vec<String>, params: DetectorParams) -> Self {
        Self {
            backend,
            labels,
            params,
        }
    }

    /// Resolve the model, create the backend and load it
    ///
    /// # Errors
    /// - Model not found or label table invalid
    /// - Backend not compiled in or failing to load the model
    pub fn from_config(config: &EraseConfig, factory: &dyn BackendFactory) -> Result<Self> {
        let model_manager = ModelManager::from_spec(&config.model_spec)?;
        Self::from_model_manager(config, model_manager, factory)
    }

    /// Like [`YoloDetector::from_config`] with an already resolved model
    ///
    /// # Errors
    /// - Label table invalid
    /// - Backend not compiled in or failing to load the model
    pub fn from_model_manager(
        config: &EraseConfig,
        model_manager: ModelManager,
        factory: &dyn BackendFactory,
    ) -> Result<Self> {
        let labels = model_manager.load_labels()?.unwrap_or_else(coco_labels);
        log::info!(
            "Detector model {} with {} labels on {}",
            model_manager.display_name(),
            labels.len(),
            config.backend_type
        );

        let backend = factory.create_backend(config.backend_type, model_manager)?;
        let mut detector = Self::new(backend, labels, config.detector.clone());
        detector.initialize(config)?;
        Ok(detector)
    }

    /// Load the model into the backend
    ///
    /// # Errors
    /// - Backend initialization failures
    pub fn initialize(&mut self, config: &EraseConfig) -> Result<()> {
        if let Some(load_time) = self.backend.initialize(config)? {
            log::debug!("Detector ready in {}ms", load_time.as_millis());
        }
        Ok(())
    }

    #[must_use]
    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    fn decode(
        &self,
        output: &ArrayD<f32>,
        ratio: f32,
        frame: (u32, u32),
    ) -> Result<Vec<Detection>> {
        let channels = 4 + self.labels.len();
        let predictions = prediction_view(output, channels)?;

        let mut candidates = Vec::new();
        for anchor in predictions.axis_iter(Axis(1)) {
            let Some((class_id, score)) = anchor
                .iter()
                .skip(4)
                .copied()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(&b.1))
            else {
                continue;
            };
            if score <= self.params.conf_threshold {
                continue;
            }

            let bbox = BoundingBox::from_cxcywh(
                anchor[0] / ratio,
                anchor[1] / ratio,
                anchor[2] / ratio,
                anchor[3] / ratio,
            )
            .clamped(frame.0, frame.1);
            if bbox.area() <= 0.0 {
                continue;
            }

            let label = self.labels.get(class_id).cloned().unwrap_or_default();
            candidates.push(Detection::new(bbox, score, class_id, label));
        }

        Ok(non_max_suppression(
            candidates,
            self.params.iou_threshold,
            self.params.max_detections,
        ))
    }
}

impl ObjectDetector for YoloDetector {
    #[tracing::instrument(level = "debug", skip_all, fields(width = image.width(), height = image.height()))]
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, ratio) = letterbox(image, self.params.input_size);
        let output = self.backend.infer(&input)?;
        let detections = self.decode(&output, ratio, image.dimensions())?;
        log::debug!("{} detections", detections.len());
        Ok(detections)
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockYoloBackend;

    fn params(input_size: u32) -> DetectorParams {
        DetectorParams {
            input_size,
            ..DetectorParams::default()
        }
    }

    fn detector(backend: MockYoloBackend, input_size: u32) -> YoloDetector {
        let mut detector = YoloDetector::new(Box::new(backend), coco_labels(), params(input_size));
        detector.initialize(&EraseConfig::default()).unwrap();
        detector
    }

    #[test]
    fn test_coco_labels() {
        assert_eq!(COCO_LABELS.len(), 80);
        assert_eq!(COCO_LABELS[0], "person");
        assert_eq!(COCO_LABELS[2], "car");
        assert_eq!(COCO_LABELS[62], "tv");
        assert_eq!(COCO_LABELS[67], "cell phone");
    }

    #[test]
    fn test_letterbox_pads_bottom_for_wide_frames() {
        let image = RgbImage::from_pixel(64, 32, image::Rgb([255, 0, 0]));
        let (input, ratio) = letterbox(&image, 64);
        assert_eq!(input.shape(), &[1, 3, 64, 64]);
        assert!((ratio - 1.0).abs() < f32::EPSILON);
        assert!((input[[0, 0, 10, 10]] - 1.0).abs() < 1e-6);
        assert!(input[[0, 1, 10, 10]].abs() < 1e-6);
        let pad = f32::from(PAD_VALUE) / 255.0;
        assert!((input[[0, 0, 40, 10]] - pad).abs() < 1e-6);
        assert!((input[[0, 2, 63, 63]] - pad).abs() < 1e-6);
    }

    #[test]
    fn test_letterbox_scales_down() {
        let image = RgbImage::new(200, 100);
        let (input, ratio) = letterbox(&image, 32);
        assert_eq!(input.shape(), &[1, 3, 32, 32]);
        assert!((ratio - 0.16).abs() < 1e-6);
        assert!(input[[0, 0, 15, 31]].abs() < 1e-6);
        let pad = f32::from(PAD_VALUE) / 255.0;
        assert!((input[[0, 0, 16, 0]] - pad).abs() < 1e-6);
    }

    #[test]
    fn test_detect_maps_boxes_back_to_frame() {
        let backend = MockYoloBackend::new(80).with_box(20.0, 10.0, 10.0, 10.0, 0, 0.9);
        let shapes = backend.input_shapes();
        let mut detector = detector(backend, 64);

        let detections = detector.detect(&RgbImage::new(128, 64)).unwrap();
        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert_eq!(d.label, "person");
        assert_eq!(d.class_id, 0);
        assert!((d.confidence - 0.9).abs() < 1e-6);
        assert_eq!(d.bbox, BoundingBox::new(30.0, 10.0, 50.0, 30.0));
        assert_eq!(shapes.lock().unwrap()[0], vec![1, 3, 64, 64]);
    }

    #[test]
    fn test_anchor_major_output_is_accepted() {
        let backend = MockYoloBackend::new(80)
            .with_box(20.0, 10.0, 10.0, 10.0, 2, 0.8)
            .anchors_first();
        let mut detector = detector(backend, 32);
        let detections = detector.detect(&RgbImage::new(32, 32)).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "car");
        assert_eq!(detections[0].bbox, BoundingBox::new(15.0, 5.0, 25.0, 15.0));
    }

    #[test]
    fn test_low_scores_are_dropped() {
        let backend = MockYoloBackend::new(80)
            .with_box(20.0, 20.0, 8.0, 8.0, 0, 0.25)
            .with_box(40.0, 40.0, 8.0, 8.0, 0, 0.3);
        let mut detector = detector(backend, 64);
        let detections = detector.detect(&RgbImage::new(64, 64)).unwrap();
        assert_eq!(detections.len(), 1);
        assert!((detections[0].confidence - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_boxes_are_clamped_to_frame() {
        let backend = MockYoloBackend::new(80).with_box(2.0, 60.0, 10.0, 10.0, 16, 0.7);
        let mut detector = detector(backend, 64);
        let detections = detector.detect(&RgbImage::new(64, 64)).unwrap();
        assert_eq!(detections[0].label, "dog");
        assert_eq!(detections[0].bbox, BoundingBox::new(0.0, 55.0, 7.0, 64.0));
    }

    #[test]
    fn test_nms_is_class_wise() {
        let backend = MockYoloBackend::new(80)
            .with_box(20.0, 20.0, 20.0, 20.0, 0, 0.9)
            .with_box(21.0, 21.0, 20.0, 20.0, 0, 0.8)
            .with_box(21.0, 21.0, 20.0, 20.0, 15, 0.6);
        let mut detector = detector(backend, 64);
        let detections = detector.detect(&RgbImage::new(64, 64)).unwrap();
        let labels: Vec<_> = detections.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["person", "cat"]);
    }

    #[test]
    fn test_non_max_suppression_caps_and_orders() {
        let detections: Vec<_> = (0..5)
            .map(|i| {
                let x = i as f32 * 20.0;
                Detection::new(BoundingBox::new(x, 0.0, x + 10.0, 10.0), 0.1 * i as f32, 0, "person")
            })
            .collect();
        let kept = non_max_suppression(detections, 0.5, 3);
        let confidences: Vec<_> = kept.iter().map(|d| d.confidence).collect();
        assert_eq!(confidences.len(), 3);
        assert!(confidences.windows(2).all(|w| w[0] >= w[1]));
        assert!((confidences[0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_label_count_mismatch_is_an_error() {
        let mut detector = detector(MockYoloBackend::new(3), 32);
        let err = detector.detect(&RgbImage::new(32, 32)).unwrap_err();
        assert!(matches!(err, ObjRemovalError::Inference(_)));
    }

    #[test]
    fn test_custom_labels() {
        let backend = MockYoloBackend::new(2).with_box(16.0, 16.0, 8.0, 8.0, 1, 0.95);
        let mut detector = YoloDetector::new(
            Box::new(backend),
            vec!["forklift".into(), "pallet".into()],
            params(32),
        );
        detector.initialize(&EraseConfig::default()).unwrap();
        assert_eq!(detector.labels().len(), 2);
        let detections = detector.detect(&RgbImage::new(32, 32)).unwrap();
        assert_eq!(detections[0].label, "pallet");
    }

    #[test]
    fn test_backend_errors_propagate() {
        let mut failing = YoloDetector::new(
            Box::new(MockYoloBackend::new(80).failing_init()),
            coco_labels(),
            params(32),
        );
        assert!(failing.initialize(&EraseConfig::default()).is_err());

        let mut detector = detector(MockYoloBackend::new(80).failing_inference(), 32);
        assert!(detector.detect(&RgbImage::new(8, 8)).is_err());
    }

    #[test]
    fn test_empty_frame_yields_nothing() {
        let mut detector = detector(MockYoloBackend::new(80).with_box(1.0, 1.0, 1.0, 1.0, 0, 0.9), 32);
        assert!(detector.detect(&RgbImage::new(0, 0)).unwrap().is_empty());
    }
}
