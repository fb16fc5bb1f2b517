//! Mock inference backend emitting YOLOv8-shaped output
//!
//! Lets detector and pipeline tests run without model files, ONNX Runtime or Tract.

use crate::{
    config::EraseConfig,
    error::{ObjRemovalError, Result},
    inference::InferenceBackend,
};
use instant::Duration;
use ndarray::{Array3, Array4, ArrayD};
use std::sync::{Arc, Mutex};

/// A box planted in the mock output, in model-input pixel coordinates
#[derive(Debug, Clone, Copy)]
pub struct PlantedBox {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub class_id: usize,
    pub score: f32,
}

/// Backend that returns a fixed set of boxes for every input
#[derive(Debug, Clone)]
pub struct MockYoloBackend {
    num_classes: usize,
    boxes: Vec<PlantedBox>,
    anchors_last: bool,
    initialized: bool,
    should_fail_init: bool,
    should_fail_inference: bool,
    input_shapes: Arc<Mutex<Vec<Vec<usize>>>>,
}

impl MockYoloBackend {
    #[must_use]
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            boxes: Vec::new(),
            anchors_last: true,
            initialized: false,
            should_fail_init: false,
            should_fail_inference: false,
            input_shapes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Plant a box given by center, size, class and score
    #[must_use]
    pub fn with_box(mut self, cx: f32, cy: f32, w: f32, h: f32, class_id: usize, score: f32) -> Self {
        self.boxes.push(PlantedBox {
            cx,
            cy,
            w,
            h,
            class_id,
            score,
        });
        self
    }

    /// Emit `[1, anchors, 4 + classes]` instead of `[1, 4 + classes, anchors]`
    #[must_use]
    pub fn anchors_first(mut self) -> Self {
        self.anchors_last = false;
        self
    }

    #[must_use]
    pub fn failing_init(mut self) -> Self {
        self.should_fail_init = true;
        self
    }

    #[must_use]
    pub fn failing_inference(mut self) -> Self {
        self.should_fail_inference = true;
        self
    }

    /// Shapes of every tensor passed to `infer`, shared across clones
    #[must_use]
    pub fn input_shapes(&self) -> Arc<Mutex<Vec<Vec<usize>>>> {
        Arc::clone(&self.input_shapes)
    }

    /// Anchor count of a YOLOv8 head for a square input
    #[must_use]
    pub fn anchor_count(input_size: usize) -> usize {
        [8, 16, 32]
            .iter()
            .map(|stride| (input_size / stride).pow(2))
            .sum()
    }
}

impl InferenceBackend for MockYoloBackend {
    fn initialize(&mut self, _config: &EraseConfig) -> Result<Option<Duration>> {
        if self.should_fail_init {
            return Err(ObjRemovalError::model("mock model failed to load"));
        }
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>> {
        if !self.initialized {
            return Err(ObjRemovalError::internal("Backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(ObjRemovalError::inference("mock inference failure"));
        }
        if let Ok(mut shapes) = self.input_shapes.lock() {
            shapes.push(input.shape().to_vec());
        }

        let anchors = Self::anchor_count(input.shape()[2]);
        let channels = 4 + self.num_classes;
        let mut output = Array3::<f32>::zeros((1, channels, anchors));
        for (anchor, planted) in self.boxes.iter().enumerate().take(anchors) {
            output[[0, 0, anchor]] = planted.cx;
            output[[0, 1, anchor]] = planted.cy;
            output[[0, 2, anchor]] = planted.w;
            output[[0, 3, anchor]] = planted.h;
            output[[0, 4 + planted.class_id, anchor]] = planted.score;
        }

        if !self.anchors_last {
            let transposed = output.permuted_axes([0, 2, 1]);
            return Ok(transposed.as_standard_layout().into_owned().into_dyn());
        }
        Ok(output.into_dyn())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
