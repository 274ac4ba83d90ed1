pub mod command;

use crate::error::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// One detector box in source-image pixels.
///
/// Boxes handed out by a `Detector` always satisfy `x2 > x1 && y2 > y1` and
/// lie inside the image (see `clamp_detections`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    /// 0.0 – 1.0
    pub score: f32,
    pub class_id: i64,
}

impl Detection {
    pub fn bbox(&self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Clamp to `0..=w-1` / `0..=h-1`; `None` when nothing with positive area
    /// is left.
    pub fn clamped(&self, img_w: u32, img_h: u32) -> Option<Detection> {
        if img_w == 0 || img_h == 0 {
            return None;
        }
        let max_x = img_w as i32 - 1;
        let max_y = img_h as i32 - 1;
        let d = Detection {
            x1: self.x1.clamp(0, max_x),
            y1: self.y1.clamp(0, max_y),
            x2: self.x2.clamp(0, max_x),
            y2: self.y2.clamp(0, max_y),
            ..*self
        };
        (d.x2 > d.x1 && d.y2 > d.y1).then_some(d)
    }
}

/// Clamp every box to the image and drop the ones with no area left.
pub fn clamp_detections(raw: Vec<Detection>, img_w: u32, img_h: u32) -> Vec<Detection> {
    raw.iter().filter_map(|d| d.clamped(img_w, img_h)).collect()
}

/// Label for `class_id`: the class name when known, else the number itself.
pub fn class_label(names: &[String], class_id: i64) -> String {
    usize::try_from(class_id)
        .ok()
        .and_then(|i| names.get(i))
        .cloned()
        .unwrap_or_else(|| class_id.to_string())
}

/// Every plate detector implements this.
pub trait Detector {
    fn name(&self) -> &str;

    /// Class names indexed by `class_id`.
    fn class_names(&self) -> Vec<String>;

    /// Detect plates with score ≥ `confidence`, running the model at
    /// `inference_size`.  Implementations return clamped boxes only.
    fn predict(&self, image: &RgbImage, confidence: f32, inference_size: u32) -> Result<Vec<Detection>>;
}
