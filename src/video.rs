//! Detection-only video annotation: every frame goes through the plate
//! detector and comes out with its boxes drawn, optionally downscaled.

#[cfg(feature = "video")]
mod codec;

use crate::detect::{Detection, Detector};
use crate::processor::draw_detections;
use image::{imageops::FilterType, RgbImage};

/// Output frame size: `(w, h)` unless `max_width` is smaller than `w`, in
/// which case the frame is scaled down keeping its aspect ratio.  Both sides
/// are rounded down to even numbers for 4:2:0 encoders.
pub fn output_size(w: u32, h: u32, max_width: Option<u32>) -> (u32, u32) {
    let (w_out, h_out) = match max_width {
        Some(max) if max > 0 && w > max => (max, (h as f64 * max as f64 / w as f64) as u32),
        _ => (w, h),
    };
    ((w_out & !1).max(2), (h_out & !1).max(2))
}

/// Map a box into a frame scaled by `(sx, sy)`; coordinates are truncated.
pub fn scale_detection(d: &Detection, sx: f64, sy: f64) -> Detection {
    Detection {
        x1: (d.x1 as f64 * sx) as i32,
        y1: (d.y1 as f64 * sy) as i32,
        x2: (d.x2 as f64 * sx) as i32,
        y2: (d.y2 as f64 * sy) as i32,
        ..*d
    }
}

/// Runs the detector on a frame and returns the annotated output frame.
pub struct FrameAnnotator<'a> {
    detector: &'a dyn Detector,
    conf: f32,
    square_size: u32,
    out_size: (u32, u32),
}

impl<'a> FrameAnnotator<'a> {
    pub fn new(detector: &'a dyn Detector, conf: f32, square_size: u32, out_size: (u32, u32)) -> Self {
        Self { detector, conf, square_size, out_size }
    }

    /// Detection runs on the full-size frame; boxes are scaled onto the
    /// output frame.  A detector failure leaves the frame unannotated.
    pub fn annotate(&self, frame: &RgbImage) -> RgbImage {
        let detections = self
            .detector
            .predict(frame, self.conf, self.square_size)
            .unwrap_or_else(|e| {
                log::warn!("Detector {} failed on a frame: {e}", self.detector.name());
                Vec::new()
            });

        let (w, h) = self.out_size;
        if (w, h) == frame.dimensions() {
            return draw_detections(frame, &detections);
        }
        let sx = w as f64 / frame.width() as f64;
        let sy = h as f64 / frame.height() as f64;
        let resized = image::imageops::resize(frame, w, h, FilterType::Triangle);
        let scaled: Vec<Detection> = detections.iter().map(|d| scale_detection(d, sx, sy)).collect();
        draw_detections(&resized, &scaled)
    }
}

/// Annotate `cfg.video` into `cfg.video_out`; returns the number of frames
/// written.
#[cfg(feature = "video")]
pub fn run_video(cfg: &crate::config::AppConfig, detector: &dyn Detector) -> crate::error::Result<u64> {
    use crate::error::Error;

    let (Some(input), Some(output)) = (&cfg.video, &cfg.video_out) else {
        return Err(Error::Config("video mode needs video and video_out".to_string()));
    };
    codec::annotate_video(input, output, cfg, detector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use image::Rgb;

    struct OneBox;

    impl Detector for OneBox {
        fn name(&self) -> &str {
            "one-box"
        }

        fn class_names(&self) -> Vec<String> {
            Vec::new()
        }

        fn predict(&self, image: &RgbImage, _confidence: f32, _inference_size: u32) -> Result<Vec<Detection>> {
            if image.width() < 20 {
                return Err(Error::Detector("too small".to_string()));
            }
            Ok(vec![Detection { x1: 20, y1: 10, x2: 60, y2: 30, score: 0.8, class_id: 0 }])
        }
    }

    const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

    #[test]
    fn test_output_size() {
        assert_eq!(output_size(1920, 1080, None), (1920, 1080));
        assert_eq!(output_size(1920, 1080, Some(4000)), (1920, 1080));
        assert_eq!(output_size(1920, 1080, Some(960)), (960, 540));
        // odd sides are rounded down
        assert_eq!(output_size(1280, 721, None), (1280, 720));
        assert_eq!(output_size(1000, 333, Some(500)), (500, 166));
    }

    #[test]
    fn test_scale_detection() {
        let d = Detection { x1: 10, y1: 20, x2: 31, y2: 41, score: 0.5, class_id: 2 };
        let s = scale_detection(&d, 0.5, 0.5);
        assert_eq!(s.bbox(), [5, 10, 15, 20]);
        assert_eq!(s.class_id, 2);
    }

    #[test]
    fn test_annotate_full_size() {
        let frame = RgbImage::new(80, 40);
        let out = FrameAnnotator::new(&OneBox, 0.25, 640, (80, 40)).annotate(&frame);
        assert_eq!(out.dimensions(), (80, 40));
        assert_eq!(*out.get_pixel(20, 10), GREEN);
        assert_eq!(*out.get_pixel(60, 30), GREEN);
    }

    #[test]
    fn test_annotate_downscaled() {
        let frame = RgbImage::new(80, 40);
        let out = FrameAnnotator::new(&OneBox, 0.25, 640, (40, 20)).annotate(&frame);
        assert_eq!(out.dimensions(), (40, 20));
        assert_eq!(*out.get_pixel(10, 5), GREEN);
        assert_eq!(*out.get_pixel(30, 15), GREEN);
        assert_eq!(*out.get_pixel(20, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_detector_failure_leaves_frame_plain() {
        let frame = RgbImage::from_pixel(10, 10, Rgb([7, 7, 7]));
        let out = FrameAnnotator::new(&OneBox, 0.25, 640, (10, 10)).annotate(&frame);
        assert_eq!(out, frame);
    }
}
