use image::{DynamicImage, RgbImage};
use serde::Deserialize;
use std::cell::RefCell;
use std::path::PathBuf;

use super::{clamp_detections, Detection, Detector};
use crate::error::{Error, Result};
use crate::external::{ExternalCommand, TempImage};

#[derive(Debug, Deserialize)]
struct RawDetection {
    bbox: [f64; 4],
    #[serde(default)]
    score: f32,
    #[serde(default, rename = "class")]
    class_id: i64,
}

#[derive(Debug, Deserialize)]
struct DetectorResponse {
    #[serde(default)]
    names: Option<Vec<String>>,
    #[serde(default)]
    detections: Vec<RawDetection>,
    #[serde(default)]
    error: Option<String>,
}

/// Plate detection through an external program (e.g. a YOLO script).
///
/// The program gets `--image <png> --conf <f> --imgsz <n>` (plus
/// `--weights <path>` when configured) and must print
/// `{"detections": [{"bbox": [x1, y1, x2, y2], "score": f, "class": i}]}`,
/// optionally with `"names": [...]`.
pub struct CommandDetector {
    command: ExternalCommand,
    weights: Option<PathBuf>,
    names: RefCell<Vec<String>>,
}

impl CommandDetector {
    pub fn new(command: ExternalCommand, weights: Option<PathBuf>, class_names: Vec<String>) -> Self {
        Self {
            command,
            weights,
            names: RefCell::new(class_names),
        }
    }

    fn args(&self, image: &str, confidence: f32, inference_size: u32) -> Vec<String> {
        let mut args = vec![
            "--image".to_string(),
            image.to_string(),
            "--conf".to_string(),
            confidence.to_string(),
            "--imgsz".to_string(),
            inference_size.to_string(),
        ];
        if let Some(w) = &self.weights {
            args.push("--weights".to_string());
            args.push(w.to_string_lossy().into_owned());
        }
        args
    }
}

impl Detector for CommandDetector {
    fn name(&self) -> &str {
        self.command.program()
    }

    fn class_names(&self) -> Vec<String> {
        self.names.borrow().clone()
    }

    fn predict(&self, image: &RgbImage, confidence: f32, inference_size: u32) -> Result<Vec<Detection>> {
        let tmp = TempImage::write(&DynamicImage::ImageRgb8(image.clone()), "frame")?;
        let resp: DetectorResponse = self
            .command
            .run_json(&self.args(&tmp.path_arg(), confidence, inference_size))?;

        if let Some(err) = resp.error {
            return Err(Error::Detector(err));
        }
        if let Some(names) = resp.names {
            if !names.is_empty() {
                *self.names.borrow_mut() = names;
            }
        }

        // Float boxes are truncated, like casting model output to int.
        let raw = resp
            .detections
            .into_iter()
            .filter(|d| d.score >= confidence)
            .map(|d| Detection {
                x1: d.bbox[0] as i32,
                y1: d.bbox[1] as i32,
                x2: d.bbox[2] as i32,
                y2: d.bbox[3] as i32,
                score: d.score,
                class_id: d.class_id,
            })
            .collect();
        Ok(clamp_detections(raw, image.width(), image.height()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_include_weights() {
        let det = CommandDetector::new(
            ExternalCommand::parse("yolo-detect").unwrap(),
            Some(PathBuf::from("best.pt")),
            vec!["plate".to_string()],
        );
        assert_eq!(
            det.args("/tmp/f.png", 0.25, 640),
            vec!["--image", "/tmp/f.png", "--conf", "0.25", "--imgsz", "640", "--weights", "best.pt"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_predict_parses_and_clamps() {
        let script = r#"sh -c 'echo "{\"names\":[\"lp\"],\"detections\":[{\"bbox\":[-4.7,2.2,30.9,12.0],\"score\":0.9,\"class\":0},{\"bbox\":[50,1,60,9],\"score\":0.8,\"class\":0},{\"bbox\":[1,1,5,5],\"score\":0.1,\"class\":0}]}"' --"#;
        let det = CommandDetector::new(ExternalCommand::parse(script).unwrap(), None, vec![]);
        let out = det.predict(&RgbImage::new(20, 10), 0.25, 640).unwrap();
        assert_eq!(
            out,
            vec![Detection { x1: 0, y1: 2, x2: 19, y2: 9, score: 0.9, class_id: 0 }]
        );
        assert_eq!(det.class_names(), vec!["lp".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_predict_ignores_bracketed_log_lines() {
        let script = r#"sh -c 'echo "[INFO] loading weights"; echo "{\"detections\":[{\"bbox\":[1,1,8,6],\"score\":0.7,\"class\":0}]}"; echo "[INFO] done"' --"#;
        let det = CommandDetector::new(ExternalCommand::parse(script).unwrap(), None, vec!["plate".to_string()]);
        let out = det.predict(&RgbImage::new(20, 10), 0.25, 640).unwrap();
        assert_eq!(out, vec![Detection { x1: 1, y1: 1, x2: 8, y2: 6, score: 0.7, class_id: 0 }]);
    }

    #[cfg(unix)]
    #[test]
    fn test_predict_reports_program_error() {
        let script = r#"sh -c 'echo "{\"error\":\"weights missing\"}"' --"#;
        let det = CommandDetector::new(ExternalCommand::parse(script).unwrap(), None, vec![]);
        let err = det.predict(&RgbImage::new(20, 10), 0.25, 640).unwrap_err();
        assert!(matches!(err, Error::Detector(ref m) if m == "weights missing"));
    }
}
