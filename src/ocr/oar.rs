use image::{imageops::FilterType, DynamicImage, GrayImage, Luma};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use oar_ocr::predictors::TextRecognitionPredictor;
use std::path::Path;

use super::{RecognizeOptions, Recognizer, TextHypothesis};
use crate::error::{Error, Result};

/// Minimum height fed to PaddleOCR v5 mobile (normalises inputs to 48 px internally).
const MIN_HEIGHT: u32 = 48;

pub const REC_MODEL: &str = "pp-ocrv5_mobile_rec.onnx";
pub const DICT: &str = "ppocrv5_dict.txt";

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct OarPipeline {
    rec: TextRecognitionPredictor,
}

/// Build the recognition pipeline from a directory holding `REC_MODEL` and `DICT`.
pub fn build_pipeline(models_dir: &Path) -> Result<OarPipeline> {
    let rec_model = models_dir.join(REC_MODEL);
    let dict = models_dir.join(DICT);
    if !rec_model.exists() || !dict.exists() {
        return Err(Error::Config(format!(
            "oar-ocr models not found in {} (need {REC_MODEL} and {DICT})",
            models_dir.display()
        )));
    }
    let rec = TextRecognitionPredictor::builder()
        .dict_path(dict.to_string_lossy().as_ref())
        // no score filtering here, voting ranks everything
        .score_threshold(0.0)
        .build(rec_model.to_string_lossy().as_ref())
        .map_err(|e| Error::Recognizer(e.to_string()))?;
    Ok(OarPipeline { rec })
}

// ── Recognizer impl ───────────────────────────────────────────────────────────

/// Recognition-only PaddleOCR.  The plate crop is already the text area, so
/// each call yields at most one hypothesis spanning the whole image: the
/// best-scoring of the requested rotations.
///
/// Detection thresholds and the decoder choice do not apply to a
/// recognition-only CTC model; only `min_size`, the allowlist and the
/// rotations are honoured.
pub struct OarRecognizer {
    pub pipeline: OarPipeline,
}

impl Recognizer for OarRecognizer {
    fn name(&self) -> &str {
        "oar-ocr"
    }

    fn recognize(&self, image: &GrayImage, options: &RecognizeOptions) -> Result<Vec<TextHypothesis>> {
        let (w, h) = image.dimensions();
        let min_size = options.thresholds.map_or(1, |t| t.min_size.max(1));
        if w < min_size || h < min_size {
            return Ok(Vec::new());
        }

        let angles: &[i32] = if options.rotations.is_empty() { &[0] } else { &options.rotations };

        let mut best: Option<TextHypothesis> = None;
        for &angle in angles {
            let rotated = if angle == 0 {
                image.clone()
            } else {
                rotate_about_center(
                    image,
                    (angle as f32).to_radians(),
                    Interpolation::Bilinear,
                    Luma([255u8]),
                )
            };

            // Upscale to at least MIN_HEIGHT, keeping aspect ratio.
            let img = DynamicImage::ImageLuma8(rotated);
            let img = if h < MIN_HEIGHT {
                let scale = (MIN_HEIGHT + h - 1) / h;
                img.resize(w * scale, h * scale, FilterType::Lanczos3).to_rgb8()
            } else {
                img.to_rgb8()
            };

            let result = self
                .pipeline
                .rec
                .predict(vec![img])
                .map_err(|e| Error::Recognizer(format!("oar-ocr predict: {e}")))?;

            let Some(text) = result.texts.into_iter().next() else { continue };
            let score = result.scores.into_iter().next().unwrap_or(0.0) as f64;
            let text = options.filter_text(&text);

            log::trace!("oar-ocr rot={angle:+} {:?} conf={score:.3}", text);

            if text.is_empty() {
                continue;
            }
            if best.as_ref().map_or(true, |b| score > b.confidence) {
                best = Some(TextHypothesis {
                    region: vec![[0.0, 0.0], [w as f32, 0.0], [w as f32, h as f32], [0.0, h as f32]],
                    text,
                    confidence: score,
                });
            }
        }

        Ok(best.into_iter().collect())
    }
}
