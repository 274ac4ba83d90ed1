pub mod command;
#[cfg(feature = "oar")]
pub mod oar;

use crate::error::Result;
use crate::plate::{normalize, normalize_candidate, PlateCandidate, ALLOWLIST};
use crate::preprocess::{build_variants, VariantParams};
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

// ── Public types ─────────────────────────────────────────────────────────────

/// One text hypothesis returned by a `Recognizer`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TextHypothesis {
    /// Polygon around the recognized text, in variant-image pixels.
    #[serde(default)]
    pub region: Vec<[f32; 2]>,
    pub text: String,
    /// 0.0 – 1.0
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decoder {
    Greedy,
    BeamSearch,
}

impl Decoder {
    pub fn as_str(self) -> &'static str {
        match self {
            Decoder::Greedy     => "greedy",
            Decoder::BeamSearch => "beamsearch",
        }
    }
}

/// Text-detection thresholds, tuned low for small dense plate text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextThresholds {
    pub text: f32,
    pub low_text: f32,
    pub link: f32,
    /// Smallest text box (px) worth recognizing.
    pub min_size: u32,
    pub contrast: f32,
    pub adjust_contrast: f32,
}

/// Per-call recognition settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizeOptions {
    pub allowlist: String,
    pub decoder: Decoder,
    /// `None` → the engine's own defaults.
    pub thresholds: Option<TextThresholds>,
    /// Extra rotations (degrees) the engine should try per text region.
    pub rotations: Vec<i32>,
}

impl RecognizeOptions {
    /// Settings used for every variant during voting.
    pub fn tuned() -> Self {
        Self {
            allowlist: ALLOWLIST.to_string(),
            decoder: Decoder::BeamSearch,
            thresholds: Some(TextThresholds {
                text: 0.3,
                low_text: 0.2,
                link: 0.2,
                min_size: 5,
                contrast: 0.05,
                adjust_contrast: 1.0,
            }),
            rotations: vec![0, -5, 5],
        }
    }

    /// Same allowlist, engine defaults for everything else.  Used for the
    /// raw-join fallback.
    pub fn plain() -> Self {
        Self {
            allowlist: ALLOWLIST.to_string(),
            decoder: Decoder::Greedy,
            thresholds: None,
            rotations: Vec::new(),
        }
    }

    /// Uppercase, then drop every character not in the allowlist.
    pub fn filter_text(&self, text: &str) -> String {
        text.to_uppercase()
            .chars()
            .filter(|c| self.allowlist.contains(*c))
            .collect()
    }
}

/// Every OCR backend implements this.
/// Backends own their model state; callers only see hypotheses.
/// An empty `Vec` means nothing was read, not an error.
pub trait Recognizer {
    fn name(&self) -> &str;
    fn recognize(&self, image: &GrayImage, options: &RecognizeOptions) -> Result<Vec<TextHypothesis>>;
}

/// The plate string chosen for one crop, with the OCR confidence it came with.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlateRecord {
    pub text: String,
    pub confidence: f64,
}

impl PlateRecord {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

// ── Voting ───────────────────────────────────────────────────────────────────

/// Voting score: validity dominates, confidence only breaks ties.
pub fn hypothesis_score(candidate: &PlateCandidate, confidence: f64) -> f64 {
    candidate.validity_score as f64 + (confidence * 100.0).floor() * 0.01
}

/// Runs a `Recognizer` over the preprocessing variants of a crop and keeps
/// the best plate-shaped reading.
pub struct PlateReader<'a> {
    recognizer: &'a dyn Recognizer,
    params: VariantParams,
}

impl<'a> PlateReader<'a> {
    pub fn new(recognizer: &'a dyn Recognizer) -> Self {
        Self::with_params(recognizer, VariantParams::default())
    }

    pub fn with_params(recognizer: &'a dyn Recognizer, params: VariantParams) -> Self {
        Self { recognizer, params }
    }

    pub fn recognizer_name(&self) -> &str {
        self.recognizer.name()
    }

    /// Read the plate in `crop`.
    ///
    /// Every hypothesis of every variant is normalized and scored with
    /// `hypothesis_score`; only a strictly better score replaces the current
    /// best, so earlier variants win ties.  When no variant yields a
    /// non-empty normalized text, the engine runs once more on the gray
    /// variant with plain options and the joined fragments are used with
    /// confidence 0.
    ///
    /// Recognizer errors are returned as-is; the caller decides whether they
    /// are fatal.
    pub fn read(&self, crop: &DynamicImage) -> Result<PlateRecord> {
        if crop.width() == 0 || crop.height() == 0 {
            return Ok(PlateRecord::empty());
        }

        let variants = build_variants(crop, &self.params);
        let tuned = RecognizeOptions::tuned();

        let mut best: Option<(PlateRecord, f64)> = None;
        for variant in &variants {
            for hyp in self.recognizer.recognize(&variant.image, &tuned)? {
                if hyp.text.is_empty() {
                    continue;
                }
                let candidate = normalize_candidate(&hyp.text);
                if candidate.text.is_empty() {
                    continue;
                }
                let score = hypothesis_score(&candidate, hyp.confidence);
                log::debug!(
                    "{:10} {:?} -> {:?} ({:?}) conf={:.3} score={:.2}",
                    variant.kind.name(),
                    hyp.text,
                    candidate.text,
                    candidate.normalization_applied,
                    hyp.confidence,
                    score
                );
                if best.as_ref().map_or(true, |(_, s)| score > *s) {
                    best = Some((
                        PlateRecord {
                            text: candidate.text,
                            confidence: hyp.confidence,
                        },
                        score,
                    ));
                }
            }
        }

        if let Some((record, score)) = best {
            log::debug!("winner {:?} conf={:.3} score={:.2}", record.text, record.confidence, score);
            return Ok(record);
        }

        // ── Fallback: raw join on the gray variant ───────────────────────────
        let fragments = self
            .recognizer
            .recognize(&variants[0].image, &RecognizeOptions::plain())?;
        let joined: String = fragments.iter().map(|h| h.text.as_str()).collect();
        let text = normalize(&joined);
        log::debug!("no candidate; raw join {:?} -> {:?}", joined, text);
        Ok(PlateRecord {
            text,
            confidence: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use image::{Rgb, RgbImage};
    use std::cell::RefCell;

    /// Replays scripted answers: one per `recognize` call, in call order.
    struct ScriptedRecognizer {
        answers: RefCell<Vec<Result<Vec<TextHypothesis>>>>,
        calls: RefCell<Vec<RecognizeOptions>>,
    }

    impl ScriptedRecognizer {
        fn new(answers: Vec<Result<Vec<TextHypothesis>>>) -> Self {
            Self {
                answers: RefCell::new(answers.into_iter().rev().collect()),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Recognizer for ScriptedRecognizer {
        fn name(&self) -> &str {
            "scripted"
        }

        fn recognize(&self, _image: &GrayImage, options: &RecognizeOptions) -> Result<Vec<TextHypothesis>> {
            self.calls.borrow_mut().push(options.clone());
            self.answers.borrow_mut().pop().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn hyp(text: &str, confidence: f64) -> TextHypothesis {
        TextHypothesis {
            region: Vec::new(),
            text: text.to_string(),
            confidence,
        }
    }

    fn crop() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(160, 40, Rgb([200, 200, 200])))
    }

    #[test]
    fn test_score_formula() {
        let plate = normalize_candidate("ABC1234");
        assert!((hypothesis_score(&plate, 0.876) - 12.87).abs() < 1e-9);
        assert!((hypothesis_score(&normalize_candidate("AB"), 1.0) - 1.0).abs() < 1e-9);
        // a pattern match always beats raw confidence
        assert!(hypothesis_score(&plate, 0.0) > hypothesis_score(&normalize_candidate("ABC123"), 1.0));
    }

    #[test]
    fn test_picks_highest_score_across_variants() {
        let rec = ScriptedRecognizer::new(vec![
            Ok(vec![hyp("AB12", 0.99)]),
            Ok(vec![hyp("abc-1234", 0.41)]),
            Ok(vec![hyp("ABC123", 0.95)]),
            Ok(vec![]),
        ]);
        let out = PlateReader::new(&rec).read(&crop()).unwrap();
        assert_eq!(
            out,
            PlateRecord {
                text: "ABC1234".to_string(),
                confidence: 0.41
            }
        );
        let calls = rec.calls.borrow();
        assert_eq!(calls.len(), 4);
        assert!(calls.iter().all(|c| *c == RecognizeOptions::tuned()));
    }

    #[test]
    fn test_first_seen_wins_ties() {
        // 0.501 and 0.509 both floor to 0.50
        let rec = ScriptedRecognizer::new(vec![
            Ok(vec![hyp("QWE1234", 0.501)]),
            Ok(vec![hyp("ABC1234", 0.509)]),
            Ok(vec![]),
            Ok(vec![]),
        ]);
        let out = PlateReader::new(&rec).read(&crop()).unwrap();
        assert_eq!(out.text, "QWE1234");
        assert_eq!(out.confidence, 0.501);
    }

    #[test]
    fn test_empty_texts_are_skipped() {
        let rec = ScriptedRecognizer::new(vec![
            Ok(vec![hyp("", 0.99), hyp("--", 0.98)]),
            Ok(vec![hyp("QWE1234", 0.2)]),
            Ok(vec![]),
            Ok(vec![]),
        ]);
        let out = PlateReader::new(&rec).read(&crop()).unwrap();
        assert_eq!(out.text, "QWE1234");
        assert_eq!(rec.calls.borrow().len(), 4);
    }

    #[test]
    fn test_fallback_joins_fragments() {
        let rec = ScriptedRecognizer::new(vec![
            Ok(vec![]),
            Ok(vec![hyp("", 0.7)]),
            Ok(vec![]),
            Ok(vec![]),
            Ok(vec![hyp("ABC", 0.3), hyp("1234", 0.4)]),
        ]);
        let out = PlateReader::new(&rec).read(&crop()).unwrap();
        assert_eq!(
            out,
            PlateRecord {
                text: "ABC1234".to_string(),
                confidence: 0.0
            }
        );
        let calls = rec.calls.borrow();
        assert_eq!(calls.len(), 5);
        assert_eq!(calls[4], RecognizeOptions::plain());
    }

    #[test]
    fn test_everything_empty() {
        let rec = ScriptedRecognizer::new(vec![]);
        let out = PlateReader::new(&rec).read(&crop()).unwrap();
        assert_eq!(out, PlateRecord::empty());
        assert_eq!(rec.calls.borrow().len(), 5);
    }

    #[test]
    fn test_empty_crop_skips_engine() {
        let rec = ScriptedRecognizer::new(vec![Ok(vec![hyp("ABC1234", 0.9)])]);
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 12));
        let out = PlateReader::new(&rec).read(&empty).unwrap();
        assert_eq!(out, PlateRecord::empty());
        assert!(rec.calls.borrow().is_empty());
    }

    #[test]
    fn test_recognizer_error_propagates() {
        let rec = ScriptedRecognizer::new(vec![
            Ok(vec![hyp("ABC1234", 0.9)]),
            Err(Error::Recognizer("engine crashed".to_string())),
        ]);
        let err = PlateReader::new(&rec).read(&crop()).unwrap_err();
        assert!(matches!(err, Error::Recognizer(_)));
    }

    #[test]
    fn test_filter_text() {
        let opts = RecognizeOptions::tuned();
        assert_eq!(opts.filter_text("AB-c 12"), "ABC12");
        assert_eq!(opts.filter_text("abc1234"), "ABC1234");
    }
}
