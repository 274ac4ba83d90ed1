use image::{DynamicImage, GrayImage};

use super::{RecognizeOptions, Recognizer, TextHypothesis};
use crate::error::Result;
use crate::external::{ExternalCommand, TempImage};

/// OCR through an external program (e.g. an EasyOCR script).
///
/// The program gets `--image <png> --allowlist <chars>`; tuned requests add
/// the decoder, thresholds and rotations.  It must print a JSON array of
/// `{"region": [[x, y], ...], "text": "...", "confidence": 0.0-1.0}`.
pub struct CommandRecognizer {
    command: ExternalCommand,
    /// `None` lets the program decide.
    gpu: Option<bool>,
}

impl CommandRecognizer {
    pub fn new(command: ExternalCommand, gpu: Option<bool>) -> Self {
        Self { command, gpu }
    }
}

impl Recognizer for CommandRecognizer {
    fn name(&self) -> &str {
        "command"
    }

    fn recognize(&self, image: &GrayImage, options: &RecognizeOptions) -> Result<Vec<TextHypothesis>> {
        let tmp = TempImage::write(&DynamicImage::ImageLuma8(image.clone()), "ocr")?;
        let raw: Vec<TextHypothesis> = self.command.run_json(&build_args(&tmp.path_arg(), options, self.gpu))?;

        // Engines are asked to honour the allowlist; enforce it anyway,
        // after uppercasing so lowercase reads are kept.
        Ok(raw
            .into_iter()
            .map(|h| TextHypothesis {
                text: options.filter_text(&h.text),
                confidence: h.confidence.clamp(0.0, 1.0),
                region: h.region,
            })
            .collect())
    }
}

fn build_args(image: &str, options: &RecognizeOptions, gpu: Option<bool>) -> Vec<String> {
    let mut args = vec![
        "--image".to_string(),
        image.to_string(),
        "--allowlist".to_string(),
        options.allowlist.clone(),
    ];
    if let Some(gpu) = gpu {
        args.push("--gpu".to_string());
        args.push(gpu.to_string());
    }
    if let Some(t) = options.thresholds {
        args.push("--decoder".to_string());
        args.push(options.decoder.as_str().to_string());
        for (flag, value) in [
            ("--text-threshold", t.text.to_string()),
            ("--low-text", t.low_text.to_string()),
            ("--link-threshold", t.link.to_string()),
            ("--min-size", t.min_size.to_string()),
            ("--contrast-ths", t.contrast.to_string()),
            ("--adjust-contrast", t.adjust_contrast.to_string()),
        ] {
            args.push(flag.to_string());
            args.push(value);
        }
    }
    if !options.rotations.is_empty() {
        args.push("--rotations".to_string());
        args.push(
            options
                .rotations
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_args() {
        let args = build_args("/tmp/x.png", &RecognizeOptions::plain(), None);
        assert_eq!(
            args,
            vec!["--image", "/tmp/x.png", "--allowlist", crate::plate::ALLOWLIST]
        );
    }

    #[test]
    fn test_tuned_args() {
        let args = build_args("/tmp/x.png", &RecognizeOptions::tuned(), Some(false));
        let joined = args.join(" ");
        assert!(joined.contains("--gpu false"));
        assert!(joined.contains("--decoder beamsearch"));
        assert!(joined.contains("--text-threshold 0.3"));
        assert!(joined.contains("--low-text 0.2"));
        assert!(joined.contains("--min-size 5"));
        assert!(joined.ends_with("--rotations 0,-5,5"));
    }

    #[cfg(unix)]
    #[test]
    fn test_runs_program_and_filters_allowlist() {
        let script = r#"sh -c 'echo "[INFO] reader ready"; echo "[{\"region\":[[0,0],[9,0],[9,4],[0,4]],\"text\":\"ab-C1234\",\"confidence\":0.8}]"' --"#;
        let rec = CommandRecognizer::new(ExternalCommand::parse(script).unwrap(), None);
        let out = rec
            .recognize(&GrayImage::new(10, 5), &RecognizeOptions::tuned())
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "ABC1234");
        assert_eq!(out[0].confidence, 0.8);
        assert_eq!(out[0].region.len(), 4);
    }
}
