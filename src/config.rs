use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Which OCR backend reads the plate crops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackend {
    /// Detection only.
    #[default]
    None,
    /// External OCR program (`ocr_command`).
    Command,
    /// In-process PaddleOCR recognition (`oar` feature, `ocr_models`).
    Oar,
}

/// Format of the main output file (`out`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

/// Everything one batch run needs.  Loaded from JSON (`--config`) and then
/// overridden by command-line flags; every field has a default so partial
/// files are fine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    // Inputs
    pub input_dir: Option<PathBuf>,
    pub image: Option<PathBuf>,
    /// Glob relative to `input_dir`; `**` spans directories.
    pub pattern: String,

    // Detection
    pub detector_command: Option<String>,
    pub weights: Option<PathBuf>,
    pub class_names: Vec<String>,
    pub square_size: u32,
    pub conf: f32,

    // Outputs
    pub save_pre: Option<PathBuf>,
    pub save_vis: Option<PathBuf>,
    pub save_crops: Option<PathBuf>,
    pub csv: Option<PathBuf>,
    pub out: Option<PathBuf>,
    pub format: OutputFormat,
    pub name_with_plate: bool,

    // OCR
    pub ocr: OcrBackend,
    pub ocr_command: Option<String>,
    pub ocr_models: Option<PathBuf>,
    /// `None` → let the backend autodetect.
    pub ocr_gpu: Option<bool>,
    /// Separate OCR-only file; `.json` → JSON map, anything else → CSV.
    pub ocr_out: Option<PathBuf>,

    // Video
    /// Annotate this video instead of running the image batch.
    pub video: Option<PathBuf>,
    pub video_out: Option<PathBuf>,
    /// Downscale output frames wider than this.
    pub video_max_width: Option<u32>,
    /// `None` → keep the input frame rate.
    pub fps_out: Option<f64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input_dir: None,
            image: None,
            pattern: "**/*.*".to_string(),
            detector_command: None,
            weights: None,
            class_names: vec!["plate".to_string()],
            square_size: 640,
            conf: 0.25,
            save_pre: None,
            save_vis: None,
            save_crops: None,
            csv: None,
            out: None,
            format: OutputFormat::Csv,
            name_with_plate: false,
            ocr: OcrBackend::None,
            ocr_command: None,
            ocr_models: None,
            ocr_gpu: None,
            ocr_out: None,
            video: None,
            video_out: None,
            video_max_width: None,
            fps_out: None,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("parse error in {}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// A lone `image` becomes `input_dir = parent`, `pattern = file name`.
    pub fn resolve_inputs(&mut self) {
        if self.input_dir.is_some() {
            return;
        }
        let Some(image) = &self.image else { return };
        let parent = image
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.input_dir = Some(parent);
        self.pattern = name;
    }

    /// Reject settings that cannot produce a run.
    pub fn validate(&self) -> Result<()> {
        if self.input_dir.is_none() && self.image.is_none() && self.video.is_none() {
            return Err(Error::Config("provide an image, an input directory or a video".to_string()));
        }
        if self.video.is_some() && self.video_out.is_none() {
            return Err(Error::Config("video needs video_out".to_string()));
        }
        if self.fps_out.is_some_and(|f| !(f > 0.0)) {
            return Err(Error::Config("fps_out must be positive".to_string()));
        }
        if self.video_max_width == Some(0) {
            return Err(Error::Config("video_max_width must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.conf) {
            return Err(Error::Config(format!("conf must be within [0, 1], got {}", self.conf)));
        }
        if self.square_size == 0 {
            return Err(Error::Config("square_size must be positive".to_string()));
        }
        if self.pattern.is_empty() {
            return Err(Error::Config("pattern must not be empty".to_string()));
        }
        if self.detector_command.as_deref().map_or(true, |c| c.trim().is_empty()) {
            return Err(Error::Config("detector_command is not set".to_string()));
        }
        match self.ocr {
            OcrBackend::Command if self.ocr_command.as_deref().map_or(true, |c| c.trim().is_empty()) => {
                return Err(Error::Config("ocr = command needs ocr_command".to_string()));
            }
            OcrBackend::Oar if self.ocr_models.is_none() => {
                return Err(Error::Config("ocr = oar needs ocr_models".to_string()));
            }
            _ => {}
        }
        Ok(())
    }
}
