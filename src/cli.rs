//! Command-line flags.  Every flag is optional and overrides the matching
//! `--config` value.

use clap::builder::BoolishValueParser;
use clap::Parser;
use platescan_lib::config::{AppConfig, OcrBackend, OutputFormat};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "platescan")]
#[command(version)]
#[command(about = "Detect license plates in image batches and read them with OCR voting")]
pub struct Cli {
    /// Directory of input images
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Single input image (used when --input-dir is not given)
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// Glob relative to the input directory, e.g. "**/*.jpg"
    #[arg(long)]
    pub pattern: Option<String>,

    /// Detector weights, passed through to the detector command
    #[arg(long)]
    pub weights: Option<PathBuf>,

    /// Detector program and leading arguments, shell-quoted
    #[arg(long)]
    pub detector_cmd: Option<String>,

    /// Class names indexed by class id, comma separated
    #[arg(long, value_delimiter = ',')]
    pub class_names: Option<Vec<String>>,

    /// Detector inference size
    #[arg(long)]
    pub square_size: Option<u32>,

    /// Minimum detection score
    #[arg(long)]
    pub conf: Option<f32>,

    /// Save square-resized inputs here
    #[arg(long)]
    pub save_pre: Option<PathBuf>,

    /// Save images with detection boxes here
    #[arg(long)]
    pub save_vis: Option<PathBuf>,

    /// Save padded plate crops here
    #[arg(long)]
    pub save_crops: Option<PathBuf>,

    /// Main CSV output
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Main output file (written when --format json)
    #[arg(long)]
    pub out: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Append the plate to each saved crop's file name
    #[arg(long)]
    pub name_with_plate: bool,

    #[arg(long, value_enum)]
    pub ocr: Option<OcrBackend>,

    /// OCR program and leading arguments, shell-quoted
    #[arg(long)]
    pub ocr_cmd: Option<String>,

    /// Directory with the oar-ocr recognition model and dictionary
    #[arg(long)]
    pub ocr_models: Option<PathBuf>,

    /// Force GPU on or off for the OCR backend (true/false, yes/no, on/off, 1/0)
    #[arg(long, value_parser = BoolishValueParser::new())]
    pub ocr_gpu: Option<bool>,

    /// OCR-only results keyed by crop path (.json or .csv)
    #[arg(long)]
    pub ocr_out: Option<PathBuf>,

    /// Annotate this video with detection boxes instead of running the image batch
    #[arg(long)]
    pub video: Option<PathBuf>,

    /// Annotated video output (.mp4)
    #[arg(long)]
    pub video_out: Option<PathBuf>,

    /// Downscale annotated frames wider than this
    #[arg(long)]
    pub video_max_width: Option<u32>,

    /// Output frame rate (default: the input's)
    #[arg(long)]
    pub fps_out: Option<f64>,

    /// Load settings from a JSON file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the effective settings to a JSON file
    #[arg(long)]
    pub save_config: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Cli {
    /// Overlay the flags that were given onto `cfg`.
    pub fn apply(&self, cfg: &mut AppConfig) {
        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }
        fn set_opt<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *slot = value.clone();
            }
        }

        set_opt(&mut cfg.input_dir, &self.input_dir);
        set_opt(&mut cfg.image, &self.image);
        set(&mut cfg.pattern, &self.pattern);
        set_opt(&mut cfg.weights, &self.weights);
        set_opt(&mut cfg.detector_command, &self.detector_cmd);
        set(&mut cfg.class_names, &self.class_names);
        set(&mut cfg.square_size, &self.square_size);
        set(&mut cfg.conf, &self.conf);
        set_opt(&mut cfg.save_pre, &self.save_pre);
        set_opt(&mut cfg.save_vis, &self.save_vis);
        set_opt(&mut cfg.save_crops, &self.save_crops);
        set_opt(&mut cfg.csv, &self.csv);
        set_opt(&mut cfg.out, &self.out);
        set(&mut cfg.format, &self.format);
        if self.name_with_plate {
            cfg.name_with_plate = true;
        }
        set(&mut cfg.ocr, &self.ocr);
        set_opt(&mut cfg.ocr_command, &self.ocr_cmd);
        set_opt(&mut cfg.ocr_models, &self.ocr_models);
        set_opt(&mut cfg.ocr_gpu, &self.ocr_gpu);
        set_opt(&mut cfg.ocr_out, &self.ocr_out);
        set_opt(&mut cfg.video, &self.video);
        set_opt(&mut cfg.video_out, &self.video_out);
        set_opt(&mut cfg.video_max_width, &self.video_max_width);
        set_opt(&mut cfg.fps_out, &self.fps_out);
    }
}
