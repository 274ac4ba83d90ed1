//! Error types for platescan

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Detector error: {0}")]
    Detector(String),

    #[error("Recognizer error: {0}")]
    Recognizer(String),

    #[error("External command failed: {0}")]
    Command(String),

    #[error("Video error: {0}")]
    Video(String),
}

pub type Result<T> = std::result::Result<T, Error>;
