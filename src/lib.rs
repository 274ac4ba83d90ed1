pub mod config;
pub mod detect;
pub mod error;
pub mod external;
pub mod ocr;
pub mod output;
pub mod plate;
pub mod preprocess;
pub mod processor;
pub mod scanner;
pub mod video;

pub use error::{Error, Result};
