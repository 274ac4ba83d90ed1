//! Bridge to detector/OCR programs that run out of process.
//!
//! A backend is a command line (split like a shell would); each call appends
//! its own flags, runs it, and parses a JSON payload from stdout.

use crate::error::{Error, Result};
use image::DynamicImage;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
}

impl ExternalCommand {
    pub fn parse(cmd: &str) -> Result<Self> {
        let mut parts = shell_words::split(cmd)
            .map_err(|e| Error::Config(format!("invalid command {cmd:?}: {e}")))?;
        if parts.is_empty() {
            return Err(Error::Config("empty command".to_string()));
        }
        let program = parts.remove(0);
        Ok(Self { program, args: parts })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run with `extra` appended and return stdout.  A non-zero exit status is
    /// an error carrying the trimmed stderr.
    pub fn run(&self, extra: &[String]) -> Result<String> {
        log::trace!("running {} {:?} {:?}", self.program, self.args, extra);
        let output = Command::new(&self.program)
            .args(&self.args)
            .args(extra)
            .output()
            .map_err(|e| Error::Command(format!("{}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Command(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub fn run_json<T: DeserializeOwned>(&self, extra: &[String]) -> Result<T> {
        let stdout = self.run(extra)?;
        parse_json_reply(&stdout).ok_or_else(|| {
            Error::Command(format!("{}: no valid JSON reply in {:?}", self.program, stdout.trim()))
        })
    }
}

/// First JSON document of type `T` in program output that may carry log
/// lines around it, including bracketed ones like `[INFO] loading`.
///
/// Every `{` / `[` is tried as a start in order; the document may be
/// followed by anything.
pub fn parse_json_reply<T: DeserializeOwned>(output: &str) -> Option<T> {
    output
        .char_indices()
        .filter(|&(_, c)| c == '{' || c == '[')
        .find_map(|(start, _)| {
            serde_json::Deserializer::from_str(&output[start..])
                .into_iter::<T>()
                .next()
                .and_then(|parsed| parsed.ok())
        })
}

/// An image written to the temp dir for an external program; removed on drop.
pub struct TempImage {
    path: PathBuf,
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

impl TempImage {
    pub fn write(image: &DynamicImage, prefix: &str) -> Result<Self> {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "platescan_{prefix}_{}_{n}.png",
            std::process::id()
        ));
        image.save(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn path_arg(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
