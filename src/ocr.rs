use image::{DynamicImage, ImageFormat};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::error;

/// Tracing target for per-page failures. Routed to the error log only.
pub const OCR_FAILURE_TARGET: &str = "pagescan::ocr_failure";

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("cannot read image: {0}")]
    Image(#[from] image::ImageError),
    #[error("cannot start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Engine {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("i/o error talking to OCR engine: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything that turns decoded page pixels into text.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

/// OCR engine wrapping the `tesseract` CLI tool.
pub struct TesseractEngine {
    program: String,
    lang: String,
}

impl TesseractEngine {
    pub fn new() -> Self {
        Self {
            program: "tesseract".to_string(),
            lang: "eng".to_string(),
        }
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let mut child = Command::new(&self.program)
            .args(["stdin", "stdout", "-l", &self.lang])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| OcrError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // tesseract reads all of stdin before it writes anything, so the
        // pipe must be closed before waiting on output. The child is reaped
        // even when the write fails.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&png),
            None => Ok(()),
        };

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(OcrError::Engine {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written?;

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Text recognized on one page image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrPage {
    pub path: PathBuf,
    pub text: String,
}

impl OcrPage {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// OCR a single page. Failures are logged and yield empty text so that one
/// bad page never aborts its chapter.
pub fn ocr_page(engine: &dyn OcrEngine, path: &Path) -> OcrPage {
    let text = match image::open(path)
        .map_err(OcrError::from)
        .and_then(|img| engine.recognize(&img))
    {
        Ok(text) => text,
        Err(err) => {
            error!(
                target: OCR_FAILURE_TARGET,
                "Error processing image {}: {}",
                path.display(),
                err
            );
            String::new()
        }
    };

    OcrPage {
        path: path.to_path_buf(),
        text,
    }
}
