// Tesseract command line backend for the generic OCR fallback

use super::TextRecognizer;
use crate::consts::{DEFAULT_PAGE_SEGMENTATION_MODE, DEFAULT_WHITELIST};
use crate::error::RecognitionError;
use crate::preprocess::Mask;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use tempfile::NamedTempFile;

const COMMON_LOCATIONS: [&str; 5] = [
    "/usr/bin/tesseract",
    "/usr/local/bin/tesseract",
    "/opt/homebrew/bin/tesseract",
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Explicit executable; searched on PATH and common locations otherwise.
    pub tesseract_path: Option<PathBuf>,
    pub page_segmentation_mode: u8,
    pub whitelist: String,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            tesseract_path: None,
            page_segmentation_mode: DEFAULT_PAGE_SEGMENTATION_MODE,
            whitelist: DEFAULT_WHITELIST.to_string(),
        }
    }
}

/// Runs the `tesseract` executable on a temporary PNG of the mask.
pub struct TesseractCli {
    explicit: Option<PathBuf>,
    page_segmentation_mode: u8,
    executable: OnceLock<Option<PathBuf>>,
}

impl TesseractCli {
    pub fn new(config: &FallbackConfig) -> Self {
        Self {
            explicit: config.tesseract_path.clone(),
            page_segmentation_mode: config.page_segmentation_mode,
            executable: OnceLock::new(),
        }
    }

    /// Path of the executable, looked up once.
    pub fn executable(&self) -> Result<&Path, RecognitionError> {
        self.executable
            .get_or_init(|| {
                let found = find_tesseract_executable(self.explicit.as_deref());
                match &found {
                    Some(path) => log::info!("Using tesseract at {}", path.display()),
                    None => log::warn!("Tesseract executable not found"),
                }
                found
            })
            .as_deref()
            .ok_or_else(|| {
                RecognitionError::EngineUnavailable(
                    "tesseract executable not found, install Tesseract-OCR or set fallback.tesseract_path"
                        .to_string(),
                )
            })
    }
}

impl TextRecognizer for TesseractCli {
    fn read_text(&self, mask: &Mask, whitelist: &str) -> Result<String, RecognitionError> {
        let executable = self.executable()?;

        // Tesseract reads dark text on a light page best
        let mut page = mask.clone();
        image::imageops::invert(&mut page);

        let input = NamedTempFile::with_suffix(".png")
            .map_err(|e| RecognitionError::Engine(format!("temporary file: {}", e)))?;
        page.save(input.path())
            .map_err(|e| RecognitionError::Engine(format!("writing mask: {}", e)))?;

        let output = Command::new(executable)
            .arg(input.path())
            .arg("stdout")
            .arg("--psm")
            .arg(self.page_segmentation_mode.to_string())
            .arg("-c")
            .arg(format!("tessedit_char_whitelist={}", whitelist))
            .output()
            .map_err(|e| RecognitionError::EngineUnavailable(format!("{}: {}", executable.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognitionError::Engine(format!("tesseract failed: {}", stderr.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Finds the Tesseract executable: explicit path, then PATH, then common install locations.
pub fn find_tesseract_executable(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        log::warn!("Configured tesseract {} does not exist", path.display());
    }

    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Some(PathBuf::from("tesseract"));
        }
    }

    COMMON_LOCATIONS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_is_preferred() {
        let file = NamedTempFile::new().unwrap();
        let found = find_tesseract_executable(Some(file.path()));
        assert_eq!(found.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_fallback_config_defaults() {
        let config: FallbackConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.whitelist, "0123456789.");
        assert_eq!(config.page_segmentation_mode, 6);
        assert!(config.tesseract_path.is_none());
    }
}
