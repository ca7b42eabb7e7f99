use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use image::GrayImage;

pub trait LineRecognizer {
    fn recognize(&self, line: &GrayImage) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct TesseractLineRecognizer {
    lang: String,
}

static LINE_COUNTER: AtomicU64 = AtomicU64::new(0);

impl TesseractLineRecognizer {
    pub fn new(lang: impl Into<String>) -> Self {
        Self { lang: lang.into() }
    }

    fn scratch_path(&self) -> PathBuf {
        let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        std::env::temp_dir().join(format!(
            "species_index_line_{}_{}_{}.png",
            std::process::id(),
            LINE_COUNTER.fetch_add(1, Ordering::Relaxed),
            stamp
        ))
    }
}

impl LineRecognizer for TesseractLineRecognizer {
    fn recognize(&self, line: &GrayImage) -> Result<String> {
        let png_path = self.scratch_path();
        line.save(&png_path)
            .with_context(|| format!("failed to write line image {}", png_path.display()))?;

        let output = Command::new("tesseract")
            .arg(&png_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .arg("--psm")
            .arg("7")
            .output()
            .with_context(|| format!("failed to execute tesseract for {}", png_path.display()));

        let _ = fs::remove_file(&png_path);
        let output = output?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("tesseract returned non-zero exit status: {}", stderr.trim());
        }

        Ok(normalize_ocr_text(&String::from_utf8_lossy(&output.stdout)))
    }
}

pub fn normalize_ocr_text(raw: &str) -> String {
    raw.replace('\u{0000}', "")
        .trim()
        .replace('\u{2014}', "-")
        .replace(['\u{2018}', '\u{2019}'], "")
}

pub fn tesseract_version() -> Option<String> {
    let output = Command::new("tesseract").arg("--version").output().ok()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let source = if stdout.trim().is_empty() {
        stderr.trim()
    } else {
        stdout.trim()
    };

    source
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_ocr_text_cleans_typography() {
        assert_eq!(normalize_ocr_text("  Aega\u{2014}42 \n"), "Aega-42");
        assert_eq!(normalize_ocr_text("\u{2018}Reniera\u{2019}\u{0000}"), "Reniera");
        assert_eq!(normalize_ocr_text("\n\n"), "");
    }

    #[test]
    fn scratch_paths_are_unique() {
        let recognizer = TesseractLineRecognizer::new("eng");
        assert_ne!(recognizer.scratch_path(), recognizer.scratch_path());
    }
}
