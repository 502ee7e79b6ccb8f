// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Recognizer backed by the `ocrs` engine. Built only with the `ocr` feature.
//
// The engine needs two model files, `text-detection.rten` and
// `text-recognition.rten`. `ocrs-cli` downloads them to `~/.cache/ocrs` the
// first time it runs, which is also the default location searched here.

use std::path::{Path, PathBuf};

use docforge_core::error::{ForgeError, Result};
use image::{DynamicImage, GrayImage};
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use tracing::{debug, info, instrument};

use super::{PixelRect, RecognizedLine, TextRecognizer};

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// `$XDG_CACHE_HOME/ocrs`, else `~/.cache/ocrs`.
fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Where the model files live.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub detection: PathBuf,
    pub recognition: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self::from_dir(default_model_dir())
    }
}

impl ModelPaths {
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection: dir.join(DETECTION_MODEL_FILENAME),
            recognition: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for path in [&self.detection, &self.recognition] {
            if !path.exists() {
                return Err(ForgeError::OcrUnavailable(format!(
                    "model not found at {}; run `ocrs-cli` once to download models",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

pub struct OcrsRecognizer {
    engine: OcrEngine,
}

impl std::fmt::Debug for OcrsRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrsRecognizer").finish_non_exhaustive()
    }
}

impl OcrsRecognizer {
    /// Load both models. This is the expensive step; keep the recognizer
    /// around for the life of the process.
    #[instrument(skip_all, fields(detection = %paths.detection.display()))]
    pub fn new(paths: &ModelPaths) -> Result<Self> {
        paths.validate()?;
        let load = |path: &Path| {
            Model::load_file(path).map_err(|err| {
                ForgeError::OcrUnavailable(format!("failed to load model {}: {err}", path.display()))
            })
        };
        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(load(&paths.detection)?),
            recognition_model: Some(load(&paths.recognition)?),
            ..Default::default()
        })
        .map_err(|err| ForgeError::OcrUnavailable(format!("failed to initialise OCR engine: {err}")))?;
        info!("OCR engine initialised");
        Ok(Self { engine })
    }

    /// Models from `dir`, or the default cache directory.
    pub fn from_model_dir(dir: Option<&Path>) -> Result<Self> {
        let paths = dir.map(ModelPaths::from_dir).unwrap_or_default();
        Self::new(&paths)
    }
}

impl TextRecognizer for OcrsRecognizer {
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn recognize(&self, image: &GrayImage) -> Result<Vec<RecognizedLine>> {
        let rgb = DynamicImage::ImageLuma8(image.clone()).to_rgb8();
        let (width, height) = rgb.dimensions();
        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height))
            .map_err(|err| ForgeError::Ocr(format!("image source ({width}x{height}): {err}")))?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|err| ForgeError::Ocr(format!("preprocessing failed: {err}")))?;

        let words = self
            .engine
            .detect_words(&input)
            .map_err(|err| ForgeError::Ocr(format!("word detection failed: {err}")))?;
        let line_rects = self.engine.find_text_lines(&input, &words);
        let texts = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|err| ForgeError::Ocr(format!("line recognition failed: {err}")))?;

        let mut lines = Vec::new();
        for (rects, text) in line_rects.iter().zip(texts) {
            let Some(text) = text else { continue };
            let text = text.to_string();
            if text.trim().is_empty() {
                continue;
            }
            let bounds = rects
                .iter()
                .map(|r| r.bounding_rect())
                .map(|r| (r.left(), r.top(), r.right(), r.bottom()))
                .reduce(|a, b| (a.0.min(b.0), a.1.min(b.1), a.2.max(b.2), a.3.max(b.3)));
            let Some((left, top, right, bottom)) = bounds else { continue };
            lines.push(RecognizedLine {
                text,
                rect: PixelRect {
                    x: left.max(0.0),
                    y: top.max(0.0),
                    width: (right - left).max(1.0),
                    height: (bottom - top).max(1.0),
                },
            });
        }
        debug!(lines = lines.len(), "recognition complete");
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_paths_from_dir() {
        let paths = ModelPaths::from_dir("/tmp/models");
        assert_eq!(paths.detection, PathBuf::from("/tmp/models/text-detection.rten"));
        assert_eq!(paths.recognition, PathBuf::from("/tmp/models/text-recognition.rten"));
    }

    #[test]
    fn missing_models_mean_ocr_is_unavailable() {
        let err = OcrsRecognizer::new(&ModelPaths::from_dir("/nonexistent/ocr-models")).unwrap_err();
        assert!(matches!(err, ForgeError::OcrUnavailable(_)));
    }
}
