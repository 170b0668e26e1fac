// src/detector.rs
//
// Boundary to the external object detector. The pipeline only cares about
// the Detection shape; how boxes are produced (ONNX session, remote
// inference, replayed fixtures) is a backend concern behind this trait.

use crate::types::{Detection, DetectorConfig};
use anyhow::{bail, Result};
use image::RgbImage;
use tracing::info;

pub trait Detector {
    /// Backend identifier for logging.
    fn name(&self) -> &'static str;

    /// Produce the raw detections for one decoded frame. An empty list is
    /// the normal "nothing seen" outcome, not an error.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;
}

/// Backend that never sees anything; the pipeline degrades to SEARCH.
/// Stands in while a real inference backend is wired up, and keeps the
/// binary runnable on machines without an accelerator.
pub struct StubDetector;

impl Detector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
        Ok(Vec::new())
    }
}

pub fn build(cfg: &DetectorConfig) -> Result<Box<dyn Detector>> {
    let detector: Box<dyn Detector> = match cfg.backend.as_str() {
        "stub" => Box::new(StubDetector),
        other => bail!("unknown detector backend '{}'", other),
    };
    info!(
        "✓ Detector backend '{}' ready (model={}, conf>{:.2})",
        detector.name(),
        cfg.model,
        cfg.confidence_threshold
    );
    Ok(detector)
}
