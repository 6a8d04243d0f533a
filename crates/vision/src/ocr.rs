//! Optical-recognition backend seam.
//!
//! A production binding would put a real OCR engine behind [`OcrBackend`];
//! the shipped [`MockOcrBackend`] resolves deterministic fixtures by
//! evidence id, which is what the demo daemon and the tests run against.

use std::collections::HashMap;

use image::GrayImage;
use serde::Deserialize;

/// One recognized text span with its recognition confidence in [0, 1].
#[derive(Debug, Clone)]
pub struct OcrSpan {
    pub text: String,
    pub conf: f64,
}

pub trait OcrBackend: Send + Sync {
    fn read_text(&self, image: &GrayImage, evidence_id: Option<&str>) -> Vec<OcrSpan>;

    /// Panel identifier associated with the captured frame, when the
    /// backend knows it (fixture metadata in the mock case).
    fn panel_hint(&self, _evidence_id: Option<&str>) -> Option<String> {
        None
    }
}

/// One fixture entry, keyed by evidence id in the fixture file. Either
/// `raw_text` or the individual label fields may be present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OcrFixture {
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub port_label: Option<String>,
    #[serde(default)]
    pub cable_tag: Option<String>,
    #[serde(default)]
    pub panel_id: Option<String>,
    #[serde(default)]
    pub ocr_conf: Option<f64>,
}

pub struct MockOcrBackend {
    fixtures: HashMap<String, OcrFixture>,
}

impl MockOcrBackend {
    pub fn new(fixtures: HashMap<String, OcrFixture>) -> Self {
        Self { fixtures }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    fn entry(&self, evidence_id: Option<&str>) -> OcrFixture {
        evidence_id
            .and_then(|id| self.fixtures.get(id))
            .or_else(|| self.fixtures.get("default"))
            .cloned()
            .unwrap_or_default()
    }
}

impl OcrBackend for MockOcrBackend {
    fn read_text(&self, _image: &GrayImage, evidence_id: Option<&str>) -> Vec<OcrSpan> {
        let fx = self.entry(evidence_id);
        let raw = fx.raw_text.unwrap_or_else(|| {
            let port = fx.port_label.as_deref().unwrap_or("");
            let tag = fx.cable_tag.as_deref().unwrap_or("");
            format!("{port} {tag}").trim().to_string()
        });
        vec![OcrSpan { text: raw, conf: fx.ocr_conf.unwrap_or(0.95) }]
    }

    fn panel_hint(&self, evidence_id: Option<&str>) -> Option<String> {
        self.entry(evidence_id).panel_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURES: &str = r#"{
        "default": { "raw_text": "PORT 24 MDF-01-R12-P24", "panel_id": "PANEL-A", "ocr_conf": 0.95 },
        "E-dim":   { "raw_text": "24", "ocr_conf": 0.4 }
    }"#;

    #[test]
    fn fixture_lookup_falls_back_to_default() {
        let backend = MockOcrBackend::from_json(FIXTURES).unwrap();
        let img = GrayImage::new(4, 4);
        let spans = backend.read_text(&img, Some("E-unknown"));
        assert_eq!(spans[0].text, "PORT 24 MDF-01-R12-P24");
        assert_eq!(backend.panel_hint(Some("E-unknown")).as_deref(), Some("PANEL-A"));

        let dim = backend.read_text(&img, Some("E-dim"));
        assert_eq!(dim[0].text, "24");
        assert!((dim[0].conf - 0.4).abs() < 1e-9);
    }

    #[test]
    fn fixture_without_raw_text_joins_label_fields() {
        let backend = MockOcrBackend::from_json(
            r#"{ "default": { "port_label": "PORT 7", "cable_tag": "R1-U2-PP3-4" } }"#,
        )
        .unwrap();
        let spans = backend.read_text(&GrayImage::new(4, 4), None);
        assert_eq!(spans[0].text, "PORT 7 R1-U2-PP3-4");
    }
}
