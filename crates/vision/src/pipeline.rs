//! Confidence-scored extraction: image bytes in, tagged field readings out.

use image::GrayImage;

use patchproof_core::policy::DEFAULT_MIN_CONFIDENCE;
use patchproof_core::{ExtractionOutput, FieldReading, QualityMetrics};

use crate::ocr::{OcrBackend, OcrSpan};
use crate::parse::{parse_cable_tag, parse_port_label};
use crate::quality::{decode_luma, gate_guidance, metrics_from_luma, quality_penalty, QualityThresholds, VisionError};

/// Optional region of interest, clamped to image bounds before cropping.
#[derive(Debug, Clone, Copy)]
pub struct CropHint {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub fn crop_region(img: &GrayImage, hint: Option<&CropHint>) -> GrayImage {
    let Some(hint) = hint else {
        return img.clone();
    };
    let (iw, ih) = img.dimensions();
    if iw == 0 || ih == 0 {
        return img.clone();
    }
    let x = hint.x.min(iw.saturating_sub(1));
    let y = hint.y.min(ih.saturating_sub(1));
    let w = hint.width.clamp(1, iw - x);
    let h = hint.height.clamp(1, ih - y);
    image::imageops::crop_imm(img, x, y, w, h).to_image()
}

/// Join spans into raw text; average their recognition confidences.
pub fn join_spans(spans: &[OcrSpan]) -> (String, f64) {
    if spans.is_empty() {
        return (String::new(), 0.0);
    }
    let raw = spans.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" ");
    let conf = spans.iter().map(|s| s.conf).sum::<f64>() / spans.len() as f64;
    (raw.trim().to_string(), conf.clamp(0.0, 1.0))
}

fn field_reading(
    value: Option<String>,
    parse_conf: f64,
    ocr_conf: f64,
    metrics: &QualityMetrics,
) -> FieldReading {
    let confidence = (ocr_conf * parse_conf * quality_penalty(metrics)).clamp(0.0, 1.0);
    let guidance = if value.is_none() || confidence < DEFAULT_MIN_CONFIDENCE {
        gate_guidance(metrics)
    } else {
        Vec::new()
    };
    FieldReading { value, confidence, guidance }
}

/// Extract port-label and cable-tag readings from already-gated evidence.
///
/// The evidence id is opaque here except to the backend, which may use it
/// for deterministic fixture lookups.
pub fn extract_identifiers(
    bytes: &[u8],
    backend: &dyn OcrBackend,
    evidence_id: Option<&str>,
    crop_hint: Option<&CropHint>,
    thresholds: &QualityThresholds,
) -> Result<ExtractionOutput, VisionError> {
    let luma = decode_luma(bytes)?;
    let metrics = metrics_from_luma(&luma, thresholds);
    Ok(extract_from_luma(&luma, &metrics, backend, evidence_id, crop_hint))
}

pub fn extract_from_luma(
    luma: &GrayImage,
    metrics: &QualityMetrics,
    backend: &dyn OcrBackend,
    evidence_id: Option<&str>,
    crop_hint: Option<&CropHint>,
) -> ExtractionOutput {
    let cropped = crop_region(luma, crop_hint);
    let spans = backend.read_text(&cropped, evidence_id);
    let (raw_text, ocr_conf) = join_spans(&spans);

    let (port_value, port_parse) = parse_port_label(&raw_text);
    let (tag_value, tag_parse) = parse_cable_tag(&raw_text);

    ExtractionOutput {
        panel_id: backend.panel_hint(evidence_id),
        port: field_reading(port_value, port_parse, ocr_conf, metrics),
        cable: field_reading(tag_value, tag_parse, ocr_conf, metrics),
        raw_text,
    }
}
