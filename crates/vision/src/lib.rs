//! Evidence imaging: quality gating, label/tag grammars and the
//! confidence-scored extraction pipeline.

pub mod ocr;
pub mod parse;
pub mod pipeline;
pub mod quality;

pub use ocr::{MockOcrBackend, OcrBackend, OcrFixture, OcrSpan};
pub use parse::{parse_cable_tag, parse_port_label};
pub use pipeline::{extract_identifiers, CropHint};
pub use quality::{evaluate_gate, quality_penalty, QualityThresholds, VisionError};
