//! Image quality metrics and the evidence quality gate.

use image::GrayImage;
use thiserror::Error;

use patchproof_core::policy::{
    TIP_HOLD_STEADY, TIP_MORE_LIGHT, TIP_MOVE_CLOSER, TIP_REDUCE_GLARE,
};
use patchproof_core::{QualityMetrics, QualityResult};

#[derive(Debug, Error)]
pub enum VisionError {
    /// The uploaded bytes are not a decodable image. This is a distinct
    /// condition from any quality failure and is never folded into the
    /// too-dark/too-blurry verdicts.
    #[error("undecodable image bytes")]
    Decode(#[source] image::ImageError),
}

/// Fixed quality thresholds. Defaults match the calibrated gate values.
#[derive(Debug, Clone)]
pub struct QualityThresholds {
    pub blur_min: f64,
    pub brightness_min: f64,
    pub glare_max: f64,
    pub min_width: u32,
    pub min_height: u32,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            blur_min: 120.0,
            brightness_min: 60.0,
            glare_max: 0.08,
            min_width: 800,
            min_height: 600,
        }
    }
}

pub fn decode_luma(bytes: &[u8]) -> Result<GrayImage, VisionError> {
    let img = image::load_from_memory(bytes).map_err(VisionError::Decode)?;
    Ok(img.to_luma8())
}

/// Variance of the 3x3 Laplacian response. Higher means sharper.
fn laplacian_variance(luma: &GrayImage) -> f64 {
    let (w, h) = luma.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }
    let px = |x: u32, y: u32| f64::from(luma.get_pixel(x, y).0[0]);
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let n = f64::from((w - 2) * (h - 2));
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let r = px(x, y - 1) + px(x, y + 1) + px(x - 1, y) + px(x + 1, y) - 4.0 * px(x, y);
            sum += r;
            sum_sq += r * r;
        }
    }
    let mean = sum / n;
    (sum_sq / n) - mean * mean
}

pub fn metrics_from_luma(luma: &GrayImage, th: &QualityThresholds) -> QualityMetrics {
    let (width, height) = luma.dimensions();
    let total = f64::from(width) * f64::from(height);
    let mut luma_sum = 0.0f64;
    let mut saturated = 0u64;
    for p in luma.pixels() {
        let v = p.0[0];
        luma_sum += f64::from(v);
        if v > 245 {
            saturated += 1;
        }
    }
    let brightness = luma_sum / total;
    let glare_score = saturated as f64 / total;
    let blur_score = laplacian_variance(luma);
    QualityMetrics {
        blur_score,
        brightness,
        glare_score,
        width,
        height,
        is_too_blurry: blur_score < th.blur_min,
        is_too_dark: brightness < th.brightness_min,
        is_too_glary: glare_score > th.glare_max,
        is_low_res: width < th.min_width || height < th.min_height,
    }
}

/// One retake tip per failing dimension, in a fixed order; the generic
/// fill-the-frame tip when no specific tip applies.
pub fn gate_guidance(m: &QualityMetrics) -> Vec<String> {
    let mut tips: Vec<String> = Vec::new();
    if m.is_too_blurry {
        tips.push(TIP_HOLD_STEADY.to_string());
    }
    if m.is_too_dark {
        tips.push(TIP_MORE_LIGHT.to_string());
    }
    if m.is_too_glary {
        tips.push(TIP_REDUCE_GLARE.to_string());
    }
    if m.is_low_res {
        tips.push(TIP_MOVE_CLOSER.to_string());
    }
    if tips.is_empty() {
        tips.push(TIP_MOVE_CLOSER.to_string());
    }
    tips
}

/// Decode and gate one evidence image. Pure in bytes and thresholds.
pub fn evaluate_gate(bytes: &[u8], th: &QualityThresholds) -> Result<QualityResult, VisionError> {
    let luma = decode_luma(bytes)?;
    let metrics = metrics_from_luma(&luma, th);
    let pass =
        !(metrics.is_too_blurry || metrics.is_too_dark || metrics.is_too_glary || metrics.is_low_res);
    Ok(QualityResult {
        pass,
        guidance: if pass { Vec::new() } else { gate_guidance(&metrics) },
        fail_reason: if pass {
            None
        } else {
            Some("Image quality below threshold".to_string())
        },
        metrics: Some(metrics),
    })
}

/// Multiplicative confidence discount for degraded capture conditions.
pub fn quality_penalty(m: &QualityMetrics) -> f64 {
    let mut penalty = 1.0_f64;
    if m.is_too_blurry {
        penalty *= 0.65;
    }
    if m.is_too_dark {
        penalty *= 0.75;
    }
    if m.is_too_glary {
        penalty *= 0.75;
    }
    penalty.clamp(0.2, 1.0)
}
