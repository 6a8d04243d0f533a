//! Policy constants and canonical guidance strings.

/// Per-field acceptance floor when a step does not declare its own.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.75;

/// Fixed confidence reported by the exact-match record validator.
pub const VALIDATOR_CONFIDENCE: f64 = 0.99;

pub const TIP_HOLD_STEADY: &str = "Tap to focus / hold steady";
pub const TIP_REDUCE_GLARE: &str = "Reduce glare / change angle";
pub const TIP_MORE_LIGHT: &str = "Increase lighting";
pub const TIP_MOVE_CLOSER: &str = "Move closer and fill the frame with the label";
pub const TIP_VALID_PHOTO: &str = "Upload a valid photo";

/// Order-preserving deduplication for guidance lists.
pub fn dedup_guidance<I>(tips: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out: Vec<String> = Vec::new();
    for tip in tips {
        if !out.contains(&tip) {
            out.push(tip);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_preserves_first_occurrence_order() {
        let tips = vec![
            TIP_MORE_LIGHT.to_string(),
            TIP_HOLD_STEADY.to_string(),
            TIP_MORE_LIGHT.to_string(),
        ];
        assert_eq!(dedup_guidance(tips), vec![TIP_MORE_LIGHT, TIP_HOLD_STEADY]);
    }
}
