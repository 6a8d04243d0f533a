//! Exact-match validation of observed identifiers against the record of
//! truth.

use serde::{Deserialize, Serialize};

use crate::model::ValidationResult;
use crate::policy::VALIDATOR_CONFIDENCE;

/// One (panel, port, cable) triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Endpoint {
    pub panel_id: String,
    pub port_label: String,
    pub cable_tag: String,
}

impl Endpoint {
    pub fn new(panel_id: &str, port_label: &str, cable_tag: &str) -> Self {
        Self {
            panel_id: panel_id.to_string(),
            port_label: port_label.to_string(),
            cable_tag: cable_tag.to_string(),
        }
    }
}

/// Expected mapping for one change: either a single expected triple, or a
/// list of allowed endpoints when any of several port/cable pairs is
/// acceptable. When `allowed_endpoints` is non-empty it takes precedence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpectedMapping {
    #[serde(default)]
    pub expected: Option<Endpoint>,
    #[serde(default)]
    pub allowed_endpoints: Vec<Endpoint>,
}

/// Compare observed identifiers against the expected mapping.
pub fn validate_observed(mapping: &ExpectedMapping, observed: &Endpoint) -> ValidationResult {
    if !mapping.allowed_endpoints.is_empty() {
        if mapping.allowed_endpoints.iter().any(|ep| ep == observed) {
            return ValidationResult {
                matched: true,
                reason: "Observed matches an allowed endpoint.".to_string(),
                confidence: VALIDATOR_CONFIDENCE,
            };
        }
        return ValidationResult {
            matched: false,
            reason: format!(
                "No allowed endpoint matches ({}, {}, {})",
                observed.panel_id, observed.port_label, observed.cable_tag
            ),
            confidence: VALIDATOR_CONFIDENCE,
        };
    }

    match &mapping.expected {
        Some(exp) if exp == observed => ValidationResult {
            matched: true,
            reason: "Observed matches expected.".to_string(),
            confidence: VALIDATOR_CONFIDENCE,
        },
        Some(exp) => ValidationResult {
            matched: false,
            reason: format!(
                "Expected ({}, {}, {}) but got ({}, {}, {})",
                exp.panel_id,
                exp.port_label,
                exp.cable_tag,
                observed.panel_id,
                observed.port_label,
                observed.cable_tag
            ),
            confidence: VALIDATOR_CONFIDENCE,
        },
        None => ValidationResult {
            matched: false,
            reason: "No expected mapping recorded for this change".to_string(),
            confidence: VALIDATOR_CONFIDENCE,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_expected_match() {
        let mapping = ExpectedMapping {
            expected: Some(Endpoint::new("PANEL-A", "24", "MDF-01-R12-P24")),
            allowed_endpoints: vec![],
        };
        let verdict =
            validate_observed(&mapping, &Endpoint::new("PANEL-A", "24", "MDF-01-R12-P24"));
        assert!(verdict.matched);
        assert!(verdict.reason.contains("matches"));
    }

    #[test]
    fn single_expected_mismatch_names_both_triples() {
        let mapping = ExpectedMapping {
            expected: Some(Endpoint::new("PANEL-A", "24", "MDF-01-R12-P24")),
            allowed_endpoints: vec![],
        };
        let verdict =
            validate_observed(&mapping, &Endpoint::new("PANEL-A", "99", "MDF-01-R12-P24"));
        assert!(!verdict.matched);
        assert!(verdict.reason.contains("24"));
        assert!(verdict.reason.contains("99"));
    }

    #[test]
    fn allowed_endpoints_accept_any_listed_triple() {
        let mapping = ExpectedMapping {
            expected: None,
            allowed_endpoints: vec![
                Endpoint::new("PANEL-A", "12", "R1-U4-PP2-12"),
                Endpoint::new("PANEL-A", "13", "R1-U4-PP2-13"),
            ],
        };
        assert!(validate_observed(&mapping, &Endpoint::new("PANEL-A", "13", "R1-U4-PP2-13")).matched);
        let miss = validate_observed(&mapping, &Endpoint::new("PANEL-A", "14", "R1-U4-PP2-14"));
        assert!(!miss.matched);
        assert!(miss.reason.contains("No allowed endpoint"));
    }
}
