//! Format grammars for port labels and cable tags.
//!
//! The parsers run over OCR output, so numeric segments tolerate the common
//! confusions (O/0, I/1, S/5). Keywords like `PORT` are matched literally;
//! only candidate digit runs are normalized.

const PORT_MAX: u32 = 48;
const BANK_MAX: u32 = 24;

pub const PORT_MISS_CONF: f64 = 0.35;
pub const TAG_MISS_CONF: f64 = 0.3;

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}

/// Interpret a short token as a number, mapping OCR confusables to digits.
fn short_number(token: &str) -> Option<u32> {
    if token.is_empty() || token.len() > 2 {
        return None;
    }
    let mut value = 0u32;
    for c in token.chars() {
        let digit = match c {
            '0'..='9' => c as u32 - '0' as u32,
            'O' => 0,
            'I' => 1,
            'S' => 5,
            _ => return None,
        };
        value = value * 10 + digit;
    }
    Some(value)
}

fn keyword_number(tokens: &[&str], keyword: &str, max: u32) -> Option<u32> {
    for (i, tok) in tokens.iter().enumerate() {
        let Some(rest) = tok.strip_prefix(keyword) else {
            continue;
        };
        let n = if rest.is_empty() {
            tokens.get(i + 1).and_then(|t| short_number(t))
        } else {
            short_number(rest)
        };
        if let Some(n) = n {
            if (1..=max).contains(&n) {
                return Some(n);
            }
        }
    }
    None
}

fn bank_label(tokens: &[&str]) -> Option<String> {
    for (i, tok) in tokens.iter().enumerate() {
        let mut chars = tok.chars();
        let Some(bank) = chars.next() else { continue };
        if bank != 'A' && bank != 'B' {
            continue;
        }
        let rest = &tok[1..];
        let n = if rest.is_empty() {
            tokens.get(i + 1).and_then(|t| short_number(t))
        } else {
            short_number(rest)
        };
        if let Some(n) = n {
            if (1..=BANK_MAX).contains(&n) {
                return Some(format!("{bank}{n}"));
            }
        }
    }
    None
}

/// Parse a port label out of raw OCR text.
///
/// Priority order: alphabetic bank prefix (`A12`, conf 1.0), `PORT <n>`
/// (0.95), `P<n>` (0.92), bare 1-2 digit number (0.88). Numbers must be in
/// the valid range for their form or the candidate is rejected.
pub fn parse_port_label(text: &str) -> (Option<String>, f64) {
    let norm = normalize(text);
    let tokens: Vec<&str> = norm.split_whitespace().collect();

    if let Some(label) = bank_label(&tokens) {
        return (Some(label), 1.0);
    }
    if let Some(n) = keyword_number(&tokens, "PORT", PORT_MAX) {
        return (Some(n.to_string()), 0.95);
    }
    if let Some(n) = keyword_number(&tokens, "P", PORT_MAX) {
        return (Some(n.to_string()), 0.92);
    }
    for tok in &tokens {
        if let Some(n) = short_number(tok) {
            if (1..=PORT_MAX).contains(&n) {
                return (Some(n.to_string()), 0.88);
            }
        }
    }
    (None, PORT_MISS_CONF)
}

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/')
}

fn digits_only(part: &str) -> bool {
    !part.is_empty() && part.chars().all(|c| matches!(c, '0'..='9' | 'O' | 'I' | 'S'))
}

/// Full structured tag: `XXXX-NN-XXXX-XXXX` where the second segment is
/// exactly two digits.
fn is_strict_tag(token: &str) -> bool {
    let parts: Vec<&str> = token.split('-').collect();
    parts.len() == 4
        && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphanumeric()))
        && parts[1].len() == 2
        && digits_only(parts[1])
}

/// Rack-style tag: `R<n>-U<n>-PP<n>-<n>`.
fn is_rack_tag(token: &str) -> bool {
    let parts: Vec<&str> = token.split('-').collect();
    if parts.len() != 4 {
        return false;
    }
    let seg = |part: &str, prefix: &str| {
        part.strip_prefix(prefix).is_some_and(digits_only)
    };
    seg(parts[0], "R") && seg(parts[1], "U") && seg(parts[2], "PP") && digits_only(parts[3])
}

/// Parse a cable tag out of raw OCR text.
///
/// Priority order: strict structured tag (conf 1.0), rack-style tag (0.95),
/// generic alphanumeric token of six or more characters containing a
/// separator (0.75).
pub fn parse_cable_tag(text: &str) -> (Option<String>, f64) {
    let norm = normalize(text);
    let tokens: Vec<&str> = norm
        .split_whitespace()
        .filter(|t| t.chars().all(is_tag_char))
        .collect();

    for tok in &tokens {
        if is_strict_tag(tok) {
            return (Some(tok.to_string()), 1.0);
        }
    }
    for tok in &tokens {
        if is_rack_tag(tok) {
            return (Some(tok.to_string()), 0.95);
        }
    }
    for tok in &tokens {
        if tok.len() >= 6 && tok.chars().any(|c| matches!(c, '-' | '_' | '/')) {
            return (Some(tok.to_string()), 0.75);
        }
    }
    (None, TAG_MISS_CONF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_keyword_form() {
        assert_eq!(parse_port_label("PORT 24"), (Some("24".into()), 0.95));
        assert_eq!(parse_port_label("port 7 on the left"), (Some("7".into()), 0.95));
    }

    #[test]
    fn port_p_prefix_form() {
        assert_eq!(parse_port_label("P12"), (Some("12".into()), 0.92));
        assert_eq!(parse_port_label("P 3"), (Some("3".into()), 0.92));
    }

    #[test]
    fn bare_number_form() {
        assert_eq!(parse_port_label("24"), (Some("24".into()), 0.88));
    }

    #[test]
    fn bank_prefix_wins_over_everything() {
        assert_eq!(parse_port_label("A12 PORT 24"), (Some("A12".into()), 1.0));
        assert_eq!(parse_port_label("B 7"), (Some("B7".into()), 1.0));
    }

    #[test]
    fn out_of_range_numbers_are_rejected() {
        assert_eq!(parse_port_label("PORT 99"), (None, PORT_MISS_CONF));
        assert_eq!(parse_port_label("A25"), (None, PORT_MISS_CONF));
    }

    #[test]
    fn ocr_confusables_map_to_digits() {
        // "2O" reads as 20, "I2" as 12.
        assert_eq!(parse_port_label("PORT 2O"), (Some("20".into()), 0.95));
        assert_eq!(parse_port_label("PI2"), (Some("12".into()), 0.92));
    }

    #[test]
    fn strict_cable_tag() {
        assert_eq!(parse_cable_tag("MDF-01-R12-P24"), (Some("MDF-01-R12-P24".into()), 1.0));
    }

    #[test]
    fn rack_style_cable_tag() {
        assert_eq!(parse_cable_tag("R12-U04-PP2-7"), (Some("R12-U04-PP2-7".into()), 0.95));
    }

    #[test]
    fn generic_separator_token() {
        assert_eq!(parse_cable_tag("CABLE_A1B2"), (Some("CABLE_A1B2".into()), 0.75));
    }

    #[test]
    fn no_tag_present() {
        assert_eq!(parse_cable_tag("hello"), (None, TAG_MISS_CONF));
        assert_eq!(parse_cable_tag(""), (None, TAG_MISS_CONF));
    }

    #[test]
    fn strict_beats_generic_when_both_present() {
        let (tag, conf) = parse_cable_tag("SOME_LONGTOKEN MDF-01-R12-P24");
        assert_eq!(tag.as_deref(), Some("MDF-01-R12-P24"));
        assert_eq!(conf, 1.0);
    }
}
