//! SVS description metadata rewriting.
//!
//! Aperio stores slide metadata in `ImageDescription` as pipe-separated
//! `key=value` pairs (some writers put spaces around the equals sign). The
//! engine replaces the identifying keys with pseudonyms, drops keys whose
//! pseudonym value is null, and leaves every other pair untouched —
//! preserving each pair's original separator style.

// =============================================================================
// Identifier keys
// =============================================================================

/// Description keys that expose identity and get pseudonymized.
pub const IDENTIFIER_KEYS: &[&str] = &["Filename", "Title", "Date", "Time", "Time Zone", "User"];

/// The pseudonym metadata object for a slide: identifying keys mapped to
/// the pseudonymous ID or to null (dropped).
pub fn pseudonym_metadata(pseudo_id: &str) -> Vec<(&'static str, Option<String>)> {
    vec![
        ("Filename", Some(pseudo_id.to_string())),
        ("Title", Some(pseudo_id.to_string())),
        ("Date", None),
        ("Time", None),
        ("Time Zone", None),
        ("User", None),
    ]
}

/// Whether a description contains any recognized identifier key.
///
/// Drives which IFDs get their description escrowed and rewritten.
pub fn contains_identifier_keys(description: &str) -> bool {
    IDENTIFIER_KEYS.iter().any(|key| description.contains(key))
}

// =============================================================================
// Rewriting
// =============================================================================

/// Rewrite a description, applying the pseudonym replacements.
///
/// Pairs whose key maps to a null pseudonym are removed; pairs whose key
/// maps to a value are rewritten in place with their original separator
/// (`"="` or `" = "`); everything else passes through unchanged.
pub fn rewrite_description(
    description: &str,
    replacements: &[(&str, Option<String>)],
) -> String {
    let mut parts = Vec::new();

    for part in description.split('|') {
        match rewrite_pair(part, replacements) {
            PairAction::Keep => parts.push(part.to_string()),
            PairAction::Replace(rewritten) => parts.push(rewritten),
            PairAction::Drop => {}
        }
    }

    parts.join("|")
}

enum PairAction {
    Keep,
    Replace(String),
    Drop,
}

fn rewrite_pair(part: &str, replacements: &[(&str, Option<String>)]) -> PairAction {
    if !part.contains('=') {
        return PairAction::Keep;
    }

    let separator = if part.contains(" = ") { " = " } else { "=" };
    let mut pieces = part.splitn(2, separator);
    let (Some(key), Some(_value)) = (pieces.next(), pieces.next()) else {
        return PairAction::Keep;
    };

    for (target, replacement) in replacements {
        if key == *target {
            return match replacement {
                Some(value) => PairAction::Replace(format!("{key}{separator}{value}")),
                None => PairAction::Drop,
            };
        }
    }

    PairAction::Keep
}

// =============================================================================
// Tests
// =============================================================================
