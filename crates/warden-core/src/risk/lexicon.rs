//! Shared detection lexicons and patterns for output risk scoring.
//!
//! Single source of truth for the regexes and phrase lists the scorer's
//! heuristics match against. Patterns target generated OUTPUT text; the
//! request prompt is never scanned here.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // =========================================================================
    // IDENTIFIER PATTERNS (leakage detection)
    // =========================================================================

    /// US Social Security Number (XXX-XX-XXXX)
    pub static ref SSN_PATTERN: Regex = Regex::new(
        r"\b\d{3}-\d{2}-\d{4}\b"
    ).unwrap();

    /// Calendar date in MM/DD/YYYY form (dates of birth, admission dates)
    pub static ref DATE_PATTERN: Regex = Regex::new(
        r"\b\d{2}/\d{2}/\d{4}\b"
    ).unwrap();

    /// Email address (RFC 5322 simplified)
    pub static ref EMAIL_PATTERN: Regex = Regex::new(
        r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"
    ).unwrap();

    /// US phone number (XXX-XXX-XXXX)
    pub static ref PHONE_PATTERN: Regex = Regex::new(
        r"\b\d{3}-\d{3}-\d{4}\b"
    ).unwrap();

    /// Honorific followed by a capitalized surname (named individuals)
    pub static ref HONORIFIC_NAME_PATTERN: Regex = Regex::new(
        r"\b(Mr\.|Mrs\.|Ms\.|Dr\.)\s+[A-Z][a-z]+\b"
    ).unwrap();

    /// Medical record number reference
    pub static ref MRN_PATTERN: Regex = Regex::new(
        r"(?i)MRN[:\s]+\d+"
    ).unwrap();

    // =========================================================================
    // CLAIM-SHAPE PATTERNS (hallucination detection)
    // =========================================================================

    /// Unit-bearing numeric claims (dosages, percentages)
    pub static ref UNIT_NUMBER_PATTERN: Regex = Regex::new(
        r"\b\d+\.?\d*\s*(%|percent|mg|ml|units?)\b"
    ).unwrap();

    /// Absolute generalizations about groups of people
    pub static ref GENERALIZATION_PATTERN: Regex = Regex::new(
        r"\b(all|every|no)\s+\w+\s+(people|patients|individuals)\b"
    ).unwrap();
}

/// Hedging phrases: density signals ungrounded speculation.
pub const HEDGING_PHRASES: &[&str] = &[
    "i think",
    "probably",
    "maybe",
    "might be",
    "could be",
    "it seems",
    "appears to",
    "possibly",
    "unclear",
    "i'm not sure",
    "difficult to say",
];

/// High-stakes clinical terms that demand grounding before delivery.
pub const CLINICAL_STAKES_TERMS: &[&str] = &[
    "diagnosis",
    "prognosis",
    "prescribe",
    "medication dosage",
    "treatment plan",
    "surgical",
    "critical",
    "emergency",
    "life-threatening",
    "contraindicated",
];

/// Prescriptive medical phrasing: disallowed when handling protected data.
pub const PRESCRIPTIVE_PHRASES: &[&str] = &["should take", "recommend treatment", "prescribe"];

/// Patient-directed phrasing: individualized advice markers.
pub const PATIENT_DIRECTED_PHRASES: &[&str] = &["you should", "your condition"];

/// Assured-outcome phrasing disallowed in financial-services output.
pub const FINANCIAL_ASSURANCE_PHRASES: &[&str] = &[
    "guaranteed return",
    "guaranteed returns",
    "cannot lose",
    "risk-free investment",
    "insider information",
];

/// Markers that a claim is grounded in a citable source.
pub const CITATION_MARKERS: &[&str] = &["according to", "study", "source:"];

/// Markers that advice carries the expected disclaimer.
pub const DISCLAIMER_MARKERS: &[&str] = &["not medical advice", "consult"];

/// Biased or demeaning characterizations of groups.
pub const BIAS_TERMS: &[&str] = &[
    "the poor",
    "uneducated",
    "third world",
    "backward",
    "primitive",
    "savage",
];

/// Count occurrences of structured identifiers in the text, with labels.
pub fn identifier_hits(text: &str) -> Vec<&'static str> {
    let patterns: [(&Regex, &'static str); 6] = [
        (&SSN_PATTERN, "SSN"),
        (&DATE_PATTERN, "DATE"),
        (&EMAIL_PATTERN, "EMAIL"),
        (&PHONE_PATTERN, "PHONE"),
        (&HONORIFIC_NAME_PATTERN, "NAME"),
        (&MRN_PATTERN, "MRN"),
    ];

    let mut hits = Vec::new();
    for (pattern, label) in patterns {
        for _ in pattern.find_iter(text) {
            hits.push(label);
        }
    }
    hits
}

/// Whether the lowercased text contains any of the given phrases.
pub fn contains_any(text_lower: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| text_lower.contains(p))
}

/// How many of the given phrases occur in the lowercased text.
pub fn count_present(text_lower: &str, phrases: &[&str]) -> usize {
    phrases.iter().filter(|p| text_lower.contains(*p)).count()
}
