//! Review and validity flags derived from an extraction.

use chrono::{DateTime, NaiveDate};

use crate::extractor::Extraction;

/// Confidence (0-100) below which a document needs human review.
pub const REVIEW_CONFIDENCE_THRESHOLD: f64 = 70.0;

/// Fields whose individual confidence must clear the threshold.
pub const CRITICAL_FIELDS: [&str; 3] = ["patient_name", "fit_status", "valid_to"];

/// Parses a certificate date. Accepts `YYYY-MM-DD`, RFC 3339 timestamps
/// (the calendar date in their own offset), and `DD/MM/YYYY`.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
        .or_else(|| NaiveDate::parse_from_str(value, "%d/%m/%Y").ok())
}

/// Why a document was flagged. Empty means no review is needed.
pub fn review_reasons(extraction: &Extraction) -> Vec<String> {
    let mut reasons = Vec::new();
    let overall = extraction.overall_confidence;

    if overall < REVIEW_CONFIDENCE_THRESHOLD {
        reasons.push(format!("overall confidence {:.0} below threshold", overall));
    }

    for field in CRITICAL_FIELDS {
        // A field the service did not score inherits the overall confidence.
        let confidence = extraction
            .field_confidence
            .get(field)
            .copied()
            .unwrap_or(overall);
        if confidence < REVIEW_CONFIDENCE_THRESHOLD {
            reasons.push(format!("{} confidence {:.0} below threshold", field, confidence));
        }
    }

    let fields = &extraction.fields;
    if fields
        .fit_status
        .as_deref()
        .map(str::trim)
        .map_or(true, str::is_empty)
    {
        reasons.push("fit status not determined".to_string());
    }

    let from = fields.valid_from.as_deref().and_then(parse_date);
    let to = fields.valid_to.as_deref().and_then(parse_date);
    if let (Some(from), Some(to)) = (from, to) {
        if to <= from {
            reasons.push(format!("validity window ends ({}) before it starts ({})", to, from));
        }
    }

    reasons
}

pub fn requires_review(extraction: &Extraction) -> bool {
    !review_reasons(extraction).is_empty()
}

/// True iff both bounds parse and `today` lies within them, inclusive.
pub fn is_current_certificate(
    valid_from: Option<&str>,
    valid_to: Option<&str>,
    today: NaiveDate,
) -> bool {
    match (valid_from.and_then(parse_date), valid_to.and_then(parse_date)) {
        (Some(from), Some(to)) => from <= today && today <= to,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{DocumentKind, ExtractedFields, FieldConfidence};

    fn extraction(overall: f64) -> Extraction {
        let field_confidence: FieldConfidence = CRITICAL_FIELDS
            .iter()
            .map(|f| (f.to_string(), overall))
            .collect();
        Extraction {
            kind: DocumentKind::MedicalCertificate,
            fields: ExtractedFields {
                patient_name: Some("Jane Citizen".to_string()),
                fit_status: Some("fit_unrestricted".to_string()),
                valid_from: Some("2024-01-01".to_string()),
                valid_to: Some("2024-12-31".to_string()),
                restrictions: None,
                capacity: None,
                doctor_name: Some("Dr Smith".to_string()),
            },
            field_confidence,
            overall_confidence: overall,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_low_overall_confidence_flagged() {
        assert!(requires_review(&extraction(65.0)));
    }

    #[test]
    fn test_high_confidence_complete_not_flagged() {
        assert!(!requires_review(&extraction(95.0)));
        assert!(review_reasons(&extraction(95.0)).is_empty());
    }

    #[test]
    fn test_inverted_window_always_flagged() {
        let mut e = extraction(99.0);
        e.fields.valid_from = Some("2024-06-01".to_string());
        e.fields.valid_to = Some("2024-06-01".to_string());
        assert!(requires_review(&e));

        e.fields.valid_to = Some("2024-05-01".to_string());
        assert!(requires_review(&e));
    }

    #[test]
    fn test_low_critical_field_flagged() {
        let mut e = extraction(95.0);
        e.field_confidence.insert("valid_to".to_string(), 40.0);
        let reasons = review_reasons(&e);
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].starts_with("valid_to"));
    }

    #[test]
    fn test_unscored_critical_field_uses_overall() {
        let mut e = extraction(95.0);
        e.field_confidence.clear();
        assert!(!requires_review(&e));
    }

    #[test]
    fn test_missing_fit_status_flagged() {
        let mut e = extraction(95.0);
        e.fields.fit_status = Some("  ".to_string());
        assert!(requires_review(&e));
        e.fields.fit_status = None;
        assert!(requires_review(&e));
    }

    #[test]
    fn test_current_certificate_window() {
        let from = Some("2024-01-01");
        let to = Some("2024-12-31");
        assert!(is_current_certificate(from, to, date(2024, 6, 15)));
        assert!(is_current_certificate(from, to, date(2024, 12, 31)));
        assert!(!is_current_certificate(from, to, date(2025, 1, 1)));
        assert!(!is_current_certificate(None, to, date(2024, 6, 15)));
        assert!(!is_current_certificate(from, Some("soon"), date(2024, 6, 15)));
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2024-03-05"), Some(date(2024, 3, 5)));
        assert_eq!(parse_date("05/03/2024"), Some(date(2024, 3, 5)));
        assert_eq!(parse_date("2024-03-05T23:30:00+10:00"), Some(date(2024, 3, 5)));
        assert_eq!(parse_date("next week"), None);
        assert_eq!(parse_date(""), None);
    }
}
