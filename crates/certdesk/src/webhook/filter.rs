//! Decides which ticket attachments are medical documents worth filing.

const ALLOWED_CONTENT_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/jpg", "image/png"];

const MEDICAL_TERMS: &[&str] = &[
    "certificate",
    "cert",
    "medical",
    "doctor",
    "diagnosis",
    "fitness",
    "fit_for_work",
    "capacity",
    "clearance",
    "restriction",
    "injury",
    "assessment",
    "specialist",
    "report",
    "physio",
    "radiology",
    "xray",
    "x-ray",
    "mri",
    "ultrasound",
    "scan",
    "workcover",
    "psychologist",
    "pathology",
    "referral",
];

/// Whether an attachment should enter the pipeline: an allowed content type
/// and a filename containing a medical term. Both checks are
/// case-insensitive; content type parameters are ignored.
pub fn is_candidate(filename: &str, content_type: &str) -> bool {
    is_allowed_content_type(content_type) && has_medical_term(filename)
}

fn is_allowed_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ALLOWED_CONTENT_TYPES.contains(&essence.as_str())
}

fn has_medical_term(filename: &str) -> bool {
    let name = filename.to_lowercase();
    MEDICAL_TERMS.iter().any(|term| name.contains(term))
}
