//! Maps an extraction onto the derived state written back to a case.

use std::sync::LazyLock;

use regex::Regex;

use crate::cases::CaseOutcome;
use crate::extractor::ExtractedFields;

static RE_KILOGRAMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:kg|kgs|kilograms?)\b").unwrap()
});

pub const COMPLIANCE_AT_RISK: &str = "at_risk";
pub const COMPLIANCE_COMPLIANT: &str = "compliant";

/// Worker fitness as classified on a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStatus {
    FitUnrestricted,
    FitWithRestrictions,
    Unfit,
    Unknown,
}

impl FitStatus {
    /// Normalizes case, surrounding whitespace, and `-`/space separators.
    pub fn parse(value: Option<&str>) -> Self {
        let normalized = value
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase()
            .replace(['-', ' '], "_");
        match normalized.as_str() {
            "fit_unrestricted" | "fit" | "fit_for_work" => Self::FitUnrestricted,
            "fit_with_restrictions" | "fit_restricted" | "modified_duties" => {
                Self::FitWithRestrictions
            }
            "unfit" | "unfit_for_work" | "not_fit" => Self::Unfit,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FitUnrestricted => "fit_unrestricted",
            Self::FitWithRestrictions => "fit_with_restrictions",
            Self::Unfit => "unfit",
            Self::Unknown => "unknown",
        }
    }

    pub fn next_step(&self) -> &'static str {
        match self {
            Self::Unfit => {
                "Escalate to case manager: worker certified unfit for work. \
                 Confirm time off and book a follow-up review before the certificate expires."
            }
            Self::FitWithRestrictions => {
                "Arrange modified duties that respect the certified restrictions \
                 and confirm the plan with the worker's supervisor."
            }
            Self::FitUnrestricted => {
                "Worker cleared to resume normal duties. Confirm the return-to-work date."
            }
            Self::Unknown => {
                "Review the uploaded medical document and record the worker's fitness status."
            }
        }
    }

    /// `None` leaves the case's compliance status unchanged.
    pub fn compliance_status(&self) -> Option<&'static str> {
        match self {
            Self::Unfit => Some(COMPLIANCE_AT_RISK),
            Self::FitWithRestrictions | Self::FitUnrestricted => Some(COMPLIANCE_COMPLIANT),
            Self::Unknown => None,
        }
    }
}

/// Extracts the first kilogram figure from free text, e.g. "no lifting over
/// 10kg" → 10.0. No match leaves capacity unset.
pub fn parse_capacity_kg(text: &str) -> Option<f64> {
    RE_KILOGRAMS
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Builds the case update for a filed document.
pub fn derive_outcome(fields: &ExtractedFields) -> CaseOutcome {
    let status = FitStatus::parse(fields.fit_status.as_deref());
    let capacity = fields
        .capacity
        .as_deref()
        .and_then(parse_capacity_kg)
        .or_else(|| fields.restrictions.as_deref().and_then(parse_capacity_kg));

    CaseOutcome {
        fitness_status: match status {
            FitStatus::Unknown => None,
            known => Some(known.as_str().to_string()),
        },
        next_step: status.next_step().to_string(),
        compliance_status: status.compliance_status().map(str::to_string),
        current_capacity_kg: capacity,
    }
}
