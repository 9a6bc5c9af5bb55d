//! OCR and field extraction, consumed as a black box.

mod http;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use crate::error::ExtractError;
pub use http::HttpExtractor;

/// Classification returned by the extraction service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    MedicalCertificate,
    SpecialistReport,
    ImagingReport,
    ClearanceLetter,
    #[serde(other)]
    Other,
}

impl DocumentKind {
    /// Storage category, also the value persisted on the document record.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MedicalCertificate => "medical_certificate",
            Self::SpecialistReport => "specialist_report",
            Self::ImagingReport => "imaging_report",
            Self::ClearanceLetter => "clearance_letter",
            Self::Other => "other",
        }
    }

    /// Inverse of [`as_str`](Self::as_str); anything unrecognised is `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "medical_certificate" => Self::MedicalCertificate,
            "specialist_report" => Self::SpecialistReport,
            "imaging_report" => Self::ImagingReport,
            "clearance_letter" => Self::ClearanceLetter,
            _ => Self::Other,
        }
    }
}

/// Structured fields read off the document. Dates are kept as the strings
/// the service returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedFields {
    pub patient_name: Option<String>,
    pub fit_status: Option<String>,
    pub valid_from: Option<String>,
    pub valid_to: Option<String>,
    pub restrictions: Option<String>,
    pub capacity: Option<String>,
    pub doctor_name: Option<String>,
}

/// Field name to confidence (0-100).
pub type FieldConfidence = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub kind: DocumentKind,
    #[serde(default)]
    pub fields: ExtractedFields,
    #[serde(default)]
    pub field_confidence: FieldConfidence,
    pub overall_confidence: f64,
}

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(
        &self,
        bytes: &[u8],
        content_type: &str,
        filename: &str,
    ) -> Result<Extraction, ExtractError>;
}
