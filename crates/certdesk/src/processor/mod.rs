//! Document processor: checksum, dedup, extraction, storage, case update.

pub mod case_update;
mod document;
pub mod events;
pub mod review;
mod runner;

use serde::Serialize;

pub use case_update::{derive_outcome, parse_capacity_kg, FitStatus};
pub use document::{documents_for_case, find_document, MedicalDocument};
pub use events::{BroadcastEvents, EventSink, NoopEvents, ProcessingEvent};
pub use review::{is_current_certificate, requires_review, REVIEW_CONFIDENCE_THRESHOLD};
pub use runner::{compute_checksum, DocumentProcessor};

/// Source type recorded on documents that arrived through the support desk.
pub const SOURCE_SUPPORT_DESK: &str = "support_desk";

/// An attachment whose bytes have already been fetched.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub url: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ProcessRequest {
    /// Existing job to report against. When `None` the processor creates
    /// and owns a job record.
    pub job_id: Option<String>,
    pub case_id: String,
    pub worker_id: String,
    pub attachment: Attachment,
    pub source_id: Option<String>,
    pub company_id: Option<String>,
    pub requester_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub job_id: Option<String>,
    pub document_id: Option<String>,
    pub error: Option<String>,
    pub processing_time_ms: u64,
    pub requires_review: bool,
    /// The bytes matched a document already on file.
    pub duplicate: bool,
}
