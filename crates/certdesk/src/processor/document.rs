use serde::Serialize;

use crate::db::document_repo::{self, DocumentRow};
use crate::db::{Database, DatabaseError};
use crate::extractor::{DocumentKind, ExtractedFields, FieldConfidence};

/// A filed document as the rest of the system sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MedicalDocument {
    pub id: String,
    pub case_id: String,
    pub worker_id: String,
    pub source_type: String,
    pub source_id: Option<String>,
    pub kind: DocumentKind,
    pub storage_key: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub checksum: String,
    pub fields: ExtractedFields,
    pub field_confidence: FieldConfidence,
    pub overall_confidence: f64,
    pub requires_review: bool,
    pub is_current_certificate: bool,
    pub processing_status: String,
    pub created_at: String,
}

impl TryFrom<DocumentRow> for MedicalDocument {
    type Error = DatabaseError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let field_confidence = match row.field_confidence.as_deref() {
            Some(json) => serde_json::from_str(json).map_err(|source| DatabaseError::Json {
                column: "field_confidence",
                source,
            })?,
            None => FieldConfidence::new(),
        };

        Ok(Self {
            kind: DocumentKind::parse(&row.document_kind),
            size_bytes: u64::try_from(row.size_bytes).unwrap_or(0),
            fields: ExtractedFields {
                patient_name: row.patient_name,
                fit_status: row.fit_status,
                valid_from: row.valid_from,
                valid_to: row.valid_to,
                restrictions: row.restrictions,
                capacity: row.capacity,
                doctor_name: row.doctor_name,
            },
            field_confidence,
            id: row.id,
            case_id: row.case_id,
            worker_id: row.worker_id,
            source_type: row.source_type,
            source_id: row.source_id,
            storage_key: row.storage_key,
            content_type: row.content_type,
            checksum: row.checksum,
            overall_confidence: row.overall_confidence,
            requires_review: row.requires_review,
            is_current_certificate: row.is_current_certificate,
            processing_status: row.processing_status,
            created_at: row.created_at,
        })
    }
}

pub fn find_document(db: &Database, id: &str) -> Result<Option<MedicalDocument>, DatabaseError> {
    document_repo::find_by_id(db, id)?
        .map(MedicalDocument::try_from)
        .transpose()
}

/// Documents filed against a case, newest first.
pub fn documents_for_case(
    db: &Database,
    case_id: &str,
) -> Result<Vec<MedicalDocument>, DatabaseError> {
    document_repo::list_by_case(db, case_id)?
        .into_iter()
        .map(MedicalDocument::try_from)
        .collect()
}
