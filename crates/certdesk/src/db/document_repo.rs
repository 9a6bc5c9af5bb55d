//! Medical document repository: the `medical_documents` table.
//!
//! `checksum` carries a UNIQUE constraint; it is the deduplication key for
//! everything the pipeline files.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// Row inserted, case update not yet applied.
pub const STATUS_FILED: &str = "filed";
/// Case update applied; nothing left to do for this document.
pub const STATUS_COMPLETED: &str = "completed";

/// A raw medical document row.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRow {
    pub id: String,
    pub case_id: String,
    pub worker_id: String,
    pub source_type: String,
    pub source_id: Option<String>,
    pub document_kind: String,
    pub storage_key: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub patient_name: Option<String>,
    pub fit_status: Option<String>,
    pub valid_from: Option<String>,
    pub valid_to: Option<String>,
    pub restrictions: Option<String>,
    pub capacity: Option<String>,
    pub doctor_name: Option<String>,
    /// JSON object of field name to confidence (0-100).
    pub field_confidence: Option<String>,
    pub overall_confidence: f64,
    pub requires_review: bool,
    pub is_current_certificate: bool,
    pub processing_status: String,
    pub created_at: String,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            case_id: row.get("case_id")?,
            worker_id: row.get("worker_id")?,
            source_type: row.get("source_type")?,
            source_id: row.get("source_id")?,
            document_kind: row.get("document_kind")?,
            storage_key: row.get("storage_key")?,
            content_type: row.get("content_type")?,
            size_bytes: row.get("size_bytes")?,
            checksum: row.get("checksum")?,
            patient_name: row.get("patient_name")?,
            fit_status: row.get("fit_status")?,
            valid_from: row.get("valid_from")?,
            valid_to: row.get("valid_to")?,
            restrictions: row.get("restrictions")?,
            capacity: row.get("capacity")?,
            doctor_name: row.get("doctor_name")?,
            field_confidence: row.get("field_confidence")?,
            overall_confidence: row.get("overall_confidence")?,
            requires_review: row.get("requires_review")?,
            is_current_certificate: row.get("is_current_certificate")?,
            processing_status: row.get("processing_status")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Outcome of [`insert_if_absent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A document with the same checksum already existed; carries its id.
    Duplicate(String),
}

/// Inserts the document unless its checksum is already on file.
///
/// The check and the insert happen under one connection lock, and the
/// UNIQUE constraint backs it up, so concurrent jobs with identical bytes
/// can only ever produce one row.
pub fn insert_if_absent(db: &Database, doc: &DocumentRow) -> Result<InsertOutcome, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "INSERT INTO medical_documents (id, case_id, worker_id, source_type, source_id,
             document_kind, storage_key, content_type, size_bytes, checksum, patient_name,
             fit_status, valid_from, valid_to, restrictions, capacity, doctor_name,
             field_confidence, overall_confidence, requires_review, is_current_certificate,
             processing_status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
             ?17, ?18, ?19, ?20, ?21, ?22, ?23)
             ON CONFLICT(checksum) DO NOTHING",
            params![
                doc.id,
                doc.case_id,
                doc.worker_id,
                doc.source_type,
                doc.source_id,
                doc.document_kind,
                doc.storage_key,
                doc.content_type,
                doc.size_bytes,
                doc.checksum,
                doc.patient_name,
                doc.fit_status,
                doc.valid_from,
                doc.valid_to,
                doc.restrictions,
                doc.capacity,
                doc.doctor_name,
                doc.field_confidence,
                doc.overall_confidence,
                doc.requires_review,
                doc.is_current_certificate,
                doc.processing_status,
                doc.created_at,
            ],
        )?;

        if changed == 1 {
            return Ok(InsertOutcome::Inserted);
        }

        let existing: String = conn.query_row(
            "SELECT id FROM medical_documents WHERE checksum = ?1",
            params![doc.checksum],
            |r| r.get(0),
        )?;
        Ok(InsertOutcome::Duplicate(existing))
    })
}

/// Records that the document's case update has been applied.
pub fn mark_completed(db: &Database, id: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE medical_documents SET processing_status = ?1 WHERE id = ?2",
            params![STATUS_COMPLETED, id],
        )?;
        Ok(())
    })
}

/// Finds a document by its content checksum.
pub fn find_by_checksum(db: &Database, checksum: &str) -> Result<Option<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM medical_documents WHERE checksum = ?1",
                params![checksum],
                DocumentRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Finds a document by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM medical_documents WHERE id = ?1",
                params![id],
                DocumentRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Lists the documents filed against a case, newest first.
pub fn list_by_case(db: &Database, case_id: &str) -> Result<Vec<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM medical_documents WHERE case_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![case_id], DocumentRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts all documents on file.
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let n: u64 = conn.query_row("SELECT COUNT(*) FROM medical_documents", [], |r| r.get(0))?;
        Ok(n)
    })
}
