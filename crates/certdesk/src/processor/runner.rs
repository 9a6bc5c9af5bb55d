use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::cases::CaseStore;
use crate::db::document_repo::{self, DocumentRow, InsertOutcome};
use crate::db::job_repo::{self, JobRow};
use crate::db::{format_timestamp, now_timestamp, Database, DatabaseError};
use crate::error::ProcessError;
use crate::extractor::{DocumentExtractor, ExtractedFields};
use crate::storage::{self, FileStorage, StorageResolver};

use super::case_update::derive_outcome;
use super::events::{EventSink, NoopEvents, ProcessingEvent};
use super::review::{is_current_certificate, review_reasons};
use super::{ProcessRequest, ProcessingResult, SOURCE_SUPPORT_DESK};

/// Hex-encoded SHA-256 of the attachment bytes.
pub fn compute_checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// What a successful run produced.
struct Filed {
    document_id: String,
    requires_review: bool,
    duplicate: bool,
}

pub struct DocumentProcessor {
    db: Database,
    extractor: Arc<dyn DocumentExtractor>,
    cases: Arc<dyn CaseStore>,
    resolver: StorageResolver,
    events: Arc<dyn EventSink>,
}

impl DocumentProcessor {
    pub fn new(
        db: Database,
        extractor: Arc<dyn DocumentExtractor>,
        cases: Arc<dyn CaseStore>,
        resolver: StorageResolver,
    ) -> Self {
        Self {
            db,
            extractor,
            cases,
            resolver,
            events: Arc::new(NoopEvents),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Logs an event and forwards it to the configured sink.
    pub fn emit(&self, event: ProcessingEvent) {
        match &event {
            ProcessingEvent::Error { error, .. } => {
                warn!(event = event.name(), error = %error, "Document processing event")
            }
            _ => info!(event = event.name(), "Document processing event"),
        }
        self.events.emit(event);
    }

    /// Processes one attachment. Never returns an error: failures are
    /// recorded on the job and reported with `success: false`.
    pub async fn process(&self, request: ProcessRequest) -> ProcessingResult {
        let started = Instant::now();
        let span = info_span!(
            "process_document",
            case_id = %request.case_id,
            filename = %request.attachment.filename,
            job_id = tracing::field::Empty,
        );
        self.process_inner(request, started).instrument(span).await
    }

    async fn process_inner(&self, request: ProcessRequest, started: Instant) -> ProcessingResult {
        let owns_job = request.job_id.is_none();
        let job_id = match &request.job_id {
            Some(id) => id.clone(),
            None => match self.create_job(&request) {
                Ok(id) => id,
                Err(e) => {
                    let error = format!("Failed to create processing job: {}", e);
                    self.emit(ProcessingEvent::Error {
                        job_id: String::new(),
                        error: error.clone(),
                    });
                    return failure(None, error, started);
                }
            },
        };
        tracing::Span::current().record("job_id", job_id.as_str());

        let checksum = compute_checksum(&request.attachment.bytes);
        debug!(checksum = %checksum, size = request.attachment.bytes.len(), "Computed checksum");

        let outcome = match document_repo::find_by_checksum(&self.db, &checksum) {
            Ok(Some(existing)) => self.resume_existing(&job_id, existing).await,
            Ok(None) => self.file_document(&request, &job_id, &checksum).await,
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(filed) => ProcessingResult {
                success: true,
                job_id: Some(job_id),
                document_id: Some(filed.document_id),
                error: None,
                processing_time_ms: elapsed_ms(started),
                requires_review: filed.requires_review,
                duplicate: filed.duplicate,
            },
            Err(e) => {
                let error = e.to_string();
                self.emit(ProcessingEvent::Error {
                    job_id: job_id.clone(),
                    error: error.clone(),
                });
                let now = now_timestamp();
                let bookkeeping = if owns_job {
                    job_repo::mark_failed(&self.db, &job_id, &error, &now)
                } else {
                    job_repo::record_error(&self.db, &job_id, &error, &now)
                };
                if let Err(db_err) = bookkeeping {
                    warn!(error = %db_err, "Failed to record job failure");
                }
                failure(Some(job_id), error, started)
            }
        }
    }

    /// Extraction through case update for a checksum not yet on file.
    async fn file_document(
        &self,
        request: &ProcessRequest,
        job_id: &str,
        checksum: &str,
    ) -> Result<Filed, ProcessError> {
        let attachment = &request.attachment;

        self.emit(ProcessingEvent::OcrStarted {
            job_id: job_id.to_string(),
        });
        let extraction = self
            .extractor
            .extract(&attachment.bytes, &attachment.content_type, &attachment.filename)
            .await?;
        self.emit(ProcessingEvent::OcrCompleted {
            job_id: job_id.to_string(),
            kind: extraction.kind.as_str().to_string(),
            confidence: extraction.overall_confidence,
        });

        let now = Utc::now();
        let key = storage::storage_key(
            extraction.kind.as_str(),
            checksum,
            &attachment.content_type,
            &attachment.filename,
            now,
        );
        let root = self.resolver.resolve_root();
        let mode = root.mode;
        let file_storage = FileStorage::new(root);
        let stored = file_storage.store(&key, &attachment.bytes)?;
        self.emit(ProcessingEvent::StorageCompleted {
            job_id: job_id.to_string(),
            storage_key: stored.key.clone(),
            mode: mode.as_str().to_string(),
        });

        let reasons = review_reasons(&extraction);
        let requires_review = !reasons.is_empty();
        let fields = &extraction.fields;
        let is_current = is_current_certificate(
            fields.valid_from.as_deref(),
            fields.valid_to.as_deref(),
            now.date_naive(),
        );
        let field_confidence = serde_json::to_string(&extraction.field_confidence).map_err(
            |e| DatabaseError::Json {
                column: "field_confidence",
                source: e,
            },
        )?;

        let document = DocumentRow {
            id: uuid::Uuid::new_v4().to_string(),
            case_id: request.case_id.clone(),
            worker_id: request.worker_id.clone(),
            source_type: SOURCE_SUPPORT_DESK.to_string(),
            source_id: request.source_id.clone(),
            document_kind: extraction.kind.as_str().to_string(),
            storage_key: stored.key.clone(),
            content_type: attachment.content_type.clone(),
            size_bytes: stored.bytes_written as i64,
            checksum: checksum.to_string(),
            patient_name: fields.patient_name.clone(),
            fit_status: fields.fit_status.clone(),
            valid_from: fields.valid_from.clone(),
            valid_to: fields.valid_to.clone(),
            restrictions: fields.restrictions.clone(),
            capacity: fields.capacity.clone(),
            doctor_name: fields.doctor_name.clone(),
            field_confidence: Some(field_confidence),
            overall_confidence: extraction.overall_confidence,
            requires_review,
            is_current_certificate: is_current,
            processing_status: document_repo::STATUS_FILED.to_string(),
            created_at: format_timestamp(now),
        };

        if let InsertOutcome::Duplicate(existing_id) =
            document_repo::insert_if_absent(&self.db, &document)?
        {
            // Another job filed the same bytes while this one was extracting.
            info!(document_id = %existing_id, "Concurrent duplicate resolved to existing document");
            if let Err(e) = file_storage.remove(&stored.key) {
                warn!(error = %e, "Failed to remove duplicate file");
            }
            let existing_review = document_repo::find_by_id(&self.db, &existing_id)?
                .map(|d| d.requires_review)
                .unwrap_or(requires_review);
            self.complete_job(job_id, &existing_id)?;
            return Ok(Filed {
                document_id: existing_id,
                requires_review: existing_review,
                duplicate: true,
            });
        }

        self.emit(ProcessingEvent::ValidationCompleted {
            job_id: job_id.to_string(),
            requires_review,
        });
        if requires_review {
            self.emit(ProcessingEvent::ReviewRequired {
                job_id: job_id.to_string(),
                reasons,
            });
        }

        self.apply_case_update(job_id, &document.case_id, &document.id, fields)
            .await?;
        self.complete_job(job_id, &document.id)?;

        Ok(Filed {
            document_id: document.id,
            requires_review,
            duplicate: false,
        })
    }

    /// Checksum hit. A document whose case update never landed (the run
    /// that filed it failed or was cut short afterwards) is finished here
    /// before the job completes against it.
    async fn resume_existing(
        &self,
        job_id: &str,
        existing: DocumentRow,
    ) -> Result<Filed, ProcessError> {
        if existing.processing_status == document_repo::STATUS_COMPLETED {
            info!(document_id = %existing.id, "Identical document already on file");
        } else {
            info!(
                document_id = %existing.id,
                status = %existing.processing_status,
                "Resuming case update for document already on file"
            );
            let fields = ExtractedFields {
                patient_name: existing.patient_name.clone(),
                fit_status: existing.fit_status.clone(),
                valid_from: existing.valid_from.clone(),
                valid_to: existing.valid_to.clone(),
                restrictions: existing.restrictions.clone(),
                capacity: existing.capacity.clone(),
                doctor_name: existing.doctor_name.clone(),
            };
            self.apply_case_update(job_id, &existing.case_id, &existing.id, &fields)
                .await?;
        }

        self.complete_job(job_id, &existing.id)?;
        Ok(Filed {
            document_id: existing.id,
            requires_review: existing.requires_review,
            duplicate: true,
        })
    }

    /// Writes the derived outcome to the case, then marks the document
    /// completed.
    async fn apply_case_update(
        &self,
        job_id: &str,
        case_id: &str,
        document_id: &str,
        fields: &ExtractedFields,
    ) -> Result<(), ProcessError> {
        let outcome = derive_outcome(fields);
        if !self.cases.update_case(case_id, &outcome).await? {
            return Err(ProcessError::CaseNotFound(case_id.to_string()));
        }
        self.emit(ProcessingEvent::CaseUpdated {
            job_id: job_id.to_string(),
            case_id: case_id.to_string(),
            next_step: outcome.next_step,
        });
        document_repo::mark_completed(&self.db, document_id)?;
        Ok(())
    }

    fn create_job(&self, request: &ProcessRequest) -> Result<String, DatabaseError> {
        let now = now_timestamp();
        let row = JobRow {
            id: uuid::Uuid::new_v4().to_string(),
            case_id: request.case_id.clone(),
            worker_id: request.worker_id.clone(),
            attachment_url: request.attachment.url.clone(),
            filename: request.attachment.filename.clone(),
            content_type: request.attachment.content_type.clone(),
            size_bytes: request.attachment.bytes.len() as i64,
            source_id: request.source_id.clone(),
            company_id: request.company_id.clone(),
            requester_email: request.requester_email.clone(),
            priority: "normal".to_string(),
            status: "processing".to_string(),
            retry_count: 0,
            // Inline jobs are not retried.
            max_retries: 0,
            last_error: None,
            document_id: None,
            scheduled_at: now.clone(),
            created_at: now.clone(),
            updated_at: now.clone(),
            started_at: Some(now),
            completed_at: None,
            note_posted_at: None,
        };
        job_repo::insert(&self.db, &row)?;
        Ok(row.id)
    }

    fn complete_job(&self, job_id: &str, document_id: &str) -> Result<(), DatabaseError> {
        job_repo::mark_completed(&self.db, job_id, document_id, &now_timestamp())
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn failure(job_id: Option<String>, error: String, started: Instant) -> ProcessingResult {
    ProcessingResult {
        success: false,
        job_id,
        document_id: None,
        error: Some(error),
        processing_time_ms: elapsed_ms(started),
        requires_review: true,
        duplicate: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::{CasePriority, NewCase, NewWorker, SqliteCaseStore};
    use crate::error::ExtractError;
    use crate::extractor::{DocumentKind, ExtractedFields, Extraction, FieldConfidence};
    use crate::processor::{Attachment, BroadcastEvents};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct StubExtractor {
        extraction: Option<Extraction>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentExtractor for StubExtractor {
        async fn extract(
            &self,
            _bytes: &[u8],
            _content_type: &str,
            _filename: &str,
        ) -> Result<Extraction, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.extraction
                .clone()
                .ok_or_else(|| ExtractError::Request("ocr unavailable".to_string()))
        }
    }

    fn restricted(confidence: f64) -> Extraction {
        let field_confidence: FieldConfidence = [("fit_status".to_string(), confidence)]
            .into_iter()
            .collect();
        Extraction {
            kind: DocumentKind::MedicalCertificate,
            fields: ExtractedFields {
                patient_name: Some("Jane Citizen".to_string()),
                fit_status: Some("fit_with_restrictions".to_string()),
                valid_from: Some("2024-01-01".to_string()),
                valid_to: Some("2024-12-31".to_string()),
                restrictions: Some("No lifting over 10kg".to_string()),
                capacity: None,
                doctor_name: Some("Dr Smith".to_string()),
            },
            field_confidence,
            overall_confidence: confidence,
        }
    }

    struct Fixture {
        _dir: TempDir,
        db: Database,
        cases: Arc<SqliteCaseStore>,
        extractor: Arc<StubExtractor>,
        processor: DocumentProcessor,
        case_id: String,
        worker_id: String,
    }

    async fn fixture(extraction: Option<Extraction>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let cases = Arc::new(SqliteCaseStore::new(db.clone()));
        let worker = cases
            .create_worker(NewWorker {
                name: "Jane Citizen".to_string(),
                email: Some("jane@example.com".to_string()),
                company_id: None,
            })
            .await
            .unwrap();
        let case = cases
            .create_case(NewCase {
                worker_id: worker.id.clone(),
                company_id: None,
                case_type: "injury".to_string(),
                priority: CasePriority::Medium,
                summary: None,
            })
            .await
            .unwrap();
        let extractor = Arc::new(StubExtractor {
            extraction,
            calls: AtomicUsize::new(0),
        });
        let processor = DocumentProcessor::new(
            db.clone(),
            extractor.clone(),
            cases.clone(),
            StorageResolver::temporary_only(dir.path()),
        );
        Fixture {
            _dir: dir,
            db,
            cases,
            extractor,
            processor,
            case_id: case.id,
            worker_id: worker.id,
        }
    }

    fn request(f: &Fixture, bytes: &[u8]) -> ProcessRequest {
        ProcessRequest {
            job_id: None,
            case_id: f.case_id.clone(),
            worker_id: f.worker_id.clone(),
            attachment: Attachment {
                filename: "medical_certificate.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                url: None,
                bytes: bytes.to_vec(),
            },
            source_id: Some("500".to_string()),
            company_id: None,
            requester_email: None,
        }
    }

    #[tokio::test]
    async fn test_process_files_document_and_updates_case() {
        let f = fixture(Some(restricted(85.0))).await;

        let result = f.processor.process(request(&f, b"%PDF certificate")).await;
        assert!(result.success, "{:?}", result.error);
        assert!(!result.requires_review);
        assert!(!result.duplicate);

        let doc_id = result.document_id.unwrap();
        let doc = document_repo::find_by_id(&f.db, &doc_id).unwrap().unwrap();
        assert_eq!(doc.checksum, compute_checksum(b"%PDF certificate"));
        assert!(doc.storage_key.starts_with("medical_certificate/"));
        assert!(doc.storage_key.ends_with(".pdf"));
        assert_eq!(doc.size_bytes, 16);
        assert_eq!(doc.processing_status, document_repo::STATUS_COMPLETED);

        let case = f.cases.get_case(&f.case_id).await.unwrap().unwrap();
        assert_eq!(
            case.next_step.as_deref(),
            Some(crate::processor::FitStatus::FitWithRestrictions.next_step())
        );
        assert_eq!(case.current_capacity_kg, Some(10.0));

        let job = job_repo::find_by_id(&f.db, &result.job_id.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(job.status, "completed");
        assert_eq!(job.document_id.as_deref(), Some(doc_id.as_str()));
    }

    #[tokio::test]
    async fn test_identical_bytes_short_circuit() {
        let f = fixture(Some(restricted(85.0))).await;

        let first = f.processor.process(request(&f, b"same bytes")).await;
        let second = f.processor.process(request(&f, b"same bytes")).await;

        assert!(second.success);
        assert!(second.duplicate);
        assert_eq!(first.document_id, second.document_id);
        assert_eq!(f.extractor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(document_repo::count(&f.db).unwrap(), 1);

        let job = job_repo::find_by_id(&f.db, &second.job_id.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(job.status, "completed");
        assert_eq!(job.document_id, first.document_id);
    }

    #[tokio::test]
    async fn test_low_confidence_flags_review() {
        let f = fixture(Some(restricted(65.0))).await;
        let events = Arc::new(BroadcastEvents::new(32));
        let mut rx = events.subscribe();
        let processor = DocumentProcessor::new(
            f.db.clone(),
            f.extractor.clone(),
            f.cases.clone(),
            StorageResolver::temporary_only(f._dir.path()),
        )
        .with_events(events);

        let result = processor.process(request(&f, b"blurry scan")).await;
        assert!(result.success);
        assert!(result.requires_review);

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        assert_eq!(
            names,
            vec![
                "ocr_started",
                "ocr_completed",
                "storage_completed",
                "validation_completed",
                "review_required",
                "case_updated",
            ]
        );
    }

    #[tokio::test]
    async fn test_extraction_failure_marks_owned_job_failed() {
        let f = fixture(None).await;

        let result = f.processor.process(request(&f, b"bytes")).await;
        assert!(!result.success);
        assert!(result.requires_review);
        assert!(result.error.unwrap().contains("ocr unavailable"));

        let job = job_repo::find_by_id(&f.db, &result.job_id.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(job.status, "failed");
        assert_eq!(document_repo::count(&f.db).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failure_on_supplied_job_only_records_error() {
        let f = fixture(None).await;
        let mut req = request(&f, b"bytes");
        let job_id = f.processor.create_job(&req).unwrap();
        req.job_id = Some(job_id.clone());

        let result = f.processor.process(req).await;
        assert!(!result.success);

        let job = job_repo::find_by_id(&f.db, &job_id).unwrap().unwrap();
        assert_eq!(job.status, "processing");
        assert!(job.last_error.unwrap().contains("ocr unavailable"));
    }

    #[tokio::test]
    async fn test_missing_case_fails() {
        let f = fixture(Some(restricted(90.0))).await;
        let mut req = request(&f, b"orphan");
        req.case_id = "no-such-case".to_string();

        let result = f.processor.process(req).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("no-such-case"));

        // Filed but not completed, so a later run with the same bytes
        // retries the case update instead of short-circuiting.
        let doc = document_repo::find_by_checksum(&f.db, &compute_checksum(b"orphan"))
            .unwrap()
            .unwrap();
        assert_eq!(doc.processing_status, document_repo::STATUS_FILED);
    }

    #[test]
    fn test_checksum_is_sha256_hex() {
        assert_eq!(
            compute_checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
