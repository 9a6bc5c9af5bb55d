use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::cache::{ExpiringCache, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
use crate::cases::{CasePriority, CaseRecord, CaseStore, NewCase, NewWorker};
use crate::desk::{outcome_note, SupportDesk};
use crate::error::IngestError;
use crate::processor::{Attachment, DocumentProcessor, ProcessRequest, ProcessingResult};
use crate::queue::{AttachmentRef, JobData, JobPriority, JobQueue};
use crate::sanitize::redact_email;

use super::filter::is_candidate;
use super::payload::{TicketAttachment, WebhookEvent};

/// Case type given to cases opened from a ticket.
pub const NEW_CASE_TYPE: &str = "injury";

const UNKNOWN_WORKER_NAME: &str = "Unknown worker";

/// Queue priority for attachments that pass the medical filter.
pub const MEDICAL_JOB_PRIORITY: JobPriority = JobPriority::High;

/// Severity assumed for tickets that carry none.
const DEFAULT_TICKET_SEVERITY: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntakeMode {
    /// Download and process within the webhook call.
    Inline,
    /// Hand each attachment to the job queue.
    #[default]
    Queued,
}

/// Where accepted attachments go.
#[derive(Clone)]
pub enum Dispatch {
    Inline(Arc<DocumentProcessor>),
    Queued(Arc<JobQueue>),
}

impl Dispatch {
    pub fn mode(&self) -> IntakeMode {
        match self {
            Self::Inline(_) => IntakeMode::Inline,
            Self::Queued(_) => IntakeMode::Queued,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestSummary {
    pub ticket_id: String,
    /// Case the attachments were filed against; `None` when nothing was
    /// accepted.
    pub case_id: Option<String>,
    pub accepted: usize,
    /// Attachments that failed the filter.
    pub skipped: usize,
    /// Attachments already seen in an earlier delivery of the same ticket.
    pub repeated: usize,
    pub job_ids: Vec<String>,
    pub results: Vec<ProcessingResult>,
}

#[derive(Debug, Clone, PartialEq)]
struct ResolvedCase {
    case_id: String,
    worker_id: String,
}

impl From<CaseRecord> for ResolvedCase {
    fn from(case: CaseRecord) -> Self {
        Self {
            case_id: case.id,
            worker_id: case.worker_id,
        }
    }
}

pub struct WebhookIngestor {
    cases: Arc<dyn CaseStore>,
    desk: Arc<dyn SupportDesk>,
    dispatch: Dispatch,
    ticket_cases: ExpiringCache<String, ResolvedCase>,
    deliveries: ExpiringCache<String, ()>,
}

impl WebhookIngestor {
    pub fn new(cases: Arc<dyn CaseStore>, desk: Arc<dyn SupportDesk>, dispatch: Dispatch) -> Self {
        Self {
            cases,
            desk,
            dispatch,
            ticket_cases: ExpiringCache::new(DEFAULT_CACHE_TTL, DEFAULT_CACHE_CAPACITY),
            deliveries: ExpiringCache::new(DEFAULT_CACHE_TTL, DEFAULT_CACHE_CAPACITY),
        }
    }

    pub fn with_cache(mut self, ttl: Duration, capacity: u64) -> Self {
        self.ticket_cases = ExpiringCache::new(ttl, capacity);
        self.deliveries = ExpiringCache::new(ttl, capacity);
        self
    }

    pub fn mode(&self) -> IntakeMode {
        self.dispatch.mode()
    }

    /// Files every medical attachment on a ticket event against the ticket's
    /// case, creating the worker and case when none exists yet.
    pub async fn process_webhook(&self, event: &WebhookEvent) -> Result<IngestSummary, IngestError> {
        let span = info_span!(
            "process_webhook",
            ticket_id = %event.ticket.id,
            event_type = %event.event_type,
        );
        self.process_inner(event).instrument(span).await
    }

    async fn process_inner(&self, event: &WebhookEvent) -> Result<IngestSummary, IngestError> {
        let ticket = &event.ticket;
        let mut summary = IngestSummary {
            ticket_id: ticket.id.clone(),
            ..Default::default()
        };

        if ticket.attachments.is_empty() {
            debug!("Event carries no attachments");
            return Ok(summary);
        }

        let mut pending = Vec::new();
        for attachment in &ticket.attachments {
            if !is_candidate(&attachment.name, &attachment.content_type) {
                debug!(filename = %attachment.name, content_type = %attachment.content_type, "Attachment skipped by filter");
                summary.skipped += 1;
            } else if self.deliveries.contains(&delivery_key(&ticket.id, attachment)) {
                debug!(filename = %attachment.name, "Attachment already delivered");
                summary.repeated += 1;
            } else {
                pending.push(attachment);
            }
        }

        if pending.is_empty() {
            info!(
                skipped = summary.skipped,
                repeated = summary.repeated,
                "No new medical attachments"
            );
            return Ok(summary);
        }

        let resolved = self.resolve_case(event).await?;
        summary.case_id = Some(resolved.case_id.clone());

        for attachment in pending {
            match &self.dispatch {
                Dispatch::Queued(queue) => {
                    let job_id = queue
                        .enqueue(
                            job_data(event, &resolved, attachment),
                            MEDICAL_JOB_PRIORITY,
                        )
                        .map_err(|source| IngestError::Enqueue {
                            filename: attachment.name.clone(),
                            source,
                        })?;
                    summary.job_ids.push(job_id);
                }
                Dispatch::Inline(processor) => {
                    let result = self.process_inline(processor, event, &resolved, attachment).await?;
                    if let Some(job_id) = &result.job_id {
                        summary.job_ids.push(job_id.clone());
                    }
                    summary.results.push(result);
                }
            }
            self.deliveries.insert(delivery_key(&ticket.id, attachment), ());
            summary.accepted += 1;
        }

        info!(
            case_id = %resolved.case_id,
            accepted = summary.accepted,
            skipped = summary.skipped,
            repeated = summary.repeated,
            mode = ?self.dispatch.mode(),
            "Webhook ingested"
        );
        Ok(summary)
    }

    /// Ticket link, then the requester's open case, then a new case.
    async fn resolve_case(&self, event: &WebhookEvent) -> Result<ResolvedCase, IngestError> {
        let ticket = &event.ticket;

        if let Some(cached) = self.ticket_cases.get(&ticket.id) {
            return Ok(cached);
        }

        if let Some(case) = self.cases.find_case_by_ticket(&ticket.id).await? {
            debug!(case_id = %case.id, "Ticket already linked to a case");
            return Ok(self.remember(&ticket.id, case));
        }

        let email = event
            .requester
            .as_ref()
            .and_then(|r| r.email.as_deref())
            .map(str::trim)
            .filter(|e| !e.is_empty());

        let mut worker = None;
        if let Some(email) = email {
            worker = self.cases.find_worker_by_email(email).await?;
            if let Some(existing) = &worker {
                if let Some(case) = self.cases.find_open_case_for_worker(&existing.id).await? {
                    info!(
                        case_id = %case.id,
                        requester = %redact_email(email),
                        "Linked ticket to the requester's open case"
                    );
                    self.cases.link_ticket(&ticket.id, &case.id).await?;
                    return Ok(self.remember(&ticket.id, case));
                }
            }
        }

        let worker = match worker {
            Some(worker) => worker,
            None => {
                let name = event
                    .requester
                    .as_ref()
                    .and_then(|r| r.name.clone())
                    .filter(|n| !n.trim().is_empty())
                    .or_else(|| email.map(str::to_string))
                    .unwrap_or_else(|| UNKNOWN_WORKER_NAME.to_string());
                self.cases
                    .create_worker(NewWorker {
                        name,
                        email: email.map(str::to_string),
                        company_id: ticket.company_id.clone(),
                    })
                    .await?
            }
        };

        let severity = ticket.priority.unwrap_or(DEFAULT_TICKET_SEVERITY);
        let priority = CasePriority::from_severity(severity);
        let case = self
            .cases
            .create_case(NewCase {
                worker_id: worker.id.clone(),
                company_id: ticket.company_id.clone(),
                case_type: NEW_CASE_TYPE.to_string(),
                priority,
                summary: ticket.subject.clone(),
            })
            .await?;
        self.cases.link_ticket(&ticket.id, &case.id).await?;
        info!(
            case_id = %case.id,
            worker_id = %worker.id,
            priority = priority.as_str(),
            "Opened case for ticket"
        );
        Ok(self.remember(&ticket.id, case))
    }

    fn remember(&self, ticket_id: &str, case: CaseRecord) -> ResolvedCase {
        let resolved = ResolvedCase::from(case);
        self.ticket_cases.insert(ticket_id.to_string(), resolved.clone());
        resolved
    }

    async fn process_inline(
        &self,
        processor: &DocumentProcessor,
        event: &WebhookEvent,
        resolved: &ResolvedCase,
        attachment: &TicketAttachment,
    ) -> Result<ProcessingResult, IngestError> {
        let bytes = self
            .desk
            .download_attachment(&attachment.attachment_url)
            .await
            .map_err(|source| IngestError::Download {
                filename: attachment.name.clone(),
                source,
            })?;

        let result = processor
            .process(ProcessRequest {
                job_id: None,
                case_id: resolved.case_id.clone(),
                worker_id: resolved.worker_id.clone(),
                attachment: Attachment {
                    filename: attachment.name.clone(),
                    content_type: attachment.content_type.clone(),
                    url: Some(attachment.attachment_url.clone()),
                    bytes,
                },
                source_id: Some(event.ticket.id.clone()),
                company_id: event.ticket.company_id.clone(),
                requester_email: requester_email(event),
            })
            .await;

        if let (true, Some(document_id)) = (result.success, &result.document_id) {
            let body = outcome_note(&attachment.name, document_id, result.requires_review);
            if let Err(e) = self.desk.add_private_note(&event.ticket.id, &body).await {
                warn!(error = %e, "Failed to write outcome note to ticket");
            }
        }
        Ok(result)
    }
}

fn delivery_key(ticket_id: &str, attachment: &TicketAttachment) -> String {
    format!("{}:{}", ticket_id, attachment.id)
}

fn requester_email(event: &WebhookEvent) -> Option<String> {
    event.requester.as_ref().and_then(|r| r.email.clone())
}

fn job_data(event: &WebhookEvent, resolved: &ResolvedCase, attachment: &TicketAttachment) -> JobData {
    JobData {
        case_id: resolved.case_id.clone(),
        worker_id: resolved.worker_id.clone(),
        attachment: AttachmentRef {
            url: attachment.attachment_url.clone(),
            filename: attachment.name.clone(),
            content_type: attachment.content_type.clone(),
            size: attachment.size,
        },
        source_id: Some(event.ticket.id.clone()),
        company_id: event.ticket.company_id.clone(),
        requester_email: requester_email(event),
    }
}
