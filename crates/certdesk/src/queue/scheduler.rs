//! Polling job scheduler.
//!
//! A single loop per process ticks on a fixed interval. Each tick takes the
//! due `queued` jobs, orders them by priority then age, claims up to the
//! concurrency cap, and runs them as independent tasks. An in-progress flag
//! keeps ticks from overlapping when a batch outlives the interval.

use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::db::job_repo::{self, JobRow, StaleRecovery};
use crate::db::{format_timestamp, now_timestamp, Database, DatabaseError};
use crate::desk::{outcome_note, SupportDesk};
use crate::error::QueueError;
use crate::processor::{
    Attachment, DocumentProcessor, ProcessRequest, ProcessingEvent, ProcessingResult,
};

use super::backoff::RetryPolicy;
use super::job::{JobData, JobPriority, JobStatus, QueuedJob};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    pub poll_interval: Duration,
    pub max_concurrent_jobs: usize,
    pub retry: RetryPolicy,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Resets the in-progress flag when a tick ends, even on panic.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct QueueInner {
    db: Database,
    desk: Arc<dyn SupportDesk>,
    processor: Arc<DocumentProcessor>,
    settings: QueueSettings,
    running: AtomicBool,
    tick_in_progress: AtomicBool,
    wake: Notify,
}

pub struct JobQueue {
    inner: Arc<QueueInner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl JobQueue {
    pub fn new(
        db: Database,
        desk: Arc<dyn SupportDesk>,
        processor: Arc<DocumentProcessor>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                db,
                desk,
                processor,
                settings,
                running: AtomicBool::new(false),
                tick_in_progress: AtomicBool::new(false),
                wake: Notify::new(),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Persists a new `queued` job and returns its id. Does not wait for
    /// the job to run.
    pub fn enqueue(&self, data: JobData, priority: JobPriority) -> Result<String, QueueError> {
        let now = now_timestamp();
        let row = JobRow {
            id: uuid::Uuid::new_v4().to_string(),
            case_id: data.case_id,
            worker_id: data.worker_id,
            attachment_url: Some(data.attachment.url),
            filename: data.attachment.filename,
            content_type: data.attachment.content_type,
            size_bytes: i64::try_from(data.attachment.size).unwrap_or(i64::MAX),
            source_id: data.source_id,
            company_id: data.company_id,
            requester_email: data.requester_email,
            priority: priority.as_str().to_string(),
            status: JobStatus::Queued.as_str().to_string(),
            retry_count: 0,
            max_retries: self.inner.settings.retry.max_retries,
            last_error: None,
            document_id: None,
            scheduled_at: now.clone(),
            created_at: now.clone(),
            updated_at: now,
            started_at: None,
            completed_at: None,
            note_posted_at: None,
        };
        job_repo::insert(&self.inner.db, &row)?;
        info!(job_id = %row.id, priority = priority.as_str(), filename = %row.filename, "Job enqueued");
        Ok(row.id)
    }

    /// Loads a job by id.
    pub fn get_job(&self, id: &str) -> Result<QueuedJob, QueueError> {
        job_repo::find_by_id(&self.inner.db, id)?
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))
            .and_then(QueuedJob::try_from)
    }

    /// Starts the polling loop. Calling it while running does nothing.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            debug!("Job queue already running");
            return;
        }

        match job_repo::requeue_stale_processing(&self.inner.db, &now_timestamp()) {
            Ok(recovery) if recovery == StaleRecovery::default() => {}
            Ok(recovery) => warn!(
                requeued = recovery.requeued,
                failed = recovery.failed,
                "Settled jobs left in processing by a previous run"
            ),
            Err(e) => error!(error = %e, "Failed to recover jobs left in processing"),
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(inner.settings.poll_interval);
            let mut batch: Option<JoinHandle<usize>> = None;
            loop {
                tokio::select! {
                    _ = interval.tick() => {},
                    _ = inner.wake.notified() => {},
                }
                if !inner.running.load(Ordering::Acquire) {
                    break;
                }
                // The batch runs on its own task so the interval keeps
                // ticking; a tick is skipped while the previous batch runs.
                if matches!(&batch, Some(running) if !running.is_finished()) {
                    debug!("Previous batch still running, skipping tick");
                    continue;
                }
                let ticking = Arc::clone(&inner);
                batch = Some(tokio::spawn(async move { ticking.tick().await }));
            }
            if let Some(batch) = batch {
                if let Err(e) = batch.await {
                    error!(error = %e, "Job batch panicked");
                }
            }
            info!("Job queue stopped");
        });

        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }
        info!(
            poll_interval_ms = self.inner.settings.poll_interval.as_millis() as u64,
            max_concurrent_jobs = self.inner.settings.max_concurrent_jobs,
            "Job queue started"
        );
    }

    /// Stops scheduling new ticks. In-flight jobs keep running on the
    /// runtime; use [`JobQueue::shutdown`] to wait for them.
    /// Calling it while stopped does nothing.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.inner.wake.notify_one();
    }

    /// Stops the queue and waits for the batch in flight to settle.
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.handle.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Job queue loop panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Runs one scheduler tick now and returns how many jobs it dispatched.
    /// Returns 0 without doing anything if a tick is already in flight.
    pub async fn process_tick(&self) -> usize {
        Arc::clone(&self.inner).tick().await
    }

    /// Job counts by status. Never fails: internal errors yield zeros.
    pub fn queue_stats(&self) -> QueueStats {
        read_stats(&self.inner.db)
    }
}

/// Job counts by status straight from the database, for callers that do not
/// run a queue. Internal errors yield zeros.
pub fn read_stats(db: &Database) -> QueueStats {
    let counts = || -> Result<QueueStats, DatabaseError> {
        Ok(QueueStats {
            queued: job_repo::count_by_status(db, JobStatus::Queued.as_str())?,
            processing: job_repo::count_by_status(db, JobStatus::Processing.as_str())?,
            completed: job_repo::count_by_status(db, JobStatus::Completed.as_str())?,
            failed: job_repo::count_by_status(db, JobStatus::Failed.as_str())?,
        })
    };
    counts().unwrap_or_else(|e| {
        error!(error = %e, "Failed to read queue stats");
        QueueStats::default()
    })
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

impl QueueInner {
    async fn tick(self: Arc<Self>) -> usize {
        if self.tick_in_progress.swap(true, Ordering::AcqRel) {
            debug!("Previous tick still in progress, skipping");
            return 0;
        }
        let _guard = TickGuard(&self.tick_in_progress);

        let due = match job_repo::list_due_queued(&self.db, &now_timestamp()) {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "Failed to load queued jobs");
                return 0;
            }
        };

        let mut jobs: Vec<QueuedJob> = due
            .into_iter()
            .filter_map(|row| match QueuedJob::try_from(row) {
                Ok(job) => Some(job),
                Err(e) => {
                    error!(error = %e, "Skipping unreadable job");
                    None
                }
            })
            .collect();
        // Stable: rows arrive oldest first, so equal priorities keep age order.
        jobs.sort_by_key(|job| Reverse(job.priority.rank()));

        let mut claimed = Vec::new();
        for job in jobs {
            if claimed.len() >= self.settings.max_concurrent_jobs {
                break;
            }
            match job_repo::claim(&self.db, &job.id, &now_timestamp()) {
                Ok(true) => claimed.push(job),
                Ok(false) => debug!(job_id = %job.id, "Job claimed elsewhere"),
                Err(e) => error!(job_id = %job.id, error = %e, "Failed to claim job"),
            }
        }

        let dispatched = claimed.len();
        if dispatched == 0 {
            return 0;
        }
        debug!(count = dispatched, "Dispatching jobs");

        let tasks = claimed.into_iter().map(|job| {
            let inner = Arc::clone(&self);
            tokio::spawn(async move { inner.run_job(job).await })
        });
        for joined in join_all(tasks).await {
            if let Err(e) = joined {
                error!(error = %e, "Job task panicked");
            }
        }

        dispatched
    }

    async fn run_job(&self, job: QueuedJob) {
        let span = info_span!(
            "queue_job",
            job_id = %job.id,
            attempt = job.retry_count + 1,
            priority = job.priority.as_str(),
        );
        async {
            match self.execute(&job).await {
                Ok(result) => {
                    info!(
                        document_id = result.document_id.as_deref().unwrap_or(""),
                        requires_review = result.requires_review,
                        duration_ms = result.processing_time_ms,
                        "Job completed"
                    );
                    if let (Some(ticket_id), Some(document_id)) =
                        (&job.data.source_id, &result.document_id)
                    {
                        self.post_note(&job, ticket_id, document_id, result.requires_review)
                            .await;
                    }
                }
                Err(e) => self.handle_failure(&job, &e),
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, job: &QueuedJob) -> Result<ProcessingResult, QueueError> {
        let attachment = &job.data.attachment;
        self.processor.emit(ProcessingEvent::DownloadStarted {
            job_id: job.id.clone(),
            filename: attachment.filename.clone(),
        });
        let bytes = self.desk.download_attachment(&attachment.url).await?;

        let result = self
            .processor
            .process(ProcessRequest {
                job_id: Some(job.id.clone()),
                case_id: job.data.case_id.clone(),
                worker_id: job.data.worker_id.clone(),
                attachment: Attachment {
                    filename: attachment.filename.clone(),
                    content_type: attachment.content_type.clone(),
                    url: Some(attachment.url.clone()),
                    bytes,
                },
                source_id: job.data.source_id.clone(),
                company_id: job.data.company_id.clone(),
                requester_email: job.data.requester_email.clone(),
            })
            .await;

        if result.success {
            Ok(result)
        } else {
            Err(QueueError::Processing(
                result.error.unwrap_or_else(|| "unknown processing error".to_string()),
            ))
        }
    }

    /// Requeues with backoff or marks the job failed. Bookkeeping errors are
    /// logged, never propagated.
    fn handle_failure(&self, job: &QueuedJob, err: &QueueError) {
        let retry_count = job.retry_count + 1;
        let error = err.to_string();
        let now = Utc::now();

        if RetryPolicy::should_retry(retry_count, job.max_retries) {
            let delay = self.settings.retry.delay_for(retry_count);
            let scheduled_at = now
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
            warn!(
                retry_count,
                max_retries = job.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Job failed, scheduling retry"
            );
            if let Err(e) = job_repo::requeue(
                &self.db,
                &job.id,
                retry_count,
                &error,
                &format_timestamp(scheduled_at),
                &format_timestamp(now),
            ) {
                error!(error = %e, "Failed to requeue job");
            }
        } else {
            let reason = format!("Retries exhausted after {} attempts: {}", retry_count, error);
            error!(retry_count, error = %error, "Job failed permanently");
            if let Err(e) =
                job_repo::mark_exhausted(&self.db, &job.id, retry_count, &reason, &format_timestamp(now))
            {
                error!(error = %e, "Failed to mark job failed");
            }
        }
    }

    async fn post_note(&self, job: &QueuedJob, ticket_id: &str, document_id: &str, review: bool) {
        let body = outcome_note(&job.data.attachment.filename, document_id, review);
        match self.desk.add_private_note(ticket_id, &body).await {
            Ok(()) => {
                if let Err(e) = job_repo::mark_note_posted(&self.db, &job.id, &now_timestamp()) {
                    warn!(error = %e, "Failed to record note write-back");
                }
            }
            Err(e) => warn!(ticket_id, error = %e, "Failed to write outcome note to ticket"),
        }
    }
}
