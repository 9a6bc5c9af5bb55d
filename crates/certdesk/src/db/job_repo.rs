//! Job repository: persistence for the `jobs` table.
//!
//! Jobs are never deleted; the table doubles as the audit trail of every
//! attachment that entered the pipeline.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub case_id: String,
    pub worker_id: String,
    pub attachment_url: Option<String>,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub source_id: Option<String>,
    pub company_id: Option<String>,
    pub requester_email: Option<String>,
    pub priority: String,
    pub status: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    pub document_id: Option<String>,
    pub scheduled_at: String,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub note_posted_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            case_id: row.get("case_id")?,
            worker_id: row.get("worker_id")?,
            attachment_url: row.get("attachment_url")?,
            filename: row.get("filename")?,
            content_type: row.get("content_type")?,
            size_bytes: row.get("size_bytes")?,
            source_id: row.get("source_id")?,
            company_id: row.get("company_id")?,
            requester_email: row.get("requester_email")?,
            priority: row.get("priority")?,
            status: row.get("status")?,
            retry_count: row.get("retry_count")?,
            max_retries: row.get("max_retries")?,
            last_error: row.get("last_error")?,
            document_id: row.get("document_id")?,
            scheduled_at: row.get("scheduled_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
            note_posted_at: row.get("note_posted_at")?,
        })
    }
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, case_id, worker_id, attachment_url, filename, content_type,
             size_bytes, source_id, company_id, requester_email, priority, status, retry_count,
             max_retries, last_error, document_id, scheduled_at, created_at, updated_at,
             started_at, completed_at, note_posted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
             ?17, ?18, ?19, ?20, ?21, ?22)",
            params![
                job.id,
                job.case_id,
                job.worker_id,
                job.attachment_url,
                job.filename,
                job.content_type,
                job.size_bytes,
                job.source_id,
                job.company_id,
                job.requester_email,
                job.priority,
                job.status,
                job.retry_count,
                job.max_retries,
                job.last_error,
                job.document_id,
                job.scheduled_at,
                job.created_at,
                job.updated_at,
                job.started_at,
                job.completed_at,
                job.note_posted_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row("SELECT * FROM jobs WHERE id = ?1", params![id], JobRow::from_row)
            .optional()?;
        Ok(row)
    })
}

/// Returns queued jobs whose `scheduled_at` is not in the future, in
/// insertion order. Priority ordering is applied by the caller.
pub fn list_due_queued(db: &Database, now: &str) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM jobs WHERE status = 'queued' AND scheduled_at <= ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![now], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Lists every job recorded for a case, oldest first.
pub fn list_by_case(db: &Database, case_id: &str) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM jobs WHERE case_id = ?1 ORDER BY created_at ASC, rowid ASC")?;
        let rows = stmt
            .query_map(params![case_id], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Claims a queued job for processing. Returns `false` when the job was no
/// longer queued, so two dispatchers never run the same job.
pub fn claim(db: &Database, id: &str, now: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = 'processing', started_at = ?2, updated_at = ?2
             WHERE id = ?1 AND status = 'queued'",
            params![id, now],
        )?;
        Ok(changed == 1)
    })
}

/// Marks a job completed and links the resulting document.
pub fn mark_completed(
    db: &Database,
    id: &str,
    document_id: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET status = 'completed', document_id = ?2, completed_at = ?3,
             updated_at = ?3 WHERE id = ?1",
            params![id, document_id, now],
        )?;
        Ok(())
    })
}

/// Marks a job permanently failed.
pub fn mark_failed(db: &Database, id: &str, error: &str, now: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET status = 'failed', last_error = ?2, completed_at = ?3,
             updated_at = ?3 WHERE id = ?1",
            params![id, error, now],
        )?;
        Ok(())
    })
}

/// Records an error without changing the status.
pub fn record_error(db: &Database, id: &str, error: &str, now: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET last_error = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, error, now],
        )?;
        Ok(())
    })
}

/// Returns a failed attempt to the queue, to be picked up again at
/// `scheduled_at`.
pub fn requeue(
    db: &Database,
    id: &str,
    retry_count: u32,
    error: &str,
    scheduled_at: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET status = 'queued', retry_count = ?2, last_error = ?3,
             scheduled_at = ?4, updated_at = ?5 WHERE id = ?1",
            params![id, retry_count, error, scheduled_at, now],
        )?;
        Ok(())
    })
}

/// Marks a job failed after its retries ran out.
pub fn mark_exhausted(
    db: &Database,
    id: &str,
    retry_count: u32,
    error: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET status = 'failed', retry_count = ?2, last_error = ?3,
             completed_at = ?4, updated_at = ?4 WHERE id = ?1",
            params![id, retry_count, error, now],
        )?;
        Ok(())
    })
}

/// Error recorded on a job found in `processing` when the queue starts.
pub const INTERRUPTED_ERROR: &str = "Interrupted while processing";

/// Jobs settled by [`requeue_stale_processing`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaleRecovery {
    pub requeued: usize,
    pub failed: usize,
}

/// Settles jobs stranded in `processing` by a previous process. Each counts
/// as one failed attempt: jobs with retries left go back to the queue, the
/// rest are marked failed.
pub fn requeue_stale_processing(db: &Database, now: &str) -> Result<StaleRecovery, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let failed = tx.execute(
            "UPDATE jobs SET status = 'failed', retry_count = retry_count + 1,
             last_error = 'Retries exhausted after ' || (retry_count + 1) || ' attempts: ' || ?2,
             completed_at = ?1, updated_at = ?1
             WHERE status = 'processing' AND retry_count + 1 > max_retries",
            params![now, INTERRUPTED_ERROR],
        )?;
        let requeued = tx.execute(
            "UPDATE jobs SET status = 'queued', retry_count = retry_count + 1,
             last_error = ?2, scheduled_at = ?1, updated_at = ?1
             WHERE status = 'processing'",
            params![now, INTERRUPTED_ERROR],
        )?;
        tx.commit()?;
        Ok(StaleRecovery { requeued, failed })
    })
}

/// Records that the outcome note was written back to the source ticket.
pub fn mark_note_posted(db: &Database, id: &str, now: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET note_posted_at = ?2 WHERE id = ?1",
            params![id, now],
        )?;
        Ok(())
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
