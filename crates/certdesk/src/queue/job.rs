use serde::{Deserialize, Serialize};

use crate::db::job_repo::JobRow;
use crate::error::QueueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Low,
    Normal,
    High,
}

impl JobPriority {
    /// Higher rank dispatches first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Where to fetch an attachment from. Bytes are only downloaded when the
/// job runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub url: String,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

/// Everything needed to run a job without the originating webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobData {
    pub case_id: String,
    pub worker_id: String,
    pub attachment: AttachmentRef,
    /// Source ticket id; the outcome note is written back to it.
    pub source_id: Option<String>,
    pub company_id: Option<String>,
    pub requester_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedJob {
    pub id: String,
    pub data: JobData,
    pub priority: JobPriority,
    pub status: JobStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    pub document_id: Option<String>,
    pub scheduled_at: String,
    pub created_at: String,
}

impl TryFrom<JobRow> for QueuedJob {
    type Error = QueueError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let invalid = |reason: String| QueueError::InvalidJob {
            id: row.id.clone(),
            reason,
        };
        let priority = JobPriority::parse(&row.priority)
            .ok_or_else(|| invalid(format!("unknown priority '{}'", row.priority)))?;
        let status = JobStatus::parse(&row.status)
            .ok_or_else(|| invalid(format!("unknown status '{}'", row.status)))?;
        let url = row
            .attachment_url
            .clone()
            .ok_or_else(|| invalid("no attachment URL".to_string()))?;

        Ok(Self {
            data: JobData {
                case_id: row.case_id,
                worker_id: row.worker_id,
                attachment: AttachmentRef {
                    url,
                    filename: row.filename,
                    content_type: row.content_type,
                    size: u64::try_from(row.size_bytes).unwrap_or(0),
                },
                source_id: row.source_id,
                company_id: row.company_id,
                requester_email: row.requester_email,
            },
            id: row.id,
            priority,
            status,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            last_error: row.last_error,
            document_id: row.document_id,
            scheduled_at: row.scheduled_at,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> JobRow {
        JobRow {
            id: "j1".to_string(),
            case_id: "c1".to_string(),
            worker_id: "w1".to_string(),
            attachment_url: Some("https://desk.example.com/a/1".to_string()),
            filename: "medical_certificate.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            size_bytes: 2048,
            source_id: Some("500".to_string()),
            company_id: None,
            requester_email: None,
            priority: "high".to_string(),
            status: "queued".to_string(),
            retry_count: 1,
            max_retries: 3,
            last_error: Some("timeout".to_string()),
            document_id: None,
            scheduled_at: "2026-01-01T00:00:00.000000Z".to_string(),
            created_at: "2026-01-01T00:00:00.000000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000000Z".to_string(),
            started_at: None,
            completed_at: None,
            note_posted_at: None,
        }
    }

    #[test]
    fn test_priority_order() {
        assert!(JobPriority::High.rank() > JobPriority::Normal.rank());
        assert!(JobPriority::Normal.rank() > JobPriority::Low.rank());
    }

    #[test]
    fn test_queued_job_from_row() {
        let job = QueuedJob::try_from(row()).unwrap();
        assert_eq!(job.priority, JobPriority::High);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.data.attachment.size, 2048);
        assert_eq!(job.data.source_id.as_deref(), Some("500"));
        assert_eq!(job.retry_count, 1);
    }

    #[test]
    fn test_invalid_rows_rejected() {
        let mut bad = row();
        bad.priority = "urgent".to_string();
        assert!(matches!(
            QueuedJob::try_from(bad),
            Err(QueueError::InvalidJob { .. })
        ));

        let mut no_url = row();
        no_url.attachment_url = None;
        assert!(QueuedJob::try_from(no_url).is_err());
    }
}
