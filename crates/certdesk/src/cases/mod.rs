//! Case and worker records, consumed through the [`CaseStore`] interface.

mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use crate::error::CaseStoreError;
pub use sqlite::SqliteCaseStore;

/// Case priority as stored on the case record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CasePriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl CasePriority {
    /// Maps a support-desk ticket severity (1-4) onto a case priority.
    /// Unknown severities fall back to `Medium`.
    pub fn from_severity(severity: i64) -> Self {
        match severity {
            1 => Self::Low,
            3 => Self::High,
            4 => Self::Urgent,
            _ => Self::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerRecord {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub company_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseRecord {
    pub id: String,
    pub worker_id: String,
    pub company_id: Option<String>,
    pub case_type: String,
    pub priority: CasePriority,
    pub status: String,
    pub summary: Option<String>,
    pub fitness_status: Option<String>,
    pub next_step: Option<String>,
    pub compliance_status: Option<String>,
    pub current_capacity_kg: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewWorker {
    pub name: String,
    pub email: Option<String>,
    pub company_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewCase {
    pub worker_id: String,
    pub company_id: Option<String>,
    pub case_type: String,
    pub priority: CasePriority,
    pub summary: Option<String>,
}

/// Derived state written onto a case after one of its documents is filed.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseOutcome {
    pub fitness_status: Option<String>,
    pub next_step: String,
    /// `None` keeps the current compliance status.
    pub compliance_status: Option<String>,
    /// `None` keeps the current capacity.
    pub current_capacity_kg: Option<f64>,
}

/// Persistence boundary for cases, workers and ticket links.
#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn get_case(&self, case_id: &str) -> Result<Option<CaseRecord>, CaseStoreError>;

    async fn find_case_by_ticket(
        &self,
        ticket_id: &str,
    ) -> Result<Option<CaseRecord>, CaseStoreError>;

    async fn find_worker_by_email(
        &self,
        email: &str,
    ) -> Result<Option<WorkerRecord>, CaseStoreError>;

    async fn find_open_case_for_worker(
        &self,
        worker_id: &str,
    ) -> Result<Option<CaseRecord>, CaseStoreError>;

    async fn create_worker(&self, worker: NewWorker) -> Result<WorkerRecord, CaseStoreError>;

    async fn create_case(&self, case: NewCase) -> Result<CaseRecord, CaseStoreError>;

    async fn link_ticket(&self, ticket_id: &str, case_id: &str) -> Result<(), CaseStoreError>;

    /// Applies a document outcome. Returns `false` when the case does not exist.
    async fn update_case(
        &self,
        case_id: &str,
        outcome: &CaseOutcome,
    ) -> Result<bool, CaseStoreError>;
}
