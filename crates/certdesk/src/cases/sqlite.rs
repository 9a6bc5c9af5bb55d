use async_trait::async_trait;

use crate::db::case_repo::{self, CaseOutcomeColumns, CaseRow, WorkerRow};
use crate::db::{now_timestamp, Database};

use super::{
    CasePriority, CaseOutcome, CaseRecord, CaseStore, CaseStoreError, NewCase, NewWorker,
    WorkerRecord,
};

/// [`CaseStore`] backed by the local SQLite database.
#[derive(Clone)]
pub struct SqliteCaseStore {
    db: Database,
}

impl SqliteCaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn case_from_row(row: CaseRow) -> CaseRecord {
    CaseRecord {
        priority: CasePriority::parse(&row.priority).unwrap_or(CasePriority::Medium),
        id: row.id,
        worker_id: row.worker_id,
        company_id: row.company_id,
        case_type: row.case_type,
        status: row.status,
        summary: row.summary,
        fitness_status: row.fitness_status,
        next_step: row.next_step,
        compliance_status: row.compliance_status,
        current_capacity_kg: row.current_capacity_kg,
    }
}

fn worker_from_row(row: WorkerRow) -> WorkerRecord {
    WorkerRecord {
        id: row.id,
        name: row.name,
        email: row.email,
        company_id: row.company_id,
    }
}

#[async_trait]
impl CaseStore for SqliteCaseStore {
    async fn get_case(&self, case_id: &str) -> Result<Option<CaseRecord>, CaseStoreError> {
        Ok(case_repo::find_case(&self.db, case_id)?.map(case_from_row))
    }

    async fn find_case_by_ticket(
        &self,
        ticket_id: &str,
    ) -> Result<Option<CaseRecord>, CaseStoreError> {
        Ok(case_repo::find_case_by_ticket(&self.db, ticket_id)?.map(case_from_row))
    }

    async fn find_worker_by_email(
        &self,
        email: &str,
    ) -> Result<Option<WorkerRecord>, CaseStoreError> {
        Ok(case_repo::find_worker_by_email(&self.db, email)?.map(worker_from_row))
    }

    async fn find_open_case_for_worker(
        &self,
        worker_id: &str,
    ) -> Result<Option<CaseRecord>, CaseStoreError> {
        Ok(case_repo::find_open_case_for_worker(&self.db, worker_id)?.map(case_from_row))
    }

    async fn create_worker(&self, worker: NewWorker) -> Result<WorkerRecord, CaseStoreError> {
        let row = WorkerRow {
            id: uuid::Uuid::new_v4().to_string(),
            name: worker.name,
            email: worker.email,
            company_id: worker.company_id,
            created_at: now_timestamp(),
        };
        case_repo::insert_worker(&self.db, &row)?;
        Ok(worker_from_row(row))
    }

    async fn create_case(&self, case: NewCase) -> Result<CaseRecord, CaseStoreError> {
        let now = now_timestamp();
        let row = CaseRow {
            id: uuid::Uuid::new_v4().to_string(),
            worker_id: case.worker_id,
            company_id: case.company_id,
            case_type: case.case_type,
            priority: case.priority.as_str().to_string(),
            status: "open".to_string(),
            summary: case.summary,
            fitness_status: None,
            next_step: None,
            compliance_status: None,
            current_capacity_kg: None,
            created_at: now.clone(),
            updated_at: now,
        };
        case_repo::insert_case(&self.db, &row)?;
        Ok(case_from_row(row))
    }

    async fn link_ticket(&self, ticket_id: &str, case_id: &str) -> Result<(), CaseStoreError> {
        case_repo::link_ticket(&self.db, ticket_id, case_id, &now_timestamp())?;
        Ok(())
    }

    async fn update_case(
        &self,
        case_id: &str,
        outcome: &CaseOutcome,
    ) -> Result<bool, CaseStoreError> {
        let columns = CaseOutcomeColumns {
            fitness_status: outcome.fitness_status.as_deref(),
            next_step: &outcome.next_step,
            compliance_status: outcome.compliance_status.as_deref(),
            current_capacity_kg: outcome.current_capacity_kg,
        };
        Ok(case_repo::update_case_outcome(
            &self.db,
            case_id,
            &columns,
            &now_timestamp(),
        )?)
    }
}
