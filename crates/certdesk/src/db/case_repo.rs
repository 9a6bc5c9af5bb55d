//! Case repository: workers, cases and the ticket → case mapping.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw worker row.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerRow {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub company_id: Option<String>,
    pub created_at: String,
}

impl WorkerRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            company_id: row.get("company_id")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// A raw case row.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRow {
    pub id: String,
    pub worker_id: String,
    pub company_id: Option<String>,
    pub case_type: String,
    pub priority: String,
    pub status: String,
    pub summary: Option<String>,
    pub fitness_status: Option<String>,
    pub next_step: Option<String>,
    pub compliance_status: Option<String>,
    pub current_capacity_kg: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

impl CaseRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            worker_id: row.get("worker_id")?,
            company_id: row.get("company_id")?,
            case_type: row.get("case_type")?,
            priority: row.get("priority")?,
            status: row.get("status")?,
            summary: row.get("summary")?,
            fitness_status: row.get("fitness_status")?,
            next_step: row.get("next_step")?,
            compliance_status: row.get("compliance_status")?,
            current_capacity_kg: row.get("current_capacity_kg")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Columns written back onto a case after a document was filed.
#[derive(Debug, Clone, Default)]
pub struct CaseOutcomeColumns<'a> {
    pub fitness_status: Option<&'a str>,
    pub next_step: &'a str,
    /// `None` leaves the stored compliance status untouched.
    pub compliance_status: Option<&'a str>,
    /// `None` leaves the stored capacity untouched.
    pub current_capacity_kg: Option<f64>,
}

pub fn insert_worker(db: &Database, worker: &WorkerRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO workers (id, name, email, company_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                worker.id,
                worker.name,
                worker.email,
                worker.company_id,
                worker.created_at
            ],
        )?;
        Ok(())
    })
}

/// Finds a worker by email, ignoring case.
pub fn find_worker_by_email(db: &Database, email: &str) -> Result<Option<WorkerRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM workers WHERE email = ?1 COLLATE NOCASE
                 ORDER BY created_at ASC LIMIT 1",
                params![email],
                WorkerRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

pub fn insert_case(db: &Database, case: &CaseRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO cases (id, worker_id, company_id, case_type, priority, status, summary,
             fitness_status, next_step, compliance_status, current_capacity_kg, created_at,
             updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                case.id,
                case.worker_id,
                case.company_id,
                case.case_type,
                case.priority,
                case.status,
                case.summary,
                case.fitness_status,
                case.next_step,
                case.compliance_status,
                case.current_capacity_kg,
                case.created_at,
                case.updated_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find_case(db: &Database, id: &str) -> Result<Option<CaseRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row("SELECT * FROM cases WHERE id = ?1", params![id], CaseRow::from_row)
            .optional()?;
        Ok(row)
    })
}

/// Returns the most recently opened case for a worker that is still open.
pub fn find_open_case_for_worker(
    db: &Database,
    worker_id: &str,
) -> Result<Option<CaseRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM cases WHERE worker_id = ?1 AND status = 'open'
                 ORDER BY created_at DESC LIMIT 1",
                params![worker_id],
                CaseRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Looks up the case a support ticket was previously linked to.
pub fn find_case_by_ticket(db: &Database, ticket_id: &str) -> Result<Option<CaseRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT c.* FROM cases c JOIN ticket_links t ON t.case_id = c.id
                 WHERE t.ticket_id = ?1",
                params![ticket_id],
                CaseRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Links a ticket to a case. Re-linking an already mapped ticket is a no-op.
pub fn link_ticket(
    db: &Database,
    ticket_id: &str,
    case_id: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO ticket_links (ticket_id, case_id, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(ticket_id) DO NOTHING",
            params![ticket_id, case_id, now],
        )?;
        Ok(())
    })
}

/// Writes the derived outcome onto a case. Returns `false` if no such case.
pub fn update_case_outcome(
    db: &Database,
    id: &str,
    outcome: &CaseOutcomeColumns<'_>,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE cases SET
                fitness_status = COALESCE(?2, fitness_status),
                next_step = ?3,
                compliance_status = COALESCE(?4, compliance_status),
                current_capacity_kg = COALESCE(?5, current_capacity_kg),
                updated_at = ?6
             WHERE id = ?1",
            params![
                id,
                outcome.fitness_status,
                outcome.next_step,
                outcome.compliance_status,
                outcome.current_capacity_kg,
                now
            ],
        )?;
        Ok(changed == 1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: &str = "2026-01-01T00:00:00.000000Z";

    fn worker(id: &str, email: &str) -> WorkerRow {
        WorkerRow {
            id: id.to_string(),
            name: "Jane Citizen".to_string(),
            email: Some(email.to_string()),
            company_id: None,
            created_at: T0.to_string(),
        }
    }

    fn case(id: &str, worker_id: &str, created_at: &str) -> CaseRow {
        CaseRow {
            id: id.to_string(),
            worker_id: worker_id.to_string(),
            company_id: None,
            case_type: "injury".to_string(),
            priority: "medium".to_string(),
            status: "open".to_string(),
            summary: Some("Back strain".to_string()),
            fitness_status: None,
            next_step: None,
            compliance_status: None,
            current_capacity_kg: None,
            created_at: created_at.to_string(),
            updated_at: created_at.to_string(),
        }
    }

    #[test]
    fn test_worker_lookup_is_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        insert_worker(&db, &worker("w1", "Jane@Example.com")).unwrap();

        let found = find_worker_by_email(&db, "jane@example.com").unwrap().unwrap();
        assert_eq!(found.id, "w1");
        assert!(find_worker_by_email(&db, "other@example.com").unwrap().is_none());
    }

    #[test]
    fn test_open_case_prefers_newest() {
        let db = Database::open_in_memory().unwrap();
        insert_worker(&db, &worker("w1", "a@example.com")).unwrap();
        insert_case(&db, &case("c-old", "w1", T0)).unwrap();
        insert_case(&db, &case("c-new", "w1", "2026-02-01T00:00:00.000000Z")).unwrap();
        let mut closed = case("c-closed", "w1", "2026-03-01T00:00:00.000000Z");
        closed.status = "closed".to_string();
        insert_case(&db, &closed).unwrap();

        let open = find_open_case_for_worker(&db, "w1").unwrap().unwrap();
        assert_eq!(open.id, "c-new");
    }

    #[test]
    fn test_ticket_link_round_trip() {
        let db = Database::open_in_memory().unwrap();
        insert_worker(&db, &worker("w1", "a@example.com")).unwrap();
        insert_case(&db, &case("c1", "w1", T0)).unwrap();

        assert!(find_case_by_ticket(&db, "500").unwrap().is_none());
        link_ticket(&db, "500", "c1", T0).unwrap();
        link_ticket(&db, "500", "c1", T0).unwrap();
        assert_eq!(find_case_by_ticket(&db, "500").unwrap().unwrap().id, "c1");
    }

    #[test]
    fn test_update_outcome_keeps_unset_columns() {
        let db = Database::open_in_memory().unwrap();
        insert_worker(&db, &worker("w1", "a@example.com")).unwrap();
        let mut c = case("c1", "w1", T0);
        c.compliance_status = Some("compliant".to_string());
        c.current_capacity_kg = Some(15.0);
        insert_case(&db, &c).unwrap();

        let updated = update_case_outcome(
            &db,
            "c1",
            &CaseOutcomeColumns {
                fitness_status: Some("unknown"),
                next_step: "Review certificate",
                compliance_status: None,
                current_capacity_kg: None,
            },
            "2026-01-02T00:00:00.000000Z",
        )
        .unwrap();
        assert!(updated);

        let found = find_case(&db, "c1").unwrap().unwrap();
        assert_eq!(found.next_step.as_deref(), Some("Review certificate"));
        assert_eq!(found.compliance_status.as_deref(), Some("compliant"));
        assert_eq!(found.current_capacity_kg, Some(15.0));
        assert!(!update_case_outcome(&db, "missing", &CaseOutcomeColumns::default(), T0).unwrap());
    }
}
