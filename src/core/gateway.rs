//! SQLite-backed case store with bounded retry
//!
//! This module is the only place that talks to the backing store. It owns:
//! - the schema (tenant-partitioned tables for cases, followups and SLAs)
//! - the retry wrapper for transient lock/timeout failures
//! - the paginated, filtered case query used by every list surface
//! - the bulk deadline summary that avoids N+1 lookups
//!
//! The "at most one open followup per case" invariant is enforced here with
//! a partial unique index, so a second concurrent writer fails its insert
//! instead of both succeeding.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::busdays::parse_date_lenient;
use crate::core::error::{CoreError, StoreError};
use crate::core::identity::{RecordId, TenantId};
use crate::core::sla::SlaEntry;
use crate::core::urgency::UrgencyResult;
use crate::entities::case::{Case, CaseStatus};
use crate::entities::followup::{Followup, StageStatus};

/// Current schema version for migrations
const SCHEMA_VERSION: i32 = 2;

/// Retry budget for transient store failures
pub const MAX_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts
const BACKOFF_BASE: Duration = Duration::from_millis(50);

/// Ceiling for any single call waiting on a locked database
const BUSY_TIMEOUT: Duration = Duration::from_secs(15);

/// Default page size when the caller does not specify one
pub const DEFAULT_PAGE_SIZE: u32 = 20;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS casos (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    student TEXT NOT NULL,
    course TEXT,
    incident_date TEXT NOT NULL,
    incident_time TEXT,
    conduct TEXT,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'Reportado',
    indagacion_start_date TEXT,
    indagacion_due_date TEXT,
    resolution TEXT,
    measure TEXT,
    closed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_casos_tenant ON casos(tenant_id);
CREATE INDEX IF NOT EXISTS idx_casos_tenant_status ON casos(tenant_id, status);

CREATE TABLE IF NOT EXISTS seguimientos (
    id TEXT PRIMARY KEY,
    case_id TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    process_stage TEXT NOT NULL,
    action_type TEXT,
    action_date TEXT NOT NULL,
    due_date TEXT,
    responsible TEXT,
    observations TEXT,
    detail TEXT,
    stage_status TEXT NOT NULL DEFAULT 'pending',
    evidence_refs TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (case_id) REFERENCES casos(id)
);
CREATE INDEX IF NOT EXISTS idx_seguimientos_case ON seguimientos(case_id);
-- one open stage per case, enforced by the store rather than in process
CREATE UNIQUE INDEX IF NOT EXISTS idx_seguimientos_abiertos
    ON seguimientos(tenant_id, case_id) WHERE stage_status = 'pending';

CREATE TABLE IF NOT EXISTS sla_etapas (
    tenant_id TEXT NOT NULL,
    stage_key TEXT NOT NULL,
    days_to_due INTEGER NOT NULL CHECK (days_to_due >= 0),
    updated_at TEXT NOT NULL,
    PRIMARY KEY (tenant_id, stage_key)
);
"#;

/// Run an idempotent store operation, retrying transient failures.
///
/// Bounded at [`MAX_ATTEMPTS`] with a short linear backoff. Only errors the
/// store classified as transient (lock/timeout) are retried; a definitive
/// error payload is terminal on the first occurrence, and exhaustion of the
/// budget surfaces as [`CoreError::RetriesExhausted`].
pub fn with_retry<T, F>(mut op: F) -> Result<T, CoreError>
where
    F: FnMut() -> Result<T, StoreError>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                if attempt >= MAX_ATTEMPTS {
                    return Err(CoreError::RetriesExhausted {
                        attempts: attempt,
                        source: e,
                    });
                }
                std::thread::sleep(BACKOFF_BASE * attempt);
            }
            Err(e) => return Err(CoreError::Store(e)),
        }
    }
}

/// Filters for a page of cases. The tenant scope is mandatory by
/// construction: there is no way to build a query without one.
#[derive(Debug, Clone)]
pub struct CasesQuery {
    tenant_id: TenantId,
    page: u32,
    page_size: u32,
    status: Option<CaseStatus>,
    exclude_status: Option<CaseStatus>,
    search: Option<String>,
}

impl CasesQuery {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            status: None,
            exclude_status: None,
            search: None,
        }
    }

    /// 1-indexed page; values below 1 are clamped to the first page
    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn status(mut self, status: CaseStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn exclude_status(mut self, status: CaseStatus) -> Self {
        self.exclude_status = Some(status);
        self
    }

    /// Case-insensitive substring match across student, course and conduct
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant_id
    }
}

/// One page of cases plus the filtered total (not the page length)
#[derive(Debug)]
pub struct CasesPage {
    pub rows: Vec<Case>,
    pub total: u64,
}

/// The store client. All reads and writes go through [`with_retry`].
pub struct CaseGateway {
    conn: Connection,
}

impl CaseGateway {
    /// Open (and migrate) the store at the given path
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Definitive(e.to_string()))?;
        }

        let conn = Connection::open(path).map_err(StoreError::from)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store; used by tests and ephemeral tooling
    pub fn open_in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::from)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, CoreError> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(StoreError::from)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(StoreError::from)?;

        let gateway = Self { conn };
        with_retry(|| gateway.init_or_migrate())?;
        Ok(gateway)
    }

    fn init_or_migrate(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA_SQL)?;

        let version: Option<i32> = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match version {
            None => {
                self.conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    params![SCHEMA_VERSION],
                )?;
            }
            Some(v) if v < SCHEMA_VERSION => {
                // v1 -> v2: closure fields split into resolution + measure
                if v < 2 && !self.column_exists("casos", "measure")? {
                    self.conn
                        .execute_batch("ALTER TABLE casos ADD COLUMN measure TEXT;")?;
                }
                self.conn.execute(
                    "UPDATE schema_version SET version = ?1",
                    params![SCHEMA_VERSION],
                )?;
            }
            Some(_) => {}
        }
        Ok(())
    }

    fn column_exists(&self, table: &str, column: &str) -> Result<bool, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", table))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(1)?;
            if name == column {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ---- case rows ----

    pub fn insert_case(&self, case: &Case) -> Result<(), CoreError> {
        with_retry(|| {
            self.conn
                .execute(
                    r#"INSERT INTO casos
                       (id, tenant_id, student, course, incident_date, incident_time,
                        conduct, description, status, indagacion_start_date,
                        indagacion_due_date, resolution, measure, closed_at,
                        created_at, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"#,
                    params![
                        case.id.to_string(),
                        case.tenant_id.as_str(),
                        case.student,
                        case.course,
                        date_str(case.incident_date),
                        case.incident_time.map(|t| t.format("%H:%M:%S").to_string()),
                        case.conduct.map(|c| c.to_string()),
                        case.description,
                        case.status.to_string(),
                        case.indagacion_start_date.map(date_str),
                        case.indagacion_due_date.map(date_str),
                        case.resolution,
                        case.measure,
                        case.closed_at.map(|t| t.to_rfc3339()),
                        case.created_at.to_rfc3339(),
                        case.updated_at.to_rfc3339(),
                    ],
                )
                .map_err(StoreError::from)?;
            Ok(())
        })
    }

    /// Update every mutable case field; identity and creation stamp are fixed
    pub fn update_case(&self, case: &Case) -> Result<(), CoreError> {
        with_retry(|| {
            let changed = self
                .conn
                .execute(
                    r#"UPDATE casos SET
                        student = ?2, course = ?3, incident_date = ?4,
                        incident_time = ?5, conduct = ?6, description = ?7,
                        status = ?8, indagacion_start_date = ?9,
                        indagacion_due_date = ?10, resolution = ?11,
                        measure = ?12, closed_at = ?13, updated_at = ?14
                       WHERE id = ?1"#,
                    params![
                        case.id.to_string(),
                        case.student,
                        case.course,
                        date_str(case.incident_date),
                        case.incident_time.map(|t| t.format("%H:%M:%S").to_string()),
                        case.conduct.map(|c| c.to_string()),
                        case.description,
                        case.status.to_string(),
                        case.indagacion_start_date.map(date_str),
                        case.indagacion_due_date.map(date_str),
                        case.resolution,
                        case.measure,
                        case.closed_at.map(|t| t.to_rfc3339()),
                        case.updated_at.to_rfc3339(),
                    ],
                )
                .map_err(StoreError::from)?;

            if changed == 0 {
                return Err(StoreError::Definitive(format!(
                    "el caso '{}' no existe",
                    case.id
                )));
            }
            Ok(())
        })
    }

    pub fn find_case(&self, id: &RecordId) -> Result<Option<Case>, CoreError> {
        with_retry(|| {
            self.conn
                .query_row(
                    &format!("SELECT {} FROM casos WHERE id = ?1", CASE_COLUMNS),
                    params![id.to_string()],
                    row_to_case,
                )
                .optional()
                .map_err(StoreError::from)
        })
    }

    /// Paginated, filtered, tenant-scoped case listing
    pub fn cases_page(&self, query: &CasesQuery) -> Result<CasesPage, CoreError> {
        with_retry(|| {
            let mut where_sql = String::from(" WHERE tenant_id = ?");
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> =
                vec![Box::new(query.tenant_id.as_str().to_string())];

            if let Some(status) = query.status {
                where_sql.push_str(" AND status = ?");
                params_vec.push(Box::new(status.to_string()));
            }

            if let Some(excluded) = query.exclude_status {
                where_sql.push_str(" AND status <> ?");
                params_vec.push(Box::new(excluded.to_string()));
            }

            if let Some(ref search) = query.search {
                where_sql.push_str(" AND (student LIKE ? OR course LIKE ? OR conduct LIKE ?)");
                let pattern = format!("%{}%", search);
                params_vec.push(Box::new(pattern.clone()));
                params_vec.push(Box::new(pattern.clone()));
                params_vec.push(Box::new(pattern));
            }

            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|p| p.as_ref()).collect();

            let total: u64 = self.conn.query_row(
                &format!("SELECT COUNT(*) FROM casos{}", where_sql),
                params_refs.as_slice(),
                |row| row.get(0),
            )?;

            let offset = u64::from(query.page - 1) * u64::from(query.page_size);
            let sql = format!(
                "SELECT {} FROM casos{} ORDER BY created_at DESC LIMIT {} OFFSET {}",
                CASE_COLUMNS, where_sql, query.page_size, offset
            );

            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_refs.as_slice(), row_to_case)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(CasesPage { rows, total })
        })
    }

    /// Bulk deadline summary for a set of cases of one tenant.
    ///
    /// One query instead of a lookup per case: each case is joined with its
    /// open followup, and the effective deadline is the open followup's due
    /// date, falling back to the case's indagación deadline. Ids that match
    /// no case of the tenant are simply absent from the map.
    pub fn plazos_resumen_many(
        &self,
        tenant: &TenantId,
        case_ids: &[RecordId],
    ) -> Result<HashMap<String, UrgencyResult>, CoreError> {
        if case_ids.is_empty() {
            return Ok(HashMap::new());
        }

        with_retry(|| {
            let placeholders = vec!["?"; case_ids.len()].join(", ");
            let sql = format!(
                r#"SELECT c.id, c.indagacion_due_date, s.due_date
                   FROM casos c
                   LEFT JOIN seguimientos s
                     ON s.case_id = c.id AND s.stage_status = 'pending'
                   WHERE c.tenant_id = ? AND c.id IN ({})"#,
                placeholders
            );

            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> =
                vec![Box::new(tenant.as_str().to_string())];
            for id in case_ids {
                params_vec.push(Box::new(id.to_string()));
            }
            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|p| p.as_ref()).collect();

            let today = Local::now().date_naive();
            let mut stmt = self.conn.prepare(&sql)?;
            let mut rows = stmt.query(params_refs.as_slice())?;

            let mut summary = HashMap::new();
            while let Some(row) = rows.next()? {
                let id: String = row.get(0)?;
                let case_due: Option<String> = row.get(1)?;
                let stage_due: Option<String> = row.get(2)?;

                let deadline = stage_due
                    .as_deref()
                    .and_then(parse_date_lenient)
                    .or_else(|| case_due.as_deref().and_then(parse_date_lenient));

                summary.insert(id, UrgencyResult::from_deadline(today, deadline));
            }
            Ok(summary)
        })
    }

    // ---- followup rows ----

    /// Insert a followup. A constraint violation from the open-stage unique
    /// index surfaces as `CoreError::Store` with `is_constraint()` true;
    /// callers decide whether that is an error or an "already started".
    pub fn insert_followup(&self, followup: &Followup) -> Result<(), CoreError> {
        with_retry(|| {
            self.conn
                .execute(
                    r#"INSERT INTO seguimientos
                       (id, case_id, tenant_id, process_stage, action_type,
                        action_date, due_date, responsible, observations, detail,
                        stage_status, evidence_refs, created_at, updated_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"#,
                    params![
                        followup.id.to_string(),
                        followup.case_id.to_string(),
                        followup.tenant_id.as_str(),
                        followup.process_stage,
                        followup.action_type,
                        date_str(followup.action_date),
                        followup.due_date.map(date_str),
                        followup.responsible,
                        followup.observations,
                        followup.detail,
                        followup.stage_status.to_string(),
                        join_refs(&followup.evidence_refs),
                        followup.created_at.to_rfc3339(),
                        followup.updated_at.to_rfc3339(),
                    ],
                )
                .map_err(StoreError::from)?;
            Ok(())
        })
    }

    pub fn find_open_followup(&self, case_id: &RecordId) -> Result<Option<Followup>, CoreError> {
        with_retry(|| {
            self.conn
                .query_row(
                    &format!(
                        "SELECT {} FROM seguimientos WHERE case_id = ?1 AND stage_status = 'pending'",
                        FOLLOWUP_COLUMNS
                    ),
                    params![case_id.to_string()],
                    row_to_followup,
                )
                .optional()
                .map_err(StoreError::from)
        })
    }

    /// Full stage history of a case, oldest first
    pub fn list_followups(&self, case_id: &RecordId) -> Result<Vec<Followup>, CoreError> {
        with_retry(|| {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {} FROM seguimientos WHERE case_id = ?1 ORDER BY created_at ASC",
                FOLLOWUP_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![case_id.to_string()], row_to_followup)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_followup(&self, followup: &Followup) -> Result<(), CoreError> {
        with_retry(|| {
            let changed = self
                .conn
                .execute(
                    r#"UPDATE seguimientos SET
                        action_type = ?2, action_date = ?3, due_date = ?4,
                        responsible = ?5, observations = ?6, detail = ?7,
                        stage_status = ?8, evidence_refs = ?9, updated_at = ?10
                       WHERE id = ?1"#,
                    params![
                        followup.id.to_string(),
                        followup.action_type,
                        date_str(followup.action_date),
                        followup.due_date.map(date_str),
                        followup.responsible,
                        followup.observations,
                        followup.detail,
                        followup.stage_status.to_string(),
                        join_refs(&followup.evidence_refs),
                        followup.updated_at.to_rfc3339(),
                    ],
                )
                .map_err(StoreError::from)?;

            if changed == 0 {
                return Err(StoreError::Definitive(format!(
                    "el seguimiento '{}' no existe",
                    followup.id
                )));
            }
            Ok(())
        })
    }

    // ---- SLA rows ----

    pub fn sla_days(&self, tenant: &TenantId, stage_key: &str) -> Result<Option<u32>, CoreError> {
        with_retry(|| {
            self.conn
                .query_row(
                    "SELECT days_to_due FROM sla_etapas WHERE tenant_id = ?1 AND stage_key = ?2",
                    params![tenant.as_str(), stage_key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(StoreError::from)
        })
    }

    /// Upsert-on-conflict: no separate existence check
    pub fn sla_upsert(
        &self,
        tenant: &TenantId,
        stage_key: &str,
        days_to_due: u32,
    ) -> Result<(), CoreError> {
        with_retry(|| {
            self.conn
                .execute(
                    r#"INSERT INTO sla_etapas (tenant_id, stage_key, days_to_due, updated_at)
                       VALUES (?1, ?2, ?3, ?4)
                       ON CONFLICT(tenant_id, stage_key)
                       DO UPDATE SET days_to_due = excluded.days_to_due,
                                     updated_at = excluded.updated_at"#,
                    params![
                        tenant.as_str(),
                        stage_key,
                        days_to_due,
                        Utc::now().to_rfc3339()
                    ],
                )
                .map_err(StoreError::from)?;
            Ok(())
        })
    }

    /// Seed a stage default without clobbering an existing admin edit
    pub fn sla_seed(
        &self,
        tenant: &TenantId,
        stage_key: &str,
        days_to_due: u32,
    ) -> Result<bool, CoreError> {
        with_retry(|| {
            let inserted = self.conn.execute(
                r#"INSERT OR IGNORE INTO sla_etapas (tenant_id, stage_key, days_to_due, updated_at)
                   VALUES (?1, ?2, ?3, ?4)"#,
                params![
                    tenant.as_str(),
                    stage_key,
                    days_to_due,
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn sla_delete(&self, tenant: &TenantId, stage_key: &str) -> Result<bool, CoreError> {
        with_retry(|| {
            let deleted = self.conn.execute(
                "DELETE FROM sla_etapas WHERE tenant_id = ?1 AND stage_key = ?2",
                params![tenant.as_str(), stage_key],
            )?;
            Ok(deleted > 0)
        })
    }

    pub fn sla_list(&self, tenant: &TenantId) -> Result<Vec<SlaEntry>, CoreError> {
        with_retry(|| {
            let mut stmt = self.conn.prepare(
                r#"SELECT stage_key, days_to_due, updated_at
                   FROM sla_etapas WHERE tenant_id = ?1 ORDER BY stage_key ASC"#,
            )?;
            let rows = stmt
                .query_map(params![tenant.as_str()], |row| {
                    Ok(SlaEntry {
                        stage_key: row.get(0)?,
                        days_to_due: row.get(1)?,
                        updated_at: parse_datetime(row.get::<_, String>(2)?),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

const CASE_COLUMNS: &str = "id, tenant_id, student, course, incident_date, incident_time, \
     conduct, description, status, indagacion_start_date, indagacion_due_date, \
     resolution, measure, closed_at, created_at, updated_at";

const FOLLOWUP_COLUMNS: &str = "id, case_id, tenant_id, process_stage, action_type, action_date, \
     due_date, responsible, observations, detail, stage_status, evidence_refs, \
     created_at, updated_at";

fn row_to_case(row: &rusqlite::Row<'_>) -> rusqlite::Result<Case> {
    let id = parse_record_id(row, 0)?;
    let tenant_id = parse_tenant_id(row, 1)?;

    Ok(Case {
        id,
        tenant_id,
        student: row.get(2)?,
        course: row.get(3)?,
        incident_date: row
            .get::<_, String>(4)
            .map(|s| parse_date_lenient(&s))?
            .unwrap_or_default(),
        incident_time: row
            .get::<_, Option<String>>(5)?
            .and_then(|s| NaiveTime::parse_from_str(&s, "%H:%M:%S").ok()),
        conduct: row.get::<_, Option<String>>(6)?.and_then(|s| s.parse().ok()),
        description: row.get(7)?,
        status: row
            .get::<_, String>(8)?
            .parse::<CaseStatus>()
            .unwrap_or_default(),
        indagacion_start_date: row
            .get::<_, Option<String>>(9)?
            .and_then(|s| parse_date_lenient(&s)),
        indagacion_due_date: row
            .get::<_, Option<String>>(10)?
            .and_then(|s| parse_date_lenient(&s)),
        resolution: row.get(11)?,
        measure: row.get(12)?,
        closed_at: row.get::<_, Option<String>>(13)?.map(parse_datetime),
        created_at: parse_datetime(row.get::<_, String>(14)?),
        updated_at: parse_datetime(row.get::<_, String>(15)?),
    })
}

fn row_to_followup(row: &rusqlite::Row<'_>) -> rusqlite::Result<Followup> {
    let id = parse_record_id(row, 0)?;
    let case_id = parse_record_id(row, 1)?;
    let tenant_id = parse_tenant_id(row, 2)?;

    Ok(Followup {
        id,
        case_id,
        tenant_id,
        process_stage: row.get(3)?,
        action_type: row.get(4)?,
        action_date: row
            .get::<_, String>(5)
            .map(|s| parse_date_lenient(&s))?
            .unwrap_or_default(),
        due_date: row
            .get::<_, Option<String>>(6)?
            .and_then(|s| parse_date_lenient(&s)),
        responsible: row.get(7)?,
        observations: row.get(8)?,
        detail: row.get(9)?,
        stage_status: row
            .get::<_, String>(10)?
            .parse::<StageStatus>()
            .unwrap_or_default(),
        evidence_refs: split_refs(row.get::<_, Option<String>>(11)?),
        created_at: parse_datetime(row.get::<_, String>(12)?),
        updated_at: parse_datetime(row.get::<_, String>(13)?),
    })
}

fn parse_record_id(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<RecordId> {
    let raw: String = row.get(idx)?;
    RecordId::parse(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_tenant_id(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<TenantId> {
    let raw: String = row.get(idx)?;
    TenantId::new(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn date_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn join_refs(refs: &[String]) -> Option<String> {
    if refs.is_empty() {
        None
    } else {
        Some(refs.join(","))
    }
}

fn split_refs(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .filter(|r| !r.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::case::Case;

    fn tenant(name: &str) -> TenantId {
        TenantId::new(name).unwrap()
    }

    fn seed_case(gateway: &CaseGateway, tenant_name: &str, student: &str) -> Case {
        let case = Case::new(
            tenant(tenant_name),
            student.to_string(),
            NaiveDate::from_ymd_opt(2024, 3, 18).unwrap(),
        );
        gateway.insert_case(&case).unwrap();
        case
    }

    #[test]
    fn test_insert_and_find_case() {
        let gateway = CaseGateway::open_in_memory().unwrap();
        let case = seed_case(&gateway, "t1", "Ana Pérez");

        let found = gateway.find_case(&case.id).unwrap().unwrap();
        assert_eq!(found.id, case.id);
        assert_eq!(found.student, "Ana Pérez");
        assert_eq!(found.status, CaseStatus::Reportado);
    }

    #[test]
    fn test_find_missing_case_is_none() {
        let gateway = CaseGateway::open_in_memory().unwrap();
        let id = RecordId::new(crate::core::identity::RecordPrefix::Caso);
        assert!(gateway.find_case(&id).unwrap().is_none());
    }

    #[test]
    fn test_pagination_window_and_total() {
        let gateway = CaseGateway::open_in_memory().unwrap();
        for i in 0..15 {
            let mut case = seed_case(&gateway, "t1", &format!("Estudiante {}", i));
            case.status = CaseStatus::Cerrado;
            case.closed_at = Some(Utc::now());
            gateway.update_case(&case).unwrap();
        }

        let query = CasesQuery::new(tenant("t1"))
            .status(CaseStatus::Cerrado)
            .page(2)
            .page_size(10);
        let page = gateway.cases_page(&query).unwrap();

        assert_eq!(page.total, 15);
        assert_eq!(page.rows.len(), 5);
    }

    #[test]
    fn test_page_invariants_hold_for_every_page() {
        let gateway = CaseGateway::open_in_memory().unwrap();
        for i in 0..7 {
            seed_case(&gateway, "t1", &format!("Estudiante {}", i));
        }

        for page_number in 1..=4 {
            let query = CasesQuery::new(tenant("t1")).page(page_number).page_size(3);
            let page = gateway.cases_page(&query).unwrap();
            assert!(page.rows.len() <= 3);
            assert!(page.rows.len() as u64 <= page.total);
            assert_eq!(page.total, 7);
        }
    }

    #[test]
    fn test_tenant_isolation_in_listing() {
        let gateway = CaseGateway::open_in_memory().unwrap();
        seed_case(&gateway, "t1", "Ana");
        seed_case(&gateway, "t2", "Benito");

        let page = gateway.cases_page(&CasesQuery::new(tenant("t1"))).unwrap();
        assert_eq!(page.total, 1);
        assert!(page.rows.iter().all(|c| c.tenant_id.as_str() == "t1"));
    }

    #[test]
    fn test_search_matches_student_course_conduct() {
        let gateway = CaseGateway::open_in_memory().unwrap();
        let mut case = seed_case(&gateway, "t1", "Carla Soto");
        case.course = Some("8B".to_string());
        gateway.update_case(&case).unwrap();
        seed_case(&gateway, "t1", "Diego Rojas");

        let by_student = gateway
            .cases_page(&CasesQuery::new(tenant("t1")).search("carla"))
            .unwrap();
        assert_eq!(by_student.total, 1);

        let by_course = gateway
            .cases_page(&CasesQuery::new(tenant("t1")).search("8B"))
            .unwrap();
        assert_eq!(by_course.total, 1);
    }

    #[test]
    fn test_exclude_status_filter() {
        let gateway = CaseGateway::open_in_memory().unwrap();
        let mut closed = seed_case(&gateway, "t1", "Ana");
        closed.status = CaseStatus::Cerrado;
        closed.closed_at = Some(Utc::now());
        gateway.update_case(&closed).unwrap();
        seed_case(&gateway, "t1", "Benito");

        let open_only = gateway
            .cases_page(&CasesQuery::new(tenant("t1")).exclude_status(CaseStatus::Cerrado))
            .unwrap();
        assert_eq!(open_only.total, 1);
        assert_eq!(open_only.rows[0].student, "Benito");
    }

    #[test]
    fn test_open_followup_unique_index() {
        let gateway = CaseGateway::open_in_memory().unwrap();
        let case = seed_case(&gateway, "t1", "Ana");

        let first = Followup::new(
            case.id.clone(),
            tenant("t1"),
            "indagacion".to_string(),
            NaiveDate::from_ymd_opt(2024, 3, 18).unwrap(),
        );
        gateway.insert_followup(&first).unwrap();

        let second = Followup::new(
            case.id.clone(),
            tenant("t1"),
            "citacion".to_string(),
            NaiveDate::from_ymd_opt(2024, 3, 19).unwrap(),
        );
        let err = gateway.insert_followup(&second).unwrap_err();
        match err {
            CoreError::Store(store_err) => assert!(store_err.is_constraint()),
            other => panic!("se esperaba violación de unicidad, no {:?}", other),
        }
    }

    #[test]
    fn test_completed_followup_frees_the_slot() {
        let gateway = CaseGateway::open_in_memory().unwrap();
        let case = seed_case(&gateway, "t1", "Ana");

        let mut first = Followup::new(
            case.id.clone(),
            tenant("t1"),
            "indagacion".to_string(),
            NaiveDate::from_ymd_opt(2024, 3, 18).unwrap(),
        );
        gateway.insert_followup(&first).unwrap();

        first.stage_status = StageStatus::Done;
        gateway.update_followup(&first).unwrap();
        assert!(gateway.find_open_followup(&case.id).unwrap().is_none());

        let second = Followup::new(
            case.id.clone(),
            tenant("t1"),
            "citacion".to_string(),
            NaiveDate::from_ymd_opt(2024, 3, 25).unwrap(),
        );
        gateway.insert_followup(&second).unwrap();
        assert_eq!(gateway.list_followups(&case.id).unwrap().len(), 2);
    }

    #[test]
    fn test_sla_roundtrip_and_delete() {
        let gateway = CaseGateway::open_in_memory().unwrap();
        let t1 = tenant("t1");

        gateway.sla_upsert(&t1, "indagacion", 5).unwrap();
        assert_eq!(gateway.sla_days(&t1, "indagacion").unwrap(), Some(5));

        gateway.sla_upsert(&t1, "indagacion", 8).unwrap();
        assert_eq!(gateway.sla_days(&t1, "indagacion").unwrap(), Some(8));

        assert!(gateway.sla_delete(&t1, "indagacion").unwrap());
        assert_eq!(gateway.sla_days(&t1, "indagacion").unwrap(), None);
        assert!(!gateway.sla_delete(&t1, "indagacion").unwrap());
    }

    #[test]
    fn test_sla_seed_does_not_clobber() {
        let gateway = CaseGateway::open_in_memory().unwrap();
        let t1 = tenant("t1");

        gateway.sla_upsert(&t1, "indagacion", 9).unwrap();
        assert!(!gateway.sla_seed(&t1, "indagacion", 5).unwrap());
        assert_eq!(gateway.sla_days(&t1, "indagacion").unwrap(), Some(9));

        assert!(gateway.sla_seed(&t1, "citacion", 3).unwrap());
        assert_eq!(gateway.sla_days(&t1, "citacion").unwrap(), Some(3));
    }

    #[test]
    fn test_sla_is_tenant_scoped() {
        let gateway = CaseGateway::open_in_memory().unwrap();
        gateway.sla_upsert(&tenant("t1"), "indagacion", 5).unwrap();
        assert_eq!(
            gateway.sla_days(&tenant("t2"), "indagacion").unwrap(),
            None
        );
    }

    #[test]
    fn test_plazos_resumen_many_prefers_open_stage_deadline() {
        let gateway = CaseGateway::open_in_memory().unwrap();
        let today = Local::now().date_naive();

        let mut case = seed_case(&gateway, "t1", "Ana");
        case.indagacion_due_date = Some(today + chrono::Duration::days(30));
        gateway.update_case(&case).unwrap();

        let mut followup = Followup::new(
            case.id.clone(),
            tenant("t1"),
            "indagacion".to_string(),
            today,
        );
        followup.due_date = Some(today);
        gateway.insert_followup(&followup).unwrap();

        let summary = gateway
            .plazos_resumen_many(&tenant("t1"), &[case.id.clone()])
            .unwrap();
        let result = summary.get(&case.id.to_string()).unwrap();
        assert_eq!(result.alerta_urgencia, "VENCE HOY");
        assert_eq!(result.dias_restantes, Some(0));
    }

    #[test]
    fn test_plazos_resumen_many_without_deadline() {
        let gateway = CaseGateway::open_in_memory().unwrap();
        let case = seed_case(&gateway, "t1", "Ana");

        let summary = gateway
            .plazos_resumen_many(&tenant("t1"), &[case.id.clone()])
            .unwrap();
        let result = summary.get(&case.id.to_string()).unwrap();
        assert_eq!(result.alerta_urgencia, "SIN PLAZO");
        assert_eq!(result.dias_restantes, None);
    }

    #[test]
    fn test_plazos_resumen_many_is_tenant_scoped() {
        let gateway = CaseGateway::open_in_memory().unwrap();
        let case = seed_case(&gateway, "t1", "Ana");

        let summary = gateway
            .plazos_resumen_many(&tenant("t2"), &[case.id.clone()])
            .unwrap();
        assert!(summary.is_empty());
    }

    #[test]
    fn test_with_retry_bounded_on_transient() {
        let mut calls = 0;
        let result: Result<(), CoreError> = with_retry(|| {
            calls += 1;
            Err(StoreError::Busy("database is locked".to_string()))
        });

        assert_eq!(calls, MAX_ATTEMPTS);
        assert!(matches!(
            result,
            Err(CoreError::RetriesExhausted { attempts, .. }) if attempts == MAX_ATTEMPTS
        ));
    }

    #[test]
    fn test_with_retry_does_not_retry_definitive() {
        let mut calls = 0;
        let result: Result<(), CoreError> = with_retry(|| {
            calls += 1;
            Err(StoreError::Definitive("columna inexistente".to_string()))
        });

        assert_eq!(calls, 1);
        assert!(matches!(result, Err(CoreError::Store(_))));
    }

    #[test]
    fn test_with_retry_recovers_after_transient() {
        let mut calls = 0;
        let result = with_retry(|| {
            calls += 1;
            if calls < 2 {
                Err(StoreError::Busy("database is locked".to_string()))
            } else {
                Ok(42)
            }
        });

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 2);
    }
}
