//! Prescription repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist validated prescriptions and assign their generated fields.
//! - Answer id lookups and filtered, paginated listings.
//!
//! # Invariants
//! - `prescription_id` comes from `AUTOINCREMENT` inside the insert statement,
//!   so ids are unique and never reused even under concurrent writers.
//! - Listing order is always `prescription_id ASC`.
//! - Filters combine with AND; an absent filter matches every row.
//! - `list_page` reads the count and the slice inside one transaction.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::prescription::{NewPrescription, Prescription, PrescriptionId};
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const PRESCRIPTION_SELECT_SQL: &str = "SELECT
    prescription_id,
    appointment_id,
    patient_id,
    doctor_id,
    medication,
    dosage,
    days,
    issued_at
FROM prescriptions";

const REQUIRED_COLUMNS: [&str; 8] = [
    "prescription_id",
    "appointment_id",
    "patient_id",
    "doctor_id",
    "medication",
    "dosage",
    "days",
    "issued_at",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for prescription persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(PrescriptionId),
    InvalidData(String),
    /// Connection has not been migrated to the schema this binary expects.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "prescription not found: {id}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted prescription data: {message}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{table}.{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Row filter shared by list and count queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrescriptionFilter {
    pub patient_id: Option<i64>,
    pub appointment_id: Option<i64>,
}

impl PrescriptionFilter {
    pub fn for_patient(patient_id: i64) -> Self {
        Self {
            patient_id: Some(patient_id),
            ..Self::default()
        }
    }

    pub fn for_appointment(appointment_id: i64) -> Self {
        Self {
            appointment_id: Some(appointment_id),
            ..Self::default()
        }
    }
}

/// Query options for listing prescriptions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrescriptionListQuery {
    pub filter: PrescriptionFilter,
    /// `None` returns every row after `offset`.
    pub limit: Option<u32>,
    pub offset: u64,
}

/// Persistence contract for the prescription store.
pub trait PrescriptionRepository {
    /// Inserts one record, returning it with generated fields populated.
    fn create_prescription(&self, input: &NewPrescription) -> RepoResult<Prescription>;
    fn get_prescription(&self, id: PrescriptionId) -> RepoResult<Option<Prescription>>;
    fn list_prescriptions(&self, query: &PrescriptionListQuery) -> RepoResult<Vec<Prescription>>;
    fn count_prescriptions(&self, filter: &PrescriptionFilter) -> RepoResult<u64>;
    /// Returns the filter's total match count together with the requested
    /// slice, both read from one snapshot.
    fn list_page(&self, query: &PrescriptionListQuery) -> RepoResult<(u64, Vec<Prescription>)>;
}

/// SQLite-backed prescription repository.
pub struct SqlitePrescriptionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePrescriptionRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when `PRAGMA user_version` is not the
    ///   latest known migration.
    /// - `MissingRequiredTable` / `MissingRequiredColumn` when the schema was
    ///   tampered with.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl PrescriptionRepository for SqlitePrescriptionRepository<'_> {
    fn create_prescription(&self, input: &NewPrescription) -> RepoResult<Prescription> {
        // Stored as epoch milliseconds; truncate so the returned record
        // equals what later reads decode.
        let issued_at = Utc::now().trunc_subsecs(3);
        let prescription_id: PrescriptionId = self.conn.query_row(
            "INSERT INTO prescriptions (
                appointment_id,
                patient_id,
                doctor_id,
                medication,
                dosage,
                days,
                issued_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING prescription_id;",
            params![
                input.appointment_id(),
                input.patient_id(),
                input.doctor_id(),
                input.medication(),
                input.dosage(),
                input.days(),
                issued_at.timestamp_millis(),
            ],
            |row| row.get(0),
        )?;

        Ok(input.clone().into_prescription(prescription_id, issued_at))
    }

    fn get_prescription(&self, id: PrescriptionId) -> RepoResult<Option<Prescription>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PRESCRIPTION_SELECT_SQL}
             WHERE prescription_id = ?1;"
        ))?;

        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_prescription_row(row)?));
        }

        Ok(None)
    }

    fn list_prescriptions(&self, query: &PrescriptionListQuery) -> RepoResult<Vec<Prescription>> {
        let (where_sql, mut bind_values) = filter_clause(&query.filter);
        let mut sql =
            format!("{PRESCRIPTION_SELECT_SQL}{where_sql} ORDER BY prescription_id ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1");
        }
        if query.offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(offset_to_sql(query.offset)?));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut prescriptions = Vec::new();

        while let Some(row) = rows.next()? {
            prescriptions.push(parse_prescription_row(row)?);
        }

        Ok(prescriptions)
    }

    fn count_prescriptions(&self, filter: &PrescriptionFilter) -> RepoResult<u64> {
        let (where_sql, bind_values) = filter_clause(filter);
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM prescriptions{where_sql};"),
            params_from_iter(bind_values),
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count `{count}`")))
    }

    fn list_page(&self, query: &PrescriptionListQuery) -> RepoResult<(u64, Vec<Prescription>)> {
        // The shared lock taken by the count is held until the slice is read.
        let tx = self.conn.unchecked_transaction()?;
        let total = self.count_prescriptions(&query.filter)?;
        let items = self.list_prescriptions(query)?;
        tx.commit()?;
        Ok((total, items))
    }
}

fn filter_clause(filter: &PrescriptionFilter) -> (String, Vec<Value>) {
    let mut sql = String::from(" WHERE 1 = 1");
    let mut bind_values = Vec::new();

    if let Some(patient_id) = filter.patient_id {
        sql.push_str(" AND patient_id = ?");
        bind_values.push(Value::Integer(patient_id));
    }

    if let Some(appointment_id) = filter.appointment_id {
        sql.push_str(" AND appointment_id = ?");
        bind_values.push(Value::Integer(appointment_id));
    }

    (sql, bind_values)
}

fn offset_to_sql(offset: u64) -> RepoResult<i64> {
    i64::try_from(offset)
        .map_err(|_| RepoError::InvalidData(format!("offset `{offset}` exceeds SQLite range")))
}

fn parse_prescription_row(row: &Row<'_>) -> RepoResult<Prescription> {
    let issued_at_ms: i64 = row.get("issued_at")?;
    let issued_at = DateTime::<Utc>::from_timestamp_millis(issued_at_ms).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid issued_at value `{issued_at_ms}` in prescriptions.issued_at"
        ))
    })?;
    let prescription = Prescription {
        prescription_id: row.get("prescription_id")?,
        appointment_id: row.get("appointment_id")?,
        patient_id: row.get("patient_id")?,
        doctor_id: row.get("doctor_id")?,
        medication: row.get("medication")?,
        dosage: row.get("dosage")?,
        days: row.get("days")?,
        issued_at,
    };
    prescription.validate().map_err(|err| {
        RepoError::InvalidData(format!(
            "row {} in prescriptions: {err}",
            prescription.prescription_id
        ))
    })?;
    Ok(prescription)
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "prescriptions")? {
        return Err(RepoError::MissingRequiredTable("prescriptions"));
    }

    for column in REQUIRED_COLUMNS {
        if !table_has_column(conn, "prescriptions", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "prescriptions",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
