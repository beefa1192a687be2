// src/store/pg.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{
    AppointmentFilter, AppointmentStore, DirectoryStore, QueueFilter, QueueStore, StoreError,
};
use crate::models::{
    Appointment, AppointmentStatus, NewAppointment, NewPatient, NewQueueEntry, NewStaff, Patient,
    QueueEntry, QueueStatus, Staff,
};

// SQLSTATE codes we translate into domain errors.
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const EXCLUSION_VIOLATION: &str = "23P01";

const ACTIVE_QUEUE_INDEX: &str = "queue_entry_one_active_per_patient";

const APPOINTMENT_COLUMNS: &str = r#"
    appointment_id, patient_id, practitioner_id, start_at, end_at,
    status, notes, created_at, updated_at
"#;

const QUEUE_COLUMNS: &str = r#"
    queue_entry_id, patient_id, assigned_staff_id, appointment_id, status,
    check_in_time, started_at, completed_at, notes, created_at, updated_at
"#;

const APPOINTMENT_EXISTS: &str =
    "SELECT EXISTS (SELECT 1 FROM appointment WHERE appointment_id = $1)";
const QUEUE_ENTRY_EXISTS: &str =
    "SELECT EXISTS (SELECT 1 FROM queue_entry WHERE queue_entry_id = $1)";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        Ok(self.pool.begin().await?)
    }
}

fn map_write_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        match db.code().as_deref() {
            Some(EXCLUSION_VIOLATION) => return StoreError::AppointmentConflict,
            Some(UNIQUE_VIOLATION) if db.constraint() == Some(ACTIVE_QUEUE_INDEX) => {
                return StoreError::AlreadyQueued;
            }
            Some(FOREIGN_KEY_VIOLATION) => return StoreError::NotFound("referenced record"),
            _ => {}
        }
    }
    StoreError::Database(e)
}

/// Serializes slot writes for one practitioner until the transaction ends.
async fn lock_practitioner(
    tx: &mut Transaction<'static, Postgres>,
    practitioner_id: Uuid,
) -> Result<(), StoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(practitioner_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Serializes queue writes for one patient until the transaction ends.
async fn lock_patient_queue(
    tx: &mut Transaction<'static, Postgres>,
    patient_id: Uuid,
) -> Result<(), StoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 1))")
        .bind(patient_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn conflict_exists<'e, E>(
    executor: E,
    practitioner_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude: Option<Uuid>,
) -> Result<bool, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    // [s1,e1) and [s2,e2) overlap iff s1 < e2 AND s2 < e1.
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
          SELECT 1
          FROM appointment
          WHERE practitioner_id = $1
            AND status IN (0, 1)
            AND start_at < $3
            AND end_at   > $2
            AND ($4::uuid IS NULL OR appointment_id <> $4)
        )
        "#,
    )
    .bind(practitioner_id)
    .bind(start)
    .bind(end)
    .bind(exclude)
    .fetch_one(executor)
    .await
}

async fn active_entry_exists<'e, E>(
    executor: E,
    patient_id: Uuid,
    exclude: Option<Uuid>,
) -> Result<bool, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
          SELECT 1
          FROM queue_entry
          WHERE patient_id = $1
            AND status IN (0, 1)
            AND ($2::uuid IS NULL OR queue_entry_id <> $2)
        )
        "#,
    )
    .bind(patient_id)
    .bind(exclude)
    .fetch_one(executor)
    .await
}

/// Makes `%` and `_` in user input match themselves.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Distinguishes a missing row from a version mismatch after a guarded UPDATE.
async fn row_exists<'e, E>(executor: E, sql: &'static str, id: Uuid) -> Result<bool, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar::<_, bool>(sql)
        .bind(id)
        .fetch_one(executor)
        .await
}

/* ============================================================
   Directory
   ============================================================ */

#[async_trait]
impl DirectoryStore for PgStore {
    async fn insert_patient(&self, new: NewPatient) -> Result<Patient, StoreError> {
        let row = sqlx::query_as::<_, Patient>(
            r#"
            INSERT INTO patient (patient_id, first_name, last_name, phone, email, birthday)
            VALUES ($1,$2,$3,$4,$5,$6)
            RETURNING patient_id, first_name, last_name, phone, email, birthday, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(new.phone.as_deref())
        .bind(new.email.as_deref())
        .bind(new.birthday)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(row)
    }

    async fn patient(&self, patient_id: Uuid) -> Result<Option<Patient>, StoreError> {
        let row = sqlx::query_as::<_, Patient>(
            r#"
            SELECT patient_id, first_name, last_name, phone, email, birthday, created_at, updated_at
            FROM patient
            WHERE patient_id = $1
            "#,
        )
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn patients(&self, search: Option<&str>, limit: usize) -> Result<Vec<Patient>, StoreError> {
        let like = search.map(|s| format!("%{}%", escape_like(s)));
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query_as::<_, Patient>(
            r#"
            SELECT patient_id, first_name, last_name, phone, email, birthday, created_at, updated_at
            FROM patient
            WHERE $1::text IS NULL
               OR first_name ILIKE $1 ESCAPE '\'
               OR last_name ILIKE $1 ESCAPE '\'
               OR (first_name || ' ' || last_name) ILIKE $1 ESCAPE '\'
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(like)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn insert_staff(&self, new: NewStaff) -> Result<Staff, StoreError> {
        let row = sqlx::query_as::<_, Staff>(
            r#"
            INSERT INTO staff (staff_id, display_name, role)
            VALUES ($1,$2,$3)
            RETURNING staff_id, display_name, role, is_active, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.display_name)
        .bind(new.role)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(row)
    }

    async fn staff_member(&self, staff_id: Uuid) -> Result<Option<Staff>, StoreError> {
        let row = sqlx::query_as::<_, Staff>(
            r#"
            SELECT staff_id, display_name, role, is_active, created_at, updated_at
            FROM staff
            WHERE staff_id = $1
            "#,
        )
        .bind(staff_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn staff(&self, include_inactive: bool) -> Result<Vec<Staff>, StoreError> {
        let rows = sqlx::query_as::<_, Staff>(
            r#"
            SELECT staff_id, display_name, role, is_active, created_at, updated_at
            FROM staff
            WHERE $1 OR is_active = true
            ORDER BY display_name ASC
            "#,
        )
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

/* ============================================================
   Appointments
   ============================================================ */

#[async_trait]
impl AppointmentStore for PgStore {
    async fn appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointment WHERE appointment_id = $1");
        let row = sqlx::query_as::<_, Appointment>(&sql)
            .bind(appointment_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let sql = format!(
            r#"
            SELECT {APPOINTMENT_COLUMNS}
            FROM appointment
            WHERE ($1::uuid IS NULL OR practitioner_id = $1)
              AND ($2::uuid IS NULL OR patient_id = $2)
              AND ($3::smallint IS NULL OR status = $3)
              AND ($4::timestamptz IS NULL OR start_at >= $4)
              AND ($5::timestamptz IS NULL OR start_at <  $5)
            ORDER BY start_at ASC, created_at ASC
            "#
        );
        let rows = sqlx::query_as::<_, Appointment>(&sql)
            .bind(filter.practitioner_id)
            .bind(filter.patient_id)
            .bind(filter.status)
            .bind(filter.from)
            .bind(filter.to)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn has_conflict(
        &self,
        practitioner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<bool, StoreError> {
        Ok(conflict_exists(&self.pool, practitioner_id, start, end, exclude).await?)
    }

    async fn insert_appointment(&self, new: NewAppointment) -> Result<Appointment, StoreError> {
        let mut tx = self.begin().await?;

        if let Some(practitioner_id) = new.practitioner_id {
            lock_practitioner(&mut tx, practitioner_id).await?;
            if conflict_exists(&mut *tx, practitioner_id, new.start_at, new.end_at, None).await? {
                return Err(StoreError::AppointmentConflict);
            }
        }

        let sql = format!(
            r#"
            INSERT INTO appointment (appointment_id, patient_id, practitioner_id, start_at, end_at, status, notes)
            VALUES ($1,$2,$3,$4,$5,$6,$7)
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Appointment>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.patient_id)
            .bind(new.practitioner_id)
            .bind(new.start_at)
            .bind(new.end_at)
            .bind(AppointmentStatus::Scheduled)
            .bind(new.notes.as_deref())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_write_error)?;

        tx.commit().await?;
        Ok(row)
    }

    async fn save_appointment(&self, appointment: &Appointment) -> Result<Appointment, StoreError> {
        let mut tx = self.begin().await?;

        if let (Some(practitioner_id), true) = (appointment.practitioner_id, appointment.status.is_active()) {
            lock_practitioner(&mut tx, practitioner_id).await?;
            if conflict_exists(
                &mut *tx,
                practitioner_id,
                appointment.start_at,
                appointment.end_at,
                Some(appointment.appointment_id),
            )
            .await?
            {
                return Err(StoreError::AppointmentConflict);
            }
        }

        let sql = format!(
            r#"
            UPDATE appointment
            SET
              practitioner_id = $2,
              start_at = $3,
              end_at   = $4,
              status   = $5,
              notes    = $6,
              updated_at = GREATEST(now(), updated_at + interval '1 microsecond')
            WHERE appointment_id = $1
              AND updated_at = $7
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Appointment>(&sql)
            .bind(appointment.appointment_id)
            .bind(appointment.practitioner_id)
            .bind(appointment.start_at)
            .bind(appointment.end_at)
            .bind(appointment.status)
            .bind(appointment.notes.as_deref())
            .bind(appointment.updated_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_write_error)?;

        let Some(row) = row else {
            let exists = row_exists(&mut *tx, APPOINTMENT_EXISTS, appointment.appointment_id).await?;
            return Err(if exists {
                StoreError::Stale("appointment")
            } else {
                StoreError::NotFound("appointment")
            });
        };

        tx.commit().await?;
        Ok(row)
    }

    async fn delete_appointment(&self, appointment_id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM appointment WHERE appointment_id = $1")
            .bind(appointment_id)
            .execute(&self.pool)
            .await?;

        Ok(res.rows_affected() > 0)
    }
}

/* ============================================================
   Queue
   ============================================================ */

#[async_trait]
impl QueueStore for PgStore {
    async fn queue_entry(&self, queue_entry_id: Uuid) -> Result<Option<QueueEntry>, StoreError> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM queue_entry WHERE queue_entry_id = $1");
        let row = sqlx::query_as::<_, QueueEntry>(&sql)
            .bind(queue_entry_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn queue_entries(&self, filter: &QueueFilter) -> Result<Vec<QueueEntry>, StoreError> {
        let sql = format!(
            r#"
            SELECT {QUEUE_COLUMNS}
            FROM queue_entry
            WHERE ($1::smallint IS NULL OR status = $1)
              AND ($2::timestamptz IS NULL OR check_in_time >= $2)
              AND ($3::timestamptz IS NULL OR check_in_time <  $3)
            ORDER BY status ASC, check_in_time ASC, created_at ASC
            "#
        );
        let rows = sqlx::query_as::<_, QueueEntry>(&sql)
            .bind(filter.status)
            .bind(filter.checked_in_from)
            .bind(filter.checked_in_to)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn insert_queue_entry(&self, new: NewQueueEntry) -> Result<QueueEntry, StoreError> {
        let mut tx = self.begin().await?;

        lock_patient_queue(&mut tx, new.patient_id).await?;
        if active_entry_exists(&mut *tx, new.patient_id, None).await? {
            return Err(StoreError::AlreadyQueued);
        }

        let sql = format!(
            r#"
            INSERT INTO queue_entry (queue_entry_id, patient_id, assigned_staff_id, appointment_id, status, check_in_time, notes)
            VALUES ($1,$2,$3,$4,$5,$6,$7)
            RETURNING {QUEUE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, QueueEntry>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.patient_id)
            .bind(new.assigned_staff_id)
            .bind(new.appointment_id)
            .bind(QueueStatus::Waiting)
            .bind(new.check_in_time)
            .bind(new.notes.as_deref())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_write_error)?;

        tx.commit().await?;
        Ok(row)
    }

    async fn save_queue_entry(&self, entry: &QueueEntry) -> Result<QueueEntry, StoreError> {
        let mut tx = self.begin().await?;

        if entry.status.is_active() {
            lock_patient_queue(&mut tx, entry.patient_id).await?;
            if active_entry_exists(&mut *tx, entry.patient_id, Some(entry.queue_entry_id)).await? {
                return Err(StoreError::AlreadyQueued);
            }
        }

        let sql = format!(
            r#"
            UPDATE queue_entry
            SET
              assigned_staff_id = $2,
              appointment_id = $3,
              status = $4,
              started_at = $5,
              completed_at = $6,
              notes = $7,
              updated_at = GREATEST(now(), updated_at + interval '1 microsecond')
            WHERE queue_entry_id = $1
              AND updated_at = $8
            RETURNING {QUEUE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, QueueEntry>(&sql)
            .bind(entry.queue_entry_id)
            .bind(entry.assigned_staff_id)
            .bind(entry.appointment_id)
            .bind(entry.status)
            .bind(entry.started_at)
            .bind(entry.completed_at)
            .bind(entry.notes.as_deref())
            .bind(entry.updated_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_write_error)?;

        let Some(row) = row else {
            let exists = row_exists(&mut *tx, QUEUE_ENTRY_EXISTS, entry.queue_entry_id).await?;
            return Err(if exists {
                StoreError::Stale("queue entry")
            } else {
                StoreError::NotFound("queue entry")
            });
        };

        tx.commit().await?;
        Ok(row)
    }

    async fn delete_queue_entry(&self, queue_entry_id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM queue_entry WHERE queue_entry_id = $1")
            .bind(queue_entry_id)
            .execute(&self.pool)
            .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn completions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        let rows = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            SELECT completed_at
            FROM queue_entry
            WHERE status = $1
              AND completed_at >= $2
              AND completed_at <  $3
            "#,
        )
        .bind(QueueStatus::Completed)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
