// src/store/mod.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentStatus, NewAppointment, NewPatient, NewQueueEntry, NewStaff, Patient,
    QueueEntry, QueueStatus, Staff,
};

pub mod memory;
pub mod pg;
#[cfg(test)]
pub(crate) mod testing;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("appointment overlaps an active appointment for the same practitioner")]
    AppointmentConflict,
    #[error("patient already has an active queue entry")]
    AlreadyQueued,
    #[error("{0} not found")]
    NotFound(&'static str),
    /// The row changed after it was read; re-read and try again.
    #[error("{0} was modified concurrently")]
    Stale(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Filters for appointment listing. The time window applies to `start_at`
/// and is half-open: `[from, to)`.
#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub practitioner_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl AppointmentFilter {
    pub fn matches(&self, a: &Appointment) -> bool {
        self.practitioner_id.is_none_or(|id| a.practitioner_id == Some(id))
            && self.patient_id.is_none_or(|id| a.patient_id == id)
            && self.status.is_none_or(|s| a.status == s)
            && self.from.is_none_or(|from| a.start_at >= from)
            && self.to.is_none_or(|to| a.start_at < to)
    }
}

/// Filters for queue listing. The window applies to `check_in_time`.
#[derive(Debug, Clone, Default)]
pub struct QueueFilter {
    pub status: Option<QueueStatus>,
    pub checked_in_from: Option<DateTime<Utc>>,
    pub checked_in_to: Option<DateTime<Utc>>,
}

impl QueueFilter {
    pub fn matches(&self, e: &QueueEntry) -> bool {
        self.status.is_none_or(|s| e.status == s)
            && self.checked_in_from.is_none_or(|from| e.check_in_time >= from)
            && self.checked_in_to.is_none_or(|to| e.check_in_time < to)
    }
}

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn insert_patient(&self, new: NewPatient) -> Result<Patient, StoreError>;
    async fn patient(&self, patient_id: Uuid) -> Result<Option<Patient>, StoreError>;
    /// Newest first; `search` matches first, last or full name, case-insensitive.
    async fn patients(&self, search: Option<&str>, limit: usize) -> Result<Vec<Patient>, StoreError>;

    async fn insert_staff(&self, new: NewStaff) -> Result<Staff, StoreError>;
    async fn staff_member(&self, staff_id: Uuid) -> Result<Option<Staff>, StoreError>;
    /// Ordered by display name.
    async fn staff(&self, include_inactive: bool) -> Result<Vec<Staff>, StoreError>;
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError>;
    /// Ordered by `start_at` ascending.
    async fn appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError>;

    /// True if an active appointment of `practitioner_id` overlaps `[start, end)`.
    async fn has_conflict(
        &self,
        practitioner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<bool, StoreError>;

    /// Inserts as `scheduled`. The overlap check and the write are atomic;
    /// a clash yields [`StoreError::AppointmentConflict`].
    async fn insert_appointment(&self, new: NewAppointment) -> Result<Appointment, StoreError>;

    /// Persists every mutable field of `appointment`, re-checking overlaps
    /// atomically when the result still holds a slot. `appointment.updated_at`
    /// must match the stored row, otherwise [`StoreError::Stale`].
    async fn save_appointment(&self, appointment: &Appointment) -> Result<Appointment, StoreError>;

    async fn delete_appointment(&self, appointment_id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn queue_entry(&self, queue_entry_id: Uuid) -> Result<Option<QueueEntry>, StoreError>;
    /// Ordered by status, then check-in time, then creation time.
    async fn queue_entries(&self, filter: &QueueFilter) -> Result<Vec<QueueEntry>, StoreError>;

    /// Inserts as `waiting`. Fails with [`StoreError::AlreadyQueued`] if the
    /// patient already holds an active entry.
    async fn insert_queue_entry(&self, new: NewQueueEntry) -> Result<QueueEntry, StoreError>;

    /// Persists every mutable field of `entry`, enforcing the one active
    /// entry per patient rule. Same `updated_at` guard as `save_appointment`.
    async fn save_queue_entry(&self, entry: &QueueEntry) -> Result<QueueEntry, StoreError>;

    async fn delete_queue_entry(&self, queue_entry_id: Uuid) -> Result<bool, StoreError>;

    /// `completed_at` of every completed entry with `completed_at` in `[from, to)`.
    async fn completions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError>;
}

pub trait Store: DirectoryStore + AppointmentStore + QueueStore {}

impl<T> Store for T where T: DirectoryStore + AppointmentStore + QueueStore {}
