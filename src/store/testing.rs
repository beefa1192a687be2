// src/store/testing.rs
//
// Test double that lets another writer win the race between a service's
// read and its save.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    memory::MemoryStore, AppointmentFilter, AppointmentStore, DirectoryStore, QueueFilter,
    QueueStore, StoreError,
};
use crate::models::{
    Appointment, AppointmentStatus, NewAppointment, NewPatient, NewQueueEntry, NewStaff, Patient,
    QueueEntry, QueueStatus, Staff,
};
use crate::services::queue::apply_status;

#[derive(Default)]
pub struct RacingStore {
    inner: MemoryStore,
    appointment_race: Mutex<Option<AppointmentStatus>>,
    queue_race: Mutex<Option<QueueStatus>>,
}

impl RacingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next appointment read returns the current row, then `status`
    /// is committed behind the reader's back.
    pub fn race_next_appointment_read(&self, status: AppointmentStatus) {
        *self.appointment_race.lock().unwrap() = Some(status);
    }

    /// Same for the next queue entry read.
    pub fn race_next_queue_read(&self, status: QueueStatus) {
        *self.queue_race.lock().unwrap() = Some(status);
    }
}

#[async_trait]
impl DirectoryStore for RacingStore {
    async fn insert_patient(&self, new: NewPatient) -> Result<Patient, StoreError> {
        self.inner.insert_patient(new).await
    }

    async fn patient(&self, patient_id: Uuid) -> Result<Option<Patient>, StoreError> {
        self.inner.patient(patient_id).await
    }

    async fn patients(&self, search: Option<&str>, limit: usize) -> Result<Vec<Patient>, StoreError> {
        self.inner.patients(search, limit).await
    }

    async fn insert_staff(&self, new: NewStaff) -> Result<Staff, StoreError> {
        self.inner.insert_staff(new).await
    }

    async fn staff_member(&self, staff_id: Uuid) -> Result<Option<Staff>, StoreError> {
        self.inner.staff_member(staff_id).await
    }

    async fn staff(&self, include_inactive: bool) -> Result<Vec<Staff>, StoreError> {
        self.inner.staff(include_inactive).await
    }
}

#[async_trait]
impl AppointmentStore for RacingStore {
    async fn appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let read = self.inner.appointment(appointment_id).await?;
        let race = self.appointment_race.lock().unwrap().take();
        if let (Some(status), Some(current)) = (race, read.as_ref()) {
            let mut other = current.clone();
            other.status = status;
            self.inner.save_appointment(&other).await?;
        }
        Ok(read)
    }

    async fn appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        self.inner.appointments(filter).await
    }

    async fn has_conflict(
        &self,
        practitioner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<bool, StoreError> {
        self.inner.has_conflict(practitioner_id, start, end, exclude).await
    }

    async fn insert_appointment(&self, new: NewAppointment) -> Result<Appointment, StoreError> {
        self.inner.insert_appointment(new).await
    }

    async fn save_appointment(&self, appointment: &Appointment) -> Result<Appointment, StoreError> {
        self.inner.save_appointment(appointment).await
    }

    async fn delete_appointment(&self, appointment_id: Uuid) -> Result<bool, StoreError> {
        self.inner.delete_appointment(appointment_id).await
    }
}

#[async_trait]
impl QueueStore for RacingStore {
    async fn queue_entry(&self, queue_entry_id: Uuid) -> Result<Option<QueueEntry>, StoreError> {
        let read = self.inner.queue_entry(queue_entry_id).await?;
        let race = self.queue_race.lock().unwrap().take();
        if let (Some(status), Some(current)) = (race, read.as_ref()) {
            let mut other = current.clone();
            apply_status(&mut other, status, Utc::now());
            self.inner.save_queue_entry(&other).await?;
        }
        Ok(read)
    }

    async fn queue_entries(&self, filter: &QueueFilter) -> Result<Vec<QueueEntry>, StoreError> {
        self.inner.queue_entries(filter).await
    }

    async fn insert_queue_entry(&self, new: NewQueueEntry) -> Result<QueueEntry, StoreError> {
        self.inner.insert_queue_entry(new).await
    }

    async fn save_queue_entry(&self, entry: &QueueEntry) -> Result<QueueEntry, StoreError> {
        self.inner.save_queue_entry(entry).await
    }

    async fn delete_queue_entry(&self, queue_entry_id: Uuid) -> Result<bool, StoreError> {
        self.inner.delete_queue_entry(queue_entry_id).await
    }

    async fn completions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        self.inner.completions_between(from, to).await
    }
}
