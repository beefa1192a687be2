// src/store/memory.rs
//
// Store used by tests and by local runs without DATABASE_URL. Every
// check-and-write happens under a single write lock.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AppointmentFilter, AppointmentStore, DirectoryStore, QueueFilter, QueueStore, StoreError,
};
use crate::models::{
    Appointment, AppointmentStatus, NewAppointment, NewPatient, NewQueueEntry, NewStaff, Patient,
    QueueEntry, QueueStatus, Staff,
};
use crate::services::scheduling::intervals_overlap;

#[derive(Default)]
struct Tables {
    patients: HashMap<Uuid, Patient>,
    staff: HashMap<Uuid, Staff>,
    appointments: HashMap<Uuid, Appointment>,
    queue: HashMap<Uuid, QueueEntry>,
}

impl Tables {
    fn has_conflict(
        &self,
        practitioner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> bool {
        self.appointments.values().any(|a| {
            a.practitioner_id == Some(practitioner_id)
                && a.status.is_active()
                && Some(a.appointment_id) != exclude
                && intervals_overlap(start, end, a.start_at, a.end_at)
        })
    }

    fn has_active_entry(&self, patient_id: Uuid, exclude: Option<Uuid>) -> bool {
        self.queue.values().any(|e| {
            e.patient_id == patient_id && e.status.is_active() && Some(e.queue_entry_id) != exclude
        })
    }
}

/// `updated_at` doubles as the row version, so it must strictly increase.
fn next_version(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous + chrono::Duration::microseconds(1))
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn insert_patient(&self, new: NewPatient) -> Result<Patient, StoreError> {
        let now = Utc::now();
        let patient = Patient {
            patient_id: Uuid::new_v4(),
            first_name: new.first_name,
            last_name: new.last_name,
            phone: new.phone,
            email: new.email,
            birthday: new.birthday,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .patients
            .insert(patient.patient_id, patient.clone());
        Ok(patient)
    }

    async fn patient(&self, patient_id: Uuid) -> Result<Option<Patient>, StoreError> {
        Ok(self.tables.read().await.patients.get(&patient_id).cloned())
    }

    async fn patients(&self, search: Option<&str>, limit: usize) -> Result<Vec<Patient>, StoreError> {
        let needle = search.map(str::to_lowercase);
        let tables = self.tables.read().await;

        let mut rows: Vec<Patient> = tables
            .patients
            .values()
            .filter(|p| match &needle {
                None => true,
                Some(n) => p.display_name().to_lowercase().contains(n.as_str()),
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn insert_staff(&self, new: NewStaff) -> Result<Staff, StoreError> {
        let now = Utc::now();
        let staff = Staff {
            staff_id: Uuid::new_v4(),
            display_name: new.display_name,
            role: new.role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .staff
            .insert(staff.staff_id, staff.clone());
        Ok(staff)
    }

    async fn staff_member(&self, staff_id: Uuid) -> Result<Option<Staff>, StoreError> {
        Ok(self.tables.read().await.staff.get(&staff_id).cloned())
    }

    async fn staff(&self, include_inactive: bool) -> Result<Vec<Staff>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Staff> = tables
            .staff
            .values()
            .filter(|s| include_inactive || s.is_active)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(rows)
    }
}

#[async_trait]
impl AppointmentStore for MemoryStore {
    async fn appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.tables.read().await.appointments.get(&appointment_id).cloned())
    }

    async fn appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        rows.sort_by_key(|a| (a.start_at, a.created_at));
        Ok(rows)
    }

    async fn has_conflict(
        &self,
        practitioner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .has_conflict(practitioner_id, start, end, exclude))
    }

    async fn insert_appointment(&self, new: NewAppointment) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.write().await;

        if let Some(practitioner_id) = new.practitioner_id {
            if tables.has_conflict(practitioner_id, new.start_at, new.end_at, None) {
                return Err(StoreError::AppointmentConflict);
            }
        }

        let now = Utc::now();
        let appointment = Appointment {
            appointment_id: Uuid::new_v4(),
            patient_id: new.patient_id,
            practitioner_id: new.practitioner_id,
            start_at: new.start_at,
            end_at: new.end_at,
            status: AppointmentStatus::Scheduled,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        };
        tables
            .appointments
            .insert(appointment.appointment_id, appointment.clone());
        Ok(appointment)
    }

    async fn save_appointment(&self, appointment: &Appointment) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.write().await;

        let stored_at = match tables.appointments.get(&appointment.appointment_id) {
            Some(stored) => stored.updated_at,
            None => return Err(StoreError::NotFound("appointment")),
        };
        if stored_at != appointment.updated_at {
            return Err(StoreError::Stale("appointment"));
        }
        if let (Some(practitioner_id), true) = (appointment.practitioner_id, appointment.status.is_active()) {
            if tables.has_conflict(
                practitioner_id,
                appointment.start_at,
                appointment.end_at,
                Some(appointment.appointment_id),
            ) {
                return Err(StoreError::AppointmentConflict);
            }
        }

        let mut saved = appointment.clone();
        saved.updated_at = next_version(stored_at);
        tables.appointments.insert(saved.appointment_id, saved.clone());
        Ok(saved)
    }

    async fn delete_appointment(&self, appointment_id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let removed = tables.appointments.remove(&appointment_id).is_some();
        if removed {
            // Mirrors ON DELETE SET NULL on queue_entry.appointment_id.
            for entry in tables.queue.values_mut() {
                if entry.appointment_id == Some(appointment_id) {
                    entry.appointment_id = None;
                }
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn queue_entry(&self, queue_entry_id: Uuid) -> Result<Option<QueueEntry>, StoreError> {
        Ok(self.tables.read().await.queue.get(&queue_entry_id).cloned())
    }

    async fn queue_entries(&self, filter: &QueueFilter) -> Result<Vec<QueueEntry>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<QueueEntry> = tables
            .queue
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        rows.sort_by_key(|e| (e.status, e.check_in_time, e.created_at));
        Ok(rows)
    }

    async fn insert_queue_entry(&self, new: NewQueueEntry) -> Result<QueueEntry, StoreError> {
        let mut tables = self.tables.write().await;

        if tables.has_active_entry(new.patient_id, None) {
            return Err(StoreError::AlreadyQueued);
        }

        let now = Utc::now();
        let entry = QueueEntry {
            queue_entry_id: Uuid::new_v4(),
            patient_id: new.patient_id,
            assigned_staff_id: new.assigned_staff_id,
            appointment_id: new.appointment_id,
            status: QueueStatus::Waiting,
            check_in_time: new.check_in_time,
            started_at: None,
            completed_at: None,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        };
        tables.queue.insert(entry.queue_entry_id, entry.clone());
        Ok(entry)
    }

    async fn save_queue_entry(&self, entry: &QueueEntry) -> Result<QueueEntry, StoreError> {
        let mut tables = self.tables.write().await;

        let stored_at = match tables.queue.get(&entry.queue_entry_id) {
            Some(stored) => stored.updated_at,
            None => return Err(StoreError::NotFound("queue entry")),
        };
        if stored_at != entry.updated_at {
            return Err(StoreError::Stale("queue entry"));
        }
        if entry.status.is_active() && tables.has_active_entry(entry.patient_id, Some(entry.queue_entry_id)) {
            return Err(StoreError::AlreadyQueued);
        }

        let mut saved = entry.clone();
        saved.updated_at = next_version(stored_at);
        tables.queue.insert(saved.queue_entry_id, saved.clone());
        Ok(saved)
    }

    async fn delete_queue_entry(&self, queue_entry_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tables.write().await.queue.remove(&queue_entry_id).is_some())
    }

    async fn completions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .queue
            .values()
            .filter(|e| e.status == QueueStatus::Completed)
            .filter_map(|e| e.completed_at)
            .filter(|at| *at >= from && *at < to)
            .collect())
    }
}
