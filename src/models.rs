use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::events::EventBus;
use crate::services::{queue::QueueService, scheduling::SchedulingService};
use crate::store::{memory::MemoryStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub events: EventBus,
    /// Offset used for "day" and "week" boundaries on the dashboard.
    pub clinic_offset: FixedOffset,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, events: EventBus, clinic_offset: FixedOffset) -> Self {
        Self {
            store,
            events,
            clinic_offset,
        }
    }

    pub fn in_memory(clinic_offset: FixedOffset) -> Self {
        Self::new(Arc::new(MemoryStore::new()), EventBus::new(), clinic_offset)
    }

    pub fn scheduling(&self) -> SchedulingService<'_> {
        SchedulingService::new(self.store.as_ref(), &self.events)
    }

    pub fn queue(&self) -> QueueService<'_> {
        QueueService::new(self.store.as_ref(), &self.events, self.clinic_offset)
    }

    /// Today's date on the clinic's wall clock.
    pub fn clinic_today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.clinic_offset).date_naive()
    }
}

/* -------------------------
   API envelope
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiOk<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

/* -------------------------
   Status enums (smallint in DB)
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum AppointmentStatus {
    Scheduled = 0,
    Confirmed = 1,
    Cancelled = 2,
    Completed = 3,
    NoShow = 4,
}

impl AppointmentStatus {
    pub const ACTIVE: [AppointmentStatus; 2] = [AppointmentStatus::Scheduled, AppointmentStatus::Confirmed];

    /// Only active appointments take part in overlap checks.
    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum QueueStatus {
    Waiting = 0,
    InTreatment = 1,
    Completed = 2,
    NoShow = 3,
}

impl QueueStatus {
    pub const ACTIVE: [QueueStatus; 2] = [QueueStatus::Waiting, QueueStatus::InTreatment];

    /// A patient holds at most one entry in an active status.
    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum StaffRole {
    Dentist = 0,
    Hygienist = 1,
    Assistant = 2,
    Receptionist = 3,
    Admin = 4,
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Patient {
    pub patient_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Staff {
    pub staff_id: Uuid,
    pub display_name: String,
    pub role: StaffRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Appointment {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub practitioner_id: Option<Uuid>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct QueueEntry {
    pub queue_entry_id: Uuid,
    pub patient_id: Uuid,
    pub assigned_staff_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub status: QueueStatus,
    pub check_in_time: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/* -------------------------
   Inserts
--------------------------*/

#[derive(Debug, Clone)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub birthday: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct NewStaff {
    pub display_name: String,
    pub role: StaffRole,
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub practitioner_id: Option<Uuid>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewQueueEntry {
    pub patient_id: Uuid,
    pub assigned_staff_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub check_in_time: DateTime<Utc>,
    pub notes: Option<String>,
}
