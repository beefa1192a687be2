// src/services/scheduling.rs

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::events::{DomainEvent, EventBus};
use crate::models::{Appointment, AppointmentStatus, NewAppointment};
use crate::services::SAVE_ATTEMPTS;
use crate::store::{AppointmentFilter, AppointmentStore, DirectoryStore, Store, StoreError};

/// Half-open overlap: `[s1, e1)` and `[s2, e2)` share at least one instant.
/// Touching endpoints do not overlap.
pub fn intervals_overlap(
    s1: DateTime<Utc>,
    e1: DateTime<Utc>,
    s2: DateTime<Utc>,
    e2: DateTime<Utc>,
) -> bool {
    s1 < e2 && s2 < e1
}

pub fn validate_interval(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Result<(), ApiError> {
    if start_at < end_at {
        Ok(())
    } else {
        Err(ApiError::invalid_field("end_at", "end_at must be after start_at"))
    }
}

/// Scheduled and confirmed appointments may move to any status; cancelled,
/// completed and no-show are final.
pub fn ensure_transition(from: AppointmentStatus, to: AppointmentStatus) -> Result<(), ApiError> {
    if from == to || !from.is_terminal() {
        return Ok(());
    }
    Err(ApiError::Conflict(
        "INVALID_STATUS_TRANSITION",
        format!("appointment is {} and cannot change status", status_label(from)),
    ))
}

fn status_label(status: AppointmentStatus) -> &'static str {
    match status {
        AppointmentStatus::Scheduled => "scheduled",
        AppointmentStatus::Confirmed => "confirmed",
        AppointmentStatus::Cancelled => "cancelled",
        AppointmentStatus::Completed => "completed",
        AppointmentStatus::NoShow => "no_show",
    }
}

/// Partial update. `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default)]
pub struct AppointmentChanges {
    pub practitioner_id: Option<Option<Uuid>>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<Option<String>>,
}

impl AppointmentChanges {
    pub fn status(status: AppointmentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    fn apply_to(self, appointment: &mut Appointment) {
        if let Some(practitioner_id) = self.practitioner_id {
            appointment.practitioner_id = practitioner_id;
        }
        if let Some(start_at) = self.start_at {
            appointment.start_at = start_at;
        }
        if let Some(end_at) = self.end_at {
            appointment.end_at = end_at;
        }
        if let Some(status) = self.status {
            appointment.status = status;
        }
        if let Some(notes) = self.notes {
            appointment.notes = notes;
        }
    }
}

pub struct SchedulingService<'a> {
    store: &'a dyn Store,
    events: &'a EventBus,
}

impl<'a> SchedulingService<'a> {
    pub fn new(store: &'a dyn Store, events: &'a EventBus) -> Self {
        Self { store, events }
    }

    /// Read-only. Without a practitioner there is nothing to collide with.
    pub async fn check_conflict(
        &self,
        practitioner_id: Option<Uuid>,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<bool, ApiError> {
        let Some(practitioner_id) = practitioner_id else {
            return Ok(false);
        };
        validate_interval(start_at, end_at)?;

        let conflict = self
            .store
            .has_conflict(practitioner_id, start_at, end_at, exclude_appointment_id)
            .await
            .map_err(ApiError::lookup_failed)?;

        debug!(%practitioner_id, %start_at, %end_at, conflict, "conflict check");
        Ok(conflict)
    }

    pub async fn create(&self, new: NewAppointment) -> Result<Appointment, ApiError> {
        validate_interval(new.start_at, new.end_at)?;
        self.require_patient(new.patient_id).await?;
        if let Some(practitioner_id) = new.practitioner_id {
            self.require_practitioner(practitioner_id).await?;
        }

        let practitioner_id = new.practitioner_id;
        let appointment = self
            .store
            .insert_appointment(new)
            .await
            .map_err(|e| rejected(e, practitioner_id))?;

        info!(appointment_id = %appointment.appointment_id, "appointment scheduled");
        self.events.publish(DomainEvent::AppointmentScheduled {
            appointment_id: appointment.appointment_id,
            practitioner_id: appointment.practitioner_id,
        });
        Ok(appointment)
    }

    pub async fn get(&self, appointment_id: Uuid) -> Result<Appointment, ApiError> {
        self.store
            .appointment(appointment_id)
            .await?
            .ok_or_else(|| ApiError::not_found("appointment"))
    }

    pub async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, ApiError> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from >= to {
                return Err(ApiError::invalid_field("to", "to must be after from"));
            }
        }
        Ok(self.store.appointments(filter).await?)
    }

    /// Applies `changes` and re-validates the merged appointment as a whole.
    ///
    /// The save only lands on the version that was read. If another writer
    /// got there first, the row is re-read and the checks run again, so a
    /// concurrent cancel is never undone by a stale copy.
    pub async fn update(
        &self,
        appointment_id: Uuid,
        changes: AppointmentChanges,
    ) -> Result<Appointment, ApiError> {
        for attempt in 1..=SAVE_ATTEMPTS {
            let mut appointment = self.get(appointment_id).await?;

            if let Some(to) = changes.status {
                ensure_transition(appointment.status, to)?;
            }
            let new_practitioner = match changes.practitioner_id {
                Some(Some(id)) if appointment.practitioner_id != Some(id) => Some(id),
                _ => None,
            };

            changes.clone().apply_to(&mut appointment);
            validate_interval(appointment.start_at, appointment.end_at)?;
            if let Some(practitioner_id) = new_practitioner {
                self.require_practitioner(practitioner_id).await?;
            }

            let saved = match self.store.save_appointment(&appointment).await {
                Ok(saved) => saved,
                Err(StoreError::Stale(_)) => {
                    debug!(%appointment_id, attempt, "appointment changed underneath update, retrying");
                    continue;
                }
                Err(e) => return Err(rejected(e, appointment.practitioner_id)),
            };

            info!(appointment_id = %saved.appointment_id, status = ?saved.status, "appointment updated");
            self.events.publish(DomainEvent::AppointmentUpdated {
                appointment_id: saved.appointment_id,
                status: saved.status,
            });
            return Ok(saved);
        }

        warn!(%appointment_id, "appointment update kept racing other writers");
        Err(ApiError::concurrent_update("appointment"))
    }

    pub async fn set_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, ApiError> {
        self.update(appointment_id, AppointmentChanges::status(status)).await
    }

    pub async fn delete(&self, appointment_id: Uuid) -> Result<(), ApiError> {
        if !self.store.delete_appointment(appointment_id).await? {
            return Err(ApiError::not_found("appointment"));
        }
        info!(%appointment_id, "appointment deleted");
        self.events
            .publish(DomainEvent::AppointmentDeleted { appointment_id });
        Ok(())
    }

    async fn require_patient(&self, patient_id: Uuid) -> Result<(), ApiError> {
        match self.store.patient(patient_id).await? {
            Some(_) => Ok(()),
            None => Err(ApiError::not_found("patient")),
        }
    }

    async fn require_practitioner(&self, staff_id: Uuid) -> Result<(), ApiError> {
        let staff = self
            .store
            .staff_member(staff_id)
            .await?
            .ok_or_else(|| ApiError::not_found("practitioner"))?;
        if !staff.is_active {
            return Err(ApiError::invalid_field(
                "practitioner_id",
                "practitioner is not active",
            ));
        }
        Ok(())
    }
}

fn rejected(e: StoreError, practitioner_id: Option<Uuid>) -> ApiError {
    if matches!(e, StoreError::AppointmentConflict) {
        warn!(?practitioner_id, "appointment rejected: overlapping slot");
    }
    ApiError::from(e)
}
