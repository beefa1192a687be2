// src/services/queue.rs

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::events::{DomainEvent, EventBus};
use crate::models::{NewQueueEntry, QueueEntry, QueueStatus};
use crate::services::calendar::{bucket_by_weekday, week_window, WeekWindow, WEEKDAY_LABELS};
use crate::services::SAVE_ATTEMPTS;
use crate::store::{
    AppointmentStore, DirectoryStore, QueueFilter, QueueStore, Store, StoreError,
};

/// Moves `entry` to `next`, stamping the lifecycle timestamps.
///
/// Any status may follow any other. Entering treatment stamps `started_at`;
/// finishing (completed or no-show) from an active status stamps
/// `completed_at` and leaves `started_at` alone. Going back to waiting
/// clears both.
pub fn apply_status(entry: &mut QueueEntry, next: QueueStatus, now: DateTime<Utc>) {
    let previous = entry.status;
    if previous == next {
        return;
    }

    match next {
        QueueStatus::Waiting => {
            entry.started_at = None;
            entry.completed_at = None;
        }
        QueueStatus::InTreatment => {
            entry.started_at = Some(now);
            entry.completed_at = None;
        }
        QueueStatus::Completed | QueueStatus::NoShow => {
            if previous.is_active() {
                entry.completed_at = Some(now);
            }
        }
    }
    entry.status = next;
}

#[derive(Debug, Clone)]
pub struct CheckIn {
    pub patient_id: Uuid,
    pub assigned_staff_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub check_in_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl CheckIn {
    pub fn walk_in(patient_id: Uuid) -> Self {
        Self {
            patient_id,
            assigned_staff_id: None,
            appointment_id: None,
            check_in_time: None,
            notes: None,
        }
    }
}

/// Partial update of the non-status fields. `Some(None)` clears.
#[derive(Debug, Clone, Default)]
pub struct QueueChanges {
    pub assigned_staff_id: Option<Option<Uuid>>,
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyCompletions {
    #[serde(flatten)]
    pub week: WeekWindow,
    pub labels: [&'static str; 7],
    pub counts: [u32; 7],
    pub total: u32,
}

pub struct QueueService<'a> {
    store: &'a dyn Store,
    events: &'a EventBus,
    offset: FixedOffset,
}

impl<'a> QueueService<'a> {
    pub fn new(store: &'a dyn Store, events: &'a EventBus, offset: FixedOffset) -> Self {
        Self {
            store,
            events,
            offset,
        }
    }

    pub async fn enqueue(&self, check_in: CheckIn) -> Result<QueueEntry, ApiError> {
        if self.store.patient(check_in.patient_id).await?.is_none() {
            return Err(ApiError::not_found("patient"));
        }
        if let Some(staff_id) = check_in.assigned_staff_id {
            self.require_staff(staff_id).await?;
        }
        if let Some(appointment_id) = check_in.appointment_id {
            if self.store.appointment(appointment_id).await?.is_none() {
                return Err(ApiError::not_found("appointment"));
            }
        }

        let patient_id = check_in.patient_id;
        let entry = self
            .store
            .insert_queue_entry(NewQueueEntry {
                patient_id,
                assigned_staff_id: check_in.assigned_staff_id,
                appointment_id: check_in.appointment_id,
                check_in_time: check_in.check_in_time.unwrap_or_else(Utc::now),
                notes: check_in.notes,
            })
            .await
            .map_err(|e| rejected(e, patient_id))?;

        info!(queue_entry_id = %entry.queue_entry_id, %patient_id, "patient checked in");
        self.events.publish(DomainEvent::PatientCheckedIn {
            queue_entry_id: entry.queue_entry_id,
            patient_id,
        });
        Ok(entry)
    }

    pub async fn get(&self, queue_entry_id: Uuid) -> Result<QueueEntry, ApiError> {
        self.store
            .queue_entry(queue_entry_id)
            .await?
            .ok_or_else(|| ApiError::not_found("queue entry"))
    }

    pub async fn list(&self, filter: &QueueFilter) -> Result<Vec<QueueEntry>, ApiError> {
        let rows = self.store.queue_entries(filter).await?;
        debug!(count = rows.len(), "queue listed");
        Ok(rows)
    }

    pub async fn update(
        &self,
        queue_entry_id: Uuid,
        changes: QueueChanges,
    ) -> Result<QueueEntry, ApiError> {
        if let Some(Some(staff_id)) = changes.assigned_staff_id {
            self.require_staff(staff_id).await?;
        }

        for attempt in 1..=SAVE_ATTEMPTS {
            let mut entry = self.get(queue_entry_id).await?;
            if let Some(assigned) = changes.assigned_staff_id {
                entry.assigned_staff_id = assigned;
            }
            if let Some(notes) = &changes.notes {
                entry.notes = notes.clone();
            }

            match self.store.save_queue_entry(&entry).await {
                Ok(saved) => return Ok(saved),
                Err(StoreError::Stale(_)) => {
                    debug!(%queue_entry_id, attempt, "queue entry changed underneath update, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(%queue_entry_id, "queue entry update kept racing other writers");
        Err(ApiError::concurrent_update("queue entry"))
    }

    pub async fn set_status(
        &self,
        queue_entry_id: Uuid,
        status: QueueStatus,
    ) -> Result<QueueEntry, ApiError> {
        for attempt in 1..=SAVE_ATTEMPTS {
            let mut entry = self.get(queue_entry_id).await?;
            let from = entry.status;
            if from == status {
                return Ok(entry);
            }

            apply_status(&mut entry, status, Utc::now());
            let saved = match self.store.save_queue_entry(&entry).await {
                Ok(saved) => saved,
                Err(StoreError::Stale(_)) => {
                    debug!(%queue_entry_id, attempt, "queue entry changed underneath status change, retrying");
                    continue;
                }
                Err(e) => return Err(rejected(e, entry.patient_id)),
            };

            info!(%queue_entry_id, ?from, to = ?status, "queue status changed");
            self.events.publish(DomainEvent::QueueStatusChanged {
                queue_entry_id,
                from,
                to: status,
            });
            return Ok(saved);
        }

        warn!(%queue_entry_id, "queue status change kept racing other writers");
        Err(ApiError::concurrent_update("queue entry"))
    }

    pub async fn dequeue(&self, queue_entry_id: Uuid) -> Result<(), ApiError> {
        if !self.store.delete_queue_entry(queue_entry_id).await? {
            return Err(ApiError::not_found("queue entry"));
        }
        info!(%queue_entry_id, "queue entry removed");
        self.events
            .publish(DomainEvent::QueueEntryRemoved { queue_entry_id });
        Ok(())
    }

    /// Completed entries per weekday for the week containing `date`.
    pub async fn weekly_completions(&self, date: NaiveDate) -> Result<WeeklyCompletions, ApiError> {
        let week = week_window(date, self.offset).ok_or_else(|| ApiError::date_out_of_range("date"))?;
        let completions = self
            .store
            .completions_between(week.start, week.end)
            .await
            .map_err(ApiError::lookup_failed)?;

        let counts = bucket_by_weekday(completions, &week, self.offset);
        Ok(WeeklyCompletions {
            week,
            labels: WEEKDAY_LABELS,
            counts,
            total: counts.iter().sum(),
        })
    }

    async fn require_staff(&self, staff_id: Uuid) -> Result<(), ApiError> {
        match self.store.staff_member(staff_id).await? {
            Some(_) => Ok(()),
            None => Err(ApiError::not_found("staff member")),
        }
    }
}

fn rejected(e: StoreError, patient_id: Uuid) -> ApiError {
    if matches!(e, StoreError::AlreadyQueued) {
        warn!(%patient_id, "check-in rejected: patient already in queue");
    }
    ApiError::from(e)
}
