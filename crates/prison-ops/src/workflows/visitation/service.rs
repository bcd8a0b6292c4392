use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use tracing::{debug, info};

use super::capacity::{CapacityCalendar, CapacityInfo, DayAvailability};
use super::domain::{
    ScheduleId, SchedulePayload, VisitAction, VisitInmate, VisitSchedule, VisitStatus, VisitorId,
};
use super::repository::ScheduleRepository;
use super::validation::{validate_schedule, FormMode, ValidatedVisit};
use crate::clock::{Clock, SystemClock};
use crate::config::VisitationConfig;
use crate::workflows::transfer::InmateDirectory;
use crate::workflows::{Actor, ActorRole, RepositoryError, ValidationErrors, WorkflowError};

/// Service owning visit bookings and the daily capacity they draw on.
pub struct VisitSchedulingService<S, I> {
    schedules: Arc<S>,
    inmates: Arc<I>,
    clock: Arc<dyn Clock>,
    config: VisitationConfig,
}

static SCHEDULE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_schedule_id() -> ScheduleId {
    let id = SCHEDULE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ScheduleId(format!("vis-{id:06}"))
}

impl<S, I> VisitSchedulingService<S, I>
where
    S: ScheduleRepository + 'static,
    I: InmateDirectory + 'static,
{
    pub fn new(schedules: Arc<S>, inmates: Arc<I>, config: VisitationConfig) -> Self {
        Self {
            schedules,
            inmates,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn max_capacity(&self) -> u32 {
        self.config.daily_capacity
    }

    /// Whether the visitor already holds a pending booking.
    pub fn check_active_schedule(&self, visitor_id: &VisitorId) -> Result<bool, WorkflowError> {
        Ok(self.pending_schedule(visitor_id)?.is_some())
    }

    pub fn pending_schedule(
        &self,
        visitor_id: &VisitorId,
    ) -> Result<Option<VisitSchedule>, WorkflowError> {
        Ok(self.schedules.find_pending_for_visitor(visitor_id)?)
    }

    pub fn capacity_info(&self) -> Result<CapacityInfo, WorkflowError> {
        Ok(self.calendar()?.info())
    }

    pub fn is_date_at_capacity(&self, date: NaiveDate) -> Result<bool, WorkflowError> {
        Ok(self.count_on(date)? >= self.config.daily_capacity)
    }

    /// Nearest day from today (inclusive) inside the booking horizon with a free slot.
    pub fn next_available_date(&self) -> Result<Option<NaiveDate>, WorkflowError> {
        Ok(self.calendar()?.next_available())
    }

    pub fn availability_heat_map(&self, days: u32) -> Result<Vec<DayAvailability>, WorkflowError> {
        Ok(self.calendar()?.heat_map(days))
    }

    /// Create a booking, or edit `existing` in place when given.
    ///
    /// The payload is sparse: on edit it is overlaid on the stored schedule
    /// before validation, so photos and other omitted fields are retained.
    pub fn create_or_update_schedule(
        &self,
        visitor_id: &VisitorId,
        payload: SchedulePayload,
        existing: Option<&ScheduleId>,
    ) -> Result<VisitSchedule, WorkflowError> {
        let today = self.clock.today();

        let Some(schedule_id) = existing else {
            let visit =
                validate_schedule(&payload, FormMode::Create, today, self.config.horizon_days)?;
            return self.create(visitor_id, visit);
        };

        let stored = self.get(schedule_id)?;
        let form = SchedulePayload::from_schedule(&stored).merged_with(payload);
        let visit = validate_schedule(&form, FormMode::Edit, today, self.config.horizon_days)?;
        self.edit(visitor_id, stored, visit)
    }

    /// Cancel a booking. Owners and admins may cancel; the slot is released at once.
    pub fn cancel_schedule(
        &self,
        schedule_id: &ScheduleId,
        actor: &Actor,
    ) -> Result<VisitSchedule, WorkflowError> {
        let mut schedule = self.get(schedule_id)?;
        if actor.role != ActorRole::Admin && actor.id != schedule.visitor_id.0 {
            return Err(WorkflowError::Forbidden(format!(
                "{} may not cancel schedule {}",
                actor.id, schedule.id
            )));
        }

        let expected = schedule.status;
        self.transition(&mut schedule, VisitAction::Cancel)?;
        self.save_transition(&schedule, expected, VisitAction::Cancel)?;

        info!(schedule = %schedule.id, actor = %actor.id, date = %schedule.visit_date, "visit cancelled");
        Ok(schedule)
    }

    pub fn approve_schedule(
        &self,
        schedule_id: &ScheduleId,
        staff: &Actor,
    ) -> Result<VisitSchedule, WorkflowError> {
        ensure_staff(staff, VisitAction::Approve)?;

        let mut schedule = self.get(schedule_id)?;
        let expected = schedule.status;
        self.transition(&mut schedule, VisitAction::Approve)?;
        schedule.decided_by = Some(staff.clone());
        self.save_transition(&schedule, expected, VisitAction::Approve)?;

        info!(schedule = %schedule.id, staff = %staff.id, "visit approved");
        Ok(schedule)
    }

    pub fn reject_schedule(
        &self,
        schedule_id: &ScheduleId,
        staff: &Actor,
        reason: &str,
    ) -> Result<VisitSchedule, WorkflowError> {
        ensure_staff(staff, VisitAction::Reject)?;

        let mut errors = ValidationErrors::new();
        errors.require("rejection_reason", Some(reason), "Rejection reason is required");
        errors.into_result()?;

        let mut schedule = self.get(schedule_id)?;
        let expected = schedule.status;
        self.transition(&mut schedule, VisitAction::Reject)?;
        schedule.decided_by = Some(staff.clone());
        schedule.rejection_reason = Some(reason.trim().to_string());
        self.save_transition(&schedule, expected, VisitAction::Reject)?;

        info!(schedule = %schedule.id, staff = %staff.id, "visit rejected");
        Ok(schedule)
    }

    pub fn get(&self, schedule_id: &ScheduleId) -> Result<VisitSchedule, WorkflowError> {
        self.schedules
            .fetch(schedule_id)?
            .ok_or_else(|| WorkflowError::not_found("visit schedule", schedule_id.0.clone()))
    }

    /// The visitor's bookings, soonest visit first.
    pub fn list_for_visitor(
        &self,
        visitor_id: &VisitorId,
    ) -> Result<Vec<VisitSchedule>, WorkflowError> {
        let mut schedules = self.schedules.list_for_visitor(visitor_id)?;
        schedules.sort_by(|left, right| {
            (left.visit_date, left.visit_time).cmp(&(right.visit_date, right.visit_time))
        });
        Ok(schedules)
    }

    fn create(
        &self,
        visitor_id: &VisitorId,
        visit: ValidatedVisit,
    ) -> Result<VisitSchedule, WorkflowError> {
        if let Some(pending) = self.schedules.find_pending_for_visitor(visitor_id)? {
            return Err(pending_conflict(visitor_id, Some(&pending.id)));
        }
        self.ensure_capacity(visit.visit_date, 0)?;
        let inmate = self.resolve_inmate(&visit)?;

        let now = self.clock.now();
        let record = VisitSchedule {
            id: next_schedule_id(),
            visitor_id: visitor_id.clone(),
            inmate,
            visit_date: visit.visit_date,
            visit_time: visit.visit_time,
            visit_duration: visit.visit_duration,
            status: VisitStatus::Pending,
            identity: visit.identity,
            visitor_photo: visit.visitor_photo,
            id_photo: visit.id_photo,
            purpose: visit.purpose,
            relationship: visit.relationship,
            notes: visit.notes,
            created_at: now,
            updated_at: now,
            decided_by: None,
            rejection_reason: None,
        };

        let stored = self
            .schedules
            .insert_within_capacity(record, self.config.daily_capacity)
            .map_err(|err| self.store_error(err, visitor_id))?;

        info!(
            schedule = %stored.id,
            visitor = %stored.visitor_id,
            date = %stored.visit_date,
            slot = stored.visit_time.label(),
            "visit scheduled"
        );
        Ok(stored)
    }

    fn edit(
        &self,
        visitor_id: &VisitorId,
        stored: VisitSchedule,
        visit: ValidatedVisit,
    ) -> Result<VisitSchedule, WorkflowError> {
        if &stored.visitor_id != visitor_id {
            return Err(WorkflowError::Forbidden(format!(
                "schedule {} belongs to another visitor",
                stored.id
            )));
        }
        if stored.status.apply(VisitAction::Edit).is_none() {
            return Err(WorkflowError::InvalidStateTransition {
                entity: "visit schedule",
                from: stored.status.label(),
                action: VisitAction::Edit.label(),
            });
        }

        // Staying on the same day does not take another slot.
        let already_held = u32::from(stored.visit_date == visit.visit_date && stored.consumes_capacity());
        self.ensure_capacity(visit.visit_date, already_held)?;
        let inmate = self.resolve_inmate(&visit)?;

        let expected = stored.status;
        let updated = VisitSchedule {
            inmate,
            visit_date: visit.visit_date,
            visit_time: visit.visit_time,
            visit_duration: visit.visit_duration,
            identity: visit.identity,
            visitor_photo: visit.visitor_photo,
            id_photo: visit.id_photo,
            purpose: visit.purpose,
            relationship: visit.relationship,
            notes: visit.notes,
            updated_at: self.clock.now(),
            ..stored
        };

        self.schedules
            .update_within_capacity(updated.clone(), expected, self.config.daily_capacity)
            .map_err(|err| match err {
                RepositoryError::Conflict => self.stale_transition(&updated.id, VisitAction::Edit),
                other => self.store_error(other, visitor_id),
            })?;

        info!(schedule = %updated.id, visitor = %visitor_id, date = %updated.visit_date, "visit updated");
        Ok(updated)
    }

    fn ensure_capacity(&self, date: NaiveDate, already_held: u32) -> Result<(), WorkflowError> {
        let count = self.count_on(date)?.saturating_sub(already_held);
        if count >= self.config.daily_capacity {
            debug!(%date, count, max = self.config.daily_capacity, "date at capacity");
            return Err(self.capacity_exceeded(date));
        }
        Ok(())
    }

    fn capacity_exceeded(&self, date: NaiveDate) -> WorkflowError {
        // A failed lookup only costs the suggestion, not the verdict.
        let suggested_date = self.next_available_date().ok().flatten();
        WorkflowError::CapacityExceeded {
            date,
            max_capacity: self.config.daily_capacity,
            suggested_date,
        }
    }

    fn resolve_inmate(&self, visit: &ValidatedVisit) -> Result<Option<VisitInmate>, WorkflowError> {
        if let Some(inmate_id) = &visit.inmate_id {
            let inmate = self
                .inmates
                .find(inmate_id)?
                .ok_or_else(|| WorkflowError::not_found("inmate", inmate_id.0.clone()))?;
            return Ok(Some(VisitInmate::OnFile {
                id: inmate.id.clone(),
                name: inmate.display_name(),
            }));
        }

        Ok(visit
            .inmate_name
            .clone()
            .map(|name| VisitInmate::Unlisted { name }))
    }

    fn store_error(&self, err: RepositoryError, visitor_id: &VisitorId) -> WorkflowError {
        match err {
            RepositoryError::CapacityReached(date) => self.capacity_exceeded(date),
            RepositoryError::Conflict => pending_conflict(visitor_id, None),
            other => other.into(),
        }
    }

    /// Stores a status change only if the stored status is still `expected`.
    fn save_transition(
        &self,
        schedule: &VisitSchedule,
        expected: VisitStatus,
        action: VisitAction,
    ) -> Result<(), WorkflowError> {
        match self.schedules.update_if_status(schedule.clone(), expected) {
            Ok(()) => Ok(()),
            Err(RepositoryError::Conflict) => Err(self.stale_transition(&schedule.id, action)),
            Err(err) => Err(err.into()),
        }
    }

    /// Reports a write lost to a concurrent status change against the status that won.
    fn stale_transition(&self, schedule_id: &ScheduleId, action: VisitAction) -> WorkflowError {
        match self.get(schedule_id) {
            Ok(current) => {
                debug!(schedule = %schedule_id, status = current.status.label(), "lost a concurrent status change");
                WorkflowError::InvalidStateTransition {
                    entity: "visit schedule",
                    from: current.status.label(),
                    action: action.label(),
                }
            }
            Err(err) => err,
        }
    }

    fn transition(
        &self,
        schedule: &mut VisitSchedule,
        action: VisitAction,
    ) -> Result<(), WorkflowError> {
        let next = schedule
            .status
            .apply(action)
            .ok_or(WorkflowError::InvalidStateTransition {
                entity: "visit schedule",
                from: schedule.status.label(),
                action: action.label(),
            })?;
        schedule.status = next;
        schedule.updated_at = self.clock.now();
        Ok(())
    }

    fn count_on(&self, date: NaiveDate) -> Result<u32, WorkflowError> {
        let until = date.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
        let counts = self.schedules.daily_counts(date, until)?;
        Ok(counts.get(&date).copied().unwrap_or(0))
    }

    fn calendar(&self) -> Result<CapacityCalendar, WorkflowError> {
        let today = self.clock.today();
        let until = today
            .checked_add_days(Days::new(u64::from(self.config.horizon_days)))
            .unwrap_or(NaiveDate::MAX);
        let counts = self.schedules.daily_counts(today, until)?;
        Ok(CapacityCalendar::new(
            self.config.daily_capacity,
            today,
            self.config.horizon_days,
            counts,
        ))
    }
}

fn ensure_staff(actor: &Actor, action: VisitAction) -> Result<(), WorkflowError> {
    if actor.role.is_staff() {
        Ok(())
    } else {
        Err(WorkflowError::Forbidden(format!(
            "{} accounts cannot {} visit schedules",
            actor.role.label(),
            action.label()
        )))
    }
}

fn pending_conflict(visitor_id: &VisitorId, existing: Option<&ScheduleId>) -> WorkflowError {
    match existing {
        Some(existing) => WorkflowError::Conflict(format!(
            "visitor {visitor_id} already has a pending schedule ({existing})"
        )),
        None => WorkflowError::Conflict(format!(
            "visitor {visitor_id} already has a pending schedule"
        )),
    }
}
