use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::domain::{ScheduleId, VisitSchedule, VisitStatus, VisitorId};
use crate::workflows::RepositoryError;

/// Visit schedule store contract.
///
/// The `*_within_capacity` writes count slot-holding schedules on the record's
/// date and write in one step, failing with [`RepositoryError::CapacityReached`]
/// when the day already holds `max_per_day`. `insert_within_capacity` also
/// refuses a second pending schedule for the same visitor with
/// [`RepositoryError::Conflict`].
///
/// Writes to an existing record take the status it was read with and must fail
/// with [`RepositoryError::Conflict`] when the stored status has moved on.
pub trait ScheduleRepository: Send + Sync {
    fn insert_within_capacity(
        &self,
        record: VisitSchedule,
        max_per_day: u32,
    ) -> Result<VisitSchedule, RepositoryError>;

    /// Replace a stored record; the record itself is not counted against its date.
    fn update_within_capacity(
        &self,
        record: VisitSchedule,
        expected: VisitStatus,
        max_per_day: u32,
    ) -> Result<(), RepositoryError>;

    /// Status-only write. Never adds load to a day.
    fn update_if_status(
        &self,
        record: VisitSchedule,
        expected: VisitStatus,
    ) -> Result<(), RepositoryError>;

    fn fetch(&self, id: &ScheduleId) -> Result<Option<VisitSchedule>, RepositoryError>;

    fn find_pending_for_visitor(
        &self,
        visitor: &VisitorId,
    ) -> Result<Option<VisitSchedule>, RepositoryError>;

    /// Slot-holding schedules per day for `from..until`.
    fn daily_counts(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, u32>, RepositoryError>;

    fn list_for_visitor(&self, visitor: &VisitorId) -> Result<Vec<VisitSchedule>, RepositoryError>;
}
