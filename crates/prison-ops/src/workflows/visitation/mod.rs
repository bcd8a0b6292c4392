//! Visit booking against a per-day capacity limit.

pub mod capacity;
pub mod domain;
pub mod repository;
pub mod router;
pub mod service;
pub(crate) mod validation;

#[cfg(test)]
mod tests;

pub use capacity::{AvailabilityLevel, CapacityCalendar, CapacityInfo, DayAvailability};
pub use domain::{
    IdType, Relationship, ScheduleId, SchedulePayload, VisitAction, VisitDuration, VisitInmate,
    VisitSchedule, VisitStatus, VisitTime, VisitorId, VisitorIdentity,
};
pub use repository::ScheduleRepository;
pub use router::visit_router;
pub use service::VisitSchedulingService;
