use super::common::*;

use crate::workflows::transfer::InmateId;
use crate::workflows::visitation::capacity::AvailabilityLevel;
use crate::workflows::visitation::domain::{
    ScheduleId, SchedulePayload, VisitInmate, VisitStatus, VisitTime,
};
use crate::workflows::{Actor, ActorRole, WorkflowError};

fn staff() -> Actor {
    Actor::new("officer-3", ActorRole::Staff)
}

#[test]
fn last_slot_is_taken_then_next_day_is_suggested() {
    let harness = harness();
    harness.schedules.book(date(3, 1), 49);

    let booked = harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(3, 1)), None)
        .expect("49/50 leaves one slot");
    assert_eq!(booked.status, VisitStatus::Pending);
    assert!(harness.service.is_date_at_capacity(date(3, 1)).expect("count"));

    match harness
        .service
        .create_or_update_schedule(&visitor("v-2"), payload(date(3, 1)), None)
    {
        Err(WorkflowError::CapacityExceeded {
            date: full,
            max_capacity,
            suggested_date,
        }) => {
            assert_eq!(full, date(3, 1));
            assert_eq!(max_capacity, 50);
            assert_eq!(suggested_date, Some(date(3, 2)));
        }
        other => panic!("expected capacity error, got {other:?}"),
    }
    assert!(!harness
        .service
        .check_active_schedule(&visitor("v-2"))
        .expect("lookup"));
}

#[test]
fn no_suggestion_when_horizon_is_booked_out() {
    let harness = harness_with_capacity(1);
    for offset in 0..30 {
        let day = today() + chrono::Days::new(offset);
        harness.schedules.book(day, 1);
    }

    match harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(3, 5)), None)
    {
        Err(WorkflowError::CapacityExceeded { suggested_date, .. }) => {
            assert_eq!(suggested_date, None)
        }
        other => panic!("expected capacity error, got {other:?}"),
    }
    assert_eq!(harness.service.next_available_date().expect("scan"), None);
}

#[test]
fn cancelling_frees_a_slot_immediately() {
    let harness = harness_with_capacity(2);
    harness.schedules.book(date(3, 4), 1);
    let mine = harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(3, 4)), None)
        .expect("second slot");
    assert!(harness.service.is_date_at_capacity(date(3, 4)).expect("count"));

    let cancelled = harness
        .service
        .cancel_schedule(&mine.id, &Actor::new("v-1", ActorRole::Visitor))
        .expect("owner cancels");

    assert_eq!(cancelled.status, VisitStatus::Cancelled);
    assert!(!harness.service.is_date_at_capacity(date(3, 4)).expect("count"));
    harness
        .service
        .create_or_update_schedule(&visitor("v-2"), payload(date(3, 4)), None)
        .expect("freed slot is bookable");
}

#[test]
fn rejected_bookings_release_their_slot() {
    let harness = harness_with_capacity(1);
    let mine = harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(3, 6)), None)
        .expect("booked");

    harness
        .service
        .reject_schedule(&mine.id, &staff(), "Visitor on restricted list")
        .expect("rejected");

    let info = harness.service.capacity_info().expect("info");
    assert_eq!(info.current_daily_visits.get("2025-03-06"), None);
    assert!(!harness
        .service
        .check_active_schedule(&visitor("v-1"))
        .expect("lookup"));
}

#[test]
fn approved_bookings_keep_their_slot() {
    let harness = harness_with_capacity(1);
    let mine = harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(3, 6)), None)
        .expect("booked");

    let approved = harness
        .service
        .approve_schedule(&mine.id, &staff())
        .expect("approved");

    assert_eq!(approved.decided_by, Some(staff()));
    assert!(harness.service.is_date_at_capacity(date(3, 6)).expect("count"));
    assert!(!harness
        .service
        .check_active_schedule(&visitor("v-1"))
        .expect("approved is not pending"));
}

#[test]
fn second_pending_booking_conflicts_but_edit_succeeds() {
    let harness = harness();
    let first = harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(3, 3)), None)
        .expect("first booking");

    match harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(3, 4)), None)
    {
        Err(WorkflowError::Conflict(message)) => assert!(message.contains(&first.id.0)),
        other => panic!("expected conflict, got {other:?}"),
    }

    let edited = harness
        .service
        .create_or_update_schedule(
            &visitor("v-1"),
            SchedulePayload {
                visit_date: Some(date(3, 4)),
                visit_time: Some(VisitTime::Three),
                ..SchedulePayload::default()
            },
            Some(&first.id),
        )
        .expect("owner edits pending booking");

    assert_eq!(edited.id, first.id);
    assert_eq!(edited.visit_date, date(3, 4));
    assert_eq!(edited.visit_time, VisitTime::Three);
    assert_eq!(edited.visitor_photo, "uploads/hanna.jpg");
    assert_eq!(edited.purpose, "Family visit");
    assert_eq!(edited.created_at, first.created_at);
}

#[test]
fn editing_on_a_full_day_keeps_own_slot() {
    let harness = harness_with_capacity(2);
    harness.schedules.book(date(3, 2), 1);
    let mine = harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(3, 2)), None)
        .expect("last slot");

    harness
        .service
        .create_or_update_schedule(
            &visitor("v-1"),
            SchedulePayload {
                notes: Some("Bringing documents".to_string()),
                ..SchedulePayload::default()
            },
            Some(&mine.id),
        )
        .expect("same-day edit is not a new booking");
}

#[test]
fn moving_to_a_full_day_is_refused() {
    let harness = harness_with_capacity(1);
    harness.schedules.book(date(3, 8), 1);
    let mine = harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(3, 7)), None)
        .expect("booked");

    match harness.service.create_or_update_schedule(
        &visitor("v-1"),
        SchedulePayload {
            visit_date: Some(date(3, 8)),
            ..SchedulePayload::default()
        },
        Some(&mine.id),
    ) {
        Err(WorkflowError::CapacityExceeded { date: full, .. }) => assert_eq!(full, date(3, 8)),
        other => panic!("expected capacity error, got {other:?}"),
    }
    let stored = harness.service.get(&mine.id).expect("stored");
    assert_eq!(stored.visit_date, date(3, 7));
}

#[test]
fn only_the_owner_edits_and_only_while_pending() {
    let harness = harness();
    let mine = harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(3, 3)), None)
        .expect("booked");

    match harness.service.create_or_update_schedule(
        &visitor("v-9"),
        SchedulePayload::default(),
        Some(&mine.id),
    ) {
        Err(WorkflowError::Forbidden(_)) => {}
        other => panic!("expected forbidden, got {other:?}"),
    }

    harness
        .service
        .approve_schedule(&mine.id, &staff())
        .expect("approved");
    match harness.service.create_or_update_schedule(
        &visitor("v-1"),
        SchedulePayload::default(),
        Some(&mine.id),
    ) {
        Err(WorkflowError::InvalidStateTransition { from, action, .. }) => {
            assert_eq!(from, "Approved");
            assert_eq!(action, "edit");
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[test]
fn field_errors_come_before_duplicate_and_capacity_checks() {
    let harness = harness_with_capacity(1);
    harness.schedules.book(date(3, 3), 1);
    harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(3, 4)), None)
        .expect("booked");

    let mut incomplete = payload(date(3, 3));
    incomplete.phone = None;
    incomplete.relationship = None;

    match harness
        .service
        .create_or_update_schedule(&visitor("v-1"), incomplete, None)
    {
        Err(WorkflowError::Validation(errors)) => {
            assert_eq!(errors.len(), 2);
            assert!(errors.get("phone").is_some());
            assert!(errors.get("relationship").is_some());
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn past_dates_are_refused() {
    let harness = harness();
    match harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(2, 28)), None)
    {
        Err(WorkflowError::Validation(errors)) => assert!(errors.get("visit_date").is_some()),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn dates_beyond_the_booking_horizon_are_refused() {
    let harness = harness();
    harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(3, 30)), None)
        .expect("last day of the horizon");

    match harness
        .service
        .create_or_update_schedule(&visitor("v-2"), payload(date(3, 31)), None)
    {
        Err(WorkflowError::Validation(errors)) => assert_eq!(
            errors.get("visit_date"),
            Some("Visit date must be within the next 30 days")
        ),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn blank_photos_on_edit_keep_stored_uploads() {
    let harness = harness();
    let mine = harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(3, 3)), None)
        .expect("booked");

    let edited = harness
        .service
        .create_or_update_schedule(
            &visitor("v-1"),
            SchedulePayload {
                purpose: Some("Legal consultation".to_string()),
                visitor_photo: Some(String::new()),
                id_photo: Some("  ".to_string()),
                ..SchedulePayload::default()
            },
            Some(&mine.id),
        )
        .expect("edit with empty upload fields");

    assert_eq!(edited.purpose, "Legal consultation");
    assert_eq!(edited.visitor_photo, "uploads/hanna.jpg");
    assert_eq!(edited.id_photo, "uploads/hanna-id.jpg");
    let stored = harness.service.get(&mine.id).expect("stored");
    assert_eq!(stored.visitor_photo, "uploads/hanna.jpg");
    assert_eq!(stored.id_photo, "uploads/hanna-id.jpg");
}

#[test]
fn edit_lost_to_a_concurrent_cancel_is_refused() {
    let harness = harness();
    let mine = harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(3, 3)), None)
        .expect("booked");
    harness
        .schedules
        .interleave_next_write(|stored| stored.status = VisitStatus::Cancelled);

    match harness.service.create_or_update_schedule(
        &visitor("v-1"),
        SchedulePayload {
            visit_date: Some(date(3, 4)),
            ..SchedulePayload::default()
        },
        Some(&mine.id),
    ) {
        Err(WorkflowError::InvalidStateTransition { from, action, .. }) => {
            assert_eq!(from, "Cancelled");
            assert_eq!(action, "edit");
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
    let stored = harness.service.get(&mine.id).expect("stored");
    assert_eq!(stored.status, VisitStatus::Cancelled);
    assert_eq!(stored.visit_date, date(3, 3));
}

#[test]
fn approval_lost_to_a_concurrent_cancel_keeps_the_cancel() {
    let harness = harness();
    let mine = harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(3, 3)), None)
        .expect("booked");
    harness
        .schedules
        .interleave_next_write(|stored| stored.status = VisitStatus::Cancelled);

    match harness.service.approve_schedule(&mine.id, &staff()) {
        Err(WorkflowError::InvalidStateTransition { from, .. }) => assert_eq!(from, "Cancelled"),
        other => panic!("expected invalid transition, got {other:?}"),
    }
    let stored = harness.service.get(&mine.id).expect("stored");
    assert_eq!(stored.status, VisitStatus::Cancelled);
    assert_eq!(stored.decided_by, None);
}

#[test]
fn inmate_reference_must_exist_when_supplied() {
    let harness = harness();

    let mut on_file = payload(date(3, 3));
    on_file.inmate_id = Some(InmateId("X".to_string()));
    let booked = harness
        .service
        .create_or_update_schedule(&visitor("v-1"), on_file, None)
        .expect("inmate on file");
    assert_eq!(
        booked.inmate,
        Some(VisitInmate::OnFile {
            id: InmateId("X".to_string()),
            name: "Dawit Alemu".to_string(),
        })
    );

    let mut unknown = payload(date(3, 3));
    unknown.inmate_id = Some(InmateId("ghost".to_string()));
    match harness
        .service
        .create_or_update_schedule(&visitor("v-2"), unknown, None)
    {
        Err(WorkflowError::NotFound { entity, .. }) => assert_eq!(entity, "inmate"),
        other => panic!("expected missing inmate, got {other:?}"),
    }

    let unlisted = harness
        .service
        .create_or_update_schedule(&visitor("v-3"), payload(date(3, 3)), None)
        .expect("free-text name accepted");
    assert_eq!(unlisted.inmate.as_ref().map(VisitInmate::name), Some("Dawit Alemu"));
    assert!(matches!(unlisted.inmate, Some(VisitInmate::Unlisted { .. })));
}

#[test]
fn cancel_rules() {
    let harness = harness();
    let mine = harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(3, 3)), None)
        .expect("booked");

    match harness
        .service
        .cancel_schedule(&mine.id, &Actor::new("v-2", ActorRole::Visitor))
    {
        Err(WorkflowError::Forbidden(_)) => {}
        other => panic!("expected forbidden, got {other:?}"),
    }

    harness
        .service
        .approve_schedule(&mine.id, &staff())
        .expect("approved");
    let cancelled = harness
        .service
        .cancel_schedule(&mine.id, &Actor::new("admin-1", ActorRole::Admin))
        .expect("admin cancels approved visit");
    assert_eq!(cancelled.status, VisitStatus::Cancelled);

    match harness
        .service
        .cancel_schedule(&mine.id, &Actor::new("v-1", ActorRole::Visitor))
    {
        Err(WorkflowError::InvalidStateTransition { from, .. }) => assert_eq!(from, "Cancelled"),
        other => panic!("expected invalid transition, got {other:?}"),
    }

    match harness.service.cancel_schedule(
        &ScheduleId("vis-missing".to_string()),
        &Actor::new("admin-1", ActorRole::Admin),
    ) {
        Err(WorkflowError::NotFound { .. }) => {}
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn visitors_cannot_decide_bookings() {
    let harness = harness();
    let mine = harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(3, 3)), None)
        .expect("booked");

    match harness
        .service
        .approve_schedule(&mine.id, &Actor::new("v-1", ActorRole::Visitor))
    {
        Err(WorkflowError::Forbidden(_)) => {}
        other => panic!("expected forbidden, got {other:?}"),
    }
    match harness.service.reject_schedule(&mine.id, &staff(), "") {
        Err(WorkflowError::Validation(errors)) => {
            assert!(errors.get("rejection_reason").is_some())
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn capacity_info_and_heat_map_reflect_bookings() {
    let harness = harness();
    harness.schedules.book(date(3, 1), 30);
    harness.schedules.book(date(3, 2), 50);
    harness.schedules.book(date(4, 15), 5);

    let info = harness.service.capacity_info().expect("info");
    assert_eq!(info.max_capacity, 50);
    assert_eq!(info.window_start, date(3, 1));
    assert_eq!(info.window_end, date(3, 31));
    assert_eq!(info.current_daily_visits.get("2025-03-01"), Some(&30));
    assert_eq!(info.current_daily_visits.get("2025-03-02"), Some(&50));
    assert_eq!(info.current_daily_visits.len(), 2);
    assert_eq!(info.next_available_date, Some(date(3, 1)));

    let heat_map = harness.service.availability_heat_map(7).expect("heat map");
    assert_eq!(heat_map.len(), 7);
    assert_eq!(heat_map[0].level, AvailabilityLevel::Moderate);
    assert_eq!(heat_map[1].level, AvailabilityLevel::Full);
    assert_eq!(heat_map[2].level, AvailabilityLevel::Available);
}

#[test]
fn visitor_listing_is_ordered_by_visit() {
    let harness = harness();
    let later = harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(3, 9)), None)
        .expect("booked");
    harness
        .service
        .cancel_schedule(&later.id, &Actor::new("v-1", ActorRole::Visitor))
        .expect("cancelled");
    let sooner = harness
        .service
        .create_or_update_schedule(&visitor("v-1"), payload(date(3, 2)), None)
        .expect("rebooked");

    let listed: Vec<ScheduleId> = harness
        .service
        .list_for_visitor(&visitor("v-1"))
        .expect("list")
        .into_iter()
        .map(|schedule| schedule.id)
        .collect();
    assert_eq!(listed, vec![sooner.id, later.id]);
}
