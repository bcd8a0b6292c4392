use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, TimeZone, Utc};

use crate::clock::FixedClock;
use crate::config::VisitationConfig;
use crate::workflows::transfer::{Inmate, InmateDirectory, InmateId, PrisonId};
use crate::workflows::visitation::domain::{
    IdType, Relationship, ScheduleId, SchedulePayload, VisitDuration, VisitSchedule,
    VisitStatus, VisitTime, VisitorId, VisitorIdentity,
};
use crate::workflows::visitation::repository::ScheduleRepository;
use crate::workflows::visitation::service::VisitSchedulingService;
use crate::workflows::RepositoryError;

pub(super) type Service = VisitSchedulingService<MemorySchedules, MemoryInmates>;

pub(super) fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, month, day).expect("valid date")
}

pub(super) fn today() -> NaiveDate {
    date(3, 1)
}

pub(super) fn visitor(id: &str) -> VisitorId {
    VisitorId(id.to_string())
}

/// Complete booking form for `visit_date`.
pub(super) fn payload(visit_date: NaiveDate) -> SchedulePayload {
    SchedulePayload {
        first_name: Some("Hanna".to_string()),
        last_name: Some("Girma".to_string()),
        phone: Some("+251911000000".to_string()),
        id_type: Some(IdType::NationalId),
        id_number: Some("ET-4471".to_string()),
        purpose: Some("Family visit".to_string()),
        relationship: Some(Relationship::Sibling),
        inmate_name: Some("Dawit Alemu".to_string()),
        visit_date: Some(visit_date),
        visit_time: Some(VisitTime::Ten),
        visitor_photo: Some("uploads/hanna.jpg".to_string()),
        id_photo: Some("uploads/hanna-id.jpg".to_string()),
        ..SchedulePayload::default()
    }
}

pub(super) struct Harness {
    pub(super) service: Service,
    pub(super) schedules: Arc<MemorySchedules>,
}

pub(super) fn harness() -> Harness {
    harness_with_capacity(50)
}

pub(super) fn harness_with_capacity(daily_capacity: u32) -> Harness {
    let schedules = Arc::new(MemorySchedules::default());
    let inmates = Arc::new(MemoryInmates::default());
    inmates.seed(Inmate {
        id: InmateId("X".to_string()),
        first_name: "Dawit".to_string(),
        middle_name: None,
        last_name: "Alemu".to_string(),
        crime: "Fraud".to_string(),
        gender: "male".to_string(),
        intake_date: date(1, 10),
        date_of_birth: NaiveDate::from_ymd_opt(1988, 5, 14).expect("valid"),
        assigned_prison: Some(PrisonId("A".to_string())),
        time_remaining: None,
    });

    let service = VisitSchedulingService::new(
        schedules.clone(),
        inmates,
        VisitationConfig {
            daily_capacity,
            horizon_days: 30,
        },
    )
    .with_clock(Arc::new(FixedClock::on(today())));

    Harness { service, schedules }
}

type Interleaved = Box<dyn FnOnce(&mut VisitSchedule) + Send>;

#[derive(Default)]
pub(super) struct MemorySchedules {
    records: Mutex<HashMap<ScheduleId, VisitSchedule>>,
    interleaved: Mutex<Option<Interleaved>>,
}

impl MemorySchedules {
    /// Change the stored record just before the next status-checked write, as a
    /// competing writer would.
    pub(super) fn interleave_next_write(
        &self,
        change: impl FnOnce(&mut VisitSchedule) + Send + 'static,
    ) {
        *self.interleaved.lock().expect("schedule mutex poisoned") = Some(Box::new(change));
    }

    fn interleave(&self, records: &mut HashMap<ScheduleId, VisitSchedule>, id: &ScheduleId) {
        let change = self.interleaved.lock().expect("schedule mutex poisoned").take();
        if let (Some(change), Some(slot)) = (change, records.get_mut(id)) {
            change(slot);
        }
    }

    /// Fill `date` with `count` pending bookings from other visitors.
    pub(super) fn book(&self, date: NaiveDate, count: u32) {
        let mut guard = self.records.lock().expect("schedule mutex poisoned");
        let offset = guard.len();
        for n in 0..count {
            let id = ScheduleId(format!("seed-{date}-{}", offset + n as usize));
            let at = Utc
                .with_ymd_and_hms(2025, 2, 20, 9, 0, 0)
                .single()
                .expect("valid timestamp");
            guard.insert(
                id.clone(),
                VisitSchedule {
                    id,
                    visitor_id: VisitorId(format!("seeded-{date}-{n}")),
                    inmate: None,
                    visit_date: date,
                    visit_time: VisitTime::Nine,
                    visit_duration: VisitDuration::HalfHour,
                    status: VisitStatus::Pending,
                    identity: VisitorIdentity {
                        first_name: "Seeded".to_string(),
                        middle_name: None,
                        last_name: "Visitor".to_string(),
                        phone: "0000".to_string(),
                        id_type: IdType::Passport,
                        id_number: "P-1".to_string(),
                        id_expiry_date: None,
                    },
                    visitor_photo: "uploads/seed.jpg".to_string(),
                    id_photo: "uploads/seed-id.jpg".to_string(),
                    purpose: "Family visit".to_string(),
                    relationship: Relationship::Relative,
                    notes: None,
                    created_at: at,
                    updated_at: at,
                    decided_by: None,
                    rejection_reason: None,
                },
            );
        }
    }

    fn load_on(
        records: &HashMap<ScheduleId, VisitSchedule>,
        date: NaiveDate,
        skip: Option<&ScheduleId>,
    ) -> u32 {
        let count = records
            .values()
            .filter(|record| record.visit_date == date && record.consumes_capacity())
            .filter(|record| Some(&record.id) != skip)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}

impl ScheduleRepository for MemorySchedules {
    fn insert_within_capacity(
        &self,
        record: VisitSchedule,
        max_per_day: u32,
    ) -> Result<VisitSchedule, RepositoryError> {
        let mut guard = self.records.lock().expect("schedule mutex poisoned");
        let pending = guard.values().any(|existing| {
            existing.visitor_id == record.visitor_id && existing.status == VisitStatus::Pending
        });
        if pending {
            return Err(RepositoryError::Conflict);
        }
        if Self::load_on(&guard, record.visit_date, None) >= max_per_day {
            return Err(RepositoryError::CapacityReached(record.visit_date));
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update_within_capacity(
        &self,
        record: VisitSchedule,
        expected: VisitStatus,
        max_per_day: u32,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("schedule mutex poisoned");
        self.interleave(&mut guard, &record.id);
        match guard.get(&record.id) {
            None => return Err(RepositoryError::NotFound),
            Some(stored) if stored.status != expected => return Err(RepositoryError::Conflict),
            Some(_) => {}
        }
        if record.consumes_capacity()
            && Self::load_on(&guard, record.visit_date, Some(&record.id)) >= max_per_day
        {
            return Err(RepositoryError::CapacityReached(record.visit_date));
        }
        guard.insert(record.id.clone(), record);
        Ok(())
    }

    fn update_if_status(
        &self,
        record: VisitSchedule,
        expected: VisitStatus,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("schedule mutex poisoned");
        self.interleave(&mut guard, &record.id);
        match guard.get_mut(&record.id) {
            Some(slot) if slot.status != expected => Err(RepositoryError::Conflict),
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &ScheduleId) -> Result<Option<VisitSchedule>, RepositoryError> {
        let guard = self.records.lock().expect("schedule mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_pending_for_visitor(
        &self,
        visitor: &VisitorId,
    ) -> Result<Option<VisitSchedule>, RepositoryError> {
        let guard = self.records.lock().expect("schedule mutex poisoned");
        Ok(guard
            .values()
            .find(|record| &record.visitor_id == visitor && record.status == VisitStatus::Pending)
            .cloned())
    }

    fn daily_counts(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, u32>, RepositoryError> {
        let guard = self.records.lock().expect("schedule mutex poisoned");
        let mut counts = BTreeMap::new();
        for record in guard.values() {
            if record.consumes_capacity() && record.visit_date >= from && record.visit_date < until {
                *counts.entry(record.visit_date).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    fn list_for_visitor(&self, visitor: &VisitorId) -> Result<Vec<VisitSchedule>, RepositoryError> {
        let guard = self.records.lock().expect("schedule mutex poisoned");
        Ok(guard
            .values()
            .filter(|record| &record.visitor_id == visitor)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(super) struct MemoryInmates {
    records: Mutex<HashMap<InmateId, Inmate>>,
}

impl MemoryInmates {
    pub(super) fn seed(&self, inmate: Inmate) {
        self.records
            .lock()
            .expect("inmate mutex poisoned")
            .insert(inmate.id.clone(), inmate);
    }
}

impl InmateDirectory for MemoryInmates {
    fn find(&self, id: &InmateId) -> Result<Option<Inmate>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("inmate mutex poisoned")
            .get(id)
            .cloned())
    }

    fn update_assigned_prison(
        &self,
        id: &InmateId,
        prison: &PrisonId,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("inmate mutex poisoned");
        let inmate = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        inmate.assigned_prison = Some(prison.clone());
        Ok(())
    }
}

pub(super) async fn read_json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
