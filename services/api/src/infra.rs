use chrono::{DateTime, NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use prison_ops::workflows::messaging::{Message, MessageRepository, MessageStatus, UserId};
use prison_ops::workflows::transfer::{
    EventError, Inmate, InmateDirectory, InmateId, PopulationAdjustment, Prison, PrisonId,
    PrisonRegistry, PrisonStatus, TransferEvent, TransferEventPublisher, TransferId,
    TransferRepository, TransferRequest, TransferRevision,
};
use prison_ops::workflows::visitation::{
    ScheduleId, ScheduleRepository, VisitSchedule, VisitStatus, VisitorId,
};
use prison_ops::workflows::RepositoryError;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// A poisoned store is reported as unavailable instead of taking the server down.
fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("in-memory store poisoned".to_string()))
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryTransferRepository {
    records: Arc<Mutex<HashMap<TransferId, TransferRequest>>>,
}

impl TransferRepository for InMemoryTransferRepository {
    fn insert(&self, record: TransferRequest) -> Result<TransferRequest, RepositoryError> {
        let mut guard = lock(&self.records)?;
        let blocked = guard.contains_key(&record.id)
            || guard
                .values()
                .any(|existing| existing.inmate_id == record.inmate_id && existing.is_active());
        if blocked {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update_if_current(
        &self,
        record: TransferRequest,
        expected: &TransferRevision,
    ) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records)?;
        match guard.get_mut(&record.id) {
            Some(slot) if slot.revision() != *expected => Err(RepositoryError::Conflict),
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &TransferId) -> Result<Option<TransferRequest>, RepositoryError> {
        Ok(lock(&self.records)?.get(id).cloned())
    }

    fn find_active_for_inmate(
        &self,
        inmate: &InmateId,
    ) -> Result<Option<TransferRequest>, RepositoryError> {
        Ok(lock(&self.records)?
            .values()
            .find(|record| &record.inmate_id == inmate && record.is_active())
            .cloned())
    }

    fn list(&self) -> Result<Vec<TransferRequest>, RepositoryError> {
        let mut records: Vec<_> = lock(&self.records)?.values().cloned().collect();
        records.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(records)
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryInmateDirectory {
    records: Arc<Mutex<HashMap<InmateId, Inmate>>>,
}

impl InMemoryInmateDirectory {
    pub(crate) fn seed(&self, inmates: Vec<Inmate>) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records)?;
        for inmate in inmates {
            guard.insert(inmate.id.clone(), inmate);
        }
        Ok(())
    }
}

impl InmateDirectory for InMemoryInmateDirectory {
    fn find(&self, id: &InmateId) -> Result<Option<Inmate>, RepositoryError> {
        Ok(lock(&self.records)?.get(id).cloned())
    }

    fn update_assigned_prison(
        &self,
        id: &InmateId,
        prison: &PrisonId,
    ) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records)?;
        let inmate = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        inmate.assigned_prison = Some(prison.clone());
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryPrisonRegistry {
    records: Arc<Mutex<BTreeMap<PrisonId, Prison>>>,
}

impl InMemoryPrisonRegistry {
    pub(crate) fn seed(&self, prisons: Vec<Prison>) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records)?;
        for prison in prisons {
            guard.insert(prison.id.clone(), prison);
        }
        Ok(())
    }
}

impl PrisonRegistry for InMemoryPrisonRegistry {
    fn find(&self, id: &PrisonId) -> Result<Option<Prison>, RepositoryError> {
        Ok(lock(&self.records)?.get(id).cloned())
    }

    fn adjust_population(
        &self,
        id: &PrisonId,
        delta: i32,
    ) -> Result<PopulationAdjustment, RepositoryError> {
        let mut guard = lock(&self.records)?;
        let prison = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        let adjustment = PopulationAdjustment::compute(prison.current_population, delta);
        prison.current_population = adjustment.current;
        Ok(adjustment)
    }

    fn list_active(&self) -> Result<Vec<Prison>, RepositoryError> {
        Ok(lock(&self.records)?
            .values()
            .filter(|prison| prison.accepts_transfers())
            .cloned()
            .collect())
    }
}

/// Logs every transfer event and keeps a copy for the CLI summaries.
#[derive(Default, Clone)]
pub(crate) struct LoggingEventPublisher {
    events: Arc<Mutex<Vec<TransferEvent>>>,
}

impl TransferEventPublisher for LoggingEventPublisher {
    fn publish(&self, event: TransferEvent) -> Result<(), EventError> {
        info!(transfer = %event.transfer_id(), ?event, "transfer event");
        let mut guard = self
            .events
            .lock()
            .map_err(|_| EventError::Transport("event log poisoned".to_string()))?;
        guard.push(event);
        Ok(())
    }
}

impl LoggingEventPublisher {
    pub(crate) fn events(&self) -> Vec<TransferEvent> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryScheduleRepository {
    records: Arc<Mutex<HashMap<ScheduleId, VisitSchedule>>>,
}

impl InMemoryScheduleRepository {
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

impl ScheduleRepository for InMemoryScheduleRepository {
    fn insert_within_capacity(
        &self,
        record: VisitSchedule,
        max_per_day: u32,
    ) -> Result<VisitSchedule, RepositoryError> {
        let mut guard = lock(&self.records)?;
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
        let mut guard = lock(&self.records)?;
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
        let mut guard = lock(&self.records)?;
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
        Ok(lock(&self.records)?.get(id).cloned())
    }

    fn find_pending_for_visitor(
        &self,
        visitor: &VisitorId,
    ) -> Result<Option<VisitSchedule>, RepositoryError> {
        Ok(lock(&self.records)?
            .values()
            .find(|record| &record.visitor_id == visitor && record.status == VisitStatus::Pending)
            .cloned())
    }

    fn daily_counts(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, u32>, RepositoryError> {
        let guard = lock(&self.records)?;
        let mut counts = BTreeMap::new();
        for record in guard.values() {
            if record.consumes_capacity() && record.visit_date >= from && record.visit_date < until {
                *counts.entry(record.visit_date).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    fn list_for_visitor(&self, visitor: &VisitorId) -> Result<Vec<VisitSchedule>, RepositoryError> {
        Ok(lock(&self.records)?
            .values()
            .filter(|record| &record.visitor_id == visitor)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryMessageRepository {
    records: Arc<Mutex<Vec<Message>>>,
}

impl MessageRepository for InMemoryMessageRepository {
    fn insert(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut guard = lock(&self.records)?;
        if guard.iter().any(|existing| existing.id == message.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(message.clone());
        Ok(message)
    }

    fn between(
        &self,
        left: &UserId,
        right: &UserId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, RepositoryError> {
        Ok(lock(&self.records)?
            .iter()
            .filter(|message| message.is_between(left, right))
            .filter(|message| since.map_or(true, |cutoff| message.created_at > cutoff))
            .cloned()
            .collect())
    }

    fn unread_for(&self, receiver: &UserId) -> Result<Vec<Message>, RepositoryError> {
        Ok(lock(&self.records)?
            .iter()
            .filter(|message| &message.receiver_id == receiver && !message.read)
            .cloned()
            .collect())
    }

    fn mark_read(&self, sender: &UserId, receiver: &UserId) -> Result<u32, RepositoryError> {
        let mut guard = lock(&self.records)?;
        let mut updated = 0;
        for message in guard.iter_mut().filter(|message| {
            &message.sender_id == sender && &message.receiver_id == receiver && !message.read
        }) {
            message.read = true;
            message.status = MessageStatus::Read;
            updated += 1;
        }
        Ok(updated)
    }

    fn mark_delivered(&self, sender: &UserId, receiver: &UserId) -> Result<u32, RepositoryError> {
        let mut guard = lock(&self.records)?;
        let mut updated = 0;
        for message in guard.iter_mut().filter(|message| {
            &message.sender_id == sender
                && &message.receiver_id == receiver
                && message.status == MessageStatus::Sent
        }) {
            message.status = MessageStatus::Delivered;
            updated += 1;
        }
        Ok(updated)
    }
}

/// Facilities and inmates loaded into the in-memory stores at startup.
pub(crate) fn seed_prisons() -> Vec<Prison> {
    vec![
        prison("kality", "Kality Federal Prison", "Addis Ababa", 1200, 1130),
        prison("ziway", "Ziway Correctional Center", "Batu", 800, 612),
        prison("shewa-robit", "Shewa Robit Prison", "Shewa Robit", 600, 598),
        Prison {
            status: PrisonStatus::Maintenance,
            ..prison("kilinto", "Kilinto Remand Center", "Addis Ababa", 400, 0)
        },
    ]
}

pub(crate) fn seed_inmates() -> Vec<Inmate> {
    vec![
        inmate("INM-0001", "Dawit", "Alemu", "Fraud", "kality"),
        inmate("INM-0002", "Meron", "Tadesse", "Theft", "ziway"),
        inmate("INM-0003", "Samuel", "Bekele", "Assault", "kality"),
    ]
}

/// Build the registry and inmate stores from the seed data.
pub(crate) fn seeded_registry(
) -> Result<(Arc<InMemoryPrisonRegistry>, Arc<InMemoryInmateDirectory>), RepositoryError> {
    let prisons = Arc::new(InMemoryPrisonRegistry::default());
    prisons.seed(seed_prisons())?;
    let inmates = Arc::new(InMemoryInmateDirectory::default());
    inmates.seed(seed_inmates())?;
    Ok((prisons, inmates))
}

fn prison(id: &str, name: &str, location: &str, capacity: u32, population: u32) -> Prison {
    Prison {
        id: PrisonId(id.to_string()),
        name: name.to_string(),
        location: location.to_string(),
        description: String::new(),
        capacity,
        current_population: population,
        status: PrisonStatus::Active,
    }
}

fn inmate(id: &str, first: &str, last: &str, crime: &str, prison: &str) -> Inmate {
    Inmate {
        id: InmateId(id.to_string()),
        first_name: first.to_string(),
        middle_name: None,
        last_name: last.to_string(),
        crime: crime.to_string(),
        gender: "unspecified".to_string(),
        intake_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap_or_default(),
        date_of_birth: NaiveDate::from_ymd_opt(1990, 6, 1).unwrap_or_default(),
        assigned_prison: Some(PrisonId(prison.to_string())),
        time_remaining: None,
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// Parse a `YYYY-MM-DD=COUNT` booking load.
pub(crate) fn parse_booking(raw: &str) -> Result<(NaiveDate, u32), String> {
    let (date, count) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected YYYY-MM-DD=COUNT, found '{raw}'"))?;
    let date = parse_date(date)?;
    let count = count
        .trim()
        .parse::<u32>()
        .map_err(|err| format!("invalid booking count in '{raw}' ({err})"))?;
    Ok((date, count))
}
