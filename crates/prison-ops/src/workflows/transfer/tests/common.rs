use std::collections::HashMap;
use std::sync::{Arc, Barrier, Mutex};

use chrono::NaiveDate;

use crate::clock::FixedClock;
use crate::config::TransferConfig;
use crate::workflows::transfer::domain::{
    Inmate, InmateId, Prison, PrisonId, PrisonStatus, TransferDraft, TransferId, TransferRequest,
    TransferRevision,
};
use crate::workflows::transfer::repository::{
    EventError, InmateDirectory, PopulationAdjustment, PrisonRegistry, TransferEvent,
    TransferEventPublisher, TransferRepository,
};
use crate::workflows::transfer::service::TransferWorkflowService;
use crate::workflows::{Actor, ActorRole, RepositoryError};

pub(super) type Service =
    TransferWorkflowService<MemoryTransfers, MemoryInmates, MemoryPrisons, MemoryEvents>;

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).expect("valid date")
}

pub(super) fn prison(id: &str, name: &str, population: u32, status: PrisonStatus) -> Prison {
    Prison {
        id: PrisonId(id.to_string()),
        name: name.to_string(),
        location: "Addis Ababa".to_string(),
        description: "Regional correctional facility".to_string(),
        capacity: 200,
        current_population: population,
        status,
    }
}

pub(super) fn inmate(id: &str, assigned: Option<&str>) -> Inmate {
    Inmate {
        id: InmateId(id.to_string()),
        first_name: "Abebe".to_string(),
        middle_name: Some("Kebede".to_string()),
        last_name: "Tesfaye".to_string(),
        crime: "Burglary".to_string(),
        gender: "male".to_string(),
        intake_date: NaiveDate::from_ymd_opt(2023, 6, 12).expect("valid"),
        date_of_birth: NaiveDate::from_ymd_opt(1990, 2, 4).expect("valid"),
        assigned_prison: assigned.map(|id| PrisonId(id.to_string())),
        time_remaining: Some("2 years".to_string()),
    }
}

pub(super) fn woreda_officer() -> Actor {
    Actor::new("woreda-7", ActorRole::Woreda)
}

pub(super) fn inspector() -> Actor {
    Actor::new("inspector-2", ActorRole::Inspector)
}

pub(super) fn draft(inmate_id: &str, to_prison: &str) -> TransferDraft {
    TransferDraft {
        inmate_id: InmateId(inmate_id.to_string()),
        to_prison: PrisonId(to_prison.to_string()),
        reason: "Closer to family".to_string(),
        requested_by: woreda_officer(),
    }
}

/// Service plus handles on every fake store.
pub(super) struct Harness {
    pub(super) service: Service,
    pub(super) transfers: Arc<MemoryTransfers>,
    pub(super) inmates: Arc<MemoryInmates>,
    pub(super) prisons: Arc<MemoryPrisons>,
    pub(super) events: Arc<MemoryEvents>,
}

impl Harness {
    pub(super) fn population(&self, id: &str) -> u32 {
        self.prisons
            .get(&PrisonId(id.to_string()))
            .expect("prison seeded")
            .current_population
    }

    pub(super) fn assigned_prison(&self, id: &str) -> Option<PrisonId> {
        self.inmates
            .find(&InmateId(id.to_string()))
            .expect("inmate lookup")
            .expect("inmate seeded")
            .assigned_prison
    }
}

/// Prisons A (10), B (5), C (40) active; M under maintenance; inmate X held in A.
pub(super) fn harness() -> Harness {
    let transfers = Arc::new(MemoryTransfers::default());
    let inmates = Arc::new(MemoryInmates::default());
    let prisons = Arc::new(MemoryPrisons::default());
    let events = Arc::new(MemoryEvents::default());

    prisons.seed(prison("A", "Addis Central", 10, PrisonStatus::Active));
    prisons.seed(prison("B", "Bahir Dar", 5, PrisonStatus::Active));
    prisons.seed(prison("C", "Dire Dawa", 40, PrisonStatus::Active));
    prisons.seed(prison("M", "Hawassa", 12, PrisonStatus::Maintenance));
    inmates.seed(inmate("X", Some("A")));

    let service = TransferWorkflowService::new(
        transfers.clone(),
        inmates.clone(),
        prisons.clone(),
        events.clone(),
        TransferConfig {
            population_retry_attempts: 3,
        },
    )
    .with_clock(Arc::new(FixedClock::on(today())));

    Harness {
        service,
        transfers,
        inmates,
        prisons,
        events,
    }
}

type Interleaved = Box<dyn FnOnce(&mut TransferRequest) + Send>;

#[derive(Default)]
pub(super) struct MemoryTransfers {
    records: Mutex<HashMap<TransferId, TransferRequest>>,
    failing_updates: Mutex<u32>,
    interleaved: Mutex<Option<Interleaved>>,
    rendezvous: Mutex<Option<(Arc<Barrier>, usize)>>,
}

impl MemoryTransfers {
    pub(super) fn fail_next_updates(&self, count: u32) {
        *self.failing_updates.lock().expect("transfer mutex poisoned") = count;
    }

    /// Change the stored record just before the next conditional write compares it,
    /// as a competing writer would.
    pub(super) fn interleave_next_write(
        &self,
        change: impl FnOnce(&mut TransferRequest) + Send + 'static,
    ) {
        *self.interleaved.lock().expect("transfer mutex poisoned") = Some(Box::new(change));
    }

    /// Hold the next `readers` fetches until all of them have read.
    pub(super) fn rendezvous_next_fetches(&self, readers: usize) {
        *self.rendezvous.lock().expect("transfer mutex poisoned") =
            Some((Arc::new(Barrier::new(readers)), readers));
    }

    pub(super) fn stored(&self, id: &TransferId) -> TransferRequest {
        self.records
            .lock()
            .expect("transfer mutex poisoned")
            .get(id)
            .cloned()
            .expect("transfer stored")
    }
}

impl TransferRepository for MemoryTransfers {
    fn insert(&self, record: TransferRequest) -> Result<TransferRequest, RepositoryError> {
        let mut guard = self.records.lock().expect("transfer mutex poisoned");
        let duplicate = guard
            .values()
            .any(|existing| existing.inmate_id == record.inmate_id && existing.is_active());
        if duplicate || guard.contains_key(&record.id) {
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
        let mut failing = self.failing_updates.lock().expect("transfer mutex poisoned");
        if *failing > 0 {
            *failing -= 1;
            return Err(RepositoryError::Unavailable("write timeout".to_string()));
        }
        drop(failing);

        let interleaved = self.interleaved.lock().expect("transfer mutex poisoned").take();
        let mut guard = self.records.lock().expect("transfer mutex poisoned");
        if let (Some(change), Some(slot)) = (interleaved, guard.get_mut(&record.id)) {
            change(slot);
        }
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
        let record = self
            .records
            .lock()
            .expect("transfer mutex poisoned")
            .get(id)
            .cloned();

        let barrier = {
            let mut rendezvous = self.rendezvous.lock().expect("transfer mutex poisoned");
            match rendezvous.take() {
                Some((barrier, remaining)) => {
                    if remaining > 1 {
                        *rendezvous = Some((barrier.clone(), remaining - 1));
                    }
                    Some(barrier)
                }
                None => None,
            }
        };
        if let Some(barrier) = barrier {
            barrier.wait();
        }
        Ok(record)
    }

    fn find_active_for_inmate(
        &self,
        inmate: &InmateId,
    ) -> Result<Option<TransferRequest>, RepositoryError> {
        let guard = self.records.lock().expect("transfer mutex poisoned");
        Ok(guard
            .values()
            .find(|record| &record.inmate_id == inmate && record.is_active())
            .cloned())
    }

    fn list(&self) -> Result<Vec<TransferRequest>, RepositoryError> {
        let guard = self.records.lock().expect("transfer mutex poisoned");
        Ok(guard.values().cloned().collect())
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

#[derive(Default)]
pub(super) struct MemoryPrisons {
    records: Mutex<HashMap<PrisonId, Prison>>,
    failures: Mutex<HashMap<PrisonId, u32>>,
}

impl MemoryPrisons {
    pub(super) fn seed(&self, prison: Prison) {
        self.records
            .lock()
            .expect("prison mutex poisoned")
            .insert(prison.id.clone(), prison);
    }

    pub(super) fn remove(&self, id: &str) {
        self.records
            .lock()
            .expect("prison mutex poisoned")
            .remove(&PrisonId(id.to_string()));
    }

    pub(super) fn get(&self, id: &PrisonId) -> Option<Prison> {
        self.records
            .lock()
            .expect("prison mutex poisoned")
            .get(id)
            .cloned()
    }

    /// Make the next `count` adjustments against `id` fail as unavailable.
    pub(super) fn fail_adjustments(&self, id: &str, count: u32) {
        self.failures
            .lock()
            .expect("prison mutex poisoned")
            .insert(PrisonId(id.to_string()), count);
    }
}

impl PrisonRegistry for MemoryPrisons {
    fn find(&self, id: &PrisonId) -> Result<Option<Prison>, RepositoryError> {
        Ok(self.get(id))
    }

    fn adjust_population(
        &self,
        id: &PrisonId,
        delta: i32,
    ) -> Result<PopulationAdjustment, RepositoryError> {
        {
            let mut failures = self.failures.lock().expect("prison mutex poisoned");
            if let Some(remaining) = failures.get_mut(id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(RepositoryError::Unavailable("store timeout".to_string()));
                }
            }
        }

        let mut guard = self.records.lock().expect("prison mutex poisoned");
        let prison = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        let adjustment = PopulationAdjustment::compute(prison.current_population, delta);
        prison.current_population = adjustment.current;
        Ok(adjustment)
    }

    fn list_active(&self) -> Result<Vec<Prison>, RepositoryError> {
        let guard = self.records.lock().expect("prison mutex poisoned");
        Ok(guard
            .values()
            .filter(|prison| prison.accepts_transfers())
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(super) struct MemoryEvents {
    events: Mutex<Vec<TransferEvent>>,
    offline: Mutex<bool>,
}

impl MemoryEvents {
    pub(super) fn events(&self) -> Vec<TransferEvent> {
        self.events.lock().expect("event mutex poisoned").clone()
    }

    pub(super) fn go_offline(&self) {
        *self.offline.lock().expect("event mutex poisoned") = true;
    }
}

impl TransferEventPublisher for MemoryEvents {
    fn publish(&self, event: TransferEvent) -> Result<(), EventError> {
        if *self.offline.lock().expect("event mutex poisoned") {
            return Err(EventError::Transport("broker offline".to_string()));
        }
        self.events.lock().expect("event mutex poisoned").push(event);
        Ok(())
    }
}

pub(super) async fn read_json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
