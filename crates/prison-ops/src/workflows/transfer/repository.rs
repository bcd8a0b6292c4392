use serde::{Deserialize, Serialize};

use super::domain::{
    Inmate, InmateId, Prison, PrisonId, TransferId, TransferRequest, TransferRevision,
};
use crate::workflows::RepositoryError;

/// Inmate store contract.
pub trait InmateDirectory: Send + Sync {
    fn find(&self, id: &InmateId) -> Result<Option<Inmate>, RepositoryError>;
    fn update_assigned_prison(
        &self,
        id: &InmateId,
        prison: &PrisonId,
    ) -> Result<(), RepositoryError>;
}

/// Result of an atomic population adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationAdjustment {
    pub previous: u32,
    pub current: u32,
    /// Set when a decrement would have gone below zero and was floored.
    pub clamped: bool,
}

impl PopulationAdjustment {
    /// Apply `delta` to `previous`, flooring at zero.
    pub fn compute(previous: u32, delta: i32) -> Self {
        let target = i64::from(previous) + i64::from(delta);
        let clamped = target < 0;
        let current = u32::try_from(target.max(0)).unwrap_or(u32::MAX);
        Self {
            previous,
            current,
            clamped,
        }
    }
}

/// Prison store contract. `adjust_population` must be a single atomic field update.
pub trait PrisonRegistry: Send + Sync {
    fn find(&self, id: &PrisonId) -> Result<Option<Prison>, RepositoryError>;
    fn adjust_population(
        &self,
        id: &PrisonId,
        delta: i32,
    ) -> Result<PopulationAdjustment, RepositoryError>;
    fn list_active(&self) -> Result<Vec<Prison>, RepositoryError>;
}

/// Transfer store contract.
///
/// `insert` must reject a record whose inmate already has an active transfer,
/// checked and written as one step, returning [`RepositoryError::Conflict`].
///
/// `update_if_current` replaces the stored record only while its revision still
/// equals `expected`, again as one step. A stale revision is
/// [`RepositoryError::Conflict`]; a missing record is [`RepositoryError::NotFound`].
pub trait TransferRepository: Send + Sync {
    fn insert(&self, record: TransferRequest) -> Result<TransferRequest, RepositoryError>;
    fn update_if_current(
        &self,
        record: TransferRequest,
        expected: &TransferRevision,
    ) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &TransferId) -> Result<Option<TransferRequest>, RepositoryError>;
    fn find_active_for_inmate(
        &self,
        inmate: &InmateId,
    ) -> Result<Option<TransferRequest>, RepositoryError>;
    fn list(&self) -> Result<Vec<TransferRequest>, RepositoryError>;
}

/// Domain events so dependent views (dashboards, population widgets) can refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransferEvent {
    Requested {
        transfer_id: TransferId,
        inmate_id: InmateId,
    },
    Approved {
        transfer_id: TransferId,
        inmate_id: InmateId,
    },
    Rejected {
        transfer_id: TransferId,
        inmate_id: InmateId,
    },
    PopulationChanged {
        transfer_id: TransferId,
        prisons: Vec<PrisonId>,
    },
}

impl TransferEvent {
    pub fn transfer_id(&self) -> &TransferId {
        match self {
            TransferEvent::Requested { transfer_id, .. }
            | TransferEvent::Approved { transfer_id, .. }
            | TransferEvent::Rejected { transfer_id, .. }
            | TransferEvent::PopulationChanged { transfer_id, .. } => transfer_id,
        }
    }
}

/// Outbound event hook.
pub trait TransferEventPublisher: Send + Sync {
    fn publish(&self, event: TransferEvent) -> Result<(), EventError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("event transport unavailable: {0}")]
    Transport(String),
}
