//! Inmate transfer lifecycle and the population accounting driven by approvals.

pub mod domain;
pub mod population;
pub mod register;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    Inmate, InmateId, InmateSnapshot, LegState, PopulationLedger, PopulationLeg, Prison,
    PrisonId, PrisonStatus, RequestDetails, RequestedBy, StatusChange, TransferAction,
    TransferDraft, TransferId, TransferRequest, TransferRevision, TransferStatus,
};
pub use population::{AnomalyKind, AnomalyWarning};
pub use register::write_transfer_register;
pub use repository::{
    EventError, InmateDirectory, PopulationAdjustment, PrisonRegistry, TransferEvent,
    TransferEventPublisher, TransferRepository,
};
pub use router::transfer_router;
pub use service::{TransferOutcome, TransferWorkflowService};
