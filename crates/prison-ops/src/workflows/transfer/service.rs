use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::{
    InmateId, InmateSnapshot, LegState, PopulationLedger, PopulationLeg, Prison, PrisonId,
    RequestDetails, RequestedBy, StatusChange, TransferAction, TransferDraft, TransferId,
    TransferRequest, TransferRevision, TransferStatus,
};
use super::population::{apply_leg, AnomalyKind, AnomalyWarning, LegOutcome};
use super::repository::{
    InmateDirectory, PrisonRegistry, TransferEvent, TransferEventPublisher, TransferRepository,
};
use crate::clock::{Clock, SystemClock};
use crate::config::TransferConfig;
use crate::workflows::{Actor, ActorRole, RepositoryError, ValidationErrors, WorkflowError};

/// A stored transfer plus any non-fatal anomalies raised while producing it.
#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub transfer: TransferRequest,
    pub anomalies: Vec<AnomalyWarning>,
}

impl TransferOutcome {
    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty()
    }
}

/// Service owning the transfer lifecycle and its population accounting.
pub struct TransferWorkflowService<T, I, P, E> {
    transfers: Arc<T>,
    inmates: Arc<I>,
    prisons: Arc<P>,
    events: Arc<E>,
    clock: Arc<dyn Clock>,
    config: TransferConfig,
}

static TRANSFER_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_transfer_id() -> TransferId {
    let id = TRANSFER_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    TransferId(format!("trf-{id:06}"))
}

impl<T, I, P, E> TransferWorkflowService<T, I, P, E>
where
    T: TransferRepository + 'static,
    I: InmateDirectory + 'static,
    P: PrisonRegistry + 'static,
    E: TransferEventPublisher + 'static,
{
    pub fn new(
        transfers: Arc<T>,
        inmates: Arc<I>,
        prisons: Arc<P>,
        events: Arc<E>,
        config: TransferConfig,
    ) -> Self {
        Self {
            transfers,
            inmates,
            prisons,
            events,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// File a new transfer in `Pending`. Population is untouched until approval.
    pub fn create_transfer_request(
        &self,
        draft: TransferDraft,
    ) -> Result<TransferOutcome, WorkflowError> {
        let record = self.prepare(draft)?;
        let stored = self.insert(record)?;

        info!(
            transfer = %stored.id,
            inmate = %stored.inmate_id,
            to = %stored.to_prison,
            "transfer request filed"
        );

        let mut anomalies = Vec::new();
        self.emit(
            TransferEvent::Requested {
                transfer_id: stored.id.clone(),
                inmate_id: stored.inmate_id.clone(),
            },
            &mut anomalies,
        );

        Ok(TransferOutcome {
            transfer: stored,
            anomalies,
        })
    }

    /// Fast path: file and approve in one call, moving population immediately.
    pub fn create_approved_transfer(
        &self,
        draft: TransferDraft,
        approver: &Actor,
    ) -> Result<TransferOutcome, WorkflowError> {
        ensure_staff(approver, TransferAction::Approve)?;

        let mut record = self.prepare(draft)?;
        self.transition(
            &mut record,
            TransferAction::Approve,
            approver,
            Some("approved at filing".to_string()),
        )?;
        // Inserted while unsettled, so the record already blocks a second request.
        let mut stored = self.insert(record)?;

        info!(transfer = %stored.id, inmate = %stored.inmate_id, approver = %approver.id, "transfer filed pre-approved");

        let mut anomalies = Vec::new();
        self.emit(
            TransferEvent::Approved {
                transfer_id: stored.id.clone(),
                inmate_id: stored.inmate_id.clone(),
            },
            &mut anomalies,
        );
        self.settle_population(&mut stored, &mut anomalies);

        Ok(TransferOutcome {
            transfer: stored,
            anomalies,
        })
    }

    /// Move a pending transfer to `Under Review`.
    pub fn begin_review(
        &self,
        transfer_id: &TransferId,
        reviewer: &Actor,
    ) -> Result<TransferRequest, WorkflowError> {
        ensure_staff(reviewer, TransferAction::Review)?;

        let mut record = self.get(transfer_id)?;
        let expected = record.revision();
        self.transition(&mut record, TransferAction::Review, reviewer, None)?;
        self.save_transition(&record, &expected, TransferAction::Review)?;

        info!(transfer = %record.id, reviewer = %reviewer.id, "transfer under review");
        Ok(record)
    }

    /// Approve and apply population legs.
    ///
    /// Only one approval of a transfer can win; a concurrent loser sees
    /// [`WorkflowError::InvalidStateTransition`]. Leg failures never revert the
    /// approval; they come back as anomalies and the transfer stays listed in
    /// [`Self::pending_reconciliation`].
    pub fn approve_transfer(
        &self,
        transfer_id: &TransferId,
        approver: &Actor,
    ) -> Result<TransferOutcome, WorkflowError> {
        ensure_staff(approver, TransferAction::Approve)?;

        let mut record = self.get(transfer_id)?;
        let expected = record.revision();
        self.transition(&mut record, TransferAction::Approve, approver, None)?;
        self.save_transition(&record, &expected, TransferAction::Approve)?;

        info!(transfer = %record.id, approver = %approver.id, "transfer approved");

        let mut anomalies = Vec::new();
        self.emit(
            TransferEvent::Approved {
                transfer_id: record.id.clone(),
                inmate_id: record.inmate_id.clone(),
            },
            &mut anomalies,
        );
        self.settle_population(&mut record, &mut anomalies);

        Ok(TransferOutcome {
            transfer: record,
            anomalies,
        })
    }

    /// Reject without touching population or inmate assignment.
    pub fn reject_transfer(
        &self,
        transfer_id: &TransferId,
        approver: &Actor,
        rejection_reason: &str,
    ) -> Result<TransferOutcome, WorkflowError> {
        ensure_staff(approver, TransferAction::Reject)?;

        let mut errors = ValidationErrors::new();
        errors.require(
            "rejection_reason",
            Some(rejection_reason),
            "Rejection reason is required",
        );
        errors.into_result()?;

        let reason = rejection_reason.trim().to_string();
        let mut record = self.get(transfer_id)?;
        let expected = record.revision();
        self.transition(
            &mut record,
            TransferAction::Reject,
            approver,
            Some(reason.clone()),
        )?;
        record.rejection_reason = Some(reason);
        self.save_transition(&record, &expected, TransferAction::Reject)?;

        info!(transfer = %record.id, approver = %approver.id, "transfer rejected");

        let mut anomalies = Vec::new();
        self.emit(
            TransferEvent::Rejected {
                transfer_id: record.id.clone(),
                inmate_id: record.inmate_id.clone(),
            },
            &mut anomalies,
        );

        Ok(TransferOutcome {
            transfer: record,
            anomalies,
        })
    }

    /// Approved transfers whose population legs have not all landed.
    pub fn pending_reconciliation(&self) -> Result<Vec<TransferRequest>, WorkflowError> {
        let records = self.transfers.list()?;
        Ok(records
            .into_iter()
            .filter(TransferRequest::needs_reconciliation)
            .collect())
    }

    /// Re-apply whatever legs are still pending for an approved transfer.
    pub fn reconcile_population(
        &self,
        transfer_id: &TransferId,
    ) -> Result<TransferOutcome, WorkflowError> {
        let mut record = self.get(transfer_id)?;
        if record.status != TransferStatus::Approved {
            return Err(WorkflowError::InvalidStateTransition {
                entity: "transfer",
                from: record.status.label(),
                action: "reconcile",
            });
        }

        let mut anomalies = Vec::new();
        if !record.population.is_settled() {
            info!(transfer = %record.id, legs = ?record.population.pending_legs(), "reconciling population legs");
            self.settle_population(&mut record, &mut anomalies);
        }

        Ok(TransferOutcome {
            transfer: record,
            anomalies,
        })
    }

    /// Administrator override for a leg that can never land, such as one whose
    /// prison record was removed. The leg is dropped from the ledger and the
    /// note is kept in the transfer history.
    pub fn waive_population_leg(
        &self,
        transfer_id: &TransferId,
        leg: PopulationLeg,
        admin: &Actor,
        note: &str,
    ) -> Result<TransferRequest, WorkflowError> {
        if admin.role != ActorRole::Admin {
            return Err(WorkflowError::Forbidden(format!(
                "{} accounts cannot waive population legs",
                admin.role.label()
            )));
        }

        let mut errors = ValidationErrors::new();
        errors.require("note", Some(note), "A note explaining the waiver is required");
        errors.into_result()?;

        let mut record = self.get(transfer_id)?;
        if record.status != TransferStatus::Approved {
            return Err(WorkflowError::InvalidStateTransition {
                entity: "transfer",
                from: record.status.label(),
                action: "waive",
            });
        }

        let expected = record.revision();
        if !record.population.waive(leg) {
            return Err(WorkflowError::invalid(
                "leg",
                format!("{} is not awaiting reconciliation", leg.label()),
            ));
        }
        record.history.push(StatusChange {
            from: Some(record.status),
            to: record.status,
            actor: admin.clone(),
            at: self.clock.now(),
            note: Some(format!("waived {}: {}", leg.label(), note.trim())),
        });

        match self.transfers.update_if_current(record.clone(), &expected) {
            Ok(()) => {}
            Err(RepositoryError::Conflict) => {
                return Err(WorkflowError::Conflict(format!(
                    "transfer {} changed while waiving {}; reload and retry",
                    record.id,
                    leg.label()
                )));
            }
            Err(err) => return Err(err.into()),
        }

        info!(transfer = %record.id, leg = leg.label(), admin = %admin.id, "population leg waived");
        Ok(record)
    }

    pub fn get(&self, transfer_id: &TransferId) -> Result<TransferRequest, WorkflowError> {
        self.transfers
            .fetch(transfer_id)?
            .ok_or_else(|| WorkflowError::not_found("transfer", transfer_id.0.clone()))
    }

    pub fn list(&self) -> Result<Vec<TransferRequest>, WorkflowError> {
        let mut records = self.transfers.list()?;
        records.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(records)
    }

    /// Facilities currently accepting transfers, by name.
    pub fn destinations(&self) -> Result<Vec<Prison>, WorkflowError> {
        let mut prisons = self.prisons.list_active()?;
        prisons.retain(Prison::accepts_transfers);
        prisons.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(prisons)
    }

    pub fn active_transfer_for(
        &self,
        inmate_id: &InmateId,
    ) -> Result<Option<TransferRequest>, WorkflowError> {
        Ok(self.transfers.find_active_for_inmate(inmate_id)?)
    }

    fn prepare(&self, draft: TransferDraft) -> Result<TransferRequest, WorkflowError> {
        let TransferDraft {
            inmate_id,
            to_prison,
            reason,
            requested_by,
        } = draft;

        let mut errors = ValidationErrors::new();
        errors.require("inmate_id", Some(&inmate_id.0), "Inmate is required");
        errors.require(
            "to_prison",
            Some(&to_prison.0),
            "Destination prison is required",
        );
        errors.require("reason", Some(&reason), "Transfer reason is required");
        errors.into_result()?;

        let inmate = self
            .inmates
            .find(&inmate_id)?
            .ok_or_else(|| WorkflowError::not_found("inmate", inmate_id.0.clone()))?;
        let destination = self
            .prisons
            .find(&to_prison)?
            .ok_or_else(|| WorkflowError::not_found("prison", to_prison.0.clone()))?;

        if !destination.accepts_transfers() {
            return Err(WorkflowError::invalid(
                "to_prison",
                format!(
                    "{} is {} and not accepting transfers",
                    destination.name,
                    destination.status.label()
                ),
            ));
        }

        if inmate.assigned_prison.as_ref() == Some(&destination.id) {
            return Err(WorkflowError::invalid(
                "to_prison",
                "Destination must differ from the inmate's current prison",
            ));
        }

        if let Some(existing) = self.transfers.find_active_for_inmate(&inmate.id)? {
            return Err(active_transfer_conflict(&inmate.id, Some(&existing)));
        }

        let from_prison_name = match inmate.assigned_prison.as_ref() {
            Some(source) => self.source_name(source)?,
            None => None,
        };

        let now = self.clock.now();
        let from_prison = inmate.assigned_prison.clone();

        Ok(TransferRequest {
            id: next_transfer_id(),
            inmate_id: inmate.id.clone(),
            population: PopulationLedger::for_route(from_prison.as_ref()),
            request_details: RequestDetails {
                requested_by: RequestedBy {
                    actor_id: requested_by.id.clone(),
                    role: requested_by.role,
                    prison: from_prison.clone(),
                },
                request_date: now,
                from_prison_name,
                to_prison_name: destination.name.clone(),
            },
            inmate_data: InmateSnapshot::from(&inmate),
            from_prison,
            to_prison: destination.id,
            reason: reason.trim().to_string(),
            status: TransferStatus::Pending,
            rejection_reason: None,
            history: vec![StatusChange {
                from: None,
                to: TransferStatus::Pending,
                actor: requested_by,
                at: now,
                note: None,
            }],
            created_at: now,
        })
    }

    fn source_name(&self, source: &PrisonId) -> Result<Option<String>, WorkflowError> {
        let prison = self.prisons.find(source)?;
        if prison.is_none() {
            warn!(prison = %source, "inmate assigned to unknown prison; snapshot keeps id only");
        }
        Ok(prison.map(|prison| prison.name))
    }

    fn insert(&self, record: TransferRequest) -> Result<TransferRequest, WorkflowError> {
        let inmate_id = record.inmate_id.clone();
        self.transfers.insert(record).map_err(|err| match err {
            RepositoryError::Conflict => active_transfer_conflict(&inmate_id, None),
            other => other.into(),
        })
    }

    fn transition(
        &self,
        record: &mut TransferRequest,
        action: TransferAction,
        actor: &Actor,
        note: Option<String>,
    ) -> Result<(), WorkflowError> {
        let next =
            record
                .status
                .apply(action)
                .ok_or(WorkflowError::InvalidStateTransition {
                    entity: "transfer",
                    from: record.status.label(),
                    action: action.label(),
                })?;

        record.history.push(StatusChange {
            from: Some(record.status),
            to: next,
            actor: actor.clone(),
            at: self.clock.now(),
            note,
        });
        record.status = next;
        Ok(())
    }

    /// Stores a status change only if nobody moved the transfer since it was read.
    fn save_transition(
        &self,
        record: &TransferRequest,
        expected: &TransferRevision,
        action: TransferAction,
    ) -> Result<(), WorkflowError> {
        match self.transfers.update_if_current(record.clone(), expected) {
            Ok(()) => Ok(()),
            Err(RepositoryError::Conflict) => {
                let current = self.get(&record.id)?;
                debug!(transfer = %record.id, status = current.status.label(), "lost a concurrent status change");
                Err(WorkflowError::InvalidStateTransition {
                    entity: "transfer",
                    from: current.status.label(),
                    action: action.label(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn settle_population(&self, record: &mut TransferRequest, anomalies: &mut Vec<AnomalyWarning>) {
        let mut moved = Vec::new();

        for leg in record.population.pending_legs() {
            match self.claim_leg(record, leg) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(transfer = %record.id, leg = leg.label(), "leg claimed by another settle pass");
                    continue;
                }
                Err(err) => {
                    let anomaly = ledger_anomaly(&record.id, leg, &err);
                    warn!(transfer = %record.id, %anomaly, "halting population legs");
                    anomalies.push(anomaly);
                    break;
                }
            }

            match apply_leg(
                self.inmates.as_ref(),
                self.prisons.as_ref(),
                record,
                leg,
                self.config.population_retry_attempts,
            ) {
                Ok(LegOutcome::Applied { prison }) => moved.extend(prison),
                Ok(LegOutcome::Clamped { prison }) => {
                    let anomaly = AnomalyWarning::new(
                        &record.id,
                        AnomalyKind::PopulationClamped { prison_id: prison },
                    );
                    warn!(transfer = %record.id, %anomaly, "population decrement clamped at zero");
                    anomalies.push(anomaly);
                }
                Err(anomaly) => {
                    anomalies.push(anomaly);
                    if let Err(err) = self.release_claim(record, leg) {
                        let anomaly = ledger_anomaly(&record.id, leg, &err);
                        warn!(transfer = %record.id, %anomaly, "failed leg still marked applied");
                        anomalies.push(anomaly);
                        break;
                    }
                }
            }
        }

        if !moved.is_empty() {
            self.emit(
                TransferEvent::PopulationChanged {
                    transfer_id: record.id.clone(),
                    prisons: moved,
                },
                anomalies,
            );
        }
    }

    /// Marks `leg` applied in the store before its side effect runs.
    /// `Ok(false)` means another pass owns the leg.
    fn claim_leg(
        &self,
        record: &mut TransferRequest,
        leg: PopulationLeg,
    ) -> Result<bool, RepositoryError> {
        self.swap_leg(record, leg, LegState::Pending, PopulationLedger::mark_applied)
    }

    fn release_claim(
        &self,
        record: &mut TransferRequest,
        leg: PopulationLeg,
    ) -> Result<(), RepositoryError> {
        self.swap_leg(record, leg, LegState::Applied, PopulationLedger::mark_pending)
            .map(|_| ())
    }

    /// Conditional ledger write, re-reading the record whenever it changed underneath.
    fn swap_leg(
        &self,
        record: &mut TransferRequest,
        leg: PopulationLeg,
        from: LegState,
        mark: fn(&mut PopulationLedger, PopulationLeg),
    ) -> Result<bool, RepositoryError> {
        let attempts = self.config.population_retry_attempts.max(1);
        let mut last_error = RepositoryError::Unavailable("not attempted".to_string());

        if record.population.state(leg) != from {
            return Ok(false);
        }

        for _ in 0..attempts {
            let mut next = record.clone();
            mark(&mut next.population, leg);

            match self.transfers.update_if_current(next.clone(), &record.revision()) {
                Ok(()) => {
                    *record = next;
                    return Ok(true);
                }
                Err(RepositoryError::Conflict) => {
                    *record = self
                        .transfers
                        .fetch(&record.id)?
                        .ok_or(RepositoryError::NotFound)?;
                    if record.population.state(leg) != from {
                        return Ok(false);
                    }
                    last_error = RepositoryError::Conflict;
                }
                Err(err) => last_error = err,
            }
        }

        Err(last_error)
    }

    fn emit(&self, event: TransferEvent, anomalies: &mut Vec<AnomalyWarning>) {
        let transfer_id = event.transfer_id().clone();
        if let Err(err) = self.events.publish(event) {
            let anomaly = AnomalyWarning::new(
                &transfer_id,
                AnomalyKind::EventNotDelivered {
                    error: err.to_string(),
                },
            );
            warn!(%anomaly, "transfer event dropped");
            anomalies.push(anomaly);
        }
    }
}

fn ensure_staff(actor: &Actor, action: TransferAction) -> Result<(), WorkflowError> {
    if actor.role.is_staff() {
        Ok(())
    } else {
        Err(WorkflowError::Forbidden(format!(
            "{} accounts cannot {} transfers",
            actor.role.label(),
            action.label()
        )))
    }
}

fn ledger_anomaly(
    transfer_id: &TransferId,
    leg: PopulationLeg,
    err: &RepositoryError,
) -> AnomalyWarning {
    AnomalyWarning::new(
        transfer_id,
        AnomalyKind::LedgerNotPersisted {
            leg,
            error: err.to_string(),
        },
    )
}

fn active_transfer_conflict(
    inmate_id: &InmateId,
    existing: Option<&TransferRequest>,
) -> WorkflowError {
    match existing {
        Some(existing) => WorkflowError::Conflict(format!(
            "active transfer already exists for inmate {inmate_id} ({} is {})",
            existing.id,
            existing.status.label()
        )),
        None => WorkflowError::Conflict(format!(
            "active transfer already exists for inmate {inmate_id}"
        )),
    }
}
