use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use super::domain::{PopulationLeg, PrisonId, TransferId, TransferRequest};
use super::repository::{InmateDirectory, PopulationAdjustment, PrisonRegistry};
use crate::workflows::RepositoryError;

/// Non-fatal problem raised while applying approval side effects.
///
/// The approval itself stands; these are surfaced for manual reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnomalyWarning {
    pub transfer_id: TransferId,
    pub kind: AnomalyKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Source population was already zero; the decrement was floored.
    PopulationClamped { prison_id: PrisonId },
    /// The leg kept failing after every retry.
    LegFailed {
        leg: PopulationLeg,
        attempts: u8,
        error: String,
    },
    /// The ledger write around the leg failed. Before the side effect this holds
    /// the leg back; after a failed leg it leaves the leg marked applied.
    LedgerNotPersisted { leg: PopulationLeg, error: String },
    /// The event hook rejected a post-commit notification.
    EventNotDelivered { error: String },
}

impl AnomalyWarning {
    pub fn new(transfer_id: &TransferId, kind: AnomalyKind) -> Self {
        Self {
            transfer_id: transfer_id.clone(),
            kind,
        }
    }
}

impl fmt::Display for AnomalyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AnomalyKind::PopulationClamped { prison_id } => write!(
                f,
                "transfer {}: population of {} was already zero, decrement clamped",
                self.transfer_id, prison_id
            ),
            AnomalyKind::LegFailed {
                leg,
                attempts,
                error,
            } => write!(
                f,
                "transfer {}: {} failed after {} attempt(s): {}",
                self.transfer_id,
                leg.label(),
                attempts,
                error
            ),
            AnomalyKind::LedgerNotPersisted { leg, error } => write!(
                f,
                "transfer {}: ledger for {} not saved: {}",
                self.transfer_id,
                leg.label(),
                error
            ),
            AnomalyKind::EventNotDelivered { error } => write!(
                f,
                "transfer {}: event not delivered: {}",
                self.transfer_id, error
            ),
        }
    }
}

/// What landing a single leg produced.
pub(crate) enum LegOutcome {
    Applied { prison: Option<PrisonId> },
    Clamped { prison: PrisonId },
}

/// Applies one leg, retrying transient store failures up to `attempts` times.
pub(crate) fn apply_leg<I, P>(
    inmates: &I,
    prisons: &P,
    transfer: &TransferRequest,
    leg: PopulationLeg,
    attempts: u8,
) -> Result<LegOutcome, AnomalyWarning>
where
    I: InmateDirectory + ?Sized,
    P: PrisonRegistry + ?Sized,
{
    let attempts = attempts.max(1);
    let mut last_error = RepositoryError::Unavailable("not attempted".to_string());

    for attempt in 1..=attempts {
        let result = match leg {
            PopulationLeg::ReleaseSource => match transfer.from_prison.as_ref() {
                Some(source) => prisons
                    .adjust_population(source, -1)
                    .map(|adjustment| released(source, adjustment)),
                None => Ok(LegOutcome::Applied { prison: None }),
            },
            PopulationLeg::AdmitDestination => prisons
                .adjust_population(&transfer.to_prison, 1)
                .map(|_| LegOutcome::Applied {
                    prison: Some(transfer.to_prison.clone()),
                }),
            PopulationLeg::ReassignInmate => inmates
                .update_assigned_prison(&transfer.inmate_id, &transfer.to_prison)
                .map(|_| LegOutcome::Applied { prison: None }),
        };

        match result {
            Ok(outcome) => return Ok(outcome),
            // A missing record will not reappear on retry.
            Err(RepositoryError::NotFound) => {
                debug!(transfer = %transfer.id, leg = leg.label(), attempt, "target record missing");
                return Err(leg_failed(transfer, leg, attempt, &RepositoryError::NotFound));
            }
            Err(err) => {
                debug!(transfer = %transfer.id, leg = leg.label(), attempt, error = %err, "population leg failed");
                last_error = err;
            }
        }
    }

    Err(leg_failed(transfer, leg, attempts, &last_error))
}

fn released(source: &PrisonId, adjustment: PopulationAdjustment) -> LegOutcome {
    if adjustment.clamped {
        LegOutcome::Clamped {
            prison: source.clone(),
        }
    } else {
        LegOutcome::Applied {
            prison: Some(source.clone()),
        }
    }
}

fn leg_failed(
    transfer: &TransferRequest,
    leg: PopulationLeg,
    attempts: u8,
    error: &RepositoryError,
) -> AnomalyWarning {
    let anomaly = AnomalyWarning::new(
        &transfer.id,
        AnomalyKind::LegFailed {
            leg,
            attempts,
            error: error.to_string(),
        },
    );
    warn!(transfer = %transfer.id, leg = leg.label(), %anomaly, "population leg needs reconciliation");
    anomaly
}
