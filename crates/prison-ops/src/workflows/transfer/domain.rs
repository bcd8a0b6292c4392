use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::{Actor, ActorRole};

/// Identifier wrapper for inmate records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InmateId(pub String);

/// Identifier wrapper for facilities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrisonId(pub String);

/// Identifier wrapper for transfer requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransferId(pub String);

impl fmt::Display for InmateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PrisonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrisonStatus {
    Active,
    Inactive,
    Maintenance,
}

impl PrisonStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PrisonStatus::Active => "active",
            PrisonStatus::Inactive => "inactive",
            PrisonStatus::Maintenance => "maintenance",
        }
    }
}

/// Facility record as held by the prison store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prison {
    pub id: PrisonId,
    pub name: String,
    pub location: String,
    pub description: String,
    pub capacity: u32,
    pub current_population: u32,
    pub status: PrisonStatus,
}

impl Prison {
    pub fn accepts_transfers(&self) -> bool {
        self.status == PrisonStatus::Active
    }

    /// Population share of capacity in percent. Can exceed 100 since writes are not clamped.
    pub fn occupancy_percent(&self) -> u32 {
        if self.capacity == 0 {
            return 0;
        }
        let percent = u64::from(self.current_population) * 100 / u64::from(self.capacity);
        u32::try_from(percent).unwrap_or(u32::MAX)
    }
}

/// Inmate record as held by the inmate store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inmate {
    pub id: InmateId,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub last_name: String,
    pub crime: String,
    pub gender: String,
    pub intake_date: NaiveDate,
    pub date_of_birth: NaiveDate,
    pub assigned_prison: Option<PrisonId>,
    #[serde(default)]
    pub time_remaining: Option<String>,
}

impl Inmate {
    pub fn display_name(&self) -> String {
        match self.middle_name.as_deref().filter(|name| !name.is_empty()) {
            Some(middle) => format!("{} {} {}", self.first_name, middle, self.last_name),
            None => format!("{} {}", self.first_name, self.last_name),
        }
    }
}

/// Point-in-time copy of the inmate taken when the request is filed.
///
/// Not re-synced when the inmate record changes later; printed transfer papers
/// must show what the requester saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InmateSnapshot {
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub crime: String,
    pub gender: String,
    pub intake_date: NaiveDate,
    pub date_of_birth: NaiveDate,
    pub assigned_prison: Option<PrisonId>,
    pub time_remaining: Option<String>,
}

impl From<&Inmate> for InmateSnapshot {
    fn from(inmate: &Inmate) -> Self {
        Self {
            first_name: inmate.first_name.clone(),
            middle_name: inmate.middle_name.clone(),
            last_name: inmate.last_name.clone(),
            crime: inmate.crime.clone(),
            gender: inmate.gender.clone(),
            intake_date: inmate.intake_date,
            date_of_birth: inmate.date_of_birth,
            assigned_prison: inmate.assigned_prison.clone(),
            time_remaining: inmate.time_remaining.clone(),
        }
    }
}

impl InmateSnapshot {
    pub fn full_name(&self) -> String {
        match self.middle_name.as_deref().filter(|name| !name.is_empty()) {
            Some(middle) => format!("{} {} {}", self.first_name, middle, self.last_name),
            None => format!("{} {}", self.first_name, self.last_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedBy {
    pub actor_id: String,
    pub role: ActorRole,
    pub prison: Option<PrisonId>,
}

/// Denormalized request metadata, including prison names as they were at filing time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDetails {
    pub requested_by: RequestedBy,
    pub request_date: DateTime<Utc>,
    pub from_prison_name: Option<String>,
    pub to_prison_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferStatus {
    Pending,
    #[serde(rename = "Under Review")]
    UnderReview,
    Approved,
    Rejected,
}

/// Operations that move a transfer between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferAction {
    Review,
    Approve,
    Reject,
}

impl TransferAction {
    pub const fn label(self) -> &'static str {
        match self {
            TransferAction::Review => "review",
            TransferAction::Approve => "approve",
            TransferAction::Reject => "reject",
        }
    }
}

impl TransferStatus {
    pub const fn label(self) -> &'static str {
        match self {
            TransferStatus::Pending => "Pending",
            TransferStatus::UnderReview => "Under Review",
            TransferStatus::Approved => "Approved",
            TransferStatus::Rejected => "Rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Approved | TransferStatus::Rejected)
    }

    /// Next status for `action`, or `None` when the state machine forbids it.
    pub const fn apply(self, action: TransferAction) -> Option<TransferStatus> {
        match (self, action) {
            (TransferStatus::Pending, TransferAction::Review) => Some(TransferStatus::UnderReview),
            (TransferStatus::Pending | TransferStatus::UnderReview, TransferAction::Approve) => {
                Some(TransferStatus::Approved)
            }
            (TransferStatus::Pending | TransferStatus::UnderReview, TransferAction::Reject) => {
                Some(TransferStatus::Rejected)
            }
            _ => None,
        }
    }
}

/// Progress of one population side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegState {
    NotRequired,
    Pending,
    Applied,
}

/// The three mutations an approval drives, in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopulationLeg {
    ReleaseSource,
    AdmitDestination,
    ReassignInmate,
}

impl PopulationLeg {
    pub const ALL: [PopulationLeg; 3] = [
        PopulationLeg::ReleaseSource,
        PopulationLeg::AdmitDestination,
        PopulationLeg::ReassignInmate,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            PopulationLeg::ReleaseSource => "release_source",
            PopulationLeg::AdmitDestination => "admit_destination",
            PopulationLeg::ReassignInmate => "reassign_inmate",
        }
    }
}

/// Per-transfer record of which approval side effects already landed.
///
/// A leg is marked `Applied` and saved before its side effect runs, so a
/// concurrent or later settle pass never applies it twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationLedger {
    pub release_source: LegState,
    pub admit_destination: LegState,
    pub reassign_inmate: LegState,
}

impl PopulationLedger {
    pub fn for_route(from_prison: Option<&PrisonId>) -> Self {
        Self {
            release_source: if from_prison.is_some() {
                LegState::Pending
            } else {
                LegState::NotRequired
            },
            admit_destination: LegState::Pending,
            reassign_inmate: LegState::Pending,
        }
    }

    pub fn state(&self, leg: PopulationLeg) -> LegState {
        match leg {
            PopulationLeg::ReleaseSource => self.release_source,
            PopulationLeg::AdmitDestination => self.admit_destination,
            PopulationLeg::ReassignInmate => self.reassign_inmate,
        }
    }

    fn slot(&mut self, leg: PopulationLeg) -> &mut LegState {
        match leg {
            PopulationLeg::ReleaseSource => &mut self.release_source,
            PopulationLeg::AdmitDestination => &mut self.admit_destination,
            PopulationLeg::ReassignInmate => &mut self.reassign_inmate,
        }
    }

    pub fn mark_applied(&mut self, leg: PopulationLeg) {
        let slot = self.slot(leg);
        if *slot == LegState::Pending {
            *slot = LegState::Applied;
        }
    }

    /// Hand a claimed leg back after its side effect did not land.
    pub fn mark_pending(&mut self, leg: PopulationLeg) {
        let slot = self.slot(leg);
        if *slot == LegState::Applied {
            *slot = LegState::Pending;
        }
    }

    /// Drop a pending leg an administrator settled by hand.
    pub fn waive(&mut self, leg: PopulationLeg) -> bool {
        let slot = self.slot(leg);
        if *slot == LegState::Pending {
            *slot = LegState::NotRequired;
            true
        } else {
            false
        }
    }

    pub fn pending_legs(&self) -> Vec<PopulationLeg> {
        PopulationLeg::ALL
            .into_iter()
            .filter(|leg| self.state(*leg) == LegState::Pending)
            .collect()
    }

    /// True once every required leg has been applied ("populationApplied").
    pub fn is_settled(&self) -> bool {
        self.pending_legs().is_empty()
    }
}

/// Audit entry appended on every status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: Option<TransferStatus>,
    pub to: TransferStatus,
    pub actor: Actor,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Stored transfer request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub id: TransferId,
    pub inmate_id: InmateId,
    pub from_prison: Option<PrisonId>,
    pub to_prison: PrisonId,
    pub reason: String,
    pub status: TransferStatus,
    pub request_details: RequestDetails,
    pub inmate_data: InmateSnapshot,
    pub population: PopulationLedger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
}

impl TransferRequest {
    /// Whether this request blocks a new one for the same inmate.
    ///
    /// Approved requests stay active until their population legs are settled.
    pub fn is_active(&self) -> bool {
        match self.status {
            TransferStatus::Pending | TransferStatus::UnderReview => true,
            TransferStatus::Approved => !self.population.is_settled(),
            TransferStatus::Rejected => false,
        }
    }

    /// The fields a conditional write compares against the stored copy.
    pub fn revision(&self) -> TransferRevision {
        TransferRevision {
            status: self.status,
            population: self.population,
        }
    }

    pub fn needs_reconciliation(&self) -> bool {
        self.status == TransferStatus::Approved && !self.population.is_settled()
    }

    pub fn decided_by(&self) -> Option<&Actor> {
        self.history
            .iter()
            .rev()
            .find(|change| change.to.is_terminal() && change.from != Some(change.to))
            .map(|change| &change.actor)
    }
}

/// Snapshot of the mutable workflow state of a stored transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRevision {
    pub status: TransferStatus,
    pub population: PopulationLedger,
}

/// Inbound request to move an inmate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDraft {
    pub inmate_id: InmateId,
    pub to_prison: PrisonId,
    pub reason: String,
    pub requested_by: Actor,
}
