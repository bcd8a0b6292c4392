use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::transfer::InmateId;
use crate::workflows::Actor;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScheduleId(pub String);

/// Identity of the booking visitor, resolved by the boundary layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VisitorId(pub String);

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for VisitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VisitStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitAction {
    Approve,
    Reject,
    Cancel,
    Edit,
}

impl VisitAction {
    pub const fn label(self) -> &'static str {
        match self {
            VisitAction::Approve => "approve",
            VisitAction::Reject => "reject",
            VisitAction::Cancel => "cancel",
            VisitAction::Edit => "edit",
        }
    }
}

impl VisitStatus {
    pub const fn label(self) -> &'static str {
        match self {
            VisitStatus::Pending => "Pending",
            VisitStatus::Approved => "Approved",
            VisitStatus::Rejected => "Rejected",
            VisitStatus::Cancelled => "Cancelled",
        }
    }

    /// Whether a schedule in this status holds one of the day's slots.
    pub const fn consumes_capacity(self) -> bool {
        matches!(self, VisitStatus::Pending | VisitStatus::Approved)
    }

    pub const fn apply(self, action: VisitAction) -> Option<VisitStatus> {
        match (self, action) {
            (VisitStatus::Pending, VisitAction::Approve) => Some(VisitStatus::Approved),
            (VisitStatus::Pending, VisitAction::Reject) => Some(VisitStatus::Rejected),
            (VisitStatus::Pending, VisitAction::Edit) => Some(VisitStatus::Pending),
            (VisitStatus::Pending | VisitStatus::Approved, VisitAction::Cancel) => {
                Some(VisitStatus::Cancelled)
            }
            _ => None,
        }
    }
}

/// Bookable time slots. Visits are only held in these windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VisitTime {
    #[serde(rename = "09:00 AM")]
    Nine,
    #[serde(rename = "10:00 AM")]
    Ten,
    #[serde(rename = "11:00 AM")]
    Eleven,
    #[serde(rename = "01:00 PM")]
    One,
    #[serde(rename = "02:00 PM")]
    Two,
    #[serde(rename = "03:00 PM")]
    Three,
}

impl VisitTime {
    pub const ALL: [VisitTime; 6] = [
        VisitTime::Nine,
        VisitTime::Ten,
        VisitTime::Eleven,
        VisitTime::One,
        VisitTime::Two,
        VisitTime::Three,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            VisitTime::Nine => "09:00 AM",
            VisitTime::Ten => "10:00 AM",
            VisitTime::Eleven => "11:00 AM",
            VisitTime::One => "01:00 PM",
            VisitTime::Two => "02:00 PM",
            VisitTime::Three => "03:00 PM",
        }
    }
}

/// Visit length in minutes; serialized as the plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum VisitDuration {
    Quarter,
    #[default]
    HalfHour,
    ThreeQuarters,
    Hour,
}

impl VisitDuration {
    pub const fn minutes(self) -> u16 {
        match self {
            VisitDuration::Quarter => 15,
            VisitDuration::HalfHour => 30,
            VisitDuration::ThreeQuarters => 45,
            VisitDuration::Hour => 60,
        }
    }
}

impl TryFrom<u16> for VisitDuration {
    type Error = String;

    fn try_from(minutes: u16) -> Result<Self, Self::Error> {
        match minutes {
            15 => Ok(VisitDuration::Quarter),
            30 => Ok(VisitDuration::HalfHour),
            45 => Ok(VisitDuration::ThreeQuarters),
            60 => Ok(VisitDuration::Hour),
            other => Err(format!(
                "visit duration must be 15, 30, 45 or 60 minutes, got {other}"
            )),
        }
    }
}

impl From<VisitDuration> for u16 {
    fn from(duration: VisitDuration) -> Self {
        duration.minutes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    Passport,
    NationalId,
    DriversLicense,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    Parent,
    Spouse,
    Child,
    Sibling,
    Relative,
    Friend,
    Legal,
    Other,
}

/// Visitor identity as captured on the booking form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorIdentity {
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub last_name: String,
    pub phone: String,
    pub id_type: IdType,
    pub id_number: String,
    #[serde(default)]
    pub id_expiry_date: Option<NaiveDate>,
}

/// Who is being visited. Bookings proceed with a free-text name when no inmate record matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VisitInmate {
    OnFile { id: InmateId, name: String },
    Unlisted { name: String },
}

impl VisitInmate {
    pub fn name(&self) -> &str {
        match self {
            VisitInmate::OnFile { name, .. } | VisitInmate::Unlisted { name } => name,
        }
    }
}

/// Stored visit booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitSchedule {
    pub id: ScheduleId,
    pub visitor_id: VisitorId,
    pub inmate: Option<VisitInmate>,
    pub visit_date: NaiveDate,
    pub visit_time: VisitTime,
    pub visit_duration: VisitDuration,
    pub status: VisitStatus,
    pub identity: VisitorIdentity,
    /// Storage references returned by the upload collaborator.
    pub visitor_photo: String,
    pub id_photo: String,
    pub purpose: String,
    pub relationship: Relationship,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<Actor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl VisitSchedule {
    pub fn consumes_capacity(&self) -> bool {
        self.status.consumes_capacity()
    }
}

/// Sparse create/edit payload. On edit, anything left out keeps its stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulePayload {
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub id_type: Option<IdType>,
    pub id_number: Option<String>,
    pub id_expiry_date: Option<NaiveDate>,
    pub purpose: Option<String>,
    pub relationship: Option<Relationship>,
    pub inmate_id: Option<InmateId>,
    pub inmate_name: Option<String>,
    pub visit_date: Option<NaiveDate>,
    pub visit_time: Option<VisitTime>,
    pub visit_duration: Option<VisitDuration>,
    pub notes: Option<String>,
    pub visitor_photo: Option<String>,
    pub id_photo: Option<String>,
}

impl SchedulePayload {
    /// Full payload describing what is currently stored.
    pub fn from_schedule(schedule: &VisitSchedule) -> Self {
        let (inmate_id, inmate_name) = match &schedule.inmate {
            Some(VisitInmate::OnFile { id, .. }) => (Some(id.clone()), None),
            Some(VisitInmate::Unlisted { name }) => (None, Some(name.clone())),
            None => (None, None),
        };

        Self {
            first_name: Some(schedule.identity.first_name.clone()),
            middle_name: schedule.identity.middle_name.clone(),
            last_name: Some(schedule.identity.last_name.clone()),
            phone: Some(schedule.identity.phone.clone()),
            id_type: Some(schedule.identity.id_type),
            id_number: Some(schedule.identity.id_number.clone()),
            id_expiry_date: schedule.identity.id_expiry_date,
            purpose: Some(schedule.purpose.clone()),
            relationship: Some(schedule.relationship),
            inmate_id,
            inmate_name,
            visit_date: Some(schedule.visit_date),
            visit_time: Some(schedule.visit_time),
            visit_duration: Some(schedule.visit_duration),
            notes: schedule.notes.clone(),
            visitor_photo: Some(schedule.visitor_photo.clone()),
            id_photo: Some(schedule.id_photo.clone()),
        }
    }

    /// Overlay `patch` on top of `self`; fields the patch leaves out are kept.
    pub fn merged_with(self, patch: SchedulePayload) -> Self {
        // The inmate reference is replaced as a unit so an old id never shadows a new name.
        let (inmate_id, inmate_name) = if patch.inmate_id.is_some() || patch.inmate_name.is_some()
        {
            (patch.inmate_id, patch.inmate_name)
        } else {
            (self.inmate_id, self.inmate_name)
        };

        Self {
            first_name: patch.first_name.or(self.first_name),
            middle_name: patch.middle_name.or(self.middle_name),
            last_name: patch.last_name.or(self.last_name),
            phone: patch.phone.or(self.phone),
            id_type: patch.id_type.or(self.id_type),
            id_number: patch.id_number.or(self.id_number),
            id_expiry_date: patch.id_expiry_date.or(self.id_expiry_date),
            purpose: patch.purpose.or(self.purpose),
            relationship: patch.relationship.or(self.relationship),
            inmate_id,
            inmate_name,
            visit_date: patch.visit_date.or(self.visit_date),
            visit_time: patch.visit_time.or(self.visit_time),
            visit_duration: patch.visit_duration.or(self.visit_duration),
            notes: patch.notes.or(self.notes),
            visitor_photo: upload(patch.visitor_photo).or(self.visitor_photo),
            id_photo: upload(patch.id_photo).or(self.id_photo),
        }
    }
}

/// An empty upload field means "no new file", never "clear the stored one".
fn upload(reference: Option<String>) -> Option<String> {
    reference.filter(|reference| !reference.trim().is_empty())
}
