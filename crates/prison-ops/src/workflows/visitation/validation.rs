use chrono::{Days, NaiveDate};

use super::domain::{
    Relationship, SchedulePayload, VisitDuration, VisitTime, VisitorIdentity,
};
use crate::workflows::transfer::InmateId;
use crate::workflows::{ValidationErrors, WorkflowError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FormMode {
    Create,
    Edit,
}

/// A merged payload that passed every field rule.
#[derive(Debug, Clone)]
pub(crate) struct ValidatedVisit {
    pub(crate) identity: VisitorIdentity,
    pub(crate) purpose: String,
    pub(crate) relationship: Relationship,
    pub(crate) visit_date: NaiveDate,
    pub(crate) visit_time: VisitTime,
    pub(crate) visit_duration: VisitDuration,
    pub(crate) notes: Option<String>,
    pub(crate) inmate_id: Option<InmateId>,
    pub(crate) inmate_name: Option<String>,
    pub(crate) visitor_photo: String,
    pub(crate) id_photo: String,
}

/// Check identity fields, then visit fields, then the date. Every failing field is reported.
///
/// Bookable dates run from `today` for `horizon_days` days, end exclusive.
pub(crate) fn validate_schedule(
    form: &SchedulePayload,
    mode: FormMode,
    today: NaiveDate,
    horizon_days: u32,
) -> Result<ValidatedVisit, WorkflowError> {
    let mut errors = ValidationErrors::new();

    let first_name = text(&mut errors, "first_name", &form.first_name, "First name is required");
    let last_name = text(&mut errors, "last_name", &form.last_name, "Last name is required");
    let phone = text(&mut errors, "phone", &form.phone, "Phone number is required");
    if form.id_type.is_none() {
        errors.add("id_type", "ID type is required");
    }
    let id_number = text(&mut errors, "id_number", &form.id_number, "ID number is required");

    let (visitor_photo, id_photo) = match mode {
        FormMode::Create => (
            text(&mut errors, "visitor_photo", &form.visitor_photo, "Visitor photo is required"),
            text(&mut errors, "id_photo", &form.id_photo, "ID photo is required"),
        ),
        // Edits keep whatever references were stored at creation.
        FormMode::Edit => (
            Some(trimmed(&form.visitor_photo).unwrap_or_default()),
            Some(trimmed(&form.id_photo).unwrap_or_default()),
        ),
    };

    let purpose = text(&mut errors, "purpose", &form.purpose, "Purpose is required");
    if form.relationship.is_none() {
        errors.add("relationship", "Relationship is required");
    }
    if form.visit_date.is_none() {
        errors.add("visit_date", "Visit date is required");
    }
    if form.visit_time.is_none() {
        errors.add("visit_time", "Visit time is required");
    }

    if let Some(date) = form.visit_date {
        let horizon_end = today
            .checked_add_days(Days::new(u64::from(horizon_days)))
            .unwrap_or(NaiveDate::MAX);
        if date < today {
            errors.add("visit_date", "Visit date cannot be in the past");
        } else if date >= horizon_end {
            errors.add(
                "visit_date",
                format!("Visit date must be within the next {horizon_days} days"),
            );
        }
    }

    let (
        Some(first_name),
        Some(last_name),
        Some(phone),
        Some(id_type),
        Some(id_number),
        Some(visitor_photo),
        Some(id_photo),
        Some(purpose),
        Some(relationship),
        Some(visit_date),
        Some(visit_time),
    ) = (
        first_name,
        last_name,
        phone,
        form.id_type,
        id_number,
        visitor_photo,
        id_photo,
        purpose,
        form.relationship,
        form.visit_date,
        form.visit_time,
    )
    else {
        return Err(WorkflowError::Validation(errors));
    };
    errors.into_result()?;

    Ok(ValidatedVisit {
        identity: VisitorIdentity {
            first_name,
            middle_name: trimmed(&form.middle_name),
            last_name,
            phone,
            id_type,
            id_number,
            id_expiry_date: form.id_expiry_date,
        },
        purpose,
        relationship,
        visit_date,
        visit_time,
        visit_duration: form.visit_duration.unwrap_or_default(),
        notes: trimmed(&form.notes),
        inmate_id: form
            .inmate_id
            .as_ref()
            .filter(|id| !id.0.trim().is_empty())
            .cloned(),
        inmate_name: trimmed(&form.inmate_name),
        visitor_photo,
        id_photo,
    })
}

fn text(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: &Option<String>,
    message: &str,
) -> Option<String> {
    errors.require(field, value.as_deref(), message);
    trimmed(value)
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
