use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

/// Field-keyed validation messages, reported together so forms can highlight every problem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<&'static str, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for `field`. The first message per field wins.
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    pub fn require(&mut self, field: &'static str, value: Option<&str>, message: &str) {
        if value.map_or(true, |raw| raw.trim().is_empty()) {
            self.add(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.keys().copied()
    }

    pub fn into_result(self) -> Result<(), WorkflowError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .0
            .iter()
            .map(|(field, message)| format!("{field}: {message}"))
            .collect();
        write!(f, "{}", rendered.join("; "))
    }
}

/// Failure kinds surfaced by the transfer, visitation, and messaging engines.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("{0}")]
    Conflict(String),
    #[error("visit capacity of {max_capacity} reached for {date}")]
    CapacityExceeded {
        date: NaiveDate,
        max_capacity: u32,
        suggested_date: Option<NaiveDate>,
    },
    #[error("cannot {action} {entity} in status {from}")]
    InvalidStateTransition {
        entity: &'static str,
        from: &'static str,
        action: &'static str,
    },
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl WorkflowError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, message);
        Self::Validation(errors)
    }

    /// Stable machine-readable label for API payloads.
    pub const fn kind(&self) -> &'static str {
        match self {
            WorkflowError::NotFound { .. } => "not_found",
            WorkflowError::Validation(_) => "validation",
            WorkflowError::Conflict(_) => "conflict",
            WorkflowError::CapacityExceeded { .. } => "capacity_exceeded",
            WorkflowError::InvalidStateTransition { .. } => "invalid_state_transition",
            WorkflowError::Forbidden(_) => "forbidden",
            WorkflowError::Repository(_) => "repository",
        }
    }
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("daily capacity reached for {0}")]
    CapacityReached(NaiveDate),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
