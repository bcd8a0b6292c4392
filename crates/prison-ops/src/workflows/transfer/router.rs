use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::domain::{PopulationLeg, TransferDraft, TransferId};
use super::register::write_transfer_register;
use super::repository::{
    InmateDirectory, PrisonRegistry, TransferEventPublisher, TransferRepository,
};
use super::service::TransferWorkflowService;
use crate::workflows::{Actor, WorkflowError};

type SharedService<T, I, P, E> = Arc<TransferWorkflowService<T, I, P, E>>;

#[derive(Debug, Deserialize)]
pub(crate) struct ApprovedTransferRequest {
    #[serde(flatten)]
    pub(crate) draft: TransferDraft,
    pub(crate) approver: Actor,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DecisionRequest {
    pub(crate) actor: Actor,
    #[serde(default)]
    pub(crate) reason: Option<String>,
}

/// Router exposing the transfer lifecycle.
pub fn transfer_router<T, I, P, E>(service: SharedService<T, I, P, E>) -> Router
where
    T: TransferRepository + 'static,
    I: InmateDirectory + 'static,
    P: PrisonRegistry + 'static,
    E: TransferEventPublisher + 'static,
{
    Router::new()
        .route(
            "/api/v1/transfers",
            get(list_handler::<T, I, P, E>).post(create_handler::<T, I, P, E>),
        )
        .route(
            "/api/v1/transfers/approved",
            post(create_approved_handler::<T, I, P, E>),
        )
        .route(
            "/api/v1/transfers/reconciliation",
            get(reconciliation_handler::<T, I, P, E>),
        )
        .route(
            "/api/v1/transfers/register.csv",
            get(register_handler::<T, I, P, E>),
        )
        .route(
            "/api/v1/transfers/destinations",
            get(destinations_handler::<T, I, P, E>),
        )
        .route(
            "/api/v1/transfers/:transfer_id",
            get(detail_handler::<T, I, P, E>),
        )
        .route(
            "/api/v1/transfers/:transfer_id/review",
            post(review_handler::<T, I, P, E>),
        )
        .route(
            "/api/v1/transfers/:transfer_id/approve",
            post(approve_handler::<T, I, P, E>),
        )
        .route(
            "/api/v1/transfers/:transfer_id/reject",
            post(reject_handler::<T, I, P, E>),
        )
        .route(
            "/api/v1/transfers/:transfer_id/reconcile",
            post(reconcile_handler::<T, I, P, E>),
        )
        .route(
            "/api/v1/transfers/:transfer_id/legs/:leg/waive",
            post(waive_leg_handler::<T, I, P, E>),
        )
        .with_state(service)
}

pub(crate) async fn create_handler<T, I, P, E>(
    State(service): State<SharedService<T, I, P, E>>,
    Json(draft): Json<TransferDraft>,
) -> Result<Response, WorkflowError>
where
    T: TransferRepository + 'static,
    I: InmateDirectory + 'static,
    P: PrisonRegistry + 'static,
    E: TransferEventPublisher + 'static,
{
    let outcome = service.create_transfer_request(draft)?;
    Ok((StatusCode::CREATED, Json(outcome)).into_response())
}

pub(crate) async fn create_approved_handler<T, I, P, E>(
    State(service): State<SharedService<T, I, P, E>>,
    Json(request): Json<ApprovedTransferRequest>,
) -> Result<Response, WorkflowError>
where
    T: TransferRepository + 'static,
    I: InmateDirectory + 'static,
    P: PrisonRegistry + 'static,
    E: TransferEventPublisher + 'static,
{
    let outcome = service.create_approved_transfer(request.draft, &request.approver)?;
    Ok((StatusCode::CREATED, Json(outcome)).into_response())
}

pub(crate) async fn list_handler<T, I, P, E>(
    State(service): State<SharedService<T, I, P, E>>,
) -> Result<Response, WorkflowError>
where
    T: TransferRepository + 'static,
    I: InmateDirectory + 'static,
    P: PrisonRegistry + 'static,
    E: TransferEventPublisher + 'static,
{
    let transfers = service.list()?;
    Ok(Json(transfers).into_response())
}

pub(crate) async fn detail_handler<T, I, P, E>(
    State(service): State<SharedService<T, I, P, E>>,
    Path(transfer_id): Path<String>,
) -> Result<Response, WorkflowError>
where
    T: TransferRepository + 'static,
    I: InmateDirectory + 'static,
    P: PrisonRegistry + 'static,
    E: TransferEventPublisher + 'static,
{
    let transfer = service.get(&TransferId(transfer_id))?;
    Ok(Json(transfer).into_response())
}

pub(crate) async fn review_handler<T, I, P, E>(
    State(service): State<SharedService<T, I, P, E>>,
    Path(transfer_id): Path<String>,
    Json(decision): Json<DecisionRequest>,
) -> Result<Response, WorkflowError>
where
    T: TransferRepository + 'static,
    I: InmateDirectory + 'static,
    P: PrisonRegistry + 'static,
    E: TransferEventPublisher + 'static,
{
    let transfer = service.begin_review(&TransferId(transfer_id), &decision.actor)?;
    Ok(Json(transfer).into_response())
}

pub(crate) async fn approve_handler<T, I, P, E>(
    State(service): State<SharedService<T, I, P, E>>,
    Path(transfer_id): Path<String>,
    Json(decision): Json<DecisionRequest>,
) -> Result<Response, WorkflowError>
where
    T: TransferRepository + 'static,
    I: InmateDirectory + 'static,
    P: PrisonRegistry + 'static,
    E: TransferEventPublisher + 'static,
{
    let outcome = service.approve_transfer(&TransferId(transfer_id), &decision.actor)?;
    Ok(Json(outcome).into_response())
}

pub(crate) async fn reject_handler<T, I, P, E>(
    State(service): State<SharedService<T, I, P, E>>,
    Path(transfer_id): Path<String>,
    Json(decision): Json<DecisionRequest>,
) -> Result<Response, WorkflowError>
where
    T: TransferRepository + 'static,
    I: InmateDirectory + 'static,
    P: PrisonRegistry + 'static,
    E: TransferEventPublisher + 'static,
{
    let reason = decision.reason.unwrap_or_default();
    let outcome = service.reject_transfer(&TransferId(transfer_id), &decision.actor, &reason)?;
    Ok(Json(outcome).into_response())
}

pub(crate) async fn reconciliation_handler<T, I, P, E>(
    State(service): State<SharedService<T, I, P, E>>,
) -> Result<Response, WorkflowError>
where
    T: TransferRepository + 'static,
    I: InmateDirectory + 'static,
    P: PrisonRegistry + 'static,
    E: TransferEventPublisher + 'static,
{
    let pending = service.pending_reconciliation()?;
    Ok(Json(pending).into_response())
}

pub(crate) async fn reconcile_handler<T, I, P, E>(
    State(service): State<SharedService<T, I, P, E>>,
    Path(transfer_id): Path<String>,
) -> Result<Response, WorkflowError>
where
    T: TransferRepository + 'static,
    I: InmateDirectory + 'static,
    P: PrisonRegistry + 'static,
    E: TransferEventPublisher + 'static,
{
    let outcome = service.reconcile_population(&TransferId(transfer_id))?;
    Ok(Json(outcome).into_response())
}

/// The decision `reason` doubles as the waiver note.
pub(crate) async fn waive_leg_handler<T, I, P, E>(
    State(service): State<SharedService<T, I, P, E>>,
    Path((transfer_id, leg)): Path<(String, PopulationLeg)>,
    Json(decision): Json<DecisionRequest>,
) -> Result<Response, WorkflowError>
where
    T: TransferRepository + 'static,
    I: InmateDirectory + 'static,
    P: PrisonRegistry + 'static,
    E: TransferEventPublisher + 'static,
{
    let note = decision.reason.unwrap_or_default();
    let transfer =
        service.waive_population_leg(&TransferId(transfer_id), leg, &decision.actor, &note)?;
    Ok(Json(transfer).into_response())
}

pub(crate) async fn destinations_handler<T, I, P, E>(
    State(service): State<SharedService<T, I, P, E>>,
) -> Result<Response, WorkflowError>
where
    T: TransferRepository + 'static,
    I: InmateDirectory + 'static,
    P: PrisonRegistry + 'static,
    E: TransferEventPublisher + 'static,
{
    let prisons = service.destinations()?;
    Ok(Json(prisons).into_response())
}

pub(crate) async fn register_handler<T, I, P, E>(
    State(service): State<SharedService<T, I, P, E>>,
) -> Result<Response, WorkflowError>
where
    T: TransferRepository + 'static,
    I: InmateDirectory + 'static,
    P: PrisonRegistry + 'static,
    E: TransferEventPublisher + 'static,
{
    let transfers = service.list()?;
    let mut buffer = Vec::new();
    if let Err(err) = write_transfer_register(&mut buffer, &transfers) {
        let payload = serde_json::json!({ "error": err.to_string() });
        return Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response());
    }

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        buffer,
    )
        .into_response())
}
