use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ScheduleId, SchedulePayload, VisitorId};
use super::repository::ScheduleRepository;
use super::service::VisitSchedulingService;
use crate::workflows::transfer::InmateDirectory;
use crate::workflows::{Actor, WorkflowError};

const DEFAULT_HEAT_MAP_DAYS: u32 = 7;

type SharedService<S, I> = Arc<VisitSchedulingService<S, I>>;

#[derive(Debug, Deserialize)]
pub(crate) struct ScheduleRequest {
    pub(crate) visitor_id: VisitorId,
    #[serde(flatten)]
    pub(crate) payload: SchedulePayload,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VisitorQuery {
    pub(crate) visitor_id: VisitorId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HeatMapQuery {
    pub(crate) days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScheduleDecision {
    pub(crate) actor: Actor,
    #[serde(default)]
    pub(crate) reason: Option<String>,
}

/// Router exposing visit booking and capacity lookups.
pub fn visit_router<S, I>(service: SharedService<S, I>) -> Router
where
    S: ScheduleRepository + 'static,
    I: InmateDirectory + 'static,
{
    Router::new()
        .route(
            "/api/v1/visits",
            get(list_handler::<S, I>).put(create_handler::<S, I>),
        )
        .route("/api/v1/visits/capacity", get(capacity_handler::<S, I>))
        .route(
            "/api/v1/visits/capacity/heatmap",
            get(heat_map_handler::<S, I>),
        )
        .route("/api/v1/visits/pending", get(pending_handler::<S, I>))
        .route(
            "/api/v1/visits/:schedule_id",
            get(detail_handler::<S, I>).put(update_handler::<S, I>),
        )
        .route(
            "/api/v1/visits/:schedule_id/cancel",
            post(cancel_handler::<S, I>),
        )
        .route(
            "/api/v1/visits/:schedule_id/approve",
            post(approve_handler::<S, I>),
        )
        .route(
            "/api/v1/visits/:schedule_id/reject",
            post(reject_handler::<S, I>),
        )
        .with_state(service)
}

pub(crate) async fn create_handler<S, I>(
    State(service): State<SharedService<S, I>>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Response, WorkflowError>
where
    S: ScheduleRepository + 'static,
    I: InmateDirectory + 'static,
{
    let schedule = service.create_or_update_schedule(&request.visitor_id, request.payload, None)?;
    Ok((StatusCode::CREATED, Json(schedule)).into_response())
}

pub(crate) async fn update_handler<S, I>(
    State(service): State<SharedService<S, I>>,
    Path(schedule_id): Path<String>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Response, WorkflowError>
where
    S: ScheduleRepository + 'static,
    I: InmateDirectory + 'static,
{
    let schedule_id = ScheduleId(schedule_id);
    let schedule = service.create_or_update_schedule(
        &request.visitor_id,
        request.payload,
        Some(&schedule_id),
    )?;
    Ok(Json(schedule).into_response())
}

pub(crate) async fn list_handler<S, I>(
    State(service): State<SharedService<S, I>>,
    Query(query): Query<VisitorQuery>,
) -> Result<Response, WorkflowError>
where
    S: ScheduleRepository + 'static,
    I: InmateDirectory + 'static,
{
    let schedules = service.list_for_visitor(&query.visitor_id)?;
    Ok(Json(schedules).into_response())
}

pub(crate) async fn detail_handler<S, I>(
    State(service): State<SharedService<S, I>>,
    Path(schedule_id): Path<String>,
) -> Result<Response, WorkflowError>
where
    S: ScheduleRepository + 'static,
    I: InmateDirectory + 'static,
{
    let schedule = service.get(&ScheduleId(schedule_id))?;
    Ok(Json(schedule).into_response())
}

pub(crate) async fn capacity_handler<S, I>(
    State(service): State<SharedService<S, I>>,
) -> Result<Response, WorkflowError>
where
    S: ScheduleRepository + 'static,
    I: InmateDirectory + 'static,
{
    let info = service.capacity_info()?;
    Ok(Json(info).into_response())
}

pub(crate) async fn heat_map_handler<S, I>(
    State(service): State<SharedService<S, I>>,
    Query(query): Query<HeatMapQuery>,
) -> Result<Response, WorkflowError>
where
    S: ScheduleRepository + 'static,
    I: InmateDirectory + 'static,
{
    let days = query.days.unwrap_or(DEFAULT_HEAT_MAP_DAYS);
    let heat_map = service.availability_heat_map(days)?;
    Ok(Json(heat_map).into_response())
}

pub(crate) async fn pending_handler<S, I>(
    State(service): State<SharedService<S, I>>,
    Query(query): Query<VisitorQuery>,
) -> Result<Response, WorkflowError>
where
    S: ScheduleRepository + 'static,
    I: InmateDirectory + 'static,
{
    let pending = service.pending_schedule(&query.visitor_id)?;
    Ok(Json(json!({
        "has_pending_schedule": pending.is_some(),
        "schedule": pending,
    }))
    .into_response())
}

pub(crate) async fn cancel_handler<S, I>(
    State(service): State<SharedService<S, I>>,
    Path(schedule_id): Path<String>,
    Json(decision): Json<ScheduleDecision>,
) -> Result<Response, WorkflowError>
where
    S: ScheduleRepository + 'static,
    I: InmateDirectory + 'static,
{
    let schedule = service.cancel_schedule(&ScheduleId(schedule_id), &decision.actor)?;
    Ok(Json(schedule).into_response())
}

pub(crate) async fn approve_handler<S, I>(
    State(service): State<SharedService<S, I>>,
    Path(schedule_id): Path<String>,
    Json(decision): Json<ScheduleDecision>,
) -> Result<Response, WorkflowError>
where
    S: ScheduleRepository + 'static,
    I: InmateDirectory + 'static,
{
    let schedule = service.approve_schedule(&ScheduleId(schedule_id), &decision.actor)?;
    Ok(Json(schedule).into_response())
}

pub(crate) async fn reject_handler<S, I>(
    State(service): State<SharedService<S, I>>,
    Path(schedule_id): Path<String>,
    Json(decision): Json<ScheduleDecision>,
) -> Result<Response, WorkflowError>
where
    S: ScheduleRepository + 'static,
    I: InmateDirectory + 'static,
{
    let reason = decision.reason.unwrap_or_default();
    let schedule = service.reject_schedule(&ScheduleId(schedule_id), &decision.actor, &reason)?;
    Ok(Json(schedule).into_response())
}
