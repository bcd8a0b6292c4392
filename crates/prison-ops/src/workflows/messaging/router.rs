use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::domain::{MessageDraft, UserId};
use super::repository::MessageRepository;
use super::service::MessagingService;
use crate::workflows::WorkflowError;

type SharedService<M> = Arc<MessagingService<M>>;

#[derive(Debug, Deserialize)]
pub(crate) struct CurrentUserQuery {
    pub(crate) current_user_id: UserId,
    #[serde(default)]
    pub(crate) since: Option<DateTime<Utc>>,
}

/// Router exposing direct messages between accounts.
pub fn messaging_router<M>(service: SharedService<M>) -> Router
where
    M: MessageRepository + 'static,
{
    Router::new()
        .route("/api/v1/messages", post(send_handler::<M>))
        .route("/api/v1/messages/unread", get(unread_handler::<M>))
        .route("/api/v1/messages/:user_id", get(conversation_handler::<M>))
        .route("/api/v1/messages/:user_id/read", post(mark_read_handler::<M>))
        .with_state(service)
}

pub(crate) async fn send_handler<M>(
    State(service): State<SharedService<M>>,
    Json(draft): Json<MessageDraft>,
) -> Result<Response, WorkflowError>
where
    M: MessageRepository + 'static,
{
    let message = service.send(draft)?;
    Ok((StatusCode::CREATED, Json(message)).into_response())
}

pub(crate) async fn conversation_handler<M>(
    State(service): State<SharedService<M>>,
    Path(user_id): Path<String>,
    Query(query): Query<CurrentUserQuery>,
) -> Result<Response, WorkflowError>
where
    M: MessageRepository + 'static,
{
    let messages = service.conversation(&query.current_user_id, &UserId(user_id), query.since)?;
    Ok(Json(messages).into_response())
}

pub(crate) async fn unread_handler<M>(
    State(service): State<SharedService<M>>,
    Query(query): Query<CurrentUserQuery>,
) -> Result<Response, WorkflowError>
where
    M: MessageRepository + 'static,
{
    let counts = service.unread_counts(&query.current_user_id)?;
    Ok(Json(counts).into_response())
}

pub(crate) async fn mark_read_handler<M>(
    State(service): State<SharedService<M>>,
    Path(sender_id): Path<String>,
    Query(query): Query<CurrentUserQuery>,
) -> Result<Response, WorkflowError>
where
    M: MessageRepository + 'static,
{
    let updated = service.mark_read(&query.current_user_id, &UserId(sender_id))?;
    Ok(Json(json!({ "updated": updated })).into_response())
}
