use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use application::{
    ListMessagesRequest, RegenerateAiMessageRequest, SendAiMessageRequest, SendAiMessageResult,
    SendMessageRequest,
};
use domain::Message;

use crate::{
    dto::{
        HistoryQuery, MessagePageResponse, ModelsResponse, RegeneratePayload,
        SendAiMessagePayload, SendMessagePayload,
    },
    error::ApiError,
    state::AppState,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/rooms/{room_id}/messages",
            post(send_message).get(list_messages),
        )
        .route("/rooms/{room_id}/messages/ai", post(send_ai_message))
        .route(
            "/rooms/{room_id}/messages/{message_id}/regenerate",
            post(regenerate_ai_message),
        )
        .route("/models", get(list_models))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let user_id = state.jwt_service.authenticate(&headers)?;

    let message = state
        .message_service
        .send_message(SendMessageRequest {
            room_id,
            user_id,
            content: payload.content,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<MessagePageResponse>, ApiError> {
    let user_id = state.jwt_service.authenticate(&headers)?;

    let page = state
        .message_service
        .list_messages(ListMessagesRequest {
            room_id,
            user_id,
            cursor: query.cursor,
            limit: query.limit,
        })
        .await?;

    Ok(Json(MessagePageResponse {
        messages: page.messages,
        next_cursor: page.next_cursor,
    }))
}

async fn send_ai_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
    Json(payload): Json<SendAiMessagePayload>,
) -> Result<(StatusCode, Json<SendAiMessageResult>), ApiError> {
    let user_id = state.jwt_service.authenticate(&headers)?;

    let cancel = state.shutdown.child_token();
    let result = state
        .message_service
        .send_ai_message(
            SendAiMessageRequest {
                room_id,
                user_id,
                content: payload.content,
                model: payload.model,
            },
            &cancel,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

async fn regenerate_ai_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((room_id, message_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<RegeneratePayload>,
) -> Result<Json<Message>, ApiError> {
    let user_id = state.jwt_service.authenticate(&headers)?;

    let cancel = state.shutdown.child_token();
    let message = state
        .message_service
        .regenerate_ai_message(
            RegenerateAiMessageRequest {
                room_id,
                user_id,
                message_id,
                model: payload.model,
            },
            &cancel,
        )
        .await?;

    Ok(Json(message))
}

async fn list_models(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ModelsResponse>, ApiError> {
    state.jwt_service.authenticate(&headers)?;
    let models = state.message_service.list_models().await?;
    Ok(Json(ModelsResponse { models }))
}
