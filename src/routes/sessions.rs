//! Session API Routes
//!
//! - POST /api/sessions - Upload a CSV dataset, returns the session id and profile
//! - POST /api/sessions/{id}/questions - Ask one question
//! - POST /api/sessions/{id}/variables - Chart and trend of one column
//! - GET /api/sessions/{id}/messages - Conversation log of the session

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::dataset::{load_csv_str, DatasetProfile};
use crate::models::{
    AppState, AskRequest, AskResponse, CreateSessionRequest, CreateSessionResponse, ExploreRequest, MessagesResponse,
};
use crate::session::{Session, SessionRegistry, Turn};
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}/questions", post(ask_question))
        .route("/api/sessions/{id}/variables", post(explore_variable))
        .route("/api/sessions/{id}/messages", get(list_messages))
        .with_state(state)
}

async fn find(sessions: &SessionRegistry, id: Uuid) -> AppResult<Arc<Session>> {
    sessions
        .get(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("session {}", id)))
}

fn turn_response(session: &Session, turn: Turn) -> AskResponse {
    AskResponse {
        turn_id: turn.turn_id,
        model: session.model().to_string(),
        intents: turn.report.intents,
        depth: turn.report.depth,
        artifacts: turn.report.artifacts,
    }
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> AppResult<Json<CreateSessionResponse>> {
    let table = load_csv_str(&request.csv)?;
    let pipeline = state.session_pipeline(request.provider, request.model.as_deref())?;

    let mut profile = DatasetProfile::build(&table);
    if request.describe_columns {
        // The profile is still useful without descriptions
        match pipeline.describe_columns(&table).await {
            Ok(descriptions) => profile = profile.with_column_descriptions(descriptions),
            Err(e) => warn!(error = %e, "Column descriptions unavailable"),
        }
    }

    let session = state
        .sessions
        .insert(Session::new(request.filename, table, pipeline))
        .await;

    info!(
        session_id = %session.id,
        model = %session.model(),
        rows = profile.row_count,
        columns = profile.column_count,
        "Session created"
    );

    Ok(Json(CreateSessionResponse {
        session_id: session.id,
        model: session.model().to_string(),
        profile,
    }))
}

async fn ask_question(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AskRequest>,
) -> AppResult<Json<AskResponse>> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(AppError::InvalidRequest("question must not be empty".to_string()));
    }

    let session = find(&state.sessions, id).await?;
    let turn = session.ask(question).await;
    Ok(Json(turn_response(&session, turn)))
}

async fn explore_variable(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ExploreRequest>,
) -> AppResult<Json<AskResponse>> {
    if request.variable.trim().is_empty() {
        return Err(AppError::InvalidRequest("variable must not be empty".to_string()));
    }

    let session = find(&state.sessions, id).await?;
    let turn = session.explore(&request.variable).await?;
    Ok(Json(turn_response(&session, turn)))
}

async fn list_messages(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<MessagesResponse>> {
    let session = find(&state.sessions, id).await?;
    Ok(Json(MessagesResponse {
        session_id: session.id,
        messages: session.messages().await,
    }))
}
