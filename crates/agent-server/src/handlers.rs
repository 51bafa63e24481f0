//! HTTP Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use agent_core::{Conversation, Message, Role, Session, SessionId};
use icd_coder::{note_analysis_request, DEFAULT_PATIENT_NOTE};

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider: String,
    pub model_connected: bool,
    pub tools: usize,
}

#[derive(Debug, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub session_id: String,
    /// Whether the reply explains a failed run rather than answering
    pub failed: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub analysis: String,
    pub session_id: String,
    pub failed: bool,
    /// Tools the model called, in order
    pub tools_used: Vec<String>,
    pub iterations: usize,
}

#[derive(Debug, Serialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: String,
    pub title: String,
    pub messages: Vec<TranscriptEntry>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

fn store_error(e: &agent_core::AgentError) -> ApiError {
    tracing::error!("Session store error: {}", e);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "SESSION_ERROR", e.user_message())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let model_connected = state.provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.provider.name().to_string(),
        model_connected,
        tools: state.tools.len(),
    })
}

/// Tools offered to the model
pub async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolInfo>> {
    let tools = state
        .tools
        .schemas()
        .into_iter()
        .map(|schema| ToolInfo {
            parameters: schema.parameters_json(),
            name: schema.name,
            description: schema.description,
        })
        .collect();
    Json(tools)
}

/// Ask a question, continuing a session when one is given
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if payload.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "EMPTY_MESSAGE", "Message must not be empty"));
    }

    // Held until the session is saved, so concurrent turns on one session queue up
    let (mut session, _guard) = match payload.session_id {
        Some(id) => {
            let id = SessionId::from_string(id);
            let guard = state.session_locks.acquire(&id).await;
            let session = state
                .sessions
                .load(&id)
                .map_err(|e| store_error(&e))?
                .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "SESSION_NOT_FOUND", "Unknown session"))?;
            (session, Some(guard))
        }
        None => (Session::new(), None),
    };

    let question = Message::user(payload.message);
    let mut conversation = session.conversation.clone();
    conversation.push(question.clone());

    let (reply, updated) = state.agent().respond(conversation).await;
    let failed = updated.is_none();
    match updated {
        Some(conversation) => session.adopt(conversation),
        None => session.record_failure(question, reply.clone()),
    }
    state.sessions.save(&session).map_err(|e| store_error(&e))?;

    Ok(Json(ChatResponse {
        message: reply.text().to_string(),
        session_id: session.id.to_string(),
        failed,
    }))
}

/// Analyze a patient note in a new session; a blank note uses the sample
pub async fn analyze_handler(
    State(state): State<AppState>,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let note = payload
        .note
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PATIENT_NOTE.to_string());

    let request = note_analysis_request(&note);
    let mut session = Session::new();

    let response = match state
        .agent()
        .run(Conversation::from_messages(vec![request.clone()]))
        .await
    {
        Ok(outcome) => {
            let tools_used = outcome
                .conversation
                .messages()
                .iter()
                .flat_map(|m| m.tool_calls.iter().map(|c| c.name.clone()))
                .collect();
            let analysis = outcome.text().to_string();
            let iterations = outcome.iterations;
            session.adopt(outcome.conversation);
            AnalyzeResponse {
                analysis,
                session_id: session.id.to_string(),
                failed: false,
                tools_used,
                iterations,
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Note analysis failed");
            let explanation = Message::assistant(e.user_message());
            let analysis = explanation.text().to_string();
            session.record_failure(request, explanation);
            AnalyzeResponse {
                analysis,
                session_id: session.id.to_string(),
                failed: true,
                tools_used: Vec::new(),
                iterations: 0,
            }
        }
    };

    state.sessions.save(&session).map_err(|e| store_error(&e))?;
    Ok(Json(response))
}

/// Session history for display
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state
        .sessions
        .load(&SessionId::from_string(id))
        .map_err(|e| store_error(&e))?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "SESSION_NOT_FOUND", "Unknown session"))?;

    Ok(Json(SessionView {
        id: session.id.to_string(),
        title: session.title(),
        messages: session
            .transcript()
            .into_iter()
            .map(|m| TranscriptEntry {
                role: m.role,
                content: m.text().to_string(),
            })
            .collect(),
        created_at: session.created_at.to_rfc3339(),
        updated_at: session.updated_at.to_rfc3339(),
    }))
}
