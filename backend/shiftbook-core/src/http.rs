// src/http.rs
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::{AuthError, Authenticator, Credentials, User};
use crate::hours::DayEntry;
use crate::schedule::{ScheduleError, ScheduleService, ScheduleStatus};

// --- State ---

#[derive(Clone)]
pub struct AppState {
    pub schedules: Arc<ScheduleService>,
    pub authenticator: Arc<dyn Authenticator>,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/schedules",
            post(handle_create_schedule).get(handle_list_schedules),
        )
        .route("/schedules/preview", post(handle_preview))
        .route(
            "/schedules/{id}",
            get(handle_get_schedule)
                .put(handle_update_schedule)
                .delete(handle_delete_schedule),
        )
        .route("/schedules/{id}/recalculate", post(handle_recalculate))
        .route("/schedules/{id}/status", put(handle_set_status))
        .route("/me", get(handle_me))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Request Bodies ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduleRequest {
    pub iso_week: u32,
    pub year: i32,
    #[serde(default)]
    pub days: Vec<DayEntry>,
}

#[derive(Debug, Deserialize)]
pub struct DaysRequest {
    #[serde(default)]
    pub days: Vec<DayEntry>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: ScheduleStatus,
}

// --- Errors ---

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Invalid request body: {0}")]
    BadRequest(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<String>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, errors) = match &self {
            AppError::Schedule(ScheduleError::Validation(errors)) => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                Some(errors.clone()),
            ),
            AppError::Schedule(e @ ScheduleError::Duplicate { .. }) => {
                (StatusCode::BAD_REQUEST, e.to_string(), None)
            }
            AppError::Schedule(ScheduleError::NotFound) => {
                (StatusCode::NOT_FOUND, "Schedule not found".to_string(), None)
            }
            AppError::Schedule(ScheduleError::Storage(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                None,
            ),
            AppError::Auth(AuthError::Store(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                None,
            ),
            AppError::Auth(_) => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string(), None),
            AppError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail.clone(), None),
        };

        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected ({}): {}", status, self);
        }

        let body = ErrorBody {
            success: false,
            message,
            errors,
        };
        (status, Json(body)).into_response()
    }
}

// Unparseable ids look exactly like ids that are not owned
fn parse_schedule_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::Schedule(ScheduleError::NotFound))
}

// --- Middleware ---

async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AuthError::MissingCredentials)?
        .to_string();

    let user = state
        .authenticator
        .authenticate(&Credentials::Bearer(token))
        .await?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

// --- Handlers ---

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn handle_create_schedule(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    payload: Result<Json<CreateScheduleRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    info!("Handling create schedule request...");
    let Json(request) = payload?;

    let schedule = state
        .schedules
        .create_schedule(&user.id, request.iso_week, request.year, request.days)
        .await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

async fn handle_list_schedules(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, AppError> {
    info!("Handling list schedules request...");
    let schedules = state.schedules.list_schedules(&user.id).await?;
    Ok(Json(schedules))
}

async fn handle_get_schedule(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let schedule_id = parse_schedule_id(&id)?;
    let schedule = state.schedules.get_schedule(schedule_id, &user.id).await?;
    Ok(Json(schedule))
}

async fn handle_update_schedule(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    payload: Result<Json<DaysRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    info!("Handling update schedule request for {}...", id);
    let schedule_id = parse_schedule_id(&id)?;
    let Json(request) = payload?;

    let schedule = state
        .schedules
        .update_schedule(schedule_id, &user.id, request.days)
        .await?;
    Ok(Json(schedule))
}

async fn handle_delete_schedule(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    info!("Handling delete schedule request for {}...", id);
    let schedule_id = parse_schedule_id(&id)?;
    state.schedules.delete_schedule(schedule_id, &user.id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Schedule deleted"
    })))
}

async fn handle_recalculate(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    info!("Handling recalculate request for {}...", id);
    let schedule_id = parse_schedule_id(&id)?;
    let schedule = state
        .schedules
        .recalculate_owned(schedule_id, &user.id)
        .await?;
    Ok(Json(schedule))
}

async fn handle_set_status(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    info!("Handling status change request for {}...", id);
    let schedule_id = parse_schedule_id(&id)?;
    let Json(request) = payload?;

    let schedule = state
        .schedules
        .set_status(schedule_id, &user.id, request.status)
        .await?;
    Ok(Json(schedule))
}

async fn handle_preview(
    State(state): State<AppState>,
    payload: Result<Json<DaysRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    info!("Handling preview request...");
    let Json(request) = payload?;
    Ok(Json(state.schedules.preview(&request.days)))
}

async fn handle_me(Extension(user): Extension<User>) -> impl IntoResponse {
    Json(user)
}
