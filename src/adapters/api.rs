use actix_web::cookie::{Cookie, SameSite, time::Duration as CookieDuration};
use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, delete, get, post, web};
use serde::{Deserialize, Serialize};

use crate::app::auth::{
    CredentialVerifier, PassphraseGate, SESSION_COOKIE_MAX_AGE_SECS, SESSION_COOKIE_NAME,
    UnlockOutcome,
};
use crate::app::recorder::{RecordError, RecordedSession, SessionRecorder};
use crate::app::services::{
    ServiceError, SessionCommandHandler, SessionQueryHandler, SqliteSessionService,
};
use crate::domain::csv_export::render_sessions_csv;
use crate::domain::models::ChargingSessionRecord;
use crate::domain::session_state::SystemClock;
use crate::domain::transcript::parse_transcript;

#[derive(Clone)]
pub struct ApiState {
    pub sessions: SqliteSessionService,
    pub recorder: SessionRecorder<SqliteSessionService, SystemClock>,
    pub gate: PassphraseGate,
}

impl ApiState {
    pub fn new(sessions: SqliteSessionService, gate: PassphraseGate) -> Self {
        Self {
            recorder: SessionRecorder::new(sessions.clone(), SystemClock),
            sessions,
            gate,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SessionResponse {
    pub id: i64,
    pub start_percentage: u8,
    pub start_time: String,
    pub end_percentage: Option<u8>,
    pub end_time: Option<String>,
}

impl From<&ChargingSessionRecord> for SessionResponse {
    fn from(session: &ChargingSessionRecord) -> Self {
        Self {
            id: session.id,
            start_percentage: session.start_percentage,
            start_time: session.start_time.to_iso8601(),
            end_percentage: session.end_percentage,
            end_time: session.end_time.map(|value| value.to_iso8601()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordedSessionResponse {
    pub message: String,
    pub session: SessionResponse,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionResponse>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatusResponse {
    Charging {
        start_percentage: u8,
        start_time: String,
    },
    Idle,
}

#[derive(Debug, Serialize)]
pub struct UnlockResponse {
    pub success: bool,
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct UnlockRequest {
    pub phrase: String,
}

const INVALID_BODY_DETAIL: &str = "Invalid request body";
const FRACTIONAL_PERCENTAGE_DETAIL: &str = "Percentage must be a whole number";

/// `percentage` is kept as a raw JSON number so integers outside `i64`
/// still reach the range check instead of failing deserialization.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub percentage: serde_json::Number,
    #[serde(rename = "type", default)]
    pub intent: Option<String>,
}

impl CreateSessionRequest {
    /// Whole numbers saturate into `i64`; fractional values yield `None`.
    pub fn whole_percentage(&self) -> Option<i64> {
        if let Some(value) = self.percentage.as_i64() {
            return Some(value);
        }
        if self.percentage.as_u64().is_some() {
            return Some(i64::MAX);
        }

        let value = self.percentage.as_f64()?;
        // float to int `as` casts saturate
        (value.fract() == 0.0).then_some(value as i64)
    }
}

#[derive(Debug, Deserialize)]
pub struct TranscriptRequest {
    pub text: String,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .service(health)
        .service(unlock_endpoint)
        .service(get_status_endpoint)
        .service(export_csv_endpoint)
        .service(list_sessions_endpoint)
        .service(create_session_endpoint)
        .service(create_session_from_transcript_endpoint)
        .service(delete_session_endpoint)
        .service(delete_all_sessions_endpoint);
}

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[post("/api/unlock")]
async fn unlock_endpoint(
    state: web::Data<ApiState>,
    body: Result<web::Json<UnlockRequest>, actix_web::Error>,
) -> HttpResponse {
    let Ok(body) = body else {
        return detail_response(HttpResponse::BadRequest(), INVALID_BODY_DETAIL);
    };

    match state.gate.unlock(&body.phrase) {
        UnlockOutcome::NotRequired => HttpResponse::Ok().json(UnlockResponse {
            success: true,
            message: "No passphrase configured",
        }),
        UnlockOutcome::Unlocked { session_token } => {
            let cookie = Cookie::build(SESSION_COOKIE_NAME, session_token)
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .max_age(CookieDuration::seconds(SESSION_COOKIE_MAX_AGE_SECS))
                .finish();

            tracing::info!("passphrase unlock accepted");
            HttpResponse::Ok().cookie(cookie).json(UnlockResponse {
                success: true,
                message: "Unlocked",
            })
        }
        UnlockOutcome::Rejected => {
            tracing::warn!("passphrase unlock rejected");
            HttpResponse::Ok().json(UnlockResponse {
                success: false,
                message: "Incorrect passphrase",
            })
        }
    }
}

#[get("/api/status")]
async fn get_status_endpoint(req: HttpRequest, state: web::Data<ApiState>) -> HttpResponse {
    if let Err(response) = authorize(&req, &state) {
        return response;
    }

    match state.sessions.find_open_session() {
        Ok(Some(session)) => HttpResponse::Ok().json(StatusResponse::Charging {
            start_percentage: session.start_percentage,
            start_time: session.start_time.to_iso8601(),
        }),
        Ok(None) => HttpResponse::Ok().json(StatusResponse::Idle),
        Err(error) => store_error_response(error),
    }
}

#[get("/api/sessions")]
async fn list_sessions_endpoint(req: HttpRequest, state: web::Data<ApiState>) -> HttpResponse {
    if let Err(response) = authorize(&req, &state) {
        return response;
    }

    match state.sessions.list_sessions() {
        Ok(sessions) => HttpResponse::Ok().json(SessionListResponse {
            sessions: sessions.iter().map(SessionResponse::from).collect(),
        }),
        Err(error) => store_error_response(error),
    }
}

#[post("/api/sessions")]
async fn create_session_endpoint(
    req: HttpRequest,
    state: web::Data<ApiState>,
    body: Result<web::Json<CreateSessionRequest>, actix_web::Error>,
) -> HttpResponse {
    if let Err(response) = authorize(&req, &state) {
        return response;
    }
    let Ok(body) = body else {
        return detail_response(HttpResponse::BadRequest(), INVALID_BODY_DETAIL);
    };
    let Some(percentage) = body.whole_percentage() else {
        return detail_response(HttpResponse::BadRequest(), FRACTIONAL_PERCENTAGE_DETAIL);
    };

    recorded_response(
        state
            .recorder
            .record(percentage, body.intent.as_deref().unwrap_or_default()),
    )
}

#[post("/api/sessions/transcript")]
async fn create_session_from_transcript_endpoint(
    req: HttpRequest,
    state: web::Data<ApiState>,
    body: Result<web::Json<TranscriptRequest>, actix_web::Error>,
) -> HttpResponse {
    if let Err(response) = authorize(&req, &state) {
        return response;
    }
    let Ok(body) = body else {
        return detail_response(HttpResponse::BadRequest(), INVALID_BODY_DETAIL);
    };

    let reading = match parse_transcript(&body.text) {
        Ok(reading) => reading,
        Err(error) => return detail_response(HttpResponse::BadRequest(), &error.to_string()),
    };

    tracing::debug!(
        percentage = reading.percentage,
        intent = %reading.intent,
        "transcript parsed"
    );

    recorded_response(
        state
            .recorder
            .record(reading.percentage, reading.intent.as_str()),
    )
}

#[get("/api/sessions/csv")]
async fn export_csv_endpoint(req: HttpRequest, state: web::Data<ApiState>) -> HttpResponse {
    if let Err(response) = authorize(&req, &state) {
        return response;
    }

    let sessions = match state.sessions.list_sessions() {
        Ok(sessions) => sessions,
        Err(error) => return store_error_response(error),
    };

    match render_sessions_csv(sessions.iter().rev()) {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/csv")
            .insert_header((
                header::CONTENT_DISPOSITION,
                "attachment; filename=charging_sessions.csv",
            ))
            .body(body),
        Err(error) => {
            tracing::error!(error = %error, "csv export failed");
            detail_response(
                HttpResponse::InternalServerError(),
                "Failed to export sessions",
            )
        }
    }
}

#[delete("/api/sessions/{id}")]
async fn delete_session_endpoint(
    req: HttpRequest,
    state: web::Data<ApiState>,
    path: web::Path<i64>,
) -> HttpResponse {
    if let Err(response) = authorize(&req, &state) {
        return response;
    }

    let id = path.into_inner();
    match state.sessions.delete_session(id) {
        Ok(true) => {
            tracing::info!(session_id = id, "charging session deleted");
            HttpResponse::Ok().json(serde_json::json!({ "message": "Session deleted" }))
        }
        Ok(false) => detail_response(HttpResponse::NotFound(), "Session not found"),
        Err(error) => store_error_response(error),
    }
}

#[delete("/api/sessions")]
async fn delete_all_sessions_endpoint(
    req: HttpRequest,
    state: web::Data<ApiState>,
) -> HttpResponse {
    if let Err(response) = authorize(&req, &state) {
        return response;
    }

    match state.sessions.delete_all_sessions() {
        Ok(deleted) => {
            tracing::info!(deleted, "all charging sessions deleted");
            HttpResponse::Ok().json(serde_json::json!({
                "message": "All sessions deleted",
                "deleted": deleted,
            }))
        }
        Err(error) => store_error_response(error),
    }
}

fn authorize(req: &HttpRequest, state: &ApiState) -> Result<(), HttpResponse> {
    let credential = req.cookie(SESSION_COOKIE_NAME);
    if state.gate.verify(credential.as_ref().map(|cookie| cookie.value())) {
        return Ok(());
    }

    tracing::debug!(path = %req.path(), "request rejected without valid session cookie");
    Err(detail_response(HttpResponse::Unauthorized(), "Unauthorized"))
}

fn json_error_handler(error: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::debug!(path = %req.path(), error = %error, "rejected request body");
    let response = detail_response(HttpResponse::BadRequest(), INVALID_BODY_DETAIL);
    InternalError::from_response(error, response).into()
}

fn recorded_response(result: Result<RecordedSession, RecordError>) -> HttpResponse {
    match result {
        Ok(recorded) => HttpResponse::Ok().json(RecordedSessionResponse {
            message: recorded.message(),
            session: SessionResponse::from(&recorded.session),
        }),
        Err(RecordError::Rejected(rejection)) => {
            detail_response(HttpResponse::BadRequest(), &rejection.to_string())
        }
        Err(RecordError::StoreUnavailable(error)) => store_error_response(error),
    }
}

fn store_error_response(error: ServiceError) -> HttpResponse {
    tracing::error!(error = %error, "session store call failed");
    detail_response(
        HttpResponse::InternalServerError(),
        "Session store unavailable",
    )
}

fn detail_response(mut builder: actix_web::HttpResponseBuilder, detail: &str) -> HttpResponse {
    builder.json(serde_json::json!({ "detail": detail }))
}
