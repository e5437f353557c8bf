use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, extract::State};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::Deserialize;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;
use ulid::Ulid;

use crate::auth::{self, Identity, TokenRegistry, TokenVerifier};
use crate::engine::{BookingError, Engine};
use crate::model::{Ms, Reservation, ReservationStatus, Span};
use crate::observability::{AUTH_FAILURES_TOTAL, RPC_DURATION_SECONDS, RPC_REQUESTS_TOTAL};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub registry: Arc<TokenRegistry>,
    /// Substitute a placeholder identity for unauthenticated submits.
    /// Explicit test/emulator flag; never enabled in production.
    pub allow_test_identity: bool,
}

/// RPC-style operations as POST routes, plus the one direct HTTP endpoint
/// (`GET /allReservations`) that does its own credential verification.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/rpc/submitReservation", post(submit_reservation))
        .route("/rpc/listCourts", post(list_courts))
        .route("/rpc/getCourtDetails", post(get_court_details))
        .route("/rpc/getUserReservations", post(get_user_reservations))
        .route("/rpc/cancelReservation", post(cancel_reservation))
        .route("/rpc/confirmReservation", post(confirm_reservation))
        .route("/rpc/addCourt", post(add_court))
        .route("/rpc/isAdmin", post(is_admin))
        .route("/rpc/addAdminRole", post(add_admin_role))
        .route("/allReservations", get(all_reservations))
        .with_state(state)
}

// ── Requests ─────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    court_id: String,
    start_time: String,
    end_time: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CourtIdRequest {
    court_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReservationIdRequest {
    reservation_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddCourtRequest {
    /// Assigned by the server when omitted.
    court_id: Option<String>,
    name: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct AddAdminRoleRequest {
    email: String,
}

// ── Responses ────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReservationView {
    id: String,
    court_id: String,
    court_name: String,
    user_id: String,
    user_email: String,
    start_time: String,
    end_time: String,
    status: ReservationStatus,
    created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cancelled_at: Option<String>,
}

impl From<&Reservation> for ReservationView {
    fn from(r: &Reservation) -> Self {
        Self {
            id: r.id.to_string(),
            court_id: r.court_id.to_string(),
            court_name: r.court_name.clone(),
            user_id: r.owner_uid.clone(),
            user_email: r.owner_contact.clone(),
            start_time: iso(r.span.start),
            end_time: iso(r.span.end),
            status: r.status,
            created_at: iso(r.created_at),
            cancelled_at: r.cancelled_at.map(iso),
        }
    }
}

fn iso(ms: Ms) -> String {
    match Utc.timestamp_millis_opt(ms) {
        chrono::LocalResult::Single(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        _ => ms.to_string(),
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        if let BookingError::Internal(detail) = &self {
            tracing::error!("internal error surfaced to client: {detail}");
        }
        let status = match &self {
            BookingError::MalformedInput(_)
            | BookingError::InvalidRange
            | BookingError::NotInFuture
            | BookingError::DurationOutOfBounds => StatusCode::BAD_REQUEST,
            BookingError::Unauthenticated => StatusCode::UNAUTHORIZED,
            BookingError::PermissionDenied => StatusCode::FORBIDDEN,
            BookingError::CourtNotFound(_) | BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::CourtExists(_)
            | BookingError::SlotUnavailable(_)
            | BookingError::InvalidState(_)
            | BookingError::CancellationWindowClosed => StatusCode::CONFLICT,
            BookingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "status": "error",
            "code": self.code(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

// ── Helpers ──────────────────────────────────────────────────────

async fn identity_from(headers: &HeaderMap, registry: &TokenRegistry) -> Option<Identity> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = auth::bearer_token(value)?;
    registry.verify(token).await
}

fn require_identity(identity: Option<Identity>) -> Result<Identity, BookingError> {
    identity.ok_or(BookingError::Unauthenticated)
}

fn parse_ulid(s: &str, what: &str) -> Result<Ulid, BookingError> {
    s.parse()
        .map_err(|_| BookingError::MalformedInput(format!("invalid {what}: {s}")))
}

fn parse_timestamp(s: &str) -> Result<Ms, BookingError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp_millis())
        .map_err(|_| BookingError::MalformedInput("invalid date format, use ISO 8601".into()))
}

/// Run one RPC operation, recording request count and latency.
async fn run_rpc<T, F>(op: &'static str, fut: F) -> Result<T, BookingError>
where
    F: Future<Output = Result<T, BookingError>>,
{
    let start = Instant::now();
    let result = fut.await;
    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(RPC_REQUESTS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(RPC_DURATION_SECONDS, "op" => op).record(start.elapsed().as_secs_f64());
    result
}

// ── RPC handlers ─────────────────────────────────────────────────

async fn submit_reservation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<Value>, BookingError> {
    run_rpc("submit_reservation", async {
        let identity = match identity_from(&headers, &state.registry).await {
            Some(identity) => identity,
            None if state.allow_test_identity => Identity::test_placeholder(),
            None => return Err(BookingError::Unauthenticated),
        };
        let court_id = parse_ulid(&req.court_id, "courtId")?;
        let start = parse_timestamp(&req.start_time)?;
        let end = parse_timestamp(&req.end_time)?;
        let reservation = state
            .engine
            .submit(&identity, court_id, Span { start, end })
            .await?;
        Ok(Json(json!({
            "status": "success",
            "message": "Reservation submitted and awaiting confirmation.",
            "reservationId": reservation.id.to_string(),
        })))
    })
    .await
}

async fn list_courts(State(state): State<AppState>) -> Result<Json<Value>, BookingError> {
    run_rpc("list_courts", async {
        let courts: Vec<Value> = state
            .engine
            .list_courts()
            .await
            .iter()
            .map(|c| json!({"id": c.id.to_string(), "name": c.name, "metadata": c.metadata}))
            .collect();
        Ok(Json(json!({"status": "success", "data": courts})))
    })
    .await
}

async fn get_court_details(
    State(state): State<AppState>,
    Json(req): Json<CourtIdRequest>,
) -> Result<Json<Value>, BookingError> {
    run_rpc("get_court_details", async {
        let court_id = parse_ulid(&req.court_id, "courtId")?;
        let court = state.engine.get_court_details(court_id).await?;
        Ok(Json(json!({
            "status": "success",
            "data": {"id": court.id.to_string(), "name": court.name, "metadata": court.metadata},
        })))
    })
    .await
}

async fn get_user_reservations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, BookingError> {
    run_rpc("get_user_reservations", async {
        let identity = require_identity(identity_from(&headers, &state.registry).await)?;
        let reservations: Vec<ReservationView> = state
            .engine
            .reservations_for_owner(&identity.uid)
            .await
            .iter()
            .map(ReservationView::from)
            .collect();
        Ok(Json(json!({ "reservations": reservations })))
    })
    .await
}

async fn cancel_reservation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ReservationIdRequest>,
) -> Result<Json<Value>, BookingError> {
    run_rpc("cancel_reservation", async {
        let identity = require_identity(identity_from(&headers, &state.registry).await)?;
        let id = parse_ulid(&req.reservation_id, "reservationId")?;
        state.engine.cancel(&identity, id).await?;
        Ok(Json(json!({
            "status": "success",
            "message": "Reservation cancelled.",
        })))
    })
    .await
}

async fn confirm_reservation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ReservationIdRequest>,
) -> Result<Json<Value>, BookingError> {
    run_rpc("confirm_reservation", async {
        let identity = require_identity(identity_from(&headers, &state.registry).await)?;
        let id = parse_ulid(&req.reservation_id, "reservationId")?;
        state.engine.confirm(&identity, id).await?;
        Ok(Json(json!({
            "status": "success",
            "message": "Reservation confirmed.",
        })))
    })
    .await
}

async fn add_court(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AddCourtRequest>,
) -> Result<Json<Value>, BookingError> {
    run_rpc("add_court", async {
        let identity = require_identity(identity_from(&headers, &state.registry).await)?;
        let id = match &req.court_id {
            Some(s) => parse_ulid(s, "courtId")?,
            None => Ulid::new(),
        };
        state
            .engine
            .add_court(&identity, id, req.name, req.metadata)
            .await?;
        Ok(Json(json!({
            "status": "success",
            "message": "Court added.",
            "courtId": id.to_string(),
        })))
    })
    .await
}

async fn is_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, BookingError> {
    run_rpc("is_admin", async {
        let identity = require_identity(identity_from(&headers, &state.registry).await)?;
        Ok(Json(json!({
            "status": "success",
            "isAdmin": identity.is_admin,
        })))
    })
    .await
}

async fn add_admin_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AddAdminRoleRequest>,
) -> Result<Json<Value>, BookingError> {
    run_rpc("add_admin_role", async {
        let identity = require_identity(identity_from(&headers, &state.registry).await)?;
        if !identity.is_admin {
            return Err(BookingError::PermissionDenied);
        }
        let revoked = state.registry.grant_admin(&req.email);
        Ok(Json(json!({
            "status": "success",
            "message": format!(
                "Admin role granted to {}; {revoked} session(s) must re-authenticate.",
                req.email
            ),
        })))
    })
    .await
}

// ── Direct HTTP endpoint ─────────────────────────────────────────

/// Administrative listing over plain HTTP. Unlike the RPC operations, this
/// endpoint verifies the bearer credential itself before trusting the admin
/// claim. Missing/invalid token and non-admin caller are both 403 —
/// distinguished only in the log.
async fn all_reservations(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let forbidden = || {
        metrics::counter!(AUTH_FAILURES_TOTAL).increment(1);
        (
            StatusCode::FORBIDDEN,
            Json(json!({"status": "error", "message": "Forbidden"})),
        )
            .into_response()
    };

    let identity = match identity_from(&headers, &state.registry).await {
        Some(identity) => identity,
        None => {
            warn!("allReservations rejected: missing or invalid bearer token");
            return forbidden();
        }
    };
    if !identity.is_admin {
        warn!(uid = %identity.uid, "allReservations rejected: caller lacks admin claim");
        return forbidden();
    }

    let data: Vec<ReservationView> = state
        .engine
        .all_reservations()
        .await
        .iter()
        .map(ReservationView::from)
        .collect();
    Json(json!({"status": "success", "data": data})).into_response()
}
