// Admission Desk - Web Server
// JSON API over the admission engine and the registration write paths.
// No authentication layer lives here; the deployment puts this behind the
// front-desk network.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use admission_desk::{
    AdmissionEngine, Member, MemberId, PaymentRecord, RegistrationError, SqliteStore,
    WaiverRecord,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<AdmissionEngine<SqliteStore>>>,
}

/// Error payload for every non-2xx response
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

// ============================================================================
// Request / Response types
// ============================================================================

#[derive(Deserialize)]
struct CheckMemberRequest {
    puid: String,
}

#[derive(Deserialize)]
struct UpsertMemberRequest {
    puid: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Serialize)]
struct MemberResponse {
    message: &'static str,
    member: Member,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRecordRequest {
    term_name: String,
    puid: String,
}

#[derive(Serialize)]
struct WaiverResponse {
    waiver: WaiverRecord,
}

#[derive(Serialize)]
struct PaymentResponse {
    payment: PaymentRecord,
}

#[derive(Deserialize)]
struct AttendanceRequest {
    date: NaiveDate,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "version": admission_desk::VERSION }))
}

/// POST /api/checkmember - Run one admission evaluation
async fn check_member(
    State(state): State<AppState>,
    Json(req): Json<CheckMemberRequest>,
) -> Response {
    let id = match MemberId::normalize(&req.puid) {
        Ok(id) => id,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let mut engine = state.engine.lock().unwrap();
    match engine.evaluate(&id) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => {
            eprintln!("Error checking member {}: {}", id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Server error, try again")
        }
    }
}

/// POST /api/members - Create or update a member
async fn upsert_member(
    State(state): State<AppState>,
    Json(req): Json<UpsertMemberRequest>,
) -> Response {
    let id = match MemberId::normalize(&req.puid) {
        Ok(id) => id,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let engine = state.engine.lock().unwrap();
    let result = admission_desk::upsert_member(
        engine.store().connection(),
        &id,
        req.name.as_deref(),
        req.email.as_deref(),
        Utc::now(),
    );

    match result {
        Ok((change, member)) => (
            StatusCode::OK,
            Json(MemberResponse {
                message: change.message(),
                member,
            }),
        )
            .into_response(),
        Err(e) => registration_error_response(e),
    }
}

/// POST /api/waivers - Record a signed waiver under a named term
async fn create_waiver(
    State(state): State<AppState>,
    Json(req): Json<CreateRecordRequest>,
) -> Response {
    let id = match MemberId::normalize(&req.puid) {
        Ok(id) => id,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let engine = state.engine.lock().unwrap();
    match admission_desk::record_waiver(
        engine.store().connection(),
        &id,
        &req.term_name,
        Utc::now(),
    ) {
        Ok(waiver) => (StatusCode::OK, Json(WaiverResponse { waiver })).into_response(),
        Err(e) => registration_error_response(e),
    }
}

/// POST /api/payments - Record a payment under a named term
async fn create_payment(
    State(state): State<AppState>,
    Json(req): Json<CreateRecordRequest>,
) -> Response {
    let id = match MemberId::normalize(&req.puid) {
        Ok(id) => id,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let engine = state.engine.lock().unwrap();
    match admission_desk::record_payment(
        engine.store().connection(),
        &id,
        &req.term_name,
        Utc::now(),
    ) {
        Ok(payment) => (StatusCode::OK, Json(PaymentResponse { payment })).into_response(),
        Err(e) => registration_error_response(e),
    }
}

fn registration_error_response(e: RegistrationError) -> Response {
    match e {
        RegistrationError::UnknownWaiverTerm(_) | RegistrationError::UnknownPaymentTerm(_) => {
            error_response(StatusCode::NOT_FOUND, "Term not found")
        }
        RegistrationError::OpenEndedTerm(_) | RegistrationError::MissingName => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
        RegistrationError::Db(err) => {
            eprintln!("Registration error: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
        }
    }
}

/// GET /api/terms - Waiver terms still offerable today
async fn list_waiver_terms(State(state): State<AppState>) -> Response {
    let engine = state.engine.lock().unwrap();
    match admission_desk::current_waiver_terms(engine.store().connection(), Utc::now().date_naive())
    {
        Ok(terms) => (StatusCode::OK, Json(terms)).into_response(),
        Err(e) => {
            eprintln!("Error fetching waiver terms: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
        }
    }
}

/// GET /api/paymentterms - Payment terms still offerable today
async fn list_payment_terms(State(state): State<AppState>) -> Response {
    let engine = state.engine.lock().unwrap();
    match admission_desk::current_payment_terms(engine.store().connection(), Utc::now().date_naive())
    {
        Ok(terms) => (StatusCode::OK, Json(terms)).into_response(),
        Err(e) => {
            eprintln!("Error fetching payment terms: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
        }
    }
}

/// POST /api/admin/attendance - Sign-ins for a date, joined with names
async fn attendance(
    State(state): State<AppState>,
    Json(req): Json<AttendanceRequest>,
) -> Response {
    let engine = state.engine.lock().unwrap();
    match admission_desk::attendance_on(engine.store().connection(), req.date) {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(e) => {
            eprintln!("Error fetching attendance for {}: {}", req.date, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    println!("🚪 Admission Desk - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path =
        std::env::var("ADMISSION_DB").unwrap_or_else(|_| "admission.db".to_string());

    let store = SqliteStore::open(&db_path).expect("Failed to open database");
    println!("✓ Database opened: {}", db_path);

    // Create shared state
    let state = AppState {
        engine: Arc::new(Mutex::new(AdmissionEngine::new(store))),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/checkmember", post(check_member))
        .route("/members", post(upsert_member))
        .route("/waivers", post(create_waiver))
        .route("/payments", post(create_payment))
        .route("/terms", get(list_waiver_terms))
        .route("/paymentterms", get(list_payment_terms))
        .route("/admin/attendance", post(attendance))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(3001);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://localhost:{}", port);
    println!("   Check endpoint: POST /api/checkmember");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
