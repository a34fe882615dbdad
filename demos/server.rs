//! REST API server example for the booking engine.
//!
//! Run with: `cargo run --example server`
//!
//! Configuration is read from the environment (and a `.env` file if present):
//! `WEBHOOK_TOKEN`, `BOOKING_CURRENCY`, `INVOICE_VALIDITY_SECS`,
//! `PAYMENT_SUCCESS_URL`, `PAYMENT_FAILURE_URL`, `PAYMENT_MISMATCH_POLICY`,
//! `STORAGE_READ_RETRIES`, plus `BIND_ADDR` for the listener.
//!
//! ## Endpoints
//!
//! - `GET /availability?check_in=&check_out=[&property=][&room_type=]` - Free rooms
//! - `POST /quotes` - Price a stay without booking it
//! - `POST /bookings` - Create a pending booking and its invoice
//! - `GET /bookings/{id}` - Get a booking by id or reference
//! - `POST /bookings/{id}/check-in`, `/check-out`, `/no-show`, `/cancel` - Lifecycle
//! - `POST /webhooks/payments` - Payment provider callback (`x-callback-token` header)
//!
//! ## Example Usage
//!
//! ```bash
//! # Find rooms
//! curl 'http://localhost:3000/availability?check_in=2025-03-10&check_out=2025-03-12'
//!
//! # Book
//! curl -X POST http://localhost:3000/bookings \
//!   -H "Content-Type: application/json" \
//!   -d '{"room_id": 101, "check_in": "2025-03-10", "check_out": "2025-03-12", "guests": 2,
//!        "guest": {"name": "Ayu", "email": "ayu@example.com", "phone": "081234567890"}}'
//!
//! # Payment callback
//! curl -X POST http://localhost:3000/webhooks/payments \
//!   -H "Content-Type: application/json" -H "x-callback-token: $WEBHOOK_TOKEN" \
//!   -d '{"id": "evt-1", "external_id": "BK-...", "status": "PAID", "amount": 800000,
//!        "payment_channel": "QRIS"}'
//! ```

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use booking_engine::{
    AvailabilityQuery, Booking, BookingEngine, BookingError, BookingId, BookingReceipt,
    BookingRequest, EngineConfig, EventId, MockInvoiceProvider, PaymentEvent, PriceCalculation,
    PropertyId, Rate, RateBook, Reconciliation, Room, RoomId, RoomScope, RoomTypeId, StayType,
    SystemClock,
};
use chrono::NaiveDate;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
pub struct AvailabilityParams {
    pub check_in: String,
    pub check_out: String,
    pub property: Option<u32>,
    pub room_type: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub room_id: RoomId,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub stay_type: Option<StayType>,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Acknowledgement for a payment event that names no known booking.
#[derive(Debug, Serialize)]
pub struct UnknownReference {
    pub event_id: EventId,
    pub outcome: &'static str,
}

// === Application State ===

/// Shared application state containing the booking engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BookingEngine>,
}

// === Error Handling ===

/// Wrapper for converting `BookingError` into HTTP responses.
pub struct AppError(BookingError);

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            BookingError::InvalidDateRange => (StatusCode::BAD_REQUEST, "INVALID_DATE_RANGE"),
            BookingError::InvalidStayType(_) => (StatusCode::BAD_REQUEST, "INVALID_STAY_TYPE"),
            BookingError::BelowMinimumStay { .. } => (StatusCode::BAD_REQUEST, "BELOW_MINIMUM_STAY"),
            BookingError::InvalidParameters(_) => (StatusCode::BAD_REQUEST, "INVALID_PARAMETERS"),
            BookingError::RoomUnavailable(_) => (StatusCode::CONFLICT, "ROOM_UNAVAILABLE"),
            BookingError::RoomNotBookable(_) => (StatusCode::CONFLICT, "ROOM_NOT_BOOKABLE"),
            BookingError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            BookingError::DuplicateEvent => (StatusCode::CONFLICT, "DUPLICATE_EVENT"),
            BookingError::PaymentMismatch { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "PAYMENT_MISMATCH")
            }
            BookingError::AmountOverflow => (StatusCode::UNPROCESSABLE_ENTITY, "AMOUNT_OVERFLOW"),
            BookingError::AuthenticationFailed => {
                (StatusCode::UNAUTHORIZED, "AUTHENTICATION_FAILED")
            }
            BookingError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            BookingError::PaymentProvider(_) => (StatusCode::BAD_GATEWAY, "PAYMENT_PROVIDER_ERROR"),
            BookingError::Storage(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_ERROR"),
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

/// Accepts either the booking id or its `BK-` reference.
fn parse_booking_id(raw: &str) -> Result<BookingId, AppError> {
    BookingId::from_reference(raw)
        .or_else(|| Uuid::parse_str(raw).ok().map(BookingId))
        .ok_or_else(|| AppError(BookingError::NotFound(format!("booking {raw}"))))
}

// === Handlers ===

/// GET /availability - Rooms free for the whole range.
async fn find_available(
    State(state): State<AppState>,
    Query(params): Query<AvailabilityParams>,
) -> Result<Json<Vec<Room>>, AppError> {
    let scope = RoomScope {
        property: params.property.map(PropertyId),
        room_type: params.room_type.map(RoomTypeId),
    };
    let query = AvailabilityQuery::parse(&params.check_in, &params.check_out, scope)?;
    Ok(Json(state.engine.find_available(&query)?))
}

/// POST /quotes - Price a stay.
async fn quote(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<PriceCalculation>, AppError> {
    let price = state
        .engine
        .quote(request.room_id, request.check_in, request.check_out, request.stay_type)?;
    Ok(Json(price))
}

/// POST /bookings - Create a pending booking.
async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<BookingRequest>,
) -> Result<(StatusCode, Json<BookingReceipt>), AppError> {
    let receipt = state.engine.create_booking(request)?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// GET /bookings/{id} - Get a booking.
async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let id = parse_booking_id(&id)?;
    Ok(Json(state.engine.booking(id)?))
}

async fn check_in(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Booking>, AppError> {
    let id = parse_booking_id(&id)?;
    Ok(Json(state.engine.check_in(id)?))
}

async fn check_out(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Booking>, AppError> {
    let id = parse_booking_id(&id)?;
    Ok(Json(state.engine.check_out(id)?))
}

async fn mark_no_show(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Booking>, AppError> {
    let id = parse_booking_id(&id)?;
    Ok(Json(state.engine.mark_no_show(id)?))
}

/// POST /bookings/{id}/cancel - Cancel with a reason.
async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<Booking>, AppError> {
    let id = parse_booking_id(&id)?;
    Ok(Json(state.engine.cancel(id, request.reason)?))
}

/// POST /webhooks/payments - Payment provider callback.
///
/// Mismatched or late payments are acknowledged with 200 so the provider
/// stops redelivering; the outcome body says what happened. Events for an
/// unknown booking reference are acknowledged the same way, with outcome
/// `unknown_reference`, since redelivery can never make them match.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<PaymentEvent>,
) -> Result<Response, AppError> {
    let token = headers
        .get(CALLBACK_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    let event_id = event.id.clone();
    let external_id = event.external_id.clone();
    match state.engine.handle_webhook(token, event) {
        Ok(reconciliation) => Ok(Json::<Reconciliation>(reconciliation).into_response()),
        Err(BookingError::NotFound(_)) => {
            warn!(event_id = %event_id, external_id = %external_id, "Acknowledged payment event for unknown booking");
            Ok(Json(UnknownReference {
                event_id,
                outcome: "unknown_reference",
            })
            .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/availability", get(find_available))
        .route("/quotes", post(quote))
        .route("/bookings", post(create_booking))
        .route("/bookings/{id}", get(get_booking))
        .route("/bookings/{id}/check-in", post(check_in))
        .route("/bookings/{id}/check-out", post(check_out))
        .route("/bookings/{id}/no-show", post(mark_no_show))
        .route("/bookings/{id}/cancel", post(cancel))
        .route("/webhooks/payments", post(payment_webhook))
        .with_state(state)
}

/// Demo inventory: two room types on one property.
fn seed(engine: &BookingEngine, rates: &RateBook) -> Result<(), BookingError> {
    let standard = RoomTypeId(1);
    let suite = RoomTypeId(2);

    rates.publish(Rate::new(standard, StayType::Daily, 400_000).with_tax(dec!(11)))?;
    rates.publish(Rate::new(standard, StayType::Weekly, 2_500_000).with_tax(dec!(11)))?;
    rates.publish(
        Rate::new(standard, StayType::Monthly, 9_000_000)
            .with_tax(dec!(11))
            .with_deposit(dec!(30)),
    )?;
    rates.publish(
        Rate::new(suite, StayType::Daily, 950_000)
            .with_tax(dec!(11))
            .with_service_fee(50_000)
            .with_min_stay(2),
    )?;

    for number in [101, 102, 103] {
        engine.put_room(Room::new(RoomId(number), PropertyId(1), standard, number.to_string()))?;
    }
    engine.put_room(Room::new(RoomId(201), PropertyId(1), suite, "201"))?;
    Ok(())
}

/// Periodically cancels pending holds whose payment window closed.
fn spawn_sweeper(engine: Arc<BookingEngine>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match engine.expire_pending_holds() {
                Ok(expired) if !expired.is_empty() => info!(count = expired.len(), "Expired pending holds"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Hold sweep failed"),
            }
        }
    });
}

// === Main ===

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = EngineConfig::from_env();
    if config.webhook_token.is_empty() {
        warn!("WEBHOOK_TOKEN is not set; every payment callback will be rejected");
    }

    let clock = Arc::new(SystemClock);
    let rates = Arc::new(RateBook::new());
    let engine = BookingEngine::in_memory(
        rates.clone(),
        Arc::new(MockInvoiceProvider::with_clock(clock.clone())),
        clock,
        config,
    );
    seed(&engine, &rates)?;

    let engine = Arc::new(engine);
    spawn_sweeper(Arc::clone(&engine));
    let app = create_router(AppState { engine });

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "Booking API server running");

    axum::serve(listener, app).await?;
    Ok(())
}
