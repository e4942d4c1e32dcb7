//! In-memory contract double for the ride-sharing backend.
//!
//! Implements the HTTP contract the client depends on, with all state behind
//! one `RwLock`: status checks and transitions happen under a single write
//! lock, which is the compare-and-swap the respond-race property assumes of
//! the real backend. Verification codes land in an outbox the suite can read
//! instead of an email.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use rand::Rng;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tokio::sync::RwLock;

const CODE_TTL: time::Duration = time::Duration::minutes(30);

// The double emits naive timestamps (no offset) on purpose: the production
// backend does, and the client's lenient datetime codec must cope.
const NAIVE_FORMAT: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

// =============================================================================
// STATE
// =============================================================================

#[derive(Clone, Debug)]
struct StoredUser {
    id: i64,
    email: String,
    password_hash: String,
    full_name: String,
    role: String,
    university_key: String,
    license_plate: Option<String>,
    is_verified: bool,
    created_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
struct PendingCode {
    code_hash: String,
    issued_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
struct StoredRide {
    id: i64,
    university_key: String,
    pickup_location: String,
    destination: String,
    ride_date: OffsetDateTime,
    status: String,
    rider_id: i64,
    driver_id: Option<i64>,
    created_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
struct StoredReview {
    id: i64,
    ride_id: i64,
    reviewer_id: i64,
    rating: u8,
    comment: String,
    created_at: OffsetDateTime,
}

#[derive(Debug, Default)]
struct BackendState {
    universities: Vec<(String, String, Vec<String>)>,
    users: HashMap<i64, StoredUser>,
    codes: HashMap<String, PendingCode>,
    tokens: HashMap<String, i64>,
    rides: HashMap<i64, StoredRide>,
    reviews: HashMap<i64, StoredReview>,
    outbox: Vec<(String, String)>,
    next_id: i64,
}

impl BackendState {
    fn seeded() -> Self {
        let universities = [
            ("grambling", "Grambling State University", "gram.edu"),
            ("howard", "Howard University", "howard.edu"),
            ("spelman", "Spelman College", "spelman.edu"),
            ("morehouse", "Morehouse College", "morehouse.edu"),
            ("famu", "Florida A&M University", "famu.edu"),
            ("hampton", "Hampton University", "hamptonu.edu"),
        ]
        .into_iter()
        .map(|(key, name, domain)| (key.to_owned(), name.to_owned(), vec![domain.to_owned()]))
        .collect();
        Self {
            universities,
            ..Self::default()
        }
    }

    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_by_email(&self, email: &str) -> Option<&StoredUser> {
        self.users.values().find(|user| user.email == email)
    }

    fn active_ride_of(&self, rider_id: i64) -> Option<&StoredRide> {
        self.rides
            .values()
            .find(|ride| ride.rider_id == rider_id && matches!(ride.status.as_str(), "pending" | "accepted"))
    }
}

type Shared = Arc<RwLock<BackendState>>;

// =============================================================================
// HANDLE
// =============================================================================

/// A running double bound to a loopback port.
pub struct TestBackend {
    pub base_url: String,
    shared: Shared,
}

impl TestBackend {
    pub async fn spawn() -> Self {
        let shared: Shared = Arc::new(RwLock::new(BackendState::seeded()));
        let app = router(shared.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("test backend should bind a loopback port");
        let addr = listener.local_addr().expect("listener should report its address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test backend exited");
        });

        Self {
            base_url: format!("http://{addr}"),
            shared,
        }
    }

    /// Latest verification code issued to `email`, from the outbox.
    pub async fn issued_code(&self, email: &str) -> Option<String> {
        let state = self.shared.read().await;
        state
            .outbox
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, code)| code.clone())
    }

    /// Stored status of a ride, bypassing the HTTP surface. Used to assert
    /// that rejected transitions left state untouched.
    pub async fn ride_status(&self, ride_id: i64) -> Option<String> {
        let state = self.shared.read().await;
        state.rides.get(&ride_id).map(|ride| ride.status.clone())
    }
}

// =============================================================================
// ROUTER
// =============================================================================

fn router(shared: Shared) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/auth/universities", get(universities))
        .route("/auth/register", post(register))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/rides/", post(create_ride))
        .route("/rides/my-request", get(my_request))
        .route("/rides/pending", get(pending_rides))
        .route("/rides/my-accepted", get(my_accepted))
        .route("/rides/{id}/respond", post(respond))
        .route("/rides/{id}/cancel", post(cancel))
        .route("/rides/{id}/complete", post(complete))
        .route("/rides/{id}/review", post(submit_review).get(get_review))
        .with_state(shared)
}

// =============================================================================
// REJECTIONS
// =============================================================================

struct Reject {
    status: StatusCode,
    code: &'static str,
    detail: String,
}

impl IntoResponse for Reject {
    fn into_response(self) -> Response {
        let body = json!({ "detail": self.detail, "code": self.code });
        (self.status, Json(body)).into_response()
    }
}

fn reject(status: StatusCode, code: &'static str, detail: impl Into<String>) -> Reject {
    Reject {
        status,
        code,
        detail: detail.into(),
    }
}

fn validation(detail: impl Into<String>) -> Reject {
    reject(StatusCode::BAD_REQUEST, "validation", detail)
}

fn invalid_state(detail: impl Into<String>) -> Reject {
    reject(StatusCode::CONFLICT, "invalid_state", detail)
}

type ApiOk = (StatusCode, Json<Value>);

// =============================================================================
// HELPERS
// =============================================================================

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn generate_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000_u32))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn authed(state: &BackendState, headers: &HeaderMap) -> Result<StoredUser, Reject> {
    let token = bearer_token(headers)
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "auth", "Not authenticated"))?;
    let user_id = state
        .tokens
        .get(token)
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "auth", "Invalid or expired token"))?;
    state
        .users
        .get(user_id)
        .cloned()
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "auth", "Invalid or expired token"))
}

fn require_driver(user: &StoredUser) -> Result<(), Reject> {
    if user.role == "driver" {
        Ok(())
    } else {
        Err(reject(StatusCode::FORBIDDEN, "forbidden", "Drivers only"))
    }
}

fn require_rider(user: &StoredUser) -> Result<(), Reject> {
    if user.role == "rider" {
        Ok(())
    } else {
        Err(reject(StatusCode::FORBIDDEN, "forbidden", "Riders only"))
    }
}

fn str_field<'a>(body: &'a Value, key: &str) -> Result<&'a str, Reject> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| validation(format!("{key} is required")))
}

fn naive(value: OffsetDateTime) -> String {
    value
        .format(NAIVE_FORMAT)
        .unwrap_or_else(|_| value.to_string())
}

fn user_summary(state: &BackendState, user_id: i64) -> Value {
    match state.users.get(&user_id) {
        Some(user) => json!({
            "id": user.id,
            "full_name": user.full_name,
            "email": user.email,
            "license_plate": user.license_plate,
        }),
        None => Value::Null,
    }
}

fn ride_json(state: &BackendState, ride: &StoredRide) -> Value {
    json!({
        "id": ride.id,
        "university_key": ride.university_key,
        "pickup_location": ride.pickup_location,
        "destination": ride.destination,
        "ride_date": naive(ride.ride_date),
        "status": ride.status,
        "rider": user_summary(state, ride.rider_id),
        "driver": ride.driver_id.map(|id| user_summary(state, id)),
        "created_at": naive(ride.created_at),
    })
}

fn review_json(review: &StoredReview) -> Value {
    json!({
        "id": review.id,
        "ride_id": review.ride_id,
        "reviewer_id": review.reviewer_id,
        "rating": review.rating,
        "comment": review.comment,
        "created_at": naive(review.created_at),
    })
}

// =============================================================================
// AUTH HANDLERS
// =============================================================================

async fn root() -> Json<Value> {
    Json(json!({ "message": "CampusRide API" }))
}

async fn universities(State(shared): State<Shared>) -> Json<Value> {
    let state = shared.read().await;
    let universities: Vec<Value> = state
        .universities
        .iter()
        .map(|(key, name, domains)| json!({ "key": key, "name": name, "domains": domains }))
        .collect();
    Json(json!({ "universities": universities }))
}

async fn register(State(shared): State<Shared>, Json(body): Json<Value>) -> Result<ApiOk, Reject> {
    let email = str_field(&body, "email")?.to_ascii_lowercase();
    let password = str_field(&body, "password")?.to_owned();
    let full_name = str_field(&body, "full_name")?.to_owned();
    let role = str_field(&body, "role")?.to_owned();
    let university_key = str_field(&body, "university_key")?.to_owned();
    let license_plate = body
        .get("license_plate")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned);

    if !matches!(role.as_str(), "rider" | "driver") {
        return Err(validation("Role must be rider or driver"));
    }
    if role == "driver" && license_plate.is_none() {
        return Err(validation("License plate is required for drivers"));
    }

    let mut state = shared.write().await;
    let Some((_, _, domains)) = state
        .universities
        .iter()
        .find(|(key, _, _)| *key == university_key)
        .cloned()
    else {
        return Err(validation("Unknown university"));
    };
    let domain = email.split('@').nth(1).unwrap_or_default();
    if !domains.iter().any(|allowed| allowed == domain) {
        return Err(validation("Email domain does not match the selected university"));
    }

    if let Some(existing) = state.user_by_email(&email) {
        if existing.is_verified {
            return Err(reject(StatusCode::CONFLICT, "conflict", "Email is already registered"));
        }
        // Unverified re-registration restarts verification with a fresh
        // profile; the new code invalidates any previous one.
        let id = existing.id;
        let user = StoredUser {
            id,
            email: email.clone(),
            password_hash: sha256_hex(&password),
            full_name,
            role,
            university_key,
            license_plate,
            is_verified: false,
            created_at: OffsetDateTime::now_utc(),
        };
        state.users.insert(id, user);
    } else {
        let id = state.next_id();
        let user = StoredUser {
            id,
            email: email.clone(),
            password_hash: sha256_hex(&password),
            full_name,
            role,
            university_key,
            license_plate,
            is_verified: false,
            created_at: OffsetDateTime::now_utc(),
        };
        state.users.insert(id, user);
    }

    let code = generate_code();
    state.codes.insert(
        email.clone(),
        PendingCode {
            code_hash: sha256_hex(&code),
            issued_at: OffsetDateTime::now_utc(),
        },
    );
    state.outbox.push((email, code));

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Check your email for a verification code" })),
    ))
}

async fn verify_email(State(shared): State<Shared>, Json(body): Json<Value>) -> Result<ApiOk, Reject> {
    let email = str_field(&body, "email")?.to_ascii_lowercase();
    let code = str_field(&body, "code")?.to_owned();

    let mut state = shared.write().await;
    let Some(user_id) = state.user_by_email(&email).map(|user| user.id) else {
        return Err(reject(StatusCode::NOT_FOUND, "not_found", "No account with that email"));
    };

    let valid = state.codes.get(&email).is_some_and(|pending| {
        pending.code_hash == sha256_hex(&code)
            && pending.issued_at + CODE_TTL > OffsetDateTime::now_utc()
    });
    if !valid {
        return Err(validation("Invalid or expired verification code"));
    }

    state.codes.remove(&email);
    if let Some(user) = state.users.get_mut(&user_id) {
        user.is_verified = true;
    }
    let token = generate_token();
    state.tokens.insert(token.clone(), user_id);

    Ok((
        StatusCode::OK,
        Json(json!({ "access_token": token, "token_type": "bearer" })),
    ))
}

async fn login(State(shared): State<Shared>, Json(body): Json<Value>) -> Result<ApiOk, Reject> {
    let email = str_field(&body, "email")?.to_ascii_lowercase();
    let password = str_field(&body, "password")?;

    let mut state = shared.write().await;
    let Some(user) = state.user_by_email(&email).cloned() else {
        return Err(reject(StatusCode::UNAUTHORIZED, "auth", "Incorrect email or password"));
    };
    if user.password_hash != sha256_hex(password) {
        return Err(reject(StatusCode::UNAUTHORIZED, "auth", "Incorrect email or password"));
    }
    if !user.is_verified {
        return Err(reject(StatusCode::FORBIDDEN, "forbidden", "Email is not verified"));
    }

    let token = generate_token();
    state.tokens.insert(token.clone(), user.id);
    Ok((
        StatusCode::OK,
        Json(json!({ "access_token": token, "token_type": "bearer" })),
    ))
}

async fn me(State(shared): State<Shared>, headers: HeaderMap) -> Result<ApiOk, Reject> {
    let state = shared.read().await;
    let user = authed(&state, &headers)?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "id": user.id,
            "email": user.email,
            "full_name": user.full_name,
            "role": user.role,
            "university_key": user.university_key,
            "license_plate": user.license_plate,
            "is_verified": user.is_verified,
            "created_at": naive(user.created_at),
        })),
    ))
}

// =============================================================================
// RIDE HANDLERS
// =============================================================================

async fn create_ride(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<ApiOk, Reject> {
    let mut state = shared.write().await;
    let user = authed(&state, &headers)?;
    require_rider(&user)?;

    let pickup_location = str_field(&body, "pickup_location")?.to_owned();
    let destination = str_field(&body, "destination")?.to_owned();
    let raw_date = str_field(&body, "ride_date")?;
    let ride_date = OffsetDateTime::parse(raw_date, &Rfc3339)
        .map_err(|_| validation("ride_date must be an ISO-8601 datetime"))?;
    if ride_date <= OffsetDateTime::now_utc() {
        return Err(validation("Ride date must be in the future"));
    }

    if state.active_ride_of(user.id).is_some() {
        return Err(reject(
            StatusCode::CONFLICT,
            "conflict",
            "You already have an active ride request",
        ));
    }

    let id = state.next_id();
    let ride = StoredRide {
        id,
        university_key: user.university_key.clone(),
        pickup_location,
        destination,
        ride_date,
        status: "pending".to_owned(),
        rider_id: user.id,
        driver_id: None,
        created_at: OffsetDateTime::now_utc(),
    };
    state.rides.insert(id, ride);
    let ride = state.rides.get(&id).cloned().ok_or_else(|| {
        reject(StatusCode::INTERNAL_SERVER_ERROR, "not_found", "ride vanished")
    })?;
    Ok((StatusCode::CREATED, Json(ride_json(&state, &ride))))
}

async fn my_request(State(shared): State<Shared>, headers: HeaderMap) -> Result<ApiOk, Reject> {
    let state = shared.read().await;
    let user = authed(&state, &headers)?;
    require_rider(&user)?;
    let body = state
        .active_ride_of(user.id)
        .map_or(Value::Null, |ride| ride_json(&state, ride));
    Ok((StatusCode::OK, Json(body)))
}

async fn pending_rides(State(shared): State<Shared>, headers: HeaderMap) -> Result<ApiOk, Reject> {
    let state = shared.read().await;
    let user = authed(&state, &headers)?;
    require_driver(&user)?;

    let mut matches: Vec<&StoredRide> = state
        .rides
        .values()
        .filter(|ride| ride.status == "pending" && ride.university_key == user.university_key)
        .collect();
    matches.sort_by_key(|ride| ride.ride_date);
    let rides: Vec<Value> = matches.iter().map(|ride| ride_json(&state, ride)).collect();
    Ok((StatusCode::OK, Json(json!({ "rides": rides }))))
}

async fn my_accepted(State(shared): State<Shared>, headers: HeaderMap) -> Result<ApiOk, Reject> {
    let state = shared.read().await;
    let user = authed(&state, &headers)?;
    require_driver(&user)?;

    let mut matches: Vec<&StoredRide> = state
        .rides
        .values()
        .filter(|ride| ride.status == "accepted" && ride.driver_id == Some(user.id))
        .collect();
    matches.sort_by_key(|ride| ride.ride_date);
    let rides: Vec<Value> = matches.iter().map(|ride| ride_json(&state, ride)).collect();
    Ok((StatusCode::OK, Json(json!({ "rides": rides }))))
}

async fn respond(
    State(shared): State<Shared>,
    Path(ride_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<ApiOk, Reject> {
    let action = str_field(&body, "action")?.to_owned();
    if !matches!(action.as_str(), "accept" | "decline") {
        return Err(validation("Action must be accept or decline"));
    }

    // Status check and transition under one write lock: the loser of a race
    // observes the already-moved status, never a torn state.
    let mut state = shared.write().await;
    let user = authed(&state, &headers)?;
    require_driver(&user)?;

    let Some(ride) = state.rides.get(&ride_id) else {
        return Err(reject(StatusCode::NOT_FOUND, "not_found", "Ride request not found"));
    };
    if ride.university_key != user.university_key {
        return Err(reject(StatusCode::FORBIDDEN, "forbidden", "Ride is outside your university"));
    }
    if ride.status != "pending" {
        return Err(invalid_state("Ride request is no longer pending"));
    }

    let (status, driver_id) = if action == "accept" {
        ("accepted", Some(user.id))
    } else {
        ("declined", None)
    };
    if let Some(ride) = state.rides.get_mut(&ride_id) {
        ride.status = status.to_owned();
        ride.driver_id = driver_id;
    }
    let ride = state.rides.get(&ride_id).cloned().ok_or_else(|| {
        reject(StatusCode::INTERNAL_SERVER_ERROR, "not_found", "ride vanished")
    })?;
    Ok((StatusCode::OK, Json(ride_json(&state, &ride))))
}

async fn cancel(
    State(shared): State<Shared>,
    Path(ride_id): Path<i64>,
    headers: HeaderMap,
) -> Result<ApiOk, Reject> {
    let mut state = shared.write().await;
    let user = authed(&state, &headers)?;

    let Some(ride) = state.rides.get(&ride_id) else {
        return Err(reject(StatusCode::NOT_FOUND, "not_found", "Ride request not found"));
    };
    if ride.rider_id != user.id {
        return Err(reject(StatusCode::FORBIDDEN, "forbidden", "Not your ride request"));
    }
    if !matches!(ride.status.as_str(), "pending" | "accepted") {
        return Err(invalid_state("Only pending or accepted rides can be cancelled"));
    }

    if let Some(ride) = state.rides.get_mut(&ride_id) {
        ride.status = "cancelled".to_owned();
    }
    let ride = state.rides.get(&ride_id).cloned().ok_or_else(|| {
        reject(StatusCode::INTERNAL_SERVER_ERROR, "not_found", "ride vanished")
    })?;
    Ok((StatusCode::OK, Json(ride_json(&state, &ride))))
}

async fn complete(
    State(shared): State<Shared>,
    Path(ride_id): Path<i64>,
    headers: HeaderMap,
) -> Result<ApiOk, Reject> {
    let mut state = shared.write().await;
    let user = authed(&state, &headers)?;
    require_driver(&user)?;

    let Some(ride) = state.rides.get(&ride_id) else {
        return Err(reject(StatusCode::NOT_FOUND, "not_found", "Ride request not found"));
    };
    if ride.driver_id != Some(user.id) {
        return Err(reject(StatusCode::FORBIDDEN, "forbidden", "Not your accepted ride"));
    }
    if ride.status != "accepted" {
        return Err(invalid_state("Only accepted rides can be completed"));
    }

    if let Some(ride) = state.rides.get_mut(&ride_id) {
        ride.status = "completed".to_owned();
    }
    let ride = state.rides.get(&ride_id).cloned().ok_or_else(|| {
        reject(StatusCode::INTERNAL_SERVER_ERROR, "not_found", "ride vanished")
    })?;
    Ok((StatusCode::OK, Json(ride_json(&state, &ride))))
}

async fn submit_review(
    State(shared): State<Shared>,
    Path(ride_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<ApiOk, Reject> {
    let mut state = shared.write().await;
    let user = authed(&state, &headers)?;

    let Some(ride) = state.rides.get(&ride_id).cloned() else {
        return Err(reject(StatusCode::NOT_FOUND, "not_found", "Ride request not found"));
    };
    if ride.rider_id != user.id {
        return Err(reject(StatusCode::FORBIDDEN, "forbidden", "Only the rider may review"));
    }
    if ride.status != "completed" {
        return Err(invalid_state("Only completed rides can be reviewed"));
    }
    if state.reviews.contains_key(&ride_id) {
        return Err(reject(StatusCode::CONFLICT, "conflict", "Ride has already been reviewed"));
    }

    let rating = body
        .get("rating")
        .and_then(Value::as_u64)
        .filter(|rating| (1..=5).contains(rating))
        .ok_or_else(|| validation("Rating must be between 1 and 5"))?;
    let comment = str_field(&body, "comment")?.to_owned();

    let id = state.next_id();
    let review = StoredReview {
        id,
        ride_id,
        reviewer_id: user.id,
        rating: u8::try_from(rating).unwrap_or(5),
        comment,
        created_at: OffsetDateTime::now_utc(),
    };
    let body = review_json(&review);
    state.reviews.insert(ride_id, review);
    Ok((StatusCode::CREATED, Json(body)))
}

async fn get_review(
    State(shared): State<Shared>,
    Path(ride_id): Path<i64>,
    headers: HeaderMap,
) -> Result<ApiOk, Reject> {
    let state = shared.read().await;
    let user = authed(&state, &headers)?;

    let Some(ride) = state.rides.get(&ride_id) else {
        return Err(reject(StatusCode::NOT_FOUND, "not_found", "Ride request not found"));
    };
    if ride.rider_id != user.id && ride.driver_id != Some(user.id) {
        return Err(reject(StatusCode::FORBIDDEN, "forbidden", "Not a party to this ride"));
    }

    match state.reviews.get(&ride_id) {
        Some(review) => Ok((StatusCode::OK, Json(review_json(review)))),
        None => Err(reject(StatusCode::NOT_FOUND, "not_found", "No review yet")),
    }
}
