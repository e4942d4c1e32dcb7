//! Typed API gateway client.
//!
//! DESIGN
//! ======
//! One method per backend endpoint, each with an explicit request/response
//! shape from [`crate::types`]. A single shared `reqwest::Client` carries the
//! timeout; the bearer token is read from the [`SessionStore`] on every call
//! so a login in one handle is visible to its clones.
//!
//! ERROR HANDLING
//! ==============
//! Non-success responses are decoded as the `{ detail, code? }` envelope and
//! classified into [`ApiError`]. Any 401 clears the stored token before the
//! error propagates; the one deliberate exception to "errors always surface"
//! is the review lookup, where 404 is the normal no-review-yet state and
//! comes back as `Ok(None)`.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, ErrorBody, classify_response};
use crate::session::SessionStore;
use crate::types::{
    NewAccount, NewRideRequest, NewReview, Review, RideAction, RideRequest, University, User,
    normalize_verification_code,
};

// =============================================================================
// WIRE ENVELOPES
// =============================================================================

#[derive(Debug, Deserialize)]
struct UniversitiesResponse {
    universities: Vec<University>,
}

#[derive(Debug, Deserialize)]
struct RidesResponse {
    rides: Vec<RideRequest>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Human-readable acknowledgement, e.g. the verification prompt returned by
/// registration.
#[derive(Debug, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
struct VerifyEmailBody<'a> {
    email: &'a str,
    code: &'a str,
}

#[derive(Debug, Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RespondBody {
    action: RideAction,
}

#[derive(Debug, Serialize)]
struct EmptyBody {}

// =============================================================================
// CLIENT
// =============================================================================

/// HTTP client for the ride-sharing backend. Cheap to clone; clones share
/// the session store and the connection pool.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<SessionStore>,
}

impl ApiClient {
    /// Build a client from config, loading any persisted session token.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Session`] when the token file cannot be read, or
    /// [`ApiError::Network`] when the HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let store = SessionStore::open(config.token_path.clone())?;
        Self::with_store(config, Arc::new(store))
    }

    /// Build a client around an existing store. Used where several clients
    /// must share one session, and by tests that pre-seed tokens.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] when the HTTP client cannot be
    /// constructed.
    pub fn with_store(config: &ClientConfig, store: Arc<SessionStore>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            store,
        })
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Whether a bearer token is currently held.
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.store.has_token()
    }

    // -------------------------------------------------------------------------
    // AUTH ENDPOINTS
    // -------------------------------------------------------------------------

    /// `GET /` liveness probe.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the backend is unreachable or unhealthy.
    pub async fn ping(&self) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .request(Method::GET, "/", None::<&EmptyBody>, "Backend is not responding")
            .await?;
        Ok(())
    }

    /// `GET /auth/universities`: the campus directory.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    pub async fn universities(&self) -> Result<Vec<University>, ApiError> {
        let body: UniversitiesResponse = self
            .request(
                Method::GET,
                "/auth/universities",
                None::<&EmptyBody>,
                "Could not load universities",
            )
            .await?;
        Ok(body.universities)
    }

    /// `POST /auth/register`: create an account and trigger the
    /// verification email. Validates the form before sending.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] client-side for a malformed form,
    /// [`ApiError::Conflict`] for an already-verified email, or other
    /// classified server errors.
    pub async fn register(&self, account: &NewAccount) -> Result<MessageResponse, ApiError> {
        account.validate()?;
        self.request(Method::POST, "/auth/register", Some(account), "Registration failed")
            .await
    }

    /// `POST /auth/verify-email`: redeem the one-time code. The returned
    /// token becomes the active session.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] client-side when the code is not six
    /// digits, and for a wrong or expired code otherwise;
    /// [`ApiError::NotFound`] for an unknown email; or
    /// [`ApiError::Session`] if the token cannot be persisted.
    pub async fn verify_email(&self, email: &str, code: &str) -> Result<(), ApiError> {
        let code = normalize_verification_code(code).ok_or_else(|| {
            ApiError::Validation("Verification code must be exactly six digits".to_owned())
        })?;
        let body = VerifyEmailBody { email, code: code.as_str() };
        let token: TokenResponse = self
            .request(Method::POST, "/auth/verify-email", Some(&body), "Verification failed")
            .await?;
        self.store.set(&token.access_token)?;
        Ok(())
    }

    /// `POST /auth/login`: exchange credentials for a bearer token, which
    /// becomes the active session.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Auth`] for bad credentials,
    /// [`ApiError::Forbidden`] for an unverified account, or
    /// [`ApiError::Session`] if the token cannot be persisted.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ApiError> {
        let body = LoginBody { email, password };
        let token: TokenResponse = self
            .request(Method::POST, "/auth/login", Some(&body), "Login failed")
            .await?;
        self.store.set(&token.access_token)?;
        Ok(())
    }

    /// Forget the session. Local only; the backend keeps no session state
    /// beyond the token itself.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Session`] when the token file cannot be removed.
    pub fn logout(&self) -> Result<(), ApiError> {
        self.store.clear()?;
        Ok(())
    }

    /// `GET /auth/me`: the authenticated user's profile.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Auth`] for a missing or rejected token.
    pub async fn me(&self) -> Result<User, ApiError> {
        self.request(Method::GET, "/auth/me", None::<&EmptyBody>, "Not signed in")
            .await
    }

    // -------------------------------------------------------------------------
    // RIDE ENDPOINTS
    // -------------------------------------------------------------------------

    /// `POST /rides/`: create a ride request. Validates the form against
    /// the current clock before sending.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] client-side for empty fields or a
    /// non-future date, or [`ApiError::Conflict`] when an active request
    /// already exists.
    pub async fn create_ride(&self, ride: &NewRideRequest) -> Result<RideRequest, ApiError> {
        ride.validate(OffsetDateTime::now_utc())?;
        self.request(Method::POST, "/rides/", Some(ride), "Could not create ride request")
            .await
    }

    /// `GET /rides/my-request`: the rider's active request, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    pub async fn my_request(&self) -> Result<Option<RideRequest>, ApiError> {
        self.request(
            Method::GET,
            "/rides/my-request",
            None::<&EmptyBody>,
            "Could not load your ride request",
        )
        .await
    }

    /// `GET /rides/pending`: pending requests for the driver's university,
    /// soonest ride first.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Forbidden`] for non-driver callers.
    pub async fn pending_rides(&self) -> Result<Vec<RideRequest>, ApiError> {
        let body: RidesResponse = self
            .request(
                Method::GET,
                "/rides/pending",
                None::<&EmptyBody>,
                "Could not load pending rides",
            )
            .await?;
        Ok(body.rides)
    }

    /// `GET /rides/my-accepted`: rides this driver has accepted, soonest
    /// ride first.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Forbidden`] for non-driver callers.
    pub async fn my_accepted(&self) -> Result<Vec<RideRequest>, ApiError> {
        let body: RidesResponse = self
            .request(
                Method::GET,
                "/rides/my-accepted",
                None::<&EmptyBody>,
                "Could not load accepted rides",
            )
            .await?;
        Ok(body.rides)
    }

    /// `POST /rides/{id}/respond`: accept or decline a pending request.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidState`] when the request is no longer
    /// pending (lost race or rider cancellation).
    pub async fn respond(&self, ride_id: i64, action: RideAction) -> Result<RideRequest, ApiError> {
        let body = RespondBody { action };
        self.request(
            Method::POST,
            &format!("/rides/{ride_id}/respond"),
            Some(&body),
            "Could not respond to the ride request",
        )
        .await
    }

    /// `POST /rides/{id}/cancel`: rider calls off a pending or accepted
    /// request.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidState`] when the ride is already terminal.
    pub async fn cancel(&self, ride_id: i64) -> Result<RideRequest, ApiError> {
        self.request(
            Method::POST,
            &format!("/rides/{ride_id}/cancel"),
            Some(&EmptyBody {}),
            "Could not cancel the ride request",
        )
        .await
    }

    /// `POST /rides/{id}/complete`: accepting driver marks the ride done.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidState`] unless the ride is accepted.
    pub async fn complete(&self, ride_id: i64) -> Result<RideRequest, ApiError> {
        self.request(
            Method::POST,
            &format!("/rides/{ride_id}/complete"),
            Some(&EmptyBody {}),
            "Could not complete the ride",
        )
        .await
    }

    /// `POST /rides/{id}/review`: rider reviews a completed ride.
    /// Validates the form before sending.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] client-side for a bad rating or empty
    /// comment, [`ApiError::InvalidState`] unless the ride is completed, or
    /// [`ApiError::Conflict`] when a review already exists.
    pub async fn submit_review(&self, ride_id: i64, review: &NewReview) -> Result<Review, ApiError> {
        review.validate()?;
        self.request(
            Method::POST,
            &format!("/rides/{ride_id}/review"),
            Some(review),
            "Could not submit the review",
        )
        .await
    }

    /// `GET /rides/{id}/review`: the ride's review, or `None` when nobody
    /// has written one yet.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on failures other than the expected 404.
    pub async fn review(&self, ride_id: i64) -> Result<Option<Review>, ApiError> {
        let result: Result<Review, ApiError> = self
            .request(
                Method::GET,
                &format!("/rides/{ride_id}/review"),
                None::<&EmptyBody>,
                "Could not load the review",
            )
            .await;
        match result {
            Ok(review) => Ok(Some(review)),
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }

    // -------------------------------------------------------------------------
    // PLUMBING
    // -------------------------------------------------------------------------

    async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        fallback: &str,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}{path}", self.base_url);
        debug!(%method, path, "api request");

        let mut builder: RequestBuilder = self.http.request(method, &url);
        if let Some(token) = self.store.token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(response.json::<T>().await?);
        }

        let envelope = response.json::<ErrorBody>().await.ok();
        if status == 401 {
            warn!(path, "unauthorized response; clearing stored session");
            if let Err(error) = self.store.clear() {
                warn!(%error, "could not clear persisted session token");
            }
        }
        Err(classify_response(status, envelope, fallback))
    }
}
