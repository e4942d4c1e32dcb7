//! Domain model shared by the API client, the dashboards, and the CLI.
//!
//! DESIGN
//! ======
//! Wire shapes follow the backend exactly: snake_case fields, lowercase
//! enums, integer ids. Datetimes are RFC 3339 on the way out, but the
//! backend emits naive ISO-8601 timestamps without an offset, so the
//! [`iso8601`] codec accepts both and assumes UTC for naive values.
//!
//! Input structs (`NewAccount`, `NewRideRequest`, `NewReview`) carry the
//! validation the forms run before anything touches the network; the backend
//! enforces the same rules again on its side.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ApiError;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const VERIFICATION_CODE_LEN: usize = 6;
pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

// =============================================================================
// ENUMS
// =============================================================================

/// Account role, fixed at registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Rider,
    Driver,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rider => "rider",
            Self::Driver => "driver",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a ride request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    /// Created by the rider, waiting for a driver response.
    Pending,
    /// A driver took the ride; their profile is attached to the request.
    Accepted,
    /// A driver turned the request down. Terminal.
    Declined,
    /// The driver marked the ride done. Terminal; unlocks the review flow.
    Completed,
    /// The rider called it off before completion. Terminal.
    Cancelled,
}

impl RideStatus {
    /// Whether the request still occupies the rider's single active slot.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Accepted)
    }

    /// Terminal statuses permit no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RideStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Driver answer to a pending request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideAction {
    Accept,
    Decline,
}

impl RideAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Decline => "decline",
        }
    }
}

impl std::fmt::Display for RideAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// WIRE ENTITIES
// =============================================================================

/// A campus in the university directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct University {
    /// Stable key used to scope rides to a campus.
    pub key: String,
    pub name: String,
    /// Email domains that count as belonging to this campus.
    pub domains: Vec<String>,
}

/// The authenticated user's own profile, as returned by `GET /auth/me`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub university_key: String,
    #[serde(default)]
    pub license_plate: Option<String>,
    pub is_verified: bool,
    #[serde(with = "iso8601")]
    pub created_at: OffsetDateTime,
}

/// The slice of a user embedded in ride payloads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    /// Present for drivers so the rider knows which car to look for.
    #[serde(default)]
    pub license_plate: Option<String>,
}

/// A ride request as returned by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RideRequest {
    pub id: i64,
    pub university_key: String,
    pub pickup_location: String,
    pub destination: String,
    #[serde(with = "iso8601")]
    pub ride_date: OffsetDateTime,
    pub status: RideStatus,
    /// The requesting rider.
    pub rider: UserSummary,
    /// Set when a driver accepts; stays set through completion.
    #[serde(default)]
    pub driver: Option<UserSummary>,
    #[serde(with = "iso8601")]
    pub created_at: OffsetDateTime,
}

/// A post-ride review. One per ride, written by the rider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub ride_id: i64,
    pub reviewer_id: i64,
    pub rating: u8,
    pub comment: String,
    #[serde(with = "iso8601")]
    pub created_at: OffsetDateTime,
}

// =============================================================================
// INPUT FORMS
// =============================================================================

/// Registration payload, validated before submission.
#[derive(Clone, Debug, Serialize)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
    pub university_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_plate: Option<String>,
}

impl NewAccount {
    /// Checks the fields the backend would reject anyway, so the error
    /// surfaces on the form instead of after a round trip.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.full_name.trim().is_empty() {
            return Err(ApiError::Validation("Full name is required".to_owned()));
        }
        if !valid_school_email(&self.email) {
            return Err(ApiError::Validation(
                "Please use your university .edu email address".to_owned(),
            ));
        }
        if self.password.len() < MIN_PASSWORD_LEN {
            return Err(ApiError::Validation(
                "Password must be at least 8 characters".to_owned(),
            ));
        }
        if self.university_key.trim().is_empty() {
            return Err(ApiError::Validation("University is required".to_owned()));
        }
        if self.role == Role::Driver
            && self
                .license_plate
                .as_deref()
                .map_or(true, |plate| plate.trim().is_empty())
        {
            return Err(ApiError::Validation(
                "License plate is required for drivers".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Ride creation payload.
#[derive(Clone, Debug, Serialize)]
pub struct NewRideRequest {
    pub pickup_location: String,
    pub destination: String,
    #[serde(with = "iso8601")]
    pub ride_date: OffsetDateTime,
}

impl NewRideRequest {
    /// `now` is passed in so callers pin the clock once per submission.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] for empty fields or a ride date that
    /// is not strictly in the future.
    pub fn validate(&self, now: OffsetDateTime) -> Result<(), ApiError> {
        if self.pickup_location.trim().is_empty() {
            return Err(ApiError::Validation("Pickup location is required".to_owned()));
        }
        if self.destination.trim().is_empty() {
            return Err(ApiError::Validation("Destination is required".to_owned()));
        }
        if self.ride_date <= now {
            return Err(ApiError::Validation("Ride date must be in the future".to_owned()));
        }
        Ok(())
    }
}

/// Review submission payload.
#[derive(Clone, Debug, Serialize)]
pub struct NewReview {
    pub rating: u8,
    pub comment: String,
}

impl NewReview {
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] for an out-of-range rating or an
    /// empty comment.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.rating < MIN_RATING || self.rating > MAX_RATING {
            return Err(ApiError::Validation("Rating must be between 1 and 5".to_owned()));
        }
        if self.comment.trim().is_empty() {
            return Err(ApiError::Validation("Comment is required".to_owned()));
        }
        Ok(())
    }
}

// =============================================================================
// VALIDATION HELPERS
// =============================================================================

/// School-address check applied before registration is submitted. The
/// backend additionally checks the domain against the chosen university's
/// directory entry; the client can only vouch for the `.edu` suffix.
#[must_use]
pub fn valid_school_email(email: &str) -> bool {
    let email = email.trim().to_ascii_lowercase();
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty() && domain.len() > ".edu".len() && domain.ends_with(".edu")
}

/// Normalize a verification code to the six-digit wire form.
#[must_use]
pub fn normalize_verification_code(code: &str) -> Option<String> {
    let code = code.trim();
    if code.len() != VERIFICATION_CODE_LEN || !code.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(code.to_owned())
}

// =============================================================================
// DATETIME CODEC
// =============================================================================

/// RFC 3339 serialization with a lenient parse for the naive ISO-8601
/// timestamps the backend emits (no offset; assumed UTC).
pub mod iso8601 {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use time::OffsetDateTime;
    use time::format_description::well_known::Rfc3339;

    /// Parse RFC 3339, falling back to a naive timestamp interpreted as UTC.
    #[must_use]
    pub fn parse(raw: &str) -> Option<OffsetDateTime> {
        let raw = raw.trim();
        if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
            return Some(parsed);
        }
        // Naive values lack only the offset; appending one makes them RFC 3339.
        OffsetDateTime::parse(&format!("{raw}Z"), &Rfc3339).ok()
    }

    /// # Errors
    ///
    /// Fails when the value cannot be rendered as RFC 3339.
    pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let rendered = value.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&rendered)
    }

    /// # Errors
    ///
    /// Fails when the value is neither RFC 3339 nor a naive ISO-8601 timestamp.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid datetime: {raw}")))
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
