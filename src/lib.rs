//! CampusRide: typed client for the campus ride-sharing backend.
//!
//! SYSTEM CONTEXT
//! ==============
//! Students register as riders or drivers, riders post ride requests,
//! drivers accept or decline them, and rides move through a small status
//! lifecycle with an optional post-ride review. The backend owns all state;
//! this crate is the client side: a typed API gateway, the session store,
//! the lifecycle types, a polling engine standing in for push notifications,
//! and the rider/driver dashboard orchestration the CLI renders.

pub mod api;
pub mod config;
pub mod driver;
pub mod error;
pub mod poll;
pub mod rider;
pub mod session;
pub mod types;

pub use api::ApiClient;
pub use config::ClientConfig;
pub use driver::{DriverBoard, DriverDashboard, DriverEvent, RespondOutcome};
pub use error::ApiError;
pub use poll::{PollFlow, Poller};
pub use rider::{RiderDashboard, RiderEvent};
pub use session::{Session, SessionStore};
pub use types::{
    NewAccount, NewReview, NewRideRequest, Review, RideAction, RideRequest, RideStatus, Role,
    University, User, UserSummary,
};
