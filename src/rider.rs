//! Rider dashboard orchestration.
//!
//! DESIGN
//! ======
//! The rider holds at most one active request, so the dashboard is built
//! around a single snapshot: fetch it, mutate it through the API, and watch
//! it by polling. The watcher diffs consecutive snapshots and emits an event
//! only when something the rider would notice changed (status moved, a
//! driver appeared, the request vanished). It stops itself once the request
//! is gone or terminal; a fetch failure is reported and polling continues.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::poll::{PollFlow, Poller};
use crate::types::{NewReview, NewRideRequest, Review, RideRequest};

/// Default watch period for the rider view.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(10);

/// Change notification from the rider watcher.
#[derive(Clone, Debug)]
pub enum RiderEvent {
    /// The active request changed (first sighting, status move, or a driver
    /// attaching).
    Updated(RideRequest),
    /// The request left the active slot: declined, cancelled, or completed
    /// by the driver. `last` is the final snapshot seen while it was live.
    Ended { last: Option<RideRequest> },
    /// A refresh failed; polling continues and the next tick retries.
    FetchFailed(String),
}

/// Rider-side operations over the ride lifecycle.
#[derive(Clone, Debug)]
pub struct RiderDashboard {
    api: ApiClient,
}

impl RiderDashboard {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// The rider's active request, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport or server failure.
    pub async fn current_request(&self) -> Result<Option<RideRequest>, ApiError> {
        self.api.my_request().await
    }

    /// Submit a new request. The form is validated before the call, and the
    /// backend rejects it with a conflict if an active request exists.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] or [`ApiError::Conflict`] per the
    /// lifecycle contract.
    pub async fn create_request(&self, ride: &NewRideRequest) -> Result<RideRequest, ApiError> {
        let created = self.api.create_ride(ride).await?;
        info!(ride_id = created.id, "ride request created");
        Ok(created)
    }

    /// Call off a pending or accepted request.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidState`] when the ride is already terminal.
    pub async fn cancel(&self, ride_id: i64) -> Result<RideRequest, ApiError> {
        let cancelled = self.api.cancel(ride_id).await?;
        info!(ride_id, "ride request cancelled");
        Ok(cancelled)
    }

    /// Review a completed ride. One review per ride; a second attempt is a
    /// conflict, never a silent overwrite.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`], [`ApiError::InvalidState`], or
    /// [`ApiError::Conflict`] per the lifecycle contract.
    pub async fn submit_review(&self, ride_id: i64, review: &NewReview) -> Result<Review, ApiError> {
        let created = self.api.submit_review(ride_id, review).await?;
        info!(ride_id, rating = created.rating, "review submitted");
        Ok(created)
    }

    /// The ride's review, or `None` while nobody has written one.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on failures other than the no-review-yet 404.
    pub async fn review(&self, ride_id: i64) -> Result<Option<Review>, ApiError> {
        self.api.review(ride_id).await
    }

    /// Start watching the active request. Returns the poll handle and the
    /// event stream; the watcher stops itself once the request is null or
    /// terminal, which closes the stream.
    #[must_use]
    pub fn watch(&self, period: Duration) -> (Poller, mpsc::Receiver<RiderEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let api = self.api.clone();

        let poller = Poller::spawn(
            "rider-watch",
            period,
            None::<RideRequest>,
            move |last| {
                let api = api.clone();
                let tx = tx.clone();
                async move { rider_tick(&api, &tx, last).await }
            },
        );
        (poller, rx)
    }
}

async fn rider_tick(
    api: &ApiClient,
    tx: &mpsc::Sender<RiderEvent>,
    last: Option<RideRequest>,
) -> (Option<RideRequest>, PollFlow) {
    match api.my_request().await {
        Ok(Some(current)) => {
            let changed = last
                .as_ref()
                .is_none_or(|previous| snapshot_changed(previous, &current));
            if changed {
                if tx.send(RiderEvent::Updated(current.clone())).await.is_err() {
                    return (Some(current), PollFlow::Stop);
                }
            }
            // Normally only active requests come back here, but a terminal
            // snapshot still ends the watch.
            if current.status.is_terminal() {
                let _ = tx
                    .send(RiderEvent::Ended {
                        last: Some(current.clone()),
                    })
                    .await;
                return (Some(current), PollFlow::Stop);
            }
            (Some(current), PollFlow::Continue)
        }
        Ok(None) => {
            let _ = tx.send(RiderEvent::Ended { last }).await;
            (None, PollFlow::Stop)
        }
        Err(error) => {
            warn!(%error, "rider refresh failed");
            if tx
                .send(RiderEvent::FetchFailed(error.to_string()))
                .await
                .is_err()
            {
                return (last, PollFlow::Stop);
            }
            (last, PollFlow::Continue)
        }
    }
}

/// Whether two snapshots differ in anything the rider view renders.
pub(crate) fn snapshot_changed(previous: &RideRequest, current: &RideRequest) -> bool {
    previous.id != current.id
        || previous.status != current.status
        || previous.driver.as_ref().map(|driver| driver.id)
            != current.driver.as_ref().map(|driver| driver.id)
}

#[cfg(test)]
#[path = "rider_test.rs"]
mod tests;
