//! Driver dashboard orchestration.
//!
//! DESIGN
//! ======
//! The driver view is a two-column board: pending requests for the campus
//! and the rides this driver has accepted. Both columns are fetched
//! concurrently the way the production dashboard fired its fetches in
//! parallel. A lost respond race is a recoverable outcome, not an error:
//! [`DriverDashboard::respond`] folds the `InvalidState` answer into a fresh
//! board snapshot so callers refresh instead of failing.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::poll::{PollFlow, Poller};
use crate::types::{RideAction, RideRequest, RideStatus};

/// Default watch period for the driver view.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(15);

/// One refresh of the driver's world.
#[derive(Clone, Debug, Default)]
pub struct DriverBoard {
    /// Pending requests on this driver's campus, soonest ride first.
    pub pending: Vec<RideRequest>,
    /// Rides this driver accepted and has not yet completed.
    pub accepted: Vec<RideRequest>,
}

impl DriverBoard {
    /// Identity of the board for change detection: which rides, in which
    /// states, in which order.
    #[must_use]
    pub(crate) fn fingerprint(&self) -> Vec<(i64, RideStatus)> {
        self.pending
            .iter()
            .chain(self.accepted.iter())
            .map(|ride| (ride.id, ride.status))
            .collect()
    }
}

/// Result of answering a pending request.
#[derive(Clone, Debug)]
pub enum RespondOutcome {
    /// The answer landed; here is the updated ride.
    Updated(RideRequest),
    /// Someone else got there first (another driver, or the rider
    /// cancelling). Carries the server's message and a fresh board.
    Raced { message: String, board: DriverBoard },
}

/// Change notification from the driver watcher.
#[derive(Clone, Debug)]
pub enum DriverEvent {
    /// The board differs from the previous snapshot.
    BoardChanged(DriverBoard),
    /// A refresh failed; polling continues and the next tick retries.
    FetchFailed(String),
}

/// Driver-side operations over the ride lifecycle.
#[derive(Clone, Debug)]
pub struct DriverDashboard {
    api: ApiClient,
}

impl DriverDashboard {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Fetch both board columns concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first [`ApiError`] of the pair of fetches.
    pub async fn board(&self) -> Result<DriverBoard, ApiError> {
        let (pending, accepted) = tokio::try_join!(self.api.pending_rides(), self.api.my_accepted())?;
        Ok(DriverBoard { pending, accepted })
    }

    /// Accept or decline a pending request. A lost race comes back as
    /// [`RespondOutcome::Raced`] with a refreshed board.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] for failures other than the recoverable
    /// invalid-state answer.
    pub async fn respond(&self, ride_id: i64, action: RideAction) -> Result<RespondOutcome, ApiError> {
        match self.api.respond(ride_id, action).await {
            Ok(ride) => {
                info!(ride_id, %action, status = %ride.status, "responded to ride request");
                Ok(RespondOutcome::Updated(ride))
            }
            Err(ApiError::InvalidState(message)) => {
                info!(ride_id, %action, "ride request no longer pending; refreshing board");
                let board = self.board().await?;
                Ok(RespondOutcome::Raced { message, board })
            }
            Err(error) => Err(error),
        }
    }

    /// Mark an accepted ride as done.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidState`] unless the ride is accepted by
    /// this driver.
    pub async fn complete(&self, ride_id: i64) -> Result<RideRequest, ApiError> {
        let completed = self.api.complete(ride_id).await?;
        info!(ride_id, "ride completed");
        Ok(completed)
    }

    /// Start watching the board. The watcher runs until shut down; the first
    /// snapshot is always emitted.
    #[must_use]
    pub fn watch(&self, period: Duration) -> (Poller, mpsc::Receiver<DriverEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let dashboard = self.clone();

        let poller = Poller::spawn(
            "driver-watch",
            period,
            None::<Vec<(i64, RideStatus)>>,
            move |last| {
                let dashboard = dashboard.clone();
                let tx = tx.clone();
                async move { driver_tick(&dashboard, &tx, last).await }
            },
        );
        (poller, rx)
    }
}

type BoardFingerprint = Vec<(i64, RideStatus)>;

async fn driver_tick(
    dashboard: &DriverDashboard,
    tx: &mpsc::Sender<DriverEvent>,
    last: Option<BoardFingerprint>,
) -> (Option<BoardFingerprint>, PollFlow) {
    match dashboard.board().await {
        Ok(board) => {
            let fingerprint = board.fingerprint();
            let changed = last.as_ref() != Some(&fingerprint);
            if changed && tx.send(DriverEvent::BoardChanged(board)).await.is_err() {
                return (Some(fingerprint), PollFlow::Stop);
            }
            (Some(fingerprint), PollFlow::Continue)
        }
        Err(error) => {
            warn!(%error, "driver refresh failed");
            if tx
                .send(DriverEvent::FetchFailed(error.to_string()))
                .await
                .is_err()
            {
                return (last, PollFlow::Stop);
            }
            (last, PollFlow::Continue)
        }
    }
}

#[cfg(test)]
#[path = "driver_test.rs"]
mod tests;
