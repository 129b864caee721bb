//! First-success race of negotiation pipelines across egress endpoints.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Semaphore, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::credentials::CredentialPair;
use crate::error::RaceError;
use crate::negotiation::Negotiator;
use crate::proxy::EgressEndpoint;

/// Race tuning.
#[derive(Debug, Clone)]
pub struct RaceConfig {
    /// Total time allowed for the race, measured once at its start
    pub deadline: Duration,
    /// Cap on concurrently running pipelines. `None` starts all at once.
    pub max_in_flight: Option<usize>,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(10),
            max_in_flight: None,
        }
    }
}

/// The winning pipeline's result.
#[derive(Debug, Clone)]
pub struct RaceWin {
    pub endpoint: EgressEndpoint,
    pub credentials: CredentialPair,
    pub elapsed: Duration,
}

/// Accepts at most one value. Later offers return immediately.
///
/// Dropping the last handle without an offer closes the receiver.
pub struct WinnerSlot<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> WinnerSlot<T> {
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Offer `value`. Returns `true` only when it was the first offer and
    /// the receiver was still waiting.
    pub fn offer(&self, value: T) -> bool {
        let sender = self.sender.lock().take();
        match sender {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }
}

/// Spawns one pipeline per endpoint and keeps the first success.
#[derive(Debug, Clone)]
pub struct RaceCoordinator {
    negotiator: Arc<Negotiator>,
    config: RaceConfig,
}

impl RaceCoordinator {
    pub fn new(negotiator: Arc<Negotiator>, config: RaceConfig) -> Self {
        Self { negotiator, config }
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    /// Race all `endpoints` and return the first credentials obtained.
    ///
    /// Resolves no later than the configured deadline. Losing pipelines are
    /// not awaited; the shared token is cancelled when this returns, so they
    /// abandon their in-flight stage.
    pub async fn race(&self, endpoints: Vec<EgressEndpoint>) -> Result<RaceWin, RaceError> {
        let attempts = endpoints.len();
        if attempts == 0 {
            return Err(RaceError::NoEndpoints);
        }

        let started = Instant::now();
        let deadline = started + self.config.deadline;
        let cancel = CancellationToken::new();
        let _cancel_on_exit = cancel.clone().drop_guard();

        let (slot, winner_rx) = WinnerSlot::new();
        let slot = Arc::new(slot);
        let permits = self
            .config
            .max_in_flight
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));

        info!(
            endpoints = attempts,
            deadline_ms = self.config.deadline.as_millis() as u64,
            max_in_flight = ?self.config.max_in_flight,
            "Starting race"
        );

        for (index, endpoint) in endpoints.into_iter().enumerate() {
            let negotiator = self.negotiator.clone();
            let cancel = cancel.clone();
            let slot = slot.clone();
            let permits = permits.clone();
            let span = info_span!("attempt", index, endpoint = %endpoint);

            tokio::spawn(
                async move {
                    let _permit = match permits {
                        Some(permits) => tokio::select! {
                            _ = cancel.cancelled() => return,
                            permit = permits.acquire_owned() => match permit {
                                Ok(permit) => Some(permit),
                                Err(_) => return,
                            },
                        },
                        None => None,
                    };

                    if let Ok(credentials) = negotiator.negotiate(&endpoint, &cancel).await {
                        let win = RaceWin {
                            endpoint,
                            credentials,
                            elapsed: started.elapsed(),
                        };
                        if !slot.offer(win) {
                            debug!("Late success discarded");
                        }
                    }
                }
                .instrument(span),
            );
        }
        // Only the spawned pipelines hold the slot now; once all of them
        // finish without a success the receiver sees the sender dropped.
        drop(slot);

        tokio::select! {
            result = winner_rx => match result {
                Ok(win) => {
                    info!(
                        endpoint = %win.endpoint,
                        elapsed_ms = win.elapsed.as_millis() as u64,
                        "Race won"
                    );
                    Ok(win)
                }
                Err(_) => {
                    warn!(attempts, "Every endpoint failed");
                    Err(RaceError::Exhausted { attempts })
                }
            },
            _ = tokio::time::sleep_until(deadline) => {
                warn!(attempts, "Race deadline elapsed");
                Err(RaceError::DeadlineElapsed(self.config.deadline))
            }
        }
    }
}
