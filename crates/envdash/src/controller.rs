//! Refresh cycles on a timer and on user action, at most one at a time.
//!
//! A cycle fetches the device status, resolves coordinates, aggregates
//! weather then air quality, classifies and publishes. Triggers that
//! arrive while a cycle is in flight are dropped, not queued. Whatever
//! happens inside a cycle, the controller ends up `Idle` again.

use crate::air_quality;
use crate::classify::Classifier;
use crate::config::{Config, ConfigError};
use crate::device;
use crate::error::CycleError;
use crate::feed::FeedClient;
use crate::geo;
use crate::snapshot::{SnapshotPublisher, StatusSnapshot};
use crate::weather;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Idle,
    InFlight,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    Scheduled,
    UserRefresh,
    /// Fire the device command first, then refresh
    UserRun,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum TriggerOutcome {
    Completed,
    /// The cycle ran but something failed; carries the user-visible message
    Failed(String),
    /// Another cycle was in flight
    Dropped,
}

/// Current state plus the last user-visible message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerStatus {
    pub state: ControllerState,
    pub message: String,
}

pub struct PollingController<C: FeedClient> {
    client: C,
    config: Config,
    classifier: Classifier,
    status: Mutex<ControllerStatus>,
    publisher: SnapshotPublisher,
}

/// Returns the controller to `Idle` when the cycle ends, however it ends.
struct InFlightGuard<'a> {
    status: &'a Mutex<ControllerStatus>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        lock(self.status).state = ControllerState::Idle;
    }
}

fn lock(status: &Mutex<ControllerStatus>) -> MutexGuard<'_, ControllerStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C: FeedClient> PollingController<C> {
    pub fn new(client: C, config: Config) -> Result<Self, ConfigError> {
        let classifier = config.classifier()?;
        classifier.log_gaps();
        Ok(Self {
            client,
            config,
            classifier,
            status: Mutex::new(ControllerStatus {
                state: ControllerState::Idle,
                message: String::new(),
            }),
            publisher: SnapshotPublisher::new(),
        })
    }

    pub fn status(&self) -> ControllerStatus {
        lock(&self.status).clone()
    }

    pub fn state(&self) -> ControllerState {
        lock(&self.status).state
    }

    pub fn publisher(&self) -> &SnapshotPublisher {
        &self.publisher
    }

    pub fn latest(&self) -> Option<Arc<StatusSnapshot>> {
        self.publisher.latest()
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run one cycle for `reason`, unless one is already in flight.
    pub async fn trigger(&self, reason: TriggerReason) -> TriggerOutcome {
        let Some(_guard) = self.begin() else {
            log::debug!("[Poller] {:?} trigger dropped: cycle in flight", reason);
            return TriggerOutcome::Dropped;
        };
        log::debug!("[Poller] cycle started ({:?})", reason);

        let mut run_failure = None;
        if reason == TriggerReason::UserRun {
            match device::run_command(&self.client, &self.config.endpoints.device_run).await {
                Ok(()) => tokio::time::sleep(self.config.run_settle()).await,
                Err(e) => {
                    // The refresh still runs, so only the message changes here.
                    let e = CycleError::from(e);
                    log::error!("[Poller] run command failed: {}", e);
                    lock(&self.status).message = e.user_message().to_string();
                    run_failure = Some(e.user_message());
                }
            }
        }

        match self.refresh().await {
            Ok(snapshot) => {
                self.publisher.publish(snapshot);
                log::info!("[Poller] snapshot published");
                match run_failure {
                    Some(message) => TriggerOutcome::Failed(message.to_string()),
                    None => {
                        lock(&self.status).message.clear();
                        TriggerOutcome::Completed
                    }
                }
            }
            Err(e) => {
                log::error!("[Poller] cycle failed: {}", e);
                self.fail(e.user_message());
                TriggerOutcome::Failed(e.user_message().to_string())
            }
        }
    }

    /// Issue `Scheduled` triggers every poll interval until `shutdown` fires.
    ///
    /// The first tick is immediate. Each tick runs on its own task, so a
    /// stalled cycle makes the following ticks drop instead of piling up.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<()>) {
        log::info!(
            "[Poller] starting background loop ({}s interval)",
            self.config.poll_interval_secs
        );

        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let controller = Arc::clone(&self);
                    tokio::spawn(async move {
                        controller.trigger(TriggerReason::Scheduled).await;
                    });
                }
                _ = shutdown.changed() => {
                    log::info!("[Poller] shutdown signal received, exiting");
                    break;
                }
            }
        }
    }

    fn begin(&self) -> Option<InFlightGuard<'_>> {
        let mut status = lock(&self.status);
        if status.state != ControllerState::Idle {
            return None;
        }
        status.state = ControllerState::InFlight;
        Some(InFlightGuard {
            status: &self.status,
        })
    }

    fn fail(&self, message: &str) {
        let mut status = lock(&self.status);
        status.state = ControllerState::Error;
        status.message = message.to_string();
    }

    async fn refresh(&self) -> Result<StatusSnapshot, CycleError> {
        let endpoints = &self.config.endpoints;

        let device = device::fetch_status(&self.client, &endpoints.device_status).await?;
        let query = device.geo.clone().or(&self.config.location);
        let coords = geo::resolve(&self.client, &endpoints.geocoding, &query).await?;

        let weather =
            weather::aggregate(&self.client, &endpoints.forecast, &endpoints.points, coords).await?;
        let air_quality = air_quality::aggregate(&self.client, &endpoints.air_quality, coords).await?;

        Ok(StatusSnapshot::assemble(
            &device,
            coords,
            geo::forecast_link(&endpoints.forecast_page, coords),
            weather,
            air_quality,
            &self.classifier,
        ))
    }
}
