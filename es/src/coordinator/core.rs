//! Main Coordinator task implementation

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::config::CoordinatorConfig;
use super::handle::CoordinatorHandle;
use super::messages::CoordRequest;
use super::observer::FetchError;
use super::state::{BeginOutcome, CyclePlan, RefreshState};

/// The Coordinator owns the current version and runs refresh cycles
///
/// All state lives inside the task started by [`Coordinator::run`]; handles
/// talk to it over a channel, so requests are applied one at a time in the
/// order they arrive.
pub struct Coordinator {
    config: CoordinatorConfig,
    tx: mpsc::Sender<CoordRequest>,
    rx: mpsc::Receiver<CoordRequest>,
}

impl Coordinator {
    /// Create a new Coordinator with the given configuration
    pub fn new(config: CoordinatorConfig) -> Self {
        debug!(?config, "Coordinator::new: called");
        let (tx, rx) = mpsc::channel(config.channel_buffer.max(1));
        Self { config, tx, rx }
    }

    /// Create a handle for registering observers and offering versions
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(self.tx.clone())
    }

    /// Spawn the Coordinator task and return a handle to it
    pub fn spawn(config: CoordinatorConfig) -> CoordinatorHandle {
        let coordinator = Self::new(config);
        let handle = coordinator.handle();
        tokio::spawn(coordinator.run());
        handle
    }

    /// Run the Coordinator task
    ///
    /// This consumes the Coordinator and runs until shutdown is requested or
    /// every handle has been dropped.
    pub async fn run(self) {
        let Coordinator { config, tx, mut rx } = self;

        // Cycle tasks report back through a weak sender so dropped handles still end the task
        let cycle_tx = tx.downgrade();
        drop(tx);

        let mut state = RefreshState::new(config.cold_start_fetch);

        info!("Coordinator started");

        while let Some(req) = rx.recv().await {
            match req {
                CoordRequest::Register { observer, reply_tx } => {
                    let id = state.register(observer);
                    if reply_tx.send(id.clone()).is_err() {
                        // Nobody holds the id, so nobody could ever unregister it
                        warn!(observer = %id, "Register caller went away, dropping observer");
                        state.unregister(&id);
                        continue;
                    }
                    debug!(observer = %id, "Registered observer");

                    if state.is_refreshing() {
                        debug!("Refresh in progress, new observer joins the follow-up cycle");
                    } else {
                        start_cycle(&mut state, &cycle_tx);
                    }
                }

                CoordRequest::Unregister { id } => {
                    if state.unregister(&id) {
                        debug!(observer = %id, "Unregistered observer");
                    } else {
                        debug!(observer = %id, "Unregister for unknown observer ignored");
                    }
                }

                CoordRequest::UpdateVersion { candidate, reply_tx } => {
                    let updated = state.update_version(candidate);
                    let _ = reply_tx.send(updated);

                    if updated {
                        if state.is_refreshing() {
                            info!(version = candidate, "Version updated but refresh is in progress");
                        } else {
                            start_cycle(&mut state, &cycle_tx);
                        }
                    }
                }

                CoordRequest::CycleComplete { mut plan, results } => {
                    match state.complete_cycle(&mut plan, results) {
                        Ok(delivered) => {
                            debug!(cycle = plan.cycle, delivered, "Refresh cycle complete");
                        }
                        Err(e) => {
                            error!(cycle = plan.cycle, error = %e, "Refresh cycle results are inconsistent");
                        }
                    }

                    if state.needs_follow_up(&plan) {
                        debug!(cycle = plan.cycle, "Observers or version changed during cycle, refreshing again");
                        start_cycle(&mut state, &cycle_tx);
                    }
                }

                CoordRequest::CurrentVersion { reply_tx } => {
                    let _ = reply_tx.send(state.current_version());
                }

                CoordRequest::GetMetrics { reply_tx } => {
                    let _ = reply_tx.send(state.metrics());
                }

                CoordRequest::Shutdown => {
                    info!("Coordinator shutting down");
                    break;
                }
            }
        }

        info!("Coordinator stopped");
    }
}

fn start_cycle(state: &mut RefreshState, cycle_tx: &mpsc::WeakSender<CoordRequest>) {
    match state.begin_cycle() {
        BeginOutcome::Started(plan) => {
            debug!(
                cycle = plan.cycle,
                version = ?plan.version,
                participants = plan.participants.len(),
                "Starting refresh cycle"
            );
            tokio::spawn(dispatch(plan, cycle_tx.clone()));
        }
        BeginOutcome::NoObservers => debug!("No observers registered, skipping refresh"),
        BeginOutcome::NoVersion => debug!("No version known yet, waiting before refresh"),
        BeginOutcome::AlreadyRefreshing => {
            warn!("Tried to start a refresh cycle while another was ongoing");
        }
    }
}

/// Fetch for every participant concurrently, then hand the results back
async fn dispatch(plan: CyclePlan, cycle_tx: mpsc::WeakSender<CoordRequest>) {
    let version = plan.version;
    let fetches: Vec<_> = plan
        .participants
        .iter()
        .map(|participant| {
            let observer = participant.observer.clone();
            tokio::spawn(async move { observer.fetch(version).await })
        })
        .collect();

    let results: Vec<_> = join_all(fetches)
        .await
        .into_iter()
        .map(|joined| joined.unwrap_or_else(|e| Err(FetchError::Panicked(e.to_string()))))
        .collect();

    let cycle = plan.cycle;
    let Some(tx) = cycle_tx.upgrade() else {
        debug!(cycle, "Coordinator gone before cycle completed");
        return;
    };
    if tx.send(CoordRequest::CycleComplete { plan, results }).await.is_err() {
        debug!(cycle, "Coordinator stopped before cycle completed");
    }
}
