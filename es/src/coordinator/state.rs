//! Refresh state owned by the Coordinator task
//!
//! Holds the version gate, the observer registry and the single-flight flag.
//! Nothing in here performs I/O; the task in `core` feeds it requests and
//! dispatches the cycles it plans.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::messages::{CoordinatorError, CoordinatorMetrics};
use super::observer::{FetchError, FetchResult, Observer, ObserverId, Registered};

/// A refresh cycle that has been started but not yet reconciled
#[derive(Debug)]
pub(crate) struct CyclePlan {
    /// Sequence number, for logs
    pub cycle: u64,

    /// Version dispatched to every participant (`None` on a cold start)
    pub version: Option<u64>,

    /// Observers captured when the cycle started
    pub participants: Vec<Registered>,

    /// Version learned from the results of a cold-start cycle
    adopted: Option<u64>,
}

/// Result of trying to start a cycle
#[derive(Debug)]
pub(crate) enum BeginOutcome {
    Started(CyclePlan),
    NoObservers,
    NoVersion,
    AlreadyRefreshing,
}

pub(crate) struct RefreshState {
    current_version: Option<u64>,
    refreshing: bool,
    observers: Vec<Registered>,
    next_observer_id: u64,
    next_cycle: u64,
    cold_start_fetch: bool,
    metrics: CoordinatorMetrics,
}

impl RefreshState {
    pub fn new(cold_start_fetch: bool) -> Self {
        debug!(cold_start_fetch, "RefreshState::new: called");
        Self {
            current_version: None,
            refreshing: false,
            observers: Vec::new(),
            next_observer_id: 0,
            next_cycle: 0,
            cold_start_fetch,
            metrics: CoordinatorMetrics::default(),
        }
    }

    pub fn current_version(&self) -> Option<u64> {
        self.current_version
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing
    }

    pub fn metrics(&self) -> CoordinatorMetrics {
        CoordinatorMetrics {
            current_version: self.current_version,
            refreshing: self.refreshing,
            registered_observers: self.observers.len(),
            ..self.metrics.clone()
        }
    }

    /// Add an observer and hand out its id
    pub fn register(&mut self, observer: Arc<dyn Observer>) -> ObserverId {
        self.next_observer_id += 1;
        let id = ObserverId::from_counter(self.next_observer_id);
        self.observers.push(Registered { id: id.clone(), observer });
        id
    }

    /// Remove an observer; returns false if the id is unknown
    pub fn unregister(&mut self, id: &ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|registered| &registered.id != id);
        before != self.observers.len()
    }

    /// Adopt `candidate` if no version is known yet or it is strictly newer
    pub fn update_version(&mut self, candidate: u64) -> bool {
        match self.current_version {
            Some(current) if candidate <= current => {
                debug!(candidate, current, "update_version: stale or duplicate, ignoring");
                self.metrics.versions_rejected += 1;
                false
            }
            previous => {
                debug!(candidate, ?previous, "update_version: adopting");
                self.current_version = Some(candidate);
                self.metrics.versions_accepted += 1;
                true
            }
        }
    }

    /// Snapshot the registry and mark a cycle as running
    pub fn begin_cycle(&mut self) -> BeginOutcome {
        if self.observers.is_empty() {
            return BeginOutcome::NoObservers;
        }
        if self.current_version.is_none() && !self.cold_start_fetch {
            return BeginOutcome::NoVersion;
        }
        if self.refreshing {
            self.metrics.reentrant_cycle_attempts += 1;
            return BeginOutcome::AlreadyRefreshing;
        }

        self.next_cycle += 1;
        self.refreshing = true;
        self.metrics.cycles_started += 1;

        BeginOutcome::Started(CyclePlan {
            cycle: self.next_cycle,
            version: self.current_version,
            participants: self.observers.clone(),
            adopted: None,
        })
    }

    /// Deliver a cycle's results and clear the refreshing flag
    ///
    /// Returns how many observers were settled. The flag is cleared even when
    /// the results are inconsistent so the next cycle can still run.
    pub fn complete_cycle(
        &mut self,
        plan: &mut CyclePlan,
        results: Vec<Result<FetchResult, FetchError>>,
    ) -> Result<usize, CoordinatorError> {
        let outcome = self.reconcile(plan, results);
        self.refreshing = false;
        self.metrics.cycles_completed += 1;
        outcome
    }

    fn reconcile(
        &mut self,
        plan: &mut CyclePlan,
        results: Vec<Result<FetchResult, FetchError>>,
    ) -> Result<usize, CoordinatorError> {
        if results.len() != plan.participants.len() {
            self.metrics.consistency_faults += 1;
            return Err(CoordinatorError::ResultCountMismatch {
                expected: plan.participants.len(),
                actual: results.len(),
            });
        }

        let first_version = results.iter().flatten().map(|fetched| fetched.version).next();
        if plan.version.is_none()
            && let Some(first) = first_version
            && results.iter().flatten().any(|fetched| fetched.version != first)
        {
            warn!(cycle = plan.cycle, first, "Cold-start fetches disagree on version, trusting the first");
        }

        let mut delivered = 0;
        for (participant, result) in plan.participants.iter().zip(results) {
            let (version, payload) = match result {
                Ok(fetched) => (plan.version.or(Some(fetched.version)), Some(fetched.payload)),
                Err(e) => {
                    self.metrics.fetch_failures += 1;
                    warn!(cycle = plan.cycle, observer = %participant.id, error = %e, "Fetch failed, settling without data");
                    (plan.version.or(first_version), None)
                }
            };

            if !self.observers.iter().any(|registered| registered.id == participant.id) {
                debug!(cycle = plan.cycle, observer = %participant.id, "Observer left mid-cycle, dropping its result");
                continue;
            }

            let observer = &participant.observer;
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| observer.on_settled(version, payload))) {
                self.metrics.settle_panics += 1;
                error!(
                    cycle = plan.cycle,
                    observer = %participant.id,
                    panic = panic_message(panic.as_ref()),
                    "Settle callback panicked"
                );
                continue;
            }
            delivered += 1;
        }

        // Cold-start results pass the same strictly-newer gate as pushes
        if plan.version.is_none()
            && let Some(first) = first_version
        {
            if self.update_version(first) {
                info!(cycle = plan.cycle, version = first, "Adopting version from cold-start fetch");
            }
            plan.adopted = Some(first);
        }

        Ok(delivered)
    }

    /// Whether registrations or version updates arrived while `plan` ran
    pub fn needs_follow_up(&self, plan: &CyclePlan) -> bool {
        let baseline = plan.version.or(plan.adopted);
        let version_changed = self.current_version != baseline;
        let observers_changed = self.observers.len() != plan.participants.len()
            || self
                .observers
                .iter()
                .any(|registered| !plan.participants.iter().any(|p| p.id == registered.id));

        version_changed || observers_changed
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
