//! Settlement watcher
//!
//! Decides whether a named resource has reached its kind-specific ready
//! condition. A live watch subscription is the primary signal; a snapshot
//! read taken right after the subscription opens short-circuits the wait when
//! the resource is already settled.
//!
//! The wait is bounded twice: by a ceiling on observed events and by a
//! wall-clock deadline. Hitting either bound is reported as a [`Settlement`]
//! value, not as an error.

use std::fmt;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use tracing::{debug, info};

use crate::store::ResourceStore;
use crate::{Error, Result};

/// Observed-event ceiling for a Service waiting on a load balancer
pub const SERVICE_SETTLE_ATTEMPTS: u32 = 10;

/// Observed-event ceiling for a Deployment rollout.
///
/// Rollouts emit an event per replica transition, so this is larger than the
/// Service ceiling.
pub const DEPLOYMENT_SETTLE_ATTEMPTS: u32 = 60;

/// Default wall-clock budget for one settlement wait
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Bounds for one settlement wait
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettlePolicy {
    /// Give up once more than this many non-settled events were observed
    pub max_attempts: u32,
    /// Give up once this much time has passed since the wait started
    pub timeout: Duration,
}

impl SettlePolicy {
    /// Policy with the given attempt ceiling and the default deadline
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            timeout: DEFAULT_SETTLE_TIMEOUT,
        }
    }

    /// Replace the deadline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Terminal outcome of a settlement wait
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Settlement {
    /// The ready condition was observed
    Ready {
        /// Human-readable description of the settled state
        status: String,
    },
    /// The attempt ceiling was exceeded before the resource settled
    AttemptsExhausted {
        /// Number of non-settled events observed
        attempts: u32,
        /// Human-readable description
        status: String,
    },
    /// The deadline passed before the resource settled
    DeadlineElapsed {
        /// Human-readable description
        status: String,
    },
}

impl Settlement {
    /// Human-readable terminal status
    pub fn status(&self) -> &str {
        match self {
            Self::Ready { status }
            | Self::AttemptsExhausted { status, .. }
            | Self::DeadlineElapsed { status } => status,
        }
    }

    /// Whether the ready condition was reached
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

impl fmt::Display for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status())
    }
}

/// Kind-specific ready condition
pub trait Readiness {
    /// Kind name used in log lines and status messages
    const KIND: &'static str;

    /// What the wait is for, e.g. "load balancer assignment"
    const WAITING_FOR: &'static str;

    /// `Some(status)` once this snapshot satisfies the ready condition
    fn settled_status(&self) -> Option<String>;
}

impl Readiness for Service {
    const KIND: &'static str = "Service";
    const WAITING_FOR: &'static str = "load balancer assignment";

    /// Settled once at least one load balancer ingress is assigned.
    /// IP is preferred; hostname is used when the IP is empty.
    fn settled_status(&self) -> Option<String> {
        let ingress = self
            .status
            .as_ref()?
            .load_balancer
            .as_ref()?
            .ingress
            .as_ref()?;
        if ingress.is_empty() {
            return None;
        }

        let addresses: Vec<&str> = ingress
            .iter()
            .map(|i| {
                i.ip.as_deref()
                    .filter(|ip| !ip.is_empty())
                    .or(i.hostname.as_deref())
                    .unwrap_or_default()
            })
            .collect();
        Some(format!("Updated: {}", addresses.join(", ")))
    }
}

impl Readiness for Deployment {
    const KIND: &'static str = "Deployment";
    const WAITING_FOR: &'static str = "no unavailable replicas";

    /// Settled once the controller has observed the current generation and
    /// no replica is unavailable.
    fn settled_status(&self) -> Option<String> {
        let status = self.status.as_ref()?;
        match (self.metadata.generation, status.observed_generation) {
            (Some(generation), Some(observed)) if observed < generation => return None,
            (Some(_), None) => return None,
            _ => {}
        }
        if status.unavailable_replicas.unwrap_or(0) > 0 {
            return None;
        }

        let desired = self
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1);
        Some(format!(
            "Deployment settled: {}/{} replicas available",
            status.available_replicas.unwrap_or(0),
            desired
        ))
    }
}

/// Wait until the named resource satisfies its [`Readiness`] condition.
///
/// The watch is opened before the snapshot read so a transition between the
/// two cannot be missed. The subscription is owned by this call and dropped
/// on every return path.
///
/// # Errors
///
/// Failing to open the watch, failing the snapshot read, an error event, or
/// the stream closing before a decision.
pub async fn wait_until_settled<K>(
    store: &dyn ResourceStore<K>,
    name: &str,
    policy: &SettlePolicy,
) -> Result<Settlement>
where
    K: Readiness + Send + Sync + 'static,
{
    // A timeout too large to represent as an instant leaves only the ceiling
    let deadline = tokio::time::Instant::now().checked_add(policy.timeout);

    let mut subscription = store.watch(name).await?;
    let snapshot = store.get(name).await?;

    info!(kind = K::KIND, name = %name, "Waiting for {}", K::WAITING_FOR);
    if let Some(status) = snapshot.settled_status() {
        return Ok(Settlement::Ready { status });
    }

    let mut attempts = 0u32;
    loop {
        let next = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, subscription.next()).await,
            None => Ok(subscription.next().await),
        };
        let event = match next {
            Ok(event) => event,
            Err(_) => {
                return Ok(Settlement::DeadlineElapsed {
                    status: format!(
                        "{} update failed. Not settled within {}s ({} attempts)",
                        K::KIND,
                        policy.timeout.as_secs(),
                        attempts
                    ),
                });
            }
        };

        let resource = match event {
            Some(Ok(resource)) => resource,
            Some(Err(e)) => return Err(e),
            None => {
                return Err(Error::watch(format!(
                    "watch on {} '{}' closed before it settled",
                    K::KIND,
                    name
                )));
            }
        };

        if let Some(status) = resource.settled_status() {
            debug!(kind = K::KIND, name = %name, attempts, "Settled from watch event");
            return Ok(Settlement::Ready { status });
        }

        attempts += 1;
        if attempts > policy.max_attempts {
            return Ok(Settlement::AttemptsExhausted {
                attempts,
                status: format!(
                    "{} update failed. Exceeded {} attempts ({} observed)",
                    K::KIND,
                    policy.max_attempts,
                    attempts
                ),
            });
        }
        info!(kind = K::KIND, name = %name, attempts, "Waiting for {}", K::WAITING_FOR);
    }
}
