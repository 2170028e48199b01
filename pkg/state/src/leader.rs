use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use pkg_constants::state::{
    LEADER_LEASE_ID, LEADER_LEASE_KEY, LEADER_LEASE_TTL_SECS, LEADER_RENEW_INTERVAL_DIVISOR,
};
use pkg_types::lease::Lease;

use crate::client::StateStore;

/// Leader election engine using SlateDB leases.
///
/// Only one tuner instance holds the lease at a time. The leader runs
/// reconciliation cycles; followers keep serving the API.
pub struct LeaderElection {
    store: StateStore,
    holder_id: String,
    ttl: Duration,
    renew_interval: Duration,
    leader_tx: watch::Sender<bool>,
    leader_rx: watch::Receiver<bool>,
}

impl LeaderElection {
    pub fn new(store: StateStore, holder_id: String) -> Self {
        let ttl = Duration::from_secs(LEADER_LEASE_TTL_SECS);
        let renew_interval =
            Duration::from_secs(LEADER_LEASE_TTL_SECS / LEADER_RENEW_INTERVAL_DIVISOR);
        let (leader_tx, leader_rx) = watch::channel(false);

        Self {
            store,
            holder_id,
            ttl,
            renew_interval,
            leader_tx,
            leader_rx,
        }
    }

    /// A receiver that always reports leadership, for single-instance runs.
    pub fn always_leader() -> watch::Receiver<bool> {
        let (_tx, rx) = watch::channel(true);
        rx
    }

    fn new_lease(&self, now: DateTime<Utc>) -> Lease {
        Lease {
            id: LEADER_LEASE_ID.to_string(),
            holder_id: self.holder_id.clone(),
            acquired_at: now,
            renew_at: now,
            ttl_seconds: self.ttl.as_secs(),
        }
    }

    /// Try to acquire or renew the lease. Returns true if we are the leader.
    async fn try_acquire_or_renew(&self, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let lease = match self.store.get(LEADER_LEASE_KEY).await? {
            Some(data) => {
                let current: Lease = serde_json::from_slice(&data)?;
                if current.holder_id == self.holder_id {
                    Lease {
                        renew_at: now,
                        ..current
                    }
                } else if current.is_expired_at(now) {
                    info!(
                        "Lease expired (held by {}), acquiring for {}",
                        current.holder_id, self.holder_id
                    );
                    self.new_lease(now)
                } else {
                    return Ok(false);
                }
            }
            None => {
                info!("No existing lease found, acquiring for {}", self.holder_id);
                self.new_lease(now)
            }
        };
        let data = serde_json::to_vec(&lease)?;
        self.store.put(LEADER_LEASE_KEY, &data).await?;
        Ok(true)
    }

    /// Start the leader election loop as a background task.
    pub fn start(self) -> (tokio::task::JoinHandle<()>, watch::Receiver<bool>) {
        let rx = self.leader_rx.clone();
        let handle = tokio::spawn(async move {
            info!(
                "LeaderElection started (holder_id={}, ttl={}s, renew={}s)",
                self.holder_id,
                self.ttl.as_secs(),
                self.renew_interval.as_secs()
            );

            let mut interval = tokio::time::interval(self.renew_interval);
            loop {
                interval.tick().await;

                let is_leader = match self.try_acquire_or_renew(Utc::now()).await {
                    Ok(is_leader) => is_leader,
                    Err(e) => {
                        warn!("Leader election error: {}", e);
                        false
                    }
                };
                let was_leader = *self.leader_rx.borrow();
                if is_leader && !was_leader {
                    info!("This instance is now the leader ({})", self.holder_id);
                } else if !is_leader && was_leader {
                    warn!("Leadership lost for {}", self.holder_id);
                }
                let _ = self.leader_tx.send(is_leader);
            }
        });

        (handle, rx)
    }
}
