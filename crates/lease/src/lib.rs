//! # Leader Lease
//!
//! A cooperative, time-bounded leader election built entirely on the object
//! store: whoever last successfully `PUT`s (and then re-reads) the record at
//! `leader/current` before it expires holds the lease. Not a consensus
//! protocol — safe only under last-writer-wins `PUT` and read-your-writes
//! `GET`, a narrower guarantee than Raft/Paxos but sufficient for a single
//! cooperative writer per cluster.
//!
//! States: [`LeaseState::Candidate`] polls and tries to acquire; `Leader`
//! heartbeats to keep the lease alive; `Follower` only observes. A
//! *designated-leader* mode skips contention entirely for single-node
//! deployments.
use async_trait::async_trait;
use objectstore::{ObjectStore, StoreError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub const LEADER_KEY: &str = "leader/current";

/// Per-node liveness record published alongside every [`LEADER_KEY`] write,
/// distinct from it: `leader/current` names whoever currently holds the
/// lease, `cluster/leaders/<node_id>` is this node's own last-known-good
/// record, readable by anyone wanting to know when a *specific* node was
/// last seen leading without racing the single contested key.
fn leader_presence_key(node_id: &str) -> String {
    format!("cluster/leaders/{node_id}")
}

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("object store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Candidate,
    Leader,
    Follower,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderRecord {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    #[serde(rename = "leaseStart")]
    pub lease_start: u64,
    #[serde(rename = "leaseExpiry")]
    pub lease_expiry: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before the epoch")
        .as_secs()
}

/// Fired exactly once per lease acquisition, immediately after transitioning
/// into `Leader`. The engine implements this to drive WAL recovery; the
/// callback must be idempotent since the lease protocol offers no guarantee
/// against a spurious double-fire under pathological clock skew.
#[async_trait]
pub trait RecoveryHook: Send + Sync {
    async fn on_leadership_acquired(&self);
}

async fn read_record<S: ObjectStore>(store: &S) -> Result<Option<LeaderRecord>, LeaseError> {
    match store.get(LEADER_KEY).await? {
        Some(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
        None => Ok(None),
    }
}

fn encode(record: &LeaderRecord) -> Vec<u8> {
    serde_json::to_vec(record).expect("LeaderRecord always serializes")
}

const STATE_CANDIDATE: u8 = 0;
const STATE_LEADER: u8 = 1;
const STATE_FOLLOWER: u8 = 2;

fn state_to_code(s: LeaseState) -> u8 {
    match s {
        LeaseState::Candidate => STATE_CANDIDATE,
        LeaseState::Leader => STATE_LEADER,
        LeaseState::Follower => STATE_FOLLOWER,
    }
}

fn code_to_state(c: u8) -> LeaseState {
    match c {
        STATE_LEADER => LeaseState::Leader,
        STATE_FOLLOWER => LeaseState::Follower,
        _ => LeaseState::Candidate,
    }
}

/// Drives one node's participation in the leader protocol.
pub struct LeaderLease<S: ObjectStore> {
    store: S,
    node_id: String,
    duration: Duration,
    heartbeat: Duration,
    state: AtomicU8,
}

impl<S: ObjectStore> LeaderLease<S> {
    pub fn new(store: S, node_id: String, duration: Duration, heartbeat: Duration) -> Self {
        Self {
            store,
            node_id,
            duration,
            heartbeat,
            state: AtomicU8::new(state_to_code(LeaseState::Candidate)),
        }
    }

    /// Single-node deployments: become leader unconditionally, never
    /// contesting the key. Callers still drive `heartbeat_tick` to refresh
    /// it so object storage reflects an up-to-date expiry for observers.
    pub async fn become_designated_leader(&self) -> Result<(), LeaseError> {
        self.state.store(state_to_code(LeaseState::Leader), Ordering::SeqCst);
        self.publish_heartbeat().await
    }

    pub fn state(&self) -> LeaseState {
        code_to_state(self.state.load(Ordering::SeqCst))
    }

    pub fn is_leader(&self) -> bool {
        self.state() == LeaseState::Leader
    }

    fn set_state(&self, s: LeaseState) {
        self.state.store(state_to_code(s), Ordering::SeqCst);
    }

    /// One candidate-loop iteration: returns `true` if this call caused a
    /// transition into `Leader` (so the caller can fire the recovery hook
    /// exactly once per acquisition).
    pub async fn try_acquire(&self) -> Result<bool, LeaseError> {
        let existing = read_record(&self.store).await?;
        let expired = existing
            .as_ref()
            .map(|r| r.lease_expiry < now_secs())
            .unwrap_or(true);
        if !expired {
            return Ok(false);
        }

        let jitter_ms = rand::thread_rng().gen_range(0..=1000);
        tokio::time::sleep(Duration::from_millis(jitter_ms)).await;

        let start = now_secs();
        let record = LeaderRecord {
            node_id: self.node_id.clone(),
            lease_start: start,
            lease_expiry: start + self.duration.as_secs(),
        };

        if existing.is_none() {
            // Conditional create races out other absent-key contenders when
            // the backend supports it; a plain-put fallback still lets the
            // verification read below decide who actually won.
            match self.store.put_if_absent(LEADER_KEY, encode(&record)).await {
                Ok(()) | Err(StoreError::Unavailable(_)) => {}
                Err(StoreError::PreconditionFailed(_)) => return Ok(false),
                Err(e) => return Err(e.into()),
            }
        } else {
            self.store.put(LEADER_KEY, encode(&record)).await?;
        }

        let verify = read_record(&self.store).await?;
        if verify.as_ref().map(|r| &r.node_id) == Some(&self.node_id) {
            self.store
                .put(&leader_presence_key(&self.node_id), encode(&record))
                .await?;
            self.set_state(LeaseState::Leader);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// One leader-loop heartbeat: refreshes the record. Steps back to
    /// `Candidate` if the refresh fails or a subsequent verifying read shows
    /// a different leader.
    pub async fn heartbeat_tick(&self) -> Result<(), LeaseError> {
        match self.publish_heartbeat().await {
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(error = %e, "leader heartbeat PUT failed; stepping back to candidate");
                self.set_state(LeaseState::Candidate);
                return Ok(());
            }
        }

        match read_record(&self.store).await? {
            Some(r) if r.node_id == self.node_id => Ok(()),
            _ => {
                self.set_state(LeaseState::Candidate);
                Ok(())
            }
        }
    }

    async fn publish_heartbeat(&self) -> Result<(), LeaseError> {
        let start = now_secs();
        let record = LeaderRecord {
            node_id: self.node_id.clone(),
            lease_start: start,
            lease_expiry: start + self.duration.as_secs(),
        };
        let encoded = encode(&record);
        self.store.put(LEADER_KEY, encoded.clone()).await?;
        self.store
            .put(&leader_presence_key(&self.node_id), encoded)
            .await?;
        Ok(())
    }

    /// A follower's periodic observation: refreshes nothing, never attempts
    /// acquisition.
    pub async fn observe(&self) -> Result<Option<LeaderRecord>, LeaseError> {
        read_record(&self.store).await
    }

    /// Releases the lease on a clean shutdown: if this node is still the
    /// recorded leader, deletes `leader/current` and this node's
    /// `cluster/leaders/<node_id>` record so the next candidate does not
    /// have to wait out the full lease duration, then steps back to
    /// `Candidate`. A no-op if this node never held the lease.
    pub async fn release(&self) -> Result<(), LeaseError> {
        if !self.is_leader() {
            return Ok(());
        }
        if let Some(record) = read_record(&self.store).await? {
            if record.node_id == self.node_id {
                self.store.delete(LEADER_KEY).await?;
                self.store.delete(&leader_presence_key(&self.node_id)).await?;
            }
        }
        self.set_state(LeaseState::Candidate);
        Ok(())
    }

    /// Drives the full protocol loop until `stop` fires, invoking
    /// `hook.on_leadership_acquired()` exactly once per acquisition.
    pub async fn run(
        self: Arc<Self>,
        hook: Arc<dyn RecoveryHook>,
        mut stop: tokio::sync::watch::Receiver<bool>,
    ) {
        loop {
            let interval = match self.state() {
                LeaseState::Candidate => Duration::from_secs(5),
                LeaseState::Leader => self.heartbeat,
                LeaseState::Follower => Duration::from_secs(5),
            };

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = stop.changed() => {
                    if *stop.borrow() {
                        return;
                    }
                }
            }

            let result = match self.state() {
                LeaseState::Candidate => self.try_acquire().await.map(|acquired| {
                    if acquired {
                        let hook = hook.clone();
                        tokio::spawn(async move { hook.on_leadership_acquired().await });
                    }
                }),
                LeaseState::Leader => self.heartbeat_tick().await,
                LeaseState::Follower => self.observe().await.map(|_| ()),
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "leader lease tick failed; continuing");
            }
        }
    }
}

#[cfg(test)]
mod tests;
