//! # Checkpointer
//!
//! Tracks how far the LSM has durably flushed, so WAL recovery knows which
//! segments it can skip. Holds `(last_flushed_seq, last_flushed_wal_offset,
//! ts)` in memory and persists it to `checkpoint/latest` (a) on every
//! `update` that actually advances `last_flushed_seq`, (b) on a periodic
//! timer, and (c) on shutdown.
//!
//! `last_flushed_wal_offset` is not a byte offset — the WAL has no single
//! seekable stream, only a sequence of timestamped blobs — it is the
//! timestamp suffix of the newest WAL segment known to be fully covered by
//! a flush, used the same way a byte offset would be: to bound which
//! segments recovery must still replay (see `recovery`).
use byteorder::{ReadBytesExt, WriteBytesExt, BE};
use objectstore::{ObjectStore, StoreError};
use parking_lot::Mutex;
use std::io::Cursor;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub const CHECKPOINT_KEY: &str = "checkpoint/latest";

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("object store error: {0}")]
    Store(#[from] StoreError),
    #[error("corrupt checkpoint blob: expected 24 bytes, got {0}")]
    Corrupt(usize),
}

/// A persisted flush watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub last_flushed_seq: u64,
    pub last_flushed_wal_offset: u64,
    pub ts: u64,
}

impl Checkpoint {
    pub fn zero() -> Self {
        Self {
            last_flushed_seq: 0,
            last_flushed_wal_offset: 0,
            ts: now_ms(),
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(24);
        out.write_u64::<BE>(self.last_flushed_seq).unwrap();
        out.write_u64::<BE>(self.last_flushed_wal_offset).unwrap();
        out.write_u64::<BE>(self.ts).unwrap();
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, CheckpointError> {
        if bytes.len() != 24 {
            return Err(CheckpointError::Corrupt(bytes.len()));
        }
        let mut cursor = Cursor::new(bytes);
        Ok(Self {
            last_flushed_seq: cursor.read_u64::<BE>().unwrap(),
            last_flushed_wal_offset: cursor.read_u64::<BE>().unwrap(),
            ts: cursor.read_u64::<BE>().unwrap(),
        })
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before the epoch")
        .as_millis() as u64
}

/// In-memory checkpoint holder with periodic and on-demand persistence.
pub struct Checkpointer<S: ObjectStore> {
    store: S,
    current: Mutex<Checkpoint>,
}

impl<S: ObjectStore> Checkpointer<S> {
    /// Loads the persisted checkpoint, or starts from `(0, 0, now)` if none
    /// exists yet.
    pub async fn load(store: S) -> Result<Self, CheckpointError> {
        let current = match store.get(CHECKPOINT_KEY).await? {
            Some(bytes) => Checkpoint::decode(&bytes)?,
            None => Checkpoint::zero(),
        };
        Ok(Self {
            store,
            current: Mutex::new(current),
        })
    }

    #[must_use]
    pub fn current(&self) -> Checkpoint {
        *self.current.lock()
    }

    /// Advances the checkpoint and persists it, provided `seq` is strictly
    /// greater than the current `last_flushed_seq`. Non-advancing updates
    /// are silently ignored — the monotonicity invariant.
    pub async fn update(&self, seq: u64, wal_offset: u64) -> Result<(), CheckpointError> {
        let next = {
            let mut cur = self.current.lock();
            if seq <= cur.last_flushed_seq {
                return Ok(());
            }
            *cur = Checkpoint {
                last_flushed_seq: seq,
                last_flushed_wal_offset: wal_offset,
                ts: now_ms(),
            };
            *cur
        };
        self.persist(next).await
    }

    /// Re-persists the current checkpoint unconditionally — used by the
    /// periodic timer and by `close`.
    pub async fn persist_now(&self) -> Result<(), CheckpointError> {
        let snapshot = self.current();
        self.persist(snapshot).await
    }

    async fn persist(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        self.store.put(CHECKPOINT_KEY, checkpoint.encode()).await?;
        Ok(())
    }

    /// Runs a periodic persistence loop until `stop` resolves. Intended to
    /// be driven by a `tokio::select!` in the owning worker; failures are
    /// logged and do not stop the loop, matching the `StoreUnavailable`
    /// background-worker policy.
    pub async fn run_periodic(&self, interval: Duration, mut stop: tokio::sync::watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.persist_now().await {
                        tracing::error!(error = %e, "periodic checkpoint persistence failed; continuing");
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        return;
                    }
                }
            }
        }
    }
}
