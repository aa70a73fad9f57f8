//! Stale-guarded result slots for async collaborator fetches.
//!
//! Every request takes a [`Ticket`] from [`FetchSlot::begin`]. A completion is stored
//! only if no newer request started in the meantime; late results are dropped. There is
//! no cancellation of the in-flight request itself.

use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwap;
use metrics::counter;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum FetchState<T> {
    Idle,
    Loading,
    Ready(T),
    /// Display form of the collaborator error.
    Failed(String),
}

/// Slot contents: the state and the request generation that produced it.
#[derive(Debug)]
pub struct Fetched<T> {
    pub generation: u64,
    pub state: FetchState<T>,
}

/// Proof that a request was started; consumed by [`FetchSlot::complete`].
#[derive(Debug)]
pub struct Ticket {
    generation: u64,
}

impl Ticket {
    pub fn generation(&self) -> u64 { self.generation }
}

pub struct FetchSlot<T> {
    inner: ArcSwap<Fetched<T>>,
    done_tx: watch::Sender<u64>,
}

impl<T> Default for FetchSlot<T> {
    fn default() -> Self { Self::new() }
}

impl<T> FetchSlot<T> {
    pub fn new() -> Self {
        let (done_tx, _) = watch::channel(0u64);
        Self { inner: ArcSwap::from_pointee(Fetched { generation: 0, state: FetchState::Idle }), done_tx }
    }

    /// Start a request, superseding any request still in flight.
    pub fn begin(&self) -> Ticket {
        let prev = self.inner.rcu(|cur| Fetched { generation: cur.generation + 1, state: FetchState::Loading });
        Ticket { generation: prev.generation + 1 }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.inner.load().generation == ticket.generation
    }

    /// Store the outcome of `ticket`'s request. Returns false, leaving the slot untouched,
    /// when a newer request has begun since.
    pub fn complete<E: std::fmt::Display>(&self, ticket: Ticket, result: Result<T, E>) -> bool {
        let cur = self.inner.load();
        if cur.generation != ticket.generation {
            debug!(ticket = ticket.generation, current = cur.generation, "dropping stale fetch result");
            counter!("overlay_fetch_stale_dropped_total", 1u64);
            return false;
        }
        let state = match result {
            Ok(v) => FetchState::Ready(v),
            Err(e) => FetchState::Failed(e.to_string()),
        };
        let next = Arc::new(Fetched { generation: ticket.generation, state });
        let prev = self.inner.compare_and_swap(&*cur, next);
        if !Arc::ptr_eq(&*prev, &*cur) {
            debug!(ticket = ticket.generation, "slot moved on while completing; result dropped");
            counter!("overlay_fetch_stale_dropped_total", 1u64);
            return false;
        }
        let _ = self.done_tx.send_replace(ticket.generation);
        true
    }

    /// Begin, await `fut`, and complete in one step.
    pub async fn run<F, E>(&self, fut: F) -> bool
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let ticket = self.begin();
        let result = fut.await;
        self.complete(ticket, result)
    }

    pub fn load(&self) -> Arc<Fetched<T>> { self.inner.load_full() }

    /// Receives the generation of every stored completion.
    pub fn subscribe(&self) -> watch::Receiver<u64> { self.done_tx.subscribe() }
}
