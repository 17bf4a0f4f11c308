//! Once-only memoization of a sync or async value factory.
//!
//! A `LazyValue` owns a single slot. The first caller to find the slot empty
//! becomes the leader of an invocation and runs the factory; everyone arriving
//! while it runs subscribes to the same invocation through a `watch` channel,
//! either blocking on it (`value`) or awaiting it (`value_async`). Successful
//! results are memoized, failures are handed to the waiters of that invocation
//! and then forgotten.

use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use crate::error::{BoxError, FactoryError};
use crate::utils::{block_on, run_blocking};

type SyncInit<T> = Arc<dyn Fn() -> Result<T, FactoryError> + Send + Sync>;
type AsyncInit<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, FactoryError>> + Send + Sync>;

enum Init<T> {
    Sync(SyncInit<T>),
    Async(AsyncInit<T>),
}

/// How an invocation ended, as seen by its waiters.
#[derive(Clone)]
enum Settled<T> {
    Done(Result<T, FactoryError>),
    /// The leader was dropped or panicked before producing a result.
    Abandoned,
}

type Flight<T> = watch::Sender<Option<Settled<T>>>;

enum Slot<T> {
    Empty,
    InFlight(Arc<Flight<T>>),
    Ready(T),
}

enum Claim<'a, T> {
    Ready(T),
    Lead(Leader<'a, T>),
    Follow(watch::Receiver<Option<Settled<T>>>),
}

/// A thread-safe lazily computed value.
///
/// The factory runs at most once per successful materialization, no matter how
/// many sync and async readers race for it.
pub struct LazyValue<T> {
    init: Init<T>,
    slot: Mutex<Slot<T>>,
}

fn lock<T>(slot: &Mutex<Slot<T>>) -> MutexGuard<'_, Slot<T>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> LazyValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a lazy value backed by a synchronous factory.
    pub fn new<F, E>(factory: F) -> Self
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        LazyValue {
            init: Init::Sync(Arc::new(move || factory().map_err(FactoryError::new))),
            slot: Mutex::new(Slot::Empty),
        }
    }

    /// Create a lazy value backed by an asynchronous factory.
    pub fn new_async<F, Fut, E>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        LazyValue {
            init: Init::Async(Arc::new(move || {
                let fut = factory();
                Box::pin(async move { fut.await.map_err(FactoryError::new) })
            })),
            slot: Mutex::new(Slot::Empty),
        }
    }

    /// Create an already materialized value.
    pub fn ready(value: T) -> Self {
        let init_value = value.clone();
        LazyValue {
            init: Init::Sync(Arc::new(move || Ok(init_value.clone()))),
            slot: Mutex::new(Slot::Ready(value)),
        }
    }

    /// Whether a successful result is memoized.
    pub fn is_initialized(&self) -> bool {
        matches!(*lock(&self.slot), Slot::Ready(_))
    }

    /// Return the value, blocking the calling thread while it is computed.
    ///
    /// An async factory is driven to completion on this thread. If the
    /// invocation this call waits on fails, the error is returned and the next
    /// call starts a new invocation.
    pub fn value(&self) -> Result<T, FactoryError> {
        loop {
            match self.claim() {
                Claim::Ready(value) => return Ok(value),
                Claim::Lead(leader) => {
                    let outcome = match &self.init {
                        Init::Sync(factory) => run_blocking(|| factory()),
                        Init::Async(factory) => block_on(factory()),
                    };
                    return leader.settle(outcome);
                }
                Claim::Follow(rx) => match block_on(wait(rx)) {
                    Settled::Done(outcome) => return outcome,
                    Settled::Abandoned => continue,
                },
            }
        }
    }

    /// Return the value, suspending while it is computed.
    ///
    /// Shares invocations with [`LazyValue::value`]. A synchronous factory runs
    /// inline on the polling task.
    pub async fn value_async(&self) -> Result<T, FactoryError> {
        loop {
            match self.claim() {
                Claim::Ready(value) => return Ok(value),
                Claim::Lead(leader) => {
                    let outcome = match &self.init {
                        Init::Sync(factory) => run_blocking(|| factory()),
                        Init::Async(factory) => factory().await,
                    };
                    return leader.settle(outcome);
                }
                Claim::Follow(rx) => match wait(rx).await {
                    Settled::Done(outcome) => return outcome,
                    Settled::Abandoned => continue,
                },
            }
        }
    }

    fn claim(&self) -> Claim<'_, T> {
        let mut slot = lock(&self.slot);
        match &*slot {
            Slot::Ready(value) => Claim::Ready(value.clone()),
            Slot::InFlight(flight) => Claim::Follow(flight.subscribe()),
            Slot::Empty => {
                let (tx, _) = watch::channel(None);
                let flight = Arc::new(tx);
                *slot = Slot::InFlight(Arc::clone(&flight));
                Claim::Lead(Leader {
                    slot: &self.slot,
                    flight,
                    settled: false,
                })
            }
        }
    }
}

async fn wait<T: Clone>(mut rx: watch::Receiver<Option<Settled<T>>>) -> Settled<T> {
    match rx.wait_for(Option::is_some).await {
        Ok(settled) => (*settled).clone().unwrap_or(Settled::Abandoned),
        Err(_) => Settled::Abandoned,
    }
}

/// Owner of an in-flight invocation.
///
/// Dropping it without settling releases the waiters so one of them can retry.
struct Leader<'a, T> {
    slot: &'a Mutex<Slot<T>>,
    flight: Arc<Flight<T>>,
    settled: bool,
}

impl<T: Clone> Leader<'_, T> {
    fn settle(mut self, outcome: Result<T, FactoryError>) -> Result<T, FactoryError> {
        {
            let mut slot = lock(self.slot);
            *slot = match &outcome {
                Ok(value) => Slot::Ready(value.clone()),
                Err(_) => Slot::Empty,
            };
        }
        self.flight.send_replace(Some(Settled::Done(outcome.clone())));
        self.settled = true;
        outcome
    }
}

impl<T> Drop for Leader<'_, T> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        {
            let mut slot = lock(self.slot);
            if matches!(&*slot, Slot::InFlight(flight) if Arc::ptr_eq(flight, &self.flight)) {
                *slot = Slot::Empty;
            }
        }
        self.flight.send_replace(Some(Settled::Abandoned));
    }
}

impl<T: fmt::Debug> fmt::Debug for LazyValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("LazyValue");
        match &*lock(&self.slot) {
            Slot::Empty => s.field("state", &"empty"),
            Slot::InFlight(_) => s.field("state", &"in_flight"),
            Slot::Ready(value) => s.field("value", value),
        };
        s.finish()
    }
}
