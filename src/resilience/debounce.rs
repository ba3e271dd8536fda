//! Debounced delivery of errors to a human-facing channel.
//!
//! Every call records the error as the latest and restarts one timer. When the
//! timer fires with no newer call, the handler runs once with the latest error;
//! earlier errors of the burst are dropped, not queued.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(1_000);

struct State<E> {
    latest: Option<E>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
    suppressed: u64,
}

struct Inner<E> {
    delay: Duration,
    handler: Box<dyn Fn(E) + Send + Sync>,
    state: Mutex<State<E>>,
}

impl<E> Inner<E> {
    fn lock(&self) -> MutexGuard<'_, State<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Collapses bursts of errors into a single handler call.
///
/// Timers run on the Tokio runtime, so [`call`](Self::call) must be invoked
/// from within one.
pub struct DebouncedErrorHandler<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for DebouncedErrorHandler<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Send + 'static> DebouncedErrorHandler<E> {
    pub fn new<H>(handler: H, delay: Duration) -> Self
    where
        H: Fn(E) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                delay,
                handler: Box::new(handler),
                state: Mutex::new(State {
                    latest: None,
                    timer: None,
                    generation: 0,
                    suppressed: 0,
                }),
            }),
        }
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    pub fn call(&self, error: E) {
        let mut st = self.inner.lock();
        if st.latest.replace(error).is_some() {
            st.suppressed += 1;
        }
        st.generation = st.generation.wrapping_add(1);
        let generation = st.generation;
        if let Some(timer) = st.timer.take() {
            timer.abort();
        }

        let inner = Arc::clone(&self.inner);
        st.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.delay).await;
            let (latest, suppressed) = {
                let mut st = inner.lock();
                // A newer call or a cancel took over this burst.
                if st.generation != generation {
                    return;
                }
                st.timer = None;
                (st.latest.take(), std::mem::take(&mut st.suppressed))
            };
            if let Some(error) = latest {
                debug!(suppressed, "delivering debounced error");
                (inner.handler)(error);
            }
        }));
    }

    /// Drops the pending error, if any, without delivering it.
    pub fn cancel(&self) {
        let mut st = self.inner.lock();
        st.generation = st.generation.wrapping_add(1);
        st.latest = None;
        st.suppressed = 0;
        if let Some(timer) = st.timer.take() {
            timer.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inner.lock().latest.is_some()
    }
}

/// Creates a debounced handler; see [`DebouncedErrorHandler`].
pub fn create_debounced_error_handler<E, H>(handler: H, delay: Duration) -> DebouncedErrorHandler<E>
where
    E: Send + 'static,
    H: Fn(E) + Send + Sync + 'static,
{
    DebouncedErrorHandler::new(handler, delay)
}
