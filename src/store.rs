use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use crate::controller::{FormResult, read_lock, write_lock};
use crate::value::FormState;

pub type StateListener = Arc<dyn Fn(&Committed) + Send + Sync>;

/// A committed value together with its position in the commit order of the
/// store that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Committed {
    pub revision: u64,
    pub state: FormState,
}

pub type BoxedFlushFuture<'a> = Pin<Box<dyn Future<Output = FormResult<()>> + Send + 'a>>;

type StateUpdater = Box<dyn FnOnce(&FormState) -> FormResult<FormState> + Send>;

/// A write into a [`StateStore`]: either a literal replacement or a function
/// of the previous value.
pub enum StateUpdate {
    Replace(FormState),
    With(StateUpdater),
}

impl StateUpdate {
    pub fn with(update: impl FnOnce(&FormState) -> FormState + Send + 'static) -> Self {
        StateUpdate::With(Box::new(move |previous| Ok(update(previous))))
    }

    pub fn try_with(
        update: impl FnOnce(&FormState) -> FormResult<FormState> + Send + 'static,
    ) -> Self {
        StateUpdate::With(Box::new(update))
    }

    pub(crate) fn apply(self, previous: &FormState) -> FormResult<FormState> {
        match self {
            StateUpdate::Replace(next) => Ok(next),
            StateUpdate::With(update) => update(previous),
        }
    }
}

impl From<FormState> for StateUpdate {
    fn from(value: FormState) -> Self {
        StateUpdate::Replace(value)
    }
}

/// Observable holder of the current form state.
///
/// Listeners run synchronously after every committed write, with no store
/// lock held, so they are free to read the store again. Notifications of
/// concurrent writers may arrive out of order; the revision tells them apart.
pub trait StateStore: Send + Sync + 'static {
    fn get(&self) -> FormResult<FormState> {
        Ok(self.committed()?.state)
    }

    /// Current value and its revision, read together.
    fn committed(&self) -> FormResult<Committed>;

    fn update(&self, update: StateUpdate) -> FormResult<()>;

    fn subscribe(&self, listener: StateListener) -> FormResult<Subscription>;

    /// Restores `baseline`. Persistent backends also drop what they stored.
    fn reset(&self, baseline: &FormState) -> FormResult<()> {
        self.update(StateUpdate::Replace(baseline.clone()))
    }

    /// Persists pending writes immediately.
    fn flush(&self) -> FormResult<()> {
        Ok(())
    }

    /// Persists pending writes once the backend's debounce window has passed
    /// without a newer write.
    fn flush_debounced(&self) -> BoxedFlushFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}

struct CellInner {
    value: RwLock<Committed>,
    listeners: RwLock<BTreeMap<u64, StateListener>>,
    next_listener: AtomicU64,
}

/// In-memory [`StateStore`]. Clones share the same value, which is how an
/// externally owned cell is handed to several forms.
#[derive(Clone)]
pub struct StateCell {
    inner: Arc<CellInner>,
}

impl StateCell {
    pub fn new(initial: FormState) -> Self {
        Self {
            inner: Arc::new(CellInner {
                value: RwLock::new(Committed {
                    revision: 0,
                    state: initial,
                }),
                listeners: RwLock::new(BTreeMap::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    pub fn listener_count(&self) -> FormResult<usize> {
        Ok(read_lock(&self.inner.listeners, "counting state listeners")?.len())
    }

    fn notify(&self, value: &Committed) -> FormResult<()> {
        let listeners = read_lock(&self.inner.listeners, "reading state listeners")?
            .values()
            .cloned()
            .collect::<Vec<_>>();
        for listener in listeners {
            listener(value);
        }
        Ok(())
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new(FormState::new())
    }
}

impl StateStore for StateCell {
    fn committed(&self) -> FormResult<Committed> {
        Ok(read_lock(&self.inner.value, "reading state cell")?.clone())
    }

    fn update(&self, update: StateUpdate) -> FormResult<()> {
        // The revision is taken under the value lock, so it orders commits
        // even when notifications of concurrent writers interleave.
        let next = {
            let mut value = write_lock(&self.inner.value, "writing state cell")?;
            let state = update.apply(&value.state)?;
            *value = Committed {
                revision: value.revision + 1,
                state,
            };
            value.clone()
        };
        self.notify(&next)
    }

    fn subscribe(&self, listener: StateListener) -> FormResult<Subscription> {
        let id = self.inner.next_listener.fetch_add(1, Ordering::SeqCst);
        write_lock(&self.inner.listeners, "subscribing to state cell")?.insert(id, listener);
        Ok(Subscription {
            id,
            source: Arc::downgrade(&self.inner),
        })
    }
}

/// Keeps a listener registered; dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    source: Weak<CellInner>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(inner) = self.source.upgrade() else {
            return;
        };
        let mut listeners = match inner.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.remove(&self.id);
    }
}
