//! Reference-counted, create-if-absent map shared by the registry protocol.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

struct SlotState<T: ?Sized> {
    value: Option<Arc<T>>,
    refs: usize,
    retired: bool,
}

impl<T: ?Sized> Default for SlotState<T> {
    fn default() -> Self {
        Self {
            value: None,
            refs: 0,
            retired: false,
        }
    }
}

type Slot<T> = Arc<Mutex<SlotState<T>>>;

/// Outcome of [`RefCountedMap::acquire`].
pub(crate) struct Acquired<T: ?Sized> {
    pub value: Arc<T>,
    pub created: bool,
}

/// Outcome of [`RefCountedMap::release`].
pub(crate) enum Released<T: ?Sized> {
    /// Nothing is held under the key.
    Unknown,
    /// Other holders remain.
    Retained(usize),
    /// The last reference was dropped. The caller tears the value down.
    Last(Arc<T>),
}

/// Map of reference-counted values created on first use.
///
/// Each key owns a slot guarded by an async mutex, so concurrent acquirers
/// of the same new key run one initialiser between them while other keys
/// proceed independently. A slot is retired when its initialiser fails or its
/// count reaches zero; acquirers that find a retired slot start over on a
/// fresh one.
pub(crate) struct RefCountedMap<T: ?Sized> {
    slots: DashMap<String, Slot<T>>,
}

impl<T: ?Sized> RefCountedMap<T> {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    fn slot(&self, key: &str) -> Slot<T> {
        Arc::clone(
            self.slots
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(SlotState::default())))
                .value(),
        )
    }

    fn remove_slot(&self, key: &str, slot: &Slot<T>) {
        self.slots.remove_if(key, |_, current| Arc::ptr_eq(current, slot));
    }

    /// Takes a reference to the value under `key`, running `init` to create it
    /// if no live value exists.
    pub async fn acquire<F, Fut, E>(&self, key: &str, init: F) -> Result<Acquired<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<T>, E>>,
    {
        let (slot, mut state) = loop {
            let slot = self.slot(key);
            let state = Arc::clone(&slot).lock_owned().await;
            if !state.retired {
                break (slot, state);
            }
        };

        if let Some(value) = state.value.clone() {
            state.refs += 1;
            return Ok(Acquired {
                value,
                created: false,
            });
        }

        match init().await {
            Ok(value) => {
                state.value = Some(Arc::clone(&value));
                state.refs = 1;
                Ok(Acquired {
                    value,
                    created: true,
                })
            }
            Err(err) => {
                state.retired = true;
                self.remove_slot(key, &slot);
                Err(err)
            }
        }
    }

    /// Drops one reference to the value under `key`.
    ///
    /// When the last reference goes, `teardown` runs before the slot is
    /// removed and while it is still locked, so a concurrent acquirer of the
    /// same key only initialises a replacement once teardown has finished.
    pub async fn release<F>(&self, key: &str, teardown: F) -> Released<T>
    where
        F: FnOnce(&T),
    {
        let Some(slot) = self.slots.get(key).map(|entry| Arc::clone(entry.value())) else {
            return Released::Unknown;
        };

        let mut state = slot.lock().await;
        if state.retired {
            return Released::Unknown;
        }
        let Some(value) = state.value.clone() else {
            return Released::Unknown;
        };

        state.refs = state.refs.saturating_sub(1);
        if state.refs > 0 {
            return Released::Retained(state.refs);
        }

        teardown(&value);
        state.retired = true;
        state.value = None;
        self.remove_slot(key, &slot);
        Released::Last(value)
    }

    /// Removes every slot and returns the values that were live, each once.
    pub async fn drain(&self) -> Vec<Arc<T>> {
        let keys: Vec<String> = self.slots.iter().map(|entry| entry.key().clone()).collect();

        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            let Some((_, slot)) = self.slots.remove(&key) else {
                continue;
            };
            let mut state = slot.lock().await;
            if state.retired {
                continue;
            }
            state.retired = true;
            state.refs = 0;
            values.extend(state.value.take());
        }
        values
    }

    /// Returns the live value under `key`, without taking a reference.
    pub async fn get(&self, key: &str) -> Option<Arc<T>> {
        let slot = self.slots.get(key).map(|entry| Arc::clone(entry.value()))?;
        let state = slot.lock().await;
        state.value.clone()
    }

    /// Reference count held under `key`, zero if nothing is live.
    pub async fn refs(&self, key: &str) -> usize {
        let Some(slot) = self.slots.get(key).map(|entry| Arc::clone(entry.value())) else {
            return 0;
        };
        let state = slot.lock().await;
        if state.value.is_some() {
            state.refs
        } else {
            0
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
