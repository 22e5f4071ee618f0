//! Typed pub/sub over a closed key space, plus an explicit wildcard channel.
//!
//! Every stateful model in the SDK notifies interested callers through a
//! [`Watchable`]. Keys are compile-time enums (or validated dynamic keys, see
//! [`WatchableKey::is_watchable`]); "any change" subscribers register on a
//! separate wildcard channel rather than a magic key value.
//!
//! Dispatch is synchronous and runs in registration order. The listener list
//! is snapshotted before iterating, so a callback that watches or unwatches
//! during dispatch cannot cause other callbacks to be skipped or invoked
//! twice.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Key space contract for a [`Watchable`].
///
/// `is_watchable` rejects keys that are structurally unusable for the key
/// space. Closed enums accept everything (the default); dynamic string-backed
/// key spaces override it (e.g. global config rejects `"*"` as a key, since
/// the wildcard is its own channel).
pub trait WatchableKey: Clone + Eq + fmt::Debug {
    fn is_watchable(&self) -> bool {
        true
    }
}

/// Handle for a registered listener; pass it back to [`Watchable::unwatch`].
pub type ListenerId = u64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WatchError {
    #[error("cannot watch invalid key {0}")]
    InvalidKey(String),
    #[error("listener freed more times than it was registered")]
    OverFree,
}

type KeyCallback<K> = Rc<dyn Fn(&K)>;
type AnyCallback = Rc<dyn Fn()>;

struct KeyListener<K> {
    id: ListenerId,
    key: K,
    callback: KeyCallback<K>,
}

struct AnyListener {
    id: ListenerId,
    callback: AnyCallback,
}

/// Synchronous observer registry for one watchable entity.
pub struct Watchable<K> {
    next_id: Cell<ListenerId>,
    keyed: RefCell<Vec<KeyListener<K>>>,
    any: RefCell<Vec<AnyListener>>,
}

impl<K: WatchableKey> Watchable<K> {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(1),
            keyed: RefCell::new(Vec::new()),
            any: RefCell::new(Vec::new()),
        }
    }

    fn allocate_id(&self) -> ListenerId {
        let id = self.next_id.get();
        self.next_id.set(id.saturating_add(1));
        id
    }

    /// Register `callback` for changes to `key`.
    pub fn watch(&self, key: K, callback: impl Fn(&K) + 'static) -> Result<ListenerId, WatchError> {
        self.watch_rc(key, Rc::new(callback))
    }

    /// Register one shared callback for several keys. All keys are validated
    /// before any listener is added, so a bad key registers nothing.
    pub fn watch_many(
        &self,
        keys: Vec<K>,
        callback: impl Fn(&K) + 'static,
    ) -> Result<Vec<ListenerId>, WatchError> {
        for key in &keys {
            if !key.is_watchable() {
                return Err(WatchError::InvalidKey(format!("{key:?}")));
            }
        }
        let callback: KeyCallback<K> = Rc::new(callback);
        let mut ids = Vec::with_capacity(keys.len());
        for key in keys {
            ids.push(self.watch_rc(key, Rc::clone(&callback))?);
        }
        Ok(ids)
    }

    fn watch_rc(&self, key: K, callback: KeyCallback<K>) -> Result<ListenerId, WatchError> {
        if !key.is_watchable() {
            return Err(WatchError::InvalidKey(format!("{key:?}")));
        }
        let id = self.allocate_id();
        self.keyed.borrow_mut().push(KeyListener { id, key, callback });
        Ok(id)
    }

    /// Register `callback` on the wildcard channel: it fires after the keyed
    /// listeners on every notification.
    pub fn watch_any(&self, callback: impl Fn() + 'static) -> ListenerId {
        let id = self.allocate_id();
        self.any.borrow_mut().push(AnyListener {
            id,
            callback: Rc::new(callback),
        });
        id
    }

    /// Remove a previously registered listener.
    ///
    /// Freeing an id that is not registered (including freeing the same id
    /// twice) is a programmer error and fails with [`WatchError::OverFree`]
    /// rather than being silently ignored.
    pub fn unwatch(&self, id: ListenerId) -> Result<(), WatchError> {
        let mut keyed = self.keyed.borrow_mut();
        if let Some(pos) = keyed.iter().position(|l| l.id == id) {
            keyed.remove(pos);
            return Ok(());
        }
        drop(keyed);
        let mut any = self.any.borrow_mut();
        if let Some(pos) = any.iter().position(|l| l.id == id) {
            any.remove(pos);
            return Ok(());
        }
        Err(WatchError::OverFree)
    }

    /// Synchronously invoke the listeners for `key` in registration order,
    /// then the wildcard channel.
    pub fn notify(&self, key: &K) {
        self.notify_keyed(key);
        self.notify_any();
    }

    /// Notify a batch of keys: keyed listeners fire per key, the wildcard
    /// channel fires once at the end if the batch was non-empty.
    pub fn notify_batch<'a>(&self, keys: impl IntoIterator<Item = &'a K>)
    where
        K: 'a,
    {
        let mut notified = false;
        for key in keys {
            self.notify_keyed(key);
            notified = true;
        }
        if notified {
            self.notify_any();
        }
    }

    fn notify_keyed(&self, key: &K) {
        // Snapshot before iterating: callbacks may re-enter watch/unwatch.
        let snapshot: Vec<KeyCallback<K>> = self
            .keyed
            .borrow()
            .iter()
            .filter(|l| &l.key == key)
            .map(|l| Rc::clone(&l.callback))
            .collect();
        for callback in snapshot {
            callback(key);
        }
    }

    fn notify_any(&self) {
        let snapshot: Vec<AnyCallback> = self
            .any
            .borrow()
            .iter()
            .map(|l| Rc::clone(&l.callback))
            .collect();
        for callback in snapshot {
            callback();
        }
    }

    pub fn listener_count(&self) -> usize {
        self.keyed.borrow().len() + self.any.borrow().len()
    }
}

impl<K: WatchableKey> Default for Watchable<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestKey {
        Name,
        Color,
        Forbidden,
    }

    impl WatchableKey for TestKey {
        fn is_watchable(&self) -> bool {
            !matches!(self, TestKey::Forbidden)
        }
    }

    #[test]
    fn notify_invokes_keyed_then_wildcard() {
        let watchable = Watchable::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let o = Rc::clone(&order);
        watchable
            .watch(TestKey::Name, move |_| o.borrow_mut().push("keyed"))
            .expect("valid key");
        let o = Rc::clone(&order);
        watchable.watch_any(move || o.borrow_mut().push("any"));

        watchable.notify(&TestKey::Name);
        assert_eq!(*order.borrow(), vec!["keyed", "any"]);

        // A different key skips the keyed listener but still hits wildcard.
        watchable.notify(&TestKey::Color);
        assert_eq!(*order.borrow(), vec!["keyed", "any", "any"]);
    }

    #[test]
    fn invalid_key_is_rejected() {
        let watchable = Watchable::new();
        let err = watchable
            .watch(TestKey::Forbidden, |_| {})
            .expect_err("forbidden key must not register");
        assert!(matches!(err, WatchError::InvalidKey(_)));
        assert_eq!(watchable.listener_count(), 0);
    }

    #[test]
    fn watch_many_is_all_or_nothing() {
        let watchable = Watchable::new();
        let err = watchable
            .watch_many(vec![TestKey::Name, TestKey::Forbidden], |_| {})
            .expect_err("batch with forbidden key must fail");
        assert!(matches!(err, WatchError::InvalidKey(_)));
        assert_eq!(watchable.listener_count(), 0);
    }

    #[test]
    fn unwatch_twice_is_over_free() {
        let watchable = Watchable::new();
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        let id = watchable
            .watch(TestKey::Name, move |_| c.set(c.get() + 1))
            .expect("valid key");

        watchable.unwatch(id).expect("first free succeeds");
        let err = watchable.unwatch(id).expect_err("second free must fail");
        assert_eq!(err, WatchError::OverFree);

        watchable.notify(&TestKey::Name);
        assert_eq!(calls.get(), 0, "freed listener must not fire");
    }

    #[test]
    fn unwatching_during_dispatch_does_not_skip_others() {
        let watchable = Rc::new(Watchable::new());
        let fired = Rc::new(RefCell::new(Vec::new()));

        let id_cell = Rc::new(Cell::new(0));
        let w = Rc::clone(&watchable);
        let id_for_callback = Rc::clone(&id_cell);
        let f = Rc::clone(&fired);
        let first = watchable
            .watch(TestKey::Name, move |_| {
                f.borrow_mut().push("first");
                // Unregister the *next* listener mid-dispatch; the snapshot
                // taken before iteration must still invoke it this round.
                let _ = w.unwatch(id_for_callback.get());
            })
            .expect("valid key");
        let f = Rc::clone(&fired);
        let second = watchable
            .watch(TestKey::Name, move |_| f.borrow_mut().push("second"))
            .expect("valid key");
        id_cell.set(second);

        watchable.notify(&TestKey::Name);
        assert_eq!(*fired.borrow(), vec!["first", "second"]);

        // The second listener really was removed for subsequent rounds.
        watchable.notify(&TestKey::Name);
        assert_eq!(*fired.borrow(), vec!["first", "second", "first"]);
        watchable.unwatch(first).expect("first still registered");
    }

    #[test]
    fn notify_batch_fires_wildcard_once() {
        let watchable = Watchable::new();
        let keyed = Rc::new(Cell::new(0));
        let any = Rc::new(Cell::new(0));

        let k = Rc::clone(&keyed);
        watchable
            .watch_many(vec![TestKey::Name, TestKey::Color], move |_| {
                k.set(k.get() + 1)
            })
            .expect("valid keys");
        let a = Rc::clone(&any);
        watchable.watch_any(move || a.set(a.get() + 1));

        watchable.notify_batch([&TestKey::Name, &TestKey::Color]);
        assert_eq!(keyed.get(), 2);
        assert_eq!(any.get(), 1);

        watchable.notify_batch(std::iter::empty::<&TestKey>());
        assert_eq!(any.get(), 1, "empty batch must not fire wildcard");
    }
}
