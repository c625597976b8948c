//! Observable JSON value holder.
//!
//! [`JsonStorage`] is the building block of state replication: each adapter
//! session writes its private state into one, the connection mirrors every
//! session storage into the transport's shared storage, and the transport
//! turns changes of that storage into patches for the browser.
//!
//! Observers receive the current value once, immediately on registration,
//! and then the new value after every change. Callbacks run outside of the
//! storage's own locks, so a callback may read the storage or drop its own
//! [`ChangeHandle`].
//!
//! Dropping a [`ChangeHandle`] waits for a delivery of that observer running
//! on another thread. Once the drop returns the callback is never invoked
//! again, so a value written after unregistering cannot be overwritten by a
//! stale delivery.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, ThreadId};

use serde_json::{Map, Value};

/// Change observer callback.
pub type ChangeCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Shared, observable JSON value.
///
/// Cloning yields another handle to the same value. The storage has a single
/// writer (its owner) and any number of observers; observers must not mutate
/// the storage they observe.
#[derive(Clone)]
pub struct JsonStorage {
    inner: Arc<StorageInner>,
}

struct StorageInner {
    data: Mutex<Value>,
    observers: Mutex<Vec<Arc<Observer>>>,
    next_id: AtomicU64,
}

struct Observer {
    id: u64,
    cb: ChangeCallback,
    alive: AtomicBool,
    /// Held for the duration of each delivery.
    delivery: Mutex<()>,
    /// Thread currently running the callback, if any.
    caller: Mutex<Option<ThreadId>>,
}

impl Observer {
    fn deliver(&self, value: &Value) {
        let _delivery = lock(&self.delivery);
        if !self.alive.load(Ordering::Acquire) {
            return;
        }
        *lock(&self.caller) = Some(thread::current().id());
        (self.cb)(value);
        *lock(&self.caller) = None;
    }

    fn unregister(&self) {
        self.alive.store(false, Ordering::Release);
        // Dropped from within its own callback: the delivery lock is ours.
        if *lock(&self.caller) == Some(thread::current().id()) {
            return;
        }
        drop(lock(&self.delivery));
    }
}

impl JsonStorage {
    /// Creates a storage holding `null`.
    pub fn new() -> Self {
        Self::with_value(Value::Null)
    }

    /// Creates a storage holding `value`.
    pub fn with_value(value: Value) -> Self {
        Self {
            inner: Arc::new(StorageInner {
                data: Mutex::new(value),
                observers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Returns a copy of the current value.
    pub fn get(&self) -> Value {
        lock(&self.inner.data).clone()
    }

    /// Returns a copy of the value found under `path`, if any.
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<Value> {
        let data = lock(&self.inner.data);
        let mut current = &*data;
        for key in path {
            current = current.as_object()?.get(key.as_ref())?;
        }
        Some(current.clone())
    }

    /// Replaces the whole value. Observers are notified if it changed.
    pub fn set(&self, value: Value) {
        self.update(|data| {
            if *data == value {
                return false;
            }
            *data = value;
            true
        });
    }

    /// Sets the value under `path`, creating intermediate objects.
    ///
    /// Non-object values found along the path are replaced by objects.
    /// An empty path replaces the whole value.
    pub fn set_path<S: AsRef<str>>(&self, path: &[S], value: Value) {
        self.update(|data| {
            let Some((last, parents)) = path.split_last() else {
                if *data == value {
                    return false;
                }
                *data = value;
                return true;
            };

            let mut current = data;
            for key in parents {
                current = ensure_object(current)
                    .entry(key.as_ref().to_string())
                    .or_insert(Value::Null);
            }

            let obj = ensure_object(current);
            if obj.get(last.as_ref()) == Some(&value) {
                return false;
            }
            obj.insert(last.as_ref().to_string(), value);
            true
        });
    }

    /// Removes the value under `path`. Missing paths are a no-op.
    pub fn remove_path<S: AsRef<str>>(&self, path: &[S]) {
        self.update(|data| {
            let Some((last, parents)) = path.split_last() else {
                if data.is_null() {
                    return false;
                }
                *data = Value::Null;
                return true;
            };

            let mut current = data;
            for key in parents {
                match current.as_object_mut().and_then(|o| o.get_mut(key.as_ref())) {
                    Some(next) => current = next,
                    None => return false,
                }
            }

            current
                .as_object_mut()
                .and_then(|o| o.remove(last.as_ref()))
                .is_some()
        });
    }

    /// Registers an observer.
    ///
    /// The callback is invoked immediately with the current value and then
    /// after every change, until the returned handle is cancelled or dropped.
    pub fn register_change_cb<F>(&self, cb: F) -> ChangeHandle
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let observer = Arc::new(Observer {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            cb: Arc::new(cb),
            alive: AtomicBool::new(true),
            delivery: Mutex::new(()),
            caller: Mutex::new(None),
        });
        lock(&self.inner.observers).push(observer.clone());

        observer.deliver(&self.get());

        ChangeHandle {
            storage: Arc::downgrade(&self.inner),
            observer,
        }
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        lock(&self.inner.observers).len()
    }

    fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Value) -> bool,
    {
        let snapshot = {
            let mut data = lock(&self.inner.data);
            if !f(&mut data) {
                return;
            }
            data.clone()
        };

        let observers: Vec<Arc<Observer>> = lock(&self.inner.observers).clone();

        for observer in observers {
            observer.deliver(&snapshot);
        }
    }
}

impl Default for JsonStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for JsonStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonStorage")
            .field("data", &self.get())
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// Registration of a change observer.
///
/// Dropping the handle unregisters the observer.
pub struct ChangeHandle {
    storage: Weak<StorageInner>,
    observer: Arc<Observer>,
}

impl ChangeHandle {
    /// Unregisters the observer.
    pub fn cancel(self) {}
}

impl Drop for ChangeHandle {
    fn drop(&mut self) {
        if let Some(inner) = self.storage.upgrade() {
            let id = self.observer.id;
            lock(&inner.observers).retain(|observer| observer.id != id);
        }
        self.observer.unregister();
    }
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(obj) => obj,
        _ => unreachable!("value was just replaced by an object"),
    }
}

// A poisoned lock only means an observer panicked; the value itself is
// always left consistent, so keep going with it.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
