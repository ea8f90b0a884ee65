//! Single-flight coalescing for concurrent fetches of the same key.
//!
//! For any set of concurrent [`SingleFlight::run`] calls sharing a key,
//! exactly one runs its producer; the rest wait and receive the same value.
//! Nothing is cached across flights: once the producer publishes, the next
//! call for that key starts fresh.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Mutex;

use tokio::sync::broadcast;

/// In-flight map entry. The sender doubles as the completion signal: the
/// value is published through it, and dropping it unblocks waiters when the
/// producer never completes.
struct InFlight<V> {
    tx: broadcast::Sender<V>,
}

pub struct SingleFlight<K, V> {
    in_flight: Mutex<HashMap<K, InFlight<V>>>,
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Run `make` for `key`, coalescing with any concurrent flight.
    ///
    /// The entry is removed and the value broadcast under the same lock, so
    /// every waiter that observed the entry receives the published value,
    /// and no later caller can subscribe to a flight that already finished.
    /// If the executing future panics or is dropped, the entry is removed
    /// and the channel closes; affected waiters loop back and the next one
    /// in becomes the executor.
    pub async fn run<F, Fut>(&self, key: K, make: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let mut make = Some(make);
        loop {
            let mut rx = {
                let mut guard = self.in_flight.lock().unwrap();
                match guard.get(&key) {
                    Some(entry) => Some(entry.tx.subscribe()),
                    None => {
                        let (tx, _) = broadcast::channel(1);
                        guard.insert(key.clone(), InFlight { tx });
                        None
                    }
                }
            };

            if let Some(rx) = rx.as_mut() {
                match rx.recv().await {
                    Ok(value) => return value,
                    // Executor died before publishing; take another lap.
                    Err(_) => continue,
                }
            }

            let cleanup = RemoveOnDrop {
                map: &self.in_flight,
                key: Some(key.clone()),
            };
            let make = make.take().expect("producer consumed twice");
            let value = make().await;
            cleanup.publish(value.clone());
            return value;
        }
    }

    /// Number of keys currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }
}

/// Removes the in-flight entry when the executor exits, on every path.
struct RemoveOnDrop<'a, K: Hash + Eq, V> {
    map: &'a Mutex<HashMap<K, InFlight<V>>>,
    key: Option<K>,
}

impl<K: Hash + Eq, V> RemoveOnDrop<'_, K, V> {
    /// Remove the entry and broadcast the value atomically.
    fn publish(mut self, value: V) {
        let key = self.key.take().expect("entry already removed");
        let mut guard = self.map.lock().unwrap();
        if let Some(entry) = guard.remove(&key) {
            // No receivers just means nobody coalesced with us.
            let _ = entry.tx.send(value);
        }
    }
}

impl<K: Hash + Eq, V> Drop for RemoveOnDrop<'_, K, V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.map.lock().unwrap().remove(&key);
        }
    }
}
