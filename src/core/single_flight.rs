//! In-flight request registry.
//!
//! Concurrent callers asking for the same key share one pending future instead of
//! each launching their own remote command. The entry disappears as soon as the
//! shared future resolves, so the next caller after completion starts fresh (and
//! will normally be answered by the cache the first caller populated).

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

pub struct SingleFlight<K, V>
where
    V: Clone,
{
    pending: Mutex<HashMap<K, Shared<BoxFuture<'static, V>>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Join the in-flight future for `key`, or start one with `make`.
    ///
    /// `make` is only invoked when no request for `key` is pending.
    pub async fn run<F, Fut>(&self, key: K, make: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let shared = {
            let mut pending = self.pending.lock();
            match pending.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let fut = make().boxed().shared();
                    pending.insert(key.clone(), fut.clone());
                    fut
                }
            }
        };

        let value = shared.clone().await;

        let mut pending = self.pending.lock();
        if pending
            .get(&key)
            .is_some_and(|current| current.ptr_eq(&shared))
        {
            pending.remove(&key);
        }
        value
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.pending.lock().contains_key(key)
    }

    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }

    /// Forget every pending entry; callers already awaiting keep their future.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
