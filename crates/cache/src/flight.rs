use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type FlightMap<K> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>;

/// Per-key single-flight: concurrent loads for the same key collapse into
/// one, later callers observe the freshly stored entry instead of hitting
/// the authoritative store again.
///
/// The key slot is reclaimed when the last guard for it drops, so the map is
/// bounded by the number of in-flight loads, not by key cardinality.
pub struct Flight<K> {
    inner: FlightMap<K>,
}

impl<K> Default for Flight<K> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

pub struct FlightGuard<K>
where
    K: Clone + Eq + Hash,
{
    key: K,
    inner: FlightMap<K>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K> Drop for FlightGuard<K>
where
    K: Clone + Eq + Hash,
{
    fn drop(&mut self) {
        let mut map = self.inner.lock();
        // Release the mutex while holding the map lock, then drop the slot
        // if nobody else is waiting on it. Waiters each hold an Arc clone,
        // so a strong count of one means the map's reference is the last.
        drop(self.guard.take());
        if let Some(mutex) = map.get(&self.key) {
            if Arc::strong_count(mutex) == 1 {
                map.remove(&self.key);
            }
        }
    }
}

impl<K> Flight<K>
where
    K: Clone + Eq + Hash,
{
    pub async fn acquire(&self, key: &K) -> FlightGuard<K> {
        let mutex = {
            let mut map = self.inner.lock();
            map.entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = mutex.lock_owned().await;
        FlightGuard {
            key: key.clone(),
            inner: self.inner.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.inner.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn released_keys_are_reclaimed() {
        let flight: Flight<u32> = Flight::default();
        for key in 0..10_000u32 {
            let guard = flight.acquire(&key).await;
            drop(guard);
        }
        assert_eq!(flight.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn slot_survives_while_a_waiter_is_queued() {
        let flight: Arc<Flight<u32>> = Arc::new(Flight::default());
        let first = flight.acquire(&1).await;

        let contender = {
            let flight = flight.clone();
            tokio::spawn(async move {
                let _second = flight.acquire(&1).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(flight.tracked_keys(), 1);

        drop(first);
        contender.await.unwrap();
        assert_eq!(flight.tracked_keys(), 0);
    }
}
