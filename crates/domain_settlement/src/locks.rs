//! Per-aggregate locks
//!
//! Two calls on the same batch, nota or claim run one after the other;
//! calls on different aggregates run concurrently. Version checks in the
//! store still guard writes that happen outside a lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default, Clone)]
pub struct AggregateLocks {
    slots: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl AggregateLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `kind:id`
    pub async fn acquire(&self, kind: &str, id: impl fmt::Display) -> OwnedMutexGuard<()> {
        let key = format!("{}:{}", kind, id);
        let slot = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = AggregateLocks::new();
        let guard = locks.acquire("batch", "BAT-1").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("batch", "BAT-1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = AggregateLocks::new();
        let _batch = locks.acquire("batch", "BAT-1").await;
        let _nota = tokio::time::timeout(Duration::from_millis(100), locks.acquire("nota", "BAT-1"))
            .await
            .unwrap();
    }
}
