//! Per identity group creation locks.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type IdentityKey = (String, String);

/// One async mutex per `(title, isbn)` group.
///
/// Entries nobody holds are pruned on the next acquisition.
#[derive(Default)]
pub(crate) struct IdentityLocks {
    groups: Mutex<HashMap<IdentityKey, Arc<Mutex<()>>>>,
}

impl IdentityLocks {
    pub(crate) async fn acquire(&self, title: &str, isbn: &str) -> OwnedMutexGuard<()> {
        let group_lock = {
            let mut groups = self.groups.lock().await;
            groups.retain(|_, lock| Arc::strong_count(lock) > 1);
            groups
                .entry((title.to_string(), isbn.to_string()))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        group_lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked_groups(&self) -> usize {
        self.groups.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_group_is_serialized() {
        let locks = Arc::new(IdentityLocks::default());
        let guard = locks.acquire("Dune", "isbn-1").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("Dune", "isbn-1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_groups_do_not_block() {
        let locks = IdentityLocks::default();
        let _dune = locks.acquire("Dune", "isbn-1").await;
        let _emma = tokio::time::timeout(Duration::from_secs(1), locks.acquire("Emma", "isbn-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn released_groups_are_pruned() {
        let locks = IdentityLocks::default();
        drop(locks.acquire("Dune", "isbn-1").await);
        drop(locks.acquire("Emma", "isbn-2").await);
        let _held = locks.acquire("Dune", "isbn-3").await;

        assert_eq!(locks.tracked_groups().await, 1);
    }
}
