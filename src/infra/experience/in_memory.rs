// In-memory implementation of the ledger's storage port. Used by tests and
// handy when running without a database file.

use crate::core::experience::{ExpRecord, ExpStore, ExperienceError, RankContext};
use async_trait::async_trait;
use dashmap::DashMap;

/// DashMap-backed store. The `entry` API gives the same no-lost-updates
/// guarantee the SQLite upsert provides: the read-and-increment happens
/// under the entry's shard lock.
pub struct InMemoryExpStore {
    data: DashMap<u64, u64>,
}

impl InMemoryExpStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }
}

impl Default for InMemoryExpStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExpStore for InMemoryExpStore {
    async fn add_exp(&self, user_id: u64, amount: u64) -> Result<u64, ExperienceError> {
        let mut entry = self.data.entry(user_id).or_insert(0);
        let previous = *entry;
        *entry = entry.saturating_add(amount);
        Ok(previous)
    }

    async fn get_exp(&self, user_id: u64) -> Result<u64, ExperienceError> {
        Ok(self.data.get(&user_id).map(|entry| *entry).unwrap_or(0))
    }

    async fn rank_context(&self, user_id: u64) -> Result<RankContext, ExperienceError> {
        let exp = self.get_exp(user_id).await?;
        let below = self.data.iter().filter(|entry| *entry.value() < exp).count() as u64;

        Ok(RankContext {
            exp,
            below,
            population: self.data.len() as u64,
        })
    }

    async fn top(&self, limit: u32) -> Result<Vec<ExpRecord>, ExperienceError> {
        let mut records: Vec<ExpRecord> = self
            .data
            .iter()
            .map(|entry| ExpRecord {
                user_id: *entry.key(),
                exp: *entry.value(),
            })
            .collect();

        records.sort_by(|a, b| b.exp.cmp(&a.exp).then(a.user_id.cmp(&b.user_id)));
        records.truncate(limit as usize);

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::experience::ExperienceService;
    use std::sync::Arc;

    #[tokio::test]
    async fn add_and_read_back() {
        let store = InMemoryExpStore::new();

        assert_eq!(store.get_exp(123).await.unwrap(), 0);
        assert_eq!(store.add_exp(123, 100).await.unwrap(), 0);
        assert_eq!(store.add_exp(123, 50).await.unwrap(), 100);
        assert_eq!(store.get_exp(123).await.unwrap(), 150);
    }

    #[tokio::test]
    async fn concurrent_increments_are_never_lost() {
        let service = Arc::new(ExperienceService::new(InMemoryExpStore::new()));
        let tasks = 100;

        let handles: Vec<_> = (0..tasks)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.add_experience(7, 1).await.unwrap() })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        let stats = service.get_user_stats(7).await.unwrap();
        assert_eq!(stats.stats.exp, tasks);
    }

    #[tokio::test]
    async fn grant_reports_crossed_boundaries_only() {
        let service = ExperienceService::new(InMemoryExpStore::new());

        // 0 -> 3 stays at level 0.
        assert!(service.grant(7, 3).await.unwrap().is_none());

        // 3 -> 9 crosses into level 1.
        let level_up = service.grant(7, 6).await.unwrap().unwrap();
        assert_eq!(level_up.old_level, 0);
        assert_eq!(level_up.new_level, 1);
        assert_eq!(level_up.total_exp, 9);
    }

    #[tokio::test]
    async fn milestone_crossing_announces() {
        let service = ExperienceService::new(InMemoryExpStore::new());

        // 5852 exp is level 49; one more crosses the level 50 milestone.
        service.add_experience(9, 5852).await.unwrap();
        let level_up = service.grant(9, 1).await.unwrap().unwrap();
        assert_eq!(level_up.old_level, 49);
        assert_eq!(level_up.new_level, 50);
        assert!(level_up.should_announce(false));
    }

    #[tokio::test]
    async fn never_seen_user_ranks_last() {
        let service = ExperienceService::new(InMemoryExpStore::new());
        service.add_experience(1, 50).await.unwrap();
        service.add_experience(2, 30).await.unwrap();

        let ranked = service.get_user_stats(99).await.unwrap();
        assert_eq!(ranked.stats.exp, 0);
        assert_eq!(ranked.stats.level, 0);
        assert_eq!(ranked.population, 2);
        assert_eq!(ranked.rank, ranked.population);
    }

    #[tokio::test]
    async fn rank_counts_from_the_top() {
        let service = ExperienceService::new(InMemoryExpStore::new());
        service.add_experience(1, 50).await.unwrap();
        service.add_experience(2, 10).await.unwrap();
        service.add_experience(3, 30).await.unwrap();

        assert_eq!(service.get_user_stats(1).await.unwrap().rank, 1);
        assert_eq!(service.get_user_stats(3).await.unwrap().rank, 2);
        assert_eq!(service.get_user_stats(2).await.unwrap().rank, 3);
    }

    #[tokio::test]
    async fn top_orders_by_exp_descending() {
        let service = ExperienceService::new(InMemoryExpStore::new());
        service.add_experience(1, 50).await.unwrap();
        service.add_experience(2, 10).await.unwrap();
        service.add_experience(3, 30).await.unwrap();
        service.add_experience(4, 5).await.unwrap();

        let top = service.get_top(3).await.unwrap();
        let totals: Vec<u64> = top.iter().map(|s| s.exp).collect();
        assert_eq!(totals, vec![50, 30, 10]);
    }
}
