// Business logic for the experience ledger. No Discord types in here -
// the module works with plain u64 identifiers so it can be driven by any
// frontend (and by tests).

use async_trait::async_trait;
use thiserror::Error;

/// Levels at or above this value are eligible for milestone announcements.
pub const MILESTONE_FLOOR: u32 = 50;
/// Milestone levels are multiples of this interval.
pub const MILESTONE_INTERVAL: u32 = 5;

// ============================================================================
// DOMAIN MODELS
// ============================================================================

/// A user's experience snapshot with the values derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStats {
    pub user_id: u64,
    pub exp: u64,
    pub level: u32,
    /// Experience threshold for the next level.
    pub exp_next_level: u64,
    /// Experience still missing until the next level.
    pub exp_remaining: u64,
}

impl UserStats {
    /// Build a snapshot from a raw experience total.
    pub fn from_exp(user_id: u64, exp: u64) -> Self {
        let level = exp_to_level(exp);
        let exp_next_level = level_to_exp(level + 1) as u64;
        let exp_remaining = exp_next_level.saturating_sub(exp);

        Self {
            user_id,
            exp,
            level,
            exp_next_level,
            exp_remaining,
        }
    }
}

/// [`UserStats`] plus the user's standing relative to the whole ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedStats {
    pub stats: UserStats,
    /// 1-based position by experience, descending. A user with no record
    /// ranks last; tied users share the larger rank.
    pub rank: u64,
    /// Total number of records in the ledger.
    pub population: u64,
}

/// Raw `(user, exp)` pair as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpRecord {
    pub user_id: u64,
    pub exp: u64,
}

/// Everything needed to place one user within the ledger.
#[derive(Debug, Clone, Copy, Default)]
pub struct RankContext {
    /// The user's experience, 0 if they have no record.
    pub exp: u64,
    /// Number of records with strictly lower experience.
    pub below: u64,
    /// Total number of records.
    pub population: u64,
}

/// Emitted when a grant pushes a user across a level boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelUp {
    pub user_id: u64,
    pub old_level: u32,
    pub new_level: u32,
    pub total_exp: u64,
}

impl LevelUp {
    /// Whether this level-up warrants an announcement. Reward levels always
    /// announce; everything else only on milestone levels, so routine
    /// level-ups stay quiet.
    pub fn should_announce(&self, has_reward: bool) -> bool {
        has_reward || is_milestone(self.new_level)
    }
}

/// A milestone is a positive multiple of [`MILESTONE_INTERVAL`] at or above
/// [`MILESTONE_FLOOR`].
pub fn is_milestone(level: u32) -> bool {
    level >= MILESTONE_FLOOR && level % MILESTONE_INTERVAL == 0
}

// ============================================================================
// CONVERSIONS
// ============================================================================

/// Level derived from an experience total: `floor(sqrt(exp) / 1.5 - 1)`,
/// clamped so small totals (including 0) map to level 0.
pub fn exp_to_level(exp: u64) -> u32 {
    let raw = (exp as f64).sqrt() / 1.5 - 1.0;
    if raw <= 0.0 {
        0
    } else {
        raw as u32
    }
}

/// Experience threshold associated with a level: `((level + 1) * 1.5)^2`.
///
/// The threshold is fractional and this is not an exact inverse of
/// [`exp_to_level`] under truncation; callers that need an integer truncate.
pub fn level_to_exp(level: u32) -> f64 {
    let base = (f64::from(level) + 1.0) * 1.5;
    base * base
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ExperienceError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid user id")]
    InvalidId,
}

// ============================================================================
// STORAGE PORT
// ============================================================================

/// Persistence contract for the ledger. The core defines what it needs;
/// `infra` supplies SQLite and in-memory implementations.
#[async_trait]
pub trait ExpStore: Send + Sync {
    /// Atomically add `amount` to a user's total, creating the record if it
    /// does not exist. Returns the total *before* this increment (0 for a
    /// fresh record). The increment must be a single atomic operation so
    /// concurrent grants for the same user never lose updates.
    async fn add_exp(&self, user_id: u64, amount: u64) -> Result<u64, ExperienceError>;

    /// A user's current total, 0 if they have no record.
    async fn get_exp(&self, user_id: u64) -> Result<u64, ExperienceError>;

    /// The user's total together with the strictly-lower count and the
    /// ledger population.
    async fn rank_context(&self, user_id: u64) -> Result<RankContext, ExperienceError>;

    /// The `limit` highest records by experience, descending. Equal totals
    /// are ordered by user id ascending.
    async fn top(&self, limit: u32) -> Result<Vec<ExpRecord>, ExperienceError>;
}

// ============================================================================
// SERVICE
// ============================================================================

/// The experience ledger. Generic over the storage implementation.
pub struct ExperienceService<S: ExpStore> {
    store: S,
}

impl<S: ExpStore> ExperienceService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn validate_user_id(user_id: u64) -> Result<(), ExperienceError> {
        if user_id == 0 {
            Err(ExperienceError::InvalidId)
        } else {
            Ok(())
        }
    }

    /// Add experience and report the total before the increment.
    pub async fn add_experience(
        &self,
        user_id: u64,
        amount: u64,
    ) -> Result<u64, ExperienceError> {
        Self::validate_user_id(user_id)?;
        self.store.add_exp(user_id, amount).await
    }

    /// Add experience and evaluate whether a level boundary was crossed.
    pub async fn grant(
        &self,
        user_id: u64,
        amount: u64,
    ) -> Result<Option<LevelUp>, ExperienceError> {
        let previous = self.add_experience(user_id, amount).await?;
        let total = previous.saturating_add(amount);

        let old_level = exp_to_level(previous);
        let new_level = exp_to_level(total);

        if new_level > old_level {
            Ok(Some(LevelUp {
                user_id,
                old_level,
                new_level,
                total_exp: total,
            }))
        } else {
            Ok(None)
        }
    }

    /// Full snapshot for one user: derived values plus rank and population.
    ///
    /// `rank = population - below` places a never-seen user (exp 0) last
    /// while a stored, untied user gets the usual `1 + strictly-higher`
    /// position.
    pub async fn get_user_stats(&self, user_id: u64) -> Result<RankedStats, ExperienceError> {
        Self::validate_user_id(user_id)?;

        let ctx = self.store.rank_context(user_id).await?;
        let rank = ctx.population.saturating_sub(ctx.below);

        Ok(RankedStats {
            stats: UserStats::from_exp(user_id, ctx.exp),
            rank,
            population: ctx.population,
        })
    }

    /// The `amount` highest users by experience, descending. Amount bounds
    /// (positive, configured maximum) are the caller's responsibility.
    pub async fn get_top(&self, amount: u32) -> Result<Vec<UserStats>, ExperienceError> {
        let records = self.store.top(amount).await?;

        Ok(records
            .into_iter()
            .map(|r| UserStats::from_exp(r.user_id, r.exp))
            .collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// The pure-logic tests never touch storage.
    struct NoopStore;

    #[async_trait]
    impl ExpStore for NoopStore {
        async fn add_exp(&self, _: u64, _: u64) -> Result<u64, ExperienceError> {
            Err(ExperienceError::Storage(
                "noop store should not be used".to_string(),
            ))
        }

        async fn get_exp(&self, _: u64) -> Result<u64, ExperienceError> {
            Err(ExperienceError::Storage(
                "noop store should not be used".to_string(),
            ))
        }

        async fn rank_context(&self, _: u64) -> Result<RankContext, ExperienceError> {
            Err(ExperienceError::Storage(
                "noop store should not be used".to_string(),
            ))
        }

        async fn top(&self, _: u32) -> Result<Vec<ExpRecord>, ExperienceError> {
            Err(ExperienceError::Storage(
                "noop store should not be used".to_string(),
            ))
        }
    }

    #[test]
    fn level_is_clamped_at_zero_exp() {
        // The raw formula yields -1 at exp = 0.
        assert_eq!(exp_to_level(0), 0);
        assert_eq!(exp_to_level(1), 0);
        assert_eq!(exp_to_level(8), 0);
    }

    #[test]
    fn level_boundaries_match_the_formula() {
        // sqrt(9) / 1.5 - 1 = 1
        assert_eq!(exp_to_level(9), 1);
        assert_eq!(exp_to_level(100), 5);
        // Level 50 begins at ceil((51 * 1.5)^2) = 5853.
        assert_eq!(exp_to_level(5852), 49);
        assert_eq!(exp_to_level(5853), 50);
    }

    #[test]
    fn level_is_non_decreasing_in_exp() {
        let mut previous = 0;
        for exp in 0..20_000u64 {
            let level = exp_to_level(exp);
            assert!(level >= previous, "level dropped at exp {exp}");
            previous = level;
        }
    }

    #[test]
    fn thresholds_strictly_increase() {
        for level in 0..200u32 {
            assert!(level_to_exp(level + 1) > level_to_exp(level));
        }
    }

    #[test]
    fn derived_stats_use_the_next_level_threshold() {
        let stats = UserStats::from_exp(7, 100);
        assert_eq!(stats.level, 5);
        // ((5 + 2) * 1.5)^2 = 110.25, truncated.
        assert_eq!(stats.exp_next_level, 110);
        assert_eq!(stats.exp_remaining, 10);
    }

    #[test]
    fn milestones_are_multiples_of_five_from_fifty() {
        assert!(is_milestone(50));
        assert!(is_milestone(55));
        assert!(is_milestone(100));
        assert!(!is_milestone(0));
        assert!(!is_milestone(45));
        assert!(!is_milestone(52));
    }

    #[test]
    fn reward_levels_always_announce() {
        let level_up = LevelUp {
            user_id: 1,
            old_level: 51,
            new_level: 52,
            total_exp: 6_500,
        };
        assert!(level_up.should_announce(true));
        assert!(!level_up.should_announce(false));
    }

    #[tokio::test]
    async fn zero_user_id_is_rejected_before_storage() {
        let service = ExperienceService::new(NoopStore);
        assert!(matches!(
            service.add_experience(0, 1).await,
            Err(ExperienceError::InvalidId)
        ));
        assert!(matches!(
            service.get_user_stats(0).await,
            Err(ExperienceError::InvalidId)
        ));
    }

    #[test]
    fn storage_errors_carry_their_message() {
        let err = ExperienceError::Storage("db is on fire".to_string());
        assert!(err.to_string().contains("db is on fire"));
    }
}
