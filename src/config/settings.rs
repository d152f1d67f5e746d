// Runtime configuration, read once at startup and injected into the
// services and handlers. Missing optional pieces disable the feature that
// needs them (with a warning), they never fail the whole bot.

use anyhow::{Context as _, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

/// Guild and channel that receive level-up announcements.
#[derive(Debug, Clone, Copy)]
pub struct NotificationTarget {
    pub guild_id: u64,
    pub channel_id: u64,
}

/// Settings for the experience ledger and its level-up side effects.
#[derive(Debug, Clone)]
pub struct LevelingSettings {
    /// `None` disables announcements and role rewards.
    pub notifications: Option<NotificationTarget>,
    /// Level -> role id, as configured. Validated against the guild's
    /// actual roles once the gateway is ready.
    pub reward_roles: HashMap<u32, u64>,
    /// Inclusive bounds of the per-message experience roll.
    pub roll_min: u64,
    pub roll_max: u64,
    /// Default and maximum amount for the leaderboard command.
    pub default_top: u32,
    pub max_top: u32,
}

/// A configured role reference: numeric id or literal name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleSelector {
    Id(u64),
    Name(String),
}

#[derive(Debug, Clone)]
pub struct PurgeSettings {
    /// Roles allowed to invoke the purge command. Empty disables purging.
    pub allowed_roles: Vec<RoleSelector>,
    pub default_count: u32,
}

#[derive(Debug, Clone)]
pub struct RoleNotifierSettings {
    pub enabled: bool,
    /// When set, only changes to these roles are announced.
    pub specific_roles: Option<Vec<u64>>,
}

#[derive(Debug, Clone)]
pub struct BotSettings {
    pub token: String,
    pub database_path: String,
    pub leveling: LevelingSettings,
    pub purge: PurgeSettings,
    pub role_notifier: RoleNotifierSettings,
}

impl BotSettings {
    /// Read everything from the environment (plus the reward-map file).
    /// Fails only on a missing token; degraded features warn here, once.
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("DISCORD_TOKEN")
            .context("missing DISCORD_TOKEN environment variable")?;

        let database_path =
            env_or("EXP_DATABASE_PATH", "data/exp_system.db".to_string());

        let notifications = match (
            env_parsed::<u64>("LEVELUP_GUILD_ID"),
            env_parsed::<u64>("LEVELUP_CHANNEL_ID"),
        ) {
            (Some(guild_id), Some(channel_id)) => Some(NotificationTarget {
                guild_id,
                channel_id,
            }),
            _ => {
                tracing::warn!(
                    "LEVELUP_GUILD_ID or LEVELUP_CHANNEL_ID is missing/invalid; \
                     level-up announcements and role rewards are disabled"
                );
                None
            }
        };

        let reward_path = env_or("EXP_ROLES_FILE", "config/exp_roles.json".to_string());
        let reward_roles = load_reward_map(Path::new(&reward_path));

        let mut roll_min = env_parsed("EXP_ROLL_MIN").unwrap_or(1u64);
        let mut roll_max = env_parsed("EXP_ROLL_MAX").unwrap_or(6u64);
        if roll_min == 0 || roll_min > roll_max {
            tracing::warn!(
                roll_min,
                roll_max,
                "invalid experience roll bounds, falling back to 1..=6"
            );
            roll_min = 1;
            roll_max = 6;
        }

        let default_top = env_parsed("TOP_DEFAULT").unwrap_or(10u32);
        let max_top = env_parsed("TOP_MAX").unwrap_or(25u32);

        let allowed_roles = std::env::var("PURGE_ROLES")
            .map(|raw| parse_role_selectors(&raw))
            .unwrap_or_default();
        if allowed_roles.is_empty() {
            tracing::warn!("PURGE_ROLES is not configured; the purge command is disabled");
        }

        let notifier_enabled = env_parsed("ROLE_NOTIFIER_ENABLED").unwrap_or(true);
        let specific_roles = std::env::var("ROLE_NOTIFIER_ROLES")
            .ok()
            .map(|raw| parse_id_list(&raw));

        Ok(Self {
            token,
            database_path,
            leveling: LevelingSettings {
                notifications,
                reward_roles,
                roll_min,
                roll_max,
                default_top,
                max_top,
            },
            purge: PurgeSettings {
                allowed_roles,
                default_count: env_parsed("PURGE_DEFAULT_COUNT").unwrap_or(100u32),
            },
            role_notifier: RoleNotifierSettings {
                enabled: notifier_enabled,
                specific_roles,
            },
        })
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse a comma-separated role list where each entry is an id or a name.
pub fn parse_role_selectors(raw: &str) -> Vec<RoleSelector> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.parse::<u64>() {
            Ok(id) => RoleSelector::Id(id),
            Err(_) => RoleSelector::Name(entry.to_string()),
        })
        .collect()
}

/// Parse a comma-separated id list, dropping malformed entries with a
/// warning each instead of refusing the whole list.
pub fn parse_id_list(raw: &str) -> Vec<u64> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.parse::<u64>() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(entry, "ignoring malformed role id in ROLE_NOTIFIER_ROLES");
                None
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct RewardMapFile {
    rewards: HashMap<u32, u64>,
}

/// Parse the level -> role id reward mapping from its JSON text.
pub fn parse_reward_map(json: &str) -> Result<HashMap<u32, u64>> {
    let file: RewardMapFile = serde_json::from_str(json).context("invalid reward map JSON")?;
    Ok(file.rewards)
}

fn load_reward_map(path: &Path) -> HashMap<u32, u64> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => {
            tracing::info!(path = %path.display(), "no reward map file, no role rewards");
            return HashMap::new();
        }
    };

    match parse_reward_map(&raw) {
        Ok(rewards) => rewards,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "unreadable reward map, no role rewards");
            HashMap::new()
        }
    }
}
