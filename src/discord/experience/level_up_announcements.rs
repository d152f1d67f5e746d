// Level-up side effects: the announcement embed and the reward role grant.
// Both go through a bounded fixed-delay retry, and reward entries are
// checked against the guild's real roles before any of this runs.

use crate::core::experience::LevelUp;
use crate::discord::Data;
use poise::serenity_prelude::{self as serenity, builder::CreateMessage};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;
pub const DELIVERY_RETRY_DELAY: Duration = Duration::from_millis(500);

/// The retry budget ran out without a success.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: Option<E>,
}

/// Run `op` up to `attempts` times, sleeping `delay` between tries.
pub async fn retry_with_fixed_delay<T, E, F, Fut>(
    attempts: u32,
    delay: Duration,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last_error = None;

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                last_error = Some(err);
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(RetryExhausted {
        attempts,
        last_error,
    })
}

/// Resolve the configured level -> role mapping against the notification
/// guild. Entries naming roles the guild does not have are dropped, with a
/// warning each; the rest become assignable rewards.
pub async fn validate_reward_roles(http: &serenity::Http, data: &Data) {
    let configured = &data.settings.leveling.reward_roles;

    let Some(target) = data.settings.leveling.notifications else {
        if !configured.is_empty() {
            warn!("reward roles are configured but no notification guild is; rewards disabled");
        }
        return;
    };

    let guild_id = serenity::GuildId::from(target.guild_id);
    let roles = match http.get_guild_roles(guild_id).await {
        Ok(roles) => roles,
        Err(err) => {
            warn!(%err, "could not fetch guild roles; role rewards disabled");
            return;
        }
    };

    for (level, role_id) in configured {
        match roles.iter().find(|role| role.id.get() == *role_id) {
            Some(role) => {
                data.reward_roles.insert(*level, role.id);
            }
            None => warn!(
                level,
                role_id, "reward role not found in the notification guild, dropping the entry"
            ),
        }
    }
}

/// Deliver the announcement and the reward role for a level-up, as the
/// milestone/reward policy dictates.
pub async fn handle_level_up(ctx: &serenity::Context, data: &Data, level_up: &LevelUp) {
    let Some(target) = data.settings.leveling.notifications else {
        return;
    };

    let reward_role = data
        .reward_roles
        .get(&level_up.new_level)
        .map(|entry| *entry);

    if level_up.should_announce(reward_role.is_some()) {
        let channel_id = serenity::ChannelId::from(target.channel_id);
        let outcome = retry_with_fixed_delay(MAX_DELIVERY_ATTEMPTS, DELIVERY_RETRY_DELAY, || {
            channel_id.send_message(
                ctx,
                CreateMessage::new().embed(level_up_embed(level_up, reward_role)),
            )
        })
        .await;

        if let Err(exhausted) = outcome {
            warn!(
                user_id = level_up.user_id,
                attempts = exhausted.attempts,
                error = ?exhausted.last_error,
                "giving up on level-up announcement"
            );
        }
    }

    if let Some(role_id) = reward_role {
        let guild_id = serenity::GuildId::from(target.guild_id);
        let user_id = serenity::UserId::from(level_up.user_id);
        let reason = format!("Leveled up to {}!", level_up.new_level);

        let outcome = retry_with_fixed_delay(MAX_DELIVERY_ATTEMPTS, DELIVERY_RETRY_DELAY, || {
            ctx.http
                .add_member_role(guild_id, user_id, role_id, Some(&reason))
        })
        .await;

        if let Err(exhausted) = outcome {
            warn!(
                user_id = level_up.user_id,
                role_id = role_id.get(),
                attempts = exhausted.attempts,
                error = ?exhausted.last_error,
                "giving up on reward role assignment"
            );
        }
    }
}

fn level_up_embed(level_up: &LevelUp, reward_role: Option<serenity::RoleId>) -> serenity::CreateEmbed {
    let mut description = format!(
        "<@{}> reached level {}!",
        level_up.user_id, level_up.new_level
    );
    if let Some(role) = reward_role {
        description.push_str(&format!(" They earned the <@&{}> role.", role));
    }

    serenity::CreateEmbed::new()
        .title("Level Up!")
        .description(description)
        .color(level_color(level_up.new_level))
        .field("Total experience", level_up.total_exp.to_string(), true)
}

fn level_color(level: u32) -> serenity::Colour {
    if level >= 100 {
        serenity::Colour::DARK_PURPLE
    } else if level >= 75 {
        serenity::Colour::ORANGE
    } else if level >= 50 {
        serenity::Colour::GOLD
    } else {
        serenity::Colour::BLURPLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_succeeds_within_the_budget() {
        let calls = AtomicU32::new(0);

        let result = retry_with_fixed_delay(3, Duration::ZERO, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("not ready")
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_reports_exhaustion() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_fixed_delay(4, Duration::ZERO, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("still broken")
        })
        .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 4);
        assert_eq!(exhausted.last_error, Some("still broken"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn zero_attempts_exhausts_immediately() {
        let result: Result<(), _> =
            retry_with_fixed_delay(0, Duration::ZERO, || async { Err("unreachable") }).await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 0);
        assert!(exhausted.last_error.is_none());
    }
}
