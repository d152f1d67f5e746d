// Discord commands for the experience ledger: rank lookups and the
// leaderboard. This layer only translates between Discord types and the
// core service.

use crate::config::BotSettings;
use crate::core::experience::ExperienceService;
use crate::infra::experience::SqliteExpStore;
use dashmap::DashMap;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Type alias for our bot's error and context types.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Data shared across all commands and event handlers.
pub struct Data {
    pub experience: Arc<ExperienceService<SqliteExpStore>>,
    pub settings: Arc<BotSettings>,
    /// Level -> reward role, validated against the notification guild once
    /// the gateway is ready. Entries naming unknown roles never land here.
    pub reward_roles: Arc<DashMap<u32, serenity::RoleId>>,
}

/// Show the rank of a user.
#[poise::command(slash_command)]
pub async fn rank(
    ctx: Context<'_>,
    #[description = "User to check (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    show_rank(ctx, user).await
}

/// Check your current level and experience.
#[poise::command(slash_command)]
pub async fn level(
    ctx: Context<'_>,
    #[description = "User to check (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    show_rank(ctx, user).await
}

/// Shared logic for the rank and level commands.
async fn show_rank(ctx: Context<'_>, user: Option<serenity::User>) -> Result<(), Error> {
    let target_user = user.as_ref().unwrap_or_else(|| ctx.author());

    if target_user.bot {
        ctx.say("Bots don't earn experience!").await?;
        return Ok(());
    }

    let ranked = ctx
        .data()
        .experience
        .get_user_stats(target_user.id.get())
        .await?;
    let stats = &ranked.stats;

    let progress = if stats.exp_next_level > 0 {
        stats.exp as f64 / stats.exp_next_level as f64
    } else {
        0.0
    };

    let embed = serenity::CreateEmbed::new()
        .title(format!("Rank of {}", target_user.name))
        .color(0x00ff00)
        .thumbnail(target_user.face())
        .field("Level", format!("**{}**", stats.level), true)
        .field("Experience", format!("**{}**", stats.exp), true)
        .field(
            "Server rank",
            format!("#{} of {}", ranked.rank, ranked.population),
            true,
        )
        .field(
            "Next level",
            format!(
                "{} exp to go ({}/{})\n{}",
                stats.exp_remaining,
                stats.exp,
                stats.exp_next_level,
                build_progress_bar(progress, 15)
            ),
            false,
        );

    ctx.send(poise::CreateReply::default().embed(embed)).await?;

    Ok(())
}

/// Show the members with the highest experience.
#[poise::command(slash_command)]
pub async fn top(
    ctx: Context<'_>,
    #[description = "How many entries to show (default 10)"] amount: Option<u32>,
) -> Result<(), Error> {
    let (default_top, max_top) = {
        let leveling = &ctx.data().settings.leveling;
        (leveling.default_top, leveling.max_top)
    };

    // The amount is validated here, before the ledger sees it.
    let amount = amount.unwrap_or(default_top);
    if !top_amount_in_range(amount, max_top) {
        ctx.send(
            poise::CreateReply::default()
                .content(format!("Give an amount between 1 and {}.", max_top))
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let entries = ctx.data().experience.get_top(amount).await?;

    if entries.is_empty() {
        ctx.say("No one has earned experience yet. Start chatting!")
            .await?;
        return Ok(());
    }

    let mut description = String::new();
    for (index, stats) in entries.iter().enumerate() {
        let name = resolve_display_name_cached(&ctx, stats.user_id);
        description.push_str(&format!(
            "**#{}** {} — level {} ({} exp)\n",
            index + 1,
            name,
            stats.level,
            stats.exp
        ));
    }

    let embed = serenity::CreateEmbed::new()
        .title("Leaderboard")
        .description(description)
        .color(0xffd700);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;

    Ok(())
}

/// Caller-side bound check for the leaderboard amount. The ledger itself
/// does not enforce a maximum.
pub(crate) fn top_amount_in_range(amount: u32, max: u32) -> bool {
    amount >= 1 && amount <= max
}

/// Resolve a display name from the cache only; fall back to a mention so
/// the entry stays identifiable without HTTP calls.
fn resolve_display_name_cached(ctx: &Context<'_>, user_id: u64) -> String {
    let user_id_s = serenity::UserId::from(user_id);

    if let Some(guild_id) = ctx.guild_id() {
        if let Some(guild) = ctx.serenity_context().cache.guild(guild_id) {
            if let Some(member) = guild.members.get(&user_id_s) {
                return member.display_name().to_string();
            }
        }
    }

    if let Some(user) = ctx.serenity_context().cache.user(user_id_s) {
        return user.name.clone();
    }

    format!("<@{}>", user_id)
}

fn build_progress_bar(progress: f64, length: usize) -> String {
    let clamped = progress.clamp(0.0, 1.0);
    let filled = ((clamped * length as f64).round() as usize).min(length);
    "▰".repeat(filled) + &"▱".repeat(length - filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_amount_bounds_are_inclusive() {
        assert!(!top_amount_in_range(0, 25));
        assert!(top_amount_in_range(1, 25));
        assert!(top_amount_in_range(25, 25));
        assert!(!top_amount_in_range(26, 25));
    }

    #[test]
    fn progress_bar_is_clamped() {
        assert_eq!(build_progress_bar(-0.5, 4), "▱▱▱▱");
        assert_eq!(build_progress_bar(0.5, 4), "▰▰▱▱");
        assert_eq!(build_progress_bar(2.0, 4), "▰▰▰▰");
    }
}
