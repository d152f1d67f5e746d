// Role notifier: tells members by DM when one of their roles is added or
// removed. The diff itself lives in core; this file is the Discord glue.

use crate::core::roles::diff_roles;
use crate::discord::Data;
use anyhow::Result;
use poise::serenity_prelude::{self as serenity, builder::CreateMessage, Context};
use tracing::debug;

pub async fn handle_member_update(
    ctx: &Context,
    data: &Data,
    old: Option<&serenity::Member>,
    event: &serenity::GuildMemberUpdateEvent,
) -> Result<()> {
    if !data.settings.role_notifier.enabled || event.user.bot {
        return Ok(());
    }

    // Without the previous member state there is nothing to diff against.
    let Some(old) = old else {
        return Ok(());
    };

    let before: Vec<u64> = old.roles.iter().map(|role| role.get()).collect();
    let after: Vec<u64> = event.roles.iter().map(|role| role.get()).collect();

    let changes = diff_roles(&before, &after);
    if changes.is_empty() {
        return Ok(());
    }

    for role_id in &changes.added {
        notify(ctx, data, event, *role_id, true).await?;
    }
    for role_id in &changes.removed {
        notify(ctx, data, event, *role_id, false).await?;
    }

    Ok(())
}

async fn notify(
    ctx: &Context,
    data: &Data,
    event: &serenity::GuildMemberUpdateEvent,
    role_id: u64,
    added: bool,
) -> Result<()> {
    if let Some(specific) = &data.settings.role_notifier.specific_roles {
        if !specific.contains(&role_id) {
            return Ok(());
        }
    }

    let (role_name, guild_name) = {
        match ctx.cache.guild(event.guild_id) {
            Some(guild) => (
                guild
                    .roles
                    .get(&serenity::RoleId::from(role_id))
                    .map(|role| role.name.clone())
                    .unwrap_or_else(|| format!("<@&{}>", role_id)),
                guild.name.clone(),
            ),
            None => (format!("<@&{}>", role_id), "the server".to_string()),
        }
    };

    let (title, line, color) = if added {
        (
            "Role added",
            format!("You were given the **{}** role in {}.", role_name, guild_name),
            0x00ff00,
        )
    } else {
        (
            "Role removed",
            format!(
                "The **{}** role was removed from you in {}.",
                role_name, guild_name
            ),
            0xffa500,
        )
    };

    let embed = serenity::CreateEmbed::new()
        .title(title)
        .description(line)
        .color(color);

    // Closed DMs are the member's choice, not an error worth surfacing.
    if let Err(err) = event.user.dm(ctx, CreateMessage::new().embed(embed)).await {
        debug!(user_id = event.user.id.get(), %err, "could not DM role change");
    }

    Ok(())
}
