// The purge command: filtered bulk delete, gated on a configured set of
// allowed roles.

use crate::config::RoleSelector;
use crate::discord::{Data, Error};
use poise::serenity_prelude as serenity;

type Context<'a> = poise::Context<'a, Data, Error>;

/// Remove recent messages in this channel, optionally from one user only.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn purge(
    ctx: Context<'_>,
    #[description = "How many recent messages to check (default 100)"] count: Option<u32>,
    #[description = "Only remove messages from this user"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let purge_settings = &ctx.data().settings.purge;

    if purge_settings.allowed_roles.is_empty() {
        ctx.send(
            poise::CreateReply::default()
                .content("Purging is not configured on this bot.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let allowed = {
        let member = ctx
            .author_member()
            .await
            .ok_or("This command can only be used in a server")?;
        let guild = ctx.guild().ok_or("Guild not available in cache")?;
        member.roles.iter().any(|role_id| {
            guild
                .roles
                .get(role_id)
                .map_or(false, |role| {
                    role_matches(&purge_settings.allowed_roles, role.id.get(), &role.name)
                })
        })
    };

    if !allowed {
        ctx.send(
            poise::CreateReply::default()
                .content("You don't have the required role!")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    // Discord caps both fetch and bulk delete at 100 messages per call.
    let count = count.unwrap_or(purge_settings.default_count).clamp(1, 100);

    ctx.defer_ephemeral().await?;

    let channel_id = ctx.channel_id();
    let messages = channel_id
        .messages(
            ctx.serenity_context(),
            serenity::GetMessages::new().limit(count as u8),
        )
        .await?;

    let targets: Vec<serenity::MessageId> = messages
        .iter()
        .filter(|message| user.as_ref().map_or(true, |u| message.author.id == u.id))
        .map(|message| message.id)
        .collect();

    // Bulk delete needs at least two messages; a single one goes the
    // ordinary route.
    let removed = targets.len();
    if removed == 1 {
        channel_id.delete_message(ctx.http(), targets[0]).await?;
    } else if removed > 1 {
        channel_id.delete_messages(ctx.http(), targets).await?;
    }

    let ending = user
        .as_ref()
        .map(|u| format!(" from {}", u.name))
        .unwrap_or_default();
    ctx.say(format!("Removed {} messages{}.", removed, ending))
        .await?;

    Ok(())
}

/// Whether a role satisfies any configured selector (by id or by name).
fn role_matches(allowed: &[RoleSelector], role_id: u64, role_name: &str) -> bool {
    allowed.iter().any(|selector| match selector {
        RoleSelector::Id(id) => *id == role_id,
        RoleSelector::Name(name) => name == role_name,
    })
}
