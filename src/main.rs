// Entry point. Wires the configuration, the SQLite-backed experience
// ledger, and the Discord framework together, then hands control to the
// gateway.

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "config/settings.rs"]
mod config;
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::config::BotSettings;
use crate::core::experience::ExperienceService;
use crate::discord::{level_up_announcements, role_notifier, Data, Error};
use crate::infra::experience::SqliteExpStore;
use dashmap::DashMap;
use poise::serenity_prelude as serenity;
use rand::Rng;
use std::sync::Arc;

/// Event handler for non-command Discord events: the experience grant on
/// every observed message, and role-change notifications.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            // Ignore bot messages (including our own)
            if new_message.author.bot {
                return Ok(());
            }

            let user_id = new_message.author.id.get();
            let leveling = &data.settings.leveling;

            // The roll is caller policy; the ledger just gets an amount.
            let earned = rand::thread_rng().gen_range(leveling.roll_min..=leveling.roll_max);

            match data.experience.grant(user_id, earned).await {
                Ok(Some(level_up)) => {
                    tracing::info!(
                        user_id,
                        old_level = level_up.old_level,
                        new_level = level_up.new_level,
                        total_exp = level_up.total_exp,
                        "user leveled up"
                    );

                    level_up_announcements::handle_level_up(ctx, data, &level_up).await;
                }
                Ok(None) => {}
                Err(e) => {
                    // This event's grant is lost; the bot keeps running.
                    tracing::error!(user_id, error = %e, "failed to grant experience");
                }
            }
        }
        serenity::FullEvent::GuildMemberUpdate {
            old_if_available,
            new: _,
            event,
        } => {
            if let Err(e) =
                role_notifier::handle_member_update(ctx, data, old_if_available.as_ref(), event)
                    .await
            {
                tracing::error!(error = %e, "failed to handle member update");
            }
        }
        _ => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Read and validate configuration once; degraded features have already
    // warned by the time this returns.
    let settings =
        Arc::new(BotSettings::from_env().expect("Failed to load configuration from environment"));

    let store = SqliteExpStore::new(&settings.database_path)
        .await
        .expect("Failed to initialize the experience database");
    let experience = Arc::new(ExperienceService::new(store));

    let data = Data {
        experience: Arc::clone(&experience),
        settings: Arc::clone(&settings),
        reward_roles: Arc::new(DashMap::new()),
    };

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::DIRECT_MESSAGES
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let token = settings.token.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                discord::commands::experience::rank(),
                discord::commands::experience::level(),
                discord::commands::experience::top(),
                discord::commands::purge::purge(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                // Reward entries naming unknown roles are dropped here, once.
                level_up_announcements::validate_reward_roles(&ctx.http, &data).await;

                tracing::info!("bot is ready");
                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .expect("Error creating client");

    client.start().await.expect("Error running bot");
}
