mod events;
mod permissions;
mod platform;
mod presence;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use tokio::sync::OnceCell;
use tracing::{Metadata, debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{EnvFilter, filter_fn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

use rustls::crypto::ring::default_provider;
use sqlx::postgres::PgPoolOptions;

use sov_commands::CommandHandler;
use sov_core::clock::SystemClock;
use sov_core::config::BotConfig;
use sov_core::dispatch::Dispatcher;
use sov_core::gateway::AdapterOptions;
use sov_core::{Data, Error, Services};
use sov_database::{Database, MIGRATOR, MemoryStore, ModerationStore};

use crate::permissions::DiscordPermissions;
use crate::platform::SerenityPlatform;

/// Permissions requested by the invite link.
const INVITE_PERMISSIONS: u64 = 3_115_320_667_786_487;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = BotConfig::from_env()?;
    let _log_guard = init_tracing(&config)?;

    default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls ring provider"))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        "Sons of Valour bot starting"
    );

    let store = open_store(&config).await?;
    let config = Arc::new(config);
    let services_slot: Arc<OnceCell<Arc<Services>>> = Arc::new(OnceCell::new());

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_MESSAGE_REACTIONS
        | serenity::GatewayIntents::AUTO_MODERATION_EXECUTION;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: sov_commands::slash_commands(),
            owners: config
                .owner_ids
                .iter()
                .map(|id| serenity::UserId::new(*id))
                .collect(),
            event_handler: |ctx, event, framework, data| {
                Box::pin(handle_event(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(on_error(error)),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: None,
                mention_as_prefix: false,
                ..Default::default()
            },
            ..Default::default()
        })
        .setup({
            let config = Arc::clone(&config);
            let services_slot = Arc::clone(&services_slot);
            move |ctx, ready, framework| {
                Box::pin(async move {
                    let bot_user_id = ready.user.id.get();
                    info!(user = %ready.user.name, bot_user_id, "connected to Discord");

                    let owners = bot_owners(ctx, &config).await;
                    let services = Arc::new(Services::new(
                        Arc::clone(&config),
                        Arc::new(SerenityPlatform::new(Arc::clone(&ctx.http))),
                        Arc::clone(&store),
                        Arc::new(DiscordPermissions::new(Arc::clone(&ctx.cache), owners)),
                        Arc::new(SystemClock),
                        bot_user_id,
                    ));

                    match store.load_members().await {
                        Ok(records) => {
                            let seeded = services.sequencer.seed(records);
                            info!(seeded, "member records restored");
                        }
                        Err(source) => {
                            error!(?source, "failed to load member records; starting empty");
                        }
                    }
                    services.sequencer.spawn_sweeper();

                    let handler = Arc::new(CommandHandler::new(
                        Arc::clone(&services),
                        sov_commands::router(&config.prefix, Some(bot_user_id)),
                    ));
                    let (dispatcher, workers) = Dispatcher::spawn(
                        &config.dispatch,
                        AdapterOptions {
                            report_emoji: config.report_emoji.clone(),
                        },
                        handler,
                    );
                    debug!(workers = workers.len(), "event dispatcher running");

                    match config.guild_id {
                        Some(guild_id) => {
                            poise::builtins::register_in_guild(
                                ctx,
                                &framework.options().commands,
                                serenity::GuildId::new(guild_id),
                            )
                            .await?;
                        }
                        None => {
                            poise::builtins::register_globally(ctx, &framework.options().commands)
                                .await?;
                        }
                    }

                    presence::spawn_rotation(ctx.clone(), config.status_messages.clone());

                    info!(invite = %invite_url(bot_user_id), "Sons of Valour bot is ready");

                    let _ = services_slot.set(Arc::clone(&services));
                    Ok(Data {
                        services,
                        dispatcher,
                    })
                })
            }
        })
        .build();

    info!("connecting to Discord");

    let mut client = serenity::ClientBuilder::new(&config.token, intents)
        .framework(framework)
        .await?;

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shard_manager.shutdown_all().await;
        }
    });

    client.start().await?;

    if let Some(services) = services_slot.get() {
        services.audit.flush().await;
        info!("audit log flushed");
    }
    Ok(())
}

/// Console output always; a plain-text file as well when `LOG_PATH` is set.
fn init_tracing(config: &BotConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = || EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_filter(env_filter())
        .with_filter(filter_fn(outside_shard_chatter));

    let (file_layer, guard) = match &config.log_path {
        Some(path) => {
            let path = Path::new(path);
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("LOG_PATH `{}` does not name a file", path.display()))?;
            std::fs::create_dir_all(directory)
                .with_context(|| format!("failed to create log directory {}", directory.display()))?;

            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(env_filter())
                .with_filter(filter_fn(outside_shard_chatter));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn outside_shard_chatter(metadata: &Metadata<'_>) -> bool {
    let target = metadata.target();
    !(target.starts_with("serenity::gateway::bridge::shard_manager")
        || target.starts_with("serenity::gateway::bridge::shard_runner"))
}

async fn open_store(config: &BotConfig) -> anyhow::Result<Arc<dyn ModerationStore>> {
    let Some(database_url) = &config.database_url else {
        warn!("DATABASE_URL is not set; moderation history will not survive a restart");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    info!("PostgreSQL connection established.");

    let db = Database::new(pool);
    if config.auto_run_migrations {
        MIGRATOR.run(db.pool()).await?;
        info!("Database migrations applied.");
    } else {
        info!("Auto migrations disabled (set AUTO_RUN_MIGRATIONS=true to run at startup).");
    }

    Ok(Arc::new(db))
}

/// Configured owners plus the owner of the bot application.
async fn bot_owners(ctx: &serenity::Context, config: &BotConfig) -> HashSet<u64> {
    let mut owners: HashSet<u64> = config.owner_ids.iter().copied().collect();
    match ctx.http.get_current_application_info().await {
        Ok(info) => {
            if let Some(owner) = info.owner {
                owners.insert(owner.id.get());
            }
        }
        Err(source) => warn!(?source, "could not fetch application owner"),
    }
    owners
}

fn invite_url(client_id: u64) -> String {
    format!(
        "https://discord.com/oauth2/authorize?client_id={client_id}&scope=bot+applications.commands&permissions={INVITE_PERMISSIONS}"
    )
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!(?error, command = %ctx.command().qualified_name, "slash command error");

            let embed = serenity::CreateEmbed::new()
                .title("Command Error")
                .description("Something went wrong while running this command.")
                .color(sov_utils::embed::ERROR_EMBED_COLOR);

            let _ = ctx
                .send(poise::CreateReply::default().ephemeral(true).embed(embed))
                .await;
        }
        poise::FrameworkError::ArgumentParse { ctx, input, .. } => {
            let description = match input {
                Some(input) => format!("Invalid argument: `{input}`"),
                None => "Missing required argument.".to_owned(),
            };

            let _ = ctx
                .send(poise::CreateReply::default().ephemeral(true).content(description))
                .await;
        }
        poise::FrameworkError::EventHandler { error, event, .. } => {
            error!(?error, event = event.snake_case_name(), "event handler error");
        }
        other => {
            error!(?other, "framework error");
        }
    }
}

async fn handle_event(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let Some(raw) = events::forward::raw_dispatch(event) {
        data.dispatcher.submit_raw(&raw).await;
    }

    Ok(())
}
