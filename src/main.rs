#![allow(clippy::result_large_err)]

use atelier_flow::{
    bot::{self, BotData},
    config::{database, seed, services::ServiceSettings},
    core::activity::ActivityLog,
    errors::{Error, Result},
    services::{IdentityProvisioner, ObjectStorage},
};
use dotenvy::dotenv;
use poise::serenity_prelude as serenity;
use std::{env, path::Path, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Connect and make sure every table exists
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to the database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|()| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 4. Seed workflow and roles from config.toml on first run
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let seed_config = if Path::new(&config_path).exists() {
        seed::load_config(&config_path)?
    } else {
        warn!(%config_path, "No seed configuration found; starting with an empty workflow");
        seed::Config::default()
    };
    seed::seed_database(&db, &seed_config)
        .await
        .inspect_err(|e| error!("Failed to seed the database: {}", e))?;

    // 5. Promote the bootstrap administrator, if configured
    if let Some(discord_id) = env::var("BOOTSTRAP_ADMIN_DISCORD_ID")
        .ok()
        .filter(|id| !id.trim().is_empty())
    {
        let email = env::var("BOOTSTRAP_ADMIN_EMAIL").map_err(Error::EnvVar)?;
        seed::ensure_bootstrap_admin(&db, &discord_id, &email).await?;
    }

    // 6. External services and the activity writer
    let services = ServiceSettings::from_env();
    let storage: Arc<dyn ObjectStorage> = Arc::new(services.object_storage());
    let identity = services
        .identity_provisioner()?
        .map(|client| Arc::new(client) as Arc<dyn IdentityProvisioner>);
    if identity.is_none() {
        warn!("Identity provisioning not configured; /staff create, update and delete are disabled");
    }
    let activity = ActivityLog::spawn(db.clone());
    let data = BotData::new(db, activity.clone(), storage, identity);

    // 7. Run the bot
    let token = env::var("DISCORD_BOT_TOKEN")
        .inspect_err(|e| error!("DISCORD_BOT_TOKEN not found: {}", e))
        .map_err(Error::EnvVar)?;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: bot::all_commands(),
            on_error: |error| Box::pin(bot::on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                info!("Registered {} commands", framework.options().commands.len());
                Ok(data)
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged();
    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .inspect_err(|e| error!("Error creating client: {:?}", e))?;

    info!("Starting bot client...");
    let outcome = client.start().await;
    activity.flush().await;
    outcome.map_err(Error::from)
}
