mod auth;
mod commands;
mod config;
mod ctftime;
mod db;
mod error;
mod events;
mod mailer;
mod roster;
mod schedule;
mod tasks;
#[cfg(test)]
mod testutil;
mod token;

use poise::serenity_prelude as serenity;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use config::Config;
use ctftime::CtftimeClient;
use events::event_handler;
use mailer::RelayMailer;
use roster::Roster;
use tasks::deadline_watch::DeadlineWatchTask;
use tasks::schedule_sync::ScheduleSyncTask;
use tasks::TaskManager;
use token::TokenService;

#[derive(Clone)]
pub struct Data {
    pub db: DatabaseConnection,
    pub config: Arc<Config>,
    pub roster: Arc<Roster>,
    pub tokens: Arc<TokenService>,
    pub mailer: Arc<RelayMailer>,
    pub ctftime: Arc<CtftimeClient>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let config = Config::from_env()?;
    let db = db::connect(&config.database_url).await?;

    let discord_token = config.discord_token.clone();
    let intents =
        serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::GUILD_MEMBERS;

    let data = Data {
        db,
        roster: Arc::new(Roster::new(
            config.roster_dir.clone(),
            config.student_email_domain.clone(),
        )),
        tokens: Arc::new(TokenService::new(&config.jwt_secret)),
        mailer: Arc::new(RelayMailer::new(
            config.mail_relay_url.clone(),
            config.mail_relay_key.clone(),
        )),
        ctftime: Arc::new(CtftimeClient::new()),
        config: Arc::new(config),
    };

    let mut task_manager = TaskManager::new();
    task_manager.register_task(ScheduleSyncTask::new());
    task_manager.register_task(DeadlineWatchTask::new());

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::auth::auth(),
                commands::watch::watch(),
                commands::ctf::ctf(),
                commands::toolbox::toolbox(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                // Periodic work starts once the gateway session is up.
                task_manager.run_all(ctx, data.clone()).await;

                Ok(data)
            })
        })
        .build();

    serenity::ClientBuilder::new(discord_token, intents)
        .framework(framework)
        .await?
        .start()
        .await?;

    Ok(())
}
