use crate::config::Config;
use crate::crafty::CraftyClient;
use modules::{
    servers::{servers, unused_ports},
    whitelist::whitelist,
};
use poise::serenity_prelude::{self as serenity, CreateAllowedMentions};
use std::sync::Arc;
use tracing::{error, info, trace};

mod config;
mod confirm;
mod crafty;
mod modules;

#[derive(Clone, Debug)]
pub struct Data {
    pub config: Arc<Config>,
    pub crafty: Arc<CraftyClient>,
}

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
async fn register(ctx: Context<'_>) -> Result<(), Error> {
    poise::builtins::register_application_commands_buttons(ctx).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();
    info!("starting craftybot");

    let token = std::env::var("DISCORD_TOKEN").expect("missing DISCORD_TOKEN");
    let intents = serenity::GatewayIntents::non_privileged();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions::<Data, Error> {
            allowed_mentions: Some(CreateAllowedMentions::new().empty_roles().empty_users()),
            commands: vec![register(), servers(), unused_ports(), whitelist()],
            pre_command: |ctx| {
                Box::pin(async move {
                    trace!(
                        "Command {} used by {} in {}",
                        ctx.command().qualified_name,
                        ctx.author().tag(),
                        ctx.guild_id()
                            .map_or_else(|| "DM".to_string(), |id| id.to_string())
                    );
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Command {} completed for {} in {}",
                        ctx.command().qualified_name,
                        ctx.author().tag(),
                        ctx.guild_id()
                            .map_or_else(|| "DM".to_string(), |id| id.to_string())
                    );
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!(
                                "Command {} failed for {} in {}: {:?}",
                                ctx.command().qualified_name,
                                ctx.author().tag(),
                                ctx.guild_id()
                                    .map_or_else(|| "DM".to_string(), |id| id.to_string()),
                                error
                            );
                            let _ = ctx.say("❌ Something went wrong, check the logs.").await;
                        }
                        err => error!("Other framework error: {:?}", err),
                    }
                })
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                info!("registering commands");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                let config = Arc::new(Config::from_env()?);
                let crafty = Arc::new(CraftyClient::new(
                    config.crafty_base_url.clone(),
                    config.crafty_token.clone(),
                ));

                Ok(Data { config, crafty })
            })
        })
        .build();

    let client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await;

    client.unwrap().start().await.unwrap();
}
