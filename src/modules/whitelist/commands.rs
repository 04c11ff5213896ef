use super::parse::{format_player_list, parse_players};
use crate::confirm::{execute_with_confirmation, ConfirmOptions};
use crate::crafty::{CraftyClient, CraftyError, RemoteServer};
use crate::{Context, Error};
use futures::{Stream, StreamExt};
use poise::serenity_prelude::{AutocompleteChoice, Colour, CreateEmbed, CreateEmbedFooter};
use poise::CreateReply;
use tracing::warn;

const MAX_AUTOCOMPLETE_CHOICES: usize = 25;
const EMBED_BLURPLE: Colour = Colour::new(0x5865F2);
const EMBED_RED: Colour = Colour::new(0xED4245);

/// The console command behind each subcommand. Only `list` gets its
/// confirmation parsed further; the rest surface raw log lines.
#[derive(Debug, PartialEq, Eq)]
enum WhitelistAction {
    Enable,
    Disable,
    List,
    Add(String),
    Remove(String),
}

impl WhitelistAction {
    fn console_command(&self) -> String {
        match self {
            Self::Enable => "whitelist on".to_string(),
            Self::Disable => "whitelist off".to_string(),
            Self::List => "whitelist list".to_string(),
            Self::Add(player) => format!("whitelist add {}", player),
            Self::Remove(player) => format!("whitelist remove {}", player),
        }
    }
}

/// Enable the whitelist on a server
#[poise::command(slash_command, guild_only, ephemeral)]
pub async fn enable(
    ctx: Context<'_>,
    #[description = "Server to target"]
    #[autocomplete = "autocomplete_server"]
    server: String,
) -> Result<(), Error> {
    run_whitelist(ctx, &server, WhitelistAction::Enable).await
}

/// Disable the whitelist on a server
#[poise::command(slash_command, guild_only, ephemeral)]
pub async fn disable(
    ctx: Context<'_>,
    #[description = "Server to target"]
    #[autocomplete = "autocomplete_server"]
    server: String,
) -> Result<(), Error> {
    run_whitelist(ctx, &server, WhitelistAction::Disable).await
}

/// List whitelisted players on a server
#[poise::command(slash_command, guild_only, ephemeral)]
pub async fn list(
    ctx: Context<'_>,
    #[description = "Server to target"]
    #[autocomplete = "autocomplete_server"]
    server: String,
) -> Result<(), Error> {
    run_whitelist(ctx, &server, WhitelistAction::List).await
}

/// Add a player to a server's whitelist
#[poise::command(slash_command, guild_only, ephemeral)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Server to target"]
    #[autocomplete = "autocomplete_server"]
    server: String,
    #[description = "Minecraft username to add"] player: String,
) -> Result<(), Error> {
    run_whitelist(ctx, &server, WhitelistAction::Add(player)).await
}

/// Remove a player from a server's whitelist
#[poise::command(slash_command, guild_only, ephemeral)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Server to target"]
    #[autocomplete = "autocomplete_server"]
    server: String,
    #[description = "Minecraft username to remove"] player: String,
) -> Result<(), Error> {
    run_whitelist(ctx, &server, WhitelistAction::Remove(player)).await
}

async fn run_whitelist(
    ctx: Context<'_>,
    server_id: &str,
    action: WhitelistAction,
) -> Result<(), Error> {
    // Polling can take a few seconds, longer than the interaction deadline.
    ctx.defer_ephemeral().await?;
    let crafty = &ctx.data().crafty;

    let Some(server) = find_server(crafty, server_id).await? else {
        let embed = confirmation_embed(
            "Unknown",
            "Whitelist command failed",
            &format!("Server not found for id: {}", server_id),
            &[],
            EMBED_RED,
        );
        ctx.send(CreateReply::default().embed(embed)).await?;
        return Ok(());
    };

    let console_command = action.console_command();
    let confirmation = execute_with_confirmation(
        crafty.as_ref(),
        &server.id,
        &console_command,
        ConfirmOptions::default(),
    )
    .await?;

    let embed = match action {
        WhitelistAction::List => {
            let players = parse_players(&confirmation);
            confirmation_embed(
                &server.name,
                &format!("Whitelist for {}", server.name),
                &format_player_list(&players),
                &confirmation,
                EMBED_BLURPLE,
            )
        }
        _ if confirmation.is_empty() => confirmation_embed(
            &server.name,
            "Whitelist command sent",
            &format!(
                "Executed command: `{}`\n\nCommand sent, but no matching confirmation lines were found in logs yet.",
                console_command
            ),
            &confirmation,
            EMBED_BLURPLE,
        ),
        _ => confirmation_embed(
            &server.name,
            "Whitelist command executed",
            &format!("Executed command: `{}`", console_command),
            &confirmation,
            EMBED_BLURPLE,
        ),
    };

    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

async fn find_server(
    crafty: &CraftyClient,
    server_id: &str,
) -> Result<Option<RemoteServer>, CraftyError> {
    Ok(crafty
        .list_servers()
        .await?
        .into_iter()
        .find(|server| server.id == server_id))
}

fn confirmation_block(lines: &[String]) -> String {
    if lines.is_empty() {
        return "⚠️ No log confirmation was found yet.".to_string();
    }

    format!("```\n{}\n```", lines.join("\n"))
}

fn confirmation_embed(
    server_name: &str,
    title: &str,
    description: &str,
    confirmation: &[String],
    colour: Colour,
) -> CreateEmbed {
    CreateEmbed::new()
        .colour(colour)
        .title(title)
        .description(description)
        .field("Log confirmation", confirmation_block(confirmation), false)
        .footer(CreateEmbedFooter::new(format!("Server: {}", server_name)))
}

async fn autocomplete_server(
    ctx: Context<'_>,
    partial: &str,
) -> impl Stream<Item = AutocompleteChoice> {
    let servers = match ctx.data().crafty.list_servers().await {
        Ok(servers) => servers,
        Err(e) => {
            warn!("server autocomplete failed: {}", e);
            Vec::new()
        }
    };

    let lower = partial.to_lowercase();
    let choices: Vec<AutocompleteChoice> = servers
        .into_iter()
        .filter(|server| {
            lower.is_empty()
                || server.name.to_lowercase().contains(&lower)
                || server.id.to_lowercase().contains(&lower)
        })
        .map(|server| {
            AutocompleteChoice::new(format!("{} ({})", server.name, server.id), server.id)
        })
        .collect();

    futures::stream::iter(choices).take(MAX_AUTOCOMPLETE_CHOICES)
}
