pub mod commands;
pub mod parse;

use commands::*;
use poise::command;

/// 📋 Manage a Minecraft server's whitelist through Crafty console commands
#[command(
    slash_command,
    guild_only,
    subcommands("enable", "disable", "list", "add", "remove")
)]
pub async fn whitelist(_ctx: crate::Context<'_>) -> Result<(), crate::Error> {
    Ok(())
}
