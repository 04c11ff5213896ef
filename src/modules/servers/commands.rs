use crate::config::PortRange;
use crate::crafty::{RemoteServer, ServerStatus};
use crate::{Context, Error};
use futures::future::join_all;
use poise::serenity_prelude::CreateEmbed;
use poise::CreateReply;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::warn;

const SERVERS_PER_EMBED: usize = 8;
const MAX_SAMPLED_PORTS: usize = 30;
const MAX_PORTLESS_SERVERS: usize = 20;

/// Show all registered Crafty servers and their current status
#[poise::command(slash_command, guild_only)]
pub async fn servers(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;
    let crafty = &ctx.data().crafty;

    let servers = crafty.list_servers().await?;
    if servers.is_empty() {
        ctx.say("No servers were returned by the Crafty API.").await?;
        return Ok(());
    }

    // Stats are decoration; a failed fetch degrades one line, not the reply.
    let stats = join_all(servers.iter().map(|server| crafty.server_stats(&server.id))).await;
    let lines: Vec<String> = servers
        .iter()
        .zip(stats)
        .map(|(server, stats)| {
            let stats = stats
                .map_err(|e| warn!("stats fetch failed for {}: {}", server.id, e))
                .ok();
            format_server_line(server, stats.as_ref())
        })
        .collect();

    let chunks: Vec<&[String]> = lines.chunks(SERVERS_PER_EMBED).collect();
    let total = chunks.len();

    let mut reply =
        CreateReply::default().content(format!("Found **{}** servers in Crafty.", servers.len()));
    for (index, chunk) in chunks.iter().enumerate() {
        let title = if total > 1 {
            format!("Server Overview ({}/{})", index + 1, total)
        } else {
            "Server Overview".to_string()
        };
        reply = reply.embed(CreateEmbed::new().title(title).description(chunk.join("\n")));
    }

    ctx.send(reply).await?;
    Ok(())
}

/// List unassigned ports in the configured Crafty range and servers without ports
#[poise::command(slash_command, guild_only, rename = "unused-ports")]
pub async fn unused_ports(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;

    let servers = ctx.data().crafty.list_servers().await?;
    let range = ctx.data().config.port_range;
    let summary = summarize_ports(&servers, range);

    let mut lines = vec![
        format!("Port range checked: **{}-{}**", range.start, range.end),
        format!("Registered servers: **{}**", servers.len()),
        format!("Used ports in range: **{}**", summary.used_in_range),
        format!("Unused ports in range: **{}**", summary.available.len()),
    ];

    if !summary.available.is_empty() {
        let sample: Vec<String> = summary
            .available
            .iter()
            .take(MAX_SAMPLED_PORTS)
            .map(u16::to_string)
            .collect();
        let ellipsis = if summary.available.len() > sample.len() { " ..." } else { "" };
        lines.push(format!("Example unused ports: {}{}", sample.join(", "), ellipsis));
    }

    let portless = &summary.portless;
    if !portless.is_empty() {
        lines.push(String::new());
        lines.push("Servers with no port configured:".to_string());
        for server in portless.iter().take(MAX_PORTLESS_SERVERS) {
            lines.push(format!(
                "• {} (ID: {}, status: {})",
                server.name, server.id, server.status
            ));
        }
        if portless.len() > MAX_PORTLESS_SERVERS {
            lines.push(format!(
                "• ...and {} more",
                portless.len() - MAX_PORTLESS_SERVERS
            ));
        }
    }

    ctx.say(lines.join("\n")).await?;
    Ok(())
}

struct PortSummary<'a> {
    used_in_range: usize,
    available: Vec<u16>,
    portless: Vec<&'a RemoteServer>,
}

/// Two servers can be configured with the same port; it still occupies one
/// slot in the range.
fn summarize_ports(servers: &[RemoteServer], range: PortRange) -> PortSummary<'_> {
    let used_ports: HashSet<u16> = servers.iter().filter_map(|server| server.port).collect();
    let portless: Vec<&RemoteServer> = servers
        .iter()
        .filter(|server| server.port.is_none())
        .collect();
    let available: Vec<u16> = (range.start..=range.end)
        .filter(|port| !used_ports.contains(port))
        .collect();
    let used_in_range = used_ports
        .iter()
        .filter(|port| range.contains(**port))
        .count();

    PortSummary {
        used_in_range,
        available,
        portless,
    }
}

fn format_server_line(server: &RemoteServer, stats: Option<&Map<String, Value>>) -> String {
    let port = server
        .port
        .map(|port| port.to_string())
        .unwrap_or_else(|| "No port configured".to_string());
    let mut line = format!(
        "{} **{}** (ID: {}) • Status: {} • Port: {}",
        server.status.emoji(),
        server.name,
        server.id,
        server.status,
        port
    );

    if server.status == ServerStatus::Running {
        if let Some(online) = stats.and_then(online_players) {
            line.push_str(&format!(" • 👥 {} online", online));
        }
    }

    line
}

fn online_players(stats: &Map<String, Value>) -> Option<u64> {
    let online = stats.get("online")?;
    online
        .as_u64()
        .or_else(|| online.as_str().and_then(|s| s.trim().parse().ok()))
}
