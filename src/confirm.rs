//! Best-effort confirmation of console commands through log correlation.
//!
//! Crafty's stdin endpoint acknowledges delivery, not effect. The only way to
//! learn what a console command actually did is to watch the server log. This
//! module sends a disposable marker command first (the server echoes it back as
//! an unknown command), sends the real command, then polls the log window and
//! reads only the lines that appeared after the marker.

use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::crafty::LogOptions;

pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

const MAX_CONFIRMATION_LINES: usize = 8;

/// Lines a Minecraft server emits that can never be a command confirmation.
const NOISE_TOKENS: &[&str] = &[
    "joined the game",
    "left the game",
    "logged in with entity id",
    "lost connection",
    "[not secure]",
    "uuid of player",
    "server empty for",
];

/// Phrases that mark a line as a likely response to a console command, either
/// a success acknowledgement or the vanilla command parser complaining.
const CONFIRMATION_TOKENS: &[&str] = &[
    "whitelist",
    "unknown or incomplete command",
    "incorrect argument",
    "added",
    "removed",
    "turned on",
    "turned off",
];

/// Seam between the resolver and the Crafty gateway.
#[async_trait]
pub trait ConsoleTransport: Send + Sync {
    async fn send_line(&self, server_id: &str, command: &str) -> Result<(), TransportError>;

    async fn recent_logs(
        &self,
        server_id: &str,
        options: LogOptions,
    ) -> Result<Vec<String>, TransportError>;
}

#[derive(Clone, Copy, Debug)]
pub struct ConfirmOptions {
    pub attempts: u32,
    pub poll_interval: Duration,
}

impl Default for ConfirmOptions {
    fn default() -> Self {
        Self {
            attempts: 6,
            poll_interval: Duration::from_millis(700),
        }
    }
}

enum ConfirmState {
    MarkerSent,
    CommandSent,
    Polling { attempt: u32 },
    Resolved(Vec<String>),
    Exhausted,
}

/// Sends `command` to the server console and polls the log for evidence of its
/// effect. Returns up to eight cleaned confirmation lines, or an empty vec when
/// the polling budget runs out without a match — the command was still sent,
/// its outcome is just unconfirmed.
pub async fn execute_with_confirmation(
    transport: &dyn ConsoleTransport,
    server_id: &str,
    command: &str,
    options: ConfirmOptions,
) -> Result<Vec<String>, TransportError> {
    let marker = confirmation_marker();
    debug!(
        "executing {:?} on {} with marker {}",
        command, server_id, marker
    );

    let mut state = ConfirmState::MarkerSent;
    loop {
        state = match state {
            ConfirmState::MarkerSent => {
                transport.send_line(server_id, &marker).await?;
                ConfirmState::CommandSent
            }
            ConfirmState::CommandSent => {
                transport.send_line(server_id, command).await?;
                ConfirmState::Polling { attempt: 0 }
            }
            ConfirmState::Polling { attempt } => {
                if attempt > 0 {
                    sleep(options.poll_interval).await;
                }

                let logs = transport
                    .recent_logs(server_id, LogOptions::default())
                    .await?;
                trace!("attempt {}: {} log lines", attempt, logs.len());

                let confirmation = lines_after_marker(&logs, &marker)
                    .map(|scoped| preferred_confirmation(scoped));

                match confirmation {
                    Some(lines) if !lines.is_empty() => ConfirmState::Resolved(lines),
                    _ if attempt + 1 >= options.attempts => ConfirmState::Exhausted,
                    _ => ConfirmState::Polling {
                        attempt: attempt + 1,
                    },
                }
            }
            ConfirmState::Resolved(lines) => return Ok(lines),
            ConfirmState::Exhausted => {
                debug!("no confirmation for {:?} within budget", command);
                return Ok(Vec::new());
            }
        };
    }
}

/// A token the server's command parser will reject and echo verbatim; only
/// its position in the log matters. Uniqueness only has to hold within one
/// polling window.
fn confirmation_marker() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    format!("validation_{}", suffix.to_lowercase())
}

/// Everything strictly after the marker's first occurrence, normalized and
/// with noise dropped. `None` while the marker has not surfaced in the window.
fn lines_after_marker(logs: &[String], marker: &str) -> Option<Vec<String>> {
    let marker_index = logs.iter().position(|line| line.contains(marker))?;

    Some(
        logs[marker_index + 1..]
            .iter()
            .map(|line| normalize_log_line(line))
            .filter(|line| !line.is_empty() && !line.contains(marker) && !is_noise_line(line))
            .collect(),
    )
}

/// Picks the lines most likely to describe the command's outcome; when the
/// vocabulary matches nothing, falls back to whatever came first.
fn preferred_confirmation(lines: Vec<String>) -> Vec<String> {
    let preferred: Vec<String> = lines
        .iter()
        .filter(|line| {
            let lower = line.to_lowercase();
            CONFIRMATION_TOKENS.iter().any(|token| lower.contains(token))
        })
        .cloned()
        .collect();

    let mut chosen = if preferred.is_empty() { lines } else { preferred };
    chosen.truncate(MAX_CONFIRMATION_LINES);
    chosen
}

/// Strips the `[HH:MM:SS] [Thread/LEVEL]:` framing, decodes HTML entities and
/// trims. Entity decoding is single-pass: Crafty escapes log output once, so
/// the result contains no entities and renormalizing returns it unchanged. A
/// double-escaped sequence like `&amp;lt;` decodes one level per pass.
pub fn normalize_log_line(line: &str) -> String {
    unescape_html(strip_log_prefix(line.trim())).trim().to_string()
}

fn strip_log_prefix(line: &str) -> &str {
    let Some(rest) = line.strip_prefix('[') else {
        return line;
    };
    let Some(time_end) = rest.find(']') else {
        return line;
    };
    if !looks_like_timestamp(&rest[..time_end]) {
        return line;
    }

    let after_time = rest[time_end + 1..].trim_start();
    let Some(level) = after_time.strip_prefix('[') else {
        return line;
    };
    let Some(level_end) = level.find(']') else {
        return line;
    };
    match level[level_end + 1..].strip_prefix(':') {
        Some(message) => message.trim_start(),
        None => line,
    }
}

fn looks_like_timestamp(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_digit() || c == ':')
        && s.chars().filter(|c| *c == ':').count() == 2
}

// `&amp;` last, so it cannot manufacture matches for the other entities.
fn unescape_html(line: &str) -> String {
    if !line.contains('&') {
        return line.to_string();
    }

    line.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn is_noise_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    NOISE_TOKENS.iter().any(|token| lower.contains(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted transport: records sent lines, counts log fetches, and builds
    /// each log window from a closure over the lines sent so far.
    struct MockTransport<F>
    where
        F: Fn(&[String]) -> Vec<String> + Send + Sync,
    {
        sent: Mutex<Vec<String>>,
        fetches: AtomicUsize,
        window: F,
    }

    impl<F> MockTransport<F>
    where
        F: Fn(&[String]) -> Vec<String> + Send + Sync,
    {
        fn new(window: F) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fetches: AtomicUsize::new(0),
                window,
            }
        }
    }

    #[async_trait]
    impl<F> ConsoleTransport for MockTransport<F>
    where
        F: Fn(&[String]) -> Vec<String> + Send + Sync,
    {
        async fn send_line(&self, _server_id: &str, command: &str) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(command.to_string());
            Ok(())
        }

        async fn recent_logs(
            &self,
            _server_id: &str,
            _options: LogOptions,
        ) -> Result<Vec<String>, TransportError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let sent = self.sent.lock().unwrap().clone();
            Ok((self.window)(&sent))
        }
    }

    fn fast_options() -> ConfirmOptions {
        ConfirmOptions {
            attempts: 6,
            poll_interval: Duration::ZERO,
        }
    }

    #[test]
    fn strips_timestamp_and_level_framing() {
        assert_eq!(
            normalize_log_line("[12:34:56] [Server thread/INFO]: Added bob to the whitelist"),
            "Added bob to the whitelist"
        );
        assert_eq!(normalize_log_line("no framing here"), "no framing here");
        // Bracketed text that is not a timestamp is left alone.
        assert_eq!(
            normalize_log_line("[note] [extra]: keep"),
            "[note] [extra]: keep"
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = "  [09:01:02] [Server thread/WARN]: Can&#39;t keep up! &quot;lag&quot;  ";
        let once = normalize_log_line(raw);
        assert_eq!(once, "Can't keep up! \"lag\"");
        assert_eq!(normalize_log_line(&once), once);
    }

    #[test]
    fn entities_decode_one_level_per_pass() {
        assert_eq!(normalize_log_line("say &lt;hi&gt; &amp; bye"), "say <hi> & bye");
        // Double-escaped input loses one escaping level, not two.
        assert_eq!(normalize_log_line("&amp;lt;"), "&lt;");
    }

    #[test]
    fn noise_lines_are_recognized() {
        assert!(is_noise_line("bob left the game"));
        assert!(is_noise_line("UUID of player bob is 1234"));
        assert!(!is_noise_line("Removed bob from the whitelist"));
    }

    #[test]
    fn marker_slice_excludes_marker_and_earlier_lines() {
        let logs = vec![
            "Turned off the whitelist".to_string(),
            "[10:00:00] [Server thread/INFO]: Unknown command: validation_abc123defg".to_string(),
            "[10:00:01] [Server thread/INFO]: Whitelist is now turned on".to_string(),
        ];

        let lines = lines_after_marker(&logs, "validation_abc123defg").unwrap();
        assert_eq!(lines, vec!["Whitelist is now turned on"]);

        assert!(lines_after_marker(&logs, "validation_other").is_none());
    }

    #[test]
    fn markers_are_distinct_and_well_formed() {
        let a = confirmation_marker();
        let b = confirmation_marker();
        assert_ne!(a, b);
        assert!(a.starts_with("validation_"));
        assert_eq!(a.len(), "validation_".len() + 10);
    }

    #[tokio::test]
    async fn resolves_confirmation_after_marker_and_discards_chat() {
        let transport = MockTransport::new(|sent: &[String]| {
            let marker = sent.first().cloned().unwrap_or_default();
            vec![
                "[12:00:58] [Server thread/INFO]: Stale line from before".to_string(),
                format!("[12:01:00] [Server thread/INFO]: Unknown command: {marker}"),
                "[12:01:01] [Server thread/INFO]: bob left the game".to_string(),
                "[12:01:01] [Server thread/INFO]: Removed bob from the whitelist".to_string(),
            ]
        });

        let lines = execute_with_confirmation(
            &transport,
            "srv-1",
            "whitelist remove bob",
            fast_options(),
        )
        .await
        .unwrap();

        assert_eq!(lines, vec!["Removed bob from the whitelist"]);
        assert_eq!(transport.fetches.load(Ordering::SeqCst), 1);

        let sent = transport.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].starts_with("validation_"));
        assert_eq!(sent[1], "whitelist remove bob");
    }

    #[tokio::test]
    async fn missing_marker_exhausts_exact_fetch_budget() {
        let transport = MockTransport::new(|_sent: &[String]| {
            vec!["[12:00:00] [Server thread/INFO]: unrelated output".to_string()]
        });

        let lines = execute_with_confirmation(&transport, "srv-1", "whitelist on", fast_options())
            .await
            .unwrap();

        assert!(lines.is_empty());
        assert_eq!(transport.fetches.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn noise_only_window_keeps_polling_until_exhausted() {
        let transport = MockTransport::new(|sent: &[String]| {
            let marker = sent.first().cloned().unwrap_or_default();
            vec![
                format!("[12:01:00] [Server thread/INFO]: Unknown command: {marker}"),
                "[12:01:02] [Server thread/INFO]: alice joined the game".to_string(),
            ]
        });

        let lines = execute_with_confirmation(&transport, "srv-1", "whitelist on", fast_options())
            .await
            .unwrap();

        assert!(lines.is_empty());
        assert_eq!(transport.fetches.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn falls_back_to_first_lines_without_vocabulary_match() {
        let transport = MockTransport::new(|sent: &[String]| {
            let marker = sent.first().cloned().unwrap_or_default();
            let mut logs = vec![format!("[12:01:00] [INFO]: Unknown command: {marker}")];
            for i in 0..12 {
                logs.push(format!("[12:01:01] [Server thread/INFO]: output {i}"));
            }
            logs
        });

        let lines = execute_with_confirmation(&transport, "srv-1", "seed", fast_options())
            .await
            .unwrap();

        assert_eq!(lines.len(), MAX_CONFIRMATION_LINES);
        assert_eq!(lines[0], "output 0");
    }
}
