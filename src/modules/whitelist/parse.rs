//! Extracts player names from whitelist confirmation text.

/// Recognizes the vanilla responses to `whitelist list` and `whitelist add`:
/// "There are no whitelisted players", a "Whitelisted players: a, b, c"
/// enumeration, or a single "Added X to the whitelist" acknowledgement.
/// Names keep their first-seen order, duplicates collapse.
pub fn parse_players(lines: &[String]) -> Vec<String> {
    let mut players: Vec<String> = Vec::new();

    for line in lines {
        if find_ascii_ci(line, "there are no whitelisted players").is_some() {
            return Vec::new();
        }

        if let Some(names) = enumeration_names(line) {
            for name in names.split(',') {
                push_unique(&mut players, name);
            }
            continue;
        }

        if let Some(pos) = find_ascii_ci(line, "added ") {
            let rest = &line[pos + "added ".len()..];
            if find_ascii_ci(rest, " to the whitelist").is_some() {
                if let Some(name) = rest.split_whitespace().next() {
                    push_unique(&mut players, name);
                }
            }
        }
    }

    players
}

/// Byte offset of the first ASCII-case-insensitive occurrence of `needle`.
/// The needle must be ASCII, so a match always starts on a char boundary of
/// the original string.
fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

/// The tail of a "whitelisted player(s): ..." line, if present.
fn enumeration_names(line: &str) -> Option<&str> {
    let start = find_ascii_ci(line, "whitelisted player")?;
    let colon = line[start..].find(':')?;
    Some(&line[start + colon + 1..])
}

fn push_unique(players: &mut Vec<String>, name: &str) {
    let name = name.trim().trim_matches(|c| c == '.' || c == '\'' || c == '`');
    if !name.is_empty() && !players.iter().any(|p| p == name) {
        players.push(name.to_string());
    }
}

pub fn format_player_list(players: &[String]) -> String {
    if players.is_empty() {
        return "Whitelist is empty.".to_string();
    }

    players
        .iter()
        .map(|player| format!("• {}", player))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(input: &[&str]) -> Vec<String> {
        input.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_whitelist_parses_to_no_players() {
        assert!(parse_players(&lines(&["There are no whitelisted players"])).is_empty());
    }

    #[test]
    fn single_add_acknowledgement() {
        assert_eq!(
            parse_players(&lines(&["Added bob to the whitelist"])),
            vec!["bob"]
        );
    }

    #[test]
    fn enumeration_keeps_order_and_collapses_duplicates() {
        assert_eq!(
            parse_players(&lines(&["Whitelisted players: alice, bob, carol, bob"])),
            vec!["alice", "bob", "carol"]
        );
    }

    #[test]
    fn singular_enumeration_form() {
        assert_eq!(
            parse_players(&lines(&["There is 1 whitelisted player: steve."])),
            vec!["steve"]
        );
    }

    #[test]
    fn multibyte_prefix_does_not_skew_name_offsets() {
        // 'İ' lowercases to more bytes than it occupies, so offsets computed
        // on a lowercased copy would misalign against the original line.
        assert_eq!(
            parse_players(&lines(&["İİİİİİİİ said: Whitelisted players: alice"])),
            vec!["alice"]
        );
        assert_eq!(
            parse_players(&lines(&["İİİİİİİİ then Added bob to the whitelist"])),
            vec!["bob"]
        );
    }

    #[test]
    fn unrelated_lines_yield_nothing() {
        assert!(parse_players(&lines(&["Unknown or incomplete command"])).is_empty());
    }

    #[test]
    fn formats_player_bullets() {
        assert_eq!(format_player_list(&[]), "Whitelist is empty.");
        assert_eq!(
            format_player_list(&lines(&["alice", "bob"])),
            "• alice\n• bob"
        );
    }
}
