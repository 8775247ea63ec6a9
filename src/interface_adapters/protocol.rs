// C2: Protocol Codec. Tokenizing/emitting the `C45`-prefixed line protocol
// (spec.md §4.2, §6). Token matching is exact: a token matches a line iff
// the line starts with it and the next character is whitespace or
// end-of-string. Classification is state-dependent — the same text can
// mean different things in different session states — so this module
// exposes one parser per context rather than a single global tokenizer.

use std::fmt;

use crate::domain::card::Card;

pub const MAX_NAME_LEN: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAlive {
    Ping,
    Pong,
}

#[derive(Debug)]
pub enum ProtocolError {
    Malformed,
    NameInvalid,
    NameTaken,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Malformed => write!(f, "malformed line"),
            ProtocolError::NameInvalid => write!(f, "NAME_INVALID"),
            ProtocolError::NameTaken => write!(f, "NAME_TAKEN"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Returns the remainder of `line` after `token`, iff `token` matches
/// exactly: the line starts with `token` and the following byte (if any)
/// is whitespace. Trailing `\r` (from `\r\n` clients) is trimmed first.
fn match_token<'a>(line: &'a str, token: &str) -> Option<&'a str> {
    let line = line.trim_end_matches('\r');
    let rest = line.strip_prefix(token)?;
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest),
        _ => None,
    }
}

pub fn validate_name(name: &str) -> Result<(), ProtocolError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(ProtocolError::NameInvalid);
    }
    if name.chars().any(char::is_whitespace) {
        return Err(ProtocolError::NameInvalid);
    }
    Ok(())
}

pub fn classify_keepalive(line: &str) -> Option<KeepAlive> {
    if match_token(line, "C45PI").is_some() {
        Some(KeepAlive::Ping)
    } else if match_token(line, "C45PO").is_some() {
        Some(KeepAlive::Pong)
    } else {
        None
    }
}

/// S1: classify the first non-keep-alive handshake line.
#[derive(Debug)]
pub enum HandshakeLine {
    Reconnect { name: String, lobby: u32 },
    Name(String),
    Malformed,
}

pub fn parse_handshake(line: &str) -> HandshakeLine {
    if let Some(rest) = match_token(line, "C45REC") {
        let mut parts = rest.split_whitespace();
        let name = parts.next();
        let lobby = parts.next().and_then(|s| s.parse::<u32>().ok());
        return match (name, lobby) {
            (Some(name), Some(lobby)) => HandshakeLine::Reconnect {
                name: name.to_string(),
                lobby,
            },
            _ => HandshakeLine::Malformed,
        };
    }
    let trimmed = line.trim_end_matches('\r');
    match trimmed.strip_prefix("C45") {
        Some(rest) if !rest.is_empty() => HandshakeLine::Name(rest.to_string()),
        _ => HandshakeLine::Malformed,
    }
}

/// S4: lobby selection loop.
#[derive(Debug)]
pub enum LobbySelectionLine {
    KeepAlive(KeepAlive),
    Refresh,
    Join(u32),
    Malformed,
}

pub fn parse_lobby_selection(line: &str, own_name: &str) -> LobbySelectionLine {
    if let Some(k) = classify_keepalive(line) {
        return LobbySelectionLine::KeepAlive(k);
    }
    if match_token(line, "C45B").is_some() {
        return LobbySelectionLine::Refresh;
    }
    if let Some(rest) = match_token(line, "C45J") {
        return match rest.trim().parse::<u32>() {
            Ok(lobby) => LobbySelectionLine::Join(lobby),
            Err(_) => LobbySelectionLine::Malformed,
        };
    }
    // Legacy joined form: `C45<name><lobby>`, the last character a digit.
    let trimmed = line.trim_end_matches('\r');
    if let Some(rest) = trimmed.strip_prefix("C45") {
        if let Some(name_part) = rest.strip_prefix(own_name) {
            if name_part.len() == 1 {
                if let Some(digit) = name_part.chars().next().and_then(|c| c.to_digit(10)) {
                    return LobbySelectionLine::Join(digit);
                }
            }
        }
    }
    LobbySelectionLine::Malformed
}

/// S5 wait-for-start / S7 post-match: keep-alive, back-to-lobby, or (S7
/// only) a stale game command to ignore, else malformed.
#[derive(Debug)]
pub enum IdleLine {
    KeepAlive(KeepAlive),
    Back,
    StaleGame,
    Malformed,
}

pub fn parse_idle(line: &str, allow_stale_game: bool) -> IdleLine {
    if let Some(k) = classify_keepalive(line) {
        return IdleLine::KeepAlive(k);
    }
    if match_token(line, "C45B").is_some() {
        return IdleLine::Back;
    }
    if allow_stale_game
        && (match_token(line, "C45H").is_some() || match_token(line, "C45S").is_some())
    {
        return IdleLine::StaleGame;
    }
    IdleLine::Malformed
}

/// S6 active player's turn read.
#[derive(Debug)]
pub enum ActiveTurnLine {
    KeepAlive(KeepAlive),
    Back,
    Hit,
    Stand,
    Malformed,
}

pub fn parse_active_turn(line: &str) -> ActiveTurnLine {
    if let Some(k) = classify_keepalive(line) {
        return ActiveTurnLine::KeepAlive(k);
    }
    if match_token(line, "C45B").is_some() {
        return ActiveTurnLine::Back;
    }
    if match_token(line, "C45H").is_some() {
        return ActiveTurnLine::Hit;
    }
    if match_token(line, "C45S").is_some() {
        return ActiveTurnLine::Stand;
    }
    ActiveTurnLine::Malformed
}

/// S6 non-active player's readiness-probed input.
#[derive(Debug)]
pub enum NonActiveLine {
    KeepAlive(KeepAlive),
    Back,
    Other,
}

pub fn parse_non_active(line: &str) -> NonActiveLine {
    if let Some(k) = classify_keepalive(line) {
        return NonActiveLine::KeepAlive(k);
    }
    if match_token(line, "C45B").is_some() {
        return NonActiveLine::Back;
    }
    NonActiveLine::Other
}

// --- Server -> client line formatting (spec.md §6) ---

pub fn line_ok() -> String {
    "C45OK".to_string()
}

pub fn line_wrong(reason: Option<&str>) -> String {
    match reason {
        Some(r) => format!("C45WRONG {r}"),
        None => "C45WRONG".to_string(),
    }
}

pub fn line_rec_ok() -> String {
    "C45REC_OK".to_string()
}

/// `snapshot` is one `(occupancy, running)` pair per lobby, index order =
/// lobby number - 1.
pub fn line_lobby_snapshot(snapshot: &[(u8, bool)]) -> String {
    let mut pairs = String::with_capacity(snapshot.len() * 2);
    for (occupancy, running) in snapshot {
        pairs.push_str(&occupancy.to_string());
        pairs.push(if *running { '1' } else { '0' });
    }
    format!("C45L {} {}", snapshot.len(), pairs)
}

pub fn line_deal(c1: Card, c2: Card) -> String {
    format!("C45D {} {}", c1.to_wire(), c2.to_wire())
}

pub fn line_turn(name: &str, timeout_secs: u64) -> String {
    format!("C45T {name} {timeout_secs}")
}

pub fn line_card(card: Card) -> String {
    format!("C45C {}", card.to_wire())
}

pub fn line_bust(name: &str, value: i32) -> String {
    format!("C45B {name} {value}")
}

pub fn line_timeout() -> String {
    "C45TO".to_string()
}

pub fn line_result(n1: &str, v1: i32, n2: &str, v2: i32, winner: &str) -> String {
    format!("C45R {n1} {v1} {n2} {v2} WINNER {winner}")
}

pub fn line_opp_down(name: &str, secs: u64) -> String {
    format!("C45OD {name} {secs}")
}

pub fn line_opp_back(name: &str) -> String {
    format!("C45OB {name}")
}

pub fn line_down(reason: Option<&str>) -> String {
    match reason {
        Some(r) => format!("C45DOWN {r}"),
        None => "C45DOWN".to_string(),
    }
}

pub fn line_ping() -> String {
    "C45PI".to_string()
}

pub fn line_pong() -> String {
    "C45PO".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_rejects_name_prefixed_by_token() {
        match parse_handshake("C45PINGSTER") {
            HandshakeLine::Name(n) => assert_eq!(n, "PINGSTER"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(classify_keepalive("C45PINGSTER"), None);
        assert_eq!(classify_keepalive("C45PI"), Some(KeepAlive::Ping));
        assert_eq!(classify_keepalive("C45PI extra"), Some(KeepAlive::Ping));
    }

    #[test]
    fn parses_reconnect_line() {
        match parse_handshake("C45REC alice 1") {
            HandshakeLine::Reconnect { name, lobby } => {
                assert_eq!(name, "alice");
                assert_eq!(lobby, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn legacy_join_form_extracts_trailing_digit() {
        match parse_lobby_selection("C45alice1", "alice") {
            LobbySelectionLine::Join(n) => assert_eq!(n, 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn join_range_error_is_malformed_not_panic() {
        match parse_lobby_selection("C45J abc", "alice") {
            LobbySelectionLine::Malformed => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn snapshot_round_trips_pair_counts() {
        let snapshot = [(0u8, false), (2u8, true), (1u8, false)];
        let line = line_lobby_snapshot(&snapshot);
        assert_eq!(line, "C45L 3 002110");
    }

    #[test]
    fn name_validation_rejects_whitespace_and_overlong() {
        assert!(validate_name("alice").is_ok());
        assert!(matches!(
            validate_name("al ice"),
            Err(ProtocolError::NameInvalid)
        ));
        assert!(matches!(
            validate_name(""),
            Err(ProtocolError::NameInvalid)
        ));
        let long = "a".repeat(64);
        assert!(matches!(
            validate_name(&long),
            Err(ProtocolError::NameInvalid)
        ));
    }
}
