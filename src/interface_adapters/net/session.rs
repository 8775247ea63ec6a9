// C5: Session State Machine. One task per accepted connection, driving
// the protocol from handshake through lobby selection, match
// participation, and back (spec.md §4.5). The match task (C4) takes over
// wire I/O for the duration of S6; this driver only polls the lobby's
// `running` flag during that phase.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info_span, Instrument};

use crate::domain::slot::DETACHED;
use crate::interface_adapters::net::connections::ConnectionRegistry;
use crate::interface_adapters::net::transport::{ReadOutcome, MAX_LINE};
use crate::interface_adapters::protocol::{
    self, HandshakeLine, IdleLine, KeepAlive, LobbySelectionLine,
};
use crate::use_cases::identity::IdentityRegistry;
use crate::use_cases::lobby::LobbyRegistry;
use crate::use_cases::match_engine;
use crate::use_cases::types::LOBBY_POLL_INTERVAL;

const HANDSHAKE_TIMEOUT_SECS: u64 = 120;

/// Everything a session needs to reach across to C3/C4/the connection set.
/// Cloning is cheap (three `Arc`s); the match engine gets its own clones
/// when a session spawns it.
#[derive(Clone)]
struct Ctx {
    connections: Arc<ConnectionRegistry>,
    identity: Arc<IdentityRegistry>,
    lobbies: Arc<LobbyRegistry>,
}

enum State {
    Handshake,
    LobbySelection { name: String, token: u64 },
    WaitForStart { name: String, token: u64, lobby: u32 },
    InMatch { name: String, token: u64, lobby: u32 },
    PostMatch { name: String, token: u64, lobby: u32 },
    Close,
}

pub async fn run_session(
    handle: u64,
    connections: Arc<ConnectionRegistry>,
    identity: Arc<IdentityRegistry>,
    lobbies: Arc<LobbyRegistry>,
) {
    let ctx = Ctx { connections, identity, lobbies };
    let span = info_span!("session", conn = handle, name = tracing::field::Empty);
    async move {
        let mut identity_guard: Option<(String, u64)> = None;
        let mut state = State::Handshake;
        loop {
            state = match state {
                State::Handshake => handshake(handle, &ctx).await,
                State::LobbySelection { name, token } => {
                    identity_guard = Some((name.clone(), token));
                    tracing::Span::current().record("name", name.as_str());
                    lobby_selection(handle, &ctx, name, token).await
                }
                State::WaitForStart { name, token, lobby } => {
                    wait_for_start(handle, &ctx, name, token, lobby).await
                }
                State::InMatch { name, token, lobby } => in_match(&ctx, name, token, lobby).await,
                State::PostMatch { name, token, lobby } => {
                    post_match(handle, &ctx, name, token, lobby).await
                }
                State::Close => break,
            };
        }

        if let Some((name, token)) = identity_guard {
            ctx.identity.remove_if_token(&name, token).await;
        }
        ctx.connections.remove(handle).await;
    }
    .instrument(span)
    .await;
}

async fn send(ctx: &Ctx, handle: u64, line: &str) -> bool {
    ctx.connections.write_line(handle, line).await
}

async fn send_snapshot(ctx: &Ctx, handle: u64) {
    let snapshot = ctx.lobbies.snapshot().await;
    send(ctx, handle, &protocol::line_lobby_snapshot(&snapshot)).await;
}

fn maybe_start_match(ctx: &Ctx, lobby: &Arc<crate::use_cases::lobby::Lobby>, started: bool) {
    if started {
        tokio::spawn(match_engine::run_match(
            lobby.clone(),
            ctx.connections.clone(),
            ctx.identity.clone(),
        ));
    }
}

// S0/S1: read lines, skipping keep-alives, until a handshake-classifiable
// line arrives; then classify and dispatch to fresh-login or reconnect.
async fn handshake(handle: u64, ctx: &Ctx) -> State {
    loop {
        let outcome = ctx
            .connections
            .read_line_timeout(handle, MAX_LINE, HANDSHAKE_TIMEOUT_SECS)
            .await;
        let line = match outcome {
            Some(ReadOutcome::Line(l)) => l,
            _ => return State::Close,
        };
        if let Some(keepalive) = protocol::classify_keepalive(&line) {
            if keepalive == KeepAlive::Ping {
                send(ctx, handle, &protocol::line_pong()).await;
            }
            continue;
        }

        return match protocol::parse_handshake(&line) {
            HandshakeLine::Reconnect { name, lobby } => {
                reconnect(handle, ctx, name, lobby).await
            }
            HandshakeLine::Name(name) => {
                if protocol::validate_name(&name).is_err() {
                    send(ctx, handle, &protocol::line_wrong(Some("NAME_INVALID"))).await;
                    return State::Close;
                }
                fresh_login(handle, ctx, name).await
            }
            HandshakeLine::Malformed => {
                send(ctx, handle, &protocol::line_wrong(None)).await;
                State::Close
            }
        };
    }
}

// S3.
async fn fresh_login(handle: u64, ctx: &Ctx, name: String) -> State {
    if ctx.identity.has(&name).await || ctx.lobbies.find_seated(&name).await.is_some() {
        send(ctx, handle, &protocol::line_wrong(Some("NAME_TAKEN"))).await;
        return State::Close;
    }
    if ctx.identity.add(&name).await.is_err() {
        send(ctx, handle, &protocol::line_wrong(None)).await;
        return State::Close;
    }
    let token = ctx.identity.set_transport(&name, handle).await;
    send(ctx, handle, &protocol::line_ok()).await;
    send_snapshot(ctx, handle).await;
    State::LobbySelection { name, token }
}

// S2.
async fn reconnect(handle: u64, ctx: &Ctx, name: String, lobby_hint: u32) -> State {
    // Small grace period to let a just-abandoned prior transport finish
    // being marked detached by the match task (spec.md §4.5 S2).
    sleep(Duration::from_millis(50)).await;

    let mut found = None;
    if lobby_hint != 0 {
        if let Some(lobby) = ctx.lobbies.get(lobby_hint) {
            if lobby.seated_name(&name).await {
                found = Some(lobby);
            }
        }
    }
    if found.is_none() {
        if let Some((idx, _)) = ctx.lobbies.find_seated(&name).await {
            found = ctx.lobbies.get(idx);
        }
    }

    let Some(lobby) = found else {
        // Not seated anywhere: treat as a fresh login (spec.md §4.5 S2.5).
        return fresh_login(handle, ctx, name).await;
    };

    if lobby.is_running().await {
        let current = lobby.transport_of(&name).await.unwrap_or(DETACHED);
        if current != DETACHED {
            // Someone else still holds this name's seat live; the race is
            // resolved by closing and letting the client retry (spec.md
            // §9 open question).
            return State::Close;
        }
        lobby.attach_transport(&name, handle).await;
        let _ = ctx.identity.add(&name).await;
        let token = ctx.identity.set_transport(&name, handle).await;
        send(ctx, handle, &protocol::line_rec_ok()).await;
        return State::InMatch { name, token, lobby: lobby.index };
    }

    // Seated in a waiting (not-yet-running) lobby: take over the slot.
    let previous = lobby.transport_of(&name).await.unwrap_or(DETACHED);
    if previous != DETACHED && previous != handle {
        ctx.connections.close(previous).await;
    }
    lobby.attach_transport(&name, handle).await;
    let _ = ctx.identity.add(&name).await;
    let token = ctx.identity.set_transport(&name, handle).await;
    send(ctx, handle, &protocol::line_rec_ok()).await;
    let started = lobby.start_if_ready().await;
    maybe_start_match(ctx, &lobby, started);
    State::WaitForStart { name, token, lobby: lobby.index }
}

// S4.
async fn lobby_selection(handle: u64, ctx: &Ctx, name: String, token: u64) -> State {
    loop {
        let outcome = ctx.connections.read_line(handle, MAX_LINE).await;
        let line = match outcome {
            Some(ReadOutcome::Line(l)) => l,
            _ => return State::Close,
        };
        match protocol::parse_lobby_selection(&line, &name) {
            LobbySelectionLine::KeepAlive(KeepAlive::Ping) => {
                send(ctx, handle, &protocol::line_pong()).await;
            }
            LobbySelectionLine::KeepAlive(KeepAlive::Pong) => {}
            LobbySelectionLine::Refresh => {
                send_snapshot(ctx, handle).await;
            }
            LobbySelectionLine::Join(lobby_num) => {
                if lobby_num == 0 || lobby_num > ctx.lobbies.count() {
                    send(ctx, handle, &protocol::line_wrong(None)).await;
                    continue;
                }
                let lobby = ctx.lobbies.get(lobby_num).expect("validated range");
                match lobby.try_add_player(&name).await {
                    Ok(()) => {
                        lobby.attach_transport(&name, handle).await;
                        send(ctx, handle, &protocol::line_ok()).await;
                        let started = lobby.start_if_ready().await;
                        maybe_start_match(ctx, &lobby, started);
                        return State::WaitForStart { name, token, lobby: lobby_num };
                    }
                    Err(_) => {
                        send(ctx, handle, &protocol::line_wrong(None)).await;
                    }
                }
            }
            LobbySelectionLine::Malformed => {
                send(ctx, handle, &protocol::line_wrong(None)).await;
                return State::Close;
            }
        }
    }
}

// S5.
async fn wait_for_start(handle: u64, ctx: &Ctx, name: String, token: u64, lobby_num: u32) -> State {
    let Some(lobby) = ctx.lobbies.get(lobby_num) else {
        return State::Close;
    };
    loop {
        if lobby.is_running().await {
            return State::InMatch { name, token, lobby: lobby_num };
        }
        if !ctx.connections.is_readable_now(handle).await {
            sleep(LOBBY_POLL_INTERVAL).await;
            continue;
        }
        let outcome = ctx.connections.read_line(handle, MAX_LINE).await;
        match outcome {
            Some(ReadOutcome::Line(line)) => match protocol::parse_idle(&line, false) {
                IdleLine::KeepAlive(KeepAlive::Ping) => {
                    send(ctx, handle, &protocol::line_pong()).await;
                }
                IdleLine::KeepAlive(KeepAlive::Pong) => {}
                IdleLine::Back => {
                    lobby.remove_seated(&name).await;
                    send_snapshot(ctx, handle).await;
                    return State::LobbySelection { name, token };
                }
                _ => {
                    send(ctx, handle, &protocol::line_wrong(None)).await;
                    lobby.remove_seated(&name).await;
                    return State::Close;
                }
            },
            _ => {
                lobby.remove_seated(&name).await;
                return State::Close;
            }
        }
    }
}

// S6: the match task owns wire I/O; we only poll lobby membership.
async fn in_match(ctx: &Ctx, name: String, token: u64, lobby_num: u32) -> State {
    let Some(lobby) = ctx.lobbies.get(lobby_num) else {
        return State::Close;
    };
    loop {
        if !lobby.is_running().await {
            return State::PostMatch { name, token, lobby: lobby_num };
        }
        sleep(LOBBY_POLL_INTERVAL).await;
    }
}

// S7.
async fn post_match(handle: u64, ctx: &Ctx, name: String, token: u64, lobby_num: u32) -> State {
    if ctx.identity.take_back(&name, handle).await {
        send_snapshot(ctx, handle).await;
        return State::LobbySelection { name, token };
    }
    let _ = lobby_num;
    loop {
        let outcome = ctx.connections.read_line(handle, MAX_LINE).await;
        let line = match outcome {
            Some(ReadOutcome::Line(l)) => l,
            _ => return State::Close,
        };
        match protocol::parse_idle(&line, true) {
            IdleLine::KeepAlive(KeepAlive::Ping) => {
                send(ctx, handle, &protocol::line_pong()).await;
            }
            IdleLine::KeepAlive(KeepAlive::Pong) => {}
            IdleLine::Back => {
                send_snapshot(ctx, handle).await;
                return State::LobbySelection { name, token };
            }
            IdleLine::StaleGame => {}
            IdleLine::Malformed => {
                send(ctx, handle, &protocol::line_wrong(None)).await;
                return State::Close;
            }
        }
    }
}
