// C4 (part 2): the match task. One task per running lobby, spawned by
// `Lobby::start_if_ready`. Owns all game-phase I/O to both players'
// transports until the match ends (spec.md §4.4).
//
// The task talks directly to the connection set and identity registry
// rather than through a narrower port: the teacher's own use-case layer
// (`use_cases::lobby::LobbyRegistry`) holds concrete `axum`/`tokio::sync`
// channel types the same way, so this keeps the same texture rather than
// introducing an abstraction the spec never asked for.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, info_span, Instrument};

use crate::domain::slot::DETACHED;
use crate::interface_adapters::net::connections::ConnectionRegistry;
use crate::interface_adapters::net::transport::ReadOutcome;
use crate::interface_adapters::protocol::{
    self, ActiveTurnLine, KeepAlive, NonActiveLine,
};
use crate::use_cases::identity::IdentityRegistry;
use crate::use_cases::lobby::Lobby;
use crate::use_cases::types::{PING_INTERVAL, PONG_GRACE, RECONNECT_WINDOW, TURN_TIMEOUT};

/// How the turn loop left off, driving which phase runs next.
enum TurnExit {
    BothDone,
    /// `slot` disconnected while `active` was the player whose turn it was;
    /// on resume, turns must continue with `active`, not necessarily `slot`
    /// (spec.md §4.4: a disconnect never skips the other player's turn).
    Disconnect { slot: usize, active: usize },
    Resolution { forced_winner: Option<usize> },
}

pub async fn run_match(
    lobby: Arc<Lobby>,
    connections: Arc<ConnectionRegistry>,
    identity: Arc<IdentityRegistry>,
) {
    let span = info_span!("match", lobby = lobby.index);
    async move {
        deal(&lobby, &connections).await;

        let mut exit = run_turns(&lobby, &connections, &identity, 0).await;
        let forced_winner = loop {
            match exit {
                TurnExit::BothDone => break None,
                TurnExit::Resolution { forced_winner } => break forced_winner,
                TurnExit::Disconnect { slot, active } => {
                    match handle_disconnect(&lobby, &connections, &identity, slot, active).await {
                        DisconnectOutcome::ForcedWin(winner) => break Some(winner),
                        DisconnectOutcome::Abandoned => return,
                        DisconnectOutcome::Resumed { active } => {
                            exit = run_turns(&lobby, &connections, &identity, active).await;
                        }
                    }
                }
            }
        };

        resolve(&lobby, &connections, forced_winner).await;
    }
    .instrument(span)
    .await;
}

/// Drives turns starting from `active` until the match finishes, a
/// disconnect interrupts it, or a mid-turn protocol event forces a
/// resolution (spec.md §4.4 "turn loop").
async fn run_turns(
    lobby: &Lobby,
    connections: &ConnectionRegistry,
    identity: &IdentityRegistry,
    mut active: usize,
) -> TurnExit {
    loop {
        match run_turn(lobby, connections, identity, active).await {
            TurnAdvance::Continue(next) => active = next,
            TurnAdvance::Exit(exit) => return exit,
        }
    }
}

async fn deal(lobby: &Lobby, connections: &ConnectionRegistry) {
    let (names, transports, hands) = {
        let mut state = lobby.state_mutex().lock().await;
        state.deck.shuffle();
        let mut names = [String::new(), String::new()];
        let mut transports = [DETACHED; 2];
        let hands = [
            [state.deck.draw(), state.deck.draw()],
            [state.deck.draw(), state.deck.draw()],
        ];
        for (i, slot) in state.slots.iter_mut().enumerate() {
            slot.reset_for_deal();
            slot.hand.push(hands[i][0]);
            slot.hand.push(hands[i][1]);
            names[i] = slot.name.clone().unwrap_or_default();
            transports[i] = slot.transport;
        }
        (names, transports, hands)
    };

    for i in 0..2 {
        if transports[i] != DETACHED {
            connections
                .write_line(transports[i], &protocol::line_deal(hands[i][0], hands[i][1]))
                .await;
        }
    }
    info!(p1 = %names[0], p2 = %names[1], "match dealt");
}

enum TurnAdvance {
    Continue(usize),
    Exit(TurnExit),
}

async fn run_turn(
    lobby: &Lobby,
    connections: &ConnectionRegistry,
    identity: &IdentityRegistry,
    active: usize,
) -> TurnAdvance {
    let other = 1 - active;

    let (both_done, active_done, active_name, other_name, active_transport, other_transport) = {
        let state = lobby.state_mutex().lock().await;
        (
            state.slots[0].is_done() && state.slots[1].is_done(),
            state.slots[active].is_done(),
            state.slots[active].name.clone().unwrap_or_default(),
            state.slots[other].name.clone().unwrap_or_default(),
            state.slots[active].transport,
            state.slots[other].transport,
        )
    };

    if both_done {
        return TurnAdvance::Exit(TurnExit::BothDone);
    }
    if active_done {
        return TurnAdvance::Continue(other);
    }

    let turn_secs = TURN_TIMEOUT.as_secs();
    let turn_line = protocol::line_turn(&active_name, turn_secs);
    if active_transport != DETACHED {
        connections.write_line(active_transport, &turn_line).await;
    }
    if other_transport != DETACHED {
        connections.write_line(other_transport, &turn_line).await;
    }

    let deadline = Instant::now() + TURN_TIMEOUT;
    let mut active_alive = true;
    let mut last_liveness = Instant::now();
    let mut last_ping = Instant::now();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            if active_alive {
                if active_transport != DETACHED {
                    connections
                        .write_line(active_transport, &protocol::line_timeout())
                        .await;
                }
                lobby.state_mutex().lock().await.slots[active].stood = true;
                return TurnAdvance::Continue(other);
            }
            return TurnAdvance::Exit(TurnExit::Disconnect { slot: active, active });
        }

        // Non-active readiness probe (spec.md §4.4 turn loop, second bullet).
        if other_transport != DETACHED && connections.is_readable_now(other_transport).await {
            match connections
                .read_line(other_transport, crate::interface_adapters::net::transport::MAX_LINE)
                .await
            {
                Some(ReadOutcome::Line(line)) => match protocol::parse_non_active(&line) {
                    NonActiveLine::KeepAlive(KeepAlive::Ping) => {
                        connections
                            .write_line(other_transport, &protocol::line_pong())
                            .await;
                    }
                    NonActiveLine::KeepAlive(KeepAlive::Pong) => {}
                    NonActiveLine::Back => {
                        identity.mark_back(&other_name, other_transport).await;
                        lobby.detach_transport_if_matches(&other_name, other_transport).await;
                        return TurnAdvance::Exit(TurnExit::Resolution {
                            forced_winner: Some(active),
                        });
                    }
                    NonActiveLine::Other => {
                        connections.close(other_transport).await;
                        lobby.detach_transport_if_matches(&other_name, other_transport).await;
                        return TurnAdvance::Exit(TurnExit::Resolution {
                            forced_winner: Some(active),
                        });
                    }
                },
                Some(ReadOutcome::Eof) | None => {
                    return TurnAdvance::Exit(TurnExit::Disconnect { slot: other, active });
                }
                Some(ReadOutcome::Timeout) => {}
            }
        }

        if active_transport != DETACHED && last_ping.elapsed() >= PING_INTERVAL {
            connections
                .write_line(active_transport, &protocol::line_ping())
                .await;
            last_ping = Instant::now();
        }
        if active_alive && last_liveness.elapsed() > PONG_GRACE {
            active_alive = false;
        }

        if active_transport == DETACHED {
            return TurnAdvance::Exit(TurnExit::Disconnect { slot: active, active });
        }

        let chunk = remaining.as_secs().min(1).max(1);
        match connections
            .read_line_timeout(active_transport, crate::interface_adapters::net::transport::MAX_LINE, chunk)
            .await
        {
            Some(ReadOutcome::Line(line)) => {
                last_liveness = Instant::now();
                active_alive = true;
                match protocol::parse_active_turn(&line) {
                    ActiveTurnLine::KeepAlive(KeepAlive::Ping) => {
                        connections
                            .write_line(active_transport, &protocol::line_pong())
                            .await;
                    }
                    ActiveTurnLine::KeepAlive(KeepAlive::Pong) => {}
                    ActiveTurnLine::Back => {
                        identity.mark_back(&active_name, active_transport).await;
                        lobby.detach_transport_if_matches(&active_name, active_transport).await;
                        return TurnAdvance::Exit(TurnExit::Resolution {
                            forced_winner: Some(other),
                        });
                    }
                    ActiveTurnLine::Hit => {
                        let (card, busted, value) = {
                            let mut state = lobby.state_mutex().lock().await;
                            let card = state.deck.draw();
                            state.slots[active].hand.push(card);
                            let busted = state.slots[active].hand.is_bust();
                            state.slots[active].busted = busted;
                            (card, busted, state.slots[active].hand.value())
                        };
                        connections
                            .write_line(active_transport, &protocol::line_card(card))
                            .await;
                        if busted {
                            connections
                                .write_line(
                                    active_transport,
                                    &protocol::line_bust(&active_name, value as i32),
                                )
                                .await;
                        }
                        return TurnAdvance::Continue(other);
                    }
                    ActiveTurnLine::Stand => {
                        lobby.state_mutex().lock().await.slots[active].stood = true;
                        return TurnAdvance::Continue(other);
                    }
                    ActiveTurnLine::Malformed => {
                        connections.close(active_transport).await;
                        lobby.detach_transport_if_matches(&active_name, active_transport).await;
                        return TurnAdvance::Exit(TurnExit::Resolution {
                            forced_winner: Some(other),
                        });
                    }
                }
            }
            Some(ReadOutcome::Timeout) => {}
            Some(ReadOutcome::Eof) | None => {
                return TurnAdvance::Exit(TurnExit::Disconnect { slot: active });
            }
        }
    }
}

/// Outcome of the bounded reconnect window opened on a mid-match
/// disconnect (spec.md §4.4 "Disconnect handling").
enum DisconnectOutcome {
    /// The detached player reattached in time; resume turns from whichever
    /// slot was active when the disconnect fired (not necessarily the
    /// slot that just reattached).
    Resumed { active: usize },
    /// The window expired with the detached player still gone: forced win
    /// for the named slot.
    ForcedWin(usize),
    /// The survivor also became unresponsive or asked to leave: match ends
    /// with no result.
    Abandoned,
}

/// Runs the bounded reconnect window for a mid-match disconnect.
async fn handle_disconnect(
    lobby: &Lobby,
    connections: &ConnectionRegistry,
    identity: &IdentityRegistry,
    detached_slot: usize,
    active_at_disconnect: usize,
) -> DisconnectOutcome {
    let survivor = 1 - detached_slot;
    let (detached_name, survivor_name, mut survivor_transport) = {
        let mut state = lobby.state_mutex().lock().await;
        let detached_name = state.slots[detached_slot].name.clone().unwrap_or_default();
        connections.remove(state.slots[detached_slot].transport).await;
        state.slots[detached_slot].transport = DETACHED;
        state.slots[detached_slot].connected = false;
        let survivor_name = state.slots[survivor].name.clone().unwrap_or_default();
        (detached_name, survivor_name, state.slots[survivor].transport)
    };

    if survivor_transport != DETACHED {
        connections
            .write_line(
                survivor_transport,
                &protocol::line_opp_down(&detached_name, RECONNECT_WINDOW.as_secs()),
            )
            .await;
    }

    let deadline = Instant::now() + RECONNECT_WINDOW;
    let mut survivor_alive = true;
    let mut last_liveness = Instant::now();
    let mut last_ping = Instant::now();

    loop {
        if survivor_transport == DETACHED {
            return DisconnectOutcome::Abandoned;
        }

        let current_transport = lobby.transport_of(&detached_name).await.unwrap_or(DETACHED);
        if current_transport != DETACHED {
            resume_reattached(lobby, connections, detached_slot, current_transport).await;
            connections
                .write_line(
                    survivor_transport,
                    &protocol::line_opp_back(&detached_name),
                )
                .await;
            return DisconnectOutcome::Resumed { active: active_at_disconnect };
        }

        if Instant::now() >= deadline {
            return DisconnectOutcome::ForcedWin(survivor);
        }

        if last_ping.elapsed() >= PING_INTERVAL {
            connections.write_line(survivor_transport, &protocol::line_ping()).await;
            last_ping = Instant::now();
        }
        if survivor_alive && last_liveness.elapsed() > PONG_GRACE {
            survivor_alive = false;
        }
        if !survivor_alive {
            return DisconnectOutcome::Abandoned;
        }

        match connections
            .read_line_timeout(survivor_transport, crate::interface_adapters::net::transport::MAX_LINE, 1)
            .await
        {
            Some(ReadOutcome::Line(line)) => {
                last_liveness = Instant::now();
                match protocol::parse_idle(&line, false) {
                    protocol::IdleLine::KeepAlive(KeepAlive::Ping) => {
                        connections.write_line(survivor_transport, &protocol::line_pong()).await;
                    }
                    protocol::IdleLine::KeepAlive(KeepAlive::Pong) => {}
                    protocol::IdleLine::Back => {
                        identity.mark_back(&survivor_name, survivor_transport).await;
                        lobby.detach_transport_if_matches(&survivor_name, survivor_transport).await;
                        return DisconnectOutcome::Abandoned;
                    }
                    _ => {}
                }
            }
            Some(ReadOutcome::Timeout) => {}
            Some(ReadOutcome::Eof) | None => {
                survivor_transport = DETACHED;
            }
        }
    }
}

async fn resume_reattached(
    lobby: &Lobby,
    connections: &ConnectionRegistry,
    slot: usize,
    transport: u64,
) {
    let cards = {
        let state = lobby.state_mutex().lock().await;
        state.slots[slot].hand.cards().to_vec()
    };
    if let Some((&first, &second)) = cards.first().zip(cards.get(1)) {
        connections
            .write_line(transport, &protocol::line_deal(first, second))
            .await;
        for &card in &cards[2..] {
            connections.write_line(transport, &protocol::line_card(card)).await;
        }
    }
}

async fn resolve(lobby: &Lobby, connections: &ConnectionRegistry, forced_winner: Option<usize>) {
    let (names, values, transports) = {
        let state = lobby.state_mutex().lock().await;
        let mut names = [String::new(), String::new()];
        let mut values = [0i32, 0i32];
        let mut transports = [DETACHED; 2];
        for i in 0..2 {
            names[i] = state.slots[i].name.clone().unwrap_or_default();
            values[i] = if state.slots[i].busted {
                -1
            } else {
                state.slots[i].hand.value() as i32
            };
            transports[i] = state.slots[i].transport;
        }
        (names, values, transports)
    };

    let winner = if let Some(slot) = forced_winner {
        names[slot].clone()
    } else if values[0] != values[1] {
        if values[0] > values[1] { names[0].clone() } else { names[1].clone() }
    } else {
        "PUSH".to_string()
    };

    let line = protocol::line_result(&names[0], values[0], &names[1], values[1], &winner);
    for &t in &transports {
        if t != DETACHED {
            connections.write_line(t, &line).await;
        }
    }

    let mut state = lobby.state_mutex().lock().await;
    state.running = false;
    state.slots[0].clear();
    state.slots[1].clear();
    info!(winner = %winner, "match resolved");
}
