mod support;

use std::time::Duration;

use support::{ensure_server, Client};

fn join(addr: &str, name: &str, lobby: u32) -> Client {
    let mut client = Client::connect(addr);
    client.send(&format!("C45{name}"));
    assert_eq!(client.recv_default(), "C45OK");
    let _ = client.recv_default();
    client.send(&format!("C45J {lobby}"));
    assert_eq!(client.recv_default(), "C45OK");
    client
}

fn read_until_deal(client: &mut Client) -> String {
    client.recv_line(Duration::from_secs(10))
}

// S-2 shape, then both players stand: verify a result line names both
// players and a winner token.
#[test]
fn both_stand_resolves_with_a_result_line() {
    let addr = ensure_server();
    let mut alice = join(addr, "alice-mp1", 3);
    let mut bob = join(addr, "bob-mp1", 3);

    let deal_a = read_until_deal(&mut alice);
    assert!(deal_a.starts_with("C45D "), "unexpected: {deal_a}");
    let _deal_b = read_until_deal(&mut bob);

    let turn_a = alice.recv_line(Duration::from_secs(10));
    let turn_b = bob.recv_line(Duration::from_secs(10));
    assert_eq!(turn_a, turn_b);

    // Whichever player is actually active, both players send STAND; a
    // STAND by the non-active player prior to their turn is just ignored
    // by the probe (NonActiveLine::Other would end the match early, so
    // only stand once it's actually each one's turn is unsafe to assume
    // in this harness) — instead drive by waiting for a C45T naming each
    // player before standing.
    let active_first = turn_a.split_whitespace().nth(1).unwrap().to_string();
    let (first, second) = if active_first == "alice-mp1" {
        (&mut alice, &mut bob)
    } else {
        (&mut bob, &mut alice)
    };
    first.send("C45S");
    let turn2 = second.recv_line(Duration::from_secs(10));
    assert!(turn2.starts_with("C45T "), "unexpected: {turn2}");
    second.send("C45S");

    let result_first = first.recv_line(Duration::from_secs(10));
    assert!(result_first.starts_with("C45R "), "unexpected: {result_first}");
    assert!(result_first.contains("WINNER"));
}

// S-6: protocol violation from the non-active peer forces a win for the
// active player.
#[test]
fn garbage_from_non_active_peer_forces_a_win() {
    let addr = ensure_server();
    let mut alice = join(addr, "alice-mp2", 4);
    let mut bob = join(addr, "bob-mp2", 4);

    let _ = read_until_deal(&mut alice);
    let _ = read_until_deal(&mut bob);
    let turn_a = alice.recv_line(Duration::from_secs(10));
    let turn_b = bob.recv_line(Duration::from_secs(10));
    assert_eq!(turn_a, turn_b);

    let active_name = turn_a.split_whitespace().nth(1).unwrap().to_string();
    let (active, non_active, non_active_name) = if active_name == "alice-mp2" {
        (&mut alice, &mut bob, "bob-mp2")
    } else {
        (&mut bob, &mut alice, "alice-mp2")
    };

    non_active.send("C45GARBAGE");

    let result = active.recv_line(Duration::from_secs(10));
    assert!(result.starts_with("C45R "), "unexpected: {result}");
    assert!(result.contains(&format!("WINNER {active_name}")));
    let _ = non_active_name;
}

// S-4/S-5 shape: a mid-wait "back to lobby" request returns the session
// to lobby selection instead of joining a match.
#[test]
fn back_to_lobby_while_waiting_returns_a_snapshot() {
    let addr = ensure_server();
    let mut alice = Client::connect(addr);
    alice.send("C45alice-mp3");
    assert_eq!(alice.recv_default(), "C45OK");
    let _ = alice.recv_default();
    alice.send("C45J 1");
    assert_eq!(alice.recv_default(), "C45OK");

    // Solo in the lobby: still in wait-for-start. Ask to go back.
    alice.send("C45B");
    let snapshot = alice.recv_line(Duration::from_secs(10));
    assert!(snapshot.starts_with("C45L "), "unexpected: {snapshot}");
}

// S-4: the non-active peer's transport closes mid-turn; once it
// reconnects, play must resume with the player who was never interrupted
// still active (a disconnect must never hand the turn to the player who
// reconnected).
#[test]
fn disconnected_non_active_player_resumes_without_skipping_turn() {
    let addr = ensure_server();
    let mut alice = join(addr, "alice-mp5", 5);
    let mut bob = join(addr, "bob-mp5", 5);

    let _ = read_until_deal(&mut alice);
    let _ = read_until_deal(&mut bob);
    let turn_a = alice.recv_line(Duration::from_secs(10));
    let turn_b = bob.recv_line(Duration::from_secs(10));
    assert_eq!(turn_a, turn_b);

    let active_name = turn_a.split_whitespace().nth(1).unwrap().to_string();
    let (active, non_active, non_active_name) = if active_name == "alice-mp5" {
        (&mut alice, &mut bob, "bob-mp5")
    } else {
        (&mut bob, &mut alice, "alice-mp5")
    };

    // Disconnect the non-active peer mid-turn, well before the active
    // player has acted.
    non_active.close();

    // The survivor (still active) sees an opponent-down notice.
    let opp_down = active.recv_line(Duration::from_secs(10));
    assert!(opp_down.starts_with("C45OD "), "unexpected: {opp_down}");

    // The detached peer reconnects.
    let mut rejoined = Client::connect(addr);
    rejoined.send(&format!("C45REC {non_active_name} 5"));
    assert_eq!(rejoined.recv_default(), "C45REC_OK");

    let opp_back = active.recv_line(Duration::from_secs(10));
    assert!(opp_back.starts_with("C45OB "), "unexpected: {opp_back}");

    // The next turn line must still name the player whose turn it already
    // was, not whoever just reconnected.
    let next_turn = active.recv_line(Duration::from_secs(10));
    assert!(
        next_turn.starts_with(&format!("C45T {active_name} ")),
        "unexpected: {next_turn}"
    );
}

// Reconnect handshake against a name that isn't seated anywhere falls
// back to a fresh login rather than erroring.
#[test]
fn reconnect_with_unknown_name_behaves_like_fresh_login() {
    let addr = ensure_server();
    let mut client = Client::connect(addr);
    client.send("C45REC ghost-mp4 0");
    assert_eq!(client.recv_default(), "C45OK");
    let snapshot = client.recv_default();
    assert!(snapshot.starts_with("C45L "), "unexpected: {snapshot}");
}
