mod support;

use std::time::Duration;

use support::{ensure_server, Client};

// S-1: handshake success.
#[test]
fn handshake_success_yields_ok_then_snapshot() {
    let addr = ensure_server();
    let mut client = Client::connect(addr);
    client.send("C45alice-h1");
    assert_eq!(client.recv_default(), "C45OK");
    let snapshot = client.recv_default();
    assert!(snapshot.starts_with("C45L "), "unexpected: {snapshot}");
}

#[test]
fn duplicate_name_is_rejected() {
    let addr = ensure_server();
    let mut first = Client::connect(addr);
    first.send("C45dupe-h1");
    assert_eq!(first.recv_default(), "C45OK");
    let _ = first.recv_default();

    let mut second = Client::connect(addr);
    second.send("C45dupe-h1");
    assert_eq!(second.recv_default(), "C45WRONG NAME_TAKEN");
}

#[test]
fn invalid_name_with_whitespace_is_rejected() {
    let addr = ensure_server();
    let mut client = Client::connect(addr);
    client.send("C45has space");
    let line = client.recv_default();
    assert!(line.starts_with("C45WRONG"), "unexpected: {line}");
}

#[test]
fn join_out_of_range_lobby_keeps_session_alive() {
    let addr = ensure_server();
    let mut client = Client::connect(addr);
    client.send("C45ranger-h1");
    assert_eq!(client.recv_default(), "C45OK");
    let _ = client.recv_default();

    client.send("C45J 999");
    assert_eq!(client.recv_default(), "C45WRONG");

    // Session must still be alive: a valid join now succeeds.
    client.send("C45J 1");
    assert_eq!(client.recv_default(), "C45OK");
}

// S-2: join and wait, opponent arrives.
#[test]
fn two_players_joining_same_lobby_trigger_deal_and_first_turn() {
    let addr = ensure_server();
    let mut alice = Client::connect(addr);
    alice.send("C45alice-s2");
    assert_eq!(alice.recv_default(), "C45OK");
    let _ = alice.recv_default();
    alice.send("C45J 2");
    assert_eq!(alice.recv_default(), "C45OK");

    let mut bob = Client::connect(addr);
    bob.send("C45bob-s2");
    assert_eq!(bob.recv_default(), "C45OK");
    let _ = bob.recv_default();
    bob.send("C45J 2");
    assert_eq!(bob.recv_default(), "C45OK");

    let deal_a = alice.recv_line(Duration::from_secs(5));
    assert!(deal_a.starts_with("C45D "), "unexpected: {deal_a}");
    let deal_b = bob.recv_line(Duration::from_secs(5));
    assert!(deal_b.starts_with("C45D "), "unexpected: {deal_b}");

    let turn_a = alice.recv_line(Duration::from_secs(5));
    let turn_b = bob.recv_line(Duration::from_secs(5));
    assert!(turn_a.starts_with("C45T alice-s2 "), "unexpected: {turn_a}");
    assert_eq!(turn_a, turn_b);
}
