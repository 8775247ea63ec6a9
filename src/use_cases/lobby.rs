// C4 (part 1): per-lobby state and admission. The match task itself lives
// in `use_cases::match_engine`; this module owns the fixed lobby array,
// slot admission, and the `running` gate that hands a ready lobby off to
// the match engine (spec.md §4.4).

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::card::Deck;
use crate::domain::slot::{DETACHED, PlayerSlot};

#[derive(Debug)]
pub enum LobbyError {
    Full,
    InvalidIndex,
}

impl fmt::Display for LobbyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LobbyError::Full => write!(f, "lobby full"),
            LobbyError::InvalidIndex => write!(f, "invalid lobby index"),
        }
    }
}

impl std::error::Error for LobbyError {}

pub struct LobbyState {
    pub slots: [PlayerSlot; 2],
    pub running: bool,
    pub deck: Deck,
}

/// A single two-seat lobby. The mutex guards every slot field and
/// `running` (spec.md §4.4 "State").
pub struct Lobby {
    pub index: u32,
    state: Mutex<LobbyState>,
}

impl Lobby {
    fn new(index: u32) -> Self {
        Lobby {
            index,
            state: Mutex::new(LobbyState {
                slots: [PlayerSlot::empty(), PlayerSlot::empty()],
                running: false,
                deck: Deck::new_shuffled(),
            }),
        }
    }

    pub async fn snapshot(&self) -> (u8, bool) {
        let state = self.state.lock().await;
        let occupancy = state.slots.iter().filter(|s| s.connected).count() as u8;
        (occupancy, state.running)
    }

    /// Places `name` into the first empty slot (spec.md §4.4 "Admission").
    pub async fn try_add_player(&self, name: &str) -> Result<(), LobbyError> {
        let mut state = self.state.lock().await;
        let slot = state
            .slots
            .iter_mut()
            .find(|s| s.is_empty())
            .ok_or(LobbyError::Full)?;
        slot.name = Some(name.to_string());
        slot.connected = true;
        slot.hand.clear();
        Ok(())
    }

    /// Attaches a transport handle to the named slot, used both on first
    /// join and on reconnect resumption.
    pub async fn attach_transport(&self, name: &str, handle: u64) -> bool {
        let mut state = self.state.lock().await;
        for slot in state.slots.iter_mut() {
            if slot.name.as_deref() == Some(name) {
                slot.transport = handle;
                slot.connected = true;
                return true;
            }
        }
        false
    }

    pub async fn detach_transport_if_matches(&self, name: &str, handle: u64) {
        let mut state = self.state.lock().await;
        for slot in state.slots.iter_mut() {
            if slot.name.as_deref() == Some(name) && slot.transport == handle {
                slot.transport = DETACHED;
                slot.connected = false;
            }
        }
    }

    /// Removes `name` from its seated slot iff it is not currently part of
    /// a running match (guarded by the caller only invoking this from
    /// lobby-selection/waiting states, never mid-match).
    pub async fn remove_seated(&self, name: &str) {
        let mut state = self.state.lock().await;
        if state.running {
            debug!(lobby = self.index, name, "ignored remove_seated while running");
            return;
        }
        for slot in state.slots.iter_mut() {
            if slot.name.as_deref() == Some(name) {
                slot.clear();
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    pub async fn occupancy(&self) -> usize {
        self.state.lock().await.slots.iter().filter(|s| s.connected).count()
    }

    pub async fn seated_name(&self, name: &str) -> bool {
        self.state
            .lock()
            .await
            .slots
            .iter()
            .any(|s| s.name.as_deref() == Some(name))
    }

    /// Returns the transport handle for `name` if seated, for reconnect
    /// resumption into a running match.
    pub async fn transport_of(&self, name: &str) -> Option<u64> {
        self.state
            .lock()
            .await
            .slots
            .iter()
            .find(|s| s.name.as_deref() == Some(name))
            .map(|s| s.transport)
    }

    /// Atomically flips `running` to true iff both seats are occupied and
    /// it is not already running. Returns true exactly once per match,
    /// across any number of concurrent callers (spec.md §4.4 "idempotent").
    pub async fn start_if_ready(&self) -> bool {
        let mut state = self.state.lock().await;
        if !state.running && state.slots.iter().filter(|s| s.connected).count() == 2 {
            state.running = true;
            true
        } else {
            false
        }
    }

    pub(crate) fn state_mutex(&self) -> &Mutex<LobbyState> {
        &self.state
    }
}

/// Fixed-size array of lobbies, sized at startup (spec.md §6 `LOBBY_COUNT`).
pub struct LobbyRegistry {
    lobbies: Vec<Arc<Lobby>>,
}

impl LobbyRegistry {
    pub fn new(lobby_count: u32) -> Self {
        let lobbies = (1..=lobby_count).map(Lobby::new).map(Arc::new).collect();
        LobbyRegistry { lobbies }
    }

    pub fn count(&self) -> u32 {
        self.lobbies.len() as u32
    }

    /// 1-based lobby lookup.
    pub fn get(&self, index: u32) -> Option<Arc<Lobby>> {
        if index == 0 {
            return None;
        }
        self.lobbies.get((index - 1) as usize).cloned()
    }

    pub async fn snapshot(&self) -> Vec<(u8, bool)> {
        let mut out = Vec::with_capacity(self.lobbies.len());
        for lobby in &self.lobbies {
            out.push(lobby.snapshot().await);
        }
        out
    }

    /// Scans every lobby for a seated `name`, returning the lobby index and
    /// whether it is currently running. Used by reconnect (`C45REC … 0`)
    /// and fresh-login collision checks (spec.md §4.5 S2/S3).
    pub async fn find_seated(&self, name: &str) -> Option<(u32, bool)> {
        for lobby in &self.lobbies {
            if lobby.seated_name(name).await {
                return Some((lobby.index, lobby.is_running().await));
            }
        }
        None
    }
}
