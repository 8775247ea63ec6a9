// Per-seat state inside a lobby (spec.md §3 "Player Slot").

use crate::domain::hand::Hand;

/// Sentinel transport handle meaning "no transport attached".
pub const DETACHED: u64 = u64::MAX;

#[derive(Debug, Clone)]
pub struct PlayerSlot {
    pub name: Option<String>,
    pub hand: Hand,
    pub connected: bool,
    /// Connection-set id of the attached transport, or `DETACHED`.
    pub transport: u64,
    pub stood: bool,
    pub busted: bool,
}

impl PlayerSlot {
    pub fn empty() -> Self {
        PlayerSlot {
            name: None,
            hand: Hand::new(),
            connected: false,
            transport: DETACHED,
            stood: false,
            busted: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
    }

    pub fn reset_for_deal(&mut self) {
        self.hand.clear();
        self.stood = false;
        self.busted = false;
    }

    pub fn clear(&mut self) {
        *self = PlayerSlot::empty();
    }

    pub fn is_done(&self) -> bool {
        self.stood || self.busted
    }
}
