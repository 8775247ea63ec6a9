// Domain-level card and deck types.

use crate::interface_adapters::utils::rng::rand_id;

/// A card rank, 1 (Ace) through 13 (King).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rank(pub u8);

impl Rank {
    pub const ACE: Rank = Rank(1);

    /// Letter used on the wire: A,2..9,T,J,Q,K.
    pub fn letter(self) -> char {
        match self.0 {
            1 => 'A',
            2..=9 => (b'0' + self.0) as char,
            10 => 'T',
            11 => 'J',
            12 => 'Q',
            13 => 'K',
            _ => unreachable!("rank out of range"),
        }
    }

    pub fn from_letter(c: char) -> Option<Rank> {
        match c {
            'A' => Some(Rank(1)),
            '2'..='9' => Some(Rank(c as u8 - b'0')),
            'T' => Some(Rank(10)),
            'J' => Some(Rank(11)),
            'Q' => Some(Rank(12)),
            'K' => Some(Rank(13)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suit {
    Clubs,
    Diamonds,
    Hearts,
    Spades,
}

impl Suit {
    pub fn letter(self) -> char {
        match self {
            Suit::Clubs => 'C',
            Suit::Diamonds => 'D',
            Suit::Hearts => 'H',
            Suit::Spades => 'S',
        }
    }

    pub fn from_letter(c: char) -> Option<Suit> {
        match c {
            'C' => Some(Suit::Clubs),
            'D' => Some(Suit::Diamonds),
            'H' => Some(Suit::Hearts),
            'S' => Some(Suit::Spades),
            _ => None,
        }
    }

    const ALL: [Suit; 4] = [Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    /// Two-character wire form, e.g. "AS", "TD".
    pub fn to_wire(self) -> String {
        let mut s = String::with_capacity(2);
        s.push(self.rank.letter());
        s.push(self.suit.letter());
        s
    }

    pub fn from_wire(s: &str) -> Option<Card> {
        let mut chars = s.chars();
        let rank = Rank::from_letter(chars.next()?)?;
        let suit = Suit::from_letter(chars.next()?)?;
        if chars.next().is_some() {
            return None;
        }
        Some(Card { rank, suit })
    }

    /// Blackjack value contribution before ace demotion: face cards are 10,
    /// aces start at 11.
    pub fn base_value(self) -> u32 {
        match self.rank.0 {
            1 => 11,
            10..=13 => 10,
            n => n as u32,
        }
    }

    pub fn is_ace(self) -> bool {
        self.rank.0 == 1
    }
}

/// A small, dependency-free PRNG seeded from the process-unique id
/// counter. Deck shuffling does not need cryptographic randomness; this
/// keeps the dependency surface aligned with the teacher's stack, which
/// never pulls in `rand`.
struct Xorshift64(u64);

impl Xorshift64 {
    fn new(seed: u64) -> Self {
        // Xorshift requires a nonzero seed.
        Xorshift64(if seed == 0 { 0x9e3779b97f4a7c15 } else { seed })
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Uniform index in [0, bound) via rejection-free modulo (fine for a
    /// 52-card deck; bias is negligible at this scale).
    fn below(&mut self, bound: usize) -> usize {
        (self.next() % bound as u64) as usize
    }
}

/// Ordered sequence of 52 distinct cards with a draw cursor. Invariant:
/// `cursor` is in `[0, 52]`; drawing at `cursor == 52` reshuffles and resets
/// the cursor to 0 (spec.md §3, §9: "draw never fails").
#[derive(Debug, Clone)]
pub struct Deck {
    cards: Vec<Card>,
    cursor: usize,
}

impl Deck {
    /// Builds a freshly shuffled 52-card deck.
    pub fn new_shuffled() -> Self {
        let mut deck = Deck {
            cards: Self::ordered(),
            cursor: 0,
        };
        deck.shuffle();
        deck
    }

    fn ordered() -> Vec<Card> {
        let mut cards = Vec::with_capacity(52);
        for &suit in &Suit::ALL {
            for rank in 1..=13u8 {
                cards.push(Card {
                    rank: Rank(rank),
                    suit,
                });
            }
        }
        cards
    }

    /// Fisher-Yates shuffle, reseeded on every call.
    pub fn shuffle(&mut self) {
        self.cards = Self::ordered();
        self.cursor = 0;
        let mut rng = Xorshift64::new(rand_id());
        for i in (1..self.cards.len()).rev() {
            let j = rng.below(i + 1);
            self.cards.swap(i, j);
        }
    }

    /// Draws the next card, reshuffling first if the deck is exhausted.
    pub fn draw(&mut self) -> Card {
        if self.cursor >= self.cards.len() {
            self.shuffle();
        }
        let card = self.cards[self.cursor];
        self.cursor += 1;
        card
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_wire_round_trip() {
        for &suit in &Suit::ALL {
            for rank in 1..=13u8 {
                let card = Card {
                    rank: Rank(rank),
                    suit,
                };
                let wire = card.to_wire();
                assert_eq!(Card::from_wire(&wire), Some(card));
            }
        }
    }

    #[test]
    fn deck_has_52_distinct_cards_before_reshuffle() {
        let mut deck = Deck::new_shuffled();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..52 {
            let card = deck.draw();
            assert!(seen.insert(card.to_wire()), "card drawn twice before reshuffle");
        }
    }

    #[test]
    fn deck_reshuffles_on_exhaustion() {
        let mut deck = Deck::new_shuffled();
        for _ in 0..52 {
            deck.draw();
        }
        // cursor is now 52; drawing again must reshuffle and succeed rather
        // than panic.
        let _ = deck.draw();
    }
}
