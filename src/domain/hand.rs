// Hand value computation (domain rules the protocol observes, spec.md §3).

use crate::domain::card::Card;

/// Bounded-capacity ordered sequence of cards. 12 cards is enough headroom
/// for any sequence of hits a 52-card shoe can produce before a bust.
const HAND_CAPACITY: usize = 12;

#[derive(Debug, Clone, Default)]
pub struct Hand {
    cards: Vec<Card>,
}

impl Hand {
    pub fn new() -> Self {
        Hand { cards: Vec::with_capacity(HAND_CAPACITY) }
    }

    pub fn push(&mut self, card: Card) {
        debug_assert!(
            self.cards.len() < HAND_CAPACITY,
            "hand exceeded its bounded capacity"
        );
        self.cards.push(card);
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn clear(&mut self) {
        self.cards.clear();
    }

    /// Sum ranks with face cards = 10 and aces = 11, then downgrade aces to
    /// 1 one at a time while the total exceeds 21.
    pub fn value(&self) -> u32 {
        let mut total: u32 = self.cards.iter().map(|c| c.base_value()).sum();
        let mut aces = self.cards.iter().filter(|c| c.is_ace()).count();
        while total > 21 && aces > 0 {
            total -= 10;
            aces -= 1;
        }
        total
    }

    pub fn is_bust(&self) -> bool {
        self.value() > 21
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::card::{Rank, Suit};

    fn card(rank: u8, suit: Suit) -> Card {
        Card { rank: Rank(rank), suit }
    }

    #[test]
    fn two_aces_demote_to_twelve() {
        let mut hand = Hand::new();
        hand.push(card(1, Suit::Spades));
        hand.push(card(1, Suit::Hearts));
        assert_eq!(hand.value(), 12);
    }

    #[test]
    fn ace_and_ten_is_blackjack() {
        let mut hand = Hand::new();
        hand.push(card(1, Suit::Spades));
        hand.push(card(13, Suit::Hearts));
        assert_eq!(hand.value(), 21);
        assert!(!hand.is_bust());
    }

    #[test]
    fn busts_over_twenty_one() {
        let mut hand = Hand::new();
        hand.push(card(10, Suit::Spades));
        hand.push(card(9, Suit::Hearts));
        hand.push(card(5, Suit::Clubs));
        assert_eq!(hand.value(), 24);
        assert!(hand.is_bust());
    }

    #[test]
    fn value_is_order_independent_for_non_ace_cards() {
        let mut a = Hand::new();
        a.push(card(7, Suit::Spades));
        a.push(card(8, Suit::Hearts));
        let mut b = Hand::new();
        b.push(card(8, Suit::Hearts));
        b.push(card(7, Suit::Spades));
        assert_eq!(a.value(), b.value());
    }
}
