//! Pure Sedma rules: deck, hands, discard, turn index, penalty counter,
//! active suit. No networking, no knowledge of rooms or clients.

use crate::cards::{Card, DECK_SIZE, Rank, Suit, full_deck};
use crate::error::ErrorCode;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Cards dealt to each player at the start of a game.
pub const CARDS_EACH: usize = 4;
/// Hard cap on a single player's hand, matching the protocol's fixed-width
/// hand representation.
pub const MAX_HAND: usize = 32;
/// Maximum seats in a room/game.
pub const MAX_PLAYERS: usize = 4;

/// A fixed-capacity hand of cards. Never grows past [`MAX_HAND`].
#[derive(Debug, Clone)]
pub struct Hand {
    cards: [Card; MAX_HAND],
    count: usize,
}

impl Hand {
    fn empty() -> Hand {
        Hand {
            cards: [Card::from_index(0); MAX_HAND],
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn as_slice(&self) -> &[Card] {
        &self.cards[..self.count]
    }

    /// Appends a card if there's room; returns whether it fit.
    fn push(&mut self, card: Card) -> bool {
        if self.count >= MAX_HAND {
            return false;
        }
        self.cards[self.count] = card;
        self.count += 1;
        true
    }

    fn contains(&self, card: Card) -> bool {
        self.as_slice().contains(&card)
    }

    /// Removes the first matching card, shifting the rest down.
    fn remove(&mut self, card: Card) -> bool {
        let Some(pos) = self.as_slice().iter().position(|&c| c == card) else {
            return false;
        };
        for i in pos..self.count - 1 {
            self.cards[i] = self.cards[i + 1];
        }
        self.count -= 1;
        true
    }
}

/// A fixed-capacity pile used for both the draw pile and the discard pile.
#[derive(Debug, Clone)]
struct Pile {
    cards: [Card; DECK_SIZE],
    top: usize,
}

impl Pile {
    fn empty() -> Pile {
        Pile {
            cards: [Card::from_index(0); DECK_SIZE],
            top: 0,
        }
    }

    fn push(&mut self, card: Card) {
        assert!(self.top < DECK_SIZE, "pile overflow");
        self.cards[self.top] = card;
        self.top += 1;
    }
}

/// Outcome of a successful [`Game::play`] call.
#[derive(Debug, Clone, Copy)]
pub struct PlayOutcome {
    /// How much `penalty` grew from this play (0 unless a seven was played).
    pub added_penalty: u32,
    /// Set once the acting player's hand is emptied by this play.
    pub winner_pos: Option<usize>,
}

/// Per-room game state: deck, hands, discard, turn, penalty, active suit.
pub struct Game {
    num_players: usize,
    deck: Pile,
    discard: Pile,
    hands: [Hand; MAX_PLAYERS],
    top_card: Option<Card>,
    active_suit: Option<Suit>,
    penalty: u32,
    turn_pos: usize,
    running: bool,
    ended: bool,
    winner_pos: Option<usize>,
    rng: StdRng,
}

impl Game {
    /// Builds and fully starts a game for `num_players` seats (2..=4) using
    /// `seed` to drive every shuffle — `deal` then `pick_start_top` are run
    /// immediately, mirroring how `START_GAME` always performs all three
    /// steps back to back.
    pub fn start(num_players: usize, seed: u64) -> Game {
        let mut game = Game::init(num_players, seed);
        game.deal();
        game.pick_start_top();
        game
    }

    /// `init`: fills and shuffles the deck, resets all counters.
    pub fn init(num_players: usize, seed: u64) -> Game {
        assert!((2..=MAX_PLAYERS).contains(&num_players));
        let mut rng = StdRng::seed_from_u64(seed);
        let mut deck_cards = full_deck();
        deck_cards.shuffle(&mut rng);

        Game {
            num_players,
            deck: Pile { cards: deck_cards, top: 0 },
            discard: Pile::empty(),
            hands: std::array::from_fn(|_| Hand::empty()),
            top_card: None,
            active_suit: None,
            penalty: 0,
            turn_pos: 0,
            running: true,
            ended: false,
            winner_pos: None,
            rng,
        }
    }

    /// `deal`: each player draws [`CARDS_EACH`] cards in turn order.
    pub fn deal(&mut self) {
        for p in 0..self.num_players {
            for _ in 0..CARDS_EACH {
                match self.draw_one() {
                    Some(card) => {
                        self.hands[p].push(card);
                    }
                    None => break,
                }
            }
        }
    }

    /// `pick_start_top`: burns special cards (Q/7/A) until a plain card
    /// becomes the discard top and the active suit.
    pub fn pick_start_top(&mut self) {
        loop {
            let Some(card) = self.draw_one() else { return };
            self.discard.push(card);
            if matches!(card.rank(), Rank::Queen | Rank::Seven | Rank::Ace) {
                continue;
            }
            self.top_card = Some(card);
            self.active_suit = Some(card.suit());
            return;
        }
    }

    /// Serves the next card from the deck, refilling from discard when the
    /// deck is exhausted. Returns `None` only when both piles are spent
    /// (the "no card" sentinel case).
    fn draw_one(&mut self) -> Option<Card> {
        if self.deck.top < DECK_SIZE {
            let card = self.deck.cards[self.deck.top];
            self.deck.top += 1;
            return Some(card);
        }

        if self.discard.top <= 1 {
            return None;
        }

        let kept = self.discard.cards[self.discard.top - 1];
        let n = self.discard.top - 1;
        let mut refill: Vec<Card> = self.discard.cards[..n].to_vec();
        refill.shuffle(&mut self.rng);

        self.deck = Pile::empty();
        for (i, c) in refill.into_iter().enumerate() {
            self.deck.cards[i] = c;
        }
        self.deck.top = 0;

        self.discard = Pile::empty();
        self.discard.push(kept);

        if n == 0 {
            return None;
        }
        let card = self.deck.cards[0];
        self.deck.top = 1;
        Some(card)
    }

    fn advance_turn(&mut self, skip_next: bool) {
        self.turn_pos = (self.turn_pos + 1) % self.num_players;
        if skip_next {
            self.turn_pos = (self.turn_pos + 1) % self.num_players;
        }
    }

    /// Attempts to play `card` for the player at `ppos`, with an optional
    /// suit wish (only consulted for a Queen).
    pub fn play(
        &mut self,
        ppos: usize,
        card: Card,
        wish: Option<&str>,
    ) -> Result<PlayOutcome, ErrorCode> {
        if !self.running || self.ended {
            return Err(ErrorCode::BadState);
        }
        if ppos != self.turn_pos {
            return Err(ErrorCode::NotYourTurn);
        }
        if !self.hands[ppos].contains(card) {
            return Err(ErrorCode::NoSuchCard);
        }

        let mut wish_suit = None;
        if self.penalty > 0 {
            if card.rank() != Rank::Seven {
                return Err(ErrorCode::MustStackOrDraw);
            }
        } else if card.rank() == Rank::Queen {
            let raw = wish.ok_or(ErrorCode::WishRequired)?;
            wish_suit = Some(Suit::from_char_str(raw).ok_or(ErrorCode::BadWish)?);
        } else {
            let active = self.active_suit.expect("active suit set once running");
            let top = self.top_card.expect("top card set once running");
            if card.suit() != active && card.rank() != top.rank() {
                return Err(ErrorCode::IllegalCard);
            }
        }

        self.hands[ppos].remove(card);
        self.discard.push(card);
        self.top_card = Some(card);
        self.active_suit = Some(wish_suit.unwrap_or(card.suit()));

        let mut added_penalty = 0;
        if card.rank() == Rank::Seven {
            self.penalty += 2;
            added_penalty = 2;
        }
        let skip_next = card.rank() == Rank::Ace;

        if self.hands[ppos].is_empty() {
            self.ended = true;
            self.winner_pos = Some(ppos);
            return Ok(PlayOutcome { added_penalty, winner_pos: Some(ppos) });
        }

        self.advance_turn(skip_next);
        Ok(PlayOutcome { added_penalty, winner_pos: None })
    }

    /// Draws `penalty` cards (or just one if there's no penalty) for the
    /// player at `ppos`, clears the penalty, and advances the turn. Returns
    /// how many cards were actually drawn (may be fewer if the deck+discard
    /// were exhausted, or the hand hit [`MAX_HAND`]).
    pub fn draw(&mut self, ppos: usize) -> Result<u32, ErrorCode> {
        if !self.running || self.ended {
            return Err(ErrorCode::BadState);
        }
        if ppos != self.turn_pos {
            return Err(ErrorCode::NotYourTurn);
        }

        let n = if self.penalty > 0 { self.penalty } else { 1 };
        let mut drawn = 0u32;
        for _ in 0..n {
            match self.draw_one() {
                Some(card) => {
                    if self.hands[ppos].push(card) {
                        drawn += 1;
                    } else {
                        break;
                    }
                }
                None => break,
            }
        }
        self.penalty = 0;
        self.advance_turn(false);
        Ok(drawn)
    }

    pub fn hand(&self, ppos: usize) -> &[Card] {
        self.hands[ppos].as_slice()
    }

    pub fn hand_count(&self, ppos: usize) -> usize {
        self.hands[ppos].len()
    }

    pub fn top_card(&self) -> Option<Card> {
        self.top_card
    }

    pub fn active_suit(&self) -> Option<Suit> {
        self.active_suit
    }

    pub fn penalty(&self) -> u32 {
        self.penalty
    }

    pub fn turn_pos(&self) -> usize {
        self.turn_pos
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn ended(&self) -> bool {
        self.ended
    }

    pub fn winner_pos(&self) -> Option<usize> {
        self.winner_pos
    }

    /// Conservation invariant: `deck_top_remaining + sum(hand_count) +
    /// discard_top == 32` must hold between any two operations.
    #[cfg(test)]
    fn card_count_invariant(&self) -> usize {
        let remaining_deck = DECK_SIZE - self.deck.top;
        let hands: usize = (0..self.num_players).map(|p| self.hand_count(p)).sum();
        remaining_deck + hands + self.discard.top
    }

    /// Removes a player mid-game, compacting hands/turn index. Used by the
    /// room manager when a seat is permanently vacated.
    pub fn remove_player(&mut self, removed: usize) {
        for i in removed..self.num_players - 1 {
            self.hands[i] = self.hands[i + 1].clone();
        }
        self.hands[self.num_players - 1] = Hand::empty();
        self.num_players -= 1;
        if self.turn_pos > removed {
            self.turn_pos -= 1;
        }
        if self.num_players > 0 {
            self.turn_pos = self.turn_pos.min(self.num_players - 1);
        }
    }
}

impl Suit {
    /// Parses a one-character wish token (`"S"`, `"H"`, `"D"`, `"C"`).
    fn from_char_str(s: &str) -> Option<Suit> {
        let mut chars = s.chars();
        let c = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        Suit::from_char(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_deals_and_picks_top() {
        let game = Game::start(3, 42);
        assert_eq!(game.hand_count(0), CARDS_EACH);
        assert_eq!(game.hand_count(1), CARDS_EACH);
        assert_eq!(game.hand_count(2), CARDS_EACH);
        assert!(game.top_card().is_some());
        assert!(game.active_suit().is_some());
        assert_eq!(game.card_count_invariant(), DECK_SIZE);
    }

    #[test]
    fn play_rejects_out_of_turn() {
        let mut game = Game::start(2, 7);
        let not_turn = (game.turn_pos() + 1) % 2;
        let card = game.hand(not_turn)[0];
        let err = game.play(not_turn, card, None).unwrap_err();
        assert_eq!(err, ErrorCode::NotYourTurn);
    }

    #[test]
    fn queen_requires_wish() {
        let mut game = Game::init(2, 1);
        game.hands[0].push(Card::new(Suit::Spades, Rank::Queen));
        game.top_card = Some(Card::new(Suit::Hearts, Rank::Nine));
        game.active_suit = Some(Suit::Hearts);
        let queen = Card::new(Suit::Spades, Rank::Queen);

        let err = game.play(0, queen, None).unwrap_err();
        assert_eq!(err, ErrorCode::WishRequired);

        let err = game.play(0, queen, Some("Z")).unwrap_err();
        assert_eq!(err, ErrorCode::BadWish);
    }

    #[test]
    fn seven_sets_penalty_and_must_stack_or_draw() {
        let mut game = Game::init(2, 2);
        let seven = Card::new(Suit::Hearts, Rank::Seven);
        game.hands[0].push(seven);
        game.hands[0].push(Card::new(Suit::Clubs, Rank::King));
        game.top_card = Some(Card::new(Suit::Hearts, Rank::Nine));
        game.active_suit = Some(Suit::Hearts);

        let outcome = game.play(0, seven, None).unwrap();
        assert_eq!(outcome.added_penalty, 2);
        assert_eq!(game.penalty(), 2);

        // Player 1 has no seven: must stack or draw.
        let king = Card::new(Suit::Clubs, Rank::King);
        game.hands[1].push(king);
        let err = game.play(1, king, None).unwrap_err();
        assert_eq!(err, ErrorCode::MustStackOrDraw);
    }

    #[test]
    fn draw_clears_penalty_and_advances_turn() {
        let mut game = Game::init(2, 3);
        game.penalty = 2;
        let before_turn = game.turn_pos();
        let drawn = game.draw(before_turn).unwrap();
        assert_eq!(drawn, 2);
        assert_eq!(game.penalty(), 0);
        assert_ne!(game.turn_pos(), before_turn);
    }

    #[test]
    fn emptying_hand_ends_game_without_advancing_turn() {
        let mut game = Game::init(2, 4);
        let last = Card::new(Suit::Hearts, Rank::Nine);
        game.hands[0].push(last);
        game.top_card = Some(Card::new(Suit::Hearts, Rank::King));
        game.active_suit = Some(Suit::Hearts);

        let outcome = game.play(0, last, None).unwrap();
        assert_eq!(outcome.winner_pos, Some(0));
        assert!(game.ended());
        assert_eq!(game.turn_pos(), 0);
    }

    #[test]
    fn ace_skips_next_player() {
        let mut game = Game::init(3, 5);
        let ace = Card::new(Suit::Hearts, Rank::Ace);
        game.hands[0].push(ace);
        game.hands[0].push(Card::new(Suit::Clubs, Rank::King));
        game.top_card = Some(Card::new(Suit::Hearts, Rank::Nine));
        game.active_suit = Some(Suit::Hearts);

        game.play(0, ace, None).unwrap();
        // turn_pos should skip player 1 and land on player 2.
        assert_eq!(game.turn_pos(), 2);
    }
}
