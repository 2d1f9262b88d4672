use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cards::{CardCandidate, Role};
use crate::error::{DeckError, DeckResult};
use crate::strategy::RoleCounts;

pub const DECK_SIZE: usize = 8;
pub const DEFAULT_EVOLUTION_SLOTS: usize = 2;

/// Order-independent identifier for a card set: sorted names joined by `|`.
pub fn dedup_key<S: AsRef<str>>(names: &[S]) -> String {
    let mut sorted: Vec<&str> = names.iter().map(|s| s.as_ref()).collect();
    sorted.sort_unstable();
    sorted.join("|")
}

/// Hex SHA-256 of the dedup key.
pub fn deck_hash<S: AsRef<str>>(names: &[S]) -> String {
    let digest = Sha256::digest(dedup_key(names).as_bytes());
    format!("{:x}", digest)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    cards: Vec<CardCandidate>,
    #[serde(default)]
    evolution_slots: Vec<String>,
}

impl Deck {
    /// Builds a deck, rejecting anything but exactly eight distinct cards.
    pub fn new(cards: Vec<CardCandidate>) -> DeckResult<Deck> {
        if cards.len() != DECK_SIZE {
            return Err(DeckError::InvalidDeck(format!(
                "expected {} cards, got {}",
                DECK_SIZE,
                cards.len()
            )));
        }
        let mut seen = HashSet::with_capacity(DECK_SIZE);
        for c in &cards {
            if !seen.insert(c.name.as_str()) {
                return Err(DeckError::InvalidDeck(format!("duplicate card '{}'", c.name)));
            }
        }
        Ok(Deck { cards, evolution_slots: Vec::new() })
    }

    /// Deck of static cards at a single level.
    pub fn from_names<S: AsRef<str>>(names: &[S], level: u8) -> DeckResult<Deck> {
        let cards = names
            .iter()
            .map(|n| CardCandidate::at_level(n.as_ref(), level))
            .collect::<DeckResult<Vec<_>>>()?;
        Deck::new(cards)
    }

    pub fn cards(&self) -> &[CardCandidate] {
        &self.cards
    }

    pub fn names(&self) -> Vec<&str> {
        self.cards.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cards.iter().any(|c| c.name == name)
    }

    pub fn avg_elixir(&self) -> f64 {
        self.cards.iter().map(|c| c.elixir as f64).sum::<f64>() / self.cards.len() as f64
    }

    pub fn role_counts(&self) -> RoleCounts {
        RoleCounts::from_roles(self.cards.iter().map(|c| c.role))
    }

    pub fn cards_with_role(&self, role: Role) -> impl Iterator<Item = &CardCandidate> {
        self.cards.iter().filter(move |c| c.role == role)
    }

    pub fn dedup_key(&self) -> String {
        dedup_key(&self.names())
    }

    pub fn hash(&self) -> String {
        deck_hash(&self.names())
    }

    pub fn evolution_slots(&self) -> &[String] {
        &self.evolution_slots
    }

    /// Re-checks the deck invariants; used on decks coming back from storage or callers.
    pub fn validate(&self) -> DeckResult<()> {
        Deck::new(self.cards.clone()).map(|_| ())?;
        if self.evolution_slots.iter().any(|s| !self.contains(s)) {
            return Err(DeckError::InvalidDeck("evolution slot for a card not in the deck".into()));
        }
        Ok(())
    }

    /// Assigns evolution slots from the unlocked set, best role first.
    pub fn assign_evolution_slots(&mut self, unlocked: &BTreeSet<String>, limit: usize) {
        let mut eligible: Vec<&CardCandidate> = self
            .cards
            .iter()
            .filter(|c| c.has_evolution() && unlocked.contains(&c.name))
            .collect();
        eligible.sort_by(|a, b| {
            evolution_priority(a.role)
                .cmp(&evolution_priority(b.role))
                .then_with(|| b.score.total_cmp(&a.score))
                .then_with(|| a.name.cmp(&b.name))
        });
        self.evolution_slots = eligible.into_iter().take(limit).map(|c| c.name.clone()).collect();
    }
}

fn evolution_priority(role: Role) -> u8 {
    match role {
        Role::WinCondition => 1,
        Role::Building => 2,
        Role::SpellBig => 3,
        Role::Support => 4,
        Role::SpellSmall => 5,
        Role::Cycle => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOG_CYCLE: [&str; 8] = [
        "Hog Rider", "Musketeer", "Cannon", "Ice Golem",
        "Ice Spirit", "Skeletons", "Fireball", "Log",
    ];

    #[test]
    fn rejects_seven_cards() {
        assert!(Deck::from_names(&HOG_CYCLE[..7], 11).is_err());
    }

    #[test]
    fn rejects_duplicates() {
        let mut names = HOG_CYCLE.to_vec();
        names[7] = "Hog Rider";
        assert!(matches!(Deck::from_names(&names, 11), Err(DeckError::InvalidDeck(_))));
    }

    #[test]
    fn avg_elixir_is_mean() {
        let d = Deck::from_names(&HOG_CYCLE, 11).unwrap();
        assert!((d.avg_elixir() - 2.625).abs() < 1e-9);
    }

    #[test]
    fn dedup_key_ignores_order() {
        let mut reversed = HOG_CYCLE.to_vec();
        reversed.reverse();
        assert_eq!(dedup_key(&HOG_CYCLE), dedup_key(&reversed));
        assert_eq!(deck_hash(&HOG_CYCLE), deck_hash(&reversed));
        assert_eq!(deck_hash(&HOG_CYCLE).len(), 64);
    }

    #[test]
    fn evolution_slots_respect_unlocks_and_limit() {
        let mut d = Deck::from_names(&HOG_CYCLE, 11).unwrap();
        let unlocked: BTreeSet<String> = ["Musketeer", "Cannon", "Skeletons", "Log"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        d.assign_evolution_slots(&unlocked, 2);
        // Log has no evolution; building outranks support.
        assert_eq!(d.evolution_slots(), &["Cannon".to_string(), "Musketeer".to_string()]);
    }
}
