use deck_forge::cards::*;
use deck_forge::deck::*;
use deck_forge::error::DeckError;

#[test]
fn test_card_table_has_every_role() {
    let table = card_table();
    assert!(table.len() >= 90);
    for role in ALL_ROLES {
        assert!(table.all().iter().any(|c| c.role == role), "{}", role);
    }
}

#[test]
fn test_elixir_is_in_range() {
    assert!(card_table().all().iter().all(|c| (1..=9).contains(&c.elixir)));
}

#[test]
fn test_unknown_rarity() {
    assert!(matches!(Rarity::from_str("mythic"), Err(DeckError::Configuration(_))));
}

#[test]
fn test_candidate_from_owned_data() {
    let data = CardLevelData::for_card("Knight", 12).unwrap();
    let c = CardCandidate::from_level_data("Knight", &data);
    assert_eq!(c.level, 12);
    assert_eq!(c.rarity, Rarity::Common);
    assert_eq!(c.role, Role::Cycle);
    assert!(c.has_evolution());
}

#[test]
fn test_unknown_card_at_level() {
    assert!(CardCandidate::at_level("Dragon King", 11).is_err());
}

#[test]
fn test_deck_requires_eight_unique() {
    let names = ["Knight", "Knight", "Zap", "Log", "Hog Rider", "Cannon", "Fireball", "Musketeer"];
    assert!(matches!(Deck::from_names(&names, 11), Err(DeckError::InvalidDeck(_))));
    assert!(Deck::from_names(&names[1..], 11).is_err());
}

#[test]
fn test_hash_ignores_order() {
    let a = ["Knight", "Archers", "Zap", "Log", "Hog Rider", "Cannon", "Fireball", "Musketeer"];
    let mut b = a;
    b.reverse();
    assert_eq!(deck_hash(&a), deck_hash(&b));
    assert_eq!(dedup_key(&a), dedup_key(&b));
    assert_eq!(deck_hash(&a).len(), 64);
}

#[test]
fn test_evolution_slots_capped() {
    let names = ["Knight", "Archers", "Zap", "Log", "Hog Rider", "Cannon", "Fireball", "Musketeer"];
    let mut deck = Deck::from_names(&names, 11).unwrap();
    let unlocked = ["Knight", "Cannon", "Musketeer"].iter().map(|s| s.to_string()).collect();
    deck.assign_evolution_slots(&unlocked, DEFAULT_EVOLUTION_SLOTS);
    assert_eq!(deck.evolution_slots().len(), DEFAULT_EVOLUTION_SLOTS);
    assert!(deck.evolution_slots().iter().all(|n| unlocked.contains(n)));
}
