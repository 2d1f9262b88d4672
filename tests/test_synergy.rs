use deck_forge::cards::{lookup, Rarity};
use deck_forge::synergy::*;
use deck_forge::upgrades::*;

#[test]
fn test_every_pair_is_symmetric_and_in_range() {
    let db = SynergyDatabase::builtin();
    assert!(db.len() > 100);
    for p in db.pairs() {
        let ab = db.synergy(&p.card_a, &p.card_b);
        let ba = db.synergy(&p.card_b, &p.card_a);
        assert_eq!(ab, ba);
        assert!((0.0..=1.0).contains(&p.score));
    }
}

#[test]
fn test_every_pair_names_known_cards() {
    for p in SynergyDatabase::builtin().pairs() {
        assert!(lookup(&p.card_a).is_some(), "{}", p.card_a);
        assert!(lookup(&p.card_b).is_some(), "{}", p.card_b);
    }
}

#[test]
fn test_unknown_cards_are_neutral() {
    let db = SynergyDatabase::builtin();
    assert_eq!(db.synergy("Nobody", "Hog Rider"), None);
    assert_eq!(db.synergy_or_neutral("Nobody", "Hog Rider"), NEUTRAL_SYNERGY);
}

#[test]
fn test_partners_include_both_sides() {
    let db = SynergyDatabase::builtin();
    let partners = db.partners("Ice Spirit");
    assert!(!partners.is_empty());
    assert!(partners.iter().all(|p| p.involves("Ice Spirit")));
}

#[test]
fn test_upgrade_cost_adds_up() {
    let step = UpgradeCost::between(Rarity::Common, 10, 11);
    let next = UpgradeCost::between(Rarity::Common, 11, 12);
    let mut sum = step;
    sum.add(next);
    assert_eq!(sum, UpgradeCost::between(Rarity::Common, 10, 12));
    assert_eq!(sum.gems, gems_for_gold(sum.gold));
}
