use std::collections::BTreeSet;

use deck_forge::candidates::*;
use deck_forge::cards::*;
use deck_forge::composer::*;
use deck_forge::deck::DECK_SIZE;
use deck_forge::error::{DeckError, RejectionReason};
use deck_forge::evaluation::*;
use deck_forge::strategy::{satisfies_role_rules, Strategy, ALL_STRATEGIES};
use deck_forge::synergy::SynergyDatabase;

fn collection_at(level: u8) -> Collection {
    card_table()
        .all()
        .iter()
        .filter_map(|c| CardLevelData::for_card(&c.name, level).map(|d| (c.name.clone(), d)))
        .collect()
}

fn pool_for(collection: &Collection, constraints: &PoolConstraints) -> Vec<CardCandidate> {
    CandidateGenerator::new(CandidateWeights::default())
        .generate(collection, constraints)
        .unwrap()
}

#[test]
fn test_every_strategy_builds_a_legal_deck() {
    let collection = collection_at(13);
    let pool = pool_for(&collection, &PoolConstraints::default());
    for strategy in ALL_STRATEGIES {
        let deck = compose_deck(&pool, &CompositionConstraints::default(), strategy)
            .unwrap_or_else(|e| panic!("{}: {}", strategy, e));
        let names: BTreeSet<&str> = deck.names().into_iter().collect();
        assert_eq!(names.len(), DECK_SIZE, "{}", strategy);
        assert!(satisfies_role_rules(&deck.role_counts()), "{}", strategy);
    }
}

#[test]
fn test_build_honours_include_and_exclude() {
    let collection = collection_at(12);
    let constraints = PoolConstraints {
        include: vec!["Hog Rider".into()],
        exclude: vec!["Fireball".into(), "Log".into()],
        ..Default::default()
    };
    let pool = pool_for(&collection, &constraints);
    let composition = CompositionConstraints {
        include: constraints.include.clone(),
        elixir_window: Some((1.0, 9.0)),
        ..Default::default()
    };
    let deck = compose_deck(&pool, &composition, Strategy::Balanced).unwrap();
    assert!(deck.contains("Hog Rider"));
    assert!(!deck.contains("Fireball"));
    assert!(!deck.contains("Log"));
}

#[test]
fn test_conflicting_include_exclude_is_configuration_error() {
    let constraints = PoolConstraints {
        include: vec!["Zap".into()],
        exclude: vec!["Zap".into()],
        ..Default::default()
    };
    let result = CandidateGenerator::new(CandidateWeights::default()).generate(&collection_at(11), &constraints);
    assert!(matches!(result, Err(DeckError::Configuration(_))));
}

#[test]
fn test_collection_without_win_condition_is_insufficient() {
    let collection: Collection = collection_at(11)
        .into_iter()
        .filter(|(name, data)| role_for(name, data.elixir) != Role::WinCondition)
        .collect();
    let result = CandidateGenerator::new(CandidateWeights::default())
        .generate(&collection, &PoolConstraints::default());
    assert!(matches!(result, Err(DeckError::InsufficientPool { .. })));
}

#[test]
fn test_pool_without_big_spell_fails_composition() {
    let names = [
        "Hog Rider", "Cannon", "Zap", "Musketeer", "Valkyrie", "Ice Spirit", "Skeletons", "Knight",
    ];
    let pool: Vec<CardCandidate> = names.iter().map(|n| CardCandidate::at_level(n, 12).unwrap()).collect();
    let result = compose_deck(&pool, &CompositionConstraints::with_window(1.0, 9.0), Strategy::Balanced);
    assert!(matches!(
        result,
        Err(DeckError::GenerationExhausted { reason: RejectionReason::RoleIncomplete, .. })
    ));
}

#[test]
fn test_built_deck_evaluates_in_range() {
    let collection = collection_at(14);
    let pool = pool_for(&collection, &PoolConstraints::default());
    let deck = compose_deck(&pool, &CompositionConstraints::default(), Strategy::Control).unwrap();
    let context = PlayerContext::new(collection);
    let result = evaluate(&deck, SynergyDatabase::builtin(), Some(&context)).unwrap();

    for score in result.categories.as_array() {
        assert!((0.0..=10.0).contains(&score));
    }
    assert!((0.0..=10.0).contains(&result.overall_score));
    assert!((0.0..=1.0).contains(&result.archetype_confidence));
    assert_eq!(result.overall_rating, rating_for(result.overall_score));
    assert_eq!(result.evaluation_version, EVALUATION_VERSION);
}

#[test]
fn test_rarity_focus_keeps_only_allowed_rarities() {
    let collection = collection_at(11);
    let constraints = PoolConstraints {
        rarity_focus: vec![Rarity::Common, Rarity::Rare],
        ..Default::default()
    };
    let pool = pool_for(&collection, &constraints);
    assert!(pool.iter().all(|c| matches!(c.rarity, Rarity::Common | Rarity::Rare)));
}
