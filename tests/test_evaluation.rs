use approx::assert_abs_diff_eq;

use deck_forge::archetypes::ArchetypeClassifier;
use deck_forge::deck::Deck;
use deck_forge::error::DeckError;
use deck_forge::evaluation::*;
use deck_forge::synergy::SynergyDatabase;

const COMMONS: [&str; 8] = [
    "Royal Giant", "Cannon", "Zap", "Arrows", "Archers", "Knight", "Skeletons", "Bomber",
];

const HOG_CYCLE: [&str; 8] = [
    "Hog Rider", "Musketeer", "Cannon", "Ice Golem", "Ice Spirit", "Skeletons", "Fireball", "Log",
];

fn eval(names: &[&str], level: u8) -> EvaluationResult {
    let deck = Deck::from_names(names, level).unwrap();
    evaluate(&deck, SynergyDatabase::builtin(), None).unwrap()
}

#[test]
fn test_level_one_commons_are_barely_playable() {
    let result = eval(&COMMONS, 1);
    assert!(result.categories.playability.score < 4.0);
}

#[test]
fn test_max_level_deck_in_band_is_fully_playable() {
    let result = eval(&HOG_CYCLE, 14);
    assert_abs_diff_eq!(result.categories.playability.score, 10.0, epsilon = 0.05);
}

#[test]
fn test_all_commons_are_f2p_friendly() {
    let commons = eval(&COMMONS, 14);
    let hog = eval(&HOG_CYCLE, 14);
    assert!(commons.categories.f2p_friendly.score > hog.categories.f2p_friendly.score);
}

#[test]
fn test_higher_levels_never_lower_the_score() {
    let low = eval(&HOG_CYCLE, 9);
    let high = eval(&HOG_CYCLE, 14);
    assert!(high.overall_score >= low.overall_score);
    assert!(high.categories.playability.score > low.categories.playability.score);
}

#[test]
fn test_overall_is_monotonic_in_each_category() {
    let weights = ScoringWeights::default();
    let base = CategoryScores {
        attack: CategoryScore::new(5.0, ""),
        defense: CategoryScore::new(5.0, ""),
        synergy: CategoryScore::new(5.0, ""),
        versatility: CategoryScore::new(5.0, ""),
        f2p_friendly: CategoryScore::new(5.0, ""),
        playability: CategoryScore::new(5.0, ""),
    };
    let before = weights.overall(&base);
    assert_abs_diff_eq!(before, 5.0, epsilon = 1e-9);

    for i in 0..6 {
        let mut better = base.clone();
        *category_mut(&mut better, i) = CategoryScore::new(8.0, "");
        assert!(weights.overall(&better) > before, "raising category {} did not raise overall", i);

        let mut worse = base.clone();
        *category_mut(&mut worse, i) = CategoryScore::new(2.0, "");
        assert!(weights.overall(&worse) < before, "lowering category {} did not lower overall", i);
    }
}

fn category_mut(scores: &mut CategoryScores, i: usize) -> &mut CategoryScore {
    match i {
        0 => &mut scores.attack,
        1 => &mut scores.defense,
        2 => &mut scores.synergy,
        3 => &mut scores.versatility,
        4 => &mut scores.f2p_friendly,
        _ => &mut scores.playability,
    }
}

#[test]
fn test_weights_not_summing_to_one_are_rejected() {
    let result = ScoringWeights::new(0.5, 0.5, 0.5, 0.0, 0.0, 0.0);
    assert!(matches!(result, Err(DeckError::InvalidWeightConfiguration(_))));
}

#[test]
fn test_custom_weights_change_overall() {
    let deck = Deck::from_names(&HOG_CYCLE, 11).unwrap();
    let attack_only = ScoringWeights::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0).unwrap();
    let evaluator = Evaluator::new(attack_only, SynergyDatabase::builtin(), ArchetypeClassifier::builtin());
    let result = evaluator.evaluate(&deck, None).unwrap();
    assert_abs_diff_eq!(result.overall_score, result.categories.attack.score, epsilon = 0.051);
}

#[test]
fn test_known_synergies_are_reported() {
    let result = eval(&HOG_CYCLE, 11);
    assert!(!result.top_synergies.is_empty());
    assert!(result.top_synergies.len() <= 5);
    assert!(result
        .top_synergies
        .windows(2)
        .all(|w| w[0].score >= w[1].score));
}

#[test]
fn test_cycle_deck_is_detected_as_cycle() {
    let result = eval(&HOG_CYCLE, 11);
    assert_eq!(result.detected_archetype, "cycle");
    assert!((0.0..=1.0).contains(&result.archetype_confidence));
}

#[test]
fn test_stars_follow_bands() {
    assert_eq!(stars_for(9.5), 5);
    assert_eq!(stars_for(7.5), 4);
    assert_eq!(stars_for(6.0), 3);
    assert_eq!(stars_for(1.0), 0);
}
