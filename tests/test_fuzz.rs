use deck_forge::candidates::{score_card, CandidateWeights};
use deck_forge::cards::{card_table, CardCandidate};
use deck_forge::error::{DeckError, RejectionReason};
use deck_forge::archetypes::ArchetypeClassifier;
use deck_forge::fuzz::*;
use deck_forge::synergy::{SynergyDatabase, SynergyLookup};

fn pool(level: u8) -> Vec<CardCandidate> {
    let weights = CandidateWeights::default();
    card_table()
        .all()
        .iter()
        .map(|c| {
            let mut cand = CardCandidate::at_level(&c.name, level).unwrap();
            cand.score = score_card(&cand, &weights);
            cand
        })
        .collect()
}

fn summary(out: &FuzzOutcome) -> Vec<(String, String, f64)> {
    out.decks
        .iter()
        .map(|d| (d.name.clone(), d.deck.dedup_key(), d.result.overall_score))
        .collect()
}

#[test]
fn test_same_seed_same_results() {
    let config = FuzzingConfig { count: 300, workers: 3, seed: 42, top_k: 8, ..Default::default() };
    let a = fuzz_search(&pool(12), &config).unwrap();
    let b = fuzz_search(&pool(12), &config).unwrap();
    assert_eq!(summary(&a), summary(&b));
    assert_eq!(a.stats.success, b.stats.success);
    assert_eq!(a.stats.skipped_role, b.stats.skipped_role);
}

#[test]
fn test_top_k_bounds_output() {
    let config = FuzzingConfig { count: 200, top_k: 3, seed: 1, ..Default::default() };
    let out = fuzz_search(&pool(12), &config).unwrap();
    assert!(out.decks.len() <= 3);
    assert!(!out.decks.is_empty());
}

#[test]
fn test_include_and_exclude_are_respected() {
    let config = FuzzingConfig {
        count: 150,
        workers: 2,
        seed: 9,
        include: vec!["Golem".into()],
        exclude: vec!["Zap".into(), "Fireball".into()],
        ..Default::default()
    };
    let out = fuzz_search(&pool(13), &config).unwrap();
    for d in &out.decks {
        assert!(d.deck.contains("Golem"));
        assert!(!d.deck.contains("Zap"));
        assert!(!d.deck.contains("Fireball"));
    }
}

#[test]
fn test_elixir_window_filters_survivors() {
    let config = FuzzingConfig {
        count: 300,
        seed: 3,
        min_avg_elixir: 2.5,
        max_avg_elixir: 3.5,
        ..Default::default()
    };
    let out = fuzz_search(&pool(12), &config).unwrap();
    for d in &out.decks {
        let avg = d.deck.avg_elixir();
        assert!((2.5..=3.5).contains(&avg));
    }
    assert_eq!(
        out.stats.generated,
        out.stats.success
            + out.stats.skipped_role
            + out.stats.skipped_elixir
            + out.stats.skipped_score
            + out.stats.skipped_synergy
            + out.stats.skipped_evolution
    );
}

#[test]
fn test_unreachable_score_exhausts() {
    let config = FuzzingConfig { count: 40, min_overall_score: 10.0, ..Default::default() };
    match fuzz_search(&pool(12), &config) {
        Err(DeckError::GenerationExhausted { attempts, reason }) => {
            assert_eq!(attempts, 40);
            assert_eq!(reason, RejectionReason::BelowScoreThreshold);
        }
        other => panic!("expected exhaustion, got {:?}", other.map(|o| o.stats)),
    }
}

#[test]
fn test_zero_workers_is_configuration_error() {
    let config = FuzzingConfig { workers: 0, ..Default::default() };
    assert!(matches!(fuzz_search(&pool(12), &config), Err(DeckError::Configuration(_))));
}

#[test]
fn test_unreachable_synergy_floor_exhausts() {
    let config = FuzzingConfig { count: 30, min_synergy_score: 10.0, ..Default::default() };
    match fuzz_search(&pool(12), &config) {
        Err(DeckError::GenerationExhausted { attempts, reason }) => {
            assert_eq!(attempts, 30);
            assert_eq!(reason, RejectionReason::BelowSynergyThreshold);
        }
        other => panic!("expected exhaustion, got {:?}", other.map(|o| o.stats)),
    }
}

#[test]
fn test_synergy_floor_holds_for_survivors() {
    let config = FuzzingConfig { count: 200, seed: 5, min_synergy_score: 5.0, ..Default::default() };
    if let Ok(out) = fuzz_search(&pool(12), &config) {
        assert!(out.decks.iter().all(|d| d.result.categories.synergy.score >= 5.0));
        assert_eq!(out.stats.success + out.stats.failed, 200);
        assert_eq!(out.stats.skipped_score, 0);
    }
}

#[test]
fn test_synergy_first_decks_carry_four_pairs() {
    let db = SynergyDatabase::builtin();
    let config = FuzzingConfig {
        count: 60,
        seed: 9,
        mode: FuzzMode::SynergyFirst,
        ..Default::default()
    };
    let out = fuzz_search(&pool(12), &config).unwrap();
    assert!(!out.decks.is_empty());
    for d in &out.decks {
        let names = d.deck.names();
        let mut pairs = 0;
        for i in 0..names.len() {
            for j in i + 1..names.len() {
                if db.synergy(names[i], names[j]).is_some() {
                    pairs += 1;
                }
            }
        }
        assert!(pairs >= 4, "{:?} has {} known pairs", names, pairs);
    }
}

#[test]
fn test_synergy_first_needs_known_pairs() {
    let empty = SynergyDatabase::new();
    let config = FuzzingConfig { count: 10, mode: FuzzMode::SynergyFirst, ..Default::default() };
    let result = FuzzSearcher::new(&empty, ArchetypeClassifier::builtin()).run(&pool(12), &config);
    assert!(matches!(result, Err(DeckError::Configuration(_))));
}

#[test]
fn test_evolution_centric_meets_minimum() {
    let config = FuzzingConfig {
        count: 60,
        seed: 11,
        mode: FuzzMode::EvolutionCentric,
        min_evolution_cards: 3,
        ..Default::default()
    };
    let out = fuzz_search(&pool(12), &config).unwrap();
    assert!(!out.decks.is_empty());
    for d in &out.decks {
        let evos = d.deck.cards().iter().filter(|c| c.has_evolution()).count();
        assert!(evos >= 3, "{:?} has {} evolution cards", d.deck.names(), evos);
    }
}

#[test]
fn test_evolution_centric_without_evolutions_is_configuration_error() {
    let plain: Vec<CardCandidate> = pool(12).into_iter().filter(|c| !c.has_evolution()).collect();
    let config = FuzzingConfig { count: 10, mode: FuzzMode::EvolutionCentric, ..Default::default() };
    assert!(matches!(fuzz_search(&plain, &config), Err(DeckError::Configuration(_))));
}

#[test]
fn test_modes_are_reproducible() {
    for mode in [FuzzMode::SynergyFirst, FuzzMode::EvolutionCentric] {
        let config = FuzzingConfig { count: 80, workers: 2, seed: 13, top_k: 5, mode, ..Default::default() };
        let a = fuzz_search(&pool(12), &config).unwrap();
        let b = fuzz_search(&pool(12), &config).unwrap();
        assert_eq!(summary(&a), summary(&b));
        assert_eq!(a.stats.retries, b.stats.retries);
    }
}
