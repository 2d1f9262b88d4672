//! Multi-criteria deck evaluation.
//!
//! Every category lands on a 0-10 scale rounded to one decimal. The overall
//! score is a weighted sum of the six categories under a validated
//! [`ScoringWeights`]; labels and stars come from fixed score bands.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::archetypes::{ArchetypeClassifier, Classification};
use crate::cards::{CardCandidate, Collection, Rarity, Role};
use crate::deck::{Deck, DECK_SIZE};
use crate::error::{DeckError, DeckResult};
use crate::strategy::Strategy;
use crate::synergy::{analyze_cards, SynergyLookup, SynergyPair};
use crate::upgrades::{gold_needed, REFERENCE_LEVEL};

/// Bumped whenever a formula below changes; stored with leaderboard rows.
pub const EVALUATION_VERSION: u32 = 1;

const WEIGHT_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct RawWeights {
    attack: f64,
    defense: f64,
    synergy: f64,
    versatility: f64,
    f2p: f64,
    playability: f64,
}

/// Category weights. Immutable once built; construction rejects anything
/// that is negative, non-finite or does not sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWeights", into = "RawWeights")]
pub struct ScoringWeights {
    raw: RawWeights,
}

impl ScoringWeights {
    pub fn new(
        attack: f64,
        defense: f64,
        synergy: f64,
        versatility: f64,
        f2p: f64,
        playability: f64,
    ) -> DeckResult<ScoringWeights> {
        let raw = RawWeights { attack, defense, synergy, versatility, f2p, playability };
        ScoringWeights::try_from(raw)
    }

    pub fn as_array(&self) -> [f64; 6] {
        let r = &self.raw;
        [r.attack, r.defense, r.synergy, r.versatility, r.f2p, r.playability]
    }

    /// Weighted sum of category scores.
    pub fn overall(&self, scores: &CategoryScores) -> f64 {
        self.as_array()
            .iter()
            .zip(scores.as_array().iter())
            .map(|(w, s)| w * s)
            .sum()
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        ScoringWeights {
            raw: RawWeights {
                attack: 0.20,
                defense: 0.20,
                synergy: 0.20,
                versatility: 0.15,
                f2p: 0.10,
                playability: 0.15,
            },
        }
    }
}

impl TryFrom<RawWeights> for ScoringWeights {
    type Error = DeckError;

    fn try_from(raw: RawWeights) -> DeckResult<ScoringWeights> {
        let w = [raw.attack, raw.defense, raw.synergy, raw.versatility, raw.f2p, raw.playability];
        if w.iter().any(|x| !x.is_finite() || *x < 0.0) {
            return Err(DeckError::InvalidWeightConfiguration(format!(
                "weights must be finite and non-negative: {:?}",
                w
            )));
        }
        let sum: f64 = w.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(DeckError::InvalidWeightConfiguration(format!(
                "weights sum to {}, expected 1.0",
                sum
            )));
        }
        Ok(ScoringWeights { raw })
    }
}

impl From<ScoringWeights> for RawWeights {
    fn from(w: ScoringWeights) -> RawWeights {
        w.raw
    }
}

// ---------------------------------------------------------------------------
// Ratings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rating {
    Godly,
    Amazing,
    Great,
    Good,
    Decent,
    Mediocre,
    Poor,
    Bad,
    Terrible,
    Awful,
}

impl Rating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Godly => "Godly!",
            Rating::Amazing => "Amazing",
            Rating::Great => "Great",
            Rating::Good => "Good",
            Rating::Decent => "Decent",
            Rating::Mediocre => "Mediocre",
            Rating::Poor => "Poor",
            Rating::Bad => "Bad",
            Rating::Terrible => "Terrible",
            Rating::Awful => "Awful",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const RATING_BANDS: [(f64, Rating); 9] = [
    (9.0, Rating::Godly),
    (8.0, Rating::Amazing),
    (7.0, Rating::Great),
    (6.0, Rating::Good),
    (5.0, Rating::Decent),
    (4.0, Rating::Mediocre),
    (3.0, Rating::Poor),
    (2.0, Rating::Bad),
    (1.0, Rating::Terrible),
];

const STAR_BANDS: [(f64, u8); 5] = [(9.0, 5), (7.5, 4), (6.0, 3), (4.0, 2), (2.0, 1)];

pub fn rating_for(score: f64) -> Rating {
    RATING_BANDS
        .iter()
        .find(|(min, _)| score >= *min)
        .map(|(_, r)| *r)
        .unwrap_or(Rating::Awful)
}

pub fn stars_for(score: f64) -> u8 {
    STAR_BANDS
        .iter()
        .find(|(min, _)| score >= *min)
        .map(|(_, s)| *s)
        .unwrap_or(0)
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub score: f64,
    pub rating: Rating,
    pub stars: u8,
    pub assessment: String,
}

impl CategoryScore {
    pub fn new(raw: f64, assessment: impl Into<String>) -> CategoryScore {
        let score = round1(raw.clamp(0.0, 10.0));
        CategoryScore {
            score,
            rating: rating_for(score),
            stars: stars_for(score),
            assessment: assessment.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores {
    pub attack: CategoryScore,
    pub defense: CategoryScore,
    pub synergy: CategoryScore,
    pub versatility: CategoryScore,
    pub f2p_friendly: CategoryScore,
    pub playability: CategoryScore,
}

impl CategoryScores {
    pub fn as_array(&self) -> [f64; 6] {
        [
            self.attack.score,
            self.defense.score,
            self.synergy.score,
            self.versatility.score,
            self.f2p_friendly.score,
            self.playability.score,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub categories: CategoryScores,
    pub overall_score: f64,
    pub overall_rating: Rating,
    pub detected_archetype: String,
    pub archetype_confidence: f64,
    pub avg_elixir: f64,
    pub top_synergies: Vec<SynergyPair>,
    pub evaluation_version: u32,
}

/// Levels the player actually owns, used instead of the deck's own levels.
#[derive(Debug, Clone, Default)]
pub struct PlayerContext {
    pub collection: Collection,
}

impl PlayerContext {
    pub fn new(collection: Collection) -> PlayerContext {
        PlayerContext { collection }
    }
}

// ---------------------------------------------------------------------------
// Category formulas
// ---------------------------------------------------------------------------

fn dps(card: &CardCandidate) -> f64 {
    card.stats.map(|s| s.dps as f64).unwrap_or(0.0)
}

fn hp(card: &CardCandidate) -> f64 {
    card.stats.map(|s| s.hp as f64).unwrap_or(0.0)
}

fn attack(deck: &Deck) -> CategoryScore {
    let wcs: Vec<&CardCandidate> = deck.cards_with_role(Role::WinCondition).collect();
    let wc_score = if wcs.is_empty() {
        2.0
    } else {
        let quality = wcs
            .iter()
            .map(|c| 0.6 * c.level_ratio() + 0.4 * (dps(c) / 250.0).min(1.0))
            .sum::<f64>()
            / wcs.len() as f64;
        let extra = if wcs.len() > 1 { 1.0 } else { 0.0 };
        (6.0 + 4.0 * quality + extra).min(10.0)
    };

    let troops: Vec<&CardCandidate> = deck
        .cards()
        .iter()
        .filter(|c| !c.role.is_spell() && c.stats.is_some())
        .collect();
    let efficiency = if troops.is_empty() {
        0.0
    } else {
        let per_elixir = troops.iter().map(|c| dps(c) / c.elixir.max(1) as f64).sum::<f64>()
            / troops.len() as f64;
        (per_elixir / 80.0).min(1.0) * 10.0
    };

    let supporting = deck
        .cards()
        .iter()
        .filter(|c| (c.role == Role::Support && dps(c) >= 150.0) || c.role == Role::SpellBig)
        .count();
    let support_score = (supporting as f64 / 4.0).min(1.0) * 10.0;

    let score = 0.4 * wc_score + 0.3 * efficiency + 0.3 * support_score;
    let assessment = match wcs.len() {
        0 => "No win condition: towers will rarely fall.".to_string(),
        1 => format!("{} carries the offense with {} supporting attackers.", wcs[0].name, supporting),
        n => format!("{} win conditions give multiple angles of attack.", n),
    };
    CategoryScore::new(score, assessment)
}

fn defense(deck: &Deck) -> CategoryScore {
    let building = deck
        .cards_with_role(Role::Building)
        .map(|c| 10.0 * (0.6 + 0.4 * c.level_ratio()))
        .fold(3.0_f64, f64::max);

    let defenders: Vec<&CardCandidate> = deck
        .cards()
        .iter()
        .filter(|c| matches!(c.role, Role::Building | Role::Support | Role::Cycle))
        .collect();
    let anti_air = deck.cards().iter().filter(|c| c.hits_air()).count();
    let density = ((defenders.len() as f64 / 5.0).min(1.0) * 0.6
        + (anti_air as f64 / 3.0).min(1.0) * 0.4)
        * 10.0;

    let with_stats: Vec<&&CardCandidate> = defenders.iter().filter(|c| c.stats.is_some()).collect();
    let stats = if with_stats.is_empty() {
        0.0
    } else {
        with_stats
            .iter()
            .map(|c| {
                ((hp(c) / 1500.0).min(1.0) * 0.5 + (dps(c) / 250.0).min(1.0) * 0.5)
                    * (0.5 + 0.5 * c.level_ratio())
            })
            .sum::<f64>()
            / with_stats.len() as f64
            * 10.0
    };

    let score = 0.3 * building + 0.4 * density + 0.3 * stats;
    let assessment = if anti_air < 2 {
        format!("Only {} card(s) hit air: vulnerable to air pushes.", anti_air)
    } else if deck.role_counts().get(Role::Building) == 0 {
        "No building: defense relies on troop placement.".to_string()
    } else {
        format!("{} defenders, {} reaching air.", defenders.len(), anti_air)
    };
    CategoryScore::new(score, assessment)
}

fn synergy(deck: &Deck, lookup: &dyn SynergyLookup) -> (CategoryScore, Vec<SynergyPair>) {
    let analysis = analyze_cards(&deck.names(), lookup);
    let assessment = match analysis.known_pairs.first() {
        Some(p) => format!(
            "{} known pairs; strongest {} + {} ({}).",
            analysis.known_pairs.len(),
            p.card_a,
            p.card_b,
            p.category
        ),
        None => "No known synergies between these cards.".to_string(),
    };
    let top = analysis.known_pairs.into_iter().take(5).collect();
    (CategoryScore::new(analysis.mean_score * 10.0, assessment), top)
}

fn versatility(deck: &Deck) -> CategoryScore {
    let counts = deck.role_counts();
    let coverage = counts.distinct_roles() as f64 / 6.0;
    let biggest = counts.0.iter().copied().max().unwrap_or(0) as f64 / DECK_SIZE as f64;
    let concentration = ((biggest - 0.375) / (1.0 - 0.375)).max(0.0);
    let mut costs: Vec<u8> = deck.cards().iter().map(|c| c.elixir).collect();
    costs.sort_unstable();
    costs.dedup();
    let variety = (costs.len() as f64 / 5.0).min(1.0);

    let score = 10.0 * (0.5 * coverage + 0.3 * (1.0 - concentration) + 0.2 * variety);
    let missing: Vec<&str> = crate::cards::ALL_ROLES
        .iter()
        .filter(|r| counts.get(**r) == 0)
        .map(|r| r.as_str())
        .collect();
    let assessment = if missing.is_empty() {
        "Covers every role.".to_string()
    } else {
        format!("Missing roles: {}.", missing.join(", "))
    };
    CategoryScore::new(score, assessment)
}

fn rarity_penalty(r: Rarity) -> f64 {
    match r {
        Rarity::Common => 0.0,
        Rarity::Rare => 0.2,
        Rarity::Epic => 0.45,
        Rarity::Legendary => 0.75,
        Rarity::Champion => 0.9,
    }
}

fn f2p_friendly(deck: &Deck) -> CategoryScore {
    let full_cost = gold_needed(Rarity::Common, 1, REFERENCE_LEVEL) as f64;
    let max_weight = 1.0 + rarity_penalty(Rarity::Champion);

    let rarity_score = 10.0
        * (1.0
            - deck.cards().iter().map(|c| rarity_penalty(c.rarity)).sum::<f64>() / DECK_SIZE as f64);
    let cost = deck
        .cards()
        .iter()
        .map(|c| {
            let gold = gold_needed(c.rarity, c.level, REFERENCE_LEVEL) as f64;
            (1.0 + rarity_penalty(c.rarity)) * gold / full_cost
        })
        .sum::<f64>()
        / DECK_SIZE as f64
        / max_weight;
    let upgrade_score = 10.0 * (1.0 - cost.min(1.0));

    let expensive = deck
        .cards()
        .iter()
        .filter(|c| matches!(c.rarity, Rarity::Legendary | Rarity::Champion))
        .count();
    let assessment = match expensive {
        0 => "No legendaries or champions: easy to upgrade.".to_string(),
        n => format!("{} legendary/champion card(s) slow down upgrades.", n),
    };
    CategoryScore::new(0.6 * rarity_score + 0.4 * upgrade_score, assessment)
}

fn playability(deck: &Deck, context: Option<&PlayerContext>) -> CategoryScore {
    let avg = deck.avg_elixir();
    let distance = if avg < 2.5 {
        2.5 - avg
    } else if avg > 4.0 {
        avg - 4.0
    } else {
        0.0
    };
    let curve = (10.0 - 4.0 * distance).max(0.0);

    let mut missing = Vec::new();
    let level_total: f64 = deck
        .cards()
        .iter()
        .map(|c| {
            let level = match context {
                Some(ctx) => match ctx.collection.get(&c.name) {
                    Some(owned) => owned.level,
                    None => {
                        missing.push(c.name.as_str());
                        0
                    }
                },
                None => c.level,
            };
            (level as f64 / REFERENCE_LEVEL as f64).min(1.0)
        })
        .sum();
    let level_score = level_total / DECK_SIZE as f64 * 10.0;

    let score = 0.3 * curve + 0.7 * level_score;
    let assessment = if !missing.is_empty() {
        format!("Missing cards: {}.", missing.join(", "))
    } else if distance > 0.0 {
        format!("Average elixir {:.1} is outside the comfortable 2.5-4.0 band.", avg)
    } else if level_score < 7.0 {
        "Card levels lag behind competitive play.".to_string()
    } else {
        "Ready to play.".to_string()
    };
    CategoryScore::new(score, assessment)
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Stateless evaluator; shareable across threads.
pub struct Evaluator<'a> {
    weights: ScoringWeights,
    synergy: &'a dyn SynergyLookup,
    classifier: &'a ArchetypeClassifier,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        weights: ScoringWeights,
        synergy: &'a dyn SynergyLookup,
        classifier: &'a ArchetypeClassifier,
    ) -> Evaluator<'a> {
        Evaluator { weights, synergy, classifier }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn evaluate(&self, deck: &Deck, context: Option<&PlayerContext>) -> DeckResult<EvaluationResult> {
        deck.validate()?;

        let (synergy_score, top_synergies) = synergy(deck, self.synergy);
        let categories = CategoryScores {
            attack: attack(deck),
            defense: defense(deck),
            synergy: synergy_score,
            versatility: versatility(deck),
            f2p_friendly: f2p_friendly(deck),
            playability: playability(deck, context),
        };
        let overall_score = round1(self.weights.overall(&categories));
        let Classification { archetype, confidence, .. } = self.classifier.classify(deck)?;

        Ok(EvaluationResult {
            overall_rating: rating_for(overall_score),
            overall_score,
            categories,
            detected_archetype: archetype,
            archetype_confidence: confidence,
            avg_elixir: deck.avg_elixir(),
            top_synergies,
            evaluation_version: EVALUATION_VERSION,
        })
    }
}

/// Evaluates with default weights and the built-in archetype templates.
pub fn evaluate(
    deck: &Deck,
    synergy_db: &dyn SynergyLookup,
    context: Option<&PlayerContext>,
) -> DeckResult<EvaluationResult> {
    Evaluator::new(ScoringWeights::default(), synergy_db, ArchetypeClassifier::builtin())
        .evaluate(deck, context)
}

// ---------------------------------------------------------------------------
// Result records
// ---------------------------------------------------------------------------

/// Common accessors over named, evaluated decks.
pub trait DeckRecord {
    fn name(&self) -> &str;
    fn strategy(&self) -> Strategy;
    fn deck(&self) -> &Deck;
    fn result(&self) -> &EvaluationResult;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedDeck {
    pub name: String,
    pub strategy: Strategy,
    pub deck: Deck,
    pub result: EvaluationResult,
}

impl EvaluatedDeck {
    pub fn new(name: impl Into<String>, strategy: Strategy, deck: Deck, result: EvaluationResult) -> Self {
        EvaluatedDeck { name: name.into(), strategy, deck, result }
    }
}

impl DeckRecord for EvaluatedDeck {
    fn name(&self) -> &str {
        &self.name
    }

    fn strategy(&self) -> Strategy {
        self.strategy
    }

    fn deck(&self) -> &Deck {
        &self.deck
    }

    fn result(&self) -> &EvaluationResult {
        &self.result
    }
}
