use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::cards::{CardCandidate, CardLevelData, Collection, Rarity, Role};
use crate::deck::DECK_SIZE;
use crate::error::{DeckError, DeckResult};

// ---------------------------------------------------------------------------
// Collection providers
// ---------------------------------------------------------------------------

/// Supplies a player's card snapshot. Snapshots are taken as already validated.
pub trait CardCollectionProvider {
    fn collection(&self, player_tag: &str) -> DeckResult<Collection>;
}

/// In-memory snapshots keyed by player tag.
#[derive(Debug, Clone, Default)]
pub struct StaticCollectionProvider {
    players: HashMap<String, Collection>,
}

impl StaticCollectionProvider {
    pub fn new() -> StaticCollectionProvider {
        StaticCollectionProvider::default()
    }

    pub fn with_player(mut self, tag: &str, collection: Collection) -> StaticCollectionProvider {
        self.players.insert(tag.to_string(), collection);
        self
    }
}

impl CardCollectionProvider for StaticCollectionProvider {
    fn collection(&self, player_tag: &str) -> DeckResult<Collection> {
        self.players
            .get(player_tag)
            .cloned()
            .ok_or_else(|| DeckError::configuration(format!("no collection for player {}", player_tag)))
    }
}

#[derive(Deserialize)]
struct CollectionFile {
    #[serde(default)]
    player_tag: Option<String>,
    cards: BTreeMap<String, CardLevelData>,
}

/// A JSON snapshot on disk: `{"player_tag": "...", "cards": {name: level data}}`.
#[derive(Debug, Clone)]
pub struct JsonCollectionFile {
    path: PathBuf,
}

impl JsonCollectionFile {
    pub fn new(path: impl AsRef<Path>) -> JsonCollectionFile {
        JsonCollectionFile { path: path.as_ref().to_path_buf() }
    }
}

impl CardCollectionProvider for JsonCollectionFile {
    fn collection(&self, player_tag: &str) -> DeckResult<Collection> {
        let json = std::fs::read_to_string(&self.path).map_err(|e| {
            DeckError::configuration(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let file: CollectionFile = serde_json::from_str(&json)?;
        if let Some(tag) = file.player_tag.as_deref() {
            if !tag.eq_ignore_ascii_case(player_tag) {
                return Err(DeckError::configuration(format!(
                    "{} holds player {}, not {}",
                    self.path.display(),
                    tag,
                    player_tag
                )));
            }
        }
        Ok(file.cards)
    }
}

// ---------------------------------------------------------------------------
// Constraints & weights
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConstraints {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub min_level: Option<u8>,
    /// Allowed rarities; empty means all. Included cards bypass this filter.
    #[serde(default)]
    pub rarity_focus: Vec<Rarity>,
    #[serde(default = "default_required_roles")]
    pub required_roles: Vec<Role>,
}

fn default_required_roles() -> Vec<Role> {
    vec![Role::WinCondition]
}

impl Default for PoolConstraints {
    fn default() -> Self {
        PoolConstraints {
            include: Vec::new(),
            exclude: Vec::new(),
            min_level: None,
            rarity_focus: Vec::new(),
            required_roles: default_required_roles(),
        }
    }
}

impl PoolConstraints {
    /// Fails fast on include/exclude conflicts and oversized include lists.
    pub fn validate(&self) -> DeckResult<()> {
        validate_include_exclude(&self.include, &self.exclude)
    }
}

pub fn validate_include_exclude(include: &[String], exclude: &[String]) -> DeckResult<()> {
    let excluded: BTreeSet<&str> = exclude.iter().map(|s| s.as_str()).collect();
    let conflicts: Vec<&str> = include
        .iter()
        .map(|s| s.as_str())
        .filter(|n| excluded.contains(n))
        .collect();
    if !conflicts.is_empty() {
        return Err(DeckError::configuration(format!(
            "cards both included and excluded: {}",
            conflicts.join(", ")
        )));
    }
    let unique: BTreeSet<&str> = include.iter().map(|s| s.as_str()).collect();
    if unique.len() > DECK_SIZE {
        return Err(DeckError::configuration(format!(
            "{} cards included, a deck holds {}",
            unique.len(),
            DECK_SIZE
        )));
    }
    Ok(())
}

/// Optional terms blended into the intrinsic card score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateWeights {
    /// Share of the score taken from combat stats (0 disables).
    pub combat: f64,
    /// Bonus weight for rarely played cards (1 - popularity).
    pub uniqueness: f64,
    /// Bonus weight for the caller's usage frequencies.
    pub usage: f64,
    /// Card name -> usage frequency in 0..1.
    #[serde(default)]
    pub usage_frequency: BTreeMap<String, f64>,
}

impl Default for CandidateWeights {
    fn default() -> Self {
        CandidateWeights {
            combat: 0.25,
            uniqueness: 0.0,
            usage: 0.0,
            usage_frequency: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

const LEVEL_WEIGHT: f64 = 1.2;
const ELIXIR_WEIGHT: f64 = 0.15;
const ROLE_BONUS: f64 = 0.05;
const EVOLUTION_WEIGHT: f64 = 0.15;

/// 0..1 effectiveness from raw combat stats, normalised per elixir.
fn combat_effectiveness(card: &CardCandidate) -> Option<f64> {
    let stats = card.stats?;
    let elixir = card.elixir.max(1) as f64;
    let dps = (stats.dps as f64 / elixir / 50.0).min(1.0);
    let hp = (stats.hp as f64 / elixir / 400.0).min(1.0);
    let reach = if stats.targets.hits_air() { 1.0 } else { 0.6 };
    Some(dps * 0.4 + hp * 0.4 + reach * 0.2)
}

pub fn score_card(card: &CardCandidate, weights: &CandidateWeights) -> f64 {
    let level = card.level_ratio() * LEVEL_WEIGHT * card.rarity.priority_bonus();
    let elixir = (1.0 - (card.elixir as f64 - 3.0).abs() / 9.0) * ELIXIR_WEIGHT;
    let evolution = if card.has_evolution() {
        EVOLUTION_WEIGHT * (card.evolution_level as f64 / card.max_evolution_level as f64).min(1.0)
    } else {
        0.0
    };
    let mut score = (level + elixir + ROLE_BONUS + evolution) * card.rarity.weight();

    if weights.combat > 0.0 {
        if let Some(combat) = combat_effectiveness(card) {
            score = score * (1.0 - weights.combat) + combat * weights.combat;
        }
    }
    score += weights.uniqueness * (1.0 - card.popularity).clamp(0.0, 1.0);
    if let Some(freq) = weights.usage_frequency.get(&card.name) {
        score += weights.usage * freq.clamp(0.0, 1.0);
    }
    score
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct CandidateGenerator {
    weights: CandidateWeights,
}

impl CandidateGenerator {
    pub fn new(weights: CandidateWeights) -> CandidateGenerator {
        CandidateGenerator { weights }
    }

    /// Eligible candidates sorted by score (desc), then name.
    pub fn generate(
        &self,
        collection: &Collection,
        constraints: &PoolConstraints,
    ) -> DeckResult<Vec<CardCandidate>> {
        constraints.validate()?;

        for name in &constraints.include {
            let data = collection.get(name).ok_or_else(|| {
                DeckError::configuration(format!("included card '{}' is not in the collection", name))
            })?;
            if let Some(min) = constraints.min_level {
                if data.level < min {
                    return Err(DeckError::configuration(format!(
                        "included card '{}' is level {}, below the minimum {}",
                        name, data.level, min
                    )));
                }
            }
        }

        let excluded: BTreeSet<&str> = constraints.exclude.iter().map(|s| s.as_str()).collect();
        let included: BTreeSet<&str> = constraints.include.iter().map(|s| s.as_str()).collect();

        let mut pool: Vec<CardCandidate> = collection
            .iter()
            .filter(|(name, _)| !excluded.contains(name.as_str()))
            .filter(|(name, data)| {
                included.contains(name.as_str())
                    || (constraints.min_level.map_or(true, |m| data.level >= m)
                        && (constraints.rarity_focus.is_empty()
                            || constraints.rarity_focus.contains(&data.rarity)))
            })
            .map(|(name, data)| {
                let mut c = CardCandidate::from_level_data(name, data);
                c.score = score_card(&c, &self.weights);
                c
            })
            .collect();

        pool.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.name.cmp(&b.name)));

        for &role in &constraints.required_roles {
            if !pool.iter().any(|c| c.role == role) {
                return Err(DeckError::InsufficientPool { role, available: pool.len() });
            }
        }
        if pool.len() < DECK_SIZE {
            return Err(DeckError::configuration(format!(
                "only {} eligible cards, a deck needs {}",
                pool.len(),
                DECK_SIZE
            )));
        }

        debug!(
            "candidate pool: {} of {} cards eligible",
            pool.len(),
            collection.len()
        );
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(level: u8) -> Collection {
        crate::cards::card_table()
            .all()
            .iter()
            .filter_map(|c| {
                CardLevelData::for_card(&c.name, level.max(c.rarity.starting_level()))
                    .map(|d| (c.name.clone(), d))
            })
            .collect()
    }

    #[test]
    fn conflicting_lists_fail() {
        let constraints = PoolConstraints {
            include: vec!["Hog Rider".into()],
            exclude: vec!["Hog Rider".into()],
            ..Default::default()
        };
        let err = CandidateGenerator::default().generate(&collection(11), &constraints);
        assert!(matches!(err, Err(DeckError::Configuration(_))));
    }

    #[test]
    fn missing_win_condition_is_insufficient_pool() {
        let mut coll = collection(11);
        coll.retain(|name, _| crate::cards::role_for(name, 4) != Role::WinCondition);
        let err = CandidateGenerator::default().generate(&coll, &PoolConstraints::default());
        assert!(matches!(
            err,
            Err(DeckError::InsufficientPool { role: Role::WinCondition, .. })
        ));
    }

    #[test]
    fn pool_is_sorted_and_filtered() {
        let constraints = PoolConstraints {
            exclude: vec!["Zap".into()],
            rarity_focus: vec![Rarity::Common],
            include: vec!["Hog Rider".into()],
            ..Default::default()
        };
        let pool = CandidateGenerator::default().generate(&collection(11), &constraints).unwrap();
        assert!(pool.iter().all(|c| c.name != "Zap"));
        assert!(pool.iter().all(|c| c.rarity == Rarity::Common || c.name == "Hog Rider"));
        assert!(pool.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn higher_level_scores_higher() {
        let low = CardCandidate::at_level("Knight", 5).unwrap();
        let high = CardCandidate::at_level("Knight", 14).unwrap();
        let w = CandidateWeights::default();
        assert!(score_card(&high, &w) > score_card(&low, &w));
    }

    #[test]
    fn uniqueness_rewards_rare_picks() {
        let card = CardCandidate::at_level("Rage", 11).unwrap();
        let plain = score_card(&card, &CandidateWeights::default());
        let unique = score_card(
            &card,
            &CandidateWeights { uniqueness: 0.2, ..Default::default() },
        );
        assert!(unique > plain);
    }
}
