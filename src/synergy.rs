use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{DeckError, DeckResult};

static SYNERGIES_JSON: &str = include_str!("../data/synergies.json");

/// Score contributed by a card pair with no database entry.
pub const NEUTRAL_SYNERGY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynergyCategory {
    TankSupport,
    Bait,
    SpellCombo,
    WinCondition,
    Defensive,
    Cycle,
    BridgeSpam,
}

impl SynergyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SynergyCategory::TankSupport => "tank_support",
            SynergyCategory::Bait => "bait",
            SynergyCategory::SpellCombo => "spell_combo",
            SynergyCategory::WinCondition => "win_condition",
            SynergyCategory::Defensive => "defensive",
            SynergyCategory::Cycle => "cycle",
            SynergyCategory::BridgeSpam => "bridge_spam",
        }
    }
}

impl fmt::Display for SynergyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynergyPair {
    pub card_a: String,
    pub card_b: String,
    pub category: SynergyCategory,
    pub score: f64,
    #[serde(default)]
    pub description: String,
}

impl SynergyPair {
    pub fn involves(&self, name: &str) -> bool {
        self.card_a == name || self.card_b == name
    }
}

// ---------------------------------------------------------------------------
// Lookup capability
// ---------------------------------------------------------------------------

/// Symmetric pairwise synergy lookup shared by the composer, evaluator and classifier.
pub trait SynergyLookup: Send + Sync {
    fn pair(&self, a: &str, b: &str) -> Option<&SynergyPair>;

    /// Every known pair; sources that only answer point lookups return none.
    fn known_pairs(&self) -> Vec<&SynergyPair> {
        Vec::new()
    }

    fn synergy(&self, a: &str, b: &str) -> Option<f64> {
        self.pair(a, b).map(|p| p.score)
    }

    /// Pair score or the neutral baseline.
    fn synergy_or_neutral(&self, a: &str, b: &str) -> f64 {
        self.synergy(a, b).unwrap_or(NEUTRAL_SYNERGY)
    }
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[derive(Deserialize)]
struct SynergyFile {
    pairs: Vec<SynergyPair>,
}

#[derive(Debug, Clone, Default)]
pub struct SynergyDatabase {
    pairs: HashMap<(String, String), SynergyPair>,
}

impl SynergyDatabase {
    pub fn new() -> SynergyDatabase {
        SynergyDatabase::default()
    }

    pub fn from_json(json: &str) -> DeckResult<SynergyDatabase> {
        let file: SynergyFile = serde_json::from_str(json)?;
        let mut db = SynergyDatabase::new();
        for pair in file.pairs {
            db.add(pair)?;
        }
        Ok(db)
    }

    pub fn load(path: &Path) -> DeckResult<SynergyDatabase> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            DeckError::configuration(format!("cannot read synergy file {}: {}", path.display(), e))
        })?;
        SynergyDatabase::from_json(&json)
    }

    /// The database shipped with the crate.
    pub fn builtin() -> &'static SynergyDatabase {
        &BUILTIN
    }

    pub fn add(&mut self, pair: SynergyPair) -> DeckResult<()> {
        if pair.card_a == pair.card_b {
            return Err(DeckError::configuration(format!(
                "synergy pair '{}' references the same card twice",
                pair.card_a
            )));
        }
        if !(0.0..=1.0).contains(&pair.score) {
            return Err(DeckError::configuration(format!(
                "synergy {} + {} score {} outside 0-1",
                pair.card_a, pair.card_b, pair.score
            )));
        }
        self.pairs.insert(pair_key(&pair.card_a, &pair.card_b), pair);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = &SynergyPair> {
        self.pairs.values()
    }

    /// Known partners of a card, best first.
    pub fn partners(&self, name: &str) -> Vec<&SynergyPair> {
        let mut out: Vec<&SynergyPair> = self.pairs.values().filter(|p| p.involves(name)).collect();
        out.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| pair_key(&a.card_a, &a.card_b).cmp(&pair_key(&b.card_a, &b.card_b)))
        });
        out
    }
}

impl SynergyLookup for SynergyDatabase {
    fn pair(&self, a: &str, b: &str) -> Option<&SynergyPair> {
        self.pairs.get(&pair_key(a, b))
    }

    fn known_pairs(&self) -> Vec<&SynergyPair> {
        let mut out: Vec<&SynergyPair> = self.pairs.values().collect();
        out.sort_by(|a, b| pair_key(&a.card_a, &a.card_b).cmp(&pair_key(&b.card_a, &b.card_b)));
        out
    }
}

static BUILTIN: Lazy<SynergyDatabase> = Lazy::new(|| {
    SynergyDatabase::from_json(SYNERGIES_JSON).unwrap_or_else(|e| {
        log::error!("embedded synergy database failed to load: {}", e);
        SynergyDatabase::new()
    })
});

// ---------------------------------------------------------------------------
// Deck analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynergyAnalysis {
    /// Mean pair score over every card pair, absent pairs counted as neutral.
    pub mean_score: f64,
    pub pair_count: usize,
    pub known_pairs: Vec<SynergyPair>,
    pub categories: BTreeMap<SynergyCategory, usize>,
}

pub fn analyze_cards<S: AsRef<str>>(names: &[S], lookup: &dyn SynergyLookup) -> SynergyAnalysis {
    let mut total = 0.0;
    let mut pair_count = 0;
    let mut known_pairs = Vec::new();
    let mut categories = BTreeMap::new();

    for i in 0..names.len() {
        for j in (i + 1)..names.len() {
            let (a, b) = (names[i].as_ref(), names[j].as_ref());
            pair_count += 1;
            match lookup.pair(a, b) {
                Some(p) => {
                    total += p.score;
                    *categories.entry(p.category).or_insert(0) += 1;
                    known_pairs.push(p.clone());
                }
                None => total += NEUTRAL_SYNERGY,
            }
        }
    }

    known_pairs.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mean_score = if pair_count == 0 {
        NEUTRAL_SYNERGY
    } else {
        total / pair_count as f64
    };

    SynergyAnalysis { mean_score, pair_count, known_pairs, categories }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_pairs() {
        assert!(SynergyDatabase::builtin().len() > 100);
    }

    #[test]
    fn lookup_is_symmetric() {
        let db = SynergyDatabase::builtin();
        for p in db.pairs() {
            assert_eq!(db.synergy(&p.card_a, &p.card_b), db.synergy(&p.card_b, &p.card_a));
        }
        assert_eq!(db.synergy("Golem", "Night Witch"), Some(0.95));
        assert_eq!(db.synergy("Night Witch", "Golem"), Some(0.95));
    }

    #[test]
    fn known_pairs_lists_every_pair_in_stable_order() {
        let db = SynergyDatabase::builtin();
        let first: Vec<(String, String)> =
            db.known_pairs().iter().map(|p| (p.card_a.clone(), p.card_b.clone())).collect();
        let second: Vec<(String, String)> =
            db.known_pairs().iter().map(|p| (p.card_a.clone(), p.card_b.clone())).collect();
        assert_eq!(first.len(), db.len());
        assert_eq!(first, second);
    }

    #[test]
    fn missing_pair_is_neutral() {
        let db = SynergyDatabase::builtin();
        assert_eq!(db.synergy("Golem", "Skeletons"), None);
        assert_eq!(db.synergy_or_neutral("Golem", "Skeletons"), NEUTRAL_SYNERGY);
    }

    #[test]
    fn rejects_out_of_range_score() {
        let mut db = SynergyDatabase::new();
        let pair = SynergyPair {
            card_a: "A".into(),
            card_b: "B".into(),
            category: SynergyCategory::Bait,
            score: 1.5,
            description: String::new(),
        };
        assert!(db.add(pair).is_err());
    }

    #[test]
    fn analysis_counts_all_pairs() {
        let names = ["Golem", "Night Witch", "Skeletons"];
        let a = analyze_cards(&names, SynergyDatabase::builtin());
        assert_eq!(a.pair_count, 3);
        assert_eq!(a.known_pairs.len(), 1);
        let expected = (0.95 + 0.5 + 0.5) / 3.0;
        assert!((a.mean_score - expected).abs() < 1e-9);
    }
}
