use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::cards::{lookup, role_for, Collection, Rarity, Role};
use crate::deck::{Deck, DECK_SIZE};
use crate::error::{DeckError, DeckResult};
use crate::strategy::RoleCounts;
use crate::upgrades::UpgradeCost;

static ARCHETYPES_JSON: &str = include_str!("../data/archetypes.json");

// Distance weights: role shape, elixir, exemplar overlap.
const ROLE_WEIGHT: f64 = 0.45;
const ELIXIR_WEIGHT: f64 = 0.30;
const OVERLAP_WEIGHT: f64 = 0.25;
const EXCLUDED_PENALTY: f64 = 0.1;
/// Elixir gap treated as maximally distant.
const ELIXIR_SPAN: f64 = 3.0;
/// Distance added for each card that stands in for an exemplar card.
const SUBSTITUTE_GAP: f64 = 0.3;
/// Largest possible L1 distance between two eight-card role distributions.
const MAX_ROLE_L1: f64 = (DECK_SIZE * 2) as f64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeTemplate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub role_counts: RoleCounts,
    pub min_elixir: f64,
    pub max_elixir: f64,
    pub target_elixir: f64,
    pub exemplar: Vec<String>,
    #[serde(default)]
    pub preferred: Vec<String>,
    #[serde(default)]
    pub excluded: Vec<String>,
}

impl ArchetypeTemplate {
    fn signature_cards(&self) -> BTreeSet<&str> {
        self.exemplar
            .iter()
            .chain(self.preferred.iter())
            .map(|s| s.as_str())
            .collect()
    }

    /// Normalised 0..1 distance from a deck to this template.
    pub fn distance(&self, deck: &Deck) -> f64 {
        let role = deck.role_counts().l1_distance(&self.role_counts) as f64 / MAX_ROLE_L1;
        let elixir = ((deck.avg_elixir() - self.target_elixir).abs() / ELIXIR_SPAN).min(1.0);
        let signature = self.signature_cards();
        let overlap = deck.names().iter().filter(|n| signature.contains(*n)).count();
        let overlap = (overlap as f64 / DECK_SIZE as f64).min(1.0);
        let excluded = deck
            .names()
            .iter()
            .filter(|n| self.excluded.iter().any(|e| e == *n))
            .count() as f64;

        let d = ROLE_WEIGHT * role
            + ELIXIR_WEIGHT * elixir
            + OVERLAP_WEIGHT * (1.0 - overlap)
            + EXCLUDED_PENALTY * excluded;
        d.clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Viability tiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViabilityTier {
    Optimal,
    Competitive,
    Playable,
    Blocked,
}

const TIER_BANDS: [(f64, ViabilityTier); 3] = [
    (90.0, ViabilityTier::Optimal),
    (75.0, ViabilityTier::Competitive),
    (60.0, ViabilityTier::Playable),
];

impl ViabilityTier {
    /// Tier for a 0-100 viability score.
    pub fn from_score(score: f64) -> ViabilityTier {
        TIER_BANDS
            .iter()
            .find(|(min, _)| score >= *min)
            .map(|(_, t)| *t)
            .unwrap_or(ViabilityTier::Blocked)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViabilityTier::Optimal => "optimal",
            ViabilityTier::Competitive => "competitive",
            ViabilityTier::Playable => "playable",
            ViabilityTier::Blocked => "blocked",
        }
    }
}

impl fmt::Display for ViabilityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub archetype: String,
    pub confidence: f64,
    pub tier: ViabilityTier,
    /// Every template with its distance, nearest first.
    pub distances: Vec<(String, f64)>,
}

#[derive(Deserialize)]
struct TemplateFile {
    templates: Vec<ArchetypeTemplate>,
}

#[derive(Debug, Clone)]
pub struct ArchetypeClassifier {
    templates: Vec<ArchetypeTemplate>,
}

static BUILTIN: Lazy<ArchetypeClassifier> = Lazy::new(|| {
    ArchetypeClassifier::from_json(ARCHETYPES_JSON).unwrap_or_else(|e| {
        log::error!("embedded archetype templates failed to load: {}", e);
        ArchetypeClassifier { templates: Vec::new() }
    })
});

impl ArchetypeClassifier {
    pub fn new(templates: Vec<ArchetypeTemplate>) -> DeckResult<ArchetypeClassifier> {
        if templates.is_empty() {
            return Err(DeckError::configuration("no archetype templates"));
        }
        for t in &templates {
            if t.role_counts.total() != DECK_SIZE || t.exemplar.len() != DECK_SIZE {
                return Err(DeckError::configuration(format!(
                    "template '{}' must describe exactly {} cards",
                    t.name, DECK_SIZE
                )));
            }
            if t.min_elixir > t.max_elixir {
                return Err(DeckError::configuration(format!(
                    "template '{}' has an inverted elixir range",
                    t.name
                )));
            }
        }
        Ok(ArchetypeClassifier { templates })
    }

    pub fn from_json(json: &str) -> DeckResult<ArchetypeClassifier> {
        let file: TemplateFile = serde_json::from_str(json)?;
        ArchetypeClassifier::new(file.templates)
    }

    pub fn builtin() -> &'static ArchetypeClassifier {
        &BUILTIN
    }

    pub fn templates(&self) -> &[ArchetypeTemplate] {
        &self.templates
    }

    pub fn template(&self, name: &str) -> DeckResult<&ArchetypeTemplate> {
        self.templates
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| DeckError::UnknownArchetype(name.to_string()))
    }

    /// Nearest template; ties keep template order.
    pub fn classify(&self, deck: &Deck) -> DeckResult<Classification> {
        deck.validate()?;
        let mut distances: Vec<(String, f64)> = self
            .templates
            .iter()
            .map(|t| (t.name.clone(), t.distance(deck)))
            .collect();
        distances.sort_by(|a, b| a.1.total_cmp(&b.1));

        let (archetype, distance) = distances
            .first()
            .cloned()
            .ok_or_else(|| DeckError::configuration("no archetype templates"))?;
        let confidence = (1.0 - distance).clamp(0.0, 1.0);
        Ok(Classification {
            archetype,
            confidence,
            tier: ViabilityTier::from_score(confidence * 100.0),
            distances,
        })
    }

    // -----------------------------------------------------------------------
    // Variety / upgrade-distance mode
    // -----------------------------------------------------------------------

    /// Investment needed per archetype to field its exemplar deck at `target_level`.
    pub fn analyze_variety(
        &self,
        collection: &Collection,
        target_level: u8,
        sort: VarietySort,
    ) -> Vec<ArchetypeVariety> {
        let mut out: Vec<ArchetypeVariety> = self
            .templates
            .iter()
            .map(|t| variety_for(t, collection, target_level))
            .collect();
        sort_variety(&mut out, sort);
        out
    }
}

/// Nearest archetype and confidence using the built-in templates.
pub fn detect_archetype(deck: &Deck) -> DeckResult<(String, f64)> {
    let c = ArchetypeClassifier::builtin().classify(deck)?;
    Ok((c.archetype, c.confidence))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarietySort {
    Distance,
    CardsNeeded,
    AvgLevel,
}

impl VarietySort {
    pub fn from_str(s: &str) -> DeckResult<VarietySort> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "distance" => Ok(VarietySort::Distance),
            "cards_needed" | "cards" => Ok(VarietySort::CardsNeeded),
            "avg_level" | "level" => Ok(VarietySort::AvgLevel),
            other => Err(DeckError::configuration(format!("unknown variety sort '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarietyCard {
    pub name: String,
    pub role: Role,
    /// Zero when the card is not owned.
    pub current_level: u8,
    pub cost: UpgradeCost,
    /// Exemplar card this one stands in for, if substituted.
    pub replaces: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeVariety {
    pub archetype: String,
    pub cards: Vec<VarietyCard>,
    pub missing: Vec<String>,
    pub cost: UpgradeCost,
    pub avg_level: f64,
    pub upgrade_distance: f64,
    pub viability: f64,
    pub tier: ViabilityTier,
}

fn role_priority_weight(role: Role) -> f64 {
    match role {
        Role::WinCondition => 2.0,
        Role::SpellBig | Role::SpellSmall => 1.5,
        Role::Support => 1.2,
        Role::Building => 1.0,
        Role::Cycle => 0.8,
    }
}

/// Share of the way from nothing to a fielded card at `target_level`: level
/// gap as a fraction, plus a fixed step for a stand-in. Unowned cards are 1.
fn card_gap(card: &VarietyCard, target_level: u8) -> f64 {
    if target_level == 0 {
        return if card.current_level == 0 { 1.0 } else { 0.0 };
    }
    let level_gap = target_level.saturating_sub(card.current_level) as f64 / target_level as f64;
    let step = if card.replaces.is_some() { SUBSTITUTE_GAP } else { 0.0 };
    (level_gap + step).min(1.0)
}

fn variety_for(template: &ArchetypeTemplate, collection: &Collection, target_level: u8) -> ArchetypeVariety {
    let mut used: BTreeSet<String> = BTreeSet::new();
    let mut cards = Vec::with_capacity(DECK_SIZE);
    let mut missing = Vec::new();

    // Owned exemplar cards first so substitutes never steal them.
    for name in &template.exemplar {
        if collection.contains_key(name) {
            used.insert(name.clone());
        }
    }

    for name in &template.exemplar {
        let role = role_for(name, lookup(name).map(|c| c.elixir).unwrap_or(4));
        if let Some(data) = collection.get(name) {
            cards.push(VarietyCard {
                name: name.clone(),
                role,
                current_level: data.level,
                cost: UpgradeCost::between(data.rarity, data.level, target_level),
                replaces: None,
            });
            continue;
        }

        let substitute = collection
            .iter()
            .filter(|(n, _)| !used.contains(*n) && !template.excluded.contains(*n))
            .filter(|(n, d)| role_for(n, d.elixir) == role)
            .max_by(|(na, a), (nb, b)| {
                let pa = template.preferred.contains(*na);
                let pb = template.preferred.contains(*nb);
                pa.cmp(&pb).then(a.level.cmp(&b.level)).then_with(|| nb.cmp(na))
            });

        match substitute {
            Some((sub, data)) => {
                used.insert(sub.clone());
                cards.push(VarietyCard {
                    name: sub.clone(),
                    role,
                    current_level: data.level,
                    cost: UpgradeCost::between(data.rarity, data.level, target_level),
                    replaces: Some(name.clone()),
                });
            }
            None => {
                let rarity = lookup(name).map(|c| c.rarity).unwrap_or(Rarity::Common);
                let mut cost = UpgradeCost::between(rarity, rarity.starting_level(), target_level);
                cost.cards += 1;
                missing.push(name.clone());
                cards.push(VarietyCard {
                    name: name.clone(),
                    role,
                    current_level: 0,
                    cost,
                    replaces: None,
                });
            }
        }
    }

    let mut cost = UpgradeCost::default();
    let mut weighted_gap = 0.0;
    let mut weight_total = 0.0;
    for c in &cards {
        cost.add(c.cost);
        let w = role_priority_weight(c.role);
        weighted_gap += w * card_gap(c, target_level);
        weight_total += w;
    }
    let upgrade_distance = if weight_total == 0.0 {
        0.0
    } else {
        (weighted_gap / weight_total).min(1.0)
    };
    let avg_level = cards.iter().map(|c| c.current_level as f64).sum::<f64>() / cards.len().max(1) as f64;
    let viability = (100.0 * (1.0 - upgrade_distance)).clamp(0.0, 100.0);

    ArchetypeVariety {
        archetype: template.name.clone(),
        cards,
        missing,
        cost,
        avg_level,
        upgrade_distance,
        viability,
        tier: ViabilityTier::from_score(viability),
    }
}

fn sort_variety(items: &mut [ArchetypeVariety], sort: VarietySort) {
    items.sort_by(|a, b| {
        let primary = match sort {
            VarietySort::Distance => a
                .upgrade_distance
                .total_cmp(&b.upgrade_distance)
                .then_with(|| b.viability.total_cmp(&a.viability)),
            VarietySort::CardsNeeded => a.cost.cards.cmp(&b.cost.cards),
            VarietySort::AvgLevel => b.avg_level.total_cmp(&a.avg_level),
        };
        primary.then_with(|| a.archetype.cmp(&b.archetype))
    });
}
