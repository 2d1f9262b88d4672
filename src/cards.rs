use std::collections::{BTreeMap, HashMap};
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{DeckError, DeckResult};

static CARDS_JSON: &str = include_str!("../data/cards.json");

pub const MAX_CARD_LEVEL: u8 = 16;

// ---------------------------------------------------------------------------
// Rarity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
    Champion,
}

pub const ALL_RARITIES: [Rarity; 5] = [
    Rarity::Common,
    Rarity::Rare,
    Rarity::Epic,
    Rarity::Legendary,
    Rarity::Champion,
];

impl Rarity {
    pub fn from_str(s: &str) -> DeckResult<Rarity> {
        match s.trim().to_ascii_lowercase().as_str() {
            "common" => Ok(Rarity::Common),
            "rare" => Ok(Rarity::Rare),
            "epic" => Ok(Rarity::Epic),
            "legendary" => Ok(Rarity::Legendary),
            "champion" => Ok(Rarity::Champion),
            other => Err(DeckError::configuration(format!("unknown rarity '{}'", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
            Rarity::Champion => "champion",
        }
    }

    /// Multiplier applied to a card's intrinsic score.
    pub fn weight(&self) -> f64 {
        match self {
            Rarity::Common => 1.0,
            Rarity::Rare => 1.05,
            Rarity::Epic => 1.1,
            Rarity::Legendary => 1.15,
            Rarity::Champion => 1.2,
        }
    }

    /// Bonus on the level-ratio term; a maxed legendary outranks a maxed common.
    pub fn priority_bonus(&self) -> f64 {
        match self {
            Rarity::Common => 1.0,
            Rarity::Rare => 1.3,
            Rarity::Epic => 1.7,
            Rarity::Legendary => 2.2,
            Rarity::Champion => 2.5,
        }
    }

    /// Level a card of this rarity has when first unlocked.
    pub fn starting_level(&self) -> u8 {
        match self {
            Rarity::Common => 1,
            Rarity::Rare => 3,
            Rarity::Epic => 6,
            Rarity::Legendary => 9,
            Rarity::Champion => 11,
        }
    }

    pub fn max_level(&self) -> u8 {
        MAX_CARD_LEVEL
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    WinCondition,
    Building,
    SpellBig,
    SpellSmall,
    Support,
    Cycle,
}

pub const ALL_ROLES: [Role; 6] = [
    Role::WinCondition,
    Role::Building,
    Role::SpellBig,
    Role::SpellSmall,
    Role::Support,
    Role::Cycle,
];

impl Role {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_str(s: &str) -> DeckResult<Role> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "win_condition" | "wincondition" => Ok(Role::WinCondition),
            "building" => Ok(Role::Building),
            "spell_big" | "big_spell" => Ok(Role::SpellBig),
            "spell_small" | "small_spell" => Ok(Role::SpellSmall),
            "support" => Ok(Role::Support),
            "cycle" => Ok(Role::Cycle),
            other => Err(DeckError::configuration(format!("unknown role '{}'", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::WinCondition => "win_condition",
            Role::Building => "building",
            Role::SpellBig => "spell_big",
            Role::SpellSmall => "spell_small",
            Role::Support => "support",
            Role::Cycle => "cycle",
        }
    }

    pub fn is_spell(&self) -> bool {
        matches!(self, Role::SpellBig | Role::SpellSmall)
    }

    /// Role guess for cards missing from the static table.
    pub fn fallback_for_elixir(elixir: u8) -> Role {
        match elixir {
            0..=2 => Role::Cycle,
            3..=5 => Role::Support,
            _ => Role::WinCondition,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Static card table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Targets {
    Ground,
    AirGround,
    Buildings,
}

impl Targets {
    pub fn hits_air(&self) -> bool {
        matches!(self, Targets::AirGround)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombatStats {
    pub dps: u32,
    pub hp: u32,
    pub targets: Targets,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub name: String,
    pub rarity: Rarity,
    pub elixir: u8,
    pub role: Role,
    #[serde(default)]
    pub stats: Option<CombatStats>,
    #[serde(default = "default_popularity")]
    pub popularity: f64,
    #[serde(default)]
    pub max_evolution_level: u8,
}

fn default_popularity() -> f64 {
    0.5
}

#[derive(Deserialize)]
struct CardFile {
    cards: Vec<Card>,
}

pub struct CardTable {
    cards: Vec<Card>,
    index: HashMap<String, usize>,
}

impl CardTable {
    pub fn from_json(json: &str) -> DeckResult<CardTable> {
        let file: CardFile = serde_json::from_str(json)?;
        let mut index = HashMap::with_capacity(file.cards.len());
        for (i, card) in file.cards.iter().enumerate() {
            if card.elixir == 0 || card.elixir > 9 {
                return Err(DeckError::configuration(format!(
                    "card '{}' has elixir {} outside 1-9",
                    card.name, card.elixir
                )));
            }
            if index.insert(card.name.clone(), i).is_some() {
                return Err(DeckError::configuration(format!("duplicate card '{}'", card.name)));
            }
        }
        Ok(CardTable { cards: file.cards, index })
    }

    pub fn get(&self, name: &str) -> Option<&Card> {
        self.index.get(name).map(|&i| &self.cards[i])
    }

    pub fn all(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

static CARD_TABLE: Lazy<CardTable> = Lazy::new(|| {
    CardTable::from_json(CARDS_JSON).unwrap_or_else(|e| {
        log::error!("embedded card table failed to load: {}", e);
        CardTable { cards: Vec::new(), index: HashMap::new() }
    })
});

pub fn card_table() -> &'static CardTable {
    &CARD_TABLE
}

pub fn lookup(name: &str) -> Option<&'static Card> {
    CARD_TABLE.get(name)
}

/// Role from the static table, falling back to an elixir-based guess.
pub fn role_for(name: &str, elixir: u8) -> Role {
    lookup(name)
        .map(|c| c.role)
        .unwrap_or_else(|| Role::fallback_for_elixir(elixir))
}

// ---------------------------------------------------------------------------
// Player-owned card data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardLevelData {
    pub level: u8,
    #[serde(default)]
    pub max_level: u8,
    #[serde(default)]
    pub evolution_level: u8,
    #[serde(default)]
    pub max_evolution_level: u8,
    pub rarity: Rarity,
    pub elixir: u8,
}

impl CardLevelData {
    pub fn new(level: u8, rarity: Rarity, elixir: u8) -> CardLevelData {
        CardLevelData {
            level,
            max_level: rarity.max_level(),
            evolution_level: 0,
            max_evolution_level: 0,
            rarity,
            elixir,
        }
    }

    /// Owned data for a card in the static table at the given level.
    pub fn for_card(name: &str, level: u8) -> Option<CardLevelData> {
        lookup(name).map(|c| CardLevelData {
            level,
            max_level: c.rarity.max_level(),
            evolution_level: 0,
            max_evolution_level: c.max_evolution_level,
            rarity: c.rarity,
            elixir: c.elixir,
        })
    }

    pub fn effective_max_level(&self) -> u8 {
        if self.max_level == 0 {
            self.rarity.max_level()
        } else {
            self.max_level
        }
    }
}

/// Snapshot of a player's cards keyed by name.
pub type Collection = BTreeMap<String, CardLevelData>;

// ---------------------------------------------------------------------------
// CardCandidate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardCandidate {
    pub name: String,
    pub level: u8,
    pub max_level: u8,
    pub rarity: Rarity,
    pub elixir: u8,
    pub role: Role,
    pub score: f64,
    pub evolution_level: u8,
    pub max_evolution_level: u8,
    pub stats: Option<CombatStats>,
    pub popularity: f64,
}

impl CardCandidate {
    /// Projects owned level data onto the static card table. Score starts at zero.
    pub fn from_level_data(name: &str, data: &CardLevelData) -> CardCandidate {
        let card = lookup(name);
        CardCandidate {
            name: name.to_string(),
            level: data.level,
            max_level: data.effective_max_level(),
            rarity: data.rarity,
            elixir: data.elixir,
            role: role_for(name, data.elixir),
            score: 0.0,
            evolution_level: data.evolution_level,
            max_evolution_level: data
                .max_evolution_level
                .max(card.map(|c| c.max_evolution_level).unwrap_or(0)),
            stats: card.and_then(|c| c.stats),
            popularity: card.map(|c| c.popularity).unwrap_or_else(default_popularity),
        }
    }

    /// Candidate for a static card at a given level, mainly for fixtures.
    pub fn at_level(name: &str, level: u8) -> DeckResult<CardCandidate> {
        let data = CardLevelData::for_card(name, level)
            .ok_or_else(|| DeckError::configuration(format!("unknown card '{}'", name)))?;
        Ok(CardCandidate::from_level_data(name, &data))
    }

    pub fn level_ratio(&self) -> f64 {
        if self.max_level == 0 {
            return 0.0;
        }
        let base = (self.level as f64 / self.max_level as f64).min(1.0);
        if self.max_evolution_level > 0 {
            let evo = (self.evolution_level as f64 / self.max_evolution_level as f64).min(1.0);
            0.7 * base + 0.3 * evo
        } else {
            base
        }
    }

    pub fn has_evolution(&self) -> bool {
        self.max_evolution_level > 0
    }

    pub fn hits_air(&self) -> bool {
        self.role.is_spell() || self.stats.map(|s| s.targets.hits_air()).unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
