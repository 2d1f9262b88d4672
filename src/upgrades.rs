//! Card upgrade economics: cards, gold and gems needed between levels.

use crate::cards::Rarity;

pub const GOLD_PER_GEM: u64 = 17;

/// Level the F2P score and variety analysis treat as tournament-ready.
pub const REFERENCE_LEVEL: u8 = 14;

/// Highest level with its own entry in the gold table; later steps reuse it.
const LAST_PRICED_LEVEL: u8 = 13;

/// Cards required to go from `level` to `level + 1`.
fn cards_for_step(rarity: Rarity, level: u8) -> u64 {
    let table: &[(u8, u64)] = match rarity {
        Rarity::Common => &[
            (1, 2), (2, 4), (3, 10), (4, 20), (5, 50), (6, 100), (7, 200), (8, 400),
            (9, 800), (10, 1000), (11, 2000), (12, 3000), (13, 2500), (14, 3500), (15, 5500),
        ],
        Rarity::Rare => &[
            (3, 2), (4, 4), (5, 10), (6, 20), (7, 50), (8, 100), (9, 200),
            (10, 300), (11, 400), (12, 400), (13, 550), (14, 750), (15, 1000),
        ],
        Rarity::Epic => &[
            (6, 2), (7, 4), (8, 10), (9, 20), (10, 50),
            (11, 30), (12, 40), (13, 70), (14, 100), (15, 140),
        ],
        Rarity::Legendary => &[
            (9, 2), (10, 4), (11, 10), (12, 20), (13, 10), (14, 12), (15, 15),
        ],
        Rarity::Champion => &[(11, 2), (12, 4), (13, 8), (14, 10), (15, 12)],
    };
    table
        .iter()
        .find(|(l, _)| *l == level)
        .map(|(_, n)| *n)
        .unwrap_or(0)
}

/// Gold required to go from `level` to `level + 1`.
fn gold_for_step(rarity: Rarity, level: u8) -> u64 {
    if level < rarity.starting_level() || level >= rarity.max_level() {
        return 0;
    }
    match level.min(LAST_PRICED_LEVEL) {
        1 => 5,
        2 => 20,
        3 => 50,
        4 => 150,
        5 => 400,
        6 if rarity == Rarity::Epic => 400,
        6 => 1000,
        7 => 2000,
        8 => 4000,
        9 if rarity == Rarity::Legendary => 5000,
        9 => 8000,
        10 => 20000,
        11 => 50000,
        _ => 100000,
    }
}

pub fn cards_needed(rarity: Rarity, from: u8, to: u8) -> u64 {
    (from.max(rarity.starting_level())..to.min(rarity.max_level()))
        .map(|l| cards_for_step(rarity, l))
        .sum()
}

pub fn gold_needed(rarity: Rarity, from: u8, to: u8) -> u64 {
    (from.max(rarity.starting_level())..to.min(rarity.max_level()))
        .map(|l| gold_for_step(rarity, l))
        .sum()
}

pub fn gems_for_gold(gold: u64) -> u64 {
    gold.div_ceil(GOLD_PER_GEM)
}

/// Aggregate cost of a set of upgrades.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UpgradeCost {
    pub cards: u64,
    pub gold: u64,
    pub gems: u64,
}

impl UpgradeCost {
    pub fn between(rarity: Rarity, from: u8, to: u8) -> UpgradeCost {
        let gold = gold_needed(rarity, from, to);
        UpgradeCost {
            cards: cards_needed(rarity, from, to),
            gold,
            gems: gems_for_gold(gold),
        }
    }

    pub fn add(&mut self, other: UpgradeCost) {
        self.cards += other.cards;
        self.gold += other.gold;
        self.gems = gems_for_gold(self.gold);
    }
}
