use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cards::{Role, ALL_ROLES};
use crate::deck::DECK_SIZE;
use crate::error::{DeckError, DeckResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Balanced,
    Aggro,
    Control,
    Cycle,
    Splash,
    Spell,
}

pub const ALL_STRATEGIES: [Strategy; 6] = [
    Strategy::Balanced,
    Strategy::Aggro,
    Strategy::Control,
    Strategy::Cycle,
    Strategy::Splash,
    Strategy::Spell,
];

impl Strategy {
    pub fn from_str(s: &str) -> DeckResult<Strategy> {
        match s.trim().to_ascii_lowercase().as_str() {
            "balanced" | "" => Ok(Strategy::Balanced),
            "aggro" => Ok(Strategy::Aggro),
            "control" => Ok(Strategy::Control),
            "cycle" => Ok(Strategy::Cycle),
            "splash" => Ok(Strategy::Splash),
            "spell" => Ok(Strategy::Spell),
            other => Err(DeckError::UnknownStrategy(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Balanced => "balanced",
            Strategy::Aggro => "aggro",
            Strategy::Control => "control",
            Strategy::Cycle => "cycle",
            Strategy::Splash => "splash",
            Strategy::Spell => "spell",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Role composition
// ---------------------------------------------------------------------------

/// Slot count per role, indexed by `Role::index()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleCounts(pub [usize; 6]);

impl RoleCounts {
    pub fn new(
        win_conditions: usize,
        buildings: usize,
        big_spells: usize,
        small_spells: usize,
        support: usize,
        cycle: usize,
    ) -> RoleCounts {
        RoleCounts([win_conditions, buildings, big_spells, small_spells, support, cycle])
    }

    pub fn from_roles(roles: impl IntoIterator<Item = Role>) -> RoleCounts {
        let mut counts = RoleCounts::default();
        for r in roles {
            counts.0[r.index()] += 1;
        }
        counts
    }

    pub fn get(&self, role: Role) -> usize {
        self.0[role.index()]
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    pub fn l1_distance(&self, other: &RoleCounts) -> usize {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a.abs_diff(*b))
            .sum()
    }

    pub fn distinct_roles(&self) -> usize {
        self.0.iter().filter(|&&n| n > 0).count()
    }
}

/// Hard role rules every composed deck must satisfy.
pub fn satisfies_role_rules(counts: &RoleCounts) -> bool {
    counts.get(Role::WinCondition) >= 1
        && counts.get(Role::SpellBig) >= 1
        && counts.get(Role::SpellSmall) >= 1
        && counts.get(Role::Building) <= 1
}

// ---------------------------------------------------------------------------
// StrategyConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub strategy: Strategy,
    pub target_elixir_min: f64,
    pub target_elixir_max: f64,
    /// Per-role score multipliers, indexed by `Role::index()`.
    pub role_multipliers: [f64; 6],
    pub composition: RoleCounts,
}

impl StrategyConfig {
    pub fn for_strategy(strategy: Strategy) -> StrategyConfig {
        // [win, building, big, small, support, cycle]
        let (min, max, mult, comp) = match strategy {
            Strategy::Balanced => (3.0, 3.5, [1.0; 6], RoleCounts::new(1, 1, 1, 1, 2, 2)),
            Strategy::Aggro => (
                3.5,
                4.0,
                [2.0, 0.3, 1.0, 1.0, 1.2, 1.0],
                RoleCounts::new(2, 0, 1, 1, 3, 1),
            ),
            Strategy::Control => (
                3.5,
                4.2,
                [0.5, 2.0, 1.5, 0.3, 1.0, 0.5],
                RoleCounts::new(1, 1, 2, 1, 2, 1),
            ),
            Strategy::Cycle => (
                2.5,
                3.0,
                [1.0, 1.0, 0.3, 1.2, 1.0, 2.0],
                RoleCounts::new(1, 1, 1, 1, 1, 3),
            ),
            Strategy::Splash => (
                3.2,
                3.8,
                [1.0, 1.0, 1.2, 1.0, 2.0, 0.5],
                RoleCounts::new(1, 1, 1, 1, 3, 1),
            ),
            Strategy::Spell => (
                3.2,
                3.8,
                [1.0, 0.1, 2.0, 1.5, 1.0, 1.0],
                RoleCounts::new(1, 0, 2, 1, 3, 1),
            ),
        };
        StrategyConfig {
            strategy,
            target_elixir_min: min,
            target_elixir_max: max,
            role_multipliers: mult,
            composition: comp,
        }
    }

    pub fn validate(&self) -> DeckResult<()> {
        if self.composition.total() != DECK_SIZE {
            return Err(DeckError::configuration(format!(
                "{} composition has {} slots, expected {}",
                self.strategy,
                self.composition.total(),
                DECK_SIZE
            )));
        }
        if !satisfies_role_rules(&self.composition) {
            return Err(DeckError::configuration(format!(
                "{} composition breaks the role rules",
                self.strategy
            )));
        }
        if self.target_elixir_min > self.target_elixir_max {
            return Err(DeckError::configuration(format!(
                "{} elixir window {}-{} is inverted",
                self.strategy, self.target_elixir_min, self.target_elixir_max
            )));
        }
        if self.role_multipliers.iter().any(|m| !m.is_finite() || *m < 0.0) {
            return Err(DeckError::configuration(format!(
                "{} has a negative role multiplier",
                self.strategy
            )));
        }
        Ok(())
    }

    pub fn role_multiplier(&self, role: Role) -> f64 {
        self.role_multipliers[role.index()]
    }

    /// Score shift for a card's elixir relative to the target window.
    pub fn elixir_adjustment(&self, elixir: u8) -> f64 {
        let cost = elixir as f64;
        let distance = if cost < self.target_elixir_min {
            self.target_elixir_min - cost
        } else if cost > self.target_elixir_max {
            cost - self.target_elixir_max
        } else {
            return 0.0;
        };
        if self.target_elixir_max <= 3.0 && elixir > 4 {
            -0.3 * distance
        } else {
            -0.15 * distance
        }
    }

    /// Score bonus for a card's role: zero for neutral multipliers.
    pub fn role_adjustment(&self, role: Role, base_score: f64) -> f64 {
        base_score * (self.role_multiplier(role) - 1.0) * 0.5
    }

    pub fn roles_in_fill_order(&self) -> impl Iterator<Item = (Role, usize)> + '_ {
        ALL_ROLES.iter().map(move |&r| (r, self.composition.get(r)))
    }
}

/// Source of per-strategy composition settings.
pub trait StrategyConfigProvider: Send + Sync {
    fn strategy_config(&self, strategy: Strategy) -> StrategyConfig;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinStrategies;

impl StrategyConfigProvider for BuiltinStrategies {
    fn strategy_config(&self, strategy: Strategy) -> StrategyConfig {
        StrategyConfig::for_strategy(strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_configs_are_valid() {
        for s in ALL_STRATEGIES {
            StrategyConfig::for_strategy(s).validate().unwrap();
        }
    }

    #[test]
    fn elixir_adjustment_outside_window() {
        let balanced = StrategyConfig::for_strategy(Strategy::Balanced);
        assert_eq!(balanced.elixir_adjustment(3), 0.0);
        assert!((balanced.elixir_adjustment(5) + 0.15 * 1.5).abs() < 1e-9);

        let cycle = StrategyConfig::for_strategy(Strategy::Cycle);
        assert!((cycle.elixir_adjustment(6) + 0.3 * 3.0).abs() < 1e-9);
    }

    #[test]
    fn parse_strategy() {
        assert_eq!(Strategy::from_str("Aggro").unwrap(), Strategy::Aggro);
        assert!(matches!(Strategy::from_str("turtle"), Err(DeckError::UnknownStrategy(_))));
    }

    #[test]
    fn l1_distance() {
        let a = RoleCounts::new(1, 1, 1, 1, 2, 2);
        let b = RoleCounts::new(2, 0, 1, 1, 3, 1);
        assert_eq!(a.l1_distance(&b), 4);
        assert_eq!(b.l1_distance(&a), 4);
    }
}
