//! Strategy-guided greedy deck builder.

use std::collections::BTreeSet;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::cards::{CardCandidate, Role};
use crate::deck::{Deck, DECK_SIZE, DEFAULT_EVOLUTION_SLOTS};
use crate::error::{DeckError, DeckResult, RejectionReason};
use crate::strategy::{
    satisfies_role_rules, BuiltinStrategies, RoleCounts, Strategy, StrategyConfig,
    StrategyConfigProvider,
};
use crate::synergy::{SynergyDatabase, SynergyLookup};

/// Upper bound on elixir-repair swaps before giving up.
const MAX_REPAIR_SWAPS: usize = DECK_SIZE * 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionConstraints {
    /// Cards forced into the deck; must be present in the pool.
    #[serde(default)]
    pub include: Vec<String>,
    /// Elixir window; defaults to the strategy's target window widened by half an elixir.
    #[serde(default)]
    pub elixir_window: Option<(f64, f64)>,
    #[serde(default)]
    pub unlocked_evolutions: BTreeSet<String>,
    #[serde(default = "default_slots")]
    pub evolution_slot_limit: usize,
}

fn default_slots() -> usize {
    DEFAULT_EVOLUTION_SLOTS
}

impl Default for CompositionConstraints {
    fn default() -> Self {
        CompositionConstraints {
            include: Vec::new(),
            elixir_window: None,
            unlocked_evolutions: BTreeSet::new(),
            evolution_slot_limit: DEFAULT_EVOLUTION_SLOTS,
        }
    }
}

impl CompositionConstraints {
    pub fn with_window(min: f64, max: f64) -> CompositionConstraints {
        CompositionConstraints { elixir_window: Some((min, max)), ..Default::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComposerOptions {
    pub synergy_weight: f64,
    pub uniqueness_weight: f64,
}

impl Default for ComposerOptions {
    fn default() -> Self {
        ComposerOptions { synergy_weight: 0.15, uniqueness_weight: 0.0 }
    }
}

/// Advisory notes about a composed deck.
pub fn deck_notes(deck: &Deck) -> Vec<String> {
    let counts = deck.role_counts();
    let mut notes = Vec::new();
    if counts.get(Role::Building) == 0 {
        notes.push("No defensive building: kite tanks with troops instead.".to_string());
    }
    if counts.get(Role::SpellBig) + counts.get(Role::SpellSmall) < 2 {
        notes.push("Single spell: swarms and finishing damage will be hard.".to_string());
    }
    let avg = deck.avg_elixir();
    if avg > 3.8 {
        notes.push(format!("Heavy deck ({:.1} avg): play patiently and defend first.", avg));
    } else if avg < 2.8 {
        notes.push(format!("Light deck ({:.1} avg): out-cycle the opponent's counters.", avg));
    }
    notes
}

pub struct DeckComposer<'a> {
    synergy: &'a dyn SynergyLookup,
    strategies: &'a dyn StrategyConfigProvider,
    options: ComposerOptions,
}

impl<'a> DeckComposer<'a> {
    pub fn new(
        synergy: &'a dyn SynergyLookup,
        strategies: &'a dyn StrategyConfigProvider,
        options: ComposerOptions,
    ) -> DeckComposer<'a> {
        DeckComposer { synergy, strategies, options }
    }

    /// Strategy-adjusted score for one candidate.
    fn composite(&self, card: &CardCandidate, config: &StrategyConfig) -> f64 {
        card.score
            + config.role_adjustment(card.role, card.score)
            + config.elixir_adjustment(card.elixir)
    }

    /// Mean known synergy between a card and those already chosen.
    fn synergy_with(&self, card: &CardCandidate, chosen: &[&CardCandidate]) -> f64 {
        let known: Vec<f64> = chosen
            .iter()
            .filter_map(|c| self.synergy.synergy(&card.name, &c.name))
            .collect();
        if known.is_empty() {
            0.0
        } else {
            known.iter().sum::<f64>() / known.len() as f64
        }
    }

    fn weighted(&self, card: &CardCandidate, config: &StrategyConfig, chosen: &[&CardCandidate]) -> f64 {
        self.composite(card, config)
            + self.options.synergy_weight * self.synergy_with(card, chosen)
            + self.options.uniqueness_weight * (1.0 - card.popularity).clamp(0.0, 1.0)
    }

    /// Best remaining card matching `filter`; ties go to the lexicographically smaller name.
    fn pick<'p>(
        &self,
        pool: &'p [CardCandidate],
        chosen: &[&'p CardCandidate],
        config: &StrategyConfig,
        filter: impl Fn(&CardCandidate) -> bool,
    ) -> Option<&'p CardCandidate> {
        pool.iter()
            .filter(|c| !chosen.iter().any(|p| p.name == c.name))
            .filter(|c| filter(c))
            .map(|c| (self.weighted(c, config, chosen), c))
            .max_by(|(sa, a), (sb, b)| sa.total_cmp(sb).then_with(|| b.name.cmp(&a.name)))
            .map(|(_, c)| c)
    }

    pub fn compose(
        &self,
        pool: &[CardCandidate],
        constraints: &CompositionConstraints,
        strategy: Strategy,
    ) -> DeckResult<Deck> {
        let config = self.strategies.strategy_config(strategy);
        config.validate()?;

        let unique: BTreeSet<&str> = pool.iter().map(|c| c.name.as_str()).collect();
        if unique.len() < DECK_SIZE {
            return Err(DeckError::configuration(format!(
                "pool has {} distinct cards, a deck needs {}",
                unique.len(),
                DECK_SIZE
            )));
        }
        if constraints.include.len() > DECK_SIZE {
            return Err(DeckError::configuration("more included cards than deck slots"));
        }

        let mut chosen: Vec<&CardCandidate> = Vec::with_capacity(DECK_SIZE);
        for name in &constraints.include {
            let card = pool.iter().find(|c| &c.name == name).ok_or_else(|| {
                DeckError::configuration(format!("included card '{}' is not in the pool", name))
            })?;
            if !chosen.iter().any(|c| c.name == card.name) {
                chosen.push(card);
            }
        }

        // Role slots in composition order.
        for (role, want) in config.roles_in_fill_order() {
            let have = chosen.iter().filter(|c| c.role == role).count();
            for _ in have..want {
                if chosen.len() == DECK_SIZE {
                    break;
                }
                match self.pick(pool, &chosen, &config, |c| c.role == role) {
                    Some(card) => {
                        debug!("{} slot -> {}", role, card.name);
                        chosen.push(card);
                    }
                    None => break,
                }
            }
        }

        // Remaining slots from any role, never a second building.
        while chosen.len() < DECK_SIZE {
            let buildings = chosen.iter().filter(|c| c.role == Role::Building).count();
            let next = self
                .pick(pool, &chosen, &config, |c| c.role != Role::Building || buildings == 0)
                .or_else(|| self.pick(pool, &chosen, &config, |_| true));
            match next {
                Some(card) => chosen.push(card),
                None => break,
            }
        }

        let (min, max) = constraints.elixir_window.unwrap_or((
            config.target_elixir_min - 0.5,
            config.target_elixir_max + 0.5,
        ));
        if min > max {
            return Err(DeckError::configuration(format!("elixir window {}-{} is inverted", min, max)));
        }

        let mut cards: Vec<CardCandidate> = chosen.into_iter().cloned().collect();
        self.repair_elixir(&mut cards, pool, &constraints.include, &config, min, max);

        let counts = RoleCounts::from_roles(cards.iter().map(|c| c.role));
        if cards.len() < DECK_SIZE || !satisfies_role_rules(&counts) {
            return Err(DeckError::GenerationExhausted {
                attempts: 1,
                reason: RejectionReason::RoleIncomplete,
            });
        }
        let avg = cards.iter().map(|c| c.elixir as f64).sum::<f64>() / DECK_SIZE as f64;
        if avg < min - 1e-9 || avg > max + 1e-9 {
            return Err(DeckError::GenerationExhausted {
                attempts: 1 + MAX_REPAIR_SWAPS,
                reason: RejectionReason::ElixirOutOfRange,
            });
        }

        let mut deck = Deck::new(cards)?;
        deck.assign_evolution_slots(&constraints.unlocked_evolutions, constraints.evolution_slot_limit);
        info!("composed {} deck: {} ({:.2} avg elixir)", strategy, deck.dedup_key(), avg);
        Ok(deck)
    }

    /// Same-role swaps that move the average toward `[min, max]`, cheapest score loss first.
    fn repair_elixir(
        &self,
        cards: &mut [CardCandidate],
        pool: &[CardCandidate],
        locked: &[String],
        config: &StrategyConfig,
        min: f64,
        max: f64,
    ) {
        for _ in 0..MAX_REPAIR_SWAPS {
            let total: f64 = cards.iter().map(|c| c.elixir as f64).sum();
            let avg = total / cards.len().max(1) as f64;
            let too_high = avg > max + 1e-9;
            if !too_high && avg >= min - 1e-9 {
                return;
            }

            let mut best: Option<(usize, &CardCandidate, f64)> = None;
            for (i, out) in cards.iter().enumerate() {
                if locked.contains(&out.name) {
                    continue;
                }
                for cand in pool.iter().filter(|c| c.role == out.role) {
                    if cards.iter().any(|c| c.name == cand.name) {
                        continue;
                    }
                    let helps = if too_high { cand.elixir < out.elixir } else { cand.elixir > out.elixir };
                    if !helps {
                        continue;
                    }
                    let loss = self.composite(out, config) - self.composite(cand, config);
                    let better = match &best {
                        None => true,
                        Some((_, b, l)) => {
                            loss < *l - 1e-12 || ((loss - *l).abs() <= 1e-12 && cand.name < b.name)
                        }
                    };
                    if better {
                        best = Some((i, cand, loss));
                    }
                }
            }

            match best {
                Some((i, cand, _)) => {
                    debug!("elixir repair: {} -> {}", cards[i].name, cand.name);
                    cards[i] = cand.clone();
                }
                None => return,
            }
        }
    }
}

/// Composes a deck with the built-in synergy database and strategy table.
pub fn compose_deck(
    pool: &[CardCandidate],
    constraints: &CompositionConstraints,
    strategy: Strategy,
) -> DeckResult<Deck> {
    DeckComposer::new(SynergyDatabase::builtin(), &BuiltinStrategies, ComposerOptions::default())
        .compose(pool, constraints, strategy)
}
