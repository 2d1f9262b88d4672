//! Randomised parallel deck search.
//!
//! A fixed pool of workers each draw role-valid random decks from the
//! candidate pool with their own seeded RNG, drop decks outside the elixir
//! window or below the score floors, and send survivors down one channel.
//! The collector keeps the best `top_k` decks with distinct dedup keys.
//!
//! Draws are plain score-weighted, seeded from synergy pairs, or seeded from
//! evolution-capable cards, depending on [`FuzzMode`].

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::archetypes::ArchetypeClassifier;
use crate::candidates::validate_include_exclude;
use crate::cards::{CardCandidate, ALL_ROLES};
use crate::deck::{Deck, DECK_SIZE};
use crate::error::{DeckError, DeckResult, RejectionReason};
use crate::evaluation::{EvaluatedDeck, Evaluator, ScoringWeights};
use crate::strategy::{satisfies_role_rules, RoleCounts, Strategy, StrategyConfig};
use crate::synergy::{SynergyDatabase, SynergyLookup};

/// Disjoint synergy pairs placed before role filling in synergy-first mode.
const SYNERGY_SEED_PAIRS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuzzMode {
    #[default]
    Random,
    /// Up to four disjoint synergy pairs, then role filling.
    SynergyFirst,
    /// Evolution-capable cards weighted by level and evolution progress, then role filling.
    EvolutionCentric,
}

impl FuzzMode {
    pub fn from_str(s: &str) -> DeckResult<FuzzMode> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "random" | "" => Ok(FuzzMode::Random),
            "synergy_first" | "synergy" => Ok(FuzzMode::SynergyFirst),
            "evolution_centric" | "evolution" | "evo" => Ok(FuzzMode::EvolutionCentric),
            other => Err(DeckError::configuration(format!("unknown fuzz mode '{}'", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FuzzMode::Random => "random",
            FuzzMode::SynergyFirst => "synergy_first",
            FuzzMode::EvolutionCentric => "evolution_centric",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzingConfig {
    /// Candidate decks to generate across all workers.
    pub count: usize,
    pub workers: usize,
    pub seed: u64,
    pub top_k: usize,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub min_avg_elixir: f64,
    pub max_avg_elixir: f64,
    pub min_overall_score: f64,
    /// Floor on the synergy category score, 0-10.
    pub min_synergy_score: f64,
    /// Wall-clock cap; runs that hit it are no longer reproducible.
    pub time_budget_ms: Option<u64>,
    pub strategy: Strategy,
    pub weights: ScoringWeights,
    pub mode: FuzzMode,
    /// Evolution-capable cards every evolution-centric deck must hold.
    pub min_evolution_cards: usize,
    pub min_evo_level: u8,
    /// Scales the evolution bonuses when seeding evolution-centric decks.
    pub evo_weight: f64,
    /// Draws per candidate before it is rejected for its last failure.
    pub max_retries: usize,
}

impl Default for FuzzingConfig {
    fn default() -> Self {
        FuzzingConfig {
            count: 1000,
            workers: 1,
            seed: 0,
            top_k: 10,
            include: Vec::new(),
            exclude: Vec::new(),
            min_avg_elixir: 0.0,
            max_avg_elixir: 10.0,
            min_overall_score: 0.0,
            min_synergy_score: 0.0,
            time_budget_ms: None,
            strategy: Strategy::Balanced,
            weights: ScoringWeights::default(),
            mode: FuzzMode::Random,
            min_evolution_cards: 3,
            min_evo_level: 1,
            evo_weight: 0.3,
            max_retries: 100,
        }
    }
}

impl FuzzingConfig {
    pub fn validate(&self) -> DeckResult<()> {
        validate_include_exclude(&self.include, &self.exclude)?;
        if self.workers == 0 {
            return Err(DeckError::configuration("at least one worker is required"));
        }
        if self.min_avg_elixir > self.max_avg_elixir {
            return Err(DeckError::configuration(format!(
                "elixir window {}-{} is inverted",
                self.min_avg_elixir, self.max_avg_elixir
            )));
        }
        if !(0.0..=10.0).contains(&self.min_overall_score) {
            return Err(DeckError::configuration("min_overall_score must be within 0-10"));
        }
        if !(0.0..=10.0).contains(&self.min_synergy_score) {
            return Err(DeckError::configuration("min_synergy_score must be within 0-10"));
        }
        if self.max_retries == 0 {
            return Err(DeckError::configuration("max_retries must be at least 1"));
        }
        if self.mode == FuzzMode::EvolutionCentric {
            if self.min_evolution_cards > DECK_SIZE {
                return Err(DeckError::configuration(format!(
                    "min_evolution_cards {} exceeds the deck size",
                    self.min_evolution_cards
                )));
            }
            if !self.evo_weight.is_finite() || self.evo_weight <= 0.0 {
                return Err(DeckError::configuration("evo_weight must be positive"));
            }
        }
        Ok(())
    }

    /// Decks worker `w` generates; the remainder goes to the first workers.
    fn quota(&self, worker: usize) -> usize {
        self.count / self.workers + usize::from(worker < self.count % self.workers)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzingStats {
    pub generated: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped_role: usize,
    pub skipped_elixir: usize,
    pub skipped_score: usize,
    pub skipped_synergy: usize,
    pub skipped_evolution: usize,
    /// Draws thrown away before a candidate passed or was rejected.
    pub retries: usize,
    pub elapsed_ms: u64,
    pub cancelled: bool,
    pub budget_exhausted: bool,
}

impl FuzzingStats {
    /// Most frequent rejection so far; role-incomplete when nothing was rejected.
    pub fn dominant_rejection(&self) -> RejectionReason {
        [
            (self.skipped_role, RejectionReason::RoleIncomplete),
            (self.skipped_elixir, RejectionReason::ElixirOutOfRange),
            (self.skipped_score, RejectionReason::BelowScoreThreshold),
            (self.skipped_synergy, RejectionReason::BelowSynergyThreshold),
            (self.skipped_evolution, RejectionReason::TooFewEvolutions),
        ]
        .iter()
        .fold((0, RejectionReason::RoleIncomplete), |best, &(n, r)| if n > best.0 { (n, r) } else { best })
        .1
    }
}

#[derive(Default)]
struct Counters {
    generated: AtomicUsize,
    success: AtomicUsize,
    failed: AtomicUsize,
    skipped_role: AtomicUsize,
    skipped_elixir: AtomicUsize,
    skipped_score: AtomicUsize,
    skipped_synergy: AtomicUsize,
    skipped_evolution: AtomicUsize,
    retries: AtomicUsize,
    budget_exhausted: AtomicBool,
}

impl Counters {
    fn reject(&self, reason: RejectionReason) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        let slot = match reason {
            RejectionReason::ElixirOutOfRange => &self.skipped_elixir,
            RejectionReason::BelowScoreThreshold => &self.skipped_score,
            RejectionReason::BelowSynergyThreshold => &self.skipped_synergy,
            RejectionReason::TooFewEvolutions => &self.skipped_evolution,
            _ => &self.skipped_role,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, elapsed: Duration, cancelled: bool) -> FuzzingStats {
        FuzzingStats {
            generated: self.generated.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped_role: self.skipped_role.load(Ordering::Relaxed),
            skipped_elixir: self.skipped_elixir.load(Ordering::Relaxed),
            skipped_score: self.skipped_score.load(Ordering::Relaxed),
            skipped_synergy: self.skipped_synergy.load(Ordering::Relaxed),
            skipped_evolution: self.skipped_evolution.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            elapsed_ms: elapsed.as_millis() as u64,
            cancelled,
            budget_exhausted: self.budget_exhausted.load(Ordering::Relaxed),
        }
    }
}

/// Shared cancel flag, checked between candidate evaluations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzOutcome {
    /// Best distinct decks, highest overall score first.
    pub decks: Vec<EvaluatedDeck>,
    pub stats: FuzzingStats,
}

// ---------------------------------------------------------------------------
// Top-K collector
// ---------------------------------------------------------------------------

struct TopK {
    k: usize,
    entries: BTreeMap<String, EvaluatedDeck>,
}

impl TopK {
    fn new(k: usize) -> TopK {
        TopK { k, entries: BTreeMap::new() }
    }

    fn offer(&mut self, deck: EvaluatedDeck) {
        if self.k == 0 {
            return;
        }
        // Same card set from two workers: keep the smaller name so arrival order doesn't matter.
        match self.entries.entry(deck.deck.dedup_key()) {
            Entry::Vacant(slot) => {
                slot.insert(deck);
            }
            Entry::Occupied(mut slot) => {
                if deck.name < slot.get().name {
                    slot.insert(deck);
                }
            }
        }
        if self.entries.len() > self.k * 4 {
            self.prune();
        }
    }

    fn ranked(&self) -> Vec<(&String, &EvaluatedDeck)> {
        let mut v: Vec<(&String, &EvaluatedDeck)> = self.entries.iter().collect();
        v.sort_by(|(ka, a), (kb, b)| {
            b.result
                .overall_score
                .total_cmp(&a.result.overall_score)
                .then_with(|| ka.cmp(kb))
        });
        v
    }

    fn prune(&mut self) {
        let keep: BTreeSet<String> = self.ranked().into_iter().take(self.k).map(|(k, _)| k.clone()).collect();
        self.entries.retain(|k, _| keep.contains(k));
    }

    fn into_sorted(mut self) -> Vec<EvaluatedDeck> {
        self.prune();
        let order: Vec<String> = self.ranked().into_iter().map(|(k, _)| k.clone()).collect();
        order.into_iter().filter_map(|k| self.entries.remove(&k)).collect()
    }
}

// ---------------------------------------------------------------------------
// Searcher
// ---------------------------------------------------------------------------

pub struct FuzzSearcher<'a> {
    synergy: &'a dyn SynergyLookup,
    classifier: &'a ArchetypeClassifier,
    cancel: CancelToken,
}

/// Candidates grouped by role, read-only across workers.
struct RolePools<'p> {
    by_role: [Vec<&'p CardCandidate>; 6],
    included: Vec<&'p CardCandidate>,
    /// Known synergy pairs with both cards eligible.
    synergy_pairs: Vec<(&'p CardCandidate, &'p CardCandidate)>,
    /// Evolution-capable cards outside the include list.
    evolution: Vec<&'p CardCandidate>,
}

impl<'a> FuzzSearcher<'a> {
    pub fn new(synergy: &'a dyn SynergyLookup, classifier: &'a ArchetypeClassifier) -> FuzzSearcher<'a> {
        FuzzSearcher { synergy, classifier, cancel: CancelToken::new() }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> FuzzSearcher<'a> {
        self.cancel = cancel;
        self
    }

    pub fn run(&self, pool: &[CardCandidate], config: &FuzzingConfig) -> DeckResult<FuzzOutcome> {
        config.validate()?;
        let start = Instant::now();
        if config.count == 0 {
            return Ok(FuzzOutcome { decks: Vec::new(), stats: FuzzingStats::default() });
        }

        let pools = self.role_pools(pool, config)?;
        let composition = StrategyConfig::for_strategy(config.strategy).composition;
        let counters = Counters::default();
        let deadline = config.time_budget_ms.map(|ms| start + Duration::from_millis(ms));

        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .build()
            .map_err(|e| DeckError::configuration(format!("cannot start workers: {}", e)))?;

        info!(
            "fuzz search: {} decks over {} workers (seed {}, mode {})",
            config.count,
            config.workers,
            config.seed,
            config.mode.as_str()
        );

        let (tx, rx) = mpsc::channel::<EvaluatedDeck>();
        let top = std::thread::scope(|scope| {
            let pools = &pools;
            let counters = &counters;
            let composition = &composition;
            scope.spawn(move || {
                thread_pool.install(|| {
                    (0..config.workers).into_par_iter().for_each_with(tx, |tx, worker| {
                        self.run_worker(worker, pools, composition, config, counters, deadline, tx);
                    });
                });
            });

            let mut top = TopK::new(config.top_k);
            for deck in rx {
                top.offer(deck);
            }
            top
        });

        let cancelled = self.cancel.is_cancelled();
        let stats = counters.snapshot(start.elapsed(), cancelled);
        info!(
            "fuzz search done: generated {}, success {}, failed {} in {} ms",
            stats.generated, stats.success, stats.failed, stats.elapsed_ms
        );

        if stats.success == 0 && !cancelled && !stats.budget_exhausted {
            return Err(DeckError::GenerationExhausted {
                attempts: stats.generated,
                reason: stats.dominant_rejection(),
            });
        }
        if stats.success == 0 {
            warn!("fuzz search stopped early without a surviving deck");
        }
        Ok(FuzzOutcome { decks: top.into_sorted(), stats })
    }

    fn role_pools<'p>(&self, pool: &'p [CardCandidate], config: &FuzzingConfig) -> DeckResult<RolePools<'p>> {
        let excluded: BTreeSet<&str> = config.exclude.iter().map(|s| s.as_str()).collect();
        let mut seen = BTreeSet::new();
        let eligible: Vec<&CardCandidate> = pool
            .iter()
            .filter(|c| !excluded.contains(c.name.as_str()))
            .filter(|c| seen.insert(c.name.as_str()))
            .collect();

        let mut included = Vec::new();
        for name in &config.include {
            let card = eligible.iter().find(|c| &c.name == name).ok_or_else(|| {
                DeckError::configuration(format!("included card '{}' is not in the pool", name))
            })?;
            if !included.iter().any(|c: &&CardCandidate| c.name == card.name) {
                included.push(*card);
            }
        }
        if eligible.len() < DECK_SIZE {
            return Err(DeckError::configuration(format!(
                "pool has {} eligible cards, a deck needs {}",
                eligible.len(),
                DECK_SIZE
            )));
        }

        let find = |name: &str| eligible.iter().find(|c| c.name == name).copied();
        let synergy_pairs: Vec<(&CardCandidate, &CardCandidate)> = self
            .synergy
            .known_pairs()
            .into_iter()
            .filter_map(|p| Some((find(p.card_a.as_str())?, find(p.card_b.as_str())?)))
            .collect();
        if config.mode == FuzzMode::SynergyFirst && synergy_pairs.len() < SYNERGY_SEED_PAIRS {
            return Err(DeckError::configuration(format!(
                "pool holds {} synergy pairs, synergy-first needs {}",
                synergy_pairs.len(),
                SYNERGY_SEED_PAIRS
            )));
        }

        let evolution_total = eligible.iter().filter(|c| evolution_ready(c, config.min_evo_level)).count();
        if config.mode == FuzzMode::EvolutionCentric && evolution_total < config.min_evolution_cards {
            return Err(DeckError::configuration(format!(
                "pool holds {} evolution-capable cards, {} required",
                evolution_total, config.min_evolution_cards
            )));
        }

        let mut by_role: [Vec<&CardCandidate>; 6] = Default::default();
        let mut evolution = Vec::new();
        for c in eligible {
            if !included.iter().any(|i| i.name == c.name) {
                by_role[c.role.index()].push(c);
                if evolution_ready(c, config.min_evo_level) {
                    evolution.push(c);
                }
            }
        }
        Ok(RolePools { by_role, included, synergy_pairs, evolution })
    }

    #[allow(clippy::too_many_arguments)]
    fn run_worker(
        &self,
        worker: usize,
        pools: &RolePools<'_>,
        composition: &RoleCounts,
        config: &FuzzingConfig,
        counters: &Counters,
        deadline: Option<Instant>,
        tx: &mut mpsc::Sender<EvaluatedDeck>,
    ) {
        let seed = config.seed.wrapping_add(worker as u64);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let evaluator = Evaluator::new(config.weights, self.synergy, self.classifier);
        let quota = config.quota(worker);
        debug!("worker {} starting: {} decks, seed {}", worker, quota, seed);

        for i in 0..quota {
            if self.cancel.is_cancelled() {
                debug!("worker {} cancelled after {} decks", worker, i);
                return;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                counters.budget_exhausted.store(true, Ordering::Relaxed);
                return;
            }

            counters.generated.fetch_add(1, Ordering::Relaxed);
            let cards = match draw_deck(&mut rng, pools, composition, config, counters) {
                Ok(cards) => cards,
                Err(reason) => {
                    counters.reject(reason);
                    continue;
                }
            };

            let deck = match Deck::new(cards.into_iter().cloned().collect()) {
                Ok(d) => d,
                Err(_) => {
                    counters.reject(RejectionReason::RoleIncomplete);
                    continue;
                }
            };
            let result = match evaluator.evaluate(&deck, None) {
                Ok(r) => r,
                Err(e) => {
                    warn!("worker {}: evaluation failed: {}", worker, e);
                    counters.reject(RejectionReason::RoleIncomplete);
                    continue;
                }
            };
            if result.overall_score < config.min_overall_score {
                counters.reject(RejectionReason::BelowScoreThreshold);
                continue;
            }
            if result.categories.synergy.score < config.min_synergy_score {
                counters.reject(RejectionReason::BelowSynergyThreshold);
                continue;
            }

            counters.success.fetch_add(1, Ordering::Relaxed);
            let name = format!("fuzz-{}-{}", worker, i);
            if tx.send(EvaluatedDeck::new(name, config.strategy, deck, result)).is_err() {
                return;
            }
        }
    }
}

/// Draws until a deck passes the cheap checks or the retry allowance runs
/// out, returning the last failure in that case.
fn draw_deck<'p>(
    rng: &mut ChaCha8Rng,
    pools: &RolePools<'p>,
    composition: &RoleCounts,
    config: &FuzzingConfig,
    counters: &Counters,
) -> Result<Vec<&'p CardCandidate>, RejectionReason> {
    let mut last = RejectionReason::RoleIncomplete;
    for attempt in 0..config.max_retries {
        if attempt > 0 {
            counters.retries.fetch_add(1, Ordering::Relaxed);
        }
        let cards = match config.mode {
            FuzzMode::Random => fill_by_role(rng, pools, composition, pools.included.clone()),
            FuzzMode::SynergyFirst => synergy_deck(rng, pools, composition),
            FuzzMode::EvolutionCentric => evolution_deck(rng, pools, composition, config),
        };
        match check_drawn(&cards, config) {
            Ok(()) => return Ok(cards),
            Err(reason) => last = reason,
        }
    }
    Err(last)
}

fn check_drawn(cards: &[&CardCandidate], config: &FuzzingConfig) -> Result<(), RejectionReason> {
    let counts = RoleCounts::from_roles(cards.iter().map(|c| c.role));
    if cards.len() != DECK_SIZE || !satisfies_role_rules(&counts) {
        return Err(RejectionReason::RoleIncomplete);
    }
    if config.mode == FuzzMode::EvolutionCentric
        && cards.iter().filter(|c| evolution_ready(c, config.min_evo_level)).count() < config.min_evolution_cards
    {
        return Err(RejectionReason::TooFewEvolutions);
    }
    let avg = cards.iter().map(|c| c.elixir as f64).sum::<f64>() / DECK_SIZE as f64;
    if avg < config.min_avg_elixir || avg > config.max_avg_elixir {
        return Err(RejectionReason::ElixirOutOfRange);
    }
    Ok(())
}

/// Has an evolution that is either unlocked to `min_evo_level` or still open.
fn evolution_ready(c: &CardCandidate, min_evo_level: u8) -> bool {
    c.has_evolution() && (c.evolution_level >= min_evo_level || c.evolution_level < c.max_evolution_level)
}

/// Level ratio on a 0-10 scale plus evolution bonuses scaled by `evo_weight`.
fn evolution_weight(c: &CardCandidate, config: &FuzzingConfig) -> f64 {
    let mut w = if c.max_level == 0 { 0.0 } else { 10.0 * c.level as f64 / c.max_level as f64 };
    if c.evolution_level > 0 && c.evolution_level >= config.min_evo_level {
        w += 3.0 * c.evolution_level as f64 * config.evo_weight;
    }
    if c.evolution_level < c.max_evolution_level {
        w += 2.0 * config.evo_weight;
    }
    w
}

fn score_weight(c: &CardCandidate) -> f64 {
    c.score
}

/// Weighted pick from `options`, skipping cards already taken.
fn weighted_pick<'p>(
    rng: &mut ChaCha8Rng,
    options: &[&'p CardCandidate],
    taken: &[&'p CardCandidate],
    weight: impl Fn(&CardCandidate) -> f64,
) -> Option<&'p CardCandidate> {
    let open: Vec<&'p CardCandidate> = options
        .iter()
        .copied()
        .filter(|c| !taken.iter().any(|t| t.name == c.name))
        .collect();
    if open.is_empty() {
        return None;
    }
    let total: f64 = open.iter().map(|c| weight(*c).max(0.01)).sum();
    let mut roll = rng.gen::<f64>() * total;
    for c in &open {
        roll -= weight(*c).max(0.01);
        if roll <= 0.0 {
            return Some(*c);
        }
    }
    open.last().copied()
}

/// Included cards, then up to four disjoint synergy pairs in shuffled order.
fn synergy_deck<'p>(rng: &mut ChaCha8Rng, pools: &RolePools<'p>, composition: &RoleCounts) -> Vec<&'p CardCandidate> {
    let mut deck: Vec<&'p CardCandidate> = pools.included.clone();
    let mut pairs = pools.synergy_pairs.clone();
    pairs.shuffle(rng);

    let mut seeded = 0;
    for (a, b) in pairs {
        if seeded == SYNERGY_SEED_PAIRS || deck.len() + 2 > DECK_SIZE {
            break;
        }
        if deck.iter().any(|c| c.name == a.name || c.name == b.name) {
            continue;
        }
        deck.push(a);
        deck.push(b);
        seeded += 1;
    }
    fill_by_role(rng, pools, composition, deck)
}

/// Included cards, then evolution-capable cards until the minimum is met.
fn evolution_deck<'p>(
    rng: &mut ChaCha8Rng,
    pools: &RolePools<'p>,
    composition: &RoleCounts,
    config: &FuzzingConfig,
) -> Vec<&'p CardCandidate> {
    let mut deck: Vec<&'p CardCandidate> = pools.included.clone();
    let mut have = deck.iter().filter(|c| evolution_ready(c, config.min_evo_level)).count();
    while have < config.min_evolution_cards && deck.len() < DECK_SIZE {
        match weighted_pick(rng, &pools.evolution, &deck, |c| evolution_weight(c, config)) {
            Some(c) => {
                deck.push(c);
                have += 1;
            }
            None => break,
        }
    }
    fill_by_role(rng, pools, composition, deck)
}

/// Tops `deck` up to the strategy's role counts, then backfills from any role.
fn fill_by_role<'p>(
    rng: &mut ChaCha8Rng,
    pools: &RolePools<'p>,
    composition: &RoleCounts,
    mut deck: Vec<&'p CardCandidate>,
) -> Vec<&'p CardCandidate> {
    for role in ALL_ROLES {
        let have = deck.iter().filter(|c| c.role == role).count();
        for _ in have..composition.get(role) {
            if deck.len() == DECK_SIZE {
                break;
            }
            match weighted_pick(rng, &pools.by_role[role.index()], &deck, score_weight) {
                Some(c) => deck.push(c),
                None => break,
            }
        }
    }

    // Short roles are backfilled from any role.
    let everything: Vec<&'p CardCandidate> = pools.by_role.iter().flatten().copied().collect();
    while deck.len() < DECK_SIZE {
        match weighted_pick(rng, &everything, &deck, score_weight) {
            Some(c) => deck.push(c),
            None => break,
        }
    }
    deck
}

/// Runs a search with the built-in synergy database and templates.
pub fn fuzz_search(pool: &[CardCandidate], config: &FuzzingConfig) -> DeckResult<FuzzOutcome> {
    FuzzSearcher::new(SynergyDatabase::builtin(), ArchetypeClassifier::builtin()).run(pool, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_pool() -> Vec<CardCandidate> {
        crate::cards::card_table()
            .all()
            .iter()
            .map(|c| {
                let mut cand = CardCandidate::at_level(&c.name, 12).unwrap();
                cand.score = crate::candidates::score_card(&cand, &Default::default());
                cand
            })
            .collect()
    }

    #[test]
    fn zero_count_is_empty() {
        let out = fuzz_search(&full_pool(), &FuzzingConfig { count: 0, ..Default::default() }).unwrap();
        assert!(out.decks.is_empty());
        assert_eq!(out.stats, FuzzingStats::default());
    }

    #[test]
    fn conflicting_lists_fail_before_search() {
        let config = FuzzingConfig {
            include: vec!["Zap".into()],
            exclude: vec!["Zap".into()],
            ..Default::default()
        };
        assert!(matches!(fuzz_search(&full_pool(), &config), Err(DeckError::Configuration(_))));
    }

    #[test]
    fn quota_covers_count() {
        let config = FuzzingConfig { count: 10, workers: 3, ..Default::default() };
        assert_eq!((0..3).map(|w| config.quota(w)).sum::<usize>(), 10);
    }

    #[test]
    fn results_are_distinct_and_sorted() {
        let config = FuzzingConfig { count: 200, workers: 2, seed: 7, top_k: 5, ..Default::default() };
        let out = fuzz_search(&full_pool(), &config).unwrap();
        assert!(!out.decks.is_empty());
        let keys: BTreeSet<String> = out.decks.iter().map(|d| d.deck.dedup_key()).collect();
        assert_eq!(keys.len(), out.decks.len());
        assert!(out
            .decks
            .windows(2)
            .all(|w| w[0].result.overall_score >= w[1].result.overall_score));
        assert_eq!(out.stats.generated, 200);
        assert_eq!(out.stats.success + out.stats.failed, 200);
    }

    #[test]
    fn impossible_window_exhausts() {
        let config = FuzzingConfig {
            count: 50,
            min_avg_elixir: 8.5,
            max_avg_elixir: 9.0,
            ..Default::default()
        };
        match fuzz_search(&full_pool(), &config) {
            Err(DeckError::GenerationExhausted { attempts, reason }) => {
                assert_eq!(attempts, 50);
                assert_eq!(reason, RejectionReason::ElixirOutOfRange);
            }
            other => panic!("expected exhaustion, got {:?}", other.map(|o| o.stats)),
        }
    }

    #[test]
    fn mode_parse() {
        assert_eq!(FuzzMode::from_str("synergy-first").unwrap(), FuzzMode::SynergyFirst);
        assert_eq!(FuzzMode::from_str("evo").unwrap(), FuzzMode::EvolutionCentric);
        assert_eq!(FuzzMode::from_str("").unwrap(), FuzzMode::Random);
        assert!(FuzzMode::from_str("chaos").is_err());
    }

    #[test]
    fn new_options_are_validated() {
        let bad = [
            FuzzingConfig { min_synergy_score: 10.5, ..Default::default() },
            FuzzingConfig { max_retries: 0, ..Default::default() },
            FuzzingConfig { mode: FuzzMode::EvolutionCentric, min_evolution_cards: 9, ..Default::default() },
            FuzzingConfig { mode: FuzzMode::EvolutionCentric, evo_weight: 0.0, ..Default::default() },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(DeckError::Configuration(_))));
        }
    }

    #[test]
    fn evolution_ready_needs_an_evolution() {
        let mut c = CardCandidate::at_level("Knight", 12).unwrap();
        c.max_evolution_level = 0;
        assert!(!evolution_ready(&c, 0));
        c.max_evolution_level = 1;
        assert!(evolution_ready(&c, 1));
        c.evolution_level = 1;
        assert!(evolution_ready(&c, 1));
        assert!(!evolution_ready(&c, 2));
    }

    #[test]
    fn unlocked_evolution_weighs_more() {
        let config = FuzzingConfig::default();
        let mut c = CardCandidate::at_level("Knight", 12).unwrap();
        c.max_evolution_level = 1;
        let open = evolution_weight(&c, &config);
        c.evolution_level = 1;
        let unlocked = evolution_weight(&c, &config);
        assert!(unlocked > open);
        assert!(open > 10.0 * 12.0 / c.max_level as f64);
    }

    #[test]
    fn single_draw_has_no_retries() {
        let config = FuzzingConfig { count: 100, seed: 4, max_retries: 1, ..Default::default() };
        let out = fuzz_search(&full_pool(), &config).unwrap();
        assert_eq!(out.stats.retries, 0);
    }

    #[test]
    fn cancelled_run_returns_partial() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let out = FuzzSearcher::new(SynergyDatabase::builtin(), ArchetypeClassifier::builtin())
            .with_cancel(cancel)
            .run(&full_pool(), &FuzzingConfig { count: 100, ..Default::default() })
            .unwrap();
        assert!(out.stats.cancelled);
        assert_eq!(out.stats.generated, 0);
    }
}
