use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use itertools::Itertools;
use log::info;
use serde::Serialize;

use crate::archetypes::{ArchetypeClassifier, VarietySort};
use crate::candidates::{
    CandidateGenerator, CandidateWeights, CardCollectionProvider, JsonCollectionFile, PoolConstraints,
};
use crate::cards::{CardCandidate, Collection, Rarity};
use crate::composer::{compose_deck, deck_notes, CompositionConstraints};
use crate::deck::Deck;
use crate::error::{DeckError, DeckResult};
use crate::evaluation::{stars_for, DeckRecord, EvaluatedDeck, Evaluator, PlayerContext, ScoringWeights};
use crate::fuzz::{fuzz_search, FuzzMode, FuzzingConfig};
use crate::leaderboard::{Leaderboard, LeaderboardEntry, QueryOptions, SortField, SortOrder};
use crate::strategy::Strategy;
use crate::synergy::SynergyDatabase;
use crate::upgrades::REFERENCE_LEVEL;

#[derive(Parser)]
#[command(name = "deckforge", version = "1.0.0", about = "Deck builder, evaluator and leaderboard for card battle decks.")]
struct Cli {
    /// Print machine-readable JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum Order {
    Asc,
    Desc,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose one deck from a collection snapshot
    Build {
        /// Collection JSON file
        #[arg(short, long)]
        collection: String,
        /// Player tag (e.g., #ABC123)
        #[arg(short, long)]
        player: String,
        /// Strategy (balanced, aggro, control, cycle, splash, spell)
        #[arg(short, long, default_value = "balanced")]
        strategy: String,
        /// Cards that must be in the deck
        #[arg(long, value_delimiter = ',')]
        include: Vec<String>,
        /// Cards that must not be in the deck
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
        #[arg(long)]
        min_level: Option<u8>,
        /// Allowed rarities (common, rare, epic, legendary, champion)
        #[arg(long, value_delimiter = ',')]
        rarity: Vec<String>,
        #[arg(long)]
        min_elixir: Option<f64>,
        #[arg(long)]
        max_elixir: Option<f64>,
        /// Cards with unlocked evolutions
        #[arg(long, value_delimiter = ',')]
        evolutions: Vec<String>,
        /// Record the result on the player's leaderboard
        #[arg(long)]
        save: bool,
    },
    /// Score eight named cards
    Evaluate {
        /// Exactly eight card names, comma separated
        #[arg(value_delimiter = ',')]
        cards: Vec<String>,
        /// Level used when no collection is given
        #[arg(short, long, default_value = "11")]
        level: u8,
        /// Collection JSON file; card levels come from it
        #[arg(short, long)]
        collection: Option<String>,
        #[arg(short, long)]
        player: Option<String>,
        #[arg(long)]
        save: bool,
    },
    /// Randomly search for the best decks in a collection
    Fuzz {
        #[arg(short, long)]
        collection: String,
        #[arg(short, long)]
        player: String,
        #[arg(short = 'n', long, default_value = "1000")]
        count: usize,
        #[arg(short, long, default_value = "1")]
        workers: usize,
        #[arg(long, default_value = "0")]
        seed: u64,
        #[arg(long, default_value = "10")]
        top: usize,
        #[arg(short, long, default_value = "balanced")]
        strategy: String,
        #[arg(long, value_delimiter = ',')]
        include: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
        #[arg(long, default_value = "0")]
        min_elixir: f64,
        #[arg(long, default_value = "10")]
        max_elixir: f64,
        #[arg(long, default_value = "0")]
        min_score: f64,
        /// Reject decks whose synergy score is below this (0-10)
        #[arg(long, default_value = "0")]
        min_synergy: f64,
        /// Generation mode (random, synergy-first, evolution-centric)
        #[arg(long, default_value = "random")]
        mode: String,
        /// Evolution-capable cards required in evolution-centric mode
        #[arg(long, default_value = "3")]
        min_evo_cards: usize,
        #[arg(long, default_value = "1")]
        min_evo_level: u8,
        #[arg(long, default_value = "0.3")]
        evo_weight: f64,
        /// Draws per candidate before it is rejected
        #[arg(long, default_value = "100")]
        max_retries: usize,
        /// Stop after this many milliseconds (breaks reproducibility)
        #[arg(long)]
        time_budget_ms: Option<u64>,
        #[arg(long)]
        save: bool,
    },
    /// Upgrade investment needed for each archetype
    Archetypes {
        #[arg(short, long)]
        collection: String,
        #[arg(short, long)]
        player: String,
        #[arg(long, default_value_t = REFERENCE_LEVEL)]
        target_level: u8,
        /// Sort by distance, cards_needed or avg_level
        #[arg(long, default_value = "distance")]
        sort: String,
    },
    /// Inspect or reset a player's leaderboard
    Leaderboard {
        #[command(subcommand)]
        action: LeaderboardAction,
    },
}

#[derive(Subcommand)]
enum LeaderboardAction {
    /// List stored decks
    Show {
        #[arg(short, long)]
        player: String,
        #[arg(long, default_value = "10")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
        #[arg(long, default_value = "overall")]
        sort: String,
        #[arg(long, default_value = "desc")]
        order: Order,
        #[arg(long)]
        archetype: Option<String>,
        #[arg(long)]
        strategy: Option<String>,
        #[arg(long)]
        min_score: Option<f64>,
        /// Decks must contain all of these
        #[arg(long, value_delimiter = ',')]
        require: Vec<String>,
        /// Decks must contain none of these
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
    },
    /// Aggregate stats
    Stats {
        #[arg(short, long)]
        player: String,
        /// Recompute from stored rows
        #[arg(long)]
        recalculate: bool,
    },
    /// Delete every stored deck for a player
    Clear {
        #[arg(short, long)]
        player: String,
    },
}

pub fn run() {
    let cli = Cli::parse();
    dispatch(cli);
}

pub fn run_with_args(args: Vec<String>) {
    let cli = Cli::parse_from(args);
    dispatch(cli);
}

fn dispatch(cli: Cli) {
    let json = cli.json;
    let result = match cli.command {
        Commands::Build {
            collection,
            player,
            strategy,
            include,
            exclude,
            min_level,
            rarity,
            min_elixir,
            max_elixir,
            evolutions,
            save,
        } => {
            let pool = PoolArgs { include, exclude, min_level, rarity };
            let window = min_elixir.zip(max_elixir);
            cmd_build(&collection, &player, &strategy, pool, window, evolutions, save, json)
        }
        Commands::Evaluate { cards, level, collection, player, save } => {
            cmd_evaluate(cards, level, collection, player, save, json)
        }
        Commands::Fuzz {
            collection,
            player,
            count,
            workers,
            seed,
            top,
            strategy,
            include,
            exclude,
            min_elixir,
            max_elixir,
            min_score,
            min_synergy,
            mode,
            min_evo_cards,
            min_evo_level,
            evo_weight,
            max_retries,
            time_budget_ms,
            save,
        } => Strategy::from_str(&strategy).and_then(|strategy| {
            let mode = FuzzMode::from_str(&mode)?;
            let config = FuzzingConfig {
                count,
                workers,
                seed,
                top_k: top,
                include,
                exclude,
                min_avg_elixir: min_elixir,
                max_avg_elixir: max_elixir,
                min_overall_score: min_score,
                min_synergy_score: min_synergy,
                time_budget_ms,
                strategy,
                weights: ScoringWeights::default(),
                mode,
                min_evolution_cards: min_evo_cards,
                min_evo_level,
                evo_weight,
                max_retries,
            };
            cmd_fuzz(&collection, &player, config, save, json)
        }),
        Commands::Archetypes { collection, player, target_level, sort } => {
            cmd_archetypes(&collection, &player, target_level, &sort, json)
        }
        Commands::Leaderboard { action } => cmd_leaderboard(action, json),
    };

    if let Err(e) = result {
        print_error(&e.to_string());
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct PoolArgs {
    include: Vec<String>,
    exclude: Vec<String>,
    min_level: Option<u8>,
    rarity: Vec<String>,
}

fn print_error(msg: &str) {
    eprintln!("{} {}", "Error:".red().bold(), msg);
}

fn print_json<T: Serialize>(value: &T) -> DeckResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_collection(path: &str, player: &str) -> DeckResult<Collection> {
    let collection = JsonCollectionFile::new(path).collection(player)?;
    info!("loaded {} cards for {} from {}", collection.len(), player, path);
    Ok(collection)
}

fn candidate_pool(collection: &Collection, constraints: &PoolConstraints) -> DeckResult<Vec<CardCandidate>> {
    CandidateGenerator::new(CandidateWeights::default()).generate(collection, constraints)
}

fn print_deck(record: &EvaluatedDeck) {
    let r = record.result();
    println!();
    println!(
        "  {}  {}",
        record.name().bold(),
        record.deck().names().iter().join(", ").cyan()
    );
    println!(
        "  Overall {:.1} ({}) {}  | {} ({:.0}%)  | avg elixir {:.2}",
        r.overall_score,
        r.overall_rating,
        "*".repeat(stars_for(r.overall_score) as usize).yellow(),
        r.detected_archetype,
        r.archetype_confidence * 100.0,
        r.avg_elixir
    );
    let c = &r.categories;
    println!(
        "  ATK {:.1}  DEF {:.1}  SYN {:.1}  VER {:.1}  F2P {:.1}  PLY {:.1}",
        c.attack.score,
        c.defense.score,
        c.synergy.score,
        c.versatility.score,
        c.f2p_friendly.score,
        c.playability.score
    );
}

fn save_records(player: &str, records: &[EvaluatedDeck]) -> DeckResult<()> {
    let board = Leaderboard::open_default(player);
    let entries = records.iter().map(|r| LeaderboardEntry::from_record(r, player)).collect();
    let batch = board.insert_batch(entries)?;
    println!(
        "{}",
        format!("Saved: {} new, {} updated", batch.inserted, batch.updated).green().bold()
    );
    if let Some(err) = batch.stats_error {
        println!("{} {}", "Stats not refreshed:".yellow(), err);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn cmd_build(
    collection_path: &str,
    player: &str,
    strategy: &str,
    pool_args: PoolArgs,
    window: Option<(f64, f64)>,
    evolutions: Vec<String>,
    save: bool,
    json: bool,
) -> DeckResult<()> {
    let strategy = Strategy::from_str(strategy)?;
    let rarity_focus = pool_args
        .rarity
        .iter()
        .map(|r| Rarity::from_str(r))
        .collect::<DeckResult<Vec<_>>>()?;
    let collection = load_collection(collection_path, player)?;
    let constraints = PoolConstraints {
        include: pool_args.include.clone(),
        exclude: pool_args.exclude,
        min_level: pool_args.min_level,
        rarity_focus,
        ..Default::default()
    };
    let pool = candidate_pool(&collection, &constraints)?;

    let composition = CompositionConstraints {
        include: pool_args.include,
        elixir_window: window,
        unlocked_evolutions: evolutions.into_iter().collect(),
        ..Default::default()
    };
    let deck = compose_deck(&pool, &composition, strategy)?;
    let context = PlayerContext::new(collection);
    let record = evaluate_record(format!("{} deck", strategy), strategy, deck, Some(&context))?;

    if json {
        print_json(&record)?;
    } else {
        print_deck(&record);
        for note in deck_notes(record.deck()) {
            println!("  - {}", note.dimmed());
        }
        if !record.deck().evolution_slots().is_empty() {
            println!("  Evolutions: {}", record.deck().evolution_slots().iter().join(", ").magenta());
        }
    }
    if save {
        save_records(player, std::slice::from_ref(&record))?;
    }
    Ok(())
}

fn evaluate_record(
    name: String,
    strategy: Strategy,
    deck: Deck,
    context: Option<&PlayerContext>,
) -> DeckResult<EvaluatedDeck> {
    let evaluator = Evaluator::new(
        ScoringWeights::default(),
        SynergyDatabase::builtin(),
        ArchetypeClassifier::builtin(),
    );
    let result = evaluator.evaluate(&deck, context)?;
    Ok(EvaluatedDeck::new(name, strategy, deck, result))
}

fn cmd_evaluate(
    cards: Vec<String>,
    level: u8,
    collection_path: Option<String>,
    player: Option<String>,
    save: bool,
    json: bool,
) -> DeckResult<()> {
    let (deck, context) = match (&collection_path, &player) {
        (Some(path), Some(tag)) => {
            let collection = load_collection(path, tag)?;
            let owned = cards
                .iter()
                .map(|name| {
                    collection
                        .get(name)
                        .map(|data| CardCandidate::from_level_data(name, data))
                        .ok_or_else(|| DeckError::InvalidDeck(format!("'{}' is not in the collection", name)))
                })
                .collect::<DeckResult<Vec<_>>>()?;
            (Deck::new(owned)?, Some(PlayerContext::new(collection)))
        }
        (Some(_), None) => {
            return Err(DeckError::configuration("--collection needs --player"));
        }
        _ => (Deck::from_names(&cards, level)?, None),
    };

    let record = evaluate_record("evaluated".to_string(), Strategy::Balanced, deck, context.as_ref())?;
    if json {
        print_json(&record)?;
    } else {
        print_deck(&record);
        for pair in &record.result().top_synergies {
            println!("  + {} & {}: {}", pair.card_a, pair.card_b, pair.description.dimmed());
        }
    }
    if save {
        let tag = player.ok_or_else(|| DeckError::configuration("--save needs --player"))?;
        save_records(&tag, std::slice::from_ref(&record))?;
    }
    Ok(())
}

fn cmd_fuzz(collection_path: &str, player: &str, config: FuzzingConfig, save: bool, json: bool) -> DeckResult<()> {
    config.validate()?;
    let collection = load_collection(collection_path, player)?;
    let constraints = PoolConstraints {
        include: config.include.clone(),
        exclude: config.exclude.clone(),
        ..Default::default()
    };
    let pool = candidate_pool(&collection, &constraints)?;
    let outcome = fuzz_search(&pool, &config)?;

    if json {
        print_json(&outcome)?;
    } else {
        let s = &outcome.stats;
        println!(
            "\n  Generated {} | kept {} | rejected: role {}, elixir {}, score {}, synergy {}, evolution {} | retries {} | {} ms",
            s.generated,
            s.success,
            s.skipped_role,
            s.skipped_elixir,
            s.skipped_score,
            s.skipped_synergy,
            s.skipped_evolution,
            s.retries,
            s.elapsed_ms
        );
        for deck in &outcome.decks {
            print_deck(deck);
        }
    }
    if save {
        save_records(player, &outcome.decks)?;
    }
    Ok(())
}

fn cmd_archetypes(collection_path: &str, player: &str, target_level: u8, sort: &str, json: bool) -> DeckResult<()> {
    let sort = VarietySort::from_str(sort)?;
    let collection = load_collection(collection_path, player)?;
    let report = ArchetypeClassifier::builtin().analyze_variety(&collection, target_level, sort);

    if json {
        return print_json(&report);
    }
    println!();
    for v in &report {
        println!(
            "  {:<12} {:>5.1} {:<10} avg L{:.1}  {} gold, {} cards",
            v.archetype.bold(),
            v.viability,
            v.tier.to_string(),
            v.avg_level,
            v.cost.gold,
            v.cost.cards
        );
        if !v.missing.is_empty() {
            println!("      missing: {}", v.missing.iter().join(", ").red());
        }
    }
    Ok(())
}

fn cmd_leaderboard(action: LeaderboardAction, json: bool) -> DeckResult<()> {
    match action {
        LeaderboardAction::Show {
            player,
            limit,
            offset,
            sort,
            order,
            archetype,
            strategy,
            min_score,
            require,
            exclude,
        } => {
            let opts = QueryOptions {
                limit: Some(limit),
                offset,
                min_score,
                archetype,
                strategy,
                require_all_cards: require,
                exclude_cards: exclude,
                sort_by: SortField::from_str(&sort)?,
                sort_order: match order {
                    Order::Asc => SortOrder::Asc,
                    Order::Desc => SortOrder::Desc,
                },
                ..Default::default()
            };
            let rows = Leaderboard::open_default(&player).query(&opts)?;
            if json {
                return print_json(&rows);
            }
            if rows.is_empty() {
                println!("No decks stored for {}", player);
            }
            for (i, e) in rows.iter().enumerate() {
                println!(
                    "  {:>3}. {:>4.1}  {:<11} {}",
                    offset + i + 1,
                    e.overall_score,
                    e.archetype,
                    e.cards.iter().join(", ")
                );
            }
            Ok(())
        }
        LeaderboardAction::Stats { player, recalculate } => {
            let board = Leaderboard::open_default(&player);
            let stats = if recalculate {
                Some(board.recalculate_stats()?)
            } else {
                board.stats()?
            };
            match stats {
                Some(s) if json => print_json(&s),
                Some(s) => {
                    println!(
                        "  {}: {} unique of {} evaluated, top {:.1}, avg {:.2}",
                        s.player_tag, s.total_unique_decks, s.total_decks_evaluated, s.top_score, s.avg_score
                    );
                    Ok(())
                }
                None => {
                    println!("No stats for {}", player);
                    Ok(())
                }
            }
        }
        LeaderboardAction::Clear { player } => {
            let removed = Leaderboard::open_default(&player).clear()?;
            println!("{}", format!("Removed {} decks", removed).green().bold());
            Ok(())
        }
    }
}
