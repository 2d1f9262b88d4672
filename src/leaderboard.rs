//! Per-player, deduplicating store of evaluated decks.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::deck::{deck_hash, dedup_key, DECK_SIZE};
use crate::error::{DeckError, DeckResult};
use crate::evaluation::{DeckRecord, EvaluationResult};
use crate::strategy::Strategy;

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    #[serde(default)]
    pub id: u64,
    pub deck_hash: String,
    pub dedup_key: String,
    pub cards: Vec<String>,
    pub overall_score: f64,
    pub attack_score: f64,
    pub defense_score: f64,
    pub synergy_score: f64,
    pub versatility_score: f64,
    pub f2p_score: f64,
    pub playability_score: f64,
    pub archetype: String,
    pub archetype_confidence: f64,
    pub strategy: String,
    pub avg_elixir: f64,
    pub evaluated_at: DateTime<Utc>,
    pub player_tag: String,
    pub evaluation_version: u32,
}

impl LeaderboardEntry {
    pub fn new(
        cards: Vec<String>,
        result: &EvaluationResult,
        strategy: Strategy,
        player_tag: &str,
    ) -> LeaderboardEntry {
        let c = &result.categories;
        LeaderboardEntry {
            id: 0,
            deck_hash: deck_hash(&cards),
            dedup_key: dedup_key(&cards),
            cards,
            overall_score: result.overall_score,
            attack_score: c.attack.score,
            defense_score: c.defense.score,
            synergy_score: c.synergy.score,
            versatility_score: c.versatility.score,
            f2p_score: c.f2p_friendly.score,
            playability_score: c.playability.score,
            archetype: result.detected_archetype.clone(),
            archetype_confidence: result.archetype_confidence,
            strategy: strategy.as_str().to_string(),
            avg_elixir: result.avg_elixir,
            evaluated_at: Utc::now(),
            player_tag: normalize_tag(player_tag),
            evaluation_version: result.evaluation_version,
        }
    }

    pub fn from_record(record: &dyn DeckRecord, player_tag: &str) -> LeaderboardEntry {
        let cards = record.deck().names().into_iter().map(String::from).collect();
        LeaderboardEntry::new(cards, record.result(), record.strategy(), player_tag)
    }

    /// Rows must name exactly eight distinct cards.
    pub fn validate(&self) -> DeckResult<()> {
        let unique: HashSet<&str> = self.cards.iter().map(|c| c.as_str()).collect();
        if self.cards.len() != DECK_SIZE || unique.len() != DECK_SIZE {
            return Err(DeckError::InvalidDeck(format!(
                "leaderboard rows need {} distinct cards, got {} ({} distinct)",
                DECK_SIZE,
                self.cards.len(),
                unique.len()
            )));
        }
        Ok(())
    }

    pub fn has_card(&self, name: &str) -> bool {
        self.cards.iter().any(|c| c == name)
    }

    /// Copies everything but identity from a fresher evaluation of the same cards.
    fn refresh_from(&mut self, newer: &LeaderboardEntry) {
        self.overall_score = newer.overall_score;
        self.attack_score = newer.attack_score;
        self.defense_score = newer.defense_score;
        self.synergy_score = newer.synergy_score;
        self.versatility_score = newer.versatility_score;
        self.f2p_score = newer.f2p_score;
        self.playability_score = newer.playability_score;
        self.archetype = newer.archetype.clone();
        self.archetype_confidence = newer.archetype_confidence;
        self.strategy = newer.strategy.clone();
        self.avg_elixir = newer.avg_elixir;
        self.evaluated_at = newer.evaluated_at;
        self.evaluation_version = newer.evaluation_version;
    }
}

/// Upper-case tag without the leading '#'.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('#').to_ascii_uppercase()
}

// ---------------------------------------------------------------------------
// Query options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Overall,
    Attack,
    Defense,
    Synergy,
    Versatility,
    F2p,
    Playability,
    AvgElixir,
    ArchetypeConfidence,
    EvaluatedAt,
}

impl SortField {
    pub fn from_str(s: &str) -> DeckResult<SortField> {
        match s.trim().to_ascii_lowercase().trim_end_matches("_score") {
            "overall" => Ok(SortField::Overall),
            "attack" => Ok(SortField::Attack),
            "defense" => Ok(SortField::Defense),
            "synergy" => Ok(SortField::Synergy),
            "versatility" => Ok(SortField::Versatility),
            "f2p" => Ok(SortField::F2p),
            "playability" => Ok(SortField::Playability),
            "avg_elixir" | "elixir" => Ok(SortField::AvgElixir),
            "archetype_confidence" | "confidence" => Ok(SortField::ArchetypeConfidence),
            "evaluated_at" | "date" => Ok(SortField::EvaluatedAt),
            other => Err(DeckError::configuration(format!("unknown sort field '{}'", other))),
        }
    }

    fn value(&self, e: &LeaderboardEntry) -> f64 {
        match self {
            SortField::Overall => e.overall_score,
            SortField::Attack => e.attack_score,
            SortField::Defense => e.defense_score,
            SortField::Synergy => e.synergy_score,
            SortField::Versatility => e.versatility_score,
            SortField::F2p => e.f2p_score,
            SortField::Playability => e.playability_score,
            SortField::AvgElixir => e.avg_elixir,
            SortField::ArchetypeConfidence => e.archetype_confidence,
            SortField::EvaluatedAt => e.evaluated_at.timestamp_millis() as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub limit: Option<usize>,
    pub offset: usize,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
    pub archetype: Option<String>,
    pub strategy: Option<String>,
    pub min_avg_elixir: Option<f64>,
    pub max_avg_elixir: Option<f64>,
    pub require_all_cards: Vec<String>,
    pub require_any_cards: Vec<String>,
    pub exclude_cards: Vec<String>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl QueryOptions {
    pub fn matches(&self, e: &LeaderboardEntry) -> bool {
        self.min_score.map_or(true, |m| e.overall_score >= m)
            && self.max_score.map_or(true, |m| e.overall_score <= m)
            && self.min_avg_elixir.map_or(true, |m| e.avg_elixir >= m)
            && self.max_avg_elixir.map_or(true, |m| e.avg_elixir <= m)
            && self.archetype.as_deref().map_or(true, |a| e.archetype.eq_ignore_ascii_case(a))
            && self.strategy.as_deref().map_or(true, |s| e.strategy.eq_ignore_ascii_case(s))
            && self.require_all_cards.iter().all(|c| e.has_card(c))
            && (self.require_any_cards.is_empty() || self.require_any_cards.iter().any(|c| e.has_card(c)))
            && !self.exclude_cards.iter().any(|c| e.has_card(c))
    }

    /// Filters, sorts (ties by id) and paginates.
    pub fn apply(&self, rows: &[LeaderboardEntry]) -> Vec<LeaderboardEntry> {
        let mut out: Vec<&LeaderboardEntry> = rows.iter().filter(|e| self.matches(e)).collect();
        out.sort_by(|a, b| {
            let (va, vb) = (self.sort_by.value(a), self.sort_by.value(b));
            let primary = match self.sort_order {
                SortOrder::Asc => va.total_cmp(&vb),
                SortOrder::Desc => vb.total_cmp(&va),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });
        out.into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Stats & persisted document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardStats {
    pub player_tag: String,
    pub total_decks_evaluated: u64,
    pub total_unique_decks: usize,
    pub top_score: f64,
    pub avg_score: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Everything stored for one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerBoard {
    pub player_tag: String,
    pub next_id: u64,
    /// Insert calls ever made, including ones that hit an existing row.
    pub evaluations: u64,
    pub entries: Vec<LeaderboardEntry>,
    #[serde(default)]
    pub stats: Option<LeaderboardStats>,
}

impl PlayerBoard {
    pub fn new(player_tag: &str) -> PlayerBoard {
        PlayerBoard {
            player_tag: normalize_tag(player_tag),
            next_id: 1,
            evaluations: 0,
            entries: Vec::new(),
            stats: None,
        }
    }

    fn upsert(&mut self, mut entry: LeaderboardEntry) -> bool {
        self.evaluations += 1;
        entry.dedup_key = dedup_key(&entry.cards);
        entry.deck_hash = deck_hash(&entry.cards);
        entry.player_tag = self.player_tag.clone();

        if let Some(existing) = self.entries.iter_mut().find(|e| e.dedup_key == entry.dedup_key) {
            if entry.evaluation_version >= existing.evaluation_version {
                existing.refresh_from(&entry);
            }
            return false;
        }
        entry.id = self.next_id;
        self.next_id += 1;
        self.entries.push(entry);
        true
    }

    /// Derived purely from stored rows, so repeated calls agree. Fails when a
    /// stored score is not a finite number.
    pub fn compute_stats(&self) -> DeckResult<LeaderboardStats> {
        if let Some(bad) = self.entries.iter().find(|e| !e.overall_score.is_finite()) {
            return Err(DeckError::configuration(format!(
                "row {} has a non-finite overall score",
                bad.id
            )));
        }
        let n = self.entries.len();
        let top_score = self.entries.iter().map(|e| e.overall_score).fold(0.0, f64::max);
        let avg_score = if n == 0 {
            0.0
        } else {
            self.entries.iter().map(|e| e.overall_score).sum::<f64>() / n as f64
        };
        Ok(LeaderboardStats {
            player_tag: self.player_tag.clone(),
            total_decks_evaluated: self.evaluations,
            total_unique_decks: n,
            top_score,
            avg_score,
            last_updated: self.entries.iter().map(|e| e.evaluated_at).max(),
        })
    }

    /// Refreshes the cached stats; on failure the cache is dropped and the error returned.
    fn refresh_stats(&mut self) -> Option<DeckError> {
        match self.compute_stats() {
            Ok(stats) => {
                self.stats = Some(stats);
                None
            }
            Err(e) => {
                self.stats = None;
                Some(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// Storage for player boards. An absent player loads as an empty board.
pub trait PersistenceBackend: Send + Sync {
    fn load(&self, player_tag: &str) -> DeckResult<PlayerBoard>;
    fn save(&self, board: &PlayerBoard) -> DeckResult<()>;
    fn delete(&self, player_tag: &str) -> DeckResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    boards: Mutex<HashMap<String, PlayerBoard>>,
}

impl MemoryBackend {
    pub fn new() -> MemoryBackend {
        MemoryBackend::default()
    }
}

impl PersistenceBackend for MemoryBackend {
    fn load(&self, player_tag: &str) -> DeckResult<PlayerBoard> {
        let tag = normalize_tag(player_tag);
        let boards = self.boards.lock().map_err(DeckError::storage)?;
        Ok(boards.get(&tag).cloned().unwrap_or_else(|| PlayerBoard::new(&tag)))
    }

    fn save(&self, board: &PlayerBoard) -> DeckResult<()> {
        let mut boards = self.boards.lock().map_err(DeckError::storage)?;
        boards.insert(board.player_tag.clone(), board.clone());
        Ok(())
    }

    fn delete(&self, player_tag: &str) -> DeckResult<()> {
        let mut boards = self.boards.lock().map_err(DeckError::storage)?;
        boards.remove(&normalize_tag(player_tag));
        Ok(())
    }
}

/// One JSON document per player under a root directory.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    root: PathBuf,
}

impl JsonFileBackend {
    pub fn new(root: impl AsRef<Path>) -> JsonFileBackend {
        JsonFileBackend { root: root.as_ref().to_path_buf() }
    }

    /// `$DECK_FORGE_HOME/leaderboards`, else `$HOME/.deck-forge/leaderboards`.
    pub fn default_root() -> PathBuf {
        if let Ok(dir) = std::env::var("DECK_FORGE_HOME") {
            return PathBuf::from(dir).join("leaderboards");
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".deck-forge").join("leaderboards")
    }

    /// File for a tag; only ASCII letters and digits are accepted so two tags
    /// can never share a file.
    pub fn path_for(&self, player_tag: &str) -> DeckResult<PathBuf> {
        let tag = normalize_tag(player_tag);
        if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DeckError::configuration(format!(
                "player tag '{}' must be letters and digits only",
                player_tag
            )));
        }
        Ok(self.root.join(format!("{}.json", tag)))
    }
}

impl PersistenceBackend for JsonFileBackend {
    fn load(&self, player_tag: &str) -> DeckResult<PlayerBoard> {
        let path = self.path_for(player_tag)?;
        if !path.exists() {
            return Ok(PlayerBoard::new(player_tag));
        }
        let json = std::fs::read_to_string(&path).map_err(DeckError::storage)?;
        serde_json::from_str(&json)
            .map_err(|e| DeckError::StorageUnavailable(format!("{}: {}", path.display(), e)))
    }

    fn save(&self, board: &PlayerBoard) -> DeckResult<()> {
        let path = self.path_for(&board.player_tag)?;
        std::fs::create_dir_all(&self.root).map_err(DeckError::storage)?;
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(board)?;
        std::fs::write(&tmp, json).map_err(DeckError::storage)?;
        std::fs::rename(&tmp, &path).map_err(DeckError::storage)
    }

    fn delete(&self, player_tag: &str) -> DeckResult<()> {
        let path = self.path_for(player_tag)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DeckError::storage(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Leaderboard handle
// ---------------------------------------------------------------------------

/// Handle for one player's leaderboard. Writes through one handle are
/// serialised; reads run concurrently when no write is in flight.
pub struct Leaderboard<B: PersistenceBackend> {
    backend: B,
    player_tag: String,
    lock: RwLock<()>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchInsert {
    pub inserted: usize,
    pub updated: usize,
    /// Set when the rows were stored but their stats could not be computed.
    pub stats_error: Option<String>,
}

impl<B: PersistenceBackend> Leaderboard<B> {
    pub fn new(backend: B, player_tag: &str) -> Leaderboard<B> {
        Leaderboard { backend, player_tag: normalize_tag(player_tag), lock: RwLock::new(()) }
    }

    pub fn player_tag(&self) -> &str {
        &self.player_tag
    }

    /// Inserts or refreshes a row; `true` when the card set was new.
    pub fn insert(&self, entry: LeaderboardEntry) -> DeckResult<bool> {
        entry.validate()?;
        let _guard = self.lock.write().map_err(DeckError::storage)?;
        let mut board = self.backend.load(&self.player_tag)?;
        let is_new = board.upsert(entry);
        if let Some(e) = board.refresh_stats() {
            warn!("leaderboard {}: stats refresh failed: {}", self.player_tag, e);
        }
        self.backend.save(&board)?;
        debug!("leaderboard {}: insert (new: {})", self.player_tag, is_new);
        Ok(is_new)
    }

    /// Inserts many rows in one write; a failed stats refresh is reported, not raised.
    /// Nothing is stored if any row is malformed.
    pub fn insert_batch(&self, entries: Vec<LeaderboardEntry>) -> DeckResult<BatchInsert> {
        for e in &entries {
            e.validate()?;
        }
        let _guard = self.lock.write().map_err(DeckError::storage)?;
        let mut board = self.backend.load(&self.player_tag)?;
        let mut inserted = 0;
        let mut updated = 0;
        for e in entries {
            if board.upsert(e) {
                inserted += 1;
            } else {
                updated += 1;
            }
        }
        let stats_error = board.refresh_stats().map(|e| {
            warn!("leaderboard {}: stats refresh failed: {}", self.player_tag, e);
            e.to_string()
        });
        self.backend.save(&board)?;
        info!("leaderboard {}: {} new, {} updated", self.player_tag, inserted, updated);
        Ok(BatchInsert { inserted, updated, stats_error })
    }

    pub fn query(&self, opts: &QueryOptions) -> DeckResult<Vec<LeaderboardEntry>> {
        let _guard = self.lock.read().map_err(DeckError::storage)?;
        let board = self.backend.load(&self.player_tag)?;
        Ok(opts.apply(&board.entries))
    }

    pub fn recalculate_stats(&self) -> DeckResult<LeaderboardStats> {
        let _guard = self.lock.write().map_err(DeckError::storage)?;
        let mut board = self.backend.load(&self.player_tag)?;
        let stats = board.compute_stats()?;
        if board.stats.as_ref() != Some(&stats) {
            board.stats = Some(stats.clone());
            self.backend.save(&board)?;
        }
        Ok(stats)
    }

    /// Last stored stats, if any were computed.
    pub fn stats(&self) -> DeckResult<Option<LeaderboardStats>> {
        let _guard = self.lock.read().map_err(DeckError::storage)?;
        Ok(self.backend.load(&self.player_tag)?.stats)
    }

    /// Removes every row for this player; returns how many were dropped.
    pub fn clear(&self) -> DeckResult<usize> {
        let _guard = self.lock.write().map_err(DeckError::storage)?;
        let removed = self.backend.load(&self.player_tag)?.entries.len();
        self.backend.delete(&self.player_tag)?;
        info!("leaderboard {}: cleared {} rows", self.player_tag, removed);
        Ok(removed)
    }
}

impl Leaderboard<JsonFileBackend> {
    /// File-backed leaderboard at the default location.
    pub fn open_default(player_tag: &str) -> Leaderboard<JsonFileBackend> {
        Leaderboard::new(JsonFileBackend::new(JsonFileBackend::default_root()), player_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(cards: &[&str], score: f64) -> LeaderboardEntry {
        LeaderboardEntry {
            id: 0,
            deck_hash: String::new(),
            dedup_key: String::new(),
            cards: cards.iter().map(|s| s.to_string()).collect(),
            overall_score: score,
            attack_score: score,
            defense_score: score,
            synergy_score: score,
            versatility_score: score,
            f2p_score: score,
            playability_score: score,
            archetype: "cycle".into(),
            archetype_confidence: 0.8,
            strategy: "balanced".into(),
            avg_elixir: 3.0,
            evaluated_at: Utc::now(),
            player_tag: String::new(),
            evaluation_version: 1,
        }
    }

    #[test]
    fn normalize_strips_hash() {
        assert_eq!(normalize_tag(" #abc123 "), "ABC123");
    }

    #[test]
    fn upsert_assigns_ids_and_dedups() {
        let mut board = PlayerBoard::new("#P");
        assert!(board.upsert(entry(&["A", "B"], 5.0)));
        assert!(!board.upsert(entry(&["B", "A"], 6.0)));
        assert_eq!(board.entries.len(), 1);
        assert_eq!(board.entries[0].id, 1);
        assert_eq!(board.entries[0].overall_score, 6.0);
        assert_eq!(board.evaluations, 2);
    }

    #[test]
    fn older_version_does_not_overwrite() {
        let mut board = PlayerBoard::new("#P");
        let mut newer = entry(&["A", "B"], 5.0);
        newer.evaluation_version = 3;
        board.upsert(newer);
        let mut older = entry(&["A", "B"], 9.0);
        older.evaluation_version = 2;
        assert!(!board.upsert(older));
        assert_eq!(board.entries[0].overall_score, 5.0);
    }

    #[test]
    fn sort_ties_by_id() {
        let mut board = PlayerBoard::new("#P");
        board.upsert(entry(&["A"], 5.0));
        board.upsert(entry(&["B"], 5.0));
        board.upsert(entry(&["C"], 7.0));
        let rows = QueryOptions::default().apply(&board.entries);
        let ids: Vec<u64> = rows.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    fn eight(prefix: &str) -> Vec<String> {
        (0..8).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn validate_requires_eight_distinct_cards() {
        let names = eight("C");
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        assert!(entry(&refs, 5.0).validate().is_ok());
        assert!(matches!(entry(&["Hog Rider", "Log"], 5.0).validate(), Err(DeckError::InvalidDeck(_))));
        assert!(matches!(entry(&["Log"; 8], 5.0).validate(), Err(DeckError::InvalidDeck(_))));
    }

    #[test]
    fn non_finite_score_fails_stats() {
        let mut board = PlayerBoard::new("#P");
        board.upsert(entry(&["A"], 5.0));
        assert!(board.compute_stats().is_ok());
        board.upsert(entry(&["B"], f64::NAN));
        assert!(board.compute_stats().is_err());
        assert!(board.refresh_stats().is_some());
        assert!(board.stats.is_none());
    }

    #[test]
    fn batch_reports_stats_failure_but_keeps_rows() {
        let lb = Leaderboard::new(MemoryBackend::new(), "#P");
        let good = eight("G");
        let bad = eight("N");
        let good_refs: Vec<&str> = good.iter().map(|s| s.as_str()).collect();
        let bad_refs: Vec<&str> = bad.iter().map(|s| s.as_str()).collect();
        let out = lb
            .insert_batch(vec![entry(&good_refs, 6.0), entry(&bad_refs, f64::NAN)])
            .unwrap();
        assert_eq!(out.inserted, 2);
        assert!(out.stats_error.is_some());
        assert_eq!(lb.query(&QueryOptions::default()).unwrap().len(), 2);
        assert!(lb.stats().unwrap().is_none());
        assert!(lb.recalculate_stats().is_err());
    }

    #[test]
    fn batch_success_has_no_stats_error() {
        let lb = Leaderboard::new(MemoryBackend::new(), "#P");
        let names = eight("G");
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let out = lb.insert_batch(vec![entry(&refs, 6.0)]).unwrap();
        assert_eq!(out.stats_error, None);
        assert_eq!(lb.stats().unwrap().unwrap().top_score, 6.0);
    }

    #[test]
    fn sort_field_parse() {
        assert_eq!(SortField::from_str("overall_score").unwrap(), SortField::Overall);
        assert_eq!(SortField::from_str("f2p").unwrap(), SortField::F2p);
        assert!(SortField::from_str("luck").is_err());
    }
}
