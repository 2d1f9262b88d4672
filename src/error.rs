use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cards::Role;

/// Why a generated deck was thrown away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    ElixirOutOfRange,
    RoleIncomplete,
    BelowScoreThreshold,
    BelowSynergyThreshold,
    TooFewEvolutions,
    IncludeMissing,
    ExcludedPresent,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::ElixirOutOfRange => "elixir-out-of-range",
            RejectionReason::RoleIncomplete => "role-incomplete",
            RejectionReason::BelowScoreThreshold => "below-score-threshold",
            RejectionReason::BelowSynergyThreshold => "below-synergy-threshold",
            RejectionReason::TooFewEvolutions => "too-few-evolutions",
            RejectionReason::IncludeMissing => "include-missing",
            RejectionReason::ExcludedPresent => "excluded-present",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum DeckError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Insufficient pool: no eligible {role} candidates ({available} cards in pool)")]
    InsufficientPool { role: Role, available: usize },

    #[error("Generation exhausted after {attempts} attempts (dominant rejection: {reason})")]
    GenerationExhausted {
        attempts: usize,
        reason: RejectionReason,
    },

    #[error("Invalid weight configuration: {0}")]
    InvalidWeightConfiguration(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Invalid deck: {0}")]
    InvalidDeck(String),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("Unknown archetype: {0}")]
    UnknownArchetype(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DeckError {
    pub fn configuration(msg: impl Into<String>) -> DeckError {
        DeckError::Configuration(msg.into())
    }

    pub fn storage(err: impl fmt::Display) -> DeckError {
        DeckError::StorageUnavailable(err.to_string())
    }
}

pub type DeckResult<T> = Result<T, DeckError>;
