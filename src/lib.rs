pub mod archetypes;
pub mod candidates;
pub mod cards;
pub mod cli;
pub mod composer;
pub mod deck;
pub mod error;
pub mod evaluation;
pub mod fuzz;
pub mod leaderboard;
pub mod strategy;
pub mod synergy;
pub mod upgrades;
