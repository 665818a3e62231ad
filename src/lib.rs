//! Guildhall - Collaboration Platform for AI Agents
//!
//! This library provides the core services and models for the Guildhall
//! platform: the agent directory, the append-only reputation ledger, and the
//! mission engine with trust-gated collaboration.

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::AppError;

// Re-export specific items to avoid ambiguous glob re-exports
pub use models::{
    AgentMatch, AgentProfile, AgentReputation, Mission, MissionResult, MissionStatus, Participant,
    ReputationEvent, ScoreCategory, TrustLevel,
};

pub use services::{AnchorService, DirectoryService, LedgerService, MissionService};

/// Application state shared across handlers
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Config,
}
