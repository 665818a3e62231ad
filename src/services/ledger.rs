//! Reputation Ledger Service
//!
//! Owns the append-only reputation event store and derives per-agent
//! aggregates and trust tiers from it. Events are never mutated or deleted;
//! every read recomputes aggregates from the full event stream so that a
//! trust check immediately after an award sees the new tier.
//!
//! The ledger raises no domain errors for unknown agents: "no events" is a
//! valid zero state, which makes trust checks safe to call speculatively.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::{AgentReputation, ReputationEvent, ScoreCategory, TrustLevel};

/// Default limit for history queries
const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// Maximum limit for history queries
const MAX_HISTORY_LIMIT: i64 = 500;

/// Default limit for leaderboard queries
const DEFAULT_LEADERBOARD_LIMIT: i64 = 50;

/// Maximum limit for leaderboard queries
const MAX_LEADERBOARD_LIMIT: i64 = 100;

/// Ledger service errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid event data: {0}")]
    InvalidEventData(String),
}

/// Service for the append-only reputation ledger
#[derive(Debug, Clone)]
pub struct LedgerService {
    pool: PgPool,
}

impl LedgerService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a reputation event.
    ///
    /// No validation of score sign or magnitude: penalties are legal even
    /// though the current award policy only writes positive scores.
    pub async fn record_event(
        &self,
        agent_id: &str,
        mission_id: &str,
        score: i64,
        category: ScoreCategory,
        verified_by: &str,
        proof_ref: Option<&str>,
    ) -> Result<ReputationEvent, LedgerError> {
        let event_id = Uuid::new_v4();
        let recorded_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO reputation_events (event_id, agent_id, mission_id, score, category, verified_by, proof_ref, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event_id)
        .bind(agent_id)
        .bind(mission_id)
        .bind(score)
        .bind(category.as_str())
        .bind(verified_by)
        .bind(proof_ref)
        .bind(recorded_at)
        .execute(&self.pool)
        .await?;

        info!(
            agent_id = agent_id,
            mission_id = mission_id,
            score = score,
            category = %category,
            "Reputation event recorded"
        );

        Ok(ReputationEvent {
            event_id,
            agent_id: agent_id.to_string(),
            mission_id: mission_id.to_string(),
            score,
            category,
            verified_by: verified_by.to_string(),
            proof_ref: proof_ref.map(String::from),
            recorded_at,
        })
    }

    /// Append a reputation event within an existing transaction.
    ///
    /// Used by mission completion so that award events commit atomically with
    /// the mission state change.
    pub async fn record_event_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        agent_id: &str,
        mission_id: &str,
        score: i64,
        category: ScoreCategory,
        verified_by: &str,
        proof_ref: Option<&str>,
    ) -> Result<ReputationEvent, LedgerError> {
        let event_id = Uuid::new_v4();
        let recorded_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO reputation_events (event_id, agent_id, mission_id, score, category, verified_by, proof_ref, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event_id)
        .bind(agent_id)
        .bind(mission_id)
        .bind(score)
        .bind(category.as_str())
        .bind(verified_by)
        .bind(proof_ref)
        .bind(recorded_at)
        .execute(&mut **tx)
        .await?;

        Ok(ReputationEvent {
            event_id,
            agent_id: agent_id.to_string(),
            mission_id: mission_id.to_string(),
            score,
            category,
            verified_by: verified_by.to_string(),
            proof_ref: proof_ref.map(String::from),
            recorded_at,
        })
    }

    /// Get an agent's current aggregate reputation.
    ///
    /// Agents with no events get the zero-value record (score 0, unverified);
    /// this never fails for unknown agents.
    pub async fn get_reputation(&self, agent_id: &str) -> Result<AgentReputation, LedgerError> {
        let row = sqlx::query_as::<_, AggregateRow>(AGGREGATE_QUERY)
            .bind(agent_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into_reputation(agent_id))
    }

    /// Get an agent's aggregate reputation within an existing transaction.
    ///
    /// Used by the mission engine so that trust gates and tier snapshots run
    /// on the transaction's connection instead of acquiring a second one
    /// from the pool while the mission row lock is held.
    pub async fn get_reputation_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        agent_id: &str,
    ) -> Result<AgentReputation, LedgerError> {
        let row = sqlx::query_as::<_, AggregateRow>(AGGREGATE_QUERY)
            .bind(agent_id)
            .fetch_one(&mut **tx)
            .await?;

        Ok(row.into_reputation(agent_id))
    }

    /// Get an agent's event history, most recent first.
    ///
    /// An explicit limit of zero yields an empty list; only the upper bound
    /// is clamped.
    pub async fn get_history(
        &self,
        agent_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<ReputationEvent>, LedgerError> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(0, MAX_HISTORY_LIMIT);

        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT event_id, agent_id, mission_id, score, category, verified_by, proof_ref, recorded_at
            FROM reputation_events
            WHERE agent_id = $1
            ORDER BY recorded_at DESC
            LIMIT $2
            "#,
        )
        .bind(agent_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    /// Get the leaderboard: every agent with at least one event, sorted by
    /// total score descending, ties broken by earliest first event then
    /// agent id so repeated reads agree.
    pub async fn get_leaderboard(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<AgentReputation>, LedgerError> {
        let limit = limit
            .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
            .clamp(0, MAX_LEADERBOARD_LIMIT);

        let rows = sqlx::query_as::<_, LeaderboardRow>(
            r#"
            SELECT
                agent_id,
                CAST(COALESCE(SUM(score), 0) AS BIGINT) AS total_score,
                COUNT(DISTINCT mission_id) AS completed_missions,
                CAST(COALESCE(AVG(score) FILTER (WHERE category = 'quality'), 0) AS DOUBLE PRECISION) AS avg_quality,
                MAX(recorded_at) AS last_active
            FROM reputation_events
            GROUP BY agent_id
            ORDER BY total_score DESC, MIN(recorded_at) ASC, agent_id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AgentReputation {
                trust_level: TrustLevel::from_stats(row.total_score, row.completed_missions),
                agent_id: row.agent_id,
                total_score: row.total_score,
                completed_missions: row.completed_missions,
                avg_quality: row.avg_quality,
                last_active: row.last_active,
            })
            .collect())
    }

    /// Check whether an agent's current trust tier is at least `min_level`.
    pub async fn verify_trust(
        &self,
        agent_id: &str,
        min_level: TrustLevel,
    ) -> Result<bool, LedgerError> {
        let reputation = self.get_reputation(agent_id).await?;
        Ok(reputation.trust_level.rank() >= min_level.rank())
    }

    /// Trust check within an existing transaction; see `get_reputation_in_tx`.
    pub async fn verify_trust_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        agent_id: &str,
        min_level: TrustLevel,
    ) -> Result<bool, LedgerError> {
        let reputation = Self::get_reputation_in_tx(tx, agent_id).await?;
        Ok(reputation.trust_level.rank() >= min_level.rank())
    }
}

/// Per-agent aggregate over the full event stream
const AGGREGATE_QUERY: &str = r#"
    SELECT
        CAST(COALESCE(SUM(score), 0) AS BIGINT) AS total_score,
        COUNT(DISTINCT mission_id) AS completed_missions,
        CAST(COALESCE(AVG(score) FILTER (WHERE category = 'quality'), 0) AS DOUBLE PRECISION) AS avg_quality,
        MAX(recorded_at) AS last_active
    FROM reputation_events
    WHERE agent_id = $1
"#;

/// Internal row type for aggregate queries
#[derive(Debug, sqlx::FromRow)]
struct AggregateRow {
    total_score: i64,
    completed_missions: i64,
    avg_quality: f64,
    last_active: Option<DateTime<Utc>>,
}

impl AggregateRow {
    fn into_reputation(self, agent_id: &str) -> AgentReputation {
        AgentReputation {
            agent_id: agent_id.to_string(),
            total_score: self.total_score,
            completed_missions: self.completed_missions,
            avg_quality: self.avg_quality,
            trust_level: TrustLevel::from_stats(self.total_score, self.completed_missions),
            last_active: self.last_active,
        }
    }
}

/// Internal row type for leaderboard queries
#[derive(Debug, sqlx::FromRow)]
struct LeaderboardRow {
    agent_id: String,
    total_score: i64,
    completed_missions: i64,
    avg_quality: f64,
    last_active: Option<DateTime<Utc>>,
}

/// Internal row type for event queries
#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    event_id: Uuid,
    agent_id: String,
    mission_id: String,
    score: i64,
    category: String,
    verified_by: String,
    proof_ref: Option<String>,
    recorded_at: DateTime<Utc>,
}

impl EventRow {
    fn into_event(self) -> Result<ReputationEvent, LedgerError> {
        let category = self
            .category
            .parse::<ScoreCategory>()
            .map_err(LedgerError::InvalidEventData)?;

        Ok(ReputationEvent {
            event_id: self.event_id,
            agent_id: self.agent_id,
            mission_id: self.mission_id,
            score: self.score,
            category,
            verified_by: self.verified_by,
            proof_ref: self.proof_ref,
            recorded_at: self.recorded_at,
        })
    }
}
