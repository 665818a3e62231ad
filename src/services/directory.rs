//! Agent Directory Service
//!
//! Owns agent profile records and capability-ranked discovery. Discovery
//! consults the ledger's aggregates for every registered agent and blends
//! capability overlap with a capped reputation bonus.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    AgentMatch, AgentProfile, AgentReputation, RegisterAgentRequest, TrustLevel,
    UpdateAgentRequest,
};

/// Default limit for discovery results
const DEFAULT_DISCOVER_LIMIT: usize = 20;

/// Maximum limit for discovery results
const MAX_DISCOVER_LIMIT: usize = 100;

/// Total score that buys the full reputation bonus
const REPUTATION_BONUS_DIVISOR: f64 = 1000.0;

/// Ceiling on the reputation bonus added to the capability score
const REPUTATION_BONUS_CAP: f64 = 0.5;

/// Default window within which an agent counts as online
const DEFAULT_ONLINE_WINDOW_SECS: i64 = 300;

/// Directory service errors
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Service for agent registration, profiles and discovery
#[derive(Debug, Clone)]
pub struct DirectoryService {
    pool: PgPool,
    online_window: Duration,
}

impl DirectoryService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            online_window: Duration::seconds(DEFAULT_ONLINE_WINDOW_SECS),
        }
    }

    /// Override the online window (seconds), normally from config.
    pub fn with_online_window(mut self, secs: u64) -> Self {
        self.online_window = Duration::seconds(secs as i64);
        self
    }

    /// Register a new agent and return its profile.
    ///
    /// Name and description must be non-empty; everything else is optional.
    pub async fn register(
        &self,
        request: RegisterAgentRequest,
    ) -> Result<AgentProfile, DirectoryError> {
        if request.agent_name.trim().is_empty() {
            return Err(DirectoryError::Validation(
                "Agent name must not be empty".to_string(),
            ));
        }
        if request.description.trim().is_empty() {
            return Err(DirectoryError::Validation(
                "Agent description must not be empty".to_string(),
            ));
        }

        let agent_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let capabilities = dedup_capabilities(request.capabilities);
        let capabilities_json =
            serde_json::to_value(&capabilities).unwrap_or_else(|_| serde_json::json!([]));
        let metadata_json =
            serde_json::to_value(&request.metadata).unwrap_or_else(|_| serde_json::json!({}));

        sqlx::query(
            r#"
            INSERT INTO agents (agent_id, agent_name, description, capabilities, wallet_address, metadata, created_at, last_seen)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            "#,
        )
        .bind(&agent_id)
        .bind(&request.agent_name)
        .bind(&request.description)
        .bind(&capabilities_json)
        .bind(&request.wallet_address)
        .bind(&metadata_json)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(agent_id = %agent_id, agent_name = %request.agent_name, "Agent registered");

        Ok(AgentProfile {
            agent_id,
            agent_name: request.agent_name,
            description: request.description,
            capabilities,
            wallet_address: request.wallet_address,
            metadata: request.metadata,
            created_at: now,
            last_seen: now,
        })
    }

    /// Merge the provided fields into an existing profile and refresh
    /// `last_seen`. Fails with `AgentNotFound` on an unknown id.
    pub async fn update(
        &self,
        agent_id: &str,
        request: UpdateAgentRequest,
    ) -> Result<AgentProfile, DirectoryError> {
        let current = self
            .get(agent_id)
            .await?
            .ok_or_else(|| DirectoryError::AgentNotFound(agent_id.to_string()))?;

        let agent_name = request.agent_name.unwrap_or(current.agent_name);
        let description = request.description.unwrap_or(current.description);
        let capabilities = request
            .capabilities
            .map(dedup_capabilities)
            .unwrap_or(current.capabilities);
        let wallet_address = request.wallet_address.or(current.wallet_address);
        let metadata = request.metadata.unwrap_or(current.metadata);
        let last_seen = Utc::now();

        let capabilities_json =
            serde_json::to_value(&capabilities).unwrap_or_else(|_| serde_json::json!([]));
        let metadata_json =
            serde_json::to_value(&metadata).unwrap_or_else(|_| serde_json::json!({}));

        sqlx::query(
            r#"
            UPDATE agents
            SET agent_name = $1, description = $2, capabilities = $3, wallet_address = $4, metadata = $5, last_seen = $6
            WHERE agent_id = $7
            "#,
        )
        .bind(&agent_name)
        .bind(&description)
        .bind(&capabilities_json)
        .bind(&wallet_address)
        .bind(&metadata_json)
        .bind(last_seen)
        .bind(agent_id)
        .execute(&self.pool)
        .await?;

        Ok(AgentProfile {
            agent_id: agent_id.to_string(),
            agent_name,
            description,
            capabilities,
            wallet_address,
            metadata,
            created_at: current.created_at,
            last_seen,
        })
    }

    /// Refresh an agent's `last_seen`. Heartbeats from unknown agents are
    /// silently ignored, not errors.
    pub async fn heartbeat(&self, agent_id: &str) -> Result<(), DirectoryError> {
        sqlx::query("UPDATE agents SET last_seen = $1 WHERE agent_id = $2")
            .bind(Utc::now())
            .bind(agent_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Get an agent profile by id.
    pub async fn get(&self, agent_id: &str) -> Result<Option<AgentProfile>, DirectoryError> {
        let row = sqlx::query_as::<_, AgentRow>(
            r#"
            SELECT agent_id, agent_name, description, capabilities, wallet_address, metadata, created_at, last_seen
            FROM agents
            WHERE agent_id = $1
            "#,
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(AgentRow::into_profile))
    }

    /// Whether the agent has sent a heartbeat within the online window.
    /// Unknown agents are offline.
    pub async fn is_online(&self, agent_id: &str) -> Result<bool, DirectoryError> {
        let last_seen: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT last_seen FROM agents WHERE agent_id = $1")
                .bind(agent_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match last_seen {
            Some(seen) => Utc::now() - seen < self.online_window,
            None => false,
        })
    }

    /// Capability-ranked discovery gated by trust tier.
    ///
    /// Scans every registered agent with its current ledger aggregates,
    /// filters by `min_trust_level`, scores by capability overlap plus a
    /// capped reputation bonus, and returns the best matches in stable
    /// registration order for ties.
    pub async fn discover(
        &self,
        required_capabilities: &[String],
        min_trust_level: Option<TrustLevel>,
        max_results: Option<usize>,
    ) -> Result<Vec<AgentMatch>, DirectoryError> {
        let max_results = max_results
            .unwrap_or(DEFAULT_DISCOVER_LIMIT)
            .clamp(1, MAX_DISCOVER_LIMIT);

        let rows = sqlx::query_as::<_, AgentAggregateRow>(
            r#"
            SELECT
                a.agent_id, a.agent_name, a.description, a.capabilities,
                a.wallet_address, a.metadata, a.created_at, a.last_seen,
                CAST(COALESCE(r.total_score, 0) AS BIGINT) AS total_score,
                COALESCE(r.completed_missions, 0) AS completed_missions,
                CAST(COALESCE(r.avg_quality, 0) AS DOUBLE PRECISION) AS avg_quality,
                r.last_active
            FROM agents a
            LEFT JOIN (
                SELECT
                    agent_id,
                    SUM(score) AS total_score,
                    COUNT(DISTINCT mission_id) AS completed_missions,
                    AVG(score) FILTER (WHERE category = 'quality') AS avg_quality,
                    MAX(recorded_at) AS last_active
                FROM reputation_events
                GROUP BY agent_id
            ) r ON a.agent_id = r.agent_id
            ORDER BY a.created_at ASC, a.agent_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut matches: Vec<AgentMatch> = Vec::new();

        for row in rows {
            let trust_level = TrustLevel::from_stats(row.total_score, row.completed_missions);

            if let Some(min) = min_trust_level {
                if trust_level.rank() < min.rank() {
                    continue;
                }
            }

            let profile = row.profile();
            let score = match match_score(
                required_capabilities,
                &profile.capabilities,
                row.total_score,
            ) {
                Some(score) => score,
                // Zero capability overlap is a non-match, not a weak match
                None => continue,
            };

            matches.push(AgentMatch {
                reputation: AgentReputation {
                    agent_id: profile.agent_id.clone(),
                    total_score: row.total_score,
                    completed_missions: row.completed_missions,
                    avg_quality: row.avg_quality,
                    trust_level,
                    last_active: row.last_active,
                },
                agent: profile,
                match_score: score,
            });
        }

        // Stable sort keeps registration order for equal scores
        matches.sort_by(|a, b| {
            b.match_score
                .partial_cmp(&a.match_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(max_results);

        Ok(matches)
    }
}

/// Blend capability overlap with a capped reputation bonus.
///
/// Returns `None` when required capabilities were given and none overlap:
/// reputation can soften an imperfect match but can never rescue a total
/// mismatch. The bonus is `min(total_score/1000, 0.5)` and the final score
/// is clamped to a ceiling of 1.0.
pub fn match_score(required: &[String], capabilities: &[String], total_score: i64) -> Option<f64> {
    let required: HashSet<&str> = required.iter().map(String::as_str).collect();

    let base = if required.is_empty() {
        1.0
    } else {
        let offered: HashSet<&str> = capabilities.iter().map(String::as_str).collect();
        let overlap = required.intersection(&offered).count();
        if overlap == 0 {
            return None;
        }
        overlap as f64 / required.len() as f64
    };

    let bonus = (total_score as f64 / REPUTATION_BONUS_DIVISOR).min(REPUTATION_BONUS_CAP);
    Some((base + bonus).min(1.0))
}

/// Drop duplicate capability tags while keeping first-seen order.
fn dedup_capabilities(capabilities: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    capabilities
        .into_iter()
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

/// Internal row type for profile queries
#[derive(Debug, sqlx::FromRow)]
struct AgentRow {
    agent_id: String,
    agent_name: String,
    description: String,
    capabilities: serde_json::Value,
    wallet_address: Option<String>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl AgentRow {
    fn into_profile(self) -> AgentProfile {
        let capabilities: Vec<String> =
            serde_json::from_value(self.capabilities).unwrap_or_default();
        let metadata: BTreeMap<String, String> =
            serde_json::from_value(self.metadata).unwrap_or_default();

        AgentProfile {
            agent_id: self.agent_id,
            agent_name: self.agent_name,
            description: self.description,
            capabilities,
            wallet_address: self.wallet_address,
            metadata,
            created_at: self.created_at,
            last_seen: self.last_seen,
        }
    }
}

/// Internal row type for discovery queries (profile + ledger aggregates)
#[derive(Debug, sqlx::FromRow)]
struct AgentAggregateRow {
    agent_id: String,
    agent_name: String,
    description: String,
    capabilities: serde_json::Value,
    wallet_address: Option<String>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    total_score: i64,
    completed_missions: i64,
    avg_quality: f64,
    last_active: Option<DateTime<Utc>>,
}

impl AgentAggregateRow {
    fn profile(&self) -> AgentProfile {
        let capabilities: Vec<String> =
            serde_json::from_value(self.capabilities.clone()).unwrap_or_default();
        let metadata: BTreeMap<String, String> =
            serde_json::from_value(self.metadata.clone()).unwrap_or_default();

        AgentProfile {
            agent_id: self.agent_id.clone(),
            agent_name: self.agent_name.clone(),
            description: self.description.clone(),
            capabilities,
            wallet_address: self.wallet_address.clone(),
            metadata,
            created_at: self.created_at,
            last_seen: self.last_seen,
        }
    }
}
