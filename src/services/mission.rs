//! Mission Engine Service
//!
//! Owns the mission lifecycle state machine. Every mutation runs in a
//! transaction that takes a `FOR UPDATE` lock on the mission row, so
//! concurrent joins/starts/completions against the same mission serialize;
//! ledger appends never wait on mission locks.
//!
//! Completion is the only place the engine writes into the ledger, and those
//! event appends share the mission's transaction: either the status change
//! and every award commit together or none do.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{
    clamp_rating, CreateMissionRequest, Mission, MissionResult, MissionStatus, Participant,
    ScoreCategory, TrustLevel,
};
use crate::services::anchor::AnchorService;
use crate::services::ledger::{LedgerError, LedgerService};

/// Multiplier applied to a 1-5 peer rating for the quality award
const QUALITY_RATING_MULTIPLIER: i64 = 20;

/// Role recorded for the mission creator's participant entry
const CREATOR_ROLE: &str = "creator";

/// Errors that can occur during mission operations
#[derive(Debug, Error)]
pub enum MissionError {
    #[error("Mission not found: {0}")]
    MissionNotFound(String),

    #[error("Participant not found: {0}")]
    ParticipantNotFound(String),

    #[error("Invalid mission state: {0}")]
    InvalidState(String),

    #[error("Agent {agent_id} does not meet the minimum trust level {required}")]
    TrustTooLow {
        agent_id: String,
        required: TrustLevel,
    },

    #[error("Agent {0} is not the mission creator")]
    NotCreator(String),

    #[error("Agent {0} is not a mission participant")]
    NotParticipant(String),

    #[error("Agent {0} is already a participant")]
    DuplicateParticipant(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Corrupt mission record: {0}")]
    InvalidRecord(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Service for mission lifecycle and reward distribution
#[derive(Debug, Clone)]
pub struct MissionService {
    pool: PgPool,
    ledger: LedgerService,
    anchor: AnchorService,
}

impl MissionService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            ledger: LedgerService::new(pool.clone()),
            anchor: AnchorService::default(),
            pool,
        }
    }

    /// Replace the anchor mirror, normally from config.
    pub fn with_anchor(mut self, anchor: AnchorService) -> Self {
        self.anchor = anchor;
        self
    }

    /// Create a new mission in the open state.
    ///
    /// The creator is always `participants[0]` with the "creator" role.
    pub async fn create(&self, request: CreateMissionRequest) -> Result<Mission, MissionError> {
        if request.title.trim().is_empty() {
            return Err(MissionError::Validation(
                "Mission title must not be empty".to_string(),
            ));
        }
        if request.description.trim().is_empty() {
            return Err(MissionError::Validation(
                "Mission description must not be empty".to_string(),
            ));
        }
        if request.reward < 0 {
            return Err(MissionError::Validation(
                "Mission reward must not be negative".to_string(),
            ));
        }

        let mission_id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        let mission = Mission {
            mission_id: mission_id.clone(),
            title: request.title,
            description: request.description,
            creator_id: request.creator_id.clone(),
            required_capabilities: request.required_capabilities,
            min_trust_level: request.min_trust_level,
            reward: request.reward,
            status: MissionStatus::Open,
            participants: vec![Participant {
                agent_id: request.creator_id,
                role: CREATOR_ROLE.to_string(),
                joined_at: created_at,
                rating: None,
            }],
            created_at,
            deadline: request.deadline,
            completed_at: None,
            result: None,
        };

        let capabilities_json = serde_json::to_value(&mission.required_capabilities)
            .unwrap_or_else(|_| serde_json::json!([]));
        let participants_json = serde_json::to_value(&mission.participants)
            .unwrap_or_else(|_| serde_json::json!([]));

        sqlx::query(
            r#"
            INSERT INTO missions (mission_id, title, description, creator_id, required_capabilities, min_trust_level, reward, status, participants, created_at, deadline)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&mission.mission_id)
        .bind(&mission.title)
        .bind(&mission.description)
        .bind(&mission.creator_id)
        .bind(&capabilities_json)
        .bind(mission.min_trust_level.as_str())
        .bind(mission.reward)
        .bind(mission.status.as_str())
        .bind(&participants_json)
        .bind(mission.created_at)
        .bind(mission.deadline)
        .execute(&self.pool)
        .await?;

        info!(
            mission_id = %mission.mission_id,
            creator_id = %mission.creator_id,
            reward = mission.reward,
            "Mission created"
        );

        // Best-effort escrow creation; failures never block the mission
        self.anchor
            .spawn_escrow_created(&mission.mission_id, mission.reward);

        Ok(mission)
    }

    /// Join an open mission.
    ///
    /// The trust gate reads the ledger at call time, so a reputation raise
    /// committed just before the join is already visible.
    pub async fn join(
        &self,
        mission_id: &str,
        agent_id: &str,
        role: &str,
    ) -> Result<Mission, MissionError> {
        let mut tx = self.pool.begin().await?;

        let mut mission = self.lock_mission(&mut tx, mission_id).await?;

        if mission.status != MissionStatus::Open {
            return Err(MissionError::InvalidState(format!(
                "Mission is {}, cannot join",
                mission.status
            )));
        }

        // Gate read runs on the transaction's own connection; acquiring a
        // second pool connection here would deadlock a saturated pool.
        if !LedgerService::verify_trust_in_tx(&mut tx, agent_id, mission.min_trust_level).await? {
            return Err(MissionError::TrustTooLow {
                agent_id: agent_id.to_string(),
                required: mission.min_trust_level,
            });
        }

        if mission.is_participant(agent_id) {
            return Err(MissionError::DuplicateParticipant(agent_id.to_string()));
        }

        mission.participants.push(Participant {
            agent_id: agent_id.to_string(),
            role: role.to_string(),
            joined_at: Utc::now(),
            rating: None,
        });

        self.store_participants(&mut tx, &mission).await?;
        tx.commit().await?;

        info!(mission_id = mission_id, agent_id = agent_id, role = role, "Agent joined mission");

        Ok(mission)
    }

    /// Start an open mission. Creator only.
    pub async fn start(&self, mission_id: &str, agent_id: &str) -> Result<Mission, MissionError> {
        let mut tx = self.pool.begin().await?;

        let mut mission = self.lock_mission(&mut tx, mission_id).await?;

        if mission.creator_id != agent_id {
            return Err(MissionError::NotCreator(agent_id.to_string()));
        }

        if !mission.status.can_transition_to(MissionStatus::InProgress) {
            return Err(MissionError::InvalidState(format!(
                "Mission is {}, cannot start",
                mission.status
            )));
        }

        mission.status = MissionStatus::InProgress;

        sqlx::query("UPDATE missions SET status = $1 WHERE mission_id = $2")
            .bind(mission.status.as_str())
            .bind(mission_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(mission_id = mission_id, "Mission started");

        Ok(mission)
    }

    /// Complete an in-progress mission with the given result.
    ///
    /// Any participant may report completion. On success every participant is
    /// awarded a completion event (their override score or the mission
    /// reward) plus a quality event of `rating * 20` when peer-rated. Failed
    /// outcomes write no events at all: the current policy attaches neither
    /// penalty nor reward to failure.
    pub async fn complete(
        &self,
        mission_id: &str,
        agent_id: &str,
        result: MissionResult,
    ) -> Result<Mission, MissionError> {
        let mut tx = self.pool.begin().await?;

        let mut mission = self.lock_mission(&mut tx, mission_id).await?;

        if mission.status != MissionStatus::InProgress {
            return Err(MissionError::InvalidState(format!(
                "Mission is {}, cannot complete",
                mission.status
            )));
        }

        if !mission.is_participant(agent_id) {
            return Err(MissionError::NotParticipant(agent_id.to_string()));
        }

        mission.status = if result.success {
            MissionStatus::Completed
        } else {
            MissionStatus::Failed
        };
        mission.completed_at = Some(Utc::now());

        // Tier snapshot before the awards land, on the transaction's own
        // connection. The snapshot only feeds best-effort milestone minting,
        // so a failed read drops that participant's milestone rather than
        // aborting the completion.
        let mut prior_tiers: HashMap<String, TrustLevel> = HashMap::new();
        if result.success {
            for participant in &mission.participants {
                match LedgerService::get_reputation_in_tx(&mut tx, &participant.agent_id).await {
                    Ok(reputation) => {
                        prior_tiers.insert(participant.agent_id.clone(), reputation.trust_level);
                    }
                    Err(e) => {
                        warn!(
                            agent_id = %participant.agent_id,
                            error = %e,
                            "Failed to snapshot trust tier before completion"
                        );
                    }
                }
            }
        }

        if result.success {
            for participant in &mission.participants {
                let score = result
                    .participant_scores
                    .get(&participant.agent_id)
                    .copied()
                    .unwrap_or(mission.reward);

                LedgerService::record_event_in_tx(
                    &mut tx,
                    &participant.agent_id,
                    mission_id,
                    score,
                    ScoreCategory::Completion,
                    agent_id,
                    None,
                )
                .await?;

                if let Some(rating) = participant.rating {
                    LedgerService::record_event_in_tx(
                        &mut tx,
                        &participant.agent_id,
                        mission_id,
                        i64::from(rating) * QUALITY_RATING_MULTIPLIER,
                        ScoreCategory::Quality,
                        agent_id,
                        None,
                    )
                    .await?;
                }
            }
        }

        let result_json = serde_json::to_value(&result)
            .map_err(|e| MissionError::InvalidRecord(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE missions
            SET status = $1, completed_at = $2, result = $3
            WHERE mission_id = $4
            "#,
        )
        .bind(mission.status.as_str())
        .bind(mission.completed_at)
        .bind(&result_json)
        .bind(mission_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            mission_id = mission_id,
            success = result.success,
            participants = mission.participants.len(),
            "Mission completed"
        );

        if result.success {
            // Best-effort anchor settlement after commit; never rolls back
            self.anchor.spawn_escrow_settled(mission_id);
            self.mint_milestones_best_effort(&mission, &prior_tiers).await;
        }

        mission.result = Some(result);

        Ok(mission)
    }

    /// Cancel a mission. Creator only; valid from open or in_progress.
    pub async fn cancel(&self, mission_id: &str, agent_id: &str) -> Result<Mission, MissionError> {
        let mut tx = self.pool.begin().await?;

        let mut mission = self.lock_mission(&mut tx, mission_id).await?;

        if mission.creator_id != agent_id {
            return Err(MissionError::NotCreator(agent_id.to_string()));
        }

        if !mission.status.can_transition_to(MissionStatus::Cancelled) {
            return Err(MissionError::InvalidState(format!(
                "Mission is {}, cannot cancel",
                mission.status
            )));
        }

        mission.status = MissionStatus::Cancelled;

        sqlx::query("UPDATE missions SET status = $1 WHERE mission_id = $2")
            .bind(mission.status.as_str())
            .bind(mission_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(mission_id = mission_id, "Mission cancelled");

        Ok(mission)
    }

    /// Record a peer rating on a participant, overwriting any prior rating.
    ///
    /// Out-of-range ratings are clamped into [1, 5], not rejected.
    pub async fn rate(
        &self,
        mission_id: &str,
        rater_agent_id: &str,
        target_agent_id: &str,
        rating: i32,
    ) -> Result<(), MissionError> {
        let mut tx = self.pool.begin().await?;

        let mut mission = self.lock_mission(&mut tx, mission_id).await?;

        if !mission.is_participant(rater_agent_id) {
            return Err(MissionError::NotParticipant(rater_agent_id.to_string()));
        }

        let rating = clamp_rating(rating);

        let target = mission
            .participants
            .iter_mut()
            .find(|p| p.agent_id == target_agent_id)
            .ok_or_else(|| MissionError::ParticipantNotFound(target_agent_id.to_string()))?;

        target.rating = Some(rating);

        self.store_participants(&mut tx, &mission).await?;
        tx.commit().await?;

        info!(
            mission_id = mission_id,
            rater = rater_agent_id,
            target = target_agent_id,
            rating = rating,
            "Participant rated"
        );

        Ok(())
    }

    /// Get a mission by id.
    pub async fn get(&self, mission_id: &str) -> Result<Option<Mission>, MissionError> {
        let row = sqlx::query_as::<_, MissionRow>(
            r#"
            SELECT mission_id, title, description, creator_id, required_capabilities, min_trust_level, reward, status, participants, created_at, deadline, completed_at, result
            FROM missions
            WHERE mission_id = $1
            "#,
        )
        .bind(mission_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MissionRow::into_mission).transpose()
    }

    /// Find open missions the caller is qualified for: reward at least
    /// `min_reward` and every required capability present in the caller's
    /// set. Partial matches are excluded, unlike agent discovery.
    pub async fn find_open(
        &self,
        capabilities: &[String],
        min_reward: i64,
    ) -> Result<Vec<Mission>, MissionError> {
        let rows = sqlx::query_as::<_, MissionRow>(
            r#"
            SELECT mission_id, title, description, creator_id, required_capabilities, min_trust_level, reward, status, participants, created_at, deadline, completed_at, result
            FROM missions
            WHERE status = 'open' AND reward >= $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(min_reward)
        .fetch_all(&self.pool)
        .await?;

        let mut missions = Vec::new();
        for row in rows {
            let mission = row.into_mission()?;
            if capabilities_satisfy(&mission.required_capabilities, capabilities) {
                missions.push(mission);
            }
        }

        Ok(missions)
    }

    /// Fetch a mission row under a `FOR UPDATE` lock within the transaction.
    async fn lock_mission(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        mission_id: &str,
    ) -> Result<Mission, MissionError> {
        let row = sqlx::query_as::<_, MissionRow>(
            r#"
            SELECT mission_id, title, description, creator_id, required_capabilities, min_trust_level, reward, status, participants, created_at, deadline, completed_at, result
            FROM missions
            WHERE mission_id = $1
            FOR UPDATE
            "#,
        )
        .bind(mission_id)
        .fetch_optional(&mut **tx)
        .await?;

        match row {
            Some(row) => row.into_mission(),
            None => Err(MissionError::MissionNotFound(mission_id.to_string())),
        }
    }

    /// Persist the participant list within the mutation's transaction.
    async fn store_participants(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        mission: &Mission,
    ) -> Result<(), MissionError> {
        let participants_json = serde_json::to_value(&mission.participants)
            .map_err(|e| MissionError::InvalidRecord(e.to_string()))?;

        sqlx::query("UPDATE missions SET participants = $1 WHERE mission_id = $2")
            .bind(&participants_json)
            .bind(&mission.mission_id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Mint milestone credentials for participants whose trust tier rose
    /// with this completion. Purely informational; failures are logged.
    async fn mint_milestones_best_effort(
        &self,
        mission: &Mission,
        prior_tiers: &HashMap<String, TrustLevel>,
    ) {
        for participant in &mission.participants {
            match self.ledger.get_reputation(&participant.agent_id).await {
                Ok(reputation) => {
                    let prior = prior_tiers.get(&participant.agent_id).copied();
                    if tier_rose(prior, reputation.trust_level) {
                        self.anchor
                            .spawn_milestone_credential(&participant.agent_id, reputation.trust_level);
                    }
                }
                Err(e) => {
                    warn!(
                        agent_id = %participant.agent_id,
                        error = %e,
                        "Failed to check milestone after completion"
                    );
                }
            }
        }
    }
}

/// Whether a tier change warrants a milestone credential.
///
/// Without a prior snapshot there is no basis for claiming a rise, so no
/// credential is minted.
fn tier_rose(prior: Option<TrustLevel>, current: TrustLevel) -> bool {
    match prior {
        Some(prior) => current.rank() > prior.rank(),
        None => false,
    }
}

/// Strict superset check: every required capability must be offered.
pub fn capabilities_satisfy(required: &[String], offered: &[String]) -> bool {
    let offered: HashSet<&str> = offered.iter().map(String::as_str).collect();
    required.iter().all(|cap| offered.contains(cap.as_str()))
}

/// Internal row type for mission queries
#[derive(Debug, sqlx::FromRow)]
struct MissionRow {
    mission_id: String,
    title: String,
    description: String,
    creator_id: String,
    required_capabilities: serde_json::Value,
    min_trust_level: String,
    reward: i64,
    status: String,
    participants: serde_json::Value,
    created_at: DateTime<Utc>,
    deadline: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    result: Option<serde_json::Value>,
}

impl MissionRow {
    fn into_mission(self) -> Result<Mission, MissionError> {
        let status = self
            .status
            .parse::<MissionStatus>()
            .map_err(MissionError::InvalidRecord)?;
        let min_trust_level = self
            .min_trust_level
            .parse::<TrustLevel>()
            .map_err(MissionError::InvalidRecord)?;
        let required_capabilities: Vec<String> =
            serde_json::from_value(self.required_capabilities).unwrap_or_default();
        let participants: Vec<Participant> = serde_json::from_value(self.participants)
            .map_err(|e| MissionError::InvalidRecord(e.to_string()))?;
        let result: Option<MissionResult> = match self.result {
            Some(value) => Some(
                serde_json::from_value(value)
                    .map_err(|e| MissionError::InvalidRecord(e.to_string()))?,
            ),
            None => None,
        };

        Ok(Mission {
            mission_id: self.mission_id,
            title: self.title,
            description: self.description,
            creator_id: self.creator_id,
            required_capabilities,
            min_trust_level,
            reward: self.reward,
            status,
            participants,
            created_at: self.created_at,
            deadline: self.deadline,
            completed_at: self.completed_at,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_capabilities_satisfy_requires_superset() {
        assert!(capabilities_satisfy(&[], &[]));
        assert!(capabilities_satisfy(&[], &caps(&["a"])));
        assert!(capabilities_satisfy(&caps(&["a"]), &caps(&["a", "b"])));
        assert!(capabilities_satisfy(
            &caps(&["a", "b"]),
            &caps(&["b", "c", "a"])
        ));

        // Partial matches are non-matches on the mission board
        assert!(!capabilities_satisfy(&caps(&["a", "b"]), &caps(&["a"])));
        assert!(!capabilities_satisfy(&caps(&["a"]), &[]));
    }

    #[test]
    fn test_milestone_requires_snapshot_and_rise() {
        assert!(tier_rose(Some(TrustLevel::Unverified), TrustLevel::Bronze));
        assert!(tier_rose(Some(TrustLevel::Silver), TrustLevel::Gold));
        assert!(!tier_rose(Some(TrustLevel::Bronze), TrustLevel::Bronze));
        assert!(!tier_rose(Some(TrustLevel::Gold), TrustLevel::Silver));

        // A failed snapshot read means no milestone, not a spurious one
        assert!(!tier_rose(None, TrustLevel::Diamond));
    }

    #[test]
    fn test_quality_award_multiplier() {
        // A max rating is worth 100 quality points
        assert_eq!(5 * QUALITY_RATING_MULTIPLIER, 100);
        assert_eq!(1 * QUALITY_RATING_MULTIPLIER, 20);
    }
}
