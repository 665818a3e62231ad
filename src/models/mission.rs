//! Mission model and lifecycle types
//!
//! A mission is a collaborative task with a reward, required capabilities,
//! a minimum trust tier for joiners, and an append-only participant list.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::TrustLevel;

/// Mission lifecycle status.
///
/// Status only moves forward through `open -> in_progress -> completed|failed`
/// or sideways to `cancelled`; there are no backward transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Open,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl MissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine permits moving to `next` from here.
    pub fn can_transition_to(&self, next: MissionStatus) -> bool {
        match (self, next) {
            (Self::Open, Self::InProgress) => true,
            (Self::Open, Self::Cancelled) => true,
            (Self::InProgress, Self::Completed) => true,
            (Self::InProgress, Self::Failed) => true,
            (Self::InProgress, Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!(
                "Invalid mission status: {s}. Valid values are: open, in_progress, completed, failed, cancelled"
            )),
        }
    }
}

/// One entry in a mission's participant list.
///
/// The list is append-only; only `rating` is ever mutated on an existing
/// entry (peer ratings overwrite prior ones).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub agent_id: String,
    pub role: String,
    pub joined_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<i32>,
}

/// Outcome reported when a mission completes.
///
/// `participant_scores` overrides the mission reward per agent; participants
/// without an entry receive the mission's default reward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionResult {
    pub success: bool,
    pub summary: String,
    #[serde(default)]
    pub participant_scores: HashMap<String, i64>,
}

/// Mission record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    pub mission_id: String,
    pub title: String,
    pub description: String,
    pub creator_id: String,
    pub required_capabilities: Vec<String>,
    pub min_trust_level: TrustLevel,
    pub reward: i64,
    pub status: MissionStatus,
    pub participants: Vec<Participant>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<MissionResult>,
}

impl Mission {
    pub fn participant(&self, agent_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.agent_id == agent_id)
    }

    pub fn is_participant(&self, agent_id: &str) -> bool {
        self.participant(agent_id).is_some()
    }
}

/// Clamp a peer rating into the valid [1, 5] range.
///
/// Out-of-range input is corrected, not rejected.
pub fn clamp_rating(rating: i32) -> i32 {
    rating.clamp(1, 5)
}

/// Request payload for mission creation
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMissionRequest {
    pub creator_id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub min_trust_level: TrustLevel,
    pub reward: i64,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

/// Request payload for joining a mission
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinMissionRequest {
    pub agent_id: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "contributor".to_string()
}

/// Request payload for creator-only transitions (start, cancel)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionActionRequest {
    pub agent_id: String,
}

/// Request payload for completing a mission
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteMissionRequest {
    pub agent_id: String,
    pub result: MissionResult,
}

/// Request payload for rating a co-participant
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateParticipantRequest {
    pub rater_agent_id: String,
    pub target_agent_id: String,
    pub rating: i32,
}

/// Query parameters for the open-mission board
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindOpenQuery {
    /// Comma-separated capability tags the caller offers
    #[serde(default)]
    pub capabilities: Option<String>,
    #[serde(default)]
    pub min_reward: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            MissionStatus::Open,
            MissionStatus::InProgress,
            MissionStatus::Completed,
            MissionStatus::Failed,
            MissionStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<MissionStatus>().unwrap(), status);
        }
        assert!("paused".parse::<MissionStatus>().is_err());
    }

    #[test]
    fn test_forward_only_transitions() {
        use MissionStatus::*;

        assert!(Open.can_transition_to(InProgress));
        assert!(Open.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Failed));
        assert!(InProgress.can_transition_to(Cancelled));

        // No backward or skipping transitions
        assert!(!Open.can_transition_to(Completed));
        assert!(!Open.can_transition_to(Failed));
        assert!(!InProgress.can_transition_to(Open));
        assert!(!Completed.can_transition_to(Open));
    }

    #[test]
    fn test_terminal_states_absorb() {
        use MissionStatus::*;

        let all = [Open, InProgress, Completed, Failed, Cancelled];
        for terminal in [Completed, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in all {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal} must not transition to {next}"
                );
            }
        }
        assert!(!Open.is_terminal());
        assert!(!InProgress.is_terminal());
    }

    #[test]
    fn test_rating_clamp() {
        assert_eq!(clamp_rating(0), 1);
        assert_eq!(clamp_rating(-10), 1);
        assert_eq!(clamp_rating(1), 1);
        assert_eq!(clamp_rating(3), 3);
        assert_eq!(clamp_rating(5), 5);
        assert_eq!(clamp_rating(6), 5);
        assert_eq!(clamp_rating(100), 5);
    }

    #[test]
    fn test_participant_lookup() {
        let mission = Mission {
            mission_id: "m-1".to_string(),
            title: "Index the archive".to_string(),
            description: "Crawl and index".to_string(),
            creator_id: "agent-a".to_string(),
            required_capabilities: vec!["crawl".to_string()],
            min_trust_level: TrustLevel::Unverified,
            reward: 100,
            status: MissionStatus::Open,
            participants: vec![Participant {
                agent_id: "agent-a".to_string(),
                role: "creator".to_string(),
                joined_at: Utc::now(),
                rating: None,
            }],
            created_at: Utc::now(),
            deadline: None,
            completed_at: None,
            result: None,
        };

        assert!(mission.is_participant("agent-a"));
        assert!(!mission.is_participant("agent-b"));
        assert_eq!(mission.participant("agent-a").unwrap().role, "creator");
    }
}
