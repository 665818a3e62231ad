//! Reputation model and trust-tier types
//!
//! Reputation is an append-only stream of scoring events; everything an agent
//! "is" reputation-wise is derived from that stream on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Trust tier derived from an agent's reputation aggregates.
///
/// Tiers are ordinal: `unverified < bronze < silver < gold < diamond`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    #[default]
    Unverified,
    Bronze,
    Silver,
    Gold,
    Diamond,
}

impl TrustLevel {
    /// Ordinal rank used for trust-gating comparisons.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Unverified => 0,
            Self::Bronze => 1,
            Self::Silver => 2,
            Self::Gold => 3,
            Self::Diamond => 4,
        }
    }

    /// Derive the trust tier from total score and distinct-mission count.
    ///
    /// Both thresholds must hold for a tier: a single high-reward mission
    /// cannot fast-track trust, and an agent with no missions stays
    /// unverified no matter the score.
    pub fn from_stats(total_score: i64, completed_missions: i64) -> Self {
        if completed_missions < 1 {
            Self::Unverified
        } else if total_score >= 1000 && completed_missions >= 50 {
            Self::Diamond
        } else if total_score >= 500 && completed_missions >= 25 {
            Self::Gold
        } else if total_score >= 200 && completed_missions >= 10 {
            Self::Silver
        } else if total_score >= 50 && completed_missions >= 3 {
            Self::Bronze
        } else {
            Self::Unverified
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
            Self::Diamond => "diamond",
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TrustLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unverified" => Ok(Self::Unverified),
            "bronze" => Ok(Self::Bronze),
            "silver" => Ok(Self::Silver),
            "gold" => Ok(Self::Gold),
            "diamond" => Ok(Self::Diamond),
            _ => Err(format!(
                "Invalid trust level: {s}. Valid values are: unverified, bronze, silver, gold, diamond"
            )),
        }
    }
}

/// Category of a reputation event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreCategory {
    Completion,
    Quality,
    Collaboration,
    Speed,
}

impl ScoreCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::Quality => "quality",
            Self::Collaboration => "collaboration",
            Self::Speed => "speed",
        }
    }
}

impl fmt::Display for ScoreCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ScoreCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completion" => Ok(Self::Completion),
            "quality" => Ok(Self::Quality),
            "collaboration" => Ok(Self::Collaboration),
            "speed" => Ok(Self::Speed),
            _ => Err(format!(
                "Invalid score category: {s}. Valid values are: completion, quality, collaboration, speed"
            )),
        }
    }
}

/// A single immutable reputation event.
///
/// Scores are signed; the current award policy only writes positive scores
/// but the ledger accepts penalties without validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationEvent {
    pub event_id: Uuid,
    pub agent_id: String,
    pub mission_id: String,
    pub score: i64,
    pub category: ScoreCategory,
    pub verified_by: String,
    pub proof_ref: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate reputation for one agent, recomputed from the event stream on
/// every read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReputation {
    pub agent_id: String,
    pub total_score: i64,
    pub completed_missions: i64,
    pub avg_quality: f64,
    pub trust_level: TrustLevel,
    pub last_active: Option<DateTime<Utc>>,
}

/// Request payload for recording an out-of-mission contribution
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEventRequest {
    pub agent_id: String,
    pub mission_id: String,
    pub score: i64,
    pub category: ScoreCategory,
    pub verified_by: String,
    #[serde(default)]
    pub proof_ref: Option<String>,
}

/// Query parameters for reputation history
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Query parameters for the leaderboard endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Query parameters for the trust verification endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TrustQuery {
    /// Minimum tier to verify against (default: unverified)
    #[serde(default)]
    pub min: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_trust_level_rank_ordering() {
        assert!(TrustLevel::Unverified.rank() < TrustLevel::Bronze.rank());
        assert!(TrustLevel::Bronze.rank() < TrustLevel::Silver.rank());
        assert!(TrustLevel::Silver.rank() < TrustLevel::Gold.rank());
        assert!(TrustLevel::Gold.rank() < TrustLevel::Diamond.rank());
    }

    #[test]
    fn test_trust_tier_thresholds() {
        let cases: Vec<(i64, i64, TrustLevel)> = vec![
            (0, 0, TrustLevel::Unverified),
            (10_000, 0, TrustLevel::Unverified), // no missions, score irrelevant
            (49, 3, TrustLevel::Unverified),
            (50, 3, TrustLevel::Bronze),
            (50, 2, TrustLevel::Unverified), // mission gate fails
            (199, 10, TrustLevel::Bronze),
            (200, 10, TrustLevel::Silver),
            (200, 9, TrustLevel::Bronze),
            (500, 25, TrustLevel::Gold),
            (500, 24, TrustLevel::Silver),
            (999, 50, TrustLevel::Gold),
            (1000, 50, TrustLevel::Diamond),
            (1000, 49, TrustLevel::Gold),
            (1_000_000, 1, TrustLevel::Unverified), // one giant reward is not trust
        ];

        for (score, missions, expected) in cases {
            assert_eq!(
                TrustLevel::from_stats(score, missions),
                expected,
                "score={score}, missions={missions}"
            );
        }
    }

    #[test]
    fn test_verify_trust_matrix() {
        let tiers = [
            TrustLevel::Unverified,
            TrustLevel::Bronze,
            TrustLevel::Silver,
            TrustLevel::Gold,
            TrustLevel::Diamond,
        ];

        // verify_trust is an ordinal comparison; check all 5x5 pairs
        for (i, have) in tiers.iter().enumerate() {
            for (j, want) in tiers.iter().enumerate() {
                assert_eq!(have.rank() >= want.rank(), i >= j);
            }
        }
    }

    #[test]
    fn test_trust_level_round_trip() {
        for tier in [
            TrustLevel::Unverified,
            TrustLevel::Bronze,
            TrustLevel::Silver,
            TrustLevel::Gold,
            TrustLevel::Diamond,
        ] {
            assert_eq!(tier.as_str().parse::<TrustLevel>().unwrap(), tier);
        }
        assert!("platinum".parse::<TrustLevel>().is_err());
    }

    #[test]
    fn test_score_category_from_str() {
        assert_eq!(
            "completion".parse::<ScoreCategory>().unwrap(),
            ScoreCategory::Completion
        );
        assert_eq!(
            "quality".parse::<ScoreCategory>().unwrap(),
            ScoreCategory::Quality
        );
        assert!("velocity".parse::<ScoreCategory>().is_err());
    }

    proptest! {
        /// Increasing score and mission count never lowers the tier.
        #[test]
        fn tier_is_monotonic(
            score in 0i64..5000,
            missions in 0i64..100,
            score_gain in 0i64..5000,
            mission_gain in 0i64..100,
        ) {
            let before = TrustLevel::from_stats(score, missions);
            let after = TrustLevel::from_stats(score + score_gain, missions + mission_gain);
            prop_assert!(after.rank() >= before.rank());
        }
    }
}
