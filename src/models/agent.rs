use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::AgentReputation;

/// Agent profile registered with the directory.
///
/// `capabilities` is a set of free-form tags; `metadata` is an open
/// string-to-string bag owned by the agent. `last_seen` is directory-managed
/// and refreshed by heartbeats and profile updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub agent_id: String,
    pub agent_name: String,
    pub description: String,
    pub capabilities: Vec<String>,
    pub wallet_address: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Request payload for agent registration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgentRequest {
    pub agent_name: String,
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Partial update of an agent profile; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAgentRequest {
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
}

/// Query parameters for agent discovery
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverQuery {
    /// Comma-separated capability tags; all-agents search when absent
    #[serde(default)]
    pub capabilities: Option<String>,
    /// Drop agents ranked below this trust tier
    #[serde(default)]
    pub min_trust_level: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// A discovery result: the agent, its current reputation, and the blended
/// capability/reputation match score in [0.0, 1.0].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMatch {
    pub agent: AgentProfile,
    pub reputation: AgentReputation,
    pub match_score: f64,
}

/// Response payload for the online-status endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineStatus {
    pub agent_id: String,
    pub online: bool,
    pub last_seen: DateTime<Utc>,
}
