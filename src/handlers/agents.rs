use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::error::AppError;
use crate::models::{
    DiscoverQuery, HistoryQuery, RegisterAgentRequest, TrustLevel, TrustQuery, UpdateAgentRequest,
};
use crate::services::directory::DirectoryError;
use crate::services::ledger::LedgerError;
use crate::services::{AnchorService, DirectoryService, LedgerService};
use crate::AppState;

/// Standard API response wrapper
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    data: T,
    meta: ResponseMeta,
}

#[derive(Serialize)]
struct ResponseMeta {
    request_id: String,
}

impl<T: Serialize> ApiResponse<T> {
    fn new(data: T) -> Self {
        Self {
            data,
            meta: ResponseMeta {
                request_id: uuid::Uuid::new_v4().to_string(),
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrustCheckResponse {
    agent_id: String,
    min_trust_level: TrustLevel,
    trust_level: TrustLevel,
    verified: bool,
}

fn directory(state: &AppState) -> DirectoryService {
    DirectoryService::new(state.db.clone()).with_online_window(state.config.online_window_secs)
}

fn map_directory_err(e: DirectoryError) -> AppError {
    match e {
        DirectoryError::AgentNotFound(id) => AppError::NotFound(format!("Agent not found: {id}")),
        DirectoryError::Validation(msg) => AppError::Validation(msg),
        DirectoryError::Database(e) => AppError::Database(e),
    }
}

fn map_ledger_err(e: LedgerError) -> AppError {
    match e {
        LedgerError::Database(e) => AppError::Database(e),
        LedgerError::InvalidEventData(msg) => AppError::Internal(msg),
    }
}

/// Split a comma-separated capability list into trimmed tags.
fn parse_capability_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_trust_level(raw: &str) -> Result<TrustLevel, AppError> {
    raw.parse::<TrustLevel>().map_err(AppError::Validation)
}

/// POST /v1/agents/register
///
/// Register a new agent in the directory. Registration is open: no trust
/// tier is required to join the platform.
pub async fn register_agent(
    state: web::Data<AppState>,
    body: web::Json<RegisterAgentRequest>,
) -> Result<HttpResponse, AppError> {
    let profile = directory(&state)
        .register(body.into_inner())
        .await
        .map_err(map_directory_err)?;

    if let Some(wallet) = &profile.wallet_address {
        AnchorService::new(state.config.anchor_enabled).spawn_wallet_link(&profile.agent_id, wallet);
    }

    Ok(HttpResponse::Created().json(ApiResponse::new(profile)))
}

/// GET /v1/agents/discover
///
/// Capability-ranked discovery with an optional trust-tier floor.
pub async fn discover_agents(
    state: web::Data<AppState>,
    query: web::Query<DiscoverQuery>,
) -> Result<HttpResponse, AppError> {
    let required = parse_capability_list(query.capabilities.as_deref());
    let min_trust_level = match &query.min_trust_level {
        Some(raw) => Some(parse_trust_level(raw)?),
        None => None,
    };

    let matches = directory(&state)
        .discover(&required, min_trust_level, query.limit)
        .await
        .map_err(map_directory_err)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(matches)))
}

/// GET /v1/agents/{agentId}
pub async fn get_agent(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let agent_id = path.into_inner();

    let profile = directory(&state)
        .get(&agent_id)
        .await
        .map_err(map_directory_err)?
        .ok_or_else(|| AppError::NotFound(format!("Agent not found: {agent_id}")))?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(profile)))
}

/// PATCH /v1/agents/{agentId}
///
/// Partial profile update; absent fields are left untouched.
pub async fn update_agent(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UpdateAgentRequest>,
) -> Result<HttpResponse, AppError> {
    let agent_id = path.into_inner();

    let profile = directory(&state)
        .update(&agent_id, body.into_inner())
        .await
        .map_err(map_directory_err)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(profile)))
}

/// POST /v1/agents/{agentId}/heartbeat
///
/// Refresh the agent's liveness window. Unknown agents are a silent no-op.
pub async fn heartbeat(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    directory(&state)
        .heartbeat(&path.into_inner())
        .await
        .map_err(map_directory_err)?;

    Ok(HttpResponse::NoContent().finish())
}

/// GET /v1/agents/{agentId}/status
///
/// Online if a heartbeat arrived within the configured window.
pub async fn get_agent_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let agent_id = path.into_inner();
    let service = directory(&state);

    let profile = service
        .get(&agent_id)
        .await
        .map_err(map_directory_err)?
        .ok_or_else(|| AppError::NotFound(format!("Agent not found: {agent_id}")))?;
    let online = service.is_online(&agent_id).await.map_err(map_directory_err)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(crate::models::OnlineStatus {
        agent_id: profile.agent_id,
        online,
        last_seen: profile.last_seen,
    })))
}

/// GET /v1/agents/{agentId}/reputation
///
/// Current aggregates and trust tier; agents with no events get zeros.
pub async fn get_agent_reputation(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let reputation = LedgerService::new(state.db.clone())
        .get_reputation(&path.into_inner())
        .await
        .map_err(map_ledger_err)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(reputation)))
}

/// GET /v1/agents/{agentId}/reputation/history
pub async fn get_agent_history(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, AppError> {
    let history = LedgerService::new(state.db.clone())
        .get_history(&path.into_inner(), query.limit)
        .await
        .map_err(map_ledger_err)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(history)))
}

/// GET /v1/agents/{agentId}/trust?min=silver
///
/// Check whether the agent clears a trust-tier floor.
pub async fn verify_agent_trust(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<TrustQuery>,
) -> Result<HttpResponse, AppError> {
    let agent_id = path.into_inner();
    let min = match &query.min {
        Some(raw) => parse_trust_level(raw)?,
        None => TrustLevel::Unverified,
    };

    let reputation = LedgerService::new(state.db.clone())
        .get_reputation(&agent_id)
        .await
        .map_err(map_ledger_err)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(TrustCheckResponse {
        agent_id,
        min_trust_level: min,
        verified: reputation.trust_level.rank() >= min.rank(),
        trust_level: reputation.trust_level,
    })))
}

/// Configure agent routes
pub fn configure_agent_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/agents")
            .route("/register", web::post().to(register_agent))
            .route("/discover", web::get().to(discover_agents))
            .route("/{agentId}", web::get().to(get_agent))
            .route("/{agentId}", web::patch().to(update_agent))
            .route("/{agentId}/heartbeat", web::post().to(heartbeat))
            .route("/{agentId}/status", web::get().to(get_agent_status))
            .route("/{agentId}/reputation", web::get().to(get_agent_reputation))
            .route(
                "/{agentId}/reputation/history",
                web::get().to(get_agent_history),
            )
            .route("/{agentId}/trust", web::get().to(verify_agent_trust)),
    );
}
