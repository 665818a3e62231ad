use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::error::AppError;
use crate::models::{
    CompleteMissionRequest, CreateMissionRequest, FindOpenQuery, JoinMissionRequest,
    MissionActionRequest, RateParticipantRequest,
};
use crate::services::ledger::LedgerError;
use crate::services::mission::MissionError;
use crate::services::{AnchorService, MissionService};
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

fn missions(state: &AppState) -> MissionService {
    MissionService::new(state.db.clone())
        .with_anchor(AnchorService::new(state.config.anchor_enabled))
}

fn map_mission_err(e: MissionError) -> AppError {
    match e {
        MissionError::MissionNotFound(id) => {
            AppError::NotFound(format!("Mission not found: {id}"))
        }
        MissionError::ParticipantNotFound(id) => {
            AppError::NotFound(format!("Participant not found: {id}"))
        }
        MissionError::InvalidState(msg) => AppError::InvalidState(msg),
        MissionError::TrustTooLow { agent_id, required } => AppError::Trust(format!(
            "Agent {agent_id} does not meet the minimum trust level {required}"
        )),
        MissionError::NotCreator(id) => {
            AppError::Authorization(format!("Agent {id} is not the mission creator"))
        }
        MissionError::NotParticipant(id) => {
            AppError::Authorization(format!("Agent {id} is not a mission participant"))
        }
        MissionError::DuplicateParticipant(id) => AppError::DuplicateParticipant(id),
        MissionError::Validation(msg) => AppError::Validation(msg),
        MissionError::InvalidRecord(msg) => AppError::Internal(msg),
        MissionError::Ledger(LedgerError::Database(e)) => AppError::Database(e),
        MissionError::Ledger(e) => AppError::Internal(e.to_string()),
        MissionError::Database(e) => AppError::Database(e),
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

/// POST /v1/missions
///
/// Create an open mission. Creation is not trust-gated; the gate applies
/// to joining.
pub async fn create_mission(
    state: web::Data<AppState>,
    body: web::Json<CreateMissionRequest>,
) -> Result<HttpResponse, AppError> {
    let mission = missions(&state)
        .create(body.into_inner())
        .await
        .map_err(map_mission_err)?;

    Ok(HttpResponse::Created().json(ApiResponse::new(mission)))
}

/// GET /v1/missions/open
///
/// The open-mission board, filtered to missions the caller fully qualifies
/// for by capability and reward floor.
pub async fn find_open_missions(
    state: web::Data<AppState>,
    query: web::Query<FindOpenQuery>,
) -> Result<HttpResponse, AppError> {
    let capabilities = parse_capability_list(query.capabilities.as_deref());
    let min_reward = query.min_reward.unwrap_or(0);

    let open = missions(&state)
        .find_open(&capabilities, min_reward)
        .await
        .map_err(map_mission_err)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(open)))
}

/// GET /v1/missions/{missionId}
pub async fn get_mission(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let mission_id = path.into_inner();

    let mission = missions(&state)
        .get(&mission_id)
        .await
        .map_err(map_mission_err)?
        .ok_or_else(|| AppError::NotFound(format!("Mission not found: {mission_id}")))?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(mission)))
}

/// POST /v1/missions/{missionId}/join
pub async fn join_mission(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<JoinMissionRequest>,
) -> Result<HttpResponse, AppError> {
    let mission_id = path.into_inner();
    let request = body.into_inner();

    let mission = missions(&state)
        .join(&mission_id, &request.agent_id, &request.role)
        .await
        .map_err(map_mission_err)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(mission)))
}

/// POST /v1/missions/{missionId}/start
pub async fn start_mission(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<MissionActionRequest>,
) -> Result<HttpResponse, AppError> {
    let mission = missions(&state)
        .start(&path.into_inner(), &body.agent_id)
        .await
        .map_err(map_mission_err)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(mission)))
}

/// POST /v1/missions/{missionId}/complete
///
/// Any participant may report the outcome; rewards are distributed only
/// on success.
pub async fn complete_mission(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<CompleteMissionRequest>,
) -> Result<HttpResponse, AppError> {
    let mission_id = path.into_inner();
    let request = body.into_inner();

    let mission = missions(&state)
        .complete(&mission_id, &request.agent_id, request.result)
        .await
        .map_err(map_mission_err)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(mission)))
}

/// POST /v1/missions/{missionId}/cancel
pub async fn cancel_mission(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<MissionActionRequest>,
) -> Result<HttpResponse, AppError> {
    let mission = missions(&state)
        .cancel(&path.into_inner(), &body.agent_id)
        .await
        .map_err(map_mission_err)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(mission)))
}

/// POST /v1/missions/{missionId}/rate
///
/// Peer-rate a co-participant; the rating lands as a quality award when the
/// mission completes successfully.
pub async fn rate_participant(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<RateParticipantRequest>,
) -> Result<HttpResponse, AppError> {
    let mission_id = path.into_inner();
    let request = body.into_inner();

    missions(&state)
        .rate(
            &mission_id,
            &request.rater_agent_id,
            &request.target_agent_id,
            request.rating,
        )
        .await
        .map_err(map_mission_err)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(serde_json::json!({
        "missionId": mission_id,
        "rated": request.target_agent_id,
        "rating": crate::models::clamp_rating(request.rating),
    }))))
}

/// Configure mission routes
pub fn configure_mission_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/missions")
            .route("", web::post().to(create_mission))
            .route("/open", web::get().to(find_open_missions))
            .route("/{missionId}", web::get().to(get_mission))
            .route("/{missionId}/join", web::post().to(join_mission))
            .route("/{missionId}/start", web::post().to(start_mission))
            .route("/{missionId}/complete", web::post().to(complete_mission))
            .route("/{missionId}/cancel", web::post().to(cancel_mission))
            .route("/{missionId}/rate", web::post().to(rate_participant)),
    );
}
