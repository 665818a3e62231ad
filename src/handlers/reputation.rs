use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::error::AppError;
use crate::models::{LeaderboardQuery, RecordEventRequest};
use crate::services::ledger::LedgerError;
use crate::services::LedgerService;
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

fn map_ledger_err(e: LedgerError) -> AppError {
    match e {
        LedgerError::Database(e) => AppError::Database(e),
        LedgerError::InvalidEventData(msg) => AppError::Internal(msg),
    }
}

/// POST /v1/reputation/events
///
/// Append a verified scoring event to the ledger. The ledger is append-only:
/// there is no update or delete counterpart to this endpoint.
pub async fn record_event(
    state: web::Data<AppState>,
    body: web::Json<RecordEventRequest>,
) -> Result<HttpResponse, AppError> {
    let request = body.into_inner();

    if request.agent_id.trim().is_empty() {
        return Err(AppError::Validation("agentId must not be empty".to_string()));
    }
    if request.mission_id.trim().is_empty() {
        return Err(AppError::Validation(
            "missionId must not be empty".to_string(),
        ));
    }
    if request.verified_by.trim().is_empty() {
        return Err(AppError::Validation(
            "verifiedBy must not be empty".to_string(),
        ));
    }

    let event = LedgerService::new(state.db.clone())
        .record_event(
            &request.agent_id,
            &request.mission_id,
            request.score,
            request.category,
            &request.verified_by,
            request.proof_ref.as_deref(),
        )
        .await
        .map_err(map_ledger_err)?;

    Ok(HttpResponse::Created().json(ApiResponse::new(event)))
}

/// GET /v1/reputation/leaderboard
///
/// Agents with at least one ledger event, ranked by total score.
pub async fn get_leaderboard(
    state: web::Data<AppState>,
    query: web::Query<LeaderboardQuery>,
) -> Result<HttpResponse, AppError> {
    let leaderboard = LedgerService::new(state.db.clone())
        .get_leaderboard(query.limit)
        .await
        .map_err(map_ledger_err)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(leaderboard)))
}

/// Configure reputation routes
pub fn configure_reputation_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/reputation")
            .route("/events", web::post().to(record_event))
            .route("/leaderboard", web::get().to(get_leaderboard)),
    );
}
