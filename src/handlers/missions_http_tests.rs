//! HTTP Integration Tests for the Mission Engine
//!
//! These tests validate the mission lifecycle and its error surface
//! end-to-end via HTTP endpoints.
//!
//! Run with: `cargo test missions_http_tests -- --ignored`

#[cfg(test)]
mod http_integration_tests {
    use actix_web::{test, web, App};
    use sqlx::PgPool;
    use uuid::Uuid;

    use crate::config::Config;
    use crate::handlers::configure_mission_routes;
    use crate::AppState;

    /// Helper to create a test database pool - returns None if connection fails
    async fn try_create_test_pool() -> Option<PgPool> {
        let _ = dotenvy::dotenv();

        let database_url = match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => return None,
        };

        sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await
            .ok()
    }

    /// Create test config
    fn create_test_config() -> Config {
        Config {
            database_url: std::env::var("DATABASE_URL").unwrap_or_default(),
            database_max_connections: 5,
            host: "127.0.0.1".to_string(),
            port: 8080,
            online_window_secs: 300,
            anchor_enabled: false,
        }
    }

    /// Create test app state
    fn create_test_app_state(pool: PgPool) -> web::Data<AppState> {
        web::Data::new(AppState {
            db: pool,
            config: create_test_config(),
        })
    }

    async fn cleanup_mission(pool: &PgPool, mission_id: &str) {
        let _ = sqlx::query("DELETE FROM reputation_events WHERE mission_id = $1")
            .bind(mission_id)
            .execute(pool)
            .await;
        let _ = sqlx::query("DELETE FROM missions WHERE mission_id = $1")
            .bind(mission_id)
            .execute(pool)
            .await;
    }

    #[ignore]
    #[tokio::test]
    async fn mission_lifecycle_over_http() {
        let pool = match try_create_test_pool().await {
            Some(p) => p,
            None => {
                eprintln!("Skipping test: database not available");
                return;
            }
        };

        let app = test::init_service(
            App::new()
                .app_data(create_test_app_state(pool.clone()))
                .service(web::scope("/v1").configure(configure_mission_routes)),
        )
        .await;

        let creator = format!("test-creator-{}", Uuid::new_v4());
        let helper = format!("test-helper-{}", Uuid::new_v4());

        let req = test::TestRequest::post()
            .uri("/v1/missions")
            .set_json(serde_json::json!({
                "creatorId": creator,
                "title": "Translate the handbook",
                "description": "Full translation pass",
                "requiredCapabilities": ["translate"],
                "reward": 120,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);

        let body: serde_json::Value = test::read_body_json(resp).await;
        let mission_id = body["data"]["missionId"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["status"], "open");

        let req = test::TestRequest::post()
            .uri(&format!("/v1/missions/{mission_id}/join"))
            .set_json(serde_json::json!({ "agentId": helper }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        // A non-creator cannot start the mission
        let req = test::TestRequest::post()
            .uri(&format!("/v1/missions/{mission_id}/start"))
            .set_json(serde_json::json!({ "agentId": helper }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 403);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "NOT_AUTHORIZED");

        let req = test::TestRequest::post()
            .uri(&format!("/v1/missions/{mission_id}/start"))
            .set_json(serde_json::json!({ "agentId": creator }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let req = test::TestRequest::post()
            .uri(&format!("/v1/missions/{mission_id}/complete"))
            .set_json(serde_json::json!({
                "agentId": creator,
                "result": {
                    "success": true,
                    "summary": "Delivered",
                    "participantScores": { (helper.clone()): 150 },
                },
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["status"], "completed");

        cleanup_mission(&pool, &mission_id).await;
    }

    #[ignore]
    #[tokio::test]
    async fn duplicate_join_is_conflict() {
        let pool = match try_create_test_pool().await {
            Some(p) => p,
            None => {
                eprintln!("Skipping test: database not available");
                return;
            }
        };

        let app = test::init_service(
            App::new()
                .app_data(create_test_app_state(pool.clone()))
                .service(web::scope("/v1").configure(configure_mission_routes)),
        )
        .await;

        let creator = format!("test-creator-{}", Uuid::new_v4());
        let helper = format!("test-helper-{}", Uuid::new_v4());

        let req = test::TestRequest::post()
            .uri("/v1/missions")
            .set_json(serde_json::json!({
                "creatorId": creator,
                "title": "Crawl the docs",
                "description": "Index pass",
                "reward": 40,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        let mission_id = body["data"]["missionId"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri(&format!("/v1/missions/{mission_id}/join"))
            .set_json(serde_json::json!({ "agentId": helper }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let req = test::TestRequest::post()
            .uri(&format!("/v1/missions/{mission_id}/join"))
            .set_json(serde_json::json!({ "agentId": helper }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 409);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "DUPLICATE_PARTICIPANT");

        cleanup_mission(&pool, &mission_id).await;
    }

    #[ignore]
    #[tokio::test]
    async fn unknown_mission_is_not_found() {
        let pool = match try_create_test_pool().await {
            Some(p) => p,
            None => {
                eprintln!("Skipping test: database not available");
                return;
            }
        };

        let app = test::init_service(
            App::new()
                .app_data(create_test_app_state(pool))
                .service(web::scope("/v1").configure(configure_mission_routes)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/v1/missions/{}", Uuid::new_v4()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }
}
