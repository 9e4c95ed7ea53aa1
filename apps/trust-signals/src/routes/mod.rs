pub mod health;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::risk::handlers as risk;
use crate::state::AppState;
use crate::votes::handlers as votes;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Risk API
        .route("/api/v1/risk/assess", post(risk::handle_assess))
        .route("/api/v1/risk/:resource_key", get(risk::handle_check_resource))
        // Vote API
        .route(
            "/api/v1/votes/:entity_id",
            put(votes::handle_mount)
                .get(votes::handle_get_state)
                .delete(votes::handle_unmount),
        )
        .route("/api/v1/votes/:entity_id/toggle", post(votes::handle_toggle))
        .route(
            "/api/v1/votes/:entity_id/changes",
            get(votes::handle_wait_for_change),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::backend::{BackendError, StaticThreshold, TelemetrySource, VoteBackend};
    use crate::models::telemetry::FlagTelemetry;
    use crate::models::vote::{EntityId, VoteType, VoteableEntity};
    use crate::risk::assessment::RiskConfig;
    use crate::risk::classifier::RiskLevel;
    use crate::risk::monitor::RiskMonitor;
    use crate::votes::session::VoteTimings;
    use crate::votes::store::VoteStore;

    struct QuietStore;

    #[async_trait]
    impl TelemetrySource for QuietStore {
        async fn fetch_flag_telemetry(
            &self,
            _resource_key: &str,
        ) -> Result<Option<FlagTelemetry>, BackendError> {
            Ok(None)
        }
    }

    #[async_trait]
    impl VoteBackend for QuietStore {
        async fn fetch_voteable_entity(&self, id: &EntityId) -> Result<VoteableEntity, BackendError> {
            Ok(VoteableEntity {
                id: id.clone(),
                up_count: 1,
                down_count: 0,
            })
        }

        async fn fetch_viewer_vote(&self, _id: &EntityId) -> Result<VoteType, BackendError> {
            Ok(VoteType::None)
        }

        async fn commit_vote(&self, _id: &EntityId, vote: VoteType) -> Result<VoteType, BackendError> {
            Ok(vote)
        }
    }

    fn app() -> Router {
        let store = Arc::new(QuietStore);
        let state = AppState {
            risk: RiskMonitor::new(
                store.clone(),
                Arc::new(StaticThreshold(RiskLevel::Moderate)),
                RiskConfig::default(),
            ),
            votes: Arc::new(VoteStore::new(store, VoteTimings::default())),
            mounts: Arc::new(Mutex::new(HashMap::new())),
        };
        build_router(state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_assess_warns_above_threshold() {
        let body = json!({
            "telemetry": {
                "flag_count": 30,
                "flags_cumulative_weight": 45.0,
                "impressions": 120,
                "last_flag_timestamp": "2024-06-01T00:00:00Z",
                "impressions_since_last_flag": 0
            },
            "now": "2024-06-01T00:00:00Z"
        });
        let (status, verdict) = send(&app(), "POST", "/api/v1/risk/assess", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(verdict["assessment"]["level"], "severe");
        assert_eq!(verdict["threshold"], "moderate");
        assert_eq!(verdict["warn"], true);
    }

    #[tokio::test]
    async fn test_assess_partial_telemetry_never_warns() {
        let body = json!({ "telemetry": { "flag_count": 3 }, "threshold": "low" });
        let (status, verdict) = send(&app(), "POST", "/api/v1/risk/assess", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(verdict["assessment"]["assessed"], false);
        assert_eq!(verdict["warn"], false);
    }

    #[tokio::test]
    async fn test_unknown_resource_is_unassessed() {
        let (status, verdict) = send(&app(), "GET", "/api/v1/risk/example.com", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(verdict["assessment"]["level"], "none");
        assert_eq!(verdict["warn"], false);
    }

    #[tokio::test]
    async fn test_mount_toggle_and_read_back() {
        let app = app();
        let (status, mounted) = send(
            &app,
            "PUT",
            "/api/v1/votes/c42",
            Some(json!({ "score": 10, "vote": "none" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mounted["displayed_score"], 10);

        let (status, toggled) = send(
            &app,
            "POST",
            "/api/v1/votes/c42/toggle",
            Some(json!({ "vote": "downvote" })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(toggled["displayed_vote"], "downvote");
        assert_eq!(toggled["displayed_score"], 9);
        assert_eq!(toggled["phase"], "pending");

        let (status, current) = send(&app, "GET", "/api/v1/votes/c42", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(current["displayed_score"], 9);

        let (status, _) = send(&app, "DELETE", "/api/v1/votes/c42", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_wait_for_change_returns_missed_update() {
        let app = app();
        let (_, mounted) = send(
            &app,
            "PUT",
            "/api/v1/votes/c42",
            Some(json!({ "score": 10, "vote": "none" })),
        )
        .await;
        let seen = mounted["revision"].as_u64().unwrap();

        // The change lands before the poll starts.
        send(
            &app,
            "POST",
            "/api/v1/votes/c42/toggle",
            Some(json!({ "vote": "upvote" })),
        )
        .await;

        let uri = format!("/api/v1/votes/c42/changes?since={seen}");
        let (status, latest) = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            send(&app, "GET", &uri, None),
        )
        .await
        .expect("poll should not wait for a change it already missed");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(latest["displayed_vote"], "upvote");
        assert_eq!(latest["displayed_score"], 11);
        assert!(latest["revision"].as_u64().unwrap() > seen);
    }

    #[tokio::test]
    async fn test_unmounted_entity_not_found() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/v1/votes/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let (status, _) = send(&app, "DELETE", "/api/v1/votes/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_vote_rejected() {
        let (status, _) = send(
            &app(),
            "POST",
            "/api/v1/votes/c1/toggle",
            Some(json!({ "vote": "sideways" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
