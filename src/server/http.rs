//! HTTP surface
//!
//! Convoy create/join, location lookup, health and the root status page. The
//! root path and `/ws` also accept WebSocket upgrades, handed to
//! [`ws`](super::ws).

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::registry::{Convoy, MemberPosition, Registry, RegistryError};
use crate::session::{ConnectParams, ConnectionManager};
use crate::stats::{HealthResponse, ServerStats};

use super::ws;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub manager: Arc<ConnectionManager>,
    pub stats: Arc<ServerStats>,
    /// Caps concurrent streaming connections when set
    pub connection_limit: Option<Arc<Semaphore>>,
}

/// Build the router with all routes
pub fn build_router(state: AppState, cors: bool) -> Router {
    let router = Router::new()
        .route("/", get(root_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/convoy/create", post(create_handler))
        .route("/convoy/join", post(join_handler))
        .route("/convoy/{convoy_id}/locations", get(locations_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// JSON error body
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub(super) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = match self {
            RegistryError::MissingField(_) => StatusCode::BAD_REQUEST,
            RegistryError::ConvoyNotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::ConvoyAlreadyExists(_) => StatusCode::CONFLICT,
        };
        error_response(status, self.to_string())
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    message: &'static str,
    status: &'static str,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateConvoyRequest {
    #[serde(default)]
    convoy_id: String,
    #[serde(default)]
    creator_id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinConvoyRequest {
    #[serde(default)]
    convoy_id: String,
    #[serde(default)]
    user_id: String,
}

#[derive(Debug, Serialize)]
struct ConvoyResponse {
    success: bool,
    convoy: Convoy,
}

#[derive(Debug, Serialize)]
struct LocationsResponse {
    locations: BTreeMap<String, MemberPosition>,
}

/// Status page, or a WebSocket upgrade when the request asks for one
async fn root_handler(
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    match upgrade {
        Ok(upgrade) => ws::accept(upgrade, params, state),
        Err(_) => Json(StatusResponse {
            message: "Convoy Server Running!",
            status: "online",
            timestamp: Utc::now(),
        })
        .into_response(),
    }
}

async fn ws_handler(
    upgrade: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    ws::accept(upgrade, params, state)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let (convoys, users) = {
        let registry = state.registry.read().await;
        (registry.convoy_count(), registry.position_count())
    };

    Json(HealthResponse::new(
        state.stats.active_connections(),
        convoys,
        users,
    ))
}

async fn create_handler(
    State(state): State<AppState>,
    body: Result<Json<CreateConvoyRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    match state
        .registry
        .create_convoy(&request.convoy_id, &request.creator_id, request.name)
        .await
    {
        Ok(convoy) => Json(ConvoyResponse {
            success: true,
            convoy,
        })
        .into_response(),
        Err(e) => {
            tracing::debug!(error = %e, "Create convoy rejected");
            e.into_response()
        }
    }
}

async fn join_handler(
    State(state): State<AppState>,
    body: Result<Json<JoinConvoyRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    match state
        .registry
        .join_convoy(&request.convoy_id, &request.user_id)
        .await
    {
        Ok(convoy) => Json(ConvoyResponse {
            success: true,
            convoy,
        })
        .into_response(),
        Err(e) => {
            tracing::debug!(error = %e, "Join convoy rejected");
            e.into_response()
        }
    }
}

async fn locations_handler(
    State(state): State<AppState>,
    Path(convoy_id): Path<String>,
) -> Result<Json<LocationsResponse>, RegistryError> {
    let locations = state.registry.convoy_locations(&convoy_id).await?;
    Ok(Json(LocationsResponse { locations }))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;

    use super::*;
    use crate::relay::BroadcastPolicy;

    fn app() -> (Router, Arc<Registry>) {
        let registry = Arc::new(Registry::new());
        let stats = Arc::new(ServerStats::new());
        let manager = Arc::new(ConnectionManager::new(
            Arc::clone(&registry),
            BroadcastPolicy::FullSnapshot,
            Arc::clone(&stats),
            16,
        ));
        let state = AppState {
            registry: Arc::clone(&registry),
            manager,
            stats,
            connection_limit: None,
        };
        (build_router(state, true), registry)
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_root_status() {
        let (router, _) = app();
        let (status, body) = send(router, get("/")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Convoy Server Running!");
        assert_eq!(body["status"], "online");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_health() {
        let (router, registry) = app();
        registry.create_convoy("g1", "u1", None).await.unwrap();

        let (status, body) = send(router, get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({
                "status": "healthy",
                "activeConnections": 0,
                "activeConvoys": 1,
                "activeUsers": 0,
            })
        );
    }

    #[tokio::test]
    async fn test_create_convoy() {
        let (router, registry) = app();

        let (status, body) = send(
            router,
            post_json("/convoy/create", serde_json::json!({"convoyId": "g1", "creatorId": "u1"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["convoy"]["id"], "g1");
        assert_eq!(body["convoy"]["name"], "Convoy g1");
        assert_eq!(body["convoy"]["creatorId"], "u1");
        assert_eq!(body["convoy"]["members"], serde_json::json!(["u1"]));
        assert_eq!(body["convoy"]["isActive"], true);
        assert!(registry.convoy("g1").await.is_some());
    }

    #[tokio::test]
    async fn test_create_convoy_errors() {
        let (router, _) = app();

        let (status, body) = send(
            router.clone(),
            post_json("/convoy/create", serde_json::json!({"convoyId": "g1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("creatorId"));

        let create = serde_json::json!({"convoyId": "g1", "creatorId": "u1", "name": "Trip"});
        let (status, _) = send(router.clone(), post_json("/convoy/create", create.clone())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(router, post_json("/convoy/create", create)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Convoy already exists: g1");
    }

    #[tokio::test]
    async fn test_create_convoy_bad_body() {
        let (router, _) = app();
        let request = Request::post("/convoy/create")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{oops"))
            .unwrap();

        let (status, body) = send(router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_join_convoy() {
        let (router, registry) = app();
        registry.create_convoy("g1", "u1", None).await.unwrap();

        let (status, body) = send(
            router.clone(),
            post_json("/convoy/join", serde_json::json!({"convoyId": "g1", "userId": "u2"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["convoy"]["members"], serde_json::json!(["u1", "u2"]));

        let (status, body) = send(
            router.clone(),
            post_json("/convoy/join", serde_json::json!({"convoyId": "nope", "userId": "u2"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Convoy not found: nope");

        let (status, _) = send(
            router,
            post_json("/convoy/join", serde_json::json!({"convoyId": "g1", "userId": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_locations() {
        let (router, registry) = app();
        registry.create_convoy("g1", "u1", None).await.unwrap();
        registry.join_convoy("g1", "u2").await.unwrap();
        registry
            .upsert_position("u1", MemberPosition::new("u1", [1.0, 2.0]))
            .await;

        let (status, body) = send(router.clone(), get("/convoy/g1/locations")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["locations"]["u1"]["coordinates"], serde_json::json!([1.0, 2.0]));
        assert_eq!(body["locations"]["u1"]["userId"], "u1");
        assert!(body["locations"].get("u2").is_none());

        let (status, body) = send(router, get("/convoy/ghost/locations")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }
}
