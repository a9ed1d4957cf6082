//! Axum route handlers for the avatar overlay HTTP server.
//!
//! # Routes
//!
//! - `GET  /health`              : Returns `{"status": "ok", "version": ...}`
//! - `GET  /currentExpression`   : Current expression, visual state and active batch
//! - `GET  /setExpression`       : `?name&direction&posX&posY&rotation&scale`
//! - `GET  /expressions`         : Catalog in load order
//! - `POST /setBatchExpressions` : JSON body `{loop, random?, actions[]}`
//! - `GET  /setBatchExpressions` : Same, as `?data=<json>`
//! - `POST /mcp`                 : MCP JSON-RPC over HTTP

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::errors::AvatarError;
use crate::mcp::McpServer;
use crate::state::{AvatarStateStore, BatchOutcome, BatchRequest, Direction, VisualUpdate};
use crate::tools::ToolRegistry;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    /// The one avatar state store.
    pub store: Arc<AvatarStateStore>,
    /// MCP endpoint sharing the same store.
    pub mcp: Arc<McpServer>,
}

impl AppState {
    pub fn new(store: Arc<AvatarStateStore>) -> Self {
        let mcp = Arc::new(McpServer::new(ToolRegistry::with_avatar_tools(Arc::clone(
            &store,
        ))));
        Self { store, mcp }
    }
}

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

/// Build the axum router with all routes.
///
/// When `static_dir` is given, unmatched paths are served from it.
pub fn app_router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/currentExpression", get(current_expression_handler))
        .route("/setExpression", get(set_expression_handler))
        .route("/expressions", get(list_expressions_handler))
        .route(
            "/setBatchExpressions",
            get(set_batch_query_handler).post(set_batch_body_handler),
        )
        .route("/mcp", post(mcp_handler));

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_error(err: AvatarError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        AvatarError::TransportUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    };
    let mut body = serde_json::json!({ "error": err.to_string() });
    if let Some(available) = err.available_expressions() {
        body["availableExpressions"] = serde_json::json!(available);
    }
    (status, Json(body))
}

/// GET /health: liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "avatar-overlay",
    }))
}

/// Current state in wire shape; 404 if the expression does not resolve.
fn current_payload(store: &AvatarStateStore) -> ApiResult {
    let view = store.current_view();
    let payload = view.to_payload().ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": format!("Expression '{}' not found", view.expression_name),
                "availableExpressions": store.catalog().names(),
            })),
        )
    })?;
    let body = serde_json::to_value(payload).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
    })?;
    Ok(Json(body))
}

/// GET /currentExpression
async fn current_expression_handler(State(state): State<AppState>) -> ApiResult {
    current_payload(&state.store)
}

/// GET /setExpression?name=joyful&direction=left&posX=10&posY=0&rotation=5&scale=1.2
///
/// Only supplied fields change; a missing or unknown name is a 400 that
/// lists the valid names.
async fn set_expression_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    let name = params
        .get("name")
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "Missing 'name' parameter",
                    "availableExpressions": state.store.catalog().names(),
                })),
            )
        })?;

    let update = parse_visual_update(&params).map_err(api_error)?;
    state
        .store
        .set_expression(name, &update)
        .map_err(api_error)?;

    let Json(mut body) = current_payload(&state.store)?;
    if let Value::Object(map) = &mut body {
        map.insert("success".to_string(), Value::Bool(true));
    }
    Ok(Json(body))
}

/// GET /expressions
async fn list_expressions_handler(State(state): State<AppState>) -> ApiResult {
    let expressions = serde_json::to_value(state.store.catalog().expressions()).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
    })?;
    Ok(Json(expressions))
}

/// POST /setBatchExpressions
async fn set_batch_body_handler(State(state): State<AppState>, body: String) -> ApiResult {
    install_batch(&state.store, &body)
}

/// GET /setBatchExpressions?data=<json>
async fn set_batch_query_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    let data = params.get("data").ok_or_else(|| {
        api_error(AvatarError::InvalidArgument(
            "Missing 'data' parameter".to_string(),
        ))
    })?;
    install_batch(&state.store, data)
}

/// Install path: invalid actions are dropped, not rejected.
fn install_batch(store: &AvatarStateStore, raw: &str) -> ApiResult {
    let request: BatchRequest = serde_json::from_str(raw).map_err(|e| {
        api_error(AvatarError::InvalidArgument(format!(
            "Invalid batch request: {}",
            e
        )))
    })?;
    let outcome = store.set_batch(request).map_err(api_error)?;
    Ok(Json(batch_response(&outcome)))
}

fn batch_response(outcome: &BatchOutcome) -> Value {
    let mut body = serde_json::json!({
        "success": true,
        "batchId": outcome.batch_id(),
        "actionCount": outcome.action_count(),
    });
    if outcome.is_collapsed() {
        body["collapsed"] = Value::Bool(true);
    }
    if outcome.dropped() > 0 {
        body["droppedCount"] = serde_json::json!(outcome.dropped());
    }
    body
}

/// POST /mcp: one JSON-RPC message per request.
async fn mcp_handler(State(state): State<AppState>, body: String) -> Response {
    match state.mcp.handle_message(&body) {
        Some(reply) => Json(reply).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

fn parse_number(params: &HashMap<String, String>, key: &str) -> Result<Option<f64>, AvatarError> {
    match params.get(key).map(|s| s.trim()).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => raw.parse::<f64>().map(Some).map_err(|_| {
            AvatarError::InvalidArgument(format!("{} must be a number, got '{}'", key, raw))
        }),
    }
}

fn parse_visual_update(params: &HashMap<String, String>) -> Result<VisualUpdate, AvatarError> {
    let direction = params
        .get("direction")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::parse::<Direction>)
        .transpose()?;
    Ok(VisualUpdate {
        direction,
        pos_x: parse_number(params, "posX")?,
        pos_y: parse_number(params, "posY")?,
        rotation: parse_number(params, "rotation")?,
        scale: parse_number(params, "scale")?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let catalog = Catalog::parse(
            r#"{
                "joyful": {"image": "joyful.png", "description": "Happy", "useCases": "Good news"},
                "sad": {"image": "sad.png", "description": "Down", "useCases": "Bad news"},
                "surprised": {"image": "surprised.png", "description": "Wow", "useCases": "Shock"}
            }"#,
        )
        .unwrap();
        AppState::new(Arc::new(AvatarStateStore::new(Arc::new(catalog))))
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let app = app_router(state.clone(), None);
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (status, json) = send(&test_state(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], crate::VERSION);
    }

    #[tokio::test]
    async fn test_current_expression_initial() {
        let (status, json) = send(&test_state(), get("/currentExpression")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["name"], "joyful");
        assert_eq!(json["imageRef"], "joyful.png");
        assert_eq!(json["description"], "Happy");
        assert_eq!(json["useCases"], "Good news");
        assert_eq!(json["direction"], "right");
        assert_eq!(json["rotation"], 0.0);
        assert_eq!(json["scale"], 1.0);
        assert!(json.get("batchExpressions").is_none());
    }

    #[tokio::test]
    async fn test_set_expression_merges_and_clamps() {
        let state = test_state();
        let (status, json) = send(
            &state,
            get("/setExpression?name=sad&direction=left&posX=25&rotation=90"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["name"], "sad");
        assert_eq!(json["direction"], "left");
        assert_eq!(json["posX"], 25.0);
        assert_eq!(json["rotation"], 30.0);

        let (_, json) = send(&state, get("/setExpression?name=surprised&scale=0")).await;
        assert_eq!(json["direction"], "left");
        assert_eq!(json["posX"], 25.0);
        assert_eq!(json["scale"], 0.1);
    }

    #[tokio::test]
    async fn test_set_expression_unknown_name() {
        let state = test_state();
        let (status, json) = send(&state, get("/setExpression?name=angry&posX=5")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("angry"));
        assert_eq!(
            json["availableExpressions"],
            serde_json::json!(["joyful", "sad", "surprised"])
        );
        assert_eq!(state.store.current_view().visual.pos_x, 0.0);
    }

    #[tokio::test]
    async fn test_set_expression_missing_name_and_bad_number() {
        let state = test_state();
        let (status, json) = send(&state, get("/setExpression")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["availableExpressions"].is_array());

        let (status, json) = send(&state, get("/setExpression?name=sad&posX=abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("posX"));
        assert_eq!(state.store.current_view().expression_name, "joyful");

        let (status, _) = send(&state, get("/setExpression?name=sad&direction=up")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_set_expression_name_is_matched_exactly() {
        let state = test_state();
        let (status, json) = send(&state, get("/setExpression?name=%20sad%20")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["availableExpressions"].is_array());

        let (status, _) = send(&state, get("/setExpression?name=Sad")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&state, get("/setExpression?name=")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(state.store.current_view().expression_name, "joyful");
    }

    #[tokio::test]
    async fn test_internal_errors_map_to_client_statuses() {
        let (status, _) = api_error(AvatarError::NoValidActions);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, json) = api_error(AvatarError::TransportUnavailable("down".into()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(json.get("availableExpressions").is_none());
    }

    #[tokio::test]
    async fn test_list_expressions_in_order() {
        let (status, json) = send(&test_state(), get("/expressions")).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["joyful", "sad", "surprised"]);
        assert_eq!(json[1]["imageRef"], "sad.png");
    }

    #[tokio::test]
    async fn test_set_batch_then_current_shows_batch() {
        let state = test_state();
        let (status, json) = send(
            &state,
            post_json(
                "/setBatchExpressions",
                serde_json::json!({
                    "loop": true,
                    "random": true,
                    "actions": [
                        {"expression": "sad", "duration": 300, "direction": "left"},
                        {"expression": "joyful", "duration": 200}
                    ]
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["actionCount"], 2);
        let batch_id = json["batchId"].as_str().unwrap().to_string();

        let (_, current) = send(&state, get("/currentExpression")).await;
        assert_eq!(current["name"], "sad");
        assert_eq!(current["direction"], "left");
        assert_eq!(current["batchExpressions"]["batchId"], batch_id.as_str());
        assert_eq!(current["batchExpressions"]["random"], true);
        assert_eq!(current["batchExpressions"]["actions"][1]["expressionName"], "joyful");

        let (_, again) = send(&state, get("/currentExpression")).await;
        assert_eq!(again["batchExpressions"]["batchId"], batch_id.as_str());
    }

    #[tokio::test]
    async fn test_set_batch_partial_filter_reports_reduced_count() {
        let state = test_state();
        let (status, json) = send(
            &state,
            post_json(
                "/setBatchExpressions",
                serde_json::json!({
                    "loop": false,
                    "actions": [
                        {"expressionName": "sad", "durationMs": 100},
                        {"expressionName": "angry", "durationMs": 100},
                        {"expressionName": "joyful", "durationMs": 100}
                    ]
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["actionCount"], 2);
        assert_eq!(json["droppedCount"], 1);
    }

    #[tokio::test]
    async fn test_set_batch_all_invalid_is_rejected() {
        let state = test_state();
        let (status, json) = send(
            &state,
            post_json(
                "/setBatchExpressions",
                serde_json::json!({
                    "loop": true,
                    "actions": [{"expression": "angry", "duration": 100}]
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("No valid actions"));
        assert!(state.store.current_view().batch.is_none());
    }

    #[tokio::test]
    async fn test_set_batch_collapse_reply() {
        let state = test_state();
        let (status, json) = send(
            &state,
            post_json(
                "/setBatchExpressions",
                serde_json::json!({
                    "loop": false,
                    "actions": [{"expression": "surprised", "duration": 100}]
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["collapsed"], true);
        assert!(json["batchId"].is_null());
        let (_, current) = send(&state, get("/currentExpression")).await;
        assert_eq!(current["name"], "surprised");
        assert!(current.get("batchExpressions").is_none());
    }

    #[tokio::test]
    async fn test_set_batch_via_query_and_malformed_body() {
        let state = test_state();
        let (status, json) = send(
            &state,
            get("/setBatchExpressions?data=%7B%22loop%22%3Atrue%2C%22actions%22%3A%5B%7B%22expression%22%3A%22sad%22%2C%22duration%22%3A100%7D%5D%7D"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["actionCount"], 1);

        let request = Request::builder()
            .method("POST")
            .uri("/setBatchExpressions")
            .body(Body::from("not json"))
            .unwrap();
        let (status, json) = send(&state, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().starts_with("Invalid argument"));
    }

    #[tokio::test]
    async fn test_set_expression_clears_batch() {
        let state = test_state();
        send(
            &state,
            post_json(
                "/setBatchExpressions",
                serde_json::json!({
                    "loop": true,
                    "actions": [
                        {"expression": "sad", "duration": 100},
                        {"expression": "joyful", "duration": 100}
                    ]
                }),
            ),
        )
        .await;
        send(&state, get("/setExpression?name=surprised")).await;
        let (_, current) = send(&state, get("/currentExpression")).await;
        assert!(current.get("batchExpressions").is_none());
        assert_eq!(current["name"], "surprised");
    }

    #[tokio::test]
    async fn test_mcp_over_http() {
        let state = test_state();
        let (status, json) = send(
            &state,
            post_json(
                "/mcp",
                serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "method": "tools/call",
                    "params": {"name": "setAvatarExpression", "arguments": {"name": "sad"}}
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], 1);
        assert!(json["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("sad"));
        assert_eq!(state.store.current_view().expression_name, "sad");

        let (status, _) = send(
            &state,
            post_json(
                "/mcp",
                serde_json::json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_static_files_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("overlay.html"), "<html>avatar</html>").unwrap();
        let app = app_router(test_state(), Some(dir.path().to_path_buf()));
        let response = app.oneshot(get("/overlay.html")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"<html>avatar</html>");
    }
}
