//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to the admin command service and the
//! hub snapshots.

use axum::{
    body::Bytes,
    extract::State,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::api::auth::{require_admin, require_plugin_token};
use crate::api::plugin_ws::plugin_ws_handler;
use crate::api::response::api_success;
use crate::api::ws::video_ws_handler;
use crate::api::AppState;
use crate::error::RelayResult;
use crate::protocol_constants::SERVICE_ID;
use crate::services::AdminCommand;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/admin/video/init", post(video_init))
        .route("/admin/video/play", post(video_play))
        .route("/admin/video/pause", post(video_pause))
        .route("/admin/video/seek", post(video_seek))
        .route("/admin/video/close", post(video_close))
        .route("/admin/video/play-instant", post(video_play_instant))
        .route("/admin/video/preload", post(video_preload))
        .route(
            "/admin/video/initialize-playlist",
            post(video_initialize_playlist),
        )
        .route("/admin/video/connections", get(list_connections))
        .route("/admin/video/regions", get(list_regions))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let plugin = Router::new()
        .route("/ws/plugin", get(plugin_ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_plugin_token,
        ));

    Router::new()
        .route("/healthz", get(health_check))
        .route("/set-region", post(set_region))
        .route("/ws/video", get(video_ws_handler))
        .merge(admin)
        .merge(plugin)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness check.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "ok": true,
        "service": SERVICE_ID,
        "connections": state.hub.connection_count(),
    }))
}

/// Parses a request body as JSON. An empty body counts as `{}`.
fn parse_body(body: &Bytes) -> RelayResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    Ok(serde_json::from_slice(body)?)
}

fn run(command: AdminCommand, state: &AppState, body: &Bytes) -> RelayResult<Json<Value>> {
    let body = parse_body(body)?;
    command.execute(&state.hub, &body).map(Json)
}

async fn set_region(State(state): State<AppState>, body: Bytes) -> RelayResult<Json<Value>> {
    run(AdminCommand::SetRegion, &state, &body)
}

async fn video_init(State(state): State<AppState>, body: Bytes) -> RelayResult<Json<Value>> {
    run(AdminCommand::Init, &state, &body)
}

async fn video_play(State(state): State<AppState>, body: Bytes) -> RelayResult<Json<Value>> {
    run(AdminCommand::Play, &state, &body)
}

async fn video_pause(State(state): State<AppState>, body: Bytes) -> RelayResult<Json<Value>> {
    run(AdminCommand::Pause, &state, &body)
}

async fn video_seek(State(state): State<AppState>, body: Bytes) -> RelayResult<Json<Value>> {
    run(AdminCommand::Seek, &state, &body)
}

async fn video_close(State(state): State<AppState>, body: Bytes) -> RelayResult<Json<Value>> {
    run(AdminCommand::Close, &state, &body)
}

async fn video_play_instant(
    State(state): State<AppState>,
    body: Bytes,
) -> RelayResult<Json<Value>> {
    run(AdminCommand::PlayInstant, &state, &body)
}

async fn video_preload(State(state): State<AppState>, body: Bytes) -> RelayResult<Json<Value>> {
    run(AdminCommand::Preload, &state, &body)
}

async fn video_initialize_playlist(
    State(state): State<AppState>,
    body: Bytes,
) -> RelayResult<Json<Value>> {
    run(AdminCommand::InitializePlaylist, &state, &body)
}

/// GET /admin/video/connections
async fn list_connections(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "ok": true, "connections": state.hub.connections() }))
}

/// GET /admin/video/regions
async fn list_regions(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "ok": true, "regions": state.hub.regions() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::identity::PrefixTokenValidator;
    use crate::services::{PlayerIdentity, RelayHub};
    use crate::state::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const ADMIN_KEY: &str = "admin-secret";

    fn app_state(config: Config) -> AppState {
        let hub = RelayHub::new(Arc::new(ManualClock::new(5_000)), Duration::from_secs(900));
        AppState::builder()
            .hub(Arc::new(hub))
            .validator(Arc::new(PrefixTokenValidator))
            .config(Arc::new(config))
            .build()
            .unwrap()
    }

    fn secured() -> AppState {
        app_state(Config {
            admin_key: Some(ADMIN_KEY.into()),
            plugin_token: Some("plug".into()),
            ..Config::default()
        })
    }

    fn post_json(uri: &str, key: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::post(uri).header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header("x-admin-key", key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    static CAPTURED: parking_lot::Mutex<Vec<(log::Level, String)>> =
        parking_lot::const_mutex(Vec::new());

    struct CaptureLogger;

    impl log::Log for CaptureLogger {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            CAPTURED
                .lock()
                .push((record.level(), record.target().to_string()));
        }

        fn flush(&self) {}
    }

    static CAPTURE_LOGGER: CaptureLogger = CaptureLogger;

    #[tokio::test]
    async fn requests_reach_the_log_facade_at_info() {
        let _ = log::set_logger(&CAPTURE_LOGGER);
        log::set_max_level(log::LevelFilter::Trace);

        let state = secured();
        let request = Request::get("/healthz").body(Body::empty()).unwrap();
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);

        let captured = CAPTURED.lock();
        assert!(
            captured
                .iter()
                .any(|(level, target)| *level == log::Level::Info
                    && target.starts_with("tower_http::trace")),
            "no request log in {captured:?}"
        );
    }

    #[tokio::test]
    async fn healthz_is_open() {
        let state = secured();
        let request = Request::get("/healthz").body(Body::empty()).unwrap();
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["service"], SERVICE_ID);
    }

    #[tokio::test]
    async fn admin_routes_require_key() {
        let state = secured();
        let body = r#"{"regionId":"lobby"}"#;

        let (status, err) = send(&state, post_json("/admin/video/close", None, body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(err["error"], "unauthorized");

        let (status, _) = send(&state, post_json("/admin/video/close", Some("wrong"), body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, ok) = send(&state, post_json("/admin/video/close", Some(ADMIN_KEY), body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ok["delivered"], false);
        assert_eq!(ok["target"], "region");
    }

    #[tokio::test]
    async fn open_admin_when_no_key_configured() {
        let state = app_state(Config::default());
        let request = Request::get("/admin/video/regions").body(Body::empty()).unwrap();
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true, "regions": [] }));
    }

    #[tokio::test]
    async fn malformed_requests_answer_400() {
        let state = secured();

        let (status, body) = send(
            &state,
            post_json("/admin/video/init", Some(ADMIN_KEY), r#"{"token":"tok-1"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");

        let (status, _) = send(
            &state,
            post_json("/admin/video/play", Some(ADMIN_KEY), "{not json"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&state, post_json("/admin/video/pause", Some(ADMIN_KEY), "")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("regionId required"));
    }

    #[tokio::test]
    async fn set_region_and_snapshots() {
        let state = secured();
        let _rx = state.hub.connect(
            "tok-1",
            PlayerIdentity {
                player_id: "p1".into(),
                ..PlayerIdentity::default()
            },
        );

        let (status, body) = send(
            &state,
            post_json(
                "/set-region",
                None,
                r#"{"token":"tok-1","regionId":"Lobby","regionDisplayName":"The Lobby"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["regionId"], "lobby");
        assert_eq!(body["changed"], true);

        let request = Request::get("/admin/video/connections")
            .header("x-admin-key", ADMIN_KEY)
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["connections"][0]["token"], "tok-1");
        assert_eq!(body["connections"][0]["region"], "lobby");
        assert_eq!(body["connections"][0]["regionDisplayName"], "The Lobby");
    }

    #[tokio::test]
    async fn plugin_socket_refuses_bad_token_before_upgrade() {
        let state = secured();
        let request = Request::get("/ws/plugin?token=nope").body(Body::empty()).unwrap();
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }
}
