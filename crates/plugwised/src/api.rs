use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine::Device;
use crate::engine::Engine;
use crate::engine::ServiceError;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
}

/// Response for the /v1/state endpoint
#[derive(Serialize)]
struct StateResponse {
    state: crate::engine::State,
    devices: Vec<Device>,
    services: Vec<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    engine: Arc<Engine>,
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
        }),
    )
}

/// Handler for GET /v1/state
#[tracing::instrument(skip(state))]
async fn engine_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/state request");

    let services = state
        .engine
        .services()
        .into_iter()
        .map(|(domain, service)| format!("{}.{}", domain, service))
        .collect();

    (
        StatusCode::OK,
        Json(StateResponse {
            state: crate::engine::State::clone(&state.engine.state_snapshot()),
            devices: state.engine.devices(),
            services,
        }),
    )
}

/// Handler for POST /v1/services/:domain/:service
#[tracing::instrument(skip(state))]
async fn call_service(
    State(state): State<Arc<AppState>>,
    Path((domain, service)): Path<(String, String)>,
) -> Response {
    match state.engine.call_service(&domain, &service).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            let status = match e {
                ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
                ServiceError::CallFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::warn!("Service call failed: {}", e);
            (
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Handler for POST /v1/entries/:domain/:entry_id/unload
///
/// The unload runs in the integration's task; the entry's new state shows up in /v1/state.
#[tracing::instrument(skip(state))]
async fn unload_entry(
    State(state): State<Arc<AppState>>,
    Path((domain, entry_id)): Path<(String, String)>,
) -> Response {
    match state.engine.unload_entry(&domain, &entry_id) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            let status = match e.downcast_ref::<std::io::Error>() {
                Some(io) if io.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
                _ => StatusCode::SERVICE_UNAVAILABLE,
            };
            tracing::warn!("Failed to unload {} entry {}: {}", domain, entry_id, e);
            (
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/state", get(engine_state))
        .route("/v1/services/:domain/:service", post(call_service))
        .route("/v1/entries/:domain/:entry_id/unload", post(unload_entry))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// This function will bind to the specified address and serve the API endpoints.
/// It will run until the provided shutdown signal is triggered.
///
/// # Arguments
/// * `listen` - The IP address to listen on (e.g., "127.0.0.1")
/// * `port` - The port to listen on (e.g., 8565)
/// * `engine` - The engine whose state and services are exposed
/// * `shutdown_rx` - A oneshot receiver that will trigger graceful shutdown
pub async fn serve(
    listen: String,
    port: u16,
    engine: Arc<Engine>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState { version, engine });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::error::Error;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Method;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::engine::Host;
    use crate::engine::Integration;
    use crate::engine::ToIntegrationMessage;

    fn router() -> (Router, Arc<Engine>) {
        let engine = Arc::new(Engine::new());
        let state = Arc::new(AppState {
            version: "test",
            engine: engine.clone(),
        });
        (create_router(state), engine)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let (app, _engine) = router();
        let response = app
            .oneshot(Request::builder().uri("/v1/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_state_lists_services() {
        let (app, engine) = router();
        engine
            .host()
            .services
            .register("plugwise", "update", || async { Ok(()) });

        let response = app
            .oneshot(Request::builder().uri("/v1/state").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["services"], serde_json::json!(["plugwise.update"]));
        assert_eq!(json["devices"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_call_service() {
        let (app, engine) = router();
        engine
            .host()
            .services
            .register("plugwise", "update", || async { Ok(()) });

        let response = app
            .oneshot(post_request("/v1/services/plugwise/update"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_call_unknown_service() {
        let (app, _engine) = router();

        let response = app
            .oneshot(post_request("/v1/services/plugwise/update"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await["error"],
            "service not found: plugwise.update"
        );
    }

    #[tokio::test]
    async fn test_call_failing_service() {
        let (app, engine) = router();
        engine
            .host()
            .services
            .register("plugwise", "update", || async {
                anyhow::bail!("gateway unreachable")
            });

        let response = app
            .oneshot(post_request("/v1/services/plugwise/update"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["error"],
            "service plugwise.update failed: gateway unreachable"
        );
    }

    /// Records the entries it is asked to unload
    struct RecordingIntegration {
        unloaded: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Integration for RecordingIntegration {
        fn name(&self) -> &str {
            "plugwise"
        }

        async fn setup(&mut self, _host: Host) -> Result<(), Box<dyn Error + Send>> {
            Ok(())
        }

        async fn handle_message(
            &mut self,
            msg: ToIntegrationMessage,
        ) -> Result<(), Box<dyn Error + Send>> {
            let ToIntegrationMessage::UnloadEntry { entry_id } = msg;
            self.unloaded.lock().unwrap().push(entry_id);
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unload_entry() {
        let unloaded = Arc::new(Mutex::new(Vec::new()));
        let mut engine = Engine::new();
        engine.register_integration(
            "plugwise".to_string(),
            Box::new(RecordingIntegration {
                unloaded: unloaded.clone(),
            }),
        );
        let engine = Arc::new(engine);
        let app = create_router(Arc::new(AppState {
            version: "test",
            engine: engine.clone(),
        }));

        let response = app
            .oneshot(post_request("/v1/entries/plugwise/anna/unload"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        engine.shutdown().await;
        assert_eq!(*unloaded.lock().unwrap(), vec!["anna".to_string()]);
    }

    #[tokio::test]
    async fn test_unload_entry_unknown_integration() {
        let (app, _engine) = router();

        let response = app
            .oneshot(post_request("/v1/entries/plugwise/anna/unload"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await["error"],
            "Integration channel not found: plugwise"
        );
    }
}
