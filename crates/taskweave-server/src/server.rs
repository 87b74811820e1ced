use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use taskweave_core::collaborators::{CalendarSink, PreferenceStore};
use taskweave_engine::{Coordinator, EventChannel, PlannerService};
use taskweave_settings::ServerSettings;

use crate::client::{self, ClientRegistry};
use crate::handlers;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_send_queue: usize,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_send_queue: settings.max_send_queue,
            allowed_origins: settings.allowed_origins.clone(),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub planner: Arc<PlannerService>,
    pub prefs: Arc<dyn PreferenceStore>,
    pub calendar: Arc<dyn CalendarSink>,
    pub events: Arc<EventChannel>,
    pub clients: Arc<ClientRegistry>,
}

impl AppState {
    pub fn new(
        coordinator: Arc<Coordinator>,
        planner: Arc<PlannerService>,
        prefs: Arc<dyn PreferenceStore>,
        calendar: Arc<dyn CalendarSink>,
        max_send_queue: usize,
    ) -> Self {
        let events = Arc::clone(coordinator.events());
        let clients = Arc::new(ClientRegistry::new(Arc::clone(&events), max_send_queue));
        Self {
            coordinator,
            planner,
            prefs,
            calendar,
            events,
            clients,
        }
    }
}

/// CORS for the configured origins; `*` or an empty list allows any origin.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/api/plan", post(handlers::plan))
        .route("/api/agents/spawn", post(handlers::spawn_agents))
        .route("/api/agents/run", post(handlers::run_agents))
        .route("/api/memory", get(handlers::get_memory))
        .route("/api/memory/upsert", post(handlers::upsert_memory))
        .route("/api/tools/calendar/apply", post(handlers::apply_calendar))
        .route("/ws/events", get(ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins))
}

/// Bind and serve. Returns a handle to shut it down.
pub async fn start(config: ServerConfig, state: AppState) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(state, &config.allowed_origins);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "TaskWeave server started");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(signal.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "server stopped with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        shutdown,
        server,
    })
}

/// Handle returned by `start()`; keeps the server task alive.
pub struct ServerHandle {
    pub port: u16,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.server.await;
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, rx) = state.clients.register();
    tracing::info!(client_id = %client_id, clients = state.clients.count(), "WebSocket client connected");
    client::handle_ws_connection(socket, client_id, rx, state.clients).await;
}
