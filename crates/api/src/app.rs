use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use persistence::{RealtimeStore, StateSyncClient};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{containers, device, health, legacy, logs, schedules};
use crate::services::CommandDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub sync: StateSyncClient,
    pub dispatcher: Arc<CommandDispatcher>,
    pub config: Arc<Config>,
    /// Cancelled when the server starts shutting down; ends open event
    /// streams so connections can drain.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RealtimeStore>) -> Self {
        let dispatcher = CommandDispatcher::new(
            Arc::clone(&store),
            Duration::from_millis(config.dispatcher.clear_delay_ms),
        );
        Self {
            sync: StateSyncClient::new(store),
            dispatcher: Arc::new(dispatcher),
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    /// Ends event streams and cancels pending command watchdogs.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.dispatcher.shutdown();
    }

    /// Device to address when a request does not name one.
    pub fn device_or_default(&self, device_id: Option<String>) -> String {
        device_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.config.devices.default_device_id.clone())
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    // Build CORS layer based on configuration
    let cors = if config.security.cors_origins.is_empty() {
        // Default: allow any origin (for development)
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Unversioned handlers kept for existing dashboard builds
    let legacy_routes = Router::new()
        .route("/api/dispense", post(legacy::dispense))
        .route(
            "/api/dispenser",
            get(legacy::get_dispenser).post(legacy::upsert_dispenser),
        );

    let v1_routes = Router::new()
        // Containers
        .route(
            "/api/v1/users/:user_id/containers",
            get(containers::list_containers),
        )
        .route(
            "/api/v1/users/:user_id/containers/events",
            get(containers::container_events),
        )
        .route(
            "/api/v1/users/:user_id/containers/:container_id/dispense",
            post(containers::dispense_container),
        )
        // Device status and commands
        .route(
            "/api/v1/users/:user_id/device",
            get(device::get_device_status).put(device::update_device_status),
        )
        .route(
            "/api/v1/users/:user_id/device/events",
            get(device::device_status_events),
        )
        .route(
            "/api/v1/devices/:device_id/status",
            get(device::get_device_overview),
        )
        .route(
            "/api/v1/devices/:device_id/events",
            get(device::device_overview_events),
        )
        .route(
            "/api/v1/devices/:device_id/commands",
            post(device::dispatch_command),
        )
        // Schedules
        .route(
            "/api/v1/users/:user_id/schedules",
            get(schedules::list_schedules).post(schedules::create_schedule),
        )
        .route(
            "/api/v1/users/:user_id/schedules/:schedule_id",
            put(schedules::update_schedule).delete(schedules::delete_schedule),
        )
        .route(
            "/api/v1/users/:user_id/schedules/:schedule_id/days/:day",
            post(schedules::toggle_schedule_day),
        )
        // Activity
        .route("/api/v1/logs", get(logs::list_activity))
        .route("/api/v1/logs/export", get(logs::export_logs));

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    // Merge all routes
    Router::new()
        .merge(public_routes)
        .merge(legacy_routes)
        .merge(v1_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
