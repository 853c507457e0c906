pub mod auth;
pub mod booking;
pub mod error;
pub mod handlers;
pub mod models;
pub mod openapi;
pub mod payment;
pub mod scheduling;
pub mod settings;
pub mod store;
pub mod validation;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use handlers::{
    cancel_booking, check_availability, check_instructor_conflicts, create_booking,
    create_recurring_sessions, create_session, delete_session, duplicate_session, get_booking,
    get_session, get_user_bookings, healthz_live, healthz_ready, list_sessions, root,
    update_booking_status, update_session,
};
use tower_http::LatencyUnit;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::booking::ArbitrationService;
use crate::openapi::ApiDoc;
use crate::payment::{HttpPaymentGateway, PaymentGateway};
use crate::scheduling::SchedulingService;
use crate::settings::Settings;
use crate::store::MemoryStore;

#[derive(Clone)]
pub struct AppState {
    pub(crate) settings: Settings,
    pub(crate) scheduling: SchedulingService,
    pub(crate) arbitration: ArbitrationService,
}

impl AppState {
    /// Wires explicit service instances over one shared store; no global
    /// registry, everything reaches its dependencies through this state.
    pub fn new(settings: Settings) -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_store(settings, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(
        settings: Settings,
        store: Arc<MemoryStore>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let hours = settings.business_hours()?;
        let payments: Option<Arc<dyn PaymentGateway>> = settings
            .payment_url
            .clone()
            .map(|url| Arc::new(HttpPaymentGateway::new(url)) as Arc<dyn PaymentGateway>);

        let scheduling = SchedulingService::new(store.clone(), store.clone(), hours);
        let arbitration = ArbitrationService::new(
            store.clone(),
            store,
            payments,
            settings.waitlist_enabled,
            settings.max_active_bookings,
            settings.class_price_cents,
        );
        Ok(Self {
            settings,
            scheduling,
            arbitration,
        })
    }
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;

    let env_filter = if settings.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .without_time()
        .init();

    let state = AppState::new(settings)?;

    let app = build_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], state.settings.port));
    info!("Starting Studio Booking API on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );

    let mut router = Router::new()
        .route("/", get(root))
        .route("/healthz/live", get(healthz_live))
        .route("/healthz/ready", get(healthz_ready))
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/recurring", post(create_recurring_sessions))
        .route(
            "/sessions/{id}",
            get(get_session)
                .patch(update_session)
                .delete(delete_session),
        )
        .route("/sessions/{id}/duplicate", post(duplicate_session))
        .route("/sessions/{id}/availability", get(check_availability))
        .route(
            "/instructors/{id}/conflicts",
            get(check_instructor_conflicts),
        )
        .route("/bookings", post(create_booking).get(get_user_bookings))
        .route(
            "/bookings/{id}",
            get(get_booking)
                .patch(update_booking_status)
                .delete(cancel_booking),
        )
        .with_state(state.clone());

    if state.settings.enable_swagger {
        let openapi = ApiDoc::openapi();
        let swagger = SwaggerUi::new("/docs").url("/openapi.json", openapi);
        router = router.merge(swagger);
    }

    router.layer(trace_layer)
}
