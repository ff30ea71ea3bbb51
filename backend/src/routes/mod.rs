use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::warn;

use crate::state::AppState;

pub mod applications;
pub mod documents;
pub mod extract;
pub mod health;
pub mod payments;
pub mod quotes;
pub mod submissions;
pub mod uploads;

fn cors_layer(allowed: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|value| {
                    let trimmed = value.trim();
                    if trimmed.is_empty() {
                        return None;
                    }
                    match trimmed.parse::<HeaderValue>() {
                        Ok(header) => Some(header),
                        Err(_) => {
                            warn!(origin = trimmed, "ignoring invalid CORS allowed origin");
                            None
                        }
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref());
    let uploads_dir = state.config.uploads_dir.clone();
    let generated_dir = state.config.generated_dir.clone();
    let body_limit = state.config.max_body_bytes;

    let quotes_routes = Router::new()
        .route("/", get(quotes::list_quotes).post(quotes::create_quote))
        .route("/:id/reply", post(quotes::reply_to_quote))
        .route("/:id/replies", get(quotes::list_quote_replies));

    let applications_routes = Router::new().route(
        "/",
        get(applications::list_applications).post(applications::create_application),
    );

    let uploads_routes = Router::new()
        .route("/", post(uploads::upload))
        .route("/list", get(uploads::list_uploads));

    let payments_routes = Router::new()
        .route("/", post(payments::start_payment))
        .route(
            "/:id",
            get(payments::get_payment).patch(payments::update_payment),
        )
        .route("/:id/confirm", post(payments::confirm_payment));

    Router::new()
        .route("/api/health", get(health::health_check))
        .nest("/api/quotes", quotes_routes)
        .nest("/api/applications", applications_routes)
        .nest("/api/uploads", uploads_routes)
        .route("/api/documents/generate", post(documents::generate_document))
        .nest("/api/payments", payments_routes)
        .with_state(state)
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        .nest_service("/generated", ServeDir::new(generated_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
