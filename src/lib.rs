pub mod adapter;
pub mod audit;
pub mod auth;
pub mod compiler;
pub mod config;
pub mod error;
pub mod gemini;
pub mod guard;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod sanitizer;
pub mod selection;
pub mod services;
pub mod store;
pub mod style;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use routes::{
    generate_carousel, get_carousel, list_carousels, list_compositions, list_economic_events, select_composition,
    AppState,
};

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/carousel/generate", post(generate_carousel))
        .route("/api/carousel/compositions", get(list_compositions))
        .route("/api/carousel/compositions/select", post(select_composition))
        .route("/api/carousels", get(list_carousels))
        .route("/api/carousels/:id", get(get_carousel))
        .route("/api/admin/economic-events", get(list_economic_events))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
