// src/handlers.rs

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{config::AppState, docs::ApiDoc};

pub mod promo;

pub fn router(app_state: AppState) -> Router {
    let promo_routes = Router::new()
        .route(
            "/",
            post(promo::create_promo).get(promo::list_promos),
        )
        .route(
            "/{id}",
            get(promo::get_promo)
                .patch(promo::update_promo)
                .delete(promo::delete_promo),
        )
        .route("/{id}/activate", post(promo::activate_promo));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/promos", promo_routes)
        .with_state(app_state)
}
