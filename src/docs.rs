// src/docs.rs

use utoipa::OpenApi;

use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Promo Engine",
        description = "Criação, consulta e resgate de promoções com códigos de desconto"
    ),
    paths(
        // --- Promos ---
        handlers::promo::create_promo,
        handlers::promo::list_promos,
        handlers::promo::get_promo,
        handlers::promo::update_promo,
        handlers::promo::delete_promo,

        // --- Resgate ---
        handlers::promo::activate_promo,
    ),
    components(
        schemas(
            models::promo::PromoMode,
            models::promo::Target,
            models::promo::CodeSummary,
            models::promo::PromoDetail,
            models::promo::CreatedPromo,
            models::promo::ActivationReason,
            models::promo::ActivationResponse,

            // --- Payloads ---
            models::promo_payload::CreatePromoPayload,
            models::promo_payload::UpdatePromoPayload,
        )
    ),
    tags(
        (name = "Promos", description = "Gestão e resgate de promoções")
    )
)]
pub struct ApiDoc;
