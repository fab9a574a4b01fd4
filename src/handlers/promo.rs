// src/handlers/promo.rs

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::company::CompanyContext,
    models::{
        promo::{ActivationReason, ActivationResponse, CreatedPromo, Page, PromoDetail, SortBy},
        promo_payload::{CreatePromoPayload, UpdatePromoPayload},
    },
};

pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Países separados por vírgula (ex: `ru,us`). Vazio = todos.
    pub countries: Option<String>,
    /// Padrão 10, máximo 100.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// `createdAt` (padrão), `activeFrom` ou `activeUntil`; sempre decrescente.
    pub sort_by: Option<String>,
}

impl ListQuery {
    fn countries(&self) -> Vec<String> {
        self.countries
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }
}

// POST /api/promos
#[utoipa::path(
    post,
    path = "/api/promos",
    tag = "Promos",
    request_body = CreatePromoPayload,
    responses(
        (status = 201, description = "Promoção criada", body = CreatedPromo),
        (status = 400, description = "Erro de validação")
    ),
    params(
        ("x-company-id" = Uuid, Header, description = "ID da empresa dona")
    )
)]
pub async fn create_promo(
    State(app_state): State<AppState>,
    CompanyContext(company_id): CompanyContext,
    Json(payload): Json<CreatePromoPayload>,
) -> Result<impl IntoResponse, AppError> {
    let promo_id = app_state.promo_service.create(company_id, payload).await?;

    Ok((StatusCode::CREATED, Json(CreatedPromo { id: promo_id })))
}

// GET /api/promos
#[utoipa::path(
    get,
    path = "/api/promos",
    tag = "Promos",
    params(
        ListQuery,
        ("x-company-id" = Uuid, Header, description = "ID da empresa dona")
    ),
    responses(
        (status = 200, description = "Página de promoções (total no cabeçalho X-Total-Count)", body = Vec<PromoDetail>)
    )
)]
pub async fn list_promos(
    State(app_state): State<AppState>,
    CompanyContext(company_id): CompanyContext,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = Page::new(query.limit, query.offset)?;
    let sort_by = SortBy::from_param(query.sort_by.as_deref());
    let countries = query.countries();

    let service = &app_state.promo_service;
    let promos = service.list(company_id, &countries, page, sort_by).await?;
    let total = service.count(company_id, &countries).await?;

    let mut headers = HeaderMap::new();
    headers.insert(TOTAL_COUNT_HEADER, HeaderValue::from(total));

    Ok((headers, Json(promos)))
}

// GET /api/promos/{id}
#[utoipa::path(
    get,
    path = "/api/promos/{id}",
    tag = "Promos",
    params(
        ("id" = Uuid, Path, description = "ID da promoção"),
        ("x-company-id" = Uuid, Header, description = "ID da empresa dona")
    ),
    responses(
        (status = 200, description = "Detalhe da promoção", body = PromoDetail),
        (status = 403, description = "Promoção de outra empresa"),
        (status = 404, description = "Promoção não encontrada")
    )
)]
pub async fn get_promo(
    State(app_state): State<AppState>,
    CompanyContext(company_id): CompanyContext,
    Path(promo_id): Path<Uuid>,
) -> Result<Json<PromoDetail>, AppError> {
    let detail = app_state.promo_service.get_by_id(promo_id, company_id).await?;
    Ok(Json(detail))
}

// PATCH /api/promos/{id}
#[utoipa::path(
    patch,
    path = "/api/promos/{id}",
    tag = "Promos",
    request_body = UpdatePromoPayload,
    params(
        ("id" = Uuid, Path, description = "ID da promoção"),
        ("x-company-id" = Uuid, Header, description = "ID da empresa dona")
    ),
    responses(
        (status = 204, description = "Promoção atualizada"),
        (status = 400, description = "Erro de validação"),
        (status = 403, description = "Promoção de outra empresa"),
        (status = 404, description = "Promoção não encontrada")
    )
)]
pub async fn update_promo(
    State(app_state): State<AppState>,
    CompanyContext(company_id): CompanyContext,
    Path(promo_id): Path<Uuid>,
    Json(payload): Json<UpdatePromoPayload>,
) -> Result<StatusCode, AppError> {
    app_state
        .promo_service
        .update(promo_id, company_id, payload)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

// DELETE /api/promos/{id}
#[utoipa::path(
    delete,
    path = "/api/promos/{id}",
    tag = "Promos",
    params(
        ("id" = Uuid, Path, description = "ID da promoção"),
        ("x-company-id" = Uuid, Header, description = "ID da empresa dona")
    ),
    responses(
        (status = 204, description = "Promoção removida"),
        (status = 403, description = "Promoção de outra empresa"),
        (status = 404, description = "Promoção não encontrada")
    )
)]
pub async fn delete_promo(
    State(app_state): State<AppState>,
    CompanyContext(company_id): CompanyContext,
    Path(promo_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    app_state.promo_service.delete(promo_id, company_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// POST /api/promos/{id}/activate
// Esgotamento e antifraude são resultados de negócio: 200 com success=false.
#[utoipa::path(
    post,
    path = "/api/promos/{id}/activate",
    tag = "Promos",
    params(
        ("id" = Uuid, Path, description = "ID da promoção")
    ),
    responses(
        (status = 200, description = "Resultado da ativação", body = ActivationResponse),
        (status = 404, description = "Promoção não encontrada")
    )
)]
pub async fn activate_promo(
    State(app_state): State<AppState>,
    Path(promo_id): Path<Uuid>,
) -> Result<Json<ActivationResponse>, AppError> {
    let response = match app_state.promo_service.activate(promo_id).await {
        Ok(code) => ActivationResponse::granted(code),
        Err(AppError::NoActivationsLeft) => {
            ActivationResponse::refused(ActivationReason::NoActivationsLeft)
        }
        Err(AppError::FraudRejected) => ActivationResponse::refused(ActivationReason::Antifraud),
        Err(e) => return Err(e),
    };

    Ok(Json(response))
}
