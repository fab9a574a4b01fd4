// src/middleware/company.rs

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::common::error::AppError;

// Cabeçalho preenchido pelo gateway depois de verificar a credencial
pub const COMPANY_ID_HEADER: &str = "x-company-id";

/// Empresa do chamador, lida uma única vez na borda HTTP e depois passada
/// explicitamente para o serviço.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompanyContext(pub Uuid);

impl<S> FromRequestParts<S> for CompanyContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let company_id = parts
            .headers
            .get(COMPANY_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .filter(|id| !id.is_nil())
            .ok_or(AppError::InvalidCompanyContext)?;

        Ok(CompanyContext(company_id))
    }
}
