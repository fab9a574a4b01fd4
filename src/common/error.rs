// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Um único campo inválido. A validação para na primeira falha, então
/// sempre existe no máximo um par (campo, mensagem).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação: {0}")]
    Validation(#[from] ValidationError),

    #[error("Promoção não encontrada")]
    PromoNotFound,

    #[error("Empresa não encontrada")]
    CompanyNotFound,

    #[error("Permissão negada")]
    PermissionDenied,

    #[error("Cabeçalho x-company-id ausente ou inválido")]
    InvalidCompanyContext,

    // Resultados de negócio do resgate: esperados, não são falhas do sistema.
    #[error("Nenhuma ativação restante")]
    NoActivationsLeft,

    #[error("Ativação recusada pelo antifraude")]
    FraudRejected,

    // Falha do banco, sempre com o nome da operação para diagnóstico.
    #[error("{op}: {source}")]
    Storage {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("Erro de cache: {0}")]
    Cache(String),

    #[error("Erro no serviço de contas: {0}")]
    Directory(String),

    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    /// Adaptador para `map_err`: `.map_err(AppError::storage("promo_repo.create"))`.
    pub fn storage(op: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
        move |source| AppError::Storage { op, source }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PromoNotFound | AppError::CompanyNotFound => StatusCode::NOT_FOUND,
            AppError::PermissionDenied | AppError::FraudRejected => StatusCode::FORBIDDEN,
            AppError::InvalidCompanyContext => StatusCode::UNAUTHORIZED,
            AppError::NoActivationsLeft => StatusCode::CONFLICT,
            AppError::Storage { .. }
            | AppError::Cache(_)
            | AppError::Directory(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            AppError::Validation(err) => json!({
                "error": err.message,
                "field": err.field,
            }),
            // Detalhes internos só vão para o log, nunca para o cliente.
            e if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                json!({ "error": "Ocorreu um erro inesperado." })
            }
            e => json!({ "error": e.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
