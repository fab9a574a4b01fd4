// src/models/promo.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::common::error::ValidationError;

// --- 1. Modo da promoção ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "promo_mode", rename_all = "SCREAMING_SNAKE_CASE")] // Banco
#[serde(rename_all = "SCREAMING_SNAKE_CASE")] // JSON
pub enum PromoMode {
    Common, // Um código compartilhado com limite de ativações
    Unique, // Uma lista de códigos de uso único
}

impl PromoMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "COMMON" => Some(PromoMode::Common),
            "UNIQUE" => Some(PromoMode::Unique),
            _ => None,
        }
    }
}

// --- 2. Público-alvo ---
// Campos ausentes significam "sem restrição" (ex: sem país = válido em todo lugar).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    #[validate(range(min = 0, max = 100, message = "deve estar entre 0 e 100"))]
    pub age_from: Option<i32>,
    #[validate(range(min = 0, max = 100, message = "deve estar entre 0 e 100"))]
    pub age_until: Option<i32>,
    #[schema(example = "RU")]
    pub country: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

// --- 3. Resumo de um código (agregado na leitura) ---
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CodeSummary {
    pub code: String,
    pub activations: i64,
    pub max_count: i64,
}

// --- 4. Promoção persistida com os seus códigos ---
// É isto que vai para o cache (sem o nome da empresa, que é resolvido a cada leitura).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoRecord {
    pub id: Uuid,
    pub company_id: Uuid,
    pub mode: PromoMode,
    pub description: String,
    pub image_url: Option<String>,
    pub target: Target,
    pub active_from: Option<DateTime<Utc>>,
    pub active_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub codes: Vec<CodeSummary>,
}

// --- 5. Resposta da API ---
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromoDetail {
    pub id: Uuid,
    pub company_id: Uuid,
    pub company_name: String,
    pub mode: PromoMode,
    pub description: String,
    pub image_url: Option<String>,
    pub target: Target,
    pub active_from: Option<DateTime<Utc>>,
    pub active_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub codes: Vec<CodeSummary>,
    pub activations_count: i64,
}

impl PromoDetail {
    pub fn from_record(record: PromoRecord, company_name: String) -> Self {
        let activations_count = record.codes.iter().map(|c| c.activations).sum();

        Self {
            id: record.id,
            company_id: record.company_id,
            company_name,
            mode: record.mode,
            description: record.description,
            image_url: record.image_url,
            target: record.target,
            active_from: record.active_from,
            active_until: record.active_until,
            created_at: record.created_at,
            codes: record.codes,
            activations_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CreatedPromo {
    pub id: Uuid,
}

// ---
// Agregado validado (saída do validador, entrada do repositório)
// ---

/// Orçamento de resgate: decide quantas linhas de código a promoção terá.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeBudget {
    Common { code: String, max_count: i64 },
    Unique { codes: Vec<String> },
}

impl CodeBudget {
    pub fn mode(&self) -> PromoMode {
        match self {
            CodeBudget::Common { .. } => PromoMode::Common,
            CodeBudget::Unique { .. } => PromoMode::Unique,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPromo {
    pub company_id: Uuid,
    pub description: String,
    pub image_url: Option<String>,
    pub target: Target,
    pub active_from: Option<DateTime<Utc>>,
    pub active_until: Option<DateTime<Utc>>,
    pub budget: CodeBudget,
}

/// Campos que um Update pode alterar. O conjunto de códigos nunca muda.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoChanges {
    pub description: String,
    pub image_url: Option<String>,
    pub target: Target,
    pub active_from: Option<DateTime<Utc>>,
    pub active_until: Option<DateTime<Utc>>,
}

// ---
// Listagem
// ---

/// Chave de ordenação. Sempre decrescente; o padrão é `CreatedAt`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    CreatedAt,
    ActiveFrom,
    ActiveUntil,
}

impl SortBy {
    /// Valores desconhecidos caem no padrão em vez de gerar erro.
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("active_from") | Some("activefrom") => SortBy::ActiveFrom,
            Some("active_until") | Some("activeuntil") => SortBy::ActiveUntil,
            _ => SortBy::CreatedAt,
        }
    }

    /// Valor fixo passado como parâmetro para o `ORDER BY CASE` do repositório.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::CreatedAt => "created_at",
            SortBy::ActiveFrom => "active_from",
            SortBy::ActiveUntil => "active_until",
        }
    }
}

/// Predicado comum de `List` e `Count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoFilter {
    pub company_id: Uuid,
    // Já normalizados em minúsculas
    pub countries: Vec<String>,
}

impl PromoFilter {
    pub fn new(company_id: Uuid, countries: &[String]) -> Self {
        let countries = countries
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();

        Self { company_id, countries }
    }

    pub fn matches(&self, record: &PromoRecord) -> bool {
        if record.company_id != self.company_id {
            return false;
        }
        if self.countries.is_empty() {
            return true;
        }
        match &record.target.country {
            None => true,
            Some(country) => self.countries.contains(&country.to_lowercase()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 10;
    pub const MAX_LIMIT: i64 = 100;

    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Result<Self, ValidationError> {
        let limit = limit.unwrap_or(Self::DEFAULT_LIMIT);
        let offset = offset.unwrap_or(0);

        if !(1..=Self::MAX_LIMIT).contains(&limit) {
            return Err(ValidationError::new(
                "limit",
                format!("deve estar entre 1 e {}", Self::MAX_LIMIT),
            ));
        }
        if offset < 0 {
            return Err(ValidationError::new("offset", "não pode ser negativo"));
        }

        Ok(Self { limit, offset })
    }
}

// ---
// Resgate
// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivationReason {
    Ok,
    NoActivationsLeft,
    Antifraud,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub reason: ActivationReason,
}

impl ActivationResponse {
    pub fn granted(code: String) -> Self {
        Self {
            success: true,
            code: Some(code),
            reason: ActivationReason::Ok,
        }
    }

    pub fn refused(reason: ActivationReason) -> Self {
        Self {
            success: false,
            code: None,
            reason,
        }
    }
}
