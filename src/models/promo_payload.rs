// src/models/promo_payload.rs

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    common::error::ValidationError,
    models::promo::{CodeBudget, NewPromo, PromoChanges, PromoMode, Target},
};

// ISO 3166-1 alfa-2, em ordem alfabética
const COUNTRY_CODES: [&str; 249] = [
    "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AO", "AQ", "AR", "AS", "AT", "AU", "AW",
    "AX", "AZ", "BA", "BB", "BD", "BE", "BF", "BG", "BH", "BI", "BJ", "BL", "BM", "BN",
    "BO", "BQ", "BR", "BS", "BT", "BV", "BW", "BY", "BZ", "CA", "CC", "CD", "CF", "CG",
    "CH", "CI", "CK", "CL", "CM", "CN", "CO", "CR", "CU", "CV", "CW", "CX", "CY", "CZ",
    "DE", "DJ", "DK", "DM", "DO", "DZ", "EC", "EE", "EG", "EH", "ER", "ES", "ET", "FI",
    "FJ", "FK", "FM", "FO", "FR", "GA", "GB", "GD", "GE", "GF", "GG", "GH", "GI", "GL",
    "GM", "GN", "GP", "GQ", "GR", "GS", "GT", "GU", "GW", "GY", "HK", "HM", "HN", "HR",
    "HT", "HU", "ID", "IE", "IL", "IM", "IN", "IO", "IQ", "IR", "IS", "IT", "JE", "JM",
    "JO", "JP", "KE", "KG", "KH", "KI", "KM", "KN", "KP", "KR", "KW", "KY", "KZ", "LA",
    "LB", "LC", "LI", "LK", "LR", "LS", "LT", "LU", "LV", "LY", "MA", "MC", "MD", "ME",
    "MF", "MG", "MH", "MK", "ML", "MM", "MN", "MO", "MP", "MQ", "MR", "MS", "MT", "MU",
    "MV", "MW", "MX", "MY", "MZ", "NA", "NC", "NE", "NF", "NG", "NI", "NL", "NO", "NP",
    "NR", "NU", "NZ", "OM", "PA", "PE", "PF", "PG", "PH", "PK", "PL", "PM", "PN", "PR",
    "PS", "PT", "PW", "PY", "QA", "RE", "RO", "RS", "RU", "RW", "SA", "SB", "SC", "SD",
    "SE", "SG", "SH", "SI", "SJ", "SK", "SL", "SM", "SN", "SO", "SR", "SS", "ST", "SV",
    "SX", "SY", "SZ", "TC", "TD", "TF", "TG", "TH", "TJ", "TK", "TL", "TM", "TN", "TO",
    "TR", "TT", "TV", "TW", "TZ", "UA", "UG", "UM", "US", "UY", "UZ", "VA", "VC", "VE",
    "VG", "VI", "VN", "VU", "WF", "WS", "YE", "YT", "ZA", "ZM", "ZW",
];

// ---
// Payload: CreatePromo
// ---
// Tudo que pode faltar vem com `default`, assim a ausência vira um erro de
// validação com nome de campo, e não uma rejeição genérica do JSON.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePromoPayload {
    #[serde(default)]
    #[schema(example = "COMMON")]
    pub mode: String,

    #[schema(example = "SUMMER25")]
    pub promo_common: Option<String>,

    pub promo_unique: Option<Vec<String>>,

    #[schema(example = 100)]
    pub max_count: Option<i64>,

    #[serde(default)]
    #[validate(length(min = 10, max = 300, message = "deve ter entre 10 e 300 caracteres"))]
    pub description: String,

    #[validate(
        url(message = "deve ser uma URL válida"),
        length(max = 350, message = "deve ter no máximo 350 caracteres")
    )]
    pub image_url: Option<String>,

    #[serde(default)]
    pub target: Target,

    pub active_from: Option<DateTime<Utc>>,
    pub active_until: Option<DateTime<Utc>>,
}

// ---
// Payload: UpdatePromo
// ---
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePromoPayload {
    #[serde(default)]
    #[validate(length(min = 10, max = 300, message = "deve ter entre 10 e 300 caracteres"))]
    pub description: String,

    #[validate(
        url(message = "deve ser uma URL válida"),
        length(max = 350, message = "deve ter no máximo 350 caracteres")
    )]
    pub image_url: Option<String>,

    #[serde(default)]
    pub target: Target,

    pub active_from: Option<DateTime<Utc>>,
    pub active_until: Option<DateTime<Utc>>,

    // Campos imutáveis: só existem aqui para serem recusados explicitamente.
    #[schema(value_type = Object)]
    pub mode: Option<serde_json::Value>,
    #[schema(value_type = Object)]
    pub max_count: Option<serde_json::Value>,
    #[schema(value_type = Object)]
    pub promo_common: Option<serde_json::Value>,
    #[schema(value_type = Object)]
    pub promo_unique: Option<serde_json::Value>,
}

// Ordem em que os campos estruturais são avaliados: (nome Rust, nome na API)
const PROMO_FIELDS: &[(&str, &str)] = &[("description", "description"), ("image_url", "imageUrl")];
const TARGET_FIELDS: &[(&str, &str)] = &[
    ("age_from", "target.ageFrom"),
    ("age_until", "target.ageUntil"),
];

const MAX_CATEGORY_LEN: usize = 20;

impl CreatePromoPayload {
    /// Valida na ordem: estrutura, consistência do modo, datas.
    /// A primeira falha vence; nada é aplicado parcialmente.
    pub fn into_new_promo(mut self, company_id: Uuid) -> Result<NewPromo, ValidationError> {
        // 1. Estrutura
        if company_id.is_nil() {
            return Err(ValidationError::new("companyId", "deve ser um UUID válido"));
        }

        let mode = PromoMode::parse(self.mode.trim())
            .ok_or_else(|| ValidationError::new("mode", "deve ser COMMON ou UNIQUE"))?;

        self.image_url = blank_to_none(self.image_url.take());
        check_fields(self.validate(), PROMO_FIELDS)?;

        let target = normalize_target(std::mem::take(&mut self.target))?;

        // 2. Consistência do modo
        let budget = match mode {
            PromoMode::Common => common_budget(self.promo_common.take(), self.max_count)?,
            PromoMode::Unique => unique_budget(self.promo_unique.take())?,
        };

        // 3. Datas
        check_dates(self.active_from, self.active_until)?;

        Ok(NewPromo {
            company_id,
            description: self.description,
            image_url: self.image_url,
            target,
            active_from: self.active_from,
            active_until: self.active_until,
            budget,
        })
    }
}

impl UpdatePromoPayload {
    pub fn into_changes(mut self) -> Result<PromoChanges, ValidationError> {
        self.image_url = blank_to_none(self.image_url.take());
        check_fields(self.validate(), PROMO_FIELDS)?;

        let target = normalize_target(std::mem::take(&mut self.target))?;

        check_dates(self.active_from, self.active_until)?;

        // 4. O conjunto de códigos não muda depois da criação
        let immutable = [
            ("mode", self.mode.is_some()),
            ("maxCount", self.max_count.is_some()),
            ("promoCommon", self.promo_common.is_some()),
            ("promoUnique", self.promo_unique.is_some()),
        ];
        if let Some((field, _)) = immutable.iter().find(|(_, present)| *present) {
            return Err(ValidationError::new(*field, "não pode ser alterado depois da criação"));
        }

        Ok(PromoChanges {
            description: self.description,
            image_url: self.image_url,
            target,
            active_from: self.active_from,
            active_until: self.active_until,
        })
    }
}

/// Converte o resultado do `validator` no primeiro erro, seguindo a ordem dada.
fn check_fields(
    result: Result<(), ValidationErrors>,
    order: &[(&str, &str)],
) -> Result<(), ValidationError> {
    let Err(errors) = result else {
        return Ok(());
    };

    let by_field = errors.field_errors();
    for (name, external) in order {
        if let Some(first) = by_field.get(*name).and_then(|list| list.first()) {
            let message = first
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| first.code.to_string());
            return Err(ValidationError::new(*external, message));
        }
    }

    Err(ValidationError::new("", "dados inválidos"))
}

fn normalize_target(mut target: Target) -> Result<Target, ValidationError> {
    check_fields(target.validate(), TARGET_FIELDS)?;

    if let (Some(from), Some(until)) = (target.age_from, target.age_until) {
        if until < from {
            return Err(ValidationError::new(
                "target.ageUntil",
                "deve ser maior ou igual a ageFrom",
            ));
        }
    }

    target.country = match blank_to_none(target.country.take()) {
        None => None,
        Some(country) => {
            let country = country.trim().to_ascii_uppercase();
            if COUNTRY_CODES.binary_search(&country.as_str()).is_err() {
                return Err(ValidationError::new(
                    "target.country",
                    "deve ser um código de país ISO 3166-1 alfa-2",
                ));
            }
            Some(country)
        }
    };

    if let Some(category) = target
        .categories
        .iter()
        .find(|c| c.chars().count() > MAX_CATEGORY_LEN)
    {
        return Err(ValidationError::new(
            "target.categories",
            format!("categoria '{category}' excede {MAX_CATEGORY_LEN} caracteres"),
        ));
    }

    Ok(target)
}

fn common_budget(code: Option<String>, max_count: Option<i64>) -> Result<CodeBudget, ValidationError> {
    let code = blank_to_none(code)
        .ok_or_else(|| ValidationError::new("promoCommon", "é obrigatório no modo COMMON"))?;

    if !(5..=30).contains(&code.chars().count()) {
        return Err(ValidationError::new("promoCommon", "deve ter entre 5 e 30 caracteres"));
    }

    let max_count = match max_count {
        Some(n) if n >= 1 => n,
        _ => return Err(ValidationError::new("maxCount", "deve ser maior que zero no modo COMMON")),
    };

    Ok(CodeBudget::Common { code, max_count })
}

fn unique_budget(codes: Option<Vec<String>>) -> Result<CodeBudget, ValidationError> {
    let codes = codes.unwrap_or_default();
    if codes.is_empty() {
        return Err(ValidationError::new(
            "promoUnique",
            "ao menos um código é obrigatório no modo UNIQUE",
        ));
    }

    let mut seen = HashSet::with_capacity(codes.len());
    for (idx, code) in codes.iter().enumerate() {
        if !(3..=30).contains(&code.chars().count()) {
            return Err(ValidationError::new(
                "promoUnique",
                format!("o código na posição {idx} deve ter entre 3 e 30 caracteres"),
            ));
        }
        if !seen.insert(code.as_str()) {
            return Err(ValidationError::new("promoUnique", format!("código duplicado: {code}")));
        }
    }

    Ok(CodeBudget::Unique { codes })
}

fn check_dates(
    active_from: Option<DateTime<Utc>>,
    active_until: Option<DateTime<Utc>>,
) -> Result<(), ValidationError> {
    if let (Some(from), Some(until)) = (active_from, active_until) {
        if until <= from {
            return Err(ValidationError::new("activeUntil", "deve ser posterior a activeFrom"));
        }
    }
    Ok(())
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
