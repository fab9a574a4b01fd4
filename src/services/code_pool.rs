// src/services/code_pool.rs

use crate::models::promo::CodeBudget;

/// Uma linha de `promo_code` a ser inserida junto com a promoção.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPromoCode {
    pub code: String,
    pub max_count: i64,
}

/// Materializa o conjunto de códigos de uma promoção validada.
///
/// COMMON: um único código com o orçamento total.
/// UNIQUE: um código por entrada, cada um de uso único.
pub fn materialize(budget: &CodeBudget) -> Vec<NewPromoCode> {
    match budget {
        CodeBudget::Common { code, max_count } => vec![NewPromoCode {
            code: code.clone(),
            max_count: *max_count,
        }],
        CodeBudget::Unique { codes } => codes
            .iter()
            .map(|code| NewPromoCode {
                code: code.clone(),
                max_count: 1,
            })
            .collect(),
    }
}
