// src/services/antifraud.rs

use rand::Rng;
use uuid::Uuid;

/// Ponto de decisão do antifraude no resgate.
///
/// É consultado com a linha do código já travada e antes do incremento,
/// dentro da mesma transação. Não pode alterar o estado da alocação:
/// recusar significa apenas que a transação é desfeita.
pub trait FraudGate: Send + Sync {
    /// `true` recusa a ativação.
    fn should_reject(&self, promo_id: Uuid, code: &str) -> bool;
}

/// Recusa uma fração aleatória das ativações (amostragem simples).
#[derive(Debug, Clone)]
pub struct SamplingFraudGate {
    reject_percent: u8,
}

impl SamplingFraudGate {
    pub fn new(reject_percent: u8) -> Self {
        Self {
            reject_percent: reject_percent.min(100),
        }
    }
}

impl FraudGate for SamplingFraudGate {
    fn should_reject(&self, promo_id: Uuid, code: &str) -> bool {
        if self.reject_percent == 0 {
            return false;
        }

        let rejected = rand::thread_rng().gen_range(0..100u8) < self.reject_percent;
        if rejected {
            tracing::debug!(promo_id = %promo_id, code, "antifraude recusou a ativação");
        }
        rejected
    }
}

/// Nunca recusa. Usado quando o antifraude está desligado.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl FraudGate for AllowAll {
    fn should_reject(&self, _promo_id: Uuid, _code: &str) -> bool {
        false
    }
}
