// src/services/promo_service.rs

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{
        promo_cache::{promo_key, PromoCache},
        promo_repo::PromoStore,
    },
    models::{
        promo::{Page, PromoDetail, PromoFilter, PromoRecord, SortBy},
        promo_payload::{CreatePromoPayload, UpdatePromoPayload},
    },
    services::{antifraud::FraudGate, code_pool, company_directory::CompanyDirectory},
};

/// Orquestra validação, armazenamento, cache e resgate das promoções.
///
/// A empresa do chamador chega sempre como parâmetro explícito; o serviço
/// não lê nada do contexto da requisição.
#[derive(Clone)]
pub struct PromoService {
    store: Arc<dyn PromoStore>,
    cache: Arc<dyn PromoCache>,
    directory: Arc<dyn CompanyDirectory>,
    fraud_gate: Arc<dyn FraudGate>,
}

impl PromoService {
    pub fn new(
        store: Arc<dyn PromoStore>,
        cache: Arc<dyn PromoCache>,
        directory: Arc<dyn CompanyDirectory>,
        fraud_gate: Arc<dyn FraudGate>,
    ) -> Self {
        Self {
            store,
            cache,
            directory,
            fraud_gate,
        }
    }

    // --- CREATE ---
    pub async fn create(
        &self,
        company_id: Uuid,
        payload: CreatePromoPayload,
    ) -> Result<Uuid, AppError> {
        // 1. Valida e normaliza (nada é persistido se falhar)
        let promo = payload.into_new_promo(company_id)?;

        // 2. Materializa os códigos conforme o modo
        let codes = code_pool::materialize(&promo.budget);

        // 3. Promoção + códigos numa única unidade de trabalho
        let promo_id = Uuid::new_v4();
        self.store
            .create(promo_id, Utc::now(), &promo, &codes)
            .await?;

        tracing::info!(
            promo_id = %promo_id,
            company_id = %company_id,
            mode = ?promo.budget.mode(),
            codes = codes.len(),
            "promoção criada"
        );

        Ok(promo_id)
    }

    // --- LIST / COUNT ---
    pub async fn list(
        &self,
        company_id: Uuid,
        countries: &[String],
        page: Page,
        sort_by: SortBy,
    ) -> Result<Vec<PromoDetail>, AppError> {
        let filter = PromoFilter::new(company_id, countries);
        let records = self.store.list(&filter, page, sort_by).await?;

        // Um nome por empresa distinta; qualquer falha aborta a listagem inteira
        let mut names: HashMap<Uuid, String> = HashMap::new();
        let mut details = Vec::with_capacity(records.len());

        for record in records {
            let name = match names.get(&record.company_id) {
                Some(name) => name.clone(),
                None => {
                    let name = self.directory.company_name(record.company_id).await?;
                    names.insert(record.company_id, name.clone());
                    name
                }
            };
            details.push(PromoDetail::from_record(record, name));
        }

        Ok(details)
    }

    pub async fn count(&self, company_id: Uuid, countries: &[String]) -> Result<i64, AppError> {
        let filter = PromoFilter::new(company_id, countries);
        self.store.count(&filter).await
    }

    // --- GET BY ID ---
    pub async fn get_by_id(&self, promo_id: Uuid, company_id: Uuid) -> Result<PromoDetail, AppError> {
        let record = self.load_record(promo_id).await?;

        // O dono é conferido depois de resolver a promoção, venha ela do cache ou do banco
        if record.company_id != company_id {
            tracing::warn!(
                promo_id = %promo_id,
                company_id = %company_id,
                "acesso negado a promoção de outra empresa"
            );
            return Err(AppError::PermissionDenied);
        }

        let company_name = self.directory.company_name(record.company_id).await?;
        Ok(PromoDetail::from_record(record, company_name))
    }

    /// Leitura com cache: hit desserializa, miss carrega do banco e popula sem TTL.
    /// O cache nunca é obrigatório; falhas nele viram miss.
    async fn load_record(&self, promo_id: Uuid) -> Result<PromoRecord, AppError> {
        let key = promo_key(promo_id);

        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<PromoRecord>(&raw) {
                Ok(record) => return Ok(record),
                Err(e) => tracing::warn!(key = %key, error = %e, "entrada de cache ilegível, tratando como miss"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "falha ao ler o cache, tratando como miss"),
        }

        // A geração é lida antes do banco: uma invalidação no meio do caminho
        // faz o preenchimento abaixo ser descartado.
        let generation = match self.cache.generation(&key).await {
            Ok(generation) => Some(generation),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "falha ao ler a geração do cache");
                None
            }
        };

        let record = self
            .store
            .get_by_id(promo_id)
            .await?
            .ok_or(AppError::PromoNotFound)?;

        if let Some(generation) = generation {
            self.fill_cache(&key, &record, generation).await;
        }

        Ok(record)
    }

    async fn fill_cache(&self, key: &str, record: &PromoRecord, generation: u64) {
        let raw = match serde_json::to_string(record) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "falha ao serializar a promoção para o cache");
                return;
            }
        };

        match self.cache.set_if_generation(key, &raw, generation).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(key = %key, "promoção mudou durante a leitura, cache não populado"),
            Err(e) => tracing::warn!(key = %key, error = %e, "falha ao popular o cache"),
        }
    }

    // --- UPDATE / DELETE ---
    pub async fn update(
        &self,
        promo_id: Uuid,
        company_id: Uuid,
        payload: UpdatePromoPayload,
    ) -> Result<(), AppError> {
        let changes = payload.into_changes()?;

        self.store.update_owned(promo_id, company_id, &changes).await?;
        self.invalidate(promo_id).await;

        tracing::info!(promo_id = %promo_id, company_id = %company_id, "promoção atualizada");
        Ok(())
    }

    pub async fn delete(&self, promo_id: Uuid, company_id: Uuid) -> Result<(), AppError> {
        self.store.delete_owned(promo_id, company_id).await?;
        self.invalidate(promo_id).await;

        tracing::info!(promo_id = %promo_id, company_id = %company_id, "promoção removida");
        Ok(())
    }

    // --- ACTIVATE ---
    pub async fn activate(&self, promo_id: Uuid) -> Result<String, AppError> {
        match self.store.activate(promo_id, self.fraud_gate.as_ref()).await {
            Ok(code) => {
                tracing::info!(promo_id = %promo_id, code = %code, "ativação concedida");
                // Os contadores mudaram; o detalhe em cache ficou velho
                self.invalidate(promo_id).await;
                Ok(code)
            }
            Err(AppError::NoActivationsLeft) => {
                tracing::debug!(promo_id = %promo_id, "promoção sem ativações restantes");
                Err(AppError::NoActivationsLeft)
            }
            Err(AppError::FraudRejected) => {
                tracing::info!(promo_id = %promo_id, "ativação recusada pelo antifraude");
                Err(AppError::FraudRejected)
            }
            Err(e) => Err(e),
        }
    }

    // Invalidação best-effort: falhar aqui só arrisca um detalhe velho por um tempo
    async fn invalidate(&self, promo_id: Uuid) {
        let key = promo_key(promo_id);
        if let Err(e) = self.cache.invalidate(&key).await {
            tracing::warn!(key = %key, error = %e, "falha ao invalidar o cache");
        }
    }
}
