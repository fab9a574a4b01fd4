// src/db/memory.rs
//
// Implementações em memória dos traits de armazenamento, usadas só nos testes.
// Cada linha de código tem o seu próprio mutex assíncrono, imitando o
// `FOR UPDATE SKIP LOCKED` + `FOR UPDATE` do repositório Postgres.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as RowLock, MutexGuard};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{promo_cache::PromoCache, promo_repo::PromoStore},
    models::promo::{CodeSummary, NewPromo, Page, PromoChanges, PromoFilter, PromoRecord, SortBy},
    services::{antifraud::FraudGate, code_pool::NewPromoCode, company_directory::CompanyDirectory},
};

#[derive(Debug)]
struct CodeRow {
    code: String,
    activations: i64,
    max_count: i64,
}

struct StoredPromo {
    // `codes` fica vazio aqui; o snapshot é montado a partir das linhas
    record: PromoRecord,
    rows: Vec<Arc<RowLock<CodeRow>>>,
}

#[derive(Default)]
pub struct InMemoryPromoStore {
    promos: Mutex<HashMap<Uuid, StoredPromo>>,
    fail_code_inserts: AtomicBool,
}

impl InMemoryPromoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Faz a inserção de códigos falhar, para testar a atomicidade do Create.
    pub fn fail_code_inserts(&self, fail: bool) {
        self.fail_code_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn promo_count(&self) -> usize {
        self.promos.lock().unwrap().len()
    }

    fn rows_of(&self, promo_id: Uuid) -> Option<(PromoRecord, Vec<Arc<RowLock<CodeRow>>>)> {
        let promos = self.promos.lock().unwrap();
        promos
            .get(&promo_id)
            .map(|stored| (stored.record.clone(), stored.rows.clone()))
    }

    async fn snapshot(record: PromoRecord, rows: &[Arc<RowLock<CodeRow>>]) -> PromoRecord {
        let mut codes = Vec::with_capacity(rows.len());
        for row in rows {
            let row = row.lock().await;
            codes.push(CodeSummary {
                code: row.code.clone(),
                activations: row.activations,
                max_count: row.max_count,
            });
        }
        PromoRecord { codes, ..record }
    }

    async fn consume(
        promo_id: Uuid,
        mut row: MutexGuard<'_, CodeRow>,
        gate: &dyn FraudGate,
    ) -> Result<String, AppError> {
        // Abre espaço para outras tarefas enquanto a linha está travada
        tokio::task::yield_now().await;

        if gate.should_reject(promo_id, &row.code) {
            return Err(AppError::FraudRejected);
        }

        row.activations += 1;
        Ok(row.code.clone())
    }
}

fn sort_key(record: &PromoRecord, sort_by: SortBy) -> Option<DateTime<Utc>> {
    match sort_by {
        SortBy::CreatedAt => Some(record.created_at),
        SortBy::ActiveFrom => record.active_from,
        SortBy::ActiveUntil => record.active_until,
    }
}

#[async_trait]
impl PromoStore for InMemoryPromoStore {
    async fn create(
        &self,
        promo_id: Uuid,
        created_at: DateTime<Utc>,
        promo: &NewPromo,
        codes: &[NewPromoCode],
    ) -> Result<(), AppError> {
        if self.fail_code_inserts.load(Ordering::SeqCst) {
            return Err(AppError::storage("memory.create.codes")(sqlx::Error::Protocol(
                "inserção de códigos desativada".into(),
            )));
        }

        let record = PromoRecord {
            id: promo_id,
            company_id: promo.company_id,
            mode: promo.budget.mode(),
            description: promo.description.clone(),
            image_url: promo.image_url.clone(),
            target: promo.target.clone(),
            active_from: promo.active_from,
            active_until: promo.active_until,
            created_at,
            codes: vec![],
        };

        let rows = codes
            .iter()
            .map(|c| {
                Arc::new(RowLock::new(CodeRow {
                    code: c.code.clone(),
                    activations: 0,
                    max_count: c.max_count,
                }))
            })
            .collect();

        self.promos
            .lock()
            .unwrap()
            .insert(promo_id, StoredPromo { record, rows });

        Ok(())
    }

    async fn get_by_id(&self, promo_id: Uuid) -> Result<Option<PromoRecord>, AppError> {
        match self.rows_of(promo_id) {
            None => Ok(None),
            Some((record, rows)) => Ok(Some(Self::snapshot(record, &rows).await)),
        }
    }

    async fn list(
        &self,
        filter: &PromoFilter,
        page: Page,
        sort_by: SortBy,
    ) -> Result<Vec<PromoRecord>, AppError> {
        let mut matching: Vec<(PromoRecord, Vec<Arc<RowLock<CodeRow>>>)> = {
            let promos = self.promos.lock().unwrap();
            promos
                .values()
                .filter(|stored| filter.matches(&stored.record))
                .map(|stored| (stored.record.clone(), stored.rows.clone()))
                .collect()
        };

        // Decrescente, nulos primeiro, desempate pelo id
        matching.sort_by(|(a, _), (b, _)| {
            let by_key = match (sort_key(a, sort_by), sort_key(b, sort_by)) {
                (Some(x), Some(y)) => y.cmp(&x),
                (Some(_), None) => std::cmp::Ordering::Greater,
                (None, Some(_)) => std::cmp::Ordering::Less,
                (None, None) => std::cmp::Ordering::Equal,
            };
            by_key.then(a.id.cmp(&b.id))
        });

        let mut page_items = Vec::new();
        for (record, rows) in matching
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
        {
            page_items.push(Self::snapshot(record, &rows).await);
        }

        Ok(page_items)
    }

    async fn count(&self, filter: &PromoFilter) -> Result<i64, AppError> {
        let promos = self.promos.lock().unwrap();
        Ok(promos.values().filter(|s| filter.matches(&s.record)).count() as i64)
    }

    async fn update_owned(
        &self,
        promo_id: Uuid,
        company_id: Uuid,
        changes: &PromoChanges,
    ) -> Result<(), AppError> {
        let mut promos = self.promos.lock().unwrap();
        let stored = promos.get_mut(&promo_id).ok_or(AppError::PromoNotFound)?;
        if stored.record.company_id != company_id {
            return Err(AppError::PermissionDenied);
        }

        let record = &mut stored.record;
        record.description = changes.description.clone();
        record.image_url = changes.image_url.clone();
        record.target = changes.target.clone();
        record.active_from = changes.active_from;
        record.active_until = changes.active_until;

        Ok(())
    }

    async fn delete_owned(&self, promo_id: Uuid, company_id: Uuid) -> Result<(), AppError> {
        let mut promos = self.promos.lock().unwrap();
        let owner = promos.get(&promo_id).map(|stored| stored.record.company_id);
        match owner {
            None => Err(AppError::PromoNotFound),
            Some(owner) if owner != company_id => Err(AppError::PermissionDenied),
            Some(_) => {
                promos.remove(&promo_id);
                Ok(())
            }
        }
    }

    async fn activate(&self, promo_id: Uuid, gate: &dyn FraudGate) -> Result<String, AppError> {
        let Some((_, rows)) = self.rows_of(promo_id) else {
            return Err(AppError::PromoNotFound);
        };

        // 1. Pula linhas travadas por outras ativações
        for row in &rows {
            if let Ok(guard) = row.try_lock() {
                if guard.activations < guard.max_count {
                    return Self::consume(promo_id, guard, gate).await;
                }
            }
        }

        // 2. Espera pelas travadas e reavalia a capacidade
        for row in &rows {
            let guard = row.lock().await;
            if guard.activations < guard.max_count {
                return Self::consume(promo_id, guard, gate).await;
            }
        }

        Err(AppError::NoActivationsLeft)
    }
}

// ---
// Cache
// ---

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, String>,
    generations: HashMap<String, u64>,
}

#[derive(Default)]
pub struct InMemoryPromoCache {
    state: Mutex<CacheState>,
    failing: AtomicBool,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
    pub invalidations: AtomicUsize,
}

impl InMemoryPromoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simula o Redis fora do ar: todas as operações passam a falhar.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn peek(&self, key: &str) -> Option<String> {
        self.state.lock().unwrap().entries.get(key).cloned()
    }

    pub fn seed(&self, key: &str, value: &str) {
        self.state
            .lock()
            .unwrap()
            .entries
            .insert(key.to_string(), value.to_string());
    }

    fn check(&self, op: &str) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Cache(format!("{op}: conexão recusada")));
        }
        Ok(())
    }
}

#[async_trait]
impl PromoCache for InMemoryPromoCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check("GET")?;
        Ok(self.peek(key))
    }

    async fn generation(&self, key: &str) -> Result<u64, AppError> {
        self.check("GET gen")?;
        let state = self.state.lock().unwrap();
        Ok(state.generations.get(key).copied().unwrap_or(0))
    }

    async fn set_if_generation(&self, key: &str, value: &str, generation: u64) -> Result<bool, AppError> {
        self.check("SET")?;
        let mut state = self.state.lock().unwrap();
        if state.generations.get(key).copied().unwrap_or(0) != generation {
            return Ok(false);
        }
        self.sets.fetch_add(1, Ordering::SeqCst);
        state.entries.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn invalidate(&self, key: &str) -> Result<(), AppError> {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        self.check("DEL")?;
        let mut state = self.state.lock().unwrap();
        *state.generations.entry(key.to_string()).or_insert(0) += 1;
        state.entries.remove(key);
        Ok(())
    }
}

// ---
// Serviço de contas
// ---

#[derive(Default)]
pub struct FakeCompanyDirectory {
    names: Mutex<HashMap<Uuid, String>>,
    pub calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl FakeCompanyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_company(self, company_id: Uuid, name: &str) -> Self {
        self.names
            .lock()
            .unwrap()
            .insert(company_id, name.to_string());
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl CompanyDirectory for FakeCompanyDirectory {
    async fn company_name(&self, company_id: Uuid) -> Result<String, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Directory("serviço de contas indisponível".into()));
        }
        self.names
            .lock()
            .unwrap()
            .get(&company_id)
            .cloned()
            .ok_or(AppError::CompanyNotFound)
    }
}
