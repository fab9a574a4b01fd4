// src/db/promo_cache.rs

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use uuid::Uuid;

use crate::common::error::AppError;

/// Armazenamento chave → texto, não autoritativo.
///
/// Sem TTL: as entradas saem apenas por invalidação explícita
/// (Update, Delete e ativações bem-sucedidas). Cada chave tem uma geração
/// que a invalidação incrementa; um preenchimento só grava se a geração
/// lida antes da consulta ao banco ainda for a atual.
#[async_trait]
pub trait PromoCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    /// Geração atual da chave (0 se nunca invalidada).
    async fn generation(&self, key: &str) -> Result<u64, AppError>;

    /// Grava `value` só se a geração ainda for `generation`. `false` = descartado.
    async fn set_if_generation(&self, key: &str, value: &str, generation: u64) -> Result<bool, AppError>;

    /// Remove a entrada e incrementa a geração, atomicamente.
    async fn invalidate(&self, key: &str) -> Result<(), AppError>;
}

/// Chave do detalhe de uma promoção: `promo:detail:{id}`.
pub fn promo_key(promo_id: Uuid) -> String {
    format!("promo:detail:{promo_id}")
}

/// Chave da geração de uma entrada: `{key}:gen`.
pub fn generation_key(key: &str) -> String {
    format!("{key}:gen")
}

// Compara a geração e grava no mesmo passo, do lado do Redis
const SET_IF_GENERATION: &str = r#"
    local current = redis.call('GET', KEYS[2]) or '0'
    if current == ARGV[2] then
        redis.call('SET', KEYS[1], ARGV[1])
        return 1
    end
    return 0
"#;

#[derive(Clone)]
pub struct RedisPromoCache {
    // O ConnectionManager é barato de clonar e reconecta sozinho.
    conn: ConnectionManager,
}

impl RedisPromoCache {
    pub async fn connect(redis_url: &str) -> Result<Self, AppError> {
        let client = Client::open(redis_url)
            .map_err(|e| AppError::Cache(format!("Falha ao criar o cliente Redis: {e}")))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::Cache(format!("Falha ao conectar ao Redis: {e}")))?;

        tracing::info!("✅ Conexão com o Redis estabelecida com sucesso!");

        Ok(Self { conn })
    }
}

#[async_trait]
impl PromoCache for RedisPromoCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| AppError::Cache(format!("GET {key}: {e}")))
    }

    async fn generation(&self, key: &str) -> Result<u64, AppError> {
        let mut conn = self.conn.clone();
        let generation: Option<u64> = conn
            .get(generation_key(key))
            .await
            .map_err(|e| AppError::Cache(format!("GET {key}:gen: {e}")))?;
        Ok(generation.unwrap_or(0))
    }

    async fn set_if_generation(&self, key: &str, value: &str, generation: u64) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let written: i64 = redis::Script::new(SET_IF_GENERATION)
            .key(key)
            .key(generation_key(key))
            .arg(value)
            .arg(generation.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::Cache(format!("SET {key}: {e}")))?;
        Ok(written == 1)
    }

    async fn invalidate(&self, key: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .incr(generation_key(key), 1)
            .ignore()
            .del(key)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Cache(format!("DEL {key}: {e}")))?;
        Ok(())
    }
}
