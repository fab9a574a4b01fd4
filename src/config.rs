// src/config.rs

use std::{env, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::{PgPromoRepository, RedisPromoCache},
    services::{
        antifraud::{AllowAll, FraudGate, SamplingFraudGate},
        company_directory::HttpCompanyDirectory,
        PromoService,
    },
};

/// Configuração lida do ambiente (e do `.env`, se existir).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub redis_url: String,
    pub account_service_url: String,
    pub server_addr: String,
    pub db_max_connections: u32,
    /// 0 desliga o antifraude.
    pub antifraud_reject_percent: u8,
}

impl Settings {
    pub const DEFAULT_SERVER_ADDR: &'static str = "0.0.0.0:3000";
    pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
    pub const DEFAULT_ANTIFRAUD_REJECT_PERCENT: u8 = 25;

    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{key} deve ser definida"))
        };

        let db_max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("DB_MAX_CONNECTIONS inválido: {raw}"))?,
            None => Self::DEFAULT_DB_MAX_CONNECTIONS,
        };

        let antifraud_reject_percent = match lookup("ANTIFRAUD_REJECT_PERCENT") {
            Some(raw) => {
                let percent: u8 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("ANTIFRAUD_REJECT_PERCENT inválido: {raw}"))?;
                anyhow::ensure!(percent <= 100, "ANTIFRAUD_REJECT_PERCENT deve estar entre 0 e 100");
                percent
            }
            None => Self::DEFAULT_ANTIFRAUD_REJECT_PERCENT,
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: required("REDIS_URL")?,
            account_service_url: required("ACCOUNT_SERVICE_URL")?,
            server_addr: lookup("SERVER_ADDR").unwrap_or_else(|| Self::DEFAULT_SERVER_ADDR.to_string()),
            db_max_connections,
            antifraud_reject_percent,
        })
    }
}

pub async fn connect_database(settings: &Settings) -> anyhow::Result<PgPool> {
    let db_pool = PgPoolOptions::new()
        .max_connections(settings.db_max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&settings.database_url)
        .await
        .context("Falha ao conectar ao banco de dados")?;

    tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");
    Ok(db_pool)
}

#[derive(Clone)]
pub struct AppState {
    pub promo_service: PromoService,
}

impl AppState {
    pub async fn new(settings: &Settings, db_pool: PgPool) -> anyhow::Result<Self> {
        // --- Monta o gráfico de dependências ---
        let store = PgPromoRepository::new(db_pool);
        let cache = RedisPromoCache::connect(&settings.redis_url).await?;
        let directory = HttpCompanyDirectory::new(&settings.account_service_url)?;

        let fraud_gate: Arc<dyn FraudGate> = match settings.antifraud_reject_percent {
            0 => Arc::new(AllowAll),
            percent => Arc::new(SamplingFraudGate::new(percent)),
        };

        let promo_service = PromoService::new(
            Arc::new(store),
            Arc::new(cache),
            Arc::new(directory),
            fraud_gate,
        );

        Ok(Self { promo_service })
    }
}
