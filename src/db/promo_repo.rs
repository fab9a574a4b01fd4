// src/db/promo_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, Executor, FromRow, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::promo::{
        CodeSummary, NewPromo, Page, PromoChanges, PromoFilter, PromoMode, PromoRecord, SortBy,
        Target,
    },
    services::{antifraud::FraudGate, code_pool::NewPromoCode},
};

/// Fonte da verdade das promoções e dos seus códigos.
///
/// O serviço só conhece este trait, o que permite trocar o Postgres por um
/// fake em memória nos testes sem perder o contrato de travamento.
#[async_trait]
pub trait PromoStore: Send + Sync {
    /// Insere a promoção e todos os códigos numa única transação.
    async fn create(
        &self,
        promo_id: Uuid,
        created_at: DateTime<Utc>,
        promo: &NewPromo,
        codes: &[NewPromoCode],
    ) -> Result<(), AppError>;

    async fn get_by_id(&self, promo_id: Uuid) -> Result<Option<PromoRecord>, AppError>;

    async fn list(
        &self,
        filter: &PromoFilter,
        page: Page,
        sort_by: SortBy,
    ) -> Result<Vec<PromoRecord>, AppError>;

    async fn count(&self, filter: &PromoFilter) -> Result<i64, AppError>;

    /// Confere o dono e altera, na mesma transação.
    async fn update_owned(
        &self,
        promo_id: Uuid,
        company_id: Uuid,
        changes: &PromoChanges,
    ) -> Result<(), AppError>;

    /// Confere o dono e apaga (os códigos vão junto).
    async fn delete_owned(&self, promo_id: Uuid, company_id: Uuid) -> Result<(), AppError>;

    /// Aloca uma ativação de um código com capacidade restante.
    async fn activate(&self, promo_id: Uuid, gate: &dyn FraudGate) -> Result<String, AppError>;
}

// Linha do SELECT agregado (promo + json dos códigos)
#[derive(Debug, FromRow)]
struct PromoRow {
    id: Uuid,
    company_id: Uuid,
    description: String,
    image_url: Option<String>,
    active_from: Option<DateTime<Utc>>,
    active_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    mode: PromoMode,
    target_age_from: Option<i32>,
    target_age_until: Option<i32>,
    target_country: Option<String>,
    target_categories: Vec<String>,
    codes: Json<Vec<CodeSummary>>,
}

impl From<PromoRow> for PromoRecord {
    fn from(row: PromoRow) -> Self {
        PromoRecord {
            id: row.id,
            company_id: row.company_id,
            mode: row.mode,
            description: row.description,
            image_url: row.image_url,
            target: Target {
                age_from: row.target_age_from,
                age_until: row.target_age_until,
                country: row.target_country,
                categories: row.target_categories,
            },
            active_from: row.active_from,
            active_until: row.active_until,
            created_at: row.created_at,
            codes: row.codes.0,
        }
    }
}

const SELECT_PROMO_DETAILS: &str = r#"
    SELECT
        p.id,
        p.company_id,
        p.description,
        p.image_url,
        p.active_from,
        p.active_until,
        p.created_at,
        p.mode,
        p.target_age_from,
        p.target_age_until,
        p.target_country,
        p.target_categories,
        COALESCE(
            json_agg(json_build_object(
                'code', pc.code,
                'activations', pc.activations,
                'maxCount', pc.max_count
            ) ORDER BY pc.id) FILTER (WHERE pc.id IS NOT NULL),
            '[]'
        ) AS codes
    FROM promo p
    LEFT JOIN promo_code pc ON pc.promo_id = p.id
"#;

// Lista vazia de países = sem filtro. Sem país na promoção = válida em todo lugar.
const COUNTRY_PREDICATE: &str = r#"
    (cardinality($2::text[]) = 0
        OR p.target_country IS NULL
        OR lower(p.target_country) = ANY($2::text[]))
"#;

// A coluna de ordenação vem de um conjunto fechado, passada como parâmetro.
const ORDER_AND_PAGE: &str = r#"
    ORDER BY
        CASE $3::text
            WHEN 'active_from' THEN p.active_from
            WHEN 'active_until' THEN p.active_until
            ELSE p.created_at
        END DESC NULLS FIRST,
        p.id
    LIMIT $4 OFFSET $5
"#;

// Primeira passada: linhas travadas por outra transação são puladas,
// então cada chamador disputa só a capacidade restante.
const SELECT_FREE_CODE_SKIP_LOCKED: &str = r#"
    SELECT id, code
    FROM promo_code
    WHERE promo_id = $1 AND activations < max_count
    ORDER BY id
    LIMIT 1
    FOR UPDATE SKIP LOCKED
"#;

// Segunda passada: espera pelas linhas travadas. Em READ COMMITTED o Postgres
// reavalia o WHERE depois da espera e descarta linhas que esgotaram.
const SELECT_FREE_CODE_WAIT: &str = r#"
    SELECT id, code
    FROM promo_code
    WHERE promo_id = $1 AND activations < max_count
    ORDER BY id
    LIMIT 1
    FOR UPDATE
"#;

#[derive(Clone)]
pub struct PgPromoRepository {
    pool: PgPool,
}

impl PgPromoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_promo<'e, E>(
        &self,
        executor: E,
        promo_id: Uuid,
        created_at: DateTime<Utc>,
        promo: &NewPromo,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO promo (
                id, company_id, description, image_url, active_from, active_until,
                created_at, mode, target_age_from, target_age_until,
                target_country, target_categories
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
            .bind(promo_id)
            .bind(promo.company_id)
            .bind(&promo.description)
            .bind(promo.image_url.as_deref())
            .bind(promo.active_from)
            .bind(promo.active_until)
            .bind(created_at)
            .bind(promo.budget.mode())
            .bind(promo.target.age_from)
            .bind(promo.target.age_until)
            .bind(promo.target.country.as_deref())
            .bind(&promo.target.categories)
            .execute(executor)
            .await
            .map_err(AppError::storage("promo_repo.create.promo"))?;

        Ok(())
    }

    /// Insere o pool de códigos de uma vez (UNNEST), na ordem recebida.
    async fn insert_codes<'e, E>(
        &self,
        executor: E,
        promo_id: Uuid,
        codes: &[NewPromoCode],
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let code_values: Vec<String> = codes.iter().map(|c| c.code.clone()).collect();
        let max_counts: Vec<i64> = codes.iter().map(|c| c.max_count).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO promo_code (promo_id, code, max_count)
            SELECT $1::uuid, t.code, t.max_count
            FROM UNNEST($2::text[], $3::bigint[]) WITH ORDINALITY AS t(code, max_count, ord)
            ORDER BY t.ord
            "#,
        )
            .bind(promo_id)
            .bind(&code_values)
            .bind(&max_counts)
            .execute(executor)
            .await
            .map_err(AppError::storage("promo_repo.create.codes"))?;

        Ok(result.rows_affected())
    }

    /// Trava a linha da promoção e devolve o dono atual.
    async fn lock_owner<'e, E>(
        &self,
        executor: E,
        promo_id: Uuid,
        op: &'static str,
    ) -> Result<Option<Uuid>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_scalar::<_, Uuid>("SELECT company_id FROM promo WHERE id = $1 FOR UPDATE")
            .bind(promo_id)
            .fetch_optional(executor)
            .await
            .map_err(AppError::storage(op))
    }
}

fn ensure_owner(owner: Option<Uuid>, company_id: Uuid) -> Result<(), AppError> {
    match owner {
        None => Err(AppError::PromoNotFound),
        Some(owner) if owner != company_id => Err(AppError::PermissionDenied),
        Some(_) => Ok(()),
    }
}

#[async_trait]
impl PromoStore for PgPromoRepository {
    async fn create(
        &self,
        promo_id: Uuid,
        created_at: DateTime<Utc>,
        promo: &NewPromo,
        codes: &[NewPromoCode],
    ) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(AppError::storage("promo_repo.create.begin"))?;

        // Se qualquer passo falhar, o tx sofre rollback automático ao sair do escopo (drop)
        self.insert_promo(&mut *tx, promo_id, created_at, promo).await?;

        let inserted = self.insert_codes(&mut *tx, promo_id, codes).await?;
        if inserted != codes.len() as u64 {
            return Err(AppError::InternalServerError(anyhow::anyhow!(
                "promo_repo.create: {} de {} códigos inseridos",
                inserted,
                codes.len()
            )));
        }

        tx.commit()
            .await
            .map_err(AppError::storage("promo_repo.create.commit"))?;

        Ok(())
    }

    async fn get_by_id(&self, promo_id: Uuid) -> Result<Option<PromoRecord>, AppError> {
        let sql = format!("{SELECT_PROMO_DETAILS} WHERE p.id = $1 GROUP BY p.id");

        let row = sqlx::query_as::<_, PromoRow>(&sql)
            .bind(promo_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::storage("promo_repo.get_by_id"))?;

        Ok(row.map(PromoRecord::from))
    }

    async fn list(
        &self,
        filter: &PromoFilter,
        page: Page,
        sort_by: SortBy,
    ) -> Result<Vec<PromoRecord>, AppError> {
        let sql = format!(
            "{SELECT_PROMO_DETAILS} WHERE p.company_id = $1 AND {COUNTRY_PREDICATE} GROUP BY p.id {ORDER_AND_PAGE}"
        );

        let rows = sqlx::query_as::<_, PromoRow>(&sql)
            .bind(filter.company_id)
            .bind(&filter.countries)
            .bind(sort_by.as_str())
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::storage("promo_repo.list"))?;

        Ok(rows.into_iter().map(PromoRecord::from).collect())
    }

    async fn count(&self, filter: &PromoFilter) -> Result<i64, AppError> {
        let sql = format!("SELECT COUNT(*) FROM promo p WHERE p.company_id = $1 AND {COUNTRY_PREDICATE}");

        sqlx::query_scalar::<_, i64>(&sql)
            .bind(filter.company_id)
            .bind(&filter.countries)
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::storage("promo_repo.count"))
    }

    async fn update_owned(
        &self,
        promo_id: Uuid,
        company_id: Uuid,
        changes: &PromoChanges,
    ) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(AppError::storage("promo_repo.update.begin"))?;

        // 1. Compara (dono atual, com a linha travada)
        let owner = self.lock_owner(&mut *tx, promo_id, "promo_repo.update.lock").await?;
        ensure_owner(owner, company_id)?;

        // 2. Age
        sqlx::query(
            r#"
            UPDATE promo SET
                description = $2,
                image_url = $3,
                target_age_from = $4,
                target_age_until = $5,
                target_country = $6,
                target_categories = $7,
                active_from = $8,
                active_until = $9
            WHERE id = $1
            "#,
        )
            .bind(promo_id)
            .bind(&changes.description)
            .bind(changes.image_url.as_deref())
            .bind(changes.target.age_from)
            .bind(changes.target.age_until)
            .bind(changes.target.country.as_deref())
            .bind(&changes.target.categories)
            .bind(changes.active_from)
            .bind(changes.active_until)
            .execute(&mut *tx)
            .await
            .map_err(AppError::storage("promo_repo.update"))?;

        tx.commit()
            .await
            .map_err(AppError::storage("promo_repo.update.commit"))?;

        Ok(())
    }

    async fn delete_owned(&self, promo_id: Uuid, company_id: Uuid) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(AppError::storage("promo_repo.delete.begin"))?;

        let owner = self.lock_owner(&mut *tx, promo_id, "promo_repo.delete.lock").await?;
        ensure_owner(owner, company_id)?;

        // ON DELETE CASCADE leva os códigos junto
        sqlx::query("DELETE FROM promo WHERE id = $1")
            .bind(promo_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::storage("promo_repo.delete"))?;

        tx.commit()
            .await
            .map_err(AppError::storage("promo_repo.delete.commit"))?;

        Ok(())
    }

    async fn activate(&self, promo_id: Uuid, gate: &dyn FraudGate) -> Result<String, AppError> {
        // Tudo numa transação: qualquer erro (ou cancelamento do request) antes do
        // commit derruba o tx e o contador fica como estava.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(AppError::storage("promo_repo.activate.begin"))?;

        // 1. Seleciona e trava uma linha com capacidade
        let mut candidate = sqlx::query_as::<_, (i64, String)>(SELECT_FREE_CODE_SKIP_LOCKED)
            .bind(promo_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AppError::storage("promo_repo.activate.select"))?;

        if candidate.is_none() {
            candidate = sqlx::query_as::<_, (i64, String)>(SELECT_FREE_CODE_WAIT)
                .bind(promo_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(AppError::storage("promo_repo.activate.select_wait"))?;
        }

        // 2. Nada elegível: promoção inexistente ou esgotada
        let Some((code_id, code)) = candidate else {
            let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM promo WHERE id = $1)")
                .bind(promo_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(AppError::storage("promo_repo.activate.exists"))?;

            return Err(if exists {
                AppError::NoActivationsLeft
            } else {
                AppError::PromoNotFound
            });
        };

        // 3. Antifraude antes do incremento: recusa = rollback, capacidade intacta
        if gate.should_reject(promo_id, &code) {
            tx.rollback()
                .await
                .map_err(AppError::storage("promo_repo.activate.rollback"))?;
            return Err(AppError::FraudRejected);
        }

        // 4. Incrementa exatamente a linha travada
        let updated = sqlx::query(
            "UPDATE promo_code SET activations = activations + 1 WHERE id = $1 AND activations < max_count",
        )
            .bind(code_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::storage("promo_repo.activate.increment"))?;

        if updated.rows_affected() != 1 {
            return Err(AppError::InternalServerError(anyhow::anyhow!(
                "promo_repo.activate: código {} mudou sob trava",
                code_id
            )));
        }

        // 5. Commit: único ponto em que a ativação passa a valer
        tx.commit()
            .await
            .map_err(AppError::storage("promo_repo.activate.commit"))?;

        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_check_distinguishes_missing_and_foreign() {
        let company = Uuid::new_v4();
        assert!(matches!(ensure_owner(None, company), Err(AppError::PromoNotFound)));
        assert!(matches!(
            ensure_owner(Some(Uuid::new_v4()), company),
            Err(AppError::PermissionDenied)
        ));
        assert!(ensure_owner(Some(company), company).is_ok());
    }
}
