// src/services/company_directory.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use crate::common::error::AppError;

/// Resolve o nome de exibição de uma empresa no serviço de contas.
#[async_trait]
pub trait CompanyDirectory: Send + Sync {
    /// `AppError::CompanyNotFound` quando a empresa não existe;
    /// `AppError::Directory` para qualquer outra falha.
    async fn company_name(&self, company_id: Uuid) -> Result<String, AppError>;
}

#[derive(Debug, Deserialize)]
struct CompanyResponse {
    name: String,
}

// Cliente HTTP do serviço de contas
#[derive(Clone)]
pub struct HttpCompanyDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCompanyDirectory {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .map_err(|e| AppError::Directory(format!("Falha ao criar o cliente HTTP: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn company_url(&self, company_id: Uuid) -> String {
        format!("{}/api/companies/{}", self.base_url, company_id)
    }
}

#[async_trait]
impl CompanyDirectory for HttpCompanyDirectory {
    async fn company_name(&self, company_id: Uuid) -> Result<String, AppError> {
        let response = self
            .client
            .get(self.company_url(company_id))
            .send()
            .await
            .map_err(|e| AppError::Directory(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::warn!(company_id = %company_id, "empresa não existe no serviço de contas");
            return Err(AppError::CompanyNotFound);
        }

        let company: CompanyResponse = response
            .error_for_status()
            .map_err(|e| AppError::Directory(e.to_string()))?
            .json()
            .await
            .map_err(|e| AppError::Directory(e.to_string()))?;

        Ok(company.name)
    }
}
