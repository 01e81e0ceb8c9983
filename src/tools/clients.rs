//! HTTP clients for the beneficiary and transfer record services
//!
//! Read-only access over the services' JSON wire format (camelCase French
//! field names, matching the record services).

use crate::config::ServicesConfig;
use crate::error::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// A beneficiary record
#[derive(Debug, Clone, Deserialize)]
pub struct BeneficiaryDto {
    pub id: i64,
    pub nom: String,
    #[serde(default)]
    pub prenom: String,
    #[serde(default)]
    pub rib: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "dateCreation", default)]
    pub date_creation: Option<String>,
    #[serde(default)]
    pub actif: Option<bool>,
}

/// A transfer record
#[derive(Debug, Clone, Deserialize)]
pub struct TransferDto {
    pub id: i64,
    #[serde(rename = "beneficiaireId")]
    pub beneficiaire_id: i64,
    #[serde(rename = "ribSource", default)]
    pub rib_source: Option<String>,
    pub montant: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "dateVirement", default)]
    pub date_virement: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub statut: Option<String>,
}

/// Client for the beneficiary record service
pub struct BeneficiaryClient {
    client: Client,
    base: Url,
}

impl BeneficiaryClient {
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        let base = Url::parse(&config.beneficiary_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid beneficiary service URL: {}", e)))
    }

    pub async fn list(&self) -> Result<Vec<BeneficiaryDto>> {
        let url = self.endpoint("/api/beneficiaires")?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    pub async fn get(&self, id: i64) -> Result<BeneficiaryDto> {
        let url = self.endpoint(&format!("/api/beneficiaires/{}", id))?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    pub async fn search(&self, nom: &str) -> Result<Vec<BeneficiaryDto>> {
        let mut url = self.endpoint("/api/beneficiaires/search")?;
        url.query_pairs_mut().append_pair("nom", nom);
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Client for the transfer record service
pub struct TransferClient {
    client: Client,
    base: Url,
}

impl TransferClient {
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        let base = Url::parse(&config.transfer_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid transfer service URL: {}", e)))
    }

    pub async fn list(&self) -> Result<Vec<TransferDto>> {
        let url = self.endpoint("/api/virements")?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    pub async fn get(&self, id: i64) -> Result<TransferDto> {
        let url = self.endpoint(&format!("/api/virements/{}", id))?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    pub async fn by_beneficiary(&self, beneficiary_id: i64) -> Result<Vec<TransferDto>> {
        let url = self.endpoint(&format!("/api/virements/beneficiaire/{}", beneficiary_id))?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}
