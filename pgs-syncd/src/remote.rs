//! Remote gallery API client
//!
//! The SaaS side of the sync: read-only enumeration of procedures, cases,
//! and doctors for one property. The remote is an opaque service; only the
//! payload shapes below matter to the engine.

use async_trait::async_trait;
use pgs_common::config::RemoteConfig;
use pgs_common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A procedure (gallery category) as served by the remote API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedurePayload {
    pub id: i64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
}

/// One before/after case under a procedure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CasePayload {
    pub id: i64,
    pub procedure_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(default)]
    pub photos: Vec<CasePhoto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CasePhoto {
    pub url: String,
    #[serde(default)]
    pub caption: String,
}

/// A doctor profile attached to the property
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorPayload {
    pub id: i64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub bio: String,
}

/// Read access to the remote gallery dataset
#[async_trait]
pub trait GalleryApi: Send + Sync {
    async fn procedures(&self) -> Result<Vec<ProcedurePayload>>;
    async fn cases(&self, procedure_api_id: i64) -> Result<Vec<CasePayload>>;
    async fn doctors(&self) -> Result<Vec<DoctorPayload>>;
}

/// 32-char content fingerprint of a payload.
///
/// Stored in the registry as sync_hash so partial passes can skip pushing
/// unchanged content.
pub fn content_hash<T: Serialize>(value: &T) -> String {
    let encoded = serde_json::to_vec(value).unwrap_or_default();
    let digest = Sha256::digest(&encoded);
    digest[..16].iter().map(|b| format!("{b:02x}")).collect()
}

/// HTTP client for the gallery SaaS API
pub struct GalleryClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
    property_id: i64,
}

impl GalleryClient {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            property_id: config.property_id,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!(
            "{}/api/v1/properties/{}/{path}",
            self.base_url, self.property_id
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::Remote(format!("GET {url}: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Remote(format!("GET {url}: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| Error::Remote(format!("GET {url}: invalid payload: {e}")))
    }
}

#[async_trait]
impl GalleryApi for GalleryClient {
    async fn procedures(&self) -> Result<Vec<ProcedurePayload>> {
        self.fetch("procedures").await
    }

    async fn cases(&self, procedure_api_id: i64) -> Result<Vec<CasePayload>> {
        self.fetch(&format!("procedures/{procedure_api_id}/cases")).await
    }

    async fn doctors(&self) -> Result<Vec<DoctorPayload>> {
        self.fetch("doctors").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_and_32_chars() {
        let p = ProcedurePayload {
            id: 1,
            name: "Rhinoplasty".to_string(),
            slug: "rhinoplasty".to_string(),
            description: String::new(),
        };

        let a = content_hash(&p);
        let b = content_hash(&p);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn content_hash_changes_with_content() {
        let mut p = ProcedurePayload {
            id: 1,
            name: "Rhinoplasty".to_string(),
            slug: "rhinoplasty".to_string(),
            description: String::new(),
        };
        let before = content_hash(&p);
        p.description = "Updated copy".to_string();
        assert_ne!(before, content_hash(&p));
    }
}
