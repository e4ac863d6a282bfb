//! WordPress content sink
//!
//! The local side of the sync: procedures become taxonomy terms, cases and
//! doctors become posts, all through the WordPress REST API. The engine
//! decides what to push or remove; the sink only executes.

use async_trait::async_trait;
use pgs_common::config::WordPressConfig;
use pgs_common::db::{ItemType, WpObjectType};
use pgs_common::{Error, Result};
use serde::Deserialize;
use serde_json::json;

use crate::remote::{CasePayload, DoctorPayload, ProcedurePayload};

/// Where synced content lands locally.
///
/// Apply operations return the local WordPress object id for the registry.
#[async_trait]
pub trait ContentSink: Send + Sync {
    async fn apply_procedure(&self, procedure: &ProcedurePayload) -> Result<i64>;
    async fn apply_case(&self, case: &CasePayload) -> Result<i64>;
    async fn apply_doctor(&self, doctor: &DoctorPayload) -> Result<i64>;
    async fn remove(
        &self,
        item_type: ItemType,
        wordpress_id: i64,
        wordpress_type: WpObjectType,
    ) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct WpObject {
    id: i64,
}

/// ContentSink over the WordPress REST API (wp-json/wp/v2), authenticated
/// with an application password
pub struct WordPressSink {
    http: reqwest::Client,
    base_url: String,
    username: String,
    app_password: String,
}

impl WordPressSink {
    pub fn new(config: &WordPressConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            app_password: config.app_password.clone(),
        }
    }

    /// REST route for each synced item type. Procedures are a custom
    /// taxonomy; cases and doctors are custom post types.
    fn route(item_type: ItemType) -> &'static str {
        match item_type {
            ItemType::Procedure => "procedures",
            ItemType::Case => "cases",
            ItemType::Doctor => "doctors",
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}/wp-json/wp/v2/{route}", self.base_url)
    }

    async fn find_by_slug(&self, route: &str, slug: &str) -> Result<Option<i64>> {
        let url = self.url(route);
        let found: Vec<WpObject> = self
            .http
            .get(&url)
            .query(&[("slug", slug)])
            .basic_auth(&self.username, Some(&self.app_password))
            .send()
            .await
            .map_err(|e| Error::Remote(format!("GET {url}: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Remote(format!("GET {url}: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Remote(format!("GET {url}: invalid payload: {e}")))?;

        Ok(found.first().map(|o| o.id))
    }

    /// Create the object or update the existing one with the same slug,
    /// returning its id
    async fn push(&self, route: &str, slug: &str, body: serde_json::Value) -> Result<i64> {
        let url = match self.find_by_slug(route, slug).await? {
            Some(id) => format!("{}/{id}", self.url(route)),
            None => self.url(route),
        };

        let object: WpObject = self
            .http
            .post(&url)
            .json(&body)
            .basic_auth(&self.username, Some(&self.app_password))
            .send()
            .await
            .map_err(|e| Error::Remote(format!("POST {url}: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Remote(format!("POST {url}: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Remote(format!("POST {url}: invalid payload: {e}")))?;

        Ok(object.id)
    }
}

/// Slug for a case post; case api_ids are only unique per procedure
fn case_slug(case: &CasePayload) -> String {
    format!("case-{}-{}", case.procedure_id, case.id)
}

fn case_content(case: &CasePayload) -> String {
    let mut html = String::new();
    for photo in &case.photos {
        if photo.caption.is_empty() {
            html.push_str(&format!("<figure><img src=\"{}\" /></figure>\n", photo.url));
        } else {
            html.push_str(&format!(
                "<figure><img src=\"{}\" /><figcaption>{}</figcaption></figure>\n",
                photo.url, photo.caption
            ));
        }
    }
    html
}

#[async_trait]
impl ContentSink for WordPressSink {
    async fn apply_procedure(&self, procedure: &ProcedurePayload) -> Result<i64> {
        self.push(
            Self::route(ItemType::Procedure),
            &procedure.slug,
            json!({
                "name": procedure.name,
                "slug": procedure.slug,
                "description": procedure.description,
            }),
        )
        .await
    }

    async fn apply_case(&self, case: &CasePayload) -> Result<i64> {
        let slug = case_slug(case);
        let title = if case.title.is_empty() {
            format!("Case {}", case.id)
        } else {
            case.title.clone()
        };

        self.push(
            Self::route(ItemType::Case),
            &slug,
            json!({
                "title": title,
                "slug": slug,
                "status": "publish",
                "content": case_content(case),
                "meta": { "case_details": case.details },
            }),
        )
        .await
    }

    async fn apply_doctor(&self, doctor: &DoctorPayload) -> Result<i64> {
        self.push(
            Self::route(ItemType::Doctor),
            &doctor.slug,
            json!({
                "title": doctor.name,
                "slug": doctor.slug,
                "status": "publish",
                "content": doctor.bio,
            }),
        )
        .await
    }

    async fn remove(
        &self,
        item_type: ItemType,
        wordpress_id: i64,
        _wordpress_type: WpObjectType,
    ) -> Result<()> {
        let url = format!("{}/{wordpress_id}", self.url(Self::route(item_type)));

        self.http
            .delete(&url)
            .query(&[("force", "true")])
            .basic_auth(&self.username, Some(&self.app_password))
            .send()
            .await
            .map_err(|e| Error::Remote(format!("DELETE {url}: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Remote(format!("DELETE {url}: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::CasePhoto;

    #[test]
    fn case_slug_includes_procedure_context() {
        let case = CasePayload {
            id: 101,
            procedure_id: 3,
            title: String::new(),
            details: serde_json::Value::Null,
            photos: vec![],
        };
        assert_eq!(case_slug(&case), "case-3-101");
    }

    #[test]
    fn case_content_renders_photos() {
        let case = CasePayload {
            id: 1,
            procedure_id: 1,
            title: String::new(),
            details: serde_json::Value::Null,
            photos: vec![
                CasePhoto {
                    url: "https://cdn.example.com/before.jpg".to_string(),
                    caption: "Before".to_string(),
                },
                CasePhoto {
                    url: "https://cdn.example.com/after.jpg".to_string(),
                    caption: String::new(),
                },
            ],
        };

        let html = case_content(&case);
        assert!(html.contains("before.jpg"));
        assert!(html.contains("<figcaption>Before</figcaption>"));
        assert!(html.contains("after.jpg"));
    }
}
