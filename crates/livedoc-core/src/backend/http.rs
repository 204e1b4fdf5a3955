//! Backend speaking the project REST API over HTTP.

use super::wire::{self, PersistMethod};
use super::{AssetStore, BoxFuture, DocumentBackend};
use crate::config::BackendConfig;
use crate::document::{DocumentRef, RemoteDocument, Timestamp};
use crate::error::{SyncError, SyncResult};
use crate::shapes::{AssetId, ImageFormat};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

const IMAGES_PATH: &str = "/api/images/image";

/// REST backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .build()
            .map_err(|e| SyncError::NetworkFailure(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Read the body of a successful response, mapping failures onto the taxonomy.
    async fn read_body(response: Response, what: &str) -> SyncResult<String> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::NetworkFailure(format!("{what}: HTTP {status}: {body}")));
        }
        response.text().await.map_err(network)
    }
}

fn network(err: reqwest::Error) -> SyncError {
    SyncError::NetworkFailure(err.to_string())
}

impl DocumentBackend for HttpBackend {
    fn fetch(&self, document: DocumentRef) -> BoxFuture<'_, SyncResult<RemoteDocument>> {
        Box::pin(async move {
            let response = self
                .client
                .get(self.url(&wire::fetch_path(document)))
                .send()
                .await
                .map_err(network)?;
            let body = Self::read_body(response, &document.to_string()).await?;
            wire::parse_document(&body)
        })
    }

    fn persist(&self, document: DocumentRef, content: String) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            let (method, path, body) = wire::persist_request(document, &content);
            let request = match method {
                PersistMethod::Put => self.client.put(self.url(path)),
                PersistMethod::Patch => self.client.patch(self.url(path)),
            };
            let response = request.json(&body).send().await.map_err(network)?;
            Self::read_body(response, &document.to_string()).await?;
            Ok(())
        })
    }

    fn last_update(&self, document: DocumentRef) -> BoxFuture<'_, SyncResult<Option<Timestamp>>> {
        Box::pin(async move {
            let response = self
                .client
                .get(self.url(&wire::last_update_path(document)))
                .send()
                .await
                .map_err(network)?;
            let body = Self::read_body(response, &document.to_string()).await?;
            wire::parse_last_update(&body)
        })
    }
}

impl AssetStore for HttpBackend {
    fn upload(&self, data: Vec<u8>, mime_type: &str) -> BoxFuture<'_, SyncResult<AssetId>> {
        let mime_type = mime_type.to_string();
        Box::pin(async move {
            let extension = ImageFormat::from_magic_bytes(&data)
                .map(|f| f.extension())
                .unwrap_or("bin");
            let part = Part::bytes(data)
                .file_name(format!("pasted.{extension}"))
                .mime_str(&mime_type)
                .map_err(|e| SyncError::UploadRejected(format!("bad mime type {mime_type}: {e}")))?;
            let form = Form::new().part("file", part);

            let response = self
                .client
                .post(self.url(IMAGES_PATH))
                .multipart(form)
                .send()
                .await
                .map_err(network)?;

            let status = response.status();
            if status.is_client_error() {
                let body = response.text().await.unwrap_or_default();
                return Err(SyncError::UploadRejected(format!("HTTP {status}: {body}")));
            }
            let body = Self::read_body(response, "image upload").await?;
            wire::parse_upload(&body)
        })
    }

    fn fetch_asset(&self, id: &AssetId) -> BoxFuture<'_, SyncResult<Vec<u8>>> {
        let url = self.asset_url(id);
        let what = format!("asset {id}");
        Box::pin(async move {
            let response = self.client.get(url).send().await.map_err(network)?;
            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Err(SyncError::NotFound(what));
            }
            if !status.is_success() {
                return Err(SyncError::NetworkFailure(format!("{what}: HTTP {status}")));
            }
            let bytes = response.bytes().await.map_err(network)?;
            Ok(bytes.to_vec())
        })
    }

    fn delete_asset(&self, id: &AssetId) -> BoxFuture<'_, SyncResult<()>> {
        let url = self.asset_url(id);
        let what = format!("asset {id}");
        Box::pin(async move {
            let response = self.client.delete(url).send().await.map_err(network)?;
            Self::read_body(response, &what).await?;
            Ok(())
        })
    }

    fn asset_url(&self, id: &AssetId) -> String {
        format!("{}{}?id={}", self.base_url, IMAGES_PATH, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let config = BackendConfig {
            base_url: "http://example.test:8080/".to_string(),
            ..BackendConfig::default()
        };
        let backend = HttpBackend::new(&config).unwrap();
        assert_eq!(backend.base_url(), "http://example.test:8080");
        assert_eq!(
            backend.asset_url(&AssetId::from_number(5)),
            "http://example.test:8080/api/images/image?id=5"
        );
        assert_eq!(
            backend.url(&wire::fetch_path(DocumentRef::page(1))),
            "http://example.test:8080/api/pages/get?id=1"
        );
    }
}
