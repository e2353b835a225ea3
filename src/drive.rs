use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::DriveConfig;
use crate::error::CatalogError;
use crate::photo::PhotoSource;

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Remote photo storage. Both operations may be slow and may fail; neither is
/// ever asked to delete anything.
#[async_trait]
pub trait DriveClient: Send + Sync {
    async fn find_or_create_folder(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<String, CatalogError>;

    async fn upload_file(
        &self,
        photo: &PhotoSource,
        folder_id: &str,
    ) -> Result<String, CatalogError>;
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileRef {
    id: String,
    #[serde(default)]
    web_view_link: Option<String>,
}

/// Google Drive v3 REST client.
#[derive(Clone)]
pub struct DriveHttpClient {
    client: Client,
    api_base: String,
    upload_base: String,
    token: Option<String>,
}

impl DriveHttpClient {
    pub fn new(config: &DriveConfig) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("moth-cat/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CatalogError::DriveHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| CatalogError::DriveHttp(err.to_string()))?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
            token: config.token(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send_with_retries<F>(
        &self,
        replay: Replay,
        make_req: F,
    ) -> Result<Response, CatalogError>
    where
        F: Fn() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match self.authorized(make_req()).send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && replay.retries_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                        continue;
                    }
                    return Self::handle_status(resp).await;
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && replay.retries_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(CatalogError::DriveHttp(err.to_string()));
                }
            }
        }
    }

    async fn handle_status(response: Response) -> Result<Response, CatalogError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "drive request failed".to_string());
        Err(CatalogError::DriveStatus { status, message })
    }

    async fn find_folder(&self, parent_id: &str, name: &str) -> Result<Option<String>, CatalogError> {
        let url = format!("{}/files", self.api_base);
        let query = folder_query(parent_id, name);
        let response = self
            .send_with_retries(Replay::Always, || {
                self.client.get(&url).query(&[
                    ("q", query.as_str()),
                    ("fields", "files(id,name)"),
                    ("pageSize", "1"),
                ])
            })
            .await?;
        let list: FileList = response
            .json()
            .await
            .map_err(|err| CatalogError::DriveHttp(err.to_string()))?;
        Ok(list.files.into_iter().next().map(|file| file.id))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, CatalogError> {
        let url = format!("{}/files", self.api_base);
        let body = json!({
            "name": name,
            "mimeType": FOLDER_MIME,
            "parents": [parent_id],
        });
        let response = self
            .send_with_retries(Replay::Unsent, || {
                self.client
                    .post(&url)
                    .query(&[("fields", "id")])
                    .json(&body)
            })
            .await?;
        let created: FileRef = response
            .json()
            .await
            .map_err(|err| CatalogError::DriveHttp(err.to_string()))?;
        Ok(created.id)
    }
}

#[async_trait]
impl DriveClient for DriveHttpClient {
    async fn find_or_create_folder(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<String, CatalogError> {
        if let Some(id) = self.find_folder(parent_id, name).await? {
            debug!(parent_id, name, folder_id = %id, "found existing folder");
            return Ok(id);
        }
        let id = self.create_folder(parent_id, name).await?;
        info!(parent_id, name, folder_id = %id, "created folder");
        Ok(id)
    }

    async fn upload_file(
        &self,
        photo: &PhotoSource,
        folder_id: &str,
    ) -> Result<String, CatalogError> {
        let url = format!("{}/files", self.upload_base);
        let content = photo.bytes().await?;
        let boundary = format!("moth-cat-{}", uuid::Uuid::new_v4().simple());
        let metadata = json!({
            "name": photo.name,
            "parents": [folder_id],
        });
        let body = multipart_related(&boundary, &metadata, &photo.mime_type, &content);
        let content_type = format!("multipart/related; boundary={boundary}");

        let response = self
            .send_with_retries(Replay::Unsent, || {
                self.client
                    .post(&url)
                    .query(&[("uploadType", "multipart"), ("fields", "id,webViewLink")])
                    .header(CONTENT_TYPE, content_type.as_str())
                    .body(body.clone())
            })
            .await?;
        let uploaded: FileRef = response
            .json()
            .await
            .map_err(|err| CatalogError::DriveHttp(err.to_string()))?;
        info!(name = %photo.name, folder_id, file_id = %uploaded.id, "uploaded photo");
        Ok(uploaded
            .web_view_link
            .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", uploaded.id)))
    }
}

fn folder_query(parent_id: &str, name: &str) -> String {
    format!(
        "name = '{}' and '{}' in parents and mimeType = '{FOLDER_MIME}' and trashed = false",
        escape_query_literal(name),
        escape_query_literal(parent_id),
    )
}

fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn multipart_related(
    boundary: &str,
    metadata: &serde_json::Value,
    mime_type: &str,
    content: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 512);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("--{boundary}\r\nContent-Type: {mime_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

/// When a failed request may be sent again. Creating requests are only
/// replayed when the server cannot have applied them, since a replay after a
/// timeout or 5xx could leave a duplicate folder or file behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    Always,
    Unsent,
}

impl Replay {
    fn retries_status(self, status: u16) -> bool {
        match self {
            Replay::Always => matches!(status, 429 | 500 | 502 | 503 | 504),
            Replay::Unsent => status == 429,
        }
    }

    fn retries_error(self, err: &reqwest::Error) -> bool {
        match self {
            Replay::Always => err.is_timeout() || err.is_connect() || err.is_request(),
            Replay::Unsent => err.is_connect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_escapes_quotes() {
        let query = folder_query("root", "O'Brien's moth");
        assert!(query.starts_with(r"name = 'O\'Brien\'s moth' and 'root' in parents"));
    }

    #[test]
    fn creating_requests_replay_only_on_rate_limit() {
        assert!(Replay::Always.retries_status(503));
        assert!(Replay::Unsent.retries_status(429));
        assert!(!Replay::Unsent.retries_status(503));
        assert!(!Replay::Unsent.retries_status(500));
    }

    #[test]
    fn multipart_body_layout() {
        let body = multipart_related("b", &json!({"name": "a.jpg"}), "image/jpeg", b"DATA");
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("--b\r\nContent-Type: application/json"));
        assert!(text.contains("Content-Type: image/jpeg\r\n\r\nDATA\r\n--b--\r\n"));
    }
}
