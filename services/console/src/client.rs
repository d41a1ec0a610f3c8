//! HTTP client for the guest registry API.

use crate::config::ConsoleConfig;
use crate::error::{ConsoleError, ConsoleResult};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, instrument, warn};

/// A guest as returned by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestView {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// Photo file name, `None` for guests stored before photos existed
    #[serde(default)]
    pub photo: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Photo file to send with a create or update
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl PhotoUpload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Read a photo chosen from the local filesystem
    pub async fn from_path(path: impl AsRef<Path>) -> ConsoleResult<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("photo")
            .to_string();

        Ok(Self::new(file_name, bytes))
    }
}

/// Guest form contents. Unset fields are not sent, which leaves them
/// unchanged on update.
#[derive(Debug, Clone, Default)]
pub struct GuestForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub photo: Option<PhotoUpload>,
}

impl GuestForm {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: Some(email.into()),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn photo(mut self, photo: PhotoUpload) -> Self {
        self.photo = Some(photo);
        self
    }

    fn into_multipart(self) -> ConsoleResult<Form> {
        let mut form = Form::new();

        for (key, value) in [
            ("name", self.name),
            ("email", self.email),
            ("address", self.address),
            ("phone", self.phone),
            ("role", self.role),
        ] {
            if let Some(value) = value {
                form = form.text(key, value);
            }
        }

        if let Some(photo) = self.photo {
            let mut part = Part::bytes(photo.bytes.to_vec()).file_name(photo.file_name);
            if let Some(content_type) = photo.content_type {
                part = part
                    .mime_str(&content_type)
                    .map_err(|e| ConsoleError::Decode(format!("Invalid photo content type: {e}")))?;
            }
            form = form.part("photo", part);
        }

        Ok(form)
    }
}

/// Raw photo bytes fetched from `/uploads`
#[derive(Debug, Clone)]
pub struct AssetBytes {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

#[derive(Deserialize)]
struct GuestEnvelope {
    user: GuestView,
}

#[derive(Deserialize)]
struct MessageEnvelope {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    message: Option<String>,
    error_message: Option<String>,
}

/// Client for the guest registry
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: Client,
    base_url: String,
}

impl RegistryClient {
    /// Create a new client from configuration. Requests use the
    /// transport's own timeouts.
    pub fn new(config: &ConsoleConfig) -> ConsoleResult<Self> {
        config.validate()?;

        Ok(Self {
            http: Client::new(),
            base_url: config.base().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Public URL of an uploaded photo
    pub fn asset_url(&self, file_name: &str) -> String {
        format!("{}/uploads/{}", self.base_url, file_name)
    }

    /// Fetch all guests
    #[instrument(skip(self))]
    pub async fn list(&self) -> ConsoleResult<Vec<GuestView>> {
        let response = self.http.get(self.url("/users")).send().await?;
        let guests: Vec<GuestView> = decode(response).await?;

        debug!(count = guests.len(), "Fetched guest list");
        Ok(guests)
    }

    /// Fetch a single guest
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> ConsoleResult<GuestView> {
        let response = self.http.get(self.url(&format!("/user/{id}"))).send().await?;
        decode(response).await
    }

    /// Create a guest
    #[instrument(skip(self, form), fields(email = ?form.email))]
    pub async fn create(&self, form: GuestForm) -> ConsoleResult<GuestView> {
        let response = self
            .http
            .post(self.url("/user"))
            .multipart(form.into_multipart()?)
            .send()
            .await?;

        let envelope: GuestEnvelope = decode(response).await?;
        debug!(guest_id = %envelope.user.id, "Guest created");
        Ok(envelope.user)
    }

    /// Update a guest with the fields set on `form`
    #[instrument(skip(self, form))]
    pub async fn update(&self, id: &str, form: GuestForm) -> ConsoleResult<GuestView> {
        let response = self
            .http
            .put(self.url(&format!("/user/{id}")))
            .multipart(form.into_multipart()?)
            .send()
            .await?;

        let envelope: GuestEnvelope = decode(response).await?;
        Ok(envelope.user)
    }

    /// Delete a guest, returning the registry's confirmation message
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> ConsoleResult<String> {
        let response = self
            .http
            .delete(self.url(&format!("/delete/user/{id}")))
            .send()
            .await?;

        let envelope: MessageEnvelope = decode(response).await?;
        Ok(envelope.message)
    }

    /// Download a photo by file name
    #[instrument(skip(self))]
    pub async fn fetch_asset(&self, file_name: &str) -> ConsoleResult<AssetBytes> {
        let response = self.http.get(self.asset_url(file_name)).send().await?;
        let response = check(response).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;

        debug!(file_name, size_bytes = bytes.len(), "Fetched photo");
        Ok(AssetBytes { bytes, content_type })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turn a non-success response into [`ConsoleError::Rejected`]
async fn check(response: Response) -> ConsoleResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message.or(body.error_message))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });

    warn!(status = status.as_u16(), message = %message, "Registry rejected request");
    Err(ConsoleError::Rejected {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> ConsoleResult<T> {
    let response = check(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| ConsoleError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_view_accepts_registry_shape() {
        let json = r#"{
            "_id": "6f1c1e0e-6b7a-4a39-9d59-0d9f3b0f2a11",
            "name": "Ada",
            "email": "ada@x.com",
            "address": null,
            "phone": "555",
            "role": null,
            "photo": "default-avatar.png",
            "createdAt": "2024-05-01T10:00:00Z",
            "updatedAt": "2024-05-01T10:00:00Z"
        }"#;

        let guest: GuestView = serde_json::from_str(json).unwrap();
        assert_eq!(guest.name, "Ada");
        assert_eq!(guest.photo.as_deref(), Some("default-avatar.png"));
        assert!(guest.updated_at.is_some());
    }

    #[test]
    fn test_guest_view_tolerates_missing_optional_fields() {
        let json = r#"{"_id": "1", "name": "Bo", "email": "bo@x.com", "createdAt": "2024-05-01T10:00:00Z"}"#;

        let guest: GuestView = serde_json::from_str(json).unwrap();
        assert_eq!(guest.photo, None);
        assert_eq!(guest.address, None);
    }

    #[test]
    fn test_asset_url() {
        let client = RegistryClient::new(&ConsoleConfig::new("http://localhost:3001/")).unwrap();
        assert_eq!(
            client.asset_url("a.png"),
            "http://localhost:3001/uploads/a.png"
        );
    }

    #[test]
    fn test_client_rejects_invalid_config() {
        let result = RegistryClient::new(&ConsoleConfig::new("localhost"));
        assert!(matches!(result, Err(ConsoleError::Config(_))));
    }

    #[tokio::test]
    async fn test_photo_upload_from_path_uses_file_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("me.jpg");
        tokio::fs::write(&path, b"jpeg").await.unwrap();

        let upload = PhotoUpload::from_path(&path).await.unwrap();
        assert_eq!(upload.file_name, "me.jpg");
        assert_eq!(&upload.bytes[..], b"jpeg");
    }
}
