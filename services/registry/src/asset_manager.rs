use crate::config::AssetConfig;
use crate::error::{RegistryError, RegistryResult};
use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Reserved file name of the shared placeholder photo
pub const DEFAULT_ASSET: &str = "default-avatar.png";

const DEFAULT_ASSET_BYTES: &[u8] = include_bytes!("../assets/default-avatar.png");

/// A guest's pointer to a photo asset
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssetRef {
    /// The shared placeholder. Never deleted.
    Default,
    /// A file owned by exactly one guest
    Stored(String),
}

impl AssetRef {
    pub fn file_name(&self) -> &str {
        match self {
            AssetRef::Default => DEFAULT_ASSET,
            AssetRef::Stored(name) => name,
        }
    }

    /// Whether the referenced file belongs to a single guest and may be reclaimed
    pub fn is_owned(&self) -> bool {
        matches!(self, AssetRef::Stored(_))
    }
}

impl From<String> for AssetRef {
    fn from(name: String) -> Self {
        if name == DEFAULT_ASSET {
            AssetRef::Default
        } else {
            AssetRef::Stored(name)
        }
    }
}

impl From<AssetRef> for String {
    fn from(asset: AssetRef) -> Self {
        match asset {
            AssetRef::Default => DEFAULT_ASSET.to_string(),
            AssetRef::Stored(name) => name,
        }
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Photo bytes decoded from a request
#[derive(Debug, Clone)]
pub struct Upload {
    /// File name as sent by the client, only used for its extension
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl Upload {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: None,
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Outcome of [`AssetManager::replace`]
///
/// `retired` must only be handed to cleanup after the guest row points at `current`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub current: AssetRef,
    pub retired: Option<AssetRef>,
}

/// Filesystem store for guest photos
#[derive(Debug)]
pub struct AssetManager {
    root: PathBuf,
    max_upload_bytes: usize,
}

impl AssetManager {
    /// Open the upload directory, creating it and the default avatar when missing
    pub async fn new(config: &AssetConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.upload_dir)
            .await
            .with_context(|| format!("Failed to create upload directory {}", config.upload_dir.display()))?;

        let manager = Self {
            root: config.upload_dir.clone(),
            max_upload_bytes: config.max_upload_bytes,
        };

        let default_path = manager.path_of(&AssetRef::Default);
        if !tokio::fs::try_exists(&default_path).await.unwrap_or(false) {
            tokio::fs::write(&default_path, DEFAULT_ASSET_BYTES)
                .await
                .context("Failed to seed default avatar")?;
            info!(path = %default_path.display(), "Seeded default avatar");
        }

        info!(
            upload_dir = %manager.root.display(),
            max_upload_bytes = manager.max_upload_bytes,
            "Asset manager initialized"
        );

        Ok(manager)
    }

    /// Generate a fresh asset file name
    /// Format: {unix_millis}-{uuid}.{ext}
    ///
    /// The client file name only contributes a sanitised extension, so nothing
    /// it sends can become a path component.
    pub fn generate_file_name(upload: &Upload) -> String {
        let ext = upload
            .file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(sanitize_extension)
            .filter(|ext| !ext.is_empty())
            .or_else(|| {
                upload
                    .content_type
                    .as_deref()
                    .and_then(extension_for_content_type)
                    .map(str::to_string)
            });

        let stem = format!("{}-{}", Utc::now().timestamp_millis(), Uuid::new_v4());
        match ext {
            Some(ext) => format!("{stem}.{ext}"),
            None => stem,
        }
    }

    /// Persist bytes under a fresh file name
    #[instrument(skip(self, upload), fields(size_bytes = upload.bytes.len()))]
    pub async fn store(&self, upload: &Upload) -> RegistryResult<AssetRef> {
        if upload.bytes.is_empty() {
            return Err(RegistryError::validation("Uploaded photo is empty"));
        }
        if upload.bytes.len() > self.max_upload_bytes {
            return Err(RegistryError::validation(format!(
                "Uploaded photo exceeds maximum size of {} bytes",
                self.max_upload_bytes
            )));
        }

        let file_name = Self::generate_file_name(upload);
        let final_path = self.root.join(&file_name);
        let partial_path = self.root.join(format!(".{file_name}.part"));

        // Write beside the target and rename so readers never see a partial file
        tokio::fs::write(&partial_path, &upload.bytes).await?;
        if let Err(e) = tokio::fs::rename(&partial_path, &final_path).await {
            let _ = tokio::fs::remove_file(&partial_path).await;
            return Err(e.into());
        }

        info!(file_name = %file_name, size_bytes = upload.bytes.len(), "Photo stored");
        metrics::counter!("registry.assets.stored").increment(1);

        Ok(AssetRef::Stored(file_name))
    }

    /// Store the new photo and report which previous asset it retires
    pub async fn replace(&self, old: Option<&AssetRef>, upload: &Upload) -> RegistryResult<Replacement> {
        let current = self.store(upload).await?;
        let retired = old.filter(|asset| asset.is_owned()).cloned();

        debug!(current = %current, retired = ?retired, "Photo replaced");

        Ok(Replacement { current, retired })
    }

    /// Remove an owned asset. The default avatar and missing files are left alone.
    #[instrument(skip(self))]
    pub async fn delete(&self, asset: Option<&AssetRef>) -> RegistryResult<()> {
        let Some(AssetRef::Stored(file_name)) = asset else {
            return Ok(());
        };

        if !is_safe_file_name(file_name) {
            warn!(file_name = %file_name, "Refusing to delete asset outside upload directory");
            return Ok(());
        }

        match tokio::fs::remove_file(self.root.join(file_name)).await {
            Ok(()) => {
                debug!(file_name = %file_name, "Photo deleted");
                metrics::counter!("registry.assets.deleted").increment(1);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(file_name = %file_name, "Photo already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The reference a reader should fetch: the placeholder stands in for a missing photo
    pub fn resolve_for_read(asset: Option<&AssetRef>) -> AssetRef {
        asset.cloned().unwrap_or(AssetRef::Default)
    }

    pub fn path_of(&self, asset: &AssetRef) -> PathBuf {
        self.root.join(asset.file_name())
    }

    /// Check if an asset file is present on disk
    pub async fn exists(&self, asset: &AssetRef) -> bool {
        is_safe_file_name(asset.file_name())
            && tokio::fs::try_exists(self.path_of(asset)).await.unwrap_or(false)
    }

    /// Get the upload directory (for static file serving)
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Keep only lowercase ASCII alphanumerics of an extension
fn sanitize_extension(ext: &str) -> String {
    ext.chars()
        .filter(char::is_ascii_alphanumeric)
        .take(8)
        .collect::<String>()
        .to_lowercase()
}

fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains(|c| c == '/' || c == '\\')
}

/// Get file extension for an image content type
fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    match content_type.to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/bmp" => Some("bmp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}
