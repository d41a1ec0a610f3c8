//! Photo loading for previews and exports.
//!
//! Each [`PhotoLoader::select`] starts a new generation. A fetch that finishes
//! after a newer selection is dropped instead of overwriting the newer state.
//! The fetch itself is not aborted.

use crate::client::{GuestView, RegistryClient};
use crate::error::ConsoleResult;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, instrument, warn};

/// Where photo bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoSource {
    /// A file served by the registry under `/uploads`
    Remote(String),
    /// A file picked locally, previewed before upload
    Local(PathBuf),
}

impl PhotoSource {
    /// Remote source for a guest, falling back to the default avatar
    pub fn for_guest(guest: &GuestView, default_asset: &str) -> Self {
        let file_name = guest
            .photo
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(default_asset);
        PhotoSource::Remote(file_name.to_string())
    }
}

/// Handle for one selection, passed back to [`PhotoLoader::load`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub generation: u64,
    pub source: PhotoSource,
}

/// Photo bytes ready for rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPhoto {
    pub generation: u64,
    pub mime: String,
    pub bytes: Bytes,
}

impl LoadedPhoto {
    /// Inline `data:` URI for embedding into documents
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }
}

/// Current loader state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoState {
    Idle,
    Pending { generation: u64 },
    Ready(LoadedPhoto),
    Failed { generation: u64, reason: String },
}

/// Loads one photo at a time for the selected guest
#[derive(Debug)]
pub struct PhotoLoader {
    client: RegistryClient,
    default_asset: String,
    generation: AtomicU64,
    state: RwLock<PhotoState>,
}

impl PhotoLoader {
    pub fn new(client: RegistryClient, default_asset: impl Into<String>) -> Self {
        Self {
            client,
            default_asset: default_asset.into(),
            generation: AtomicU64::new(0),
            state: RwLock::new(PhotoState::Idle),
        }
    }

    /// Start a new selection, superseding any in-flight load
    pub fn select(&self, source: PhotoSource) -> Ticket {
        let mut state = self.state.write();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *state = PhotoState::Pending { generation };

        debug!(generation, source = ?source, "Photo selected");
        Ticket { generation, source }
    }

    /// Select the photo of a guest
    pub fn select_guest(&self, guest: &GuestView) -> Ticket {
        self.select(PhotoSource::for_guest(guest, &self.default_asset))
    }

    /// Fetch the ticket's photo. Returns `None` when a newer selection was
    /// made while fetching; the result is then discarded.
    #[instrument(skip(self, ticket), fields(generation = ticket.generation))]
    pub async fn load(&self, ticket: Ticket) -> Option<ConsoleResult<LoadedPhoto>> {
        let fetched = self.fetch(&ticket.source).await;

        let mut state = self.state.write();
        if self.generation.load(Ordering::SeqCst) != ticket.generation {
            debug!("Discarding stale photo load");
            return None;
        }

        match fetched {
            Ok((bytes, hint)) => {
                let photo = LoadedPhoto {
                    generation: ticket.generation,
                    mime: sniff_mime(&bytes, hint.as_deref()).to_string(),
                    bytes,
                };
                *state = PhotoState::Ready(photo.clone());
                Some(Ok(photo))
            }
            Err(e) => {
                warn!(error = %e, "Photo load failed");
                *state = PhotoState::Failed {
                    generation: ticket.generation,
                    reason: e.to_string(),
                };
                Some(Err(e))
            }
        }
    }

    /// Select and load in one step
    pub async fn select_and_load(&self, source: PhotoSource) -> Option<ConsoleResult<LoadedPhoto>> {
        let ticket = self.select(source);
        self.load(ticket).await
    }

    pub fn state(&self) -> PhotoState {
        self.state.read().clone()
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// The loaded photo, if the current selection finished successfully
    pub fn current(&self) -> Option<LoadedPhoto> {
        match &*self.state.read() {
            PhotoState::Ready(photo) => Some(photo.clone()),
            _ => None,
        }
    }

    async fn fetch(&self, source: &PhotoSource) -> ConsoleResult<(Bytes, Option<String>)> {
        match source {
            PhotoSource::Remote(file_name) => {
                let asset = self.client.fetch_asset(file_name).await?;
                Ok((asset.bytes, asset.content_type))
            }
            PhotoSource::Local(path) => {
                let bytes = tokio::fs::read(path).await?;
                Ok((Bytes::from(bytes), None))
            }
        }
    }
}

/// Detect an image type from magic bytes, then from the served content type
pub fn sniff_mime(bytes: &[u8], hint: Option<&str>) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else if bytes.starts_with(b"BM") {
        "image/bmp"
    } else {
        match hint.map(|h| h.split(';').next().unwrap_or(h).trim()) {
            Some("image/png") => "image/png",
            Some("image/jpeg") => "image/jpeg",
            Some("image/gif") => "image/gif",
            Some("image/webp") => "image/webp",
            Some("image/bmp") => "image/bmp",
            Some("image/svg+xml") => "image/svg+xml",
            _ => "application/octet-stream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConsoleConfig;
    use tempfile::TempDir;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn loader() -> PhotoLoader {
        let client = RegistryClient::new(&ConsoleConfig::default()).unwrap();
        PhotoLoader::new(client, "default-avatar.png")
    }

    fn guest(photo: Option<&str>) -> GuestView {
        serde_json::from_value(serde_json::json!({
            "_id": "1",
            "name": "Ada",
            "email": "ada@x.com",
            "photo": photo,
            "createdAt": "2024-05-01T10:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn test_missing_photo_resolves_to_default() {
        assert_eq!(
            PhotoSource::for_guest(&guest(None), "default-avatar.png"),
            PhotoSource::Remote("default-avatar.png".to_string())
        );
        assert_eq!(
            PhotoSource::for_guest(&guest(Some("1-a.png")), "default-avatar.png"),
            PhotoSource::Remote("1-a.png".to_string())
        );
    }

    #[test]
    fn test_sniff_mime() {
        assert_eq!(sniff_mime(PNG_HEADER, None), "image/png");
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0], None), "image/jpeg");
        assert_eq!(sniff_mime(b"RIFF\0\0\0\0WEBPVP8 ", None), "image/webp");
        assert_eq!(sniff_mime(b"??", Some("image/gif; charset=binary")), "image/gif");
        assert_eq!(sniff_mime(b"??", None), "application/octet-stream");
    }

    #[test]
    fn test_data_uri() {
        let photo = LoadedPhoto {
            generation: 1,
            mime: "image/png".to_string(),
            bytes: Bytes::from_static(b"hi"),
        };
        assert_eq!(photo.data_uri(), "data:image/png;base64,aGk=");
    }

    #[test]
    fn test_select_increments_generation() {
        let loader = loader();
        assert_eq!(loader.state(), PhotoState::Idle);

        let first = loader.select(PhotoSource::Remote("a.png".into()));
        let second = loader.select(PhotoSource::Remote("b.png".into()));

        assert!(second.generation > first.generation);
        assert_eq!(loader.current_generation(), second.generation);
        assert_eq!(
            loader.state(),
            PhotoState::Pending {
                generation: second.generation
            }
        );
    }

    #[tokio::test]
    async fn test_stale_completion_is_discarded() {
        let dir = TempDir::new().unwrap();
        let old_path = dir.path().join("old.png");
        let new_path = dir.path().join("new.jpg");
        tokio::fs::write(&old_path, PNG_HEADER).await.unwrap();
        tokio::fs::write(&new_path, [0xFF, 0xD8, 0xFF, 0xDB]).await.unwrap();

        let loader = loader();
        let stale = loader.select(PhotoSource::Local(old_path));
        let fresh = loader.select(PhotoSource::Local(new_path));

        let loaded = loader.load(fresh.clone()).await.unwrap().unwrap();
        assert_eq!(loaded.mime, "image/jpeg");

        assert!(loader.load(stale).await.is_none());
        assert_eq!(loader.current().unwrap().generation, fresh.generation);
    }

    #[tokio::test]
    async fn test_missing_local_file_fails_current_selection() {
        let dir = TempDir::new().unwrap();
        let loader = loader();

        let result = loader
            .select_and_load(PhotoSource::Local(dir.path().join("missing.png")))
            .await
            .unwrap();

        assert!(result.is_err());
        assert!(matches!(loader.state(), PhotoState::Failed { .. }));
        assert!(loader.current().is_none());
    }
}
