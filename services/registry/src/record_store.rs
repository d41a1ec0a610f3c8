use crate::asset_manager::{AssetManager, AssetRef, Upload};
use crate::cleanup::CleanupQueue;
use crate::config::DatabaseConfig;
use crate::error::{RegistryError, RegistryResult};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, Row};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const GUEST_COLUMNS: &str =
    "id, name, email, address, phone, role, photo, created_at, updated_at";

/// A guest record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guest {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    /// Photo reference. Rows stored without one read back as the default avatar.
    pub photo: Option<AssetRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Guest {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let photo: Option<String> = row.try_get("photo")?;

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            address: row.try_get("address")?,
            phone: row.try_get("phone")?,
            role: row.try_get("role")?,
            photo: Some(AssetManager::resolve_for_read(photo.map(AssetRef::from).as_ref())),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Submitted guest fields. Absent fields are left unchanged on update.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GuestFields {
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
}

impl GuestFields {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: Some(email.into()),
            ..Self::default()
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// Validated column values for an insert or update
#[derive(Debug)]
struct GuestColumns {
    name: String,
    email: String,
    address: Option<String>,
    phone: Option<String>,
    role: Option<String>,
}

impl GuestColumns {
    fn for_create(fields: GuestFields) -> RegistryResult<Self> {
        Ok(Self {
            name: required(fields.name, "name")?,
            email: required(fields.email, "email")?,
            address: optional(fields.address),
            phone: optional(fields.phone),
            role: optional(fields.role),
        })
    }

    fn for_update(existing: &Guest, fields: GuestFields) -> RegistryResult<Self> {
        Ok(Self {
            name: match fields.name {
                Some(name) => required(Some(name), "name")?,
                None => existing.name.clone(),
            },
            email: match fields.email {
                Some(email) => required(Some(email), "email")?,
                None => existing.email.clone(),
            },
            address: fields.address.map_or_else(|| existing.address.clone(), |v| optional(Some(v))),
            phone: fields.phone.map_or_else(|| existing.phone.clone(), |v| optional(Some(v))),
            role: fields.role.map_or_else(|| existing.role.clone(), |v| optional(Some(v))),
        })
    }
}

fn required(value: Option<String>, field: &str) -> RegistryResult<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(RegistryError::validation(format!("{field} is required"))),
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Guest record store in SQLite.
///
/// Owns the guest rows and drives the photo side effects: new photos are
/// written before the row that points at them, and photos a row stops
/// pointing at go to the cleanup queue only after that row change commits.
pub struct RecordStore {
    pool: SqlitePool,
    assets: Arc<AssetManager>,
    cleanup: CleanupQueue,
}

impl RecordStore {
    /// Create a new record store with connection pool
    pub async fn new(
        config: &DatabaseConfig,
        assets: Arc<AssetManager>,
        cleanup: CleanupQueue,
    ) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .with_context(|| format!("Invalid database URL {}", config.url))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.connect_timeout());

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_with(options)
            .await
            .context("Failed to open SQLite database")?;

        info!(url = %config.url, "Connected to guest database");

        Ok(Self::from_pool(pool, assets, cleanup))
    }

    pub fn from_pool(pool: SqlitePool, assets: Arc<AssetManager>, cleanup: CleanupQueue) -> Self {
        Self {
            pool,
            assets,
            cleanup,
        }
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Create a guest, storing its photo first when one is supplied
    #[instrument(skip(self, fields, photo), fields(email = ?fields.email))]
    pub async fn create(&self, fields: GuestFields, photo: Option<Upload>) -> RegistryResult<Guest> {
        let columns = GuestColumns::for_create(fields)?;

        // Fast path for a friendly rejection. The UNIQUE constraint is what actually holds.
        if self.email_exists(&columns.email).await? {
            return Err(RegistryError::DuplicateKey);
        }

        let asset = match photo {
            Some(upload) => self.assets.store(&upload).await?,
            None => AssetRef::Default,
        };

        let now = Utc::now();
        let inserted = sqlx::query_as::<_, Guest>(&format!(
            r#"
            INSERT INTO guests (
                id, name, email, address, phone, role, photo, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {GUEST_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&columns.name)
        .bind(&columns.email)
        .bind(&columns.address)
        .bind(&columns.phone)
        .bind(&columns.role)
        .bind(asset.file_name())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(guest) => {
                info!(guest_id = %guest.id, photo = %asset, "Guest created");
                metrics::counter!("registry.guests.created").increment(1);
                Ok(guest)
            }
            Err(e) => {
                // Nothing points at the new photo
                self.cleanup.retire(Some(asset));
                Err(e.into())
            }
        }
    }

    /// Get all guests, oldest first
    #[instrument(skip(self))]
    pub async fn get_all(&self) -> RegistryResult<Vec<Guest>> {
        let guests = sqlx::query_as::<_, Guest>(&format!(
            "SELECT {GUEST_COLUMNS} FROM guests ORDER BY created_at ASC, rowid ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(guests)
    }

    /// Get a guest by ID. Malformed IDs are reported as not found.
    pub async fn get_by_id(&self, id: &str) -> RegistryResult<Guest> {
        let id = parse_id(id)?;

        let guest = sqlx::query_as::<_, Guest>(&format!("SELECT {GUEST_COLUMNS} FROM guests WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        guest.ok_or(RegistryError::NotFound)
    }

    /// Update a guest. A new photo replaces the old one, which is
    /// reclaimed only after the row points at the new file.
    #[instrument(skip(self, fields, photo), fields(has_photo = photo.is_some()))]
    pub async fn update(
        &self,
        id: &str,
        fields: GuestFields,
        photo: Option<Upload>,
    ) -> RegistryResult<Guest> {
        let existing = self.get_by_id(id).await?;
        let columns = GuestColumns::for_update(&existing, fields)?;

        let replacement = match photo {
            Some(upload) => Some(self.assets.replace(existing.photo.as_ref(), &upload).await?),
            None => None,
        };
        let photo = match &replacement {
            Some(replacement) => Some(replacement.current.clone()),
            None => existing.photo.clone(),
        };

        let updated = sqlx::query_as::<_, Guest>(&format!(
            r#"
            UPDATE guests
            SET name = ?, email = ?, address = ?, phone = ?, role = ?, photo = ?, updated_at = ?
            WHERE id = ?
            RETURNING {GUEST_COLUMNS}
            "#
        ))
        .bind(&columns.name)
        .bind(&columns.email)
        .bind(&columns.address)
        .bind(&columns.phone)
        .bind(&columns.role)
        .bind(photo.as_ref().map(AssetRef::file_name))
        .bind(Utc::now())
        .bind(existing.id)
        .fetch_optional(&self.pool)
        .await;

        match (updated, replacement) {
            (Ok(Some(guest)), replacement) => {
                if let Some(replacement) = replacement {
                    self.cleanup.retire(replacement.retired);
                }
                info!(guest_id = %guest.id, photo = ?guest.photo, "Guest updated");
                metrics::counter!("registry.guests.updated").increment(1);
                Ok(guest)
            }
            (Ok(None), replacement) => {
                // Deleted between read and write
                if let Some(replacement) = replacement {
                    self.cleanup.retire(Some(replacement.current));
                }
                Err(RegistryError::NotFound)
            }
            (Err(e), replacement) => {
                if let Some(replacement) = replacement {
                    self.cleanup.retire(Some(replacement.current));
                }
                Err(e.into())
            }
        }
    }

    /// Delete a guest and schedule its photo for cleanup
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> RegistryResult<()> {
        let id = parse_id(id)?;

        let photo = sqlx::query_scalar::<_, Option<String>>(
            "DELETE FROM guests WHERE id = ? RETURNING photo",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RegistryError::NotFound)?;

        let photo = photo.map(AssetRef::from);
        info!(guest_id = %id, photo = ?photo, "Guest deleted");
        metrics::counter!("registry.guests.deleted").increment(1);

        self.cleanup.retire(photo);
        Ok(())
    }

    /// Count live guests
    pub async fn count(&self) -> RegistryResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM guests")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Check database connectivity (for readiness checks)
    pub async fn ping(&self) -> RegistryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn email_exists(&self, email: &str) -> RegistryResult<bool> {
        let matches: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM guests WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        let exists = matches > 0;

        debug!(email = %email, exists, "Checked email uniqueness");
        Ok(exists)
    }

    pub fn assets(&self) -> &Arc<AssetManager> {
        &self.assets
    }

    pub fn cleanup(&self) -> &CleanupQueue {
        &self.cleanup
    }
}

fn parse_id(id: &str) -> RegistryResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| RegistryError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_manager::DEFAULT_ASSET;
    use crate::config::AssetConfig;
    use tempfile::TempDir;

    async fn store() -> (TempDir, RecordStore) {
        let dir = TempDir::new().unwrap();
        let assets = Arc::new(
            AssetManager::new(&AssetConfig::in_dir(dir.path().join("uploads")))
                .await
                .unwrap(),
        );
        let (cleanup, _handle) = CleanupQueue::spawn(Arc::clone(&assets));
        let records = RecordStore::new(
            &DatabaseConfig::sqlite_file(dir.path().join("guests.db")),
            assets,
            cleanup,
        )
        .await
        .unwrap();
        records.run_migrations().await.unwrap();
        (dir, records)
    }

    fn photo(bytes: &[u8]) -> Option<Upload> {
        Some(Upload::new(bytes.to_vec()).with_file_name("photo.png"))
    }

    /// Sorted file names in the upload directory
    fn files_in(records: &RecordStore) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(records.assets().root())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_required_fields_are_trimmed() {
        assert_eq!(required(Some("  Ada ".into()), "name").unwrap(), "Ada");
        assert!(required(Some("   ".into()), "name").is_err());
        assert!(required(None, "email").is_err());
        assert_eq!(optional(Some(" ".into())), None);
    }

    #[tokio::test]
    async fn test_create_without_photo_uses_default() {
        let (_dir, records) = store().await;

        let guest = records
            .create(GuestFields::new("Ada", "ada@x.com").with_role("Speaker"), None)
            .await
            .unwrap();

        assert_eq!(guest.photo, Some(AssetRef::Default));
        assert_eq!(guest.role.as_deref(), Some("Speaker"));
        assert_eq!(records.get_by_id(&guest.id.to_string()).await.unwrap(), guest);
    }

    #[tokio::test]
    async fn test_create_rejects_missing_fields_without_side_effects() {
        let (_dir, records) = store().await;

        let result = records
            .create(GuestFields { name: Some("Ada".into()), ..Default::default() }, photo(b"x"))
            .await;

        assert!(matches!(result, Err(RegistryError::Validation(_))));
        assert_eq!(records.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_email_leaves_store_unchanged() {
        let (_dir, records) = store().await;
        records.create(GuestFields::new("A", "a@x.com"), None).await.unwrap();

        let second = records.create(GuestFields::new("B", "a@x.com"), photo(b"b")).await;
        assert!(matches!(second, Err(RegistryError::DuplicateKey)));

        records.cleanup().flush().await;
        assert_eq!(files_in(&records), vec![DEFAULT_ASSET.to_string()]);
        assert_eq!(records.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_email_uniqueness_is_exact_match() {
        let (_dir, records) = store().await;
        records.create(GuestFields::new("A", "a@x.com"), None).await.unwrap();

        let other_case = records.create(GuestFields::new("C", "A@X.com"), None).await.unwrap();
        assert_eq!(other_case.email, "A@X.com");
        assert_eq!(records.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_creates_admit_one_email() {
        let (_dir, records) = store().await;
        let records = Arc::new(records);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let records = Arc::clone(&records);
                tokio::spawn(async move {
                    records
                        .create(GuestFields::new(format!("G{i}"), "race@x.com"), None)
                        .await
                })
            })
            .collect();

        let mut created = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(RegistryError::DuplicateKey) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(records.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_creates_reclaim_losing_photos() {
        let (_dir, records) = store().await;
        let records = Arc::new(records);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let records = Arc::clone(&records);
                tokio::spawn(async move {
                    records
                        .create(
                            GuestFields::new(format!("G{i}"), "race@x.com"),
                            photo(format!("photo-{i}").as_bytes()),
                        )
                        .await
                })
            })
            .collect();

        let mut winners = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(guest) => winners.push(guest),
                Err(RegistryError::DuplicateKey) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        records.cleanup().flush().await;

        assert_eq!(winners.len(), 1);
        let winner = winners[0].photo.clone().unwrap();
        assert!(winner.is_owned());

        let mut expected = vec![winner.file_name().to_string(), DEFAULT_ASSET.to_string()];
        expected.sort();
        assert_eq!(files_in(&records), expected);
    }

    #[tokio::test]
    async fn test_get_unknown_or_malformed_id_is_not_found() {
        let (_dir, records) = store().await;

        assert!(matches!(
            records.get_by_id(&Uuid::new_v4().to_string()).await,
            Err(RegistryError::NotFound)
        ));
        assert!(matches!(records.get_by_id("not-an-id").await, Err(RegistryError::NotFound)));
        assert!(records.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_photo_after_commit() {
        let (_dir, records) = store().await;
        let guest = records
            .create(GuestFields::new("Ada", "ada@x.com"), photo(b"old"))
            .await
            .unwrap();
        let old = guest.photo.clone().unwrap();

        let updated = records
            .update(
                &guest.id.to_string(),
                GuestFields { phone: Some("555".into()), ..Default::default() },
                photo(b"new"),
            )
            .await
            .unwrap();
        records.cleanup().flush().await;

        let new = updated.photo.clone().unwrap();
        assert_ne!(new, old);
        assert_eq!(updated.name, "Ada");
        assert_eq!(updated.phone.as_deref(), Some("555"));
        assert!(updated.updated_at >= guest.updated_at);
        assert!(!records.assets().exists(&old).await);
        assert!(records.assets().exists(&new).await);

        let mut expected = vec![new.file_name().to_string(), DEFAULT_ASSET.to_string()];
        expected.sort();
        assert_eq!(files_in(&records), expected);
    }

    #[tokio::test]
    async fn test_update_duplicate_email_reclaims_new_photo() {
        let (_dir, records) = store().await;
        let a = records
            .create(GuestFields::new("A", "a@x.com"), photo(b"a"))
            .await
            .unwrap();
        records.create(GuestFields::new("B", "b@x.com"), None).await.unwrap();

        let taken = records
            .update(
                &a.id.to_string(),
                GuestFields { email: Some("b@x.com".into()), ..Default::default() },
                photo(b"never-committed"),
            )
            .await;
        assert!(matches!(taken, Err(RegistryError::DuplicateKey)));
        records.cleanup().flush().await;

        let kept = a.photo.clone().unwrap();
        let mut expected = vec![kept.file_name().to_string(), DEFAULT_ASSET.to_string()];
        expected.sort();
        assert_eq!(files_in(&records), expected);
        assert_eq!(records.get_by_id(&a.id.to_string()).await.unwrap(), a);
    }

    #[tokio::test]
    async fn test_row_without_photo_reads_as_default() {
        let (_dir, records) = store().await;
        let now = Utc::now();
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO guests (id, name, email, photo, created_at, updated_at) VALUES (?, ?, ?, NULL, ?, ?)",
        )
        .bind(id)
        .bind("Old")
        .bind("old@x.com")
        .bind(now)
        .bind(now)
        .execute(&records.pool)
        .await
        .unwrap();

        let guest = records.get_by_id(&id.to_string()).await.unwrap();
        assert_eq!(guest.photo, Some(AssetRef::Default));

        records.delete(&id.to_string()).await.unwrap();
        records.cleanup().flush().await;
        assert!(records.assets().exists(&AssetRef::Default).await);
    }

    #[tokio::test]
    async fn test_update_without_photo_keeps_asset() {
        let (_dir, records) = store().await;
        let guest = records
            .create(GuestFields::new("Ada", "ada@x.com"), photo(b"keep"))
            .await
            .unwrap();

        let updated = records
            .update(&guest.id.to_string(), GuestFields { name: Some("Ada L.".into()), ..Default::default() }, None)
            .await
            .unwrap();
        records.cleanup().flush().await;

        assert_eq!(updated.photo, guest.photo);
        assert!(records.assets().exists(guest.photo.as_ref().unwrap()).await);
    }

    #[tokio::test]
    async fn test_update_from_default_never_removes_default() {
        let (_dir, records) = store().await;
        let guest = records.create(GuestFields::new("Ada", "ada@x.com"), None).await.unwrap();

        records
            .update(&guest.id.to_string(), GuestFields::default(), photo(b"first"))
            .await
            .unwrap();
        records.cleanup().flush().await;

        assert!(records.assets().exists(&AssetRef::Default).await);
    }

    #[tokio::test]
    async fn test_update_errors() {
        let (_dir, records) = store().await;
        let a = records.create(GuestFields::new("A", "a@x.com"), None).await.unwrap();
        records.create(GuestFields::new("B", "b@x.com"), None).await.unwrap();

        let missing = records
            .update(&Uuid::new_v4().to_string(), GuestFields::default(), None)
            .await;
        assert!(matches!(missing, Err(RegistryError::NotFound)));

        let blank = records
            .update(&a.id.to_string(), GuestFields { name: Some(" ".into()), ..Default::default() }, None)
            .await;
        assert!(matches!(blank, Err(RegistryError::Validation(_))));

        let taken = records
            .update(&a.id.to_string(), GuestFields { email: Some("b@x.com".into()), ..Default::default() }, None)
            .await;
        assert!(matches!(taken, Err(RegistryError::DuplicateKey)));
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_owned_photo() {
        let (_dir, records) = store().await;
        let guest = records
            .create(GuestFields::new("Ada", "ada@x.com"), photo(b"bye"))
            .await
            .unwrap();
        let asset = guest.photo.clone().unwrap();

        records.delete(&guest.id.to_string()).await.unwrap();
        records.cleanup().flush().await;

        assert!(!records.assets().exists(&asset).await);
        assert!(matches!(
            records.delete(&guest.id.to_string()).await,
            Err(RegistryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_keeps_shared_default() {
        let (_dir, records) = store().await;
        let a = records.create(GuestFields::new("A", "a@x.com"), None).await.unwrap();
        records.create(GuestFields::new("B", "b@x.com"), None).await.unwrap();

        records.delete(&a.id.to_string()).await.unwrap();
        records.cleanup().flush().await;

        assert!(records.assets().exists(&AssetRef::Default).await);
        assert_eq!(records.count().await.unwrap(), 1);
    }
}
