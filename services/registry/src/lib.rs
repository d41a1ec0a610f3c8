//! Guest Registry Service
//!
//! Keeps guest records and the photo each guest points at. Records live in
//! SQLite, photos live as plain files in an upload directory that is also
//! served over HTTP.
//!
//! ## Features
//!
//! - **Guest Records**: Create, list, fetch, partially update and delete guests,
//!   with email uniqueness enforced by the database
//! - **Photo Assets**: Uploaded photos get collision-free file names; guests
//!   without a photo share a default avatar that is never deleted
//! - **Deferred Cleanup**: Replaced or orphaned photos are reclaimed on a
//!   background worker after the owning row change commits
//! - **Static Uploads**: Photos are served under `/uploads` with a cross-origin
//!   resource policy so browsers can draw them onto export canvases
//!
//! ## Architecture
//!
//! ```text
//!   HTTP clients
//!        │
//!        ▼
//! ┌──────────────┐   /uploads    ┌──────────────┐
//! │ API          │──────────────▶│ Upload dir   │
//! │ Gateway      │               │ (photos)     │
//! └──────────────┘               └──────────────┘
//!        │                          ▲        ▲
//!        ▼                          │ store  │ delete
//! ┌──────────────┐           ┌──────────────┐│
//! │ Record       │──────────▶│ Asset        ││
//! │ Store        │           │ Manager      ││
//! └──────────────┘           └──────────────┘│
//!        │     │                             │
//!        │     │ retire      ┌──────────────┐│
//!        │     └────────────▶│ Cleanup      │┘
//!        ▼                   │ Worker       │
//! ┌──────────────┐           └──────────────┘
//! │ SQLite       │
//! │ guests       │
//! └──────────────┘
//! ```

pub mod api;
pub mod asset_manager;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod record_store;

pub use api::{create_router, start_api_server, AppState, GuestResponse, MessageResponse};
pub use asset_manager::{AssetManager, AssetRef, Replacement, Upload, DEFAULT_ASSET};
pub use cleanup::CleanupQueue;
pub use config::Config;
pub use error::{RegistryError, RegistryResult};
pub use record_store::{Guest, GuestFields, RecordStore};
