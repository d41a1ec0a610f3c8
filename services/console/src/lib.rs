//! Guest Console - client library for the guest registry
//!
//! This library provides what a front end needs on top of the registry API:
//!
//! - A typed HTTP client for guest records and photo uploads
//! - A cached guest list patched in place after each mutation
//! - Photo loading that ignores results from superseded selections
//! - SVG business cards and guest listings for printing
//! - A small open/close state machine for modal overlays
//!
//! # Example
//!
//! ```rust,no_run
//! use guest_console::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ConsoleError> {
//!     let config = ConsoleConfig::load()?;
//!     let client = RegistryClient::new(&config)?;
//!
//!     let mut directory = GuestDirectory::new(client.clone());
//!     directory.refresh().await?;
//!
//!     let photos = PhotoLoader::new(client, config.default_asset.clone());
//!     if let Some(guest) = directory.guests().first() {
//!         let ticket = photos.select_guest(guest);
//!         let photo = photos.load(ticket).await.and_then(Result::ok);
//!         let card = business_card(guest, photo.as_ref());
//!         card.write_to(&card.file_name).await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod overlay;
pub mod photo;
pub mod sync;

// Re-export main types
pub use client::{AssetBytes, GuestForm, GuestView, PhotoUpload, RegistryClient};
pub use config::{ConfigError, ConsoleConfig};
pub use error::{ConsoleError, ConsoleResult};
pub use export::{business_card, guest_listing, ExportedDocument};
pub use overlay::{Overlay, OverlayAction, OverlayError, OverlayState};
pub use photo::{LoadedPhoto, PhotoLoader, PhotoSource, PhotoState, Ticket};
pub use sync::{GuestDirectory, LoadState};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::client::{GuestForm, GuestView, PhotoUpload, RegistryClient};
    pub use crate::config::ConsoleConfig;
    pub use crate::error::{ConsoleError, ConsoleResult};
    pub use crate::export::{business_card, guest_listing};
    pub use crate::photo::{PhotoLoader, PhotoSource};
    pub use crate::sync::{GuestDirectory, LoadState};
}
