//! Local copy of the guest list.
//!
//! The directory loads the list once and then patches its copy from the
//! results of its own mutations instead of refetching.

use crate::client::{GuestForm, GuestView, RegistryClient};
use crate::error::{ConsoleError, ConsoleResult};
use tracing::{info, instrument, warn};

/// Where the cached list came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// No refresh has completed yet
    Loading,
    /// The cache mirrors the registry. May hold zero guests.
    Ready,
    /// The registry could not be reached; rows from an earlier refresh are kept
    Unreachable(String),
    /// The registry answered but the refresh failed; rows from an earlier refresh are kept
    Failed(String),
}

/// Cached guest list backed by a [`RegistryClient`]
#[derive(Debug)]
pub struct GuestDirectory {
    client: RegistryClient,
    guests: Vec<GuestView>,
    state: LoadState,
}

impl GuestDirectory {
    pub fn new(client: RegistryClient) -> Self {
        Self {
            client,
            guests: Vec::new(),
            state: LoadState::Loading,
        }
    }

    /// Replace the cache with the registry's current list.
    /// A 404 on the list counts as an empty registry.
    #[instrument(skip(self))]
    pub async fn refresh(&mut self) -> ConsoleResult<&[GuestView]> {
        match self.client.list().await {
            Ok(guests) => {
                self.guests = guests;
            }
            Err(e) if e.is_not_found() => {
                self.guests.clear();
            }
            Err(e) => {
                warn!(error = %e, "Failed to refresh guest list");
                self.state = LoadState::from(&e);
                return Err(e);
            }
        }

        self.state = LoadState::Ready;
        info!(count = self.guests.len(), "Guest list refreshed");
        Ok(&self.guests)
    }

    /// Create a guest and append it to the cache
    pub async fn create(&mut self, form: GuestForm) -> ConsoleResult<&GuestView> {
        let guest = self.client.create(form).await?;
        self.guests.push(guest);

        let index = self.guests.len() - 1;
        Ok(&self.guests[index])
    }

    /// Update a guest and replace its cached row
    pub async fn update(&mut self, id: &str, form: GuestForm) -> ConsoleResult<&GuestView> {
        let guest = self.client.update(id, form).await?;

        let index = match self.position(id) {
            Some(index) => {
                self.guests[index] = guest;
                index
            }
            None => {
                self.guests.push(guest);
                self.guests.len() - 1
            }
        };
        Ok(&self.guests[index])
    }

    /// Delete a guest and drop its cached row
    pub async fn delete(&mut self, id: &str) -> ConsoleResult<String> {
        let message = self.client.delete(id).await?;
        self.guests.retain(|guest| guest.id != id);
        Ok(message)
    }

    pub fn find(&self, id: &str) -> Option<&GuestView> {
        self.guests.iter().find(|guest| guest.id == id)
    }

    pub fn guests(&self) -> &[GuestView] {
        &self.guests
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    /// Loaded successfully and holds no guests
    pub fn is_empty(&self) -> bool {
        self.state == LoadState::Ready && self.guests.is_empty()
    }

    pub fn client(&self) -> &RegistryClient {
        &self.client
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.guests.iter().position(|guest| guest.id == id)
    }
}

impl LoadState {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, LoadState::Unreachable(_))
    }
}

impl From<&ConsoleError> for LoadState {
    fn from(error: &ConsoleError) -> Self {
        if error.is_retryable() {
            LoadState::Unreachable(error.to_string())
        } else {
            LoadState::Failed(error.to_string())
        }
    }
}
