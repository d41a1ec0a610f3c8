use std::fmt;
use thiserror::Error;

/// Visibility of a single modal overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayState {
    #[default]
    Closed,
    Opening,
    Open,
    Closing,
}

/// Requested overlay transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayAction {
    Open,
    Close,
    Settle,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OverlayError {
    #[error("Cannot {action} overlay while {from}")]
    InvalidTransition {
        from: OverlayState,
        action: OverlayAction,
    },
}

/// Open/close state machine owned by the component that shows the overlay.
///
/// `open` and `close` start an animated transition; `settle` finishes it.
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    state: OverlayState,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    /// Visible in any state but `Closed`
    pub fn is_visible(&self) -> bool {
        self.state != OverlayState::Closed
    }

    /// `Closed -> Opening`
    pub fn open(&mut self) -> Result<OverlayState, OverlayError> {
        self.transition(OverlayAction::Open)
    }

    /// `Opening | Open -> Closing`
    pub fn close(&mut self) -> Result<OverlayState, OverlayError> {
        self.transition(OverlayAction::Close)
    }

    /// `Opening -> Open`, `Closing -> Closed`
    pub fn settle(&mut self) -> Result<OverlayState, OverlayError> {
        self.transition(OverlayAction::Settle)
    }

    fn transition(&mut self, action: OverlayAction) -> Result<OverlayState, OverlayError> {
        let next = match (self.state, action) {
            (OverlayState::Closed, OverlayAction::Open) => OverlayState::Opening,
            (OverlayState::Opening | OverlayState::Open, OverlayAction::Close) => OverlayState::Closing,
            (OverlayState::Opening, OverlayAction::Settle) => OverlayState::Open,
            (OverlayState::Closing, OverlayAction::Settle) => OverlayState::Closed,
            (from, action) => return Err(OverlayError::InvalidTransition { from, action }),
        };

        self.state = next;
        Ok(next)
    }
}

impl fmt::Display for OverlayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OverlayState::Closed => "closed",
            OverlayState::Opening => "opening",
            OverlayState::Open => "open",
            OverlayState::Closing => "closing",
        };
        f.write_str(name)
    }
}

impl fmt::Display for OverlayAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OverlayAction::Open => "open",
            OverlayAction::Close => "close",
            OverlayAction::Settle => "settle",
        };
        f.write_str(name)
    }
}
