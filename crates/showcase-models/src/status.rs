//! Session status state machine.
//!
//! ```text
//! queued -> downloading -> processing -> ready -> generating_slideshow -> ready
//!    \__________________/
//! ```
//!
//! `downloading` only applies to remote sources; uploads go straight from
//! `queued` to `processing`. `failed` is reachable from every non-terminal
//! state. A redelivered ingestion job may restart from `downloading` or
//! `processing`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModelError, ModelResult};

/// Processing status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Waiting for a worker
    #[default]
    Queued,
    /// Fetching a remote archive
    Downloading,
    /// Extracting and probing
    Processing,
    /// Manifest published; media browsable
    Ready,
    /// Slideshow render in flight
    GeneratingSlideshow,
    /// Ingestion or probing failed; media removed
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Queued => "queued",
            SessionStatus::Downloading => "downloading",
            SessionStatus::Processing => "processing",
            SessionStatus::Ready => "ready",
            SessionStatus::GeneratingSlideshow => "generating_slideshow",
            SessionStatus::Failed => "failed",
        }
    }

    /// `failed` is the only state no transition leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Failed)
    }

    /// States in which an ingestion job is (or was) in flight.
    pub fn is_ingesting(&self) -> bool {
        matches!(
            self,
            SessionStatus::Queued | SessionStatus::Downloading | SessionStatus::Processing
        )
    }

    /// Whether `self -> next` is a legal edge.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;

        match (*self, next) {
            (Failed, _) => false,
            (_, Failed) => true,
            (Queued | Downloading | Processing, Downloading) => true,
            (Queued | Downloading | Processing, Processing) => true,
            (Processing, Ready) => true,
            (Ready, GeneratingSlideshow) => true,
            (GeneratingSlideshow, GeneratingSlideshow) => true,
            (GeneratingSlideshow, Ready) => true,
            _ => false,
        }
    }

    /// Validate and return the next state.
    pub fn transition(self, next: SessionStatus) -> ModelResult<SessionStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ModelError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
