//! Error types for the session engine
//!
//! Every failure here is recoverable: a load error degrades one track to a
//! placeholder, a playback error drops one track from the current pass, a
//! channel error switches updates to polling. Only network errors are handed
//! back to the caller as-is.

use crate::types::TrackId;
use thiserror::Error;

/// Audio resource could not be resolved into a playable source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    /// Locator could not be reached (missing file, HTTP failure)
    #[error("Audio resource unreachable: {locator}: {reason}")]
    Unreachable { locator: String, reason: String },

    /// Resource was fetched but could not be decoded
    #[error("Failed to decode {locator}: {reason}")]
    Decode { locator: String, reason: String },

    /// Manifest entry listed no candidate locations
    #[error("No candidate locations for stem '{0}'")]
    NoCandidates(String),

    /// Every candidate for a stem failed
    #[error("All {attempts} candidates failed for stem '{stem}' (last: {last})")]
    Exhausted {
        stem: String,
        attempts: usize,
        last: String,
    },
}

/// Result type for stem loading
pub type LoadResult<T> = Result<T, LoadError>;

/// A track's audio source refused a transport command
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    /// Source could not be repositioned
    #[error("Seek to {position:.3}s rejected: {reason}")]
    SeekRejected { position: f64, reason: String },

    /// Source refused to start
    #[error("Start rejected: {0}")]
    StartRejected(String),

    /// Source has no decoded audio
    #[error("Source has no audio")]
    Empty,

    /// Level window could not be read
    #[error("Level read failed: {0}")]
    LevelUnavailable(String),
}

/// Result type for audio source operations
pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// Push update channel failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    /// Sending side went away
    #[error("Update channel disconnected")]
    Disconnected,

    /// A frame could not be parsed
    #[error("Malformed update frame: {0}")]
    Malformed(String),
}

/// Remote call failure, surfaced to the caller
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    /// Connection, DNS or I/O failure
    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// Server answered with a non-success status
    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Response body did not match the expected shape
    #[error("Invalid response payload: {0}")]
    Payload(String),

    /// Job service thread is gone
    #[error("Job service unavailable")]
    ServiceUnavailable,
}

/// Result type for remote calls
pub type NetworkResult<T> = Result<T, NetworkError>;

impl From<ureq::Error> for NetworkError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => NetworkError::Status {
                url: response.get_url().to_string(),
                status,
            },
            ureq::Error::Transport(transport) => NetworkError::Transport {
                url: transport
                    .url()
                    .map(|u| u.to_string())
                    .unwrap_or_default(),
                reason: transport.to_string(),
            },
        }
    }
}

/// Registry operation on a track that does not exist
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown track {0}")]
    UnknownTrack(TrackId),
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Session command that could not be carried out
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    /// A background worker could not be started or has gone away
    #[error("{worker} unavailable: {reason}")]
    Worker { worker: &'static str, reason: String },

    /// Track has no stem entry to reload from
    #[error("{0} was not loaded from a stem")]
    NotReloadable(TrackId),
}

/// Result type for session commands
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = LoadError::Exhausted {
            stem: "bass".into(),
            attempts: 2,
            last: "not found".into(),
        };
        assert_eq!(
            err.to_string(),
            "All 2 candidates failed for stem 'bass' (last: not found)"
        );
        assert_eq!(
            RegistryError::UnknownTrack(TrackId(7)).to_string(),
            "Unknown track track#7"
        );
    }
}
