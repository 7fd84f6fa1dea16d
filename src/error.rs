//! Error taxonomy surfaced by the bridge facade.

use thiserror::Error;

/// Coarse classification used by callers to decide how to react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller supplied a URI or id that can never succeed.
    MalformedInput,
    /// The external session reported a failure for an otherwise valid request.
    ExternalSession,
    /// The referenced resource does not exist or cannot be handled.
    NotFound,
    /// The worker is not running (start-up failed or the bridge shut down).
    Unavailable,
}

/// Failure returned by every blocking bridge operation.
///
/// Display text is the human-readable message shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("Invalid URI")]
    InvalidUri,
    #[error("Invalid URI for playback (not a track)")]
    NotATrack,
    #[error("Not a track URI")]
    NotATrackForParent,
    #[error("Invalid URL for image loader")]
    InvalidImageUri,
    #[error("Unable to load track:\n{0}")]
    TrackLoad(String),
    #[error("Unable to play track:\n{0}")]
    TrackPlay(String),
    #[error("Unable to resolve track: {0}")]
    TrackResolve(String),
    #[error("Unable to resolve parent")]
    ParentUnresolved,
    #[error("Unable to load image: {0}")]
    ImageLoad(String),
    #[error("Unable to decode image: {0}")]
    ImageDecode(String),
    #[error("Playlist {0} not found")]
    PlaylistNotFound(String),
    #[error("Can not handle link type {0}")]
    UnsupportedLink(String),
    #[error("Content session is not available")]
    SessionUnavailable,
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUri
            | Self::NotATrack
            | Self::NotATrackForParent
            | Self::InvalidImageUri => ErrorKind::MalformedInput,
            Self::TrackLoad(_)
            | Self::TrackPlay(_)
            | Self::TrackResolve(_)
            | Self::ParentUnresolved
            | Self::ImageLoad(_)
            | Self::ImageDecode(_) => ErrorKind::ExternalSession,
            Self::PlaylistNotFound(_) | Self::UnsupportedLink(_) => ErrorKind::NotFound,
            Self::SessionUnavailable => ErrorKind::Unavailable,
        }
    }
}
