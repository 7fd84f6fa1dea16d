//! Content session abstractions and concrete implementations.
//!
//! A [`ContentSession`] wraps a single-threaded SDK handle. It is built on
//! the session worker thread and never leaves it, so implementations need not
//! be `Send`.

pub mod catalog;

use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::Mailbox;

/// Raw id of an artwork image (20 bytes, rendered as 40 hex digits in URIs).
pub type ImageId = [u8; 20];

/// Correlates an asynchronous session request with its completion event.
pub type RequestId = u64;

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);
    };
}

handle_type!(
    /// Session-owned track object.
    TrackHandle
);
handle_type!(
    /// Session-owned album object.
    AlbumHandle
);
handle_type!(
    /// Session-owned artist object.
    ArtistHandle
);
handle_type!(
    /// Session-owned playlist object.
    PlaylistHandle
);
handle_type!(
    /// Session-owned image object.
    ImageHandle
);

/// Any reference-counted session object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectRef {
    Track(TrackHandle),
    Album(AlbumHandle),
    Artist(ArtistHandle),
    Playlist(PlaylistHandle),
    Image(ImageHandle),
}

impl ObjectRef {
    pub fn kind(&self) -> LinkKind {
        match self {
            Self::Track(_) => LinkKind::Track,
            Self::Album(_) => LinkKind::Album,
            Self::Artist(_) => LinkKind::Artist,
            Self::Playlist(_) => LinkKind::Playlist,
            Self::Image(_) => LinkKind::Image,
        }
    }
}

/// Content kind named by a service URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Track,
    Album,
    Artist,
    Playlist,
    Image,
    Search,
    Playlists,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Album => "album",
            Self::Artist => "artist",
            Self::Playlist => "playlist",
            Self::Image => "image",
            Self::Search => "search",
            Self::Playlists => "playlists",
        }
    }
}

/// Load state of a track object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackStatus {
    Ready,
    /// Metadata has not arrived yet; poll again after the next update.
    Loading,
    /// Permanent failure with the session's error text.
    Failed(String),
}

/// Loaded track metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub name: String,
    pub artists: Vec<ArtistHandle>,
    pub album: Option<AlbumHandle>,
    pub duration_ms: u32,
    /// 0..=100
    pub popularity: u32,
    pub index: u32,
    pub available: bool,
}

/// Release category reported by the session for an album.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlbumType {
    Album,
    Single,
    Compilation,
    Unknown,
}

/// Loaded album metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct AlbumInfo {
    pub name: String,
    /// 0 when unknown.
    pub year: i32,
    pub artist: Option<ArtistHandle>,
    pub cover: Option<ImageId>,
    pub album_type: AlbumType,
    pub available: bool,
}

/// Per-request result caps for search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub tracks: usize,
    pub albums: usize,
    pub artists: usize,
}

/// Objects found by a search. Each handle carries a reference owned by the
/// receiver of the completion event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub tracks: Vec<TrackHandle>,
    pub albums: Vec<AlbumHandle>,
    pub artists: Vec<ArtistHandle>,
}

/// PCM layout of delivered audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub channels: u16,
    pub sample_rate: u32,
}

/// Sink for decoded audio, invoked synchronously from
/// [`ContentSession::process_events`].
pub trait MusicDelivery {
    /// Offers `num_frames` interleaved frames. Returns how many frames were
    /// consumed; 0 asks the session to offer them again later. A call with
    /// `num_frames == 0` signals a discontinuity (seek flush).
    fn deliver(&mut self, format: AudioFormat, samples: &[i16], num_frames: usize) -> usize;
}

/// Settings handed to the session factory.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cache_location: PathBuf,
    pub settings_location: PathBuf,
    pub user_agent: String,
}

/// Interface implemented by concrete content session backends.
///
/// Completion of asynchronous work (login, browse, search, image load,
/// playlist changes) is reported by posting a
/// [`SessionEvent`](crate::protocol::SessionEvent) to the [`Mailbox`]
/// the session was created with.
pub trait ContentSession {
    fn login(&mut self, username: &str, password: &str);
    fn logout(&mut self);
    fn user_display_name(&self) -> Option<String>;

    /// Runs pending session work. Returns how long the caller may wait before
    /// calling again; `Duration::ZERO` means call again immediately and
    /// `Duration::MAX` means nothing is scheduled.
    fn process_events(&mut self, delivery: &mut dyn MusicDelivery) -> Duration;

    /// Resolves a service URI to a session object. The caller must
    /// [`add_ref`](Self::add_ref) the result to keep it.
    fn resolve(&mut self, uri: &str) -> Option<ObjectRef>;
    fn uri_of(&self, object: ObjectRef) -> Option<String>;
    fn add_ref(&mut self, object: ObjectRef);
    fn release(&mut self, object: ObjectRef);

    fn track_status(&self, track: TrackHandle) -> TrackStatus;
    /// `None` while the track is still loading.
    fn track_info(&self, track: TrackHandle) -> Option<TrackInfo>;
    fn album_info(&self, album: AlbumHandle) -> Option<AlbumInfo>;
    fn artist_name(&self, artist: ArtistHandle) -> Option<String>;

    fn browse_album(&mut self, album: AlbumHandle, request: RequestId);
    fn browse_artist(&mut self, artist: ArtistHandle, request: RequestId);
    fn search(&mut self, query: &str, limits: SearchLimits, request: RequestId);
    /// Starts loading an image; the returned handle carries one reference.
    fn load_image(&mut self, id: ImageId, request: RequestId) -> ImageHandle;

    fn player_load(&mut self, track: TrackHandle) -> Result<(), String>;
    fn player_play(&mut self, play: bool) -> Result<(), String>;
    fn player_seek(&mut self, position_ms: u32);
    fn player_unload(&mut self);

    fn playlist_container(&self) -> Vec<PlaylistHandle>;
    fn watch_container(&mut self);
    fn watch_playlist(&mut self, playlist: PlaylistHandle);
    fn playlist_name(&self, playlist: PlaylistHandle) -> Option<String>;
    fn playlist_is_loaded(&self, playlist: PlaylistHandle) -> bool;
    fn playlist_tracks(&self, playlist: PlaylistHandle) -> Vec<TrackHandle>;
}

/// Builds the session on the worker thread.
pub type SessionFactory =
    Box<dyn FnOnce(SessionSettings, Mailbox) -> Result<Box<dyn ContentSession>, String> + Send>;
