//! Offline catalog session backed by an in-memory JSON fixture.
//!
//! Simulates the behaviors the bridge depends on: tracks that take a few
//! event passes to load, permanent load errors, asynchronous browse/search/
//! image completions, playlist change notifications, reference counts, and
//! real-time-ish audio delivery of silent PCM.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};

use crate::backends::{
    AlbumHandle, AlbumInfo, AlbumType, ArtistHandle, AudioFormat, ContentSession, ImageHandle,
    ImageId, MusicDelivery, ObjectRef, PlaylistHandle, RequestId, SearchLimits, SearchResult,
    SessionFactory, SessionSettings, TrackHandle, TrackInfo, TrackStatus,
};
use crate::protocol::{Mailbox, SessionEvent};
use crate::service_uri::{parse_image_hex, ServiceUri};

/// PCM layout produced by the catalog player.
pub const AUDIO_FORMAT: AudioFormat = AudioFormat {
    channels: 2,
    sample_rate: 44_100,
};

const CHUNK_FRAMES: u64 = 2_048;

fn default_true() -> bool {
    true
}

fn default_album_type() -> AlbumType {
    AlbumType::Album
}

/// Root of a catalog fixture file.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct CatalogFixture {
    #[serde(default)]
    pub users: Vec<UserFixture>,
    #[serde(default)]
    pub artists: Vec<ArtistFixture>,
    #[serde(default)]
    pub albums: Vec<AlbumFixture>,
    #[serde(default)]
    pub tracks: Vec<TrackFixture>,
    /// Playlists in container order.
    #[serde(default)]
    pub playlists: Vec<PlaylistFixture>,
    #[serde(default)]
    pub images: Vec<ImageFixture>,
}

/// Accepted login. With no users configured any login succeeds.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct UserFixture {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ArtistFixture {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AlbumFixture {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub year: i32,
    /// Album artist id.
    #[serde(default)]
    pub artist: Option<String>,
    /// Cover image id as 40 hex digits.
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default = "default_album_type")]
    pub album_type: AlbumType,
    #[serde(default = "default_true")]
    pub available: bool,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TrackFixture {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub duration_ms: u32,
    #[serde(default)]
    pub popularity: u32,
    #[serde(default)]
    pub index: u32,
    #[serde(default = "default_true")]
    pub available: bool,
    /// Event passes before the track reports loaded.
    #[serde(default)]
    pub load_polls: u32,
    /// Permanent load error reported once loading finishes.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PlaylistFixture {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tracks: Vec<String>,
    #[serde(default = "default_true")]
    pub loaded: bool,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ImageFixture {
    /// 40 hex digits.
    pub id: String,
    pub bytes: Vec<u8>,
}

impl CatalogFixture {
    pub fn from_json(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|err| format!("invalid catalog fixture: {err}"))
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| format!("failed to read {}: {}", path.display(), err))?;
        Self::from_json(&text)
    }
}

struct TrackEntry {
    fixture: TrackFixture,
    album: Option<AlbumHandle>,
    artists: Vec<ArtistHandle>,
    polls_remaining: u32,
}

struct AlbumEntry {
    fixture: AlbumFixture,
    artist: Option<ArtistHandle>,
    cover: Option<ImageId>,
}

struct PlaylistEntry {
    id: String,
    name: String,
    tracks: Vec<TrackHandle>,
    loaded: bool,
}

#[derive(Default)]
struct PlayerState {
    track: Option<TrackHandle>,
    playing: bool,
    position_frames: u64,
    total_frames: u64,
    pending_flush: bool,
    end_sent: bool,
}

#[derive(Default)]
struct CatalogState {
    users: Vec<UserFixture>,
    artists: Vec<ArtistFixture>,
    albums: Vec<AlbumEntry>,
    tracks: Vec<TrackEntry>,
    playlists: Vec<PlaylistEntry>,
    container: Vec<PlaylistHandle>,
    images: HashMap<ImageId, Vec<u8>>,
    refs: HashMap<ObjectRef, i64>,
    queued: VecDeque<SessionEvent>,
    mailbox: Option<Mailbox>,
    player: PlayerState,
    logged_in: Option<String>,
    watching_container: bool,
    watched: HashSet<PlaylistHandle>,
    next_image: u64,
}

fn index_of<T>(items: &[T], id: &str, key: impl Fn(&T) -> &str) -> Option<u64> {
    items
        .iter()
        .position(|item| key(item) == id)
        .map(|index| index as u64)
}

impl CatalogState {
    fn from_fixture(fixture: CatalogFixture) -> Self {
        let artists = fixture.artists;
        let artist_handle = |id: &str| index_of(&artists, id, |a| a.id.as_str()).map(ArtistHandle);

        let albums: Vec<AlbumEntry> = fixture
            .albums
            .into_iter()
            .map(|album| AlbumEntry {
                artist: album.artist.as_deref().and_then(artist_handle),
                cover: album.cover.as_deref().and_then(parse_image_hex),
                fixture: album,
            })
            .collect();
        let album_handle = |id: &str| {
            index_of(&albums, id, |a| a.fixture.id.as_str()).map(AlbumHandle)
        };

        let tracks: Vec<TrackEntry> = fixture
            .tracks
            .into_iter()
            .map(|track| TrackEntry {
                album: track.album.as_deref().and_then(album_handle),
                artists: track
                    .artists
                    .iter()
                    .filter_map(|id| artist_handle(id.as_str()))
                    .collect(),
                polls_remaining: track.load_polls,
                fixture: track,
            })
            .collect();
        let track_handle =
            |id: &str| index_of(&tracks, id, |t| t.fixture.id.as_str()).map(TrackHandle);

        let playlists: Vec<PlaylistEntry> = fixture
            .playlists
            .into_iter()
            .map(|playlist| PlaylistEntry {
                tracks: playlist
                    .tracks
                    .iter()
                    .filter_map(|id| track_handle(id.as_str()))
                    .collect(),
                id: playlist.id,
                name: playlist.name,
                loaded: playlist.loaded,
            })
            .collect();
        let container = (0..playlists.len() as u64).map(PlaylistHandle).collect();

        let images = fixture
            .images
            .into_iter()
            .filter_map(|image| Some((parse_image_hex(&image.id)?, image.bytes)))
            .collect();

        Self {
            users: fixture.users,
            artists,
            albums,
            tracks,
            playlists,
            container,
            images,
            ..Self::default()
        }
    }

    fn push_event(&mut self, event: SessionEvent) {
        self.queued.push_back(event);
        if let Some(mailbox) = &self.mailbox {
            mailbox.notify_main_thread();
        }
    }

    fn track(&self, track: TrackHandle) -> Option<&TrackEntry> {
        self.tracks.get(track.0 as usize)
    }

    fn track_by_id(&self, id: &str) -> Option<TrackHandle> {
        index_of(&self.tracks, id, |t| t.fixture.id.as_str()).map(TrackHandle)
    }

    fn playlist_by_id(&self, id: &str) -> Option<PlaylistHandle> {
        index_of(&self.playlists, id, |p| p.id.as_str()).map(PlaylistHandle)
    }

    fn track_status(&self, track: TrackHandle) -> TrackStatus {
        match self.track(track) {
            None => TrackStatus::Failed("Unknown track".to_string()),
            Some(entry) if entry.polls_remaining > 0 => TrackStatus::Loading,
            Some(entry) => match &entry.fixture.error {
                Some(error) => TrackStatus::Failed(error.clone()),
                None => TrackStatus::Ready,
            },
        }
    }

    fn add_ref(&mut self, object: ObjectRef) {
        *self.refs.entry(object).or_default() += 1;
    }

    fn watched_playlist(&self, id: &str) -> Option<(PlaylistHandle, bool)> {
        let playlist = self.playlist_by_id(id)?;
        Some((playlist, self.watched.contains(&playlist)))
    }
}

/// Shared handle for inspecting and mutating a catalog from outside the
/// session worker. Mutations are reported to the session as events.
#[derive(Clone)]
pub struct CatalogHandle {
    state: Arc<Mutex<CatalogState>>,
}

fn lock_state(state: &Mutex<CatalogState>) -> MutexGuard<'_, CatalogState> {
    state.lock().expect("catalog state lock poisoned")
}

impl CatalogHandle {
    pub fn new(fixture: CatalogFixture) -> Self {
        Self {
            state: Arc::new(Mutex::new(CatalogState::from_fixture(fixture))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        lock_state(&self.state)
    }

    /// Creates the session view of this catalog, reporting to `mailbox`.
    pub fn attach(&self, mailbox: Mailbox) -> CatalogSession {
        self.lock().mailbox = Some(mailbox.clone());
        CatalogSession {
            state: Arc::clone(&self.state),
            mailbox,
        }
    }

    /// Session factory for the bridge; the session is attached on the worker.
    pub fn factory(&self) -> SessionFactory {
        let handle = self.clone();
        Box::new(move |settings: SessionSettings, mailbox: Mailbox| {
            info!(
                "CatalogSession: starting (user_agent={}, cache={})",
                settings.user_agent,
                settings.cache_location.display()
            );
            Ok(Box::new(handle.attach(mailbox)) as Box<dyn ContentSession>)
        })
    }

    pub fn ref_count(&self, object: ObjectRef) -> i64 {
        self.lock().refs.get(&object).copied().unwrap_or(0)
    }

    pub fn track(&self, id: &str) -> Option<TrackHandle> {
        self.lock().track_by_id(id)
    }

    pub fn is_playing(&self) -> bool {
        self.lock().player.playing
    }

    /// Player position in milliseconds, including audio not yet heard.
    pub fn player_position_ms(&self) -> u64 {
        self.lock().player.position_frames * 1000 / u64::from(AUDIO_FORMAT.sample_rate)
    }

    /// Id of the track currently loaded in the player.
    pub fn loaded_track(&self) -> Option<String> {
        let state = self.lock();
        let track = state.player.track?;
        state.track(track).map(|entry| entry.fixture.id.clone())
    }

    /// Completes loading of a track immediately.
    pub fn finish_loading(&self, track_id: &str) {
        let mut state = self.lock();
        if let Some(track) = state.track_by_id(track_id) {
            state.tracks[track.0 as usize].polls_remaining = 0;
            state.push_event(SessionEvent::MetadataUpdated);
        }
    }

    pub fn set_track_available(&self, track_id: &str, available: bool) {
        let mut state = self.lock();
        if let Some(track) = state.track_by_id(track_id) {
            state.tracks[track.0 as usize].fixture.available = available;
            state.push_event(SessionEvent::MetadataUpdated);
        }
    }

    pub fn add_image(&self, id: ImageId, bytes: Vec<u8>) {
        self.lock().images.insert(id, bytes);
    }

    /// Queues an arbitrary session event.
    pub fn emit(&self, event: SessionEvent) {
        self.lock().push_event(event);
    }

    pub fn add_tracks(&self, playlist_id: &str, position: usize, track_ids: &[&str]) {
        let mut state = self.lock();
        let Some((playlist, watched)) = state.watched_playlist(playlist_id) else {
            warn!("CatalogSession: unknown playlist {}", playlist_id);
            return;
        };
        let tracks: Vec<TrackHandle> = track_ids
            .iter()
            .filter_map(|id| state.track_by_id(id))
            .collect();
        let entry = &mut state.playlists[playlist.0 as usize];
        let position = position.min(entry.tracks.len());
        for (offset, track) in tracks.iter().enumerate() {
            entry.tracks.insert(position + offset, *track);
        }
        if watched {
            state.push_event(SessionEvent::TracksAdded {
                playlist,
                tracks,
                position,
            });
        }
    }

    pub fn remove_tracks(&self, playlist_id: &str, positions: &[usize]) {
        let mut state = self.lock();
        let Some((playlist, watched)) = state.watched_playlist(playlist_id) else {
            return;
        };
        let mut sorted = positions.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        sorted.dedup();
        let entry = &mut state.playlists[playlist.0 as usize];
        for position in sorted {
            if position < entry.tracks.len() {
                entry.tracks.remove(position);
            }
        }
        if watched {
            state.push_event(SessionEvent::TracksRemoved {
                playlist,
                positions: positions.to_vec(),
            });
        }
    }

    pub fn move_tracks(&self, playlist_id: &str, positions: &[usize], new_position: usize) {
        let mut state = self.lock();
        let Some((playlist, watched)) = state.watched_playlist(playlist_id) else {
            return;
        };
        let entry = &mut state.playlists[playlist.0 as usize];
        let mut sorted = positions.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        sorted.retain(|position| *position < entry.tracks.len());
        let moved: Vec<TrackHandle> = sorted.iter().map(|p| entry.tracks[*p]).collect();
        let shift = sorted.iter().filter(|p| **p < new_position).count();
        for position in sorted.iter().rev() {
            entry.tracks.remove(*position);
        }
        let target = (new_position - shift).min(entry.tracks.len());
        for (offset, track) in moved.into_iter().enumerate() {
            entry.tracks.insert(target + offset, track);
        }
        if watched {
            state.push_event(SessionEvent::TracksMoved {
                playlist,
                positions: positions.to_vec(),
                new_position,
            });
        }
    }

    pub fn rename_playlist(&self, playlist_id: &str, name: &str) {
        let mut state = self.lock();
        let Some((playlist, watched)) = state.watched_playlist(playlist_id) else {
            return;
        };
        state.playlists[playlist.0 as usize].name = name.to_string();
        if watched {
            state.push_event(SessionEvent::PlaylistRenamed(playlist));
        }
    }

    pub fn set_playlist_loaded(&self, playlist_id: &str) {
        let mut state = self.lock();
        let Some((playlist, watched)) = state.watched_playlist(playlist_id) else {
            return;
        };
        state.playlists[playlist.0 as usize].loaded = true;
        if watched {
            state.push_event(SessionEvent::PlaylistStateChanged(playlist));
        }
    }

    /// Adds a new playlist to the container at `position`.
    pub fn create_playlist(
        &self,
        playlist_id: &str,
        name: &str,
        position: usize,
        track_ids: &[&str],
    ) {
        let mut state = self.lock();
        let tracks = track_ids
            .iter()
            .filter_map(|id| state.track_by_id(id))
            .collect();
        let playlist = PlaylistHandle(state.playlists.len() as u64);
        state.playlists.push(PlaylistEntry {
            id: playlist_id.to_string(),
            name: name.to_string(),
            tracks,
            loaded: true,
        });
        let position = position.min(state.container.len());
        state.container.insert(position, playlist);
        if state.watching_container {
            state.push_event(SessionEvent::PlaylistAdded { playlist, position });
        }
    }

    pub fn remove_playlist(&self, position: usize) {
        let mut state = self.lock();
        if position >= state.container.len() {
            return;
        }
        let playlist = state.container.remove(position);
        if state.watching_container {
            state.push_event(SessionEvent::PlaylistRemoved { playlist, position });
        }
    }

    pub fn move_playlist(&self, from: usize, to: usize) {
        let mut state = self.lock();
        if from >= state.container.len() {
            return;
        }
        let playlist = state.container.remove(from);
        let target = if to > from { to - 1 } else { to };
        let target = target.min(state.container.len());
        state.container.insert(target, playlist);
        if state.watching_container {
            state.push_event(SessionEvent::PlaylistMoved { playlist, from, to });
        }
    }

    /// Names of playlists in container order.
    pub fn container_names(&self) -> Vec<String> {
        let state = self.lock();
        state
            .container
            .iter()
            .filter_map(|playlist| state.playlists.get(playlist.0 as usize))
            .map(|entry| entry.name.clone())
            .collect()
    }
}

/// Session view of a catalog; lives on the session worker.
pub struct CatalogSession {
    state: Arc<Mutex<CatalogState>>,
    mailbox: Mailbox,
}

impl CatalogSession {
    pub fn new(fixture: CatalogFixture, mailbox: Mailbox) -> Self {
        CatalogHandle::new(fixture).attach(mailbox)
    }

    pub fn handle(&self) -> CatalogHandle {
        CatalogHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        lock_state(&self.state)
    }

    pub fn ref_count(&self, object: ObjectRef) -> i64 {
        self.handle().ref_count(object)
    }

    fn retain_all<T: Copy>(state: &mut CatalogState, items: &[T], wrap: impl Fn(T) -> ObjectRef) {
        for item in items {
            state.add_ref(wrap(*item));
        }
    }
}

impl ContentSession for CatalogSession {
    fn login(&mut self, username: &str, password: &str) {
        let mut state = self.lock();
        let accepted = if state.users.is_empty() {
            Some(username.to_string())
        } else {
            state
                .users
                .iter()
                .find(|user| user.username == username && user.password == password)
                .map(|user| user.display_name.clone().unwrap_or_else(|| user.username.clone()))
        };
        match accepted {
            Some(display_name) => {
                state.push_event(SessionEvent::LogMessage(format!(
                    "catalog: session opened for {username}\n"
                )));
                state.logged_in = Some(display_name);
                state.push_event(SessionEvent::LoggedIn(Ok(())));
            }
            None => state.push_event(SessionEvent::LoggedIn(Err(
                "Bad username or password".to_string(),
            ))),
        }
    }

    fn logout(&mut self) {
        let mut state = self.lock();
        state.logged_in = None;
        state.player = PlayerState::default();
        state.push_event(SessionEvent::LoggedOut);
    }

    fn user_display_name(&self) -> Option<String> {
        self.lock().logged_in.clone()
    }

    fn process_events(&mut self, delivery: &mut dyn MusicDelivery) -> Duration {
        let (flush, chunk) = {
            let mut state = self.lock();
            let mut finished_loading = false;
            for track in state.tracks.iter_mut().filter(|t| t.polls_remaining > 0) {
                track.polls_remaining -= 1;
                finished_loading |= track.polls_remaining == 0;
            }
            if finished_loading {
                state.queued.push_back(SessionEvent::MetadataUpdated);
            }
            let player = &mut state.player;
            let flush = std::mem::take(&mut player.pending_flush);
            let remaining = player.total_frames.saturating_sub(player.position_frames);
            let chunk = (player.playing && !player.end_sent).then(|| CHUNK_FRAMES.min(remaining));
            (flush, chunk)
        };

        if flush {
            delivery.deliver(AUDIO_FORMAT, &[], 0);
        }
        if let Some(frames) = chunk {
            let accepted = if frames > 0 {
                let samples = vec![0i16; frames as usize * usize::from(AUDIO_FORMAT.channels)];
                delivery.deliver(AUDIO_FORMAT, &samples, frames as usize) as u64
            } else {
                0
            };
            let mut state = self.lock();
            let player = &mut state.player;
            player.position_frames += accepted;
            let finished = player.position_frames >= player.total_frames && !player.end_sent;
            if finished {
                player.end_sent = true;
                state.queued.push_back(SessionEvent::EndOfTrack);
            }
        }

        let (events, playing, loading) = {
            let mut state = self.lock();
            let events: Vec<SessionEvent> = state.queued.drain(..).collect();
            let playing = state.player.playing && !state.player.end_sent;
            let loading = state.tracks.iter().any(|t| t.polls_remaining > 0);
            (events, playing, loading)
        };
        for event in events {
            self.mailbox.post_event(event);
        }

        if playing {
            Duration::from_millis(5)
        } else if loading {
            Duration::from_millis(10)
        } else {
            Duration::from_millis(250)
        }
    }

    fn resolve(&mut self, uri: &str) -> Option<ObjectRef> {
        let state = self.lock();
        match ServiceUri::parse(uri)? {
            ServiceUri::Track(id) => state.track_by_id(&id).map(ObjectRef::Track),
            ServiceUri::Album(id) => index_of(&state.albums, &id, |a| a.fixture.id.as_str())
                .map(|index| ObjectRef::Album(AlbumHandle(index))),
            ServiceUri::Artist { id, .. } => index_of(&state.artists, &id, |a| a.id.as_str())
                .map(|index| ObjectRef::Artist(ArtistHandle(index))),
            ServiceUri::Playlist(id) => state.playlist_by_id(&id).map(ObjectRef::Playlist),
            ServiceUri::Playlists | ServiceUri::Search(_) | ServiceUri::Image(_) => None,
        }
    }

    fn uri_of(&self, object: ObjectRef) -> Option<String> {
        let state = self.lock();
        match object {
            ObjectRef::Track(track) => state
                .track(track)
                .map(|entry| format!("svc:track:{}", entry.fixture.id)),
            ObjectRef::Album(album) => state
                .albums
                .get(album.0 as usize)
                .map(|entry| format!("svc:album:{}", entry.fixture.id)),
            ObjectRef::Artist(artist) => state
                .artists
                .get(artist.0 as usize)
                .map(|entry| format!("svc:artist:{}", entry.id)),
            ObjectRef::Playlist(playlist) => state
                .playlists
                .get(playlist.0 as usize)
                .map(|entry| format!("svc:playlist:{}", entry.id)),
            ObjectRef::Image(_) => None,
        }
    }

    fn add_ref(&mut self, object: ObjectRef) {
        self.lock().add_ref(object);
    }

    fn release(&mut self, object: ObjectRef) {
        let mut state = self.lock();
        let count = state.refs.entry(object).or_default();
        *count -= 1;
        if *count < 0 {
            warn!("CatalogSession: over-release of {:?}", object);
        }
    }

    fn track_status(&self, track: TrackHandle) -> TrackStatus {
        self.lock().track_status(track)
    }

    fn track_info(&self, track: TrackHandle) -> Option<TrackInfo> {
        let state = self.lock();
        if state.track_status(track) != TrackStatus::Ready {
            return None;
        }
        let entry = state.track(track)?;
        Some(TrackInfo {
            name: entry.fixture.name.clone(),
            artists: entry.artists.clone(),
            album: entry.album,
            duration_ms: entry.fixture.duration_ms,
            popularity: entry.fixture.popularity.min(100),
            index: entry.fixture.index,
            available: entry.fixture.available,
        })
    }

    fn album_info(&self, album: AlbumHandle) -> Option<AlbumInfo> {
        let state = self.lock();
        let entry = state.albums.get(album.0 as usize)?;
        Some(AlbumInfo {
            name: entry.fixture.name.clone(),
            year: entry.fixture.year,
            artist: entry.artist,
            cover: entry.cover,
            album_type: entry.fixture.album_type,
            available: entry.fixture.available,
        })
    }

    fn artist_name(&self, artist: ArtistHandle) -> Option<String> {
        self.lock()
            .artists
            .get(artist.0 as usize)
            .map(|entry| entry.name.clone())
    }

    fn browse_album(&mut self, album: AlbumHandle, request: RequestId) {
        let mut state = self.lock();
        let tracks: Vec<TrackHandle> = (0..state.tracks.len() as u64)
            .map(TrackHandle)
            .filter(|track| state.tracks[track.0 as usize].album == Some(album))
            .collect();
        Self::retain_all(&mut state, &tracks, ObjectRef::Track);
        state.push_event(SessionEvent::AlbumBrowsed {
            request,
            album,
            tracks,
        });
    }

    fn browse_artist(&mut self, artist: ArtistHandle, request: RequestId) {
        let mut state = self.lock();
        let mut tracks: Vec<TrackHandle> = (0..state.tracks.len() as u64)
            .map(TrackHandle)
            .filter(|track| state.tracks[track.0 as usize].artists.contains(&artist))
            .collect();
        // Group by album, keeping catalog order inside each album.
        tracks.sort_by_key(|track| {
            state.tracks[track.0 as usize]
                .album
                .map_or(u64::MAX, |album| album.0)
        });
        Self::retain_all(&mut state, &tracks, ObjectRef::Track);
        state.push_event(SessionEvent::ArtistBrowsed {
            request,
            artist,
            tracks,
        });
    }

    fn search(&mut self, query: &str, limits: SearchLimits, request: RequestId) {
        let needle = query.to_lowercase();
        let mut state = self.lock();
        let matches = |name: &str| name.to_lowercase().contains(&needle);
        let result = SearchResult {
            tracks: (0..state.tracks.len() as u64)
                .map(TrackHandle)
                .filter(|t| matches(&state.tracks[t.0 as usize].fixture.name))
                .take(limits.tracks)
                .collect(),
            albums: (0..state.albums.len() as u64)
                .map(AlbumHandle)
                .filter(|a| matches(&state.albums[a.0 as usize].fixture.name))
                .take(limits.albums)
                .collect(),
            artists: (0..state.artists.len() as u64)
                .map(ArtistHandle)
                .filter(|a| matches(&state.artists[a.0 as usize].name))
                .take(limits.artists)
                .collect(),
        };
        debug!(
            "CatalogSession: search '{}' found {} tracks, {} albums, {} artists",
            query,
            result.tracks.len(),
            result.albums.len(),
            result.artists.len()
        );
        Self::retain_all(&mut state, &result.tracks, ObjectRef::Track);
        Self::retain_all(&mut state, &result.albums, ObjectRef::Album);
        Self::retain_all(&mut state, &result.artists, ObjectRef::Artist);
        state.push_event(SessionEvent::SearchCompleted { request, result });
    }

    fn load_image(&mut self, id: ImageId, request: RequestId) -> ImageHandle {
        let mut state = self.lock();
        state.next_image += 1;
        let image = ImageHandle(state.next_image);
        state.add_ref(ObjectRef::Image(image));
        let result = state
            .images
            .get(&id)
            .cloned()
            .ok_or_else(|| "Image not found".to_string());
        state.push_event(SessionEvent::ImageLoaded { request, result });
        image
    }

    fn player_load(&mut self, track: TrackHandle) -> Result<(), String> {
        let mut state = self.lock();
        match state.track_status(track) {
            TrackStatus::Ready => {}
            TrackStatus::Loading => return Err("Track is still loading".to_string()),
            TrackStatus::Failed(error) => return Err(error),
        }
        let entry = state.track(track).ok_or_else(|| "Unknown track".to_string())?;
        if !entry.fixture.available {
            return Err("Track is not available".to_string());
        }
        let total_frames =
            u64::from(entry.fixture.duration_ms) * u64::from(AUDIO_FORMAT.sample_rate) / 1000;
        state.player = PlayerState {
            track: Some(track),
            total_frames,
            ..PlayerState::default()
        };
        Ok(())
    }

    fn player_play(&mut self, play: bool) -> Result<(), String> {
        let mut state = self.lock();
        if state.player.track.is_none() {
            return Err("No track loaded".to_string());
        }
        state.player.playing = play;
        Ok(())
    }

    fn player_seek(&mut self, position_ms: u32) {
        let mut state = self.lock();
        let position = u64::from(position_ms) * u64::from(AUDIO_FORMAT.sample_rate) / 1000;
        state.player.position_frames = position.min(state.player.total_frames);
        state.player.pending_flush = true;
    }

    fn player_unload(&mut self) {
        self.lock().player = PlayerState::default();
    }

    fn playlist_container(&self) -> Vec<PlaylistHandle> {
        self.lock().container.clone()
    }

    fn watch_container(&mut self) {
        let mut state = self.lock();
        state.watching_container = true;
        state.push_event(SessionEvent::ContainerLoaded);
    }

    fn watch_playlist(&mut self, playlist: PlaylistHandle) {
        self.lock().watched.insert(playlist);
    }

    fn playlist_name(&self, playlist: PlaylistHandle) -> Option<String> {
        self.lock()
            .playlists
            .get(playlist.0 as usize)
            .map(|entry| entry.name.clone())
    }

    fn playlist_is_loaded(&self, playlist: PlaylistHandle) -> bool {
        self.lock()
            .playlists
            .get(playlist.0 as usize)
            .is_some_and(|entry| entry.loaded)
    }

    fn playlist_tracks(&self, playlist: PlaylistHandle) -> Vec<TrackHandle> {
        self.lock()
            .playlists
            .get(playlist.0 as usize)
            .map(|entry| entry.tracks.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::CatalogFixture;

    /// Tracks in [`numbered_fixture`].
    pub const NUMBERED_TRACKS: usize = 10;

    pub fn numbered_is_available(index: usize) -> bool {
        index % 3 != 1
    }

    pub fn sample_fixture() -> CatalogFixture {
        let cover = "0a".repeat(20);
        serde_json::from_value(serde_json::json!({
            "users": [
                {"username": "alice", "password": "secret", "display_name": "Alice"}
            ],
            "artists": [
                {"id": "ar1", "name": "The Examples"},
                {"id": "ar2", "name": "Guest Star"},
                {"id": "ar3", "name": "Various Artists"}
            ],
            "albums": [
                {"id": "al1", "name": "First Light", "year": 2001, "artist": "ar1", "cover": cover},
                {"id": "al2", "name": "Second Wind", "year": 2005, "artist": "ar1"},
                {"id": "al3", "name": "Radio Edit", "year": 2003, "artist": "ar1", "album_type": "single"},
                {"id": "al4", "name": "Hits Collection", "year": 2004, "artist": "ar3"},
                {"id": "al5", "name": "Lost Tapes", "year": 2010, "artist": "ar1", "available": false},
                {"id": "al6", "name": "after Dark", "year": 2005, "artist": "ar1"},
                {"id": "al7", "name": "Undated", "artist": "ar2"}
            ],
            "tracks": [
                {"id": "t1", "name": "Opening", "artists": ["ar1"], "album": "al1", "duration_ms": 1000, "popularity": 50, "index": 1},
                {"id": "t2", "name": "Closing", "artists": ["ar1", "ar2"], "album": "al1", "duration_ms": 2000, "popularity": 80, "index": 2},
                {"id": "t3", "name": "Wind Up", "artists": ["ar1"], "album": "al2", "duration_ms": 1500, "index": 1},
                {"id": "t4", "name": "Radio One", "artists": ["ar1"], "album": "al3", "duration_ms": 1200, "index": 1},
                {"id": "t5", "name": "Hit Track", "artists": ["ar1"], "album": "al4", "duration_ms": 900, "index": 3},
                {"id": "t6", "name": "Lost Song", "artists": ["ar1"], "album": "al5", "duration_ms": 900, "index": 1},
                {"id": "t7", "name": "Dark Song", "artists": ["ar1"], "album": "al6", "duration_ms": 800, "index": 1},
                {"id": "t8", "name": "Slow Loader", "artists": ["ar1"], "album": "al1", "duration_ms": 1000, "index": 3, "load_polls": 3},
                {"id": "t9", "name": "Broken", "artists": ["ar1"], "album": "al1", "duration_ms": 1000, "index": 4,
                 "error": "Track is not available in your region"},
                {"id": "t10", "name": "Unavailable", "artists": ["ar1"], "album": "al2", "duration_ms": 1000, "index": 2, "available": false}
            ],
            "playlists": [
                {"id": "pl1", "name": "Road Trip", "tracks": ["t1", "t2", "t3"]},
                {"id": "pl2", "name": "-"},
                {"id": "pl3", "name": "Chill", "tracks": ["t4", "t10", "t7"]},
                {"id": "pl4", "name": "Pending", "tracks": ["t1"], "loaded": false}
            ]
        }))
        .expect("sample fixture should deserialize")
    }

    pub fn numbered_fixture() -> CatalogFixture {
        let tracks: Vec<serde_json::Value> = (0..NUMBERED_TRACKS)
            .map(|index| {
                serde_json::json!({
                    "id": format!("n{index}"),
                    "name": format!("Number {index}"),
                    "artists": ["ar1"],
                    "album": "al1",
                    "duration_ms": 1000,
                    "available": numbered_is_available(index)
                })
            })
            .collect();
        serde_json::from_value(serde_json::json!({
            "artists": [{"id": "ar1", "name": "Counter"}],
            "albums": [{"id": "al1", "name": "Numbers", "year": 2020, "artist": "ar1"}],
            "tracks": tracks,
            "playlists": [{"id": "numbered", "name": "Numbered"}]
        }))
        .expect("numbered fixture should deserialize")
    }
}
