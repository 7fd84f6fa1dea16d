//! Session worker: the single thread allowed to touch the content session.
//!
//! Messages are handled one at a time in FIFO order. After each message the
//! session's event step is driven until it asks for a non-zero pause, and the
//! next wait on the queue is bounded by that pause.

use std::collections::HashMap;
use std::io;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, trace, warn};

use crate::app_context::BridgeContext;
use crate::audio_delivery::AudioDelivery;
use crate::backends::{
    AlbumHandle, ArtistHandle, ContentSession, ObjectRef, RequestId, SearchResult,
    SessionFactory, SessionSettings, TrackHandle,
};
use crate::browse::{self, add_dir, BrowseKind, BrowseTarget};
use crate::credentials::CredentialResponse;
use crate::error::BridgeError;
use crate::external_ref::ExternalRef;
use crate::media_pipe::{MediaPipe, PlaybackEvent};
use crate::metadata::binding_registry::BoundField;
use crate::metadata::BindContext;
use crate::playlist::PlaylistCollection;
use crate::prop_tree::PropNode;
use crate::protocol::{
    ImageRequest, ListOptions, ListRequest, Mailbox, Message, Notification, OpenPageRequest,
    OpenTrackRequest, ParentRequest, PlayTrackRequest, Reply, SessionEvent,
};
use crate::retry::{PendingParent, PendingPlay, PlayPoll, RetryRegistry};
use crate::service_uri::{artist_section_uri, AlbumSection, ServiceUri};

const LOGIN_TITLE: &str = "Login to the content service";

struct PendingImage {
    reply: Reply<Vec<u8>>,
    _image: ExternalRef,
}

/// Starts the worker thread. The session is created on that thread, so it
/// never has to cross threads.
pub(crate) fn spawn_worker(
    ctx: BridgeContext,
    factory: SessionFactory,
    mailbox: Mailbox,
    receiver: Receiver<Message>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("session-worker".to_string())
        .spawn(move || {
            let cache_location = ctx.config.session.cache_dir();
            let settings = SessionSettings {
                settings_location: cache_location.join("settings"),
                cache_location,
                user_agent: ctx.config.session.user_agent.clone(),
            };
            match factory(settings, mailbox.clone()) {
                Ok(session) => SessionWorker::new(session, ctx, mailbox, receiver).run(),
                Err(err) => {
                    error!("SessionWorker: failed to create content session: {}", err);
                    ctx.nodes
                        .status
                        .set_string(&format!("Unable to start session: {err}"));
                    ctx.notify(Notification::error(format!(
                        "Unable to start content session: {err}"
                    )));
                    ctx.login.wake();
                    // Dropping the receiver fails every queued and later request.
                }
            }
        })
}

struct SessionWorker {
    session: Box<dyn ContentSession>,
    ctx: BridgeContext,
    mailbox: Mailbox,
    receiver: Receiver<Message>,
    playlists: PlaylistCollection,
    retry: RetryRegistry,
    audio: AudioDelivery,
    pending_browses: HashMap<RequestId, BrowseTarget>,
    pending_images: HashMap<RequestId, PendingImage>,
    next_request: RequestId,
}

impl SessionWorker {
    fn new(
        session: Box<dyn ContentSession>,
        ctx: BridgeContext,
        mailbox: Mailbox,
        receiver: Receiver<Message>,
    ) -> Self {
        let playlists =
            PlaylistCollection::new(ctx.nodes.playlists.clone(), ctx.nodes.syncing.clone());
        let audio = AudioDelivery::new(ctx.active_pipe.clone(), ctx.config.audio.queue_watermark);
        Self {
            session,
            ctx,
            mailbox,
            receiver,
            playlists,
            retry: RetryRegistry::new(),
            audio,
            pending_browses: HashMap::new(),
            pending_images: HashMap::new(),
            next_request: 0,
        }
    }

    fn run(mut self) {
        info!("SessionWorker: started");
        self.try_login(None);
        let mut timeout = self.drive_session();

        loop {
            let message = match timeout {
                Some(wait) => match self.receiver.recv_timeout(wait) {
                    Ok(message) => Some(message),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match self.receiver.recv() {
                    Ok(message) => Some(message),
                    Err(_) => break,
                },
            };
            if let Some(message) = message {
                self.handle_message(message);
            }
            timeout = self.drive_session();
        }
        info!("SessionWorker: queue closed, exiting");
    }

    /// Runs the session's event step until it has no immediate work. Returns
    /// how long the queue wait may last, `None` for no limit.
    fn drive_session(&mut self) -> Option<Duration> {
        loop {
            let next = self.session.process_events(&mut self.audio);
            if next == Duration::MAX {
                return None;
            }
            if !next.is_zero() {
                return Some(next);
            }
        }
    }

    fn next_request_id(&mut self) -> RequestId {
        self.next_request += 1;
        self.next_request
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::PendingEvent => trace!("SessionWorker: session asked for an event pass"),
            Message::Session(event) => self.handle_session_event(event),
            Message::Logout => {
                if self.ctx.login.is_logged_in() {
                    info!("SessionWorker: logging out");
                    self.session.logout();
                } else {
                    debug!("SessionWorker: logout requested while not logged in");
                    self.ctx.login.wake();
                }
            }
            Message::OpenPage(request) => self.open_page(request),
            Message::OpenTrack(request) => self.open_track(request),
            Message::List(request) => self.list(request),
            Message::PlayTrack(request) => self.play_track(request),
            Message::StopPlayback => {
                debug!("SessionWorker: stopping playback");
                self.session.player_unload();
                self.audio.stop();
            }
            Message::Release(object) => self.session.release(object),
            Message::Seek(position_ms) => {
                debug!("SessionWorker: seek to {} ms", position_ms);
                // Queued audio predates the seek target.
                if let Some(pipe) = self.active_pipe() {
                    pipe.flush();
                }
                self.audio.set_seek_target(position_ms);
                self.session.player_seek(position_ms);
            }
            Message::Pause(paused) => {
                if let Err(err) = self.session.player_play(!paused) {
                    warn!("SessionWorker: unable to set pause={}: {}", paused, err);
                }
            }
            Message::GetImage(request) => self.get_image(request),
            Message::GetParent(request) => self.get_parent(request),
        }
    }

    fn try_login(&mut self, reason: Option<&str>) {
        self.ctx.nodes.status.set_string("Attempting login");
        let force_prompt = reason.is_some();
        let mut response = self
            .ctx
            .credentials
            .request(LOGIN_TITLE, reason, force_prompt);
        if response == CredentialResponse::Missing {
            // Nothing stored; ask the user directly.
            response = self.ctx.credentials.request(LOGIN_TITLE, reason, true);
        }
        match response {
            CredentialResponse::Provided { username, password } => {
                info!("SessionWorker: logging in as {}", username);
                self.session.login(&username, &password);
            }
            CredentialResponse::Missing | CredentialResponse::Cancelled => {
                info!("SessionWorker: login cancelled");
                self.ctx.nodes.status.set_string("Not logged in");
                self.ctx.login.wake();
            }
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::LoggedIn(Ok(())) => {
                let user = self.session.user_display_name().unwrap_or_default();
                info!("SessionWorker: logged in as {}", user);
                self.ctx
                    .nodes
                    .status
                    .set_string(&format!("Logged in as user: {user}"));
                self.ctx.login.set(true);
                let mut bind = BindContext {
                    session: self.session.as_mut(),
                    registry: &self.ctx.registry,
                    mailbox: &self.mailbox,
                };
                self.playlists.load_initial(&mut bind);
            }
            SessionEvent::LoggedIn(Err(reason)) => {
                warn!("SessionWorker: login failed: {}", reason);
                self.ctx
                    .nodes
                    .status
                    .set_string(&format!("Login failed: {reason}"));
                self.ctx
                    .notify(Notification::error(format!("Unable to login: {reason}")));
                self.try_login(Some(&reason));
            }
            SessionEvent::LoggedOut => {
                info!("SessionWorker: logged out");
                self.ctx.nodes.status.set_string("Not logged in");
                self.ctx.notify(Notification::info("Logged out"));
                self.ctx.login.set(false);
            }
            SessionEvent::ConnectionError(reason) => {
                warn!("SessionWorker: connection error: {}", reason);
                self.ctx
                    .notify(Notification::error(format!("Connection error: {reason}")));
            }
            SessionEvent::MetadataUpdated => {
                self.ctx.registry.refresh_all(self.session.as_ref());
                self.poll_retries();
            }
            SessionEvent::PlayTokenLost => {
                warn!("SessionWorker: play token lost");
                self.ctx.notify(Notification::info(
                    "Playback paused because the account is in use somewhere else",
                ));
                self.post_to_pipe(PlaybackEvent::InternalPause);
            }
            SessionEvent::EndOfTrack => {
                debug!("SessionWorker: end of track");
                self.post_to_pipe(PlaybackEvent::EndOfFile);
            }
            SessionEvent::LogMessage(text) => {
                debug!("SessionWorker: session: {}", text.trim_end_matches('\n'));
            }
            SessionEvent::ContainerLoaded => {
                debug!("SessionWorker: playlist container loaded");
                self.playlists.container_loaded();
            }
            SessionEvent::PlaylistAdded { playlist, position } => {
                let mut bind = BindContext {
                    session: self.session.as_mut(),
                    registry: &self.ctx.registry,
                    mailbox: &self.mailbox,
                };
                self.playlists.playlist_added(&mut bind, playlist, position);
            }
            SessionEvent::PlaylistRemoved { playlist, position } => {
                self.playlists.playlist_removed(playlist, position);
            }
            SessionEvent::PlaylistMoved { from, to, .. } => {
                self.playlists.playlist_moved(from, to);
            }
            SessionEvent::TracksAdded {
                playlist,
                tracks,
                position,
            } => {
                let mut bind = BindContext {
                    session: self.session.as_mut(),
                    registry: &self.ctx.registry,
                    mailbox: &self.mailbox,
                };
                match self.playlists.find_mut(playlist) {
                    Some(mirror) => mirror.add_tracks(&mut bind, position, &tracks),
                    None => warn!("SessionWorker: tracks added to unknown {:?}", playlist),
                }
            }
            SessionEvent::TracksRemoved {
                playlist,
                positions,
            } => match self.playlists.find_mut(playlist) {
                Some(mirror) => mirror.remove_tracks(&positions),
                None => warn!("SessionWorker: tracks removed from unknown {:?}", playlist),
            },
            SessionEvent::TracksMoved {
                playlist,
                positions,
                new_position,
            } => match self.playlists.find_mut(playlist) {
                Some(mirror) => mirror.move_tracks(&positions, new_position),
                None => warn!("SessionWorker: tracks moved in unknown {:?}", playlist),
            },
            SessionEvent::PlaylistRenamed(playlist) => {
                let bind = BindContext {
                    session: self.session.as_mut(),
                    registry: &self.ctx.registry,
                    mailbox: &self.mailbox,
                };
                if let Some(mirror) = self.playlists.find_mut(playlist) {
                    mirror.update_name(&bind);
                }
            }
            SessionEvent::PlaylistStateChanged(playlist) => {
                let bind = BindContext {
                    session: self.session.as_mut(),
                    registry: &self.ctx.registry,
                    mailbox: &self.mailbox,
                };
                if let Some(mirror) = self.playlists.find_mut(playlist) {
                    mirror.capture_url(&bind);
                }
            }
            SessionEvent::AlbumBrowsed {
                request,
                album,
                tracks,
            } => self.album_browsed(request, album, tracks),
            SessionEvent::ArtistBrowsed {
                request,
                artist,
                tracks,
            } => self.artist_browsed(request, artist, tracks),
            SessionEvent::SearchCompleted { request, result } => {
                self.search_completed(request, result)
            }
            SessionEvent::ImageLoaded { request, result } => {
                match self.pending_images.remove(&request) {
                    Some(pending) => {
                        let _ = pending.reply.send(result.map_err(BridgeError::ImageLoad));
                    }
                    None => debug!("SessionWorker: unclaimed image result {}", request),
                }
            }
        }
    }

    fn active_pipe(&self) -> Option<MediaPipe> {
        self.ctx
            .active_pipe
            .lock()
            .expect("active pipe lock poisoned")
            .clone()
    }

    fn post_to_pipe(&self, event: PlaybackEvent) {
        match self.active_pipe() {
            Some(pipe) => pipe.post_event(event),
            None => debug!("SessionWorker: no active pipe for {:?}", event),
        }
    }

    /// Re-checks requests parked on loading tracks.
    fn poll_retries(&mut self) {
        match self.retry.poll_play(self.session.as_ref()) {
            Some(PlayPoll::Ready(pending)) => self.start_playback(pending),
            Some(PlayPoll::Failed(pending, reason)) => {
                warn!("SessionWorker: unable to load {}: {}", pending.uri, reason);
                let _ = pending.reply.send(Err(BridgeError::TrackLoad(reason)));
            }
            None => {}
        }
        for (pending, result) in self.retry.poll_parents(self.session.as_ref()) {
            debug!("SessionWorker: parent of {} resolved: {:?}", pending.uri, result);
            let _ = pending.reply.send(result);
        }
    }

    fn resolve(&mut self, uri: &str) -> Option<ObjectRef> {
        self.session.resolve(uri)
    }

    fn play_track(&mut self, request: PlayTrackRequest) {
        let PlayTrackRequest { uri, reply } = request;
        let track = match self.resolve(&uri) {
            None => {
                let _ = reply.send(Err(BridgeError::InvalidUri));
                return;
            }
            Some(object @ ObjectRef::Track(_)) => {
                ExternalRef::retain(self.session.as_mut(), object, &self.mailbox)
            }
            Some(_) => {
                let _ = reply.send(Err(BridgeError::NotATrack));
                return;
            }
        };
        debug!("SessionWorker: play requested for {}", uri);
        if let Some(previous) = self.retry.park_play(PendingPlay { uri, track, reply }) {
            warn!("SessionWorker: {} replaced by a newer play request", previous.uri);
            let _ = previous.reply.send(Err(BridgeError::TrackLoad(
                "Replaced by another play request".to_string(),
            )));
        }
        self.poll_retries();
    }

    fn start_playback(&mut self, pending: PendingPlay) {
        let PendingPlay { uri, track, reply } = pending;
        let Some(handle) = track.track() else {
            let _ = reply.send(Err(BridgeError::NotATrack));
            return;
        };
        if let Err(err) = self.session.player_load(handle) {
            warn!("SessionWorker: unable to load {}: {}", uri, err);
            let _ = reply.send(Err(BridgeError::TrackLoad(err)));
            return;
        }
        if let Some(pipe) = self.active_pipe() {
            pipe.become_primary();
        }
        self.audio.start();
        if let Err(err) = self.session.player_play(true) {
            warn!("SessionWorker: unable to play {}: {}", uri, err);
            self.audio.stop();
            self.session.player_unload();
            let _ = reply.send(Err(BridgeError::TrackPlay(err)));
            return;
        }
        info!("SessionWorker: playing {}", uri);
        let _ = reply.send(Ok(()));
    }

    fn get_parent(&mut self, request: ParentRequest) {
        let ParentRequest { uri, reply } = request;
        let track = match self.resolve(&uri) {
            None => {
                let _ = reply.send(Err(BridgeError::InvalidUri));
                return;
            }
            Some(object @ ObjectRef::Track(_)) => {
                ExternalRef::retain(self.session.as_mut(), object, &self.mailbox)
            }
            Some(_) => {
                let _ = reply.send(Err(BridgeError::NotATrackForParent));
                return;
            }
        };
        self.retry.park_parent(PendingParent { uri, track, reply });
        self.poll_retries();
    }

    fn get_image(&mut self, request: ImageRequest) {
        let ImageRequest { id, reply } = request;
        let request = self.next_request_id();
        let image = self.session.load_image(id, request);
        self.pending_images.insert(
            request,
            PendingImage {
                reply,
                _image: ExternalRef::adopt(ObjectRef::Image(image), &self.mailbox),
            },
        );
    }

    fn open_track(&mut self, request: OpenTrackRequest) {
        let Some(object @ ObjectRef::Track(track)) = self.resolve(&request.uri) else {
            warn!("SessionWorker: {} is not a playable track", request.uri);
            return;
        };
        debug!("SessionWorker: opening track {:?}", object);
        let metadata = self.ctx.nodes.tree.create_detached(Some("metadata"));
        self.ctx.registry.bind(
            self.session.as_mut(),
            &self.mailbox,
            &metadata,
            BoundField::Track(track),
            None,
        );
        self.ctx
            .play_queue
            .enqueue(&request.uri, request.parent.as_deref(), metadata);
    }

    fn open_page(&mut self, request: OpenPageRequest) {
        let OpenPageRequest { uri, root } = request;
        root.create("type").set_string("directory");
        if let Err(err) = self.fill_page(&uri, &root) {
            warn!("SessionWorker: unable to open {}: {}", uri, err);
            root.create("type").set_string("openerror");
            root.create("error").set_string(&err.to_string());
            root.create("loading").set_int(0);
        }
    }

    fn fill_page(&mut self, uri: &str, root: &PropNode) -> Result<(), BridgeError> {
        let parsed = ServiceUri::parse(uri).ok_or(BridgeError::InvalidUri)?;
        match parsed {
            ServiceUri::Playlists => {
                root.create("view").set_string("list");
                root.create("title").set_string("Playlists");
                root.create("nodes").link(&self.ctx.nodes.playlists);
                root.create("loading").link(&self.ctx.nodes.syncing);
            }
            ServiceUri::Search(query) => {
                root.create("title").set_string(&query);
                let limits = self.ctx.config.browse.search_limits();
                let request = self.next_request_id();
                self.pending_browses.insert(
                    request,
                    BrowseTarget {
                        nodes: root.create("nodes"),
                        page: Some(root.clone()),
                        kind: BrowseKind::Search {
                            query: query.clone(),
                        },
                    },
                );
                debug!("SessionWorker: searching for '{}'", query);
                self.session.search(&query, limits, request);
            }
            ServiceUri::Album(_) => {
                let Some(ObjectRef::Album(album)) = self.resolve(uri) else {
                    return Err(BridgeError::InvalidUri);
                };
                for (name, field) in [
                    ("album_name", BoundField::AlbumName(album)),
                    ("title", BoundField::AlbumName(album)),
                    ("album_year", BoundField::AlbumYear(album)),
                    ("album_art", BoundField::AlbumImage(album)),
                    ("artist_name", BoundField::AlbumArtistName(album)),
                ] {
                    self.ctx.registry.bind(
                        self.session.as_mut(),
                        &self.mailbox,
                        &root.create(name),
                        field,
                        None,
                    );
                }
                root.create("view").set_string("album");
                self.start_browse(
                    root.create("nodes"),
                    Some(root.clone()),
                    BrowseKind::Album,
                    ObjectRef::Album(album),
                );
            }
            ServiceUri::Artist { section, .. } => {
                let Some(ObjectRef::Artist(artist)) = self.resolve(uri) else {
                    return Err(BridgeError::InvalidUri);
                };
                self.ctx.registry.bind(
                    self.session.as_mut(),
                    &self.mailbox,
                    &root.create("title"),
                    BoundField::ArtistName(artist),
                    None,
                );
                let nodes = root.create("nodes");
                match section {
                    None => {
                        add_sections(&nodes, &parsed_base(uri));
                        root.create("view").set_string("list");
                        root.create("loading").set_int(0);
                    }
                    Some(section) => {
                        root.create("view").set_string("albumcollection");
                        self.start_browse(
                            nodes,
                            Some(root.clone()),
                            BrowseKind::Artist {
                                album_type: section.album_type(),
                                flat: false,
                            },
                            ObjectRef::Artist(artist),
                        );
                    }
                }
            }
            ServiceUri::Playlist(_) => {
                let base = parsed_base(uri);
                let mirror = self
                    .playlists
                    .find_by_url(&base)
                    .ok_or_else(|| BridgeError::PlaylistNotFound(base.clone()))?;
                root.create("view").set_string("list");
                root.create("title").link(mirror.title());
                root.create("nodes").link(mirror.nodes());
                root.create("loading").set_int(0);
            }
            other @ (ServiceUri::Track(_) | ServiceUri::Image(_)) => {
                return Err(BridgeError::UnsupportedLink(other.kind().as_str().to_string()));
            }
        }
        Ok(())
    }

    fn start_browse(
        &mut self,
        nodes: PropNode,
        page: Option<PropNode>,
        kind: BrowseKind,
        object: ObjectRef,
    ) {
        let request = self.next_request_id();
        self.pending_browses
            .insert(request, BrowseTarget { nodes, page, kind });
        match object {
            ObjectRef::Album(album) => self.session.browse_album(album, request),
            ObjectRef::Artist(artist) => self.session.browse_artist(artist, request),
            other => {
                warn!("SessionWorker: cannot browse {:?}", other);
                self.pending_browses.remove(&request);
            }
        }
    }

    fn list(&mut self, request: ListRequest) {
        let ListRequest {
            uri,
            options,
            reply,
        } = request;
        let result = self.list_uri(&uri, options);
        if let Err(err) = &result {
            debug!("SessionWorker: list {} failed: {}", uri, err);
        }
        let _ = reply.send(result);
    }

    fn list_uri(&mut self, uri: &str, options: ListOptions) -> Result<PropNode, BridgeError> {
        let parsed = ServiceUri::parse(uri).ok_or(BridgeError::InvalidUri)?;
        let root = self.ctx.nodes.tree.create_detached(None);
        root.create("type").set_string("directory");
        let nodes = root.create("nodes");
        match parsed {
            ServiceUri::Album(_) => {
                let Some(object @ ObjectRef::Album(_)) = self.resolve(uri) else {
                    root.destroy();
                    return Err(BridgeError::InvalidUri);
                };
                self.start_browse(nodes, None, BrowseKind::Album, object);
            }
            ServiceUri::Artist { section, .. } => {
                let Some(object @ ObjectRef::Artist(_)) = self.resolve(uri) else {
                    root.destroy();
                    return Err(BridgeError::InvalidUri);
                };
                if options.expand_artist_albums {
                    let section = section.unwrap_or(AlbumSection::Albums);
                    self.start_browse(
                        nodes,
                        None,
                        BrowseKind::Artist {
                            album_type: section.album_type(),
                            flat: true,
                        },
                        object,
                    );
                } else {
                    add_sections(&nodes, &parsed_base(uri));
                }
            }
            ServiceUri::Playlist(_) => {
                let base = parsed_base(uri);
                match self.playlists.find_by_url(&base) {
                    Some(mirror) => nodes.link(mirror.nodes()),
                    None => {
                        root.destroy();
                        return Err(BridgeError::PlaylistNotFound(base));
                    }
                }
            }
            other => {
                root.destroy();
                return Err(BridgeError::UnsupportedLink(other.kind().as_str().to_string()));
            }
        }
        Ok(root)
    }

    /// Takes ownership of the references that came with a browse result.
    fn adopt_results(&self, objects: impl IntoIterator<Item = ObjectRef>) -> Vec<ExternalRef> {
        objects
            .into_iter()
            .map(|object| ExternalRef::adopt(object, &self.mailbox))
            .collect()
    }

    fn album_browsed(&mut self, request: RequestId, album: AlbumHandle, tracks: Vec<TrackHandle>) {
        let _results = self.adopt_results(tracks.iter().copied().map(ObjectRef::Track));
        if let Some(target) = self.pending_browses.remove(&request) {
            debug!("SessionWorker: {:?} browsed, {} tracks", album, tracks.len());
            let mut bind = BindContext {
                session: self.session.as_mut(),
                registry: &self.ctx.registry,
                mailbox: &self.mailbox,
            };
            browse::album_browsed(&mut bind, &target, &tracks);
            target.finish();
        }
        self.poll_retries();
    }

    fn artist_browsed(
        &mut self,
        request: RequestId,
        artist: ArtistHandle,
        tracks: Vec<TrackHandle>,
    ) {
        let _results = self.adopt_results(tracks.iter().copied().map(ObjectRef::Track));
        if let Some(target) = self.pending_browses.remove(&request) {
            debug!("SessionWorker: {:?} browsed, {} tracks", artist, tracks.len());
            let mut bind = BindContext {
                session: self.session.as_mut(),
                registry: &self.ctx.registry,
                mailbox: &self.mailbox,
            };
            browse::artist_browsed(&mut bind, &target, artist, &tracks);
            target.finish();
        }
        self.poll_retries();
    }

    fn search_completed(&mut self, request: RequestId, result: SearchResult) {
        let objects = result
            .tracks
            .iter()
            .copied()
            .map(ObjectRef::Track)
            .chain(result.albums.iter().copied().map(ObjectRef::Album))
            .chain(result.artists.iter().copied().map(ObjectRef::Artist));
        let _results = self.adopt_results(objects);
        if let Some(target) = self.pending_browses.remove(&request) {
            let mut bind = BindContext {
                session: self.session.as_mut(),
                registry: &self.ctx.registry,
                mailbox: &self.mailbox,
            };
            browse::search_completed(&mut bind, &target, &result);
            target.finish();
        }
        self.poll_retries();
    }
}

/// URI without any fragment.
fn parsed_base(uri: &str) -> String {
    ServiceUri::parse(uri).map_or_else(|| uri.to_string(), |parsed| parsed.base_uri())
}

fn add_sections(nodes: &PropNode, artist_uri: &str) {
    for section in AlbumSection::ALL {
        add_dir(nodes, section.title(), &artist_section_uri(artist_uri, section));
    }
}
