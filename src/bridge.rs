//! Blocking facade over the session worker.
//!
//! Every call builds a message, hands it to the worker and, where a result is
//! expected, blocks on that request's own reply channel.

use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{broadcast, oneshot};

use crate::app_context::{BridgeContext, LoginState, SharedNodes};
use crate::audio_delivery::ActivePipe;
use crate::backends::SessionFactory;
use crate::config::Config;
use crate::credentials::CredentialPrompt;
use crate::error::BridgeError;
use crate::image_pipeline::{decode_image, Pixmap};
use crate::media_pipe::{MediaPipe, PipeControl, PlaybackEvent};
use crate::metadata::binding_registry::MetadataRegistry;
use crate::play_queue::PlayQueue;
use crate::prop_tree::{PropNode, PropTree};
use crate::protocol::{
    ImageRequest, ListOptions, ListRequest, Mailbox, Message, Notification, OpenPageRequest,
    OpenTrackRequest, ParentRequest, PlayTrackRequest, Reply,
};
use crate::service_uri::{self, parse_image_uri, ServiceUri};
use crate::session_worker::spawn_worker;

const NOTIFICATION_CAPACITY: usize = 64;

/// Services the bridge consumes from its embedder.
pub struct Collaborators {
    pub tree: Arc<PropTree>,
    pub credentials: Arc<dyn CredentialPrompt>,
    pub play_queue: Arc<dyn PlayQueue>,
}

type Startup = (SessionFactory, Receiver<Message>);

/// Entry point for every thread that needs the content session.
///
/// The worker is started on first use.
pub struct ContentBridge {
    ctx: BridgeContext,
    mailbox: Mailbox,
    startup: Mutex<Option<Startup>>,
    play_gate: Mutex<()>,
}

impl ContentBridge {
    pub fn new(config: Config, collaborators: Collaborators, factory: SessionFactory) -> Self {
        let (mailbox, receiver) = Mailbox::channel();
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let ctx = BridgeContext {
            config,
            nodes: SharedNodes::new(collaborators.tree),
            registry: MetadataRegistry::new(),
            active_pipe: ActivePipe::default(),
            login: Arc::new(LoginState::default()),
            notifications,
            credentials: collaborators.credentials,
            play_queue: collaborators.play_queue,
        };
        Self {
            ctx,
            mailbox,
            startup: Mutex::new(Some((factory, receiver))),
            play_gate: Mutex::new(()),
        }
    }

    fn ensure_started(&self) {
        let startup = self
            .startup
            .lock()
            .expect("bridge startup lock poisoned")
            .take();
        let Some((factory, receiver)) = startup else {
            return;
        };
        info!("ContentBridge: starting session worker");
        if let Err(err) = spawn_worker(self.ctx.clone(), factory, self.mailbox.clone(), receiver) {
            error!("ContentBridge: failed to spawn session worker: {}", err);
            self.ctx.notify(Notification::error(format!(
                "Unable to start content session: {err}"
            )));
        }
    }

    fn send(&self, message: Message) -> Result<(), BridgeError> {
        self.ensure_started();
        if self.mailbox.send(message) {
            Ok(())
        } else {
            Err(BridgeError::SessionUnavailable)
        }
    }

    /// Fire-and-forget message from the playback loop.
    fn post(&self, message: Message) {
        if self.send(message).is_err() {
            debug!("ContentBridge: worker gone, dropping playback message");
        }
    }

    fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Message) -> Result<T, BridgeError> {
        let (reply, receiver) = oneshot::channel();
        self.send(build(reply))?;
        receiver
            .blocking_recv()
            .map_err(|_| BridgeError::SessionUnavailable)?
    }

    /// Returns true if `uri` uses the service scheme.
    pub fn can_handle(&self, uri: &str) -> bool {
        service_uri::can_handle(uri)
    }

    /// Opens a URI. Tracks go to the play queue and yield `None`; anything
    /// else yields a page root that is filled asynchronously.
    pub fn open(&self, uri: &str, parent: Option<&str>) -> Result<Option<PropNode>, BridgeError> {
        let parsed = ServiceUri::parse(uri).ok_or(BridgeError::InvalidUri)?;
        if let ServiceUri::Track(_) = parsed {
            self.open_track(uri, parent)?;
            return Ok(None);
        }
        let root = self.ctx.nodes.tree.create_detached(Some("page"));
        root.create("url").set_string(uri);
        root.create("loading").set_int(1);
        self.send(Message::OpenPage(OpenPageRequest {
            uri: uri.to_string(),
            root: root.clone(),
        }))?;
        Ok(Some(root))
    }

    /// Hands a track to the play queue without waiting.
    pub fn open_track(&self, uri: &str, parent: Option<&str>) -> Result<(), BridgeError> {
        self.send(Message::OpenTrack(OpenTrackRequest {
            uri: uri.to_string(),
            parent: parent.map(str::to_string),
        }))
    }

    /// Lists a container URI with the configured defaults.
    pub fn list(&self, uri: &str) -> Result<PropNode, BridgeError> {
        self.list_with(
            uri,
            ListOptions {
                expand_artist_albums: self.ctx.config.browse.expand_artist_albums,
            },
        )
    }

    /// Returns a detached node whose `nodes` child lists the container.
    pub fn list_with(&self, uri: &str, options: ListOptions) -> Result<PropNode, BridgeError> {
        self.request(|reply| {
            Message::List(ListRequest {
                uri: uri.to_string(),
                options,
                reply,
            })
        })
    }

    /// Plays a track into `pipe` and blocks until playback ends. Returns the
    /// event that ended it.
    ///
    /// Only one playback session runs at a time; a second caller waits here
    /// until the first has returned.
    pub fn play(&self, uri: &str, pipe: &MediaPipe) -> Result<PlaybackEvent, BridgeError> {
        let _gate = self.play_gate.lock().expect("play gate lock poisoned");
        self.set_active_pipe(Some(pipe.clone()));

        let started = self.request(|reply| {
            Message::PlayTrack(PlayTrackRequest {
                uri: uri.to_string(),
                reply,
            })
        });
        if let Err(err) = started {
            warn!("ContentBridge: unable to play {}: {}", uri, err);
            self.set_active_pipe(None);
            self.post(Message::StopPlayback);
            return Err(err);
        }

        pipe.set_caps(true, true);
        let mut hold = false;
        pipe.set_play_status(hold);
        let outcome = self.run_playback(pipe, &mut hold);

        if hold {
            // Leave neither the session nor the sink paused for the next track.
            self.apply_hold(pipe, false, true);
        }
        pipe.set_stopped();
        self.set_active_pipe(None);
        self.post(Message::StopPlayback);
        debug!("ContentBridge: playback of {} ended with {:?}", uri, outcome);
        Ok(outcome)
    }

    fn set_active_pipe(&self, pipe: Option<MediaPipe>) {
        *self
            .ctx
            .active_pipe
            .lock()
            .expect("active pipe lock poisoned") = pipe;
    }

    fn run_playback(&self, pipe: &MediaPipe, hold: &mut bool) -> PlaybackEvent {
        let mut lost_focus = false;
        let mut end_of_file = false;
        loop {
            let event = if end_of_file {
                // Let the sink drain, but keep serving events meanwhile.
                match pipe.wait_for_empty_queues() {
                    Some(event) => event,
                    None => return PlaybackEvent::EndOfFile,
                }
            } else {
                pipe.dequeue_event()
            };

            match event {
                PlaybackEvent::EndOfFile => end_of_file = true,
                event if event.is_terminal() => {
                    pipe.flush();
                    return event;
                }
                PlaybackEvent::Seek { position_us } => {
                    let position_ms = u32::try_from(position_us / 1000).unwrap_or(u32::MAX);
                    self.post(Message::Seek(position_ms));
                }
                PlaybackEvent::PlayPause | PlaybackEvent::Play | PlaybackEvent::Pause => {
                    *hold = match event {
                        PlaybackEvent::Play => false,
                        PlaybackEvent::Pause => true,
                        _ => !*hold,
                    };
                    lost_focus = false;
                    self.apply_hold(pipe, *hold, true);
                }
                PlaybackEvent::NoLongerPrimary => {
                    *hold = true;
                    lost_focus = true;
                    self.apply_hold(pipe, true, true);
                }
                PlaybackEvent::IsPrimary => {
                    if lost_focus {
                        *hold = false;
                        lost_focus = false;
                        self.apply_hold(pipe, false, true);
                    }
                }
                PlaybackEvent::InternalPause => {
                    // The session already stopped producing audio.
                    *hold = true;
                    lost_focus = false;
                    self.apply_hold(pipe, true, false);
                }
                _ => {}
            }
        }
    }

    fn apply_hold(&self, pipe: &MediaPipe, hold: bool, tell_session: bool) {
        if tell_session {
            self.post(Message::Pause(hold));
        }
        pipe.send_control(if hold {
            PipeControl::Pause
        } else {
            PipeControl::Play
        });
        pipe.set_play_status(hold);
    }

    /// Fetches and decodes `svc:image:<40 hex digits>`.
    pub fn load_image(&self, uri: &str) -> Result<Pixmap, BridgeError> {
        let id = parse_image_uri(uri).ok_or(BridgeError::InvalidImageUri)?;
        let bytes = self.request(|reply| Message::GetImage(ImageRequest { id, reply }))?;
        decode_image(&bytes).map_err(BridgeError::ImageDecode)
    }

    /// Album URI of a track URI.
    pub fn get_parent(&self, uri: &str) -> Result<String, BridgeError> {
        self.request(|reply| {
            Message::GetParent(ParentRequest {
                uri: uri.to_string(),
                reply,
            })
        })
    }

    /// Logs out and waits, bounded by the configured timeout, for the session
    /// to confirm.
    pub fn shutdown(&self) {
        if self
            .startup
            .lock()
            .expect("bridge startup lock poisoned")
            .is_some()
        {
            debug!("ContentBridge: shutdown before start");
            return;
        }
        if self.send(Message::Logout).is_err() {
            return;
        }
        let timeout = Duration::from_millis(self.ctx.config.shutdown.logout_timeout_ms);
        if self.ctx.login.wait_logged_out(timeout) {
            warn!(
                "ContentBridge: session still logged in after {} ms",
                timeout.as_millis()
            );
        } else {
            info!("ContentBridge: logged out");
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.ctx.login.is_logged_in()
    }

    /// Login status text node.
    pub fn status(&self) -> PropNode {
        self.ensure_started();
        self.ctx.nodes.status.clone()
    }

    /// Node holding one child per mirrored playlist.
    pub fn playlists(&self) -> PropNode {
        self.ensure_started();
        self.ctx.nodes.playlists.clone()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.ctx.notifications.subscribe()
    }

    pub fn tree(&self) -> &Arc<PropTree> {
        &self.ctx.nodes.tree
    }
}

#[cfg(test)]
mod tests {
    use super::{Collaborators, ContentBridge};
    use crate::backends::catalog::{test_support, CatalogHandle};
    use crate::backends::{ImageHandle, ObjectRef};
    use crate::config::Config;
    use crate::credentials::StaticCredentials;
    use crate::error::BridgeError;
    use crate::media_pipe::{MediaPipe, PipeControl, PlayStatus, PlaybackEvent};
    use crate::play_queue::LoggingPlayQueue;
    use crate::prop_tree::{PropNode, PropTree};
    use crate::protocol::{ListOptions, NotificationLevel};
    use crate::service_uri::image_uri;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::{Duration, Instant};

    struct Fixture {
        bridge: Arc<ContentBridge>,
        catalog: CatalogHandle,
        queue: Arc<LoggingPlayQueue>,
    }

    fn fixture() -> Fixture {
        fixture_with(Config::default())
    }

    fn fixture_with(config: Config) -> Fixture {
        let catalog = CatalogHandle::new(test_support::sample_fixture());
        let queue = Arc::new(LoggingPlayQueue::new());
        let bridge = ContentBridge::new(
            config,
            Collaborators {
                tree: PropTree::new(),
                credentials: Arc::new(StaticCredentials::new("alice", "secret")),
                play_queue: queue.clone(),
            },
            catalog.factory(),
        );
        Fixture {
            bridge: Arc::new(bridge),
            catalog,
            queue,
        }
    }

    fn wait_until(what: &str, condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn wait_logged_in(fixture: &Fixture) {
        // Any call starts the worker.
        let _ = fixture.bridge.status();
        wait_until("login", || fixture.bridge.is_logged_in());
    }

    fn titles(nodes: &PropNode) -> Vec<String> {
        nodes
            .children()
            .iter()
            .filter_map(|node| {
                node.get("metadata")
                    .and_then(|metadata| metadata.get("title"))
                    .and_then(|title| title.string())
            })
            .collect()
    }

    fn urls(nodes: &PropNode) -> Vec<String> {
        nodes
            .children()
            .iter()
            .filter_map(|node| node.get("url").and_then(|url| url.string()))
            .collect()
    }

    /// Consumes audio from `pipe` until told to stop.
    fn spawn_sink(pipe: MediaPipe) -> (Arc<AtomicBool>, thread::JoinHandle<()>) {
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        let handle = thread::spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                if pipe.pop_audio().is_none() {
                    thread::sleep(Duration::from_millis(1));
                }
            }
        });
        (done, handle)
    }

    #[test]
    fn test_list_artist_section_without_expansion_returns_sections() {
        let fixture = fixture();
        let root = fixture
            .bridge
            .list("svc:artist:ar1#albums")
            .expect("artist should list");
        let nodes = root.get("nodes").expect("nodes child");
        assert_eq!(titles(&nodes), vec!["Albums", "Singles", "Compilations"]);
        assert_eq!(
            urls(&nodes),
            vec![
                "svc:artist:ar1#albums",
                "svc:artist:ar1#singles",
                "svc:artist:ar1#compilations"
            ]
        );
    }

    #[test]
    fn test_list_artist_with_expansion_lists_section_tracks() {
        let fixture = fixture();
        let root = fixture
            .bridge
            .list_with(
                "svc:artist:ar1#singles",
                ListOptions {
                    expand_artist_albums: true,
                },
            )
            .expect("artist should list");
        let nodes = root.get("nodes").expect("nodes child");
        wait_until("singles", || !nodes.children().is_empty());
        assert_eq!(urls(&nodes), vec!["svc:track:t4"]);
    }

    #[test]
    fn test_list_errors() {
        let fixture = fixture();
        assert_eq!(
            fixture.bridge.list("svc:playlist:nowhere"),
            Err(BridgeError::PlaylistNotFound(
                "svc:playlist:nowhere".to_string()
            ))
        );
        assert_eq!(
            fixture.bridge.list("svc:track:t1"),
            Err(BridgeError::UnsupportedLink("track".to_string()))
        );
        assert_eq!(fixture.bridge.list("http://x"), Err(BridgeError::InvalidUri));
    }

    #[test]
    fn test_play_loading_track_runs_to_end_of_file() {
        let fixture = fixture();
        let pipe = MediaPipe::new("main");
        let (done, sink) = spawn_sink(pipe.clone());

        let outcome = fixture.bridge.play("svc:track:t8", &pipe);

        done.store(true, Ordering::SeqCst);
        sink.join().expect("sink panicked");
        assert_eq!(outcome, Ok(PlaybackEvent::EndOfFile));
        assert!(pipe.is_primary());
        wait_until("unload", || !fixture.catalog.is_playing());
    }

    #[test]
    fn test_play_permanent_error_terminates() {
        let fixture = fixture();
        let pipe = MediaPipe::new("main");
        assert_eq!(
            fixture.bridge.play("svc:track:t9", &pipe),
            Err(BridgeError::TrackLoad(
                "Track is not available in your region".to_string()
            ))
        );
        assert_eq!(
            fixture.bridge.play("svc:album:al1", &pipe),
            Err(BridgeError::NotATrack)
        );
    }

    #[test]
    fn test_pause_events_reach_session_and_pipe() {
        let fixture = fixture();
        let pipe = MediaPipe::new("main");
        let bridge = Arc::clone(&fixture.bridge);
        let player_pipe = pipe.clone();
        let player = thread::spawn(move || bridge.play("svc:track:t2", &player_pipe));

        wait_until("playback", || fixture.catalog.is_playing());
        pipe.post_event(PlaybackEvent::PlayPause);
        wait_until("pause", || !fixture.catalog.is_playing());
        pipe.post_event(PlaybackEvent::NoLongerPrimary);
        pipe.post_event(PlaybackEvent::IsPrimary);
        wait_until("resume", || fixture.catalog.is_playing());
        pipe.post_event(PlaybackEvent::Stop);

        let outcome = player.join().expect("player panicked");
        assert_eq!(outcome, Ok(PlaybackEvent::Stop));
        assert_eq!(
            pipe.controls(),
            vec![PipeControl::Pause, PipeControl::Pause, PipeControl::Play]
        );
        assert_eq!(pipe.audio_len(), 0);
    }

    #[test]
    fn test_second_play_waits_for_first_to_return() {
        let fixture = fixture();
        let first_pipe = MediaPipe::new("first");
        let second_pipe = MediaPipe::new("second");

        let bridge = Arc::clone(&fixture.bridge);
        let pipe = first_pipe.clone();
        let first = thread::spawn(move || bridge.play("svc:track:t2", &pipe));
        wait_until("first playback", || first_pipe.is_primary());

        let bridge = Arc::clone(&fixture.bridge);
        let pipe = second_pipe.clone();
        let second = thread::spawn(move || bridge.play("svc:track:t1", &pipe));
        thread::sleep(Duration::from_millis(100));
        assert!(!second_pipe.is_primary());
        assert!(!second.is_finished());

        first_pipe.post_event(PlaybackEvent::Stop);
        assert_eq!(
            first.join().expect("first player panicked"),
            Ok(PlaybackEvent::Stop)
        );

        wait_until("second playback", || second_pipe.is_primary());
        second_pipe.post_event(PlaybackEvent::NextTrack);
        assert_eq!(
            second.join().expect("second player panicked"),
            Ok(PlaybackEvent::NextTrack)
        );
    }

    #[test]
    fn test_failing_session_factory_makes_calls_unavailable() {
        let bridge = ContentBridge::new(
            Config::default(),
            Collaborators {
                tree: PropTree::new(),
                credentials: Arc::new(StaticCredentials::cancelling()),
                play_queue: Arc::new(LoggingPlayQueue::new()),
            },
            Box::new(|_, _| Err("offline".to_string())),
        );
        let mut notifications = bridge.subscribe_notifications();
        assert_eq!(
            bridge.get_parent("svc:track:t1"),
            Err(BridgeError::SessionUnavailable)
        );
        assert_eq!(
            bridge.list("svc:album:al1"),
            Err(BridgeError::SessionUnavailable)
        );
        let notification = notifications
            .try_recv()
            .expect("start-up failure should be announced");
        assert_eq!(notification.level, NotificationLevel::Error);
    }

    #[test]
    fn test_playlist_changes_are_mirrored_in_order() {
        let fixture = fixture();
        wait_logged_in(&fixture);
        wait_until("playlist import", || {
            fixture.bridge.list("svc:playlist:pl1").is_ok()
        });
        let root = fixture
            .bridge
            .list("svc:playlist:pl1")
            .expect("playlist should list");
        let nodes = root.get("nodes").expect("nodes child");
        assert_eq!(titles(&nodes), vec!["Opening", "Closing", "Wind Up"]);

        fixture.catalog.add_tracks("pl1", 1, &["t7"]);
        fixture.catalog.move_tracks("pl1", &[3], 0);
        fixture.catalog.remove_tracks("pl1", &[1]);
        wait_until("diffs", || {
            titles(&nodes) == vec!["Wind Up", "Dark Song", "Closing"]
        });

        fixture.catalog.rename_playlist("pl1", "-");
        wait_until("rename", || {
            fixture
                .bridge
                .playlists()
                .children()
                .first()
                .and_then(|playlist| playlist.get("type"))
                .and_then(|kind| kind.string())
                == Some("separator".to_string())
        });
    }

    #[test]
    fn test_open_album_page_fills_asynchronously() {
        let fixture = fixture();
        let page = fixture
            .bridge
            .open("svc:album:al2", None)
            .expect("album should open")
            .expect("album opens a page");
        wait_until("album browse", || {
            page.get("loading").and_then(|loading| loading.int()) == Some(0)
        });
        assert_eq!(
            page.get("view").and_then(|view| view.string()),
            Some("album".to_string())
        );
        assert_eq!(
            page.get("title").and_then(|title| title.string()),
            Some("Second Wind".to_string())
        );
        assert_eq!(
            page.get("album_year").and_then(|year| year.int()),
            Some(2005)
        );
        let nodes = page.get("nodes").expect("nodes child");
        assert_eq!(urls(&nodes), vec!["svc:track:t3", "svc:track:t10"]);
    }

    #[test]
    fn test_concurrent_lists_get_their_own_results() {
        let fixture = fixture();
        let start = Arc::new(Barrier::new(2));

        let bridge = Arc::clone(&fixture.bridge);
        let barrier = Arc::clone(&start);
        let artist = thread::spawn(move || {
            barrier.wait();
            (0..20)
                .map(|_| {
                    let root = bridge.list("svc:artist:ar2").expect("artist should list");
                    urls(&root.get("nodes").expect("nodes child"))
                })
                .collect::<Vec<_>>()
        });
        let bridge = Arc::clone(&fixture.bridge);
        let barrier = Arc::clone(&start);
        let track = thread::spawn(move || {
            barrier.wait();
            (0..20)
                .map(|_| bridge.list("svc:track:t1").map(|_| ()))
                .collect::<Vec<_>>()
        });

        for listed in artist.join().expect("artist lister panicked") {
            assert_eq!(
                listed,
                vec![
                    "svc:artist:ar2#albums",
                    "svc:artist:ar2#singles",
                    "svc:artist:ar2#compilations"
                ]
            );
        }
        for result in track.join().expect("track lister panicked") {
            assert_eq!(result, Err(BridgeError::UnsupportedLink("track".to_string())));
        }
    }

    #[test]
    fn test_seek_drops_audio_queued_before_the_target() {
        let mut config = Config::default();
        config.audio.queue_watermark = 4;
        let fixture = fixture_with(config);
        let pipe = MediaPipe::new("main");
        let bridge = Arc::clone(&fixture.bridge);
        let player_pipe = pipe.clone();
        let player = thread::spawn(move || bridge.play("svc:track:t2", &player_pipe));

        wait_until("queue to fill", || pipe.audio_len() == 5);
        assert_eq!(fixture.catalog.loaded_track(), Some("t2".to_string()));
        pipe.post_event(PlaybackEvent::Seek {
            position_us: 1_500_000,
        });
        wait_until("seek", || {
            fixture.catalog.player_position_ms() >= 1_500 && pipe.audio_len() > 0
        });

        let frame = pipe.pop_audio().expect("audio after seek");
        assert!(frame.pts_us >= 1_500_000, "stale frame at {} us", frame.pts_us);

        pipe.post_event(PlaybackEvent::Stop);
        assert_eq!(
            player.join().expect("player panicked"),
            Ok(PlaybackEvent::Stop)
        );
    }

    #[test]
    fn test_stop_while_paused_releases_the_sink() {
        let fixture = fixture();
        let pipe = MediaPipe::new("main");
        let bridge = Arc::clone(&fixture.bridge);
        let player_pipe = pipe.clone();
        let player = thread::spawn(move || bridge.play("svc:track:t2", &player_pipe));

        wait_until("playback", || pipe.play_status() == PlayStatus::Playing);
        assert_eq!(pipe.caps(), (true, true));
        pipe.post_event(PlaybackEvent::Pause);
        wait_until("pause", || {
            pipe.play_status() == PlayStatus::Paused && !fixture.catalog.is_playing()
        });
        pipe.post_event(PlaybackEvent::Stop);

        assert_eq!(
            player.join().expect("player panicked"),
            Ok(PlaybackEvent::Stop)
        );
        assert_eq!(pipe.controls(), vec![PipeControl::Pause, PipeControl::Play]);
        assert_eq!(pipe.play_status(), PlayStatus::Stopped);
        wait_until("unload", || fixture.catalog.loaded_track().is_none());
    }

    #[test]
    fn test_container_changes_reach_global_playlists() {
        let fixture = fixture();
        wait_logged_in(&fixture);
        let playlists = fixture.bridge.playlists();
        wait_until("import", || {
            titles(&playlists) == fixture.catalog.container_names()
        });
        assert_eq!(titles(&playlists), vec!["Road Trip", "-", "Chill", "Pending"]);

        fixture
            .catalog
            .create_playlist("pl5", "Fresh", 1, &["t3", "t7"]);
        wait_until("add", || titles(&playlists).len() == 5);
        assert_eq!(titles(&playlists), fixture.catalog.container_names());
        let root = fixture
            .bridge
            .list("svc:playlist:pl5")
            .expect("new playlist should list");
        assert_eq!(
            titles(&root.get("nodes").expect("nodes child")),
            vec!["Wind Up", "Dark Song"]
        );

        fixture.catalog.move_playlist(0, 5);
        wait_until("move", || {
            titles(&playlists) == vec!["Fresh", "-", "Chill", "Pending", "Road Trip"]
        });

        fixture.catalog.remove_playlist(1);
        wait_until("remove", || titles(&playlists).len() == 4);
        assert_eq!(titles(&playlists), vec!["Fresh", "Chill", "Pending", "Road Trip"]);
        assert_eq!(titles(&playlists), fixture.catalog.container_names());
    }

    #[test]
    fn test_open_artist_page_binds_title_on_page() {
        let fixture = fixture();
        let page = fixture
            .bridge
            .open("svc:artist:ar1", None)
            .expect("artist should open")
            .expect("artist opens a page");
        wait_until("artist page", || {
            page.get("loading").and_then(|loading| loading.int()) == Some(0)
        });
        assert_eq!(
            page.get("title").and_then(|title| title.string()),
            Some("The Examples".to_string())
        );
        assert_eq!(
            page.get("view").and_then(|view| view.string()),
            Some("list".to_string())
        );
        let nodes = page.get("nodes").expect("nodes child");
        assert_eq!(titles(&nodes), vec!["Albums", "Singles", "Compilations"]);
    }

    #[test]
    fn test_open_missing_playlist_reports_page_error() {
        let fixture = fixture();
        let page = fixture
            .bridge
            .open("svc:playlist:missing", None)
            .expect("uri is well formed")
            .expect("playlist opens a page");
        wait_until("error", || {
            page.get("type").and_then(|kind| kind.string()) == Some("openerror".to_string())
        });
        assert_eq!(
            page.get("error").and_then(|error| error.string()),
            Some("Playlist svc:playlist:missing not found".to_string())
        );
        assert_eq!(
            fixture.bridge.open("svc:nonsense", None),
            Err(BridgeError::InvalidUri)
        );
    }

    #[test]
    fn test_open_track_enqueues_with_bound_metadata() {
        let fixture = fixture();
        let opened = fixture
            .bridge
            .open("svc:track:t1", Some("svc:album:al1"))
            .expect("track should open");
        assert!(opened.is_none());
        wait_until("enqueue", || !fixture.queue.uris().is_empty());
        let (uri, parent, metadata) = fixture.queue.entries().remove(0);
        assert_eq!(uri, "svc:track:t1");
        assert_eq!(parent, Some("svc:album:al1".to_string()));
        assert_eq!(
            metadata.get("title").and_then(|title| title.string()),
            Some("Opening".to_string())
        );
    }

    #[test]
    fn test_get_parent() {
        let fixture = fixture();
        assert_eq!(
            fixture.bridge.get_parent("svc:track:t3"),
            Ok("svc:album:al2".to_string())
        );
        assert_eq!(
            fixture.bridge.get_parent("svc:album:al2"),
            Err(BridgeError::NotATrackForParent)
        );
    }

    #[test]
    fn test_load_image_decodes_session_bytes() {
        let fixture = fixture();
        let source =
            DynamicImage::ImageRgba8(ImageBuffer::from_pixel(3, 2, Rgba([1, 2, 3, 255])));
        let mut cursor = Cursor::new(Vec::<u8>::new());
        source
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("png encoding should succeed");
        let id = [0x5a; 20];
        fixture.catalog.add_image(id, cursor.into_inner());

        let pixmap = fixture
            .bridge
            .load_image(&image_uri(&id))
            .expect("image should load");
        assert_eq!((pixmap.width, pixmap.height), (3, 2));

        assert_eq!(
            fixture.bridge.load_image(&image_uri(&[0x11; 20])),
            Err(BridgeError::ImageLoad("Image not found".to_string()))
        );
        assert_eq!(
            fixture.bridge.load_image("svc:image:1234"),
            Err(BridgeError::InvalidImageUri)
        );
        wait_until("image release", || {
            [ImageHandle(1), ImageHandle(2)]
                .into_iter()
                .all(|image| fixture.catalog.ref_count(ObjectRef::Image(image)) == 0)
        });
    }

    #[test]
    fn test_shutdown_logs_out() {
        let fixture = fixture();
        let mut notifications = fixture.bridge.subscribe_notifications();
        wait_logged_in(&fixture);

        fixture.bridge.shutdown();

        assert!(!fixture.bridge.is_logged_in());
        assert_eq!(
            fixture.bridge.status().string(),
            Some("Not logged in".to_string())
        );
        let mut texts = Vec::new();
        while let Ok(notification) = notifications.try_recv() {
            texts.push(notification.text);
        }
        assert!(texts.contains(&"Logged out".to_string()));
    }
}
