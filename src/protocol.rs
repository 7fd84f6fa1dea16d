//! Message protocol between bridge callers, the content session and the
//! session worker.
//!
//! Everything that touches the session is funnelled through one FIFO queue of
//! [`Message`]s consumed by the session worker.

use std::sync::mpsc;

use tokio::sync::oneshot;

use crate::backends::{
    AlbumHandle, ArtistHandle, ImageId, ObjectRef, PlaylistHandle, RequestId, SearchResult,
    TrackHandle,
};
use crate::error::BridgeError;
use crate::prop_tree::PropNode;

/// One-shot completion channel carried by a request envelope.
pub type Reply<T> = oneshot::Sender<Result<T, BridgeError>>;

/// Top-level envelope for all worker traffic.
#[derive(Debug)]
pub enum Message {
    /// The session asked for `process_events` to be run soon.
    PendingEvent,
    /// Notification raised by the session itself.
    Session(SessionEvent),
    Logout,
    OpenPage(OpenPageRequest),
    OpenTrack(OpenTrackRequest),
    List(ListRequest),
    PlayTrack(PlayTrackRequest),
    StopPlayback,
    /// Drop one reference on a session object. Only the worker calls the
    /// session release.
    Release(ObjectRef),
    /// Seek target in milliseconds.
    Seek(u32),
    /// `true` pauses, `false` resumes.
    Pause(bool),
    GetImage(ImageRequest),
    GetParent(ParentRequest),
}

/// Session-originated notifications, delivered in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoggedIn(Result<(), String>),
    LoggedOut,
    ConnectionError(String),
    MetadataUpdated,
    PlayTokenLost,
    EndOfTrack,
    LogMessage(String),
    ContainerLoaded,
    PlaylistAdded {
        playlist: PlaylistHandle,
        position: usize,
    },
    PlaylistRemoved {
        playlist: PlaylistHandle,
        position: usize,
    },
    PlaylistMoved {
        playlist: PlaylistHandle,
        from: usize,
        to: usize,
    },
    TracksAdded {
        playlist: PlaylistHandle,
        tracks: Vec<TrackHandle>,
        position: usize,
    },
    TracksRemoved {
        playlist: PlaylistHandle,
        positions: Vec<usize>,
    },
    TracksMoved {
        playlist: PlaylistHandle,
        positions: Vec<usize>,
        new_position: usize,
    },
    PlaylistRenamed(PlaylistHandle),
    PlaylistStateChanged(PlaylistHandle),
    /// Track handles carry one reference each, owned by the receiver.
    AlbumBrowsed {
        request: RequestId,
        album: AlbumHandle,
        tracks: Vec<TrackHandle>,
    },
    ArtistBrowsed {
        request: RequestId,
        artist: ArtistHandle,
        tracks: Vec<TrackHandle>,
    },
    SearchCompleted {
        request: RequestId,
        result: SearchResult,
    },
    ImageLoaded {
        request: RequestId,
        result: Result<Vec<u8>, String>,
    },
}

/// Fill an existing page root asynchronously.
#[derive(Debug)]
pub struct OpenPageRequest {
    pub uri: String,
    pub root: PropNode,
}

/// Hand a track to the play queue.
#[derive(Debug)]
pub struct OpenTrackRequest {
    pub uri: String,
    pub parent: Option<String>,
}

/// Options accepted by list requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListOptions {
    /// Return an artist's tracks flat instead of the section directory.
    pub expand_artist_albums: bool,
}

#[derive(Debug)]
pub struct ListRequest {
    pub uri: String,
    pub options: ListOptions,
    pub reply: Reply<PropNode>,
}

#[derive(Debug)]
pub struct PlayTrackRequest {
    pub uri: String,
    pub reply: Reply<()>,
}

#[derive(Debug)]
pub struct ImageRequest {
    pub id: ImageId,
    pub reply: Reply<Vec<u8>>,
}

#[derive(Debug)]
pub struct ParentRequest {
    pub uri: String,
    pub reply: Reply<String>,
}

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// Asynchronous user-facing message broadcast by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub text: String,
}

impl Notification {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            text: text.into(),
        }
    }
}

/// Producer side of the worker queue.
#[derive(Debug, Clone)]
pub struct Mailbox {
    sender: mpsc::Sender<Message>,
}

impl Mailbox {
    pub fn new(sender: mpsc::Sender<Message>) -> Self {
        Self { sender }
    }

    pub fn channel() -> (Self, mpsc::Receiver<Message>) {
        let (sender, receiver) = mpsc::channel();
        (Self::new(sender), receiver)
    }

    /// Enqueues a message. Returns `false` when the worker is gone.
    pub fn send(&self, message: Message) -> bool {
        self.sender.send(message).is_ok()
    }

    pub fn post_event(&self, event: SessionEvent) -> bool {
        self.send(Message::Session(event))
    }

    pub fn notify_main_thread(&self) -> bool {
        self.send(Message::PendingEvent)
    }
}
