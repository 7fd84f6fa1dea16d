//! Requests parked until their track finishes loading.
//!
//! The session reports "still loading" as a transient state, so play and
//! get-parent requests are stashed here and polled again after every
//! metadata update until the track is ready or fails permanently.

use std::collections::BTreeMap;

use log::debug;

use crate::backends::{ContentSession, ObjectRef, TrackStatus};
use crate::error::BridgeError;
use crate::external_ref::ExternalRef;
use crate::protocol::Reply;

/// Play request waiting for its track.
#[derive(Debug)]
pub struct PendingPlay {
    pub uri: String,
    pub track: ExternalRef,
    pub reply: Reply<()>,
}

/// Get-parent request waiting for its track.
#[derive(Debug)]
pub struct PendingParent {
    pub uri: String,
    pub track: ExternalRef,
    pub reply: Reply<String>,
}

/// Outcome of polling a parked play request.
#[derive(Debug)]
pub enum PlayPoll {
    /// The track is loaded; the caller starts playback.
    Ready(PendingPlay),
    /// Permanent failure with the session's error text.
    Failed(PendingPlay, String),
}

fn track_status(session: &dyn ContentSession, track: &ExternalRef) -> TrackStatus {
    match track.track() {
        Some(handle) => session.track_status(handle),
        None => TrackStatus::Failed("not a track".to_string()),
    }
}

/// Parked play (at most one) and get-parent (any number) requests.
#[derive(Debug, Default)]
pub struct RetryRegistry {
    play: Option<PendingPlay>,
    parents: BTreeMap<u64, PendingParent>,
    next_parent_id: u64,
}

impl RetryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pending_play(&self) -> bool {
        self.play.is_some()
    }

    pub fn pending_parent_count(&self) -> usize {
        self.parents.len()
    }

    /// Parks a play request. A previously parked one is handed back so the
    /// caller can fail it; callers serialize playback so this is rare.
    pub fn park_play(&mut self, pending: PendingPlay) -> Option<PendingPlay> {
        self.play.replace(pending)
    }

    pub fn park_parent(&mut self, pending: PendingParent) {
        self.next_parent_id += 1;
        self.parents.insert(self.next_parent_id, pending);
    }

    /// Polls the parked play request. `None` while it is still loading or
    /// when nothing is parked.
    pub fn poll_play(&mut self, session: &dyn ContentSession) -> Option<PlayPoll> {
        let pending = self.play.take()?;
        match track_status(session, &pending.track) {
            TrackStatus::Loading => {
                debug!("RetryRegistry: {} still loading", pending.uri);
                self.play = Some(pending);
                None
            }
            TrackStatus::Ready => Some(PlayPoll::Ready(pending)),
            TrackStatus::Failed(reason) => Some(PlayPoll::Failed(pending, reason)),
        }
    }

    /// Polls every parked get-parent request and returns the finished ones
    /// with their album URI or error, in arrival order.
    pub fn poll_parents(
        &mut self,
        session: &dyn ContentSession,
    ) -> Vec<(PendingParent, Result<String, BridgeError>)> {
        let ready: Vec<u64> = self
            .parents
            .iter()
            .filter(|(_, pending)| track_status(session, &pending.track) != TrackStatus::Loading)
            .map(|(id, _)| *id)
            .collect();

        ready
            .into_iter()
            .filter_map(|id| self.parents.remove(&id))
            .map(|pending| {
                let result = resolve_parent(session, &pending.track);
                (pending, result)
            })
            .collect()
    }
}

/// Album URI of a loaded track.
pub fn resolve_parent(
    session: &dyn ContentSession,
    track: &ExternalRef,
) -> Result<String, BridgeError> {
    match track_status(session, track) {
        TrackStatus::Failed(reason) => Err(BridgeError::TrackResolve(reason)),
        TrackStatus::Loading => Err(BridgeError::ParentUnresolved),
        TrackStatus::Ready => track
            .track()
            .and_then(|handle| session.track_info(handle))
            .and_then(|info| info.album)
            .and_then(|album| session.uri_of(ObjectRef::Album(album)))
            .ok_or(BridgeError::ParentUnresolved),
    }
}

#[cfg(test)]
mod tests {
    use super::{PendingParent, PendingPlay, PlayPoll, RetryRegistry};
    use crate::backends::catalog::{test_support, CatalogSession};
    use crate::backends::ContentSession;
    use crate::error::BridgeError;
    use crate::external_ref::ExternalRef;
    use crate::protocol::{Mailbox, Message};
    use std::sync::mpsc::Receiver;
    use tokio::sync::oneshot;

    fn setup() -> (CatalogSession, Mailbox, Receiver<Message>) {
        let (mailbox, receiver) = Mailbox::channel();
        let session = CatalogSession::new(test_support::sample_fixture(), mailbox.clone());
        (session, mailbox, receiver)
    }

    fn retain(session: &mut CatalogSession, mailbox: &Mailbox, id: &str) -> ExternalRef {
        let object = session
            .resolve(&format!("svc:track:{id}"))
            .expect("track should resolve");
        ExternalRef::retain(session, object, mailbox)
    }

    #[test]
    fn test_play_stays_parked_while_loading_then_becomes_ready() {
        let (mut session, mailbox, _receiver) = setup();
        let mut registry = RetryRegistry::new();
        let (reply, _rx) = oneshot::channel();
        let track = retain(&mut session, &mailbox, "t8");
        assert!(registry
            .park_play(PendingPlay {
                uri: "svc:track:t8".to_string(),
                track,
                reply,
            })
            .is_none());

        assert!(registry.poll_play(&session).is_none());
        assert!(registry.has_pending_play());

        session.handle().finish_loading("t8");
        match registry.poll_play(&session) {
            Some(PlayPoll::Ready(pending)) => assert_eq!(pending.uri, "svc:track:t8"),
            other => panic!("expected ready play, got {other:?}"),
        }
        assert!(!registry.has_pending_play());
    }

    #[test]
    fn test_play_permanent_error_terminates() {
        let (mut session, mailbox, _receiver) = setup();
        let mut registry = RetryRegistry::new();
        let (reply, _rx) = oneshot::channel();
        let track = retain(&mut session, &mailbox, "t9");
        registry.park_play(PendingPlay {
            uri: "svc:track:t9".to_string(),
            track,
            reply,
        });

        match registry.poll_play(&session) {
            Some(PlayPoll::Failed(_, reason)) => {
                assert_eq!(reason, "Track is not available in your region")
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!registry.has_pending_play());
    }

    #[test]
    fn test_parents_resolve_independently() {
        let (mut session, mailbox, _receiver) = setup();
        let mut registry = RetryRegistry::new();
        for id in ["t8", "t1", "t9"] {
            let (reply, _rx) = oneshot::channel();
            let track = retain(&mut session, &mailbox, id);
            registry.park_parent(PendingParent {
                uri: format!("svc:track:{id}"),
                track,
                reply,
            });
        }

        let finished = registry.poll_parents(&session);
        let results: Vec<_> = finished
            .iter()
            .map(|(pending, result)| (pending.uri.clone(), result.clone()))
            .collect();
        assert_eq!(
            results,
            vec![
                ("svc:track:t1".to_string(), Ok("svc:album:al1".to_string())),
                (
                    "svc:track:t9".to_string(),
                    Err(BridgeError::TrackResolve(
                        "Track is not available in your region".to_string()
                    ))
                ),
            ]
        );
        assert_eq!(registry.pending_parent_count(), 1);
    }
}
