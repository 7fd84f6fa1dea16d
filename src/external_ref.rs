//! Ownership token for session objects retained outside the worker.

use std::fmt;

use crate::backends::{AlbumHandle, ArtistHandle, ContentSession, ObjectRef, TrackHandle};
use crate::protocol::{Mailbox, Message};

/// Holds one reference on a session object.
///
/// Dropping the token posts exactly one [`Message::Release`] to the worker,
/// whichever thread the drop happens on. The session release itself is only
/// ever invoked by the worker.
pub struct ExternalRef {
    object: ObjectRef,
    mailbox: Mailbox,
}

impl ExternalRef {
    /// Adds a reference and wraps it. Must be called on the worker.
    pub fn retain(session: &mut dyn ContentSession, object: ObjectRef, mailbox: &Mailbox) -> Self {
        session.add_ref(object);
        Self::adopt(object, mailbox)
    }

    /// Takes ownership of a reference the session already handed out.
    pub fn adopt(object: ObjectRef, mailbox: &Mailbox) -> Self {
        Self {
            object,
            mailbox: mailbox.clone(),
        }
    }

    pub fn object(&self) -> ObjectRef {
        self.object
    }

    pub fn track(&self) -> Option<TrackHandle> {
        match self.object {
            ObjectRef::Track(track) => Some(track),
            _ => None,
        }
    }

    pub fn album(&self) -> Option<AlbumHandle> {
        match self.object {
            ObjectRef::Album(album) => Some(album),
            _ => None,
        }
    }

    pub fn artist(&self) -> Option<ArtistHandle> {
        match self.object {
            ObjectRef::Artist(artist) => Some(artist),
            _ => None,
        }
    }
}

impl fmt::Debug for ExternalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExternalRef").field(&self.object).finish()
    }
}

impl Drop for ExternalRef {
    fn drop(&mut self) {
        if !self.mailbox.send(Message::Release(self.object)) {
            log::debug!("ExternalRef: worker gone, dropping release of {:?}", self.object);
        }
    }
}
