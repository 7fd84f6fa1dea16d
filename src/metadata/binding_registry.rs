//! Registry of tree nodes whose fields mirror session object metadata.
//!
//! Each binding retains its session object through an [`ExternalRef`] for as
//! long as the bound node lives. Bindings are created and refreshed on the
//! session worker but removed from whichever thread destroys the node.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::debug;

use crate::backends::{AlbumHandle, ArtistHandle, ContentSession, ObjectRef, TrackHandle};
use crate::external_ref::ExternalRef;
use crate::prop_tree::PropNode;
use crate::protocol::Mailbox;
use crate::service_uri::image_uri;

/// Media format tag written on bound tracks.
pub const MEDIA_FORMAT: &str = "svc";

/// Slot holding a playlist track's visible node; emptied when hidden.
pub type TrackSlot = Arc<Mutex<Option<PropNode>>>;

/// Which object feeds the bound node, and which of its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundField {
    /// Full track metadata written as children of the node.
    Track(TrackHandle),
    AlbumName(AlbumHandle),
    AlbumYear(AlbumHandle),
    AlbumArtistName(AlbumHandle),
    AlbumImage(AlbumHandle),
    ArtistName(ArtistHandle),
}

impl BoundField {
    fn object(&self) -> ObjectRef {
        match *self {
            Self::Track(track) => ObjectRef::Track(track),
            Self::AlbumName(album)
            | Self::AlbumYear(album)
            | Self::AlbumArtistName(album)
            | Self::AlbumImage(album) => ObjectRef::Album(album),
            Self::ArtistName(artist) => ObjectRef::Artist(artist),
        }
    }
}

struct Binding {
    node: PropNode,
    field: BoundField,
    slot: Option<TrackSlot>,
    artist_images_published: bool,
    _source: ExternalRef,
}

#[derive(Default)]
struct RegistryState {
    bindings: HashMap<u64, Binding>,
    next_id: u64,
}

/// Shared registry of live metadata bindings.
#[derive(Clone, Default)]
pub struct MetadataRegistry {
    inner: Arc<Mutex<RegistryState>>,
}

fn lock_state(state: &Mutex<RegistryState>) -> MutexGuard<'_, RegistryState> {
    state.lock().expect("metadata registry lock poisoned")
}

fn unbind(state: &Weak<Mutex<RegistryState>>, id: u64) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let removed = lock_state(&state).bindings.remove(&id);
    // The release is posted when the token drops, after the lock is gone.
    drop(removed);
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock_state(&self.inner).bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Binds `node` to `field`, applies it once, and arranges for the binding
    /// to be dropped when the node is destroyed.
    pub fn bind(
        &self,
        session: &mut dyn ContentSession,
        mailbox: &Mailbox,
        node: &PropNode,
        field: BoundField,
        slot: Option<TrackSlot>,
    ) {
        let source = ExternalRef::retain(session, field.object(), mailbox);
        let session: &dyn ContentSession = session;

        let (id, hidden) = {
            let mut state = lock_state(&self.inner);
            state.next_id += 1;
            let id = state.next_id;
            let mut binding = Binding {
                node: node.clone(),
                field,
                slot,
                artist_images_published: false,
                _source: source,
            };
            let hidden = apply(&mut binding, session);
            state.bindings.insert(id, binding);
            (id, hidden)
        };
        if let Some(hidden) = hidden {
            hidden.destroy();
        }

        let weak = Arc::downgrade(&self.inner);
        if !node.subscribe_destroyed(move || unbind(&weak, id)) {
            debug!("MetadataRegistry: node gone before binding {:?}", field);
            unbind(&Arc::downgrade(&self.inner), id);
        }
    }

    /// Re-applies every binding. Track nodes hidden by this pass are
    /// destroyed after the registry lock is released.
    pub fn refresh_all(&self, session: &dyn ContentSession) {
        let hidden: Vec<PropNode> = {
            let mut state = lock_state(&self.inner);
            state
                .bindings
                .values_mut()
                .filter_map(|binding| apply(binding, session))
                .collect()
        };
        for node in hidden {
            node.destroy();
        }
    }
}

/// Applies one binding. Returns a playlist track node to hide, if any.
fn apply(binding: &mut Binding, session: &dyn ContentSession) -> Option<PropNode> {
    let node = &binding.node;
    match binding.field {
        BoundField::Track(track) => return apply_track(binding, track, session),
        BoundField::AlbumName(album) => {
            if let Some(info) = session.album_info(album) {
                node.set_string(&info.name);
            }
        }
        BoundField::AlbumYear(album) => {
            if let Some(info) = session.album_info(album).filter(|info| info.year != 0) {
                node.set_int(i64::from(info.year));
            }
        }
        BoundField::AlbumArtistName(album) => {
            let name = session
                .album_info(album)
                .and_then(|info| info.artist)
                .and_then(|artist| session.artist_name(artist));
            if let Some(name) = name {
                node.set_string(&name);
            }
        }
        BoundField::AlbumImage(album) => {
            if let Some(cover) = session.album_info(album).and_then(|info| info.cover) {
                node.set_string(&image_uri(&cover));
            }
        }
        BoundField::ArtistName(artist) => {
            if let Some(name) = session.artist_name(artist) {
                node.set_string(&name);
            }
        }
    }
    None
}

fn apply_track(
    binding: &mut Binding,
    track: TrackHandle,
    session: &dyn ContentSession,
) -> Option<PropNode> {
    let info = session.track_info(track)?;
    if !info.available {
        if let Some(slot) = &binding.slot {
            return slot.lock().expect("track slot lock poisoned").take();
        }
    }

    let metadata = &binding.node;
    metadata.create("mediaformat").set_string(MEDIA_FORMAT);
    metadata.create("title").set_string(&info.name);
    metadata.create("trackindex").set_int(i64::from(info.index));
    metadata
        .create("duration")
        .set_float(f64::from(info.duration_ms) / 1000.0);
    metadata
        .create("popularity")
        .set_float(f64::from(info.popularity) / 100.0);

    if let Some(album) = info.album {
        let album_info = session.album_info(album);
        let url = session.uri_of(ObjectRef::Album(album)).unwrap_or_default();
        let name = album_info
            .as_ref()
            .map(|album| album.name.as_str())
            .unwrap_or_default();
        metadata.create("album").set_link(name, &url);
        if let Some(cover) = album_info.and_then(|album| album.cover) {
            metadata.create("album_art").set_string(&image_uri(&cover));
        }
    }

    let names: Vec<String> = info
        .artists
        .iter()
        .filter_map(|artist| session.artist_name(*artist))
        .collect();
    let joined = names.join(", ");
    match info.artists.first() {
        Some(first) => {
            let url = session.uri_of(ObjectRef::Artist(*first)).unwrap_or_default();
            metadata.create("artist").set_link(&joined, &url);
            if !binding.artist_images_published {
                if let Some(first_name) = names.first() {
                    metadata.create("artist_images").set_string(first_name);
                    binding.artist_images_published = true;
                }
            }
        }
        None => metadata.create("artist").set_string(&joined),
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{BoundField, MetadataRegistry, TrackSlot};
    use crate::backends::catalog::{test_support, CatalogSession};
    use crate::backends::{ContentSession, ObjectRef, TrackHandle};
    use crate::prop_tree::{PropTree, PropValue};
    use crate::protocol::{Mailbox, Message};
    use std::sync::mpsc::Receiver;
    use std::sync::{Arc, Mutex};
    use std::thread;

    fn setup() -> (CatalogSession, Mailbox, Receiver<Message>) {
        let (mailbox, receiver) = Mailbox::channel();
        let session = CatalogSession::new(test_support::sample_fixture(), mailbox.clone());
        (session, mailbox, receiver)
    }

    fn track(session: &mut CatalogSession, id: &str) -> TrackHandle {
        match session.resolve(&format!("svc:track:{id}")) {
            Some(ObjectRef::Track(track)) => track,
            other => panic!("expected track for {id}, got {other:?}"),
        }
    }

    fn releases(receiver: &Receiver<Message>) -> Vec<ObjectRef> {
        receiver
            .try_iter()
            .filter_map(|message| match message {
                Message::Release(object) => Some(object),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_bind_track_writes_metadata_fields() {
        let (mut session, mailbox, _receiver) = setup();
        let registry = MetadataRegistry::new();
        let tree = PropTree::new();
        let metadata = tree.create_detached(Some("metadata"));
        let closing = track(&mut session, "t2");

        registry.bind(&mut session, &mailbox, &metadata, BoundField::Track(closing), None);

        assert_eq!(
            metadata.get("title").and_then(|node| node.string()),
            Some("Closing".to_string())
        );
        assert_eq!(
            metadata.get("duration").map(|node| node.value()),
            Some(PropValue::Float(2.0))
        );
        assert_eq!(
            metadata.get("artist").map(|node| node.value()),
            Some(PropValue::Link {
                title: "The Examples, Guest Star".to_string(),
                url: "svc:artist:ar1".to_string(),
            })
        );
        assert_eq!(
            metadata.get("album").map(|node| node.value()),
            Some(PropValue::Link {
                title: "First Light".to_string(),
                url: "svc:album:al1".to_string(),
            })
        );
        assert!(metadata
            .get("album_art")
            .and_then(|node| node.string())
            .is_some_and(|uri| uri.starts_with("svc:image:0a0a")));
        assert_eq!(
            metadata.get("artist_images").and_then(|node| node.string()),
            Some("The Examples".to_string())
        );
        assert_eq!(session.ref_count(ObjectRef::Track(closing)), 1);
    }

    #[test]
    fn test_loading_track_is_left_untouched_until_refresh() {
        let (mut session, mailbox, _receiver) = setup();
        let registry = MetadataRegistry::new();
        let tree = PropTree::new();
        let metadata = tree.create_detached(None);
        let slow = track(&mut session, "t8");

        registry.bind(&mut session, &mailbox, &metadata, BoundField::Track(slow), None);
        assert!(metadata.get("title").is_none());

        session.handle().finish_loading("t8");
        registry.refresh_all(&session);
        assert_eq!(
            metadata.get("title").and_then(|node| node.string()),
            Some("Slow Loader".to_string())
        );
    }

    #[test]
    fn test_unavailable_track_hides_slot_node_once() {
        let (mut session, mailbox, receiver) = setup();
        let registry = MetadataRegistry::new();
        let tree = PropTree::new();
        let list = tree.create_detached(Some("nodes"));
        let track_node = list.create_anonymous();
        let metadata = track_node.create("metadata");
        let slot: TrackSlot = Arc::new(Mutex::new(Some(track_node.clone())));
        let unavailable = track(&mut session, "t10");

        registry.bind(
            &mut session,
            &mailbox,
            &metadata,
            BoundField::Track(unavailable),
            Some(Arc::clone(&slot)),
        );

        assert!(track_node.is_destroyed());
        assert!(slot.lock().expect("slot").is_none());
        assert!(list.children().is_empty());
        assert!(registry.is_empty());
        registry.refresh_all(&session);
        assert_eq!(releases(&receiver), vec![ObjectRef::Track(unavailable)]);
    }

    #[test]
    fn test_track_withdrawn_later_is_hidden_on_first_refresh_only() {
        let (mut session, mailbox, receiver) = setup();
        let registry = MetadataRegistry::new();
        let tree = PropTree::new();
        let list = tree.create_detached(Some("nodes"));
        let first = list.create_anonymous();
        let second = list.create_anonymous();
        let slot: TrackSlot = Arc::new(Mutex::new(Some(first.clone())));
        let opening = track(&mut session, "t1");
        let closing = track(&mut session, "t2");
        registry.bind(
            &mut session,
            &mailbox,
            &first.create("metadata"),
            BoundField::Track(opening),
            Some(Arc::clone(&slot)),
        );
        registry.bind(
            &mut session,
            &mailbox,
            &second.create("metadata"),
            BoundField::Track(closing),
            None,
        );
        registry.refresh_all(&session);
        assert!(!first.is_destroyed());
        assert_eq!(registry.len(), 2);

        session.handle().set_track_available("t1", false);
        for _ in 0..3 {
            registry.refresh_all(&session);
        }

        assert!(first.is_destroyed());
        assert!(slot.lock().expect("slot").is_none());
        assert_eq!(list.children().len(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(releases(&receiver), vec![ObjectRef::Track(opening)]);
        assert_eq!(
            second
                .get("metadata")
                .and_then(|metadata| metadata.get("title"))
                .and_then(|title| title.string()),
            Some("Closing".to_string())
        );
    }

    #[test]
    fn test_concurrent_destroy_posts_exactly_one_release() {
        let (mut session, mailbox, receiver) = setup();
        let registry = MetadataRegistry::new();
        let tree = PropTree::new();
        let root = tree.create_detached(None);
        let metadata = root.create("metadata");
        let opening = track(&mut session, "t1");
        registry.bind(&mut session, &mailbox, &metadata, BoundField::Track(opening), None);
        assert_eq!(registry.len(), 1);

        let handles: Vec<_> = (0..8)
            .map(|index| {
                let target = if index % 2 == 0 {
                    root.clone()
                } else {
                    metadata.clone()
                };
                thread::spawn(move || target.destroy())
            })
            .collect();
        for handle in handles {
            handle.join().expect("destroy thread panicked");
        }

        assert!(registry.is_empty());
        assert_eq!(releases(&receiver), vec![ObjectRef::Track(opening)]);
    }

    #[test]
    fn test_bind_on_destroyed_node_releases_immediately() {
        let (mut session, mailbox, receiver) = setup();
        let registry = MetadataRegistry::new();
        let tree = PropTree::new();
        let node = tree.create_detached(None);
        node.destroy();
        let opening = track(&mut session, "t1");

        registry.bind(&mut session, &mailbox, &node, BoundField::Track(opening), None);

        assert!(registry.is_empty());
        assert_eq!(releases(&receiver), vec![ObjectRef::Track(opening)]);
    }

    #[test]
    fn test_album_fields_bind_and_skip_zero_year() {
        let (mut session, mailbox, _receiver) = setup();
        let registry = MetadataRegistry::new();
        let tree = PropTree::new();
        let page = tree.create_detached(None);
        let Some(ObjectRef::Album(album)) = session.resolve("svc:album:al1") else {
            panic!("album should resolve");
        };
        let Some(ObjectRef::Album(undated)) = session.resolve("svc:album:al7") else {
            panic!("album should resolve");
        };

        for (name, field) in [
            ("album_name", BoundField::AlbumName(album)),
            ("album_year", BoundField::AlbumYear(album)),
            ("artist_name", BoundField::AlbumArtistName(album)),
            ("undated_year", BoundField::AlbumYear(undated)),
        ] {
            registry.bind(&mut session, &mailbox, &page.create(name), field, None);
        }

        assert_eq!(
            page.get("album_name").and_then(|n| n.string()),
            Some("First Light".to_string())
        );
        assert_eq!(page.get("album_year").and_then(|n| n.int()), Some(2001));
        assert_eq!(
            page.get("artist_name").and_then(|n| n.string()),
            Some("The Examples".to_string())
        );
        assert_eq!(
            page.get("undated_year").map(|n| n.value()),
            Some(PropValue::Void)
        );
        assert_eq!(registry.len(), 4);
    }
}
