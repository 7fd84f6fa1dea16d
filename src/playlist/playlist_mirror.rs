//! Tree mirror of a single session playlist.
//!
//! Entries follow the session's track order exactly. An entry whose track
//! turned out to be unavailable keeps its position but has no node; visible
//! nodes therefore appear in the same relative order as the non-hidden
//! entries.

use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::backends::{ObjectRef, PlaylistHandle, TrackHandle};
use crate::metadata::binding_registry::{BoundField, TrackSlot};
use crate::metadata::BindContext;
use crate::prop_tree::PropNode;

struct PlaylistTrack {
    track: TrackHandle,
    slot: TrackSlot,
}

impl PlaylistTrack {
    fn node(&self) -> Option<PropNode> {
        self.slot.lock().expect("track slot lock poisoned").clone()
    }

    fn take_node(&self) -> Option<PropNode> {
        self.slot.lock().expect("track slot lock poisoned").take()
    }
}

/// Mirror of one playlist: its root node, title, and ordered track nodes.
pub struct PlaylistMirror {
    playlist: PlaylistHandle,
    url: Option<String>,
    entries: Vec<PlaylistTrack>,
    root: PropNode,
    nodes: PropNode,
    kind: PropNode,
    title: PropNode,
    track_count: PropNode,
}

impl PlaylistMirror {
    /// Builds the mirror under `root` and imports the current tracks.
    pub fn new(ctx: &mut BindContext<'_>, playlist: PlaylistHandle, root: PropNode) -> Self {
        let nodes = root.create("nodes");
        let kind = root.create("type");
        kind.set_string("directory");
        let metadata = root.create("metadata");
        let title = metadata.create("title");
        let track_count = metadata.create("tracks");

        let mut mirror = Self {
            playlist,
            url: None,
            entries: Vec::new(),
            root,
            nodes,
            kind,
            title,
            track_count,
        };
        mirror.update_name(ctx);
        let tracks = ctx.session.playlist_tracks(playlist);
        mirror.add_tracks(ctx, 0, &tracks);
        mirror.capture_url(ctx);
        mirror
    }

    pub fn playlist(&self) -> PlaylistHandle {
        self.playlist
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn root(&self) -> &PropNode {
        &self.root
    }

    pub fn nodes(&self) -> &PropNode {
        &self.nodes
    }

    pub fn title(&self) -> &PropNode {
        &self.title
    }

    /// Number of entries, hidden ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copies the playlist name; a name of `-` turns the entry into a separator.
    pub fn update_name(&mut self, ctx: &BindContext<'_>) {
        let name = ctx.session.playlist_name(self.playlist).unwrap_or_default();
        self.kind
            .set_string(if name == "-" { "separator" } else { "directory" });
        self.title.set_string(&name);
    }

    /// Captures the playlist URL the first time the playlist is loaded.
    pub fn capture_url(&mut self, ctx: &BindContext<'_>) {
        if self.url.is_some() || !ctx.session.playlist_is_loaded(self.playlist) {
            return;
        }
        if let Some(url) = ctx.session.uri_of(ObjectRef::Playlist(self.playlist)) {
            debug!("PlaylistMirror: playlist loaded at {}", url);
            self.root.create("url").set_string(&url);
            self.url = Some(url);
        }
    }

    /// First visible node at or after `position`.
    fn anchor_from(&self, position: usize) -> Option<PropNode> {
        self.entries
            .iter()
            .skip(position)
            .find_map(PlaylistTrack::node)
    }

    /// Inserts `tracks` starting at `position`.
    pub fn add_tracks(
        &mut self,
        ctx: &mut BindContext<'_>,
        position: usize,
        tracks: &[TrackHandle],
    ) {
        for (offset, track) in tracks.iter().enumerate() {
            let position = (position + offset).min(self.entries.len());
            let anchor = self.anchor_from(position);

            let node = self.nodes.tree().create_detached(None);
            node.create("type").set_string("track");
            if let Some(url) = ctx.session.uri_of(ObjectRef::Track(*track)) {
                node.create("url").set_string(&url);
            }
            let metadata = node.create("metadata");

            let slot: TrackSlot = Arc::new(Mutex::new(None));
            match node.set_parent_before(&self.nodes, anchor.as_ref()) {
                Ok(()) => {
                    *slot.lock().expect("track slot lock poisoned") = Some(node);
                }
                Err(err) => {
                    warn!("PlaylistMirror: could not attach track node: {:?}", err);
                    node.destroy();
                }
            }
            ctx.registry.bind(
                ctx.session,
                ctx.mailbox,
                &metadata,
                BoundField::Track(*track),
                Some(Arc::clone(&slot)),
            );
            self.entries.insert(
                position,
                PlaylistTrack {
                    track: *track,
                    slot,
                },
            );
        }
        self.update_track_count();
    }

    /// Removes the entries at `positions`, highest index first so earlier
    /// removals never shift later ones.
    pub fn remove_tracks(&mut self, positions: &[usize]) {
        let mut positions = positions.to_vec();
        positions.sort_unstable_by(|a, b| b.cmp(a));
        positions.dedup();
        for position in positions {
            if position >= self.entries.len() {
                warn!(
                    "PlaylistMirror: ignoring removal at {} (len={})",
                    position,
                    self.entries.len()
                );
                continue;
            }
            let entry = self.entries.remove(position);
            if let Some(node) = entry.take_node() {
                node.destroy();
            }
        }
        self.update_track_count();
    }

    /// Relocates the entries at `positions` so they end up, in their original
    /// relative order, before what was at `new_position`. Nodes are moved,
    /// never recreated.
    pub fn move_tracks(&mut self, positions: &[usize], new_position: usize) {
        let mut positions = positions.to_vec();
        positions.sort_unstable_by(|a, b| b.cmp(a));
        positions.dedup();

        let mut target = new_position;
        let mut moved = Vec::with_capacity(positions.len());
        for position in positions {
            if position >= self.entries.len() {
                continue;
            }
            moved.push(self.entries.remove(position));
            if position < target {
                target -= 1;
            }
        }
        let target = target.min(self.entries.len());

        // `moved` holds the entries highest-index first; inserting each at the
        // same target restores their original relative order.
        for entry in moved {
            let anchor = self.anchor_from(target);
            if let Some(node) = entry.node() {
                node.move_before(anchor.as_ref());
            }
            self.entries.insert(target, entry);
        }
    }

    /// Track handles in mirror order, hidden entries included.
    pub fn tracks(&self) -> Vec<TrackHandle> {
        self.entries.iter().map(|entry| entry.track).collect()
    }

    fn update_track_count(&self) {
        self.track_count.set_int(self.entries.len() as i64);
    }

    /// Destroys the mirror's tree nodes; bindings release through the
    /// destruction observers.
    pub fn destroy(self) {
        self.root.destroy();
    }
}
