//! Mirror of the session's playlist container.

use log::{debug, info, warn};

use crate::backends::PlaylistHandle;
use crate::metadata::BindContext;
use crate::playlist::PlaylistMirror;
use crate::prop_tree::PropNode;

/// Ordered playlist mirrors, kept in container order under the shared
/// playlists node.
pub struct PlaylistCollection {
    mirrors: Vec<PlaylistMirror>,
    root: PropNode,
    syncing: PropNode,
}

impl PlaylistCollection {
    pub fn new(root: PropNode, syncing: PropNode) -> Self {
        Self {
            mirrors: Vec::new(),
            root,
            syncing,
        }
    }

    pub fn len(&self) -> usize {
        self.mirrors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }

    /// Imports every playlist currently in the container and starts
    /// watching it for changes.
    pub fn load_initial(&mut self, ctx: &mut BindContext<'_>) {
        if !self.mirrors.is_empty() {
            debug!("PlaylistCollection: container already mirrored");
            return;
        }
        let playlists = ctx.session.playlist_container();
        info!("PlaylistCollection: importing {} playlists", playlists.len());
        for (position, playlist) in playlists.into_iter().enumerate() {
            self.playlist_added(ctx, playlist, position);
        }
        ctx.session.watch_container();
    }

    pub fn playlist_added(
        &mut self,
        ctx: &mut BindContext<'_>,
        playlist: PlaylistHandle,
        position: usize,
    ) {
        let position = position.min(self.mirrors.len());
        let root = self.root.tree().create_detached(None);
        let anchor = self.mirrors.get(position).map(|mirror| mirror.root().clone());
        if let Err(err) = root.set_parent_before(&self.root, anchor.as_ref()) {
            warn!("PlaylistCollection: playlists node is gone: {:?}", err);
            root.destroy();
            return;
        }
        ctx.session.watch_playlist(playlist);
        let mirror = PlaylistMirror::new(ctx, playlist, root);
        self.mirrors.insert(position, mirror);
    }

    pub fn playlist_removed(&mut self, playlist: PlaylistHandle, position: usize) {
        let index = match self.mirrors.get(position) {
            Some(mirror) if mirror.playlist() == playlist => Some(position),
            _ => self.position_of(playlist),
        };
        match index {
            Some(index) => self.mirrors.remove(index).destroy(),
            None => warn!(
                "PlaylistCollection: removal of unknown playlist {:?} at {}",
                playlist, position
            ),
        }
    }

    pub fn playlist_moved(&mut self, from: usize, to: usize) {
        if from >= self.mirrors.len() {
            warn!("PlaylistCollection: move from {} out of range", from);
            return;
        }
        let mirror = self.mirrors.remove(from);
        let to = if to > from { to - 1 } else { to };
        let to = to.min(self.mirrors.len());
        let anchor = self.mirrors.get(to).map(|next| next.root().clone());
        mirror.root().move_before(anchor.as_ref());
        self.mirrors.insert(to, mirror);
    }

    /// Clears the shared "syncing playlists" flag.
    pub fn container_loaded(&self) {
        self.syncing.set_int(0);
    }

    fn position_of(&self, playlist: PlaylistHandle) -> Option<usize> {
        self.mirrors
            .iter()
            .position(|mirror| mirror.playlist() == playlist)
    }

    pub fn find_mut(&mut self, playlist: PlaylistHandle) -> Option<&mut PlaylistMirror> {
        self.mirrors
            .iter_mut()
            .find(|mirror| mirror.playlist() == playlist)
    }

    /// Looks a mirror up by its captured URL.
    pub fn find_by_url(&self, url: &str) -> Option<&PlaylistMirror> {
        self.mirrors
            .iter()
            .find(|mirror| mirror.url() == Some(url))
    }

    pub fn mirrors(&self) -> &[PlaylistMirror] {
        &self.mirrors
    }
}

#[cfg(test)]
mod tests {
    use super::PlaylistCollection;
    use crate::backends::catalog::{test_support, CatalogSession};
    use crate::backends::{ContentSession, ObjectRef, PlaylistHandle};
    use crate::metadata::binding_registry::MetadataRegistry;
    use crate::metadata::BindContext;
    use crate::prop_tree::PropTree;
    use crate::protocol::Mailbox;

    fn titles(collection: &PlaylistCollection) -> Vec<String> {
        collection
            .mirrors()
            .iter()
            .filter_map(|mirror| mirror.title().string())
            .collect()
    }

    fn tree_titles(root: &crate::prop_tree::PropNode) -> Vec<String> {
        root.children()
            .iter()
            .filter_map(|node| {
                node.get("metadata")
                    .and_then(|metadata| metadata.get("title"))
                    .and_then(|title| title.string())
            })
            .collect()
    }

    #[test]
    fn test_load_initial_and_container_moves() {
        let (mailbox, _receiver) = Mailbox::channel();
        let mut session = CatalogSession::new(test_support::sample_fixture(), mailbox.clone());
        let registry = MetadataRegistry::new();
        let tree = PropTree::new();
        let root = tree.create_detached(Some("playlists"));
        let syncing = tree.create_detached(Some("syncing"));
        syncing.set_int(1);
        let mut collection = PlaylistCollection::new(root.clone(), syncing.clone());

        let mut ctx = BindContext {
            session: &mut session,
            registry: &registry,
            mailbox: &mailbox,
        };
        collection.load_initial(&mut ctx);
        assert_eq!(titles(&collection), vec!["Road Trip", "-", "Chill", "Pending"]);
        assert_eq!(tree_titles(&root), titles(&collection));

        // Moving index 0 to 3 lands it before the entry originally at 3.
        collection.playlist_moved(0, 3);
        assert_eq!(titles(&collection), vec!["-", "Chill", "Road Trip", "Pending"]);
        assert_eq!(tree_titles(&root), titles(&collection));

        collection.playlist_moved(3, 0);
        assert_eq!(titles(&collection), vec!["Pending", "-", "Chill", "Road Trip"]);
        assert_eq!(tree_titles(&root), titles(&collection));

        collection.container_loaded();
        assert_eq!(syncing.int(), Some(0));
    }

    #[test]
    fn test_added_and_removed_playlists_keep_tree_in_sync() {
        let (mailbox, _receiver) = Mailbox::channel();
        let mut session = CatalogSession::new(test_support::sample_fixture(), mailbox.clone());
        let registry = MetadataRegistry::new();
        let tree = PropTree::new();
        let root = tree.create_detached(None);
        let mut collection = PlaylistCollection::new(root.clone(), tree.create_detached(None));
        let Some(ObjectRef::Playlist(chill)) = session.resolve("svc:playlist:pl3") else {
            panic!("pl3 should resolve");
        };
        let Some(ObjectRef::Playlist(road_trip)) = session.resolve("svc:playlist:pl1") else {
            panic!("pl1 should resolve");
        };

        let mut ctx = BindContext {
            session: &mut session,
            registry: &registry,
            mailbox: &mailbox,
        };
        collection.playlist_added(&mut ctx, chill, 0);
        collection.playlist_added(&mut ctx, road_trip, 0);
        assert_eq!(tree_titles(&root), vec!["Road Trip", "Chill"]);
        assert!(collection.find_by_url("svc:playlist:pl3").is_some());
        let bound = registry.len();
        assert!(bound > 0);

        collection.playlist_removed(chill, 1);
        assert_eq!(tree_titles(&root), vec!["Road Trip"]);
        assert!(registry.len() < bound);

        collection.playlist_removed(PlaylistHandle(999), 0);
        assert_eq!(collection.len(), 1);
    }
}
