//! Rendering of browse and search results into page nodes.

use std::cmp::Ordering;

use log::debug;

use crate::backends::{
    AlbumHandle, AlbumInfo, AlbumType, ArtistHandle, ObjectRef, SearchResult, TrackHandle,
};
use crate::metadata::binding_registry::BoundField;
use crate::metadata::BindContext;
use crate::prop_tree::PropNode;

/// What an outstanding browse or search request should produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseKind {
    Album,
    Artist {
        album_type: AlbumType,
        /// Tracks directly under `nodes` instead of album nodes.
        flat: bool,
    },
    Search {
        query: String,
    },
}

/// Destination of an asynchronous browse or search.
#[derive(Debug, Clone)]
pub struct BrowseTarget {
    /// Container receiving the result nodes.
    pub nodes: PropNode,
    /// Page root when the results fill an opened page.
    pub page: Option<PropNode>,
    pub kind: BrowseKind,
}

impl BrowseTarget {
    /// Whether whoever asked for the results has gone away.
    pub fn is_cancelled(&self) -> bool {
        self.nodes.is_destroyed()
    }

    /// Marks the page as finished loading.
    pub fn finish(&self) {
        if let Some(page) = &self.page {
            page.create("loading").set_int(0);
        }
    }
}

/// Adds a directory entry with a title and URL.
pub fn add_dir(parent: &PropNode, title: &str, url: &str) -> PropNode {
    let node = parent.create_anonymous();
    node.create("type").set_string("directory");
    node.create("url").set_string(url);
    node.create("metadata").create("title").set_string(title);
    node
}

/// Appends a track node bound to the track's metadata. Returns `false` when
/// `parent` is already gone.
pub fn add_track_node(ctx: &mut BindContext<'_>, parent: &PropNode, track: TrackHandle) -> bool {
    let node = parent.tree().create_detached(None);
    node.create("type").set_string("track");
    if let Some(url) = ctx.session.uri_of(ObjectRef::Track(track)) {
        node.create("url").set_string(&url);
    }
    let metadata = node.create("metadata");
    ctx.registry.bind(
        ctx.session,
        ctx.mailbox,
        &metadata,
        BoundField::Track(track),
        None,
    );
    if node.set_parent(parent).is_err() {
        node.destroy();
        return false;
    }
    true
}

fn add_album_node(
    ctx: &mut BindContext<'_>,
    parent: &PropNode,
    album: AlbumHandle,
) -> Option<PropNode> {
    let node = parent.tree().create_detached(None);
    node.create("type").set_string("album");
    if let Some(url) = ctx.session.uri_of(ObjectRef::Album(album)) {
        node.create("url").set_string(&url);
    }
    let metadata = node.create("metadata");
    for (name, field) in [
        ("title", BoundField::AlbumName(album)),
        ("album_name", BoundField::AlbumName(album)),
        ("album_year", BoundField::AlbumYear(album)),
        ("artist_name", BoundField::AlbumArtistName(album)),
        ("album_art", BoundField::AlbumImage(album)),
    ] {
        ctx.registry
            .bind(ctx.session, ctx.mailbox, &metadata.create(name), field, None);
    }
    if node.set_parent(parent).is_err() {
        node.destroy();
        return None;
    }
    Some(node)
}

/// Section an album belongs to when browsing `artist`: anything credited to
/// another album artist counts as a compilation.
pub fn effective_album_type(info: &AlbumInfo, artist: ArtistHandle) -> AlbumType {
    if info.artist != Some(artist) {
        AlbumType::Compilation
    } else {
        info.album_type
    }
}

/// Orders albums newest first, then by name ignoring case.
pub fn compare_albums(a: &AlbumInfo, b: &AlbumInfo) -> Ordering {
    b.year
        .cmp(&a.year)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
}

/// Fills `target` with the tracks of a browsed album.
pub fn album_browsed(ctx: &mut BindContext<'_>, target: &BrowseTarget, tracks: &[TrackHandle]) {
    if target.is_cancelled() {
        debug!("Browse: album page closed before results arrived");
        return;
    }
    for track in tracks {
        if !add_track_node(ctx, &target.nodes, *track) {
            return;
        }
    }
}

/// Fills `target` with an artist's albums of one section.
///
/// `tracks` arrive grouped by album; each group becomes an album node
/// (or, when flat, its tracks are appended directly).
pub fn artist_browsed(
    ctx: &mut BindContext<'_>,
    target: &BrowseTarget,
    artist: ArtistHandle,
    tracks: &[TrackHandle],
) {
    let BrowseKind::Artist { album_type, flat } = target.kind else {
        return;
    };
    if target.is_cancelled() {
        debug!("Browse: artist page closed before results arrived");
        return;
    }

    let mut groups: Vec<(AlbumHandle, AlbumInfo, Vec<TrackHandle>)> = Vec::new();
    for track in tracks {
        let Some(album) = ctx.session.track_info(*track).and_then(|info| info.album) else {
            continue;
        };
        match groups.last_mut() {
            Some((current, _, members)) if *current == album => members.push(*track),
            _ => {
                let Some(info) = ctx.session.album_info(album) else {
                    continue;
                };
                groups.push((album, info, vec![*track]));
            }
        }
    }
    groups.retain(|(_, info, _)| {
        info.available && effective_album_type(info, artist) == album_type
    });

    if flat {
        for (_, _, members) in &groups {
            for track in members {
                if !add_track_node(ctx, &target.nodes, *track) {
                    return;
                }
            }
        }
        return;
    }

    groups.sort_by(|(_, a, _), (_, b, _)| compare_albums(a, b));
    for (album, _, members) in groups {
        let Some(album_node) = add_album_node(ctx, &target.nodes, album) else {
            return;
        };
        let duration_ms: u64 = members
            .iter()
            .filter_map(|track| ctx.session.track_info(*track))
            .map(|info| u64::from(info.duration_ms))
            .sum();
        let metadata = album_node.create("metadata");
        metadata.create("tracks").set_int(members.len() as i64);
        metadata.create("duration").set_float(duration_ms as f64 / 1000.0);
        let album_tracks = album_node.create("nodes");
        for track in members {
            add_track_node(ctx, &album_tracks, track);
        }
    }
}

/// Fills a search page: album hits first, then track hits.
pub fn search_completed(ctx: &mut BindContext<'_>, target: &BrowseTarget, result: &SearchResult) {
    if target.is_cancelled() {
        debug!("Browse: search page closed before results arrived");
        return;
    }
    for album in &result.albums {
        if add_album_node(ctx, &target.nodes, *album).is_none() {
            return;
        }
    }
    for track in &result.tracks {
        if !add_track_node(ctx, &target.nodes, *track) {
            return;
        }
    }

    if let Some(page) = &target.page {
        let view = if result.tracks.is_empty() && !result.albums.is_empty() {
            "albumcollection"
        } else {
            "list"
        };
        page.create("view").set_string(view);
        page.create("type").set_string("directory");
        if let BrowseKind::Search { query } = &target.kind {
            page.create("title").set_string(query);
        }
    }
}
