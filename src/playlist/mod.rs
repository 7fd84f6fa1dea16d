//! Mirrors of the session's playlist container inside the property tree.

pub mod playlist_collection;
pub mod playlist_mirror;

pub use playlist_collection::PlaylistCollection;
pub use playlist_mirror::PlaylistMirror;
