//! Bridge between multi-threaded callers and a single-threaded content session.
//!
//! [`bridge::ContentBridge`] is the entry point. All session access happens on
//! one worker thread; callers get blocking request/response calls and a live
//! mirror of playlists and metadata in a shared [`prop_tree::PropTree`].

pub(crate) mod app_context;
pub mod audio_delivery;
pub mod backends;
pub mod bridge;
pub mod browse;
pub mod config;
pub mod credentials;
pub mod error;
pub mod external_ref;
pub mod image_pipeline;
pub mod media_pipe;
pub mod metadata;
pub mod play_queue;
pub mod playlist;
pub mod prop_tree;
pub mod protocol;
pub mod retry;
pub mod service_uri;
mod session_worker;

pub use bridge::{Collaborators, ContentBridge};
pub use error::{BridgeError, ErrorKind};
