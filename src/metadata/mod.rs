//! Live metadata bindings between tree nodes and session objects.

pub mod binding_registry;

use crate::backends::ContentSession;
use crate::protocol::Mailbox;

use binding_registry::MetadataRegistry;

/// Worker-side handles needed to create nodes bound to session objects.
pub struct BindContext<'a> {
    pub session: &'a mut dyn ContentSession,
    pub registry: &'a MetadataRegistry,
    pub mailbox: &'a Mailbox,
}
