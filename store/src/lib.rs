//! Resource store: in-process TTL cache of packets, addressable by
//! `webfetch://` URIs.

mod store;
mod uri;

pub use store::{ListObserver, ResourceStore};
pub use uri::{ResourceKind, ResourceUri, render_resource};
