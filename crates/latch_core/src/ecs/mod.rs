//! Entity storage for the script bridge.
//!
//! Entities are value records keyed by a string id and owned by the
//! [`EntityStore`]. Nothing outside the store holds a reference into it;
//! other systems keep an [`EntityHandle`] and re-resolve it on every access.

mod component;
mod entity;
mod scene;
mod store;
mod store_error;

pub use component::{ComponentKind, ScriptComponent, TransformComponent};
pub use entity::{Entity, EntityHandle};
pub use scene::Scene;
pub use store::EntityStore;
pub use store_error::StoreError;
