use crate::ecs::EntityHandle;
use thiserror::Error;

/// Errors raised by the entity store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("entity handle {handle} no longer refers to a live entity")]
    StaleHandle { handle: EntityHandle },

    #[error("entity id '{id}' is already taken by another entity")]
    IdTaken { id: String },
}
