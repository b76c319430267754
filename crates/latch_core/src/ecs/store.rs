// store.rs - Exclusively-owned entity storage with generational slots
//
// Records live in a slot array; freed slots go to a pool and bump their
// generation so outstanding handles resolve to `StaleHandle`.
// The id index is ordered, which fixes the enumeration order to ascending id.

use crate::ecs::{Entity, EntityHandle, StoreError};
use std::collections::BTreeMap;
use tracing::trace;

struct Slot {
    generation: u32,
    entity: Option<Entity>,
}

/// Mapping from entity id to entity record.
#[derive(Default)]
pub struct EntityStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    index: BTreeMap<String, EntityHandle>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    /// Insert an entity under `id`, replacing any existing record wholesale.
    ///
    /// Overwriting keeps the existing handle valid. The record's `id` field is
    /// forced to `id` so the index and the record never diverge.
    pub fn insert(&mut self, id: impl Into<String>, mut entity: Entity) -> (EntityHandle, Option<Entity>) {
        let id = id.into();
        entity.id = id.clone();

        if let Some(&handle) = self.index.get(&id) {
            let slot = &mut self.slots[handle.index() as usize];
            let previous = slot.entity.replace(entity);
            trace!(%id, %handle, "entity overwritten");
            return (handle, previous);
        }

        let handle = self.alloc_slot(entity);
        self.index.insert(id, handle);
        (handle, None)
    }

    /// Get a reference to the entity with this id.
    pub fn get(&self, id: &str) -> Option<&Entity> {
        let handle = self.index.get(id)?;
        self.slots[handle.index() as usize].entity.as_ref()
    }

    /// Get a mutable reference to the entity with this id.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Entity> {
        let handle = *self.index.get(id)?;
        self.slots[handle.index() as usize].entity.as_mut()
    }

    pub fn handle_of(&self, id: &str) -> Option<EntityHandle> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Re-resolve a handle, failing if its generation no longer matches.
    pub fn resolve(&self, handle: EntityHandle) -> Result<&Entity, StoreError> {
        self.slots
            .get(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.entity.as_ref())
            .ok_or(StoreError::StaleHandle { handle })
    }

    pub fn resolve_mut(&mut self, handle: EntityHandle) -> Result<&mut Entity, StoreError> {
        self.slots
            .get_mut(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.entity.as_mut())
            .ok_or(StoreError::StaleHandle { handle })
    }

    pub fn is_alive(&self, handle: EntityHandle) -> bool {
        self.resolve(handle).is_ok()
    }

    /// Remove the entity with this id.
    ///
    /// The slot is returned to the pool and its generation is incremented,
    /// which invalidates every outstanding handle to it.
    pub fn erase(&mut self, id: &str) -> Option<Entity> {
        let handle = self.index.remove(id)?;
        let slot = &mut self.slots[handle.index() as usize];
        let entity = slot.entity.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index());
        trace!(%id, %handle, "entity erased");
        entity
    }

    /// Change the id of a live entity, re-keying the index.
    pub fn rename(&mut self, handle: EntityHandle, new_id: impl Into<String>) -> Result<(), StoreError> {
        let new_id = new_id.into();
        let old_id = self.resolve(handle)?.id.clone();
        if old_id == new_id {
            return Ok(());
        }
        if self.index.contains_key(&new_id) {
            return Err(StoreError::IdTaken { id: new_id });
        }

        self.index.remove(&old_id);
        self.index.insert(new_id.clone(), handle);
        self.resolve_mut(handle)?.id = new_id;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Entity ids in enumeration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// Live entities with their handles, in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityHandle, &Entity)> {
        self.index.values().filter_map(move |&handle| {
            self.slots[handle.index() as usize]
                .entity
                .as_ref()
                .map(|entity| (handle, entity))
        })
    }

    fn alloc_slot(&mut self, entity: Entity) -> EntityHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entity = Some(entity);
            EntityHandle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                entity: Some(entity),
            });
            EntityHandle::new(index, 0)
        }
    }
}
