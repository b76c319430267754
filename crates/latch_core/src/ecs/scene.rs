// scene.rs - Entity store plus the derived set of script type names
//
// The type set is reference-counted per name and patched on every
// insert/erase, so it always equals the union of the entities' script types.

use crate::ecs::{Entity, EntityHandle, EntityStore, StoreError, TransformComponent};
use glam::Vec3;
use std::collections::BTreeMap;

/// The scene: all entities plus the distinct script types they use.
#[derive(Default)]
pub struct Scene {
    store: EntityStore,
    types: BTreeMap<String, usize>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            store: EntityStore::new(),
            types: BTreeMap::new(),
        }
    }

    /// Read-only view of the entity store.
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Insert (or overwrite) an entity and update the type set.
    pub fn insert(&mut self, id: impl Into<String>, entity: Entity) -> EntityHandle {
        let added = entity.script_type().map(str::to_owned);
        let (handle, previous) = self.store.insert(id, entity);
        if let Some(previous) = previous {
            self.release_type(previous.script_type());
        }
        if let Some(type_name) = added {
            *self.types.entry(type_name).or_insert(0) += 1;
        }
        handle
    }

    /// Look up an entity by id, inserting the one built by `create` if absent.
    pub fn get_or_insert_with<F>(&mut self, id: &str, create: F) -> EntityHandle
    where
        F: FnOnce() -> Entity,
    {
        match self.store.handle_of(id) {
            Some(handle) => handle,
            None => self.insert(id, create()),
        }
    }

    pub fn erase(&mut self, id: &str) -> Option<Entity> {
        let erased = self.store.erase(id)?;
        self.release_type(erased.script_type());
        Some(erased)
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.store.get(id)
    }

    pub fn handle_of(&self, id: &str) -> Option<EntityHandle> {
        self.store.handle_of(id)
    }

    pub fn resolve(&self, handle: EntityHandle) -> Result<&Entity, StoreError> {
        self.store.resolve(handle)
    }

    pub fn is_alive(&self, handle: EntityHandle) -> bool {
        self.store.is_alive(handle)
    }

    /// Change the id of a live entity.
    pub fn rename(&mut self, handle: EntityHandle, new_id: impl Into<String>) -> Result<(), StoreError> {
        self.store.rename(handle, new_id)
    }

    /// Overwrite (or attach) the transform of a live entity.
    pub fn set_translation(&mut self, handle: EntityHandle, translation: Vec3) -> Result<(), StoreError> {
        let entity = self.store.resolve_mut(handle)?;
        entity
            .transform
            .get_or_insert_with(TransformComponent::default)
            .translation = translation;
        Ok(())
    }

    /// Distinct script type names, sorted.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn release_type(&mut self, type_name: Option<&str>) {
        let Some(type_name) = type_name else {
            return;
        };
        if let Some(count) = self.types.get_mut(type_name) {
            *count -= 1;
            if *count == 0 {
                self.types.remove(type_name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rescan(scene: &Scene) -> Vec<String> {
        let mut types: Vec<String> = scene
            .store()
            .iter()
            .filter_map(|(_, e)| e.script_type().map(str::to_owned))
            .collect();
        types.sort();
        types.dedup();
        types
    }

    #[test]
    fn type_set_tracks_union_of_script_types() {
        let mut scene = Scene::new();
        scene.insert("player", Entity::new("player").with_script("Player"));
        scene.insert("camera", Entity::new("camera").with_script("Camera"));
        scene.insert("enemy", Entity::new("enemy").with_script("Player"));
        scene.insert("light", Entity::new("light"));

        assert_eq!(scene.types().collect::<Vec<_>>(), ["Camera", "Player"]);

        scene.erase("player");
        assert!(scene.has_type("Player"));
        scene.erase("enemy");
        assert!(!scene.has_type("Player"));

        scene.insert("camera", Entity::new("camera").with_script("Drone"));
        assert_eq!(scene.types().collect::<Vec<_>>(), ["Drone"]);
        assert_eq!(scene.types().map(str::to_owned).collect::<Vec<_>>(), rescan(&scene));
    }

    #[test]
    fn get_or_insert_with_only_creates_once() {
        let mut scene = Scene::new();
        let first = scene.get_or_insert_with("x", || Entity::new("x").with_script("Ghost"));
        let second = scene.get_or_insert_with("x", || panic!("must not create twice"));
        assert_eq!(first, second);
        assert!(scene.has_type("Ghost"));
    }

    #[test]
    fn set_translation_attaches_transform() {
        let mut scene = Scene::new();
        let handle = scene.insert("probe", Entity::new("probe"));
        scene.set_translation(handle, Vec3::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(
            scene.get("probe").unwrap().transform,
            Some(TransformComponent::new(1.0, 2.0, 3.0))
        );

        scene.erase("probe");
        assert!(scene.set_translation(handle, Vec3::ZERO).is_err());
    }
}
