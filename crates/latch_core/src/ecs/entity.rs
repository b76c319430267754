//! Entity handle with generational index
//!
//! Handles are lightweight (8 bytes) and reference a slot in the `EntityStore`.
//! The generation counter turns a use-after-erase into a checked failure.

use std::fmt;

use crate::ecs::{ComponentKind, ScriptComponent, TransformComponent};

/// Entity handle (generation-indexed for safety)
///
/// Format: [32-bit index | 32-bit generation]
/// - Index: Position in the store's slot array
/// - Generation: Incremented when the slot's entity is erased
///
/// Example:
/// ```ignore
/// let handle = store.insert("player", Entity::new("player"));
/// store.erase("player");
/// assert!(store.resolve(handle).is_err()); // generation mismatch
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle {
    index: u32,
    generation: u32,
}

impl EntityHandle {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Serialize to 64-bit integer (for script-side keys and logs)
    pub fn to_bits(&self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64)
    }

    /// Deserialize from 64-bit integer
    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// A scene entity: an id plus its component blocks.
///
/// Entities are plain value records owned by the store; they are replaced
/// wholesale on insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    pub id: String,
    pub script: Option<ScriptComponent>,
    pub transform: Option<TransformComponent>,
}

impl Entity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script: None,
            transform: None,
        }
    }

    /// Attach a script component of the given type.
    pub fn with_script(mut self, type_name: impl Into<String>) -> Self {
        self.script = Some(ScriptComponent::new(type_name));
        self
    }

    pub fn with_transform(mut self, transform: TransformComponent) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Script type name, if the entity carries a script component.
    pub fn script_type(&self) -> Option<&str> {
        self.script.as_ref().map(|script| script.type_name.as_str())
    }

    /// Check for a component by its script-facing name.
    ///
    /// Unknown names are simply absent.
    pub fn has_component(&self, name: &str) -> bool {
        match ComponentKind::from_name(name) {
            Some(ComponentKind::Script) => self.script.is_some(),
            Some(ComponentKind::Transform) => self.transform.is_some(),
            None => false,
        }
    }
}
