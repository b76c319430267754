// component.rs - Component blocks carried by scene entities
//
// Components are addressed from scripts by name ("scriptComponent",
// "transformComponent"), not by Rust type.

use glam::Vec3;

/// Script-affinity tag: which script type drives this entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptComponent {
    pub type_name: String,
}

impl ScriptComponent {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
        }
    }
}

/// 3-float transform.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransformComponent {
    pub translation: Vec3,
}

impl TransformComponent {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            translation: Vec3::new(x, y, z),
        }
    }
}

/// Closed set of component kinds an entity may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Script,
    Transform,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 2] = [ComponentKind::Script, ComponentKind::Transform];

    /// Script-facing component name.
    pub fn name(self) -> &'static str {
        match self {
            ComponentKind::Script => "scriptComponent",
            ComponentKind::Transform => "transformComponent",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}
