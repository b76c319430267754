// dispatch.rs - Attribute resolver tables
//
// Resolution order for a property name:
//   fixed native field -> computed native field -> native method -> dynamic store
// The table is built once per registered type; lookups never compare against
// the full list of names.

use std::collections::HashMap;

/// Native fields read straight from the entity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedField {
    EntityId,
}

impl FixedField {
    pub fn is_writable(self) -> bool {
        match self {
            FixedField::EntityId => true,
        }
    }
}

/// Native values synthesized on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedField {
    /// Script component type name.
    Type,
    /// Fresh `{ x, y, z }` object built from the transform.
    Transform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeMethod {
    HasComponent,
    SetTransform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolver {
    Fixed(FixedField),
    Computed(ComputedField),
    Method(NativeMethod),
    Dynamic,
}

impl Resolver {
    /// Lower wins.
    fn tier(self) -> u8 {
        match self {
            Resolver::Fixed(_) => 0,
            Resolver::Computed(_) => 1,
            Resolver::Method(_) => 2,
            Resolver::Dynamic => 3,
        }
    }

    /// True when the name is owned by native code.
    pub fn is_native(self) -> bool {
        self != Resolver::Dynamic
    }
}

#[derive(Debug, Clone, Default)]
pub struct DispatchTable {
    resolvers: HashMap<&'static str, Resolver>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table shared by every entity-backed type.
    pub fn entity() -> Self {
        Self::new()
            .with("entityId", Resolver::Fixed(FixedField::EntityId))
            .with("type", Resolver::Computed(ComputedField::Type))
            .with("transform", Resolver::Computed(ComputedField::Transform))
            .with("hasComponent", Resolver::Method(NativeMethod::HasComponent))
            .with("setTransform", Resolver::Method(NativeMethod::SetTransform))
    }

    /// Add a resolver. A name already held by a higher tier keeps it.
    pub fn with(mut self, name: &'static str, resolver: Resolver) -> Self {
        if resolver == Resolver::Dynamic {
            return self;
        }
        self.resolvers
            .entry(name)
            .and_modify(|existing| {
                if resolver.tier() < existing.tier() {
                    *existing = resolver;
                }
            })
            .or_insert(resolver);
        self
    }

    pub fn resolve(&self, name: &str) -> Resolver {
        self.resolvers.get(name).copied().unwrap_or(Resolver::Dynamic)
    }

    /// Native names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.resolvers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
