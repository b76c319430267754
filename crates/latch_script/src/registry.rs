// registry.rs - Script-exposed types and their constructors
//
// Registering `T` installs a global table `T` with `T.new(id)`. Entries are
// immutable once installed and live as long as the session.

use std::collections::BTreeMap;
use std::rc::Rc;

use latch_core::ecs::{Entity, TransformComponent};
use rquickjs::convert::Coerced;
use rquickjs::{Ctx, Function, IntoJs, Object, Value};
use tracing::info;

use crate::binding::{extension_store, Binding, BridgeState};
use crate::dispatch::DispatchTable;
use crate::error::{BridgeError, Faults};
use crate::trampoline::ScriptFunction;

/// Script-defined hooks copied from the type table onto each new instance.
pub const LIFECYCLE_SLOTS: [&str; 3] = ["onCreate", "onUpdate", "onDestroy"];

type Factory = Box<dyn Fn(&str) -> Entity>;

pub struct TypeEntry {
    name: String,
    table: DispatchTable,
    factory: Factory,
}

impl TypeEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    /// Native record for an id that is not in the scene yet.
    pub fn build(&self, id: &str) -> Entity {
        (self.factory)(id)
    }
}

#[derive(Default)]
pub struct TypeRegistry {
    entries: BTreeMap<String, Rc<TypeEntry>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity-backed type. New entities get a script component of
    /// this type and a default transform.
    pub fn register(&mut self, ctx: &Ctx<'_>, state: &Rc<BridgeState>, name: &str) -> Result<(), BridgeError> {
        let type_name = name.to_string();
        self.register_with(ctx, state, name, DispatchTable::entity(), move |id| {
            Entity::new(id)
                .with_script(type_name.as_str())
                .with_transform(TransformComponent::default())
        })
    }

    pub fn register_with<F>(
        &mut self,
        ctx: &Ctx<'_>,
        state: &Rc<BridgeState>,
        name: &str,
        table: DispatchTable,
        factory: F,
    ) -> Result<(), BridgeError>
    where
        F: Fn(&str) -> Entity + 'static,
    {
        if self.entries.contains_key(name) {
            return Err(BridgeError::DuplicateType {
                type_name: name.to_string(),
            });
        }

        let entry = Rc::new(TypeEntry {
            name: name.to_string(),
            table,
            factory: Box::new(factory),
        });
        install_constructor(ctx, state, &entry)?;
        self.entries.insert(name.to_string(), entry);
        info!(type_name = name, "Registered script type");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Rc<TypeEntry>> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Native-side `T.new(id)`.
    ///
    /// An unregistered type fails before the scene is touched.
    pub fn construct<'js>(
        &self,
        ctx: &Ctx<'js>,
        faults: &Faults,
        type_name: &str,
        id: &str,
    ) -> Result<Object<'js>, BridgeError> {
        if !self.contains(type_name) {
            return Err(BridgeError::UnregisteredType {
                type_name: type_name.to_string(),
            });
        }

        let constructor = ScriptFunction::method(type_name, "new", "s")?;
        let instance = constructor.call_raw(ctx, faults, vec![id.into_js(ctx)?])?;
        instance.into_object().ok_or_else(|| BridgeError::NotAnInstance {
            type_name: type_name.to_string(),
        })
    }
}

fn install_constructor<'js>(ctx: &Ctx<'js>, state: &Rc<BridgeState>, entry: &Rc<TypeEntry>) -> rquickjs::Result<()> {
    let globals = ctx.globals();
    let existing: Value = globals.get(entry.name())?;
    let table = match existing.into_object() {
        Some(table) => table,
        None => {
            let table = Object::new(ctx.clone())?;
            globals.set(entry.name(), table.clone())?;
            table
        }
    };

    let state = Rc::clone(state);
    let entry = Rc::clone(entry);
    let constructor = Function::new(ctx.clone(), move |ctx: Ctx<'js>, id: Coerced<String>| {
        instantiate(&ctx, &state, &entry, &id.0)
    })?;
    table.set("new", constructor)
}

/// Look up or create the entity, then wrap it in a fresh binding.
fn instantiate<'js>(
    ctx: &Ctx<'js>,
    state: &Rc<BridgeState>,
    entry: &Rc<TypeEntry>,
    id: &str,
) -> rquickjs::Result<Object<'js>> {
    let handle = state.scene.borrow_mut().get_or_insert_with(id, || entry.build(id));

    let store = extension_store(ctx)?;
    let definition: Value = ctx.globals().get(entry.name())?;
    if let Some(definition) = definition.into_object() {
        for slot in LIFECYCLE_SLOTS {
            let hook: Value = definition.get(slot)?;
            if hook.is_function() {
                store.set(slot, hook)?;
            }
        }
    }

    Binding::new(handle, id, Rc::clone(entry), Rc::clone(state)).into_proxy(ctx, store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ScriptRuntime;
    use latch_core::ecs::Scene;
    use latch_services::ReadOnlyWrites;
    use std::cell::RefCell;

    fn setup() -> (ScriptRuntime, Rc<BridgeState>, TypeRegistry) {
        let runtime = ScriptRuntime::new().unwrap();
        let mut scene = Scene::new();
        scene.insert("player", Entity::new("player").with_script("Player"));
        let state = Rc::new(BridgeState::new(
            Rc::new(RefCell::new(scene)),
            runtime.faults().clone(),
            ReadOnlyWrites::default(),
        ));
        let mut registry = TypeRegistry::new();
        runtime.with(|ctx| registry.register(&ctx, &state, "Player")).unwrap();
        (runtime, state, registry)
    }

    #[test]
    fn registering_twice_is_rejected() {
        let (runtime, state, mut registry) = setup();
        let err = runtime.with(|ctx| registry.register(&ctx, &state, "Player")).unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateType { type_name } if type_name == "Player"));
        assert_eq!(registry.names().collect::<Vec<_>>(), ["Player"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn new_creates_missing_entities_through_the_factory() {
        let (runtime, state, _registry) = setup();
        runtime.execute("var drone = Player.new('drone');").unwrap();

        let scene = state.scene.borrow();
        let drone = scene.get("drone").unwrap();
        assert_eq!(drone.script_type(), Some("Player"));
        assert_eq!(drone.transform, Some(TransformComponent::default()));
        assert_eq!(scene.len(), 2);
    }

    #[test]
    fn existing_type_tables_are_extended() {
        let runtime = ScriptRuntime::new().unwrap();
        let state = Rc::new(BridgeState::new(
            Rc::default(),
            runtime.faults().clone(),
            ReadOnlyWrites::default(),
        ));
        runtime.execute("var Camera = { fov: 90 };").unwrap();

        let mut registry = TypeRegistry::new();
        runtime.with(|ctx| registry.register(&ctx, &state, "Camera")).unwrap();
        let kept: bool = runtime.with(|ctx| ctx.eval("Camera.fov === 90 && typeof Camera.new === 'function'").unwrap());
        assert!(kept);
    }

    #[test]
    fn lifecycle_slots_are_copied_at_creation() {
        let (runtime, _state, _registry) = setup();
        runtime
            .execute(
                r#"
                var first = function () { return 1; };
                Player.onCreate = first;
                Player.onUpdate = "not a function";
                var p = Player.new('player');
                Player.onCreate = function () { return 2; };
                "#,
            )
            .unwrap();

        let copied: bool = runtime.with(|ctx| {
            ctx.eval("p.onCreate === first && p.onCreate() === 1 && p.onUpdate === undefined && p.onDestroy === undefined")
                .unwrap()
        });
        assert!(copied);
    }

    #[test]
    fn unregistered_types_do_not_touch_the_scene() {
        let (runtime, state, registry) = setup();

        let err = runtime
            .with(|ctx| registry.construct(&ctx, runtime.faults(), "Ghost", "x").map(|_| ()))
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnregisteredType { type_name } if type_name == "Ghost"));

        let err = runtime.execute("Ghost.new('x');").unwrap_err();
        assert!(matches!(err, BridgeError::Script(e) if e.message.contains("Ghost")));
        assert!(state.scene.borrow().get("x").is_none());
        assert_eq!(state.scene.borrow().len(), 1);
    }

    #[test]
    fn construct_goes_through_the_script_constructor() {
        let (runtime, state, registry) = setup();
        let id: String = runtime.with(|ctx| {
            let instance = registry.construct(&ctx, runtime.faults(), "Player", "enemy").unwrap();
            instance.get("entityId").unwrap()
        });
        assert_eq!(id, "enemy");
        assert!(state.scene.borrow().get("enemy").is_some());
    }
}
