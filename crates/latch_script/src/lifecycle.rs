// lifecycle.rs - Create/update/destroy fan-out driven by native frame code
//
// Instances created here are kept reachable from a hidden global table so the
// collector does not reclaim them between frames. Within one tick creates run
// before updates and updates before queued destroys; across entities the
// order is the scene's enumeration order (ascending id).

use std::collections::BTreeSet;

use latch_core::ecs::EntityHandle;
use rquickjs::{Ctx, Object, Value};
use tracing::{debug, trace};

use crate::binding::BridgeState;
use crate::error::{BridgeError, Faults};
use crate::registry::TypeRegistry;
use crate::signature::{Signature, ValueKind};
use crate::trampoline::{invoke, CallArgs, FunctionPath, ScriptFunction};

/// Hidden global holding the instances of bound entities, keyed by handle.
pub const INSTANCE_TABLE: &str = "__latchBindings";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub created: usize,
    pub updated: usize,
    pub destroyed: usize,
}

pub struct LifecyclePropagator {
    bound: BTreeSet<EntityHandle>,
    queued: Vec<String>,
    on_create_entity: ScriptFunction,
    on_update_entity: ScriptFunction,
    on_destroy_entity: ScriptFunction,
}

impl Default for LifecyclePropagator {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecyclePropagator {
    pub fn new() -> Self {
        let hook = |name: &str, signature: Signature| {
            ScriptFunction::with_signature(FunctionPath::Global(name.to_string()), signature)
        };
        let takes_id = Signature::new(vec![ValueKind::Text], Vec::new());
        Self {
            bound: BTreeSet::new(),
            queued: Vec::new(),
            // receives the instance, which is not a marshalable value
            on_create_entity: hook("onCreateEntity", Signature::default()),
            on_update_entity: hook("onUpdateEntity", takes_id.clone()),
            on_destroy_entity: hook("onDestroyEntity", takes_id),
        }
    }

    pub fn is_bound(&self, handle: EntityHandle) -> bool {
        self.bound.contains(&handle)
    }

    pub fn bound_count(&self) -> usize {
        self.bound.len()
    }

    /// Construct an instance for every scripted entity that has none yet.
    pub fn create_all(
        &mut self,
        ctx: &Ctx<'_>,
        state: &BridgeState,
        registry: &TypeRegistry,
    ) -> Result<usize, BridgeError> {
        let pending: Vec<(EntityHandle, String, String)> = {
            let scene = state.scene.borrow();
            scene
                .store()
                .iter()
                .filter(|(handle, _)| !self.bound.contains(handle))
                .filter_map(|(handle, entity)| {
                    entity
                        .script_type()
                        .map(|type_name| (handle, entity.id.clone(), type_name.to_string()))
                })
                .collect()
        };

        let instances = instance_table(ctx)?;
        for (handle, id, type_name) in &pending {
            let instance = registry.construct(ctx, &state.faults, type_name, id)?;
            instances.set(handle_key(*handle), instance.clone())?;
            self.bound.insert(*handle);
            debug!(entity = %id, type_name = %type_name, "Entity created");

            call_slot(ctx, &state.faults, &instance, "onCreate")?;
            if is_defined(ctx, &self.on_create_entity) {
                self.on_create_entity
                    .call_raw(ctx, &state.faults, vec![instance.into_value()])?;
            }
        }
        Ok(pending.len())
    }

    /// Run `onUpdateEntity` for every live entity, preceded by the instance's
    /// `onUpdate` slot when the entity is bound. Returns the entities visited.
    pub fn update_all(&mut self, ctx: &Ctx<'_>, state: &BridgeState) -> Result<usize, BridgeError> {
        let (dead, targets) = {
            let scene = state.scene.borrow();
            let dead: Vec<EntityHandle> = self
                .bound
                .iter()
                .copied()
                .filter(|&handle| !scene.is_alive(handle))
                .collect();
            let targets: Vec<(EntityHandle, String)> = scene
                .store()
                .iter()
                .map(|(handle, entity)| (handle, entity.id.clone()))
                .collect();
            (dead, targets)
        };

        let instances = instance_table(ctx)?;
        for handle in dead {
            trace!(%handle, "Dropping instance of entity erased outside the propagator");
            self.unbind(&instances, handle)?;
        }

        for (handle, id) in &targets {
            if self.bound.contains(handle) {
                if let Some(instance) = instance_of(&instances, *handle)? {
                    call_slot(ctx, &state.faults, &instance, "onUpdate")?;
                }
            }
            if is_defined(ctx, &self.on_update_entity) {
                self.on_update_entity
                    .call(ctx, &state.faults, &CallArgs::new().text(id.as_str()))?;
            }
        }
        Ok(targets.len())
    }

    /// Run the destroy hooks, then erase the entity. Returns false when no
    /// entity has this id.
    pub fn destroy(&mut self, ctx: &Ctx<'_>, state: &BridgeState, id: &str) -> Result<bool, BridgeError> {
        let Some(handle) = state.scene.borrow().handle_of(id) else {
            return Ok(false);
        };

        let instances = instance_table(ctx)?;
        if let Some(instance) = instance_of(&instances, handle)? {
            call_slot(ctx, &state.faults, &instance, "onDestroy")?;
        }
        if is_defined(ctx, &self.on_destroy_entity) {
            self.on_destroy_entity
                .call(ctx, &state.faults, &CallArgs::new().text(id))?;
        }
        self.unbind(&instances, handle)?;

        // hooks may have renamed the entity
        let current = state.scene.borrow().resolve(handle).ok().map(|entity| entity.id.clone());
        if let Some(current) = current {
            state.scene.borrow_mut().erase(&current);
            debug!(entity = %current, "Entity destroyed");
        }
        Ok(true)
    }

    /// Destroy `id` at the end of the next tick.
    pub fn queue_destroy(&mut self, id: impl Into<String>) {
        self.queued.push(id.into());
    }

    /// One frame: creates, updates, then queued destroys.
    pub fn tick(
        &mut self,
        ctx: &Ctx<'_>,
        state: &BridgeState,
        registry: &TypeRegistry,
    ) -> Result<TickReport, BridgeError> {
        let mut report = TickReport {
            created: self.create_all(ctx, state, registry)?,
            updated: self.update_all(ctx, state)?,
            destroyed: 0,
        };
        for id in std::mem::take(&mut self.queued) {
            if self.destroy(ctx, state, &id)? {
                report.destroyed += 1;
            }
        }
        Ok(report)
    }

    /// Forget every instance; they become collectable.
    pub fn release_all(&mut self, ctx: &Ctx<'_>) -> Result<(), BridgeError> {
        ctx.globals().remove(INSTANCE_TABLE)?;
        self.bound.clear();
        self.queued.clear();
        Ok(())
    }

    fn unbind(&mut self, instances: &Object<'_>, handle: EntityHandle) -> Result<(), BridgeError> {
        instances.remove(handle_key(handle))?;
        self.bound.remove(&handle);
        Ok(())
    }
}

fn handle_key(handle: EntityHandle) -> String {
    handle.to_bits().to_string()
}

fn instance_table<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
    let globals = ctx.globals();
    let existing: Value = globals.get(INSTANCE_TABLE)?;
    if let Some(table) = existing.into_object() {
        return Ok(table);
    }
    let table = Object::new(ctx.clone())?;
    globals.set(INSTANCE_TABLE, table.clone())?;
    Ok(table)
}

fn instance_of<'js>(instances: &Object<'js>, handle: EntityHandle) -> rquickjs::Result<Option<Object<'js>>> {
    let instance: Value = instances.get(handle_key(handle))?;
    Ok(instance.into_object())
}

fn is_defined(ctx: &Ctx<'_>, hook: &ScriptFunction) -> bool {
    let defined = hook.exists(ctx);
    if !defined {
        trace!(hook = %hook.label(), "Hook not defined, skipped");
    }
    defined
}

/// Call the instance's own `slot(self)` if it holds a function.
fn call_slot<'js>(ctx: &Ctx<'js>, faults: &Faults, instance: &Object<'js>, slot: &str) -> Result<(), BridgeError> {
    let hook: Value = instance.get(slot).map_err(|error| faults.resolve(ctx, slot, error))?;
    let Some(hook) = hook.into_function() else {
        return Ok(());
    };
    let this = instance.clone().into_value();
    invoke(ctx, faults, slot, &hook, this.clone(), vec![this])?;
    Ok(())
}
