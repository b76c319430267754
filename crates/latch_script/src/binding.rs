//! Binding instances
//!
//! A binding is a script `Proxy` whose target is the instance's dynamic
//! extension store and whose traps route every string-keyed access through
//! the type's [`DispatchTable`]. The binding holds an [`EntityHandle`], never
//! a reference, and re-resolves it through the scene on every access; once
//! the entity is erased every access throws a stale-reference error.
//!
//! The native side of a binding is owned by the trap closures and dropped
//! when the runtime collects the proxy. Dropping only releases bookkeeping.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use latch_core::ecs::{Entity, EntityHandle, Scene, StoreError};
use latch_core::glam::Vec3;
use latch_services::ReadOnlyWrites;
use rquickjs::convert::Coerced;
use rquickjs::function::Constructor;
use rquickjs::{Ctx, Exception, Function, IntoJs, Object, Value};
use tracing::{debug, trace};

use crate::dispatch::{ComputedField, FixedField, NativeMethod, Resolver};
use crate::error::{BridgeError, Faults};
use crate::registry::TypeEntry;
use crate::trampoline::text_of;

/// State shared by every binding of one session.
pub struct BridgeState {
    pub scene: Rc<RefCell<Scene>>,
    pub live: LiveBindings,
    pub faults: Faults,
    pub read_only_writes: ReadOnlyWrites,
}

impl BridgeState {
    pub fn new(scene: Rc<RefCell<Scene>>, faults: Faults, read_only_writes: ReadOnlyWrites) -> Self {
        Self {
            scene,
            live: LiveBindings::default(),
            faults,
            read_only_writes,
        }
    }
}

#[derive(Debug)]
struct LiveEntry {
    count: usize,
    /// Last id seen for the entity, reported once the handle goes stale.
    entity_id: String,
}

/// Uncollected bindings per entity handle. Every binding of one handle
/// shares the entry, so a rename through one is seen by all of them.
#[derive(Debug, Default)]
pub struct LiveBindings {
    entries: RefCell<BTreeMap<EntityHandle, LiveEntry>>,
}

impl LiveBindings {
    fn acquire(&self, handle: EntityHandle, entity_id: &str) {
        let mut entries = self.entries.borrow_mut();
        let entry = entries.entry(handle).or_insert_with(|| LiveEntry {
            count: 0,
            entity_id: String::new(),
        });
        entry.count += 1;
        entry.entity_id = entity_id.to_string();
    }

    fn release(&self, handle: EntityHandle) {
        let mut entries = self.entries.borrow_mut();
        if let Some(entry) = entries.get_mut(&handle) {
            entry.count -= 1;
            if entry.count == 0 {
                entries.remove(&handle);
            }
        }
    }

    fn note_id(&self, handle: EntityHandle, entity_id: &str) {
        if let Some(entry) = self.entries.borrow_mut().get_mut(&handle) {
            if entry.entity_id != entity_id {
                entry.entity_id = entity_id.to_string();
            }
        }
    }

    fn last_id(&self, handle: EntityHandle) -> String {
        self.entries
            .borrow()
            .get(&handle)
            .map(|entry| entry.entity_id.clone())
            .unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.entries.borrow().values().map(|entry| entry.count).sum()
    }

    pub fn count(&self, handle: EntityHandle) -> usize {
        self.entries.borrow().get(&handle).map_or(0, |entry| entry.count)
    }
}

pub struct Binding {
    handle: EntityHandle,
    entry: Rc<TypeEntry>,
    state: Rc<BridgeState>,
}

impl Binding {
    pub(crate) fn new(handle: EntityHandle, entity_id: &str, entry: Rc<TypeEntry>, state: Rc<BridgeState>) -> Self {
        state.live.acquire(handle, entity_id);
        debug!(entity = entity_id, type_name = entry.name(), %handle, "Created binding");
        Self { handle, entry, state }
    }

    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    /// Wrap this binding in a script proxy over `store`.
    pub(crate) fn into_proxy<'js>(self, ctx: &Ctx<'js>, store: Object<'js>) -> rquickjs::Result<Object<'js>> {
        let binding = Rc::new(self);
        let handler = Object::new(ctx.clone())?;

        let this = Rc::clone(&binding);
        handler.set(
            "get",
            Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, target: Object<'js>, key: Value<'js>, receiver: Value<'js>| {
                    this.get(&ctx, target, key, receiver)
                },
            )?,
        )?;

        let this = Rc::clone(&binding);
        handler.set(
            "set",
            Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, target: Object<'js>, key: Value<'js>, value: Value<'js>, receiver: Value<'js>| {
                    this.set(&ctx, target, key, value, receiver)
                },
            )?,
        )?;

        let this = Rc::clone(&binding);
        handler.set(
            "has",
            Function::new(ctx.clone(), move |ctx: Ctx<'js>, target: Object<'js>, key: Value<'js>| {
                this.has(&ctx, target, key)
            })?,
        )?;

        handler.set(
            "deleteProperty",
            Function::new(ctx.clone(), move |ctx: Ctx<'js>, target: Object<'js>, key: Value<'js>| {
                binding.delete(&ctx, target, key)
            })?,
        )?;

        let proxy: Constructor = ctx.globals().get("Proxy")?;
        proxy.construct((store, handler))
    }

    fn get<'js>(
        self: &Rc<Self>,
        ctx: &Ctx<'js>,
        target: Object<'js>,
        key: Value<'js>,
        receiver: Value<'js>,
    ) -> rquickjs::Result<Value<'js>> {
        let Some(name) = property_name(&key)? else {
            return reflect(ctx, "get")?.call((target, key, receiver));
        };

        match self.entry.table().resolve(&name) {
            Resolver::Fixed(FixedField::EntityId) => {
                let id = self.read(ctx, |entity| entity.id.clone())?;
                self.state.live.note_id(self.handle, &id);
                id.into_js(ctx)
            }
            Resolver::Computed(ComputedField::Type) => {
                let type_name = self.read(ctx, |entity| entity.script_type().map(str::to_owned))?;
                type_name.into_js(ctx)
            }
            Resolver::Computed(ComputedField::Transform) => match self.read(ctx, |entity| entity.transform)? {
                Some(transform) => transform_object(ctx, transform.translation).map(Object::into_value),
                None => Ok(Value::new_undefined(ctx.clone())),
            },
            Resolver::Method(method) => {
                self.ensure_live(ctx)?;
                self.method(ctx, method)
            }
            Resolver::Dynamic => {
                self.ensure_live(ctx)?;
                trace!(field = %name, "Dynamic read");
                target.get(name)
            }
        }
    }

    fn set<'js>(
        &self,
        ctx: &Ctx<'js>,
        target: Object<'js>,
        key: Value<'js>,
        value: Value<'js>,
        receiver: Value<'js>,
    ) -> rquickjs::Result<bool> {
        let Some(name) = property_name(&key)? else {
            return reflect(ctx, "set")?.call((target, key, value, receiver));
        };
        self.ensure_live(ctx)?;

        match self.entry.table().resolve(&name) {
            Resolver::Fixed(field) if field.is_writable() => self.write_fixed(ctx, field, &value)?,
            Resolver::Dynamic => target.set(name, value)?,
            _ => match self.state.read_only_writes {
                ReadOnlyWrites::Reject => {
                    return Err(Exception::throw_type(ctx, &format!("field '{name}' is read-only")));
                }
                ReadOnlyWrites::FallThrough => {
                    trace!(field = %name, "Read-only field written to dynamic store");
                    target.set(name, value)?;
                }
            },
        }
        Ok(true)
    }

    fn has<'js>(&self, ctx: &Ctx<'js>, target: Object<'js>, key: Value<'js>) -> rquickjs::Result<bool> {
        let Some(name) = property_name(&key)? else {
            return reflect(ctx, "has")?.call((target, key));
        };
        self.ensure_live(ctx)?;

        if self.entry.table().resolve(&name).is_native() {
            return Ok(true);
        }
        target.contains_key(name)
    }

    /// Only dynamic slots can be deleted. Deleting a native name leaves it in
    /// place: silently under `FallThrough`, with a `TypeError` under `Reject`.
    fn delete<'js>(&self, ctx: &Ctx<'js>, target: Object<'js>, key: Value<'js>) -> rquickjs::Result<bool> {
        let Some(name) = property_name(&key)? else {
            return reflect(ctx, "deleteProperty")?.call((target, key));
        };
        self.ensure_live(ctx)?;

        if self.entry.table().resolve(&name).is_native() {
            return match self.state.read_only_writes {
                ReadOnlyWrites::Reject => Err(Exception::throw_type(ctx, &format!("field '{name}' cannot be deleted"))),
                ReadOnlyWrites::FallThrough => {
                    trace!(field = %name, "Delete of native field ignored");
                    Ok(true)
                }
            };
        }
        target.remove(name)?;
        Ok(true)
    }

    fn method<'js>(self: &Rc<Self>, ctx: &Ctx<'js>, method: NativeMethod) -> rquickjs::Result<Value<'js>> {
        let binding = Rc::clone(self);
        let function = match method {
            NativeMethod::HasComponent => Function::new(ctx.clone(), move |ctx: Ctx<'js>, name: Coerced<String>| {
                binding.read(&ctx, |entity| entity.has_component(&name.0))
            })?,
            NativeMethod::SetTransform => {
                Function::new(ctx.clone(), move |ctx: Ctx<'js>, x: f64, y: f64, z: f64| {
                    binding.set_translation(&ctx, Vec3::new(x as f32, y as f32, z as f32))
                })?
            }
        };
        Ok(function.into_value())
    }

    fn write_fixed<'js>(&self, ctx: &Ctx<'js>, field: FixedField, value: &Value<'js>) -> rquickjs::Result<()> {
        match field {
            FixedField::EntityId => {
                let Some(new_id) = text_of(ctx, value)? else {
                    return Err(Exception::throw_type(ctx, "entityId must be text"));
                };
                let renamed = self.state.scene.borrow_mut().rename(self.handle, new_id.clone());
                match renamed {
                    Ok(()) => {
                        let old_id = self.state.live.last_id(self.handle);
                        self.state.live.note_id(self.handle, &new_id);
                        debug!(from = %old_id, to = %new_id, "Entity renamed from script");
                        Ok(())
                    }
                    Err(StoreError::StaleHandle { .. }) => Err(self.stale(ctx)),
                    Err(error) => Err(self.state.faults.raise(ctx, error.into())),
                }
            }
        }
    }

    fn set_translation(&self, ctx: &Ctx<'_>, translation: Vec3) -> rquickjs::Result<()> {
        let updated = self.state.scene.borrow_mut().set_translation(self.handle, translation);
        updated.map_err(|_| self.stale(ctx))
    }

    /// Resolve the handle and read from the entity. The scene borrow ends
    /// before any script value is created.
    fn read<R>(&self, ctx: &Ctx<'_>, f: impl FnOnce(&Entity) -> R) -> rquickjs::Result<R> {
        let resolved = self.state.scene.borrow().resolve(self.handle).map(f);
        resolved.map_err(|_| self.stale(ctx))
    }

    fn ensure_live(&self, ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        let alive = self.state.scene.borrow().is_alive(self.handle);
        if alive {
            Ok(())
        } else {
            Err(self.stale(ctx))
        }
    }

    fn stale(&self, ctx: &Ctx<'_>) -> rquickjs::Error {
        let entity_id = self.state.live.last_id(self.handle);
        debug!(entity = %entity_id, handle = %self.handle, "Access through stale binding");
        self.state.faults.raise(ctx, BridgeError::StaleReference { entity_id })
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        let entity_id = self.state.live.last_id(self.handle);
        self.state.live.release(self.handle);
        debug!(
            entity = %entity_id,
            type_name = self.entry.name(),
            handle = %self.handle,
            "Destroyed binding"
        );
    }
}

/// String keys go through the dispatcher; symbols do not.
fn property_name(key: &Value<'_>) -> rquickjs::Result<Option<String>> {
    match key.as_string() {
        Some(name) => name.to_string().map(Some),
        None => Ok(None),
    }
}

/// Backing object for a binding's dynamic fields. It has no prototype, so a
/// key that was never written reads as `undefined` and `__proto__` is an
/// ordinary slot.
pub(crate) fn extension_store<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
    let object: Object = ctx.globals().get("Object")?;
    let create: Function = object.get("create")?;
    create.call((Value::new_null(ctx.clone()),))
}

fn reflect<'js>(ctx: &Ctx<'js>, operation: &str) -> rquickjs::Result<Function<'js>> {
    let reflect: Object = ctx.globals().get("Reflect")?;
    reflect.get(operation)
}

fn transform_object<'js>(ctx: &Ctx<'js>, translation: Vec3) -> rquickjs::Result<Object<'js>> {
    let obj = Object::new(ctx.clone())?;
    obj.set("x", translation.x as f64)?;
    obj.set("y", translation.y as f64)?;
    obj.set("z", translation.z as f64)?;
    Ok(obj)
}
