//! Script session
//!
//! One session owns the runtime, the shared scene, the type registry and the
//! lifecycle propagator. Everything registered during the session is torn
//! down with it in [`ScriptSession::shutdown`].

use std::cell::{Ref, RefCell, RefMut};
use std::path::Path;
use std::rc::Rc;

use latch_core::ecs::Scene;
use latch_services::{BridgeSettings, InputSource, Keyboard};
use rquickjs::Ctx;
use tracing::{info, warn};

use crate::binding::BridgeState;
use crate::console::Console;
use crate::error::BridgeError;
use crate::keyboard;
use crate::lifecycle::{LifecyclePropagator, TickReport};
use crate::registry::TypeRegistry;
use crate::runtime::ScriptRuntime;
use crate::trampoline::{CallArgs, ScriptFunction, ScriptValue};

pub struct ScriptSession {
    // dropped first so bindings are finalized while the rest is still alive
    runtime: ScriptRuntime,
    state: Rc<BridgeState>,
    registry: TypeRegistry,
    lifecycle: LifecyclePropagator,
    console: Console,
    keyboard: Rc<Keyboard>,
    settings: BridgeSettings,
}

impl ScriptSession {
    pub fn new(settings: BridgeSettings, scene: Scene) -> Result<Self, BridgeError> {
        let runtime = ScriptRuntime::new()?;
        let state = Rc::new(BridgeState::new(
            Rc::new(RefCell::new(scene)),
            runtime.faults().clone(),
            settings.read_only_writes,
        ));

        let keyboard = Rc::new(Keyboard::new());
        let input: Rc<dyn InputSource> = keyboard.clone();
        let console = runtime.with(|ctx| -> rquickjs::Result<Console> {
            let console = Console::install(&ctx, settings.console_tag.as_str())?;
            keyboard::install(&ctx, input)?;
            Ok(console)
        })?;

        info!(console_tag = %settings.console_tag, read_only_writes = ?settings.read_only_writes, "Script session ready");
        Ok(Self {
            runtime,
            state,
            registry: TypeRegistry::new(),
            lifecycle: LifecyclePropagator::new(),
            console,
            keyboard,
            settings,
        })
    }

    /// Register every script type present in the scene that is not
    /// registered yet. Returns how many were added.
    pub fn register_scene_types(&mut self) -> Result<usize, BridgeError> {
        let types: Vec<String> = self.state.scene.borrow().types().map(str::to_owned).collect();
        let mut added = 0;
        for type_name in types {
            if !self.registry.contains(&type_name) {
                self.register_type(&type_name)?;
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn register_type(&mut self, type_name: &str) -> Result<(), BridgeError> {
        let Self {
            runtime,
            state,
            registry,
            ..
        } = self;
        runtime.with(|ctx| registry.register(&ctx, state, type_name))
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<(), BridgeError> {
        self.runtime.execute_file(path.as_ref())
    }

    pub fn execute(&self, source: &str) -> Result<(), BridgeError> {
        self.runtime.execute(source)
    }

    pub fn call(&self, function: &ScriptFunction, args: &CallArgs) -> Result<Vec<ScriptValue>, BridgeError> {
        self.runtime.with(|ctx| function.call(&ctx, self.runtime.faults(), args))
    }

    /// `T.new(id)` from native code; the instance is discarded.
    pub fn construct(&self, type_name: &str, id: &str) -> Result<(), BridgeError> {
        self.runtime.with(|ctx| {
            self.registry
                .construct(&ctx, self.runtime.faults(), type_name, id)
                .map(|_| ())
        })
    }

    pub fn create_all(&mut self) -> Result<usize, BridgeError> {
        let Self {
            runtime,
            state,
            registry,
            lifecycle,
            ..
        } = self;
        runtime.with(|ctx| lifecycle.create_all(&ctx, state, registry))
    }

    pub fn update_all(&mut self) -> Result<usize, BridgeError> {
        let Self {
            runtime,
            state,
            lifecycle,
            ..
        } = self;
        runtime.with(|ctx| lifecycle.update_all(&ctx, state))
    }

    pub fn destroy(&mut self, id: &str) -> Result<bool, BridgeError> {
        let Self {
            runtime,
            state,
            lifecycle,
            ..
        } = self;
        runtime.with(|ctx| lifecycle.destroy(&ctx, state, id))
    }

    pub fn queue_destroy(&mut self, id: impl Into<String>) {
        self.lifecycle.queue_destroy(id);
    }

    pub fn tick(&mut self) -> Result<TickReport, BridgeError> {
        let Self {
            runtime,
            state,
            registry,
            lifecycle,
            ..
        } = self;
        runtime.with(|ctx| lifecycle.tick(&ctx, state, registry))
    }

    /// Run `f` inside the session's script context.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(Ctx<'_>) -> R,
    {
        self.runtime.with(f)
    }

    pub fn scene(&self) -> Ref<'_, Scene> {
        self.state.scene.borrow()
    }

    pub fn scene_mut(&self) -> RefMut<'_, Scene> {
        self.state.scene.borrow_mut()
    }

    pub fn lifecycle(&self) -> &LifecyclePropagator {
        &self.lifecycle
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Bindings whose proxies have not been collected yet.
    pub fn live_bindings(&self) -> usize {
        self.state.live.total()
    }

    pub fn run_gc(&self) {
        self.runtime.run_gc();
    }

    /// Tear the session down and return the number of bindings that
    /// survived the runtime (zero unless something leaked).
    pub fn shutdown(self) -> usize {
        let Self {
            runtime,
            state,
            mut lifecycle,
            registry,
            settings,
            ..
        } = self;

        if let Err(error) = runtime.with(|ctx| lifecycle.release_all(&ctx)) {
            warn!(%error, "Failed to release lifecycle instances");
        }
        if settings.gc_on_shutdown {
            runtime.run_gc();
        }
        let referenced = state.live.total();
        if referenced > 0 {
            info!(referenced, "Bindings still referenced by script at shutdown");
        }

        drop(runtime);
        drop(registry);
        let leaked = state.live.total();
        if leaked > 0 {
            warn!(leaked, "Bindings outlived the script runtime");
        }
        info!("Script session shut down");
        leaked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latch_core::ecs::Entity;
    use latch_services::ReadOnlyWrites;
    use std::io::Write;

    fn demo_scene() -> Scene {
        let mut scene = Scene::new();
        scene.insert("player", Entity::new("player").with_script("Player"));
        scene.insert("camera", Entity::new("camera").with_script("Camera"));
        scene.insert("light", Entity::new("light"));
        scene
    }

    fn session() -> ScriptSession {
        let mut session = ScriptSession::new(BridgeSettings::default(), demo_scene()).unwrap();
        assert_eq!(session.register_scene_types().unwrap(), 2);
        session
    }

    #[test]
    fn scene_types_are_registered_once() {
        let mut session = session();
        assert_eq!(session.registry().names().collect::<Vec<_>>(), ["Camera", "Player"]);
        assert_eq!(session.register_scene_types().unwrap(), 0);
        assert!(matches!(
            session.register_type("Player"),
            Err(BridgeError::DuplicateType { .. })
        ));
    }

    #[test]
    fn loads_scripts_and_calls_into_them() {
        let session = session();
        let mut file = tempfile::Builder::new().suffix(".js").tempfile().unwrap();
        writeln!(file, "function describe(id) {{ var e = Player.new(id); return e.entityId + ':' + e.type; }}").unwrap();
        session.load_file(file.path()).unwrap();

        let describe = ScriptFunction::global("describe", "s>s").unwrap();
        let results = session.call(&describe, &CallArgs::new().text("player")).unwrap();
        assert_eq!(results[0].as_text(), Some("player:Player"));

        let missing = file.path().with_extension("gone");
        assert!(matches!(session.load_file(&missing), Err(BridgeError::Load { .. })));
    }

    #[test]
    fn console_and_keyboard_are_installed() {
        let session = session();
        session.keyboard().press("Esc");
        session
            .execute("if (Keyboard.isKeyPressed('Esc')) { print('escape held'); }")
            .unwrap();
        assert_eq!(session.console().transcript(), ["escape held"]);
        assert_eq!(session.console().tag(), "script");

        let print = ScriptFunction::global("print", "s").unwrap();
        session.call(&print, &CallArgs::new().text("from native")).unwrap();
        assert_eq!(session.console().transcript().last().map(String::as_str), Some("from native"));
    }

    #[test]
    fn native_construct_rejects_unknown_types() {
        let session = session();
        let before: Vec<String> = session.scene().store().ids().map(str::to_owned).collect();

        assert!(matches!(
            session.construct("Ghost", "x"),
            Err(BridgeError::UnregisteredType { type_name }) if type_name == "Ghost"
        ));
        let after: Vec<String> = session.scene().store().ids().map(str::to_owned).collect();
        assert_eq!(before, after);

        session.construct("Camera", "x").unwrap();
        assert_eq!(session.scene().get("x").and_then(|e| e.script_type()), Some("Camera"));
    }

    #[test]
    fn reject_policy_comes_from_settings() {
        let settings = BridgeSettings {
            read_only_writes: ReadOnlyWrites::Reject,
            ..BridgeSettings::default()
        };
        let mut session = ScriptSession::new(settings, demo_scene()).unwrap();
        session.register_scene_types().unwrap();
        assert!(session.execute("Player.new('player').type = 'x';").is_err());
    }

    #[test]
    fn frames_drive_the_lifecycle() {
        let mut session = session();
        session
            .execute(
                r#"
                var seen = [];
                function onCreateEntity(e) { seen.push('create:' + e.entityId); }
                function onUpdateEntity(id) { seen.push('update:' + id); }
                function onDestroyEntity(id) { seen.push('destroy:' + id); }
                function seenSoFar() { return seen.join(','); }
                "#,
            )
            .unwrap();

        session.queue_destroy("camera");
        let report = session.tick().unwrap();
        assert_eq!((report.created, report.updated, report.destroyed), (2, 3, 1));
        assert_eq!(session.update_all().unwrap(), 2);

        let seen = ScriptFunction::global("seenSoFar", ">s").unwrap();
        let results = session.call(&seen, &CallArgs::new()).unwrap();
        assert_eq!(
            results[0].as_text(),
            Some("create:camera,create:player,update:camera,update:light,update:player,destroy:camera,update:light,update:player")
        );
        assert!(session.scene().get("camera").is_none());
        assert!(session.scene().get("light").is_some());
    }

    #[test]
    fn shutdown_finalizes_every_binding() {
        let mut session = session();
        session.execute("var held = Player.new('player'); held.notes = 'kept';").unwrap();
        session.create_all().unwrap();
        assert_eq!(session.live_bindings(), 3);
        assert_eq!(session.lifecycle().bound_count(), 2);

        session.execute("(function () { Camera.new('temp'); })();").unwrap();
        session.run_gc();
        assert_eq!(session.live_bindings(), 3);

        assert_eq!(session.shutdown(), 0);
    }
}
