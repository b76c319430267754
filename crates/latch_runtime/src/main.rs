//! Latch Engine Runtime
//!
//! Demo harness for the script bridge: builds a small scene, loads the
//! startup script and drives a few frames of lifecycle hooks.
//!
//! Usage: `latch [settings.json]`

use anyhow::{Context, Result};
use latch_core::ecs::{Entity, Scene, TransformComponent};
use latch_script::{CallArgs, ScriptFunction, ScriptSession};
use latch_services::BridgeSettings;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(error) = run() {
        tracing::error!("{error:#}");
        eprintln!("fatal: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    tracing::info!("Latch Engine v{}", latch_core::VERSION);

    let settings = match std::env::args().nth(1) {
        Some(path) => BridgeSettings::load(&path).with_context(|| format!("loading settings from {path}"))?,
        None => BridgeSettings::default(),
    };

    let mut session = ScriptSession::new(settings.clone(), demo_scene()).context("starting script session")?;
    let registered = session.register_scene_types()?;
    tracing::info!(registered, "Script types registered");

    session.keyboard().press("Esc");
    session
        .load_file(&settings.script_path)
        .with_context(|| format!("loading {}", settings.script_path.display()))?;

    let print = ScriptFunction::global("print", "s")?;
    session.call(&print, &CallArgs::new().text("Hello from native code"))?;

    let created = session.create_all()?;
    tracing::info!(created, "Entities bound");
    for frame in 0..settings.frames {
        let updated = session.update_all()?;
        tracing::debug!(frame, updated, "Frame complete");
    }

    session.destroy("player")?;
    session.update_all()?;

    let leaked = session.shutdown();
    anyhow::ensure!(leaked == 0, "{leaked} bindings outlived the script runtime");
    Ok(())
}

fn demo_scene() -> Scene {
    let mut scene = Scene::new();
    scene.insert(
        "player",
        Entity::new("player")
            .with_script("Player")
            .with_transform(TransformComponent::new(0.0, 1.0, 0.0)),
    );
    scene.insert(
        "camera",
        Entity::new("camera")
            .with_script("Camera")
            .with_transform(TransformComponent::new(0.0, 5.0, -10.0)),
    );
    scene
}
