//! Script runtime management
//!
//! Owns the QuickJS runtime and the single context every bridge component
//! evaluates in.

use rquickjs::{Context, Ctx, Runtime, Value};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{BridgeError, Faults};

/// Script execution context
pub struct ScriptRuntime {
    runtime: Runtime,
    context: Context,
    faults: Faults,
}

impl ScriptRuntime {
    pub fn new() -> Result<Self, BridgeError> {
        let runtime = Runtime::new()?;
        let context = Context::full(&runtime)?;

        Ok(Self {
            runtime,
            context,
            faults: Faults::new(),
        })
    }

    /// Run `f` inside the context.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(Ctx<'_>) -> R,
    {
        self.context.with(f)
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    /// Load a script source file. Unreadable files are fatal for the caller.
    pub fn execute_file(&self, path: &Path) -> Result<(), BridgeError> {
        let source = std::fs::read_to_string(path).map_err(|source| BridgeError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loading script");
        self.evaluate(&path.display().to_string(), &source)
    }

    pub fn execute(&self, source: &str) -> Result<(), BridgeError> {
        self.evaluate("<eval>", source)
    }

    /// Run a collection pass; unreachable bindings are finalized here.
    pub fn run_gc(&self) {
        debug!("Running script garbage collection");
        self.runtime.run_gc();
    }

    fn evaluate(&self, label: &str, source: &str) -> Result<(), BridgeError> {
        self.context.with(|ctx| {
            self.faults.clear();
            ctx.eval::<Value, _>(source)
                .map(|_| ())
                .map_err(|error| self.faults.resolve(&ctx, label, error))
        })
    }
}
