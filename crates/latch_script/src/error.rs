//! Bridge error taxonomy
//!
//! Registration, marshaling and script execution failures all unwind to the
//! native call boundary that entered the script runtime.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use latch_core::ecs::StoreError;
use rquickjs::{Ctx, Exception, Value};
use thiserror::Error;

use crate::signature::MarshalError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("type '{type_name}' is not registered")]
    UnregisteredType { type_name: String },

    #[error("type '{type_name}' is already registered")]
    DuplicateType { type_name: String },

    #[error("'{type_name}.new' did not return an instance")]
    NotAnInstance { type_name: String },

    #[error("stale reference: entity '{entity_id}' was removed from the scene")]
    StaleReference { entity_id: String },

    #[error("script function '{name}' not found")]
    FunctionNotFound { name: String },

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to load script {path}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("script runtime error: {0}")]
    Runtime(#[from] rquickjs::Error),
}

/// An error raised inside script code, captured at the native call site.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("error in '{function}': {message}")]
pub struct ScriptError {
    /// Function (or source label) that was running.
    pub function: String,
    pub message: String,
    pub stack: Option<String>,
}

/// Native errors raised from inside trap functions.
///
/// A trap can only hand a thrown script value back to the runtime, so the
/// typed error is parked here and picked up again when the exception reaches
/// the native call boundary with the same message.
#[derive(Clone, Default)]
pub struct Faults {
    pending: Rc<RefCell<Option<BridgeError>>>,
}

impl Faults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `error` and throw its message as a script `Error`.
    pub fn raise(&self, ctx: &Ctx<'_>, error: BridgeError) -> rquickjs::Error {
        let message = error.to_string();
        *self.pending.borrow_mut() = Some(error);
        Exception::throw_message(ctx, &message)
    }

    pub fn clear(&self) {
        self.pending.borrow_mut().take();
    }

    /// Turn a failed runtime call into a bridge error.
    pub fn resolve(&self, ctx: &Ctx<'_>, function: &str, error: rquickjs::Error) -> BridgeError {
        if !matches!(error, rquickjs::Error::Exception) {
            self.clear();
            return BridgeError::Runtime(error);
        }

        let (message, stack) = describe_thrown(ctx.catch());
        let parked = self.pending.borrow_mut().take();
        match parked {
            Some(fault) if fault.to_string() == message => fault,
            _ => ScriptError {
                function: function.to_string(),
                message,
                stack,
            }
            .into(),
        }
    }
}

fn describe_thrown(thrown: Value<'_>) -> (String, Option<String>) {
    if let Some(text) = thrown.as_string() {
        return (text.to_string().unwrap_or_default(), None);
    }
    let Some(obj) = thrown.as_object() else {
        return (format!("uncaught {}", thrown.type_name()), None);
    };

    let text_prop = |name: &str| {
        obj.get::<_, Value>(name)
            .ok()
            .and_then(|value| value.as_string().and_then(|s| s.to_string().ok()))
    };
    let message = text_prop("message").unwrap_or_else(|| "uncaught exception".to_string());
    let stack = text_prop("stack").filter(|stack| !stack.is_empty());
    (message, stack)
}
