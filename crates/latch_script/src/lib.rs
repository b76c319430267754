//! Latch Scripting System
//!
//! Binds scene entities to JavaScript (QuickJS) objects.
//!
//! ## Architecture
//!
//! - **Type Registry:** one global table per script type, with `T.new(id)`
//! - **Bindings:** `Proxy` objects dispatching reads and writes through a
//!   per-type resolver table; entities are reached through generation-checked
//!   handles, never references
//! - **Trampoline:** signature-checked calls from native code into script
//! - **Lifecycle:** create/update/destroy hooks driven by native frame code
//!
//! [`ScriptSession`] owns all of it for the lifetime of one runtime.

pub mod binding;
pub mod console;
pub mod dispatch;
pub mod error;
pub mod keyboard;
pub mod lifecycle;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod signature;
pub mod trampoline;

pub use error::{BridgeError, ScriptError};
pub use lifecycle::TickReport;
pub use session::ScriptSession;
pub use signature::{MarshalError, Signature, ValueKind};
pub use trampoline::{CallArgs, ScriptFunction, ScriptValue};

pub use rquickjs;
