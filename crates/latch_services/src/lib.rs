//! Latch Services Layer
//!
//! Platform abstraction consumed by the script bridge: keyboard input and
//! bridge settings.

pub mod input;
pub mod settings;

pub use input::{InputSource, Keyboard};
pub use settings::{BridgeSettings, ReadOnlyWrites, SettingsError};
